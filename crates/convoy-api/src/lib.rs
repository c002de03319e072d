//! convoy-api — REST API for convoy.
//!
//! Thin axum glue over `convoy-services`: handlers decode the request,
//! call one service operation and map `ServiceError` onto 404 / 400 / 500.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/` | Service banner |
//! | GET | `/health` | Liveness |
//! | GET, POST | `/api/v1/applications` | List / create applications |
//! | GET | `/api/v1/applications/gitops/connected` | Applications linked to a repository |
//! | GET, PUT, DELETE | `/api/v1/applications/{id}` | Read / update / delete |
//! | PUT | `/api/v1/applications/{id}/metrics` | Replace metrics snapshot |
//! | PUT | `/api/v1/applications/{id}/health` | Replace health status |
//! | POST | `/api/v1/applications/{id}/logs` | Append an embedded log line |
//! | POST | `/api/v1/applications/{id}/vulnerabilities` | Append a vulnerability |
//! | PUT, DELETE | `/api/v1/applications/{id}/gitops` | Link / unlink a repository |
//! | GET | `/api/v1/applications/{id}/with-logs` | Application plus its global logs |
//! | GET, POST | `/api/v1/deployments` | List / create deployments |
//! | GET, PUT, DELETE | `/api/v1/deployments/{id}` | Read / update / delete |
//! | POST | `/api/v1/deployments/{id}/rollback` | Record a rollback deployment |
//! | GET, POST | `/api/v1/gitops/repositories` | List / register repositories |
//! | GET, PUT, DELETE | `/api/v1/gitops/repositories/{id}` | Read / update / delete |
//! | POST | `/api/v1/gitops/repositories/{id}/sync` | Mark synced |
//! | PUT | `/api/v1/gitops/repositories/{id}/metrics` | Record poll results |
//! | GET | `/api/v1/gitops/repositories/{id}/deployments` | Deployments of a repository |
//! | GET, POST | `/api/v1/gitops/deployments` | List / create GitOps deployments |
//! | GET | `/api/v1/gitops/deployments/history` | Filtered history |
//! | POST | `/api/v1/gitops/deployments/manual` | Manual trigger |
//! | GET, PUT, DELETE | `/api/v1/gitops/deployments/{id}` | Read / update / delete |
//! | PUT | `/api/v1/gitops/deployments/{id}/status` | Free-form status update |
//! | POST | `/api/v1/gitops/webhook` | Simulated push webhook |
//! | GET | `/api/v1/gitops/metrics` | GitOps summary |
//! | POST | `/api/v1/gitops/recalculate-deployment-counts` | Reconcile repositories |
//! | GET | `/api/v1/gitops/sync-status` | Stored vs live repository counts |
//! | GET, POST | `/api/v1/clusters` | List / register clusters |
//! | POST | `/api/v1/clusters/recalculate-deployment-counts` | Reconcile clusters |
//! | GET, PUT, DELETE | `/api/v1/clusters/{id}` | Read / update / delete |
//! | PUT | `/api/v1/clusters/{id}/metrics` | Replace metrics snapshot |
//! | GET | `/api/v1/clusters/{id}/with-deployments` | Cluster plus its deployments |
//! | GET, POST, DELETE | `/api/v1/logs` | Query / append / clear logs |
//! | POST | `/api/v1/logs/batch` | Append a batch of logs |
//! | GET | `/api/v1/logs/stats` | Counts by level and source |
//! | GET, DELETE | `/api/v1/logs/{id}` | Read / delete one entry |

pub mod gitops_handlers;
pub mod handlers;
pub mod log_handlers;
mod response;

use axum::Router;
use axum::routing::{get, post, put};
use convoy_services::Services;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub services: Services,
}

/// Build the complete API router.
pub fn build_router(services: Services) -> Router {
    let state = ApiState { services };

    let applications = Router::new()
        .route(
            "/applications",
            get(handlers::list_applications).post(handlers::create_application),
        )
        .route(
            "/applications/gitops/connected",
            get(handlers::list_gitops_connected),
        )
        .route(
            "/applications/{id}",
            get(handlers::get_application)
                .put(handlers::update_application)
                .delete(handlers::delete_application),
        )
        .route("/applications/{id}/metrics", put(handlers::set_application_metrics))
        .route("/applications/{id}/health", put(handlers::set_application_health))
        .route("/applications/{id}/logs", post(handlers::append_application_log))
        .route(
            "/applications/{id}/vulnerabilities",
            post(handlers::append_vulnerability),
        )
        .route(
            "/applications/{id}/gitops",
            put(handlers::link_repository).delete(handlers::unlink_repository),
        )
        .route(
            "/applications/{id}/with-logs",
            get(handlers::get_application_with_logs),
        );

    let deployments = Router::new()
        .route(
            "/deployments",
            get(handlers::list_deployments).post(handlers::create_deployment),
        )
        .route(
            "/deployments/{id}",
            get(handlers::get_deployment)
                .put(handlers::update_deployment)
                .delete(handlers::delete_deployment),
        )
        .route("/deployments/{id}/rollback", post(handlers::rollback_deployment));

    let gitops = Router::new()
        .route(
            "/gitops/repositories",
            get(gitops_handlers::list_repositories).post(gitops_handlers::create_repository),
        )
        .route(
            "/gitops/repositories/{id}",
            get(gitops_handlers::get_repository)
                .put(gitops_handlers::update_repository)
                .delete(gitops_handlers::delete_repository),
        )
        .route(
            "/gitops/repositories/{id}/sync",
            post(gitops_handlers::sync_repository),
        )
        .route(
            "/gitops/repositories/{id}/metrics",
            put(gitops_handlers::update_repository_metrics),
        )
        .route(
            "/gitops/repositories/{id}/deployments",
            get(gitops_handlers::repository_deployments),
        )
        .route(
            "/gitops/deployments",
            get(gitops_handlers::list_deployments).post(gitops_handlers::create_deployment),
        )
        .route(
            "/gitops/deployments/history",
            get(gitops_handlers::deployment_history),
        )
        .route(
            "/gitops/deployments/manual",
            post(gitops_handlers::trigger_manual),
        )
        .route(
            "/gitops/deployments/{id}",
            get(gitops_handlers::get_deployment)
                .put(gitops_handlers::update_deployment)
                .delete(gitops_handlers::delete_deployment),
        )
        .route(
            "/gitops/deployments/{id}/status",
            put(gitops_handlers::update_deployment_status),
        )
        .route("/gitops/webhook", post(gitops_handlers::webhook))
        .route("/gitops/metrics", get(gitops_handlers::metrics))
        .route(
            "/gitops/recalculate-deployment-counts",
            post(gitops_handlers::recalculate_repository_counts),
        )
        .route("/gitops/sync-status", get(gitops_handlers::sync_status));

    let clusters = Router::new()
        .route(
            "/clusters",
            get(handlers::list_clusters).post(handlers::create_cluster),
        )
        .route(
            "/clusters/recalculate-deployment-counts",
            post(handlers::recalculate_cluster_counts),
        )
        .route(
            "/clusters/{id}",
            get(handlers::get_cluster)
                .put(handlers::update_cluster)
                .delete(handlers::delete_cluster),
        )
        .route("/clusters/{id}/metrics", put(handlers::update_cluster_metrics))
        .route(
            "/clusters/{id}/with-deployments",
            get(handlers::get_cluster_with_deployments),
        );

    let logs = Router::new()
        .route(
            "/logs",
            get(log_handlers::list_logs)
                .post(log_handlers::create_log)
                .delete(log_handlers::clear_logs),
        )
        .route("/logs/batch", post(log_handlers::ingest_logs))
        .route("/logs/stats", get(log_handlers::log_stats))
        .route(
            "/logs/{id}",
            get(log_handlers::get_log).delete(log_handlers::delete_log),
        );

    let api_routes = Router::new()
        .merge(applications)
        .merge(deployments)
        .merge(gitops)
        .merge(clusters)
        .merge(logs)
        .with_state(state);

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .nest("/api/v1", api_routes)
}
