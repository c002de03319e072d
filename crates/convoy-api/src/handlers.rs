//! REST API handlers for applications, deployments and clusters.
//!
//! Each handler calls one service operation and wraps the result in the
//! JSON envelope.

use axum::Json;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use convoy_services::{
    ApplicationUpdate, ClusterUpdate, DeploymentUpdate, LogFilter, NewApplication,
    NewApplicationLog, NewCluster, NewDeployment, NewVulnerability,
};
use convoy_state::{ApplicationMetrics, ClusterMetrics, GitOpsLink, HealthStatus};

use crate::ApiState;
use crate::response::{ApiResponse, created, reply, service_error};

// ── Service ────────────────────────────────────────────────────

/// GET /
pub async fn root() -> impl IntoResponse {
    ApiResponse::ok(serde_json::json!({
        "service": "convoy",
        "version": env!("CARGO_PKG_VERSION"),
        "api": "/api/v1",
    }))
}

/// GET /health
pub async fn health() -> impl IntoResponse {
    ApiResponse::ok(serde_json::json!({ "status": "healthy" }))
}

// ── Applications ───────────────────────────────────────────────

/// GET /api/v1/applications
pub async fn list_applications(State(state): State<ApiState>) -> Response {
    reply(state.services.applications.list())
}

/// GET /api/v1/applications/gitops/connected
pub async fn list_gitops_connected(State(state): State<ApiState>) -> Response {
    reply(state.services.applications.list_gitops_connected())
}

/// POST /api/v1/applications
pub async fn create_application(
    State(state): State<ApiState>,
    Json(input): Json<NewApplication>,
) -> Response {
    created(state.services.applications.create(input))
}

/// GET /api/v1/applications/{id}
pub async fn get_application(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    reply(state.services.applications.get(&id))
}

/// GET /api/v1/applications/{id}/with-logs
pub async fn get_application_with_logs(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Response {
    let app = match state.services.applications.get(&id) {
        Ok(app) => app,
        Err(e) => return service_error(e),
    };
    let filter = LogFilter {
        application_id: Some(id),
        ..Default::default()
    };
    match state.services.logs.list(&filter) {
        Ok(logs) => ApiResponse::ok(serde_json::json!({
            "application": app,
            "logs": logs,
        }))
        .into_response(),
        Err(e) => service_error(e),
    }
}

/// PUT /api/v1/applications/{id}
pub async fn update_application(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(update): Json<ApplicationUpdate>,
) -> Response {
    reply(state.services.applications.update(&id, update))
}

/// DELETE /api/v1/applications/{id}
pub async fn delete_application(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    reply(state.services.applications.delete(&id).map(|()| "deleted"))
}

/// PUT /api/v1/applications/{id}/metrics
pub async fn set_application_metrics(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(metrics): Json<ApplicationMetrics>,
) -> Response {
    reply(state.services.applications.set_metrics(&id, metrics))
}

/// PUT /api/v1/applications/{id}/health
pub async fn set_application_health(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(health): Json<HealthStatus>,
) -> Response {
    reply(state.services.applications.set_health(&id, health))
}

/// POST /api/v1/applications/{id}/logs
pub async fn append_application_log(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(input): Json<NewApplicationLog>,
) -> Response {
    created(state.services.applications.append_log(&id, input))
}

/// POST /api/v1/applications/{id}/vulnerabilities
pub async fn append_vulnerability(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(input): Json<NewVulnerability>,
) -> Response {
    created(state.services.applications.append_vulnerability(&id, input))
}

/// PUT /api/v1/applications/{id}/gitops
pub async fn link_repository(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(link): Json<GitOpsLink>,
) -> Response {
    reply(state.services.applications.link_repository(&id, link))
}

/// DELETE /api/v1/applications/{id}/gitops
pub async fn unlink_repository(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    reply(state.services.applications.unlink_repository(&id))
}

// ── Deployments ────────────────────────────────────────────────

/// GET /api/v1/deployments
pub async fn list_deployments(State(state): State<ApiState>) -> Response {
    reply(state.services.deployments.list())
}

/// POST /api/v1/deployments
pub async fn create_deployment(
    State(state): State<ApiState>,
    Json(input): Json<NewDeployment>,
) -> Response {
    created(state.services.deployments.create(input))
}

/// GET /api/v1/deployments/{id}
pub async fn get_deployment(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    reply(state.services.deployments.get(&id))
}

/// PUT /api/v1/deployments/{id}
pub async fn update_deployment(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(update): Json<DeploymentUpdate>,
) -> Response {
    reply(state.services.deployments.update(&id, update))
}

/// DELETE /api/v1/deployments/{id}
pub async fn delete_deployment(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    reply(state.services.deployments.delete(&id).map(|()| "deleted"))
}

/// POST /api/v1/deployments/{id}/rollback
pub async fn rollback_deployment(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Response {
    created(state.services.deployments.rollback(&id))
}

// ── Clusters ───────────────────────────────────────────────────

/// GET /api/v1/clusters
pub async fn list_clusters(State(state): State<ApiState>) -> Response {
    reply(state.services.clusters.list())
}

/// POST /api/v1/clusters
pub async fn create_cluster(
    State(state): State<ApiState>,
    Json(input): Json<NewCluster>,
) -> Response {
    created(state.services.clusters.create(input))
}

/// GET /api/v1/clusters/{id}
pub async fn get_cluster(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    reply(state.services.clusters.get(&id))
}

/// GET /api/v1/clusters/{id}/with-deployments
pub async fn get_cluster_with_deployments(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Response {
    let cluster = match state.services.clusters.get(&id) {
        Ok(cluster) => cluster,
        Err(e) => return service_error(e),
    };
    match state.services.deployments.list_for_cluster(&id) {
        Ok(deployments) => ApiResponse::ok(serde_json::json!({
            "cluster": cluster,
            "deployments": deployments,
        }))
        .into_response(),
        Err(e) => service_error(e),
    }
}

/// PUT /api/v1/clusters/{id}
pub async fn update_cluster(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(update): Json<ClusterUpdate>,
) -> Response {
    reply(state.services.clusters.update(&id, update))
}

/// DELETE /api/v1/clusters/{id}
pub async fn delete_cluster(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    reply(state.services.clusters.delete(&id).map(|()| "deleted"))
}

/// PUT /api/v1/clusters/{id}/metrics
pub async fn update_cluster_metrics(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(metrics): Json<ClusterMetrics>,
) -> Response {
    reply(state.services.clusters.update_metrics(&id, metrics))
}

/// POST /api/v1/clusters/recalculate-deployment-counts
pub async fn recalculate_cluster_counts(State(state): State<ApiState>) -> Response {
    reply(state.services.reconciler().reconcile_clusters())
}
