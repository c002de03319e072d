//! REST API handlers for GitOps repositories and deployments.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use convoy_services::{
    GitOpsDeploymentUpdate, HistoryFilter, ManualDeployRequest, NewGitOpsDeployment,
    NewRepository, RepositoryMetrics, RepositoryUpdate, WebhookOutcome, WebhookPayload,
};
use tracing::info;

use crate::ApiState;
use crate::response::{ApiResponse, created, reply, service_error};

/// Status update body.
#[derive(serde::Deserialize)]
pub struct StatusUpdate {
    pub status: String,
    #[serde(default)]
    pub duration: Option<u64>,
}

// ── Repositories ───────────────────────────────────────────────

/// GET /api/v1/gitops/repositories
pub async fn list_repositories(State(state): State<ApiState>) -> Response {
    reply(state.services.gitops.list_repositories())
}

/// POST /api/v1/gitops/repositories
pub async fn create_repository(
    State(state): State<ApiState>,
    Json(input): Json<NewRepository>,
) -> Response {
    created(state.services.gitops.create_repository(input))
}

/// GET /api/v1/gitops/repositories/{id}
pub async fn get_repository(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    reply(state.services.gitops.get_repository(&id))
}

/// PUT /api/v1/gitops/repositories/{id}
pub async fn update_repository(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(update): Json<RepositoryUpdate>,
) -> Response {
    reply(state.services.gitops.update_repository(&id, update))
}

/// DELETE /api/v1/gitops/repositories/{id}
pub async fn delete_repository(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    reply(state.services.gitops.delete_repository(&id).map(|()| "deleted"))
}

/// POST /api/v1/gitops/repositories/{id}/sync
pub async fn sync_repository(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    reply(state.services.gitops.sync_repository(&id))
}

/// PUT /api/v1/gitops/repositories/{id}/metrics
pub async fn update_repository_metrics(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(metrics): Json<RepositoryMetrics>,
) -> Response {
    reply(state.services.gitops.update_repository_metrics(&id, metrics))
}

/// GET /api/v1/gitops/repositories/{id}/deployments
pub async fn repository_deployments(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Response {
    reply(state.services.gitops.deployments_for_repository(&id))
}

// ── Deployments ────────────────────────────────────────────────

/// GET /api/v1/gitops/deployments
pub async fn list_deployments(State(state): State<ApiState>) -> Response {
    reply(state.services.gitops.list_deployments())
}

/// POST /api/v1/gitops/deployments
pub async fn create_deployment(
    State(state): State<ApiState>,
    Json(input): Json<NewGitOpsDeployment>,
) -> Response {
    created(state.services.gitops.create_deployment(input))
}

/// GET /api/v1/gitops/deployments/history
pub async fn deployment_history(
    State(state): State<ApiState>,
    Query(filter): Query<HistoryFilter>,
) -> Response {
    reply(state.services.gitops.history(&filter))
}

/// POST /api/v1/gitops/deployments/manual
pub async fn trigger_manual(
    State(state): State<ApiState>,
    Json(request): Json<ManualDeployRequest>,
) -> Response {
    created(state.services.gitops.trigger_manual(request))
}

/// GET /api/v1/gitops/deployments/{id}
pub async fn get_deployment(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    reply(state.services.gitops.get_deployment(&id))
}

/// PUT /api/v1/gitops/deployments/{id}
pub async fn update_deployment(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(update): Json<GitOpsDeploymentUpdate>,
) -> Response {
    reply(state.services.gitops.update_deployment(&id, update))
}

/// DELETE /api/v1/gitops/deployments/{id}
pub async fn delete_deployment(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    reply(state.services.gitops.delete_deployment(&id).map(|()| "deleted"))
}

/// PUT /api/v1/gitops/deployments/{id}/status
pub async fn update_deployment_status(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(req): Json<StatusUpdate>,
) -> Response {
    reply(
        state
            .services
            .gitops
            .update_status(&id, &req.status, req.duration),
    )
}

// ── Webhook, metrics, reconciliation ───────────────────────────

/// POST /api/v1/gitops/webhook
pub async fn webhook(
    State(state): State<ApiState>,
    Json(payload): Json<WebhookPayload>,
) -> Response {
    match state.services.gitops.handle_webhook(payload) {
        Ok(WebhookOutcome::Triggered(deployment)) => {
            info!(deployment = %deployment.id, "webhook triggered deployment");
            ApiResponse::ok(serde_json::json!({
                "message": "Webhook processed successfully",
                "deployment_id": deployment.id,
            }))
            .into_response()
        }
        Ok(WebhookOutcome::NoMatchingRepository(name)) => ApiResponse::ok(serde_json::json!({
            "message": "Webhook received but no matching repository found",
            "repository": name,
        }))
        .into_response(),
        Err(e) => service_error(e),
    }
}

/// GET /api/v1/gitops/metrics
pub async fn metrics(State(state): State<ApiState>) -> Response {
    reply(state.services.gitops.metrics())
}

/// POST /api/v1/gitops/recalculate-deployment-counts
pub async fn recalculate_repository_counts(State(state): State<ApiState>) -> Response {
    reply(state.services.reconciler().reconcile_repositories())
}

/// GET /api/v1/gitops/sync-status
pub async fn sync_status(State(state): State<ApiState>) -> Response {
    reply(state.services.reconciler().sync_status())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use convoy_services::Services;

    fn test_state() -> ApiState {
        ApiState {
            services: Services::in_memory(),
        }
    }

    async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn repo(state: &ApiState, name: &str) -> String {
        state
            .services
            .gitops
            .create_repository(NewRepository {
                name: name.to_string(),
                url: format!("https://git.example.com/{name}.git"),
                ..Default::default()
            })
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn create_repository_uses_camel_case() {
        let state = test_state();
        let input: NewRepository = serde_json::from_value(serde_json::json!({
            "name": "infra",
            "url": "https://git.example.com/infra.git",
            "autoDeploy": true,
            "syncInterval": 60
        }))
        .unwrap();
        let resp = create_repository(State(state), Json(input)).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body = body_json(resp).await;
        assert_eq!(body["data"]["autoDeploy"], true);
        assert_eq!(body["data"]["syncInterval"], 60);
        assert_eq!(body["data"]["deploymentCount"], 0);
    }

    #[tokio::test]
    async fn repository_metrics_use_camel_case() {
        let state = test_state();
        let id = repo(&state, "metered");
        let metrics: RepositoryMetrics = serde_json::from_value(serde_json::json!({
            "commitCount": 17,
            "lastSync": "2024-06-01T08:00:00Z"
        }))
        .unwrap();

        let resp = update_repository_metrics(State(state.clone()), Path(id), Json(metrics)).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["data"]["commitCount"], 17);
        assert_eq!(body["data"]["lastSync"], "2024-06-01T08:00:00.000000Z");

        let resp = update_repository_metrics(
            State(state),
            Path("missing".into()),
            Json(RepositoryMetrics::default()),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn manual_trigger_for_unknown_repository_is_404() {
        let state = test_state();
        let req = ManualDeployRequest {
            repository_id: "missing".into(),
            ..Default::default()
        };
        let resp = trigger_manual(State(state), Json(req)).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn webhook_reports_both_outcomes() {
        let state = test_state();
        repo(&state, "shop");

        let hit: WebhookPayload = serde_json::from_value(serde_json::json!({
            "repository": { "name": "shop" },
            "head_commit": { "id": "123abc" },
            "ref": "refs/heads/main"
        }))
        .unwrap();
        let body = body_json(webhook(State(state.clone()), Json(hit)).await).await;
        assert!(body["data"]["deployment_id"].is_string());

        let miss: WebhookPayload = serde_json::from_value(serde_json::json!({
            "repository": { "name": "elsewhere" }
        }))
        .unwrap();
        let resp = webhook(State(state), Json(miss)).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["data"]["repository"], "elsewhere");
    }

    #[tokio::test]
    async fn status_update_then_history() {
        let state = test_state();
        let id = repo(&state, "svc");
        let d = state
            .services
            .gitops
            .trigger_manual(ManualDeployRequest {
                repository_id: id.clone(),
                ..Default::default()
            })
            .unwrap();

        let resp = update_deployment_status(
            State(state.clone()),
            Path(d.id.clone()),
            Json(StatusUpdate {
                status: "Deploying".into(),
                duration: None,
            }),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);

        let filter = HistoryFilter {
            status: Some("Deploying".into()),
            ..Default::default()
        };
        let body = body_json(deployment_history(State(state), Query(filter)).await).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn recalculate_then_sync_status() {
        let state = test_state();
        let id = repo(&state, "counted");
        state
            .services
            .gitops
            .trigger_manual(ManualDeployRequest {
                repository_id: id,
                ..Default::default()
            })
            .unwrap();

        let body = body_json(sync_status(State(state.clone())).await).await;
        assert_eq!(body["data"]["in_sync"], false);

        let resp = recalculate_repository_counts(State(state.clone())).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body = body_json(sync_status(State(state)).await).await;
        assert_eq!(body["data"]["in_sync"], true);
    }
}
