//! convoy-services — typed entity services over the record store, plus the
//! jobs that reconcile derived deployment counts.
//!
//! Every service owns the `RecordStore` it was handed; nothing here keeps
//! hidden global state, so tests can build a full [`Services`] bundle over
//! an in-memory backend.

pub mod applications;
pub mod clusters;
pub mod deployments;
pub mod error;
pub mod gitops;
pub mod logs;
pub mod reconcile;
mod support;

use std::sync::Arc;

use convoy_core::{ConvoyConfig, LoadPolicy};
use convoy_state::{Backend, MemoryBackend, Record, RecordStore, StateResult};
use tracing::info;

pub use applications::{
    ApplicationService, ApplicationUpdate, NewApplication, NewApplicationLog, NewVulnerability,
};
pub use clusters::{ClusterService, ClusterUpdate, NewCluster};
pub use deployments::{DEFAULT_ROLLBACK_VERSION, DeploymentService, DeploymentUpdate, NewDeployment};
pub use error::{ServiceError, ServiceResult};
pub use gitops::{
    GitOpsDeploymentUpdate, GitOpsMetrics, GitOpsService, HistoryFilter, ManualDeployRequest,
    NewGitOpsDeployment, NewRepository, RepositoryMetrics, RepositoryUpdate, WebhookOutcome,
    WebhookPayload,
};
pub use logs::{LogFilter, LogService, LogStats, NewLogEntry};
pub use reconcile::{ReconcileReport, Reconciler, RepositorySync, SyncStatus};

/// All entity services over one backend.
#[derive(Clone)]
pub struct Services {
    pub applications: ApplicationService,
    pub deployments: DeploymentService,
    pub gitops: GitOpsService,
    pub clusters: ClusterService,
    pub logs: LogService,
}

impl Services {
    /// Open every collection on `backend` using the configured load policy
    /// and limits.
    pub fn open(backend: Arc<dyn Backend>, config: &ConvoyConfig) -> StateResult<Self> {
        let policy = config.storage.load_policy;
        let limits = &config.limits;

        let services = Self {
            applications: ApplicationService::new(
                Arc::new(RecordStore::open(backend.clone(), policy)?),
                limits.application_log_retention,
            ),
            deployments: DeploymentService::new(Arc::new(RecordStore::open(
                backend.clone(),
                policy,
            )?)),
            gitops: GitOpsService::new(
                Arc::new(RecordStore::open(backend.clone(), policy)?),
                Arc::new(RecordStore::open(backend.clone(), policy)?),
                limits.history_query_limit,
            ),
            clusters: ClusterService::new(Arc::new(RecordStore::open(backend.clone(), policy)?)),
            logs: LogService::new(
                Arc::new(RecordStore::open(backend.clone(), policy)?),
                limits.log_retention,
                limits.log_query_limit,
            ),
        };
        info!(backend = backend.name(), ?policy, "services opened");
        Ok(services)
    }

    /// Services over a fresh in-memory backend with default limits.
    pub fn in_memory() -> Self {
        let backend: Arc<dyn Backend> = Arc::new(MemoryBackend::new());
        let limits = ConvoyConfig::default().limits;
        Self {
            applications: ApplicationService::new(
                empty_store(&backend),
                limits.application_log_retention,
            ),
            deployments: DeploymentService::new(empty_store(&backend)),
            gitops: GitOpsService::new(
                empty_store(&backend),
                empty_store(&backend),
                limits.history_query_limit,
            ),
            clusters: ClusterService::new(empty_store(&backend)),
            logs: LogService::new(
                empty_store(&backend),
                limits.log_retention,
                limits.log_query_limit,
            ),
        }
    }

    pub fn reconciler(&self) -> Reconciler {
        Reconciler::new(
            self.clusters.clone(),
            self.deployments.clone(),
            self.gitops.clone(),
        )
    }
}

fn empty_store<T: Record>(backend: &Arc<dyn Backend>) -> Arc<RecordStore<T>> {
    Arc::new(RecordStore::empty(backend.clone(), LoadPolicy::Strict))
}
