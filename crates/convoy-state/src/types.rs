//! Domain records persisted by convoy.
//!
//! Field names follow the JSON documents the collections have always been
//! stored as: snake_case at the top level, camelCase inside application
//! health/metrics and on GitOps repositories.

use convoy_core::Timestamp;
use serde::{Deserialize, Serialize};

use crate::store::Record;
use crate::tables;

// ── Shared resources ───────────────────────────────────────────────

/// A request/limit pair, e.g. `100m` / `500m` CPU.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceQuantity {
    pub request: String,
    pub limit: String,
}

impl ResourceQuantity {
    pub fn new(request: &str, limit: &str) -> Self {
        Self {
            request: request.to_string(),
            limit: limit.to_string(),
        }
    }
}

// ── Application ────────────────────────────────────────────────────

/// A managed application and its observed state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub status: String,
    pub replicas: u32,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub environment: String,
    pub health: HealthStatus,
    pub metrics: ApplicationMetrics,
    pub resources: ApplicationResources,
    /// Most recent log lines, oldest first; bounded by the service.
    #[serde(default)]
    pub logs: Vec<ApplicationLog>,
    #[serde(default)]
    pub vulnerabilities: Vec<Vulnerability>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub team: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gitops: Option<GitOpsLink>,
    pub created: Timestamp,
    pub updated: Timestamp,
}

impl Record for Application {
    const COLLECTION: &'static str = tables::APPLICATIONS;

    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub status: String,
    pub last_check: Timestamp,
    /// Milliseconds.
    pub response_time: u64,
    /// Seconds.
    pub uptime: u64,
    pub error_rate: f64,
}

impl HealthStatus {
    /// Health of an application that has not reported yet.
    pub fn starting(at: Timestamp) -> Self {
        Self {
            status: "Starting".to_string(),
            last_check: at,
            response_time: 0,
            uptime: 0,
            error_rate: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationMetrics {
    pub cpu: CpuMetrics,
    pub memory: MemoryMetrics,
    pub network: NetworkMetrics,
    pub requests: RequestMetrics,
}

impl Default for ApplicationMetrics {
    fn default() -> Self {
        Self {
            cpu: CpuMetrics {
                current: 0.0,
                limit: 2.0,
                unit: "cores".to_string(),
            },
            memory: MemoryMetrics {
                current: 0,
                limit: 1024,
                unit: "Mi".to_string(),
            },
            network: NetworkMetrics::default(),
            requests: RequestMetrics::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpuMetrics {
    pub current: f64,
    pub limit: f64,
    pub unit: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryMetrics {
    pub current: u64,
    pub limit: u64,
    pub unit: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkMetrics {
    pub bytes_in: u64,
    pub bytes_out: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestMetrics {
    pub total: u64,
    pub per_second: f64,
    pub errors: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationResources {
    pub cpu: ResourceQuantity,
    pub memory: ResourceQuantity,
    pub storage: ResourceQuantity,
}

impl Default for ApplicationResources {
    fn default() -> Self {
        Self {
            cpu: ResourceQuantity::new("100m", "500m"),
            memory: ResourceQuantity::new("128Mi", "512Mi"),
            storage: ResourceQuantity::new("1Gi", "10Gi"),
        }
    }
}

/// A log line embedded in an application record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationLog {
    pub id: String,
    pub timestamp: Timestamp,
    pub level: String,
    pub source: String,
    pub message: String,
    #[serde(default)]
    pub details: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vulnerability {
    pub id: String,
    pub discovered: Timestamp,
    pub severity: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub cve: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cvss: Option<f64>,
    #[serde(default)]
    pub package: String,
    #[serde(default)]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_in: Option<String>,
    pub status: String,
}

/// Link from an application to the GitOps repository that deploys it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitOpsLink {
    pub repository_id: String,
    pub sync_status: String,
}

// ── Deployment ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DeploymentStatus {
    #[default]
    Pending,
    Running,
    Success,
    Failed,
}

/// A rollout of an application version to an environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deployment {
    pub id: String,
    /// Not validated against the application collection.
    pub application_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<String>,
    pub version: String,
    pub status: DeploymentStatus,
    pub commit_hash: String,
    pub environment: String,
    pub deployed_at: Timestamp,
    pub logs_url: String,
    /// Seconds.
    #[serde(default)]
    pub duration: u64,
    #[serde(default)]
    pub description: String,
    pub triggered_by: String,
    /// Version a rollback of this deployment returns to; empty if unknown.
    #[serde(default)]
    pub rollback_version: String,
    pub deployment_strategy: String,
    pub replicas: u32,
    pub resources: DeploymentResources,
    pub created: Timestamp,
    pub updated: Timestamp,
}

impl Record for Deployment {
    const COLLECTION: &'static str = tables::DEPLOYMENTS;

    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentResources {
    pub cpu: ResourceQuantity,
    pub memory: ResourceQuantity,
}

impl Default for DeploymentResources {
    fn default() -> Self {
        Self {
            cpu: ResourceQuantity::new("100m", "500m"),
            memory: ResourceQuantity::new("128Mi", "512Mi"),
        }
    }
}

// ── GitOps ─────────────────────────────────────────────────────────

/// A Git repository watched for deployable changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "RepositoryDocument")]
pub struct Repository {
    pub id: String,
    pub name: String,
    pub url: String,
    pub branch: String,
    #[serde(default)]
    pub environment: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub path: String,
    pub auto_deploy: bool,
    /// Seconds.
    pub sync_interval: u64,
    pub status: String,
    pub last_sync: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_deployed: Option<Timestamp>,
    #[serde(default)]
    pub commit_count: u64,
    /// Derived from the GitOps deployment collection by reconciliation;
    /// may lag behind it.
    #[serde(default)]
    pub deployment_count: u64,
    pub created: Timestamp,
    pub updated: Timestamp,
}

/// On-disk shape of a repository. Older documents carry no `created` /
/// `updated` stamps (or carry them as `created_at` / `updated_at`) and may
/// lack `lastSync`.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RepositoryDocument {
    id: String,
    name: String,
    url: String,
    #[serde(default = "default_branch")]
    branch: String,
    #[serde(default)]
    environment: Option<String>,
    #[serde(default)]
    namespace: Option<String>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    auto_deploy: bool,
    #[serde(default = "default_sync_interval")]
    sync_interval: u64,
    #[serde(default = "default_repository_status")]
    status: String,
    #[serde(default)]
    last_sync: Option<Timestamp>,
    #[serde(default)]
    last_deployed: Option<Timestamp>,
    #[serde(default)]
    commit_count: u64,
    #[serde(default)]
    deployment_count: u64,
    #[serde(default, alias = "created_at")]
    created: Option<Timestamp>,
    #[serde(default, alias = "updated_at")]
    updated: Option<Timestamp>,
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_sync_interval() -> u64 {
    300
}

fn default_repository_status() -> String {
    "Active".to_string()
}

impl From<RepositoryDocument> for Repository {
    fn from(doc: RepositoryDocument) -> Self {
        // Missing stamps fall back to the oldest time the document knows of.
        let created = doc
            .created
            .or(doc.last_sync)
            .or(doc.last_deployed)
            .or(doc.updated)
            .unwrap_or_else(Timestamp::now);
        let updated = doc.updated.map_or(created, |u| u.max(created));
        Self {
            id: doc.id,
            name: doc.name,
            url: doc.url,
            branch: doc.branch,
            environment: doc.environment.unwrap_or_default(),
            namespace: doc.namespace.unwrap_or_default(),
            path: doc.path.unwrap_or_default(),
            auto_deploy: doc.auto_deploy,
            sync_interval: doc.sync_interval,
            status: doc.status,
            last_sync: doc.last_sync.unwrap_or(created),
            last_deployed: doc.last_deployed,
            commit_count: doc.commit_count,
            deployment_count: doc.deployment_count,
            created,
            updated,
        }
    }
}

impl Record for Repository {
    const COLLECTION: &'static str = tables::GITOPS_REPOSITORIES;

    fn id(&self) -> &str {
        &self.id
    }
}

/// A deployment triggered from a GitOps repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitOpsDeployment {
    pub id: String,
    pub repository_id: String,
    pub commit_hash: String,
    pub branch: String,
    #[serde(default)]
    pub environment: String,
    #[serde(default)]
    pub description: String,
    pub triggered_by: String,
    #[serde(default)]
    pub author: String,
    /// Free-form; `Pending`, `Deploying`, `Success` and `Failed` by convention.
    pub status: String,
    /// Seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployed_at: Option<Timestamp>,
    pub logs_url: String,
    pub created: Timestamp,
    pub updated: Timestamp,
}

impl Record for GitOpsDeployment {
    const COLLECTION: &'static str = tables::GITOPS_DEPLOYMENTS;

    fn id(&self) -> &str {
        &self.id
    }
}

// ── Cluster ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: String,
    pub name: String,
    pub provider: String,
    pub region: String,
    #[serde(default)]
    pub environment: String,
    #[serde(default)]
    pub version: String,
    pub status: String,
    pub node_count: u32,
    #[serde(default)]
    pub pod_count: u32,
    #[serde(default)]
    pub namespace_count: u32,
    /// Derived from the deployment collection by reconciliation; may lag
    /// behind it.
    #[serde(default)]
    pub deployment_count: u64,
    #[serde(default)]
    pub metrics: ClusterMetrics,
    pub last_health_check: Timestamp,
    pub created: Timestamp,
    pub updated: Timestamp,
}

impl Record for Cluster {
    const COLLECTION: &'static str = tables::CLUSTERS;

    fn id(&self) -> &str {
        &self.id
    }
}

/// Point-in-time resource usage of a cluster. Usage values are percentages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterMetrics {
    pub cpu_usage: f64,
    pub memory_usage: f64,
    #[serde(default)]
    pub disk_usage: f64,
    #[serde(default)]
    pub network_io: f64,
    pub node_count: u32,
    pub pod_count: u32,
    #[serde(default)]
    pub namespace_count: u32,
}

// ── Logs ───────────────────────────────────────────────────────────

/// An entry in the global log collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: String,
    pub timestamp: Timestamp,
    pub level: String,
    pub source: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_id: Option<String>,
    #[serde(default, alias = "details", skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl Record for LogEntry {
    const COLLECTION: &'static str = tables::LOGS;

    fn id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn application_metrics_default_shape() {
        let value = serde_json::to_value(ApplicationMetrics::default()).unwrap();
        assert_eq!(value["cpu"]["current"], 0.0);
        assert_eq!(value["cpu"]["limit"], 2.0);
        assert_eq!(value["memory"]["limit"], 1024);
        assert_eq!(value["network"]["bytesIn"], 0);
        assert_eq!(value["requests"]["perSecond"], 0.0);
    }

    #[test]
    fn health_uses_camel_case() {
        let ts: Timestamp = "2024-01-01T00:00:00Z".parse().unwrap();
        let value = serde_json::to_value(HealthStatus::starting(ts)).unwrap();
        assert_eq!(value["status"], "Starting");
        assert_eq!(value["lastCheck"], "2024-01-01T00:00:00.000000Z");
        assert_eq!(value["errorRate"], 0.0);
    }

    #[test]
    fn repository_reads_legacy_document() {
        let doc = json!({
            "id": "r1",
            "name": "frontend",
            "url": "https://git.example.com/frontend.git",
            "branch": "main",
            "autoDeploy": true,
            "syncInterval": 300,
            "status": "Active",
            "lastSync": "2024-03-01T10:00:00.123456",
            "deploymentCount": 4,
            "created": "2024-03-01T10:00:00",
            "updated": "2024-03-01T10:00:00"
        });
        let repo: Repository = serde_json::from_value(doc).unwrap();
        assert!(repo.auto_deploy);
        assert_eq!(repo.deployment_count, 4);
        assert_eq!(repo.commit_count, 0);
        assert!(repo.last_deployed.is_none());
    }

    #[test]
    fn repository_without_stamps_falls_back_to_last_sync() {
        // Shape written by the original repository create path.
        let doc = json!({
            "id": "9b2f",
            "name": "payments",
            "url": "https://git.example.com/payments.git",
            "branch": "main",
            "autoDeploy": false,
            "status": "Active",
            "lastDeployed": "2024-03-01T10:00:00.123456",
            "environment": "production",
            "namespace": "payments",
            "path": "k8s/",
            "syncInterval": 300,
            "lastSync": "2024-03-01T10:00:00.123456",
            "commitCount": 0,
            "deploymentCount": 0
        });
        let repo: Repository = serde_json::from_value(doc).unwrap();
        let synced: Timestamp = "2024-03-01T10:00:00.123456".parse().unwrap();
        assert_eq!(repo.created, synced);
        assert_eq!(repo.updated, synced);
        assert_eq!(repo.last_deployed, Some(synced));
        assert_eq!(repo.namespace, "payments");

        let value = serde_json::to_value(&repo).unwrap();
        assert_eq!(value["created"], "2024-03-01T10:00:00.123456Z");
    }

    #[test]
    fn repository_accepts_snake_case_stamps_and_nulls() {
        let doc = json!({
            "id": "r2",
            "name": "infra",
            "url": "https://git.example.com/infra.git",
            "branch": "develop",
            "environment": null,
            "namespace": null,
            "path": null,
            "autoDeploy": true,
            "lastSync": null,
            "created_at": "2024-01-01T00:00:00",
            "updated_at": "2024-02-01T00:00:00"
        });
        let repo: Repository = serde_json::from_value(doc).unwrap();
        assert_eq!(repo.created, "2024-01-01T00:00:00Z".parse().unwrap());
        assert_eq!(repo.updated, "2024-02-01T00:00:00Z".parse().unwrap());
        assert_eq!(repo.last_sync, repo.created);
        assert_eq!(repo.sync_interval, 300);
        assert!(repo.environment.is_empty());
    }

    #[test]
    fn log_entry_reads_legacy_details() {
        let entry: LogEntry = serde_json::from_value(json!({
            "id": "l9",
            "timestamp": "2024-01-01T00:00:00.5",
            "level": "error",
            "message": "disk full",
            "source": "node-3",
            "details": { "device": "/dev/sda1" },
            "application_id": null,
            "deployment_id": null
        }))
        .unwrap();
        assert_eq!(entry.metadata, Some(json!({ "device": "/dev/sda1" })));
        assert!(entry.application_id.is_none());

        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["metadata"]["device"], "/dev/sda1");
    }

    #[test]
    fn deployment_status_rejects_unknown_values() {
        assert!(serde_json::from_value::<DeploymentStatus>(json!("Running")).is_ok());
        assert!(serde_json::from_value::<DeploymentStatus>(json!("Exploded")).is_err());
    }

    #[test]
    fn log_entry_omits_absent_links() {
        let entry = LogEntry {
            id: "l1".into(),
            timestamp: "2024-01-01T00:00:00Z".parse().unwrap(),
            level: "info".into(),
            source: "api".into(),
            message: "hello".into(),
            application_id: None,
            deployment_id: None,
            metadata: None,
        };
        let value = serde_json::to_value(&entry).unwrap();
        assert!(value.get("application_id").is_none());
        assert!(value.get("metadata").is_none());
    }
}
