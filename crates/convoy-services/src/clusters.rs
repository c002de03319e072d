use std::sync::Arc;

use convoy_core::Timestamp;
use convoy_state::{Cluster, ClusterMetrics, RecordStore};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ServiceError, ServiceResult};
use crate::support::{check_percentage, modify, overlay, require, require_if_set};

const KIND: &str = "cluster";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NewCluster {
    pub name: String,
    pub provider: String,
    pub region: String,
    pub environment: String,
    pub version: String,
    pub node_count: u32,
}

impl NewCluster {
    pub fn validate(&self) -> ServiceResult<()> {
        require("name", &self.name)?;
        require("provider", &self.provider)?;
        require("region", &self.region)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterUpdate {
    pub name: Option<String>,
    pub provider: Option<String>,
    pub region: Option<String>,
    pub environment: Option<String>,
    pub version: Option<String>,
    pub node_count: Option<u32>,
    pub status: Option<String>,
}

impl ClusterUpdate {
    pub fn validate(&self) -> ServiceResult<()> {
        require_if_set("name", self.name.as_ref())?;
        require_if_set("provider", self.provider.as_ref())?;
        require_if_set("region", self.region.as_ref())?;
        require_if_set("status", self.status.as_ref())
    }

    fn apply(self, cluster: &mut Cluster) {
        overlay(&mut cluster.name, self.name);
        overlay(&mut cluster.provider, self.provider);
        overlay(&mut cluster.region, self.region);
        overlay(&mut cluster.environment, self.environment);
        overlay(&mut cluster.version, self.version);
        overlay(&mut cluster.node_count, self.node_count);
        overlay(&mut cluster.status, self.status);
    }
}

fn validate_metrics(metrics: &ClusterMetrics) -> ServiceResult<()> {
    check_percentage("cpu_usage", metrics.cpu_usage)?;
    check_percentage("memory_usage", metrics.memory_usage)?;
    check_percentage("disk_usage", metrics.disk_usage)?;
    if !metrics.network_io.is_finite() || metrics.network_io < 0.0 {
        return Err(ServiceError::invalid("network_io must be a non-negative number"));
    }
    Ok(())
}

#[derive(Clone)]
pub struct ClusterService {
    store: Arc<RecordStore<Cluster>>,
}

impl ClusterService {
    pub fn new(store: Arc<RecordStore<Cluster>>) -> Self {
        Self { store }
    }

    pub(crate) fn store(&self) -> &RecordStore<Cluster> {
        &self.store
    }

    pub fn list(&self) -> ServiceResult<Vec<Cluster>> {
        Ok(self.store.all()?)
    }

    pub fn get(&self, id: &str) -> ServiceResult<Cluster> {
        self.store
            .get(id)?
            .ok_or_else(|| ServiceError::not_found(KIND, id))
    }

    /// Register a cluster as `Active` with an empty metrics snapshot.
    pub fn create(&self, input: NewCluster) -> ServiceResult<Cluster> {
        input.validate()?;
        let now = Timestamp::now();
        let cluster = self.store.insert_new(|id| Cluster {
            id,
            name: input.name,
            provider: input.provider,
            region: input.region,
            environment: input.environment,
            version: input.version,
            status: "Active".to_string(),
            node_count: input.node_count,
            pod_count: 0,
            namespace_count: 0,
            deployment_count: 0,
            metrics: ClusterMetrics {
                node_count: input.node_count,
                ..Default::default()
            },
            last_health_check: now,
            created: now,
            updated: now,
        })?;
        info!(id = %cluster.id, name = %cluster.name, provider = %cluster.provider, "cluster registered");
        Ok(cluster)
    }

    pub fn update(&self, id: &str, update: ClusterUpdate) -> ServiceResult<Cluster> {
        update.validate()?;
        modify(&self.store, KIND, id, |cluster, _| {
            update.apply(cluster);
            cluster.clone()
        })
    }

    /// Delete by id. Deployments pointing at the cluster keep their
    /// `cluster_id`.
    pub fn delete(&self, id: &str) -> ServiceResult<()> {
        if !self.store.delete(id)? {
            return Err(ServiceError::not_found(KIND, id));
        }
        info!(%id, "cluster deleted");
        Ok(())
    }

    /// Replace the metrics snapshot and mirror its counts onto the cluster.
    pub fn update_metrics(&self, id: &str, metrics: ClusterMetrics) -> ServiceResult<Cluster> {
        validate_metrics(&metrics)?;
        let cluster = modify(&self.store, KIND, id, |cluster, now| {
            cluster.node_count = metrics.node_count;
            cluster.pod_count = metrics.pod_count;
            cluster.namespace_count = metrics.namespace_count;
            cluster.metrics = metrics;
            cluster.last_health_check = now;
            cluster.clone()
        })?;
        debug!(
            %id,
            cpu = cluster.metrics.cpu_usage,
            memory = cluster.metrics.memory_usage,
            "cluster metrics updated"
        );
        Ok(cluster)
    }
}
