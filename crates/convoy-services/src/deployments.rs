//! Deployment service. Rollback is additive: it records a new deployment
//! and never rewrites the one being rolled back.

use std::sync::Arc;

use convoy_core::Timestamp;
use convoy_state::{
    Change, Deployment, DeploymentResources, DeploymentStatus, RecordStore, fresh_id,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ServiceError, ServiceResult};
use crate::support::{check_replicas, modify, overlay, require, require_if_set};

const KIND: &str = "deployment";

/// Version a rollback targets when the original has no rollback version.
pub const DEFAULT_ROLLBACK_VERSION: &str = "v1.0.0";

fn logs_url(id: &str) -> String {
    format!("https://logs.example.com/deployment-{id}")
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NewDeployment {
    pub application_id: String,
    pub cluster_id: Option<String>,
    pub version: String,
    pub environment: String,
    pub commit_hash: String,
    pub description: String,
    pub triggered_by: Option<String>,
    pub deployment_strategy: Option<String>,
    pub replicas: Option<u32>,
    pub resources: Option<DeploymentResources>,
}

impl NewDeployment {
    pub fn validate(&self) -> ServiceResult<()> {
        require("application_id", &self.application_id)?;
        require("version", &self.version)?;
        require("environment", &self.environment)?;
        require("commit_hash", &self.commit_hash)?;
        require_if_set("cluster_id", self.cluster_id.as_ref())?;
        check_replicas(self.replicas.unwrap_or(1))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploymentUpdate {
    pub version: Option<String>,
    pub status: Option<DeploymentStatus>,
    pub cluster_id: Option<String>,
    pub description: Option<String>,
    pub deployment_strategy: Option<String>,
    pub replicas: Option<u32>,
    pub duration: Option<u64>,
    pub resources: Option<DeploymentResources>,
}

impl DeploymentUpdate {
    pub fn validate(&self) -> ServiceResult<()> {
        require_if_set("version", self.version.as_ref())?;
        require_if_set("cluster_id", self.cluster_id.as_ref())?;
        require_if_set("deployment_strategy", self.deployment_strategy.as_ref())?;
        if let Some(replicas) = self.replicas {
            check_replicas(replicas)?;
        }
        Ok(())
    }

    fn apply(self, deployment: &mut Deployment) {
        overlay(&mut deployment.version, self.version);
        overlay(&mut deployment.status, self.status);
        overlay(&mut deployment.description, self.description);
        overlay(&mut deployment.deployment_strategy, self.deployment_strategy);
        overlay(&mut deployment.replicas, self.replicas);
        overlay(&mut deployment.duration, self.duration);
        overlay(&mut deployment.resources, self.resources);
        if self.cluster_id.is_some() {
            deployment.cluster_id = self.cluster_id;
        }
    }
}

#[derive(Clone)]
pub struct DeploymentService {
    store: Arc<RecordStore<Deployment>>,
}

impl DeploymentService {
    pub fn new(store: Arc<RecordStore<Deployment>>) -> Self {
        Self { store }
    }

    pub fn list(&self) -> ServiceResult<Vec<Deployment>> {
        Ok(self.store.all()?)
    }

    pub fn list_for_application(&self, application_id: &str) -> ServiceResult<Vec<Deployment>> {
        Ok(self.store.filter(|d| d.application_id == application_id)?)
    }

    pub fn list_for_cluster(&self, cluster_id: &str) -> ServiceResult<Vec<Deployment>> {
        Ok(self
            .store
            .filter(|d| d.cluster_id.as_deref() == Some(cluster_id))?)
    }

    pub fn get(&self, id: &str) -> ServiceResult<Deployment> {
        self.store
            .get(id)?
            .ok_or_else(|| ServiceError::not_found(KIND, id))
    }

    /// Record a new deployment in `Pending`. The application id is taken
    /// as given.
    pub fn create(&self, input: NewDeployment) -> ServiceResult<Deployment> {
        input.validate()?;
        let now = Timestamp::now();
        let deployment = self.store.insert_new(|id| Deployment {
            logs_url: logs_url(&id),
            id,
            application_id: input.application_id,
            cluster_id: input.cluster_id,
            version: input.version,
            status: DeploymentStatus::Pending,
            commit_hash: input.commit_hash,
            environment: input.environment,
            deployed_at: now,
            duration: 0,
            description: input.description,
            triggered_by: input
                .triggered_by
                .unwrap_or_else(|| "admin@company.com".to_string()),
            rollback_version: String::new(),
            deployment_strategy: input
                .deployment_strategy
                .unwrap_or_else(|| "rolling".to_string()),
            replicas: input.replicas.unwrap_or(1),
            resources: input.resources.unwrap_or_default(),
            created: now,
            updated: now,
        })?;
        info!(
            id = %deployment.id,
            application_id = %deployment.application_id,
            version = %deployment.version,
            "deployment created"
        );
        Ok(deployment)
    }

    pub fn update(&self, id: &str, update: DeploymentUpdate) -> ServiceResult<Deployment> {
        update.validate()?;
        modify(&self.store, KIND, id, |deployment, _| {
            update.apply(deployment);
            deployment.clone()
        })
    }

    pub fn delete(&self, id: &str) -> ServiceResult<()> {
        if !self.store.delete(id)? {
            return Err(ServiceError::not_found(KIND, id));
        }
        info!(%id, "deployment deleted");
        Ok(())
    }

    /// Record a new `Pending` deployment that returns the application to
    /// the original's rollback version. The original is not modified.
    ///
    /// The lookup and the insert happen under one lock, so an original
    /// deleted concurrently is reported as not found.
    pub fn rollback(&self, id: &str) -> ServiceResult<Deployment> {
        let rollback = self
            .store
            .transact(|records| {
                let Some(original) = records.iter().find(|d| d.id == id) else {
                    return Change::Discard(None);
                };
                let rollback = rollback_of(original, fresh_id(records), Timestamp::now());
                records.push(rollback.clone());
                Change::Commit(Some(rollback))
            })?
            .ok_or_else(|| ServiceError::not_found(KIND, id))?;
        info!(
            original = %id,
            rollback = %rollback.id,
            version = %rollback.version,
            "rollback deployment recorded"
        );
        Ok(rollback)
    }
}

fn rollback_of(original: &Deployment, id: String, now: Timestamp) -> Deployment {
    let version = if original.rollback_version.is_empty() {
        DEFAULT_ROLLBACK_VERSION.to_string()
    } else {
        original.rollback_version.clone()
    };
    Deployment {
        logs_url: logs_url(&id),
        id,
        application_id: original.application_id.clone(),
        cluster_id: original.cluster_id.clone(),
        version,
        status: DeploymentStatus::Pending,
        commit_hash: format!("rollback-{}", original.commit_hash),
        environment: original.environment.clone(),
        deployed_at: now,
        duration: 0,
        description: format!("Rollback of {}", original.version),
        triggered_by: original.triggered_by.clone(),
        rollback_version: original.version.clone(),
        deployment_strategy: original.deployment_strategy.clone(),
        replicas: original.replicas,
        resources: original.resources.clone(),
        created: now,
        updated: now,
    }
}
