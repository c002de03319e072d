//! Application service: CRUD plus the embedded log, vulnerability, metrics,
//! health and GitOps-link mutators.

use std::sync::Arc;

use convoy_core::{Timestamp, new_id};
use convoy_state::{
    Application, ApplicationLog, ApplicationMetrics, ApplicationResources, GitOpsLink,
    HealthStatus, RecordStore, Vulnerability,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ServiceError, ServiceResult};
use crate::support::{check_replicas, modify, overlay, require, require_if_set};

const KIND: &str = "application";

/// Input for [`ApplicationService::create`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NewApplication {
    pub name: String,
    pub description: String,
    pub namespace: String,
    pub image: String,
    pub version: String,
    pub environment: String,
    pub replicas: u32,
    pub resources: Option<ApplicationResources>,
    pub tags: Vec<String>,
    pub owner: String,
    pub team: String,
}

impl NewApplication {
    pub fn validate(&self) -> ServiceResult<()> {
        require("name", &self.name)?;
        check_replicas(self.replicas)
    }
}

/// Partial update; only the fields that are set are applied.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
    pub replicas: Option<u32>,
    pub version: Option<String>,
    pub environment: Option<String>,
    pub tags: Option<Vec<String>>,
    pub owner: Option<String>,
    pub team: Option<String>,
}

impl ApplicationUpdate {
    pub fn validate(&self) -> ServiceResult<()> {
        require_if_set("name", self.name.as_ref())?;
        require_if_set("status", self.status.as_ref())?;
        if let Some(replicas) = self.replicas {
            check_replicas(replicas)?;
        }
        Ok(())
    }

    fn apply(self, app: &mut Application) {
        overlay(&mut app.name, self.name);
        overlay(&mut app.description, self.description);
        overlay(&mut app.status, self.status);
        overlay(&mut app.replicas, self.replicas);
        overlay(&mut app.version, self.version);
        overlay(&mut app.environment, self.environment);
        overlay(&mut app.tags, self.tags);
        overlay(&mut app.owner, self.owner);
        overlay(&mut app.team, self.team);
    }
}

/// A log line to append to an application.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NewApplicationLog {
    pub level: Option<String>,
    pub source: Option<String>,
    pub message: String,
    pub details: serde_json::Map<String, serde_json::Value>,
}

/// A vulnerability finding to attach to an application.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NewVulnerability {
    pub severity: Option<String>,
    pub title: String,
    pub description: String,
    pub cve: String,
    pub cvss: Option<f64>,
    pub package: String,
    pub version: String,
    pub fixed_in: Option<String>,
    pub status: Option<String>,
}

impl NewVulnerability {
    pub fn validate(&self) -> ServiceResult<()> {
        match self.cvss {
            Some(cvss) if !(0.0..=10.0).contains(&cvss) => Err(ServiceError::invalid(format!(
                "cvss must be between 0 and 10, got {cvss}"
            ))),
            _ => Ok(()),
        }
    }
}

#[derive(Clone)]
pub struct ApplicationService {
    store: Arc<RecordStore<Application>>,
    log_retention: usize,
}

impl ApplicationService {
    pub fn new(store: Arc<RecordStore<Application>>, log_retention: usize) -> Self {
        Self {
            store,
            log_retention,
        }
    }

    pub fn list(&self) -> ServiceResult<Vec<Application>> {
        Ok(self.store.all()?)
    }

    pub fn get(&self, id: &str) -> ServiceResult<Application> {
        self.store
            .get(id)?
            .ok_or_else(|| ServiceError::not_found(KIND, id))
    }

    pub fn create(&self, input: NewApplication) -> ServiceResult<Application> {
        input.validate()?;
        let now = Timestamp::now();
        let app = self.store.insert_new(|id| Application {
            id,
            name: input.name,
            description: input.description,
            status: "Creating".to_string(),
            replicas: input.replicas,
            namespace: input.namespace,
            image: input.image,
            version: input.version,
            environment: input.environment,
            health: HealthStatus::starting(now),
            metrics: ApplicationMetrics::default(),
            resources: input.resources.unwrap_or_default(),
            logs: Vec::new(),
            vulnerabilities: Vec::new(),
            tags: input.tags,
            owner: input.owner,
            team: input.team,
            gitops: None,
            created: now,
            updated: now,
        })?;
        info!(id = %app.id, name = %app.name, "application created");
        Ok(app)
    }

    pub fn update(&self, id: &str, update: ApplicationUpdate) -> ServiceResult<Application> {
        update.validate()?;
        modify(&self.store, KIND, id, |app, _| {
            update.apply(app);
            app.clone()
        })
    }

    /// Delete by id. Deployments and logs referring to the application
    /// are left in place.
    pub fn delete(&self, id: &str) -> ServiceResult<()> {
        if !self.store.delete(id)? {
            return Err(ServiceError::not_found(KIND, id));
        }
        info!(%id, "application deleted");
        Ok(())
    }

    /// Append a log line, keeping only the most recent entries.
    pub fn append_log(&self, id: &str, input: NewApplicationLog) -> ServiceResult<ApplicationLog> {
        require("message", &input.message)?;
        let retention = self.log_retention;
        modify(&self.store, KIND, id, |app, now| {
            let entry = ApplicationLog {
                id: new_id(),
                timestamp: now,
                level: input.level.unwrap_or_else(|| "info".to_string()),
                source: input.source.unwrap_or_else(|| "application".to_string()),
                message: input.message,
                details: input.details,
            };
            app.logs.push(entry.clone());
            if app.logs.len() > retention {
                let excess = app.logs.len() - retention;
                app.logs.drain(..excess);
            }
            debug!(%id, kept = app.logs.len(), "application log appended");
            entry
        })
    }

    pub fn append_vulnerability(
        &self,
        id: &str,
        input: NewVulnerability,
    ) -> ServiceResult<Vulnerability> {
        input.validate()?;
        modify(&self.store, KIND, id, |app, now| {
            let finding = Vulnerability {
                id: new_id(),
                discovered: now,
                severity: input.severity.unwrap_or_else(|| "medium".to_string()),
                title: input.title,
                description: input.description,
                cve: input.cve,
                cvss: input.cvss,
                package: input.package,
                version: input.version,
                fixed_in: input.fixed_in,
                status: input.status.unwrap_or_else(|| "open".to_string()),
            };
            app.vulnerabilities.push(finding.clone());
            finding
        })
    }

    pub fn set_metrics(&self, id: &str, metrics: ApplicationMetrics) -> ServiceResult<Application> {
        modify(&self.store, KIND, id, |app, _| {
            app.metrics = metrics;
            app.clone()
        })
    }

    pub fn set_health(&self, id: &str, health: HealthStatus) -> ServiceResult<Application> {
        require("health.status", &health.status)?;
        modify(&self.store, KIND, id, |app, _| {
            app.health = health;
            app.clone()
        })
    }

    /// Attach the application to a GitOps repository. The repository id is
    /// not checked against the repository collection.
    pub fn link_repository(&self, id: &str, link: GitOpsLink) -> ServiceResult<Application> {
        require("repository_id", &link.repository_id)?;
        modify(&self.store, KIND, id, |app, _| {
            app.gitops = Some(link);
            app.clone()
        })
    }

    pub fn unlink_repository(&self, id: &str) -> ServiceResult<Application> {
        modify(&self.store, KIND, id, |app, _| {
            app.gitops = None;
            app.clone()
        })
    }

    /// Applications that carry a GitOps link.
    pub fn list_gitops_connected(&self) -> ServiceResult<Vec<Application>> {
        Ok(self.store.filter(|app| app.gitops.is_some())?)
    }
}
