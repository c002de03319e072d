//! GitOps service: watched repositories and the deployments they trigger.
//!
//! Git itself is simulated. A webhook is reduced to a repository-name lookup
//! followed by a manual trigger; nothing is cloned or verified.

use std::collections::BTreeMap;
use std::sync::Arc;

use convoy_core::Timestamp;
use convoy_state::{Change, GitOpsDeployment, RecordStore, Repository};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ServiceError, ServiceResult};
use crate::support::{Touch, modify, overlay, require, require_if_set};

const REPOSITORY: &str = "repository";
const DEPLOYMENT: &str = "gitops deployment";

fn logs_url(id: &str) -> String {
    format!("https://logs.example.com/gitops-deployment-{id}")
}

// ── Inputs ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NewRepository {
    pub name: String,
    pub url: String,
    pub branch: Option<String>,
    pub environment: String,
    pub namespace: String,
    pub path: String,
    pub auto_deploy: bool,
    pub sync_interval: Option<u64>,
}

impl NewRepository {
    pub fn validate(&self) -> ServiceResult<()> {
        require("name", &self.name)?;
        require("url", &self.url)?;
        require_if_set("branch", self.branch.as_ref())?;
        check_sync_interval(self.sync_interval)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RepositoryUpdate {
    pub name: Option<String>,
    pub url: Option<String>,
    pub branch: Option<String>,
    pub environment: Option<String>,
    pub namespace: Option<String>,
    pub path: Option<String>,
    pub auto_deploy: Option<bool>,
    pub sync_interval: Option<u64>,
    pub status: Option<String>,
}

impl RepositoryUpdate {
    pub fn validate(&self) -> ServiceResult<()> {
        require_if_set("name", self.name.as_ref())?;
        require_if_set("url", self.url.as_ref())?;
        require_if_set("branch", self.branch.as_ref())?;
        require_if_set("status", self.status.as_ref())?;
        check_sync_interval(self.sync_interval)
    }

    fn apply(self, repo: &mut Repository) {
        overlay(&mut repo.name, self.name);
        overlay(&mut repo.url, self.url);
        overlay(&mut repo.branch, self.branch);
        overlay(&mut repo.environment, self.environment);
        overlay(&mut repo.namespace, self.namespace);
        overlay(&mut repo.path, self.path);
        overlay(&mut repo.auto_deploy, self.auto_deploy);
        overlay(&mut repo.sync_interval, self.sync_interval);
        overlay(&mut repo.status, self.status);
    }
}

fn check_sync_interval(interval: Option<u64>) -> ServiceResult<()> {
    if interval == Some(0) {
        return Err(ServiceError::invalid("syncInterval must be positive"));
    }
    Ok(())
}

/// Poll results for one repository.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RepositoryMetrics {
    pub commit_count: u64,
    /// Defaults to the time of the update.
    pub last_sync: Option<Timestamp>,
    pub status: Option<String>,
}

impl RepositoryMetrics {
    pub fn validate(&self) -> ServiceResult<()> {
        require_if_set("status", self.status.as_ref())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NewGitOpsDeployment {
    pub repository_id: String,
    pub commit_hash: String,
    pub branch: String,
    pub environment: String,
    pub description: String,
    pub triggered_by: String,
    pub author: String,
}

impl NewGitOpsDeployment {
    pub fn validate(&self) -> ServiceResult<()> {
        require("repository_id", &self.repository_id)?;
        require("commit_hash", &self.commit_hash)?;
        require("branch", &self.branch)?;
        require("triggered_by", &self.triggered_by)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GitOpsDeploymentUpdate {
    pub commit_hash: Option<String>,
    pub branch: Option<String>,
    pub environment: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
    pub duration: Option<u64>,
}

impl GitOpsDeploymentUpdate {
    pub fn validate(&self) -> ServiceResult<()> {
        require_if_set("commit_hash", self.commit_hash.as_ref())?;
        require_if_set("branch", self.branch.as_ref())?;
        require_if_set("status", self.status.as_ref())
    }

    fn apply(self, deployment: &mut GitOpsDeployment) {
        overlay(&mut deployment.commit_hash, self.commit_hash);
        overlay(&mut deployment.branch, self.branch);
        overlay(&mut deployment.environment, self.environment);
        overlay(&mut deployment.description, self.description);
        overlay(&mut deployment.status, self.status);
        if self.duration.is_some() {
            deployment.duration = self.duration;
        }
    }
}

/// Request to deploy a repository outside of any webhook.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ManualDeployRequest {
    pub repository_id: String,
    pub commit_hash: Option<String>,
    /// Defaults to the repository's branch.
    pub branch: Option<String>,
    /// Defaults to the repository's environment.
    pub environment: Option<String>,
    pub description: Option<String>,
    pub triggered_by: Option<String>,
    pub author: Option<String>,
}

/// The subset of a push webhook that is looked at.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookPayload {
    pub repository: Option<WebhookRepository>,
    pub head_commit: Option<WebhookCommit>,
    #[serde(rename = "ref")]
    pub git_ref: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookRepository {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookCommit {
    pub id: Option<String>,
    pub author: Option<WebhookAuthor>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookAuthor {
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WebhookOutcome {
    Triggered(GitOpsDeployment),
    /// No repository carries the pushed name.
    NoMatchingRepository(String),
}

/// Filter for [`GitOpsService::history`]. Bounds are compared as strings
/// against the deployment's `created` stamp.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryFilter {
    pub repository_id: Option<String>,
    pub status: Option<String>,
    pub environment: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    /// Keep the last N matches; `0` means no limit.
    pub limit: Option<usize>,
}

impl HistoryFilter {
    fn matches(&self, d: &GitOpsDeployment) -> bool {
        let created = d.created.to_string();
        self.repository_id
            .as_ref()
            .is_none_or(|id| &d.repository_id == id)
            && self.status.as_ref().is_none_or(|s| &d.status == s)
            && self
                .environment
                .as_ref()
                .is_none_or(|e| &d.environment == e)
            && self
                .start_date
                .as_ref()
                .is_none_or(|start| created.as_str() >= start.as_str())
            && self
                .end_date
                .as_ref()
                .is_none_or(|end| created.as_str() <= end.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitOpsMetrics {
    pub total_repositories: usize,
    pub active_repositories: usize,
    pub auto_deploy_repositories: usize,
    pub total_deployments: usize,
    pub deployments_by_status: BTreeMap<String, usize>,
    /// Percentage of deployments with status `Success`.
    pub success_rate: f64,
    /// Mean of the recorded durations in seconds, if any were recorded.
    pub average_duration: Option<f64>,
}

// ── Service ────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct GitOpsService {
    repositories: Arc<RecordStore<Repository>>,
    deployments: Arc<RecordStore<GitOpsDeployment>>,
    history_limit: usize,
}

impl GitOpsService {
    pub fn new(
        repositories: Arc<RecordStore<Repository>>,
        deployments: Arc<RecordStore<GitOpsDeployment>>,
        history_limit: usize,
    ) -> Self {
        Self {
            repositories,
            deployments,
            history_limit,
        }
    }

    pub(crate) fn repository_store(&self) -> &RecordStore<Repository> {
        &self.repositories
    }

    // Repositories

    pub fn list_repositories(&self) -> ServiceResult<Vec<Repository>> {
        Ok(self.repositories.all()?)
    }

    pub fn get_repository(&self, id: &str) -> ServiceResult<Repository> {
        self.repositories
            .get(id)?
            .ok_or_else(|| ServiceError::not_found(REPOSITORY, id))
    }

    /// First repository whose name matches exactly.
    pub fn find_by_name(&self, name: &str) -> ServiceResult<Option<Repository>> {
        Ok(self.repositories.find(|r| r.name == name)?)
    }

    pub fn create_repository(&self, input: NewRepository) -> ServiceResult<Repository> {
        input.validate()?;
        let now = Timestamp::now();
        let repo = self.repositories.insert_new(|id| Repository {
            id,
            name: input.name,
            url: input.url,
            branch: input.branch.unwrap_or_else(|| "main".to_string()),
            environment: input.environment,
            namespace: input.namespace,
            path: input.path,
            auto_deploy: input.auto_deploy,
            sync_interval: input.sync_interval.unwrap_or(300),
            status: "Active".to_string(),
            last_sync: now,
            last_deployed: None,
            commit_count: 0,
            deployment_count: 0,
            created: now,
            updated: now,
        })?;
        info!(id = %repo.id, name = %repo.name, "repository registered");
        Ok(repo)
    }

    pub fn update_repository(&self, id: &str, update: RepositoryUpdate) -> ServiceResult<Repository> {
        update.validate()?;
        modify(&self.repositories, REPOSITORY, id, |repo, _| {
            update.apply(repo);
            repo.clone()
        })
    }

    /// Delete a repository. Its GitOps deployments are kept.
    pub fn delete_repository(&self, id: &str) -> ServiceResult<()> {
        if !self.repositories.delete(id)? {
            return Err(ServiceError::not_found(REPOSITORY, id));
        }
        info!(%id, "repository deleted");
        Ok(())
    }

    /// Mark the repository as freshly synced.
    pub fn sync_repository(&self, id: &str) -> ServiceResult<Repository> {
        let repo = modify(&self.repositories, REPOSITORY, id, |repo, now| {
            repo.last_sync = now;
            repo.status = "Active".to_string();
            repo.clone()
        })?;
        debug!(%id, "repository synced");
        Ok(repo)
    }

    /// Record what the last poll of the repository observed.
    pub fn update_repository_metrics(
        &self,
        id: &str,
        metrics: RepositoryMetrics,
    ) -> ServiceResult<Repository> {
        metrics.validate()?;
        let repo = modify(&self.repositories, REPOSITORY, id, |repo, now| {
            repo.commit_count = metrics.commit_count;
            repo.last_sync = metrics.last_sync.unwrap_or(now);
            overlay(&mut repo.status, metrics.status);
            repo.clone()
        })?;
        debug!(%id, commits = repo.commit_count, "repository metrics updated");
        Ok(repo)
    }

    // Deployments

    pub fn list_deployments(&self) -> ServiceResult<Vec<GitOpsDeployment>> {
        Ok(self.deployments.all()?)
    }

    pub fn deployments_for_repository(
        &self,
        repository_id: &str,
    ) -> ServiceResult<Vec<GitOpsDeployment>> {
        Ok(self.deployments.filter(|d| d.repository_id == repository_id)?)
    }

    pub fn get_deployment(&self, id: &str) -> ServiceResult<GitOpsDeployment> {
        self.deployments
            .get(id)?
            .ok_or_else(|| ServiceError::not_found(DEPLOYMENT, id))
    }

    /// Record a `Pending` deployment. The repository id is not checked.
    pub fn create_deployment(&self, input: NewGitOpsDeployment) -> ServiceResult<GitOpsDeployment> {
        input.validate()?;
        let now = Timestamp::now();
        let deployment = self.deployments.insert_new(|id| GitOpsDeployment {
            logs_url: logs_url(&id),
            id,
            repository_id: input.repository_id,
            commit_hash: input.commit_hash,
            branch: input.branch,
            environment: input.environment,
            description: input.description,
            triggered_by: input.triggered_by,
            author: input.author,
            status: "Pending".to_string(),
            duration: None,
            deployed_at: None,
            created: now,
            updated: now,
        })?;
        info!(
            id = %deployment.id,
            repository_id = %deployment.repository_id,
            commit = %deployment.commit_hash,
            "gitops deployment created"
        );
        Ok(deployment)
    }

    pub fn update_deployment(
        &self,
        id: &str,
        update: GitOpsDeploymentUpdate,
    ) -> ServiceResult<GitOpsDeployment> {
        update.validate()?;
        modify(&self.deployments, DEPLOYMENT, id, |deployment, _| {
            update.apply(deployment);
            deployment.clone()
        })
    }

    pub fn delete_deployment(&self, id: &str) -> ServiceResult<()> {
        if !self.deployments.delete(id)? {
            return Err(ServiceError::not_found(DEPLOYMENT, id));
        }
        info!(%id, "gitops deployment deleted");
        Ok(())
    }

    /// Write `status` (and `duration` when given) without checking the
    /// transition. The first `Success` also stamps `deployed_at`.
    pub fn update_status(
        &self,
        id: &str,
        status: &str,
        duration: Option<u64>,
    ) -> ServiceResult<GitOpsDeployment> {
        require("status", status)?;
        let deployment = modify(&self.deployments, DEPLOYMENT, id, |deployment, now| {
            deployment.status = status.to_string();
            if duration.is_some() {
                deployment.duration = duration;
            }
            if status == "Success" && deployment.deployed_at.is_none() {
                deployment.deployed_at = Some(now);
            }
            deployment.clone()
        })?;
        info!(%id, %status, "gitops deployment status updated");
        Ok(deployment)
    }

    /// Deployments matching `filter`, oldest first, trimmed to the last
    /// `limit` entries.
    pub fn history(&self, filter: &HistoryFilter) -> ServiceResult<Vec<GitOpsDeployment>> {
        let mut matched = self.deployments.filter(|d| filter.matches(d))?;
        let limit = filter.limit.unwrap_or(self.history_limit);
        if limit > 0 && matched.len() > limit {
            matched.drain(..matched.len() - limit);
        }
        Ok(matched)
    }

    /// Create a `Pending` deployment for a known repository and stamp the
    /// repository's `lastDeployed`.
    ///
    /// The repository collection stays locked while the deployment is
    /// written (repositories before deployments, the only nesting order
    /// used). A repository deleted concurrently is therefore reported as
    /// not found and no deployment is recorded for it.
    pub fn trigger_manual(&self, request: ManualDeployRequest) -> ServiceResult<GitOpsDeployment> {
        self.repositories.transact(|repos| {
            let Some(repo) = repos.iter_mut().find(|r| r.id == request.repository_id) else {
                return Change::Discard(Err(ServiceError::not_found(
                    REPOSITORY,
                    &request.repository_id,
                )));
            };
            let input = NewGitOpsDeployment {
                repository_id: repo.id.clone(),
                commit_hash: request.commit_hash.unwrap_or_else(|| "HEAD".to_string()),
                branch: request.branch.unwrap_or_else(|| repo.branch.clone()),
                environment: request
                    .environment
                    .unwrap_or_else(|| repo.environment.clone()),
                description: request
                    .description
                    .unwrap_or_else(|| format!("Manual deployment of {}", repo.name)),
                triggered_by: request.triggered_by.unwrap_or_else(|| "manual".to_string()),
                author: request.author.unwrap_or_default(),
            };
            match self.create_deployment(input) {
                Ok(deployment) => {
                    let now = repo.touch();
                    repo.last_deployed = Some(now);
                    Change::Commit(Ok(deployment))
                }
                Err(e) => Change::Discard(Err(e)),
            }
        })?
    }

    /// Translate a push webhook into a manual trigger on the first
    /// repository with the pushed name.
    pub fn handle_webhook(&self, payload: WebhookPayload) -> ServiceResult<WebhookOutcome> {
        let name = payload
            .repository
            .and_then(|r| r.name)
            .unwrap_or_else(|| "unknown".to_string());
        let (commit, author) = match payload.head_commit {
            Some(commit) => (commit.id, commit.author.and_then(|a| a.name)),
            None => (None, None),
        };
        let commit = commit.unwrap_or_else(|| "unknown".to_string());
        let git_ref = payload
            .git_ref
            .unwrap_or_else(|| "refs/heads/main".to_string());
        let branch = git_ref
            .strip_prefix("refs/heads/")
            .unwrap_or(git_ref.as_str())
            .to_string();

        let Some(repo) = self.find_by_name(&name)? else {
            debug!(repository = %name, "webhook for unknown repository ignored");
            return Ok(WebhookOutcome::NoMatchingRepository(name));
        };

        let deployment = self.trigger_manual(ManualDeployRequest {
            repository_id: repo.id,
            commit_hash: Some(commit),
            branch: Some(branch),
            environment: None,
            description: Some(format!("Webhook triggered deployment for {name}")),
            triggered_by: Some("webhook".to_string()),
            author,
        })?;
        Ok(WebhookOutcome::Triggered(deployment))
    }

    pub fn metrics(&self) -> ServiceResult<GitOpsMetrics> {
        let repositories = self.repositories.all()?;
        let deployments = self.deployments.all()?;

        let mut by_status: BTreeMap<String, usize> = BTreeMap::new();
        for d in &deployments {
            *by_status.entry(d.status.clone()).or_default() += 1;
        }
        let succeeded = by_status.get("Success").copied().unwrap_or(0);
        let success_rate = if deployments.is_empty() {
            0.0
        } else {
            succeeded as f64 * 100.0 / deployments.len() as f64
        };
        let durations: Vec<u64> = deployments.iter().filter_map(|d| d.duration).collect();
        let average_duration = (!durations.is_empty())
            .then(|| durations.iter().sum::<u64>() as f64 / durations.len() as f64);

        Ok(GitOpsMetrics {
            total_repositories: repositories.len(),
            active_repositories: repositories.iter().filter(|r| r.status == "Active").count(),
            auto_deploy_repositories: repositories.iter().filter(|r| r.auto_deploy).count(),
            total_deployments: deployments.len(),
            deployments_by_status: by_status,
            success_rate,
            average_duration,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use convoy_core::LoadPolicy;
    use convoy_state::MemoryBackend;

    fn service() -> GitOpsService {
        let backend = Arc::new(MemoryBackend::new());
        GitOpsService::new(
            Arc::new(RecordStore::open(backend.clone(), LoadPolicy::Strict).unwrap()),
            Arc::new(RecordStore::open(backend, LoadPolicy::Strict).unwrap()),
            50,
        )
    }

    fn new_repo(name: &str) -> NewRepository {
        NewRepository {
            name: name.to_string(),
            url: format!("https://git.example.com/{name}.git"),
            environment: "staging".into(),
            namespace: name.to_string(),
            path: "deploy/".into(),
            auto_deploy: true,
            ..Default::default()
        }
    }

    fn push(name: &str, commit: &str, git_ref: &str) -> WebhookPayload {
        serde_json::from_value(serde_json::json!({
            "repository": { "name": name },
            "head_commit": { "id": commit, "author": { "name": "dev" } },
            "ref": git_ref,
        }))
        .unwrap()
    }

    #[test]
    fn create_repository_applies_defaults() {
        let svc = service();
        let repo = svc.create_repository(new_repo("frontend")).unwrap();
        assert_eq!(repo.branch, "main");
        assert_eq!(repo.sync_interval, 300);
        assert_eq!(repo.status, "Active");
        assert_eq!(repo.deployment_count, 0);
        assert!(repo.last_deployed.is_none());
    }

    #[test]
    fn zero_sync_interval_is_invalid() {
        let svc = service();
        let mut input = new_repo("x");
        input.sync_interval = Some(0);
        assert!(matches!(
            svc.create_repository(input),
            Err(ServiceError::Validation(_))
        ));
    }

    #[test]
    fn repository_update_and_sync() {
        let svc = service();
        let repo = svc.create_repository(new_repo("api")).unwrap();

        let paused = svc
            .update_repository(
                &repo.id,
                RepositoryUpdate {
                    status: Some("Paused".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(paused.status, "Paused");
        assert_eq!(paused.url, repo.url);

        let synced = svc.sync_repository(&repo.id).unwrap();
        assert_eq!(synced.status, "Active");
        assert!(synced.last_sync > repo.last_sync);
        assert!(synced.updated > paused.updated);
    }

    #[test]
    fn find_by_name_is_case_sensitive_first_match() {
        let svc = service();
        let first = svc.create_repository(new_repo("dup")).unwrap();
        svc.create_repository(new_repo("dup")).unwrap();

        assert_eq!(svc.find_by_name("dup").unwrap().unwrap().id, first.id);
        assert!(svc.find_by_name("DUP").unwrap().is_none());
    }

    #[test]
    fn update_status_accepts_any_string() {
        let svc = service();
        let repo = svc.create_repository(new_repo("api")).unwrap();
        let d = svc
            .trigger_manual(ManualDeployRequest {
                repository_id: repo.id.clone(),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(d.status, "Pending");

        let done = svc.update_status(&d.id, "Success", Some(42)).unwrap();
        assert_eq!(done.duration, Some(42));
        assert!(done.deployed_at.is_some());

        // Out-of-order transitions are not detected.
        let back = svc.update_status(&d.id, "Pending", None).unwrap();
        assert_eq!(back.status, "Pending");
        assert_eq!(back.duration, Some(42));

        assert!(svc.update_status(&d.id, "", None).is_err());
        assert!(matches!(
            svc.update_status("missing", "Failed", None),
            Err(ServiceError::NotFound { .. })
        ));
    }

    #[test]
    fn manual_trigger_needs_known_repository() {
        let svc = service();
        let err = svc
            .trigger_manual(ManualDeployRequest {
                repository_id: "nope".into(),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { kind: "repository", .. }));
        assert!(svc.list_deployments().unwrap().is_empty());
    }

    #[test]
    fn manual_trigger_inherits_repository_settings() {
        let svc = service();
        let repo = svc.create_repository(new_repo("billing")).unwrap();
        let d = svc
            .trigger_manual(ManualDeployRequest {
                repository_id: repo.id.clone(),
                commit_hash: Some("abc123".into()),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(d.branch, "main");
        assert_eq!(d.environment, "staging");
        assert_eq!(d.triggered_by, "manual");
        assert!(svc.get_repository(&repo.id).unwrap().last_deployed.is_some());
    }

    #[test]
    fn manual_trigger_racing_repository_delete_is_all_or_nothing() {
        for _ in 0..20 {
            let svc = service();
            let repo = svc.create_repository(new_repo("racy")).unwrap();

            let triggered = std::thread::scope(|s| {
                let trigger = s.spawn(|| {
                    svc.trigger_manual(ManualDeployRequest {
                        repository_id: repo.id.clone(),
                        ..Default::default()
                    })
                });
                svc.delete_repository(&repo.id).unwrap();
                trigger.join().unwrap()
            });

            let deployments = svc.list_deployments().unwrap();
            match triggered {
                Ok(d) => assert_eq!(deployments, vec![d]),
                Err(e) => {
                    assert!(matches!(e, ServiceError::NotFound { kind: "repository", .. }));
                    assert!(deployments.is_empty());
                }
            }
        }
    }

    #[test]
    fn repository_metrics_record_poll_results() {
        let svc = service();
        let repo = svc.create_repository(new_repo("catalog")).unwrap();
        let polled: Timestamp = "2024-06-01T08:00:00Z".parse().unwrap();

        let updated = svc
            .update_repository_metrics(
                &repo.id,
                RepositoryMetrics {
                    commit_count: 42,
                    last_sync: Some(polled),
                    status: Some("Syncing".into()),
                },
            )
            .unwrap();
        assert_eq!(updated.commit_count, 42);
        assert_eq!(updated.last_sync, polled);
        assert_eq!(updated.status, "Syncing");
        assert!(updated.updated > repo.updated);
        assert_eq!(updated.deployment_count, repo.deployment_count);

        let again = svc
            .update_repository_metrics(
                &repo.id,
                RepositoryMetrics {
                    commit_count: 43,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(again.status, "Syncing");
        assert_eq!(again.last_sync, again.updated);
    }

    #[test]
    fn repository_metrics_for_missing_or_blank_status_fail() {
        let svc = service();
        assert!(matches!(
            svc.update_repository_metrics("nope", RepositoryMetrics::default()),
            Err(ServiceError::NotFound { kind: "repository", .. })
        ));

        let repo = svc.create_repository(new_repo("blank")).unwrap();
        let blank = RepositoryMetrics {
            status: Some(" ".into()),
            ..Default::default()
        };
        assert!(matches!(
            svc.update_repository_metrics(&repo.id, blank),
            Err(ServiceError::Validation(_))
        ));
    }

    #[test]
    fn webhook_strips_ref_prefix() {
        let svc = service();
        let repo = svc.create_repository(new_repo("web")).unwrap();

        let outcome = svc
            .handle_webhook(push("web", "deadbeef", "refs/heads/release"))
            .unwrap();
        let WebhookOutcome::Triggered(d) = outcome else {
            panic!("expected a deployment");
        };
        assert_eq!(d.repository_id, repo.id);
        assert_eq!(d.commit_hash, "deadbeef");
        assert_eq!(d.branch, "release");
        assert_eq!(d.triggered_by, "webhook");
        assert_eq!(d.author, "dev");
        assert_eq!(d.description, "Webhook triggered deployment for web");
    }

    #[test]
    fn webhook_defaults_missing_fields() {
        let svc = service();
        svc.create_repository(new_repo("unknown")).unwrap();

        let outcome = svc.handle_webhook(WebhookPayload::default()).unwrap();
        let WebhookOutcome::Triggered(d) = outcome else {
            panic!("expected a deployment");
        };
        assert_eq!(d.commit_hash, "unknown");
        assert_eq!(d.branch, "main");
    }

    #[test]
    fn webhook_without_repository_match() {
        let svc = service();
        let outcome = svc
            .handle_webhook(push("ghost", "c0ffee", "refs/heads/main"))
            .unwrap();
        assert_eq!(outcome, WebhookOutcome::NoMatchingRepository("ghost".into()));
        assert!(svc.list_deployments().unwrap().is_empty());
    }

    #[test]
    fn history_filters_and_keeps_last_n() {
        let svc = service();
        let a = svc.create_repository(new_repo("a")).unwrap();
        let b = svc.create_repository(new_repo("b")).unwrap();
        let mut ids = Vec::new();
        for _ in 0..4 {
            let d = svc
                .trigger_manual(ManualDeployRequest {
                    repository_id: a.id.clone(),
                    ..Default::default()
                })
                .unwrap();
            ids.push(d.id);
        }
        svc.trigger_manual(ManualDeployRequest {
            repository_id: b.id.clone(),
            ..Default::default()
        })
        .unwrap();

        let filter = HistoryFilter {
            repository_id: Some(a.id.clone()),
            limit: Some(2),
            ..Default::default()
        };
        let got: Vec<_> = svc.history(&filter).unwrap().into_iter().map(|d| d.id).collect();
        assert_eq!(got, ids[2..].to_vec());

        let all = HistoryFilter {
            limit: Some(0),
            ..Default::default()
        };
        assert_eq!(svc.history(&all).unwrap().len(), 5);

        let future = HistoryFilter {
            start_date: Some("2999-01-01".into()),
            ..Default::default()
        };
        assert!(svc.history(&future).unwrap().is_empty());
    }

    #[test]
    fn metrics_summarise_collections() {
        let svc = service();
        let repo = svc.create_repository(new_repo("m")).unwrap();
        let mut ids = Vec::new();
        for _ in 0..4 {
            let d = svc
                .trigger_manual(ManualDeployRequest {
                    repository_id: repo.id.clone(),
                    ..Default::default()
                })
                .unwrap();
            ids.push(d.id);
        }
        svc.update_status(&ids[0], "Success", Some(30)).unwrap();
        svc.update_status(&ids[1], "Success", Some(90)).unwrap();
        svc.update_status(&ids[2], "Failed", None).unwrap();

        let m = svc.metrics().unwrap();
        assert_eq!(m.total_repositories, 1);
        assert_eq!(m.active_repositories, 1);
        assert_eq!(m.auto_deploy_repositories, 1);
        assert_eq!(m.total_deployments, 4);
        assert_eq!(m.deployments_by_status["Success"], 2);
        assert_eq!(m.deployments_by_status["Pending"], 1);
        assert_eq!(m.success_rate, 50.0);
        assert_eq!(m.average_duration, Some(60.0));
    }

    #[test]
    fn deleting_a_repository_keeps_its_deployments() {
        let svc = service();
        let repo = svc.create_repository(new_repo("old")).unwrap();
        svc.trigger_manual(ManualDeployRequest {
            repository_id: repo.id.clone(),
            ..Default::default()
        })
        .unwrap();
        svc.delete_repository(&repo.id).unwrap();

        assert_eq!(svc.deployments_for_repository(&repo.id).unwrap().len(), 1);
        assert!(svc.delete_repository(&repo.id).is_err());
    }
}
