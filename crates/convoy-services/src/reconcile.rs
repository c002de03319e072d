//! Recomputation of the derived `deployment_count` fields.
//!
//! Each job counts the source collection from a snapshot and rewrites the
//! owning collection in one step. Deployments created between the snapshot
//! and the write are picked up by the next run; counts are only ever
//! eventually consistent.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use convoy_state::{Change, Record, RecordStore};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::clusters::ClusterService;
use crate::deployments::DeploymentService;
use crate::error::ServiceResult;
use crate::gitops::GitOpsService;
use crate::support::Touch;

/// Result of one reconciliation job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub job: String,
    /// Records in the owning collection.
    pub examined: usize,
    /// Records whose count was rewritten.
    pub changed: usize,
    /// Live count per record id.
    pub counts: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositorySync {
    pub id: String,
    pub name: String,
    pub stored: u64,
    pub live: u64,
    pub in_sync: bool,
}

/// Read-only comparison of stored and live repository counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub repositories: Vec<RepositorySync>,
    /// Sum of the stored repository counts.
    pub gitops_total: u64,
    pub gitops_deployments: u64,
    pub main_deployments: u64,
    /// Every repository's stored count equals its live count.
    pub in_sync: bool,
    /// The stored GitOps total equals the number of main deployments.
    pub totals_match: bool,
}

#[derive(Clone)]
pub struct Reconciler {
    clusters: ClusterService,
    deployments: DeploymentService,
    gitops: GitOpsService,
}

impl Reconciler {
    pub fn new(
        clusters: ClusterService,
        deployments: DeploymentService,
        gitops: GitOpsService,
    ) -> Self {
        Self {
            clusters,
            deployments,
            gitops,
        }
    }

    /// Set every cluster's count to the number of deployments on it.
    pub fn reconcile_clusters(&self) -> ServiceResult<ReconcileReport> {
        let mut live: HashMap<String, u64> = HashMap::new();
        for d in self.deployments.list()? {
            if let Some(cluster_id) = d.cluster_id {
                *live.entry(cluster_id).or_default() += 1;
            }
        }
        recount("clusters", self.clusters.store(), &live, |c| {
            &mut c.deployment_count
        })
    }

    /// Set every repository's count to the number of GitOps deployments
    /// referencing it.
    pub fn reconcile_repositories(&self) -> ServiceResult<ReconcileReport> {
        let live = gitops_counts(&self.gitops)?;
        recount("repositories", self.gitops.repository_store(), &live, |r| {
            &mut r.deployment_count
        })
    }

    pub fn run_once(&self) -> ServiceResult<Vec<ReconcileReport>> {
        Ok(vec![self.reconcile_clusters()?, self.reconcile_repositories()?])
    }

    pub fn sync_status(&self) -> ServiceResult<SyncStatus> {
        let live = gitops_counts(&self.gitops)?;
        let repositories: Vec<RepositorySync> = self
            .gitops
            .list_repositories()?
            .into_iter()
            .map(|repo| {
                let live = live.get(&repo.id).copied().unwrap_or(0);
                RepositorySync {
                    in_sync: repo.deployment_count == live,
                    stored: repo.deployment_count,
                    live,
                    id: repo.id,
                    name: repo.name,
                }
            })
            .collect();
        let gitops_total = repositories.iter().map(|r| r.stored).sum();
        let main_deployments = self.deployments.list()?.len() as u64;
        Ok(SyncStatus {
            in_sync: repositories.iter().all(|r| r.in_sync),
            gitops_deployments: live.values().sum(),
            totals_match: gitops_total == main_deployments,
            repositories,
            gitops_total,
            main_deployments,
        })
    }

    /// Reconcile every `interval` until `shutdown` changes.
    pub async fn run(&self, interval: Duration, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        info!(interval_secs = interval.as_secs(), "reconciler started");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    if let Err(e) = self.reconcile_clusters() {
                        warn!(error = %e, "cluster reconciliation failed");
                    }
                    if let Err(e) = self.reconcile_repositories() {
                        warn!(error = %e, "repository reconciliation failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("reconciler shutting down");
                    break;
                }
            }
        }
    }
}

fn gitops_counts(gitops: &GitOpsService) -> ServiceResult<HashMap<String, u64>> {
    let mut live: HashMap<String, u64> = HashMap::new();
    for d in gitops.list_deployments()? {
        *live.entry(d.repository_id).or_default() += 1;
    }
    Ok(live)
}

/// Rewrite the count on records whose stored value differs from `live`.
/// Nothing is written when every count already matches.
fn recount<T>(
    job: &str,
    store: &RecordStore<T>,
    live: &HashMap<String, u64>,
    count: fn(&mut T) -> &mut u64,
) -> ServiceResult<ReconcileReport>
where
    T: Record + Touch,
{
    let (report, changes) = store.transact(|all| {
        let mut report = ReconcileReport {
            job: job.to_string(),
            examined: all.len(),
            changed: 0,
            counts: BTreeMap::new(),
        };
        let mut changes = Vec::new();
        for record in all.iter_mut() {
            let id = record.id().to_string();
            let want = live.get(&id).copied().unwrap_or(0);
            let stored = count(record);
            if *stored != want {
                changes.push((id.clone(), *stored, want));
                *stored = want;
                record.touch();
                report.changed += 1;
            }
            report.counts.insert(id, want);
        }
        if changes.is_empty() {
            Change::Discard((report, changes))
        } else {
            Change::Commit((report, changes))
        }
    })?;
    for (id, from, to) in changes {
        info!(%job, %id, from, to, "deployment count reconciled");
    }
    Ok(report)
}
