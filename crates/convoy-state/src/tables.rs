//! Collection names.
//!
//! Each name is the file stem for the JSON backend and the table name for
//! the redb backend.

pub const APPLICATIONS: &str = "applications";

pub const DEPLOYMENTS: &str = "deployments";

pub const GITOPS_REPOSITORIES: &str = "gitops_repositories";

pub const GITOPS_DEPLOYMENTS: &str = "gitops_deployments";

pub const CLUSTERS: &str = "clusters";

/// Global append-only log collection.
pub const LOGS: &str = "logs";
