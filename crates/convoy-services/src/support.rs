//! Helpers shared by the entity services: validation and `updated` stamping.

use convoy_core::Timestamp;
use convoy_state::{
    Application, Cluster, Deployment, GitOpsDeployment, Record, RecordStore, Repository,
};

use crate::error::{ServiceError, ServiceResult};

pub(crate) const MAX_REPLICAS: u32 = 1000;

/// Records that carry an `updated` stamp refreshed on every mutation.
pub(crate) trait Touch {
    fn updated_mut(&mut self) -> &mut Timestamp;

    /// Move `updated` strictly forward and return the new value.
    fn touch(&mut self) -> Timestamp {
        let next = Timestamp::now_after(*self.updated_mut());
        *self.updated_mut() = next;
        next
    }
}

macro_rules! impl_touch {
    ($($ty:ty),*) => {
        $(impl Touch for $ty {
            fn updated_mut(&mut self) -> &mut Timestamp {
                &mut self.updated
            }
        })*
    };
}

impl_touch!(Application, Deployment, Repository, GitOpsDeployment, Cluster);

/// Touch the record with `id` and apply `f` to it, or fail with `NotFound`.
pub(crate) fn modify<T, R>(
    store: &RecordStore<T>,
    kind: &'static str,
    id: &str,
    f: impl FnOnce(&mut T, Timestamp) -> R,
) -> ServiceResult<R>
where
    T: Record + Touch,
{
    store
        .update(id, |record| {
            let now = record.touch();
            f(record, now)
        })?
        .ok_or_else(|| ServiceError::not_found(kind, id))
}

pub(crate) fn require(field: &str, value: &str) -> ServiceResult<()> {
    if value.trim().is_empty() {
        return Err(ServiceError::invalid(format!("{field} must not be empty")));
    }
    Ok(())
}

pub(crate) fn require_if_set(field: &str, value: Option<&String>) -> ServiceResult<()> {
    match value {
        Some(v) => require(field, v),
        None => Ok(()),
    }
}

pub(crate) fn check_replicas(replicas: u32) -> ServiceResult<()> {
    if replicas > MAX_REPLICAS {
        return Err(ServiceError::invalid(format!(
            "replicas must be at most {MAX_REPLICAS}, got {replicas}"
        )));
    }
    Ok(())
}

pub(crate) fn check_percentage(field: &str, value: f64) -> ServiceResult<()> {
    if !value.is_finite() || !(0.0..=100.0).contains(&value) {
        return Err(ServiceError::invalid(format!(
            "{field} must be a percentage between 0 and 100, got {value}"
        )));
    }
    Ok(())
}

/// Overwrite `target` with `value` when one was supplied.
pub(crate) fn overlay<T>(target: &mut T, value: Option<T>) {
    if let Some(v) = value {
        *target = v;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_rejects_blank() {
        assert!(require("name", "  ").is_err());
        assert!(require("name", "api").is_ok());
        assert!(require_if_set("name", None).is_ok());
        assert!(require_if_set("name", Some(&String::new())).is_err());
    }

    #[test]
    fn percentages_are_bounded() {
        assert!(check_percentage("cpu_usage", 42.5).is_ok());
        assert!(check_percentage("cpu_usage", 100.1).is_err());
        assert!(check_percentage("cpu_usage", f64::NAN).is_err());
    }

    #[test]
    fn overlay_only_touches_supplied_values() {
        let mut name = "old".to_string();
        overlay(&mut name, None);
        assert_eq!(name, "old");
        overlay(&mut name, Some("new".to_string()));
        assert_eq!(name, "new");
    }
}
