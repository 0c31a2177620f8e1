//! Per-run state threaded through the sync steps

use chrono::{DateTime, Utc};

use super::index::IdentityIndex;
use crate::config::SyncConfig;
use crate::error::Result;
use crate::remote::{list_all, EntityEndpoint};
use crate::types::{Department, Employee, Post, RegistrationPoint, Session, SyncEntity};

/// Index of one entity kind plus whether its step ran in this run
#[derive(Debug, Clone)]
pub struct TrackedIndex<T> {
    pub index: IdentityIndex<T>,
    /// Set once the kind was reconciled; later steps trust the index as is
    pub imported: bool,
    reloaded: bool,
}

impl<T> Default for TrackedIndex<T> {
    fn default() -> Self {
        Self {
            index: IdentityIndex::default(),
            imported: false,
            reloaded: false,
        }
    }
}

impl<T: SyncEntity> TrackedIndex<T> {
    /// Unconditionally rebuild the index from the workforce service
    pub fn reload<R>(&mut self, remote: &R, session: &Session, page_size: usize) -> Result<()>
    where
        R: EntityEndpoint<T> + ?Sized,
    {
        let items = list_all::<T, R>(remote, session, page_size)?;
        let fetched = items.len();
        self.index.reload(items);
        self.reloaded = true;
        tracing::debug!(
            kind = %T::KIND,
            fetched,
            cached = self.index.len(),
            "Reloaded identity index"
        );
        Ok(())
    }

    /// Reload only when neither this run's sync step nor an earlier reload
    /// populated the index
    pub fn ensure_loaded<R>(
        &mut self,
        remote: &R,
        session: &Session,
        page_size: usize,
    ) -> Result<()>
    where
        R: EntityEndpoint<T> + ?Sized,
    {
        if self.imported || self.reloaded {
            return Ok(());
        }
        self.reload(remote, session, page_size)
    }
}

/// Everything one sync run owns: session, configuration and identity indexes
///
/// Created at logon and dropped at the end of the run; nothing survives
/// between runs.
#[derive(Debug)]
pub struct RunContext {
    pub session: Session,
    pub config: SyncConfig,
    pub started_at: DateTime<Utc>,
    pub departments: TrackedIndex<Department>,
    pub posts: TrackedIndex<Post>,
    pub employees: TrackedIndex<Employee>,
    pub registration_points: TrackedIndex<RegistrationPoint>,
}

impl RunContext {
    pub fn new(session: Session, config: SyncConfig, started_at: DateTime<Utc>) -> Self {
        Self {
            session,
            config,
            started_at,
            departments: TrackedIndex::default(),
            posts: TrackedIndex::default(),
            employees: TrackedIndex::default(),
            registration_points: TrackedIndex::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{MemoryService, RemoteCall, WorkforceService};
    use crate::types::EntityKind;

    #[test]
    fn test_ensure_loaded_reloads_once() {
        let service = MemoryService::new();
        let session = service.logon("sync", "pw").unwrap();
        let mut tracked: TrackedIndex<Post> = TrackedIndex::default();

        tracked.ensure_loaded(&service, &session, 100).unwrap();
        tracked.ensure_loaded(&service, &session, 100).unwrap();

        let lists = service
            .calls()
            .into_iter()
            .filter(|call| matches!(call, RemoteCall::List { kind: EntityKind::Post, .. }))
            .count();
        assert_eq!(lists, 1);
    }

    #[test]
    fn test_ensure_loaded_skips_imported_kind() {
        let service = MemoryService::new();
        let session = service.logon("sync", "pw").unwrap();
        let mut tracked: TrackedIndex<Department> = TrackedIndex::default();
        tracked.imported = true;

        tracked.ensure_loaded(&service, &session, 100).unwrap();

        assert_eq!(service.calls(), vec![RemoteCall::Logon]);
    }
}
