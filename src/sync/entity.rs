//! Generic create-or-update reconciliation
//!
//! Every source row becomes a fresh entity. The identity index decides
//! whether it already exists remotely, in which case only the Oid is carried
//! forward. New entities are created in one call, get their server Oid by
//! position, and then everything goes out in a single update call, which is
//! the only write that persists attribute values.

use std::collections::HashSet;

use serde::Serialize;

use super::context::TrackedIndex;
use super::index::IdentityIndex;
use crate::error::{BridgeError, Result};
use crate::remote::EntityEndpoint;
use crate::types::{EntityKind, Session, SourceRow, SyncEntity};

/// Entities split by whether the workforce service already knows them
///
/// Each entity travels with a payload `P` (the photo for employees, `()`
/// otherwise) so that side records keep the same ordering.
#[derive(Debug)]
pub struct Partition<T, P> {
    pub existing: Vec<(T, P)>,
    pub fresh: Vec<(T, P)>,
    /// Entities dropped for an empty business key
    pub skipped_empty: usize,
    /// Entities dropped because an earlier one in the batch had the same key
    pub skipped_duplicate: usize,
}

impl<T, P> Partition<T, P> {
    pub fn len(&self) -> usize {
        self.existing.len() + self.fresh.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Split staged entities into existing and new, keeping input order
pub fn partition<T, P, I>(index: &IdentityIndex<T>, staged: I) -> Partition<T, P>
where
    T: SyncEntity,
    I: IntoIterator<Item = (T, P)>,
{
    let mut result = Partition {
        existing: Vec::new(),
        fresh: Vec::new(),
        skipped_empty: 0,
        skipped_duplicate: 0,
    };
    let mut seen = HashSet::new();

    for (mut entity, payload) in staged {
        let key = entity.business_key().to_string();
        if key.is_empty() {
            tracing::debug!(kind = %T::KIND, "Skipping row with empty business key");
            result.skipped_empty += 1;
            continue;
        }
        if !seen.insert(key.clone()) {
            tracing::debug!(kind = %T::KIND, key = %key, "Skipping duplicate business key");
            result.skipped_duplicate += 1;
            continue;
        }

        if let Some(known) = index.find(&key) {
            entity.set_oid(known.oid().clone());
        }
        if entity.oid().is_empty() {
            result.fresh.push((entity, payload));
        } else {
            result.existing.push((entity, payload));
        }
    }

    result
}

/// Create `fresh` remotely and give each entity its server Oid
///
/// Issues exactly one create call, even for zero entities. Created
/// entities are registered in the index.
pub fn materialize<T, P, R>(
    remote: &R,
    session: &Session,
    index: &mut IdentityIndex<T>,
    fresh: Vec<(T, P)>,
) -> Result<Vec<(T, P)>>
where
    T: SyncEntity,
    R: EntityEndpoint<T> + ?Sized,
{
    let created = remote.create(session, fresh.len())?;
    if created.len() != fresh.len() {
        return Err(BridgeError::Remote(format!(
            "requested {} new {} entities, service returned {}",
            fresh.len(),
            T::KIND,
            created.len()
        )));
    }

    let mut materialized = Vec::with_capacity(fresh.len());
    for ((mut entity, payload), blank) in fresh.into_iter().zip(created) {
        if blank.oid().is_empty() {
            return Err(BridgeError::Remote(format!(
                "service created a {} without an oid",
                T::KIND
            )));
        }
        entity.set_oid(blank.oid().clone());
        index.add_if_not_exists(entity.clone());
        materialized.push((entity, payload));
    }
    Ok(materialized)
}

/// Counts reported by one reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncOutcome {
    pub kind: EntityKind,
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
}

impl SyncOutcome {
    pub fn empty(kind: EntityKind) -> Self {
        Self {
            kind,
            created: 0,
            updated: 0,
            skipped: 0,
        }
    }

    /// Add the counts of another batch of the same kind
    pub fn absorb(&mut self, other: SyncOutcome) {
        self.created += other.created;
        self.updated += other.updated;
        self.skipped += other.skipped;
    }
}

/// Reconciles departments, posts and registration points
pub struct EntitySyncer<'a, R: ?Sized> {
    remote: &'a R,
    session: &'a Session,
}

impl<'a, R: ?Sized> EntitySyncer<'a, R> {
    pub fn new(remote: &'a R, session: &'a Session) -> Self {
        Self { remote, session }
    }

    /// Reconcile `rows` against the index and write them to the service
    ///
    /// The index kind is marked imported once the update succeeded.
    pub fn sync<Row>(
        &self,
        tracked: &mut TrackedIndex<Row::Entity>,
        rows: &[Row],
    ) -> Result<SyncOutcome>
    where
        Row: SourceRow,
        R: EntityEndpoint<Row::Entity>,
    {
        let kind = <Row::Entity as SyncEntity>::KIND;
        let staged = rows.iter().map(|row| (row.to_entity(), ()));
        let split = partition(&tracked.index, staged);
        let skipped = split.skipped_empty + split.skipped_duplicate;
        let existing = split.existing.len();

        let created = materialize(self.remote, self.session, &mut tracked.index, split.fresh)?;
        let created_count = created.len();

        let batch: Vec<Row::Entity> = split
            .existing
            .into_iter()
            .chain(created)
            .map(|(entity, ())| entity)
            .collect();
        self.remote.update(self.session, &batch)?;
        tracked.imported = true;

        tracing::info!(
            kind = %kind,
            existing,
            created = created_count,
            skipped,
            "Reconciled {} entities",
            kind
        );

        Ok(SyncOutcome {
            kind,
            created: created_count,
            updated: batch.len(),
            skipped,
        })
    }
}
