//! Property-based tests for attendance-bridge
//!
//! These tests verify invariants that must hold for all inputs:
//! - An identity index never holds two entities under one key
//! - Partitioning accounts for every staged entity exactly once
//! - The event window never starts after the high-water mark
//!
//! Run with: cargo test --test property_tests

use proptest::prelude::*;

// ============================================================================
// IDENTITY INDEX TESTS
// ============================================================================

mod index_tests {
    use super::*;
    use attendance_bridge::sync::IdentityIndex;
    use attendance_bridge::{Department, Oid};
    use std::collections::HashSet;

    fn department(name: &str, oid: usize) -> Department {
        Department {
            oid: Oid::new(format!("d-{}", oid)),
            integration_id: name.to_string(),
            name: name.to_string(),
        }
    }

    proptest! {
        /// Invariant: len equals the number of distinct non-empty keys
        #[test]
        fn one_entry_per_key(names in prop::collection::vec("[a-c]{0,2}", 0..40)) {
            let mut index = IdentityIndex::new();
            index.reload(names.iter().enumerate().map(|(i, n)| department(n, i)));

            let distinct: HashSet<&str> =
                names.iter().map(String::as_str).filter(|n| !n.is_empty()).collect();
            prop_assert_eq!(index.len(), distinct.len());
        }

        /// Invariant: the first entity seen for a key wins
        #[test]
        fn first_insert_wins(names in prop::collection::vec("[a-c]{1,2}", 1..40)) {
            let mut index = IdentityIndex::new();
            index.reload(names.iter().enumerate().map(|(i, n)| department(n, i)));

            for name in &names {
                let first = names.iter().position(|n| n == name).unwrap();
                let found = index.find(name).unwrap();
                prop_assert_eq!(&found.oid, &Oid::new(format!("d-{}", first)));
            }
        }

        /// Invariant: reload discards everything that was cached before
        #[test]
        fn reload_replaces(old in prop::collection::vec("[a-z]{1,3}", 0..20),
                           new in prop::collection::vec("[A-Z]{1,3}", 0..20)) {
            let mut index = IdentityIndex::new();
            index.reload(old.iter().enumerate().map(|(i, n)| department(n, i)));
            index.reload(new.iter().enumerate().map(|(i, n)| department(n, i)));

            for name in &old {
                prop_assert!(index.find(name).is_none());
            }
        }
    }
}

// ============================================================================
// PARTITION TESTS
// ============================================================================

mod partition_tests {
    use super::*;
    use attendance_bridge::sync::{partition, IdentityIndex};
    use attendance_bridge::{Department, Oid};
    use std::collections::HashSet;

    proptest! {
        /// Invariant: every staged entity is existing, fresh or skipped
        #[test]
        fn accounts_for_every_entity(
            known in prop::collection::vec("[a-e]{1}", 0..5),
            staged in prop::collection::vec("[a-h]{0,1}", 0..30),
        ) {
            let mut index = IdentityIndex::new();
            index.reload(known.iter().enumerate().map(|(i, n)| Department {
                oid: Oid::new(format!("d-{}", i)),
                integration_id: n.clone(),
                name: n.clone(),
            }));

            let split = partition(&index, staged.iter().map(|n| (Department::named(n.as_str()), ())));

            prop_assert_eq!(
                split.existing.len() + split.fresh.len() + split.skipped_empty + split.skipped_duplicate,
                staged.len()
            );

            let mut keys = HashSet::new();
            for (entity, ()) in split.existing.iter().chain(split.fresh.iter()) {
                prop_assert!(keys.insert(entity.name.clone()));
            }
            for (entity, ()) in &split.existing {
                prop_assert!(!entity.oid.is_empty());
                prop_assert!(known.contains(&entity.name));
            }
            for (entity, ()) in &split.fresh {
                prop_assert!(entity.oid.is_empty());
                prop_assert!(!known.contains(&entity.name));
            }
        }
    }
}

// ============================================================================
// EVENT WINDOW TESTS
// ============================================================================

mod window_tests {
    use super::*;
    use attendance_bridge::sync::{dedup_key, fetch_start};
    use chrono::{DateTime, Duration, NaiveDate};

    proptest! {
        /// Invariant: the window starts exactly `overlap` before the mark
        #[test]
        fn starts_before_mark(secs in 0i64..4_000_000_000, days in 0i64..60) {
            let mark = DateTime::from_timestamp(secs, 0).unwrap();
            let epoch = NaiveDate::from_ymd_opt(1900, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();

            let start = fetch_start(Some(mark), epoch, Duration::days(days));

            prop_assert!(start <= mark.naive_utc());
            prop_assert_eq!(mark.naive_utc() - start, Duration::days(days));
        }

        /// Invariant: dedup keys are 64 lowercase hex characters
        #[test]
        fn dedup_key_is_hex(source in "\\PC{0,20}", employee in "[0-9]{1,6}",
                            reader in "[0-9]{1,4}", secs in 0i64..4_000_000_000) {
            let at = DateTime::from_timestamp(secs, 0).unwrap().naive_utc();
            let key = dedup_key(&source, &employee, &reader, at);

            prop_assert_eq!(key.len(), 64);
            prop_assert!(key.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
        }
    }
}
