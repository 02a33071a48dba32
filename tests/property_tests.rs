//! Property-based tests for the structure synchronization primitives.
//!
//! These tests use the `proptest` framework to check the invariants the
//! synchronizer relies on across thousands of randomly generated payloads.
//! Example-based unit tests live next to each module; the properties here
//! cover the inputs nobody thinks to write by hand (repeated identifiers,
//! stray whitespace, crowded sort orders).
//!
//! # Prerequisites
//!
//! - No database or network access required.
//! - These tests are purely computational and always run.
//!
//! # How to run
//!
//! ```bash
//! # Run all property tests:
//! cargo test --test property_tests
//!
//! # Run a specific property:
//! cargo test --test property_tests prop_plan_deletes_are_inactive
//!
//! # Increase case count for thorough testing (default is 256):
//! PROPTEST_CASES=10000 cargo test --test property_tests
//! ```
//!
//! # Testing strategy
//!
//! Properties are organized by module:
//! - **Identity module**: shape classification of client identifiers
//! - **Normalize module**: machine name derivation
//! - **Differ module**: delete and upsert sets of a per-parent plan
//! - **Ordering module**: midpoint placement between siblings
//!
//! Each property is named `prop_<function>_<invariant>`.

use std::collections::HashSet;

use ecrf::differ::{plan_children, Identified};
use ecrf::identity::{classify, Identity, NodeIdentity};
use ecrf::normalize::machine_name;
use ecrf::ordering::order_between;
use proptest::prelude::*;
use uuid::Uuid;

// == Identity Module Properties ================================================

proptest! {
    /// Any UUID rendered in canonical hyphenated form is `Existing`, in either case.
    #[test]
    fn prop_classify_canonical_uuid_is_existing(bytes in any::<[u8; 16]>(), upper in any::<bool>()) {
        let id = Uuid::from_bytes(bytes);
        let text = if upper {
            id.hyphenated().to_string().to_uppercase()
        } else {
            id.hyphenated().to_string()
        };
        prop_assert_eq!(classify(&text), Identity::Existing(id));
    }

    /// Temporary client keys never classify as persisted rows.
    #[test]
    fn prop_classify_temporary_key_is_new(suffix in "[0-9]{1,12}") {
        let key = format!("new-{}", suffix);
        prop_assert_eq!(classify(&key), Identity::New);
    }

    /// Simple (unhyphenated) UUID spelling is not canonical.
    #[test]
    fn prop_classify_simple_uuid_is_new(bytes in any::<[u8; 16]>()) {
        let text = Uuid::from_bytes(bytes).simple().to_string();
        prop_assert_eq!(classify(&text), Identity::New);
    }
}

// == Normalize Module Properties ===============================================

proptest! {
    /// Normalizing a machine name again leaves it unchanged.
    #[test]
    fn prop_machine_name_idempotent(label in "[a-zA-Z0-9 \t_-]{0,40}") {
        let once = machine_name(&label);
        prop_assert_eq!(machine_name(&once), once);
    }

    /// Machine names are upper-case and contain no whitespace.
    #[test]
    fn prop_machine_name_has_no_whitespace(label in "[a-zA-Z0-9 \t\n-]{0,40}") {
        let name = machine_name(&label);
        prop_assert!(!name.chars().any(char::is_whitespace));
        prop_assert_eq!(name.to_uppercase(), name.clone());
    }

    /// Labels differing only in surrounding or repeated whitespace collide.
    #[test]
    fn prop_machine_name_ignores_whitespace_runs(
        words in prop::collection::vec("[a-z]{1,6}", 1..5),
        pad in " {1,3}",
    ) {
        let tight = words.join(" ");
        let loose = format!("{}{}{}", pad, words.join(&pad), pad);
        prop_assert_eq!(machine_name(&tight), machine_name(&loose));
    }
}

// == Differ Module Properties ==================================================

#[derive(Debug, Clone)]
struct Node(NodeIdentity);

impl Identified for Node {
    fn node_identity(&self) -> NodeIdentity {
        self.0
    }
}

/// A pool of identifiers shared between the incoming and persisted lists so
/// that overlaps, duplicates and stale rows all occur.
fn id_pool() -> Vec<Uuid> {
    (0u128..8).map(|n| Uuid::from_u128(n + 1)).collect()
}

fn incoming_strategy() -> impl Strategy<Value = Vec<Node>> {
    prop::collection::vec(prop::option::of(0usize..8), 0..12).prop_map(|picks| {
        let pool = id_pool();
        picks
            .into_iter()
            .map(|pick| match pick {
                Some(i) => Node(NodeIdentity::existing(pool[i])),
                None => Node(NodeIdentity::new_node()),
            })
            .collect()
    })
}

fn persisted_strategy() -> impl Strategy<Value = Vec<Uuid>> {
    prop::sample::subsequence(id_pool(), 0..=8)
}

proptest! {
    /// Nothing scheduled for deletion is still active.
    #[test]
    fn prop_plan_deletes_are_inactive(incoming in incoming_strategy(), persisted in persisted_strategy()) {
        let plan = plan_children(&incoming, &persisted);
        let active = plan.active_ids();
        prop_assert!(plan.deletes.iter().all(|id| !active.contains(id)));
    }

    /// Deletes only ever name persisted rows.
    #[test]
    fn prop_plan_deletes_are_persisted(incoming in incoming_strategy(), persisted in persisted_strategy()) {
        let plan = plan_children(&incoming, &persisted);
        prop_assert!(plan.deletes.iter().all(|id| persisted.contains(id)));
    }

    /// Upsert positions are exactly 0..n, one identifier per upsert.
    #[test]
    fn prop_plan_positions_are_dense(incoming in incoming_strategy(), persisted in persisted_strategy()) {
        let plan = plan_children(&incoming, &persisted);
        let positions: Vec<usize> = plan.upserts.iter().map(|c| c.position).collect();
        prop_assert_eq!(positions, (0..plan.upserts.len()).collect::<Vec<_>>());

        let ids: Vec<Uuid> = plan.upserts.iter().filter_map(|c| c.id).collect();
        let unique: HashSet<Uuid> = ids.iter().copied().collect();
        prop_assert_eq!(ids.len(), unique.len());
        prop_assert_eq!(plan.upserts.len() + plan.superseded, incoming.len());
    }

    /// Every persisted row is either kept or deleted, never both.
    #[test]
    fn prop_plan_partitions_persisted(incoming in incoming_strategy(), persisted in persisted_strategy()) {
        let plan = plan_children(&incoming, &persisted);
        let active = plan.active_ids();
        for id in &persisted {
            let deleted = plan.deletes.contains(id);
            prop_assert!(deleted != active.contains(id));
        }
    }
}

// == Ordering Module Properties ================================================

proptest! {
    /// A midpoint lies strictly between its neighbours whenever one is returned.
    #[test]
    fn prop_order_between_is_strictly_between(a in -1.0e6f64..1.0e6, b in -1.0e6f64..1.0e6) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        if let Some(m) = order_between(Some(lo), Some(hi)) {
            prop_assert!(lo < m && m < hi);
        }
    }

    /// Appending and prepending always move past the neighbour.
    #[test]
    fn prop_order_between_open_ends(x in -1.0e6f64..1.0e6) {
        let after = order_between(Some(x), None).unwrap();
        let before = order_between(None, Some(x)).unwrap();
        prop_assert!(after > x);
        prop_assert!(before < x);
    }
}
