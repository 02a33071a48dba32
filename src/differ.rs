//! # Differ: Per-Parent Reconciliation Plans
//!
//! Given the incoming children of one parent and the identifiers currently
//! persisted under it, computes what to upsert and what to delete. The plan is
//! pure data; the synchronizer in [`crate::db`] executes it level by level.
//!
//! ## Rules
//!
//! - Every `Existing`-classified incoming identifier joins the active set.
//! - Delete set = persisted identifiers not in the active set, in persisted order.
//! - Upserts keep incoming order. When the same identifier appears more than
//!   once, the last occurrence wins and earlier occurrences are dropped along
//!   with their children. Positions are assigned over the deduplicated list.
//! - An empty incoming list deletes every persisted child.

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use crate::identity::NodeIdentity;

/// Anything that can appear as a child in a structural payload.
pub trait Identified {
    fn node_identity(&self) -> NodeIdentity;
}

/// One incoming child scheduled for an upsert.
#[derive(Debug)]
pub struct PlannedChild<'a, T> {
    pub node: &'a T,
    /// Identifier to write under; `None` means the server mints one.
    pub id: Option<Uuid>,
    /// Zero-based position among the surviving siblings.
    pub position: usize,
    /// True if the client asserted this node already exists under the parent.
    pub asserted: bool,
}

#[derive(Debug)]
pub struct ChildPlan<'a, T> {
    pub upserts: Vec<PlannedChild<'a, T>>,
    pub deletes: Vec<Uuid>,
    /// Asserted identifiers that are not persisted under this parent.
    pub missing_asserted: Vec<Uuid>,
    /// Number of incoming entries dropped as earlier duplicates.
    pub superseded: usize,
}

impl<T> ChildPlan<'_, T> {
    pub fn active_ids(&self) -> HashSet<Uuid> {
        self.upserts.iter().filter_map(|c| c.id).collect()
    }

    pub fn inserts(&self) -> usize {
        self.upserts.iter().filter(|c| c.id.is_none()).count()
    }
}

/// Build the reconciliation plan for one parent.
pub fn plan_children<'a, T: Identified>(incoming: &'a [T], persisted: &[Uuid]) -> ChildPlan<'a, T> {
    let mut last_index: HashMap<Uuid, usize> = HashMap::new();
    for (i, node) in incoming.iter().enumerate() {
        if let Some(id) = node.node_identity().id() {
            last_index.insert(id, i);
        }
    }

    let mut upserts = Vec::with_capacity(incoming.len());
    let mut superseded = 0;
    for (i, node) in incoming.iter().enumerate() {
        let identity = node.node_identity();
        let id = identity.id();
        if let Some(id) = id {
            if last_index.get(&id) != Some(&i) {
                superseded += 1;
                continue;
            }
        }
        upserts.push(PlannedChild {
            node,
            id,
            position: upserts.len(),
            asserted: identity.asserted,
        });
    }

    let active: HashSet<Uuid> = last_index.keys().copied().collect();
    let persisted_set: HashSet<Uuid> = persisted.iter().copied().collect();
    let deletes = persisted
        .iter()
        .filter(|id| !active.contains(id))
        .copied()
        .collect();
    let missing_asserted = upserts
        .iter()
        .filter(|c| c.asserted)
        .filter_map(|c| c.id)
        .filter(|id| !persisted_set.contains(id))
        .collect();

    ChildPlan {
        upserts,
        deletes,
        missing_asserted,
        superseded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{resolve, NodeIdentity};

    #[derive(Debug)]
    struct Node {
        identity: NodeIdentity,
        label: &'static str,
    }

    impl Identified for Node {
        fn node_identity(&self) -> NodeIdentity {
            self.identity
        }
    }

    fn existing(id: Uuid, label: &'static str) -> Node {
        Node {
            identity: NodeIdentity::existing(id),
            label,
        }
    }

    fn fresh(label: &'static str) -> Node {
        Node {
            identity: NodeIdentity::new_node(),
            label,
        }
    }

    #[test]
    fn deletes_what_is_absent() {
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let incoming = vec![existing(c, "c"), fresh("new"), existing(a, "a")];
        let plan = plan_children(&incoming, &[a, b, c]);

        assert_eq!(plan.deletes, vec![b]);
        assert_eq!(plan.upserts.len(), 3);
        assert_eq!(plan.active_ids(), [a, c].into_iter().collect());
        assert_eq!(plan.inserts(), 1);
    }

    #[test]
    fn positions_follow_incoming_order() {
        let a = Uuid::new_v4();
        let incoming = vec![fresh("x"), existing(a, "a"), fresh("y")];
        let plan = plan_children(&incoming, &[a]);
        let labels: Vec<_> = plan
            .upserts
            .iter()
            .map(|c| (c.node.label, c.position))
            .collect();
        assert_eq!(labels, vec![("x", 0), ("a", 1), ("y", 2)]);
    }

    #[test]
    fn empty_incoming_deletes_everything() {
        let persisted = vec![Uuid::new_v4(), Uuid::new_v4()];
        let incoming: Vec<Node> = Vec::new();
        let plan = plan_children(&incoming, &persisted);
        assert!(plan.upserts.is_empty());
        assert_eq!(plan.deletes, persisted);
    }

    #[test]
    fn duplicate_identifier_last_occurrence_wins() {
        let a = Uuid::new_v4();
        let incoming = vec![existing(a, "first"), fresh("mid"), existing(a, "last")];
        let plan = plan_children(&incoming, &[a]);

        assert_eq!(plan.superseded, 1);
        assert_eq!(plan.upserts.len(), 2);
        assert_eq!(plan.upserts[0].node.label, "mid");
        assert_eq!(plan.upserts[0].position, 0);
        assert_eq!(plan.upserts[1].node.label, "last");
        assert_eq!(plan.upserts[1].position, 1);
        assert!(plan.deletes.is_empty());
    }

    #[test]
    fn unknown_shape_valid_uuid_is_upserted_not_flagged() {
        let stranger = Uuid::new_v4();
        let incoming = vec![existing(stranger, "s")];
        let plan = plan_children(&incoming, &[]);
        assert_eq!(plan.upserts[0].id, Some(stranger));
        assert!(plan.missing_asserted.is_empty());
    }

    #[test]
    fn asserted_identifier_missing_under_parent_is_reported() {
        let ghost = Uuid::new_v4();
        let node = Node {
            identity: resolve(Some(&ghost.to_string()), Some(false)).unwrap(),
            label: "ghost",
        };
        let incoming = vec![node];
        let plan = plan_children(&incoming, &[Uuid::new_v4()]);
        assert_eq!(plan.missing_asserted, vec![ghost]);
    }

    #[test]
    fn temporary_ids_are_never_active() {
        let incoming = vec![
            Node {
                identity: resolve(Some("v1"), None).unwrap(),
                label: "v1",
            },
            Node {
                identity: resolve(Some("new-1"), None).unwrap(),
                label: "new-1",
            },
        ];
        let persisted = vec![Uuid::new_v4()];
        let plan = plan_children(&incoming, &persisted);
        assert!(plan.active_ids().is_empty());
        assert_eq!(plan.deletes, persisted);
        assert_eq!(plan.inserts(), 2);
    }
}
