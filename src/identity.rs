//! # Identity: Existing vs. New Node Classification
//!
//! Decides whether a client-supplied node identifier denotes a persisted row or
//! a node that still needs a server-minted identifier.
//!
//! ## Shape inference
//!
//! An identifier is `Existing` iff it is a canonical hyphenated UUID
//! (`8-4-4-4-12` hexadecimal groups, any case). Temporary client keys such as
//! `"new-173812"` or `"v1"`, empty strings, braced/URN/simple UUID spellings and
//! anything malformed are `New`. Classification is total: it never fails.
//!
//! ## Explicit contract
//!
//! Payload nodes may additionally carry `isNew`. `isNew: true` forces `New`
//! regardless of the identifier; `isNew: false` asserts the node is persisted
//! under its parent, which the synchronizer verifies inside the transaction.

use serde::Serialize;
use uuid::Uuid;

/// Result of classifying a single identifier string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Identity {
    Existing(Uuid),
    New,
}

impl Identity {
    pub fn id(&self) -> Option<Uuid> {
        match self {
            Identity::Existing(id) => Some(*id),
            Identity::New => None,
        }
    }

    pub fn is_existing(&self) -> bool {
        matches!(self, Identity::Existing(_))
    }
}

/// Identity of a validated payload node.
///
/// `asserted` is set when the client explicitly declared the node as not new;
/// such an identifier must already exist under the node's parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeIdentity {
    pub identity: Identity,
    pub asserted: bool,
}

impl NodeIdentity {
    pub fn new_node() -> Self {
        NodeIdentity {
            identity: Identity::New,
            asserted: false,
        }
    }

    pub fn existing(id: Uuid) -> Self {
        NodeIdentity {
            identity: Identity::Existing(id),
            asserted: false,
        }
    }

    pub fn id(&self) -> Option<Uuid> {
        self.identity.id()
    }
}

/// Returns true if `candidate` is a canonical hyphenated UUID.
pub fn is_canonical_uuid(candidate: &str) -> bool {
    let bytes = candidate.as_bytes();
    if bytes.len() != 36 {
        return false;
    }
    bytes.iter().enumerate().all(|(i, b)| match i {
        8 | 13 | 18 | 23 => *b == b'-',
        _ => b.is_ascii_hexdigit(),
    })
}

/// Classify a raw identifier by its shape.
pub fn classify(candidate: &str) -> Identity {
    if !is_canonical_uuid(candidate) {
        return Identity::New;
    }
    match Uuid::parse_str(candidate) {
        Ok(id) => Identity::Existing(id),
        Err(_) => Identity::New,
    }
}

/// Resolve a node's identity from its raw identifier and optional `isNew` flag.
///
/// Returns an error message only for the contradictory case `isNew: false`
/// without a canonical UUID.
pub fn resolve(raw_id: Option<&str>, is_new: Option<bool>) -> Result<NodeIdentity, String> {
    let shape = raw_id.map(classify).unwrap_or(Identity::New);
    match (is_new, shape) {
        (Some(true), _) => Ok(NodeIdentity::new_node()),
        (Some(false), Identity::Existing(id)) => Ok(NodeIdentity {
            identity: Identity::Existing(id),
            asserted: true,
        }),
        (Some(false), Identity::New) => {
            Err("must be a canonical UUID when isNew is false".to_string())
        }
        (None, identity) => Ok(NodeIdentity {
            identity,
            asserted: false,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_accepts_canonical_uuid() {
        let id = "a1b2c3d4-e5f6-7890-abcd-ef1234567890";
        assert_eq!(
            classify(id),
            Identity::Existing(Uuid::parse_str(id).unwrap())
        );
    }

    #[test]
    fn classify_is_case_insensitive() {
        let upper = "A1B2C3D4-E5F6-7890-ABCD-EF1234567890";
        let lower = upper.to_lowercase();
        assert_eq!(classify(upper), classify(&lower));
        assert!(classify(upper).is_existing());
    }

    #[test]
    fn classify_rejects_temporary_client_keys() {
        for candidate in ["new-173812", "v1", "", "new-1", "temp", "0"] {
            assert_eq!(classify(candidate), Identity::New, "{:?}", candidate);
        }
    }

    #[test]
    fn classify_rejects_non_canonical_uuid_spellings() {
        let cases = [
            "a1b2c3d4e5f67890abcdef1234567890",
            "{a1b2c3d4-e5f6-7890-abcd-ef1234567890}",
            "urn:uuid:a1b2c3d4-e5f6-7890-abcd-ef1234567890",
            " a1b2c3d4-e5f6-7890-abcd-ef1234567890",
            "a1b2c3d4-e5f6-7890-abcd-ef123456789g",
            "a1b2c3d4-e5f6-7890-abcd_ef1234567890",
            "a1b2c3d4-e5f6-7890-abcd-ef12345678901",
        ];
        for candidate in cases {
            assert_eq!(classify(candidate), Identity::New, "{:?}", candidate);
        }
    }

    #[test]
    fn resolve_without_flag_uses_shape() {
        let id = Uuid::new_v4().to_string();
        let resolved = resolve(Some(&id), None).unwrap();
        assert!(resolved.identity.is_existing());
        assert!(!resolved.asserted);
        assert_eq!(resolve(Some("v1"), None).unwrap(), NodeIdentity::new_node());
        assert_eq!(resolve(None, None).unwrap(), NodeIdentity::new_node());
    }

    #[test]
    fn resolve_is_new_true_discards_client_uuid() {
        let id = Uuid::new_v4().to_string();
        assert_eq!(
            resolve(Some(&id), Some(true)).unwrap(),
            NodeIdentity::new_node()
        );
    }

    #[test]
    fn resolve_is_new_false_asserts_existing() {
        let id = Uuid::new_v4();
        let resolved = resolve(Some(&id.to_string()), Some(false)).unwrap();
        assert_eq!(resolved.identity, Identity::Existing(id));
        assert!(resolved.asserted);
    }

    #[test]
    fn resolve_is_new_false_requires_uuid() {
        assert!(resolve(Some("new-1"), Some(false)).is_err());
        assert!(resolve(None, Some(false)).is_err());
    }
}
