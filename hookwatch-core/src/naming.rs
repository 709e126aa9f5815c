//! Deterministic display names for session ids
//!
//! A session id is opaque and long; the dashboard shows a short name instead.
//! The name is a pure function of the id so hook scripts (which never see the
//! database) and the server always agree without storing a mapping.
//!
//! ## Scheme v1
//!
//! 1. SHA-256 of the UTF-8 session id.
//! 2. First four digest bytes as a big-endian `u32`.
//! 3. That value modulo the number of names, indexing [`NameScheme::V1`]'s list.
//!
//! A shell producer reproduces it with:
//!
//! ```text
//! hex=$(printf %s "$SESSION_ID" | sha256sum | cut -c1-8)
//! index=$(( 16#$hex % 48 ))
//! ```
//!
//! Different ids may share a name; that is expected.

use sha2::{Digest, Sha256};

/// A versioned naming scheme: the hash algorithm is fixed per version and the
/// list is ordered, so any change must bump `version`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NameScheme {
    pub version: u32,
    pub names: &'static [&'static str],
}

const V1_NAMES: &[&str] = &[
    "Aurora", "Basil", "Cedar", "Dahlia", "Ember", "Fern", "Garnet", "Hazel",
    "Indigo", "Juniper", "Kestrel", "Lark", "Maple", "Nova", "Onyx", "Pebble",
    "Quill", "Raven", "Sage", "Thistle", "Umber", "Vesper", "Willow", "Yarrow",
    "Zephyr", "Acorn", "Bramble", "Cobalt", "Drift", "Echo", "Flint", "Glimmer",
    "Harbor", "Iris", "Jasper", "Kite", "Lumen", "Moss", "Nimbus", "Opal",
    "Pine", "Quartz", "Ripple", "Spruce", "Tide", "Upland", "Vale", "Wren",
];

impl NameScheme {
    /// Current scheme shared with the hook producers
    pub const V1: NameScheme = NameScheme {
        version: 1,
        names: V1_NAMES,
    };

    /// Index into `names` for a session id
    pub fn index(&self, session_id: &str) -> usize {
        let digest = Sha256::digest(session_id.as_bytes());
        let prefix = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
        prefix as usize % self.names.len()
    }

    /// Display name for a session id; empty ids map to the first name
    pub fn name(&self, session_id: &str) -> &'static str {
        if session_id.is_empty() {
            return self.names[0];
        }
        self.names[self.index(session_id)]
    }

    /// Hex prefix a producer script hashes on, handy when debugging drift
    pub fn hash_prefix(session_id: &str) -> String {
        let digest = Sha256::digest(session_id.as_bytes());
        hex::encode(&digest[..4])
    }
}

/// Display name for a session id under the current scheme
pub fn session_name(session_id: &str) -> &'static str {
    NameScheme::V1.name(session_id)
}
