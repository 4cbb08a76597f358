//! Deterministic alert identity.
//!
//! Fingerprint is a pure function of `alert_name` and the unordered set of
//! label pairs; permuting label insertion order must not change the result.

use std::collections::HashMap;

use sha2::{Digest, Sha256};

/// Compute the canonical SHA-256 fingerprint for an alert name and its
/// labels. Labels are sorted by byte-wise ascending key order before being
/// folded into the canonical string, so iteration order of the input map
/// never affects the result.
#[must_use]
pub fn compute(alert_name: &str, labels: &HashMap<String, String>) -> String {
    let mut pairs: Vec<(&str, &str)> = labels
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    pairs.sort_unstable_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));

    let mut canonical = String::with_capacity(alert_name.len() + pairs.len() * 16 + 1);
    canonical.push_str(alert_name);
    canonical.push('|');
    for (k, v) in pairs {
        canonical.push_str(k);
        canonical.push('=');
        canonical.push_str(v);
        canonical.push('|');
    }

    let digest = Sha256::digest(canonical.as_bytes());
    hex::encode(digest)
}
