//! SHA-256 hex digests used for workflow provenance.

use sha2::{Digest, Sha256};

/// Compute a SHA-256 hex digest of the given bytes.
pub fn sha256_hex(data: &[u8]) -> String {
    let hash = Sha256::digest(data);
    format!("{hash:x}")
}

/// Hash a submission payload.
///
/// `serde_json` without `preserve_order` keeps object keys sorted, so the
/// compact form is canonical for a given graph.
pub fn workflow_hash(payload: &serde_json::Value) -> String {
    sha256_hex(payload.to_string().as_bytes())
}
