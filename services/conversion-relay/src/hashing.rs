use sha2::{Digest, Sha256};

/// SHA-256 hex digest of the trimmed, lower-cased value, the normal form the
/// Conversions API matches on. Blank input yields `None`.
pub fn hash_pii(value: Option<&str>) -> Option<String> {
    let normalized = value?.trim().to_lowercase();
    if normalized.is_empty() {
        return None;
    }
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    Some(format!("{:x}", hasher.finalize()))
}
