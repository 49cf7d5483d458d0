use sha2::{Digest, Sha256};

/// Integrity checksums for durable state files.
///
/// The checkpoint is advisory: if it was truncated or edited by hand, the
/// checksum lets the loader notice and fall back to re-verifying instead of
/// trusting a partial key set.
///
/// - Uses SHA-256 over the newline-joined, sorted key list
/// - Stored hex-encoded alongside the keys
/// - Validated on load; a mismatch discards the file contents

/// Computes the SHA-256 checksum (hex) of a key set.
///
/// Keys must already be in their canonical (sorted) order.
pub fn checksum_keys<'a, I>(keys: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut hasher = Sha256::new();
    for (i, key) in keys.into_iter().enumerate() {
        if i > 0 {
            hasher.update(b"\n");
        }
        hasher.update(key.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Returns true if `expected` matches the checksum of `keys`.
pub fn verify_keys<'a, I>(keys: I, expected: &str) -> bool
where
    I: IntoIterator<Item = &'a str>,
{
    let computed = checksum_keys(keys);
    if computed != expected {
        tracing::warn!(
            "Checksum mismatch: expected {}, got {}",
            expected,
            computed
        );
        return false;
    }
    true
}
