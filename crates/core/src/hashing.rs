//! Shared SHA-256 hex digest utility.
//!
//! Used for asset checksums and content-addressed blob names so the same
//! computation is not duplicated across crates.

use sha2::{Digest, Sha256};

/// Compute a SHA-256 hex digest of the given bytes.
pub fn sha256_hex(data: &[u8]) -> String {
    let hash = Sha256::digest(data);
    format!("{hash:x}")
}
