//! Content hashes for `ETag` / `If-None-Match`.

use std::io::Cursor;

/// Seed of the 32-bit Murmur3 variant used for entity tags.
const SEED: u32 = 104_729;

/// Quoted lower-case hex Murmur3 hash of `body`, e.g. `"1a2b3c"`.
pub fn compute(body: &[u8]) -> String {
    // Reading from an in-memory cursor cannot fail.
    let hash = murmur3::murmur3_32(&mut Cursor::new(body), SEED).unwrap_or_default();
    format!("\"{hash:x}\"")
}

/// `If-None-Match` must equal the computed tag exactly.
pub fn matches(etag: &str, if_none_match: Option<&str>) -> bool {
    if_none_match.is_some_and(|candidate| candidate.trim() == etag)
}
