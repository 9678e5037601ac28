//! Node identifier scheme (§3.3).
//!
//! Real nodes get a 12-character, uniformly random, URL-safe token. Ghost
//! nodes get a deterministic token derived from the dangling link's title,
//! so the same title always resolves to the same ghost id no matter how
//! many times it's encountered.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::{distributions::Alphanumeric, Rng};
use sha2::{Digest, Sha256};

const ID_LEN: usize = 12;
pub const GHOST_PREFIX: &str = "ghost_";

/// Generate a fresh random 12-character identifier.
pub fn generate_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ID_LEN)
        .map(char::from)
        .collect()
}

/// Validate that `candidate` looks like a well-formed identifier: exactly
/// 12 characters drawn from the URL-safe alphabet `A-Za-z0-9_-`.
pub fn is_valid_id(candidate: &str) -> bool {
    candidate.chars().count() == ID_LEN
        && candidate
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Derive the deterministic ghost id for a dangling link's title.
///
/// `ghost_` followed by the first 12 URL-safe-base64 characters of
/// `SHA-256(lowercase(trim(title)))`. Case- and whitespace-insensitive by
/// construction, so `"My Note"` and `"  my note  "` collide to the same id.
pub fn ghost_id_for_title(title: &str) -> String {
    let normalized = title.trim().to_lowercase();
    let digest = Sha256::digest(normalized.as_bytes());
    let encoded = URL_SAFE_NO_PAD.encode(digest);
    format!("{GHOST_PREFIX}{}", &encoded[..ID_LEN])
}

pub fn is_ghost_id(id: &str) -> bool {
    id.starts_with(GHOST_PREFIX)
}
