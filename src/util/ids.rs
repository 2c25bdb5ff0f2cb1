//! Room identifier helpers

use rand::RngCore;

/// Longest accepted room id
pub const MAX_ROOM_ID_LEN: usize = 32;

/// Fresh 6-hex-char room id
pub fn random_room_id() -> String {
    let mut bytes = [0u8; 3];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Lower-case, keep `[a-z0-9_-]`, cap the length. An id with nothing left
/// after filtering is replaced by a random one.
pub fn sanitize_room_id(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .to_ascii_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .take(MAX_ROOM_ID_LEN)
        .collect();
    if cleaned.is_empty() {
        random_room_id()
    } else {
        cleaned
    }
}

/// Random seed for a new engine
pub fn engine_seed() -> u64 {
    rand::thread_rng().next_u64()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize_room_id(" Lab-3_B "), "lab-3_b");
        assert_eq!(sanitize_room_id("a b!c"), "abc");
        assert_eq!(sanitize_room_id(&"x".repeat(50)).len(), MAX_ROOM_ID_LEN);
    }

    #[test]
    fn test_empty_gets_random() {
        let id = sanitize_room_id("!!!");
        assert_eq!(id.len(), 6);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
