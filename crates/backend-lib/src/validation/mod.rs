// ============================
// crates/backend-lib/src/validation/mod.rs
// ============================
//! Identifier validation: player ids, room codes and failure reasons.

use crate::error::AppError;
use rand::Rng;
use regex::Regex;
use std::sync::LazyLock;

const MIN_PLAYER_ID_LENGTH: usize = 2;
const MAX_PLAYER_ID_LENGTH: usize = 16;
const GENERATED_ROOM_CODE_LENGTH: usize = 6;
const MAX_FAIL_REASON_LENGTH: usize = 32;

/// Alphabet of generated codes, without look-alikes (0/O, 1/I/L).
const ROOM_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

/// Reason recorded when a client fails a room without naming why
pub const DEFAULT_FAIL_REASON: &str = "command_destroyed";

static ROOM_CODE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z0-9]{4,12}$").expect("static regex"));

/// Normalize an untrusted player id: trim, cap to 16 chars, reject short ids
/// and ids carrying control characters.
pub fn normalize_player_id(raw: &str) -> Result<String, AppError> {
    let id: String = raw.trim().chars().take(MAX_PLAYER_ID_LENGTH).collect();
    if id.chars().count() < MIN_PLAYER_ID_LENGTH || id.chars().any(char::is_control) {
        return Err(AppError::InvalidId);
    }
    Ok(id)
}

/// Normalize an untrusted room code: trim and uppercase, then require 4-12
/// ASCII letters or digits.
pub fn normalize_room_code(raw: &str) -> Result<String, AppError> {
    let code = raw.trim().to_ascii_uppercase();
    if !ROOM_CODE_REGEX.is_match(&code) {
        return Err(AppError::InvalidRoomCode);
    }
    Ok(code)
}

pub fn generate_room_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..GENERATED_ROOM_CODE_LENGTH)
        .map(|_| char::from(ROOM_CODE_ALPHABET[rng.random_range(0..ROOM_CODE_ALPHABET.len())]))
        .collect()
}

/// Reduce a client-supplied failure reason to a short machine code.
pub fn normalize_fail_reason(raw: Option<&str>) -> String {
    let reason: String = raw
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .take(MAX_FAIL_REASON_LENGTH)
        .collect();
    if reason.is_empty() {
        DEFAULT_FAIL_REASON.to_string()
    } else {
        reason
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_player_id() {
        assert_eq!(normalize_player_id("  alice ").unwrap(), "alice");
        assert_eq!(
            normalize_player_id("abcdefghijklmnopqrstuvwxyz").unwrap(),
            "abcdefghijklmnop"
        );
        assert!(matches!(normalize_player_id("a"), Err(AppError::InvalidId)));
        assert!(matches!(normalize_player_id("   "), Err(AppError::InvalidId)));
        assert!(matches!(normalize_player_id("ab\u{7}c"), Err(AppError::InvalidId)));
        assert_eq!(normalize_player_id("광부왕").unwrap(), "광부왕");
    }

    #[test]
    fn test_normalize_room_code() {
        assert_eq!(normalize_room_code(" ab12 ").unwrap(), "AB12");
        assert!(matches!(normalize_room_code("ABC"), Err(AppError::InvalidRoomCode)));
        assert!(matches!(
            normalize_room_code("ABCDEFGHIJKLM"),
            Err(AppError::InvalidRoomCode)
        ));
        assert!(matches!(normalize_room_code("AB-12"), Err(AppError::InvalidRoomCode)));
    }

    #[test]
    fn test_generated_codes_validate() {
        let mut rng = rand::rng();
        for _ in 0..100 {
            let code = generate_room_code(&mut rng);
            assert_eq!(code.len(), GENERATED_ROOM_CODE_LENGTH);
            assert_eq!(normalize_room_code(&code).unwrap(), code);
        }
    }

    #[test]
    fn test_normalize_fail_reason() {
        assert_eq!(normalize_fail_reason(None), DEFAULT_FAIL_REASON);
        assert_eq!(normalize_fail_reason(Some("  ")), DEFAULT_FAIL_REASON);
        assert_eq!(normalize_fail_reason(Some("Base Lost!")), "baselost");
        assert_eq!(normalize_fail_reason(Some(&"x".repeat(100))).len(), 32);
    }
}
