//! Validation helpers for DTOs.

use validator::ValidationError;

/// Longest player name accepted at registration.
pub const MAX_PLAYER_NAME_LEN: usize = 64;

/// Validates that a player name has visible characters and fits on a ticket header.
///
/// # Examples
///
/// ```ignore
/// validate_player_name("Alice")   // Ok
/// validate_player_name("   ")     // Err - blank
/// validate_player_name("a\u{7}")  // Err - control character
/// ```
pub fn validate_player_name(name: &str) -> Result<(), ValidationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        let mut err = ValidationError::new("player_name_blank");
        err.message = Some("Player name must not be blank".into());
        return Err(err);
    }

    let length = trimmed.chars().count();
    if length > MAX_PLAYER_NAME_LEN {
        let mut err = ValidationError::new("player_name_length");
        err.message = Some(
            format!("Player name must be at most {MAX_PLAYER_NAME_LEN} characters (got {length})")
                .into(),
        );
        return Err(err);
    }

    if trimmed.chars().any(char::is_control) {
        let mut err = ValidationError::new("player_name_format");
        err.message = Some("Player name must not contain control characters".into());
        return Err(err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_player_name_valid() {
        assert!(validate_player_name("Alice").is_ok());
        assert!(validate_player_name("  Jean-Luc  ").is_ok());
        assert!(validate_player_name(&"x".repeat(MAX_PLAYER_NAME_LEN)).is_ok());
    }

    #[test]
    fn test_validate_player_name_blank() {
        assert!(validate_player_name("").is_err());
        assert!(validate_player_name(" \t ").is_err());
    }

    #[test]
    fn test_validate_player_name_invalid() {
        assert!(validate_player_name(&"x".repeat(MAX_PLAYER_NAME_LEN + 1)).is_err());
        assert!(validate_player_name("bad\u{7}name").is_err());
    }
}
