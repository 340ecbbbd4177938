//! Lightweight input validation helpers. Keep logic minimal and deterministic.

use crate::CoreError;

/// Upper bound on token length; anything longer is almost certainly a paste error.
const MAX_TOKEN_LEN: usize = 512;

/// Validate an access token: non-empty, bounded, and free of whitespace or
/// control characters so it can travel in a query string untouched.
pub fn validate_access_token(s: &str) -> Result<(), CoreError> {
    if s.is_empty() {
        return Err(CoreError::InvalidToken("empty".into()));
    }
    if s.len() > MAX_TOKEN_LEN {
        return Err(CoreError::InvalidToken("too long".into()));
    }
    if s.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(CoreError::InvalidToken(
            "must not contain whitespace or control characters".into(),
        ));
    }
    Ok(())
}

/// Validate a docker container name: `[a-zA-Z0-9][a-zA-Z0-9_.-]*`.
pub fn validate_container_name(s: &str) -> Result<(), CoreError> {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphanumeric() => {}
        _ => {
            return Err(CoreError::InvalidConfig(format!(
                "container name '{}' must start with an ascii letter or digit",
                s
            )))
        }
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-') {
        return Err(CoreError::InvalidConfig(format!(
            "container name '{}' contains invalid characters",
            s
        )));
    }
    Ok(())
}

/// Validate a published host port. Port 0 would let the runtime pick one,
/// which the loader could then not find.
pub fn validate_host_port(port: u16) -> Result<(), CoreError> {
    if port == 0 {
        return Err(CoreError::InvalidConfig("host port must be non-zero".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_validation_basic() {
        assert!(validate_access_token("abc123").is_ok());
        assert!(validate_access_token("").is_err());
        assert!(validate_access_token("has space").is_err());
        assert!(validate_access_token("tab\there").is_err());
        assert!(validate_access_token(&"x".repeat(513)).is_err());
    }

    #[test]
    fn container_name_rules() {
        assert!(validate_container_name("temp_postgres_0aZ").is_ok());
        assert!(validate_container_name("pg.restore-1").is_ok());
        assert!(validate_container_name("").is_err());
        assert!(validate_container_name("_leading").is_err());
        assert!(validate_container_name("bad/name").is_err());
    }

    #[test]
    fn host_port_rules() {
        assert!(validate_host_port(35000).is_ok());
        assert!(matches!(validate_host_port(0), Err(CoreError::InvalidConfig(_))));
    }
}
