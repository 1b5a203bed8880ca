use crate::error::{CoreError, Result};

/// Generate a fresh server-assigned resource id.
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Validate an id against the resource id grammar:
/// 1..=64 chars from `[A-Za-z0-9.-]`.
pub fn validate_id(id: &str) -> Result<()> {
    if id.is_empty() || id.len() > 64 {
        return Err(CoreError::invalid_id(id));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
    {
        return Err(CoreError::invalid_id(id));
    }
    Ok(())
}
