//! Password hashing. Wraps `bcrypt` at the default cost, matching the
//! constant-time-compare requirement in §4.7.

use crate::error::{Error, Result};

pub fn hash(password: &str) -> Result<String> {
    bcrypt::hash(password, bcrypt::DEFAULT_COST).map_err(Error::internal)
}

pub fn verify(password: &str, hash: &str) -> Result<bool> {
    bcrypt::verify(password, hash).map_err(Error::internal)
}

/// Minimum acceptable password length for signup. The spec does not pin a
/// policy beyond "weak password" being a validation error; eight characters
/// is the common floor used across the retrieval pack's auth-adjacent code.
pub fn validate_strength(password: &str) -> Result<()> {
    if password.len() < 8 {
        return Err(Error::Validation(
            "password must be at least 8 characters".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let hashed = hash("password123").unwrap();
        assert!(verify("password123", &hashed).unwrap());
        assert!(!verify("wrong", &hashed).unwrap());
    }

    #[test]
    fn rejects_short_password() {
        assert!(validate_strength("short").is_err());
        assert!(validate_strength("password123").is_ok());
    }
}
