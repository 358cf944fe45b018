/// Password hashing and strength checks (bcrypt, cost 12)

use bcrypt::{hash, verify, DEFAULT_COST};

use crate::error::{AppError, AuthError, ValidationError};

const MIN_PASSWORD_LENGTH: usize = 8;
const MAX_PASSWORD_LENGTH: usize = 128;

/// Check strength, then hash
pub fn hash_password(password: &str) -> Result<String, AppError> {
    validate_password_strength(password)?;

    hash(password, DEFAULT_COST)
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
}

/// Compare a candidate against the stored hash.
///
/// Accounts without a local password (OAuth-provisioned) never match, and
/// a mismatch is reported the same way as an unknown email.
pub fn check_credentials(candidate: &str, stored_hash: Option<&str>) -> Result<(), AppError> {
    let stored_hash = stored_hash.ok_or(AuthError::InvalidCredentials)?;

    let matches = verify(candidate, stored_hash)
        .map_err(|e| AppError::Internal(format!("Password verification failed: {}", e)))?;

    if matches {
        Ok(())
    } else {
        Err(AuthError::InvalidCredentials.into())
    }
}

/// 8 to 128 characters with at least one digit, lowercase and uppercase letter
fn validate_password_strength(password: &str) -> Result<(), ValidationError> {
    let length = password.chars().count();

    if length < MIN_PASSWORD_LENGTH {
        return Err(ValidationError::TooShort(
            "password".to_string(),
            MIN_PASSWORD_LENGTH,
        ));
    }

    // bcrypt truncates long inputs; cap them instead
    if length > MAX_PASSWORD_LENGTH {
        return Err(ValidationError::TooLong(
            "password".to_string(),
            MAX_PASSWORD_LENGTH,
        ));
    }

    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_lowercase = password.chars().any(|c| c.is_lowercase());
    let has_uppercase = password.chars().any(|c| c.is_uppercase());

    if !has_digit || !has_lowercase || !has_uppercase {
        return Err(ValidationError::InvalidFormat(
            "password must contain at least one digit, one lowercase letter, and one uppercase letter"
                .to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_check() {
        let hash = hash_password("ValidPassword123").expect("Failed to hash password");

        assert_ne!(hash, "ValidPassword123");
        assert!(hash.starts_with("$2"));
        assert!(check_credentials("ValidPassword123", Some(&hash)).is_ok());
    }

    #[test]
    fn test_wrong_password_is_invalid_credentials() {
        let hash = hash_password("ValidPassword123").expect("Failed to hash password");

        let err = check_credentials("WrongPassword123", Some(&hash)).unwrap_err();
        assert_eq!(err.as_auth(), Some(AuthError::InvalidCredentials));
    }

    #[test]
    fn test_account_without_password_never_matches() {
        let err = check_credentials("Anything123", None).unwrap_err();
        assert_eq!(err.as_auth(), Some(AuthError::InvalidCredentials));
    }

    #[test]
    fn test_strength_rules() {
        assert!(validate_password_strength("Short1").is_err());
        assert!(validate_password_strength(&("a".repeat(MAX_PASSWORD_LENGTH) + "A1")).is_err());
        assert!(validate_password_strength("NoDigitsPassword").is_err());
        assert!(validate_password_strength("NOLOWERCASE1").is_err());
        assert!(validate_password_strength("nouppercase1").is_err());
        assert!(validate_password_strength("ValidPassword123").is_ok());
    }

    #[test]
    fn test_weak_password_is_not_hashed() {
        let err = hash_password("weak").unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
