//! Password generation and policy validation.
//!
//! Generated passwords come from the operating system CSPRNG; a
//! predictable pseudo-random source is never acceptable here since the
//! plaintext ends up as a live database credential.

use rand::rngs::OsRng;
use rand::Rng;

use crate::config::PasswordPolicy;
use crate::errors::{AppError, AppResult};

const UPPER: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const LOWER: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const DIGITS: &[u8] = b"0123456789";
const SPECIAL: &[u8] = b"!@#$%^&*()_+-=[]{}|;:,.<>?";

/// Generates a password satisfying the policy.
///
/// Rejection-samples from the full alphabet until every required character
/// class is present. With a 16+ character length the expected number of
/// attempts is small.
pub fn generate(policy: &PasswordPolicy) -> String {
    let alphabet: Vec<u8> = [UPPER, LOWER, DIGITS, SPECIAL].concat();
    let length = policy.min_length.max(8);
    let mut rng = OsRng;
    loop {
        let candidate: String = (0..length)
            .map(|_| alphabet[rng.gen_range(0..alphabet.len())] as char)
            .collect();
        if validate(policy, &candidate).is_ok() {
            return candidate;
        }
    }
}

/// Validates a caller-supplied password against the policy.
pub fn validate(policy: &PasswordPolicy, password: &str) -> AppResult<()> {
    if password.len() < policy.min_length {
        return Err(AppError::Validation(format!(
            "password must be at least {} characters",
            policy.min_length
        )));
    }
    if policy.require_uppercase && !password.bytes().any(|b| UPPER.contains(&b)) {
        return Err(AppError::Validation(
            "password must contain an uppercase letter".into(),
        ));
    }
    if policy.require_lowercase && !password.bytes().any(|b| LOWER.contains(&b)) {
        return Err(AppError::Validation(
            "password must contain a lowercase letter".into(),
        ));
    }
    if policy.require_digit && !password.bytes().any(|b| DIGITS.contains(&b)) {
        return Err(AppError::Validation("password must contain a digit".into()));
    }
    if policy.require_special && !password.bytes().any(|b| SPECIAL.contains(&b)) {
        return Err(AppError::Validation(
            "password must contain a special character".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_passwords_always_satisfy_the_policy() {
        let policy = PasswordPolicy::default();
        for _ in 0..1000 {
            let password = generate(&policy);
            assert_eq!(password.len(), policy.min_length);
            assert!(validate(&policy, &password).is_ok(), "{password}");
        }
    }

    #[test]
    fn generated_passwords_are_not_repeated() {
        let policy = PasswordPolicy::default();
        assert_ne!(generate(&policy), generate(&policy));
    }

    #[test]
    fn weak_passwords_are_rejected() {
        let policy = PasswordPolicy::default();
        assert!(validate(&policy, "short1!A").is_err());
        assert!(validate(&policy, "alllowercase1!aaaaaa").is_err());
        assert!(validate(&policy, "ALLUPPERCASE1!AAAAAA").is_err());
        assert!(validate(&policy, "NoDigitsHere!!aaaaaa").is_err());
        assert!(validate(&policy, "NoSpecials11aaaaaaAA").is_err());
        assert!(validate(&policy, "Meets-All-4-Classes!").is_ok());
    }

    #[test]
    fn relaxed_policy_skips_disabled_classes() {
        let policy = PasswordPolicy {
            min_length: 8,
            require_uppercase: false,
            require_special: false,
            ..PasswordPolicy::default()
        };
        assert!(validate(&policy, "lower123").is_ok());
    }
}
