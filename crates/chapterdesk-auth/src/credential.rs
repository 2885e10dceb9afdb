//! Admin password hashing and verification
//!
//! The configured credential is an Argon2 PHC string. Verification reads the
//! cost parameters from the stored hash, so a hash produced with cheaper
//! [`HashParams`] verifies the same way as one produced with the defaults.

use argon2::{
    password_hash::{self, rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use zeroize::Zeroizing;

use crate::error::{AuthError, Result};

/// Argon2id cost parameters used when producing a new hash
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HashParams {
    /// Memory cost in KiB
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HashParams {
    fn default() -> Self {
        Self {
            memory_kib: Params::DEFAULT_M_COST,
            iterations: Params::DEFAULT_T_COST,
            parallelism: Params::DEFAULT_P_COST,
        }
    }
}

impl HashParams {
    fn to_argon2(self) -> Result<Argon2<'static>> {
        let params = Params::new(self.memory_kib, self.iterations, self.parallelism, None)
            .map_err(|e| AuthError::Credential(format!("Invalid hash parameters: {}", e)))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

/// Hash a password into an Argon2id PHC string
pub fn hash_password(password: &str, params: &HashParams) -> Result<String> {
    let argon2 = params.to_argon2()?;
    let salt = SaltString::generate(&mut OsRng);
    let password_bytes = Zeroizing::new(password.as_bytes().to_vec());

    let hash = argon2
        .hash_password(&password_bytes, &salt)
        .map_err(|e| AuthError::Credential(format!("Failed to hash password: {}", e)))?
        .to_string();

    Ok(hash)
}

/// Check that a configured value is a usable Argon2 PHC string
pub fn validate_hash(phc: &str) -> Result<()> {
    let parsed = PasswordHash::new(phc)
        .map_err(|e| AuthError::InvalidConfig(format!("password_hash is not a PHC string: {}", e)))?;

    if !parsed.algorithm.as_str().starts_with("argon2") {
        return Err(AuthError::InvalidConfig(format!(
            "password_hash uses unsupported algorithm {}",
            parsed.algorithm
        )));
    }

    if parsed.hash.is_none() || parsed.salt.is_none() {
        return Err(AuthError::InvalidConfig(
            "password_hash is missing its salt or output".to_string(),
        ));
    }

    Ok(())
}

/// Verify a credential against a stored hash in constant time
///
/// A mismatch is `Ok(false)`; only malformed hashes are errors.
pub fn verify_password(credential: &str, phc: &str) -> Result<bool> {
    let parsed = PasswordHash::new(phc)
        .map_err(|e| AuthError::Credential(format!("Invalid stored hash: {}", e)))?;

    let credential_bytes = Zeroizing::new(credential.as_bytes().to_vec());
    match Argon2::default().verify_password(&credential_bytes, &parsed) {
        Ok(()) => Ok(true),
        Err(password_hash::Error::Password) => Ok(false),
        Err(e) => Err(AuthError::Credential(format!("Verification failed: {}", e))),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Cheap parameters so tests do not spend seconds per hash
    pub(crate) fn fast_params() -> HashParams {
        HashParams {
            memory_kib: 8,
            iterations: 1,
            parallelism: 1,
        }
    }

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("letmein", &fast_params()).unwrap();
        assert!(hash.starts_with("$argon2id$"));

        assert!(verify_password("letmein", &hash).unwrap());
        assert!(!verify_password("letmeout", &hash).unwrap());
        assert!(!verify_password("", &hash).unwrap());
    }

    #[test]
    fn test_salts_differ() {
        let a = hash_password("same", &fast_params()).unwrap();
        let b = hash_password("same", &fast_params()).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_validate_hash() {
        let hash = hash_password("letmein", &fast_params()).unwrap();
        assert!(validate_hash(&hash).is_ok());

        assert!(matches!(
            validate_hash("letmein"),
            Err(AuthError::InvalidConfig(_))
        ));
        assert!(validate_hash("").is_err());
    }

    #[test]
    fn test_verify_rejects_malformed_hash() {
        assert!(matches!(
            verify_password("x", "plaintext"),
            Err(AuthError::Credential(_))
        ));
    }

    #[test]
    fn test_invalid_params() {
        let params = HashParams {
            memory_kib: 0,
            iterations: 0,
            parallelism: 0,
        };
        assert!(hash_password("x", &params).is_err());
    }
}
