use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use secrecy::{ExposeSecret, Secret};

/// Argon2id hash with a fresh random salt, in PHC string format.
pub fn hash_password(password: &Secret<String>) -> Result<String, anyhow::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.expose_secret().as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?
        .to_string();
    Ok(hash)
}

/// `Ok(true)` on match, `Ok(false)` on mismatch, `Err` for a corrupt hash.
pub fn verify_password(password: &Secret<String>, hash: &str) -> Result<bool, anyhow::Error> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| anyhow::anyhow!("Invalid password hash format: {}", e))?;

    Ok(Argon2::default()
        .verify_password(password.expose_secret().as_bytes(), &parsed)
        .is_ok())
}

/// Runs the hashing on the blocking pool; Argon2 is deliberately slow.
pub async fn hash_password_blocking(password: Secret<String>) -> Result<String, anyhow::Error> {
    tokio::task::spawn_blocking(move || hash_password(&password)).await?
}

pub async fn verify_password_blocking(
    password: Secret<String>,
    hash: String,
) -> Result<bool, anyhow::Error> {
    tokio::task::spawn_blocking(move || verify_password(&password, &hash)).await?
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret(s: &str) -> Secret<String> {
        Secret::new(s.to_string())
    }

    #[test]
    fn hash_is_argon2id_and_verifies() {
        let hash = hash_password(&secret("mySecurePassword123")).unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password(&secret("mySecurePassword123"), &hash).unwrap());
        assert!(!verify_password(&secret("wrongPassword"), &hash).unwrap());
    }

    #[test]
    fn salts_differ_between_hashes() {
        let a = hash_password(&secret("same")).unwrap();
        let b = hash_password(&secret("same")).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn corrupt_hash_is_an_error() {
        assert!(verify_password(&secret("x"), "not-a-hash").is_err());
    }
}
