//! One-time password reset tokens. Only the SHA-256 digest is stored.

use rand::RngCore;
use sha2::{Digest, Sha256};
use time::{Duration, OffsetDateTime};

use crate::users::repo_types::User;

const TOKEN_BYTES: usize = 32;

/// Plaintext token for the mail, digest for the user record.
pub struct ResetToken {
    pub plain: String,
    pub hash: String,
}

impl ResetToken {
    pub fn generate() -> Self {
        let mut bytes = [0u8; TOKEN_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        let plain = hex::encode(bytes);
        let hash = hash_token(&plain);
        Self { plain, hash }
    }
}

pub fn hash_token(plain: &str) -> String {
    hex::encode(Sha256::digest(plain.as_bytes()))
}

pub fn attach(user: &mut User, token: &ResetToken, now: OffsetDateTime, ttl: Duration) {
    user.password_reset_token_hash = Some(token.hash.clone());
    user.password_reset_expires_at = Some(now + ttl);
}

pub fn clear(user: &mut User) {
    user.password_reset_token_hash = None;
    user.password_reset_expires_at = None;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::lockout::tests::sample_user;

    #[test]
    fn generated_tokens_are_distinct_and_hashed() {
        let a = ResetToken::generate();
        let b = ResetToken::generate();
        assert_ne!(a.plain, b.plain);
        assert_eq!(a.plain.len(), TOKEN_BYTES * 2);
        assert_eq!(a.hash, hash_token(&a.plain));
        assert_ne!(a.hash, a.plain);
    }

    #[test]
    fn hash_is_stable_sha256_hex() {
        assert_eq!(
            hash_token("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn attach_and_clear() {
        let mut user = sample_user();
        let token = ResetToken::generate();
        let now = OffsetDateTime::now_utc();
        attach(&mut user, &token, now, Duration::minutes(10));
        assert_eq!(user.password_reset_token_hash.as_deref(), Some(token.hash.as_str()));
        assert_eq!(user.password_reset_expires_at, Some(now + Duration::minutes(10)));
        clear(&mut user);
        assert!(user.password_reset_token_hash.is_none());
        assert!(user.password_reset_expires_at.is_none());
    }
}
