use bcrypt::{hash, verify};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::config::Config;
use crate::models::Claims;

pub use bcrypt::DEFAULT_COST;

pub fn hash_password(password: &str, cost: u32) -> Result<String, bcrypt::BcryptError> {
    hash(password, cost)
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, bcrypt::BcryptError> {
    verify(password, hash)
}

/// Login password check. Unknown users are checked against a throwaway hash
/// of the configured cost, so both failure paths pay for one bcrypt verify.
pub struct PasswordVerifier {
    decoy_hash: String,
    verifications: AtomicU64,
}

impl PasswordVerifier {
    pub fn new(cost: u32) -> Result<Self, bcrypt::BcryptError> {
        Ok(Self {
            decoy_hash: hash_password("testboard-decoy-password", cost)?,
            verifications: AtomicU64::new(0),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, bcrypt::BcryptError> {
        Self::new(config.bcrypt_cost)
    }

    /// `stored` is the user's hash, or `None` when the user does not exist.
    /// A malformed stored hash counts as a mismatch.
    pub fn check(&self, password: &str, stored: Option<&str>) -> bool {
        self.verifications.fetch_add(1, Ordering::Relaxed);
        let hash = stored.unwrap_or(&self.decoy_hash);
        let matched = verify_password(password, hash).unwrap_or(false);
        matched && stored.is_some()
    }

    /// Number of bcrypt verifications run so far.
    pub fn verifications(&self) -> u64 {
        self.verifications.load(Ordering::Relaxed)
    }
}

/// Signs session tokens with the current secret and verifies them against the
/// current secret plus any retired ones.
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: Vec<DecodingKey>,
    ttl: Duration,
    validation: Validation,
}

impl TokenIssuer {
    pub fn new(secret: &str, previous: &[String], ttl: Duration) -> Self {
        let mut decoding = vec![DecodingKey::from_secret(secret.as_bytes())];
        decoding.extend(previous.iter().map(|s| DecodingKey::from_secret(s.as_bytes())));

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding,
            ttl,
            validation,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.jwt_secret, &config.jwt_previous_secrets, config.token_ttl)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(&self, username: &str) -> Result<String, jsonwebtoken::errors::Error> {
        self.issue_at(username, Utc::now().timestamp())
    }

    /// Issue a token as if the current time were `now` (unix seconds).
    pub fn issue_at(&self, username: &str, now: i64) -> Result<String, jsonwebtoken::errors::Error> {
        let ttl = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        let claims = Claims {
            sub: username.to_owned(),
            iat: now,
            exp: now.saturating_add(ttl),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
    }

    /// Returns the claims of the first key that accepts the token. An expired
    /// token is rejected regardless of which key signed it.
    pub fn validate(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        let mut last_err = None;
        for key in &self.decoding {
            match decode::<Claims>(token, key, &self.validation) {
                Ok(token_data) => return Ok(token_data.claims),
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| jsonwebtoken::errors::ErrorKind::InvalidSignature.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::errors::ErrorKind;

    fn issuer(secret: &str) -> TokenIssuer {
        TokenIssuer::new(secret, &[], Duration::from_secs(180))
    }

    #[test]
    fn test_password_hash_roundtrip() {
        let hashed = hash_password("secret", 4).unwrap();
        assert_ne!(hashed, "secret");
        assert!(verify_password("secret", &hashed).unwrap());
        assert!(!verify_password("wrong", &hashed).unwrap());
    }

    #[test]
    fn test_unknown_user_still_runs_a_verification() {
        let verifier = PasswordVerifier::new(4).unwrap();
        let stored = hash_password("secret", 4).unwrap();

        assert!(verifier.check("secret", Some(&stored)));
        assert!(!verifier.check("wrong", Some(&stored)));
        // Even the decoy's own password never logs in an unknown user.
        assert!(!verifier.check("testboard-decoy-password", None));
        assert!(!verifier.check("secret", None));
        assert!(!verifier.check("secret", Some("not-a-bcrypt-hash")));
        assert_eq!(verifier.verifications(), 5);
    }

    #[test]
    fn test_huge_ttl_saturates_expiry() {
        let issuer = TokenIssuer::new("k1", &[], Duration::from_secs(u64::MAX));
        let now = Utc::now().timestamp();
        let token = issuer.issue_at("admin", now).unwrap();
        let claims = issuer.validate(&token).unwrap();
        assert_eq!(claims.exp, i64::MAX);
        assert_eq!(claims.iat, now);
    }

    #[test]
    fn test_token_carries_username_and_ttl() {
        let issuer = issuer("k1");
        let now = Utc::now().timestamp();
        let token = issuer.issue("admin").unwrap();
        let claims = issuer.validate(&token).unwrap();
        assert_eq!(claims.sub, "admin");
        assert_eq!(claims.exp - claims.iat, 180);
        assert!((claims.iat - now).abs() <= 2);
    }

    #[test]
    fn test_expired_token_rejected() {
        let issuer = issuer("k1");
        let token = issuer.issue_at("admin", Utc::now().timestamp() - 600).unwrap();
        let err = issuer.validate(&token).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::ExpiredSignature));
    }

    #[test]
    fn test_tampered_and_foreign_tokens_rejected() {
        let issuer = issuer("k1");
        let token = issuer.issue("admin").unwrap();

        let other = TokenIssuer::new("k2", &[], Duration::from_secs(180));
        assert!(other.validate(&token).is_err());

        let mut tampered = token.clone();
        tampered.push('x');
        assert!(issuer.validate(&tampered).is_err());
        assert!(issuer.validate("not-a-jwt").is_err());
    }

    #[test]
    fn test_rotated_secret_still_verifies() {
        let old = issuer("old-secret");
        let token = old.issue("admin").unwrap();

        let rotated = TokenIssuer::new("new-secret", &["old-secret".to_string()], Duration::from_secs(180));
        assert_eq!(rotated.validate(&token).unwrap().sub, "admin");

        // New tokens are signed with the new secret only.
        let fresh = rotated.issue("admin").unwrap();
        assert!(old.validate(&fresh).is_err());
    }
}
