//! Bearer-token validation at the socket edge.
//!
//! Tokens carry `{user_id, email, subscription_tier, exp, nbf, iss,
//! jti}`. Expired tokens, not-yet-valid tokens and issuer mismatches
//! are rejected, with a 5-second clock-skew tolerance; the socket closes
//! with the policy-violation code (1008).

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, GatewayResult};

/// Close code sent on authentication failure.
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;

/// Clock-skew tolerance for exp/nbf checks.
const LEEWAY_SECS: u64 = 5;

/// Claims carried by gateway bearer tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    pub user_id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub subscription_tier: Option<String>,
    pub exp: u64,
    #[serde(default)]
    pub nbf: Option<u64>,
    pub iss: String,
    pub jti: String,
}

/// HS256 token verifier.
#[derive(Clone)]
pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(secret: &str, issuer: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = LEEWAY_SECS;
        validation.validate_nbf = true;
        validation.set_issuer(&[issuer]);
        validation.set_required_spec_claims(&["exp", "iss"]);

        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Validate a bearer token and return its claims.
    pub fn verify(&self, token: &str) -> GatewayResult<TokenClaims> {
        decode::<TokenClaims>(token, &self.key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| GatewayError::auth(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "test-secret";
    const ISSUER: &str = "videoagent";

    fn now() -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs()
    }

    fn token(exp: u64, nbf: Option<u64>, iss: &str) -> String {
        let claims = TokenClaims {
            user_id: "u1".to_string(),
            email: Some("u1@example.com".to_string()),
            subscription_tier: Some("pro".to_string()),
            exp,
            nbf,
            iss: iss.to_string(),
            jti: "token-1".to_string(),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn accepts_valid_token() {
        let verifier = TokenVerifier::new(SECRET, ISSUER);
        let claims = verifier.verify(&token(now() + 600, None, ISSUER)).unwrap();
        assert_eq!(claims.user_id, "u1");
        assert_eq!(claims.subscription_tier.as_deref(), Some("pro"));
    }

    #[test]
    fn rejects_expired_token() {
        let verifier = TokenVerifier::new(SECRET, ISSUER);
        let err = verifier.verify(&token(now() - 600, None, ISSUER)).unwrap_err();
        assert!(matches!(err, GatewayError::Auth(_)));
    }

    #[test]
    fn accepts_just_expired_within_leeway() {
        let verifier = TokenVerifier::new(SECRET, ISSUER);
        assert!(verifier.verify(&token(now() - 2, None, ISSUER)).is_ok());
    }

    #[test]
    fn rejects_not_yet_valid_token() {
        let verifier = TokenVerifier::new(SECRET, ISSUER);
        let err = verifier
            .verify(&token(now() + 600, Some(now() + 300), ISSUER))
            .unwrap_err();
        assert!(matches!(err, GatewayError::Auth(_)));
    }

    #[test]
    fn rejects_wrong_issuer() {
        let verifier = TokenVerifier::new(SECRET, ISSUER);
        let err = verifier
            .verify(&token(now() + 600, None, "someone-else"))
            .unwrap_err();
        assert!(matches!(err, GatewayError::Auth(_)));
    }

    #[test]
    fn rejects_wrong_secret() {
        let verifier = TokenVerifier::new("other-secret", ISSUER);
        let err = verifier.verify(&token(now() + 600, None, ISSUER)).unwrap_err();
        assert!(matches!(err, GatewayError::Auth(_)));
    }
}
