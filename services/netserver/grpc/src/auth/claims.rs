//! JWT claims for user sessions and API keys

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Audience and issuer of every token
pub const TOKEN_AUDIENCE: &str = "netserver";

/// `typ` of user session tokens
pub const TYP_USER: &str = "user";

/// `typ` of API key tokens
pub const TYP_KEY: &str = "key";

/// Claims of a HS256 token. API key tokens carry no `exp`.
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug)]
pub struct AuthClaim {
    /// Audience
    pub aud: String,
    /// Expiration (unix seconds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<usize>,
    /// Issuer
    pub iss: String,
    /// User or API key id
    pub sub: String,
    /// `user` or `key`
    pub typ: String,
}

impl AuthClaim {
    /// Session token for a user, valid for 24 hours
    pub fn new_for_user(id: &Uuid) -> Self {
        let exp = Utc::now() + Duration::days(1);

        AuthClaim {
            aud: TOKEN_AUDIENCE.to_string(),
            exp: Some(exp.timestamp() as usize),
            iss: TOKEN_AUDIENCE.to_string(),
            sub: id.to_string(),
            typ: TYP_USER.to_string(),
        }
    }

    /// Non-expiring token for an API key
    pub fn new_for_api_key(id: &Uuid) -> Self {
        AuthClaim {
            aud: TOKEN_AUDIENCE.to_string(),
            exp: None,
            iss: TOKEN_AUDIENCE.to_string(),
            sub: id.to_string(),
            typ: TYP_KEY.to_string(),
        }
    }

    /// Sign the claims
    pub fn encode(&self, secret: &[u8]) -> Result<String, jsonwebtoken::errors::Error> {
        encode(&Header::default(), self, &EncodingKey::from_secret(secret))
    }

    /// Verify and decode a token. `exp` is optional but checked when present.
    pub fn decode(token: &str, secret: &[u8]) -> Result<Self, jsonwebtoken::errors::Error> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.required_spec_claims = HashSet::new();
        validation.set_audience(&[TOKEN_AUDIENCE]);

        Ok(decode::<AuthClaim>(token, &DecodingKey::from_secret(secret), &validation)?.claims)
    }
}
