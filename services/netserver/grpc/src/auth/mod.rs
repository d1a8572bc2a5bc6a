//! Authentication and authorization.
//!
//! [`AuthInterceptor`] turns the `authorization: Bearer <jwt>` header into an
//! [`AuthID`] request extension. Each RPC then authorizes the caller through
//! [`validator::RequestValidator`] with the validator matching the action.

pub mod claims;
pub mod validator;

use claims::{AuthClaim, TYP_KEY, TYP_USER};
use std::str::FromStr;
use std::sync::Arc;
use tonic::service::Interceptor;
use tonic::{Request, Status};
use tracing::debug;
use uuid::Uuid;

/// Caller identity attached to every request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthID {
    /// No credentials
    None,
    /// User session
    User(Uuid),
    /// API key
    Key(Uuid),
}

impl AuthID {
    /// Identity from a bearer token.
    ///
    /// Rejected tokens yield an `Unauthenticated` status without a message;
    /// the cause is only logged.
    pub fn from_token(token: &str, secret: &[u8]) -> Result<Self, Status> {
        let claim = AuthClaim::decode(token, secret).map_err(|e| {
            debug!(error = %e, "Invalid token");
            Status::unauthenticated("")
        })?;
        let id = Uuid::from_str(&claim.sub).map_err(|e| {
            debug!(error = %e, sub = %claim.sub, "Invalid token subject");
            Status::unauthenticated("")
        })?;

        match claim.typ.as_str() {
            TYP_USER => Ok(AuthID::User(id)),
            TYP_KEY => Ok(AuthID::Key(id)),
            other => {
                debug!(typ = other, "Invalid token type");
                Err(Status::unauthenticated(""))
            }
        }
    }
}

/// Interceptor decoding the bearer token of each request
#[derive(Clone)]
pub struct AuthInterceptor {
    secret: Arc<Vec<u8>>,
}

impl AuthInterceptor {
    /// Create an interceptor verifying tokens with the given HS256 secret
    pub fn new(secret: &str) -> Self {
        Self {
            secret: Arc::new(secret.as_bytes().to_vec()),
        }
    }
}

impl Interceptor for AuthInterceptor {
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, Status> {
        let id = match request.metadata().get("authorization") {
            None => AuthID::None,
            Some(value) => {
                let value = value
                    .to_str()
                    .map_err(|_| Status::unauthenticated("authorization header is not ASCII"))?;
                let token = value
                    .strip_prefix("Bearer ")
                    .or_else(|| value.strip_prefix("bearer "))
                    .ok_or_else(|| {
                        Status::unauthenticated("authorization header must be 'Bearer <token>'")
                    })?;
                AuthID::from_token(token.trim(), &self.secret)?
            }
        };

        debug!(auth_id = ?id, "Request authenticated");
        request.extensions_mut().insert(id);
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tonic::Code;

    fn request_with(header: Option<&str>) -> Request<()> {
        let mut req = Request::new(());
        if let Some(h) = header {
            req.metadata_mut()
                .insert("authorization", h.parse().unwrap());
        }
        req
    }

    #[test]
    fn test_no_header() {
        let mut i = AuthInterceptor::new("secret");
        let req = i.call(request_with(None)).unwrap();
        assert_eq!(req.extensions().get::<AuthID>(), Some(&AuthID::None));
    }

    #[test]
    fn test_user_and_key_tokens() {
        let mut i = AuthInterceptor::new("secret");

        let user_id = Uuid::new_v4();
        let token = AuthClaim::new_for_user(&user_id).encode(b"secret").unwrap();
        let req = i
            .call(request_with(Some(&format!("Bearer {}", token))))
            .unwrap();
        assert_eq!(req.extensions().get::<AuthID>(), Some(&AuthID::User(user_id)));

        let key_id = Uuid::new_v4();
        let token = AuthClaim::new_for_api_key(&key_id).encode(b"secret").unwrap();
        let req = i
            .call(request_with(Some(&format!("Bearer {}", token))))
            .unwrap();
        assert_eq!(req.extensions().get::<AuthID>(), Some(&AuthID::Key(key_id)));
    }

    #[test]
    fn test_invalid_tokens() {
        let mut i = AuthInterceptor::new("secret");

        let token = AuthClaim::new_for_user(&Uuid::new_v4())
            .encode(b"other")
            .unwrap();
        for header in [
            format!("Bearer {}", token),
            "Bearer garbage".to_string(),
            "Basic dXNlcjpwYXNz".to_string(),
        ] {
            let err = i.call(request_with(Some(&header))).unwrap_err();
            assert_eq!(err.code(), Code::Unauthenticated, "{}", header);
        }

        let err = i
            .call(request_with(Some(&format!("Bearer {}", token))))
            .unwrap_err();
        assert!(err.message().is_empty(), "{}", err.message());
    }

    #[test]
    fn test_unknown_token_type() {
        let mut claim = AuthClaim::new_for_api_key(&Uuid::new_v4());
        claim.typ = "device".into();
        let token = claim.encode(b"secret").unwrap();

        let err = AuthID::from_token(&token, b"secret").unwrap_err();
        assert_eq!(err.code(), Code::Unauthenticated);
        assert!(err.message().is_empty());
    }
}
