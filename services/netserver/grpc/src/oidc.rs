//! OpenID Connect provider seam.
//!
//! The HTTP exchange with the identity provider lives outside this crate;
//! the internal service only needs the verified identity behind a callback
//! `code` / `state` pair.

use async_trait::async_trait;

/// Identity returned by the provider
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OidcUserInfo {
    /// Provider subject, stored as the user's external id
    pub subject: String,
    /// E-mail claim
    pub email: Option<String>,
    /// `email_verified` claim
    pub email_verified: bool,
    /// Note stored on users registered through the provider
    pub note: Option<String>,
}

/// Exchanges an authorization callback for the user's identity
#[async_trait]
pub trait OidcProvider: Send + Sync {
    /// Resolve the callback code and state
    async fn exchange(&self, code: &str, state: &str) -> anyhow::Result<OidcUserInfo>;
}
