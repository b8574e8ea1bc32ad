//! Payment gateway adapters
//!
//! - [`HttpGateway`]: talks to the provider over HTTPS form posts
//! - [`SandboxGateway`]: in-process provider for development and tests
//!
//! Both sign and verify with the same [`Signer`].

mod http;
mod sandbox;
mod signer;

pub use http::HttpGateway;
pub use sandbox::SandboxGateway;
pub use signer::Signer;

use serde::Deserialize;

/// Shortest signing secret accepted outside an ephemeral sandbox.
pub const MIN_SECRET_LEN: usize = 16;

const PLACEHOLDER_SECRETS: &[&str] = &["change-me", "changeme"];

/// Gateway configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Use the in-process sandbox instead of the remote provider. Development
    /// only: an empty `secret` gets a random per-process key.
    pub sandbox: bool,
    pub base_url: String,
    pub merchant_id: String,
    /// Shared signing secret
    pub secret: String,
    /// Where the provider posts payment callbacks
    pub notify_url: String,
    /// Where the user lands after paying
    pub return_url: String,
    pub timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            sandbox: false,
            base_url: "https://openapi.pay.example.com".to_string(),
            merchant_id: "M000000".to_string(),
            secret: String::new(),
            notify_url: "http://localhost:8080/api/v1/payments/callback".to_string(),
            return_url: "http://localhost:8080/".to_string(),
            timeout_secs: 10,
        }
    }
}

impl GatewayConfig {
    /// A configured secret that is neither a placeholder nor too short.
    pub fn has_strong_secret(&self) -> bool {
        let secret = self.secret.trim();
        secret.len() >= MIN_SECRET_LEN
            && !PLACEHOLDER_SECRETS
                .iter()
                .any(|p| secret.eq_ignore_ascii_case(p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_secret(secret: &str) -> GatewayConfig {
        GatewayConfig {
            secret: secret.to_string(),
            ..GatewayConfig::default()
        }
    }

    #[test]
    fn default_config_has_no_usable_secret() {
        let cfg = GatewayConfig::default();
        assert!(!cfg.sandbox);
        assert!(!cfg.has_strong_secret());
    }

    #[test]
    fn placeholder_and_short_secrets_are_weak() {
        assert!(!with_secret("change-me").has_strong_secret());
        assert!(!with_secret("   ").has_strong_secret());
        assert!(!with_secret("short-key").has_strong_secret());
        assert!(with_secret("9f2c4e7a1b3d5f60").has_strong_secret());
    }
}
