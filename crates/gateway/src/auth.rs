use std::sync::Arc;

use {
    axum::{extract::FromRequestParts, http::request::Parts},
    secrecy::{ExposeSecret, Secret},
    tracing::debug,
    wagate_tenants::TenantInfo,
};

use crate::{error::ApiError, state::GatewayState};

/// Header carrying a tenant's token.
pub const TENANT_HEADER: &str = "token";

// ── Types ────────────────────────────────────────────────────────────────────

/// Result of an authentication attempt.
#[derive(Debug, Clone)]
pub struct AuthResult {
    pub ok: bool,
    pub reason: Option<&'static str>,
}

impl AuthResult {
    fn denied(reason: &'static str) -> Self {
        Self {
            ok: false,
            reason: Some(reason),
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Constant-time string comparison (prevents timing attacks).
fn safe_equal(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let diff = a
        .as_bytes()
        .iter()
        .zip(b.as_bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y));
    diff == 0
}

// ── Auth logic ───────────────────────────────────────────────────────────────

/// Pick the admin token: environment first, then config. Blank values
/// count as unset.
pub fn resolve_admin_token(env: Option<String>, config: Option<&str>) -> Option<Secret<String>> {
    env.filter(|t| !t.trim().is_empty())
        .or_else(|| config.map(str::to_string).filter(|t| !t.trim().is_empty()))
        .map(Secret::new)
}

/// Check an `Authorization` header value against the admin token. A
/// `Bearer ` prefix is accepted.
pub fn authorize_admin(expected: Option<&Secret<String>>, provided: Option<&str>) -> AuthResult {
    let Some(expected) = expected else {
        return AuthResult::denied("token_missing_config");
    };
    let Some(given) = provided else {
        return AuthResult::denied("token_missing");
    };
    let given = given.strip_prefix("Bearer ").unwrap_or(given).trim();
    if !safe_equal(given, expected.expose_secret()) {
        return AuthResult::denied("token_mismatch");
    }
    AuthResult {
        ok: true,
        reason: None,
    }
}

// ── Extractors ───────────────────────────────────────────────────────────────

/// Guard for `/admin/*` routes.
pub struct Admin;

impl FromRequestParts<Arc<GatewayState>> for Admin {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<GatewayState>,
    ) -> Result<Self, Self::Rejection> {
        let provided = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        let result = authorize_admin(state.admin_token.as_ref(), provided);
        if result.ok {
            Ok(Self)
        } else {
            let reason = result.reason.unwrap_or("unauthorized");
            debug!(reason, "admin request rejected");
            Err(ApiError::Unauthorized(reason))
        }
    }
}

/// The tenant identified by the `token` header, resolved through the cache.
pub struct Tenant(pub TenantInfo);

impl FromRequestParts<Arc<GatewayState>> for Tenant {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<GatewayState>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(TENANT_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(ApiError::Unauthorized("token_missing"))?;
        let services = state.supervisor.services();
        services
            .cache
            .resolve(services.store.as_ref(), token)
            .await?
            .map(Tenant)
            .ok_or(ApiError::Unauthorized("token_unknown"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_token_wins_over_config() {
        let t = resolve_admin_token(Some("env".into()), Some("cfg")).unwrap();
        assert_eq!(t.expose_secret(), "env");
        let t = resolve_admin_token(Some("  ".into()), Some("cfg")).unwrap();
        assert_eq!(t.expose_secret(), "cfg");
        assert!(resolve_admin_token(None, Some("")).is_none());
    }

    #[test]
    fn admin_authorization() {
        let secret = Secret::new("s3cret".to_string());
        assert!(authorize_admin(Some(&secret), Some("s3cret")).ok);
        assert!(authorize_admin(Some(&secret), Some("Bearer s3cret")).ok);
        assert_eq!(
            authorize_admin(Some(&secret), Some("nope")).reason,
            Some("token_mismatch")
        );
        assert_eq!(
            authorize_admin(Some(&secret), None).reason,
            Some("token_missing")
        );
        assert_eq!(
            authorize_admin(None, Some("s3cret")).reason,
            Some("token_missing_config")
        );
    }

    #[test]
    fn safe_equal_compares_lengths() {
        assert!(safe_equal("abc", "abc"));
        assert!(!safe_equal("abc", "abcd"));
        assert!(!safe_equal("abc", "abd"));
    }
}
