//! # Authentication & Authorization Middleware
//!
//! Shared-secret authentication standing in for a real identity provider.
//!
//! ## Credential Format
//!
//! ```text
//! Authorization: Basic base64({user}:{secret})   -> acts as {user}
//! Authorization: Bearer {user}:{secret}          -> acts as {user}
//! Authorization: Bearer {secret}                 -> administrator
//! (no header)                                    -> anonymous, read-only
//! ```
//!
//! With no secret configured every request is treated as the administrator
//! (development mode).
//!
//! ## CallerIdentity
//!
//! The middleware injects a [`CallerIdentity`] into the request extensions.
//! Handlers extract it via the `FromRequestParts` impl and authorize writes
//! with [`require_publisher`].

use axum::extract::{FromRequestParts, Request};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum_extra::headers::authorization::{Basic, Bearer};
use axum_extra::headers::{Authorization, HeaderMapExt};
use depot_core::OwnerName;
use subtle::ConstantTimeEq;

use crate::error::AppError;

// ── CallerIdentity ──────────────────────────────────────────────────────────

/// Who is making the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallerIdentity {
    /// Full access to every owner namespace.
    Admin,
    /// A named user; may publish to the owner of the same name.
    User(String),
    /// No credentials were presented.
    Anonymous,
}

impl CallerIdentity {
    /// Whether this caller may publish packages under `owner`.
    pub fn can_publish_to(&self, owner: &OwnerName) -> bool {
        match self {
            Self::Admin => true,
            Self::User(name) => owner.matches(name),
            Self::Anonymous => false,
        }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for CallerIdentity {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CallerIdentity>()
            .cloned()
            .ok_or_else(|| AppError::Unauthorized("no caller identity in request context".into()))
    }
}

/// Check that the caller may publish under `owner`.
///
/// Anonymous callers get 401 so clients retry with credentials; other users
/// get 403.
pub fn require_publisher(caller: &CallerIdentity, owner: &OwnerName) -> Result<(), AppError> {
    if caller.can_publish_to(owner) {
        return Ok(());
    }
    match caller {
        CallerIdentity::Anonymous => Err(AppError::Unauthorized(
            "authentication required to publish packages".into(),
        )),
        _ => Err(AppError::Forbidden(format!(
            "not allowed to publish packages for {owner}"
        ))),
    }
}

// ── Auth Configuration ──────────────────────────────────────────────────────

/// Auth configuration injected into request extensions.
///
/// Custom `Debug` redacts the token value to prevent credential leakage in logs.
#[derive(Clone, Default)]
pub struct AuthConfig {
    pub token: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

// ── Credential Validation ───────────────────────────────────────────────────

/// Constant-time comparison of secrets.
///
/// When lengths differ, performs a dummy comparison so timing does not
/// depend on how much of the secret matched.
fn constant_time_token_eq(provided: &str, expected: &str) -> bool {
    let provided = provided.as_bytes();
    let expected = expected.as_bytes();
    if provided.len() != expected.len() {
        let _ = expected.ct_eq(expected);
        return false;
    }
    provided.ct_eq(expected).into()
}

fn named_user(user: &str, secret: &str, expected: &str) -> Result<CallerIdentity, String> {
    if user.is_empty() {
        return Err("credentials must name a user".into());
    }
    if !constant_time_token_eq(secret, expected) {
        return Err("invalid credentials".into());
    }
    Ok(CallerIdentity::User(user.to_string()))
}

/// Parse a bearer token: the bare secret, or `{user}:{secret}`.
pub fn parse_bearer_token(provided: &str, expected: &str) -> Result<CallerIdentity, String> {
    if constant_time_token_eq(provided, expected) {
        return Ok(CallerIdentity::Admin);
    }
    match provided.split_once(':') {
        Some((user, secret)) => named_user(user, secret, expected),
        None => Err("invalid bearer token".into()),
    }
}

/// Resolve the caller from request headers. `Ok(Anonymous)` if no
/// `Authorization` header is present.
pub fn resolve_caller(headers: &HeaderMap, expected: &str) -> Result<CallerIdentity, String> {
    if let Some(Authorization(basic)) = headers.typed_get::<Authorization<Basic>>() {
        return named_user(basic.username(), basic.password(), expected);
    }
    if let Some(Authorization(bearer)) = headers.typed_get::<Authorization<Bearer>>() {
        return parse_bearer_token(bearer.token(), expected);
    }
    if headers.contains_key(axum::http::header::AUTHORIZATION) {
        return Err("authorization header must use the Basic or Bearer scheme".into());
    }
    Ok(CallerIdentity::Anonymous)
}

// ── Middleware ───────────────────────────────────────────────────────────────

/// Resolve the caller and inject a [`CallerIdentity`] into request extensions.
///
/// Invalid credentials are rejected here with 401. Authorization of the
/// operation itself happens in the handler.
pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let expected_token = request.extensions().get::<AuthConfig>().cloned();

    let identity = match expected_token {
        Some(AuthConfig {
            token: Some(ref expected),
        }) => match resolve_caller(request.headers(), expected) {
            Ok(identity) => identity,
            Err(msg) => {
                tracing::warn!(reason = %msg, "authentication failed");
                return AppError::Unauthorized(msg).into_response();
            }
        },
        _ => CallerIdentity::Admin,
    };

    request.extensions_mut().insert(identity);
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use axum::middleware::from_fn;
    use axum::routing::get;
    use axum::Router;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    async fn whoami(caller: CallerIdentity) -> String {
        match caller {
            CallerIdentity::Admin => "admin".to_string(),
            CallerIdentity::User(name) => format!("user:{name}"),
            CallerIdentity::Anonymous => "anonymous".to_string(),
        }
    }

    /// Build a minimal router with the auth middleware and an echo handler.
    fn test_app(token: Option<String>) -> Router {
        Router::new()
            .route("/whoami", get(whoami))
            .layer(from_fn(auth_middleware))
            .layer(axum::Extension(AuthConfig { token }))
    }

    async fn call(app: Router, authorization: Option<&str>) -> (StatusCode, String) {
        let mut builder = Request::builder().uri("/whoami");
        if let Some(value) = authorization {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        let response = app.oneshot(builder.body(Body::empty()).unwrap()).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn no_secret_means_admin() {
        let (status, body) = call(test_app(None), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "admin");
    }

    #[tokio::test]
    async fn missing_header_is_anonymous() {
        let (status, body) = call(test_app(Some("s3cret".into())), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "anonymous");
    }

    #[tokio::test]
    async fn bare_bearer_secret_is_admin() {
        let (_, body) = call(test_app(Some("s3cret".into())), Some("Bearer s3cret")).await;
        assert_eq!(body, "admin");
    }

    #[tokio::test]
    async fn bearer_with_user_identifies_user() {
        let (_, body) = call(test_app(Some("s3cret".into())), Some("Bearer user2:s3cret")).await;
        assert_eq!(body, "user:user2");
    }

    #[tokio::test]
    async fn basic_credentials_identify_user() {
        // base64("user2:s3cret")
        let (_, body) = call(
            test_app(Some("s3cret".into())),
            Some("Basic dXNlcjI6czNjcmV0"),
        )
        .await;
        assert_eq!(body, "user:user2");
    }

    #[tokio::test]
    async fn wrong_secret_rejected_with_challenge() {
        let app = test_app(Some("s3cret".into()));
        let request = Request::builder()
            .uri("/whoami")
            .header(header::AUTHORIZATION, "Bearer user2:wrong")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let err: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(err["error"]["code"], "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn unknown_scheme_rejected() {
        let (status, _) = call(test_app(Some("s3cret".into())), Some("Digest abc")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn bearer_needs_a_user_before_the_colon() {
        assert!(parse_bearer_token(":s3cret", "s3cret").is_err());
        assert!(parse_bearer_token("nope", "s3cret").is_err());
    }

    #[test]
    fn constant_time_eq_handles_length_mismatch() {
        assert!(constant_time_token_eq("abc", "abc"));
        assert!(!constant_time_token_eq("abc", "abcd"));
        assert!(!constant_time_token_eq("abd", "abc"));
    }

    #[test]
    fn publisher_rules() {
        let owner = OwnerName::new("User2").unwrap();
        assert!(require_publisher(&CallerIdentity::Admin, &owner).is_ok());
        assert!(require_publisher(&CallerIdentity::User("user2".into()), &owner).is_ok());
        assert!(matches!(
            require_publisher(&CallerIdentity::User("user3".into()), &owner),
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            require_publisher(&CallerIdentity::Anonymous, &owner),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn auth_config_debug_redacts_token() {
        let config = AuthConfig {
            token: Some("super-secret".into()),
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
