//! Authentication middleware and extractors for axum.
//!
//! This module provides:
//! - `auth_middleware` - Layer that validates the session token and injects the user into extensions
//! - `RequireAuth` - Extractor that requires authentication
//!
//! # Architecture
//!
//! The middleware uses the `SessionValidator` port, so the HS256 validator and
//! the test mock are interchangeable.
//!
//! ```text
//! Request → auth_middleware → injects AuthenticatedUser into extensions
//!                                      ↓
//!                              Handler → RequireAuth extractor reads from extensions
//! ```
//!
//! # Token Sources
//!
//! The token is read from `Authorization: Bearer <token>` first and from the
//! session cookie (`token` by default) second. The frontend sends the cookie;
//! the header is there for API clients and tests.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};

use crate::domain::foundation::{AuthError, AuthenticatedUser};
use crate::ports::SessionValidator;

/// Cookie the frontend stores the session token in.
pub const DEFAULT_SESSION_COOKIE: &str = "token";

/// Auth middleware state: the session validator plus the cookie to read.
#[derive(Clone)]
pub struct AuthState {
    validator: Arc<dyn SessionValidator>,
    cookie_name: String,
}

impl AuthState {
    pub fn new(validator: Arc<dyn SessionValidator>) -> Self {
        Self {
            validator,
            cookie_name: DEFAULT_SESSION_COOKIE.to_string(),
        }
    }

    pub fn with_cookie_name(mut self, cookie_name: impl Into<String>) -> Self {
        self.cookie_name = cookie_name.into();
        self
    }

    /// Pulls the raw session token out of the request headers.
    fn token_from(&self, headers: &HeaderMap) -> Option<String> {
        bearer_token(headers).or_else(|| cookie_value(headers, &self.cookie_name))
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|h| h.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Authentication middleware that validates session tokens.
///
/// On a valid token the `AuthenticatedUser` is inserted into the request
/// extensions. Without a token the request continues unauthenticated and
/// `RequireAuth` rejects it at the handler. An invalid token is rejected here.
pub async fn auth_middleware(
    State(auth): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(token) = auth.token_from(request.headers()) else {
        return next.run(request).await;
    };

    match auth.validator.validate(&token).await {
        Ok(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(e) => {
            let (status, message) = match &e {
                AuthError::TokenExpired => (StatusCode::UNAUTHORIZED, "Unauthorized: Token expired"),
                AuthError::TokenNotActive => {
                    (StatusCode::UNAUTHORIZED, "Unauthorized: Token not active")
                }
                AuthError::InvalidToken => (StatusCode::UNAUTHORIZED, "Unauthorized: Invalid token"),
                AuthError::ServiceUnavailable(msg) => {
                    tracing::error!("Auth service unavailable: {}", msg);
                    (
                        StatusCode::SERVICE_UNAVAILABLE,
                        "Authentication service unavailable",
                    )
                }
            };

            (
                status,
                Json(serde_json::json!({
                    "error": message,
                    "code": "AUTH_ERROR"
                })),
            )
                .into_response()
        }
    }
}

/// Extractor that requires authentication.
///
/// Returns 401 when the auth middleware did not inject a user.
#[derive(Debug, Clone)]
pub struct RequireAuth(pub AuthenticatedUser);

#[async_trait]
impl<S> FromRequestParts<S> for RequireAuth
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .map(RequireAuth)
            .ok_or(AuthRejection::Unauthenticated)
    }
}

/// Rejection type for authentication failures.
#[derive(Debug, Clone)]
pub enum AuthRejection {
    /// No valid session token was provided.
    Unauthenticated,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthRejection::Unauthenticated => {
                (StatusCode::UNAUTHORIZED, "Unauthorized: No token provided")
            }
        };

        (
            status,
            Json(serde_json::json!({
                "error": message,
                "code": "UNAUTHENTICATED"
            })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::auth::MockSessionValidator;
    use axum::body::Body;
    use axum::http::HeaderValue;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    fn headers(pairs: &[(header::HeaderName, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(name.clone(), HeaderValue::from_str(value).unwrap());
        }
        map
    }

    fn auth_state() -> AuthState {
        AuthState::new(Arc::new(
            MockSessionValidator::new().with_test_user("good-token", "uid-1"),
        ))
    }

    async fn whoami(RequireAuth(user): RequireAuth) -> String {
        user.id.to_string()
    }

    fn app(auth: AuthState) -> Router {
        Router::new()
            .route("/me", get(whoami))
            .layer(axum::middleware::from_fn_with_state(auth, auth_middleware))
    }

    async fn status_of(auth: AuthState, request: axum::http::Request<Body>) -> StatusCode {
        app(auth).oneshot(request).await.unwrap().status()
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Token Extraction
    // ════════════════════════════════════════════════════════════════════════════

    #[test]
    fn bearer_header_is_read() {
        let map = headers(&[(header::AUTHORIZATION, "Bearer abc")]);
        assert_eq!(bearer_token(&map).as_deref(), Some("abc"));
    }

    #[test]
    fn non_bearer_schemes_are_ignored() {
        let map = headers(&[(header::AUTHORIZATION, "Basic dXNlcjpwYXNz")]);
        assert_eq!(bearer_token(&map), None);
    }

    #[test]
    fn cookie_is_found_among_others() {
        let map = headers(&[(header::COOKIE, "theme=dark; token=abc; lang=en")]);
        assert_eq!(cookie_value(&map, "token").as_deref(), Some("abc"));
        assert_eq!(cookie_value(&map, "session"), None);
    }

    #[test]
    fn empty_cookie_value_counts_as_missing() {
        let map = headers(&[(header::COOKIE, "token=")]);
        assert_eq!(cookie_value(&map, "token"), None);
    }

    #[test]
    fn header_wins_over_cookie() {
        let map = headers(&[
            (header::AUTHORIZATION, "Bearer from-header"),
            (header::COOKIE, "token=from-cookie"),
        ]);
        assert_eq!(auth_state().token_from(&map).as_deref(), Some("from-header"));
    }

    #[test]
    fn custom_cookie_name_is_honored() {
        let auth = auth_state().with_cookie_name("sid");
        let map = headers(&[(header::COOKIE, "token=ignored; sid=abc")]);
        assert_eq!(auth.token_from(&map).as_deref(), Some("abc"));
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Middleware + Extractor
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn valid_cookie_reaches_handler() {
        let response = app(auth_state())
            .oneshot(
                axum::http::Request::get("/me")
                    .header(header::COOKIE, "token=good-token")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"uid-1");
    }

    #[tokio::test]
    async fn missing_token_is_401() {
        let request = axum::http::Request::get("/me").body(Body::empty()).unwrap();
        assert_eq!(status_of(auth_state(), request).await, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn unknown_token_is_401() {
        let request = axum::http::Request::get("/me")
            .header(header::AUTHORIZATION, "Bearer nope")
            .body(Body::empty())
            .unwrap();
        assert_eq!(status_of(auth_state(), request).await, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn validator_outage_is_503() {
        let auth = AuthState::new(Arc::new(
            MockSessionValidator::new()
                .with_error(AuthError::service_unavailable("no signing key")),
        ));
        let request = axum::http::Request::get("/me")
            .header(header::AUTHORIZATION, "Bearer anything")
            .body(Body::empty())
            .unwrap();
        assert_eq!(status_of(auth, request).await, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn auth_rejection_returns_401() {
        let response = AuthRejection::Unauthenticated.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn auth_state_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<AuthState>();
        assert_send_sync::<RequireAuth>();
    }
}
