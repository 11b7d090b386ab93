//! Application router: subscription routes, health probe and the shared
//! middleware stack.

use std::time::Duration;

use axum::routing::get;
use axum::Router;
use http::{header, HeaderValue, Method};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use super::middleware::AuthState;
use super::subscription::{health, subscription_router, SubscriptionAppState};

/// Cross-cutting HTTP settings.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub request_timeout: Duration,
    /// Allowed browser origins. Empty allows any origin without credentials.
    pub cors_origins: Vec<String>,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            cors_origins: Vec::new(),
        }
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if parsed.is_empty() {
        base.allow_origin(Any)
    } else {
        // The session cookie only travels with credentialed requests.
        base.allow_origin(parsed).allow_credentials(true)
    }
}

/// Build the full application router.
///
/// The health probe sits outside the timeout so it always answers.
pub fn app_router(state: SubscriptionAppState, auth: AuthState, settings: &HttpSettings) -> Router {
    let middleware = ServiceBuilder::new()
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_layer(&settings.cors_origins))
        .layer(TimeoutLayer::new(settings.request_timeout));

    Router::new()
        .merge(subscription_router(auth))
        .layer(middleware)
        .route("/health", get(health))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_allow_any_origin() {
        let settings = HttpSettings::default();
        assert_eq!(settings.request_timeout, Duration::from_secs(30));
        assert!(settings.cors_origins.is_empty());
    }

    #[test]
    fn invalid_origins_are_skipped() {
        // Builds without panicking on a header-invalid origin.
        let _ = cors_layer(&["https://summarizz.app".to_string(), "bad\norigin".to_string()]);
    }
}
