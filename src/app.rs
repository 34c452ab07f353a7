/*
 * Responsibility
 * - Config読み込み → 依存生成 → route policy 宣言 → Router 組み立て
 * - Middleware の適用 (CORS / HTTP / access token 検証)
 * - axum::serve() で起動
 */
use std::sync::Arc;

use anyhow::Result;
use axum::{Router, routing::get};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api;
use crate::api::v2::handlers::health::health;
use crate::config::Config;
use crate::middleware;
use crate::services::auth::{RoutePolicy, TokenVerifier};
use crate::state::AppState;

fn init_tracing() {
    // Prefer RUST_LOG if set; otherwise use a sensible default.
    // Ex: RUST_LOG=info,portal_api=debug,tower_http=debug cargo run
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

pub async fn run() -> Result<()> {
    init_tracing();
    let config = Config::from_env()?;

    tracing::info!(
        "starting API in {:?} mode on {} (issuer: {})",
        config.app_env,
        config.addr,
        config.auth_issuer
    );

    let state = build_state(&config)?;
    let app = build_router(state, &config);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_state(config: &Config) -> Result<AppState> {
    let verifier = TokenVerifier::new(
        &config.auth_issuer,
        config.access_token_leeway_seconds,
        std::time::Duration::from_secs(config.jwks_refresh_seconds),
    )?;

    Ok(AppState::new(
        Arc::new(verifier),
        build_policy(),
        &config.auth_client_id,
    ))
}

/// The route policy table: which paths are anonymous, which require which
/// authority. Declared here as data so it is inspectable and testable apart
/// from the transport layer. Matching is exact; anything not listed is denied.
fn build_policy() -> RoutePolicy {
    RoutePolicy::builder()
        .allow_anonymous("/health")
        .allow_anonymous("/api/v2/customers")
        .require_authority("/api/v2/products", "products:read")
        .build()
}

fn build_router(state: AppState, config: &Config) -> Router {
    let app = Router::new()
        .route("/health", get(health))
        .nest("/api/v2", api::v2::routes());

    let app = middleware::auth::access::apply(app, state.clone());
    let app = app.with_state(state);
    let app = middleware::cors::apply(app, config);
    middleware::http::apply(app)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::config::AppEnv;

    fn test_config() -> Config {
        Config {
            addr: "127.0.0.1:0".parse().unwrap(),
            app_env: AppEnv::Development,
            cors_allowed_origins: vec![],
            auth_issuer: "https://idp.invalid/realms/portal".to_string(),
            auth_client_id: "portal-client".to_string(),
            access_token_leeway_seconds: 60,
            jwks_refresh_seconds: 300,
        }
    }

    fn test_app() -> Router {
        let config = test_config();
        let state = build_state(&config).unwrap();
        build_router(state, &config)
    }

    async fn body_string(res: axum::response::Response) -> String {
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn health_is_reachable_without_a_token() {
        let res = test_app()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn customers_is_anonymous() {
        let res = test_app()
            .oneshot(
                Request::get("/api/v2/customers")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_string(res).await, "Hello Customers");
    }

    #[tokio::test]
    async fn customers_stays_reachable_with_a_broken_token() {
        let res = test_app()
            .oneshot(
                Request::get("/api/v2/customers")
                    .header(header::AUTHORIZATION, "Bearer not-a-jwt")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn products_without_token_is_unauthorized() {
        let res = test_app()
            .oneshot(
                Request::get("/api/v2/products")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            res.headers()
                .get(header::WWW_AUTHENTICATE)
                .and_then(|v| v.to_str().ok()),
            Some("Bearer")
        );
        assert!(body_string(res).await.contains("UNAUTHORIZED"));
    }

    #[tokio::test]
    async fn products_with_unverifiable_token_is_unauthorized() {
        let res = test_app()
            .oneshot(
                Request::get("/api/v2/products")
                    .header(header::AUTHORIZATION, "Bearer not-a-jwt")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn unlisted_route_fails_closed() {
        let res = test_app()
            .oneshot(Request::get("/api/v2/orders").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }
}
