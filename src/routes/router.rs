use axum::{
    Router,
    extract::{MatchedPath, Request},
    http::{HeaderValue, Method, header},
    middleware,
    routing::{get, post, put},
};
use tower::ServiceBuilder;
use tower_cookies::CookieManagerLayer;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};
use tracing::info_span;

use crate::core::state::AppState;
use crate::routes::{auth, mcp, notes, oauth, pages};
use crate::utils;

pub fn router(state: AppState) -> Router {
    // session-guarded pages, actions and API
    let notes_router = Router::new()
        .route("/notes", get(notes::index))
        .route("/notes/create", post(notes::create))
        .route("/notes/delete", post(notes::delete))
        .route("/notes/{id}", get(notes::show).post(notes::save))
        .route("/api/notes/{id}", put(notes::update))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            utils::auth::authorize,
        ));

    // MCP OAuth provider
    let oauth_router = Router::new()
        .route(
            "/.well-known/oauth-authorization-server",
            get(oauth::authorization_server_metadata),
        )
        .route(
            "/.well-known/oauth-protected-resource",
            get(oauth::protected_resource_metadata),
        )
        .route("/register", post(oauth::register))
        .route("/authorize", get(oauth::authorize))
        .route(
            "/token",
            post(oauth::token).layer(SetResponseHeaderLayer::overriding(
                header::CACHE_CONTROL,
                HeaderValue::from_static("no-store"),
            )),
        );

    // MCP transports
    let mcp_router = Router::new()
        .route("/mcp", post(mcp::post))
        .route("/sse", get(mcp::sse))
        .route("/messages", post(mcp::message));

    Router::new()
        .route("/", get(pages::home))
        .route("/auth/github", get(auth::login))
        .route("/auth/github/callback", get(auth::callback))
        .merge(notes_router)
        .merge(oauth_router)
        .merge(mcp_router)
        .layer(
            ServiceBuilder::new()
                .layer(CookieManagerLayer::new())
                .layer(
                    TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                        let matched_path = request
                            .extensions()
                            .get::<MatchedPath>()
                            .map(MatchedPath::as_str);

                        info_span!(
                            "request",
                            method = ?request.method(),
                            matched_path,
                        )
                    }),
                )
                .layer(
                    CorsLayer::new()
                        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
                        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
                        .allow_origin(AllowOrigin::mirror_request())
                        .allow_credentials(true),
                )
                .layer(middleware::from_fn_with_state(
                    state.clone(),
                    utils::auth::require_bearer,
                )),
        )
        .with_state(state)
}
