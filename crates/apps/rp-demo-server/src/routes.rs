//! HTTP routes of the demo relying party.

use crate::render::{Page, Renderer};
use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
};
use rp_oidc::{CallbackParams, FailureReason, FlowOrchestrator, OidcError};
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::error;

#[derive(Clone)]
pub struct AppState {
    pub flow: FlowOrchestrator,
    pub renderer: Arc<dyn Renderer>,
    pub app_name: String,
    pub default_autologin_subject: String,
}

#[derive(Debug, Deserialize)]
pub struct AutologinQuery {
    subject: Option<String>,
}

pub fn router(state: AppState, static_dir: impl AsRef<Path>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/", get(landing_handler))
        .route("/login", get(login_handler))
        .route("/autologin", get(autologin_handler))
        .route("/return", get(return_handler))
        .nest_service("/static", ServeDir::new(static_dir.as_ref()))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({ "name": state.app_name, "status": "ok" }))
}

async fn landing_handler(State(state): State<AppState>) -> Html<Vec<u8>> {
    Html(state.renderer.render(&Page::Landing {
        redirect_uri: &state.flow.config().redirect_uri,
    }))
}

async fn login_handler(State(state): State<AppState>) -> Response {
    start_login(&state, None).await
}

async fn autologin_handler(
    State(state): State<AppState>,
    Query(query): Query<AutologinQuery>,
) -> Response {
    let subject = query
        .subject
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| state.default_autologin_subject.clone());
    start_login(&state, Some(&subject)).await
}

async fn start_login(state: &AppState, autologin_subject: Option<&str>) -> Response {
    match state.flow.begin_login(autologin_subject).await {
        Ok(request) => Redirect::to(request.url.as_str()).into_response(),
        Err(e) => {
            error!("Could not start login: {}", e);
            failure_page(state, &e)
        }
    }
}

/// Landing point of the IdP redirect.
async fn return_handler(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> Response {
    match state.flow.handle_callback(params).await {
        Ok(claims) => Html(state.renderer.render(&Page::Authenticated { claims: &claims }))
            .into_response(),
        // Detail was logged by the flow; the browser only gets the generic text
        Err(e) => failure_page(&state, &e),
    }
}

fn failure_page(state: &AppState, err: &OidcError) -> Response {
    let status = match err.reason() {
        FailureReason::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        FailureReason::UnknownState
        | FailureReason::ExchangeFailed
        | FailureReason::InvalidIdentityToken => StatusCode::UNAUTHORIZED,
    };
    let body = state.renderer.render(&Page::Failed {
        message: err.user_message(),
    });
    (status, Html(body)).into_response()
}
