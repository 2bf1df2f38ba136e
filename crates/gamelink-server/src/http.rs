//! HTTP request handlers
//!
//! Device-facing JSON API under `/api/game`, and the browser pages a
//! signed-in user approves requests from.

use axum::{
    extract::{rejection::JsonRejection, Query, Request, State},
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use gamelink_auth::{ApprovalId, PairingError, RequestId};
use gamelink_core::{
    ApprovalInfo, CreatePairingResponse, DeviceIdentityResponse, ExchangeRequest,
    ExchangeResponse, PairingStateResponse,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, debug_span, error, Span};

use crate::error::ApiError;
use crate::guard::DeviceAuth;
use crate::render::PairingPage;
use crate::state::AppState;

/// Create the main application router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Device API
        .route(
            "/api/game/login",
            get(poll_state_handler).post(create_request_handler),
        )
        .route("/api/game/exchange", post(exchange_handler))
        .route("/api/game/me", get(device_identity_handler))
        // Browser approval pages
        .route("/game", get(confirm_page_handler).post(approve_handler))
        .route("/healthz", get(health_handler))
        .layer(TraceLayer::new_for_http().make_span_with(request_span))
        .with_state(state)
}

/// Request span without the query string, which carries polling secrets
fn request_span(request: &Request) -> Span {
    debug_span!(
        "request",
        method = %request.method(),
        path = %request.uri().path(),
        version = ?request.version(),
    )
}

async fn health_handler() -> &'static str {
    "ok"
}

// ============================================================================
// Device API Handlers
// ============================================================================

/// Start a pairing
///
/// Returns the request ID, the pairing URL to show the user and the polling
/// secret. The secret is never returned again.
async fn create_request_handler(
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<CreatePairingResponse>), ApiError> {
    let created = state.pairing.create_request().await?;
    let request = created.request;

    Ok((
        StatusCode::CREATED,
        Json(CreatePairingResponse {
            url: state.pairing_url(&request.id),
            id: request.id.to_string(),
            token: created.secret.into_inner(),
            expires_in: state.pairing.seconds_until(request.expires_at),
        }),
    ))
}

/// Query parameters for polling
#[derive(Debug, Deserialize)]
pub struct PollQuery {
    id: Option<String>,
    token: Option<String>,
}

/// Poll a pairing request with its polling secret
async fn poll_state_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PollQuery>,
) -> Result<Json<PairingStateResponse>, ApiError> {
    let (Some(id), Some(token)) = (non_empty(query.id), non_empty(query.token)) else {
        return Err(ApiError::missing("id, token"));
    };
    let id = RequestId::parse(&id).map_err(|_| PairingError::NotFound)?;

    let status = state.pairing.poll_state(&id, &token).await?;
    Ok(Json(PairingStateResponse {
        id: status.request_id.to_string(),
        state: status.pairing.kind(),
        approval: status.pairing.approval().map(|approval| ApprovalInfo {
            id: approval.id.to_string(),
            user: approval.user().into(),
        }),
    }))
}

/// Exchange an approval for a device credential
async fn exchange_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<ExchangeRequest>, JsonRejection>,
) -> Result<Json<ExchangeResponse>, ApiError> {
    let Json(body) = body.map_err(|e| {
        debug!("Rejected exchange body: {}", e);
        ApiError::missing("approval_id, token")
    })?;
    if body.approval_id.is_empty() || body.token.is_empty() {
        return Err(ApiError::missing("approval_id, token"));
    }
    let approval_id = ApprovalId::parse(&body.approval_id).map_err(|_| PairingError::NotFound)?;

    let issued = state.pairing.exchange(&approval_id, &body.token).await?;
    Ok(Json(ExchangeResponse {
        id: issued.credential_id.to_string(),
        token: issued.secret.into_inner(),
        user: issued.user.into(),
    }))
}

/// Identity of the calling device
async fn device_identity_handler(DeviceAuth(device): DeviceAuth) -> Json<DeviceIdentityResponse> {
    Json(DeviceIdentityResponse {
        credential_id: device.credential_id.to_string(),
        user: device.user.into(),
    })
}

// ============================================================================
// Browser Handlers
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ConfirmQuery {
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApproveForm {
    request_id: Option<String>,
}

/// Show the confirmation page for a pending request
async fn confirm_page_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConfirmQuery>,
    headers: HeaderMap,
) -> Response {
    let Some(raw_id) = non_empty(query.id) else {
        return incomplete_link_page(&state);
    };
    let Ok(id) = RequestId::parse(&raw_id) else {
        return failure_page(&state, PairingError::NotFound);
    };

    let Some(user) = state.current_user(&headers).await else {
        return sign_in_page(&state, &id);
    };

    let page = match state.pairing.get_pending_request(&id).await {
        Ok(request) => PairingPage::Confirm {
            request_id: request.id.to_string(),
            expires_in: state.pairing.seconds_until(request.expires_at),
            user,
        },
        Err(e) => return failure_page(&state, e),
    };
    page_response(&state, StatusCode::OK, &page)
}

/// Approve a pending request as the signed-in user
async fn approve_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<ApproveForm>,
) -> Response {
    let Some(raw_id) = non_empty(form.request_id) else {
        return incomplete_link_page(&state);
    };
    let Ok(id) = RequestId::parse(&raw_id) else {
        return failure_page(&state, PairingError::NotFound);
    };

    let Some(user) = state.current_user(&headers).await else {
        return sign_in_page(&state, &id);
    };

    match state.pairing.approve(&id, &user).await {
        Ok(_) => page_response(&state, StatusCode::OK, &PairingPage::Approved { user }),
        Err(e) => failure_page(&state, e),
    }
}

fn sign_in_page(state: &AppState, id: &RequestId) -> Response {
    let page = PairingPage::SignInRequired {
        login_url: state.sign_in_url(id),
    };
    page_response(state, StatusCode::UNAUTHORIZED, &page)
}

fn failure_page(state: &AppState, e: PairingError) -> Response {
    if e.is_internal() {
        error!("Pairing page failed: {}", e);
    }
    let page = PairingPage::Failed {
        message: failure_message(&e).to_string(),
    };
    page_response(state, ApiError::from(e).status_code(), &page)
}

fn incomplete_link_page(state: &AppState) -> Response {
    let page = PairingPage::Failed {
        message: "This pairing link is incomplete. Open it again from your game.".to_string(),
    };
    page_response(state, StatusCode::BAD_REQUEST, &page)
}

fn failure_message(e: &PairingError) -> &'static str {
    match e {
        PairingError::NotFound => "This pairing link is not valid.",
        PairingError::Expired => "This pairing link has expired. Start again from your game.",
        PairingError::AlreadyUsed => "This pairing link was already used.",
        _ => "Something went wrong. Please try again.",
    }
}

fn page_response(state: &AppState, status: StatusCode, page: &PairingPage) -> Response {
    (status, Html(state.renderer.render(page))).into_response()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
