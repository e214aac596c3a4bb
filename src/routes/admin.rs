use axum::{
    Json, Router,
    body::Body,
    extract::State,
    http::Request,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
};

use crate::{
    dto::admin::{
        ActionResponse, PendingClaimSummary, PickNameResponse, VerifyClaimRequest,
        VerifyClaimResponse,
    },
    error::AppError,
    services::{arbitrator, game_service},
    state::SharedState,
};

const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// Operator endpoints driving the draw and the claim queue.
pub fn router(state: SharedState) -> Router<SharedState> {
    Router::new()
        .route("/api/admin/pick-name", post(pick_name))
        .route("/api/admin/claims", get(list_claims))
        .route("/api/admin/verify-claim", post(verify_claim))
        .route("/api/admin/reset-game", post(reset_game))
        .route_layer(middleware::from_fn_with_state(state, require_admin_token))
}

/// Draw one name at random from those not yet picked.
#[utoipa::path(
    post,
    path = "/api/admin/pick-name",
    tag = "admin",
    params(("X-Admin-Token" = String, Header, description = "Admin token issued by the /sse/admin stream")),
    responses(
        (status = 200, description = "Name drawn", body = PickNameResponse),
        (status = 409, description = "Every name was already drawn")
    )
)]
pub async fn pick_name(
    State(state): State<SharedState>,
) -> Result<Json<PickNameResponse>, AppError> {
    Ok(Json(game_service::pick_name(&state).await?.into()))
}

/// List pending claims in submission order.
#[utoipa::path(
    get,
    path = "/api/admin/claims",
    tag = "admin",
    params(("X-Admin-Token" = String, Header, description = "Admin token issued by the /sse/admin stream")),
    responses((status = 200, description = "Pending claims", body = [PendingClaimSummary]))
)]
pub async fn list_claims(
    State(state): State<SharedState>,
) -> Result<Json<Vec<PendingClaimSummary>>, AppError> {
    let pending = arbitrator::list_pending_claims(&state).await?;
    Ok(Json(pending.into_iter().map(Into::into).collect()))
}

/// Approve or reject a pending claim.
#[utoipa::path(
    post,
    path = "/api/admin/verify-claim",
    tag = "admin",
    params(("X-Admin-Token" = String, Header, description = "Admin token issued by the /sse/admin stream")),
    request_body = VerifyClaimRequest,
    responses(
        (status = 200, description = "Claim resolved", body = VerifyClaimResponse),
        (status = 404, description = "Unknown claim"),
        (status = 409, description = "Claim already resolved")
    )
)]
pub async fn verify_claim(
    State(state): State<SharedState>,
    Json(payload): Json<VerifyClaimRequest>,
) -> Result<Json<VerifyClaimResponse>, AppError> {
    let verification =
        arbitrator::verify_claim(&state, payload.claim_id, payload.is_valid).await?;
    Ok(Json(VerifyClaimResponse::from(&verification)))
}

/// Clear claims, picks and ticket assignments. Ticket grids are kept.
#[utoipa::path(
    post,
    path = "/api/admin/reset-game",
    tag = "admin",
    params(("X-Admin-Token" = String, Header, description = "Admin token issued by the /sse/admin stream")),
    responses((status = 200, description = "Game reset", body = ActionResponse))
)]
pub async fn reset_game(State(state): State<SharedState>) -> Result<Json<ActionResponse>, AppError> {
    arbitrator::reset_game(&state).await?;
    Ok(Json(ActionResponse { success: true }))
}

async fn require_admin_token(
    State(state): State<SharedState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let provided = req
        .headers()
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_owned())
        .ok_or_else(|| {
            AppError::Unauthorized("missing admin token header `X-Admin-Token`".into())
        })?;

    let expected = state.admin_token().lock().await.clone();

    match expected {
        Some(token) if token == provided => Ok(next.run(req).await),
        Some(_) => Err(AppError::Unauthorized("invalid admin token".into())),
        None => Err(AppError::Unauthorized(
            "admin SSE stream not initialised yet".into(),
        )),
    }
}
