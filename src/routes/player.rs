use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use axum_valid::Valid;
use tracing::debug;
use uuid::Uuid;

use crate::{
    dto::player::{
        ClaimRequest, ClaimResponse, GameStatusResponse, RegisterRequest, RegisterResponse,
        TicketResponse,
    },
    error::AppError,
    services::{
        arbitrator::{self, ClaimOutcome},
        game_service,
    },
    state::SharedState,
};

/// Player-facing endpoints: registration, ticket lookup, status polling and claims.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/api/register", post(register))
        .route("/api/ticket/{ticket_id}", get(get_ticket))
        .route("/api/game-status", get(game_status))
        .route("/api/claim", post(claim))
}

/// Join the game and receive the next free ticket.
#[utoipa::path(
    post,
    path = "/api/register",
    tag = "player",
    request_body = RegisterRequest,
    responses(
        (status = 200, description = "Ticket assigned", body = RegisterResponse),
        (status = 400, description = "Blank or malformed player name"),
        (status = 409, description = "Every ticket is taken")
    )
)]
pub async fn register(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<RegisterRequest>>,
) -> Result<Json<RegisterResponse>, AppError> {
    let ticket = arbitrator::register(&state, &payload.player_name).await?;
    Ok(Json(ticket.into()))
}

/// Fetch a ticket along with every name drawn so far.
#[utoipa::path(
    get,
    path = "/api/ticket/{ticket_id}",
    tag = "player",
    params(("ticket_id" = String, Path, description = "Identifier returned at registration")),
    responses(
        (status = 200, description = "Ticket", body = TicketResponse),
        (status = 404, description = "Unknown ticket")
    )
)]
pub async fn get_ticket(
    State(state): State<SharedState>,
    Path(ticket_id): Path<Uuid>,
) -> Result<Json<TicketResponse>, AppError> {
    Ok(Json(game_service::get_ticket(&state, ticket_id).await?.into()))
}

/// Poll drawn names, the claim lock flag and the winners.
#[utoipa::path(
    get,
    path = "/api/game-status",
    tag = "player",
    responses((status = 200, description = "Current game status", body = GameStatusResponse))
)]
pub async fn game_status(
    State(state): State<SharedState>,
) -> Result<Json<GameStatusResponse>, AppError> {
    Ok(Json(game_service::get_game_status(&state).await?.into()))
}

/// Submit a claim for a fully covered ticket.
#[utoipa::path(
    post,
    path = "/api/claim",
    tag = "player",
    request_body = ClaimRequest,
    responses((
        status = 200,
        description = "Claim queued, or refused because another claim is in progress or the ticket is not active",
        body = ClaimResponse
    ))
)]
pub async fn claim(
    State(state): State<SharedState>,
    Json(payload): Json<ClaimRequest>,
) -> Result<Json<ClaimResponse>, AppError> {
    let outcome = match payload.parsed_ticket_id() {
        Some(ticket_id) => arbitrator::claim(&state, ticket_id).await?,
        None => {
            debug!(ticket_id = %payload.ticket_id, "claim refused: malformed ticket id");
            ClaimOutcome::InvalidTicket
        }
    };
    Ok(Json(ClaimResponse::from(&outcome)))
}
