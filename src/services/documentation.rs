use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Ticket Bingo Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sse::public_stream,
        crate::routes::sse::admin_stream,
        crate::routes::player::register,
        crate::routes::player::get_ticket,
        crate::routes::player::game_status,
        crate::routes::player::claim,
        crate::routes::admin::pick_name,
        crate::routes::admin::list_claims,
        crate::routes::admin::verify_claim,
        crate::routes::admin::reset_game,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::player::RegisterRequest,
            crate::dto::player::RegisterResponse,
            crate::dto::player::TicketResponse,
            crate::dto::player::GameStatusResponse,
            crate::dto::player::PickedNameSummary,
            crate::dto::player::WinnerSummary,
            crate::dto::player::ClaimRequest,
            crate::dto::player::ClaimResponse,
            crate::dto::admin::PickNameResponse,
            crate::dto::admin::PendingClaimSummary,
            crate::dto::admin::VerifyClaimRequest,
            crate::dto::admin::VerifyClaimResponse,
            crate::dto::admin::ActionResponse,
            crate::dto::sse::Handshake,
            crate::dto::sse::SystemStatus,
            crate::dto::sse::NamePickedEvent,
            crate::dto::sse::ClaimSubmittedEvent,
            crate::dto::sse::ClaimQueuedEvent,
            crate::dto::sse::ClaimVerifiedEvent,
            crate::dto::sse::GameResetEvent,
            crate::state::state_machine::TicketStatus,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sse", description = "Server-sent events streams"),
        (name = "player", description = "Registration, tickets and claims"),
        (name = "admin", description = "Operator actions gated by the admin SSE token"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_route() {
        let doc = ApiDoc::openapi();
        for path in [
            "/healthcheck",
            "/api/register",
            "/api/ticket/{ticket_id}",
            "/api/game-status",
            "/api/claim",
            "/api/admin/pick-name",
            "/api/admin/claims",
            "/api/admin/verify-claim",
            "/api/admin/reset-game",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
