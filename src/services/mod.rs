/// Ticket assignment and the claim pipeline.
pub mod arbitrator;
/// OpenAPI documentation generation.
pub mod documentation;
/// Ticket reads, game status, name picks and store provisioning.
pub mod game_service;
/// Health check service.
pub mod health_service;
/// Server-Sent Events message generation.
pub mod sse_events;
/// Server-Sent Events broadcasting service.
pub mod sse_service;
/// Storage connection supervisor with reconnect backoff.
pub mod storage_supervisor;
/// Random ticket layout generation.
pub mod ticket_generator;
