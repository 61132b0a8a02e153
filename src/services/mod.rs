/// OpenAPI documentation generation.
pub mod documentation;
/// Grid commands of jeopardy sessions.
pub mod grid_service;
/// Health check service.
pub mod health_service;
/// Host authorization and lifecycle commands.
pub mod host_service;
/// Random names and join codes.
pub mod naming;
/// Timers behind timed questions.
pub mod phase_timer;
/// Player answers and departures.
pub mod player_service;
/// Launching, joining and reading sessions.
pub mod session_service;
/// Closing of sessions abandoned by their host.
pub mod session_sweeper;
/// Server-Sent Events streaming of session changes.
pub mod sse_service;
/// Storage connection supervisor driving degraded mode.
pub mod storage_supervisor;
/// Player WebSocket connection handling.
pub mod websocket_service;
