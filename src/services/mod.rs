/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Controller operations: registration, scanning, lifecycle, export.
pub mod match_service;
/// Countdown task driving the live match.
pub mod match_timer;
/// Server-Sent Events message generation.
pub mod sse_events;
/// Server-Sent Events streaming.
pub mod sse_service;
/// Document store connection supervision and degraded mode.
pub mod storage_supervisor;
/// Two-way mirror between the match store and the remote document.
pub mod sync_bridge;
