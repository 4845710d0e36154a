//! HTTP API server for external control (desktop shell, tray helper)
//!
//! This module provides a REST API for controlling the recorder:
//! - POST /recorder/start - Start a new recording
//! - POST /recorder/stop - Stop the active recording
//! - POST /recorder/pause - Pause the active recording
//! - POST /recorder/resume - Resume a paused recording
//! - GET /recorder/status - Query session status
//! - GET /recorder/uploads - List upload queue items
//! - POST /recorder/uploads/:id/retry - Retry a failed upload
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
