//! Dashboard API route handlers.
//!
//! All endpoints return JSON. The handlers only ever read snapshots and
//! flip the run flags through `SegmentRunner`; no trading state is owned
//! here.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::engine::runner::SegmentRunner;
use crate::state::StatusSnapshot;
use crate::types::Segment;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Handles to both segment runners, shared with all route handlers.
pub struct DashboardState {
    pub domestic: Arc<SegmentRunner>,
    pub overseas: Arc<SegmentRunner>,
}

impl DashboardState {
    fn runner(&self, segment: Segment) -> &Arc<SegmentRunner> {
        match segment {
            Segment::Domestic => &self.domestic,
            Segment::Overseas => &self.overseas,
        }
    }
}

pub type AppState = Arc<DashboardState>;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub domestic: StatusSnapshot,
    pub overseas: StatusSnapshot,
}

#[derive(Debug, Serialize)]
pub struct ControlResponse {
    pub status: &'static str,
}

impl ControlResponse {
    fn from_outcome(accepted: bool) -> Json<Self> {
        Json(Self {
            status: if accepted { "ok" } else { "fail" },
        })
    }
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /api/status
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        domestic: state.domestic.state().snapshot().await,
        overseas: state.overseas.state().snapshot().await,
    })
}

/// POST /api/{segment}/start
pub async fn start_segment(
    State(state): State<AppState>,
    Path(segment): Path<String>,
) -> Result<Json<ControlResponse>, StatusCode> {
    let segment: Segment = segment.parse().map_err(|_| StatusCode::NOT_FOUND)?;
    Ok(ControlResponse::from_outcome(state.runner(segment).start()))
}

/// POST /api/{segment}/stop
pub async fn stop_segment(
    State(state): State<AppState>,
    Path(segment): Path<String>,
) -> Result<Json<ControlResponse>, StatusCode> {
    let segment: Segment = segment.parse().map_err(|_| StatusCode::NOT_FOUND)?;
    Ok(ControlResponse::from_outcome(state.runner(segment).stop()))
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}
