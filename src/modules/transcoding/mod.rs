use crate::state::AppState;
use axum::Router;
use axum::routing::{get, post};

pub mod dto;
pub mod events;
pub mod handler;
pub mod memory;
pub mod model;
pub mod repository;
pub mod service;
pub mod store;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/jobs", get(handler::list_jobs).post(handler::enqueue_job))
        .route("/jobs/{id}", get(handler::get_job))
        .route("/jobs/{id}/logs", get(handler::get_job_logs))
        .route("/jobs/{id}/cancel", post(handler::cancel_job))
        .route("/jobs/{id}/retry", post(handler::retry_job))
        .route("/stats", get(handler::get_statistics))
        .route("/maintenance/cleanup-logs", post(handler::cleanup_logs))
}
