//! Error taxonomy for the edge scheduler, mirroring the stream core's
//! `thiserror`-derived shape.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("no healthy node available for task {task_id}")]
    Routing { task_id: String },

    #[error("task {task_id} failed: {message}")]
    Task { task_id: String, message: String },

    #[error("operation timed out: {0}")]
    Timeout(String),
}

pub type Result<T> = std::result::Result<T, Error>;
