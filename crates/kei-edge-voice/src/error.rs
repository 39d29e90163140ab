//! Error taxonomy for the voice facade: wraps the scheduler's errors and
//! adds the audio I/O boundary's own failure mode.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Scheduler(#[from] kei_edge_core::Error),

    #[error("audio sink rejected a chunk: {0}")]
    Sink(String),
}

pub type Result<T> = std::result::Result<T, Error>;
