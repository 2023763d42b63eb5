use crate::messaging::TransportError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    /// The remote endpoint never answered. Terminal for the call: a hung or
    /// dead endpoint does not get better by asking again.
    #[error("request timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    /// The remote answered, but with nothing. Retried a bounded number of
    /// times before landing here; usually a transient startup race.
    #[error("remote answered with an empty signal {attempts} times")]
    EmptyAnswer { attempts: usize },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("storage failure: {0}")]
    Storage(String),

    #[error("invalid persisted record: {0}")]
    InvalidRecord(#[from] serde_json::Error),
}
