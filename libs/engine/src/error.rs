use thiserror::Error;

/// Engine failures. Structural uncertainty is always resolved by doing
/// nothing; nothing here is ever allowed to escape the driver loop.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("conversation root not found")]
    RootNotFound,

    #[error("engine is not observing")]
    NotObserving,

    #[error(transparent)]
    Page(#[from] slimthread_page::PageError),

    #[error("execution fault: {0}")]
    Execution(String),
}
