pub mod bind;
pub mod classify;
pub mod collect;
pub mod error;
pub mod executor;
pub mod streaming;
pub mod thread;
pub mod trimmer;
pub mod types;

pub use bind::{RootBinding, find_conversation_root};
pub use classify::classify;
pub use collect::{CandidateCollector, Collection, CollectorConfig, Tier, TierId};
pub use error::EngineError;
pub use executor::{MARKER_TAG, execute};
pub use streaming::is_streaming;
pub use thread::build_thread;
pub use trimmer::TrimEngine;
pub use types::{
    BuildMode, EngineCommand, EngineEvent, EnginePolicy, ExecutionReport, MessageDescriptor,
    Phase, SkipReason, SpeedMode, TrimmerState,
};
