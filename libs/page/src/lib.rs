pub mod dom;
pub mod error;
pub mod observer;
pub mod query;
pub mod shared;

pub use dom::{NodeId, PageDom};
pub use error::PageError;
pub use observer::{MutationKind, MutationRecord, ObserverConfig, ObserverHandle};
pub use query::Query;
pub use shared::SharedDom;
