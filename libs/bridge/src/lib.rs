pub mod capabilities;
pub mod error;
pub mod logging;
pub mod messaging;
pub mod store;

pub use capabilities::{
    HostCapabilities, HostFlavor, HostProbe, MemoryCapabilities, TabInfo, detect_flavor,
};
pub use error::BridgeError;
pub use logging::init_logging;
pub use messaging::{ExchangeConfig, MessageTransport, Request, Response, TransportError, exchange};
pub use store::{SETTINGS_KEY, SettingsStore};
