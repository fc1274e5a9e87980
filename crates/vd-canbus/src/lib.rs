pub mod error;
pub mod interface;
pub mod mock;
pub mod queue;
pub mod transport;
pub mod types;

pub use error::{TransportError, TransportResult};
pub use interface::CanController;
#[cfg(target_os = "linux")]
pub use interface::SocketCanController;
pub use mock::MockCanController;
pub use queue::{TransportStats, TransportStatsSnapshot};
pub use transport::BusTransport;
pub use types::{BusConfig, CanFrame, MAX_DLC};
