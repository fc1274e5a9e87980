pub mod error;
pub mod obd;
pub mod pid;
pub mod types;

pub use error::{ProtocolError, ProtocolResult};
pub use obd::{build_request, is_obd_response, parse_response, parse_supported_pids};
pub use pid::{Formula, PID_TABLE, PidDescriptor};
pub use types::{PidReading, PollResult};
