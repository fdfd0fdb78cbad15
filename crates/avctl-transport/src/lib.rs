//! avctl-transport: the two physical transports.
//!
//! - [`serial::SerialChannel`]: line-oriented request/response over a serial
//!   device, one command in flight at a time.
//! - [`pulse::PulseChannel`]: fire-and-forget IR key sequences via the LIRC
//!   daemon socket.

pub mod device;
pub mod error;
pub mod lines;
pub mod pulse;
pub mod serial;

pub use error::TransportError;
pub use lines::LineDecoder;
pub use pulse::PulseChannel;
pub use serial::SerialChannel;
