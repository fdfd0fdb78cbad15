//! avctl-control: everything between the transports and the outside world.
//!
//! - [`registry::ChannelRegistry`] maps channel names to live transports.
//! - [`dispatcher::Dispatcher`] fans an action out and aggregates outcomes.
//! - [`resolver::Resolver`] polls status channels and reduces the answers.
//! - [`device::Device`] ties them together with the Last-Known State.

pub mod device;
pub mod dispatcher;
pub mod error;
pub mod registry;
pub mod resolver;
pub mod transport;

pub use device::{Device, DeviceStatus};
pub use dispatcher::{DispatchReport, Dispatcher};
pub use error::DeviceError;
pub use registry::{ChannelInfo, ChannelRegistry};
pub use resolver::Resolver;
pub use transport::{LineTransport, PulseTransport};
