//! Message channel between the bridge and its host

pub mod channel;
pub mod protocol;
pub mod transport;

pub use channel::Channel;
pub use protocol::{Envelope, SessionRequest};
