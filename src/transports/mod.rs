//! Transport implementations
//!
//! - [`ChannelTransport`]: in-process message queue, for loopback and tests
//! - [`TcpTransport`]: raw TCP stream from a front-end card

pub mod channel;
pub mod tcp;

pub use channel::{ChannelTransport, MessageSender};
pub use tcp::TcpTransport;
