//! Infrastructure adapters between the coordinator and the network.

pub mod transport;

pub use transport::{TcpTransport, Transport};
