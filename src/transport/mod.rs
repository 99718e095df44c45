//! Network transports that connect groups on different nodes.

pub mod http;
