//! Gateway core: the persistent upstream agent connection and the
//! inbound socket event router.
//!
//! The [`upstream::GatewayManager`] owns exactly one logical connection to
//! the external agent process and brokers request/response correlation
//! over it; [`server::GatewayServer`] is the WebSocket event channel
//! serving browser clients and skill-providing bots.

pub mod config;
pub mod connections;
pub mod error;
pub mod protocol;
pub mod server;
pub mod testing;
pub mod upstream;

pub use config::GatewayConfig;
pub use error::GatewayError;
pub use server::GatewayServer;
pub use upstream::{ChatOutcome, GatewayManager, IncomingMessage, UpstreamTransport, WsTransport};
