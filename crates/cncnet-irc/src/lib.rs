//! IRC client for the CnCNet lobby: server ranking, connection lifecycle with
//! bounded reconnects, line parsing and dispatch, and a throttled outbound
//! message queue.

pub mod connection;
pub mod events;
pub mod handler;
pub mod message;
pub mod queue;
pub mod reconnection;
pub mod servers;

pub use connection::{
    ConnectError, ConnectionSettings, ConnectionState, ConnectionStateWatch, IrcConnection,
};
pub use events::IrcEvent;
pub use handler::{Handled, LineHandler};
pub use message::{IrcMessage, IrcParseError, Prefix};
pub use queue::{MessageQueue, QueuedMessage, QueuedMessageType};
pub use reconnection::{ReconnectConfig, ReconnectState};
pub use servers::{
    Candidate, LatencyProbe, Server, ServerSelector, TcpConnectProbe, order_candidates,
};
