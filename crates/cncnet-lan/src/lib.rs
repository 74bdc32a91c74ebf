//! Raw-TCP LAN lobby protocol: frame codecs and command tables, the lobby
//! host and client, connection liveness, and UDP game advertisement.

pub mod client;
pub mod discovery;
pub mod error;
pub mod frames;
pub mod host;
pub mod liveness;
pub mod platform;

pub use client::{ClientEvent, ClientSettings, LanClient};
pub use discovery::{Advertisement, advertise_loop};
pub use error::LanError;
pub use frames::{
    ClientCommand, ClientFrameDecoder, HostCommand, HostFrameDecoder, LanCodec, LanOptions,
    LanOptionsPlayer, parse_join,
};
pub use host::{ConnectionId, DisconnectReason, HostEvent, HostSettings, LanHost};
pub use liveness::{Activity, Liveness};
pub use platform::{SocketConfig, create_broadcast_socket, lobby_bind_address};
