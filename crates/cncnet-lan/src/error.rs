use std::net::SocketAddr;

/// Errors opening LAN lobby sockets.
#[derive(Debug, thiserror::Error)]
pub enum LanError {
    /// The lobby listener could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The host could not be reached.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The host did not accept the connection in time.
    #[error("connecting to {0} timed out")]
    ConnectTimeout(SocketAddr),

    /// Any other socket failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
