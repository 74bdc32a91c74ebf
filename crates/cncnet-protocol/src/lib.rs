//! Shared text-protocol plumbing for the IRC and LAN lobby transports:
//! in-band command dispatch, separator framing, and CTCP quoting.

pub mod ctcp;
pub mod dispatch;
pub mod framing;

pub use ctcp::{CTCP_DELIMITER, is_ctcp, unwrap_ctcp, wrap_ctcp};
pub use dispatch::CommandTable;
pub use framing::{FrameBuffer, FrameError, FrameReader, READ_CHUNK_SIZE};
