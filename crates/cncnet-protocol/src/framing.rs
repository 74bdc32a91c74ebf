//! Separator-delimited framing for text protocols over TCP.
//!
//! IRC lines end in `\n`; LAN frames end in a configured separator byte.
//! Reads can deliver several frames at once or stop in the middle of one, so
//! [`FrameBuffer`] keeps the incomplete tail and prepends it to the next read.
//!
//! ```text
//! read 1: "CHAT\x01hel"          -> []                  carry "CHAT\x01hel"
//! read 2: "lo\x02GAME_START\x02" -> ["CHAT\x01hello",
//!                                    "GAME_START"]       carry ""
//! ```
//!
//! Frames are decoded as UTF-8 after splitting, so a multi-byte character cut
//! in half by a read boundary is reassembled before decoding.

use tokio::io::{AsyncRead, AsyncReadExt};

/// Size of each socket read.
pub const READ_CHUNK_SIZE: usize = 4096;

/// Default cap on the carried-over tail. A peer that never sends a separator
/// cannot grow the buffer without bound.
const DEFAULT_MAX_FRAME: usize = 64 * 1024;

/// Errors that can occur while reading frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The carried-over tail exceeded the maximum frame size.
    #[error("frame exceeds maximum size {max}")]
    FrameTooLarge {
        /// The configured maximum.
        max: usize,
    },

    /// The peer closed the connection (zero-byte read).
    #[error("connection closed")]
    ConnectionClosed,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Accumulates raw bytes and yields complete separator-terminated frames.
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    separator: u8,
    carry: Vec<u8>,
    max_frame: usize,
}

impl FrameBuffer {
    /// Create a buffer splitting on `separator`.
    pub fn new(separator: u8) -> Self {
        Self::with_max_frame(separator, DEFAULT_MAX_FRAME)
    }

    /// Create a buffer with an explicit cap on unterminated data.
    pub fn with_max_frame(separator: u8, max_frame: usize) -> Self {
        Self {
            separator,
            carry: Vec::new(),
            max_frame,
        }
    }

    /// Append `bytes` and return every frame completed by them.
    ///
    /// Empty frames (two separators in a row) are skipped. A trailing `\r`
    /// is stripped when splitting on `\n`.
    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<String>, FrameError> {
        self.carry.extend_from_slice(bytes);

        let mut frames = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.carry[start..].iter().position(|b| *b == self.separator) {
            let end = start + offset;
            let mut frame = &self.carry[start..end];
            if self.separator == b'\n'
                && let Some(stripped) = frame.strip_suffix(b"\r")
            {
                frame = stripped;
            }
            if !frame.is_empty() {
                frames.push(String::from_utf8_lossy(frame).into_owned());
            }
            start = end + 1;
        }
        self.carry.drain(..start);

        if self.carry.len() > self.max_frame {
            self.carry.clear();
            return Err(FrameError::FrameTooLarge {
                max: self.max_frame,
            });
        }

        Ok(frames)
    }

    /// Bytes waiting for their separator.
    pub fn pending(&self) -> usize {
        self.carry.len()
    }

    /// Discard any partial frame.
    pub fn clear(&mut self) {
        self.carry.clear();
    }
}

/// Reads frames from an async byte stream in fixed-size chunks.
pub struct FrameReader<R> {
    reader: R,
    buffer: FrameBuffer,
    chunk: Box<[u8; READ_CHUNK_SIZE]>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Wrap `reader`, splitting on `separator`.
    pub fn new(reader: R, separator: u8) -> Self {
        Self {
            reader,
            buffer: FrameBuffer::new(separator),
            chunk: Box::new([0u8; READ_CHUNK_SIZE]),
        }
    }

    /// Perform one read and return the frames it completed (possibly none).
    ///
    /// Returns [`FrameError::ConnectionClosed`] on a zero-byte read.
    pub async fn read_frames(&mut self) -> Result<Vec<String>, FrameError> {
        let n = self.reader.read(&mut self.chunk[..]).await?;
        if n == 0 {
            return Err(FrameError::ConnectionClosed);
        }
        self.buffer.push(&self.chunk[..n])
    }

    /// Unwrap into the underlying reader, discarding buffered bytes.
    pub fn into_inner(self) -> R {
        self.reader
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncWriteExt, duplex};

    #[test]
    fn test_single_frame() {
        let mut buf = FrameBuffer::new(0x02);
        let frames = buf.push(b"GAME_START\x02").unwrap();
        assert_eq!(frames, vec!["GAME_START"]);
        assert_eq!(buf.pending(), 0);
    }

    #[test]
    fn test_concatenated_frames_in_one_read() {
        let mut buf = FrameBuffer::new(0x02);
        let frames = buf.push(b"READY_STATUS\x02FILE_HASH\x01abc\x02").unwrap();
        assert_eq!(frames, vec!["READY_STATUS", "FILE_HASH\u{1}abc"]);
    }

    #[test]
    fn test_fragmented_frame_is_carried_over() {
        let mut buf = FrameBuffer::new(0x02);
        assert!(buf.push(b"CHAT\x01hel").unwrap().is_empty());
        assert_eq!(buf.pending(), 8);
        let frames = buf.push(b"lo\x02GAME_").unwrap();
        assert_eq!(frames, vec!["CHAT\u{1}hello"]);
        let frames = buf.push(b"START\x02").unwrap();
        assert_eq!(frames, vec!["GAME_START"]);
    }

    #[test]
    fn test_multibyte_char_split_across_reads() {
        let mut buf = FrameBuffer::new(b'\n');
        let text = "hé\n".as_bytes();
        assert!(buf.push(&text[..2]).unwrap().is_empty());
        assert_eq!(buf.push(&text[2..]).unwrap(), vec!["hé"]);
    }

    #[test]
    fn test_crlf_stripped_for_line_framing() {
        let mut buf = FrameBuffer::new(b'\n');
        let frames = buf.push(b"PING :irc.example\r\n:srv 001 me :hi\r\n").unwrap();
        assert_eq!(frames, vec!["PING :irc.example", ":srv 001 me :hi"]);
    }

    #[test]
    fn test_empty_frames_skipped() {
        let mut buf = FrameBuffer::new(0x02);
        assert_eq!(buf.push(b"\x02\x02QUIT\x02").unwrap(), vec!["QUIT"]);
    }

    #[test]
    fn test_oversized_tail_rejected() {
        let mut buf = FrameBuffer::with_max_frame(0x02, 8);
        let result = buf.push(b"0123456789");
        assert!(matches!(result, Err(FrameError::FrameTooLarge { max: 8 })));
        assert_eq!(buf.pending(), 0);
    }

    #[tokio::test]
    async fn test_reader_yields_frames_from_stream() {
        let (mut client, server) = duplex(64);
        let mut reader = FrameReader::new(server, 0x02);

        client.write_all(b"PING\x02CHAT\x010\x01hi\x02").await.unwrap();
        let frames = reader.read_frames().await.unwrap();
        assert_eq!(frames, vec!["PING", "CHAT\u{1}0\u{1}hi"]);
    }

    #[tokio::test]
    async fn test_reader_reports_closed_connection() {
        let (client, server) = duplex(64);
        drop(client);
        let mut reader = FrameReader::new(server, 0x02);
        assert!(matches!(
            reader.read_frames().await,
            Err(FrameError::ConnectionClosed)
        ));
    }
}
