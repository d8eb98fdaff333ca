//! Length-prefixed framing over byte streams.
//!
//! ```text
//! ┌──────────────────┬──────────────────────────┐
//! │ Length (4 bytes) │ Payload (variable)       │
//! │ Big-endian u32   │ one bridge message       │
//! └──────────────────┴──────────────────────────┘
//! ```
//!
//! The length prefix is network byte order; the payload layout is defined
//! by [`crate::domain::wire`]. A peer announcing a frame larger than
//! [`MAX_FRAME_LEN`] is disconnected.
//!
//! This is not ZMTP. ZeroMQ `PUB`/`SUB` sockets cannot talk to these
//! endpoints; their greeting reads as an oversized frame and the peer is
//! dropped. Both ends must use this crate's transports (or the framing
//! above).

use std::collections::VecDeque;
use std::io::{self, ErrorKind, Read, Write};

pub const MAX_FRAME_LEN: usize = 64 * 1024;
const LEN_PREFIX: usize = 4;
const READ_CHUNK: usize = 4096;

pub(crate) fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(LEN_PREFIX + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// Reassembles frames from arbitrary stream chunks.
#[derive(Debug, Default)]
pub(crate) struct FrameReader {
    buf: Vec<u8>,
}

impl FrameReader {
    pub(crate) fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Next complete frame, `Ok(None)` if more bytes are needed.
    pub(crate) fn next_frame(&mut self) -> io::Result<Option<Vec<u8>>> {
        if self.buf.len() < LEN_PREFIX {
            return Ok(None);
        }
        let mut prefix = [0u8; LEN_PREFIX];
        prefix.copy_from_slice(&self.buf[..LEN_PREFIX]);
        let len = u32::from_be_bytes(prefix) as usize;
        if len > MAX_FRAME_LEN {
            return Err(io::Error::new(
                ErrorKind::InvalidData,
                format!("frame of {len} bytes exceeds {MAX_FRAME_LEN}"),
            ));
        }
        if self.buf.len() < LEN_PREFIX + len {
            return Ok(None);
        }
        let frame = self.buf[LEN_PREFIX..LEN_PREFIX + len].to_vec();
        self.buf.drain(..LEN_PREFIX + len);
        Ok(Some(frame))
    }
}

/// Outcome of draining a non-blocking reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StreamState {
    Open,
    Closed,
}

/// Read everything currently available without blocking.
///
/// The stream must already be in non-blocking mode.
pub(crate) fn read_available<R: Read>(
    stream: &mut R,
    reader: &mut FrameReader,
) -> io::Result<StreamState> {
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        match stream.read(&mut chunk) {
            Ok(0) => return Ok(StreamState::Closed),
            Ok(n) => reader.extend(&chunk[..n]),
            Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(StreamState::Open),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

/// Bounded queue of encoded frames awaiting a non-blocking writer.
#[derive(Debug, Default)]
pub(crate) struct Outbox {
    frames: VecDeque<Vec<u8>>,
    /// Bytes of the front frame already written.
    offset: usize,
}

impl Outbox {
    pub(crate) fn len(&self) -> usize {
        self.frames.len()
    }

    pub(crate) fn push(&mut self, frame: Vec<u8>) {
        self.frames.push_back(frame);
    }

    /// Write queued frames until done or the writer would block.
    ///
    /// Only fatal I/O errors are returned; `WouldBlock` leaves the rest queued.
    pub(crate) fn flush<W: Write>(&mut self, writer: &mut W) -> io::Result<()> {
        while let Some(front) = self.frames.front() {
            match writer.write(&front[self.offset..]) {
                Ok(0) => return Err(io::Error::new(ErrorKind::WriteZero, "peer closed")),
                Ok(n) => {
                    self.offset += n;
                    if self.offset == front.len() {
                        self.frames.pop_front();
                        self.offset = 0;
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(()),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}
