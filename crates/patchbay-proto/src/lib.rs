//! Wire protocol for the patchbay resource tracker.
//!
//! Trackers and their peers (worker endpoints and requesters) exchange
//! JSON messages over TCP with a minimal length-prefixed framing:
//!
//! ```text
//! ┌──────────────────────────┬──────────────────────────────────┐
//! │ Payload length (4 bytes, │        UTF-8 JSON payload        │
//! │      little-endian)      │                                  │
//! └──────────────────────────┴──────────────────────────────────┘
//! ```
//!
//! Before any frame is exchanged a peer sends [`RPC_TRACKER_MAGIC`] as a
//! raw (un-framed) 4-byte little-endian integer; the tracker echoes the
//! same bytes back and closes the connection on mismatch.
//!
//! Requests are heterogeneous JSON arrays whose first element is a
//! [`TrackerCode`] opcode. Responses come in two shapes, preserved for
//! compatibility with existing peers: bare status codes are the ASCII
//! decimal of the code (`"2"`), while match and summary replies are JSON
//! arrays. See [`TrackerResponse::encode`].

pub mod codec;
mod error;
mod message;

pub use codec::{read_frame, write_frame, FRAME_PREFIX_SIZE, MAX_FRAME_SIZE};
pub use error::{ProtocolError, Result};
pub use message::{TrackerCode, TrackerRequest, TrackerResponse, STATUS_SUCCESS};

/// Handshake constant shared with the wider RPC ecosystem.
///
/// Sent by a connecting peer as a raw 4-byte little-endian integer and
/// echoed verbatim by the tracker on acceptance.
pub const RPC_TRACKER_MAGIC: u32 = 0x2f271;
