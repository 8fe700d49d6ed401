//! Tracker opcodes, request parsing, and response encoding.

use serde_json::{json, Value};

use crate::error::{ProtocolError, Result};

/// Tracker opcodes.
///
/// The first element of every request array, and the status code of every
/// reply. The numbering is shared with existing peers and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TrackerCode {
    /// Failure status. Accepted from peers and ignored.
    Fail = 0,
    /// Success status. Accepted from peers and ignored.
    Success = 1,
    /// Liveness probe.
    Ping = 2,
    /// Shut the tracker down.
    Stop = 3,
    /// Advertise one worker slot under a key.
    Put = 4,
    /// Request one worker for a key.
    Request = 5,
    /// Set the session's self-reported key.
    UpdateInfo = 6,
    /// Queue and server overview.
    Summary = 7,
    /// The session's own unconsumed match keys.
    GetPendingMatchkeys = 8,
}

impl TrackerCode {
    /// Returns the numeric value of this opcode.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Creates an opcode from a numeric value.
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Fail),
            1 => Some(Self::Success),
            2 => Some(Self::Ping),
            3 => Some(Self::Stop),
            4 => Some(Self::Put),
            5 => Some(Self::Request),
            6 => Some(Self::UpdateInfo),
            7 => Some(Self::Summary),
            8 => Some(Self::GetPendingMatchkeys),
            _ => None,
        }
    }
}

impl std::fmt::Display for TrackerCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fail => write!(f, "fail"),
            Self::Success => write!(f, "success"),
            Self::Ping => write!(f, "ping"),
            Self::Stop => write!(f, "stop"),
            Self::Put => write!(f, "put"),
            Self::Request => write!(f, "request"),
            Self::UpdateInfo => write!(f, "update_info"),
            Self::Summary => write!(f, "summary"),
            Self::GetPendingMatchkeys => write!(f, "get_pending_matchkeys"),
        }
    }
}

/// A decoded request frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerRequest {
    /// Failure status from a peer; ignored.
    Fail,
    /// Success status from a peer; ignored.
    Success,
    /// Liveness probe.
    Ping,
    /// Shutdown request.
    Stop,
    /// One advertised worker slot.
    Put {
        /// Grouping key the slot is advertised under.
        key: String,
        /// Port the worker listens on.
        port: u16,
        /// Opaque identifier of this specific offer.
        match_key: String,
        /// Optional address override; peer address is used when absent.
        address: Option<String>,
    },
    /// One pending request for a worker.
    Request {
        /// Grouping key to request a worker from.
        key: String,
        /// Requester label, for reporting only.
        user: String,
        /// Higher is more urgent.
        priority: i64,
    },
    /// Self-reported session key, e.g. `"server:rasp3b"`.
    UpdateInfo { key: String },
    /// Queue and server overview.
    Summary,
    /// The session's own unconsumed match keys.
    GetPendingMatchkeys,
}

impl TrackerRequest {
    /// Parses one request frame payload.
    ///
    /// Requests are heterogeneous JSON arrays led by a [`TrackerCode`].
    /// Anything that is not an array, carries an unknown opcode, or does
    /// not match the opcode's argument shape is an error; the caller is
    /// expected to drop the session without replying.
    pub fn parse(payload: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(payload)
            .map_err(|e| ProtocolError::invalid(format!("request is not JSON: {e}")))?;
        let items = value
            .as_array()
            .ok_or_else(|| ProtocolError::invalid("request is not a JSON array"))?;

        let opcode = items
            .first()
            .and_then(Value::as_u64)
            .ok_or_else(|| ProtocolError::invalid("missing opcode"))?;
        let code = u8::try_from(opcode)
            .ok()
            .and_then(TrackerCode::from_u8)
            .ok_or(ProtocolError::UnknownOpcode(opcode))?;

        match code {
            TrackerCode::Fail => Ok(Self::Fail),
            TrackerCode::Success => Ok(Self::Success),
            TrackerCode::Ping => Ok(Self::Ping),
            TrackerCode::Stop => Ok(Self::Stop),
            TrackerCode::Put => Self::parse_put(items),
            TrackerCode::Request => Self::parse_request(items),
            TrackerCode::UpdateInfo => Self::parse_update_info(items),
            TrackerCode::Summary => Ok(Self::Summary),
            TrackerCode::GetPendingMatchkeys => Ok(Self::GetPendingMatchkeys),
        }
    }

    /// `[4, key, [port, match_key, addr?], addr?]`
    ///
    /// Existing peers have emitted the address override both as a third
    /// element of the inner array and as a fourth element of the outer
    /// message; both are accepted. A non-string, empty, or literal
    /// `"null"` override means the peer address applies.
    fn parse_put(items: &[Value]) -> Result<Self> {
        let key = required_str(items, 1, "put key")?;
        let slot = items
            .get(2)
            .and_then(Value::as_array)
            .ok_or_else(|| ProtocolError::invalid("put slot is not an array"))?;

        let port = slot
            .first()
            .and_then(Value::as_u64)
            .and_then(|p| u16::try_from(p).ok())
            .ok_or_else(|| ProtocolError::invalid("put port is not a valid port number"))?;
        let match_key = slot
            .get(1)
            .and_then(Value::as_str)
            .ok_or_else(|| ProtocolError::invalid("put match_key is not a string"))?
            .to_owned();

        let address = address_override(slot.get(2)).or_else(|| address_override(items.get(3)));

        Ok(Self::Put {
            key,
            port,
            match_key,
            address,
        })
    }

    /// `[5, key, user, priority]`
    fn parse_request(items: &[Value]) -> Result<Self> {
        let key = required_str(items, 1, "request key")?;
        let user = required_str(items, 2, "request user")?;
        let priority = items
            .get(3)
            .and_then(Value::as_i64)
            .ok_or_else(|| ProtocolError::invalid("request priority is not an integer"))?;

        Ok(Self::Request {
            key,
            user,
            priority,
        })
    }

    /// `[6, {"key": value}]`; the member name is not inspected.
    fn parse_update_info(items: &[Value]) -> Result<Self> {
        let info = items
            .get(1)
            .and_then(Value::as_object)
            .ok_or_else(|| ProtocolError::invalid("update_info payload is not an object"))?;
        let key = info
            .values()
            .next()
            .and_then(Value::as_str)
            .ok_or_else(|| ProtocolError::invalid("update_info value is not a string"))?
            .to_owned();

        Ok(Self::UpdateInfo { key })
    }
}

fn required_str(items: &[Value], index: usize, what: &str) -> Result<String> {
    items
        .get(index)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| ProtocolError::invalid(format!("{what} is not a string")))
}

fn address_override(value: Option<&Value>) -> Option<String> {
    match value.and_then(Value::as_str) {
        Some("") | Some("null") | None => None,
        Some(addr) => Some(addr.to_owned()),
    }
}

/// Status value peers expect in affirmative replies.
///
/// This is a reply-channel constant, not a request opcode: the ecosystem's
/// clients compare the leading status of every reply against `2`.
pub const STATUS_SUCCESS: u8 = 2;

/// A reply frame, prior to encoding.
///
/// The wire shape is deliberately asymmetric: bare status replies are the
/// ASCII decimal of the status rather than a JSON array, while match and
/// summary replies are arrays. Existing peers depend on both shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerResponse {
    /// Bare success status.
    Success,
    /// A paired worker handed to a requester.
    Match {
        address: String,
        port: u16,
        match_key: String,
    },
    /// Queue and server overview.
    Summary {
        queue_info: Value,
        server_info: Value,
    },
    /// A session's unconsumed match keys.
    MatchKeys(Vec<String>),
}

impl TrackerResponse {
    /// Encodes the reply to its frame payload.
    pub fn encode(&self) -> String {
        match self {
            Self::Success => STATUS_SUCCESS.to_string(),
            Self::Match {
                address,
                port,
                match_key,
            } => json!([STATUS_SUCCESS, [address, port, match_key]]).to_string(),
            Self::Summary {
                queue_info,
                server_info,
            } => json!([
                STATUS_SUCCESS,
                {"queue_info": queue_info, "server_info": server_info}
            ])
            .to_string(),
            Self::MatchKeys(keys) => json!(keys).to_string(),
        }
    }
}
