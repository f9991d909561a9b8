use std::error::Error;
use std::fmt::{Display, Formatter};

/// Errors produced by the iexlink crate.
///
/// One enum covers both halves of the library: the binary IEX-TP layer
/// (segment framing and the TOPS/DEEP codecs) and the Socket.IO streaming
/// layer (handshake, transport and subscriptions).
#[derive(Debug)]
pub enum IexError {
    /// Error from the underlying websocket connection.
    WebSocket(tokio_tungstenite::tungstenite::Error),
    /// Error during the Engine.IO long-polling handshake.
    Http(reqwest::Error),
    /// JSON serialization or deserialization failure.
    Serialization(serde_json::Error),
    /// I/O failure while reading a packet source.
    Io(std::io::Error),
    /// A message decoder was handed an empty buffer.
    EmptyBuffer,
    /// A message with a known type byte was shorter than its fixed layout.
    MessageTooShort {
        message_type: u8,
        need: usize,
        got: usize,
    },
    /// A segment payload was shorter than the 40-byte IEX-TP header.
    SegmentHeaderTooShort { got: usize },
    /// A segment referenced a message protocol with no registered decoder.
    UnknownProtocol { id: u16 },
    /// The input ended inside a segment or message block.
    UnexpectedEof,
    /// A different decoder is already registered for this protocol id.
    ProtocolAlreadyRegistered { id: u16 },
    /// Malformed pcap or pcap-ng input.
    Pcap(String),
    /// The transport has been closed; no further operations are possible.
    TransportClosed,
    /// The server's handshake did not offer a websocket upgrade.
    NoWebsocketUpgrade,
    /// The handshake's namespace response was not a Socket.IO Connect.
    UnexpectedNamespaceResponse(String),
    /// A payload expected to contain JSON did not.
    NotJson(String),
    /// `subscribe_to` was called with an empty symbol list.
    NoSymbols,
}

impl Display for IexError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            IexError::WebSocket(e) => write!(f, "websocket error: {}", e),
            IexError::Http(e) => write!(f, "http error: {}", e),
            IexError::Serialization(e) => write!(f, "serialization error: {}", e),
            IexError::Io(e) => write!(f, "i/o error: {}", e),
            IexError::EmptyBuffer => write!(f, "cannot decode a 0-length buffer"),
            IexError::MessageTooShort {
                message_type,
                need,
                got,
            } => write!(
                f,
                "cannot decode message type 0x{:02X} from {}-byte buffer (need {})",
                message_type, got, need
            ),
            IexError::SegmentHeaderTooShort { got } => write!(
                f,
                "cannot decode segment header from {}-byte buffer (need 40)",
                got
            ),
            IexError::UnknownProtocol { id } => {
                write!(f, "no decoder registered for protocol 0x{:04X}", id)
            }
            IexError::UnexpectedEof => write!(f, "unexpected end of input"),
            IexError::ProtocolAlreadyRegistered { id } => write!(
                f,
                "a different decoder is already registered for protocol 0x{:04X}",
                id
            ),
            IexError::Pcap(msg) => write!(f, "pcap error: {}", msg),
            IexError::TransportClosed => write!(f, "transport is closed"),
            IexError::NoWebsocketUpgrade => {
                write!(f, "websocket upgrade not offered by server")
            }
            IexError::UnexpectedNamespaceResponse(msg) => {
                write!(f, "unexpected namespace response: {}", msg)
            }
            IexError::NotJson(data) => write!(f, "payload is not JSON: {}", data),
            IexError::NoSymbols => write!(f, "cannot subscribe with no symbols"),
        }
    }
}

impl Error for IexError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            IexError::WebSocket(e) => Some(e),
            IexError::Http(e) => Some(e),
            IexError::Serialization(e) => Some(e),
            IexError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for IexError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        IexError::WebSocket(e)
    }
}

impl From<reqwest::Error> for IexError {
    fn from(e: reqwest::Error) -> Self {
        IexError::Http(e)
    }
}

impl From<serde_json::Error> for IexError {
    fn from(e: serde_json::Error) -> Self {
        IexError::Serialization(e)
    }
}

impl From<std::io::Error> for IexError {
    fn from(e: std::io::Error) -> Self {
        IexError::Io(e)
    }
}

/// A type alias for `Result<T, IexError>`.
pub type IexResult<T> = Result<T, IexError>;
