//! Socket.IO / Engine.IO packet codec.
//!
//! IEX's streaming interface speaks Socket.IO over Engine.IO. On the
//! websocket, a frame is `<engine type><socket type?></namespace,>?<body>`
//! where each type is one ASCII digit; the HTTP long-polling form used
//! during the handshake prepends a `<length>:` prefix and may concatenate
//! several frames in one response body.

use serde::de::DeserializeOwned;

use crate::error::{IexError, IexResult};

/// Engine.IO packet types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    Open,
    Close,
    Ping,
    Pong,
    Message,
    Upgrade,
    Noop,
}

impl PacketType {
    fn digit(self) -> char {
        match self {
            PacketType::Open => '0',
            PacketType::Close => '1',
            PacketType::Ping => '2',
            PacketType::Pong => '3',
            PacketType::Message => '4',
            PacketType::Upgrade => '5',
            PacketType::Noop => '6',
        }
    }

    fn from_digit(c: char) -> Option<PacketType> {
        match c {
            '0' => Some(PacketType::Open),
            '1' => Some(PacketType::Close),
            '2' => Some(PacketType::Ping),
            '3' => Some(PacketType::Pong),
            '4' => Some(PacketType::Message),
            '5' => Some(PacketType::Upgrade),
            '6' => Some(PacketType::Noop),
            _ => None,
        }
    }
}

/// Socket.IO message types, valid only inside an Engine.IO
/// [`PacketType::Message`] packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Connect,
    Disconnect,
    Event,
    Ack,
    Error,
}

impl MessageType {
    fn digit(self) -> char {
        match self {
            MessageType::Connect => '0',
            MessageType::Disconnect => '1',
            MessageType::Event => '2',
            MessageType::Ack => '3',
            MessageType::Error => '4',
        }
    }

    fn from_digit(c: char) -> Option<MessageType> {
        match c {
            '0' => Some(MessageType::Connect),
            '1' => Some(MessageType::Disconnect),
            '2' => Some(MessageType::Event),
            '3' => Some(MessageType::Ack),
            '4' => Some(MessageType::Error),
            _ => None,
        }
    }
}

/// A decoded Socket.IO frame: its type digits, the namespace it is
/// addressed to (empty for the default namespace), and the body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PacketData {
    pub packet_type: Option<PacketType>,
    pub message_type: Option<MessageType>,
    pub namespace: String,
    pub data: String,
}

/// Encodes frames for the websocket transport, addressed to one
/// namespace. Either type digit may be omitted.
pub struct WsEncoder {
    namespace: String,
}

impl WsEncoder {
    /// `namespace` is a path like `/1.0/tops`, or empty for the default
    /// namespace.
    pub fn new(namespace: impl Into<String>) -> WsEncoder {
        WsEncoder {
            namespace: namespace.into(),
        }
    }

    /// Encode a bodyless frame: type digits and namespace only.
    pub fn encode_packet(
        &self,
        packet: Option<PacketType>,
        message: Option<MessageType>,
    ) -> String {
        let mut out = String::new();
        if let Some(p) = packet {
            out.push(p.digit());
        }
        if let Some(m) = message {
            out.push(m.digit());
        }
        if !self.namespace.is_empty() {
            out.push_str(&self.namespace);
            out.push(',');
        }
        out
    }

    /// Encode an event frame whose body is the JSON array
    /// `[event, data]`, e.g. `42/1.0/tops,["subscribe","FB,SNAP"]`.
    pub fn encode_message(
        &self,
        packet: Option<PacketType>,
        message: Option<MessageType>,
        event: &str,
        data: &str,
    ) -> IexResult<String> {
        let mut out = self.encode_packet(packet, message);
        out.push_str(&serde_json::to_string(&[event, data])?);
        Ok(out)
    }
}

/// Encodes frames for HTTP long-polling: the websocket form wrapped in a
/// `<length>:` prefix.
pub struct HttpEncoder {
    inner: WsEncoder,
}

impl HttpEncoder {
    pub fn new(namespace: impl Into<String>) -> HttpEncoder {
        HttpEncoder {
            inner: WsEncoder::new(namespace),
        }
    }

    pub fn encode_packet(
        &self,
        packet: Option<PacketType>,
        message: Option<MessageType>,
    ) -> String {
        let frame = self.inner.encode_packet(packet, message);
        format!("{}:{}", frame.len(), frame)
    }

    pub fn encode_message(
        &self,
        packet: Option<PacketType>,
        message: Option<MessageType>,
        event: &str,
        data: &str,
    ) -> IexResult<String> {
        let frame = self.inner.encode_message(packet, message, event, data)?;
        Ok(format!("{}:{}", frame.len(), frame))
    }
}

/// Peel the leading type digits and namespace off a frame. Whatever
/// remains is the body, stored in `data`.
pub fn parse_metadata(input: &str) -> PacketData {
    let mut rest = input;
    let mut packet_type = None;
    let mut message_type = None;

    if let Some(c) = rest.chars().next() {
        if let Some(p) = PacketType::from_digit(c) {
            packet_type = Some(p);
            rest = &rest[1..];
            if let Some(c) = rest.chars().next() {
                if let Some(m) = MessageType::from_digit(c) {
                    message_type = Some(m);
                    rest = &rest[1..];
                }
            }
        }
    }

    let mut namespace = String::new();
    if rest.starts_with('/') {
        match rest.split_once(',') {
            Some((ns, remainder)) => {
                namespace = ns.to_string();
                rest = remainder;
            }
            None => {
                namespace = rest.to_string();
                rest = "";
            }
        }
    }

    PacketData {
        packet_type,
        message_type,
        namespace,
        data: rest.to_string(),
    }
}

/// Decode a frame body into `T`.
///
/// IEX delivers payloads in two shapes: a Socket.IO event array
/// `["messageline", "<JSON-escaped object>"]`, and a bare JSON object.
/// The array form must be tried first (its second element is a string
/// containing the actual message), with the bare form as the fallback.
/// Input that is not JSON at all fails with [`IexError::NotJson`].
pub fn parse_to_json<T: DeserializeOwned>(data: &str) -> IexResult<T> {
    if let Ok(array) = serde_json::from_str::<Vec<serde_json::Value>>(data) {
        if array.len() == 2 {
            if let Some(escaped) = array[1].as_str() {
                if let Ok(value) = serde_json::from_str::<T>(escaped) {
                    return Ok(value);
                }
            }
        }
    }

    if serde_json::from_str::<serde_json::Value>(data).is_err() {
        return Err(IexError::NotJson(data.to_string()));
    }
    serde_json::from_str::<T>(data).map_err(IexError::from)
}

/// Split an HTTP long-polling response body into its frames.
///
/// Repeatedly peels `<length>:<frame>`; a body with no parseable length
/// prefix is treated as one bare frame.
pub fn parse_frames(input: &str) -> Vec<PacketData> {
    let mut frames = Vec::new();
    let mut rest = input;
    while !rest.is_empty() {
        let (frame, leftover) = split_on_length(rest);
        frames.push(parse_metadata(frame));
        rest = leftover;
    }
    frames
}

/// Split `<length>:<data>` on the first colon. If the prefix is not a
/// length that fits the remainder, the whole input is the frame.
fn split_on_length(input: &str) -> (&str, &str) {
    if let Some((prefix, rest)) = input.split_once(':') {
        if let Ok(length) = prefix.parse::<usize>() {
            if rest.len() >= length && rest.is_char_boundary(length) {
                return (&rest[..length], &rest[length..]);
            }
        }
    }
    (input, "")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_encode_subscribe_event() {
        let encoder = WsEncoder::new("/1.0/tops");
        let frame = encoder
            .encode_message(
                Some(PacketType::Message),
                Some(MessageType::Event),
                "subscribe",
                "FB,SNAP",
            )
            .unwrap();
        assert_eq!(frame, r#"42/1.0/tops,["subscribe","FB,SNAP"]"#);
    }

    #[test]
    fn test_encode_packet_namespace_connect() {
        let encoder = WsEncoder::new("/1.0/deep");
        let frame = encoder.encode_packet(Some(PacketType::Message), Some(MessageType::Connect));
        assert_eq!(frame, "40/1.0/deep,");
    }

    #[test]
    fn test_encode_packet_without_namespace() {
        let encoder = WsEncoder::new("");
        assert_eq!(encoder.encode_packet(Some(PacketType::Ping), None), "2");
        assert_eq!(encoder.encode_packet(Some(PacketType::Close), None), "1");
        assert_eq!(encoder.encode_packet(Some(PacketType::Upgrade), None), "5");
    }

    #[test]
    fn test_encode_message_escapes_embedded_json() {
        let encoder = WsEncoder::new("/1.0/deep");
        let frame = encoder
            .encode_message(
                Some(PacketType::Message),
                Some(MessageType::Event),
                "subscribe",
                r#"{"symbols":["AAPL"],"channels":["deep"]}"#,
            )
            .unwrap();
        assert_eq!(
            frame,
            r#"42/1.0/deep,["subscribe","{\"symbols\":[\"AAPL\"],\"channels\":[\"deep\"]}"]"#
        );
    }

    #[test]
    fn test_http_encoder_prepends_length() {
        let encoder = HttpEncoder::new("");
        let frame = encoder.encode_packet(Some(PacketType::Message), Some(MessageType::Connect));
        assert_eq!(frame, "2:40");

        let encoder = HttpEncoder::new("/1.0/last");
        let frame = encoder
            .encode_message(
                Some(PacketType::Message),
                Some(MessageType::Event),
                "subscribe",
                "FB",
            )
            .unwrap();
        assert_eq!(frame, r#"28:42/1.0/last,["subscribe","FB"]"#);
    }

    #[test]
    fn test_parse_metadata_full_frame() {
        let parsed = parse_metadata(r#"42/1.0/tops,["message","{\"symbol\":\"FB\"}"]"#);
        assert_eq!(parsed.packet_type, Some(PacketType::Message));
        assert_eq!(parsed.message_type, Some(MessageType::Event));
        assert_eq!(parsed.namespace, "/1.0/tops");
        assert_eq!(parsed.data, r#"["message","{\"symbol\":\"FB\"}"]"#);
    }

    #[test]
    fn test_parse_metadata_packet_only() {
        let parsed = parse_metadata("3");
        assert_eq!(parsed.packet_type, Some(PacketType::Pong));
        assert_eq!(parsed.message_type, None);
        assert_eq!(parsed.namespace, "");
        assert_eq!(parsed.data, "");
    }

    #[test]
    fn test_parse_metadata_open_packet_with_body() {
        let parsed = parse_metadata(r#"0{"sid":"abc","pingInterval":25000}"#);
        assert_eq!(parsed.packet_type, Some(PacketType::Open));
        assert_eq!(parsed.message_type, None);
        assert_eq!(parsed.data, r#"{"sid":"abc","pingInterval":25000}"#);
    }

    #[test]
    fn test_parse_metadata_namespace_without_body() {
        let parsed = parse_metadata("41/1.0/tops,");
        assert_eq!(parsed.packet_type, Some(PacketType::Message));
        assert_eq!(parsed.message_type, Some(MessageType::Disconnect));
        assert_eq!(parsed.namespace, "/1.0/tops");
        assert_eq!(parsed.data, "");
    }

    #[test]
    fn test_encode_decode_identity() {
        let encoder = WsEncoder::new("/1.0/last");
        let frame = encoder
            .encode_message(
                Some(PacketType::Message),
                Some(MessageType::Event),
                "subscribe",
                "AIG+",
            )
            .unwrap();

        let parsed = parse_metadata(&frame);
        assert_eq!(parsed.packet_type, Some(PacketType::Message));
        assert_eq!(parsed.message_type, Some(MessageType::Event));
        assert_eq!(parsed.namespace, "/1.0/last");
        assert_eq!(parsed.data, r#"["subscribe","AIG+"]"#);
    }

    #[derive(Debug, PartialEq, Deserialize)]
    struct Sample {
        symbol: String,
        price: f64,
    }

    #[test]
    fn test_parse_to_json_array_form() {
        let data = r#"["message","{\"symbol\":\"FB\",\"price\":170.5}"]"#;
        let sample: Sample = parse_to_json(data).unwrap();
        assert_eq!(
            sample,
            Sample {
                symbol: "FB".to_string(),
                price: 170.5,
            }
        );
    }

    #[test]
    fn test_parse_to_json_object_fallback() {
        let data = r#"{"symbol":"GOOG","price":941.3}"#;
        let sample: Sample = parse_to_json(data).unwrap();
        assert_eq!(sample.symbol, "GOOG");
    }

    #[test]
    fn test_parse_to_json_not_json() {
        match parse_to_json::<Sample>("probe") {
            Err(IexError::NotJson(data)) => assert_eq!(data, "probe"),
            other => panic!("expected NotJson, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_frames_multiple() {
        let open =
            r#"0{"sid":"x","upgrades":["websocket"],"pingInterval":25000,"pingTimeout":60000}"#;
        let body = format!("{}:{}2:40", open.len(), open);
        let frames = parse_frames(&body);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].packet_type, Some(PacketType::Open));
        assert_eq!(frames[1].packet_type, Some(PacketType::Message));
        assert_eq!(frames[1].message_type, Some(MessageType::Connect));
    }

    #[test]
    fn test_parse_frames_without_length_prefix() {
        let frames = parse_frames("40");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].packet_type, Some(PacketType::Message));
        assert_eq!(frames[0].message_type, Some(MessageType::Connect));
    }
}
