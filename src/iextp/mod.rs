//! IEX Transport Protocol (IEX-TP) segment framing.
//!
//! An IEX-TP segment is a 40-byte little-endian header followed by
//! `message_count` length-prefixed message blocks. The bytes of each block
//! belong to a higher-layer message protocol (TOPS or DEEP), identified by
//! the header's `message_protocol_id` and decoded through a [`Registry`].

pub mod deep;
pub mod tops;

use std::collections::HashMap;
use std::io::Read;

use chrono::{DateTime, Utc};

use crate::error::{IexError, IexResult};

pub(crate) fn le_u16(buf: &[u8]) -> u16 {
    u16::from_le_bytes([buf[0], buf[1]])
}

pub(crate) fn le_u32(buf: &[u8]) -> u32 {
    u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]])
}

pub(crate) fn le_i64(buf: &[u8]) -> i64 {
    i64::from_le_bytes([
        buf[0], buf[1], buf[2], buf[3], buf[4], buf[5], buf[6], buf[7],
    ])
}

/// Decode the IEX timestamp type: 8 bytes, a signed little-endian counter
/// of nanoseconds since the POSIX epoch, presented in UTC.
///
/// Callers pass exact-size slices; a shorter slice is a programming error
/// and panics.
pub(crate) fn parse_timestamp(buf: &[u8]) -> DateTime<Utc> {
    DateTime::from_timestamp_nanos(le_i64(buf))
}

/// Decode the IEX price type: 8 bytes, a signed little-endian fixed-point
/// number with 4 digits to the right of an implied decimal point.
///
/// The conversion to `f64` is exact for every price representable within
/// the TOPS/DEEP ranges; beyond ~15 significant decimal digits it rounds.
pub(crate) fn parse_price(buf: &[u8]) -> f64 {
    le_i64(buf) as f64 / 10_000.0
}

/// Decode the IEX string type: a fixed-length ASCII sequence, left
/// justified and space filled on the right.
pub(crate) fn parse_symbol(buf: &[u8]) -> String {
    let end = buf
        .iter()
        .rposition(|&b| b != b' ')
        .map(|p| p + 1)
        .unwrap_or(0);
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

pub(crate) fn encode_timestamp(ts: DateTime<Utc>, out: &mut Vec<u8>) {
    out.extend_from_slice(&ts.timestamp_nanos_opt().unwrap_or(0).to_le_bytes());
}

pub(crate) fn encode_price(price: f64, out: &mut Vec<u8>) {
    out.extend_from_slice(&((price * 10_000.0).round() as i64).to_le_bytes());
}

pub(crate) fn encode_symbol(symbol: &str, out: &mut Vec<u8>) {
    let mut field = [b' '; 8];
    let bytes = symbol.as_bytes();
    let n = bytes.len().min(8);
    field[..n].copy_from_slice(&bytes[..n]);
    out.extend_from_slice(&field);
}

/// A decoded IEX-TP message from either the TOPS or the DEEP feed.
///
/// Unknown message types decode to [`Message::Unsupported`] carrying the
/// raw bytes: IEX reserves the right to add message types (and to grow
/// existing messages) without notice, so decoders must pass them through
/// rather than fail.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    SystemEvent(tops::SystemEventMessage),
    SecurityDirectory(tops::SecurityDirectoryMessage),
    TradingStatus(tops::TradingStatusMessage),
    OperationalHaltStatus(tops::OperationalHaltStatusMessage),
    ShortSalePriceTestStatus(tops::ShortSalePriceTestStatusMessage),
    QuoteUpdate(tops::QuoteUpdateMessage),
    TradeReport(tops::TradeReportMessage),
    OfficialPrice(tops::OfficialPriceMessage),
    TradeBreak(tops::TradeBreakMessage),
    AuctionInformation(tops::AuctionInformationMessage),
    SecurityEvent(deep::SecurityEventMessage),
    PriceLevelUpdate(deep::PriceLevelUpdateMessage),
    Unsupported(Vec<u8>),
}

impl Message {
    /// The security this message refers to, if it is symbol-scoped.
    /// System-wide events and unsupported messages have no symbol.
    pub fn symbol(&self) -> Option<&str> {
        match self {
            Message::SystemEvent(_) | Message::Unsupported(_) => None,
            Message::SecurityDirectory(m) => Some(&m.symbol),
            Message::TradingStatus(m) => Some(&m.symbol),
            Message::OperationalHaltStatus(m) => Some(&m.symbol),
            Message::ShortSalePriceTestStatus(m) => Some(&m.symbol),
            Message::QuoteUpdate(m) => Some(&m.symbol),
            Message::TradeReport(m) => Some(&m.symbol),
            Message::OfficialPrice(m) => Some(&m.symbol),
            Message::TradeBreak(m) => Some(&m.symbol),
            Message::AuctionInformation(m) => Some(&m.symbol),
            Message::SecurityEvent(m) => Some(&m.symbol),
            Message::PriceLevelUpdate(m) => Some(&m.symbol),
        }
    }

    /// The event timestamp, for every variant but [`Message::Unsupported`].
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Message::SystemEvent(m) => Some(m.timestamp),
            Message::SecurityDirectory(m) => Some(m.timestamp),
            Message::TradingStatus(m) => Some(m.timestamp),
            Message::OperationalHaltStatus(m) => Some(m.timestamp),
            Message::ShortSalePriceTestStatus(m) => Some(m.timestamp),
            Message::QuoteUpdate(m) => Some(m.timestamp),
            Message::TradeReport(m) => Some(m.timestamp),
            Message::OfficialPrice(m) => Some(m.timestamp),
            Message::TradeBreak(m) => Some(m.timestamp),
            Message::AuctionInformation(m) => Some(m.timestamp),
            Message::SecurityEvent(m) => Some(m.timestamp),
            Message::PriceLevelUpdate(m) => Some(m.timestamp),
            Message::Unsupported(_) => None,
        }
    }

    /// Re-encode the message into its wire layout.
    ///
    /// Decoding ignores any bytes past a message's fixed layout, so
    /// `encode` reproduces exactly the fixed-layout prefix of the decoded
    /// buffer. [`Message::Unsupported`] round-trips its raw bytes.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Message::SystemEvent(m) => m.encode(),
            Message::SecurityDirectory(m) => m.encode(),
            Message::TradingStatus(m) => m.encode(),
            Message::OperationalHaltStatus(m) => m.encode(),
            Message::ShortSalePriceTestStatus(m) => m.encode(),
            Message::QuoteUpdate(m) => m.encode(),
            Message::TradeReport(m) => m.encode(),
            Message::OfficialPrice(m) => m.encode(),
            Message::TradeBreak(m) => m.encode(),
            Message::AuctionInformation(m) => m.encode(),
            Message::SecurityEvent(m) => m.encode(),
            Message::PriceLevelUpdate(m) => m.encode(),
            Message::Unsupported(raw) => raw.clone(),
        }
    }
}

/// Decoder entry point for one message protocol: takes a complete message
/// block (including the leading type byte) and produces a [`Message`].
pub type DecodeFn = fn(&[u8]) -> IexResult<Message>;

/// Maps IEX-TP message protocol ids to their decoders.
///
/// `Registry::default()` knows TOPS (0x8003) and DEEP (0x8004).
#[derive(Clone)]
pub struct Registry {
    protocols: HashMap<u16, DecodeFn>,
}

impl Registry {
    /// An empty registry with no protocols.
    pub fn empty() -> Self {
        Registry {
            protocols: HashMap::new(),
        }
    }

    /// Register a decoder for a protocol id. Registering the same decoder
    /// twice is a no-op; registering a different decoder for an id that is
    /// already taken fails with `ProtocolAlreadyRegistered`.
    pub fn register(&mut self, id: u16, decode: DecodeFn) -> IexResult<()> {
        match self.protocols.get(&id) {
            Some(existing) if *existing == decode => Ok(()),
            Some(_) => Err(IexError::ProtocolAlreadyRegistered { id }),
            None => {
                self.protocols.insert(id, decode);
                Ok(())
            }
        }
    }

    /// Look up the decoder registered for a protocol id.
    pub fn lookup(&self, id: u16) -> Option<DecodeFn> {
        self.protocols.get(&id).copied()
    }
}

impl Default for Registry {
    fn default() -> Self {
        let mut registry = Registry::empty();
        // Neither insert can conflict in an empty registry.
        let _ = registry.register(tops::MESSAGE_PROTOCOL_ID, tops::decode);
        let _ = registry.register(deep::MESSAGE_PROTOCOL_ID, deep::decode);
        registry
    }
}

/// Length of the fixed IEX-TP segment header.
pub const SEGMENT_HEADER_LEN: usize = 40;

/// The 40-byte header that precedes every IEX-TP segment payload.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentHeader {
    /// Version of the IEX-TP protocol (1).
    pub version: u8,
    /// Identifies the higher-layer message protocol carried in the
    /// segment (0x8003 TOPS, 0x8004 DEEP).
    pub message_protocol_id: u16,
    /// Identifies a stream of sequenced messages; segments received from
    /// multiple sources with the same channel id are duplicates by
    /// sequence number and/or offset.
    pub channel_id: u32,
    /// Uniquely identifies the session producing this stream; a message
    /// is identified by its session id and sequence number.
    pub session_id: u32,
    /// Byte count of the segment payload, excluding this header.
    pub payload_length: u16,
    /// Number of message blocks in the segment.
    pub message_count: u16,
    /// Byte offset of the payload within the data stream.
    pub stream_offset: i64,
    /// Sequence number of the first message in the segment; subsequent
    /// messages are implicitly numbered sequentially.
    pub first_message_sequence_number: i64,
    /// The time the outbound segment was sent, as set by the sender.
    pub send_time: DateTime<Utc>,
}

impl SegmentHeader {
    /// Decode the header from the front of `buf`, returning it together
    /// with the remaining payload bytes.
    pub fn decode(buf: &[u8]) -> IexResult<(SegmentHeader, &[u8])> {
        if buf.len() < SEGMENT_HEADER_LEN {
            return Err(IexError::SegmentHeaderTooShort { got: buf.len() });
        }

        let header = SegmentHeader {
            version: buf[0],
            message_protocol_id: le_u16(&buf[2..4]),
            channel_id: le_u32(&buf[4..8]),
            session_id: le_u32(&buf[8..12]),
            payload_length: le_u16(&buf[12..14]),
            message_count: le_u16(&buf[14..16]),
            stream_offset: le_i64(&buf[16..24]),
            first_message_sequence_number: le_i64(&buf[24..32]),
            send_time: parse_timestamp(&buf[32..40]),
        };
        Ok((header, &buf[SEGMENT_HEADER_LEN..]))
    }

    /// Re-encode the header into its 40-byte wire layout.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(SEGMENT_HEADER_LEN);
        out.push(self.version);
        out.push(0); // reserved
        out.extend_from_slice(&self.message_protocol_id.to_le_bytes());
        out.extend_from_slice(&self.channel_id.to_le_bytes());
        out.extend_from_slice(&self.session_id.to_le_bytes());
        out.extend_from_slice(&self.payload_length.to_le_bytes());
        out.extend_from_slice(&self.message_count.to_le_bytes());
        out.extend_from_slice(&self.stream_offset.to_le_bytes());
        out.extend_from_slice(&self.first_message_sequence_number.to_le_bytes());
        encode_timestamp(self.send_time, &mut out);
        out
    }
}

/// One IEX-TP segment: a header and the messages decoded from its payload.
///
/// Segments are ephemeral: parse, consume the messages, discard. The
/// decoder guarantees `messages.len() == header.message_count`.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub header: SegmentHeader,
    pub messages: Vec<Message>,
}

impl Segment {
    /// Decode a complete segment payload, as delivered in one UDP packet.
    ///
    /// The sequence number of `messages[i]` is
    /// `header.first_message_sequence_number + i`; gap detection is left
    /// to the consumer.
    pub fn decode(buf: &[u8], registry: &Registry) -> IexResult<Segment> {
        let (header, mut rest) = SegmentHeader::decode(buf)?;

        let decode = registry
            .lookup(header.message_protocol_id)
            .ok_or(IexError::UnknownProtocol {
                id: header.message_protocol_id,
            })?;

        let mut messages = Vec::with_capacity(header.message_count as usize);
        for _ in 0..header.message_count {
            if rest.len() < 2 {
                return Err(IexError::UnexpectedEof);
            }
            let length = le_u16(&rest[..2]) as usize;
            rest = &rest[2..];
            if rest.len() < length {
                return Err(IexError::UnexpectedEof);
            }
            messages.push(decode(&rest[..length])?);
            rest = &rest[length..];
        }

        Ok(Segment { header, messages })
    }
}

/// Streaming-mode segment reader over any byte stream.
///
/// Preserves the per-packet framing semantics of [`Segment::decode`]:
/// a clean end of input at a segment boundary yields `Ok(None)`, while
/// input that ends inside a segment yields `UnexpectedEof`.
pub struct SegmentScanner<R> {
    reader: R,
    registry: Registry,
}

impl<R: Read> SegmentScanner<R> {
    pub fn new(reader: R) -> Self {
        SegmentScanner {
            reader,
            registry: Registry::default(),
        }
    }

    pub fn with_registry(reader: R, registry: Registry) -> Self {
        SegmentScanner { reader, registry }
    }

    /// Advance to the next segment. Returns `Ok(None)` at a clean end of
    /// the stream.
    pub fn next_segment(&mut self) -> IexResult<Option<Segment>> {
        let mut header_buf = [0u8; SEGMENT_HEADER_LEN];
        if !self.read_exact_or_eof(&mut header_buf)? {
            return Ok(None);
        }

        let (header, _) = SegmentHeader::decode(&header_buf)?;
        let decode = self
            .registry
            .lookup(header.message_protocol_id)
            .ok_or(IexError::UnknownProtocol {
                id: header.message_protocol_id,
            })?;

        let mut messages = Vec::with_capacity(header.message_count as usize);
        for _ in 0..header.message_count {
            let mut len_buf = [0u8; 2];
            self.read_exact_mid_segment(&mut len_buf)?;
            let mut body = vec![0u8; le_u16(&len_buf) as usize];
            self.read_exact_mid_segment(&mut body)?;
            messages.push(decode(&body)?);
        }

        Ok(Some(Segment { header, messages }))
    }

    /// Fill `buf`, returning false only if the stream ended before the
    /// first byte. EOF after a partial read is `UnexpectedEof`.
    fn read_exact_or_eof(&mut self, buf: &mut [u8]) -> IexResult<bool> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.reader.read(&mut buf[filled..])?;
            if n == 0 {
                if filled == 0 {
                    return Ok(false);
                }
                return Err(IexError::UnexpectedEof);
            }
            filled += n;
        }
        Ok(true)
    }

    fn read_exact_mid_segment(&mut self, buf: &mut [u8]) -> IexResult<()> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.reader.read(&mut buf[filled..])?;
            if n == 0 {
                return Err(IexError::UnexpectedEof);
            }
            filled += n;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn message_block(body: &[u8]) -> Vec<u8> {
        let mut block = Vec::with_capacity(2 + body.len());
        block.extend_from_slice(&(body.len() as u16).to_le_bytes());
        block.extend_from_slice(body);
        block
    }

    fn system_event_bytes() -> Vec<u8> {
        vec![
            0x53, // S = System Event
            0x45, // End of System Hours
            0x00, 0xa0, 0x99, 0x97, 0xe9, 0x3d, 0xb6, 0x14,
        ]
    }

    fn segment_bytes(protocol_id: u16, bodies: &[&[u8]]) -> Vec<u8> {
        let payload: Vec<u8> = bodies.iter().flat_map(|b| message_block(b)).collect();
        let header = SegmentHeader {
            version: 1,
            message_protocol_id: protocol_id,
            channel_id: 1,
            session_id: 1_149_142_272,
            payload_length: payload.len() as u16,
            message_count: bodies.len() as u16,
            stream_offset: 0,
            first_message_sequence_number: 1,
            send_time: Utc.with_ymd_and_hms(2017, 4, 17, 17, 0, 0).unwrap(),
        };
        let mut out = header.encode();
        out.extend_from_slice(&payload);
        out
    }

    #[test]
    fn test_parse_symbol_trims_right_padding() {
        assert_eq!(parse_symbol(b"ZIEXT   "), "ZIEXT");
        assert_eq!(parse_symbol(b"AAPL    "), "AAPL");
        assert_eq!(parse_symbol(b"        "), "");
    }

    #[test]
    fn test_parse_price() {
        let buf = [0x24, 0x1d, 0x0f, 0x00, 0x00, 0x00, 0x00, 0x00];
        assert_eq!(parse_price(&buf), 99.05);

        let negative = (-12_345i64).to_le_bytes();
        assert_eq!(parse_price(&negative), -1.2345);
    }

    #[test]
    fn test_parse_timestamp() {
        let buf = [0x00, 0xa0, 0x99, 0x97, 0xe9, 0x3d, 0xb6, 0x14];
        assert_eq!(
            parse_timestamp(&buf),
            Utc.with_ymd_and_hms(2017, 4, 17, 17, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_segment_header_round_trip() {
        let data = segment_bytes(tops::MESSAGE_PROTOCOL_ID, &[&system_event_bytes()]);
        let (header, rest) = SegmentHeader::decode(&data).unwrap();

        assert_eq!(header.version, 1);
        assert_eq!(header.message_protocol_id, 0x8003);
        assert_eq!(header.message_count, 1);
        assert_eq!(header.payload_length as usize, rest.len());
        assert_eq!(header.encode(), &data[..SEGMENT_HEADER_LEN]);
    }

    #[test]
    fn test_segment_header_too_short() {
        match SegmentHeader::decode(&[0u8; 12]) {
            Err(IexError::SegmentHeaderTooShort { got: 12 }) => {}
            other => panic!("expected SegmentHeaderTooShort, got {:?}", other),
        }
    }

    #[test]
    fn test_segment_decode_message_count_matches() {
        let body = system_event_bytes();
        let data = segment_bytes(tops::MESSAGE_PROTOCOL_ID, &[&body, &body, &body]);
        let segment = Segment::decode(&data, &Registry::default()).unwrap();

        assert_eq!(segment.header.message_count, 3);
        assert_eq!(segment.messages.len(), 3);
        assert!(matches!(segment.messages[0], Message::SystemEvent(_)));
    }

    #[test]
    fn test_segment_decode_empty() {
        let data = segment_bytes(tops::MESSAGE_PROTOCOL_ID, &[]);
        let segment = Segment::decode(&data, &Registry::default()).unwrap();
        assert!(segment.messages.is_empty());
    }

    #[test]
    fn test_segment_decode_unknown_protocol() {
        let data = segment_bytes(0x8005, &[]);
        match Segment::decode(&data, &Registry::default()) {
            Err(IexError::UnknownProtocol { id: 0x8005 }) => {}
            other => panic!("expected UnknownProtocol, got {:?}", other),
        }
    }

    #[test]
    fn test_segment_decode_truncated_block() {
        let mut data = segment_bytes(tops::MESSAGE_PROTOCOL_ID, &[&system_event_bytes()]);
        data.truncate(data.len() - 4);
        match Segment::decode(&data, &Registry::default()) {
            Err(IexError::UnexpectedEof) => {}
            other => panic!("expected UnexpectedEof, got {:?}", other),
        }
    }

    #[test]
    fn test_registry_register_conflict() {
        let mut registry = Registry::default();

        // Same decoder again: no-op.
        registry
            .register(tops::MESSAGE_PROTOCOL_ID, tops::decode)
            .unwrap();

        // A different decoder for a taken id is rejected.
        match registry.register(tops::MESSAGE_PROTOCOL_ID, deep::decode) {
            Err(IexError::ProtocolAlreadyRegistered { id: 0x8003 }) => {}
            other => panic!("expected ProtocolAlreadyRegistered, got {:?}", other),
        }
    }

    #[test]
    fn test_registry_lookup() {
        let registry = Registry::default();
        assert!(registry.lookup(0x8003).is_some());
        assert!(registry.lookup(0x8004).is_some());
        assert!(registry.lookup(0x8005).is_none());
    }

    #[test]
    fn test_scanner_reads_segments_until_eof() {
        let body = system_event_bytes();
        let mut stream = segment_bytes(tops::MESSAGE_PROTOCOL_ID, &[&body]);
        stream.extend_from_slice(&segment_bytes(tops::MESSAGE_PROTOCOL_ID, &[&body, &body]));

        let mut scanner = SegmentScanner::new(std::io::Cursor::new(stream));
        let first = scanner.next_segment().unwrap().unwrap();
        assert_eq!(first.messages.len(), 1);
        let second = scanner.next_segment().unwrap().unwrap();
        assert_eq!(second.messages.len(), 2);
        assert!(scanner.next_segment().unwrap().is_none());
    }

    #[test]
    fn test_scanner_partial_segment_is_unexpected_eof() {
        let mut stream = segment_bytes(tops::MESSAGE_PROTOCOL_ID, &[&system_event_bytes()]);
        stream.truncate(stream.len() - 3);

        let mut scanner = SegmentScanner::new(std::io::Cursor::new(stream));
        match scanner.next_segment() {
            Err(IexError::UnexpectedEof) => {}
            other => panic!("expected UnexpectedEof, got {:?}", other),
        }
    }

    #[test]
    fn test_scanner_partial_header_is_unexpected_eof() {
        let stream = vec![1u8; 17];
        let mut scanner = SegmentScanner::new(std::io::Cursor::new(stream));
        match scanner.next_segment() {
            Err(IexError::UnexpectedEof) => {}
            other => panic!("expected UnexpectedEof, got {:?}", other),
        }
    }
}
