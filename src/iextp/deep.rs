//! The DEEP protocol, v1.0.
//!
//! DEEP is IEX's depth-of-book feed: aggregated resting displayed size at
//! each price level on each side of the book, plus the entire TOPS message
//! family, which DEEP re-emits. Only the two message types DEEP adds are
//! decoded here; everything else is delegated to the TOPS codec.

use chrono::{DateTime, Utc};

use super::{
    encode_price, encode_symbol, encode_timestamp, le_u32, parse_price, parse_symbol,
    parse_timestamp, tops, Message,
};
use crate::error::{IexError, IexResult};

/// The IEX-TP message protocol id assigned to DEEP.
pub const MESSAGE_PROTOCOL_ID: u16 = 0x8004;
/// The IEX-TP channel carrying DEEP.
pub const CHANNEL_ID: u32 = 1;

pub const MESSAGE_TYPE_SECURITY_EVENT: u8 = 0x45;
pub const MESSAGE_TYPE_PRICE_LEVEL_UPDATE_BUY: u8 = 0x38;
pub const MESSAGE_TYPE_PRICE_LEVEL_UPDATE_SELL: u8 = 0x35;

/// Decode one DEEP message block, including its leading type byte.
pub fn decode(buf: &[u8]) -> IexResult<Message> {
    if buf.is_empty() {
        return Err(IexError::EmptyBuffer);
    }

    match buf[0] {
        MESSAGE_TYPE_SECURITY_EVENT => {
            SecurityEventMessage::decode(buf).map(Message::SecurityEvent)
        }
        MESSAGE_TYPE_PRICE_LEVEL_UPDATE_BUY | MESSAGE_TYPE_PRICE_LEVEL_UPDATE_SELL => {
            PriceLevelUpdateMessage::decode(buf).map(Message::PriceLevelUpdate)
        }
        // DEEP carries the whole TOPS message family unchanged.
        _ => tops::decode(buf),
    }
}

// Security event identifiers.

/// Indicates that the market is open.
pub const MARKET_OPEN: u8 = 0x4f;
/// Indicates that the market is closed.
pub const MARKET_CLOSE: u8 = 0x43;

/// Used to indicate events that apply to a security, sent whenever such
/// an event occurs.
#[derive(Debug, Clone, PartialEq)]
pub struct SecurityEventMessage {
    /// Security event identifier.
    pub security_event: u8,
    /// The time of the event as set by the IEX Trading System logic.
    pub timestamp: DateTime<Utc>,
    /// Security represented in Nasdaq integrated symbology.
    pub symbol: String,
}

impl SecurityEventMessage {
    pub fn decode(buf: &[u8]) -> IexResult<SecurityEventMessage> {
        if buf.len() < 18 {
            return Err(IexError::MessageTooShort {
                message_type: buf.first().copied().unwrap_or_default(),
                need: 18,
                got: buf.len(),
            });
        }
        Ok(SecurityEventMessage {
            security_event: buf[1],
            timestamp: parse_timestamp(&buf[2..10]),
            symbol: parse_symbol(&buf[10..18]),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(18);
        out.push(MESSAGE_TYPE_SECURITY_EVENT);
        out.push(self.security_event);
        encode_timestamp(self.timestamp, &mut out);
        encode_symbol(&self.symbol, &mut out);
        out
    }
}

/// The side of the order book a price level update applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

/// Event flag value marking the last message of an event: order book
/// processing for the event is complete.
pub const EVENT_PROCESSING_COMPLETE: u8 = 0x1;
/// Event flag value for a message that is part of a still-incomplete
/// atomic event: hold book updates until the final message arrives.
pub const EVENT_PROCESSING_IN_PROGRESS: u8 = 0x0;

/// Sent when the aggregated displayed size at a price level on one side
/// of the book changes. A size of zero removes the level.
///
/// A single order book event (e.g. one execution sweeping several levels)
/// may be disseminated as multiple price level updates; all but the last
/// carry [`EVENT_PROCESSING_IN_PROGRESS`]. Consumers that need an
/// atomically consistent book must buffer updates until a message with
/// [`EVENT_PROCESSING_COMPLETE`] arrives, preserving arrival order.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceLevelUpdateMessage {
    /// Book side the update applies to.
    pub side: Side,
    /// Event processing flags.
    pub event_flags: u8,
    /// The time of the book update as set by the IEX Trading System logic.
    pub timestamp: DateTime<Utc>,
    /// Security represented in Nasdaq integrated symbology.
    pub symbol: String,
    /// Aggregated displayed size at the price level, in shares.
    pub size: u32,
    /// The price level.
    pub price: f64,
}

impl PriceLevelUpdateMessage {
    pub fn decode(buf: &[u8]) -> IexResult<PriceLevelUpdateMessage> {
        if buf.len() < 30 {
            return Err(IexError::MessageTooShort {
                message_type: buf.first().copied().unwrap_or_default(),
                need: 30,
                got: buf.len(),
            });
        }
        let side = if buf[0] == MESSAGE_TYPE_PRICE_LEVEL_UPDATE_BUY {
            Side::Buy
        } else {
            Side::Sell
        };
        Ok(PriceLevelUpdateMessage {
            side,
            event_flags: buf[1],
            timestamp: parse_timestamp(&buf[2..10]),
            symbol: parse_symbol(&buf[10..18]),
            size: le_u32(&buf[18..22]),
            price: parse_price(&buf[22..30]),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(30);
        out.push(match self.side {
            Side::Buy => MESSAGE_TYPE_PRICE_LEVEL_UPDATE_BUY,
            Side::Sell => MESSAGE_TYPE_PRICE_LEVEL_UPDATE_SELL,
        });
        out.push(self.event_flags);
        encode_timestamp(self.timestamp, &mut out);
        encode_symbol(&self.symbol, &mut out);
        out.extend_from_slice(&self.size.to_le_bytes());
        encode_price(self.price, &mut out);
        out
    }

    /// True when this message completes its order book event.
    pub fn is_event_processing_complete(&self) -> bool {
        self.event_flags & EVENT_PROCESSING_COMPLETE != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    fn event_timestamp() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2016, 8, 23, 19, 30, 32)
            .unwrap()
            .with_nanosecond(572_715_948)
            .unwrap()
    }

    #[test]
    fn test_price_level_update_sell() {
        let data = vec![
            0x35, // 5 = Price Level Update, sell side
            0x01, // Event processing complete
            0xac, 0x63, 0xc0, 0x20, 0x96, 0x86, 0x6d, 0x14, // 2016-08-23 19:30:32.572715948
            0x5a, 0x49, 0x45, 0x58, 0x54, 0x20, 0x20, 0x20, // ZIEXT
            0xe4, 0x25, 0x00, 0x00, // 9,700 shares
            0x24, 0x1d, 0x0f, 0x00, 0x00, 0x00, 0x00, 0x00, // $99.05
        ];

        let msg = match decode(&data).unwrap() {
            Message::PriceLevelUpdate(msg) => msg,
            other => panic!("expected PriceLevelUpdate, got {:?}", other),
        };

        assert_eq!(
            msg,
            PriceLevelUpdateMessage {
                side: Side::Sell,
                event_flags: EVENT_PROCESSING_COMPLETE,
                timestamp: event_timestamp(),
                symbol: "ZIEXT".to_string(),
                size: 9700,
                price: 99.05,
            }
        );
        assert!(msg.is_event_processing_complete());
        assert_eq!(msg.encode(), data);
    }

    #[test]
    fn test_price_level_update_buy() {
        let data = vec![
            0x38, // 8 = Price Level Update, buy side
            0x00, // Part of an atomic event, still in progress
            0xac, 0x63, 0xc0, 0x20, 0x96, 0x86, 0x6d, 0x14,
            0x5a, 0x49, 0x45, 0x58, 0x54, 0x20, 0x20, 0x20, // ZIEXT
            0x64, 0x00, 0x00, 0x00, // 100 shares
            0x24, 0x1d, 0x0f, 0x00, 0x00, 0x00, 0x00, 0x00, // $99.05
        ];

        let msg = match decode(&data).unwrap() {
            Message::PriceLevelUpdate(msg) => msg,
            other => panic!("expected PriceLevelUpdate, got {:?}", other),
        };

        assert_eq!(msg.side, Side::Buy);
        assert_eq!(msg.event_flags, EVENT_PROCESSING_IN_PROGRESS);
        assert!(!msg.is_event_processing_complete());
        assert_eq!(msg.size, 100);
        assert_eq!(msg.encode(), data);
    }

    #[test]
    fn test_security_event_message() {
        let data = vec![
            0x45, // E = Security Event
            0x4f, // O = Market Open
            0xac, 0x63, 0xc0, 0x20, 0x96, 0x86, 0x6d, 0x14,
            0x5a, 0x49, 0x45, 0x58, 0x54, 0x20, 0x20, 0x20, // ZIEXT
        ];

        let msg = match decode(&data).unwrap() {
            Message::SecurityEvent(msg) => msg,
            other => panic!("expected SecurityEvent, got {:?}", other),
        };

        assert_eq!(
            msg,
            SecurityEventMessage {
                security_event: MARKET_OPEN,
                timestamp: event_timestamp(),
                symbol: "ZIEXT".to_string(),
            }
        );
        assert_eq!(msg.encode(), data);
    }

    #[test]
    fn test_deep_carries_tops_messages() {
        let data = vec![
            0x54, // T = Trade Report, a TOPS message type
            0x00,
            0xac, 0x63, 0xc0, 0x20, 0x96, 0x86, 0x6d, 0x14,
            0x5a, 0x49, 0x45, 0x58, 0x54, 0x20, 0x20, 0x20, // ZIEXT
            0x64, 0x00, 0x00, 0x00, // 100 shares
            0x24, 0x1d, 0x0f, 0x00, 0x00, 0x00, 0x00, 0x00, // $99.05
            0x96, 0x8f, 0x06, 0x00, 0x00, 0x00, 0x00, 0x00, // 429974
        ];

        match decode(&data).unwrap() {
            Message::TradeReport(msg) => {
                assert_eq!(msg.symbol, "ZIEXT");
                assert_eq!(msg.price, 99.05);
            }
            other => panic!("expected TradeReport, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_message_type_is_unsupported() {
        let data = vec![0x7a, 0x00, 0x01];
        match decode(&data).unwrap() {
            Message::Unsupported(raw) => assert_eq!(raw, data),
            other => panic!("expected Unsupported, got {:?}", other),
        }
    }

    #[test]
    fn test_price_level_update_too_short() {
        let data = vec![0x38, 0x01, 0x02, 0x03];
        match decode(&data) {
            Err(IexError::MessageTooShort {
                message_type: 0x38,
                need: 30,
                got: 4,
            }) => {}
            other => panic!("expected MessageTooShort, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_buffer() {
        match decode(&[]) {
            Err(IexError::EmptyBuffer) => {}
            other => panic!("expected EmptyBuffer, got {:?}", other),
        }
    }
}
