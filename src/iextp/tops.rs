//! The TOPS protocol, v1.6.
//!
//! TOPS is IEX's top-of-book feed: aggregated best bid and offer, last
//! sale (trade reports), and security status messages. Message layouts are
//! little-endian with fixed offsets; trailing bytes beyond a message's
//! fixed layout are ignored, since IEX reserves the right to grow messages
//! by appending fields.

use chrono::{DateTime, Utc};

use super::{
    encode_price, encode_symbol, encode_timestamp, le_i64, le_u32, parse_price, parse_symbol,
    parse_timestamp, Message,
};
use crate::error::{IexError, IexResult};

/// The IEX-TP message protocol id assigned to TOPS.
pub const MESSAGE_PROTOCOL_ID: u16 = 0x8003;
/// The IEX-TP channel carrying TOPS.
pub const CHANNEL_ID: u32 = 1;

pub const MESSAGE_TYPE_SYSTEM_EVENT: u8 = 0x53;
pub const MESSAGE_TYPE_SECURITY_DIRECTORY: u8 = 0x44;
pub const MESSAGE_TYPE_TRADING_STATUS: u8 = 0x48;
pub const MESSAGE_TYPE_OPERATIONAL_HALT_STATUS: u8 = 0x4f;
pub const MESSAGE_TYPE_SHORT_SALE_PRICE_TEST_STATUS: u8 = 0x50;
pub const MESSAGE_TYPE_QUOTE_UPDATE: u8 = 0x51;
pub const MESSAGE_TYPE_TRADE_REPORT: u8 = 0x54;
pub const MESSAGE_TYPE_OFFICIAL_PRICE: u8 = 0x58;
pub const MESSAGE_TYPE_TRADE_BREAK: u8 = 0x42;
pub const MESSAGE_TYPE_AUCTION_INFORMATION: u8 = 0x41;

/// Decode one TOPS message block, including its leading type byte.
///
/// Message types this codec does not know decode to
/// [`Message::Unsupported`] without error.
pub fn decode(buf: &[u8]) -> IexResult<Message> {
    if buf.is_empty() {
        return Err(IexError::EmptyBuffer);
    }

    match buf[0] {
        MESSAGE_TYPE_SYSTEM_EVENT => SystemEventMessage::decode(buf).map(Message::SystemEvent),
        MESSAGE_TYPE_SECURITY_DIRECTORY => {
            SecurityDirectoryMessage::decode(buf).map(Message::SecurityDirectory)
        }
        MESSAGE_TYPE_TRADING_STATUS => {
            TradingStatusMessage::decode(buf).map(Message::TradingStatus)
        }
        MESSAGE_TYPE_OPERATIONAL_HALT_STATUS => {
            OperationalHaltStatusMessage::decode(buf).map(Message::OperationalHaltStatus)
        }
        MESSAGE_TYPE_SHORT_SALE_PRICE_TEST_STATUS => {
            ShortSalePriceTestStatusMessage::decode(buf).map(Message::ShortSalePriceTestStatus)
        }
        MESSAGE_TYPE_QUOTE_UPDATE => QuoteUpdateMessage::decode(buf).map(Message::QuoteUpdate),
        MESSAGE_TYPE_TRADE_REPORT => TradeReportMessage::decode(buf).map(Message::TradeReport),
        MESSAGE_TYPE_OFFICIAL_PRICE => {
            OfficialPriceMessage::decode(buf).map(Message::OfficialPrice)
        }
        MESSAGE_TYPE_TRADE_BREAK => TradeBreakMessage::decode(buf).map(Message::TradeBreak),
        MESSAGE_TYPE_AUCTION_INFORMATION => {
            AuctionInformationMessage::decode(buf).map(Message::AuctionInformation)
        }
        _ => Ok(Message::Unsupported(buf.to_vec())),
    }
}

fn check_len(buf: &[u8], need: usize) -> IexResult<()> {
    if buf.len() < need {
        return Err(IexError::MessageTooShort {
            message_type: buf.first().copied().unwrap_or_default(),
            need,
            got: buf.len(),
        });
    }
    Ok(())
}

// System event identifiers.

/// Outside of heartbeat messages on the lower level protocol, the start
/// of day message is the first message in any trading session.
pub const START_OF_MESSAGES: u8 = 0x4f;
/// IEX is open and ready to start accepting orders.
pub const START_OF_SYSTEM_HOURS: u8 = 0x53;
/// DAY and GTX orders, as well as market orders and pegged orders, are
/// available for execution on IEX.
pub const START_OF_REGULAR_MARKET_HOURS: u8 = 0x52;
/// DAY orders, market orders, and pegged orders are no longer accepted
/// by IEX.
pub const END_OF_REGULAR_MARKET_HOURS: u8 = 0x4d;
/// IEX is now closed and will not accept any new orders during this
/// trading session. It is still possible to receive messages after the
/// end of day.
pub const END_OF_SYSTEM_HOURS: u8 = 0x45;
/// This is always the last message sent in any trading session.
pub const END_OF_MESSAGES: u8 = 0x43;

/// Used to indicate events that apply to the market or the data feed.
///
/// There will be a single message disseminated per channel for each
/// System Event type within a given trading session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SystemEventMessage {
    /// System event identifier.
    pub system_event: u8,
    /// Time stamp of the system event.
    pub timestamp: DateTime<Utc>,
}

impl SystemEventMessage {
    pub fn decode(buf: &[u8]) -> IexResult<SystemEventMessage> {
        check_len(buf, 10)?;
        Ok(SystemEventMessage {
            system_event: buf[1],
            timestamp: parse_timestamp(&buf[2..10]),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(10);
        out.push(MESSAGE_TYPE_SYSTEM_EVENT);
        out.push(self.system_event);
        encode_timestamp(self.timestamp, &mut out);
        out
    }
}

// Limit Up-Limit Down price band calculation parameters.

/// Not applicable.
pub const LULD_TIER_0: u8 = 0x0;
/// Tier 1 NMS Stock.
pub const LULD_TIER_1: u8 = 0x1;
/// Tier 2 NMS Stock.
pub const LULD_TIER_2: u8 = 0x2;

/// IEX disseminates a full pre-market spin of security directory messages
/// for all IEX-listed securities. After the pre-market spin, IEX will use
/// the security directory message to relay changes for an individual
/// security.
#[derive(Debug, Clone, PartialEq)]
pub struct SecurityDirectoryMessage {
    /// Bit field: bit 7 test security, bit 6 when-issued, bit 5 ETP.
    pub flags: u8,
    /// The time of the update event as set by the IEX Trading System logic.
    pub timestamp: DateTime<Utc>,
    /// IEX-listed security represented in Nasdaq Integrated symbology.
    pub symbol: String,
    /// The number of shares that represent a round lot for the security.
    pub round_lot_size: u32,
    /// The corporate action adjusted previous official closing price for
    /// the security. When no corporate action has occurred, this is the
    /// previous official close price. For new issues (e.g. an IPO), this
    /// is the issue price.
    pub adjusted_poc_price: f64,
    /// Which Limit Up-Limit Down price band calculation parameter is to
    /// be used.
    pub luld_tier: u8,
}

impl SecurityDirectoryMessage {
    pub fn decode(buf: &[u8]) -> IexResult<SecurityDirectoryMessage> {
        check_len(buf, 31)?;
        Ok(SecurityDirectoryMessage {
            flags: buf[1],
            timestamp: parse_timestamp(&buf[2..10]),
            symbol: parse_symbol(&buf[10..18]),
            round_lot_size: le_u32(&buf[18..22]),
            adjusted_poc_price: parse_price(&buf[22..30]),
            luld_tier: buf[30],
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(31);
        out.push(MESSAGE_TYPE_SECURITY_DIRECTORY);
        out.push(self.flags);
        encode_timestamp(self.timestamp, &mut out);
        encode_symbol(&self.symbol, &mut out);
        out.extend_from_slice(&self.round_lot_size.to_le_bytes());
        encode_price(self.adjusted_poc_price, &mut out);
        out.push(self.luld_tier);
        out
    }

    pub fn is_test_security(&self) -> bool {
        self.flags & 0x80 != 0
    }

    pub fn is_when_issued_security(&self) -> bool {
        self.flags & 0x40 != 0
    }

    pub fn is_etp(&self) -> bool {
        self.flags & 0x20 != 0
    }
}

// Trading statuses.

/// Trading halted across all US equity markets.
pub const TRADING_HALT: u8 = 0x48;
/// Trading halt released into an Order Acceptance Period
/// (IEX-listed securities only).
pub const TRADING_ORDER_ACCEPTANCE_PERIOD: u8 = 0x4f;
/// Trading paused and Order Acceptance Period on IEX
/// (IEX-listed securities only).
pub const TRADING_PAUSED: u8 = 0x50;
/// Trading on IEX.
pub const TRADING: u8 = 0x54;

// Trading halt reasons.
pub const HALT_NEWS_PENDING: &str = "T1";
pub const IPO_ISSUE_NOT_YET_TRADING: &str = "IPO1";
pub const IPO_ISSUE_DEFERRED: &str = "IPOD";
pub const MARKET_CIRCUIT_BREAKER_LEVEL_3: &str = "MCB3";
pub const REASON_NOT_AVAILABLE: &str = "NA";

// Order Acceptance Period reasons.
pub const HALT_NEWS_DISSEMINATION: &str = "T2";
pub const IPO_NEW_ISSUE_ORDER_ACCEPTANCE_PERIOD: &str = "IPO2";
pub const IPO_PRE_LAUNCH_PERIOD: &str = "IPO3";
pub const MARKET_CIRCUIT_BREAKER_LEVEL_1: &str = "MCB1";
pub const MARKET_CIRCUIT_BREAKER_LEVEL_2: &str = "MCB2";

/// The trading status message is used to indicate the current trading
/// status of a security. For IEX-listed securities, IEX acts as the
/// primary market and has the authority to institute a trading halt or
/// trading pause due to news dissemination or regulatory reasons. For
/// non-IEX-listed securities, IEX abides by any regulatory trading halts
/// and trading pauses instituted by the primary or listing market.
///
/// IEX disseminates a full pre-market spin of trading status messages
/// indicating the trading status of all securities; after the spin, IEX
/// relays changes in trading status for individual securities.
#[derive(Debug, Clone, PartialEq)]
pub struct TradingStatusMessage {
    /// Trading status.
    pub trading_status: u8,
    /// The time of the update event as set by the IEX Trading System logic.
    pub timestamp: DateTime<Utc>,
    /// Security represented in Nasdaq integrated symbology.
    pub symbol: String,
    /// IEX populates the reason field for IEX-listed securities when the
    /// status is [`TRADING_HALT`] or [`TRADING_ORDER_ACCEPTANCE_PERIOD`].
    /// For non-IEX-listed securities, the reason is [`REASON_NOT_AVAILABLE`]
    /// when halted, and blank when the status is [`TRADING_PAUSED`] or
    /// [`TRADING`].
    pub reason: String,
}

impl TradingStatusMessage {
    pub fn decode(buf: &[u8]) -> IexResult<TradingStatusMessage> {
        check_len(buf, 22)?;
        Ok(TradingStatusMessage {
            trading_status: buf[1],
            timestamp: parse_timestamp(&buf[2..10]),
            symbol: parse_symbol(&buf[10..18]),
            reason: parse_symbol(&buf[18..22]),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(22);
        out.push(MESSAGE_TYPE_TRADING_STATUS);
        out.push(self.trading_status);
        encode_timestamp(self.timestamp, &mut out);
        encode_symbol(&self.symbol, &mut out);
        let mut reason = [b' '; 4];
        let bytes = self.reason.as_bytes();
        let n = bytes.len().min(4);
        reason[..n].copy_from_slice(&bytes[..n]);
        out.extend_from_slice(&reason);
        out
    }
}

// Operational halt statuses.

/// IEX-specific operational trading halt.
pub const IEX_SPECIFIC_OPERATIONAL_HALT: u8 = 0x4f;
/// Not operationally halted on IEX.
pub const NOT_OPERATIONALLY_HALTED: u8 = 0x4e;

/// The Exchange may suspend trading of one or more securities on IEX for
/// operational reasons, indicated with the operational halt status
/// message. This status is disseminated as a full pre-market spin; a
/// security absent from the spin should be assumed operationally halted.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationalHaltStatusMessage {
    /// Operational halt status identifier.
    pub operational_halt_status: u8,
    /// The time of the update event as set by the IEX Trading System logic.
    pub timestamp: DateTime<Utc>,
    /// Security represented in Nasdaq integrated symbology.
    pub symbol: String,
}

impl OperationalHaltStatusMessage {
    pub fn decode(buf: &[u8]) -> IexResult<OperationalHaltStatusMessage> {
        check_len(buf, 18)?;
        Ok(OperationalHaltStatusMessage {
            operational_halt_status: buf[1],
            timestamp: parse_timestamp(&buf[2..10]),
            symbol: parse_symbol(&buf[10..18]),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(18);
        out.push(MESSAGE_TYPE_OPERATIONAL_HALT_STATUS);
        out.push(self.operational_halt_status);
        encode_timestamp(self.timestamp, &mut out);
        encode_symbol(&self.symbol, &mut out);
        out
    }

    pub fn is_operationally_halted(&self) -> bool {
        self.operational_halt_status == IEX_SPECIFIC_OPERATIONAL_HALT
    }
}

// Short sale price test status details.

/// No price test in place.
pub const NO_PRICE_TEST_IN_PLACE: u8 = 0x20;
/// Short sale price test restriction in effect due to an intraday price
/// drop in the security.
pub const SHORT_SALE_PRICE_TEST_ACTIVATED: u8 = 0x41;
/// Short sale price test restriction remains in effect from prior day.
pub const SHORT_SALE_PRICE_TEST_CONTINUED: u8 = 0x43;
/// Short sale price test restriction deactivated.
pub const SHORT_SALE_PRICE_TEST_DEACTIVATED: u8 = 0x44;
/// Detail not available.
pub const SHORT_SALE_PRICE_TEST_DETAIL_NOT_AVAILABLE: u8 = 0x4e;

/// In association with Rule 201 of Regulation SHO, indicates when a short
/// sale price test restriction is in effect for a security.
#[derive(Debug, Clone, PartialEq)]
pub struct ShortSalePriceTestStatusMessage {
    /// Whether the short sale price test is in effect.
    pub short_sale_price_test_status: bool,
    /// The time of the update event as set by the IEX Trading System logic.
    pub timestamp: DateTime<Utc>,
    /// Security represented in Nasdaq integrated symbology.
    pub symbol: String,
    /// Detail identifier (IEX-listed securities only).
    pub detail: u8,
}

impl ShortSalePriceTestStatusMessage {
    pub fn decode(buf: &[u8]) -> IexResult<ShortSalePriceTestStatusMessage> {
        check_len(buf, 19)?;
        Ok(ShortSalePriceTestStatusMessage {
            short_sale_price_test_status: buf[1] != 0,
            timestamp: parse_timestamp(&buf[2..10]),
            symbol: parse_symbol(&buf[10..18]),
            detail: buf[18],
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(19);
        out.push(MESSAGE_TYPE_SHORT_SALE_PRICE_TEST_STATUS);
        out.push(u8::from(self.short_sale_price_test_status));
        encode_timestamp(self.timestamp, &mut out);
        encode_symbol(&self.symbol, &mut out);
        out.push(self.detail);
        out
    }
}

/// TOPS broadcasts a quote update message each time the best bid or offer
/// for a security changes, or when a security's trading state transitions.
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteUpdateMessage {
    /// Bit field: bit 7 halted, bit 6 pre/post-market auction session.
    pub flags: u8,
    /// The time an event triggered the quote update as set by the IEX
    /// Trading System logic.
    pub timestamp: DateTime<Utc>,
    /// Quoted security represented in Nasdaq integrated symbology.
    pub symbol: String,
    /// Aggregate quoted best bid size.
    pub bid_size: u32,
    /// Best quoted bid price.
    pub bid_price: f64,
    /// Best quoted ask price.
    pub ask_price: f64,
    /// Aggregate quoted best ask size.
    pub ask_size: u32,
}

impl QuoteUpdateMessage {
    pub fn decode(buf: &[u8]) -> IexResult<QuoteUpdateMessage> {
        check_len(buf, 42)?;
        Ok(QuoteUpdateMessage {
            flags: buf[1],
            timestamp: parse_timestamp(&buf[2..10]),
            symbol: parse_symbol(&buf[10..18]),
            bid_size: le_u32(&buf[18..22]),
            bid_price: parse_price(&buf[22..30]),
            ask_price: parse_price(&buf[30..38]),
            ask_size: le_u32(&buf[38..42]),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(42);
        out.push(MESSAGE_TYPE_QUOTE_UPDATE);
        out.push(self.flags);
        encode_timestamp(self.timestamp, &mut out);
        encode_symbol(&self.symbol, &mut out);
        out.extend_from_slice(&self.bid_size.to_le_bytes());
        encode_price(self.bid_price, &mut out);
        encode_price(self.ask_price, &mut out);
        out.extend_from_slice(&self.ask_size.to_le_bytes());
        out
    }

    /// False when trading in the security is halted on IEX.
    pub fn is_active(&self) -> bool {
        self.flags & 0x80 == 0
    }

    /// True during regular market hours, false during the pre-market or
    /// post-market auction session.
    pub fn is_regular_market_session(&self) -> bool {
        self.flags & 0x40 == 0
    }
}

/// Sale condition flag bits shared by trade reports and trade breaks.
fn is_iso(flags: u8) -> bool {
    flags & 0x80 != 0
}

fn is_extended_hours(flags: u8) -> bool {
    flags & 0x40 != 0
}

fn is_odd_lot(flags: u8) -> bool {
    flags & 0x20 != 0
}

fn is_trade_through_exempt(flags: u8) -> bool {
    flags & 0x10 != 0
}

fn is_single_price_cross(flags: u8) -> bool {
    flags & 0x08 != 0
}

/// Sent when an order on the IEX order book is executed in whole or in
/// part. TOPS sends a trade report message for every individual fill.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeReportMessage {
    /// Bit field: bit 7 intermarket sweep order, bit 6 extended-hours
    /// trade, bit 5 odd lot, bit 4 trade-through exempt, bit 3
    /// single-price cross trade.
    pub sale_condition_flags: u8,
    /// The time an event triggered the trade as set by the IEX Trading
    /// System logic.
    pub timestamp: DateTime<Utc>,
    /// Security represented in Nasdaq integrated symbology.
    pub symbol: String,
    /// Trade volume in number of shares.
    pub size: u32,
    /// Execution price.
    pub price: f64,
    /// Identifier of the trade, unique within a day. Also referenced in
    /// any subsequent trade break.
    pub trade_id: u64,
}

impl TradeReportMessage {
    pub fn decode(buf: &[u8]) -> IexResult<TradeReportMessage> {
        check_len(buf, 38)?;
        Ok(TradeReportMessage {
            sale_condition_flags: buf[1],
            timestamp: parse_timestamp(&buf[2..10]),
            symbol: parse_symbol(&buf[10..18]),
            size: le_u32(&buf[18..22]),
            price: parse_price(&buf[22..30]),
            trade_id: le_i64(&buf[30..38]) as u64,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        encode_trade(
            MESSAGE_TYPE_TRADE_REPORT,
            self.sale_condition_flags,
            self.timestamp,
            &self.symbol,
            self.size,
            self.price,
            self.trade_id,
        )
    }

    /// Whether the trade was an intermarket sweep order.
    pub fn is_iso(&self) -> bool {
        is_iso(self.sale_condition_flags)
    }

    /// Whether the trade executed outside regular market hours.
    pub fn is_extended_hours_trade(&self) -> bool {
        is_extended_hours(self.sale_condition_flags)
    }

    /// Whether the trade was an odd lot.
    pub fn is_odd_lot(&self) -> bool {
        is_odd_lot(self.sale_condition_flags)
    }

    /// Whether the trade was exempt from the order protection rule
    /// (Rule 611).
    pub fn is_trade_through_exempt(&self) -> bool {
        is_trade_through_exempt(self.sale_condition_flags)
    }

    /// Whether the trade was part of an opening, closing, or volatility
    /// single-price cross.
    pub fn is_single_price_cross_trade(&self) -> bool {
        is_single_price_cross(self.sale_condition_flags)
    }

    /// Per the TOPS v1.6 eligibility table: trades executed during
    /// regular hours in round or mixed lots update the consolidated
    /// last-sale price.
    pub fn is_last_sale_eligible(&self) -> bool {
        !self.is_extended_hours_trade() && !self.is_odd_lot()
    }

    /// Whether the trade updates the consolidated high/low prices.
    pub fn is_high_low_price_eligible(&self) -> bool {
        !self.is_extended_hours_trade() && !self.is_odd_lot()
    }

    /// Whether the trade counts toward consolidated volume. All executions
    /// reported by TOPS are volume eligible.
    pub fn is_volume_eligible(&self) -> bool {
        true
    }
}

/// Sent when an execution on IEX is broken on the same trading day. Trade
/// breaks are rare and only affect applications relying upon IEX
/// execution based data. Identical layout to [`TradeReportMessage`].
#[derive(Debug, Clone, PartialEq)]
pub struct TradeBreakMessage {
    pub sale_condition_flags: u8,
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub size: u32,
    pub price: f64,
    /// The trade id of the execution being broken.
    pub trade_id: u64,
}

impl TradeBreakMessage {
    pub fn decode(buf: &[u8]) -> IexResult<TradeBreakMessage> {
        check_len(buf, 38)?;
        Ok(TradeBreakMessage {
            sale_condition_flags: buf[1],
            timestamp: parse_timestamp(&buf[2..10]),
            symbol: parse_symbol(&buf[10..18]),
            size: le_u32(&buf[18..22]),
            price: parse_price(&buf[22..30]),
            trade_id: le_i64(&buf[30..38]) as u64,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        encode_trade(
            MESSAGE_TYPE_TRADE_BREAK,
            self.sale_condition_flags,
            self.timestamp,
            &self.symbol,
            self.size,
            self.price,
            self.trade_id,
        )
    }

    pub fn is_iso(&self) -> bool {
        is_iso(self.sale_condition_flags)
    }

    pub fn is_extended_hours_trade(&self) -> bool {
        is_extended_hours(self.sale_condition_flags)
    }

    pub fn is_odd_lot(&self) -> bool {
        is_odd_lot(self.sale_condition_flags)
    }

    pub fn is_trade_through_exempt(&self) -> bool {
        is_trade_through_exempt(self.sale_condition_flags)
    }

    pub fn is_single_price_cross_trade(&self) -> bool {
        is_single_price_cross(self.sale_condition_flags)
    }
}

fn encode_trade(
    message_type: u8,
    flags: u8,
    timestamp: DateTime<Utc>,
    symbol: &str,
    size: u32,
    price: f64,
    trade_id: u64,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(38);
    out.push(message_type);
    out.push(flags);
    encode_timestamp(timestamp, &mut out);
    encode_symbol(symbol, &mut out);
    out.extend_from_slice(&size.to_le_bytes());
    encode_price(price, &mut out);
    out.extend_from_slice(&trade_id.to_le_bytes());
    out
}

// Official price types.

/// The IEX official opening price.
pub const OFFICIAL_OPENING_PRICE: u8 = 0x51;
/// The IEX official closing price.
pub const OFFICIAL_CLOSING_PRICE: u8 = 0x4d;

/// The official opening or closing price of an IEX-listed security, as
/// determined by the opening or closing auction.
#[derive(Debug, Clone, PartialEq)]
pub struct OfficialPriceMessage {
    /// Price type identifier.
    pub price_type: u8,
    /// The time the official price was determined.
    pub timestamp: DateTime<Utc>,
    /// Security represented in Nasdaq integrated symbology.
    pub symbol: String,
    /// The official opening or closing price.
    pub official_price: f64,
}

impl OfficialPriceMessage {
    pub fn decode(buf: &[u8]) -> IexResult<OfficialPriceMessage> {
        check_len(buf, 26)?;
        Ok(OfficialPriceMessage {
            price_type: buf[1],
            timestamp: parse_timestamp(&buf[2..10]),
            symbol: parse_symbol(&buf[10..18]),
            official_price: parse_price(&buf[18..26]),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(26);
        out.push(MESSAGE_TYPE_OFFICIAL_PRICE);
        out.push(self.price_type);
        encode_timestamp(self.timestamp, &mut out);
        encode_symbol(&self.symbol, &mut out);
        encode_price(self.official_price, &mut out);
        out
    }
}

// Auction types.

pub const OPENING_AUCTION: u8 = 0x4f;
pub const CLOSING_AUCTION: u8 = 0x43;
pub const IPO_AUCTION: u8 = 0x49;
pub const HALT_AUCTION: u8 = 0x48;
pub const VOLATILITY_AUCTION: u8 = 0x56;

// Imbalance sides.

pub const BUY_SIDE_IMBALANCE: u8 = 0x42;
pub const SELL_SIDE_IMBALANCE: u8 = 0x53;
pub const NO_IMBALANCE: u8 = 0x4e;

/// Disseminated every one second beginning ten minutes before the opening
/// or closing auction match, and during the order acceptance period of
/// IPO, halt, and volatility auctions.
#[derive(Debug, Clone, PartialEq)]
pub struct AuctionInformationMessage {
    /// Auction type identifier.
    pub auction_type: u8,
    /// The time of the update as set by the IEX Trading System logic.
    pub timestamp: DateTime<Utc>,
    /// Security represented in Nasdaq integrated symbology.
    pub symbol: String,
    /// Number of shares paired at the reference price.
    pub paired_shares: u32,
    /// The price used to derive the auction collars.
    pub reference_price: f64,
    /// Clearing price at or within the auction collars.
    pub indicative_clearing_price: f64,
    /// Number of unpaired shares at the reference price.
    pub imbalance_shares: u32,
    /// Side of the unpaired shares.
    pub imbalance_side: u8,
    /// Number of extensions an auction has received.
    pub extension_number: u8,
    /// Projected time of the auction match, second resolution.
    pub scheduled_auction_time: DateTime<Utc>,
    /// Clearing price using orders on the auction book only.
    pub auction_book_clearing_price: f64,
    /// Reference price used for the auction collar, if any.
    pub collar_reference_price: f64,
    /// Lower bound of the auction collar.
    pub lower_auction_collar: f64,
    /// Upper bound of the auction collar.
    pub upper_auction_collar: f64,
}

impl AuctionInformationMessage {
    pub fn decode(buf: &[u8]) -> IexResult<AuctionInformationMessage> {
        check_len(buf, 80)?;
        Ok(AuctionInformationMessage {
            auction_type: buf[1],
            timestamp: parse_timestamp(&buf[2..10]),
            symbol: parse_symbol(&buf[10..18]),
            paired_shares: le_u32(&buf[18..22]),
            reference_price: parse_price(&buf[22..30]),
            indicative_clearing_price: parse_price(&buf[30..38]),
            imbalance_shares: le_u32(&buf[38..42]),
            imbalance_side: buf[42],
            extension_number: buf[43],
            scheduled_auction_time: DateTime::from_timestamp_nanos(
                i64::from(le_u32(&buf[44..48])) * 1_000_000_000,
            ),
            auction_book_clearing_price: parse_price(&buf[48..56]),
            collar_reference_price: parse_price(&buf[56..64]),
            lower_auction_collar: parse_price(&buf[64..72]),
            upper_auction_collar: parse_price(&buf[72..80]),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(80);
        out.push(MESSAGE_TYPE_AUCTION_INFORMATION);
        out.push(self.auction_type);
        encode_timestamp(self.timestamp, &mut out);
        encode_symbol(&self.symbol, &mut out);
        out.extend_from_slice(&self.paired_shares.to_le_bytes());
        encode_price(self.reference_price, &mut out);
        encode_price(self.indicative_clearing_price, &mut out);
        out.extend_from_slice(&self.imbalance_shares.to_le_bytes());
        out.push(self.imbalance_side);
        out.push(self.extension_number);
        out.extend_from_slice(&(self.scheduled_auction_time.timestamp() as u32).to_le_bytes());
        encode_price(self.auction_book_clearing_price, &mut out);
        encode_price(self.collar_reference_price, &mut out);
        encode_price(self.lower_auction_collar, &mut out);
        encode_price(self.upper_auction_collar, &mut out);
        out
    }
}
