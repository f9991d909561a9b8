//! Message types carried on the streaming namespaces.
//!
//! These are the JSON payloads IEX pushes over Socket.IO, one type per
//! namespace: [`TopsUpdate`] on `/1.0/tops`, [`LastUpdate`] on
//! `/1.0/last`, and [`DeepUpdate`] on `/1.0/deep`. Times on the wire are
//! milliseconds since the epoch.

use chrono::serde::{ts_milliseconds, ts_milliseconds_option};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A top-of-book update: IEX's aggregated best quoted bid and offer
/// position plus last sale data for one security.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopsUpdate {
    /// The stock ticker.
    pub symbol: String,
    /// IEX's percentage of the market in the stock.
    #[serde(default)]
    pub market_percent: f64,
    /// Amount of shares on the bid on IEX.
    pub bid_size: u32,
    /// Best bid price on IEX.
    pub bid_price: f64,
    /// Amount of shares on the ask on IEX.
    pub ask_size: u32,
    /// Best ask price on IEX.
    pub ask_price: f64,
    /// Shares traded in the stock on IEX.
    #[serde(default)]
    pub volume: u64,
    /// Last sale price of the stock on IEX.
    #[serde(default)]
    pub last_sale_price: f64,
    /// Last sale size of the stock on IEX.
    #[serde(default)]
    pub last_sale_size: u32,
    /// Last sale time of the stock on IEX.
    #[serde(with = "ts_milliseconds")]
    pub last_sale_time: DateTime<Utc>,
    /// The last update time of the data; the epoch when IEX has not
    /// quoted the symbol in the trading day.
    #[serde(with = "ts_milliseconds")]
    pub last_updated: DateTime<Utc>,
}

/// A last-sale update: price, size and time of the latest trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastUpdate {
    /// The stock ticker.
    pub symbol: String,
    /// Last sale price of the stock on IEX.
    pub price: f64,
    /// Last sale size of the stock on IEX.
    pub size: u32,
    /// Last sale time of the stock on IEX.
    #[serde(with = "ts_milliseconds")]
    pub time: DateTime<Utc>,
}

/// One aggregated price level on the IEX book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeepQuote {
    pub price: f64,
    pub size: f64,
    #[serde(with = "ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

/// One execution reported on the DEEP trades channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeepTrade {
    pub price: f64,
    pub size: u32,
    pub trade_id: i64,
    #[serde(rename = "isISO")]
    pub is_iso: bool,
    pub is_odd_lot: bool,
    pub is_outside_regular_hours: bool,
    pub is_single_price_cross: bool,
    pub is_trade_through_exempt: bool,
    #[serde(with = "ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemEventUpdate {
    /// One-letter system event code (O, S, R, M, E, C).
    pub system_event: String,
    #[serde(with = "ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradingStatusUpdate {
    /// One-letter trading status (H, O, P, T), matching the status byte
    /// of the binary feed.
    pub status: String,
    /// Reason code, populated when the status is a halt or an order
    /// acceptance period (e.g. "T1", "IPO1", "NA").
    #[serde(default)]
    pub reason: String,
    #[serde(with = "ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpHaltStatusUpdate {
    pub is_halted: bool,
    #[serde(with = "ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SsrStatusUpdate {
    #[serde(rename = "isSSR")]
    pub is_ssr: bool,
    /// Detail code for the status change (A, C, D, N or blank).
    #[serde(default)]
    pub detail: String,
    #[serde(with = "ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityEventUpdate {
    /// Security event name (MarketOpen, MarketClose).
    pub security_event: String,
    #[serde(with = "ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

/// A depth-of-book snapshot or incremental update for one security.
///
/// Which sections are present depends on the channels subscribed and on
/// what changed; absent sections deserialize to empty or `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeepUpdate {
    /// The stock ticker.
    pub symbol: String,
    #[serde(default)]
    pub market_percent: f64,
    #[serde(default)]
    pub volume: u64,
    #[serde(default)]
    pub last_sale_price: f64,
    #[serde(default)]
    pub last_sale_size: u32,
    #[serde(default, with = "ts_milliseconds_option")]
    pub last_sale_time: Option<DateTime<Utc>>,
    #[serde(default, with = "ts_milliseconds_option")]
    pub last_updated: Option<DateTime<Utc>>,
    /// Aggregated resting displayed buy interest, best first.
    #[serde(default)]
    pub bids: Vec<DeepQuote>,
    /// Aggregated resting displayed sell interest, best first.
    #[serde(default)]
    pub asks: Vec<DeepQuote>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_event: Option<SystemEventUpdate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trading_status: Option<TradingStatusUpdate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op_halt_status: Option<OpHaltStatusUpdate>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "ssrStatus")]
    pub ssr_status: Option<SsrStatusUpdate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_event: Option<SecurityEventUpdate>,
    #[serde(default)]
    pub trades: Vec<DeepTrade>,
    #[serde(default)]
    pub trade_breaks: Vec<DeepTrade>,
}
