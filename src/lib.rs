//! # iexlink
//!
//! `iexlink` is a Rust client library for the IEX stock exchange's
//! real-time market data feeds. It covers both delivery channels IEX
//! offers:
//!
//! - **Binary IEX-TP**: the length-framed segment transport carrying
//!   the TOPS v1.6 (top of book) and DEEP v1.0 (depth of book) message
//!   protocols, as replayed from IEX HIST pcap dumps or received live
//!   over UDP.
//! - **Socket.IO streaming**: the websocket interface pushing JSON
//!   TOPS/Last/DEEP updates per symbol, with reference-counted
//!   subscription management across the `/1.0/tops`, `/1.0/last` and
//!   `/1.0/deep` namespaces.
//!
//! ## Features
//!
//! - Full TOPS v1.6 and DEEP v1.0 decoders with forward-compatible
//!   handling of unknown message types and grown message layouts
//! - IEX-TP segment framing with a protocol registry and streaming
//!   scanners
//! - Packet sources for classic pcap, pcap-ng, gzipped captures, and
//!   live UDP sockets
//! - Engine.IO v3 handshake, websocket upgrade, and heartbeats handled
//!   automatically
//! - Per-symbol callbacks with refcounted subscribe/unsubscribe: the
//!   server is only told to unsubscribe a symbol when the last
//!   interested subscription closes
//!
//! ## Reading a HIST pcap dump
//!
//! ```rust,no_run
//! use std::fs::File;
//! use iexlink::pcap::{CaptureSource, PcapScanner};
//! use iexlink::iextp::Message;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Gzip and pcap-ng are auto-detected.
//!     let file = File::open("20180127_IEXTP1_TOPS1.6.pcap.gz")?;
//!     let source = CaptureSource::new(file)?;
//!     let mut scanner = PcapScanner::new(source);
//!
//!     while let Some(message) = scanner.next_message()? {
//!         if let Message::TradeReport(trade) = message {
//!             println!(
//!                 "{} {} {}@{}",
//!                 trade.timestamp, trade.symbol, trade.size, trade.price
//!             );
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Streaming live quotes
//!
//! ```rust,no_run
//! use iexlink::IexClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = IexClient::connect().await?;
//!
//!     let tops = client.tops_namespace()?;
//!     let subscription = tops.subscribe_to(
//!         |update| {
//!             println!(
//!                 "{}: {} x {} | {} x {}",
//!                 update.symbol,
//!                 update.bid_size, update.bid_price,
//!                 update.ask_price, update.ask_size,
//!             );
//!         },
//!         &["FB", "SNAP"],
//!     )?;
//!
//!     tokio::time::sleep(std::time::Duration::from_secs(60)).await;
//!
//!     // Emits the unsubscribe event; the namespace disconnects once its
//!     // last subscription is gone.
//!     subscription.close();
//!     client.close();
//!     Ok(())
//! }
//! ```
//!
//! ## Error handling
//!
//! All fallible operations return [`IexResult`] with the crate-wide
//! [`IexError`]. The library never retries: transport failures are fatal
//! to the session and reconnection is the caller's choice. Malformed
//! payloads on the inbound streaming path are logged (via `tracing`) and
//! dropped rather than surfaced, so one bad message cannot take down a
//! subscription.

pub mod client;
pub mod endpoints;
pub mod error;
pub mod feed;
pub mod iextp;
pub mod namespace;
pub mod packets;
pub mod pcap;
pub mod subscribers;
pub mod transport;

pub use client::IexClient;
pub use error::{IexError, IexResult};
pub use feed::{DeepUpdate, LastUpdate, TopsUpdate};
pub use iextp::{Message, Registry, Segment, SegmentHeader, SegmentScanner};
pub use namespace::{IexNamespace, SubscriptionHandle};
pub use pcap::{CaptureSource, PacketSource, PcapScanner, ReplaySource, UdpSource};
pub use transport::{PacketTransport, Transport};
