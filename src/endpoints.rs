//! IEX Socket.IO endpoint URLs.
//!
//! Both handshake (HTTPS long-polling) and streaming (WSS) URLs carry
//! `EIO=3`, a `transport` selector, the session id once one is assigned,
//! and a unique `t=` cache-buster per request.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// HTTP handshake endpoint.
pub const DEFAULT_HTTP_URL: &str = "https://ws-api.iextrading.com/socket.io/";
/// Websocket streaming endpoint.
pub const DEFAULT_WS_URL: &str = "wss://ws-api.iextrading.com/socket.io/";

static COUNTER: AtomicU64 = AtomicU64::new(0);

const ALPHABET: &[u8] = b"-0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";

fn encode64(mut n: u64) -> String {
    let mut out = [0u8; 11];
    let mut i = out.len();
    loop {
        i -= 1;
        out[i] = ALPHABET[(n % 64) as usize];
        n /= 64;
        if n == 0 {
            break;
        }
    }
    String::from_utf8_lossy(&out[i..]).into_owned()
}

/// A short unique id for the `t=` cache-buster query parameter.
///
/// Derived from the wall clock plus a process-wide counter, so ids stay
/// unique even when generated within the same nanosecond. They need not
/// be ordered, only never repeated.
pub fn unique_id() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    let count = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{}-{}", encode64(nanos), encode64(count))
}

/// Builds the handshake and streaming URLs for one Socket.IO session.
pub struct Endpoint {
    http_base: String,
    ws_base: String,
    sid: Option<String>,
}

impl Endpoint {
    /// The production IEX endpoints.
    pub fn iex() -> Endpoint {
        Endpoint::custom(DEFAULT_HTTP_URL, DEFAULT_WS_URL)
    }

    /// Custom base URLs, ending in the Socket.IO mount path (used by
    /// tests to point at a local server).
    pub fn custom(http_base: impl Into<String>, ws_base: impl Into<String>) -> Endpoint {
        Endpoint {
            http_base: http_base.into(),
            ws_base: ws_base.into(),
            sid: None,
        }
    }

    /// Record the session id assigned by the Engine.IO Open packet; it is
    /// appended to every subsequent URL.
    pub fn set_sid(&mut self, sid: impl Into<String>) {
        self.sid = Some(sid.into());
    }

    /// The long-polling URL, with a fresh cache-buster.
    pub fn http_url(&self) -> String {
        self.build(&self.http_base, "polling")
    }

    /// The websocket URL, with a fresh cache-buster.
    pub fn ws_url(&self) -> String {
        self.build(&self.ws_base, "websocket")
    }

    fn build(&self, base: &str, transport: &str) -> String {
        let mut url = format!("{}?EIO=3&transport={}&t={}", base, transport, unique_id());
        if let Some(sid) = &self.sid {
            url.push_str("&sid=");
            url.push_str(sid);
        }
        url
    }
}
