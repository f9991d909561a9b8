//! The Socket.IO websocket transport.
//!
//! Connection establishment follows the Engine.IO v3 upgrade dance: two
//! HTTPS long-polling GETs (the first returns the session id and ping
//! interval, the second joins the default namespace), then a websocket
//! connection that sends an Engine.IO Upgrade as its first frame. After
//! that the transport runs three tasks: a read loop fanning inbound
//! packets out to per-namespace callbacks, a heartbeat ticker sending an
//! Engine.IO Ping every `pingInterval` milliseconds, and a single writer
//! draining a queue so frames are never interleaved.
//!
//! The server's Pongs are consumed by the read loop but not tracked: a
//! server that silently stops answering is only detected when the socket
//! itself dies. Reconnection is the caller's responsibility.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info};

use crate::endpoints::Endpoint;
use crate::error::{IexError, IexResult};
use crate::packets::{parse_frames, parse_metadata, MessageType, PacketData, PacketType, WsEncoder};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type PacketCallback = Arc<dyn Fn(PacketData) + Send + Sync + 'static>;

/// What a namespace manager needs from the transport layer: serialized
/// frame writes and per-namespace callback registration. [`Transport`] is
/// the production implementation; tests substitute fakes.
pub trait PacketTransport: Send + Sync {
    fn write(&self, frame: String) -> IexResult<()>;

    fn add_packet_callback(
        &self,
        namespace: &str,
        callback: Box<dyn Fn(PacketData) + Send + Sync + 'static>,
    ) -> IexResult<usize>;

    fn remove_packet_callback(&self, namespace: &str, id: usize) -> IexResult<()>;

    /// Close the underlying connection. Must be idempotent.
    fn close(&self);
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HandshakeResponse {
    sid: String,
    ping_interval: u64,
    #[serde(default)]
    #[allow(dead_code)]
    ping_timeout: u64,
    upgrades: Vec<String>,
}

/// Callbacks registered for one namespace.
#[derive(Default)]
struct Outgoing {
    next_id: usize,
    callbacks: HashMap<usize, PacketCallback>,
}

impl Outgoing {
    fn add(&mut self, callback: PacketCallback) -> usize {
        self.next_id += 1;
        self.callbacks.insert(self.next_id, callback);
        self.next_id
    }
}

enum WriteOp {
    Frame(String),
    Shutdown,
}

/// A thread-safe handle on one open Socket.IO session.
///
/// All writes are serialized through a single writer task; callbacks can
/// be added and removed from any task. [`Transport::close`] is idempotent
/// and is the universal cancellation primitive: there are no
/// per-operation timeouts.
pub struct Transport {
    writer_tx: mpsc::UnboundedSender<WriteOp>,
    outgoing: Mutex<HashMap<String, Outgoing>>,
    closed: RwLock<bool>,
    heartbeat_tx: mpsc::Sender<()>,
    sid: String,
    ping_interval: Duration,
}

impl Transport {
    /// Connect to the production IEX streaming endpoints.
    pub async fn connect() -> IexResult<Arc<Transport>> {
        Transport::connect_to(Endpoint::iex()).await
    }

    /// Connect to custom endpoints (used by tests).
    pub async fn connect_to(mut endpoint: Endpoint) -> IexResult<Arc<Transport>> {
        let client = reqwest::Client::new();
        let handshake = perform_handshake(&client, &mut endpoint).await?;
        info!(sid = %handshake.sid, "handshake complete; upgrading to websocket");

        let (ws_stream, _) = connect_async(endpoint.ws_url()).await?;
        let (mut write, read) = ws_stream.split();

        let (writer_tx, mut writer_rx) = mpsc::unbounded_channel::<WriteOp>();
        tokio::spawn(async move {
            while let Some(op) = writer_rx.recv().await {
                match op {
                    WriteOp::Frame(frame) => {
                        debug!("writing frame: {}", frame);
                        if let Err(e) = write.send(WsMessage::Text(frame.into())).await {
                            error!("failed to write frame: {}", e);
                            break;
                        }
                    }
                    WriteOp::Shutdown => {
                        let _ = write.send(WsMessage::Close(None)).await;
                        break;
                    }
                }
            }
            debug!("writer task terminated");
        });

        let (heartbeat_tx, heartbeat_rx) = mpsc::channel::<()>(1);

        let transport = Arc::new(Transport {
            writer_tx,
            outgoing: Mutex::new(HashMap::new()),
            closed: RwLock::new(false),
            heartbeat_tx,
            sid: handshake.sid,
            ping_interval: Duration::from_millis(handshake.ping_interval.max(1)),
        });

        transport.start_read_loop(read);
        transport.start_heartbeat(heartbeat_rx);

        // The upgrade packet must be the first websocket frame.
        if let Err(e) = transport.send_packet(PacketType::Upgrade) {
            transport.close();
            return Err(e);
        }

        Ok(transport)
    }

    /// The session id assigned by the server during the handshake.
    pub fn sid(&self) -> &str {
        &self.sid
    }

    /// The heartbeat interval requested by the server.
    pub fn ping_interval(&self) -> Duration {
        self.ping_interval
    }

    /// Enqueue one text frame for the writer task. Fails once the
    /// transport is closed.
    pub fn write(&self, frame: String) -> IexResult<()> {
        if self.is_closed() {
            return Err(IexError::TransportClosed);
        }
        self.writer_tx
            .send(WriteOp::Frame(frame))
            .map_err(|_| IexError::TransportClosed)
    }

    /// Register a callback for packets addressed to `namespace`,
    /// returning an id for later removal.
    pub fn add_packet_callback(
        &self,
        namespace: &str,
        callback: impl Fn(PacketData) + Send + Sync + 'static,
    ) -> IexResult<usize> {
        if self.is_closed() {
            return Err(IexError::TransportClosed);
        }
        let mut outgoing = self.outgoing.lock().unwrap();
        Ok(outgoing
            .entry(namespace.to_string())
            .or_default()
            .add(Arc::new(callback)))
    }

    /// Remove a previously registered callback. Unknown namespaces and
    /// ids are a no-op.
    pub fn remove_packet_callback(&self, namespace: &str, id: usize) -> IexResult<()> {
        if self.is_closed() {
            return Err(IexError::TransportClosed);
        }
        let mut outgoing = self.outgoing.lock().unwrap();
        if let Some(entry) = outgoing.get_mut(namespace) {
            entry.callbacks.remove(&id);
            if entry.callbacks.is_empty() {
                outgoing.remove(namespace);
            }
        }
        Ok(())
    }

    /// Close the session: sends the Engine.IO Close frame, stops the
    /// heartbeat and writer tasks, and closes the websocket. Only the
    /// first call takes effect.
    pub fn close(&self) {
        let mut closed = self.closed.write().unwrap();
        if *closed {
            return;
        }
        let frame = WsEncoder::new("").encode_packet(Some(PacketType::Close), None);
        let _ = self.writer_tx.send(WriteOp::Frame(frame));
        let _ = self.writer_tx.send(WriteOp::Shutdown);
        let _ = self.heartbeat_tx.try_send(());
        *closed = true;
        info!("transport closed");
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.read().unwrap()
    }

    fn send_packet(&self, packet: PacketType) -> IexResult<()> {
        let frame = WsEncoder::new("").encode_packet(Some(packet), None);
        self.write(frame)
    }

    /// Snapshot the callbacks for a namespace so dispatch happens outside
    /// the lock.
    fn callbacks_for(&self, namespace: &str) -> Vec<PacketCallback> {
        let outgoing = self.outgoing.lock().unwrap();
        outgoing
            .get(namespace)
            .map(|entry| entry.callbacks.values().cloned().collect())
            .unwrap_or_default()
    }

    fn start_read_loop(self: &Arc<Self>, mut read: SplitStream<WsStream>) {
        let transport = Arc::downgrade(self);
        tokio::spawn(async move {
            while let Some(result) = read.next().await {
                let message = match result {
                    Ok(WsMessage::Text(text)) => text.to_string(),
                    Ok(WsMessage::Close(_)) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        error!("error reading from websocket: {}", e);
                        break;
                    }
                };
                if message.is_empty() {
                    continue;
                }
                debug!("received websocket message: {}", message);

                let transport = match transport.upgrade() {
                    Some(transport) => transport,
                    None => break,
                };
                if transport.is_closed() {
                    debug!("dropping message; transport closed");
                    break;
                }

                let metadata = parse_metadata(&message);
                // Each callback runs on its own task so a slow consumer
                // cannot stall the read loop or its peers.
                for callback in transport.callbacks_for(&metadata.namespace) {
                    let metadata = metadata.clone();
                    tokio::spawn(async move {
                        callback(metadata);
                    });
                }
            }
            debug!("read loop terminated");
        });
    }

    fn start_heartbeat(self: &Arc<Self>, mut shutdown: mpsc::Receiver<()>) {
        let transport = Arc::downgrade(self);
        let period = self.ping_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick completes immediately; the ping cadence
            // starts one full interval after connect.
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let transport = match transport.upgrade() {
                            Some(transport) => transport,
                            None => break,
                        };
                        match transport.send_packet(PacketType::Ping) {
                            Ok(()) => debug!("sent heartbeat ping"),
                            Err(e) => {
                                error!("failed to send heartbeat: {}", e);
                                break;
                            }
                        }
                    }
                    _ = shutdown.recv() => {
                        debug!("heartbeat task received shutdown signal");
                        break;
                    }
                }
            }
            debug!("heartbeat task terminated");
        });
    }
}

impl PacketTransport for Transport {
    fn write(&self, frame: String) -> IexResult<()> {
        Transport::write(self, frame)
    }

    fn add_packet_callback(
        &self,
        namespace: &str,
        callback: Box<dyn Fn(PacketData) + Send + Sync + 'static>,
    ) -> IexResult<usize> {
        Transport::add_packet_callback(self, namespace, callback)
    }

    fn remove_packet_callback(&self, namespace: &str, id: usize) -> IexResult<()> {
        Transport::remove_packet_callback(self, namespace, id)
    }

    fn close(&self) {
        Transport::close(self)
    }
}

/// The two long-polling GETs that precede the websocket upgrade.
async fn perform_handshake(
    client: &reqwest::Client,
    endpoint: &mut Endpoint,
) -> IexResult<HandshakeResponse> {
    let body = client.get(endpoint.http_url()).send().await?.text().await?;
    debug!("handshake response: {}", body);

    let frames = parse_frames(&body);
    let open = frames
        .iter()
        .find(|f| f.packet_type == Some(PacketType::Open))
        .ok_or_else(|| IexError::UnexpectedNamespaceResponse(body.clone()))?;
    let handshake: HandshakeResponse = serde_json::from_str(&open.data)?;

    if !handshake.upgrades.iter().any(|u| u == "websocket") {
        return Err(IexError::NoWebsocketUpgrade);
    }
    endpoint.set_sid(&handshake.sid);

    // A GET carrying the sid joins the default namespace; the server
    // must answer with a Socket.IO Connect.
    let body = client.get(endpoint.http_url()).send().await?.text().await?;
    debug!("namespace response: {}", body);

    let joined = parse_frames(&body).iter().any(|f| {
        f.packet_type == Some(PacketType::Message) && f.message_type == Some(MessageType::Connect)
    });
    if !joined {
        return Err(IexError::UnexpectedNamespaceResponse(body));
    }

    Ok(handshake)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_response_parsing() {
        let data = r#"{"sid":"abcd1234","upgrades":["websocket"],"pingInterval":25000,"pingTimeout":60000}"#;
        let handshake: HandshakeResponse = serde_json::from_str(data).unwrap();
        assert_eq!(handshake.sid, "abcd1234");
        assert_eq!(handshake.ping_interval, 25000);
        assert_eq!(handshake.upgrades, vec!["websocket".to_string()]);
    }

    #[test]
    fn test_handshake_response_without_websocket_upgrade() {
        let data = r#"{"sid":"abcd1234","upgrades":["polling"],"pingInterval":25000}"#;
        let handshake: HandshakeResponse = serde_json::from_str(data).unwrap();
        assert!(!handshake.upgrades.iter().any(|u| u == "websocket"));
    }

    #[test]
    fn test_outgoing_ids_are_unique_and_removable() {
        let mut outgoing = Outgoing::default();
        let first = outgoing.add(Arc::new(|_| {}));
        let second = outgoing.add(Arc::new(|_| {}));
        assert_ne!(first, second);
        assert_eq!(outgoing.callbacks.len(), 2);

        outgoing.callbacks.remove(&first);
        assert_eq!(outgoing.callbacks.len(), 1);
        assert!(outgoing.callbacks.contains_key(&second));
    }
}
