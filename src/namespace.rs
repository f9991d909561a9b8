//! Namespace subscription management.
//!
//! Each IEX streaming namespace (`/1.0/tops`, `/1.0/last`, `/1.0/deep`)
//! carries one message type and supports many independent subscribers.
//! [`IexNamespace`] owns those subscriptions: it joins the namespace on
//! the server when the first subscription arrives, reference-counts
//! symbols across subscriptions so an unsubscribe event only goes out
//! when the last interested subscriber departs, filters inbound messages
//! by symbol, and leaves the namespace once the subscription table
//! empties.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, error, warn};

use crate::error::{IexError, IexResult};
use crate::packets::{parse_to_json, MessageType, PacketData, PacketType, WsEncoder};
use crate::subscribers::CountingSubscriber;
use crate::transport::PacketTransport;

/// The server event emitted for a subscription change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubUnsubEvent {
    Subscribe,
    Unsubscribe,
}

impl SubUnsubEvent {
    fn name(self) -> &'static str {
        match self {
            SubUnsubEvent::Subscribe => "subscribe",
            SubUnsubEvent::Unsubscribe => "unsubscribe",
        }
    }
}

/// Builds the `(event, body)` pair for a subscribe/unsubscribe call.
/// The body format differs by namespace.
pub type SubUnsubFactory = fn(SubUnsubEvent, &[String]) -> (&'static str, String);

/// The TOPS/Last body: a comma-joined symbol list, e.g. `"FB,SNAP"`.
pub fn simple_sub_unsub(event: SubUnsubEvent, symbols: &[String]) -> (&'static str, String) {
    (event.name(), symbols.join(","))
}

/// The DEEP body: a JSON object selecting symbols and channels, e.g.
/// `{"symbols":["SNAP"],"channels":["deep"]}`. DEEP accepts only one
/// symbol per call; extras are passed through but will be rejected
/// server-side.
pub fn deep_sub_unsub(event: SubUnsubEvent, symbols: &[String]) -> (&'static str, String) {
    if symbols.len() > 1 {
        warn!(
            "DEEP accepts a single symbol per subscription; got {}",
            symbols.len()
        );
    }
    let body = serde_json::json!({
        "symbols": symbols,
        "channels": ["deep"],
    });
    (event.name(), body.to_string())
}

type MessageHandler<M> = Box<dyn Fn(M) + Send + Sync + 'static>;

struct Subscription<M> {
    handler: MessageHandler<M>,
    symbols: HashSet<String>,
}

struct NamespaceState<M> {
    next_id: usize,
    subscriptions: HashMap<usize, Subscription<M>>,
}

/// Receives messages for one namespace and forwards them to subscribers.
///
/// Type-parameterized by the message type the namespace carries; the
/// inbound fan-out path decodes straight into `M` with no dynamic
/// dispatch.
pub struct IexNamespace<M> {
    path: String,
    state: RwLock<NamespaceState<M>>,
    /// Symbol refcounts spanning all subscriptions, so unsubscribing a
    /// symbol only reaches the server when nobody is left listening.
    symbols: CountingSubscriber,
    encoder: WsEncoder,
    transport: Arc<dyn PacketTransport>,
    sub_unsub_factory: SubUnsubFactory,
    /// Called when the namespace has no more subscriptions.
    close_hook: Box<dyn Fn(&str) + Send + Sync>,
    callback_id: Mutex<Option<usize>>,
}

impl<M: DeserializeOwned + Clone + Send + Sync + 'static> IexNamespace<M> {
    /// Create a namespace manager and register its packet callback on
    /// the transport. `close_hook` runs after the last subscription
    /// closes, once the namespace has sent its disconnect.
    pub fn new(
        transport: Arc<dyn PacketTransport>,
        path: &str,
        sub_unsub_factory: SubUnsubFactory,
        close_hook: Box<dyn Fn(&str) + Send + Sync>,
    ) -> IexResult<Arc<IexNamespace<M>>> {
        let namespace = Arc::new(IexNamespace {
            path: path.to_string(),
            state: RwLock::new(NamespaceState {
                next_id: 0,
                subscriptions: HashMap::new(),
            }),
            symbols: CountingSubscriber::new(),
            encoder: WsEncoder::new(path),
            transport: transport.clone(),
            sub_unsub_factory,
            close_hook,
            callback_id: Mutex::new(None),
        });

        let weak = Arc::downgrade(&namespace);
        let id = transport.add_packet_callback(
            path,
            Box::new(move |pkt| {
                if let Some(namespace) = weak.upgrade() {
                    namespace.fanout(pkt);
                }
            }),
        )?;
        *namespace.callback_id.lock().unwrap() = Some(id);

        Ok(namespace)
    }

    /// The namespace path, e.g. `/1.0/tops`.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Receive messages for the given symbols through `handler`.
    ///
    /// Symbols are upper-cased on entry. One subscribe event is sent per
    /// call, not per symbol. The returned handle's `close` unwinds the
    /// subscription; dropping the handle without closing leaks the
    /// subscription until the namespace itself goes away.
    pub fn subscribe_to(
        self: &Arc<Self>,
        handler: impl Fn(M) + Send + Sync + 'static,
        symbols: &[&str],
    ) -> IexResult<SubscriptionHandle<M>> {
        if symbols.is_empty() {
            return Err(IexError::NoSymbols);
        }

        let mut state = self.state.write().unwrap();

        // The first subscription joins the namespace on the server.
        if state.subscriptions.is_empty() {
            let frame = self
                .encoder
                .encode_packet(Some(PacketType::Message), Some(MessageType::Connect));
            self.transport.write(frame)?;
        }

        let symbols: Vec<String> = symbols.iter().map(|s| s.to_uppercase()).collect();
        for symbol in &symbols {
            self.symbols.subscribe(symbol);
        }

        let (event, data) = (self.sub_unsub_factory)(SubUnsubEvent::Subscribe, &symbols);
        let frame = self.encoder.encode_message(
            Some(PacketType::Message),
            Some(MessageType::Event),
            event,
            &data,
        )?;
        self.transport.write(frame)?;

        state.next_id += 1;
        let id = state.next_id;
        state.subscriptions.insert(
            id,
            Subscription {
                handler: Box::new(handler),
                symbols: symbols.into_iter().collect(),
            },
        );
        debug!(namespace = %self.path, id, "subscription added");

        Ok(SubscriptionHandle {
            namespace: Arc::downgrade(self),
            id,
            closed: AtomicBool::new(false),
        })
    }

    /// Unwind one subscription: drop refcounts, emit an unsubscribe for
    /// symbols nobody listens to anymore, and tear the namespace down if
    /// it was the last subscription.
    fn close_subscription(&self, id: usize) {
        let mut state = self.state.write().unwrap();
        let subscription = match state.subscriptions.remove(&id) {
            Some(subscription) => subscription,
            None => return,
        };

        let mut unsubscribe = Vec::new();
        for symbol in &subscription.symbols {
            self.symbols.unsubscribe(symbol);
            if !self.symbols.subscribed(symbol) {
                unsubscribe.push(symbol.clone());
            }
        }
        let now_empty = state.subscriptions.is_empty();
        drop(state);

        if !unsubscribe.is_empty() {
            unsubscribe.sort();
            let (event, data) = (self.sub_unsub_factory)(SubUnsubEvent::Unsubscribe, &unsubscribe);
            match self.encoder.encode_message(
                Some(PacketType::Message),
                Some(MessageType::Event),
                event,
                &data,
            ) {
                Ok(frame) => {
                    if let Err(e) = self.transport.write(frame) {
                        error!("error unsubscribing from {:?}: {}", unsubscribe, e);
                    }
                }
                Err(e) => error!("error encoding unsubscribe for {:?}: {}", unsubscribe, e),
            }
        }

        if now_empty {
            let frame = self
                .encoder
                .encode_packet(Some(PacketType::Message), Some(MessageType::Disconnect));
            if let Err(e) = self.transport.write(frame) {
                error!("error disconnecting namespace {}: {}", self.path, e);
            }
            if let Some(callback_id) = self.callback_id.lock().unwrap().take() {
                let _ = self.transport.remove_packet_callback(&self.path, callback_id);
            }
            (self.close_hook)(&self.path);
            debug!(namespace = %self.path, "namespace closed");
        }
    }

    /// Deliver one inbound packet to every subscription listening for its
    /// symbol. Payloads that fail to parse are logged and dropped;
    /// killing the transport over one bad payload would be worse.
    fn fanout(&self, pkt: PacketData) {
        // The symbol is extracted on its own first so filtering does not
        // depend on M's shape.
        #[derive(Deserialize)]
        struct SymbolOnly {
            symbol: String,
        }

        let symbol = match parse_to_json::<SymbolOnly>(&pkt.data) {
            Ok(extracted) => extracted.symbol,
            Err(e) => {
                error!("no symbol found in payload: {}; {:?}", e, pkt.data);
                return;
            }
        };

        let decoded = match parse_to_json::<M>(&pkt.data) {
            Ok(decoded) => decoded,
            Err(e) => {
                error!("could not decode message for {}: {}", symbol, e);
                return;
            }
        };

        let state = self.state.read().unwrap();
        for subscription in state.subscriptions.values() {
            if subscription.symbols.contains(&symbol) {
                (subscription.handler)(decoded.clone());
            }
        }
    }
}

/// Closes its subscription on demand.
pub struct SubscriptionHandle<M> {
    namespace: Weak<IexNamespace<M>>,
    id: usize,
    closed: AtomicBool,
}

impl<M: DeserializeOwned + Clone + Send + Sync + 'static> SubscriptionHandle<M> {
    /// Stop receiving messages for this subscription. Idempotent: the
    /// first call takes effect and later calls are no-ops.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(namespace) = self.namespace.upgrade() {
            namespace.close_subscription(self.id);
        }
    }
}
