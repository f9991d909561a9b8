//! The streaming client facade.

use std::sync::{Arc, Mutex};

use crate::error::IexResult;
use crate::feed::{DeepUpdate, LastUpdate, TopsUpdate};
use crate::namespace::{deep_sub_unsub, simple_sub_unsub, IexNamespace, SubUnsubFactory};
use crate::transport::{PacketTransport, Transport};

/// The `/1.0/tops` namespace path.
pub const NAMESPACE_TOPS: &str = "/1.0/tops";
/// The `/1.0/last` namespace path.
pub const NAMESPACE_LAST: &str = "/1.0/last";
/// The `/1.0/deep` namespace path.
pub const NAMESPACE_DEEP: &str = "/1.0/deep";

/// Connects to the IEX Socket.IO interface and hands out one namespace
/// manager per feed.
///
/// Namespace managers are created lazily on first use and cached; when a
/// namespace's last subscription closes, the manager disconnects itself
/// and the cache slot empties, so a later call builds a fresh one.
pub struct IexClient {
    transport: Arc<dyn PacketTransport>,
    tops: Mutex<Option<Arc<IexNamespace<TopsUpdate>>>>,
    last: Mutex<Option<Arc<IexNamespace<LastUpdate>>>>,
    deep: Mutex<Option<Arc<IexNamespace<DeepUpdate>>>>,
}

impl IexClient {
    /// Connect to the production IEX streaming endpoints.
    pub async fn connect() -> IexResult<Arc<IexClient>> {
        let transport = Transport::connect().await?;
        Ok(IexClient::new(transport))
    }

    /// Build a client over an already-open transport.
    pub fn new(transport: Arc<dyn PacketTransport>) -> Arc<IexClient> {
        Arc::new(IexClient {
            transport,
            tops: Mutex::new(None),
            last: Mutex::new(None),
            deep: Mutex::new(None),
        })
    }

    /// The TOPS namespace: top-of-book quote and trade updates.
    pub fn tops_namespace(self: &Arc<Self>) -> IexResult<Arc<IexNamespace<TopsUpdate>>> {
        self.namespace(NAMESPACE_TOPS, simple_sub_unsub, |client| &client.tops)
    }

    /// The Last namespace: last sale price, size and time.
    pub fn last_namespace(self: &Arc<Self>) -> IexResult<Arc<IexNamespace<LastUpdate>>> {
        self.namespace(NAMESPACE_LAST, simple_sub_unsub, |client| &client.last)
    }

    /// The DEEP namespace: aggregated depth-of-book updates.
    pub fn deep_namespace(self: &Arc<Self>) -> IexResult<Arc<IexNamespace<DeepUpdate>>> {
        self.namespace(NAMESPACE_DEEP, deep_sub_unsub, |client| &client.deep)
    }

    /// Close the underlying transport. Open namespaces stop receiving
    /// and their sends fail from here on.
    pub fn close(&self) {
        self.transport.close();
    }

    fn namespace<M>(
        self: &Arc<Self>,
        path: &str,
        factory: SubUnsubFactory,
        slot_of: fn(&IexClient) -> &Mutex<Option<Arc<IexNamespace<M>>>>,
    ) -> IexResult<Arc<IexNamespace<M>>>
    where
        M: serde::de::DeserializeOwned + Clone + Send + Sync + 'static,
    {
        let mut slot = slot_of(self).lock().unwrap();
        if let Some(namespace) = &*slot {
            return Ok(namespace.clone());
        }

        let client = Arc::downgrade(self);
        let namespace = IexNamespace::<M>::new(
            self.transport.clone(),
            path,
            factory,
            Box::new(move |_path| {
                // The namespace has no subscribers left; drop the cached
                // handle so the next use builds a fresh one.
                if let Some(client) = client.upgrade() {
                    *slot_of(&client).lock().unwrap() = None;
                }
            }),
        )?;
        *slot = Some(namespace.clone());
        Ok(namespace)
    }
}
