//! Symbol subscription refcounting.

use std::collections::HashMap;
use std::sync::Mutex;

/// Reference-counted symbol subscriptions, shared across every
/// subscription in a namespace.
///
/// A symbol stays subscribed until as many `unsubscribe` calls as
/// `subscribe` calls have been made for it; only then should an
/// unsubscribe event go out to the server.
#[derive(Default)]
pub struct CountingSubscriber {
    symbols: Mutex<HashMap<String, usize>>,
}

impl CountingSubscriber {
    pub fn new() -> CountingSubscriber {
        CountingSubscriber::default()
    }

    pub fn subscribe(&self, symbol: &str) {
        let mut symbols = self.symbols.lock().unwrap();
        *symbols.entry(symbol.to_string()).or_insert(0) += 1;
    }

    pub fn unsubscribe(&self, symbol: &str) {
        let mut symbols = self.symbols.lock().unwrap();
        if let Some(count) = symbols.get_mut(symbol) {
            *count -= 1;
            if *count == 0 {
                symbols.remove(symbol);
            }
        }
    }

    /// True while the symbol's count is positive.
    pub fn subscribed(&self, symbol: &str) -> bool {
        let symbols = self.symbols.lock().unwrap();
        symbols.get(symbol).copied().unwrap_or(0) > 0
    }
}
