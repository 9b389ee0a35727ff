use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::debug;

use crate::message::Message;

const PORT_DEPTH: usize = 64;

/// Registry of named ports. Posting a message fans it out to the port's
/// current subscribers; a post with no subscribers reports false, which is
/// how "nobody is listening" reaches the rule evaluation.
pub struct PortHub {
    ports: DashMap<String, broadcast::Sender<Message>>,
}

impl PortHub {
    pub fn new() -> Arc<Self> {
        Arc::new(PortHub {
            ports: DashMap::new(),
        })
    }

    /// Make sure a port exists. Posting and subscribing register lazily as
    /// well, so this mainly pins down the set announced by the rules file.
    pub fn register(&self, name: &str) {
        self.ports
            .entry(name.to_string())
            .or_insert_with(|| broadcast::channel(PORT_DEPTH).0);
        debug!(port = name, "port registered");
    }

    /// Post a message to a port. Returns true when at least one subscriber
    /// received it.
    pub fn post(&self, name: &str, msg: &Message) -> bool {
        let sender = self
            .ports
            .entry(name.to_string())
            .or_insert_with(|| broadcast::channel(PORT_DEPTH).0);
        sender.send(msg.clone()).is_ok()
    }

    /// Subscribe to a port that has been registered.
    pub fn subscribe(&self, name: &str) -> Option<broadcast::Receiver<Message>> {
        self.ports.get(name).map(|s| s.subscribe())
    }

    /// All known port names.
    pub fn names(&self) -> Vec<String> {
        self.ports.iter().map(|e| e.key().clone()).collect()
    }
}
