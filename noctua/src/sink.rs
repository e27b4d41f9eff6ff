//! Outbound seam between the core and the gateway.
//!
//! The agent loop, approval pipeline, mind, and goal runner push
//! APPROVAL_REQUEST and EVENT frames through a [`ChannelSink`]; the gateway
//! implements it over its connection table (send to adapters claiming the
//! channel tag, or broadcast). The runtime boots with a no-op sink and the
//! gateway installs the real one once it is listening.

use std::sync::{Arc, RwLock};

use wire::GatewayMessage;

pub trait ChannelSink: Send + Sync {
    /// Deliver to every adapter claiming `channel`. Best effort: slow
    /// adapters may drop non-critical frames.
    fn send_to_channel(&self, channel: &str, message: GatewayMessage);

    /// Deliver to every connected adapter (mind and goal events).
    fn broadcast(&self, message: GatewayMessage);
}

/// Sink used before a gateway is attached; drops everything.
pub struct NullSink;

impl ChannelSink for NullSink {
    fn send_to_channel(&self, _channel: &str, _message: GatewayMessage) {}
    fn broadcast(&self, _message: GatewayMessage) {}
}

/// Swappable sink handle held by the runtime. Reads are frequent (every
/// event emission); replacement happens once at gateway startup and on
/// `restart`.
#[derive(Clone)]
pub struct SharedSink {
    inner: Arc<RwLock<Arc<dyn ChannelSink>>>,
}

impl SharedSink {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(NullSink))),
        }
    }

    pub fn install(&self, sink: Arc<dyn ChannelSink>) {
        *self.inner.write().expect("sink lock") = sink;
    }

    pub fn send_to_channel(&self, channel: &str, message: GatewayMessage) {
        let sink = Arc::clone(&*self.inner.read().expect("sink lock"));
        sink.send_to_channel(channel, message);
    }

    pub fn broadcast(&self, message: GatewayMessage) {
        let sink = Arc::clone(&*self.inner.read().expect("sink lock"));
        sink.broadcast(message);
    }
}

impl Default for SharedSink {
    fn default() -> Self {
        Self::new()
    }
}
