//! PluginChannel connection binding (§4.13): tracks which socket, if any, is
//! currently bound to each session so the server can push unsolicited events
//! and enforce replace-then-bind semantics.

use std::collections::HashMap;

use nm_domain::trace::TraceEvent;
use nm_protocol::{close_code, PluginEvent};
use parking_lot::RwLock;
use tokio::sync::mpsc;

/// Everything the registry can push into a bound socket's writer task: an
/// unsolicited event, or an instruction to send a real close frame and stop.
/// The actual WebSocket framing and the request/response dispatch loop live
/// in the gateway; this registry only tracks bindings and hands out the
/// signal, it never touches a socket directly.
#[derive(Debug, Clone)]
pub enum ChannelMessage {
    Event(PluginEvent),
    Close { code: u16, reason: String },
}

pub type PluginSink = mpsc::Sender<ChannelMessage>;

/// Registry of `session_id → socket` (§3 `ChannelBinding`).
pub struct ChannelRegistry {
    channels: RwLock<HashMap<String, PluginSink>>,
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
        }
    }

    /// Binds `sink` to `session_id`. If a socket was already bound, it is
    /// sent `close_code::REPLACED` (§4.13, Invariant 6) before this call
    /// returns, and its sink is also handed back to the caller for
    /// bookkeeping (e.g. tests asserting a replace happened).
    pub async fn bind(&self, session_id: &str, sink: PluginSink) -> Option<PluginSink> {
        let previous = self.channels.write().insert(session_id.to_string(), sink);
        if let Some(previous) = &previous {
            let _ = previous
                .send(ChannelMessage::Close {
                    code: close_code::REPLACED,
                    reason: "replaced by a new connection".to_string(),
                })
                .await;
        }
        TraceEvent::ChannelBound {
            session_id: session_id.to_string(),
            replaced_previous: previous.is_some(),
        }
        .emit();
        previous
    }

    /// Removes the binding for `session_id`, but only if `expected` is still
    /// the bound sink — protects against a late disconnect of a socket that
    /// was already superseded by `bind`.
    pub fn unbind_if_current(&self, session_id: &str, expected: &PluginSink) {
        let mut channels = self.channels.write();
        if let Some(current) = channels.get(session_id) {
            if current.same_channel(expected) {
                channels.remove(session_id);
                drop(channels);
                TraceEvent::ChannelUnbound {
                    session_id: session_id.to_string(),
                }
                .emit();
            }
        }
    }

    pub fn get(&self, session_id: &str) -> Option<PluginSink> {
        self.channels.read().get(session_id).cloned()
    }

    pub fn is_bound(&self, session_id: &str) -> bool {
        self.channels.read().contains_key(session_id)
    }

    /// Pushes an unsolicited event (§4.13) to the socket bound to
    /// `session_id`, if any. Returns `false` if there is no bound socket or
    /// its writer task's receiver has been dropped — never an error, per the
    /// §4.14 rule that channel errors never tear down session state.
    pub async fn push(&self, session_id: &str, event: PluginEvent) -> bool {
        let Some(sink) = self.get(session_id) else {
            return false;
        };
        sink.send(ChannelMessage::Event(event)).await.is_ok()
    }

    pub fn len(&self) -> usize {
        self.channels.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.read().is_empty()
    }

    /// Removes and returns every currently bound sink, for `system.full_reset`
    /// (§4.12): the caller closes each with the appropriate close code.
    pub fn drain(&self) -> Vec<(String, PluginSink)> {
        self.channels.write().drain().collect()
    }

    /// Drains the registry and sends `code`/`reason` as a real close frame to
    /// every socket that was bound, for `system.full_reset`/`quick_reset`
    /// (§4.12). Returns the number of sockets closed.
    pub async fn close_all(&self, code: u16, reason: &str) -> usize {
        let drained = self.drain();
        for (_, sink) in &drained {
            let _ = sink
                .send(ChannelMessage::Close {
                    code,
                    reason: reason.to_string(),
                })
                .await;
        }
        drained.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bind_returns_previous_sink_on_replace() {
        let registry = ChannelRegistry::new();
        let (tx1, _rx1) = mpsc::channel(4);
        let (tx2, _rx2) = mpsc::channel(4);

        assert!(registry.bind("s1", tx1).await.is_none());
        let previous = registry.bind("s1", tx2).await;
        assert!(previous.is_some());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn bind_sends_replaced_close_frame_to_previous_socket() {
        let registry = ChannelRegistry::new();
        let (tx1, mut rx1) = mpsc::channel(4);
        let (tx2, _rx2) = mpsc::channel(4);

        registry.bind("s1", tx1).await;
        registry.bind("s1", tx2).await;

        match rx1.recv().await {
            Some(ChannelMessage::Close { code, .. }) => assert_eq!(code, close_code::REPLACED),
            other => panic!("expected a Close message, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unbind_if_current_ignores_superseded_sink() {
        let registry = ChannelRegistry::new();
        let (tx1, _rx1) = mpsc::channel(4);
        let (tx2, _rx2) = mpsc::channel(4);

        registry.bind("s1", tx1.clone()).await;
        registry.bind("s1", tx2.clone()).await;

        registry.unbind_if_current("s1", &tx1);
        assert!(registry.is_bound("s1"));

        registry.unbind_if_current("s1", &tx2);
        assert!(!registry.is_bound("s1"));
    }

    #[tokio::test]
    async fn push_delivers_event_to_bound_socket() {
        let registry = ChannelRegistry::new();
        let (tx, mut rx) = mpsc::channel(4);
        registry.bind("s1", tx).await;

        let delivered = registry
            .push(
                "s1",
                PluginEvent::ConnectionEstablished {
                    session_id: "s1".into(),
                },
            )
            .await;
        assert!(delivered);
        assert!(matches!(rx.recv().await, Some(ChannelMessage::Event(_))));
    }

    #[tokio::test]
    async fn push_to_unbound_session_is_a_noop() {
        let registry = ChannelRegistry::new();
        let delivered = registry
            .push(
                "nobody",
                PluginEvent::ConnectionEstablished {
                    session_id: "nobody".into(),
                },
            )
            .await;
        assert!(!delivered);
    }

    #[tokio::test]
    async fn drain_empties_registry() {
        let registry = ChannelRegistry::new();
        let (tx, _rx) = mpsc::channel(4);
        registry.bind("s1", tx).await;

        let drained = registry.drain();
        assert_eq!(drained.len(), 1);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn close_all_sends_close_frame_and_drains() {
        let registry = ChannelRegistry::new();
        let (tx, mut rx) = mpsc::channel(4);
        registry.bind("s1", tx).await;

        let closed = registry.close_all(close_code::NORMAL, "resetting").await;
        assert_eq!(closed, 1);
        assert!(registry.is_empty());
        match rx.recv().await {
            Some(ChannelMessage::Close { code, .. }) => assert_eq!(code, close_code::NORMAL),
            other => panic!("expected a Close message, got {other:?}"),
        }
    }
}
