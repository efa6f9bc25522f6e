//! Subscriber registry for transport events.

use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
};

use serde_json::Value;
use tracing::{trace, warn};

use crate::protocol::{MessageKind, ServerMessage};

/// Everything the transport reports to subscribers
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Connected,
    Reconnecting { attempt: u32, max_attempts: u32 },
    Closed,
    Error(String),
    Message(ServerMessage),
    /// Well-formed message of a type this client does not know
    Unknown { kind: String, payload: Value },
}

/// What a handler subscribes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connected,
    Reconnecting,
    Closed,
    Error,
    /// Every inbound message, known or not
    AnyMessage,
    Message(MessageKind),
}

pub type Handler = Arc<dyn Fn(&TransportEvent) -> anyhow::Result<()> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
pub(crate) struct HandlerRegistry {
    next_id: u64,
    entries: Vec<(SubscriptionId, EventKind, Handler)>,
}

impl HandlerRegistry {
    pub fn subscribe(&mut self, kind: EventKind, handler: Handler) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.entries.push((id, kind, handler));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry, _, _)| *entry != id);
        self.entries.len() != before
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Handlers due for `event`: catch-all handlers first, then the ones for
    /// the specific kind, each group in registration order.
    pub fn matching(&self, event: &TransportEvent) -> Vec<Handler> {
        let of_kind = |wanted: EventKind| {
            self.entries
                .iter()
                .filter(move |(_, kind, _)| *kind == wanted)
                .map(|(_, _, handler)| Arc::clone(handler))
        };

        match event {
            TransportEvent::Connected => of_kind(EventKind::Connected).collect(),
            TransportEvent::Reconnecting { .. } => of_kind(EventKind::Reconnecting).collect(),
            TransportEvent::Closed => of_kind(EventKind::Closed).collect(),
            TransportEvent::Error(_) => of_kind(EventKind::Error).collect(),
            TransportEvent::Message(message) => of_kind(EventKind::AnyMessage)
                .chain(of_kind(EventKind::Message(message.kind())))
                .collect(),
            TransportEvent::Unknown { .. } => of_kind(EventKind::AnyMessage).collect(),
        }
    }
}

/// Run every handler; one failing or panicking handler never stops the rest
pub(crate) fn fan_out(handlers: &[Handler], event: &TransportEvent) {
    trace!(count = handlers.len(), ?event, "Dispatching transport event");
    for handler in handlers {
        match catch_unwind(AssertUnwindSafe(|| handler(event))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Transport handler failed: {e:#}"),
            Err(_) => warn!("Transport handler panicked"),
        }
    }
}
