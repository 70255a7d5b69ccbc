use serde::Serialize;
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;

use crate::calls::{CallViewTab, CallingViewMode};
use crate::types::jid::QualifiedId;

/// Change notifications published by the call registry.
///
/// Events are dispatched after the mutation they describe has been fully
/// applied, including any pruning of dependent state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum CallEvent {
    CallAdded(QualifiedId),
    CallUpdated(QualifiedId),
    CallRemoved(QualifiedId),
    ViewModeChanged(CallingViewMode),
    ViewTabChanged(CallViewTab),
    CaptureSourcesChanged,
    EmojisChanged,
    VersionWarningsChanged,
    /// More than one session reports established media at the same time.
    ConsistencyViolation {
        joined: Vec<QualifiedId>,
    },
}

impl CallEvent {
    /// The conversation a session event refers to.
    pub fn conversation_id(&self) -> Option<&QualifiedId> {
        match self {
            Self::CallAdded(id) | Self::CallUpdated(id) | Self::CallRemoved(id) => Some(id),
            _ => None,
        }
    }
}

pub trait EventHandler: Send + Sync {
    fn handle_event(&self, event: &CallEvent);
}

#[derive(Default, Clone)]
pub struct CallEventBus {
    handlers: Arc<RwLock<Vec<Arc<dyn EventHandler>>>>,
}

impl CallEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_handler(&self, handler: Arc<dyn EventHandler>) {
        self.handlers
            .write()
            .expect("RwLock should not be poisoned")
            .push(handler);
    }

    /// Returns true if there are any event handlers registered.
    pub fn has_handlers(&self) -> bool {
        !self
            .handlers
            .read()
            .expect("RwLock should not be poisoned")
            .is_empty()
    }

    /// Handlers run in registration order.
    pub fn dispatch(&self, event: &CallEvent) {
        for handler in self
            .handlers
            .read()
            .expect("RwLock should not be poisoned")
            .iter()
        {
            handler.handle_event(event);
        }
    }
}

impl std::fmt::Debug for CallEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallEventBus")
            .field("has_handlers", &self.has_handlers())
            .finish()
    }
}

/// Forwards events into a channel, for UI adapters living on an async runtime.
pub struct ChannelEventHandler {
    tx: mpsc::UnboundedSender<CallEvent>,
}

impl ChannelEventHandler {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<CallEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

impl EventHandler for ChannelEventHandler {
    fn handle_event(&self, event: &CallEvent) {
        // A dropped receiver just means nobody is watching anymore
        let _ = self.tx.send(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl EventHandler for Recorder {
        fn handle_event(&self, event: &CallEvent) {
            self.log
                .lock()
                .unwrap()
                .push(format!("{}:{:?}", self.name, event));
        }
    }

    #[test]
    fn test_dispatch_in_registration_order() {
        let bus = CallEventBus::new();
        assert!(!bus.has_handlers());

        let log = Arc::new(Mutex::new(Vec::new()));
        bus.add_handler(Arc::new(Recorder {
            name: "first",
            log: log.clone(),
        }));
        bus.add_handler(Arc::new(Recorder {
            name: "second",
            log: log.clone(),
        }));
        assert!(bus.has_handlers());

        bus.dispatch(&CallEvent::EmojisChanged);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["first:EmojisChanged", "second:EmojisChanged"]
        );
    }

    #[tokio::test]
    async fn test_channel_handler_forwards_events() {
        let bus = CallEventBus::new();
        let (handler, mut rx) = ChannelEventHandler::new();
        bus.add_handler(handler);

        let id = QualifiedId::new("conv", "wire.example");
        bus.dispatch(&CallEvent::CallAdded(id.clone()));
        bus.dispatch(&CallEvent::CallRemoved(id.clone()));

        assert_eq!(rx.recv().await, Some(CallEvent::CallAdded(id.clone())));
        let removed = rx.recv().await.unwrap();
        assert_eq!(removed.conversation_id(), Some(&id));
    }

    #[test]
    fn test_channel_handler_survives_dropped_receiver() {
        let (handler, rx) = ChannelEventHandler::new();
        drop(rx);
        handler.handle_event(&CallEvent::VersionWarningsChanged);
    }
}
