//! Call manager owning the registry and its collaborators.

use log::debug;
use std::sync::Arc;

use super::engine::{CallingEngine, Navigator, NoopNavigator};
use super::participant::ParticipantId;
use super::registry::{CallRegistry, EmojiReaction};
use super::shortcuts::ShortcutListeners;
use super::state::Call;
use crate::config::CallingConfig;
use crate::types::events::{CallEventBus, EventHandler};
use crate::types::jid::QualifiedId;

/// Explicitly constructed owner of all call state.
///
/// Engine events ([`handle_engine_event`](Self::handle_engine_event)) and user
/// actions (answer, mute, ...) are the only ways sessions change. Both take
/// `&mut self`, so mutations are applied one at a time in arrival order.
pub struct CallManager {
    /// The local user's leg, used for every session.
    pub(crate) self_leg: ParticipantId,
    pub(crate) config: CallingConfig,
    pub(crate) registry: CallRegistry,
    pub(crate) engine: Arc<dyn CallingEngine>,
    pub(crate) navigator: Arc<dyn Navigator>,
    pub(crate) shortcuts: ShortcutListeners,
}

impl std::fmt::Debug for CallManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallManager")
            .field("self_leg", &self.self_leg)
            .field("config", &self.config)
            .field("calls", &self.registry.calls().len())
            .field("shortcuts", &self.shortcuts)
            .finish()
    }
}

impl CallManager {
    pub fn new(
        self_leg: ParticipantId,
        config: CallingConfig,
        engine: Arc<dyn CallingEngine>,
    ) -> Self {
        let registry = CallRegistry::new(&config);
        Self {
            self_leg,
            config,
            registry,
            engine,
            navigator: Arc::new(NoopNavigator),
            shortcuts: ShortcutListeners::default(),
        }
    }

    pub fn with_navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = navigator;
        self
    }

    pub fn self_leg(&self) -> &ParticipantId {
        &self.self_leg
    }

    pub fn config(&self) -> &CallingConfig {
        &self.config
    }

    pub fn registry(&self) -> &CallRegistry {
        &self.registry
    }

    pub fn event_bus(&self) -> &CallEventBus {
        self.registry.event_bus()
    }

    pub fn add_event_handler(&self, handler: Arc<dyn EventHandler>) {
        self.registry.event_bus().add_handler(handler);
    }

    pub fn shortcuts(&self) -> &ShortcutListeners {
        &self.shortcuts
    }

    /// Insert or replace a session outside the engine event flow, e.g. when
    /// restoring state. Shortcut listeners follow immediately.
    pub fn register_call(&mut self, call: Call) -> bool {
        let added = self.registry.register_or_update(call);
        self.sync_shortcuts();
        added
    }

    pub fn remove_call(&mut self, conversation_id: &QualifiedId) -> Option<Call> {
        let removed = self.registry.remove(conversation_id);
        self.sync_shortcuts();
        removed
    }

    pub fn accept_version_warning(&mut self, conversation_id: QualifiedId) -> bool {
        self.registry.accept_version_warning(conversation_id)
    }

    pub fn add_emoji(&mut self, emoji: EmojiReaction) {
        self.registry.add_emoji(emoji);
    }

    pub fn remove_emoji(&mut self, id: &str) -> bool {
        self.registry.remove_emoji(id)
    }

    /// The user picked a source or cancelled the picker.
    pub fn clear_capture_sources(&mut self) {
        self.registry.clear_capture_sources();
    }

    /// Install or remove shortcut listeners so exactly the incoming sessions
    /// have one.
    pub(crate) fn sync_shortcuts(&mut self) {
        self.shortcuts.sync(self.registry.calls());
    }

    /// Remove every scoped listener. Call when the hosting view goes away.
    pub fn teardown(&mut self) {
        let removed = self.shortcuts.clear();
        if removed > 0 {
            debug!("Tore down {} incoming call shortcut listener(s)", removed);
        }
    }
}

impl Drop for CallManager {
    fn drop(&mut self) {
        self.teardown();
    }
}
