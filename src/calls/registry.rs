//! Process-wide collection of call sessions and the call-view settings.

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::error::CallError;
use super::state::{Call, CallReason, CallState};
use crate::config::CallingConfig;
use crate::types::events::{CallEvent, CallEventBus};
use crate::types::jid::QualifiedId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CallingViewMode {
    FullScreenGrid,
    #[default]
    Minimized,
    DetachedWindow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CallViewTab {
    #[default]
    All,
    Speakers,
}

/// A screen or window the user may pick for screen sharing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureSource {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub display_id: Option<String>,
}

/// A reaction floating over the call view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmojiReaction {
    pub emoji: String,
    pub id: String,
    /// Horizontal position, in percent of the view width.
    pub left: f64,
    pub from: String,
}

/// Holds every call session, in arrival order, plus the global call-view state.
///
/// Sessions are unique per conversation. Derived views (`joined_call`,
/// `active_calls`, `joinable_calls`) are computed on every read. Every
/// mutation is followed by a pruning pass over the accepted version warnings
/// and a single change notification on the event bus.
#[derive(Debug)]
pub struct CallRegistry {
    calls: Vec<Call>,
    accepted_version_warnings: Vec<QualifiedId>,
    view_mode: CallingViewMode,
    active_call_view_tab: CallViewTab,
    cbr_encoding: bool,
    selectable_screens: Vec<CaptureSource>,
    selectable_windows: Vec<CaptureSource>,
    emojis: Vec<EmojiReaction>,
    /// Joined sessions of the last reported violation.
    reported_violation: Option<Vec<QualifiedId>>,
    event_bus: CallEventBus,
}

impl Default for CallRegistry {
    fn default() -> Self {
        Self::new(&CallingConfig::default())
    }
}

impl CallRegistry {
    pub fn new(config: &CallingConfig) -> Self {
        Self {
            calls: Vec::new(),
            accepted_version_warnings: Vec::new(),
            view_mode: CallingViewMode::default(),
            active_call_view_tab: CallViewTab::default(),
            cbr_encoding: config.enforce_constant_bitrate,
            selectable_screens: Vec::new(),
            selectable_windows: Vec::new(),
            emojis: Vec::new(),
            reported_violation: None,
            event_bus: CallEventBus::new(),
        }
    }

    pub fn event_bus(&self) -> &CallEventBus {
        &self.event_bus
    }

    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    pub fn get(&self, conversation_id: &QualifiedId) -> Option<&Call> {
        self.calls
            .iter()
            .find(|call| call.conversation_id.matches(conversation_id))
    }

    fn position(&self, conversation_id: &QualifiedId) -> Option<usize> {
        self.calls
            .iter()
            .position(|call| call.conversation_id.matches(conversation_id))
    }

    /// Insert a session, or replace the one for the same conversation in place.
    ///
    /// Replaying an identical session changes nothing and notifies nobody.
    /// Returns true when the session was new.
    pub fn register_or_update(&mut self, call: Call) -> bool {
        let conversation_id = call.conversation_id.clone();
        match self.position(&conversation_id) {
            Some(index) => {
                if self.calls[index] == call {
                    return false;
                }
                self.calls[index] = call;
                self.after_calls_changed(CallEvent::CallUpdated(conversation_id));
                false
            }
            None => {
                debug!("Registering call for conversation {}", conversation_id);
                self.calls.push(call);
                self.after_calls_changed(CallEvent::CallAdded(conversation_id));
                true
            }
        }
    }

    /// Remove a session. Unknown ids are ignored.
    pub fn remove(&mut self, conversation_id: &QualifiedId) -> Option<Call> {
        let index = self.position(conversation_id)?;
        let call = self.calls.remove(index);
        debug!("Removed call for conversation {}", call.conversation_id);
        self.after_calls_changed(CallEvent::CallRemoved(call.conversation_id.clone()));
        Some(call)
    }

    /// Mutate one session in place. `f` reports whether it changed anything;
    /// only then are derived state and observers refreshed.
    pub(crate) fn update_call<F>(&mut self, conversation_id: &QualifiedId, f: F) -> Option<bool>
    where
        F: FnOnce(&mut Call) -> bool,
    {
        let index = self.position(conversation_id)?;
        let changed = f(&mut self.calls[index]);
        if changed {
            let id = self.calls[index].conversation_id.clone();
            self.after_calls_changed(CallEvent::CallUpdated(id));
        }
        Some(changed)
    }

    fn after_calls_changed(&mut self, event: CallEvent) {
        let pruned = self.prune_version_warnings();

        match self.check_joined_consistency() {
            Err(CallError::MultipleJoinedCalls(joined))
                if self.reported_violation.as_ref() != Some(&joined) =>
            {
                warn!(
                    "Call registry inconsistency: {}",
                    CallError::MultipleJoinedCalls(joined.clone())
                );
                self.reported_violation = Some(joined.clone());
                self.event_bus
                    .dispatch(&CallEvent::ConsistencyViolation { joined });
            }
            Err(_) => {}
            Ok(()) => self.reported_violation = None,
        }

        self.event_bus.dispatch(&event);
        if pruned {
            self.event_bus.dispatch(&CallEvent::VersionWarningsChanged);
        }
    }

    // ========== Derived views ==========

    fn joined_calls(&self) -> impl Iterator<Item = &Call> {
        self.calls
            .iter()
            .filter(|call| call.state == CallState::MediaEstab && call.reason.is_none())
    }

    /// The session with established media. If the engine ever reports more
    /// than one, the earliest registered wins.
    pub fn joined_call(&self) -> Option<&Call> {
        self.joined_calls().next()
    }

    pub fn check_joined_consistency(&self) -> Result<(), CallError> {
        let joined: Vec<QualifiedId> = self
            .joined_calls()
            .map(|call| call.conversation_id.clone())
            .collect();
        if joined.len() > 1 {
            return Err(CallError::MultipleJoinedCalls(joined));
        }
        Ok(())
    }

    /// Sessions without a termination reason.
    pub fn active_calls(&self) -> Vec<&Call> {
        self.calls.iter().filter(|call| call.reason.is_none()).collect()
    }

    /// Incoming sessions the user can still join.
    pub fn joinable_calls(&self) -> Vec<&Call> {
        self.calls
            .iter()
            .filter(|call| {
                call.state == CallState::Incoming
                    && call.reason != Some(CallReason::AnsweredElsewhere)
            })
            .collect()
    }

    // ========== Version warnings ==========

    pub fn accepted_version_warnings(&self) -> &[QualifiedId] {
        &self.accepted_version_warnings
    }

    pub fn has_accepted_version_warning(&self, conversation_id: &QualifiedId) -> bool {
        self.accepted_version_warnings
            .iter()
            .any(|id| id.matches(conversation_id))
    }

    /// Remember that the user dismissed the version mismatch banner of an
    /// active call. Ids without an active call are ignored.
    pub fn accept_version_warning(&mut self, conversation_id: QualifiedId) -> bool {
        let is_active = self
            .get(&conversation_id)
            .is_some_and(|call| call.reason.is_none());
        if !is_active || self.has_accepted_version_warning(&conversation_id) {
            return false;
        }
        self.accepted_version_warnings.push(conversation_id);
        self.event_bus.dispatch(&CallEvent::VersionWarningsChanged);
        true
    }

    fn prune_version_warnings(&mut self) -> bool {
        let before = self.accepted_version_warnings.len();
        let calls = &self.calls;
        self.accepted_version_warnings.retain(|accepted| {
            calls
                .iter()
                .any(|call| call.reason.is_none() && call.conversation_id.matches(accepted))
        });
        before != self.accepted_version_warnings.len()
    }

    // ========== View settings ==========

    pub fn view_mode(&self) -> CallingViewMode {
        self.view_mode
    }

    /// Any mode may follow any other. Leaving the detached window does not
    /// end the call.
    pub fn set_view_mode(&mut self, mode: CallingViewMode) {
        if self.view_mode == mode {
            return;
        }
        debug!("Call view mode {:?} -> {:?}", self.view_mode, mode);
        self.view_mode = mode;
        self.event_bus.dispatch(&CallEvent::ViewModeChanged(mode));
    }

    pub fn toggle_detached_window(&mut self) {
        let next = if self.view_mode == CallingViewMode::DetachedWindow {
            CallingViewMode::Minimized
        } else {
            CallingViewMode::DetachedWindow
        };
        self.set_view_mode(next);
    }

    pub fn active_call_view_tab(&self) -> CallViewTab {
        self.active_call_view_tab
    }

    pub fn set_active_call_view_tab(&mut self, tab: CallViewTab) {
        if self.active_call_view_tab == tab {
            return;
        }
        self.active_call_view_tab = tab;
        self.event_bus.dispatch(&CallEvent::ViewTabChanged(tab));
    }

    pub fn is_speakers_view_active(&self) -> bool {
        self.active_call_view_tab == CallViewTab::Speakers
    }

    /// Constant bitrate preference, fixed at construction.
    pub fn cbr_encoding(&self) -> bool {
        self.cbr_encoding
    }

    // ========== Capture sources ==========

    pub fn selectable_screens(&self) -> &[CaptureSource] {
        &self.selectable_screens
    }

    pub fn selectable_windows(&self) -> &[CaptureSource] {
        &self.selectable_windows
    }

    pub fn set_capture_sources(
        &mut self,
        screens: Vec<CaptureSource>,
        windows: Vec<CaptureSource>,
    ) {
        self.selectable_screens = screens;
        self.selectable_windows = windows;
        self.event_bus.dispatch(&CallEvent::CaptureSourcesChanged);
    }

    pub fn clear_capture_sources(&mut self) {
        if !self.is_choosing_screen() {
            return;
        }
        self.set_capture_sources(Vec::new(), Vec::new());
    }

    pub fn is_choosing_screen(&self) -> bool {
        !self.selectable_screens.is_empty() || !self.selectable_windows.is_empty()
    }

    // ========== Emoji reactions ==========

    pub fn emojis(&self) -> &[EmojiReaction] {
        &self.emojis
    }

    pub fn add_emoji(&mut self, emoji: EmojiReaction) {
        self.emojis.push(emoji);
        self.event_bus.dispatch(&CallEvent::EmojisChanged);
    }

    pub fn remove_emoji(&mut self, id: &str) -> bool {
        let before = self.emojis.len();
        self.emojis.retain(|emoji| emoji.id != id);
        if self.emojis.len() == before {
            return false;
        }
        self.event_bus.dispatch(&CallEvent::EmojisChanged);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calls::participant::ParticipantId;
    use crate::calls::state::CallType;
    use crate::types::events::EventHandler;
    use chrono::Utc;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Recorder(Mutex<Vec<CallEvent>>);

    impl EventHandler for Recorder {
        fn handle_event(&self, event: &CallEvent) {
            self.0.lock().unwrap().push(event.clone());
        }
    }

    fn conv(id: &str) -> QualifiedId {
        QualifiedId::new(id, "wire.example")
    }

    fn incoming(id: &str) -> Call {
        Call::new_incoming(
            conv(id),
            ParticipantId::new(QualifiedId::new("me", "wire.example"), "self"),
            CallType::Audio,
        )
    }

    fn with_state(mut call: Call, state: CallState, reason: Option<CallReason>) -> Call {
        call.state = state;
        call.reason = reason;
        call
    }

    #[test]
    fn test_register_is_unique_per_conversation() {
        let mut registry = CallRegistry::default();
        assert!(registry.register_or_update(incoming("a")));
        assert!(registry.register_or_update(incoming("b")));
        assert!(!registry.register_or_update(with_state(
            incoming("a"),
            CallState::Answered,
            None
        )));

        assert_eq!(registry.calls().len(), 2);
        assert_eq!(registry.calls()[0].conversation_id, conv("a"));
        assert_eq!(registry.calls()[0].state, CallState::Answered);

        // A non-federated id addresses the same conversation
        assert!(!registry.register_or_update(Call::new_incoming(
            QualifiedId::local("b"),
            ParticipantId::new(QualifiedId::local("me"), "self"),
            CallType::Audio,
        )));
        assert_eq!(registry.calls().len(), 2);
    }

    #[test]
    fn test_register_replay_does_not_notify() {
        let mut registry = CallRegistry::default();
        let recorder = Arc::new(Recorder::default());
        registry.event_bus().add_handler(recorder.clone());

        registry.register_or_update(incoming("a"));
        registry.register_or_update(incoming("a"));

        assert_eq!(
            *recorder.0.lock().unwrap(),
            vec![CallEvent::CallAdded(conv("a"))]
        );
    }

    #[test]
    fn test_remove_missing_is_noop() {
        let mut registry = CallRegistry::default();
        assert!(registry.remove(&conv("nope")).is_none());

        registry.register_or_update(incoming("a"));
        assert!(registry.remove(&conv("a")).is_some());
        assert!(registry.remove(&conv("a")).is_none());
        assert!(registry.calls().is_empty());
    }

    #[test]
    fn test_joinable_and_active_views() {
        let mut registry = CallRegistry::default();
        registry.register_or_update(incoming("ringing"));
        registry.register_or_update(with_state(
            incoming("elsewhere"),
            CallState::Incoming,
            Some(CallReason::AnsweredElsewhere),
        ));
        registry.register_or_update(with_state(
            incoming("ongoing"),
            CallState::Incoming,
            Some(CallReason::StillOngoing),
        ));
        registry.register_or_update(with_state(incoming("joined"), CallState::MediaEstab, None));

        let joinable: Vec<_> = registry
            .joinable_calls()
            .iter()
            .map(|c| c.conversation_id.id.clone())
            .collect();
        assert_eq!(joinable, vec!["ringing", "ongoing"]);

        let active: Vec<_> = registry
            .active_calls()
            .iter()
            .map(|c| c.conversation_id.id.clone())
            .collect();
        assert_eq!(active, vec!["ringing", "joined"]);

        assert_eq!(registry.joined_call().unwrap().conversation_id, conv("joined"));
    }

    #[test]
    fn test_two_joined_calls_earliest_wins_and_is_reported() {
        let mut registry = CallRegistry::default();
        let recorder = Arc::new(Recorder::default());
        registry.event_bus().add_handler(recorder.clone());

        registry.register_or_update(with_state(incoming("first"), CallState::MediaEstab, None));
        assert!(registry.check_joined_consistency().is_ok());
        registry.register_or_update(with_state(incoming("second"), CallState::MediaEstab, None));

        assert_eq!(registry.joined_call().unwrap().conversation_id, conv("first"));
        assert!(matches!(
            registry.check_joined_consistency(),
            Err(CallError::MultipleJoinedCalls(ids)) if ids.len() == 2
        ));
        assert!(recorder.0.lock().unwrap().contains(&CallEvent::ConsistencyViolation {
            joined: vec![conv("first"), conv("second")],
        }));

        // A terminated session no longer counts as joined
        registry.register_or_update(with_state(
            incoming("first"),
            CallState::MediaEstab,
            Some(CallReason::Normal),
        ));
        assert_eq!(registry.joined_call().unwrap().conversation_id, conv("second"));
        assert!(registry.check_joined_consistency().is_ok());
    }

    #[test]
    fn test_violation_reported_once_per_joined_set() {
        let mut registry = CallRegistry::default();
        let recorder = Arc::new(Recorder::default());
        registry.event_bus().add_handler(recorder.clone());
        let violations = |recorder: &Recorder| {
            recorder
                .0
                .lock()
                .unwrap()
                .iter()
                .filter(|event| matches!(event, CallEvent::ConsistencyViolation { .. }))
                .count()
        };

        registry.register_or_update(with_state(incoming("first"), CallState::MediaEstab, None));
        registry.register_or_update(with_state(incoming("second"), CallState::MediaEstab, None));
        assert_eq!(violations(&recorder), 1);

        // Unrelated churn while the conflict persists stays quiet
        registry.update_call(&conv("first"), |call| {
            call.add_participant(ParticipantId::new(QualifiedId::local("bob"), "b1"))
        });
        registry.register_or_update(incoming("ringing"));
        assert_eq!(violations(&recorder), 1);

        registry.register_or_update(with_state(incoming("third"), CallState::MediaEstab, None));
        assert_eq!(violations(&recorder), 2);

        // Shrinking back to two is still a different set
        registry.remove(&conv("third"));
        assert_eq!(violations(&recorder), 3);

        // Once resolved, a new conflict is reported again
        registry.remove(&conv("second"));
        assert!(registry.check_joined_consistency().is_ok());
        registry.register_or_update(with_state(incoming("second"), CallState::MediaEstab, None));
        assert_eq!(violations(&recorder), 4);
    }

    #[test]
    fn test_version_warnings_pruned_on_every_change() {
        let mut registry = CallRegistry::default();
        registry.register_or_update(incoming("a"));
        registry.register_or_update(incoming("b"));

        assert!(registry.accept_version_warning(conv("a")));
        assert!(!registry.accept_version_warning(conv("a")));
        assert!(registry.accept_version_warning(conv("b")));
        assert!(!registry.accept_version_warning(conv("unknown")));

        registry.remove(&conv("a"));
        assert_eq!(registry.accepted_version_warnings(), &[conv("b")]);

        // Termination without removal also prunes
        registry.update_call(&conv("b"), |call| {
            call.apply_state(CallState::Incoming, Some(CallReason::StillOngoing), Utc::now())
                .unwrap()
        });
        assert!(registry.accepted_version_warnings().is_empty());
    }

    #[test]
    fn test_view_mode_transitions_are_unrestricted() {
        let mut registry = CallRegistry::default();
        registry.register_or_update(with_state(incoming("a"), CallState::MediaEstab, None));
        assert_eq!(registry.view_mode(), CallingViewMode::Minimized);

        for mode in [
            CallingViewMode::DetachedWindow,
            CallingViewMode::FullScreenGrid,
            CallingViewMode::Minimized,
            CallingViewMode::DetachedWindow,
            CallingViewMode::Minimized,
        ] {
            registry.set_view_mode(mode);
            assert_eq!(registry.view_mode(), mode);
        }
        assert!(registry.joined_call().is_some());

        registry.toggle_detached_window();
        assert_eq!(registry.view_mode(), CallingViewMode::DetachedWindow);
        registry.toggle_detached_window();
        assert_eq!(registry.view_mode(), CallingViewMode::Minimized);
    }

    #[test]
    fn test_view_tab_and_capture_sources() {
        let mut registry = CallRegistry::default();
        assert!(!registry.is_speakers_view_active());
        registry.set_active_call_view_tab(CallViewTab::Speakers);
        assert!(registry.is_speakers_view_active());

        assert!(!registry.is_choosing_screen());
        registry.set_capture_sources(
            Vec::new(),
            vec![CaptureSource {
                id: "window:1".into(),
                name: "Editor".into(),
                display_id: None,
            }],
        );
        assert!(registry.is_choosing_screen());
        registry.clear_capture_sources();
        assert!(!registry.is_choosing_screen());
    }

    #[test]
    fn test_emojis() {
        let mut registry = CallRegistry::default();
        registry.add_emoji(EmojiReaction {
            emoji: "👍".into(),
            id: "e1".into(),
            left: 42.0,
            from: "Alice".into(),
        });
        assert_eq!(registry.emojis().len(), 1);
        assert!(!registry.remove_emoji("e2"));
        assert!(registry.remove_emoji("e1"));
        assert!(registry.emojis().is_empty());
    }

    #[test]
    fn test_cbr_from_config() {
        let config = CallingConfig {
            enforce_constant_bitrate: true,
            ..Default::default()
        };
        assert!(CallRegistry::new(&config).cbr_encoding());
        assert!(!CallRegistry::default().cbr_encoding());
    }
}
