//! Keyboard shortcuts for ringing calls.
//!
//! Each incoming session gets one capture-phase listener for as long as it
//! stays incoming. Listeners must be removed as soon as the session leaves
//! that state, otherwise a shortcut would act on several calls at once.

use log::debug;

use super::manager::CallManager;
use super::state::{Call, CallState};
use crate::types::jid::QualifiedId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Enter,
    Space,
    Escape,
    Char(char),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub key: Key,
    pub ctrl: bool,
    pub shift: bool,
}

impl KeyEvent {
    pub fn new(key: Key) -> Self {
        Self {
            key,
            ctrl: false,
            shift: false,
        }
    }

    pub fn with_ctrl(mut self) -> Self {
        self.ctrl = true;
        self
    }

    pub fn with_shift(mut self) -> Self {
        self.shift = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallShortcut {
    /// Ctrl+Enter
    Answer,
    /// Ctrl+Shift+Enter
    HangUp,
}

impl CallShortcut {
    pub fn from_key_event(event: &KeyEvent) -> Option<Self> {
        if event.key != Key::Enter || !event.ctrl {
            return None;
        }
        Some(if event.shift { Self::HangUp } else { Self::Answer })
    }
}

/// Installed listeners, one per incoming conversation, in install order.
#[derive(Debug, Default)]
pub struct ShortcutListeners {
    installed: Vec<QualifiedId>,
}

impl ShortcutListeners {
    pub fn len(&self) -> usize {
        self.installed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.installed.is_empty()
    }

    pub fn is_installed(&self, conversation_id: &QualifiedId) -> bool {
        self.installed.iter().any(|id| id.matches(conversation_id))
    }

    pub fn first(&self) -> Option<&QualifiedId> {
        self.installed.first()
    }

    fn install(&mut self, conversation_id: &QualifiedId) -> bool {
        if self.is_installed(conversation_id) {
            return false;
        }
        debug!("Installing call shortcuts for {}", conversation_id);
        self.installed.push(conversation_id.clone());
        true
    }

    pub(crate) fn uninstall(&mut self, conversation_id: &QualifiedId) -> bool {
        let before = self.installed.len();
        self.installed.retain(|id| !id.matches(conversation_id));
        before != self.installed.len()
    }

    /// Bring listeners in line with the sessions: incoming ones get a
    /// listener, everything else loses it.
    pub(crate) fn sync(&mut self, calls: &[Call]) {
        self.installed.retain(|id| {
            let keep = calls
                .iter()
                .any(|call| call.state == CallState::Incoming && call.conversation_id.matches(id));
            if !keep {
                debug!("Removing call shortcuts for {}", id);
            }
            keep
        });
        for call in calls.iter().filter(|call| call.state == CallState::Incoming) {
            self.install(&call.conversation_id);
        }
    }

    pub(crate) fn clear(&mut self) -> usize {
        let count = self.installed.len();
        self.installed.clear();
        count
    }
}

impl CallManager {
    /// Route a key press to the earliest installed incoming-call listener.
    ///
    /// Returns true when the event was consumed and must not reach any other
    /// handler. The listener is removed before acting, so a repeated press
    /// cannot fire it twice.
    pub fn handle_key_event(&mut self, event: &KeyEvent) -> bool {
        let Some(shortcut) = CallShortcut::from_key_event(event) else {
            return false;
        };
        let Some(conversation_id) = self.shortcuts.first().cloned() else {
            return false;
        };

        self.shortcuts.uninstall(&conversation_id);
        match shortcut {
            CallShortcut::Answer => {
                self.answer(&conversation_id);
            }
            CallShortcut::HangUp => {
                self.reject(&conversation_id);
            }
        }
        true
    }
}
