//! Client-side call session orchestration.
//!
//! Tracks every call the local client knows about, applies the engine's
//! events to them and turns user intent into engine commands. The engine
//! itself (signaling, media, codecs) lives behind [`CallingEngine`].
//!
//! # Architecture
//!
//! - [`Participant`]: one media leg of one user in a call
//! - [`Call`] & [`CallState`]: a call session and its state machine
//! - [`CallRegistry`]: all sessions plus derived views (joined, active, joinable)
//! - [`EngineEvent`]: inbound events, applied by [`CallManager::handle_engine_event`]
//! - [`CallingEngine`]: outbound fire-and-forget commands
//! - [`CallManager`]: owns the registry and dispatches user actions
//! - [`CallCellView`]: per-call view model for the UI
//!
//! # Flow
//!
//! Engine events mutate sessions, the registry re-derives its views and
//! notifies observers, the UI reads state and calls actions, and actions send
//! commands that the engine later confirms with another event.

mod actions;
mod engine;
mod error;
mod handler;
mod manager;
mod participant;
mod registry;
mod shortcuts;
mod state;
mod view;

pub use engine::{CallingEngine, ChannelEngine, EngineCommand, Navigator, NoopNavigator};
pub use error::CallError;
pub use handler::EngineEvent;
pub use manager::CallManager;
pub use participant::{MediaFlags, Participant, ParticipantId};
pub use registry::{CallRegistry, CallViewTab, CallingViewMode, CaptureSource, EmojiReaction};
pub use shortcuts::{CallShortcut, Key, KeyEvent, ShortcutListeners};
pub use state::{
    Call, CallDirection, CallReason, CallState, CallType, InvalidTransition, MuteState,
    PARTICIPANTS_PER_PAGE,
};
pub use view::{CallCellView, CallStatus, ViewContext};
