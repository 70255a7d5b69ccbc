//! Inbound engine events.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use super::error::CallError;
use super::manager::CallManager;
use super::participant::{MediaFlags, ParticipantId};
use super::registry::CaptureSource;
use super::state::{Call, CallDirection, CallReason, CallState, CallType, MuteState};
use crate::types::jid::QualifiedId;

/// Events reported by the signaling/media engine, applied in arrival order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    SessionCreated {
        conversation_id: QualifiedId,
        direction: CallDirection,
        #[serde(default)]
        call_type: CallType,
        #[serde(default)]
        is_group: bool,
        #[serde(default)]
        is_conference: bool,
    },
    StateChanged {
        conversation_id: QualifiedId,
        state: CallState,
        #[serde(default)]
        reason: Option<CallReason>,
    },
    MediaEstablished {
        conversation_id: QualifiedId,
        timestamp: DateTime<Utc>,
    },
    /// The engine considers the call over for this client.
    CallClosed {
        conversation_id: QualifiedId,
        reason: CallReason,
    },
    ParticipantJoined {
        conversation_id: QualifiedId,
        participant: ParticipantId,
    },
    ParticipantLeft {
        conversation_id: QualifiedId,
        participant: ParticipantId,
    },
    ParticipantMediaChanged {
        conversation_id: QualifiedId,
        participant: ParticipantId,
        media: MediaFlags,
    },
    MuteChanged {
        conversation_id: QualifiedId,
        leg: ParticipantId,
        mute_state: MuteState,
    },
    ActiveSpeakersChanged {
        conversation_id: QualifiedId,
        speakers: Vec<ParticipantId>,
    },
    CbrChanged {
        conversation_id: QualifiedId,
        enabled: bool,
    },
    CaptureSourcesChanged {
        screens: Vec<CaptureSource>,
        windows: Vec<CaptureSource>,
    },
}

impl EngineEvent {
    pub fn conversation_id(&self) -> Option<&QualifiedId> {
        match self {
            Self::SessionCreated {
                conversation_id, ..
            }
            | Self::StateChanged {
                conversation_id, ..
            }
            | Self::MediaEstablished {
                conversation_id, ..
            }
            | Self::CallClosed {
                conversation_id, ..
            }
            | Self::ParticipantJoined {
                conversation_id, ..
            }
            | Self::ParticipantLeft {
                conversation_id, ..
            }
            | Self::ParticipantMediaChanged {
                conversation_id, ..
            }
            | Self::MuteChanged {
                conversation_id, ..
            }
            | Self::ActiveSpeakersChanged {
                conversation_id, ..
            }
            | Self::CbrChanged {
                conversation_id, ..
            } => Some(conversation_id),
            Self::CaptureSourcesChanged { .. } => None,
        }
    }
}

impl CallManager {
    /// Apply one engine event. Events for unknown conversations (other than
    /// session creation) are dropped.
    pub fn handle_engine_event(&mut self, event: EngineEvent) {
        debug!("Engine event: {:?}", event);

        match event {
            EngineEvent::SessionCreated {
                conversation_id,
                direction,
                call_type,
                is_group,
                is_conference,
            } => {
                self.handle_session_created(
                    conversation_id,
                    direction,
                    call_type,
                    is_group,
                    is_conference,
                );
            }
            EngineEvent::StateChanged {
                conversation_id,
                state,
                reason,
            } => {
                self.handle_state_change(&conversation_id, state, reason, Utc::now());
            }
            EngineEvent::MediaEstablished {
                conversation_id,
                timestamp,
            } => {
                self.handle_state_change(&conversation_id, CallState::MediaEstab, None, timestamp);
            }
            EngineEvent::CallClosed {
                conversation_id,
                reason,
            } => {
                // Retained sessions go back to ringing so they can be joined
                self.handle_state_change(
                    &conversation_id,
                    CallState::Incoming,
                    Some(reason),
                    Utc::now(),
                );
            }
            EngineEvent::ParticipantJoined {
                conversation_id,
                participant,
            } => {
                self.update_or_log(&conversation_id, "participant joined", |call| {
                    call.add_participant(participant)
                });
            }
            EngineEvent::ParticipantLeft {
                conversation_id,
                participant,
            } => {
                self.update_or_log(&conversation_id, "participant left", |call| {
                    call.remove_participant(&participant).is_some()
                });
            }
            EngineEvent::ParticipantMediaChanged {
                conversation_id,
                participant,
                media,
            } => {
                self.update_or_log(&conversation_id, "media change", |call| {
                    call.set_participant_media(&participant, media)
                });
            }
            EngineEvent::MuteChanged {
                conversation_id,
                leg,
                mute_state,
            } => {
                if leg.matches(&self.self_leg) && mute_state.is_remote() {
                    info!("Muted by moderator in {} ({:?})", conversation_id, mute_state);
                }
                self.update_or_log(&conversation_id, "mute change", |call| {
                    call.apply_mute(&leg, mute_state)
                });
            }
            EngineEvent::ActiveSpeakersChanged {
                conversation_id,
                speakers,
            } => {
                self.update_or_log(&conversation_id, "active speakers", |call| {
                    call.set_active_speakers(&speakers)
                });
            }
            EngineEvent::CbrChanged {
                conversation_id,
                enabled,
            } => {
                self.update_or_log(&conversation_id, "cbr change", |call| {
                    let changed = call.is_cbr_enabled != enabled;
                    call.is_cbr_enabled = enabled;
                    changed
                });
            }
            EngineEvent::CaptureSourcesChanged { screens, windows } => {
                self.registry.set_capture_sources(screens, windows);
            }
        }

        self.sync_shortcuts();
    }

    fn handle_session_created(
        &mut self,
        conversation_id: QualifiedId,
        direction: CallDirection,
        call_type: CallType,
        is_group: bool,
        is_conference: bool,
    ) {
        let self_leg = self.self_leg.clone();
        let call = match direction {
            CallDirection::Outgoing => Call::new_outgoing(conversation_id, self_leg, call_type),
            CallDirection::Incoming => Call::new_incoming(conversation_id, self_leg, call_type),
        }
        .with_group(is_group)
        .with_conference(is_conference)
        .with_cbr(self.registry.cbr_encoding())
        .with_page_size(self.config.participants_per_page);

        info!(
            "{:?} {:?} call in {}",
            direction, call_type, call.conversation_id
        );
        self.registry.register_or_update(call);
    }

    /// Terminal reasons either keep the session (joinable later) or drop it.
    fn handle_state_change(
        &mut self,
        conversation_id: &QualifiedId,
        state: CallState,
        reason: Option<CallReason>,
        now: DateTime<Utc>,
    ) {
        let applied = self.registry.update_call(conversation_id, |call| {
            match call.apply_state(state, reason, now) {
                Ok(changed) => changed,
                Err(e) => {
                    warn!(
                        "Ignoring state change for {}: {}",
                        conversation_id,
                        CallError::from(e)
                    );
                    false
                }
            }
        });

        if applied.is_none() {
            debug!("State change for unknown call {}", conversation_id);
            return;
        }

        if let Some(reason) = reason {
            if reason.is_retained() {
                info!("Call {} closed ({:?}), kept as joinable", conversation_id, reason);
            } else {
                info!("Call {} closed ({:?})", conversation_id, reason);
                self.registry.remove(conversation_id);
            }
        }
    }

    fn update_or_log<F>(&mut self, conversation_id: &QualifiedId, what: &str, f: F)
    where
        F: FnOnce(&mut Call) -> bool,
    {
        if self.registry.update_call(conversation_id, f).is_none() {
            debug!("Dropping {} for unknown call {}", what, conversation_id);
        }
    }
}
