//! User-initiated call actions.
//!
//! Every action is checked against the session's current state and then
//! handed to the engine without waiting for a reply. An action that does not
//! apply is a no-op and returns false; nothing here fails loudly.

use log::{debug, info};

use super::error::CallError;
use super::manager::CallManager;
use super::participant::ParticipantId;
use super::registry::{CallViewTab, CallingViewMode};
use super::state::{Call, CallState, MuteState};
use crate::types::jid::QualifiedId;

impl CallManager {
    fn call_for(&self, conversation_id: &QualifiedId) -> Result<&Call, CallError> {
        self.registry
            .get(conversation_id)
            .ok_or_else(|| CallError::NotFound(conversation_id.clone()))
    }

    /// A session that has not been terminated.
    fn live_call(&self, conversation_id: &QualifiedId) -> Result<&Call, CallError> {
        let call = self.call_for(conversation_id)?;
        if call.reason.is_some() {
            return Err(CallError::Terminated(call.conversation_id.clone()));
        }
        Ok(call)
    }

    fn require_state(
        &self,
        conversation_id: &QualifiedId,
        command: &'static str,
        allowed: &[CallState],
    ) -> Result<&Call, CallError> {
        let call = self.call_for(conversation_id)?;
        if !allowed.contains(&call.state) {
            return Err(CallError::InvalidCommand {
                command,
                state: call.state,
            });
        }
        Ok(call)
    }

    /// Accept an incoming call, or join a declined one that is still going,
    /// then bring its conversation into view.
    pub fn answer(&mut self, conversation_id: &QualifiedId) -> bool {
        let call = match self.require_state(conversation_id, "answer", &[CallState::Incoming]) {
            Ok(call) => call,
            Err(e) => {
                debug!("Ignoring answer: {}", e);
                return false;
            }
        };

        info!("Answering call in {}", conversation_id);
        self.engine.answer(&call.conversation_id, call.initial_type);
        self.navigator.show_conversation(&call.conversation_id);
        true
    }

    pub fn reject(&mut self, conversation_id: &QualifiedId) -> bool {
        let result = self
            .require_state(conversation_id, "reject", &[CallState::Incoming])
            .and_then(|call| match call.reason {
                Some(_) => Err(CallError::Terminated(call.conversation_id.clone())),
                None => Ok(call),
            });
        let call = match result {
            Ok(call) => call,
            Err(e) => {
                debug!("Ignoring reject: {}", e);
                return false;
            }
        };

        info!("Rejecting call in {}", conversation_id);
        self.engine.reject(&call.conversation_id);
        true
    }

    /// Hang up a connecting or established call, or cancel an outgoing one.
    pub fn leave(&mut self, conversation_id: &QualifiedId) -> bool {
        let result = self
            .require_state(
                conversation_id,
                "leave",
                &[
                    CallState::Outgoing,
                    CallState::Answered,
                    CallState::MediaEstab,
                ],
            )
            .and_then(|call| match call.reason {
                Some(_) => Err(CallError::Terminated(call.conversation_id.clone())),
                None => Ok(call),
            });
        let call = match result {
            Ok(call) => call,
            Err(e) => {
                debug!("Ignoring leave: {}", e);
                return false;
            }
        };

        info!("Leaving call in {}", conversation_id);
        self.engine.leave(&call.conversation_id);
        true
    }

    /// Mute or unmute the local leg.
    ///
    /// A moderator's force-mute cannot be overridden: the request is dropped
    /// here and never reaches the engine.
    pub fn toggle_mute(&mut self, conversation_id: &QualifiedId, should_mute: bool) -> bool {
        let call = match self.live_call(conversation_id) {
            Ok(call) => call,
            Err(e) => {
                debug!("Ignoring mute toggle: {}", e);
                return false;
            }
        };
        if call.mute_state == MuteState::RemoteForceMuted {
            debug!(
                "Ignoring mute toggle: {}",
                CallError::ForceMuted(call.conversation_id.clone())
            );
            return false;
        }

        let conversation_id = call.conversation_id.clone();
        self.engine.set_mute(&conversation_id, should_mute);

        let mute_state = if should_mute {
            MuteState::SelfMuted
        } else {
            MuteState::NotMuted
        };
        let self_leg = self.self_leg.clone();
        self.registry.update_call(&conversation_id, |call| {
            call.apply_mute(&self_leg, mute_state)
        });
        true
    }

    /// Flip the local camera.
    ///
    /// Callers must check [`Call::supports_video_call`] first; this does not.
    pub fn toggle_camera(&mut self, conversation_id: &QualifiedId) -> bool {
        let Ok(call) = self.live_call(conversation_id) else {
            return false;
        };
        let enabled = !call
            .self_participant()
            .is_some_and(|participant| participant.shares_camera);
        self.engine.set_camera(&call.conversation_id, enabled);
        true
    }

    /// Flip local screen sharing.
    ///
    /// Callers must check the screen-sharing capability first; this does not.
    pub fn toggle_screenshare(&mut self, conversation_id: &QualifiedId) -> bool {
        let Ok(call) = self.live_call(conversation_id) else {
            return false;
        };
        let enabled = !call
            .self_participant()
            .is_some_and(|participant| participant.shares_screen);
        self.engine.set_screenshare(&call.conversation_id, enabled);
        true
    }

    /// Ask the engine to mute the given legs. Moderator rights are the
    /// caller's business.
    pub fn send_moderator_mute(
        &mut self,
        conversation_id: &QualifiedId,
        legs: &[ParticipantId],
    ) -> bool {
        if legs.is_empty() {
            return false;
        }
        info!("Moderator mute of {} leg(s) in {}", legs.len(), conversation_id);
        self.engine.moderator_mute(conversation_id, legs);
        true
    }

    /// Mute a single remote leg that is not muted yet.
    pub fn mute_participant(&mut self, conversation_id: &QualifiedId, leg: &ParticipantId) -> bool {
        let Ok(call) = self.call_for(conversation_id) else {
            return false;
        };
        let target = match call.participant(leg) {
            Some(participant) if !participant.is_muted && !leg.matches(&self.self_leg) => {
                participant.id.clone()
            }
            Some(_) => return false,
            None => {
                debug!(
                    "Ignoring moderator mute: {}",
                    CallError::UnknownParticipant {
                        conversation_id: conversation_id.clone(),
                        participant: leg.to_string(),
                    }
                );
                return false;
            }
        };
        self.send_moderator_mute(conversation_id, &[target])
    }

    /// Mute everybody except `target` and the local leg.
    pub fn mute_others(&mut self, conversation_id: &QualifiedId, target: &ParticipantId) -> bool {
        let Ok(call) = self.call_for(conversation_id) else {
            return false;
        };
        let legs = call.mute_others_targets(target);
        self.send_moderator_mute(conversation_id, &legs)
    }

    /// Switch to the full-screen grid. Only an established call outside the
    /// detached window can be maximized.
    pub fn maximize_call(&mut self, conversation_id: &QualifiedId) -> bool {
        let ongoing = self
            .registry
            .get(conversation_id)
            .is_some_and(|call| call.state.is_ongoing());
        if !ongoing || self.registry.view_mode() == CallingViewMode::DetachedWindow {
            return false;
        }
        self.registry.set_view_mode(CallingViewMode::FullScreenGrid);
        true
    }

    pub fn set_view_mode(&mut self, mode: CallingViewMode) {
        self.registry.set_view_mode(mode);
    }

    pub fn toggle_detached_window(&mut self) {
        self.registry.toggle_detached_window();
    }

    pub fn set_active_call_view_tab(&mut self, tab: CallViewTab) {
        self.registry.set_active_call_view_tab(tab);
    }

    pub fn set_maximized_participant(
        &mut self,
        conversation_id: &QualifiedId,
        leg: Option<ParticipantId>,
    ) -> bool {
        self.registry
            .update_call(conversation_id, |call| call.set_maximized_participant(leg))
            .unwrap_or(false)
    }

    /// Page through the video grid; out-of-range pages are clamped.
    pub fn set_current_page(&mut self, conversation_id: &QualifiedId, page: usize) -> bool {
        self.registry
            .update_call(conversation_id, |call| call.set_current_page(page))
            .unwrap_or(false)
    }
}
