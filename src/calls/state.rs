//! Call session model and state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::participant::{MediaFlags, Participant, ParticipantId};
use crate::types::jid::QualifiedId;

/// Video grid page size used when no configuration overrides it.
pub const PARTICIPANTS_PER_PAGE: usize = 9;

/// Lifecycle state of a call, as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallState {
    /// Locally initiated, waiting for the remote side.
    Outgoing,
    /// Remotely initiated, ringing locally.
    Incoming,
    /// Answered, media is being negotiated.
    Answered,
    /// Media established.
    MediaEstab,
}

impl CallState {
    pub fn is_ringing(&self) -> bool {
        matches!(self, Self::Outgoing | Self::Incoming)
    }

    pub fn is_connecting(&self) -> bool {
        matches!(self, Self::Answered)
    }

    pub fn is_ongoing(&self) -> bool {
        matches!(self, Self::MediaEstab)
    }

    /// Transitions the engine may report without a termination reason.
    pub fn can_transition_to(&self, next: CallState) -> bool {
        matches!(
            (self, next),
            (Self::Outgoing, Self::Answered)
                | (Self::Incoming, Self::Answered)
                | (Self::Answered, Self::MediaEstab)
        )
    }
}

/// Termination reason codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum CallReason {
    Normal = 0,
    Error = 1,
    Timeout = 2,
    LostMedia = 3,
    Canceled = 4,
    /// Another device of the local user answered.
    AnsweredElsewhere = 5,
    IoError = 6,
    /// The local user left but the call continues without them.
    StillOngoing = 7,
    TimeoutEconn = 8,
    DataChannel = 9,
    Rejected = 10,
    OutdatedClient = 11,
}

impl CallReason {
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => Self::Normal,
            1 => Self::Error,
            2 => Self::Timeout,
            3 => Self::LostMedia,
            4 => Self::Canceled,
            5 => Self::AnsweredElsewhere,
            6 => Self::IoError,
            7 => Self::StillOngoing,
            8 => Self::TimeoutEconn,
            9 => Self::DataChannel,
            10 => Self::Rejected,
            11 => Self::OutdatedClient,
            _ => return None,
        })
    }

    pub fn code(&self) -> u8 {
        *self as u8
    }

    /// Sessions closed with these reasons stay in the registry so the user
    /// can still join them.
    pub fn is_retained(&self) -> bool {
        matches!(self, Self::StillOngoing | Self::AnsweredElsewhere)
    }
}

/// Mute state of the local leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MuteState {
    #[default]
    NotMuted,
    SelfMuted,
    RemoteMuted,
    /// Imposed by a moderator; the user cannot unmute locally.
    RemoteForceMuted,
}

impl MuteState {
    pub fn is_muted(&self) -> bool {
        !matches!(self, Self::NotMuted)
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Self::RemoteMuted | Self::RemoteForceMuted)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CallType {
    #[default]
    Audio,
    Video,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallDirection {
    Outgoing,
    Incoming,
}

/// One ongoing or proposed call, keyed by its conversation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Call {
    pub conversation_id: QualifiedId,
    /// The local user's leg. Always present in `participants`.
    pub self_leg: ParticipantId,
    pub direction: CallDirection,
    pub state: CallState,
    pub reason: Option<CallReason>,
    pub is_conference: bool,
    pub is_group: bool,
    pub initial_type: CallType,
    /// Set the first time media is established, never cleared afterwards.
    pub started_at: Option<DateTime<Utc>>,
    pub mute_state: MuteState,
    pub is_cbr_enabled: bool,
    /// Join order.
    pub participants: Vec<Participant>,
    pub maximized_participant: Option<ParticipantId>,
    pub current_page: usize,
    pub page_size: usize,
}

impl Call {
    pub fn new_outgoing(
        conversation_id: QualifiedId,
        self_leg: ParticipantId,
        initial_type: CallType,
    ) -> Self {
        Self::new(
            conversation_id,
            self_leg,
            CallDirection::Outgoing,
            CallState::Outgoing,
            initial_type,
        )
    }

    pub fn new_incoming(
        conversation_id: QualifiedId,
        self_leg: ParticipantId,
        initial_type: CallType,
    ) -> Self {
        Self::new(
            conversation_id,
            self_leg,
            CallDirection::Incoming,
            CallState::Incoming,
            initial_type,
        )
    }

    fn new(
        conversation_id: QualifiedId,
        self_leg: ParticipantId,
        direction: CallDirection,
        state: CallState,
        initial_type: CallType,
    ) -> Self {
        let mut self_participant = Participant::new(self_leg.clone());
        self_participant.shares_camera =
            direction == CallDirection::Outgoing && initial_type == CallType::Video;
        Self {
            conversation_id,
            self_leg,
            direction,
            state,
            reason: None,
            is_conference: false,
            is_group: false,
            initial_type,
            started_at: None,
            mute_state: MuteState::NotMuted,
            is_cbr_enabled: false,
            participants: vec![self_participant],
            maximized_participant: None,
            current_page: 0,
            page_size: PARTICIPANTS_PER_PAGE,
        }
    }

    pub fn with_conference(mut self, is_conference: bool) -> Self {
        self.is_conference = is_conference;
        self
    }

    pub fn with_group(mut self, is_group: bool) -> Self {
        self.is_group = is_group;
        self
    }

    pub fn with_cbr(mut self, is_cbr_enabled: bool) -> Self {
        self.is_cbr_enabled = is_cbr_enabled;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn is_video_call(&self) -> bool {
        self.initial_type == CallType::Video
    }

    pub fn is_terminated(&self) -> bool {
        self.reason.is_some()
    }

    /// Closed with a reason that keeps the session around for joining.
    pub fn is_declined(&self) -> bool {
        self.reason.is_some_and(|reason| reason.is_retained())
    }

    /// One-to-one calls always support video; group calls only as conferences.
    pub fn supports_video_call(&self) -> bool {
        !self.is_group || self.is_conference
    }

    /// Apply a state change reported by the engine.
    ///
    /// A reason marks termination and is accepted from any state. Without a
    /// reason, only the transitions of [`CallState::can_transition_to`] and
    /// repeats of the current state are accepted; a repeat clears a previous
    /// reason. Returns whether anything changed.
    pub fn apply_state(
        &mut self,
        state: CallState,
        reason: Option<CallReason>,
        now: DateTime<Utc>,
    ) -> Result<bool, InvalidTransition> {
        if reason.is_none() && state != self.state && !self.state.can_transition_to(state) {
            return Err(InvalidTransition {
                from: self.state,
                to: state,
            });
        }

        let changed = self.state != state || self.reason != reason;
        self.state = state;
        self.reason = reason;
        if state.is_ongoing() && self.started_at.is_none() {
            self.started_at = Some(now);
        }
        Ok(changed)
    }

    pub fn self_participant(&self) -> Option<&Participant> {
        self.participant(&self.self_leg)
    }

    pub fn remote_participants(&self) -> impl Iterator<Item = &Participant> {
        self.participants
            .iter()
            .filter(|participant| !participant.id.matches(&self.self_leg))
    }

    pub fn participant(&self, id: &ParticipantId) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id.matches(id))
    }

    pub(crate) fn participant_mut(&mut self, id: &ParticipantId) -> Option<&mut Participant> {
        self.participants.iter_mut().find(|p| p.id.matches(id))
    }

    /// Returns false when the leg is already part of the call.
    pub(crate) fn add_participant(&mut self, id: ParticipantId) -> bool {
        if self.participant(&id).is_some() {
            return false;
        }
        self.participants.push(Participant::new(id));
        true
    }

    pub(crate) fn remove_participant(&mut self, id: &ParticipantId) -> Option<Participant> {
        let index = self.participants.iter().position(|p| p.id.matches(id))?;
        let removed = self.participants.remove(index);
        if self
            .maximized_participant
            .as_ref()
            .is_some_and(|maximized| maximized.matches(id))
        {
            self.maximized_participant = None;
        }
        self.clamp_current_page();
        Some(removed)
    }

    pub(crate) fn set_participant_media(&mut self, id: &ParticipantId, flags: MediaFlags) -> bool {
        match self.participant_mut(id) {
            Some(participant) if participant.media() != flags => {
                participant.apply_media(flags);
                true
            }
            _ => false,
        }
    }

    /// Apply a mute change for one leg. The local leg's change becomes the
    /// call's mute state.
    pub(crate) fn apply_mute(&mut self, leg: &ParticipantId, mute_state: MuteState) -> bool {
        let mut changed = false;
        if leg.matches(&self.self_leg) && self.mute_state != mute_state {
            self.mute_state = mute_state;
            changed = true;
        }
        if let Some(participant) = self.participant_mut(leg)
            && participant.is_muted != mute_state.is_muted()
        {
            participant.is_muted = mute_state.is_muted();
            changed = true;
        }
        changed
    }

    /// Marks exactly the given legs as speaking.
    pub(crate) fn set_active_speakers(&mut self, speakers: &[ParticipantId]) -> bool {
        let mut changed = false;
        for participant in &mut self.participants {
            let speaking = speakers.iter().any(|leg| leg.matches(&participant.id));
            if participant.is_speaking != speaking {
                participant.is_speaking = speaking;
                changed = true;
            }
        }
        changed
    }

    pub fn active_speakers(&self, max: usize) -> Vec<&Participant> {
        self.participants
            .iter()
            .filter(|participant| participant.is_speaking)
            .take(max)
            .collect()
    }

    /// Video grid pages: the local leg first, then remote legs sending video,
    /// then the rest.
    pub fn pages(&self) -> Vec<Vec<&Participant>> {
        let (with_video, without_video): (Vec<&Participant>, Vec<&Participant>) = self
            .remote_participants()
            .partition(|participant| participant.is_sending_video());

        let ordered: Vec<&Participant> = self
            .self_participant()
            .into_iter()
            .chain(with_video)
            .chain(without_video)
            .collect();

        ordered
            .chunks(self.page_size.max(1))
            .map(|page| page.to_vec())
            .collect()
    }

    pub fn page_count(&self) -> usize {
        self.participants.len().div_ceil(self.page_size.max(1))
    }

    pub fn current_page_participants(&self) -> Vec<&Participant> {
        self.pages()
            .into_iter()
            .nth(self.current_page)
            .unwrap_or_default()
    }

    pub(crate) fn set_current_page(&mut self, page: usize) -> bool {
        let clamped = page.min(self.page_count().saturating_sub(1));
        let changed = self.current_page != clamped;
        self.current_page = clamped;
        changed
    }

    fn clamp_current_page(&mut self) {
        self.set_current_page(self.current_page);
    }

    pub(crate) fn set_maximized_participant(&mut self, leg: Option<ParticipantId>) -> bool {
        let leg = leg.filter(|leg| self.participant(leg).is_some());
        if self.maximized_participant == leg {
            return false;
        }
        self.maximized_participant = leg;
        true
    }

    /// Legs targeted by a moderator's "mute others" on `target`: everybody but
    /// the target and the local leg.
    pub fn mute_others_targets(&self, target: &ParticipantId) -> Vec<ParticipantId> {
        self.remote_participants()
            .filter(|participant| !participant.id.matches(target))
            .map(|participant| participant.id.clone())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidTransition {
    pub from: CallState,
    pub to: CallState,
}

impl std::fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid transition {:?} -> {:?}", self.from, self.to)
    }
}

impl std::error::Error for InvalidTransition {}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn leg(user: &str, client: &str) -> ParticipantId {
        ParticipantId::new(user.parse().unwrap(), client)
    }

    fn make_incoming_call() -> Call {
        Call::new_incoming(
            "conv-1@wire.example".parse().unwrap(),
            leg("me@wire.example", "self"),
            CallType::Audio,
        )
    }

    fn make_outgoing_call() -> Call {
        Call::new_outgoing(
            "conv-2@wire.example".parse().unwrap(),
            leg("me@wire.example", "self"),
            CallType::Video,
        )
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    /// Outgoing → Answered → MediaEstab → terminated
    #[test]
    fn test_outgoing_call_flow() {
        let mut call = make_outgoing_call();
        assert_eq!(call.state, CallState::Outgoing);
        assert!(call.self_participant().unwrap().shares_camera);

        assert!(call.apply_state(CallState::Answered, None, at(1)).unwrap());
        assert!(call.started_at.is_none());

        assert!(call.apply_state(CallState::MediaEstab, None, at(2)).unwrap());
        assert_eq!(call.started_at, Some(at(2)));

        call.apply_state(CallState::MediaEstab, Some(CallReason::Normal), at(3))
            .unwrap();
        assert!(call.is_terminated());
        assert!(!call.is_declined());
    }

    #[test]
    fn test_started_at_survives_termination() {
        let mut call = make_incoming_call();
        call.apply_state(CallState::Answered, None, at(1)).unwrap();
        call.apply_state(CallState::MediaEstab, None, at(2)).unwrap();

        call.apply_state(CallState::Incoming, Some(CallReason::StillOngoing), at(10))
            .unwrap();
        assert!(call.is_declined());
        assert_eq!(call.started_at, Some(at(2)));

        // Rejoining keeps the first timestamp
        call.apply_state(CallState::Answered, None, at(11)).unwrap();
        call.apply_state(CallState::MediaEstab, None, at(12)).unwrap();
        assert_eq!(call.started_at, Some(at(2)));
        assert!(call.reason.is_none());
    }

    #[test]
    fn test_repeated_state_is_idempotent() {
        let mut call = make_incoming_call();
        assert!(call.apply_state(CallState::Answered, None, at(1)).unwrap());
        let once = call.clone();

        assert!(!call.apply_state(CallState::Answered, None, at(5)).unwrap());
        assert_eq!(call, once);
    }

    #[test]
    fn test_invalid_transitions_are_rejected() {
        let mut call = make_incoming_call();

        let err = call
            .apply_state(CallState::MediaEstab, None, at(1))
            .unwrap_err();
        assert_eq!(err.from, CallState::Incoming);
        assert_eq!(err.to, CallState::MediaEstab);
        assert_eq!(call.state, CallState::Incoming);

        assert!(call.apply_state(CallState::Outgoing, None, at(1)).is_err());
    }

    #[test]
    fn test_termination_accepted_from_any_state() {
        for state in [
            CallState::Outgoing,
            CallState::Incoming,
            CallState::Answered,
            CallState::MediaEstab,
        ] {
            let mut call = make_incoming_call();
            call.state = state;
            assert!(
                call.apply_state(state, Some(CallReason::Rejected), at(1))
                    .is_ok()
            );
            assert_eq!(call.reason, Some(CallReason::Rejected));
        }
    }

    #[test]
    fn test_reason_codes() {
        for code in 0..=11 {
            assert_eq!(CallReason::from_code(code).unwrap().code(), code);
        }
        assert!(CallReason::from_code(12).is_none());
        assert!(CallReason::AnsweredElsewhere.is_retained());
        assert!(CallReason::StillOngoing.is_retained());
        assert!(!CallReason::Normal.is_retained());
    }

    #[test]
    fn test_remote_mute_applies_to_self_leg_only() {
        let mut call = make_incoming_call();
        let bob = leg("bob@wire.example", "b1");
        call.add_participant(bob.clone());

        assert!(call.apply_mute(&bob, MuteState::RemoteMuted));
        assert_eq!(call.mute_state, MuteState::NotMuted);
        assert!(call.participant(&bob).unwrap().is_muted);

        let self_leg = call.self_leg.clone();
        assert!(call.apply_mute(&self_leg, MuteState::RemoteForceMuted));
        assert_eq!(call.mute_state, MuteState::RemoteForceMuted);
        assert!(call.self_participant().unwrap().is_muted);
        assert!(!call.apply_mute(&self_leg, MuteState::RemoteForceMuted));
    }

    #[test]
    fn test_participants_unique_per_leg() {
        let mut call = make_incoming_call();
        assert!(call.add_participant(leg("bob@wire.example", "phone")));
        assert!(call.add_participant(leg("bob@wire.example", "desktop")));
        assert!(!call.add_participant(leg("bob@wire.example", "phone")));
        assert!(!call.add_participant(call.self_leg.clone()));
        assert_eq!(call.participants.len(), 3);
    }

    #[test]
    fn test_pages_order_and_clamping() {
        let mut call = make_incoming_call().with_page_size(2);
        let quiet = leg("quiet@wire.example", "q");
        let camera = leg("camera@wire.example", "c");
        call.add_participant(quiet.clone());
        call.add_participant(camera.clone());
        call.set_participant_media(
            &camera,
            MediaFlags {
                shares_camera: true,
                has_active_video: true,
                ..Default::default()
            },
        );

        let pages = call.pages();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0][0].id, call.self_leg);
        assert_eq!(pages[0][1].id, camera);
        assert_eq!(pages[1][0].id, quiet);

        assert!(call.set_current_page(7));
        assert_eq!(call.current_page, 1);

        call.remove_participant(&quiet);
        assert_eq!(call.current_page, 0);
        assert_eq!(call.current_page_participants().len(), 2);
    }

    #[test]
    fn test_maximized_participant_cleared_on_leave() {
        let mut call = make_incoming_call();
        let bob = leg("bob@wire.example", "b1");
        call.add_participant(bob.clone());

        assert!(!call.set_maximized_participant(Some(leg("ghost@wire.example", "x"))));
        assert!(call.maximized_participant.is_none());

        assert!(call.set_maximized_participant(Some(bob.clone())));
        assert!(!call.set_maximized_participant(Some(bob.clone())));

        call.remove_participant(&bob);
        assert!(call.maximized_participant.is_none());
    }

    #[test]
    fn test_active_speakers_capped_in_join_order() {
        let mut call = make_incoming_call();
        let legs: Vec<_> = (0..6)
            .map(|i| leg(&format!("user{i}@wire.example"), "c"))
            .collect();
        for l in &legs {
            call.add_participant(l.clone());
        }

        call.set_active_speakers(&[legs[4].clone(), legs[1].clone(), legs[2].clone()]);
        let speakers: Vec<_> = call.active_speakers(2).into_iter().map(|p| &p.id).collect();
        assert_eq!(speakers, vec![&legs[1], &legs[2]]);

        call.set_active_speakers(&[]);
        assert!(call.active_speakers(4).is_empty());
    }

    #[test]
    fn test_mute_others_excludes_target_and_self() {
        let mut call = make_incoming_call();
        let bob = leg("bob@wire.example", "b1");
        let carol = leg("carol@wire.example", "c1");
        call.add_participant(bob.clone());
        call.add_participant(carol.clone());

        assert_eq!(call.mute_others_targets(&bob), vec![carol.clone()]);

        let self_leg = call.self_leg.clone();
        assert_eq!(call.mute_others_targets(&self_leg), vec![bob, carol]);
    }

    #[test]
    fn test_video_support_depends_on_conference() {
        let call = make_incoming_call();
        assert!(call.supports_video_call());
        assert!(!call.clone().with_group(true).supports_video_call());
        assert!(
            call.with_group(true)
                .with_conference(true)
                .supports_video_call()
        );
    }
}
