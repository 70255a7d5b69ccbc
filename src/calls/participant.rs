//! Participants of a call session.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::jid::QualifiedId;

/// Identifies one media leg: a user plus the client (device) they joined from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParticipantId {
    pub user_id: QualifiedId,
    pub client_id: String,
}

impl ParticipantId {
    pub fn new(user_id: QualifiedId, client_id: impl Into<String>) -> Self {
        Self {
            user_id,
            client_id: client_id.into(),
        }
    }

    pub fn matches(&self, other: &ParticipantId) -> bool {
        self.client_id == other.client_id && self.user_id.matches(&other.user_id)
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.user_id, self.client_id)
    }
}

/// Media flags reported by the engine for a single leg.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaFlags {
    pub shares_camera: bool,
    pub shares_screen: bool,
    pub has_active_video: bool,
}

/// One leg in a call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub shares_screen: bool,
    pub shares_camera: bool,
    pub has_active_video: bool,
    pub is_muted: bool,
    /// Derived from the engine's audio level signal.
    pub is_speaking: bool,
}

impl Participant {
    pub fn new(id: ParticipantId) -> Self {
        Self {
            id,
            shares_screen: false,
            shares_camera: false,
            has_active_video: false,
            is_muted: false,
            is_speaking: false,
        }
    }

    pub fn user_id(&self) -> &QualifiedId {
        &self.id.user_id
    }

    pub fn client_id(&self) -> &str {
        &self.id.client_id
    }

    pub fn is_sending_video(&self) -> bool {
        self.shares_camera || self.shares_screen
    }

    pub fn apply_media(&mut self, flags: MediaFlags) {
        self.shares_camera = flags.shares_camera;
        self.shares_screen = flags.shares_screen;
        self.has_active_video = flags.has_active_video;
    }

    pub fn media(&self) -> MediaFlags {
        MediaFlags {
            shares_camera: self.shares_camera,
            shares_screen: self.shares_screen,
            has_active_video: self.has_active_video,
        }
    }
}
