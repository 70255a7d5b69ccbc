//! Boundary with the signaling/media engine and the UI navigation.
//!
//! Commands are fire-and-forget: nothing here waits for the engine. The
//! engine reports the outcome later as an [`EngineEvent`](super::EngineEvent);
//! a rejected command simply never produces one.

use log::debug;
use serde::Serialize;
use tokio::sync::mpsc;

use super::participant::ParticipantId;
use super::state::CallType;
use crate::types::jid::QualifiedId;

/// Outbound commands understood by the engine.
pub trait CallingEngine: Send + Sync {
    fn answer(&self, conversation_id: &QualifiedId, call_type: CallType);
    fn reject(&self, conversation_id: &QualifiedId);
    fn leave(&self, conversation_id: &QualifiedId);
    fn set_mute(&self, conversation_id: &QualifiedId, muted: bool);
    fn set_camera(&self, conversation_id: &QualifiedId, enabled: bool);
    fn set_screenshare(&self, conversation_id: &QualifiedId, enabled: bool);
    fn moderator_mute(&self, conversation_id: &QualifiedId, legs: &[ParticipantId]);
}

/// UI side effect performed after answering.
pub trait Navigator: Send + Sync {
    fn show_conversation(&self, conversation_id: &QualifiedId);
}

/// For hosts without a navigable conversation view.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNavigator;

impl Navigator for NoopNavigator {
    fn show_conversation(&self, conversation_id: &QualifiedId) {
        debug!("No navigator installed, staying put for {}", conversation_id);
    }
}

/// A command as a value, for engines driven over a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum EngineCommand {
    Answer {
        conversation_id: QualifiedId,
        call_type: CallType,
    },
    Reject {
        conversation_id: QualifiedId,
    },
    Leave {
        conversation_id: QualifiedId,
    },
    SetMute {
        conversation_id: QualifiedId,
        muted: bool,
    },
    SetCamera {
        conversation_id: QualifiedId,
        enabled: bool,
    },
    SetScreenshare {
        conversation_id: QualifiedId,
        enabled: bool,
    },
    ModeratorMute {
        conversation_id: QualifiedId,
        legs: Vec<ParticipantId>,
    },
}

impl EngineCommand {
    pub fn conversation_id(&self) -> &QualifiedId {
        match self {
            Self::Answer {
                conversation_id, ..
            }
            | Self::Reject { conversation_id }
            | Self::Leave { conversation_id }
            | Self::SetMute {
                conversation_id, ..
            }
            | Self::SetCamera {
                conversation_id, ..
            }
            | Self::SetScreenshare {
                conversation_id, ..
            }
            | Self::ModeratorMute {
                conversation_id, ..
            } => conversation_id,
        }
    }
}

/// Sends every command into an unbounded channel read by an engine task.
#[derive(Debug, Clone)]
pub struct ChannelEngine {
    tx: mpsc::UnboundedSender<EngineCommand>,
}

impl ChannelEngine {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<EngineCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, command: EngineCommand) {
        debug!("Engine command: {:?}", command);
        // Fire-and-forget: a stopped engine looks like one that never answers
        if self.tx.send(command).is_err() {
            debug!("Engine channel closed, command dropped");
        }
    }
}

impl CallingEngine for ChannelEngine {
    fn answer(&self, conversation_id: &QualifiedId, call_type: CallType) {
        self.send(EngineCommand::Answer {
            conversation_id: conversation_id.clone(),
            call_type,
        });
    }

    fn reject(&self, conversation_id: &QualifiedId) {
        self.send(EngineCommand::Reject {
            conversation_id: conversation_id.clone(),
        });
    }

    fn leave(&self, conversation_id: &QualifiedId) {
        self.send(EngineCommand::Leave {
            conversation_id: conversation_id.clone(),
        });
    }

    fn set_mute(&self, conversation_id: &QualifiedId, muted: bool) {
        self.send(EngineCommand::SetMute {
            conversation_id: conversation_id.clone(),
            muted,
        });
    }

    fn set_camera(&self, conversation_id: &QualifiedId, enabled: bool) {
        self.send(EngineCommand::SetCamera {
            conversation_id: conversation_id.clone(),
            enabled,
        });
    }

    fn set_screenshare(&self, conversation_id: &QualifiedId, enabled: bool) {
        self.send(EngineCommand::SetScreenshare {
            conversation_id: conversation_id.clone(),
            enabled,
        });
    }

    fn moderator_mute(&self, conversation_id: &QualifiedId, legs: &[ParticipantId]) {
        self.send(EngineCommand::ModeratorMute {
            conversation_id: conversation_id.clone(),
            legs: legs.to_vec(),
        });
    }
}
