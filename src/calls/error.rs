//! Call-related error types.

use thiserror::Error;

use super::state::{CallState, InvalidTransition};
use crate::types::jid::QualifiedId;

#[derive(Debug, Error)]
pub enum CallError {
    #[error("call not found: {0}")]
    NotFound(QualifiedId),

    #[error("invalid call state transition: {0}")]
    InvalidTransition(#[from] InvalidTransition),

    #[error("{command} not allowed in state {state:?}")]
    InvalidCommand {
        command: &'static str,
        state: CallState,
    },

    #[error("call {0} already terminated")]
    Terminated(QualifiedId),

    #[error("call {0} is force-muted by a moderator")]
    ForceMuted(QualifiedId),

    #[error("participant {participant} not in call {conversation_id}")]
    UnknownParticipant {
        conversation_id: QualifiedId,
        participant: String,
    },

    #[error("{} calls report established media: {}", .0.len(), display_ids(.0))]
    MultipleJoinedCalls(Vec<QualifiedId>),
}

fn display_ids(ids: &[QualifiedId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
