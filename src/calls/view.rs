//! Per-call view model derived from session and registry state.
//!
//! Nothing here is stored: a [`CallCellView`] is recomputed from the current
//! state whenever the UI needs it, so it can never go stale.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::participant::ParticipantId;
use super::registry::{CallRegistry, CallViewTab, CallingViewMode};
use super::state::{Call, CallState, MuteState};
use crate::config::CallingConfig;
use crate::types::jid::QualifiedId;

/// Facts about the local user and host that the core does not track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewContext {
    /// Guest accounts never see declined calls.
    pub is_temporary_user: bool,
    pub has_access_to_camera: bool,
    /// False for compact embeddings that only show the call header.
    pub is_full_ui: bool,
}

impl Default for ViewContext {
    fn default() -> Self {
        Self {
            is_temporary_user: false,
            has_access_to_camera: true,
            is_full_ui: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CallStatus {
    Outgoing,
    Incoming,
    Connecting,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallCellView {
    /// Routes clicks on this cell back to its call.
    pub conversation_id: QualifiedId,
    /// None once media is established; the duration is shown instead.
    pub status: Option<CallStatus>,
    pub is_declined: bool,
    pub is_visible: bool,

    pub show_accept: bool,
    /// Declined call that is still going on elsewhere.
    pub show_join: bool,
    /// Reject for incoming, cancel for outgoing.
    pub show_decline: bool,
    pub show_leave: bool,

    pub started_at: Option<DateTime<Utc>>,
    pub show_duration: bool,
    pub show_cbr: bool,

    pub is_muted: bool,
    pub mute_disabled: bool,
    pub show_remote_mute_banner: bool,

    pub show_video_button: bool,
    pub video_disabled: bool,
    pub self_shares_camera: bool,
    pub show_screenshare: bool,
    pub screenshare_disabled: bool,
    pub self_shares_screen: bool,

    pub show_participants_button: bool,
    pub participants_disabled: bool,
    pub show_detach_toggle: bool,
    pub can_maximize: bool,

    pub show_video_grid: bool,
    pub grid: Vec<ParticipantId>,
    pub show_no_camera_preview: bool,
}

impl CallCellView {
    pub fn derive(
        call: &Call,
        registry: &CallRegistry,
        config: &CallingConfig,
        ctx: &ViewContext,
    ) -> Self {
        let view_mode = registry.view_mode();
        let is_detached = view_mode == CallingViewMode::DetachedWindow;
        let is_full_screen = view_mode == CallingViewMode::FullScreenGrid;

        let is_outgoing = call.state == CallState::Outgoing;
        let is_incoming = call.state == CallState::Incoming;
        let is_connecting = call.state.is_connecting();
        let is_ongoing = call.state.is_ongoing();
        let is_declined = call.is_declined();
        let is_video_call = call.is_video_call();

        let self_participant = call.self_participant();
        let self_shares_camera = self_participant.is_some_and(|p| p.shares_camera);
        let self_shares_screen = self_participant.is_some_and(|p| p.shares_screen);
        let self_has_active_video = self_participant.is_some_and(|p| p.has_active_video);

        let status = match call.state {
            CallState::Outgoing => Some(CallStatus::Outgoing),
            CallState::Incoming => Some(CallStatus::Incoming),
            CallState::Answered => Some(CallStatus::Connecting),
            CallState::MediaEstab => None,
        };

        let grid: Vec<ParticipantId> = match registry.active_call_view_tab() {
            CallViewTab::All => call
                .current_page_participants()
                .into_iter()
                .map(|p| p.id.clone())
                .collect(),
            CallViewTab::Speakers => call
                .active_speakers(config.max_active_speakers)
                .into_iter()
                .map(|p| p.id.clone())
                .collect(),
        };

        let outgoing_video = is_outgoing && self_shares_camera;
        let video_unsupported = !self_shares_camera && !call.supports_video_call();
        let show_duration = is_ongoing && call.started_at.is_some();

        Self {
            conversation_id: call.conversation_id.clone(),
            status,
            is_declined,
            is_visible: !(is_declined && ctx.is_temporary_user),

            show_accept: is_incoming && !is_declined,
            show_join: is_incoming && is_declined,
            show_decline: (is_incoming || is_outgoing) && !is_declined,
            show_leave: is_connecting || is_ongoing,

            started_at: call.started_at,
            show_duration,
            show_cbr: show_duration && call.is_cbr_enabled,

            is_muted: call.mute_state.is_muted(),
            mute_disabled: is_connecting,
            show_remote_mute_banner: call.mute_state == MuteState::RemoteMuted && ctx.is_full_ui,

            show_video_button: config.video_calling_enabled && (is_video_call || is_ongoing),
            video_disabled: outgoing_video || video_unsupported,
            self_shares_camera,
            show_screenshare: is_ongoing,
            screenshare_disabled: !config.screen_sharing_supported || is_detached,
            self_shares_screen,

            show_participants_button: is_ongoing && call.is_group && ctx.is_full_ui,
            participants_disabled: is_detached,
            show_detach_toggle: is_ongoing && config.detached_window_supported,
            can_maximize: is_ongoing && !is_detached,

            show_video_grid: (is_ongoing || self_has_active_video)
                && !is_full_screen
                && !grid.is_empty()
                && ctx.is_full_ui,
            grid,
            show_no_camera_preview: !ctx.has_access_to_camera
                && is_video_call
                && !is_ongoing
                && ctx.is_full_ui,
        }
    }
}

impl CallRegistry {
    /// View models for every session the user should see, in arrival order.
    pub fn visible_cells(&self, config: &CallingConfig, ctx: &ViewContext) -> Vec<CallCellView> {
        self.calls()
            .iter()
            .map(|call| CallCellView::derive(call, self, config, ctx))
            .filter(|cell| cell.is_visible)
            .collect()
    }
}
