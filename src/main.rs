use anyhow::Context;
use calling_rust::calls::{
    CallDirection, CallManager, CallReason, CallState, CallType, CallingEngine, ChannelEngine,
    EngineCommand, EngineEvent, Key, KeyEvent, MediaFlags, MuteState, ParticipantId, ViewContext,
};
use calling_rust::config::CallingConfig;
use calling_rust::types::events::ChannelEventHandler;
use calling_rust::types::jid::QualifiedId;
use chrono::{Local, Utc};
use clap::Parser;
use log::{info, warn};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

// Demo of the call orchestration core against a simulated engine.
//
// Usage:
//   cargo run                                   # built-in incoming group call
//   cargo run -- --config calling.json          # custom configuration
//   cargo run -- --script events.json           # replay engine events from a file

#[derive(Parser)]
#[command(name = "calling-demo")]
#[command(about = "Replays engine events against the call orchestration core")]
struct Cli {
    /// JSON file with calling configuration.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// JSON array of engine events to replay instead of the built-in scenario.
    #[arg(short, long)]
    script: Option<PathBuf>,
}

/// How long to wait for the simulated engine to go quiet.
const SETTLE_TIMEOUT: Duration = Duration::from_millis(50);

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "{} [{:<5}] [{}] - {}",
                Local::now().format("%H:%M:%S"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => CallingConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => CallingConfig::default(),
    };
    info!("Calling config: {:?}", config);

    let self_leg = ParticipantId::new(QualifiedId::new("alice", "wire.example"), "desktop");

    let (engine, command_rx) = ChannelEngine::new();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    tokio::spawn(simulated_engine(self_leg.clone(), command_rx, event_tx));

    let engine: Arc<dyn CallingEngine> = Arc::new(engine);
    let mut manager = CallManager::new(self_leg, config, engine);

    let (observer, mut changes) = ChannelEventHandler::new();
    manager.add_event_handler(observer);
    tokio::spawn(async move {
        while let Some(change) = changes.recv().await {
            info!("Registry change: {:?}", change);
        }
    });

    let script = match &cli.script {
        Some(path) => load_script(path)?,
        None => demo_script(),
    };
    info!("Replaying {} engine event(s)", script.len());
    for event in script {
        manager.handle_engine_event(event);
        settle(&mut manager, &mut event_rx).await;
    }

    if cli.script.is_none() {
        run_demo_actions(&mut manager, &mut event_rx).await?;
    }

    let registry = manager.registry();
    info!(
        "Done: {} call(s), {} active, joined: {:?}",
        registry.calls().len(),
        registry.active_calls().len(),
        registry.joined_call().map(|call| &call.conversation_id)
    );
    manager.teardown();
    Ok(())
}

fn load_script(path: &Path) -> Result<Vec<EngineEvent>, anyhow::Error> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("reading script {}", path.display()))?;
    let events = serde_json::from_str(&contents)
        .with_context(|| format!("parsing script {}", path.display()))?;
    Ok(events)
}

fn demo_conversation() -> QualifiedId {
    QualifiedId::new("team-standup", "wire.example")
}

fn demo_script() -> Vec<EngineEvent> {
    let conversation_id = demo_conversation();
    let bob = ParticipantId::new(QualifiedId::new("bob", "wire.example"), "phone");
    let carol = ParticipantId::new(QualifiedId::new("carol", "wire.example"), "laptop");

    vec![
        EngineEvent::SessionCreated {
            conversation_id: conversation_id.clone(),
            direction: CallDirection::Incoming,
            call_type: CallType::Video,
            is_group: true,
            is_conference: true,
        },
        EngineEvent::ParticipantJoined {
            conversation_id: conversation_id.clone(),
            participant: bob.clone(),
        },
        EngineEvent::ParticipantJoined {
            conversation_id: conversation_id.clone(),
            participant: carol.clone(),
        },
        EngineEvent::ParticipantMediaChanged {
            conversation_id: conversation_id.clone(),
            participant: carol,
            media: MediaFlags {
                shares_camera: true,
                shares_screen: false,
                has_active_video: true,
            },
        },
        EngineEvent::ActiveSpeakersChanged {
            conversation_id,
            speakers: vec![bob],
        },
    ]
}

async fn run_demo_actions(
    manager: &mut CallManager,
    events: &mut mpsc::UnboundedReceiver<EngineEvent>,
) -> Result<(), anyhow::Error> {
    let conversation_id = demo_conversation();

    info!("Pressing Ctrl+Enter");
    if !manager.handle_key_event(&KeyEvent::new(Key::Enter).with_ctrl()) {
        warn!("No incoming call picked up the shortcut");
    }
    settle(manager, events).await;

    manager.toggle_mute(&conversation_id, true);
    settle(manager, events).await;

    let target = manager
        .registry()
        .get(&conversation_id)
        .and_then(|call| call.remote_participants().next())
        .map(|participant| participant.id.clone());
    if let Some(target) = target {
        manager.mute_others(&conversation_id, &target);
        settle(manager, events).await;
    }

    let cells = manager
        .registry()
        .visible_cells(manager.config(), &ViewContext::default());
    info!("Call cells:\n{}", serde_json::to_string_pretty(&cells)?);

    manager.leave(&conversation_id);
    settle(manager, events).await;
    Ok(())
}

/// Apply engine echoes until the engine has nothing more to say.
async fn settle(manager: &mut CallManager, events: &mut mpsc::UnboundedReceiver<EngineEvent>) {
    while let Ok(Some(event)) = tokio::time::timeout(SETTLE_TIMEOUT, events.recv()).await {
        manager.handle_engine_event(event);
    }
}

/// Confirms every command the way a well-behaved engine would.
async fn simulated_engine(
    self_leg: ParticipantId,
    mut commands: mpsc::UnboundedReceiver<EngineCommand>,
    events: mpsc::UnboundedSender<EngineEvent>,
) {
    let mut media: HashMap<QualifiedId, MediaFlags> = HashMap::new();

    while let Some(command) = commands.recv().await {
        info!("Engine received {:?}", command);
        let replies = match command {
            EngineCommand::Answer {
                conversation_id, ..
            } => vec![
                EngineEvent::StateChanged {
                    conversation_id: conversation_id.clone(),
                    state: CallState::Answered,
                    reason: None,
                },
                EngineEvent::MediaEstablished {
                    conversation_id,
                    timestamp: Utc::now(),
                },
            ],
            EngineCommand::Reject { conversation_id } => vec![EngineEvent::CallClosed {
                conversation_id,
                reason: CallReason::Rejected,
            }],
            EngineCommand::Leave { conversation_id } => vec![EngineEvent::CallClosed {
                conversation_id,
                reason: CallReason::StillOngoing,
            }],
            EngineCommand::SetMute {
                conversation_id,
                muted,
            } => vec![EngineEvent::MuteChanged {
                conversation_id,
                leg: self_leg.clone(),
                mute_state: if muted {
                    MuteState::SelfMuted
                } else {
                    MuteState::NotMuted
                },
            }],
            EngineCommand::SetCamera {
                conversation_id,
                enabled,
            } => {
                let flags = media.entry(conversation_id.clone()).or_default();
                flags.shares_camera = enabled;
                flags.has_active_video = flags.shares_camera || flags.shares_screen;
                vec![EngineEvent::ParticipantMediaChanged {
                    conversation_id,
                    participant: self_leg.clone(),
                    media: *flags,
                }]
            }
            EngineCommand::SetScreenshare {
                conversation_id,
                enabled,
            } => {
                let flags = media.entry(conversation_id.clone()).or_default();
                flags.shares_screen = enabled;
                flags.has_active_video = flags.shares_camera || flags.shares_screen;
                vec![EngineEvent::ParticipantMediaChanged {
                    conversation_id,
                    participant: self_leg.clone(),
                    media: *flags,
                }]
            }
            EngineCommand::ModeratorMute {
                conversation_id,
                legs,
            } => legs
                .into_iter()
                .map(|leg| EngineEvent::MuteChanged {
                    conversation_id: conversation_id.clone(),
                    leg,
                    mute_state: MuteState::RemoteMuted,
                })
                .collect(),
        };

        for reply in replies {
            if events.send(reply).is_err() {
                return;
            }
        }
    }
}
