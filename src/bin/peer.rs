//! Horde Peer
//!
//! Headless peer: loads its profile, connects to the hub and wanders the
//! arena at the frame rate, fighting whatever the hub assigns to it.
//!
//! ```text
//! horde-peer [--url ws://127.0.0.1:8765] [--name NAME] [--profile PATH] [--seed N]
//! ```

use anyhow::Context;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use horde::core::clock::now_secs;
use horde::core::vec2::Vec2;
use horde::network::protocol::Hello;
use horde::network::{PeerClient, PeerError};
use horde::peer::{EntitySprite, PeerProfile, PeerView, RenderSurface, WanderInput};
use horde::world::effect::EffectKind;
use horde::world::entity::EntityKind;
use horde::{Bounds, FRAME_RATE, VERSION};

/// Seconds between status lines.
const STATUS_EVERY: f64 = 5.0;

struct PeerArgs {
    url: String,
    name: Option<String>,
    profile: PathBuf,
    seed: u64,
}

fn parse_args() -> PeerArgs {
    let mut args = PeerArgs {
        url: "ws://127.0.0.1:8765".to_string(),
        name: None,
        profile: PathBuf::from("horde_profile.json"),
        seed: rand::random(),
    };
    let argv: Vec<String> = std::env::args().collect();
    let mut i = 1;
    while i < argv.len() {
        match argv[i].as_str() {
            "--url" if i + 1 < argv.len() => {
                args.url = argv[i + 1].clone();
                i += 2;
            }
            "--name" if i + 1 < argv.len() => {
                args.name = Some(argv[i + 1].clone());
                i += 2;
            }
            "--profile" if i + 1 < argv.len() => {
                args.profile = PathBuf::from(&argv[i + 1]);
                i += 2;
            }
            "--seed" if i + 1 < argv.len() => {
                args.seed = argv[i + 1].parse().unwrap_or(args.seed);
                i += 2;
            }
            _ => i += 1,
        }
    }
    args
}

/// Tallies draw calls in place of a real renderer.
#[derive(Default)]
struct TallySurface {
    avatars: usize,
    hostiles: usize,
    effects: usize,
}

impl RenderSurface for TallySurface {
    fn draw_entity(&mut self, sprite: &EntitySprite<'_>) {
        match sprite.kind {
            EntityKind::Avatar => self.avatars += 1,
            _ => self.hostiles += 1,
        }
    }

    fn draw_effect(&mut self, _position: Vec2, _kind: EffectKind) {
        self.effects += 1;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = parse_args();
    let profile = PeerProfile::load_or_create(&args.profile, args.name.clone())
        .with_context(|| format!("load profile {}", args.profile.display()))?;
    info!("Horde Peer v{} as {} ({:?})", VERSION, profile.identifier, profile.display_name);

    let hello = Hello::new(profile.identifier.clone(), profile.display_name.clone(), now_secs());
    let mut client = PeerClient::connect(&args.url, &hello)
        .await
        .with_context(|| format!("connect to {}", args.url))?;

    let mut view = PeerView::new(
        profile.identifier.clone(),
        profile.display_name.clone(),
        Bounds::default().center(),
    );
    let mut input = WanderInput::new(args.seed, FRAME_RATE);

    let frame = Duration::from_secs_f64(1.0 / f64::from(FRAME_RATE));
    let mut ticker = interval(frame);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let dt = frame.as_secs_f32();
    let mut last_status = now_secs();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now = now_secs();
                client.drain_into(&mut view, now);
                view.step(dt, now, &mut input);

                match client.send(&view.outgoing(now)) {
                    Ok(()) => {}
                    Err(PeerError::QueueFull) => warn!("Dropped a frame update, hub is slow"),
                    Err(e) => {
                        warn!("Lost the hub: {}", e);
                        break;
                    }
                }
                if !client.is_connected() {
                    warn!("Hub connection closed");
                    break;
                }

                if now - last_status >= STATUS_EVERY {
                    last_status = now;
                    let mut tally = TallySurface::default();
                    view.render(&mut tally);
                    info!(
                        "score {} hp {} | {} avatars, {} hostiles, {} effects on screen | driving {}",
                        view.avatar().score,
                        view.avatar().hp,
                        tally.avatars,
                        tally.hostiles,
                        tally.effects,
                        view.drive_set().len() - 1,
                    );
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C received, leaving");
                break;
            }
        }
    }

    client.close().await;
    profile.save(&args.profile).context("save profile")?;
    Ok(())
}
