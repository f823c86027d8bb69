//! # Relay Server - Load-Test Client
//!
//! Spawns a number of simulated players against a relay server. Each player
//! opens its own WebSocket connection, wanders around the play area sending
//! position updates at a fixed rate, and counts the snapshots it receives.
//! Dropped connections are retried the same way the browser client does: up to
//! five attempts three seconds apart, with the counter reset whenever a
//! connection opens.

use clap::Parser;
use futures::{SinkExt, StreamExt};
use rand::Rng;
use relay_server::{PlayerId, PlayerUpdate, Snapshot, SPAWN_X, SPAWN_Y};
use std::time::Duration;
use tokio::time::{interval, sleep, sleep_until, Instant, MissedTickBehavior};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};
use url::Url;

const WORLD_WIDTH: f64 = 800.0;
const WORLD_HEIGHT: f64 = 600.0;
const MAX_SPEED: f64 = 120.0;

#[derive(Parser, Debug, Clone)]
#[command(name = "relay-simulate")]
#[command(about = "Simulate moving players against a relay server")]
struct Args {
    /// Server WebSocket URL
    #[arg(short, long, default_value = "ws://localhost:8080/ws")]
    url: String,

    /// Number of simultaneous players to simulate
    #[arg(short, long, default_value = "5")]
    players: u32,

    /// Movement update frequency in Hz
    #[arg(short, long, default_value = "10.0")]
    move_freq: f64,

    /// Simulation duration in seconds
    #[arg(short, long, default_value = "60")]
    duration: u64,

    /// Reconnect attempts after a dropped connection
    #[arg(long, default_value = "5")]
    max_reconnects: u32,

    /// Delay between reconnect attempts in milliseconds
    #[arg(long, default_value = "3000")]
    reconnect_delay_ms: u64,
}

/// Retry budget for one simulated player.
///
/// Every failed connect or dropped connection consumes one attempt; a
/// successful open refills the budget.
#[derive(Debug, Clone)]
struct Reconnector {
    max_attempts: u32,
    delay: Duration,
    attempts: u32,
}

impl Reconnector {
    fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            attempts: 0,
        }
    }

    fn on_open(&mut self) {
        self.attempts = 0;
    }

    /// Returns the wait before the next attempt, or `None` once the budget is
    /// spent.
    fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts < self.max_attempts {
            self.attempts += 1;
            Some(self.delay)
        } else {
            None
        }
    }
}

/// Client-side model of one wandering player.
#[derive(Debug, Clone)]
struct SimulatedPlayer {
    id: PlayerId,
    x: f64,
    y: f64,
    velocity: f64,
    angle: f64,
}

impl SimulatedPlayer {
    fn new(id: PlayerId) -> Self {
        Self {
            id,
            x: SPAWN_X,
            y: SPAWN_Y,
            velocity: 0.0,
            angle: 0.0,
        }
    }

    /// Advances the random walk by `dt` seconds, bouncing off the edges of the
    /// play area.
    fn step(&mut self, dt: f64, rng: &mut impl Rng) {
        self.angle += rng.gen_range(-0.5..0.5);
        self.velocity = (self.velocity + rng.gen_range(-20.0..20.0)).clamp(0.0, MAX_SPEED);

        let mut x = self.x + self.angle.cos() * self.velocity * dt;
        let mut y = self.y + self.angle.sin() * self.velocity * dt;
        if !(0.0..=WORLD_WIDTH).contains(&x) {
            x = x.clamp(0.0, WORLD_WIDTH);
            self.angle = std::f64::consts::PI - self.angle;
        }
        if !(0.0..=WORLD_HEIGHT).contains(&y) {
            y = y.clamp(0.0, WORLD_HEIGHT);
            self.angle = -self.angle;
        }
        self.x = x;
        self.y = y;
    }

    fn update(&self) -> PlayerUpdate {
        PlayerUpdate {
            id: Some(self.id.clone()),
            x: self.x,
            y: self.y,
            velocity: self.velocity,
            angle: self.angle,
        }
    }
}

/// What one simulated player observed.
#[derive(Debug, Default, Clone, PartialEq)]
struct PlayerSummary {
    connections: u32,
    updates_sent: u64,
    snapshots_received: u64,
    /// Snapshots that listed this player
    snapshots_with_self: u64,
    last_player_count: usize,
    gave_up: bool,
}

enum ConnectionEnd {
    Finished,
    Dropped,
}

fn player_url(base: &str, player_id: &PlayerId) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(base)?;
    url.query_pairs_mut().append_pair("playerId", player_id.as_str());
    Ok(url)
}

async fn simulate_player(
    player_id: PlayerId,
    url: Url,
    move_period: Duration,
    deadline: Instant,
    mut reconnector: Reconnector,
) -> PlayerSummary {
    let mut player = SimulatedPlayer::new(player_id.clone());
    let mut summary = PlayerSummary::default();

    while Instant::now() < deadline {
        match connect_async(url.as_str()).await {
            Ok((ws, _)) => {
                reconnector.on_open();
                summary.connections += 1;
                info!("🎮 Player {} connected", player_id);
                if let ConnectionEnd::Finished =
                    drive_connection(ws, &mut player, &mut summary, move_period, deadline).await
                {
                    break;
                }
                warn!("🔌 Player {} lost its connection", player_id);
            }
            Err(e) => warn!("❌ Player {} failed to connect: {}", player_id, e),
        }

        match reconnector.next_delay() {
            Some(delay) => sleep(delay).await,
            None => {
                error!("Player {} giving up after {} attempts", player_id, reconnector.max_attempts);
                summary.gave_up = true;
                break;
            }
        }
    }

    summary
}

async fn drive_connection<S>(
    ws: tokio_tungstenite::WebSocketStream<S>,
    player: &mut SimulatedPlayer,
    summary: &mut PlayerSummary,
    move_period: Duration,
    deadline: Instant,
) -> ConnectionEnd
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let (mut sender, mut receiver) = ws.split();
    let mut ticker = interval(move_period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let dt = move_period.as_secs_f64();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                player.step(dt, &mut rand::thread_rng());
                let payload = match serde_json::to_string(&player.update()) {
                    Ok(payload) => payload,
                    Err(e) => {
                        error!("Failed to encode update: {}", e);
                        continue;
                    }
                };
                if let Err(e) = sender.send(Message::text(payload)).await {
                    debug!("Player {} send failed: {}", player.id, e);
                    return ConnectionEnd::Dropped;
                }
                summary.updates_sent += 1;
            }
            frame = receiver.next() => match frame {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<Snapshot>(text.as_str()) {
                    Ok(snapshot) => {
                        summary.snapshots_received += 1;
                        summary.last_player_count = snapshot.players.len();
                        if snapshot.players.contains_key(player.id.as_str()) {
                            summary.snapshots_with_self += 1;
                        }
                    }
                    Err(e) => debug!("Player {} received unexpected payload: {}", player.id, e),
                },
                Some(Ok(Message::Close(frame))) => {
                    debug!("Player {} received CLOSE: {:?}", player.id, frame);
                    return ConnectionEnd::Dropped;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!("Player {} connection error: {}", player.id, e);
                    return ConnectionEnd::Dropped;
                }
                None => return ConnectionEnd::Dropped,
            },
            _ = sleep_until(deadline) => {
                let _ = sender.send(Message::Close(None)).await;
                return ConnectionEnd::Finished;
            }
        }
    }
}

/// Time between two movement updates at `move_freq` Hz.
fn movement_period(move_freq: f64) -> Result<Duration, String> {
    if !move_freq.is_finite() || move_freq <= 0.0 {
        return Err(format!("move frequency must be a positive number, got {move_freq}"));
    }
    let period = Duration::try_from_secs_f64(1.0 / move_freq)
        .map_err(|e| format!("move frequency {move_freq} Hz is too low: {e}"))?;
    if period.is_zero() {
        return Err(format!("move frequency {move_freq} Hz is too high"));
    }
    Ok(period)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args = Args::parse();
    let move_period = movement_period(args.move_freq)?;

    info!("🚀 Starting relay load test");
    info!("   • Players: {}", args.players);
    info!("   • Movement: {:.1} Hz", args.move_freq);
    info!("   • Duration: {} seconds", args.duration);
    info!("   • Server: {}", args.url);

    let deadline = Instant::now() + Duration::from_secs(args.duration);
    let reconnector = Reconnector::new(args.max_reconnects, Duration::from_millis(args.reconnect_delay_ms));

    let mut handles = Vec::new();
    for _ in 0..args.players {
        let player_id = PlayerId::generate();
        let url = player_url(&args.url, &player_id)?;
        let reconnector = reconnector.clone();
        let handle = tokio::spawn({
            let player_id = player_id.clone();
            async move { simulate_player(player_id, url, move_period, deadline, reconnector).await }
        });
        handles.push((player_id, handle));

        // Stagger connections to avoid overwhelming server
        sleep(Duration::from_millis(100)).await;
    }

    info!("🛸 All {} players deployed", args.players);

    let mut total_snapshots = 0;
    for (player_id, handle) in handles {
        match handle.await {
            Ok(summary) => {
                total_snapshots += summary.snapshots_received;
                info!(
                    "📊 Player {}: {} connection(s), sent {} updates, received {} snapshots ({} listing itself), last saw {} players{}",
                    player_id,
                    summary.connections,
                    summary.updates_sent,
                    summary.snapshots_received,
                    summary.snapshots_with_self,
                    summary.last_player_count,
                    if summary.gave_up { ", gave up reconnecting" } else { "" },
                );
            }
            Err(e) => error!("❌ Player {} simulation failed: {}", player_id, e),
        }
    }

    info!("✅ Load test complete: {} snapshots received in total", total_snapshots);
    Ok(())
}
