use std::time::Duration;

use anyhow::Result;
use tokio::select;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace};

use crate::engine::{EngineSnapshot, PlaybackInterval, SlideshowEngine};
use crate::error::ControlError;
use crate::events::SlideshowCommand;

const COMMAND_QUEUE: usize = 16;

/// Client side of a running slideshow: send controls, read the latest state.
#[derive(Debug, Clone)]
pub struct SlideshowHandle {
    commands: Sender<SlideshowCommand>,
    state: watch::Receiver<EngineSnapshot>,
}

impl SlideshowHandle {
    pub fn new(commands: Sender<SlideshowCommand>, state: watch::Receiver<EngineSnapshot>) -> Self {
        Self { commands, state }
    }

    pub async fn send(&self, command: SlideshowCommand) -> Result<(), ControlError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| ControlError::NotRunning)
    }

    /// Latest published state.
    pub fn snapshot(&self) -> EngineSnapshot {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<EngineSnapshot> {
        self.state.clone()
    }
}

/// Spawn [`run`] for `engine` and return a handle to it.
pub fn spawn(
    engine: SlideshowEngine,
    transition: Duration,
    cancel: CancellationToken,
) -> (SlideshowHandle, JoinHandle<Result<()>>) {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_QUEUE);
    let (state_tx, state_rx) = watch::channel(engine.snapshot(transition));
    let task = tokio::spawn(run(engine, transition, cmd_rx, state_tx, cancel));
    (SlideshowHandle::new(cmd_tx, state_rx), task)
}

fn arm(interval: PlaybackInterval) -> Interval {
    let period = interval.as_duration();
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

/// Own the engine and drive it from timer ticks, control commands and the
/// transition deadline.
///
/// Rules:
/// - A tick advances only while playing, with more than one image and no
///   transition in flight; skipped ticks are not queued.
/// - The ticker is re-armed, one full period out, whenever playback is toggled
///   or the interval changes.
/// - Every started transition settles `transition` later unless cancelled first.
/// - Cancellation drops both the ticker and any pending completion.
#[instrument(skip_all, fields(images = engine.len()))]
pub async fn run(
    mut engine: SlideshowEngine,
    transition: Duration,
    mut commands: Receiver<SlideshowCommand>,
    state: watch::Sender<EngineSnapshot>,
    cancel: CancellationToken,
) -> Result<()> {
    let mut ticker = arm(engine.interval());
    let mut settle_at: Option<Instant> = None;
    let mut commands_open = true;
    let timer_enabled = engine.len() > 1;
    state.send_replace(engine.snapshot(transition));
    info!(
        interval_ms = engine.interval().as_millis(),
        playing = engine.is_playing(),
        "slideshow started"
    );

    loop {
        select! {
            _ = cancel.cancelled() => {
                info!(pending_transition = settle_at.is_some(), "cancel received; stopping slideshow");
                break;
            }

            _ = ticker.tick(), if timer_enabled => {
                if engine.should_auto_advance() {
                    if let Some(next) = engine.advance() {
                        debug!(next, "auto-advance");
                        settle_at = Some(Instant::now() + transition);
                    }
                } else {
                    trace!(
                        playing = engine.is_playing(),
                        transitioning = engine.is_transitioning(),
                        "tick skipped"
                    );
                }
            }

            _ = sleep_until(settle_at.unwrap_or_else(Instant::now)), if settle_at.is_some() => {
                settle_at = None;
                if let Some(current) = engine.complete_transition() {
                    debug!(current, "transition complete");
                }
            }

            maybe_cmd = commands.recv(), if commands_open => {
                match maybe_cmd {
                    Some(SlideshowCommand::Next | SlideshowCommand::Previous) => {
                        match engine.advance() {
                            Some(next) => {
                                debug!(next, "manual advance");
                                settle_at = Some(Instant::now() + transition);
                            }
                            None => debug!("manual advance ignored"),
                        }
                    }
                    Some(SlideshowCommand::TogglePlayback) => {
                        let playing = engine.toggle_playback();
                        info!(playing, "playback toggled");
                        ticker = arm(engine.interval());
                    }
                    Some(SlideshowCommand::SetInterval(interval)) => {
                        if interval != engine.interval() {
                            engine.set_interval(interval);
                            info!(interval_ms = interval.as_millis(), "interval changed");
                            ticker = arm(interval);
                        }
                    }
                    None => {
                        // All handles dropped; keep auto-playing until cancelled.
                        debug!("command channel closed");
                        commands_open = false;
                    }
                }
            }
        }

        state.send_replace(engine.snapshot(transition));
    }

    Ok(())
}
