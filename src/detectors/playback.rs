use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::audio::playback::{PlaybackControl, PlaybackError};
use crate::audio::DeviceError;
use crate::kernel::event::{EventId, EventKind};
use crate::kernel::store::EventStore;
use crate::kernel::time::{self, Timestamp};

const TICK_PERIOD: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackStatus {
    Started { id: EventId, at: Timestamp },
    /// Already playing; nothing was restarted or queued.
    Busy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopStatus {
    Stopped,
    NotPlaying,
}

struct Ticker {
    token: CancellationToken,
    task: JoinHandle<()>,
}

/// Observes a playback collaborator: one `AudioPlaybackStart` per start,
/// then one `AudioPlaybackTick` per elapsed second while it keeps playing.
pub struct PlaybackDetector<P: PlaybackControl> {
    player: Arc<P>,
    store: Arc<EventStore>,
    session: CancellationToken,
    ticker: Option<Ticker>,
}

impl<P: PlaybackControl> PlaybackDetector<P> {
    /// `session` is the session-wide stop signal; tick tasks are its
    /// children.
    pub fn new(player: Arc<P>, store: Arc<EventStore>, session: CancellationToken) -> Self {
        Self {
            player,
            store,
            session,
            ticker: None,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.player.is_playing()
    }

    pub async fn start(&mut self, path: &Path) -> Result<PlaybackStatus, PlaybackError> {
        if self.player.is_playing() {
            warn!(path = %path.display(), "Audio is already playing; stop it before playing another file");
            return Ok(PlaybackStatus::Busy);
        }
        self.cancel_ticker();

        let clip = path.to_path_buf();
        self.on_player(move |player| {
            player.load(&clip)?;
            player.play()
        })
        .await?;

        let at = time::now();
        let id = match self.store.append(
            EventKind::AudioPlaybackStart,
            at,
            Some(path.display().to_string()),
        ) {
            Ok(id) => id,
            Err(e) => {
                // Session is closing; do not leave the device running.
                self.halt_player().await;
                warn!("Playback start rejected: {}", e);
                return Err(e.into());
            }
        };
        info!(path = %path.display(), "Audio playback started");

        let token = self.session.child_token();
        let task = tokio::spawn(tick_loop(
            Arc::clone(&self.player),
            Arc::clone(&self.store),
            token.clone(),
        ));
        self.ticker = Some(Ticker { token, task });

        Ok(PlaybackStatus::Started { id, at })
    }

    pub async fn stop(&mut self) -> StopStatus {
        if !self.player.is_playing() {
            self.cancel_ticker();
            return StopStatus::NotPlaying;
        }
        self.halt_player().await;
        self.cancel_ticker();
        info!("Audio stopped");
        StopStatus::Stopped
    }

    /// Stops playback and waits for the tick task to exit.
    pub async fn shutdown(&mut self) {
        self.halt_player().await;
        if let Some(ticker) = self.ticker.take() {
            ticker.token.cancel();
            let _ = ticker.task.await;
        }
    }

    /// Device open and teardown block (stream startup, worker join), so they
    /// run on the blocking pool instead of a runtime worker.
    async fn on_player<T, F>(&self, op: F) -> Result<T, PlaybackError>
    where
        F: FnOnce(&P) -> Result<T, PlaybackError> + Send + 'static,
        T: Send + 'static,
    {
        let player = Arc::clone(&self.player);
        tokio::task::spawn_blocking(move || op(player.as_ref()))
            .await
            .map_err(|e| DeviceError::Unavailable(format!("playback worker failed: {e}")))?
    }

    async fn halt_player(&self) {
        let stopped = self
            .on_player(|player| {
                player.stop();
                Ok(())
            })
            .await;
        if let Err(e) = stopped {
            warn!("Stopping playback failed: {}", e);
        }
    }

    fn cancel_ticker(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.token.cancel();
        }
    }
}

async fn tick_loop<P: PlaybackControl>(player: Arc<P>, store: Arc<EventStore>, token: CancellationToken) {
    let mut cadence = interval(TICK_PERIOD);
    cadence.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick completes immediately; that instant is the start itself.
    cadence.tick().await;

    let mut elapsed = 0u64;
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = cadence.tick() => {}
        }
        if !player.is_playing() {
            info!(elapsed, "Playback finished");
            break;
        }
        elapsed += 1;
        if let Err(e) = store.append(
            EventKind::AudioPlaybackTick,
            time::now(),
            Some(elapsed.to_string()),
        ) {
            warn!("Playback tick rejected: {}", e);
            break;
        }
    }
}
