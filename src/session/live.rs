use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::audio::playback::PlaybackControl;
use crate::audio::{DeviceError, FrameSource};
use crate::detectors::{
    DetectorError, DetectorHandle, GazeDetector, MicDetector, PlaybackDetector, PlaybackStatus,
    StopStatus,
};
use crate::kernel::latency::{average_message, LatencySeries};
use crate::kernel::store::EventStore;
use crate::kernel::time::format_clock;
use crate::kernel::timeline::TimelineView;
use crate::services::notify::Notifier;
use crate::session::command::Command;
use crate::session::config::SessionConfig;
use crate::session::persist::{self, PersistError};
use crate::session::reactor::{SessionReactor, TickReport};

/// One recording interval: owns the store, every detector and the consumer
/// loop. Created per session, consumed by `finish`.
pub struct LiveSession<P: PlaybackControl> {
    id: Uuid,
    config: SessionConfig,
    output: PathBuf,
    token: CancellationToken,
    detectors: Vec<DetectorHandle>,
    playback: PlaybackDetector<P>,
    notifier: Notifier,
    reactor: SessionReactor,
}

impl<P: PlaybackControl> LiveSession<P> {
    /// `folder` receives the session file on `finish`.
    pub fn new(config: SessionConfig, folder: &Path, player: Arc<P>) -> Self {
        let store = Arc::new(EventStore::new());
        let token = CancellationToken::new();
        let output = folder.join(&config.session.file_name);
        let notifier = Notifier::new(
            config.notify.peer_addr.clone(),
            Duration::from_millis(config.notify.timeout_ms),
        );
        let reactor = SessionReactor::new(
            Arc::clone(&store),
            config.correlation.gaze_pairing,
            TimelineView::new(config.timeline.cluster_gap_secs),
        );
        let playback = PlaybackDetector::new(player, Arc::clone(&store), token.clone());

        Self {
            id: Uuid::new_v4(),
            config,
            output,
            token,
            detectors: Vec::new(),
            playback,
            notifier,
            reactor,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn output_path(&self) -> &Path {
        &self.output
    }

    pub fn store(&self) -> &Arc<EventStore> {
        self.reactor.store()
    }

    pub fn reactor(&self) -> &SessionReactor {
        &self.reactor
    }

    /// Session-wide stop signal.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Starts the mic detector. A device failure is reported and the session
    /// carries on without that modality.
    pub async fn start_mic<F, S>(&mut self, open: F) -> Result<(), DeviceError>
    where
        F: FnOnce() -> Result<S, DeviceError> + Send + 'static,
        S: FrameSource + 'static,
    {
        let detector = MicDetector::new(self.config.mic.clone(), Arc::clone(self.store()));
        match detector.spawn(open, self.token.child_token()).await {
            Ok(handle) => {
                self.detectors.push(handle);
                Ok(())
            }
            Err(DetectorError::Device(e)) => {
                error!("Mic detector unavailable: {}", e);
                Err(e)
            }
            Err(e) => {
                error!("Mic detector unavailable: {}", e);
                Err(DeviceError::Unavailable(e.to_string()))
            }
        }
    }

    /// Binds the inbound listener and starts the gaze detector. Returns the
    /// bound address, or `None` when the listener could not be opened.
    pub async fn start_gaze(&mut self) -> Option<SocketAddr> {
        let listener = match GazeDetector::bind(&self.config.gaze.listen_addr).await {
            Ok(listener) => listener,
            Err(e) => {
                error!("Gaze detector unavailable: {}", e);
                return None;
            }
        };
        let addr = listener.local_addr().ok();
        let detector = GazeDetector::new(
            Arc::clone(self.store()),
            self.config.gaze.framing,
            self.config.gaze.chunk_size,
        );
        self.detectors
            .push(detector.spawn(listener, self.token.child_token()));
        addr
    }

    pub fn tick(&mut self) -> TickReport {
        self.reactor.tick_step()
    }

    /// Applies one console command. Returns the lines to show the operator.
    pub async fn handle(&mut self, command: Command) -> Vec<String> {
        match command {
            Command::Send(text) => match self.notifier.send(&text).await {
                Ok(()) => vec![format!("Sent to {}: {}", self.notifier.peer_addr(), text)],
                Err(e) => {
                    warn!("{}", e);
                    vec![format!("Could not reach the peer: {e}")]
                }
            },
            Command::Play(path) => match self.playback.start(&path).await {
                Ok(PlaybackStatus::Started { at, .. }) => {
                    vec![format!("[Audio Playback] {}", format_clock(at))]
                }
                Ok(PlaybackStatus::Busy) => {
                    vec!["Audio is already playing. Stop the current audio before playing a new one.".into()]
                }
                Err(e) => {
                    warn!("Playback failed: {}", e);
                    vec![format!("Playback failed: {e}")]
                }
            },
            Command::Stop => match self.playback.stop().await {
                StopStatus::Stopped => vec!["Audio stopped.".into()],
                StopStatus::NotPlaying => vec!["No audio is playing.".into()],
            },
            Command::Averages => {
                let latencies = self.reactor.latencies();
                vec![
                    average_message(LatencySeries::AudioToMic, latencies),
                    average_message(LatencySeries::GazeToMic, latencies),
                ]
            }
            Command::Reevaluate => {
                let report = self.reactor.reevaluate();
                vec![format!("Re-evaluation paired {} gaze event(s)", report.gaze.len())]
            }
            Command::Window(span) => self.reactor.tail(span).transcript(),
            Command::Scroll(offset) => self.reactor.scroll(offset).transcript(),
            Command::Show => self.reactor.project().transcript(),
            Command::Quit => Vec::new(),
        }
    }

    /// Consumer loop: one reactor step per cadence tick, commands as they
    /// arrive. Returns on `Quit`, a closed command channel, or cancellation.
    pub async fn run(&mut self, commands: mpsc::Receiver<Command>) {
        let span = info_span!("session", id = %self.id);
        self.run_loop(commands).instrument(span).await;
    }

    async fn run_loop(&mut self, mut commands: mpsc::Receiver<Command>) {
        info!(output = %self.output.display(), "Session active");

        let mut cadence = interval(self.config.session.cadence());
        cadence.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let token = self.token.clone();

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = cadence.tick() => {
                    let report = self.tick();
                    for event in &report.fresh {
                        println!("{}", event.line());
                    }
                }
                command = commands.recv() => match command {
                    Some(Command::Quit) | None => break,
                    Some(command) => {
                        for line in self.handle(command).await {
                            println!("{line}");
                        }
                    }
                },
            }
        }
    }

    /// Stops every detector, waits for them, seals the store and writes the
    /// session file. No append can race the snapshot taken for the save.
    pub async fn finish(mut self) -> Result<PathBuf, PersistError> {
        info!(id = %self.id, "Stopping session");
        self.token.cancel();
        self.playback.shutdown().await;
        for handle in self.detectors.drain(..) {
            let name = handle.name();
            handle.join().await;
            info!(detector = name, "Detector joined");
        }

        let store = Arc::clone(self.reactor.store());
        store.close();
        // Final pass so the last appends are correlated before saving.
        self.reactor.tick_step();
        persist::save(&store.snapshot(), self.reactor.latencies(), &self.output)?;
        Ok(self.output)
    }
}
