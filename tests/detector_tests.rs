mod common;

use common::{t, wait_for, MockPlayer, ScriptedSource, Step};
use speech_timeline::audio::monitor::{mean_abs_amplitude, MicGate};
use speech_timeline::audio::playback::PlaybackError;
use speech_timeline::audio::DeviceError;
use speech_timeline::detectors::{
    DetectorError, Framing, GazeDetector, MicConfig, MicDetector, PlaybackDetector, PlaybackStatus, StopStatus,
};
use speech_timeline::{EventKind, EventStore};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_gate_threshold_and_amplitude() {
    assert_eq!(mean_abs_amplitude(&[]), None);
    assert_eq!(mean_abs_amplitude(&[100, -300]), Some(200.0));
    assert_eq!(mean_abs_amplitude(&[i16::MIN]), Some(32768.0), "i16::MIN must not overflow");

    let mut gate = MicGate::new(500.0, 1.0);
    assert_eq!(gate.process(&[500; 8], t(0.0)), None, "Level must exceed the threshold");
    assert_eq!(gate.process(&[-501; 8], t(0.0)), Some(501.0), "First loud frame fires at once");
    assert_eq!(gate.process(&[900; 8], t(0.5)), None, "Inside the debounce interval");
    assert_eq!(gate.process(&[900; 8], t(1.0)), Some(900.0));

    gate.reset();
    assert!(gate.process(&[900; 8], t(1.1)).is_some(), "Reset clears the cooldown");
}

#[tokio::test]
async fn test_sustained_input_fires_once_per_debounce() {
    // 10 s of continuous loud 1024-sample frames at 44.1 kHz, 1 s debounce.
    let period = 1024.0 / 44_100.0;
    let mut gate = MicGate::new(500.0, 1.0);
    let loud = [2_000i16; 1024];

    let mut fired = 0;
    let mut i = 0;
    while i as f64 * period < 10.0 {
        if gate.process(&loud, t(i as f64 * period)).is_some() {
            fired += 1;
        }
        i += 1;
    }
    assert!((9..=11).contains(&fired), "Expected about 10 events, got {fired}");
}

#[tokio::test]
async fn test_mic_detector_appends_until_cancelled() {
    let store = Arc::new(EventStore::new());
    let config = MicConfig {
        debounce_secs: 0.0,
        frame_size: 64,
        read_timeout_ms: 10,
        ..MicConfig::default()
    };
    let (source, released) = ScriptedSource::new(vec![
        Step::Frame(1_000),
        Step::Frame(10),
        Step::Frame(1_000),
        Step::Frame(-2_000),
    ]);
    let token = CancellationToken::new();

    let handle = MicDetector::new(config, Arc::clone(&store))
        .spawn(move || Ok(source), token.clone())
        .await
        .unwrap();

    // 1. Three loud frames, one quiet
    assert!(wait_for(|| store.len() == 3).await, "Expected three mic events");
    let snap = store.snapshot();
    assert_eq!(snap.events(EventKind::MicActivity)[2].payload.as_deref(), Some("level=2000"));

    // 2. Cancellation stops the loop and releases the device
    token.cancel();
    handle.join().await;
    assert!(released.load(Ordering::SeqCst), "Device must be released on stop");
}

#[tokio::test]
async fn test_mic_detector_stops_on_read_error() {
    let store = Arc::new(EventStore::new());
    let (source, released) = ScriptedSource::new(vec![Step::Frame(1_000), Step::Fail, Step::Frame(1_000)]);
    let token = CancellationToken::new();

    let handle = MicDetector::new(MicConfig::default(), Arc::clone(&store))
        .spawn(move || Ok(source), token.clone())
        .await
        .unwrap();

    assert!(wait_for(|| handle.is_finished()).await, "Read error must end the detector");
    assert!(released.load(Ordering::SeqCst));
    assert_eq!(store.len(), 1, "Frames after the error are never read");
    assert!(!token.is_cancelled(), "A failed modality does not stop the session");
    handle.join().await;
}

#[tokio::test]
async fn test_mic_detector_reports_open_failure() {
    let store = Arc::new(EventStore::new());
    let result = MicDetector::new(MicConfig::default(), store)
        .spawn(
            || Err::<ScriptedSource, _>(DeviceError::Unavailable("no input device".into())),
            CancellationToken::new(),
        )
        .await;
    assert!(matches!(result, Err(DetectorError::Device(DeviceError::Unavailable(_)))));
}

#[tokio::test(start_paused = true)]
async fn test_playback_start_busy_and_ticks() {
    let store = Arc::new(EventStore::new());
    let player = Arc::new(MockPlayer::default());
    let mut detector = PlaybackDetector::new(Arc::clone(&player), Arc::clone(&store), CancellationToken::new());

    // 1. Start, then a second start while playing
    let started = detector.start(Path::new("cue.wav")).await.unwrap();
    assert!(matches!(started, PlaybackStatus::Started { .. }));
    assert_eq!(detector.start(Path::new("other.wav")).await.unwrap(), PlaybackStatus::Busy);
    assert_eq!(player.loads.lock().unwrap().len(), 1, "Busy must not load anything");

    // 2. One tick per elapsed second
    tokio::time::sleep(Duration::from_millis(3_500)).await;
    let snap = store.snapshot();
    assert_eq!(snap.events(EventKind::AudioPlaybackStart).len(), 1);
    let ticks: Vec<_> = snap
        .events(EventKind::AudioPlaybackTick)
        .iter()
        .map(|e| e.payload.clone().unwrap())
        .collect();
    assert_eq!(ticks, vec!["1", "2", "3"]);

    // 3. Stop ends the ticks
    assert_eq!(detector.stop().await, StopStatus::Stopped);
    let at_stop = store.snapshot().events(EventKind::AudioPlaybackTick).len();
    assert_eq!(detector.stop().await, StopStatus::NotPlaying);
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(
        store.snapshot().events(EventKind::AudioPlaybackTick).len(),
        at_stop,
        "No ticks after stop"
    );
}

#[tokio::test(start_paused = true)]
async fn test_playback_ticks_end_with_clip() {
    let store = Arc::new(EventStore::new());
    let player = Arc::new(MockPlayer::default());
    let mut detector = PlaybackDetector::new(Arc::clone(&player), Arc::clone(&store), CancellationToken::new());

    detector.start(Path::new("cue.wav")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1_500)).await;
    player.finish();
    tokio::time::sleep(Duration::from_secs(3)).await;

    assert_eq!(store.snapshot().events(EventKind::AudioPlaybackTick).len(), 1);
    assert_eq!(detector.stop().await, StopStatus::NotPlaying);

    // A new start is accepted once the clip is over.
    assert!(matches!(
        detector.start(Path::new("cue.wav")).await.unwrap(),
        PlaybackStatus::Started { .. }
    ));
}

#[tokio::test]
async fn test_playback_failures_record_nothing() {
    let store = Arc::new(EventStore::new());

    // 1. Unloadable file
    let mut detector = PlaybackDetector::new(Arc::new(MockPlayer::failing()), Arc::clone(&store), CancellationToken::new());
    assert!(matches!(detector.start(Path::new("bad.wav")).await, Err(PlaybackError::Load { .. })));
    assert!(store.is_empty());

    // 2. Closed store: the player is stopped again
    let player = Arc::new(MockPlayer::default());
    let mut detector = PlaybackDetector::new(Arc::clone(&player), Arc::clone(&store), CancellationToken::new());
    store.close();
    assert!(matches!(detector.start(Path::new("cue.wav")).await, Err(PlaybackError::Rejected(_))));
    assert!(!detector.is_playing());
    assert_eq!(player.stops.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_gaze_chunk_and_line_framing() {
    let token = CancellationToken::new();

    let store = Arc::new(EventStore::new());
    let chunks = GazeDetector::new(Arc::clone(&store), Framing::Chunk, 4);
    assert_eq!(chunks.handle_connection(&b"abcdefgh"[..], &token).await, 2);
    assert_eq!(
        store.snapshot().events(EventKind::GazeNotification)[1].payload.as_deref(),
        Some("efgh")
    );

    let store = Arc::new(EventStore::new());
    let lines = GazeDetector::new(Arc::clone(&store), Framing::Lines, 1024);
    assert_eq!(lines.handle_connection(&b"first\n  \nsecond"[..], &token).await, 2);
    let payloads: Vec<_> = store
        .snapshot()
        .events(EventKind::GazeNotification)
        .iter()
        .map(|e| e.payload.clone().unwrap())
        .collect();
    assert_eq!(payloads, vec!["first", "second"]);
}

#[tokio::test]
async fn test_gaze_connection_ends_on_cancel_or_closed_store() {
    // Cancelled token with an idle peer: returns without reading.
    let store = Arc::new(EventStore::new());
    let detector = GazeDetector::new(Arc::clone(&store), Framing::Chunk, 1024);
    let token = CancellationToken::new();
    token.cancel();
    let (_peer, reader) = tokio::io::duplex(64);
    assert_eq!(detector.handle_connection(reader, &token).await, 0);

    // Closed store: messages are read but rejected.
    store.close();
    let open = CancellationToken::new();
    assert_eq!(detector.handle_connection(&b"late"[..], &open).await, 0);
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_gaze_listener_survives_reconnect() {
    let store = Arc::new(EventStore::new());
    let listener = GazeDetector::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let token = CancellationToken::new();
    let handle = GazeDetector::new(Arc::clone(&store), Framing::Lines, 1024).spawn(listener, token.clone());

    // 1. First peer connection, then disconnect
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(b"card one\ncard two\n").await.unwrap();
    drop(stream);
    assert!(wait_for(|| store.len() == 2).await, "First connection not recorded");

    // 2. The peer reconnects
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(b"card three\n").await.unwrap();
    stream.shutdown().await.unwrap();
    assert!(wait_for(|| store.len() == 3).await, "Listener must accept a new connection");

    token.cancel();
    handle.join().await;
    let payloads: Vec<_> = store
        .snapshot()
        .events(EventKind::GazeNotification)
        .iter()
        .map(|e| e.payload.clone().unwrap())
        .collect();
    assert_eq!(payloads, vec!["card one", "card two", "card three"]);
}

#[tokio::test]
async fn test_bind_failure_is_reported() {
    let taken = GazeDetector::bind("127.0.0.1:0").await.unwrap();
    let addr = taken.local_addr().unwrap().to_string();
    let err = GazeDetector::bind(&addr).await.unwrap_err();
    assert!(matches!(err, DetectorError::Bind { .. }));
}

#[tokio::test]
async fn test_slow_device_open_does_not_stall_runtime() {
    let store = Arc::new(EventStore::new());
    let player = Arc::new(MockPlayer::slow(Duration::from_millis(300)));
    let mut detector = PlaybackDetector::new(Arc::clone(&player), Arc::clone(&store), CancellationToken::new());

    // 1. Heartbeat task on the same (single-threaded) runtime
    let beats = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&beats);
    let heartbeat = tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_millis(10)).await;
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });

    // 2. Start waits on the device without parking the runtime
    let started = detector.start(Path::new("cue.wav")).await.unwrap();
    assert!(matches!(started, PlaybackStatus::Started { .. }));
    assert!(
        beats.load(Ordering::SeqCst) >= 5,
        "Runtime was starved while the device opened"
    );

    heartbeat.abort();
    detector.shutdown().await;
}

#[tokio::test]
async fn test_gaze_invalid_utf8_spoils_one_message_only() {
    let token = CancellationToken::new();

    // Lines: the bad line is decoded lossily and the connection keeps going.
    let store = Arc::new(EventStore::new());
    let lines = GazeDetector::new(Arc::clone(&store), Framing::Lines, 1024);
    assert_eq!(lines.handle_connection(&b"first\r\n\xff\xfeoops\nthird\n"[..], &token).await, 3);
    let payloads: Vec<_> = store
        .snapshot()
        .events(EventKind::GazeNotification)
        .iter()
        .map(|e| e.payload.clone().unwrap())
        .collect();
    assert_eq!(payloads, vec!["first", "\u{FFFD}\u{FFFD}oops", "third"]);

    // Chunk: a character split across reads becomes U+FFFD.
    let store = Arc::new(EventStore::new());
    let chunks = GazeDetector::new(Arc::clone(&store), Framing::Chunk, 4);
    assert_eq!(chunks.handle_connection(&b"caf\xc3\xa9"[..], &token).await, 2);
    assert_eq!(
        store.snapshot().events(EventKind::GazeNotification)[0].payload.as_deref(),
        Some("caf\u{FFFD}")
    );
}
