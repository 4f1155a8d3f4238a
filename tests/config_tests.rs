use speech_timeline::detectors::Framing;
use speech_timeline::kernel::correlation::GazePairing;
use speech_timeline::session::{Command, CommandError, SessionConfig};
use std::path::PathBuf;
use std::time::Duration;

#[tokio::test]
async fn test_defaults() {
    let config = SessionConfig::default();
    assert_eq!(config.mic.threshold, 500.0);
    assert_eq!(config.mic.debounce_secs, 1.0);
    assert_eq!(config.mic.frame_size, 1024);
    assert_eq!(config.gaze.listen_addr, "127.0.0.1:5000");
    assert_eq!(config.gaze.framing, Framing::Chunk);
    assert_eq!(config.notify.peer_addr, "127.0.0.1:5001");
    assert_eq!(config.timeline.cluster_gap_secs, 3.0);
    assert_eq!(config.correlation.gaze_pairing, GazePairing::Once);
    assert_eq!(config.session.cadence(), Duration::from_millis(100));
    assert_eq!(config.session.file_name, "session_data.json");
}

#[tokio::test]
async fn test_partial_toml_keeps_other_defaults() {
    let config = SessionConfig::from_toml(
        r#"
        [mic]
        threshold = 800.0

        [gaze]
        framing = "lines"

        [correlation]
        gaze_pairing = "until_paired"
        "#,
    )
    .unwrap();

    assert_eq!(config.mic.threshold, 800.0);
    assert_eq!(config.mic.debounce_secs, 1.0, "Unset keys fall back to defaults");
    assert_eq!(config.gaze.framing, Framing::Lines);
    assert_eq!(config.gaze.chunk_size, 1024);
    assert_eq!(config.correlation.gaze_pairing, GazePairing::UntilPaired);
    assert_eq!(config.notify.peer_addr, "127.0.0.1:5001");
}

#[tokio::test]
async fn test_bad_config_is_an_error() {
    assert!(SessionConfig::from_toml("[mic]\nthreshold = \"loud\"").is_err());
    assert!(SessionConfig::from_toml("[gaze]\nframing = \"morse\"").is_err());

    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing.toml");
    assert!(SessionConfig::load_or_default(Some(missing.as_path())).is_err());
    assert!(SessionConfig::load_or_default(None).is_ok());

    let file = dir.path().join("session.toml");
    std::fs::write(&file, "[session]\ncadence_ms = 50\n").unwrap();
    let config = SessionConfig::load(&file).unwrap();
    assert_eq!(config.session.cadence(), Duration::from_millis(50));
}

#[tokio::test]
async fn test_command_parsing() {
    assert_eq!(Command::parse("send look at the cat"), Ok(Command::Send("look at the cat".into())));
    assert_eq!(Command::parse("PLAY clips/cue.wav"), Ok(Command::Play(PathBuf::from("clips/cue.wav"))));
    assert_eq!(Command::parse(" stop "), Ok(Command::Stop));
    assert_eq!(Command::parse("avg"), Ok(Command::Averages));
    assert_eq!(Command::parse("reeval"), Ok(Command::Reevaluate));
    assert_eq!(Command::parse("window 30"), Ok(Command::Window(30.0)));
    assert_eq!(Command::parse("scroll -5.5"), Ok(Command::Scroll(-5.5)));
    assert_eq!(Command::parse("show"), Ok(Command::Show));
    assert_eq!(Command::parse("exit"), Ok(Command::Quit));

    assert_eq!(Command::parse("send"), Err(CommandError::MissingArgument("send")));
    assert_eq!(
        Command::parse("window soon"),
        Err(CommandError::BadSeconds { arg: "soon".into() })
    );
    assert_eq!(Command::parse("scroll NaN"), Err(CommandError::BadSeconds { arg: "NaN".into() }));
    assert_eq!(Command::parse("dance"), Err(CommandError::Unknown("dance".into())));
}
