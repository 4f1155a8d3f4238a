use speech_timeline::services::notify::{NotifyError, Notifier};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;

#[tokio::test]
async fn test_send_delivers_text() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let peer = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut received = String::new();
        socket.read_to_string(&mut received).await.unwrap();
        received
    });

    let notifier = Notifier::new(addr, Duration::from_secs(2));
    notifier.send("Please read the card aloud").await.unwrap();
    assert_eq!(peer.await.unwrap(), "Please read the card aloud");
}

#[tokio::test]
async fn test_send_without_peer_is_refused() {
    // Bind then drop to get a port nobody listens on.
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().to_string()
    };

    let err = Notifier::new(addr.clone(), Duration::from_secs(2))
        .send("hello")
        .await
        .unwrap_err();
    assert!(matches!(err, NotifyError::ConnectionRefused(ref a) if *a == addr), "got {err:?}");
}
