//! Two real viewers driving their players through the coordinator.

mod common;

use std::sync::Arc;
use std::time::Duration;

use watchparty_core::client::{ClientConfig, WatchSession};
use watchparty_core::network::NetworkConfig;
use watchparty_core::player::MemoryPlayer;

use common::TestServer;

async fn viewer(server: &TestServer, player: Arc<MemoryPlayer>) -> WatchSession {
    let config = ClientConfig {
        network: NetworkConfig::default().with_server_url(server.ws_url()),
        join_timeout: Duration::from_secs(5),
    };
    WatchSession::connect(config, player)
        .await
        .expect("viewer failed to connect")
}

/// Poll until `check` holds or a few seconds pass.
async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

#[tokio::test]
async fn play_on_one_viewer_starts_the_other() {
    let server = TestServer::start().await;
    server
        .state()
        .coordinator
        .create_session("s1", "https://example.com/v.mp4")
        .expect("create failed");

    let player_a = Arc::new(MemoryPlayer::with_duration(600.0));
    let player_b = Arc::new(MemoryPlayer::with_duration(600.0));
    let a = viewer(&server, player_a.clone()).await;
    let b = viewer(&server, player_b.clone()).await;

    a.join("s1").expect("A join");
    assert!(eventually(|| a.is_in_session()).await, "A never joined");
    b.join("s1").expect("B join");
    assert!(eventually(|| b.is_in_session()).await, "B never joined");
    assert!(
        eventually(|| a.room_state().map(|r| r.participants.len()) == Some(2)).await,
        "A never saw B"
    );

    assert!(!player_b.is_playing());
    a.toggle_play_pause().expect("toggle");

    assert!(eventually(|| player_b.is_playing()).await, "B never started playing");
    assert!(player_a.is_playing());

    a.shutdown();
    b.shutdown();
    server.shutdown().await;
}
