//! Activity tracking fed from spawned PTYs

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::Fixture;
use ptydeck::activity::{ActivityConfig, ActivityStore};
use ptydeck::pty::StartOptions;
use ptydeck::{ActivitySignal, PtyIdKind};

const WAIT: Duration = Duration::from_secs(2);

fn store(hold: Duration) -> Arc<ActivityStore> {
    Arc::new(ActivityStore::new(ActivityConfig {
        hold,
        soft_clear: Duration::from_secs(8),
    }))
}

#[tokio::test]
async fn test_output_drives_busy_indicator() {
    let fx = Fixture::new();
    let spawner = fx.spawner();
    let activity = store(Duration::ZERO);

    let mut busy = activity.subscribe_busy("t1");
    let mut actions = activity.subscribe_actions("t1");
    assert!(busy.attach_source(spawner.subscribe_events(), &[PtyIdKind::Main]));
    // Second attachment for the same kind is a no-op
    assert!(!actions.attach_source(spawner.subscribe_events(), &[PtyIdKind::Main]));

    let main = spawner
        .start(StartOptions {
            id: "claude-main-t1".into(),
            shell: Some("claude".into()),
            ..Default::default()
        })
        .unwrap();

    // Chat terminals of the same task are not attached
    fx.backend
        .emit_output("claude-chat-t1", 99, "✻ Chatting… (esc to interrupt)\r\n");
    fx.backend.emit_output(
        &main.id,
        main.generation,
        "\x1b[2K✻ Thinking… (esc to interrupt)\r\n",
    );

    let update = tokio::time::timeout(WAIT, busy.recv()).await.unwrap().unwrap();
    assert_eq!(update.key, "t1");
    assert!(update.busy);
    assert_eq!(update.signal, ActivitySignal::Busy);

    let action = tokio::time::timeout(WAIT, actions.recv()).await.unwrap().unwrap();
    assert_eq!(action.action.as_deref(), Some("Thinking…"));

    fx.backend
        .emit_output(&main.id, main.generation, "╭──╮\r\n│ > │\r\n  ? for shortcuts\r\n");
    let update = tokio::time::timeout(WAIT, busy.recv()).await.unwrap().unwrap();
    assert!(!update.busy);
    assert_eq!(update.signal, ActivitySignal::Idle);

    // Last listener gone: the stream is detached
    drop(busy);
    drop(actions);
    fx.backend.emit_output(
        &main.id,
        main.generation,
        "✻ Reticulating… (esc to interrupt)\r\n",
    );
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!activity.is_busy("t1"));
}

#[tokio::test]
async fn test_exit_clears_busy_despite_hold() {
    let fx = Fixture::new();
    let spawner = fx.spawner();
    let activity = store(Duration::from_secs(60));

    let mut busy = activity.subscribe_busy("t2");
    busy.attach_source(spawner.subscribe_events(), &[PtyIdKind::Main, PtyIdKind::Chat]);

    let pty = spawner
        .start(StartOptions {
            id: "codex-chat-t2".into(),
            ..Default::default()
        })
        .unwrap();

    fx.backend
        .emit_output(&pty.id, pty.generation, "• Working (3s • esc to interrupt)\r\n");
    let update = tokio::time::timeout(WAIT, busy.recv()).await.unwrap().unwrap();
    assert!(update.busy);

    fx.backend.emit_exit(&pty.id, pty.generation, Some(0));
    let update = tokio::time::timeout(WAIT, busy.recv()).await.unwrap().unwrap();
    assert!(!update.busy);
    assert_eq!(update.signal, ActivitySignal::Idle);
}
