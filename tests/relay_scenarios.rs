//! End-to-end relay scenarios over a real SQLite-backed log.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::time::timeout;

use roomcast::auth::Identity;
use roomcast::cache::HotCache;
use roomcast::registry::{RoomRegistry, SessionId};
use roomcast::relay::{Relay, RetryPolicy};
use roomcast::store::{ChatDb, DurableLog, LogError, Message, MessageKind, SqliteLog};
use roomcast::ws::{ClientEvent, ServerEvent};

/// Durable log wrapper with a fault switch, for outage scenarios.
struct FlakyLog {
    inner: SqliteLog,
    failing: AtomicBool,
}

impl FlakyLog {
    fn check(&self) -> Result<(), LogError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(LogError::Unavailable("forced outage".to_string()))
        } else {
            Ok(())
        }
    }

    fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl DurableLog for FlakyLog {
    async fn append(&self, message: &Message) -> Result<(), LogError> {
        self.check()?;
        self.inner.append(message).await
    }

    async fn update_delivered(&self, id: &str) -> Result<(), LogError> {
        self.check()?;
        self.inner.update_delivered(id).await
    }

    async fn update_seen(&self, id: &str) -> Result<(), LogError> {
        self.check()?;
        self.inner.update_seen(id).await
    }

    async fn recent_by_room(&self, room: &str, limit: u32) -> Result<Vec<Message>, LogError> {
        self.check()?;
        self.inner.recent_by_room(room, limit).await
    }

    async fn mark_all_seen_except(&self, room: &str, user_id: &str) -> Result<(), LogError> {
        self.check()?;
        self.inner.mark_all_seen_except(room, user_id).await
    }

    async fn is_participant(&self, room: &str, user_id: &str) -> Result<bool, LogError> {
        self.check()?;
        self.inner.is_participant(room, user_id).await
    }
}

struct Rig {
    _temp: TempDir,
    sqlite: SqliteLog,
    flaky: Arc<FlakyLog>,
    relay: Relay,
}

async fn rig(participants: &[&str]) -> Rig {
    let temp = TempDir::new().unwrap();
    let db = ChatDb::open(&temp.path().join("relay.db")).await.unwrap();
    let sqlite = SqliteLog::new(db);
    for participant in participants {
        sqlite.add_participant("r1", participant).await.unwrap();
    }

    let flaky = Arc::new(FlakyLog {
        inner: sqlite.clone(),
        failing: AtomicBool::new(false),
    });
    let relay = Relay::new(
        flaky.clone(),
        Arc::new(HotCache::new(20)),
        Arc::new(RoomRegistry::new()),
        RetryPolicy::new(2, Duration::from_millis(1)),
        50,
    );

    Rig {
        _temp: temp,
        sqlite,
        flaky,
        relay,
    }
}

fn alice() -> Identity {
    Identity {
        id: "alice".to_string(),
        name: "Alice".to_string(),
    }
}

fn bob() -> Identity {
    Identity {
        id: "bob".to_string(),
        name: "Bob".to_string(),
    }
}

fn chat(id: &str, message: &str) -> ClientEvent {
    ClientEvent::ChatMessage {
        id: id.to_string(),
        message: message.to_string(),
    }
}

async fn next_event(rx: &mut mpsc::Receiver<ServerEvent>) -> ServerEvent {
    timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event channel closed")
}

fn drain(rx: &mut mpsc::Receiver<ServerEvent>) {
    while rx.try_recv().is_ok() {}
}

#[tokio::test]
async fn text_message_reaches_every_open_session() {
    let rig = rig(&["alice", "bob"]).await;
    let a = SessionId::new_v4();
    let b = SessionId::new_v4();
    let mut rx_a = rig.relay.attach("r1", &alice(), a).await;
    let mut rx_b = rig.relay.attach("r1", &bob(), b).await;
    drain(&mut rx_a);
    drain(&mut rx_b);

    rig.relay.dispatch("r1", &alice(), a, chat("m1", "hi")).await;

    for rx in [&mut rx_a, &mut rx_b] {
        match next_event(rx).await {
            ServerEvent::ChatMessage(view) => {
                assert_eq!(view.id, "m1");
                assert_eq!(view.sender_id, "alice");
                assert_eq!(view.message, "hi");
                assert!(view.is_delivered);
                assert!(!view.is_seen);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    // The broadcast happened after the durable append.
    let recent = rig.sqlite.recent_by_room("r1", 50).await.unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].id, "m1");
}

#[tokio::test]
async fn connecting_replays_history_then_sweeps_seen() {
    let rig = rig(&["alice", "bob"]).await;
    let a = SessionId::new_v4();
    let mut rx_a = rig.relay.attach("r1", &alice(), a).await;
    drain(&mut rx_a);

    rig.relay.dispatch("r1", &alice(), a, chat("m1", "hi")).await;
    next_event(&mut rx_a).await;

    // Bob connects after m1 exists.
    let b = SessionId::new_v4();
    let mut rx_b = rig.relay.attach("r1", &bob(), b).await;

    match next_event(&mut rx_b).await {
        ServerEvent::ChatHistory(views) => {
            assert_eq!(views.len(), 1);
            assert_eq!(views[0].id, "m1");
            assert!(!views[0].is_seen);
        }
        other => panic!("unexpected event: {other:?}"),
    }

    // Opening the room marks its contents read, and the room is told.
    for rx in [&mut rx_b, &mut rx_a] {
        match next_event(rx).await {
            ServerEvent::MessageSeen {
                message_id: None,
                seen_by: Some(seen_by),
            } => assert_eq!(seen_by, "bob"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    let m1 = rig.sqlite.get_message("m1").await.unwrap().unwrap();
    assert!(m1.is_seen);
}

#[tokio::test]
async fn bundle_without_artifacts_is_rejected() {
    let rig = rig(&["alice"]).await;
    let a = SessionId::new_v4();
    let mut rx_a = rig.relay.attach("r1", &alice(), a).await;
    drain(&mut rx_a);

    rig.relay
        .dispatch(
            "r1",
            &alice(),
            a,
            ClientEvent::BuildBundle {
                id: "m2".to_string(),
                message: String::new(),
                build_ids: Vec::new(),
            },
        )
        .await;

    // No persistence, no broadcast.
    assert!(rx_a.try_recv().is_err());
    assert!(rig.sqlite.recent_by_room("r1", 50).await.unwrap().is_empty());

    // With artifacts the same payload relays fine.
    rig.relay
        .dispatch(
            "r1",
            &alice(),
            a,
            ClientEvent::BuildBundle {
                id: "m2".to_string(),
                message: String::new(),
                build_ids: vec!["a1".to_string(), "a2".to_string()],
            },
        )
        .await;

    match next_event(&mut rx_a).await {
        ServerEvent::BuildBundle(view) => {
            assert_eq!(view.id, "m2");
            assert_eq!(view.kind, MessageKind::Bundle);
            assert_eq!(
                view.build_ids,
                Some(vec!["a1".to_string(), "a2".to_string()])
            );
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn log_outage_notifies_the_sender_only() {
    let rig = rig(&["alice", "bob"]).await;
    let a = SessionId::new_v4();
    let b = SessionId::new_v4();
    let mut rx_a = rig.relay.attach("r1", &alice(), a).await;
    let mut rx_b = rig.relay.attach("r1", &bob(), b).await;
    drain(&mut rx_a);
    drain(&mut rx_b);

    rig.flaky.set_failing(true);
    rig.relay.dispatch("r1", &alice(), a, chat("m9", "hi")).await;

    assert_eq!(
        next_event(&mut rx_a).await,
        ServerEvent::DeliveryFailed {
            message_id: "m9".to_string(),
        }
    );
    assert!(rx_b.try_recv().is_err());
    assert!(rig.sqlite.get_message("m9").await.unwrap().is_none());

    // After recovery the re-send persists first, then broadcasts.
    rig.flaky.set_failing(false);
    rig.relay.dispatch("r1", &alice(), a, chat("m9", "hi")).await;

    for rx in [&mut rx_a, &mut rx_b] {
        match next_event(rx).await {
            ServerEvent::ChatMessage(view) => assert_eq!(view.id, "m9"),
            other => panic!("unexpected event: {other:?}"),
        }
    }
    assert!(rig.sqlite.get_message("m9").await.unwrap().is_some());
}

#[tokio::test]
async fn delivered_and_seen_flags_never_revert() {
    let rig = rig(&["alice", "bob"]).await;
    let a = SessionId::new_v4();
    let mut rx_a = rig.relay.attach("r1", &alice(), a).await;
    drain(&mut rx_a);

    rig.relay.dispatch("r1", &alice(), a, chat("m1", "hi")).await;
    rig.relay
        .dispatch(
            "r1",
            &bob(),
            a,
            ClientEvent::MessageSeen {
                message_id: "m1".to_string(),
            },
        )
        .await;

    // Further updates and sweeps cannot observe a reversion.
    rig.relay
        .dispatch(
            "r1",
            &bob(),
            a,
            ClientEvent::MessageDelivered {
                message_id: "m1".to_string(),
            },
        )
        .await;
    rig.sqlite.mark_all_seen_except("r1", "alice").await.unwrap();

    let m1 = rig.sqlite.get_message("m1").await.unwrap().unwrap();
    assert!(m1.is_delivered);
    assert!(m1.is_seen);
}
