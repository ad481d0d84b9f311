mod common;

use std::{sync::Arc, time::Duration};

use common::*;
use remote_ops::{
    RoError,
    common::{
        ManualClock,
        model::{
            CommandRecord, CommandState, CommandStatus, LockState, QueueEntry, ResponseStatus,
        },
    },
    persistence::{
        AppendOutcome, CommandStore, CreateOutcome, KvCache, MemoryPersistence, StatusChange,
        VehicleQueue,
    },
};

fn store() -> (MemoryPersistence, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(T0));
    (MemoryPersistence::with_clock(clock.clone()), clock)
}

fn record(id: &str, event_id: &str, request_id: &str) -> CommandRecord {
    CommandRecord::new(
        id.into(),
        command(event_id, "V1", request_id, CommandState::Doors(LockState::Locked)),
        T0,
    )
}

#[tokio::test]
async fn create_is_idempotent_per_event() {
    let (s, _) = store();
    assert_eq!(
        s.create(record("id-1", "e1", "R1")).await.unwrap(),
        CreateOutcome::Created("id-1".into())
    );
    assert_eq!(
        s.create(record("id-2", "e1", "R1")).await.unwrap(),
        CreateOutcome::Existing("id-1".into())
    );
    assert_eq!(s.record_count(), 1);
}

#[tokio::test]
async fn find_latest_prefers_newest_record() {
    let (s, _) = store();
    s.create(record("id-1", "e1", "R1")).await.unwrap();
    s.create(record("id-2", "e2", "R1")).await.unwrap();

    let latest = s.find_latest("R1", "V1").await.unwrap().unwrap();
    assert_eq!(latest.id, "id-2");
    assert!(s.find_latest("R1", "V2").await.unwrap().is_none());

    // 回执挂到最新的那条记录上
    let outcome = s
        .append_response(&response("r1", "V1", "R1", ResponseStatus::Success))
        .await
        .unwrap();
    assert!(matches!(outcome, AppendOutcome::Appended(r) if r.id == "id-2"));
}

#[tokio::test]
async fn status_only_leaves_pending_once() {
    let (s, _) = store();
    s.create(record("id-1", "e1", "R1")).await.unwrap();

    assert_eq!(
        CommandStore::set_status(&s, "id-1", CommandStatus::ProcessedSuccess)
            .await
            .unwrap(),
        StatusChange::Applied
    );
    assert_eq!(
        CommandStore::set_status(&s, "id-1", CommandStatus::ProcessedSuccess)
            .await
            .unwrap(),
        StatusChange::Unchanged
    );
    assert_eq!(
        CommandStore::set_status(&s, "id-1", CommandStatus::TtlExpired)
            .await
            .unwrap(),
        StatusChange::Rejected {
            current: CommandStatus::ProcessedSuccess
        }
    );

    let loaded = CommandStore::load(&s, "id-1").await.unwrap().unwrap();
    assert_eq!(loaded.status, CommandStatus::ProcessedSuccess);

    let err = CommandStore::set_status(&s, "missing", CommandStatus::ProcessedFailed)
        .await
        .unwrap_err();
    assert!(matches!(err, RoError::RecordNotFound(_)));
}

#[tokio::test]
async fn history_appends_are_deduplicated() {
    let (s, _) = store();
    s.create(record("id-1", "e1", "R1")).await.unwrap();

    let resp = response("r1", "V1", "R1", ResponseStatus::SuccessContinue);
    assert!(matches!(
        s.append_response(&resp).await.unwrap(),
        AppendOutcome::Appended(_)
    ));
    assert!(matches!(
        s.append_response(&resp).await.unwrap(),
        AppendOutcome::Duplicate(_)
    ));
    assert_eq!(
        s.append_response(&response("r2", "V1", "R404", ResponseStatus::Success))
            .await
            .unwrap(),
        AppendOutcome::NotFound
    );

    let loaded = CommandStore::load(&s, "id-1").await.unwrap().unwrap();
    assert_eq!(loaded.responses.len(), 1);
}

#[tokio::test]
async fn deactivate_matches_vehicle_and_user() {
    let (s, _) = store();
    s.create(record("id-1", "e1", "R1")).await.unwrap();
    let mut other = record("id-2", "e2", "R2");
    other.envelope.payload.user_id = "U2".into();
    s.create(other).await.unwrap();

    assert_eq!(s.deactivate("V1", "U1").await.unwrap(), 1);
    assert_eq!(s.deactivate("V1", "U1").await.unwrap(), 0);

    let kept = CommandStore::load(&s, "id-2").await.unwrap().unwrap();
    assert!(kept.active);
    // 停用不改变状态
    let gone = CommandStore::load(&s, "id-1").await.unwrap().unwrap();
    assert!(!gone.active);
    assert_eq!(gone.status, CommandStatus::Pending);
}

#[tokio::test]
async fn cache_entries_expire() {
    let (s, clock) = store();
    s.put("k", "v", Duration::from_secs(10)).await.unwrap();
    assert_eq!(s.get("k").await.unwrap().as_deref(), Some("v"));

    clock.advance(10.0);
    assert!(s.get("k").await.unwrap().is_none());

    s.put("k", "v2", Duration::from_secs(10)).await.unwrap();
    KvCache::delete(&s, "k").await.unwrap();
    assert!(s.get("k").await.unwrap().is_none());
}

#[tokio::test]
async fn queue_polls_only_matching_head() {
    let (s, _) = store();
    let r1 = command("e1", "V1", "R1", CommandState::Doors(LockState::Locked));
    let r2 = command("e2", "V1", "R2", CommandState::Doors(LockState::Unlocked));

    assert_eq!(s.offer("V1", QueueEntry::new("id-1".into(), r1, T0)).await.unwrap(), 1);
    assert_eq!(s.offer("V1", QueueEntry::new("id-2".into(), r2, T0)).await.unwrap(), 2);

    assert!(s.poll_if_head("V1", "R2").await.unwrap().is_none());
    assert!(!s.mark_head_forwarded("V1", "R2").await.unwrap());
    assert!(s.mark_head_forwarded("V1", "R1").await.unwrap());
    assert!(s.peek("V1").await.unwrap().unwrap().forwarded);

    let polled = s.poll_if_head("V1", "R1").await.unwrap().unwrap();
    assert_eq!(polled.record_id, "id-1");
    assert_eq!(s.peek("V1").await.unwrap().unwrap().request_id, "R2");
    assert!(!s.peek("V1").await.unwrap().unwrap().forwarded);

    s.poll_if_head("V1", "R2").await.unwrap();
    assert_eq!(s.len("V1").await.unwrap(), 0);
    assert!(s.entries("V1").await.unwrap().is_empty());
}
