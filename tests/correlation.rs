mod common;

use common::*;
use remote_ops::{
    RoConfig, RouteOutcome,
    common::model::{CommandState, CommandStatus, CustomExtension, LockState, ResponseStatus},
    engine::CorrelationSource,
    persistence::{CommandStore, KvCache},
    router::{InboundEvent, handlers::ResponseOutcome},
};

fn doors(event_id: &str, request_id: &str) -> InboundEvent {
    InboundEvent::NewCommand(command(event_id, "V1", request_id, CommandState::Doors(LockState::Locked)))
}

fn reply(event_id: &str, request_id: &str, status: ResponseStatus) -> InboundEvent {
    InboundEvent::DeviceResponse(response(event_id, "V1", request_id, status))
}

#[tokio::test]
async fn response_correlates_through_cache() {
    let h = harness();
    h.router.route(doors("e1", "R1")).await.unwrap();
    assert!(h.store.get("R1_V1").await.unwrap().is_some());

    let outcome = h.router.route(reply("r1", "R1", ResponseStatus::Success)).await.unwrap();
    match outcome {
        RouteOutcome::Response(ResponseOutcome::Recorded {
            status,
            terminal,
            notification,
            source,
            ..
        }) => {
            assert_eq!(status, CommandStatus::ProcessedSuccess);
            assert!(terminal);
            assert_eq!(source, CorrelationSource::Cache);
            assert_eq!(notification.as_deref(), Some("RO_GENERIC_SUCCESS"));
        }
        other => panic!("unexpected {:?}", other),
    }

    let responses = h.sink.responses();
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].qualifier, "RO_RESPONSE_DOORS_MOBILE_APP");
    assert_eq!(responses[0].user_id, "U1");
    assert!(!responses[0].synthetic);

    let record = h.store.find_latest("R1", "V1").await.unwrap().unwrap();
    assert_eq!(record.responses.len(), 1);
    assert_eq!(record.notifications.len(), 1);
    assert_eq!(record.notifications[0].template_id, "RO_GENERIC_SUCCESS");

    // 终态后缓存条目被清除
    assert!(h.store.get("R1_V1").await.unwrap().is_none());
}

#[tokio::test]
async fn cache_miss_falls_back_to_store_with_same_metadata() {
    let h = harness();
    h.router.route(doors("e1", "R1")).await.unwrap();
    KvCache::delete(&h.store, "R1_V1").await.unwrap();

    let outcome = h
        .router
        .route(reply("r1", "R1", ResponseStatus::SuccessContinue))
        .await
        .unwrap();
    match outcome {
        RouteOutcome::Response(ResponseOutcome::Recorded {
            status,
            terminal,
            source,
            notification,
            ..
        }) => {
            assert_eq!(status, CommandStatus::Pending);
            assert!(!terminal);
            assert_eq!(source, CorrelationSource::Store);
            assert_eq!(notification, None);
        }
        other => panic!("unexpected {:?}", other),
    }

    // 在途指令回查后回填缓存
    assert!(h.store.get("R1_V1").await.unwrap().is_some());

    let outcome = h.router.route(reply("r2", "R1", ResponseStatus::Success)).await.unwrap();
    assert!(matches!(
        outcome,
        RouteOutcome::Response(ResponseOutcome::Recorded {
            source: CorrelationSource::Cache,
            ..
        })
    ));

    let responses = h.sink.responses();
    assert_eq!(responses.len(), 2);
    assert_eq!(responses[0].qualifier, responses[1].qualifier);
    assert_eq!(responses[0].origin, responses[1].origin);
    assert_eq!(responses[0].user_id, responses[1].user_id);
    assert_eq!(responses[0].command_kind, "DOORS");
}

#[tokio::test]
async fn corrupt_cache_entry_is_treated_as_miss() {
    let h = harness();
    h.router.route(doors("e1", "R1")).await.unwrap();
    KvCache::put(&h.store, "R1_V1", "{not json", std::time::Duration::from_secs(60))
        .await
        .unwrap();

    let outcome = h.router.route(reply("r1", "R1", ResponseStatus::Success)).await.unwrap();
    assert!(matches!(
        outcome,
        RouteOutcome::Response(ResponseOutcome::Recorded {
            source: CorrelationSource::Store,
            ..
        })
    ));
}

#[tokio::test]
async fn response_without_command_is_uncorrelated() {
    let h = harness();

    let outcome = h.router.route(reply("r1", "R404", ResponseStatus::Success)).await.unwrap();
    assert_eq!(outcome, RouteOutcome::Response(ResponseOutcome::Uncorrelated));
    assert!(h.sink.is_empty());
    assert_eq!(h.router.metrics().uncorrelated, 1);
}

#[tokio::test]
async fn duplicate_response_is_applied_once() {
    let h = harness();
    h.router.route(doors("e1", "R1")).await.unwrap();
    h.router.route(reply("r1", "R1", ResponseStatus::Success)).await.unwrap();

    let outcome = h.router.route(reply("r1", "R1", ResponseStatus::Success)).await.unwrap();
    assert!(matches!(
        outcome,
        RouteOutcome::Response(ResponseOutcome::Duplicate { .. })
    ));
    assert_eq!(h.sink.responses().len(), 1);
    assert_eq!(
        h.store.find_latest("R1", "V1").await.unwrap().unwrap().responses.len(),
        1
    );
}

#[tokio::test]
async fn terminal_status_is_not_overwritten() {
    let h = harness();
    h.router.route(doors("e1", "R1")).await.unwrap();
    h.router.route(reply("r1", "R1", ResponseStatus::Fail)).await.unwrap();

    let outcome = h.router.route(reply("r2", "R1", ResponseStatus::Success)).await.unwrap();
    match outcome {
        RouteOutcome::Response(ResponseOutcome::Recorded { status, .. }) => {
            assert_eq!(status, CommandStatus::ProcessedFailed)
        }
        other => panic!("unexpected {:?}", other),
    }
    let record = h.store.find_latest("R1", "V1").await.unwrap().unwrap();
    assert_eq!(record.status, CommandStatus::ProcessedFailed);
    assert_eq!(record.responses.len(), 2);
}

#[tokio::test]
async fn origin_outside_whitelist_gets_no_notification() {
    let h = harness();
    let mut env = command("e1", "V1", "R1", CommandState::Doors(LockState::Unlocked));
    env.payload.origin = "BATCH".into();
    h.router.route(InboundEvent::NewCommand(env)).await.unwrap();

    let outcome = h.router.route(reply("r1", "R1", ResponseStatus::Success)).await.unwrap();
    assert!(matches!(
        outcome,
        RouteOutcome::Response(ResponseOutcome::Recorded {
            notification: None,
            ..
        })
    ));
    assert_eq!(h.sink.responses().len(), 1);
    assert_eq!(h.sink.responses()[0].qualifier, "RO_RESPONSE_DOORS_BATCH");
    assert!(h.sink.notifications().is_empty());
}

#[tokio::test]
async fn custom_extension_message_selects_template() {
    let mut config = RoConfig::new_dev();
    config
        .notification
        .response_message_notifications
        .insert("Door ajar".into(), "RO_DOOR_AJAR".into());
    let h = harness_with(config);
    h.router.route(doors("e1", "R1")).await.unwrap();

    let mut resp = response("r1", "V1", "R1", ResponseStatus::Fail);
    resp.custom_extension = Some(CustomExtension {
        code: "DOOR_AJAR".into(),
        message: Some("Door ajar".into()),
    });
    h.router.route(InboundEvent::DeviceResponse(resp)).await.unwrap();

    let notifications = h.sink.notifications();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].template_id, "RO_DOOR_AJAR");
    // 模板没有配置对外状态，退回回执状态
    assert_eq!(notifications[0].status, "FAIL");
}

#[tokio::test]
async fn unmapped_extension_code_falls_back_to_status() {
    let h = harness();
    h.router.route(doors("e1", "R1")).await.unwrap();

    let mut resp = response("r1", "V1", "R1", ResponseStatus::Fail);
    resp.custom_extension = Some(CustomExtension {
        code: "SOMETHING_ELSE".into(),
        message: None,
    });
    h.router.route(InboundEvent::DeviceResponse(resp)).await.unwrap();

    let notifications = h.sink.notifications();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].template_id, "RO_GENERIC_FAIL");
}
