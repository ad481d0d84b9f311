mod common;

use common::*;
use remote_ops::{
    RoConfig, RouteOutcome,
    common::model::{CommandState, CommandStatus, EngineState, ResponseStatus},
    outbound::OutboundEvent,
    persistence::{CommandStore, KvCache},
    router::{
        InboundEvent,
        handlers::{CommandOutcome, ResponseOutcome},
    },
};

fn engine(event_id: &str, request_id: &str, state: EngineState) -> InboundEvent {
    InboundEvent::NewCommand(command(event_id, "V1", request_id, CommandState::Engine(state)))
}

#[tokio::test]
async fn start_success_sets_marker_with_ttl() {
    let h = harness();

    let outcome = h.router.route(engine("e1", "R1", EngineState::Started)).await.unwrap();
    assert!(matches!(outcome, RouteOutcome::Command(CommandOutcome::Forwarded { .. })));
    assert_eq!(
        h.store.find_latest("R1", "V1").await.unwrap().unwrap().status,
        CommandStatus::Pending
    );

    let outcome = h
        .router
        .route(InboundEvent::DeviceResponse(response("r1", "V1", "R1", ResponseStatus::Success)))
        .await
        .unwrap();
    match outcome {
        RouteOutcome::Response(ResponseOutcome::Recorded {
            status,
            terminal,
            notification,
            ..
        }) => {
            assert_eq!(status, CommandStatus::ProcessedSuccess);
            assert!(terminal);
            assert_eq!(notification.as_deref(), Some("RO_ENGINE_SUCCESS"));
        }
        other => panic!("unexpected {:?}", other),
    }

    assert_eq!(
        h.store.get("ENGINE_STATUS_V1").await.unwrap().as_deref(),
        Some("STARTED")
    );

    // new_dev 的标记 TTL 是 120s
    h.clock.advance(119.0);
    assert!(h.store.get("ENGINE_STATUS_V1").await.unwrap().is_some());
    h.clock.advance(2.0);
    assert!(h.store.get("ENGINE_STATUS_V1").await.unwrap().is_none());
}

#[tokio::test]
async fn stop_without_marker_is_short_circuited() {
    let h = harness();

    let outcome = h.router.route(engine("e2", "R2", EngineState::Stopped)).await.unwrap();
    assert!(matches!(outcome, RouteOutcome::Command(CommandOutcome::Blocked { .. })));

    // 不下发
    assert!(h.sink.device_commands().is_empty());

    let responses = h.sink.responses();
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].response.status, ResponseStatus::FailNoEngineStart);
    assert!(responses[0].synthetic);
    assert_eq!(responses[0].qualifier, "RO_RESPONSE_ENGINE_MOBILE_APP");

    let notifications = h.sink.notifications();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].template_id, "RO_ENGINE_STOP_NO_ENGINE_START");
    assert_eq!(notifications[0].status, "FAIL");

    let record = h.store.find_latest("R2", "V1").await.unwrap().unwrap();
    assert_eq!(record.status, CommandStatus::ProcessedFailed);
    assert_eq!(record.responses.len(), 1);
    assert_eq!(record.notifications.len(), 1);
    assert_eq!(h.router.metrics().commands_blocked, 1);
}

#[tokio::test]
async fn stop_with_marker_is_forwarded_and_clears_it() {
    let h = harness();
    h.router.route(engine("e1", "R1", EngineState::Started)).await.unwrap();
    h.router
        .route(InboundEvent::DeviceResponse(response("r1", "V1", "R1", ResponseStatus::Success)))
        .await
        .unwrap();

    let outcome = h.router.route(engine("e2", "R2", EngineState::Stopped)).await.unwrap();
    assert!(matches!(outcome, RouteOutcome::Command(CommandOutcome::Forwarded { .. })));
    assert_eq!(forwarded_requests(&h.sink), vec!["R1", "R2"]);

    h.router
        .route(InboundEvent::DeviceResponse(response("r2", "V1", "R2", ResponseStatus::Success)))
        .await
        .unwrap();
    assert!(h.store.get("ENGINE_STATUS_V1").await.unwrap().is_none());

    // 标记已清除，下一次熄火被拦截
    let outcome = h.router.route(engine("e3", "R3", EngineState::Stopped)).await.unwrap();
    assert!(matches!(outcome, RouteOutcome::Command(CommandOutcome::Blocked { .. })));
}

#[tokio::test]
async fn expired_marker_blocks_stop() {
    let h = harness();
    h.router.route(engine("e1", "R1", EngineState::Started)).await.unwrap();
    h.router
        .route(InboundEvent::DeviceResponse(response("r1", "V1", "R1", ResponseStatus::Success)))
        .await
        .unwrap();

    h.clock.advance(121.0);
    let outcome = h.router.route(engine("e2", "R2", EngineState::Stopped)).await.unwrap();
    assert!(matches!(outcome, RouteOutcome::Command(CommandOutcome::Blocked { .. })));
}

#[tokio::test]
async fn failed_start_does_not_set_marker() {
    let h = harness();
    h.router.route(engine("e1", "R1", EngineState::Started)).await.unwrap();
    h.router
        .route(InboundEvent::DeviceResponse(response("r1", "V1", "R1", ResponseStatus::Fail)))
        .await
        .unwrap();
    assert!(h.store.get("ENGINE_STATUS_V1").await.unwrap().is_none());
}

#[tokio::test]
async fn disabled_gate_forwards_every_stop() {
    let mut config = RoConfig::new_dev();
    config.engine_safety.enabled = false;
    let h = harness_with(config);

    let outcome = h.router.route(engine("e1", "R1", EngineState::Stopped)).await.unwrap();
    assert!(matches!(outcome, RouteOutcome::Command(CommandOutcome::Forwarded { .. })));
    assert!(h
        .sink
        .events()
        .iter()
        .all(|e| !matches!(e, OutboundEvent::Notification(_))));
}

#[tokio::test]
async fn blocked_stop_from_silent_origin_sends_no_notification() {
    let h = harness();
    let mut env = command("e1", "V1", "R1", CommandState::Engine(EngineState::Stopped));
    env.payload.origin = "BATCH".into();

    h.router.route(InboundEvent::NewCommand(env)).await.unwrap();
    assert_eq!(h.sink.responses().len(), 1);
    assert!(h.sink.notifications().is_empty());
}
