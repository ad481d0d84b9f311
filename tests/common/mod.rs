#![allow(dead_code)]

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use remote_ops::{
    EngineBuilder, EventRouter, RoConfig, RoError,
    common::{
        ManualClock,
        model::{
            CommandEnvelope, CommandPayload, CommandState, DeliveryFailure, DeviceResponse,
            ResponseStatus, ScheduleAction, ScheduleRequest, TriggerSpec,
        },
    },
    outbound::{EventSink, MemorySink, OutboundEvent},
    persistence::MemoryPersistence,
};

pub const T0: f64 = 1_700_000_000.0;

/// 测试夹具：内存存储 + 手动时钟 + 内存出站通道
pub struct Harness {
    pub router: EventRouter,
    pub store: MemoryPersistence,
    pub sink: MemorySink,
    pub clock: Arc<ManualClock>,
}

pub fn harness() -> Harness {
    harness_with(RoConfig::new_dev())
}

pub fn harness_with(config: RoConfig) -> Harness {
    let sink = MemorySink::new();
    build(config, sink.clone(), sink)
}

/// 出站通道按需失败一次的夹具，`Harness::sink` 记录成功发布的事件
pub fn flaky_harness() -> (Harness, FlakySink) {
    let flaky = FlakySink::default();
    let h = build(RoConfig::new_dev(), flaky.clone(), flaky.inner.clone());
    (h, flaky)
}

fn build<S: EventSink>(config: RoConfig, engine_sink: S, sink: MemorySink) -> Harness {
    remote_ops::common::logging::init(remote_ops::common::logging::Profile::Test);

    let clock = Arc::new(ManualClock::new(T0));
    let store = MemoryPersistence::with_clock(clock.clone());
    let router = EngineBuilder::new()
        .with_node_id("test-node")
        .with_config(config)
        .with_clock(clock.clone())
        .with_persistence(store.clone())
        .with_sink(engine_sink)
        .build()
        .expect("valid config");
    Harness {
        router,
        store,
        sink,
        clock,
    }
}

/// 下一次发布失败 (模拟总线瞬时故障)，之后恢复
#[derive(Debug, Clone, Default)]
pub struct FlakySink {
    inner: MemorySink,
    fail_next: Arc<AtomicBool>,
}

impl FlakySink {
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl EventSink for FlakySink {
    async fn publish(&self, event: OutboundEvent) -> remote_ops::Result<()> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(RoError::SinkClosed);
        }
        self.inner.publish(event).await
    }
}

pub fn command(event_id: &str, vehicle_id: &str, request_id: &str, state: CommandState) -> CommandEnvelope {
    CommandEnvelope {
        event_id: event_id.into(),
        vehicle_id: vehicle_id.into(),
        request_id: request_id.into(),
        biz_transaction_id: format!("biz-{}", request_id),
        timestamp: T0,
        command: state,
        payload: CommandPayload {
            origin: "MOBILE_APP".into(),
            user_id: "U1".into(),
            partner_id: None,
            arch_type: None,
            ecu_type: None,
            schedule: None,
        },
    }
}

pub fn scheduled(
    event_id: &str,
    vehicle_id: &str,
    state: CommandState,
    scheduler_key: &str,
    trigger: TriggerSpec,
) -> CommandEnvelope {
    let mut env = command(event_id, vehicle_id, &format!("req-{}", event_id), state);
    env.payload.schedule = Some(ScheduleRequest {
        scheduler_key: scheduler_key.into(),
        action: ScheduleAction::Create { trigger },
    });
    env
}

pub fn response(event_id: &str, vehicle_id: &str, request_id: &str, status: ResponseStatus) -> DeviceResponse {
    DeviceResponse {
        event_id: event_id.into(),
        vehicle_id: vehicle_id.into(),
        request_id: request_id.into(),
        biz_transaction_id: format!("biz-{}", request_id),
        timestamp: T0,
        status,
        custom_extension: None,
    }
}

pub fn failure(event_id: &str, failed: &CommandEnvelope, error_code: &str) -> DeliveryFailure {
    DeliveryFailure {
        event_id: event_id.into(),
        vehicle_id: failed.vehicle_id.clone(),
        request_id: failed.request_id.clone(),
        biz_transaction_id: failed.biz_transaction_id.clone(),
        timestamp: T0,
        error_code: error_code.into(),
        failed_command: failed.clone(),
    }
}

/// 出站设备指令的 requestId，按转发顺序
pub fn forwarded_requests(sink: &MemorySink) -> Vec<String> {
    sink.device_commands()
        .into_iter()
        .map(|c| c.envelope.request_id)
        .collect()
}
