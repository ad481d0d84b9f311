use std::sync::Arc;

use tracing::debug;

use crate::{
    common::{Clock, RoConfig, error::Result, model::CommandEnvelope},
    engine::EngineMetrics,
    outbound::{DeviceCommand, EventSink, OutboundEvent},
    persistence::{CommandStore, KvCache, ScheduleStore, VehicleQueue},
};

/// 引擎上下文 (Engine Context)
///
/// **职责**:
/// 打包引擎运行所需的全部共享资源，避免在组件之间传递一长串参数。
/// 每个节点只有一份，所有组件和 Handler 持有它的廉价克隆。
pub struct EngineContext {
    /// 当前节点 ID (日志排查用)
    pub node_id: String,

    /// 全局配置
    pub config: Arc<RoConfig>,

    // --- 存储能力 (Capabilities) ---
    /// 指令记录 (唯一事实来源)
    pub store: Arc<dyn CommandStore>,

    /// 定时计划
    pub schedules: Arc<dyn ScheduleStore>,

    /// 关联缓存与引擎标记
    pub cache: Arc<dyn KvCache>,

    /// 单车队列
    pub queue: Arc<dyn VehicleQueue>,

    // --- 出站与观测 ---
    pub sink: Arc<dyn EventSink>,

    pub clock: Arc<dyn Clock>,

    pub metrics: Arc<EngineMetrics>,
}

impl Clone for EngineContext {
    fn clone(&self) -> Self {
        Self {
            node_id: self.node_id.clone(),
            config: self.config.clone(),
            store: self.store.clone(),
            schedules: self.schedules.clone(),
            cache: self.cache.clone(),
            queue: self.queue.clone(),
            sink: self.sink.clone(),
            clock: self.clock.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

impl EngineContext {
    /// 当前时间 (Unix 秒)
    #[inline]
    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    /// 发布出站事件
    pub async fn publish(&self, event: OutboundEvent) -> Result<()> {
        debug!(kind = event.kind(), "publish outbound event");
        self.sink.publish(event).await
    }

    /// 把指令转发给设备
    pub async fn forward_to_device(&self, record_id: &str, envelope: &CommandEnvelope) -> Result<()> {
        debug!(
            vehicle_id = %envelope.vehicle_id,
            request_id = %envelope.request_id,
            kind = envelope.command.kind_name(),
            "forward command to device"
        );
        self.publish(OutboundEvent::DeviceCommand(DeviceCommand {
            record_id: record_id.to_string(),
            envelope: envelope.clone(),
            response_expected: true,
            device_routable: true,
            shoulder_tap: self.config.routing.shoulder_tap,
        }))
        .await?;
        EngineMetrics::inc(&self.metrics.commands_forwarded);
        Ok(())
    }
}
