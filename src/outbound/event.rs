use serde::{Deserialize, Serialize};

use crate::common::model::{CommandEnvelope, DeviceResponse, ScheduleKey, TriggerSpec};
use crate::router::event::ScheduleTrigger;

/// 转发给设备的指令
///
/// 与入站指令同形，附加设备路由标记。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceCommand {
    pub record_id: String,
    pub envelope: CommandEnvelope,
    /// 设备需要回执
    pub response_expected: bool,
    /// 可以直接路由到设备
    pub device_routable: bool,
    /// 车辆休眠时先发唤醒
    pub shoulder_tap: bool,
}

/// 关联后的回执，交给下游的分发服务
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelatedResponse {
    pub record_id: String,
    /// 路由限定符 `<prefix>_<COMMAND_KIND>_<ORIGIN>`
    pub qualifier: String,
    pub command_kind: String,
    pub origin: String,
    pub user_id: String,
    pub response: DeviceResponse,
    /// 由引擎合成 (引擎保护、可推进的投递失败)，不是设备真实回执
    pub synthetic: bool,
}

/// 用户通知
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub record_id: String,
    pub template_id: String,
    /// 通知模板映射出的状态
    pub status: String,
    pub request_id: String,
    pub vehicle_id: String,
    pub user_id: String,
}

/// 请求外部调度器创建触发
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleCreate {
    pub key: ScheduleKey,
    pub trigger: TriggerSpec,
    pub first_trigger_at: f64,
}

/// 请求外部调度器取消触发
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleCancel {
    pub key: ScheduleKey,
    #[serde(default)]
    pub schedule_id: Option<String>,
}

/// 引擎产生的全部出站副作用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboundEvent {
    DeviceCommand(DeviceCommand),
    Response(CorrelatedResponse),
    Notification(NotificationEvent),
    ScheduleCreate(ScheduleCreate),
    ScheduleCancel(ScheduleCancel),
    /// 目标为协作通道的计划触发，原样转交
    CompanionTrigger(ScheduleTrigger),
}

impl OutboundEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            OutboundEvent::DeviceCommand(_) => "DEVICE_COMMAND",
            OutboundEvent::Response(_) => "RESPONSE",
            OutboundEvent::Notification(_) => "NOTIFICATION",
            OutboundEvent::ScheduleCreate(_) => "SCHEDULE_CREATE",
            OutboundEvent::ScheduleCancel(_) => "SCHEDULE_CANCEL",
            OutboundEvent::CompanionTrigger(_) => "COMPANION_TRIGGER",
        }
    }
}
