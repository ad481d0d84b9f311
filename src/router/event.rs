use serde::{Deserialize, Serialize};

use crate::common::model::{CommandEnvelope, DeliveryFailure, DeviceResponse};

// ==========================================
// 入站事件 (Inbound Events)
// ==========================================

/// 计划触发的目标引擎
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerTarget {
    /// 本引擎
    #[default]
    Core,
    /// 协作通道
    Companion,
}

/// 外部调度器的触发回调
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleTrigger {
    pub event_id: String,
    pub vehicle_id: String,
    #[serde(default)]
    pub request_id: String,
    #[serde(default)]
    pub biz_transaction_id: String,
    pub timestamp: f64,
    pub command_kind: String,
    pub scheduler_key: String,
    #[serde(default)]
    pub schedule_id: Option<String>,
    #[serde(default)]
    pub target: TriggerTarget,
    /// 协作通道的原始载荷，原样转交
    #[serde(default)]
    pub payload: Option<serde_json::Value>,
}

/// 外部调度器的创建确认
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleAck {
    pub event_id: String,
    pub vehicle_id: String,
    #[serde(default)]
    pub request_id: String,
    #[serde(default)]
    pub biz_transaction_id: String,
    pub timestamp: f64,
    pub command_kind: String,
    pub scheduler_key: String,
    /// 调度器分配的 ID
    pub schedule_id: String,
}

/// 车辆与用户解绑
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleDeprovisioned {
    pub event_id: String,
    pub vehicle_id: String,
    pub user_id: String,
    #[serde(default)]
    pub request_id: String,
    #[serde(default)]
    pub biz_transaction_id: String,
    pub timestamp: f64,
}

/// 全部入站事件
///
/// 以 `kind` 字段区分；未知类型落到 `Unknown`，由路由记录日志后丢弃。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InboundEvent {
    NewCommand(CommandEnvelope),
    DeviceResponse(DeviceResponse),
    DeliveryFailure(DeliveryFailure),
    ScheduleTrigger(ScheduleTrigger),
    ScheduleAck(ScheduleAck),
    VehicleDeprovisioned(VehicleDeprovisioned),
    #[serde(other)]
    Unknown,
}

impl InboundEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            InboundEvent::NewCommand(_) => "NEW_COMMAND",
            InboundEvent::DeviceResponse(_) => "DEVICE_RESPONSE",
            InboundEvent::DeliveryFailure(_) => "DELIVERY_FAILURE",
            InboundEvent::ScheduleTrigger(_) => "SCHEDULE_TRIGGER",
            InboundEvent::ScheduleAck(_) => "SCHEDULE_ACK",
            InboundEvent::VehicleDeprovisioned(_) => "VEHICLE_DEPROVISIONED",
            InboundEvent::Unknown => "UNKNOWN",
        }
    }

    /// 分区键
    pub fn vehicle_id(&self) -> Option<&str> {
        match self {
            InboundEvent::NewCommand(e) => Some(&e.vehicle_id),
            InboundEvent::DeviceResponse(e) => Some(&e.vehicle_id),
            InboundEvent::DeliveryFailure(e) => Some(&e.vehicle_id),
            InboundEvent::ScheduleTrigger(e) => Some(&e.vehicle_id),
            InboundEvent::ScheduleAck(e) => Some(&e.vehicle_id),
            InboundEvent::VehicleDeprovisioned(e) => Some(&e.vehicle_id),
            InboundEvent::Unknown => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::model::{CommandState, EngineState};

    #[test]
    fn new_command_is_decoded_by_kind() {
        let raw = r#"{
            "kind": "NEW_COMMAND",
            "event_id": "e1",
            "vehicle_id": "V1",
            "request_id": "R1",
            "biz_transaction_id": "B1",
            "timestamp": 1700000000.0,
            "command": { "kind": "ENGINE", "state": "STARTED" },
            "payload": { "origin": "MOBILE_APP", "user_id": "U1" }
        }"#;
        let event: InboundEvent = serde_json::from_str(raw).unwrap();
        match event {
            InboundEvent::NewCommand(env) => {
                assert_eq!(env.command, CommandState::Engine(EngineState::Started));
                assert!(env.payload.schedule.is_none());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn unknown_kind_falls_through() {
        let raw = r#"{ "kind": "FIRMWARE_UPDATE", "vehicle_id": "V1", "blob": [1, 2, 3] }"#;
        let event: InboundEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(event, InboundEvent::Unknown);
        assert_eq!(event.vehicle_id(), None);
    }

    #[test]
    fn trigger_target_defaults_to_core() {
        let raw = r#"{
            "kind": "SCHEDULE_TRIGGER",
            "event_id": "t1",
            "vehicle_id": "V1",
            "timestamp": 1.0,
            "command_kind": "ENGINE",
            "scheduler_key": "morning"
        }"#;
        let event: InboundEvent = serde_json::from_str(raw).unwrap();
        match event {
            InboundEvent::ScheduleTrigger(t) => assert_eq!(t.target, TriggerTarget::Core),
            other => panic!("unexpected {:?}", other),
        }
    }
}
