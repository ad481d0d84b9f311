use serde::{Deserialize, Serialize};

// ==========================================
// 1. 指令生命周期状态 (CommandStatus)
// ==========================================

/// 指令记录生命周期状态
///
/// 状态只能从 `Pending` 单向流转到某个终态，终态之间互不流转。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandStatus {
    /// 已受理，等待设备回执
    Pending,
    /// 设备回执成功
    ProcessedSuccess,
    /// 设备回执失败，或投递失败且可推进队列
    ProcessedFailed,
    /// 在队列中超过 TTL 仍无回执
    TtlExpired,
}

impl CommandStatus {
    /// 状态是否是终态（不可流转）
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CommandStatus::Pending)
    }

    /// 是否允许从 `self` 流转到 `next`
    pub fn can_transition_to(&self, next: CommandStatus) -> bool {
        matches!(self, CommandStatus::Pending) && next.is_terminal()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CommandStatus::Pending => "PENDING",
            CommandStatus::ProcessedSuccess => "PROCESSED_SUCCESS",
            CommandStatus::ProcessedFailed => "PROCESSED_FAILED",
            CommandStatus::TtlExpired => "TTL_EXPIRED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(CommandStatus::Pending),
            "PROCESSED_SUCCESS" => Some(CommandStatus::ProcessedSuccess),
            "PROCESSED_FAILED" => Some(CommandStatus::ProcessedFailed),
            "TTL_EXPIRED" => Some(CommandStatus::TtlExpired),
            _ => None,
        }
    }
}

// ==========================================
// 2. 指令类型与目标状态 (CommandState)
// ==========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineState {
    Started,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LockState {
    Locked,
    Unlocked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SwitchState {
    On,
    Off,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WindowState {
    Opened,
    Closed,
    PartiallyOpened,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LightsState {
    On,
    Off,
    Flash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HoodState {
    Opened,
    Closed,
}

/// 后备箱 / 尾门
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClosureState {
    Locked,
    Unlocked,
    Opened,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InhibitState {
    Inhibited,
    Uninhibited,
}

/// 远程指令 (类型 + 目标状态)
///
/// 每个指令族携带自己的状态枚举。类型名与状态名都由一次穷尽匹配得出，
/// 新增指令族时编译器会指出所有需要补齐的分支。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandState {
    Engine(EngineState),
    Doors(LockState),
    DriverDoor(LockState),
    ClimateV1(SwitchState),
    ClimateV2(SwitchState),
    Windows(WindowState),
    DriverWindow(WindowState),
    Lights(LightsState),
    LightsOnly(SwitchState),
    Horn(SwitchState),
    Alarm(SwitchState),
    Hood(HoodState),
    Trunk(ClosureState),
    TrunkV2(ClosureState),
    Liftgate(ClosureState),
    LiftgateV2(ClosureState),
    Glovebox(LockState),
    RemoteInhibit(InhibitState),
    /// 协作通道的指令，状态为自由文本
    Companion(String),
}

impl CommandState {
    /// 指令类型名 (大写，用于路由限定符与计划键)
    pub fn kind_name(&self) -> &'static str {
        match self {
            CommandState::Engine(_) => "ENGINE",
            CommandState::Doors(_) => "DOORS",
            CommandState::DriverDoor(_) => "DRIVER_DOOR",
            CommandState::ClimateV1(_) => "CLIMATE",
            CommandState::ClimateV2(_) => "CLIMATE_V2",
            CommandState::Windows(_) => "WINDOWS",
            CommandState::DriverWindow(_) => "DRIVER_WINDOW",
            CommandState::Lights(_) => "LIGHTS",
            CommandState::LightsOnly(_) => "LIGHTS_ONLY",
            CommandState::Horn(_) => "HORN",
            CommandState::Alarm(_) => "ALARM",
            CommandState::Hood(_) => "HOOD",
            CommandState::Trunk(_) => "TRUNK",
            CommandState::TrunkV2(_) => "TRUNK_V2",
            CommandState::Liftgate(_) => "LIFTGATE",
            CommandState::LiftgateV2(_) => "LIFTGATE_V2",
            CommandState::Glovebox(_) => "GLOVEBOX",
            CommandState::RemoteInhibit(_) => "REMOTE_INHIBIT",
            CommandState::Companion(_) => "COMPANION",
        }
    }

    /// 目标状态名
    pub fn state_name(&self) -> String {
        fn name<S: Serialize>(s: &S) -> String {
            match serde_json::to_value(s) {
                Ok(serde_json::Value::String(v)) => v,
                _ => String::new(),
            }
        }
        match self {
            CommandState::Engine(s) => name(s),
            CommandState::Doors(s) | CommandState::DriverDoor(s) | CommandState::Glovebox(s) => {
                name(s)
            }
            CommandState::ClimateV1(s)
            | CommandState::ClimateV2(s)
            | CommandState::LightsOnly(s)
            | CommandState::Horn(s)
            | CommandState::Alarm(s) => name(s),
            CommandState::Windows(s) | CommandState::DriverWindow(s) => name(s),
            CommandState::Lights(s) => name(s),
            CommandState::Hood(s) => name(s),
            CommandState::Trunk(s)
            | CommandState::TrunkV2(s)
            | CommandState::Liftgate(s)
            | CommandState::LiftgateV2(s) => name(s),
            CommandState::RemoteInhibit(s) => name(s),
            CommandState::Companion(op) => op.to_uppercase(),
        }
    }

    /// 是否为引擎指令
    pub fn engine_state(&self) -> Option<EngineState> {
        match self {
            CommandState::Engine(s) => Some(*s),
            _ => None,
        }
    }
}

// ==========================================
// 3. 指令信封 (CommandEnvelope)
// ==========================================

/// 指令附带的业务载荷
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandPayload {
    /// 请求来源 (APP / PORTAL / ...)，决定是否给用户推送通知
    pub origin: String,
    pub user_id: String,
    #[serde(default)]
    pub partner_id: Option<String>,
    #[serde(default)]
    pub arch_type: Option<String>,
    #[serde(default)]
    pub ecu_type: Option<String>,
    /// 可选的定时计划子对象
    #[serde(default)]
    pub schedule: Option<ScheduleRequest>,
}

/// 指令信封
///
/// - 这是在 Router, Queue, Store 之间流转的核心数据包。
/// - 入站的新指令事件、存储的原始请求、转发给设备的指令都是这个形状。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    /// 入站事件 ID，用于重复投递去重
    pub event_id: String,
    pub vehicle_id: String,
    pub request_id: String,
    pub biz_transaction_id: String,
    /// 事件时间 (Unix 秒)
    pub timestamp: f64,
    pub command: CommandState,
    pub payload: CommandPayload,
}

impl CommandEnvelope {
    /// 关联键 `requestId_vehicleId`
    pub fn correlation_key(&self) -> String {
        correlation_key(&self.request_id, &self.vehicle_id)
    }
}

/// 关联缓存键
pub fn correlation_key(request_id: &str, vehicle_id: &str) -> String {
    format!("{}_{}", request_id, vehicle_id)
}

// ==========================================
// 4. 设备回执与投递失败 (Response / Failure)
// ==========================================

/// 设备回执状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseStatus {
    Success,
    /// 中间确认，不是终态
    SuccessContinue,
    Fail,
    FailMessageDeliveryTimedOut,
    FailVehicleNotConnected,
    FailDeliveryRetrying,
    FailNoEngineStart,
}

impl ResponseStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ResponseStatus::SuccessContinue)
    }

    /// 终态回执对应的记录状态
    pub fn terminal_status(&self) -> Option<CommandStatus> {
        match self {
            ResponseStatus::SuccessContinue => None,
            ResponseStatus::Success => Some(CommandStatus::ProcessedSuccess),
            _ => Some(CommandStatus::ProcessedFailed),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseStatus::Success => "SUCCESS",
            ResponseStatus::SuccessContinue => "SUCCESS_CONTINUE",
            ResponseStatus::Fail => "FAIL",
            ResponseStatus::FailMessageDeliveryTimedOut => "FAIL_MESSAGE_DELIVERY_TIMED_OUT",
            ResponseStatus::FailVehicleNotConnected => "FAIL_VEHICLE_NOT_CONNECTED",
            ResponseStatus::FailDeliveryRetrying => "FAIL_DELIVERY_RETRYING",
            ResponseStatus::FailNoEngineStart => "FAIL_NO_ENGINE_START",
        }
    }
}

/// 自定义扩展回执 (设备侧的自由格式响应)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomExtension {
    pub code: String,
    #[serde(default)]
    pub message: Option<String>,
}

/// 设备回执
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceResponse {
    pub event_id: String,
    pub vehicle_id: String,
    pub request_id: String,
    pub biz_transaction_id: String,
    pub timestamp: f64,
    pub status: ResponseStatus,
    #[serde(default)]
    pub custom_extension: Option<CustomExtension>,
}

impl DeviceResponse {
    /// 通知映射使用的响应码：优先自定义扩展码
    pub fn resolution_code(&self) -> &str {
        match &self.custom_extension {
            Some(ext) => ext.code.as_str(),
            None => self.status.as_str(),
        }
    }
}

/// 设备消息投递失败
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryFailure {
    pub event_id: String,
    pub vehicle_id: String,
    pub request_id: String,
    pub biz_transaction_id: String,
    pub timestamp: f64,
    pub error_code: String,
    /// 投递失败的原始指令
    pub failed_command: CommandEnvelope,
}

/// 已发送通知
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub template_id: String,
    pub status: String,
    pub sent_at: f64,
}

// ==========================================
// 5. 指令记录 (CommandRecord)
// ==========================================

pub const COMMAND_SCHEMA_VERSION: u32 = 2;

/// 指令持久化记录
///
/// 审计用途，不会被删除。回执、失败、通知历史只追加不修改。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRecord {
    pub id: String,
    pub schema_version: u32,
    pub envelope: CommandEnvelope,
    pub status: CommandStatus,
    #[serde(default)]
    pub responses: Vec<DeviceResponse>,
    #[serde(default)]
    pub failures: Vec<DeliveryFailure>,
    #[serde(default)]
    pub notifications: Vec<NotificationRecord>,
    /// 车辆解绑后置为 false (与 status 独立，不破坏终态单调性)
    #[serde(default = "default_true")]
    pub active: bool,
    pub created_at: f64,
    pub updated_at: f64,
}

fn default_true() -> bool {
    true
}

impl CommandRecord {
    pub fn new(id: String, envelope: CommandEnvelope, now: f64) -> Self {
        Self {
            id,
            schema_version: COMMAND_SCHEMA_VERSION,
            envelope,
            status: CommandStatus::Pending,
            responses: Vec::new(),
            failures: Vec::new(),
            notifications: Vec::new(),
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_response(&self, event_id: &str) -> bool {
        self.responses.iter().any(|r| r.event_id == event_id)
    }

    pub fn has_failure(&self, event_id: &str) -> bool {
        self.failures.iter().any(|f| f.event_id == event_id)
    }
}

// ==========================================
// 6. 定时计划 (Schedule)
// ==========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScheduleStatus {
    Active,
    Inactive,
    Deleted,
}

/// 触发规则
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerSpec {
    /// 一次性: 在给定时间点 (Unix 秒) 触发
    At { at: f64 },
    /// 周期: Cron 表达式 (含秒位)
    Cron {
        expression: String,
        #[serde(default)]
        timezone: Option<String>,
        /// 规则生效时间，缺省为提交时刻
        #[serde(default)]
        start_at: Option<f64>,
    },
}

impl TriggerSpec {
    pub fn is_recurring(&self) -> bool {
        matches!(self, TriggerSpec::Cron { .. })
    }
}

/// 指令里的计划子对象
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleRequest {
    /// 客户端可见的计划键
    pub scheduler_key: String,
    pub action: ScheduleAction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScheduleAction {
    Create { trigger: TriggerSpec },
    Delete,
}

/// 计划记录主键
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScheduleKey {
    pub vehicle_id: String,
    pub command_kind: String,
    pub scheduler_key: String,
}

impl ScheduleKey {
    pub fn new(
        vehicle_id: impl Into<String>,
        command_kind: impl Into<String>,
        scheduler_key: impl Into<String>,
    ) -> Self {
        Self {
            vehicle_id: vehicle_id.into(),
            command_kind: command_kind.into(),
            scheduler_key: scheduler_key.into(),
        }
    }
}

/// 定时计划记录 (每个计划一条，独立寻址)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleRecord {
    pub key: ScheduleKey,
    pub user_id: String,
    /// 外部调度器分配的 ID，收到 Ack 后写入
    #[serde(default)]
    pub schedule_id: Option<String>,
    pub trigger: TriggerSpec,
    pub first_trigger_at: f64,
    pub status: ScheduleStatus,
    /// 触发时用于重新生成指令的模板
    pub template: CommandEnvelope,
    pub created_at: f64,
    pub updated_at: f64,
}

// ==========================================
// 7. 队列条目与关联缓存条目
// ==========================================

/// 车辆队列条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub record_id: String,
    pub request_id: String,
    pub envelope: CommandEnvelope,
    /// 入队时间 (Unix 秒)
    pub enqueued_at: f64,
    /// 是否已转发给设备
    #[serde(default)]
    pub forwarded: bool,
}

impl QueueEntry {
    pub fn new(record_id: String, envelope: CommandEnvelope, enqueued_at: f64) -> Self {
        Self {
            record_id,
            request_id: envelope.request_id.clone(),
            envelope,
            enqueued_at,
            forwarded: false,
        }
    }

    pub fn is_expired(&self, now: f64, ttl_secs: f64) -> bool {
        now - self.enqueued_at > ttl_secs
    }
}

/// 关联缓存条目 (非权威，可由存储重建)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationEntry {
    pub command_kind: String,
    pub state: String,
    pub origin: String,
    pub user_id: String,
    #[serde(default)]
    pub partner_id: Option<String>,
    #[serde(default)]
    pub ecu_type: Option<String>,
    #[serde(default)]
    pub arch_type: Option<String>,
}

impl From<&CommandEnvelope> for CorrelationEntry {
    fn from(env: &CommandEnvelope) -> Self {
        Self {
            command_kind: env.command.kind_name().to_string(),
            state: env.command.state_name(),
            origin: env.payload.origin.clone(),
            user_id: env.payload.user_id.clone(),
            partner_id: env.payload.partner_id.clone(),
            ecu_type: env.payload.ecu_type.clone(),
            arch_type: env.payload.arch_type.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses_never_reverse() {
        let all = [
            CommandStatus::Pending,
            CommandStatus::ProcessedSuccess,
            CommandStatus::ProcessedFailed,
            CommandStatus::TtlExpired,
        ];
        for from in all.iter().filter(|s| s.is_terminal()) {
            for to in all {
                assert!(!from.can_transition_to(to), "{:?} -> {:?}", from, to);
            }
        }
        assert!(CommandStatus::Pending.can_transition_to(CommandStatus::TtlExpired));
        assert!(!CommandStatus::Pending.can_transition_to(CommandStatus::Pending));
    }

    #[test]
    fn command_state_names_come_from_one_match() {
        let cmd = CommandState::Engine(EngineState::Started);
        assert_eq!(cmd.kind_name(), "ENGINE");
        assert_eq!(cmd.state_name(), "STARTED");

        let cmd = CommandState::DriverWindow(WindowState::PartiallyOpened);
        assert_eq!(cmd.kind_name(), "DRIVER_WINDOW");
        assert_eq!(cmd.state_name(), "PARTIALLY_OPENED");

        let cmd = CommandState::Companion("preheat".into());
        assert_eq!(cmd.state_name(), "PREHEAT");
    }

    #[test]
    fn command_state_wire_shape_is_adjacently_tagged() {
        let cmd = CommandState::TrunkV2(ClosureState::Opened);
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "TRUNK_V2", "state": "OPENED"}));
        let back: CommandState = serde_json::from_value(json).unwrap();
        assert_eq!(back, cmd);
    }

    #[test]
    fn response_terminality() {
        assert!(!ResponseStatus::SuccessContinue.is_terminal());
        assert_eq!(
            ResponseStatus::Success.terminal_status(),
            Some(CommandStatus::ProcessedSuccess)
        );
        assert_eq!(
            ResponseStatus::FailVehicleNotConnected.terminal_status(),
            Some(CommandStatus::ProcessedFailed)
        );
    }
}
