use thiserror::Error;
use tokio::sync::mpsc::error::SendError;

/// 引擎统一结果类型
///
/// 使用此别名可以简化函数签名：`fn do_something() -> Result<()>`
pub type Result<T> = std::result::Result<T, RoError>;

#[derive(Error, Debug)]
pub enum RoError {
    // ==========================================
    // 1. 配置错误 (Configuration)
    // ==========================================
    /// 配置错误
    ///
    /// - 触发场景: 解析 YAML/JSON 失败、TTL 为 0、前缀为空等。
    /// - 后果: 引擎构建失败。
    /// - 处理: 检查配置文件或环境变量。
    #[error("Configuration error: {0}")]
    Config(String),

    // ==========================================
    // 2. 基础设施与 IO 错误 (Infrastructure & IO)
    // ==========================================
    /// Redis 交互失败
    ///
    /// - 触发场景: 网络抖动、Redis 重启、连接池耗尽、或 Redis 处于 Loading 状态。
    /// - 处理: 不在核心内重试，交给宿主运行时的重投递机制。
    #[cfg(feature = "distributed")]
    #[error("Redis interaction failed: {0}")]
    Redis(#[from] deadpool_redis::redis::RedisError),

    /// Redis 连接池错误
    #[cfg(feature = "distributed")]
    #[error("Redis pool failed: {0}")]
    Pool(#[from] deadpool_redis::PoolError),

    /// 序列化/反序列化失败
    ///
    /// - 触发场景: 存储里的 JSON 损坏，或者事件载荷与结构体不兼容。
    /// - 后果: 不可恢复，重投递也无济于事。
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML 配置解析失败
    #[error("YAML parse failed: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// 通用 IO 错误
    #[error("IO operation failed: {0}")]
    Io(#[from] std::io::Error),

    /// 持久化层通用错误
    ///
    /// - 说明: 用于包装底层存储的驱动错误或不一致状态。
    #[error("Persistence layer failure: {0}")]
    Persistence(String),

    /// 出站通道已关闭
    ///
    /// - 触发场景: 事件总线的发送端已被 Drop，但仍有组件尝试发布事件。
    #[error("Outbound sink closed.")]
    SinkClosed,

    /// 出站通道自定义实现抛出的错误
    #[error("Outbound sink failure: {0}")]
    Sink(#[source] anyhow::Error),

    // ==========================================
    // 3. 领域校验错误 (Domain Validation)
    // ==========================================
    /// Cron 表达式无效
    #[error("Invalid cron expression: {0}")]
    InvalidCron(#[from] cron::error::Error),

    /// 定时计划首次触发时间已过
    #[error("Schedule {scheduler_key} first trigger {trigger_at} is in the past (now {now}).")]
    ScheduleInPast {
        scheduler_key: String,
        trigger_at: f64,
        now: f64,
    },

    /// 同一车辆同一指令类型下 ACTIVE 计划数已达上限
    #[error("Active schedule limit {limit} reached for vehicle {vehicle_id} / {command_kind}.")]
    ScheduleLimitExceeded {
        vehicle_id: String,
        command_kind: String,
        limit: usize,
    },

    /// 计划已存在
    #[error("Schedule {0} already exists.")]
    DuplicateSchedule(String),

    /// 计划不存在
    #[error("Schedule {0} not found.")]
    ScheduleNotFound(String),

    /// 指令记录不存在
    #[error("Command record {0} not found.")]
    RecordNotFound(String),

    /// 入站事件无法解析
    #[error("Invalid inbound event: {0}")]
    InvalidEvent(String),

    /// 处理器 Panic
    ///
    /// - 说明: 路由层捕获后转换为错误，处理循环不会因此停止。
    #[error("Handler panicked: {0}")]
    HandlerPanic(String),
}

impl<T> From<SendError<T>> for RoError {
    fn from(_: SendError<T>) -> Self {
        RoError::SinkClosed
    }
}

impl RoError {
    /// 判断该错误是否值得由宿主运行时重投递 (Retryable)
    ///
    /// - 返回 `true`: 基础设施抖动 (Redis、IO、出站通道)。核心不重试，交给运行时重投递。
    /// - 返回 `false`: 配置错误、数据损坏、领域校验失败。重投递只会得到同样的结果。
    pub fn is_retryable(&self) -> bool {
        match self {
            #[cfg(feature = "distributed")]
            RoError::Redis(e) => {
                e.is_connection_dropped() || e.is_cluster_error() || e.is_io_error() || e.is_timeout()
            }
            #[cfg(feature = "distributed")]
            RoError::Pool(_) => true,

            RoError::Io(_) => true,
            RoError::Persistence(_) => true,
            RoError::SinkClosed => true,
            RoError::Sink(_) => true,

            RoError::Config(_) => false,
            RoError::Serialization(_) => false,
            RoError::Yaml(_) => false,
            RoError::InvalidCron(_) => false,
            RoError::ScheduleInPast { .. } => false,
            RoError::ScheduleLimitExceeded { .. } => false,
            RoError::DuplicateSchedule(_) => false,
            RoError::ScheduleNotFound(_) => false,
            RoError::RecordNotFound(_) => false,
            RoError::InvalidEvent(_) => false,
            RoError::HandlerPanic(_) => false,
        }
    }

    /// 是否为领域校验拒绝 (同步拒绝，不提交任何部分状态)
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            RoError::InvalidCron(_)
                | RoError::ScheduleInPast { .. }
                | RoError::ScheduleLimitExceeded { .. }
                | RoError::DuplicateSchedule(_)
                | RoError::ScheduleNotFound(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_rejections_are_not_retryable() {
        let err = RoError::ScheduleLimitExceeded {
            vehicle_id: "V1".into(),
            command_kind: "ENGINE".into(),
            limit: 5,
        };
        assert!(err.is_rejection());
        assert!(!err.is_retryable());
    }

    #[test]
    fn infrastructure_errors_are_retryable() {
        assert!(RoError::Persistence("down".into()).is_retryable());
        assert!(RoError::SinkClosed.is_retryable());
        assert!(!RoError::SinkClosed.is_rejection());
    }
}
