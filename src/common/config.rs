use std::{
    collections::{HashMap, HashSet},
    path::Path,
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::common::error::{Result, RoError};
use crate::common::model::ResponseStatus;
use crate::common::utils::get_hostname;

// ==========================================
// 1. 车辆队列配置 (QueueConfig)
// ==========================================

/// 单车指令队列配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// 是否启用排队路径
    ///
    /// - 关闭时新指令直接转发给设备，不做单车串行化。
    /// - 默认值: true
    pub enabled: bool,

    /// 队列条目 TTL (秒)
    ///
    /// - 说明: 入队超过这个时间仍无终态回执的指令会被标记为 TTL_EXPIRED 并出队。
    /// - 默认值: 300
    /// - 注意: 没有后台定时器，过期是在下一次入队或回执触发的扫描中被发现的。
    pub ttl_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 300,
        }
    }
}

// ==========================================
// 2. 关联缓存配置 (CorrelationConfig)
// ==========================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrelationConfig {
    /// 缓存条目 TTL (秒)
    ///
    /// - 默认值: 3600
    /// - 建议: 不小于 `QueueConfig.ttl_secs`，否则排队中的指令回执总会走存储回查。
    pub ttl_secs: u64,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self { ttl_secs: 3600 }
    }
}

// ==========================================
// 3. 引擎安全闸配置 (EngineSafetyConfig)
// ==========================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSafetyConfig {
    /// 是否启用熄火安全闸
    pub enabled: bool,

    /// STARTED 标记 TTL (秒)
    ///
    /// - 说明: 远程启动后发动机的最长运行时间，超过后标记自然失效。
    /// - 默认值: 600
    pub marker_ttl_secs: u64,

    /// 标记键前缀，完整键为 `{prefix}{vehicleId}`
    pub key_prefix: String,

    /// 没有找到启动记录时发送的通知模板
    pub no_start_notification_id: String,
}

impl Default for EngineSafetyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            marker_ttl_secs: 600,
            key_prefix: "ENGINE_STATUS_".to_string(),
            no_start_notification_id: "RO_ENGINE_STOP_NO_ENGINE_START".to_string(),
        }
    }
}

// ==========================================
// 4. 定时计划配置 (ScheduleConfig)
// ==========================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// 每个 (车辆, 指令类型) 允许的 ACTIVE 计划上限
    ///
    /// - 默认值: 5
    pub max_active_per_kind: usize,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            max_active_per_kind: 5,
        }
    }
}

// ==========================================
// 5. 通知映射配置 (NotificationConfig)
// ==========================================

/// 一条通知映射规则
///
/// 可选维度为空表示通配；匹配时越具体的规则越优先。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationMapping {
    /// 回执状态码或自定义扩展码
    pub code: String,
    #[serde(default)]
    pub command_kind: Option<String>,
    #[serde(default)]
    pub arch_type: Option<String>,
    #[serde(default)]
    pub ecu_type: Option<String>,
    pub notification_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// 允许推送用户通知的请求来源
    ///
    /// - 默认值: 空 (不推送)
    #[serde(default)]
    pub origin_whitelist: HashSet<String>,

    /// {回执码 (+维度) -> 通知模板}
    #[serde(default)]
    pub mappings: Vec<NotificationMapping>,

    /// {自定义扩展自由文本 -> 通知模板}
    #[serde(default)]
    pub response_message_notifications: HashMap<String, String>,

    /// {通知模板 -> 对外状态}
    #[serde(default)]
    pub notification_status: HashMap<String, String>,
}

// ==========================================
// 6. 投递失败分类配置 (FailureConfig)
// ==========================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FailureConfig {
    /// 可推进队列的错误码 (Pickable)
    #[serde(default)]
    pub pickable_error_codes: HashSet<String>,

    /// {错误码 -> 回执状态}
    ///
    /// 未出现在这里且不可推进的错误码只记录日志。
    #[serde(default)]
    pub error_code_status: HashMap<String, ResponseStatus>,
}

// ==========================================
// 7. 出站路由配置 (RoutingConfig)
// ==========================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// 回执路由限定符前缀: `{prefix}_{COMMAND_KIND}_{ORIGIN}`
    pub response_qualifier_prefix: String,

    /// 转发给设备时是否要求短信唤醒
    pub shoulder_tap: bool,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            response_qualifier_prefix: "RO_RESPONSE".to_string(),
            shoulder_tap: false,
        }
    }
}

// ==========================================
// 8. 集群配置 (ClusterConfig)
// ==========================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// 节点唯一标识，只用于日志追踪
    ///
    /// - 默认值: 主机名
    pub node_id: String,

    /// Redis 连接池大小
    ///
    /// - 默认值: 核心数 * 2
    #[cfg(feature = "distributed")]
    pub redis_pool_size: usize,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            node_id: get_hostname(),
            #[cfg(feature = "distributed")]
            redis_pool_size: num_cpus::get() * 2,
        }
    }
}

// ==========================================
// 9. 总配置入口 (RoConfig)
// ==========================================

/// 引擎总配置
///
/// 使用分层结构组织配置项。支持 `serde` 序列化，可直接从 YAML/JSON 加载。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoConfig {
    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub correlation: CorrelationConfig,

    #[serde(default)]
    pub engine_safety: EngineSafetyConfig,

    #[serde(default)]
    pub schedule: ScheduleConfig,

    #[serde(default)]
    pub notification: NotificationConfig,

    #[serde(default)]
    pub failure: FailureConfig,

    #[serde(default)]
    pub routing: RoutingConfig,

    #[serde(default)]
    pub cluster: ClusterConfig,

    /// 命名空间 (用于 Redis Key 前缀)
    /// 默认: "ro"
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

fn default_namespace() -> String {
    "ro".to_string()
}

impl Default for RoConfig {
    fn default() -> Self {
        Self {
            queue: QueueConfig::default(),
            correlation: CorrelationConfig::default(),
            engine_safety: EngineSafetyConfig::default(),
            schedule: ScheduleConfig::default(),
            notification: NotificationConfig::default(),
            failure: FailureConfig::default(),
            routing: RoutingConfig::default(),
            cluster: ClusterConfig::default(),
            namespace: default_namespace(),
        }
    }
}

impl RoConfig {
    /// 快速创建一个开发环境配置
    ///
    /// TTL 更短，并带一套示例映射表。
    pub fn new_dev() -> Self {
        let mut cfg = Self::default();
        cfg.queue.ttl_secs = 60;
        cfg.engine_safety.marker_ttl_secs = 120;
        cfg.notification.origin_whitelist =
            ["MOBILE_APP", "PORTAL"].into_iter().map(String::from).collect();
        cfg.notification.mappings = vec![
            NotificationMapping {
                code: "SUCCESS".into(),
                command_kind: Some("ENGINE".into()),
                arch_type: None,
                ecu_type: None,
                notification_id: "RO_ENGINE_SUCCESS".into(),
            },
            NotificationMapping {
                code: "SUCCESS".into(),
                command_kind: None,
                arch_type: None,
                ecu_type: None,
                notification_id: "RO_GENERIC_SUCCESS".into(),
            },
            NotificationMapping {
                code: "FAIL".into(),
                command_kind: None,
                arch_type: None,
                ecu_type: None,
                notification_id: "RO_GENERIC_FAIL".into(),
            },
        ];
        cfg.notification.notification_status = [
            ("RO_ENGINE_SUCCESS", "SUCCESS"),
            ("RO_GENERIC_SUCCESS", "SUCCESS"),
            ("RO_GENERIC_FAIL", "FAIL"),
            ("RO_ENGINE_STOP_NO_ENGINE_START", "FAIL"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        cfg.failure.pickable_error_codes = ["DEVICE_DELIVERY_CUTOFF_EXCEEDED"]
            .into_iter()
            .map(String::from)
            .collect();
        cfg.failure.error_code_status = [
            (
                "DEVICE_DELIVERY_CUTOFF_EXCEEDED",
                ResponseStatus::FailMessageDeliveryTimedOut,
            ),
            ("DEVICE_STATUS_INACTIVE", ResponseStatus::FailVehicleNotConnected),
            (
                "RETRYING_DEVICE_DELIVERY_MESSAGE",
                ResponseStatus::FailDeliveryRetrying,
            ),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        cfg
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_yaml_str(s: &str) -> Result<Self> {
        let cfg: Self = serde_yaml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// 按扩展名加载 (.json / .yaml / .yml)
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&raw),
            Some("yaml") | Some("yml") => Self::from_yaml_str(&raw),
            other => Err(RoError::Config(format!(
                "unsupported config extension {:?} for {}",
                other,
                path.display()
            ))),
        }
    }

    /// 校验配置
    pub fn validate(&self) -> Result<()> {
        if self.queue.ttl_secs == 0 {
            return Err(RoError::Config("queue.ttl_secs must be > 0".into()));
        }
        if self.correlation.ttl_secs == 0 {
            return Err(RoError::Config("correlation.ttl_secs must be > 0".into()));
        }
        if self.engine_safety.marker_ttl_secs == 0 {
            return Err(RoError::Config(
                "engine_safety.marker_ttl_secs must be > 0".into(),
            ));
        }
        if self.engine_safety.key_prefix.is_empty() {
            return Err(RoError::Config("engine_safety.key_prefix is empty".into()));
        }
        if self.schedule.max_active_per_kind == 0 {
            return Err(RoError::Config(
                "schedule.max_active_per_kind must be > 0".into(),
            ));
        }
        if self.namespace.is_empty() {
            return Err(RoError::Config("namespace is empty".into()));
        }
        Ok(())
    }

    pub fn queue_ttl(&self) -> Duration {
        Duration::from_secs(self.queue.ttl_secs)
    }

    pub fn correlation_ttl(&self) -> Duration {
        Duration::from_secs(self.correlation.ttl_secs)
    }

    pub fn marker_ttl(&self) -> Duration {
        Duration::from_secs(self.engine_safety.marker_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let cfg = RoConfig::from_json_str(r#"{"queue": {"enabled": false, "ttl_secs": 30}}"#)
            .unwrap();
        assert!(!cfg.queue.enabled);
        assert_eq!(cfg.queue.ttl_secs, 30);
        assert_eq!(cfg.schedule.max_active_per_kind, 5);
        assert_eq!(cfg.namespace, "ro");
    }

    #[test]
    fn yaml_tables_are_loaded() {
        let yaml = r#"
failure:
  pickable_error_codes: [DEVICE_DELIVERY_CUTOFF_EXCEEDED]
  error_code_status:
    DEVICE_STATUS_INACTIVE: FAIL_VEHICLE_NOT_CONNECTED
notification:
  origin_whitelist: [MOBILE_APP]
"#;
        let cfg = RoConfig::from_yaml_str(yaml).unwrap();
        assert!(
            cfg.failure
                .pickable_error_codes
                .contains("DEVICE_DELIVERY_CUTOFF_EXCEEDED")
        );
        assert_eq!(
            cfg.failure.error_code_status.get("DEVICE_STATUS_INACTIVE"),
            Some(&ResponseStatus::FailVehicleNotConnected)
        );
        assert!(cfg.notification.origin_whitelist.contains("MOBILE_APP"));
    }

    #[test]
    fn zero_schedule_cap_is_rejected() {
        let err = RoConfig::from_json_str(r#"{"schedule": {"max_active_per_kind": 0}}"#)
            .unwrap_err();
        assert!(matches!(err, RoError::Config(_)));
    }
}
