use super::scripts::Scripts;
use crate::common::config::RoConfig;
use crate::common::model::ScheduleKey;
use deadpool_redis::{Config, Pool, PoolConfig, Runtime};
use std::sync::Arc;

/// Redis 持久化实现
///
/// 包含 Redis 连接池和预编译的 Lua 脚本。
/// 多实例部署时所有复合操作 (去重创建、状态 CAS、条件出队) 都在 Lua 内原子完成。
#[derive(Debug, Clone)]
pub struct RedisPersistence {
    /// Redis 连接池
    pub(super) pool: Pool,

    /// Lua 脚本库
    pub(super) scripts: Arc<Scripts>,

    /// Key 前缀 (命名空间)
    /// e.g. "ro" -> "ro:cmd:xyz", "ro:queue:VIN123"
    pub(super) namespace: String,
}

impl RedisPersistence {
    /// 创建新实例
    pub fn new(config: &RoConfig, url: &str) -> anyhow::Result<Self> {
        let mut cfg = Config::from_url(url);
        cfg.pool = Some(PoolConfig::new(config.cluster.redis_pool_size));
        let pool = cfg.create_pool(Some(Runtime::Tokio1))?;

        Ok(Self {
            pool,
            scripts: Arc::new(Scripts::new()),
            namespace: config.namespace.clone(),
        })
    }

    // --- Key 生成辅助函数 ---

    /// 指令记录 Hash 的前缀
    pub(super) fn key_cmd_prefix(&self) -> String {
        format!("{}:cmd:", self.namespace) // 注意末尾的冒号
    }

    /// 单条指令记录 (Hash)
    pub(super) fn key_cmd(&self, id: &str) -> String {
        format!("{}:cmd:{}", self.namespace, id)
    }

    /// 指令历史列表 (List)，kind 为 responses / failures / notifications
    pub(super) fn key_cmd_history(&self, id: &str, kind: &str) -> String {
        format!("{}:cmd:{}:{}", self.namespace, id, kind)
    }

    /// 已追加事件集合 (Set)
    pub(super) fn key_cmd_seen(&self, id: &str) -> String {
        format!("{}:cmd:{}:seen", self.namespace, id)
    }

    /// 入站事件去重 (String)
    pub(super) fn key_event(&self, event_id: &str) -> String {
        format!("{}:event:{}", self.namespace, event_id)
    }

    /// 关联索引 (List，最新在前)
    pub(super) fn key_correlation(&self, correlation_key: &str) -> String {
        format!("{}:corr:{}", self.namespace, correlation_key)
    }

    /// 车辆的指令记录集合 (Set)
    pub(super) fn key_vehicle_cmds(&self, vehicle_id: &str) -> String {
        format!("{}:veh:{}:cmds", self.namespace, vehicle_id)
    }

    /// 单个计划文档 (String JSON)
    pub(super) fn key_schedule(&self, key: &ScheduleKey) -> String {
        format!(
            "{}:sched:{}:{}:{}",
            self.namespace, key.vehicle_id, key.command_kind, key.scheduler_key
        )
    }

    /// (车辆, 指令类型) 下 ACTIVE 计划的 schedulerKey 集合
    pub(super) fn key_schedule_active(&self, vehicle_id: &str, command_kind: &str) -> String {
        format!("{}:sched:active:{}:{}", self.namespace, vehicle_id, command_kind)
    }

    /// 车辆的全部计划文档 Key (Set)
    pub(super) fn key_vehicle_schedules(&self, vehicle_id: &str) -> String {
        format!("{}:veh:{}:scheds", self.namespace, vehicle_id)
    }

    /// 缓存条目 (String，带 EX)
    pub(super) fn key_cache(&self, key: &str) -> String {
        format!("{}:cache:{}", self.namespace, key)
    }

    /// 车辆队列 (List)
    pub(super) fn key_queue(&self, vehicle_id: &str) -> String {
        format!("{}:queue:{}", self.namespace, vehicle_id)
    }

    /// 队头已转发标记 (String，值为 requestId)
    pub(super) fn key_queue_forwarded(&self, vehicle_id: &str) -> String {
        format!("{}:queue:{}:fwd", self.namespace, vehicle_id)
    }
}
