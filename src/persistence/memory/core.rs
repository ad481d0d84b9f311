use dashmap::DashMap;
use std::{collections::VecDeque, sync::Arc};

use crate::common::{Clock, SystemClock};
use crate::common::model::{CommandRecord, QueueEntry, ScheduleKey, ScheduleRecord};

/// 内存持久化实现 (In-Memory Persistence)
///
/// 同时实现了 CommandStore、ScheduleStore、KvCache 和 VehicleQueue。
/// - DashMap: 分片锁，不同车辆的读写互不排队；同一个键上的复合操作在分片锁内完成，天然原子。
/// - 适合单进程部署与测试；多实例部署请使用 Redis 实现。
pub struct MemoryPersistence {
    /// 时钟 (TTL 判断)
    pub(super) clock: Arc<dyn Clock>,

    /// 【指令仓库】记录 ID -> 指令记录
    pub(super) records: Arc<DashMap<String, CommandRecord>>,

    /// 【关联索引】`requestId_vehicleId` -> 记录 ID 列表 (最新在前)
    pub(super) correlation_index: Arc<DashMap<String, Vec<String>>>,

    /// 【去重索引】入站事件 ID -> 记录 ID
    pub(super) event_index: Arc<DashMap<String, String>>,

    /// 【计划仓库】
    pub(super) schedules: Arc<DashMap<ScheduleKey, ScheduleRecord>>,

    /// 【缓存】键 -> (值, 过期时间)
    pub(super) cache: Arc<DashMap<String, (String, f64)>>,

    /// 【车辆队列】vehicleId -> FIFO
    pub(super) queues: Arc<DashMap<String, VecDeque<QueueEntry>>>,
}

impl MemoryPersistence {
    /// 创建一个使用系统时钟的实例
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// 注入自定义时钟 (测试里用 `ManualClock`)
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            records: Arc::new(DashMap::new()),
            correlation_index: Arc::new(DashMap::new()),
            event_index: Arc::new(DashMap::new()),
            schedules: Arc::new(DashMap::new()),
            cache: Arc::new(DashMap::new()),
            queues: Arc::new(DashMap::new()),
        }
    }

    /// 当前记录总数
    pub fn record_count(&self) -> usize {
        self.records.len()
    }
}

impl Default for MemoryPersistence {
    fn default() -> Self {
        Self::new()
    }
}

// Clone 实现：因为内部都是 Arc，所以 Clone 是廉价的，克隆体共享同一份数据
impl Clone for MemoryPersistence {
    fn clone(&self) -> Self {
        Self {
            clock: self.clock.clone(),
            records: self.records.clone(),
            correlation_index: self.correlation_index.clone(),
            event_index: self.event_index.clone(),
            schedules: self.schedules.clone(),
            cache: self.cache.clone(),
            queues: self.queues.clone(),
        }
    }
}

impl std::fmt::Debug for MemoryPersistence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryPersistence")
            .field("records", &self.records.len())
            .field("schedules", &self.schedules.len())
            .field("cache", &self.cache.len())
            .field("queues", &self.queues.len())
            .finish()
    }
}
