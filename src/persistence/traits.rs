use std::time::Duration;

use async_trait::async_trait;

use crate::common::error::Result;
use crate::common::model::{
    CommandRecord, CommandStatus, DeliveryFailure, DeviceResponse, NotificationRecord,
    QueueEntry, ScheduleKey, ScheduleRecord, ScheduleStatus,
};
use crate::persistence::model::{AppendOutcome, CreateOutcome, StatusChange};

// ==========================================
// 1. 指令存储接口 (CommandStore) - 唯一事实来源
// ==========================================

/// 指令生命周期存储
///
/// **职责**: 持久化指令记录，追加回执/失败/通知历史，维护单调的状态流转。
/// **特点**:
/// - 权威数据，缓存与队列都可以从它重建。
/// - 关联主键为 (requestId, vehicleId)，同一对键可能对应多条记录，按创建时间倒序取最新一条。
/// - 所有写操作对重复投递幂等。
#[async_trait]
pub trait CommandStore: Send + Sync + 'static {
    /// 创建 PENDING 记录
    ///
    /// 以入站 `event_id` 去重：重复投递返回已存在的记录 ID。
    async fn create(&self, record: CommandRecord) -> Result<CreateOutcome>;

    /// 按记录 ID 加载
    async fn load(&self, id: &str) -> Result<Option<CommandRecord>>;

    /// 按 (requestId, vehicleId) 查找最新的一条记录
    async fn find_latest(&self, request_id: &str, vehicle_id: &str)
    -> Result<Option<CommandRecord>>;

    /// 追加设备回执
    async fn append_response(&self, response: &DeviceResponse) -> Result<AppendOutcome>;

    /// 追加投递失败
    async fn append_failure(&self, failure: &DeliveryFailure) -> Result<AppendOutcome>;

    /// 追加已发送通知
    async fn append_notification(&self, id: &str, notification: &NotificationRecord)
    -> Result<()>;

    /// 设置状态
    ///
    /// 幂等且单调：终态不会再变；设置相同状态返回 `Unchanged`。
    async fn set_status(&self, id: &str, status: CommandStatus) -> Result<StatusChange>;

    /// 车辆解绑：停用该 (车辆, 用户) 的全部指令记录，返回受影响条数
    async fn deactivate(&self, vehicle_id: &str, user_id: &str) -> Result<usize>;
}

// ==========================================
// 2. 定时计划存储接口 (ScheduleStore)
// ==========================================

/// 定时计划存储
///
/// 每个计划一条记录，以 (vehicleId, commandKind, schedulerKey) 寻址，
/// 不存在“整车一个聚合文档”的读改写竞争。
#[async_trait]
pub trait ScheduleStore: Send + Sync + 'static {
    /// 插入新计划，键已存在时返回 `DuplicateSchedule`
    async fn insert(&self, record: ScheduleRecord) -> Result<()>;

    async fn load(&self, key: &ScheduleKey) -> Result<Option<ScheduleRecord>>;

    /// 统计 (车辆, 指令类型) 下 ACTIVE 的计划数
    async fn count_active(&self, vehicle_id: &str, command_kind: &str) -> Result<usize>;

    /// 更新状态，返回更新后的记录
    async fn set_status(
        &self,
        key: &ScheduleKey,
        status: ScheduleStatus,
        now: f64,
    ) -> Result<Option<ScheduleRecord>>;

    /// 写入外部调度器分配的 ID
    async fn set_schedule_id(
        &self,
        key: &ScheduleKey,
        schedule_id: &str,
        now: f64,
    ) -> Result<Option<ScheduleRecord>>;

    /// 列出车辆 (可按用户过滤) 的全部计划
    async fn list_for_vehicle(
        &self,
        vehicle_id: &str,
        user_id: Option<&str>,
    ) -> Result<Vec<ScheduleRecord>>;
}

// ==========================================
// 3. 带 TTL 的键值缓存 (KvCache) - 尽力而为
// ==========================================

/// 尽力而为的 TTL 键值缓存
///
/// 关联缓存与引擎安全标记都基于它。值可能缺失或过期，调用方不能依赖它保证正确性。
#[async_trait]
pub trait KvCache: Send + Sync + 'static {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;
}

// ==========================================
// 4. 单车有序列表 (VehicleQueue)
// ==========================================

/// 按车辆分键的持久有序列表
///
/// **职责**: 提供原子的 offer / peek / 条件出队 / 遍历。
/// **注意**: 任何实例上的条件出队都必须在存储层原子完成，
/// 不同 Worker 对同一车辆的并发出队不能重复弹出同一个队头。
#[async_trait]
pub trait VehicleQueue: Send + Sync + 'static {
    /// 追加到队尾，返回追加后的队列长度
    async fn offer(&self, vehicle_id: &str, entry: QueueEntry) -> Result<usize>;

    /// 查看队头
    async fn peek(&self, vehicle_id: &str) -> Result<Option<QueueEntry>>;

    /// 仅当队头的 requestId 匹配时弹出队头
    async fn poll_if_head(&self, vehicle_id: &str, request_id: &str)
    -> Result<Option<QueueEntry>>;

    /// 仅当队头的 requestId 匹配时标记为已转发，返回是否标记成功
    async fn mark_head_forwarded(&self, vehicle_id: &str, request_id: &str) -> Result<bool>;

    /// 从队头到队尾遍历
    async fn entries(&self, vehicle_id: &str) -> Result<Vec<QueueEntry>>;

    async fn len(&self, vehicle_id: &str) -> Result<usize>;
}
