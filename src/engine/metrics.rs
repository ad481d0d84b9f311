use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// 引擎核心指标
// 使用 Atomic 保证高并发下的计数性能
#[derive(Debug, Default)]
pub struct EngineMetrics {
    // --- 入站事件 (按类型) ---
    pub new_commands: AtomicU64,
    pub device_responses: AtomicU64,
    pub delivery_failures: AtomicU64,
    pub schedule_triggers: AtomicU64,
    pub schedule_acks: AtomicU64,
    pub deprovisions: AtomicU64,
    /// 未知类型，记录日志后丢弃
    pub dropped_events: AtomicU64,
    /// 处理出错 (含 panic) 的事件
    pub failed_events: AtomicU64,

    // --- 指令生命周期 ---
    pub commands_forwarded: AtomicU64,
    pub commands_queued: AtomicU64,
    pub commands_expired: AtomicU64,
    /// 被引擎保护拦截的熄火指令
    pub commands_blocked: AtomicU64,

    // --- 关联 ---
    pub correlation_hits: AtomicU64,
    pub correlation_misses: AtomicU64,
    /// 缓存与存储都找不到的回执
    pub uncorrelated: AtomicU64,

    // --- 通知与计划 ---
    pub notifications_sent: AtomicU64,
    pub schedules_created: AtomicU64,
    pub schedules_rejected: AtomicU64,
    pub schedules_fired: AtomicU64,
}

/// 指标快照 (可序列化)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub new_commands: u64,
    pub device_responses: u64,
    pub delivery_failures: u64,
    pub schedule_triggers: u64,
    pub schedule_acks: u64,
    pub deprovisions: u64,
    pub dropped_events: u64,
    pub failed_events: u64,
    pub commands_forwarded: u64,
    pub commands_queued: u64,
    pub commands_expired: u64,
    pub commands_blocked: u64,
    pub correlation_hits: u64,
    pub correlation_misses: u64,
    pub uncorrelated: u64,
    pub notifications_sent: u64,
    pub schedules_created: u64,
    pub schedules_rejected: u64,
    pub schedules_fired: u64,
}

impl EngineMetrics {
    /// 计数 +1
    #[inline]
    pub fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// 计数 +n
    #[inline]
    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        MetricsSnapshot {
            new_commands: load(&self.new_commands),
            device_responses: load(&self.device_responses),
            delivery_failures: load(&self.delivery_failures),
            schedule_triggers: load(&self.schedule_triggers),
            schedule_acks: load(&self.schedule_acks),
            deprovisions: load(&self.deprovisions),
            dropped_events: load(&self.dropped_events),
            failed_events: load(&self.failed_events),
            commands_forwarded: load(&self.commands_forwarded),
            commands_queued: load(&self.commands_queued),
            commands_expired: load(&self.commands_expired),
            commands_blocked: load(&self.commands_blocked),
            correlation_hits: load(&self.correlation_hits),
            correlation_misses: load(&self.correlation_misses),
            uncorrelated: load(&self.uncorrelated),
            notifications_sent: load(&self.notifications_sent),
            schedules_created: load(&self.schedules_created),
            schedules_rejected: load(&self.schedules_rejected),
            schedules_fired: load(&self.schedules_fired),
        }
    }
}
