use std::{
    str::FromStr,
    sync::atomic::{AtomicU64, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};

use chrono::{DateTime, TimeZone, Utc};
use cron::Schedule;

use crate::common::error::Result;
use crate::common::model::TriggerSpec;

/// 全局统一的时间与调度计算器
pub struct TimeUtils;

impl TimeUtils {
    /// [标准] 获取当前 Unix 时间戳 (秒, 双精度)
    pub fn now_f64() -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }

    /// 校验 Cron 表达式
    pub fn validate_cron(expr: &str) -> Result<Schedule> {
        Ok(Schedule::from_str(expr)?)
    }

    /// 计算计划的首次触发时间
    ///
    /// - `At`: 就是给定的时间点。
    /// - `Cron`: `start_at` (缺省为 `now`) 之后的第一次匹配。
    pub fn first_trigger(spec: &TriggerSpec, now: f64) -> Result<Option<f64>> {
        match spec {
            TriggerSpec::At { at } => Ok(Some(*at)),
            TriggerSpec::Cron {
                expression,
                timezone,
                start_at,
            } => {
                let schedule = Self::validate_cron(expression)?;
                let base = start_at.unwrap_or(now);
                Ok(Self::cron_next(&schedule, timezone.as_deref(), base))
            }
        }
    }

    /// 计算 `base_time` 之后的下一次触发时间
    pub fn next_recurrence(spec: &TriggerSpec, base_time: f64) -> Option<f64> {
        match spec {
            // 一次性计划: 触发完就结束了
            TriggerSpec::At { .. } => None,
            TriggerSpec::Cron {
                expression,
                timezone,
                ..
            } => {
                let schedule = Schedule::from_str(expression).ok()?;
                Self::cron_next(&schedule, timezone.as_deref(), base_time)
            }
        }
    }

    fn cron_next(schedule: &Schedule, tz_str: Option<&str>, base_time: f64) -> Option<f64> {
        let tz: chrono_tz::Tz = tz_str
            .and_then(|s| s.parse().ok())
            .unwrap_or(chrono_tz::UTC);

        let base_dt = Self::f64_to_datetime(base_time, &tz)?;

        schedule
            .after(&base_dt)
            .next()
            .map(|dt| dt.with_timezone(&Utc).timestamp_millis() as f64 / 1000.0)
    }

    fn f64_to_datetime<T: TimeZone>(ts: f64, tz: &T) -> Option<DateTime<T>> {
        let secs = ts.floor() as i64;
        let nsecs = ((ts - secs as f64) * 1_000_000_000.0) as u32;
        tz.timestamp_opt(secs, nsecs).single()
    }
}

// ==========================================
// 时钟抽象 (Clock)
// ==========================================

/// 时钟接口
///
/// 引擎内所有 TTL 判断都通过它获取“现在”，测试里换成 `ManualClock` 即可拨动时间。
pub trait Clock: Send + Sync + 'static {
    /// 当前 Unix 时间戳 (秒)
    fn now(&self) -> f64;
}

/// 系统时钟
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        TimeUtils::now_f64()
    }
}

/// 手动时钟
///
/// 以 f64 的位模式存在原子变量里，多线程下读写无锁。
#[derive(Debug)]
pub struct ManualClock {
    bits: AtomicU64,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        Self {
            bits: AtomicU64::new(start.to_bits()),
        }
    }

    pub fn set(&self, now: f64) {
        self.bits.store(now.to_bits(), Ordering::SeqCst);
    }

    /// 向前拨动 `secs` 秒
    pub fn advance(&self, secs: f64) {
        let now = self.now();
        self.set(now + secs);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_trigger_is_returned_verbatim() {
        let spec = TriggerSpec::At { at: 1_700_000_000.0 };
        let first = TimeUtils::first_trigger(&spec, 0.0).unwrap();
        assert_eq!(first, Some(1_700_000_000.0));
        assert_eq!(TimeUtils::next_recurrence(&spec, 1_700_000_000.0), None);
    }

    #[test]
    fn cron_trigger_lands_after_base() {
        // 每天 07:30:00
        let spec = TriggerSpec::Cron {
            expression: "0 30 7 * * *".into(),
            timezone: None,
            start_at: None,
        };
        let now = 1_700_000_000.0;
        let first = TimeUtils::first_trigger(&spec, now).unwrap().unwrap();
        assert!(first > now);
        assert!(first - now <= 86_400.0);
        let next = TimeUtils::next_recurrence(&spec, first).unwrap();
        assert_eq!(next - first, 86_400.0);
    }

    #[test]
    fn invalid_cron_is_rejected() {
        let spec = TriggerSpec::Cron {
            expression: "not a cron".into(),
            timezone: None,
            start_at: None,
        };
        assert!(TimeUtils::first_trigger(&spec, 0.0).is_err());
    }

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(100.0);
        clock.advance(2.5);
        assert_eq!(clock.now(), 102.5);
    }
}
