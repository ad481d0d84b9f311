use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::event::{CorrelatedResponse, DeviceCommand, NotificationEvent, OutboundEvent};
use crate::common::error::Result;

/// 出站通道
///
/// 宿主把它接到真实的事件总线上。发布失败会向上返回，由宿主的重投递机制兜底。
#[async_trait]
pub trait EventSink: Send + Sync + 'static {
    async fn publish(&self, event: OutboundEvent) -> Result<()>;
}

// ==========================================
// MemorySink: 进程内记录
// ==========================================

/// 把出站事件按顺序记在内存里
///
/// Clone 共享同一个缓冲区，测试里可以先 clone 一份交给引擎，再从原件读取。
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<OutboundEvent>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// 全部事件快照
    pub fn events(&self) -> Vec<OutboundEvent> {
        self.events.lock().clone()
    }

    /// 取走全部事件
    pub fn drain(&self) -> Vec<OutboundEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    pub fn device_commands(&self) -> Vec<DeviceCommand> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                OutboundEvent::DeviceCommand(c) => Some(c.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn responses(&self) -> Vec<CorrelatedResponse> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                OutboundEvent::Response(r) => Some(r.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn notifications(&self) -> Vec<NotificationEvent> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                OutboundEvent::Notification(n) => Some(n.clone()),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl EventSink for MemorySink {
    async fn publish(&self, event: OutboundEvent) -> Result<()> {
        self.events.lock().push(event);
        Ok(())
    }
}

// ==========================================
// ChannelSink: 交给宿主的异步消费者
// ==========================================

/// 基于 tokio mpsc 的出站通道
///
/// 接收端被 Drop 后发布返回 `SinkClosed`。
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<OutboundEvent>,
}

impl ChannelSink {
    /// 创建通道，返回 (sink, 接收端)
    pub fn new() -> (Self, mpsc::UnboundedReceiver<OutboundEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn publish(&self, event: OutboundEvent) -> Result<()> {
        self.tx.send(event)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::RoError;
    use crate::common::model::ScheduleKey;
    use crate::outbound::event::ScheduleCancel;

    fn cancel() -> OutboundEvent {
        OutboundEvent::ScheduleCancel(ScheduleCancel {
            key: ScheduleKey::new("V1", "ENGINE", "morning"),
            schedule_id: None,
        })
    }

    #[tokio::test]
    async fn memory_sink_clones_share_buffer() {
        let sink = MemorySink::new();
        let handle = sink.clone();
        handle.publish(cancel()).await.unwrap();
        assert_eq!(sink.len(), 1);
        assert_eq!(sink.drain().len(), 1);
        assert!(handle.is_empty());
    }

    #[tokio::test]
    async fn channel_sink_reports_closed_receiver() {
        let (sink, rx) = ChannelSink::new();
        drop(rx);
        let err = sink.publish(cancel()).await.unwrap_err();
        assert!(matches!(err, RoError::SinkClosed));
    }
}
