use tracing::debug;

use crate::{
    common::{error::Result, model::ScheduleKey},
    engine::{FireOutcome, ScheduleGateway},
    router::{
        event::{ScheduleAck, ScheduleTrigger},
        handlers::{CommandHandler, CommandOutcome},
    },
};

/// 计划触发的处理结果
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerOutcome {
    /// 生成了新指令，附带它的处理结果
    Fired(CommandOutcome),
    /// 已转交协作通道
    Companion,
    Dropped,
}

/// 计划确认的处理结果
#[derive(Debug, Clone, PartialEq)]
pub enum AckOutcome {
    Recorded(ScheduleKey),
    /// 没有对应的计划
    Unknown,
}

/// 计划触发与确认 Handler
#[derive(Clone)]
pub struct ScheduleHandler {
    gateway: ScheduleGateway,
    commands: CommandHandler,
}

impl ScheduleHandler {
    pub fn new(gateway: ScheduleGateway, commands: CommandHandler) -> Self {
        Self { gateway, commands }
    }

    pub async fn on_trigger(&self, trigger: ScheduleTrigger) -> Result<TriggerOutcome> {
        match self.gateway.fire(&trigger).await? {
            // 和新提交的指令走同一条路，包括引擎保护
            FireOutcome::Fired { envelope, one_shot } => {
                let outcome = self.commands.submit(*envelope).await?;
                debug!(scheduler_key = %trigger.scheduler_key, ?outcome, "scheduled command submitted");
                if let Some(key) = one_shot {
                    self.gateway.retire(&key).await?;
                }
                Ok(TriggerOutcome::Fired(outcome))
            }
            FireOutcome::Companion => Ok(TriggerOutcome::Companion),
            FireOutcome::Dropped => Ok(TriggerOutcome::Dropped),
        }
    }

    pub async fn on_ack(&self, ack: ScheduleAck) -> Result<AckOutcome> {
        Ok(match self.gateway.acknowledge(&ack).await? {
            Some(record) => AckOutcome::Recorded(record.key),
            None => AckOutcome::Unknown,
        })
    }
}
