use tracing::{debug, info};

use crate::{
    common::{
        error::Result,
        model::{CommandEnvelope, EngineState, ResponseStatus},
    },
    engine::EngineContext,
};

const STARTED: &str = "STARTED";

/// 引擎保护的判定结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// 正常转发
    Forward,
    /// 拦截：没有找到之前的启动标记
    Block,
}

/// 引擎保护 (Engine-Safety Gate)
///
/// 启动成功后给车辆打一个带 TTL 的标记；熄火请求只有在标记存在时才会下发。
/// 熄火成功后清除标记。功能关闭时一律放行。
#[derive(Clone)]
pub struct EngineSafetyGate {
    ctx: EngineContext,
}

impl EngineSafetyGate {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    /// 标记键 `<prefix>vehicleId`
    pub fn marker_key(&self, vehicle_id: &str) -> String {
        format!("{}{}", self.ctx.config.engine_safety.key_prefix, vehicle_id)
    }

    pub async fn is_started(&self, vehicle_id: &str) -> Result<bool> {
        Ok(self
            .ctx
            .cache
            .get(&self.marker_key(vehicle_id))
            .await?
            .is_some_and(|v| v == STARTED))
    }

    /// 判断一条指令能否下发
    pub async fn check(&self, envelope: &CommandEnvelope) -> Result<GateDecision> {
        if !self.ctx.config.engine_safety.enabled {
            return Ok(GateDecision::Forward);
        }
        if envelope.command.engine_state() != Some(EngineState::Stopped) {
            return Ok(GateDecision::Forward);
        }
        if self.is_started(&envelope.vehicle_id).await? {
            Ok(GateDecision::Forward)
        } else {
            info!(
                vehicle_id = %envelope.vehicle_id,
                request_id = %envelope.request_id,
                "engine stop without a start marker, blocking"
            );
            Ok(GateDecision::Block)
        }
    }

    /// 根据引擎指令的成功回执维护标记
    pub async fn observe(
        &self,
        vehicle_id: &str,
        engine_state: Option<EngineState>,
        status: ResponseStatus,
    ) -> Result<()> {
        if !self.ctx.config.engine_safety.enabled || status != ResponseStatus::Success {
            return Ok(());
        }
        let key = self.marker_key(vehicle_id);
        match engine_state {
            Some(EngineState::Started) => {
                debug!(vehicle_id, "set engine start marker");
                self.ctx
                    .cache
                    .put(&key, STARTED, self.ctx.config.marker_ttl())
                    .await
            }
            Some(EngineState::Stopped) => {
                debug!(vehicle_id, "clear engine start marker");
                self.ctx.cache.delete(&key).await
            }
            None => Ok(()),
        }
    }
}
