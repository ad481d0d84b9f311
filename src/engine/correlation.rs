use tracing::{debug, warn};

use crate::{
    common::{
        error::Result,
        model::{CommandEnvelope, CorrelationEntry, correlation_key},
    },
    engine::{EngineContext, EngineMetrics},
};

/// 关联结果的来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrelationSource {
    Cache,
    /// 缓存未命中，从指令存储重建
    Store,
}

/// 关联服务 (Correlation Cache)
///
/// - 受理指令时把请求元数据写入 `requestId_vehicleId`。
/// - 回执到达时先查缓存，未命中再按 (requestId, vehicleId) 查存储并回填。
/// - 缓存只影响延迟，不影响结果：两条路径得到的元数据相同。
#[derive(Clone)]
pub struct CorrelationService {
    ctx: EngineContext,
}

impl CorrelationService {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    /// 缓存一条在途指令的元数据
    pub async fn remember(&self, envelope: &CommandEnvelope) -> Result<()> {
        let entry = CorrelationEntry::from(envelope);
        let json = serde_json::to_string(&entry)?;
        self.ctx
            .cache
            .put(
                &envelope.correlation_key(),
                &json,
                self.ctx.config.correlation_ttl(),
            )
            .await
    }

    /// 查找请求元数据
    ///
    /// 缓存里的脏数据按未命中处理，不会报错。
    pub async fn lookup(
        &self,
        request_id: &str,
        vehicle_id: &str,
    ) -> Result<Option<(CorrelationEntry, CorrelationSource)>> {
        let key = correlation_key(request_id, vehicle_id);

        if let Some(raw) = self.ctx.cache.get(&key).await? {
            match serde_json::from_str::<CorrelationEntry>(&raw) {
                Ok(entry) => {
                    EngineMetrics::inc(&self.ctx.metrics.correlation_hits);
                    return Ok(Some((entry, CorrelationSource::Cache)));
                }
                Err(e) => warn!(key = %key, error = %e, "corrupt correlation entry, falling back to store"),
            }
        }

        EngineMetrics::inc(&self.ctx.metrics.correlation_misses);
        let Some(record) = self.ctx.store.find_latest(request_id, vehicle_id).await? else {
            debug!(key = %key, "no record for correlation key");
            return Ok(None);
        };

        let entry = CorrelationEntry::from(&record.envelope);
        // 回填，尽力而为
        if !record.status.is_terminal() {
            if let Err(e) = self.remember(&record.envelope).await {
                warn!(key = %key, error = %e, "failed to refill correlation cache");
            }
        }
        Ok(Some((entry, CorrelationSource::Store)))
    }

    /// 终态后丢弃缓存
    pub async fn forget(&self, request_id: &str, vehicle_id: &str) -> Result<()> {
        self.ctx
            .cache
            .delete(&correlation_key(request_id, vehicle_id))
            .await
    }
}
