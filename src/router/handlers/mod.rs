pub mod command;
pub mod deprovision;
pub mod failure;
pub mod response;
pub mod schedule;

use std::sync::Arc;

use tracing::debug;

use crate::{
    common::{
        error::Result,
        model::{CorrelationEntry, DeviceResponse, NotificationRecord},
    },
    engine::{EngineContext, EngineMetrics, NotificationResolver, Resolution},
    outbound::{CorrelatedResponse, NotificationEvent, OutboundEvent},
};

pub use command::{CommandHandler, CommandOutcome};
pub use deprovision::{DeprovisionHandler, DeprovisionReport};
pub use failure::{FailureHandler, FailureOutcome};
pub use response::{ResponseHandler, ResponseOutcome};
pub use schedule::{AckOutcome, ScheduleHandler, TriggerOutcome};

/// 回执发布器
///
/// 回执、投递失败、引擎保护三条路径共用：发布关联回执，解析并发送通知，写通知历史。
#[derive(Clone)]
pub struct ReplyPublisher {
    ctx: EngineContext,
    resolver: Arc<NotificationResolver>,
}

impl ReplyPublisher {
    pub fn new(ctx: EngineContext, resolver: Arc<NotificationResolver>) -> Self {
        Self { ctx, resolver }
    }

    pub fn resolver(&self) -> &NotificationResolver {
        &self.resolver
    }

    /// 路由限定符 `<prefix>_<COMMAND_KIND>_<ORIGIN>` (大写)
    pub fn qualifier(&self, command_kind: &str, origin: &str) -> String {
        format!(
            "{}_{}_{}",
            self.ctx.config.routing.response_qualifier_prefix, command_kind, origin
        )
        .to_uppercase()
    }

    /// 发布关联回执
    pub async fn publish_response(
        &self,
        record_id: &str,
        entry: &CorrelationEntry,
        response: &DeviceResponse,
        synthetic: bool,
    ) -> Result<()> {
        self.ctx
            .publish(OutboundEvent::Response(CorrelatedResponse {
                record_id: record_id.to_string(),
                qualifier: self.qualifier(&entry.command_kind, &entry.origin),
                command_kind: entry.command_kind.clone(),
                origin: entry.origin.clone(),
                user_id: entry.user_id.clone(),
                response: response.clone(),
                synthetic,
            }))
            .await
    }

    /// 发送通知并写入记录的通知历史
    pub async fn notify(
        &self,
        record_id: &str,
        entry: &CorrelationEntry,
        response: &DeviceResponse,
        resolution: Resolution,
    ) -> Result<String> {
        debug!(
            vehicle_id = %response.vehicle_id,
            request_id = %response.request_id,
            template_id = %resolution.template_id,
            "send notification"
        );
        self.ctx
            .publish(OutboundEvent::Notification(NotificationEvent {
                record_id: record_id.to_string(),
                template_id: resolution.template_id.clone(),
                status: resolution.status.clone(),
                request_id: response.request_id.clone(),
                vehicle_id: response.vehicle_id.clone(),
                user_id: entry.user_id.clone(),
            }))
            .await?;
        self.ctx
            .store
            .append_notification(
                record_id,
                &NotificationRecord {
                    template_id: resolution.template_id.clone(),
                    status: resolution.status,
                    sent_at: self.ctx.now(),
                },
            )
            .await?;
        EngineMetrics::inc(&self.ctx.metrics.notifications_sent);
        Ok(resolution.template_id)
    }

    /// 发布回执，并按映射表发送通知
    ///
    /// 返回发送的通知模板 (没有发送时为 `None`)。
    pub async fn reply(
        &self,
        record_id: &str,
        entry: &CorrelationEntry,
        response: &DeviceResponse,
        synthetic: bool,
    ) -> Result<Option<String>> {
        self.publish_response(record_id, entry, response, synthetic)
            .await?;
        match self.resolver.resolve_response(response, entry) {
            Some(resolution) => self
                .notify(record_id, entry, response, resolution)
                .await
                .map(Some),
            None => Ok(None),
        }
    }
}
