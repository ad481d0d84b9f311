use std::collections::HashMap;

use async_trait::async_trait;

use super::core::RedisPersistence;
use crate::common::TimeUtils;
use crate::common::error::{Result, RoError};
use crate::common::model::{
    COMMAND_SCHEMA_VERSION, CommandRecord, CommandStatus, DeliveryFailure, DeviceResponse,
    NotificationRecord, correlation_key,
};
use crate::persistence::model::{AppendOutcome, CreateOutcome, StatusChange};
use crate::persistence::traits::CommandStore;
use deadpool_redis::redis::{self, AsyncCommands};

const RESPONSES: &str = "responses";
const FAILURES: &str = "failures";
const NOTIFICATIONS: &str = "notifications";

impl RedisPersistence {
    /// 关联索引里最新的记录 ID
    async fn latest_id(&self, request_id: &str, vehicle_id: &str) -> Result<Option<String>> {
        let mut conn = self.pool.get().await?;
        let id: Option<String> = conn
            .lindex(self.key_correlation(&correlation_key(request_id, vehicle_id)), 0)
            .await?;
        Ok(id)
    }

    /// 调用 append 脚本，把一条历史追加到指定列表
    async fn append_history(
        &self,
        request_id: &str,
        vehicle_id: &str,
        list: &str,
        marker: String,
        json: String,
    ) -> Result<AppendOutcome> {
        let Some(id) = self.latest_id(request_id, vehicle_id).await? else {
            return Ok(AppendOutcome::NotFound);
        };

        let mut conn = self.pool.get().await?;
        // KEYS[1]: record hash, KEYS[2]: history list, KEYS[3]: seen set
        // ARGV[1]: marker, ARGV[2]: json, ARGV[3]: now
        let code: i64 = self
            .scripts
            .append
            .key(self.key_cmd(&id))
            .key(self.key_cmd_history(&id, list))
            .key(self.key_cmd_seen(&id))
            .arg(marker)
            .arg(json)
            .arg(TimeUtils::now_f64())
            .invoke_async(&mut conn)
            .await?;
        drop(conn);

        let record = match code {
            -1 => return Ok(AppendOutcome::NotFound),
            _ => match CommandStore::load(self, &id).await? {
                Some(r) => Box::new(r),
                None => return Ok(AppendOutcome::NotFound),
            },
        };
        Ok(if code == 1 {
            AppendOutcome::Appended(record)
        } else {
            AppendOutcome::Duplicate(record)
        })
    }
}

/// 把 Hash 字段和三条历史列表还原成记录
fn decode_record(
    id: &str,
    fields: HashMap<String, String>,
    responses: Vec<String>,
    failures: Vec<String>,
    notifications: Vec<String>,
) -> Result<CommandRecord> {
    let field = |name: &str| {
        fields
            .get(name)
            .ok_or_else(|| RoError::Persistence(format!("record {} missing field {}", id, name)))
    };
    let float = |name: &str| -> Result<f64> {
        field(name)?
            .parse::<f64>()
            .map_err(|e| RoError::Persistence(format!("record {} field {}: {}", id, name, e)))
    };

    let status_raw = field("status")?;
    let status = CommandStatus::parse(status_raw)
        .ok_or_else(|| RoError::Persistence(format!("record {} bad status {}", id, status_raw)))?;

    Ok(CommandRecord {
        id: id.to_string(),
        schema_version: fields
            .get("schema_version")
            .and_then(|v| v.parse().ok())
            .unwrap_or(COMMAND_SCHEMA_VERSION),
        envelope: serde_json::from_str(field("envelope")?)?,
        status,
        responses: responses
            .iter()
            .map(|s| serde_json::from_str(s))
            .collect::<serde_json::Result<_>>()?,
        failures: failures
            .iter()
            .map(|s| serde_json::from_str(s))
            .collect::<serde_json::Result<_>>()?,
        notifications: notifications
            .iter()
            .map(|s| serde_json::from_str(s))
            .collect::<serde_json::Result<_>>()?,
        active: fields.get("active").map(|v| v == "1").unwrap_or(true),
        created_at: float("created_at")?,
        updated_at: float("updated_at")?,
    })
}

#[async_trait]
impl CommandStore for RedisPersistence {
    async fn create(&self, record: CommandRecord) -> Result<CreateOutcome> {
        let mut conn = self.pool.get().await?;
        let envelope = serde_json::to_string(&record.envelope)?;

        // 去重 + 写 Hash + 写索引 在同一个脚本里完成
        let (created, id): (i64, String) = self
            .scripts
            .create
            .key(self.key_event(&record.envelope.event_id))
            .key(self.key_cmd(&record.id))
            .key(self.key_correlation(&record.envelope.correlation_key()))
            .key(self.key_vehicle_cmds(&record.envelope.vehicle_id))
            .arg(&record.id)
            .arg(envelope)
            .arg(record.status.as_str())
            .arg(&record.envelope.payload.user_id)
            .arg(record.created_at)
            .arg(record.schema_version)
            .invoke_async(&mut conn)
            .await?;

        Ok(if created == 1 {
            CreateOutcome::Created(id)
        } else {
            CreateOutcome::Existing(id)
        })
    }

    async fn load(&self, id: &str) -> Result<Option<CommandRecord>> {
        let mut conn = self.pool.get().await?;

        let (fields, responses, failures, notifications): (
            HashMap<String, String>,
            Vec<String>,
            Vec<String>,
            Vec<String>,
        ) = redis::pipe()
            .hgetall(self.key_cmd(id))
            .lrange(self.key_cmd_history(id, RESPONSES), 0, -1)
            .lrange(self.key_cmd_history(id, FAILURES), 0, -1)
            .lrange(self.key_cmd_history(id, NOTIFICATIONS), 0, -1)
            .query_async(&mut conn)
            .await?;

        if fields.is_empty() {
            return Ok(None);
        }
        decode_record(id, fields, responses, failures, notifications).map(Some)
    }

    async fn find_latest(
        &self,
        request_id: &str,
        vehicle_id: &str,
    ) -> Result<Option<CommandRecord>> {
        match self.latest_id(request_id, vehicle_id).await? {
            Some(id) => CommandStore::load(self, &id).await,
            None => Ok(None),
        }
    }

    async fn append_response(&self, response: &DeviceResponse) -> Result<AppendOutcome> {
        self.append_history(
            &response.request_id,
            &response.vehicle_id,
            RESPONSES,
            format!("r:{}", response.event_id),
            serde_json::to_string(response)?,
        )
        .await
    }

    async fn append_failure(&self, failure: &DeliveryFailure) -> Result<AppendOutcome> {
        self.append_history(
            &failure.request_id,
            &failure.vehicle_id,
            FAILURES,
            format!("f:{}", failure.event_id),
            serde_json::to_string(failure)?,
        )
        .await
    }

    async fn append_notification(
        &self,
        id: &str,
        notification: &NotificationRecord,
    ) -> Result<()> {
        let mut conn = self.pool.get().await?;
        let mut pipe = redis::pipe();
        pipe.rpush(
            self.key_cmd_history(id, NOTIFICATIONS),
            serde_json::to_string(notification)?,
        );
        pipe.hset(self.key_cmd(id), "updated_at", TimeUtils::now_f64());
        pipe.query_async::<()>(&mut conn).await?;
        Ok(())
    }

    async fn set_status(&self, id: &str, status: CommandStatus) -> Result<StatusChange> {
        let mut conn = self.pool.get().await?;

        // 状态 CAS：只有 PENDING 可以流转到终态
        let reply: Vec<String> = self
            .scripts
            .status
            .key(self.key_cmd(id))
            .arg(status.as_str())
            .arg(CommandStatus::Pending.as_str())
            .arg(TimeUtils::now_f64())
            .invoke_async(&mut conn)
            .await?;

        match reply.first().map(String::as_str) {
            Some("APPLIED") => Ok(StatusChange::Applied),
            Some("UNCHANGED") => Ok(StatusChange::Unchanged),
            Some("REJECTED") => {
                let current = reply
                    .get(1)
                    .and_then(|s| CommandStatus::parse(s))
                    .ok_or_else(|| RoError::Persistence(format!("record {} bad status", id)))?;
                Ok(StatusChange::Rejected { current })
            }
            _ => Err(RoError::RecordNotFound(id.to_string())),
        }
    }

    async fn deactivate(&self, vehicle_id: &str, user_id: &str) -> Result<usize> {
        let mut conn = self.pool.get().await?;
        let count: usize = self
            .scripts
            .deactivate
            .key(self.key_vehicle_cmds(vehicle_id))
            .arg(self.key_cmd_prefix())
            .arg(user_id)
            .arg(TimeUtils::now_f64())
            .invoke_async(&mut conn)
            .await?;
        Ok(count)
    }
}
