use ahash::{HashMap, HashSet};

use crate::common::{
    config::{NotificationConfig, NotificationMapping},
    model::{CorrelationEntry, DeviceResponse},
};

/// 一次通知解析的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub template_id: String,
    pub status: String,
}

/// 通知解析器 (Notification Resolver)
///
/// 纯查表，不做 IO。来源不在白名单、或者没有映射时返回 `None`，从不报错。
///
/// 匹配规则:
/// 1. 自定义扩展的自由文本命中 `response_message_notifications` 时直接使用。
/// 2. 否则按回执码查 `mappings`，可选维度 (指令类型/车型架构/ECU) 为空表示通配，
///    命中维度最多的规则胜出，同分取配置里靠前的一条。
/// 3. 自定义扩展码没有任何规则时，退回用回执状态码再查一次。
#[derive(Debug, Clone)]
pub struct NotificationResolver {
    whitelist: HashSet<String>,
    by_code: HashMap<String, Vec<NotificationMapping>>,
    by_message: HashMap<String, String>,
    status: HashMap<String, String>,
}

impl NotificationResolver {
    pub fn new(config: &NotificationConfig) -> Self {
        let mut by_code: HashMap<String, Vec<NotificationMapping>> = HashMap::default();
        for m in &config.mappings {
            by_code.entry(m.code.clone()).or_default().push(m.clone());
        }
        Self {
            whitelist: config.origin_whitelist.iter().cloned().collect(),
            by_code,
            by_message: config
                .response_message_notifications
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            status: config
                .notification_status
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    /// 来源是否允许推送用户通知
    pub fn is_whitelisted(&self, origin: &str) -> bool {
        self.whitelist.contains(origin)
    }

    /// 按 (码, 指令类型, 车型架构, ECU) 查通知模板
    pub fn resolve(
        &self,
        code: &str,
        command_kind: &str,
        arch_type: Option<&str>,
        ecu_type: Option<&str>,
    ) -> Option<String> {
        let candidates = self.by_code.get(code)?;

        fn dim(rule: &Option<String>, actual: Option<&str>) -> Option<usize> {
            match rule {
                None => Some(0),
                Some(r) if Some(r.as_str()) == actual => Some(1),
                Some(_) => None,
            }
        }

        let mut best: Option<(usize, &NotificationMapping)> = None;
        for m in candidates {
            let score = dim(&m.command_kind, Some(command_kind))
                .zip(dim(&m.arch_type, arch_type))
                .zip(dim(&m.ecu_type, ecu_type))
                .map(|((a, b), c)| a + b + c);
            if let Some(score) = score {
                if best.is_none_or(|(s, _)| score > s) {
                    best = Some((score, m));
                }
            }
        }
        best.map(|(_, m)| m.notification_id.clone())
    }

    /// 模板对应的对外状态，未配置时退回给定默认值
    pub fn status_of(&self, template_id: &str, fallback: &str) -> String {
        self.status
            .get(template_id)
            .cloned()
            .unwrap_or_else(|| fallback.to_string())
    }

    /// 为一条关联后的回执解析通知
    pub fn resolve_response(
        &self,
        response: &DeviceResponse,
        entry: &CorrelationEntry,
    ) -> Option<Resolution> {
        if !self.is_whitelisted(&entry.origin) {
            return None;
        }

        let by_message = response
            .custom_extension
            .as_ref()
            .and_then(|ext| ext.message.as_ref())
            .and_then(|msg| self.by_message.get(msg).cloned());

        let template_id = by_message.or_else(|| {
            let lookup = |code: &str| {
                self.resolve(
                    code,
                    &entry.command_kind,
                    entry.arch_type.as_deref(),
                    entry.ecu_type.as_deref(),
                )
            };
            lookup(response.resolution_code()).or_else(|| {
                if response.custom_extension.is_some() {
                    lookup(response.status.as_str())
                } else {
                    None
                }
            })
        })?;

        Some(Resolution {
            status: self.status_of(&template_id, response.status.as_str()),
            template_id,
        })
    }

    /// 直接使用指定模板 (如引擎保护的固定通知)，仍然受白名单约束
    pub fn fixed(&self, template_id: &str, origin: &str, fallback_status: &str) -> Option<Resolution> {
        if !self.is_whitelisted(origin) {
            return None;
        }
        Some(Resolution {
            template_id: template_id.to_string(),
            status: self.status_of(template_id, fallback_status),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::RoConfig;
    use crate::common::model::{CustomExtension, ResponseStatus};

    fn entry(origin: &str, kind: &str) -> CorrelationEntry {
        CorrelationEntry {
            command_kind: kind.into(),
            state: "STARTED".into(),
            origin: origin.into(),
            user_id: "U1".into(),
            partner_id: None,
            ecu_type: None,
            arch_type: None,
        }
    }

    fn response(status: ResponseStatus, ext: Option<CustomExtension>) -> DeviceResponse {
        DeviceResponse {
            event_id: "e1".into(),
            vehicle_id: "V1".into(),
            request_id: "R1".into(),
            biz_transaction_id: "B1".into(),
            timestamp: 0.0,
            status,
            custom_extension: ext,
        }
    }

    #[test]
    fn most_specific_rule_wins() {
        let resolver = NotificationResolver::new(&RoConfig::new_dev().notification);
        assert_eq!(
            resolver.resolve("SUCCESS", "ENGINE", None, None).as_deref(),
            Some("RO_ENGINE_SUCCESS")
        );
        assert_eq!(
            resolver.resolve("SUCCESS", "DOORS", None, None).as_deref(),
            Some("RO_GENERIC_SUCCESS")
        );
        assert_eq!(resolver.resolve("UNKNOWN_CODE", "DOORS", None, None), None);
    }

    #[test]
    fn non_whitelisted_origin_is_silent() {
        let resolver = NotificationResolver::new(&RoConfig::new_dev().notification);
        let r = response(ResponseStatus::Success, None);
        assert!(resolver.resolve_response(&r, &entry("BATCH_JOB", "ENGINE")).is_none());
        let hit = resolver
            .resolve_response(&r, &entry("MOBILE_APP", "ENGINE"))
            .unwrap();
        assert_eq!(hit.template_id, "RO_ENGINE_SUCCESS");
        assert_eq!(hit.status, "SUCCESS");
    }

    #[test]
    fn custom_extension_message_takes_precedence() {
        let mut cfg = RoConfig::new_dev().notification;
        cfg.response_message_notifications
            .insert("Door ajar".into(), "RO_DOOR_AJAR".into());
        let resolver = NotificationResolver::new(&cfg);

        let ext = CustomExtension {
            code: "X_42".into(),
            message: Some("Door ajar".into()),
        };
        let hit = resolver
            .resolve_response(&response(ResponseStatus::Fail, Some(ext)), &entry("PORTAL", "DOORS"))
            .unwrap();
        assert_eq!(hit.template_id, "RO_DOOR_AJAR");
        // 未配置状态时退回回执状态
        assert_eq!(hit.status, "FAIL");
    }

    #[test]
    fn unknown_extension_code_falls_back_to_status() {
        let resolver = NotificationResolver::new(&RoConfig::new_dev().notification);
        let ext = CustomExtension {
            code: "X_99".into(),
            message: None,
        };
        let hit = resolver
            .resolve_response(&response(ResponseStatus::Fail, Some(ext)), &entry("PORTAL", "DOORS"))
            .unwrap();
        assert_eq!(hit.template_id, "RO_GENERIC_FAIL");
    }
}
