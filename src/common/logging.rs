//! 日志初始化
//!
//! 全进程只初始化一次，重复调用是安全的。

use std::sync::Once;
use tracing_subscriber::{EnvFilter, util::SubscriberInitExt};

/// 日志输出模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    /// 人类可读，默认 debug
    Development,
    /// JSON 行，默认 info
    Production,
    /// 测试: 不输出
    Test,
}

static INIT_ONCE: Once = Once::new();

/// 初始化 tracing 订阅者
///
/// `RUST_LOG` 优先于默认过滤规则。
pub fn init(profile: Profile) {
    INIT_ONCE.call_once(|| match profile {
        Profile::Development => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(
                    EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| EnvFilter::new("remote_ops=debug")),
                )
                .finish()
                .try_init();
        }
        Profile::Production => {
            let _ = tracing_subscriber::fmt()
                .json()
                .with_env_filter(
                    EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| EnvFilter::new("remote_ops=info")),
                )
                .finish()
                .try_init();
        }
        Profile::Test => {
            // 已经有人装过订阅者时静默跳过
            let _ = tracing_subscriber::registry().try_init();
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init(Profile::Test);
        init(Profile::Test);
        init(Profile::Development);
    }
}
