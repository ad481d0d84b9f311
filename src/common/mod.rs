pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod time;
pub(crate) mod utils;

// 导出配置
pub use config::RoConfig;

// 导出错误类型
pub use error::{Result, RoError};

// 导出核心模型
pub use model::{
    CommandEnvelope, CommandPayload, CommandRecord, CommandState, CommandStatus,
    CorrelationEntry, CustomExtension, DeliveryFailure, DeviceResponse, NotificationRecord,
    QueueEntry, ResponseStatus, ScheduleAction, ScheduleKey, ScheduleRecord, ScheduleRequest,
    ScheduleStatus, TriggerSpec,
};

pub use time::{Clock, ManualClock, SystemClock, TimeUtils};

// 内部工具的快捷访问
pub(crate) use utils::{new_record_id, new_request_id};
