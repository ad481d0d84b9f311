pub mod event;
pub mod sink;

pub use event::{
    CorrelatedResponse, DeviceCommand, NotificationEvent, OutboundEvent, ScheduleCancel,
    ScheduleCreate,
};
pub use sink::{ChannelSink, EventSink, MemorySink};
