pub mod core;
pub mod event;
pub mod handlers;

pub use self::core::{EventRouter, RouteOutcome};
pub use event::{InboundEvent, ScheduleAck, ScheduleTrigger, TriggerTarget, VehicleDeprovisioned};
