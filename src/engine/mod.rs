pub mod builder;
pub mod context;
pub mod correlation;
pub mod metrics;
pub mod notify;
pub mod queue;
pub mod safety;
pub mod schedule;

pub use builder::EngineBuilder;
pub use context::EngineContext;
pub use correlation::{CorrelationService, CorrelationSource};
pub use metrics::{EngineMetrics, MetricsSnapshot};
pub use notify::{NotificationResolver, Resolution};
pub use queue::{AdvanceOutcome, CommandQueue, EnqueueOutcome, SweepReport};
pub use safety::{EngineSafetyGate, GateDecision};
pub use schedule::{FireOutcome, ScheduleGateway};
