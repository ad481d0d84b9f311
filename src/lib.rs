// 1. 基础模块
pub mod common;

// 2. 存储能力与实现
pub mod persistence;

// 3. 引擎组件
pub mod engine;

// 4. 入站路由与出站副作用
pub mod outbound;
pub mod router;

pub use common::{Result, RoConfig, RoError};
pub use engine::EngineBuilder;
pub use router::{EventRouter, InboundEvent, RouteOutcome};
