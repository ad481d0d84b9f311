use std::sync::Arc;

use tracing::debug;

use crate::{
    common::{Clock, RoConfig, SystemClock, error::Result, utils::get_hostname},
    engine::{EngineContext, EngineMetrics},
    outbound::{EventSink, MemorySink},
    persistence::{CommandStore, KvCache, MemoryPersistence, ScheduleStore, VehicleQueue},
    router::EventRouter,
};

/// 引擎构造器 (Builder Pattern)
///
/// **默认行为**:
/// - Config: Default
/// - Clock: SystemClock
/// - Persistence: 未设置的能力统一落到同一个 MemoryPersistence
/// - Sink: MemorySink
#[derive(Default)]
pub struct EngineBuilder {
    /// 节点ID名
    node_id: Option<String>,
    /// 全局配置
    config: Option<RoConfig>,
    store: Option<Arc<dyn CommandStore>>,
    schedules: Option<Arc<dyn ScheduleStore>>,
    cache: Option<Arc<dyn KvCache>>,
    queue: Option<Arc<dyn VehicleQueue>>,
    sink: Option<Arc<dyn EventSink>>,
    clock: Option<Arc<dyn Clock>>,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置节点 ID (如果不设，使用主机名)
    pub fn with_node_id(mut self, id: impl Into<String>) -> Self {
        self.node_id = Some(id.into());
        self
    }

    pub fn with_config(mut self, config: RoConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// 一次设置全部四种存储能力
    ///
    /// 这里接收一个同时实现了四个 trait 的具体类型 `P`，
    /// 包装为 `Arc` 后分别强转为各自的 trait object，内部共享同一份数据。
    pub fn with_persistence<P>(mut self, persistence: P) -> Self
    where
        P: CommandStore + ScheduleStore + KvCache + VehicleQueue,
    {
        let arc = Arc::new(persistence);
        self.store = Some(arc.clone());
        self.schedules = Some(arc.clone());
        self.cache = Some(arc.clone());
        self.queue = Some(arc);
        self
    }

    pub fn with_store<S: CommandStore>(mut self, store: S) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    pub fn with_schedule_store<S: ScheduleStore>(mut self, schedules: S) -> Self {
        self.schedules = Some(Arc::new(schedules));
        self
    }

    pub fn with_cache<C: KvCache>(mut self, cache: C) -> Self {
        self.cache = Some(Arc::new(cache));
        self
    }

    pub fn with_queue<Q: VehicleQueue>(mut self, queue: Q) -> Self {
        self.queue = Some(Arc::new(queue));
        self
    }

    pub fn with_sink<S: EventSink>(mut self, sink: S) -> Self {
        self.sink = Some(Arc::new(sink));
        self
    }

    /// 注入时钟 (测试里传 `Arc<ManualClock>`)
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// 构建事件路由
    ///
    /// 配置校验失败时返回 `RoError::Config`。
    pub fn build(self) -> Result<EventRouter> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let node_id = self.node_id.unwrap_or_else(get_hostname);
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);

        // 缺省的存储能力共用一个内存实例
        let memory = Arc::new(MemoryPersistence::with_clock(clock.clone()));
        if self.store.is_none()
            || self.schedules.is_none()
            || self.cache.is_none()
            || self.queue.is_none()
        {
            debug!("EngineBuilder using MemoryPersistence for missing capabilities");
        }
        let store = self.store.unwrap_or_else(|| memory.clone() as Arc<dyn CommandStore>);
        let schedules = self.schedules.unwrap_or_else(|| memory.clone() as Arc<dyn ScheduleStore>);
        let cache = self.cache.unwrap_or_else(|| memory.clone() as Arc<dyn KvCache>);
        let queue = self.queue.unwrap_or_else(|| memory as Arc<dyn VehicleQueue>);

        let sink = self.sink
            .unwrap_or_else(|| Arc::new(MemorySink::new()) as Arc<dyn EventSink>);

        let ctx = EngineContext {
            node_id,
            config: Arc::new(config),
            store,
            schedules,
            cache,
            queue,
            sink,
            clock,
            metrics: Arc::new(EngineMetrics::default()),
        };
        Ok(EventRouter::new(ctx))
    }
}
