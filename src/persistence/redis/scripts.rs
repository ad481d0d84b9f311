use deadpool_redis::redis::Script;

/// Redis Lua 脚本库
///
/// 预加载所有脚本，避免每次调用时重新编译。
#[derive(Debug, Clone)]
pub(super) struct Scripts {
    pub create: Script,
    pub append: Script,
    pub status: Script,
    pub deactivate: Script,
    pub schedule_insert: Script,
    pub poll_head: Script,
    pub mark_head: Script,
}

impl Scripts {
    pub fn new() -> Self {
        Self {
            create: Script::new(include_str!("../../scripts/redis_create.lua")),
            append: Script::new(include_str!("../../scripts/redis_append.lua")),
            status: Script::new(include_str!("../../scripts/redis_status.lua")),
            deactivate: Script::new(include_str!("../../scripts/redis_deactivate.lua")),
            schedule_insert: Script::new(include_str!("../../scripts/redis_schedule_insert.lua")),
            poll_head: Script::new(include_str!("../../scripts/redis_poll_head.lua")),
            mark_head: Script::new(include_str!("../../scripts/redis_mark_head.lua")),
        }
    }
}
