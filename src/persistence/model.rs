use crate::common::model::{CommandRecord, CommandStatus};

/// 创建结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    /// 新建成功
    Created(String),
    /// 同一入站事件已经创建过记录 (重复投递)
    Existing(String),
}

impl CreateOutcome {
    pub fn id(&self) -> &str {
        match self {
            CreateOutcome::Created(id) | CreateOutcome::Existing(id) => id,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, CreateOutcome::Created(_))
    }
}

/// 追加历史的结果
#[derive(Debug, Clone, PartialEq)]
pub enum AppendOutcome {
    /// 追加成功，附带追加后的记录
    Appended(Box<CommandRecord>),
    /// 同一事件已经追加过
    Duplicate(Box<CommandRecord>),
    /// 没有匹配的记录
    NotFound,
}

/// 状态变更结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusChange {
    /// 已生效
    Applied,
    /// 与当前状态相同
    Unchanged,
    /// 当前已是终态，拒绝变更
    Rejected { current: CommandStatus },
}

impl StatusChange {
    /// 按单调规则计算一次状态变更
    pub fn evaluate(current: CommandStatus, next: CommandStatus) -> Self {
        if current == next {
            StatusChange::Unchanged
        } else if current.can_transition_to(next) {
            StatusChange::Applied
        } else {
            StatusChange::Rejected { current }
        }
    }
}
