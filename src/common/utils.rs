use nanoid::nanoid;

// ==========================================
// ID 生成工具 (Identity Utilities)
// ==========================================

/// 只含字母数字，方便双击选中，也不会和 `_` 分隔的关联键冲突
const ALPHABET: [char; 62] = [
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i',
    'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z', 'A', 'B',
    'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K', 'L', 'M', 'N', 'O', 'P', 'Q', 'R', 'S', 'T', 'U',
    'V', 'W', 'X', 'Y', 'Z',
];

/// 生成指令记录 ID
#[inline]
pub fn new_record_id() -> String {
    nanoid!(21, &ALPHABET)
}

/// 为计划触发生成的新指令分配 requestId
#[inline]
pub fn new_request_id() -> String {
    format!("sched-{}", nanoid!(16, &ALPHABET))
}

/// 获取当前机器的主机名
///
/// 用于生成默认的节点 ID。
pub fn get_hostname() -> String {
    hostname::get()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|_| format!("node-{}", nanoid!(5, &ALPHABET)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_never_contain_separator() {
        for _ in 0..64 {
            assert!(!new_record_id().contains('_'));
            assert!(!new_request_id().contains('_'));
        }
    }
}
