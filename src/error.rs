//! # 错误模型模块
//!
//! ## 设计思路
//!
//! 使用单一错误枚举承载获取与解码链路中的所有错误来源，避免字符串拼接式错误处理。
//! 通过 `thiserror` 保持人类可读错误，同时让调用侧可按分支匹配。
//!
//! 本层不区分“永久失败”：网络环境是主要失败原因，所有错误都视为潜在瞬态，
//! 由外层调度器按重试预算决定是否重放请求。“无法服务”不走错误通道，
//! 以 `Ok(None)` 表达，让流水线尝试下一个处理器。

/// 获取与解码链路统一错误类型。
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("网络错误：{0}")]
    Network(String),

    #[error("IO 错误：{0}")]
    Io(String),

    #[error("解码错误：{0}")]
    Decode(String),

    #[error("格式错误：{0}")]
    InvalidFormat(String),

    #[error("资源限制：{0}")]
    ResourceLimit(String),
}

impl From<std::io::Error> for HandlerError {
    /// 流读取与标记回退失败统一映射为 IO 错误。
    fn from(error: std::io::Error) -> Self {
        HandlerError::Io(error.to_string())
    }
}

impl From<HandlerError> for String {
    /// 兼容部分仍使用字符串错误的调用点。
    fn from(error: HandlerError) -> Self {
        error.to_string()
    }
}
