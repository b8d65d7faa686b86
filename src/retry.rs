//! # 重试策略模块
//!
//! ## 设计思路
//!
//! 本处理器从不在内部重试：失败后只回答“是否值得再试一次”，
//! 由外层调度器结合固定重试预算决定是否重新入队。
//! 连通性未知时乐观放行（网络状态探测本身可能不可用），
//! 只有明确断网才拒绝重试。

use crate::handler::NetworkHandler;

/// 首次失败后允许的额外尝试次数。
pub const RETRY_BUDGET: u32 = 2;

/// 外部调度器提供的连通性信息。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectivityInfo {
    /// 当前是否存在活动连接。
    pub connected: bool,
}

impl NetworkHandler {
    /// 固定重试预算。
    pub fn retry_budget(&self) -> u32 {
        RETRY_BUDGET
    }

    /// 本处理器支持请求重放（瞬态失败后可重新提交）。
    pub fn supports_replay(&self) -> bool {
        true
    }

    /// 失败后是否值得再试。
    ///
    /// 离线开关只作接口对齐保留，不影响判定：连通性信息缺失或
    /// 报告已连接时重试，明确断网时不重试。
    pub fn should_retry(
        &self,
        _is_offline_override: bool,
        connectivity: Option<&ConnectivityInfo>,
    ) -> bool {
        connectivity.map_or(true, |info| info.connected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HandlerConfig;
    use crate::downloader::Downloader;
    use crate::error::HandlerError;
    use crate::source::FetchResponse;

    struct NeverServes;

    impl Downloader for NeverServes {
        fn load(
            &self,
            _uri: &str,
            _local_cache_only: bool,
        ) -> Result<Option<FetchResponse>, HandlerError> {
            Ok(None)
        }
    }

    fn handler() -> NetworkHandler {
        NetworkHandler::new(Box::new(NeverServes), HandlerConfig::default())
    }

    #[test]
    fn retries_when_connectivity_is_unknown() {
        assert!(handler().should_retry(false, None));
        assert!(handler().should_retry(true, None));
    }

    #[test]
    fn retries_when_connected() {
        let info = ConnectivityInfo { connected: true };
        assert!(handler().should_retry(false, Some(&info)));
    }

    #[test]
    fn does_not_retry_when_definitively_disconnected() {
        let info = ConnectivityInfo { connected: false };
        assert!(!handler().should_retry(false, Some(&info)));
        assert!(!handler().should_retry(true, Some(&info)));
    }

    #[test]
    fn declares_fixed_budget_and_replay_support() {
        assert_eq!(handler().retry_budget(), 2);
        assert!(handler().supports_replay());
    }
}
