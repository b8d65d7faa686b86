//! # 下载统计协作方
//!
//! ## 设计思路
//!
//! 字节数上报是尽力而为的旁路动作：接口不可失败、不可阻塞获取链路。
//! 以 trait 注入，生产侧可接任意指标系统，测试侧用记录型实现断言调用。

/// 下载统计协作方接口。
///
/// 实现必须快速返回；上报失败对获取链路不可见。
pub trait DownloadStats {
    /// 一次网络传输完成，上报声明的字节数。
    fn download_finished(&self, bytes: u64);
}

/// 空实现：不接指标系统时的默认协作方。
pub struct NoopStats;

impl DownloadStats for NoopStats {
    fn download_finished(&self, _bytes: u64) {}
}

/// 仅写日志的实现，便于本地诊断。
pub struct LogStats;

impl DownloadStats for LogStats {
    fn download_finished(&self, bytes: u64) {
        log::debug!("📊 下载完成 - {} bytes", bytes);
    }
}
