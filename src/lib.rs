//! # 网络图片获取与解码核心 — 库入口
//!
//! ## 架构总览
//!
//! ```text
//! NetworkHandler::fetch
//!     ├─ Downloader::load      获取响应（缓存或网络）
//!     ├─ DownloadStats         网络来源且长度已知时上报字节数
//!     ├─ MarkableReader        包装流，支持窥视与回退
//!     ├─ sniff                 GIF → 整流透传
//!     └─ decode_stream         WebP 整体缓冲 / 两遍有界解码
//! ```
//!
//! 传输与统计以 trait 注入，重试裁决交给外层调度器，
//! 核心只负责编排、嗅探与有界解码。
//!
//! ## 模块职责
//!
//! | 模块 | 职责 |
//! |------|------|
//! | `error` | 统一错误类型 `HandlerError`，区分可重试与不可重试失败 |
//! | `config` | 运行时可调的资源上限、超时与解码参数 |
//! | `source` | 请求与响应的数据模型（载荷、来源标记） |
//! | `stream` | `MarkableReader`：线性流上的标记 / 回退窗口 |
//! | `sniff` | 魔数嗅探（GIF / WebP），纯窥视不消费流 |
//! | `decode` | 两遍有界解码：探测尺寸 → 计算缩减因子 → 解码缩放 |
//! | `handler` | `NetworkHandler` 编排核心与配置管理 |
//! | `retry` | 重试预算与基于连通性的重试裁决 |
//! | `downloader` | 传输协作方接口与默认 HTTP 实现 |
//! | `stats` | 下载字节数统计协作方 |

mod config;
mod decode;
mod downloader;
mod error;
mod handler;
mod retry;
mod sniff;
mod source;
mod stats;
mod stream;

pub use config::{DecodeConfig, HandlerConfig, PixelFormat};
pub use downloader::{Downloader, HttpDownloader};
pub use error::HandlerError;
pub use handler::NetworkHandler;
pub use retry::{ConnectivityInfo, RETRY_BUDGET};
pub use source::{FetchPayload, FetchResponse, FetchResult, ImageRequest, Origin, ResponseBody};
pub use stats::{DownloadStats, LogStats, NoopStats};
pub use stream::MarkableReader;
