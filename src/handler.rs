//! # 核心编排模块
//!
//! ## 设计思路
//!
//! `NetworkHandler` 只负责流程编排与配置管理，不实现网络传输本身。
//! 处理链路固定为：
//! 1. 读取配置快照
//! 2. 委托下载协作方获取响应
//! 3. 判定来源（缓存 / 网络）并上报下载字节数
//! 4. 嗅探格式：GIF 整流透传，其余进入有界解码
//!
//! ## 实现思路
//!
//! - 配置通过 `Arc<RwLock<HandlerConfig>>` 支持运行时调整，
//!   单次请求内使用“同一配置快照”，避免处理中途配置漂移。
//! - 下载与统计协作方以 trait 对象注入，便于测试隔离与替换传输实现。
//! - 流资源按作用域释放：除透传分支外，任何退出路径都会随作用域丢弃流；
//!   透传分支把 `MarkableReader` 连同所有权一起交还调用方。
//! - 记录 `load/decode/total` 阶段耗时，便于性能诊断。

use std::sync::{Arc, RwLock};
use std::time::Instant;

use crate::config::HandlerConfig;
use crate::downloader::Downloader;
use crate::error::HandlerError;
use crate::sniff;
use crate::source::{FetchPayload, FetchResult, ImageRequest, Origin, ResponseBody};
use crate::stats::{DownloadStats, NoopStats};
use crate::stream::MarkableReader;

/// 网络图片处理器。
///
/// 封装配置状态与下载/统计协作方，编排“获取 → 嗅探 → 解码”的完整流程。
/// 单次获取内部没有共享可变状态，协作方满足 `Send + Sync` 时
/// 处理器可被多个工作线程并发调用。
pub struct NetworkHandler {
    pub(crate) config: Arc<RwLock<HandlerConfig>>,
    downloader: Box<dyn Downloader + Send + Sync>,
    stats: Box<dyn DownloadStats + Send + Sync>,
}

impl NetworkHandler {
    /// 根据下载协作方与初始配置创建处理器，统计协作方默认为空实现。
    pub fn new(downloader: Box<dyn Downloader + Send + Sync>, config: HandlerConfig) -> Self {
        Self::with_stats(downloader, Box::new(NoopStats), config)
    }

    pub fn with_stats(
        downloader: Box<dyn Downloader + Send + Sync>,
        stats: Box<dyn DownloadStats + Send + Sync>,
        config: HandlerConfig,
    ) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            downloader,
            stats,
        }
    }

    /// 获取配置快照。
    ///
    /// 作用：保证单次请求链路使用一致参数。
    pub(crate) fn config_snapshot(&self) -> Result<HandlerConfig, HandlerError> {
        self.config
            .read()
            .map(|cfg| cfg.clone())
            .map_err(|_| HandlerError::ResourceLimit("配置读取锁已中毒".to_string()))
    }

    /// 设置解码资源上限与下载超时等高级配置。
    pub fn set_advanced_config(
        &self,
        max_decoded_pixels: u64,
        max_decoded_bytes: u64,
        connect_timeout: u64,
        download_timeout: u64,
    ) -> Result<(), HandlerError> {
        if max_decoded_bytes < 8 * 1024 * 1024 {
            return Err(HandlerError::InvalidFormat(
                "max_decoded_bytes 不能小于 8MB".to_string(),
            ));
        }
        if max_decoded_pixels < 65_536 {
            return Err(HandlerError::InvalidFormat(
                "max_decoded_pixels 不能小于 65536".to_string(),
            ));
        }
        if !(1..=120).contains(&connect_timeout) {
            return Err(HandlerError::InvalidFormat(
                "connect_timeout 必须在 1~120 秒之间".to_string(),
            ));
        }
        if !(1..=600).contains(&download_timeout) {
            return Err(HandlerError::InvalidFormat(
                "download_timeout 必须在 1~600 秒之间".to_string(),
            ));
        }

        let mut config = self
            .config
            .write()
            .map_err(|_| HandlerError::ResourceLimit("配置写入锁已中毒".to_string()))?;

        config.max_decoded_pixels = max_decoded_pixels;
        config.max_decoded_bytes = max_decoded_bytes;
        config.connect_timeout = connect_timeout;
        config.download_timeout = download_timeout;

        Ok(())
    }

    /// 本处理器是否能服务该定位符（仅 http/https）。
    pub fn can_handle(&self, uri: &str) -> bool {
        uri.split_once("://")
            .map(|(scheme, rest)| {
                !rest.is_empty()
                    && (scheme.eq_ignore_ascii_case("http") || scheme.eq_ignore_ascii_case("https"))
            })
            .unwrap_or(false)
    }

    /// 执行一次获取。
    ///
    /// 返回语义：
    /// - `Ok(Some(result))`：成功，载荷为解码结果或 GIF 透传流
    /// - `Ok(None)`：本处理器无法服务，流水线应尝试下一个处理器
    /// - `Err(...)`：瞬态失败，外层调度器按重试策略裁决
    pub fn fetch(&self, request: &ImageRequest) -> Result<Option<FetchResult>, HandlerError> {
        let config = self.config_snapshot()?;
        let total_start = Instant::now();
        log::info!("🌐 开始获取图片 - URI: {}", request.uri);

        let load_start = Instant::now();
        let Some(response) = self
            .downloader
            .load(&request.uri, request.local_cache_only)?
        else {
            log::debug!("⏭️ 下载协作方无法服务该请求，交由后续处理器");
            return Ok(None);
        };
        let load_elapsed = load_start.elapsed();

        let origin = if response.cached {
            Origin::Cache
        } else {
            Origin::Network
        };
        let content_length = response.content_length;

        let stream = match response.body {
            Some(ResponseBody::Raster(image)) => {
                log::debug!("✅ 传输层已携带解码结果，跳过解码阶段");
                return Ok(Some(FetchResult {
                    payload: FetchPayload::Raster(image),
                    origin,
                }));
            }
            Some(ResponseBody::Stream(stream)) => stream,
            None => return Ok(None),
        };

        // 重放请求偶发 content-length 为 0，按瞬态损坏处理：丢弃流并报可重试失败
        if content_length == 0 {
            drop(stream);
            return Err(HandlerError::Io(
                "收到 content-length 为 0 的响应".to_string(),
            ));
        }

        if origin == Origin::Network && content_length > 0 {
            self.stats.download_finished(content_length as u64);
        }

        let mut stream = MarkableReader::new(stream);

        if sniff::is_gif(&mut stream)? {
            // GIF 不解码：流的所有权随结果转移给调用方，本核心不关闭它
            log::info!(
                "🎞️ 识别为 GIF，按原始流透传 - load={}ms total={}ms",
                load_elapsed.as_millis(),
                total_start.elapsed().as_millis()
            );
            return Ok(Some(FetchResult {
                payload: FetchPayload::Stream(stream),
                origin,
            }));
        }

        let decode_start = Instant::now();
        let image = Self::decode_stream(&mut stream, request, &config)?;
        let decode_elapsed = decode_start.elapsed();

        log::info!(
            "✅ 图片获取完成 - 来源: {:?} load={}ms decode={}ms total={}ms",
            origin,
            load_elapsed.as_millis(),
            decode_elapsed.as_millis(),
            total_start.elapsed().as_millis()
        );

        Ok(Some(FetchResult {
            payload: FetchPayload::Raster(image),
            origin,
        }))
    }
}
