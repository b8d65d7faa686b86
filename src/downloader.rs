//! # 下载协作方模块
//!
//! ## 设计思路
//!
//! 传输层通过 `Downloader` trait 与编排核心解耦：核心只消费
//! “响应元数据 + 字节流”，不关心传输实现。默认实现基于
//! `reqwest` 的阻塞客户端，按配置设置连接与整体超时。
//!
//! ## 实现思路
//!
//! - `local_cache_only` 请求附带 `Cache-Control: only-if-cached`，
//!   中间缓存未命中返回 504 时回答“无法服务”而不是报错。
//! - 响应体不落地：`reqwest::blocking::Response` 自身实现 `Read`，
//!   直接装箱为流交给核心，由嗅探与解码按需消费。

use std::time::Duration;

use crate::config::HandlerConfig;
use crate::error::HandlerError;
use crate::source::{FetchResponse, ResponseBody};

/// 下载协作方接口。
///
/// 返回语义：
/// - `Ok(Some(response))`：已取得响应（含缓存命中）
/// - `Ok(None)`：该请求无法由本协作方服务
/// - `Err(...)`：传输失败
pub trait Downloader {
    fn load(&self, uri: &str, local_cache_only: bool) -> Result<Option<FetchResponse>, HandlerError>;
}

/// 基于 HTTP 的默认下载协作方。
pub struct HttpDownloader {
    client: reqwest::blocking::Client,
}

impl HttpDownloader {
    pub fn new(config: &HandlerConfig) -> Result<Self, HandlerError> {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout))
            .timeout(Duration::from_secs(config.download_timeout))
            .build()
            .map_err(|e| HandlerError::Network(format!("无法创建 HTTP 客户端：{}", e)))?;

        Ok(Self { client })
    }
}

impl Downloader for HttpDownloader {
    fn load(
        &self,
        uri: &str,
        local_cache_only: bool,
    ) -> Result<Option<FetchResponse>, HandlerError> {
        let mut request = self.client.get(uri);
        if local_cache_only {
            request = request.header("Cache-Control", "only-if-cached");
        }

        let response = request
            .send()
            .map_err(|e| HandlerError::Network(format!("请求发送失败：{}", e)))?;

        // 仅缓存模式下中间缓存未命中以 504 表达，按“无法服务”处理
        if local_cache_only && response.status() == reqwest::StatusCode::GATEWAY_TIMEOUT {
            log::debug!("⏭️ 仅缓存请求未命中 - URI: {}", uri);
            return Ok(None);
        }

        if !response.status().is_success() {
            return Err(HandlerError::Network(format!(
                "HTTP {} - URI: {}",
                response.status(),
                uri
            )));
        }

        let cached = response
            .headers()
            .get("X-Cache")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.to_ascii_uppercase().contains("HIT"));

        let content_length = response
            .content_length()
            .and_then(|len| i64::try_from(len).ok())
            .unwrap_or(-1);

        Ok(Some(FetchResponse {
            cached,
            content_length,
            body: Some(ResponseBody::Stream(Box::new(response))),
        }))
    }
}
