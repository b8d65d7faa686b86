//! # 数据源与中间模型
//!
//! ## 设计思路
//!
//! 将“外部输入类型”和“链路输出结果”解耦：
//! - `ImageRequest` 表示一次获取的输入语义（定位符、目标尺寸、解码偏好）
//! - `FetchResponse` 表示下载协作方产出的原始响应
//! - `FetchResult` 表示终端输出，载荷与来源标识一起交还调用方
//!
//! 载荷使用带标签的 `FetchPayload`：解码结果与透传流互斥，
//! 活动流句柄只存在于透传变体中，清理责任随所有权一起转移。

use std::io::Read;

use image::DynamicImage;

use crate::config::DecodeConfig;
use crate::stream::MarkableReader;

/// 一次图片获取请求。构造后不可变，处理器只借用。
#[derive(Debug, Clone)]
pub struct ImageRequest {
    /// 资源定位符（http/https URI）。
    pub uri: String,
    /// 目标宽度（像素）；0 表示该轴不限制。
    pub target_width: u32,
    /// 目标高度（像素）；0 表示该轴不限制。
    pub target_height: u32,
    /// 请求级解码配置。
    pub config: DecodeConfig,
    /// 仅允许本地缓存命中，不发起真实网络传输。
    pub local_cache_only: bool,
}

impl ImageRequest {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            target_width: 0,
            target_height: 0,
            config: DecodeConfig::default(),
            local_cache_only: false,
        }
    }

    /// 指定目标尺寸，启用降采样路径。
    pub fn with_target(mut self, width: u32, height: u32) -> Self {
        self.target_width = width;
        self.target_height = height;
        self
    }

    pub fn with_config(mut self, config: DecodeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn local_cache_only(mut self, enabled: bool) -> Self {
        self.local_cache_only = enabled;
        self
    }

    /// 是否要求按目标尺寸或固定因子降采样。
    pub(crate) fn wants_downsample(&self) -> bool {
        self.target_width > 0 || self.target_height > 0 || self.config.fixed_reduction.is_some()
    }
}

/// 下载协作方的响应。每次请求产出一次，由编排器消费一次。
pub struct FetchResponse {
    /// 是否由本地缓存命中（协作方契约：必须如实反映来源）。
    pub cached: bool,
    /// 声明的内容长度；负数表示未知。
    pub content_length: i64,
    /// 响应体；`None` 表示本次无法服务。
    pub body: Option<ResponseBody>,
}

/// 响应体的两种形态：传输层已解码的光栅图，或原始字节流。
pub enum ResponseBody {
    Raster(DynamicImage),
    Stream(Box<dyn Read + Send>),
}

/// 获取来源标识。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Cache,
    Network,
}

/// 终端输出载荷：解码结果或透传流，二者互斥。
///
/// `Stream` 变体携带活动流句柄，所有权随返回值转移给调用方，
/// 本核心不会关闭它；调用方读完后丢弃即释放。
pub enum FetchPayload {
    Raster(DynamicImage),
    Stream(MarkableReader<Box<dyn Read + Send>>),
}

impl FetchPayload {
    pub fn is_passthrough(&self) -> bool {
        matches!(self, FetchPayload::Stream(_))
    }

    pub fn as_raster(&self) -> Option<&DynamicImage> {
        match self {
            FetchPayload::Raster(image) => Some(image),
            FetchPayload::Stream(_) => None,
        }
    }
}

/// 一次获取的终端输出。
pub struct FetchResult {
    pub payload: FetchPayload,
    pub origin: Origin,
}
