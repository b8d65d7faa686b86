//! # 配置模块
//!
//! ## 设计思路
//!
//! 将所有“可调策略”集中到 `HandlerConfig`，保证运行时行为可观测、可调整、可测试。
//! 请求级的解码偏好（像素格式、固定缩减因子）单独放在 `DecodeConfig`，
//! 随 `ImageRequest` 传递，不与处理器级配置混用。
//!
//! ## 实现思路
//!
//! - `Default` 提供生产可用的平衡配置。
//! - 处理器持有 `Arc<RwLock<HandlerConfig>>`，单次请求内使用同一配置快照。
//! - 高级配置变更集中在 `NetworkHandler::set_advanced_config`，带范围校验。

use image::imageops::FilterType;

/// 处理器级配置。
///
/// 字段覆盖下载超时、解码资源上限与降采样滤镜三类策略。
#[derive(Debug, Clone)]
pub struct HandlerConfig {
    /// 建立连接（TCP/TLS）超时时间（秒）。
    pub connect_timeout: u64,
    /// 网络下载超时时间（秒）。
    pub download_timeout: u64,
    /// 解码后的像素上限（`width * height`）。
    pub max_decoded_pixels: u64,
    /// 解码阶段允许的内存分配上限（字节）。
    pub max_decoded_bytes: u64,
    /// 降采样滤镜策略。
    pub resize_filter: FilterType,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            connect_timeout: 8,
            download_timeout: 30,
            max_decoded_pixels: 40_000_000,
            max_decoded_bytes: 160 * 1024 * 1024,
            resize_filter: FilterType::Triangle,
        }
    }
}

/// 请求级解码配置。
///
/// 两个字段都是“偏好”而非硬约束：像素格式在解码完成后转换，
/// 固定缩减因子会强制走降采样路径（即使请求未带目标尺寸）。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeConfig {
    /// 期望的输出像素格式；`None` 表示保留解码器原始格式。
    pub pixel_format: Option<PixelFormat>,
    /// 固定整数缩减因子；`Some(n)` 时跳过按目标尺寸的因子计算。
    pub fixed_reduction: Option<u32>,
}

/// 输出像素格式提示。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgba8,
    Rgb8,
    Luma8,
}
