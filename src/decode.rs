//! # 有界解码模块
//!
//! ## 设计思路
//!
//! 解码内存必须有上界，不能依赖“先整张解出来再说”。
//! 对需要降采样的请求采用两遍方案：第一遍只解析编码头里的宽高
//! （不分配像素内存），据此先做像素上限校验并计算整数缩减因子，
//! 回退标记后第二遍做真实解码并按因子缩小。
//! 不要求降采样的请求完全跳过探测遍，单遍读完流。
//!
//! ## 实现思路
//!
//! 1. 入口打标记（与嗅探共用 64 KiB 窗口）
//! 2. WebP 窥视命中时整体缓冲后从内存解码（增量流解码易触发解码器缺陷）
//! 3. 流式路径按需执行“探测 → 回退 → 解码”两遍
//! 4. 所有路径都挂接 `image::Limits` 内存上限
//! 5. 缩减因子通过 `fast_image_resize` 应用，失败时回退 `resize_exact`

use std::io::{BufReader, Cursor, Read};

use fast_image_resize as fr;
use image::{DynamicImage, GenericImageView, ImageBuffer, ImageReader, Rgba};

use crate::config::{HandlerConfig, PixelFormat};
use crate::error::HandlerError;
use crate::handler::NetworkHandler;
use crate::sniff::{self, SNIFF_MARK_LIMIT};
use crate::source::ImageRequest;
use crate::stream::MarkableReader;

impl NetworkHandler {
    /// 将字节流解码为受内存约束的光栅图。
    ///
    /// 调用前提：流已被嗅探确认不是 GIF。
    pub(crate) fn decode_stream<R: Read>(
        stream: &mut MarkableReader<R>,
        request: &ImageRequest,
        config: &HandlerConfig,
    ) -> Result<DynamicImage, HandlerError> {
        let mark = stream.save_position(SNIFF_MARK_LIMIT);

        // WebP 网络流增量解码存在解码器缺陷，接受内存代价整体缓冲
        if sniff::is_webp(stream)? {
            log::debug!("🧩 识别为 WebP，切换到整体缓冲解码路径");
            let mut bytes = Vec::new();
            stream.read_to_end(&mut bytes)?;
            let image = Self::decode_buffered(&bytes, request, config)?;
            return Ok(Self::apply_pixel_format(image, request.config.pixel_format));
        }

        let image = if request.wants_downsample() {
            let (width, height) = Self::probe_dimensions(stream)?;
            Self::validate_pixel_limits(config, width, height)?;
            let factor = Self::reduction_factor(width, height, request);
            stream.reset(mark)?;

            log::debug!(
                "🔍 探测完成 - 编码尺寸 {}x{} 缩减因子 {}",
                width,
                height,
                factor
            );

            let decoded = Self::decode_full(stream, config)?;
            Self::apply_reduction(decoded, factor, config)?
        } else {
            // 全分辨率请求跳过探测遍，避免多余的头解析开销
            Self::decode_full(stream, config)?
        };

        Ok(Self::apply_pixel_format(image, request.config.pixel_format))
    }

    /// WebP 专用：从完整内存缓冲解码，两遍逻辑与流式路径一致。
    fn decode_buffered(
        bytes: &[u8],
        request: &ImageRequest,
        config: &HandlerConfig,
    ) -> Result<DynamicImage, HandlerError> {
        if bytes.is_empty() {
            return Err(HandlerError::Decode("流中没有可解码的字节".to_string()));
        }

        if request.wants_downsample() {
            let (width, height) = Self::dimensions_from_memory(bytes)?;
            Self::validate_pixel_limits(config, width, height)?;
            let factor = Self::reduction_factor(width, height, request);
            let decoded = Self::decode_from_memory(bytes, config)?;
            return Self::apply_reduction(decoded, factor, config);
        }

        Self::decode_from_memory(bytes, config)
    }

    /// 第一遍：只解析编码头的宽高，不分配像素内存。
    fn probe_dimensions<R: Read>(
        stream: &mut MarkableReader<R>,
    ) -> Result<(u32, u32), HandlerError> {
        let reader = ImageReader::new(BufReader::new(&mut *stream))
            .with_guessed_format()
            .map_err(|e| HandlerError::InvalidFormat(format!("无法识别图片格式：{}", e)))?;

        reader
            .into_dimensions()
            .map_err(|e| HandlerError::InvalidFormat(format!("无法读取图片尺寸：{}", e)))
    }

    fn dimensions_from_memory(bytes: &[u8]) -> Result<(u32, u32), HandlerError> {
        let reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| HandlerError::InvalidFormat(format!("无法识别图片格式：{}", e)))?;

        reader
            .into_dimensions()
            .map_err(|e| HandlerError::InvalidFormat(format!("无法读取图片尺寸：{}", e)))
    }

    /// 第二遍：真实解码，受 `image::Limits` 内存上限约束。
    fn decode_full<R: Read>(
        stream: &mut MarkableReader<R>,
        config: &HandlerConfig,
    ) -> Result<DynamicImage, HandlerError> {
        let mut reader = ImageReader::new(BufReader::new(&mut *stream))
            .with_guessed_format()
            .map_err(|e| HandlerError::InvalidFormat(format!("无法识别图片格式：{}", e)))?;
        reader.limits(Self::decode_limits(config));

        let image = reader.decode().map_err(Self::map_decode_error)?;
        Self::reject_empty(image)
    }

    fn decode_from_memory(
        bytes: &[u8],
        config: &HandlerConfig,
    ) -> Result<DynamicImage, HandlerError> {
        let mut reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| HandlerError::InvalidFormat(format!("无法识别图片格式：{}", e)))?;
        reader.limits(Self::decode_limits(config));

        let image = reader.decode().map_err(Self::map_decode_error)?;
        Self::reject_empty(image)
    }

    /// 解码出空图按 IO 级瞬态失败处理，交由外层重试策略裁决。
    fn reject_empty(image: DynamicImage) -> Result<DynamicImage, HandlerError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(HandlerError::Decode("解码结果为空".to_string()));
        }
        Ok(image)
    }

    fn map_decode_error(error: image::ImageError) -> HandlerError {
        match error {
            image::ImageError::Limits(limit) => {
                HandlerError::ResourceLimit(format!("解码超出资源限制：{}", limit))
            }
            other => HandlerError::Decode(format!("图片解码失败：{}", other)),
        }
    }

    fn decode_limits(config: &HandlerConfig) -> image::Limits {
        let mut limits = image::Limits::default();
        limits.max_alloc = Some(config.max_decoded_bytes);
        limits
    }

    /// 校验像素数量是否超过配置上限。
    fn validate_pixel_limits(
        config: &HandlerConfig,
        width: u32,
        height: u32,
    ) -> Result<(), HandlerError> {
        let pixels = (width as u64)
            .checked_mul(height as u64)
            .ok_or_else(|| HandlerError::ResourceLimit("图片像素数溢出".to_string()))?;

        if pixels > config.max_decoded_pixels {
            return Err(HandlerError::ResourceLimit(format!(
                "图片像素过大：{} 像素（限制：{} 像素）",
                pixels, config.max_decoded_pixels
            )));
        }

        Ok(())
    }

    /// 计算满足 `encoded / factor <= target`（两轴同时成立）的最小整数因子。
    ///
    /// 目标轴为 0 表示该轴不限制；配置了固定因子时直接采用。
    pub(crate) fn reduction_factor(width: u32, height: u32, request: &ImageRequest) -> u32 {
        if let Some(fixed) = request.config.fixed_reduction {
            return fixed.max(1);
        }

        let by_width = if request.target_width > 0 {
            width.div_ceil(request.target_width)
        } else {
            1
        };
        let by_height = if request.target_height > 0 {
            height.div_ceil(request.target_height)
        } else {
            1
        };

        by_width.max(by_height).max(1)
    }

    fn apply_reduction(
        image: DynamicImage,
        factor: u32,
        config: &HandlerConfig,
    ) -> Result<DynamicImage, HandlerError> {
        if factor <= 1 {
            return Ok(image);
        }

        let (width, height) = image.dimensions();
        let target_width = (width / factor).max(1);
        let target_height = (height / factor).max(1);

        log::debug!(
            "🧩 应用缩减因子 {}：{}x{} -> {}x{}",
            factor,
            width,
            height,
            target_width,
            target_height
        );

        match Self::resize_with_fast_image_resize(
            &image,
            target_width,
            target_height,
            config.resize_filter,
        ) {
            Ok(resized) => Ok(resized),
            Err(err) => {
                log::warn!("⚠️ fast_image_resize 缩减失败，回退 image::resize_exact：{}", err);
                Ok(image.resize_exact(target_width, target_height, config.resize_filter))
            }
        }
    }

    fn resize_with_fast_image_resize(
        image: &DynamicImage,
        target_width: u32,
        target_height: u32,
        filter: image::imageops::FilterType,
    ) -> Result<DynamicImage, HandlerError> {
        let src = image.to_rgba8();
        let (src_width, src_height) = src.dimensions();

        let src_image = fr::images::Image::from_vec_u8(
            src_width,
            src_height,
            src.into_raw(),
            fr::PixelType::U8x4,
        )
        .map_err(|e| HandlerError::Decode(format!("构建源图像缓冲失败：{}", e)))?;

        let mut dst_image =
            fr::images::Image::new(target_width, target_height, fr::PixelType::U8x4);

        let mut resizer = fr::Resizer::new();
        let options = fr::ResizeOptions::new()
            .resize_alg(fr::ResizeAlg::Convolution(Self::to_fast_filter(filter)));

        resizer
            .resize(&src_image, &mut dst_image, Some(&options))
            .map_err(|e| HandlerError::Decode(format!("fast_image_resize 执行失败：{}", e)))?;

        let rgba = ImageBuffer::<Rgba<u8>, Vec<u8>>::from_raw(
            target_width,
            target_height,
            dst_image.into_vec(),
        )
        .ok_or_else(|| HandlerError::Decode("fast_image_resize 输出缓冲长度异常".to_string()))?;

        Ok(DynamicImage::ImageRgba8(rgba))
    }

    fn to_fast_filter(filter: image::imageops::FilterType) -> fr::FilterType {
        match filter {
            image::imageops::FilterType::Nearest => fr::FilterType::Box,
            image::imageops::FilterType::Triangle => fr::FilterType::Bilinear,
            image::imageops::FilterType::CatmullRom => fr::FilterType::CatmullRom,
            image::imageops::FilterType::Gaussian => fr::FilterType::Mitchell,
            image::imageops::FilterType::Lanczos3 => fr::FilterType::Lanczos3,
        }
    }

    fn apply_pixel_format(image: DynamicImage, format: Option<PixelFormat>) -> DynamicImage {
        match format {
            None => image,
            Some(PixelFormat::Rgba8) => match image {
                DynamicImage::ImageRgba8(_) => image,
                other => DynamicImage::ImageRgba8(other.to_rgba8()),
            },
            Some(PixelFormat::Rgb8) => match image {
                DynamicImage::ImageRgb8(_) => image,
                other => DynamicImage::ImageRgb8(other.to_rgb8()),
            },
            Some(PixelFormat::Luma8) => match image {
                DynamicImage::ImageLuma8(_) => image,
                other => DynamicImage::ImageLuma8(other.to_luma8()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DecodeConfig;
    use image::ImageFormat;

    fn create_png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = ImageBuffer::from_fn(width, height, |x, y| {
            let r = (x % 255) as u8;
            let g = (y % 255) as u8;
            let b = ((x + y) % 255) as u8;
            Rgba([r, g, b, 255])
        });

        let dyn_img = DynamicImage::ImageRgba8(img);
        let mut cursor = Cursor::new(Vec::new());
        dyn_img
            .write_to(&mut cursor, ImageFormat::Png)
            .expect("failed to encode test image");
        cursor.into_inner()
    }

    fn create_webp_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(ImageBuffer::from_fn(width, height, |x, y| {
            Rgba([(x % 255) as u8, (y % 255) as u8, 128, 255])
        }));
        let mut cursor = Cursor::new(Vec::new());
        img.write_to(&mut cursor, ImageFormat::WebP)
            .expect("failed to encode test webp");
        cursor.into_inner()
    }

    fn wrap(bytes: Vec<u8>) -> MarkableReader<Cursor<Vec<u8>>> {
        MarkableReader::new(Cursor::new(bytes))
    }

    fn request_with_target(width: u32, height: u32) -> ImageRequest {
        ImageRequest::new("https://example.com/a.png").with_target(width, height)
    }

    #[test]
    fn reduction_factor_is_smallest_satisfying_both_axes() {
        let request = request_with_target(100, 100);
        assert_eq!(NetworkHandler::reduction_factor(1000, 1000, &request), 10);
        assert_eq!(NetworkHandler::reduction_factor(1000, 500, &request), 10);
        assert_eq!(NetworkHandler::reduction_factor(500, 1000, &request), 10);
        assert_eq!(NetworkHandler::reduction_factor(101, 100, &request), 2);
        assert_eq!(NetworkHandler::reduction_factor(100, 100, &request), 1);
        assert_eq!(NetworkHandler::reduction_factor(50, 50, &request), 1);
    }

    #[test]
    fn reduction_factor_single_axis_target() {
        let request = request_with_target(100, 0);
        assert_eq!(NetworkHandler::reduction_factor(1000, 2000, &request), 10);
    }

    #[test]
    fn fixed_reduction_overrides_target_computation() {
        let request = request_with_target(100, 100).with_config(DecodeConfig {
            fixed_reduction: Some(3),
            ..DecodeConfig::default()
        });
        assert_eq!(NetworkHandler::reduction_factor(1000, 1000, &request), 3);
    }

    #[test]
    fn downsampled_decode_bounds_output_to_target() {
        let png = create_png_bytes(1000, 1000);
        let mut stream = wrap(png);
        let request = request_with_target(100, 100);
        let config = HandlerConfig::default();

        let image = NetworkHandler::decode_stream(&mut stream, &request, &config)
            .expect("decode should succeed");

        let (width, height) = image.dimensions();
        assert!(width <= 100 && height <= 100);
    }

    #[test]
    fn full_resolution_decode_keeps_encoded_dimensions() {
        let png = create_png_bytes(64, 48);
        let mut stream = wrap(png);
        let request = ImageRequest::new("https://example.com/a.png");
        let config = HandlerConfig::default();

        let image = NetworkHandler::decode_stream(&mut stream, &request, &config)
            .expect("decode should succeed");

        assert_eq!(image.dimensions(), (64, 48));
    }

    #[test]
    fn probe_pass_only_runs_when_downsampling_is_requested() {
        let png = create_png_bytes(256, 256);
        let config = HandlerConfig::default();

        let mut single_pass = wrap(png.clone());
        NetworkHandler::decode_stream(
            &mut single_pass,
            &ImageRequest::new("https://example.com/a.png"),
            &config,
        )
        .expect("decode should succeed");

        let mut two_pass = wrap(png);
        NetworkHandler::decode_stream(&mut two_pass, &request_with_target(64, 64), &config)
            .expect("decode should succeed");

        // 降采样路径比全分辨率路径多一次“探测 + 回退”
        assert!(two_pass.rewind_count() > single_pass.rewind_count());
    }

    #[test]
    fn webp_stream_is_buffered_and_decoded() {
        let webp = create_webp_bytes(120, 80);
        let mut stream = wrap(webp);
        let request = ImageRequest::new("https://example.com/a.webp");
        let config = HandlerConfig::default();

        let image = NetworkHandler::decode_stream(&mut stream, &request, &config)
            .expect("webp decode should succeed");
        assert_eq!(image.dimensions(), (120, 80));
    }

    #[test]
    fn webp_downsample_applies_reduction_from_memory() {
        let webp = create_webp_bytes(400, 400);
        let mut stream = wrap(webp);
        let request = request_with_target(100, 100);
        let config = HandlerConfig::default();

        let image = NetworkHandler::decode_stream(&mut stream, &request, &config)
            .expect("webp decode should succeed");
        let (width, height) = image.dimensions();
        assert!(width <= 100 && height <= 100);
    }

    #[test]
    fn oversized_header_dimensions_are_rejected_before_full_decode() {
        let png = create_png_bytes(200, 200);
        let mut stream = wrap(png);
        let request = request_with_target(50, 50);
        let config = HandlerConfig {
            max_decoded_pixels: 10_000,
            ..HandlerConfig::default()
        };

        let result = NetworkHandler::decode_stream(&mut stream, &request, &config);
        assert!(matches!(result, Err(HandlerError::ResourceLimit(_))));
    }

    #[test]
    fn garbage_bytes_fail_as_transient_decode_error() {
        let mut stream = wrap(vec![0xAB; 512]);
        let request = ImageRequest::new("https://example.com/a.png");
        let config = HandlerConfig::default();

        let result = NetworkHandler::decode_stream(&mut stream, &request, &config);
        assert!(result.is_err());
    }

    #[test]
    fn pixel_format_hint_converts_output() {
        let png = create_png_bytes(32, 32);
        let mut stream = wrap(png);
        let request = ImageRequest::new("https://example.com/a.png").with_config(DecodeConfig {
            pixel_format: Some(PixelFormat::Luma8),
            ..DecodeConfig::default()
        });
        let config = HandlerConfig::default();

        let image = NetworkHandler::decode_stream(&mut stream, &request, &config)
            .expect("decode should succeed");
        assert!(matches!(image, DynamicImage::ImageLuma8(_)));
    }
}
