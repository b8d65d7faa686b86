//! # 格式嗅探模块
//!
//! ## 设计思路
//!
//! 在不破坏流位置的前提下识别两类需要特殊处理的编码：
//! - GIF：不解码，整流透传给调用方以保留动画数据
//! - WebP：从网络流增量解码易触发解码器缺陷，需整体缓冲后再解码
//!
//! ## 实现思路
//!
//! 先打标记（窗口放宽到 64 KiB，容忍元数据较多的文件头），
//! 只读取签名判定所需的前若干字节，交给 `infer` 的魔数匹配器，
//! 最后无条件回退。对调用方而言是纯窥视：净位置不变，
//! 后续解码看到的流与嗅探前完全一致。无法识别的签名一律按“非动画”处理。

use std::io::{self, Read};

use crate::stream::MarkableReader;

/// 嗅探与解码共用的标记窗口上限。
pub(crate) const SNIFF_MARK_LIMIT: usize = 65536;

/// 覆盖 GIF（3 字节）与 WebP（12 字节）签名判定所需的窥视长度。
const SIGNATURE_PROBE_BYTES: usize = 16;

fn peek_signature<R: Read>(
    stream: &mut MarkableReader<R>,
) -> io::Result<([u8; SIGNATURE_PROBE_BYTES], usize)> {
    let mark = stream.save_position(SNIFF_MARK_LIMIT);

    let mut buf = [0u8; SIGNATURE_PROBE_BYTES];
    let mut filled = 0;
    while filled < buf.len() {
        let n = stream.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }

    stream.reset(mark)?;
    Ok((buf, filled))
}

/// 流是否为 GIF。纯窥视，净位置不变。
pub(crate) fn is_gif<R: Read>(stream: &mut MarkableReader<R>) -> io::Result<bool> {
    let (buf, filled) = peek_signature(stream)?;
    Ok(infer::image::is_gif(&buf[..filled]))
}

/// 流是否为 WebP。纯窥视，净位置不变。
pub(crate) fn is_webp<R: Read>(stream: &mut MarkableReader<R>) -> io::Result<bool> {
    let (buf, filled) = peek_signature(stream)?;
    Ok(infer::image::is_webp(&buf[..filled]))
}
