//! # 可回退流包装模块
//!
//! ## 设计思路
//!
//! 网络流只能顺序读取，而格式嗅探与两遍解码都需要“先窥视、再回到原位”。
//! `MarkableReader` 在任意 `Read` 之上提供带上限的检查点能力：
//! `save_position(limit)` 保证之后最多 `limit` 字节可以通过 `reset(mark)` 回放。
//!
//! ## 实现思路
//!
//! - 保留窗口内读到的字节追加进线性缓冲；回退后优先从缓冲回放，耗尽再读底层流。
//! - 读取超过窗口上限即整体失效（缓冲释放），此后 `reset` 返回 IO 错误而不是静默丢数据。
//! - 额外实现受限 `Seek`：向后仅限保留窗口内，向前按读取丢弃实现，`SeekFrom::End` 不支持。
//!   这让需要 `BufRead + Seek` 的解码器可以直接跑在活动网络流上。

use std::io::{self, Read, Seek, SeekFrom};

/// 带检查点能力的流包装器。
///
/// 每次获取链路只包装一次；嗅探与解码都以 `&mut MarkableReader<R>` 传递，
/// 从类型上杜绝二次包装。
pub struct MarkableReader<R> {
    inner: R,
    /// 自保留窗口起点起缓存的字节。
    buffer: Vec<u8>,
    /// 缓冲首字节对应的绝对偏移。
    buffer_start: u64,
    /// 保留窗口的绝对上限；`None` 表示当前没有有效窗口。
    retain_until: Option<u64>,
    /// 调用方视角的当前读取偏移。
    pos: u64,
    /// 回退次数（诊断用，解码阶段据此记录实际遍数）。
    rewinds: u32,
}

impl<R: Read> MarkableReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buffer: Vec::new(),
            buffer_start: 0,
            retain_until: None,
            pos: 0,
            rewinds: 0,
        }
    }

    /// 记录当前位置并保证之后 `limit` 字节可回放。
    ///
    /// 已有窗口覆盖当前位置时仅扩展上限，不清空已缓存内容，
    /// 因此嵌套标记（嗅探内再嗅探）可以回退到更早的标记。
    pub fn save_position(&mut self, limit: usize) -> u64 {
        let mark = self.pos;
        let end = mark.saturating_add(limit as u64);

        match self.retain_until {
            Some(current) => {
                self.retain_until = Some(current.max(end));
            }
            None => {
                self.buffer.clear();
                self.buffer_start = mark;
                self.retain_until = Some(end);
            }
        }

        mark
    }

    /// 回退到 `save_position` 返回的标记。
    ///
    /// 标记失效（读取已越过窗口上限）或偏移不在缓存范围内时返回 IO 错误。
    pub fn reset(&mut self, mark: u64) -> io::Result<()> {
        let covered = self.retain_until.is_some()
            && mark >= self.buffer_start
            && mark <= self.buffer_start + self.buffer.len() as u64;

        if !covered {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("标记 {} 已失效，无法回退（当前偏移 {}）", mark, self.pos),
            ));
        }

        if mark < self.pos {
            self.rewinds += 1;
        }
        self.pos = mark;
        Ok(())
    }

    /// 当前绝对读取偏移。
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// 成功回退的累计次数。
    pub fn rewind_count(&self) -> u32 {
        self.rewinds
    }

    /// 释放包装并交还底层流。
    ///
    /// 注意：已被缓冲但未回放的字节会随包装一起丢弃，仅应在不再需要回放时调用。
    pub fn into_inner(self) -> R {
        self.inner
    }

    fn buffer_end(&self) -> u64 {
        self.buffer_start + self.buffer.len() as u64
    }
}

impl<R: Read> Read for MarkableReader<R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }

        // 回放阶段：当前位置仍在缓冲覆盖范围内
        if self.retain_until.is_some() && self.pos < self.buffer_end() {
            let start = (self.pos - self.buffer_start) as usize;
            let n = out.len().min(self.buffer.len() - start);
            out[..n].copy_from_slice(&self.buffer[start..start + n]);
            self.pos += n as u64;
            return Ok(n);
        }

        let n = self.inner.read(out)?;
        if n > 0 {
            if let Some(end) = self.retain_until {
                if self.pos + n as u64 <= end {
                    self.buffer.extend_from_slice(&out[..n]);
                } else {
                    // 越过窗口上限：之前的标记全部失效，缓冲立即释放
                    self.buffer.clear();
                    self.retain_until = None;
                }
            }
            self.pos += n as u64;
        }
        Ok(n)
    }
}

impl<R: Read> Seek for MarkableReader<R> {
    fn seek(&mut self, target: SeekFrom) -> io::Result<u64> {
        let target = match target {
            SeekFrom::Start(offset) => offset,
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta).ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidInput, "定位偏移越界")
            })?,
            SeekFrom::End(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::Unsupported,
                    "网络流不支持从末尾定位",
                ));
            }
        };

        if target == self.pos {
            return Ok(self.pos);
        }

        if target < self.pos {
            // 向后仅允许回到保留窗口内
            self.reset(target)?;
            return Ok(self.pos);
        }

        // 向前：顺序读取并丢弃
        let mut remaining = target - self.pos;
        let mut scratch = [0u8; 4096];
        while remaining > 0 {
            let want = scratch.len().min(remaining as usize);
            let n = Read::read(self, &mut scratch[..want])?;
            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "向前定位时流提前结束",
                ));
            }
            remaining -= n as u64;
        }
        Ok(self.pos)
    }

    fn stream_position(&mut self) -> io::Result<u64> {
        Ok(self.pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Cursor;

    /// 每次最多返回 `chunk` 字节，模拟网络流的碎片化读取。
    struct ChunkedReader {
        inner: Cursor<Vec<u8>>,
        chunk: usize,
    }

    impl Read for ChunkedReader {
        fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
            let n = out.len().min(self.chunk.max(1));
            self.inner.read(&mut out[..n])
        }
    }

    fn read_n<R: Read>(reader: &mut R, n: usize) -> Vec<u8> {
        let mut buf = vec![0u8; n];
        let mut filled = 0;
        while filled < n {
            let got = reader.read(&mut buf[filled..]).expect("read failed");
            if got == 0 {
                break;
            }
            filled += got;
        }
        buf.truncate(filled);
        buf
    }

    #[test]
    fn reset_replays_bytes_read_after_mark() {
        let data: Vec<u8> = (0..=255).collect();
        let mut reader = MarkableReader::new(Cursor::new(data.clone()));

        let mark = reader.save_position(64);
        let first = read_n(&mut reader, 16);
        reader.reset(mark).expect("reset failed");
        let replay = read_n(&mut reader, 16);

        assert_eq!(first, replay);
        assert_eq!(reader.position(), 16);
        assert_eq!(reader.rewind_count(), 1);
    }

    #[test]
    fn replay_then_continues_into_fresh_bytes() {
        let data: Vec<u8> = (0..200).collect();
        let mut reader = MarkableReader::new(Cursor::new(data.clone()));

        let mark = reader.save_position(128);
        let _ = read_n(&mut reader, 50);
        reader.reset(mark).expect("reset failed");

        let all = read_n(&mut reader, 200);
        assert_eq!(all, data);
    }

    #[test]
    fn reading_past_limit_invalidates_mark() {
        let data = vec![7u8; 256];
        let mut reader = MarkableReader::new(Cursor::new(data));

        let mark = reader.save_position(32);
        let _ = read_n(&mut reader, 64);

        assert!(reader.reset(mark).is_err());
    }

    #[test]
    fn reset_to_unknown_offset_is_an_error() {
        let mut reader = MarkableReader::new(Cursor::new(vec![1u8; 16]));
        assert!(reader.reset(3).is_err());
    }

    #[test]
    fn nested_marks_extend_the_window() {
        let data: Vec<u8> = (0..100).collect();
        let mut reader = MarkableReader::new(Cursor::new(data.clone()));

        let outer = reader.save_position(16);
        let _ = read_n(&mut reader, 8);
        let inner = reader.save_position(16);
        let _ = read_n(&mut reader, 12);

        reader.reset(inner).expect("inner reset failed");
        reader.reset(outer).expect("outer reset failed");
        assert_eq!(read_n(&mut reader, 100), data);
    }

    #[test]
    fn seek_backward_outside_window_is_rejected() {
        let mut reader = MarkableReader::new(Cursor::new(vec![0u8; 128]));
        let _ = read_n(&mut reader, 64);

        assert!(reader.seek(SeekFrom::Start(0)).is_err());
    }

    #[test]
    fn seek_forward_reads_and_discards() {
        let data: Vec<u8> = (0..64).collect();
        let mut reader = MarkableReader::new(Cursor::new(data));

        let pos = reader.seek(SeekFrom::Start(10)).expect("seek failed");
        assert_eq!(pos, 10);
        assert_eq!(read_n(&mut reader, 1), vec![10]);
    }

    #[test]
    fn stream_position_reports_current_offset() {
        let mut reader = MarkableReader::new(Cursor::new(vec![0u8; 32]));
        let _ = read_n(&mut reader, 5);
        assert_eq!(reader.stream_position().expect("position failed"), 5);
    }

    proptest! {
        /// 任意数据、任意碎片化程度下，窥视 + 回退 + 全量读取应与原始数据一致。
        #[test]
        fn peek_and_rewind_preserves_stream_content(
            data in proptest::collection::vec(any::<u8>(), 0..4096),
            chunk in 1usize..64,
            peek in 0usize..512,
        ) {
            let mut reader = MarkableReader::new(ChunkedReader {
                inner: Cursor::new(data.clone()),
                chunk,
            });

            let mark = reader.save_position(512);
            let _ = read_n(&mut reader, peek);
            reader.reset(mark).expect("reset failed");

            let all = read_n(&mut reader, data.len() + 1);
            prop_assert_eq!(all, data);
        }
    }
}
