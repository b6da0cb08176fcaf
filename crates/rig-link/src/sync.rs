//! 重同步帧检测状态机
//!
//! 在连续字节流（包括毫无边界的 UDP 载荷拼接）里定位帧边界：
//! 同步字扫描 → 长度界限检查 → 校验验证，三步全过才接纳。
//!
//! ```text
//! SeekingSync → ValidatingLength → ValidatingChecksum → FrameReady
//!      ↑ ______________|________________|（任一步失败，单字节前进）
//! ```
//!
//! 关键正确性性质：任何验证失败都只前进 **一个字节**，而不是跳过
//! 整个帧头或声称的帧长。这保证真实帧与假同步重叠时也能最终重新
//! 对齐，不会越过真帧。
//!
//! 帧级错误（假同步 / 坏长度 / 坏校验）在本层内部消化，只打
//! trace/debug 日志，绝不越过检测器边界向上传播。

use std::time::Instant;

use tracing::{debug, trace};

use rig_protocol::header::{Frame, FrameLayout};

use crate::buffer::StreamBuffer;
use crate::{LinkError, Transport};

/// 检测器状态（诊断与日志用；推进逻辑在 [`FrameSynchronizer::next_frame`] 里）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncState {
    #[default]
    SeekingSync,
    ValidatingLength,
    ValidatingChecksum,
    FrameReady,
}

/// 帧检测计数（诊断用）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameSyncStats {
    /// 扫描中逐字节跳过的字节数（含验证失败后的单字节前进）
    pub bytes_skipped: u64,
    /// 长度界限检查拒绝的候选数
    pub bad_length: u64,
    /// 校验失败拒绝的候选数
    pub bad_checksum: u64,
    /// 接纳的帧数
    pub frames_accepted: u64,
}

/// 同步字扫描 + 长度界限 + 校验验证的帧检测器
///
/// 每条通道一个实例，在该通道的读取上下文里驱动。滑窗宽度恒等于
/// 帧头尺寸；窗口数据通过流缓冲的非消费 peek 获得，只有整帧通过
/// 全部验证后才原子消费。
pub struct FrameSynchronizer {
    layout: FrameLayout,
    state: SyncState,
    stats: FrameSyncStats,
}

impl FrameSynchronizer {
    pub fn new(layout: FrameLayout) -> Self {
        Self {
            layout,
            state: SyncState::SeekingSync,
            stats: FrameSyncStats::default(),
        }
    }

    pub fn stats(&self) -> FrameSyncStats {
        self.stats
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn layout(&self) -> &FrameLayout {
        &self.layout
    }

    /// 扫描直到组装出下一个完整有效帧
    ///
    /// 字节不足时阻塞等待更多数据；截止时刻到达返回
    /// [`LinkError::Timeout`]，已拒绝前缀之外的字节一个不少地留在
    /// 缓冲里——不完整的流永远不是错误。
    pub fn next_frame<T: Transport>(
        &mut self,
        buffer: &StreamBuffer<T>,
        deadline: Instant,
    ) -> Result<Frame, LinkError> {
        let header_size = self.layout.header_size();

        loop {
            self.state = SyncState::SeekingSync;
            // 滑窗：帧头宽度的非消费窥视
            let window = buffer.peek(header_size, deadline)?;

            if !self.layout.sync_matches(&window) {
                self.advance_one(buffer, "sync mismatch");
                continue;
            }

            self.state = SyncState::ValidatingLength;
            let Some(header) = self.layout.parse_header(&window) else {
                // peek 保证了窗口宽度，这里只是防御
                self.advance_one(buffer, "short window");
                continue;
            };

            let body_len = header.length as usize;
            if body_len == 0 || body_len > self.layout.max_body_len {
                // 假同步：length 不可信，只前进一个字节，绝不按
                // 声称的帧长跳跃
                self.stats.bad_length += 1;
                debug!(
                    length = body_len,
                    max = self.layout.max_body_len,
                    "frame candidate rejected: implausible length"
                );
                self.advance_one(buffer, "bad length");
                continue;
            }

            self.state = SyncState::ValidatingChecksum;
            let total = self.layout.frame_size(body_len);
            let candidate = buffer.peek(total, deadline)?;

            if !self.layout.verify_frame(&candidate) {
                self.stats.bad_checksum += 1;
                debug!(
                    length = body_len,
                    format_id = header.format_id,
                    "frame candidate rejected: checksum mismatch"
                );
                self.advance_one(buffer, "bad checksum");
                continue;
            }

            // 整帧验证通过：恰好消费它占用的字节，一次且仅一次
            self.state = SyncState::FrameReady;
            buffer.skip(total);
            self.stats.frames_accepted += 1;
            trace!(
                length = body_len,
                format_id = header.format_id,
                "frame accepted"
            );

            return Ok(Frame {
                format_id: header.format_id,
                reserved: header.reserved,
                body: candidate[header_size..header_size + body_len].to_vec(),
            });
        }
    }

    fn advance_one<T: Transport>(&mut self, buffer: &StreamBuffer<T>, reason: &'static str) {
        trace!(reason, "resync: advancing one byte");
        buffer.skip(1);
        self.stats.bytes_skipped += 1;
        self.state = SyncState::SeekingSync;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::time::Duration;

    use rig_protocol::checksum::ChecksumAlgorithm;
    use rig_protocol::config::SyncMarker;

    struct ScriptedTransport {
        data: VecDeque<u8>,
        chunk: usize,
    }

    impl Transport for ScriptedTransport {
        fn write_all(&mut self, _bytes: &[u8]) -> Result<(), LinkError> {
            Ok(())
        }

        fn read_chunk(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize, LinkError> {
            if self.data.is_empty() {
                return Err(LinkError::Timeout);
            }
            let n = self.chunk.min(buf.len()).min(self.data.len());
            for slot in buf.iter_mut().take(n) {
                *slot = self.data.pop_front().unwrap_or_default();
            }
            Ok(n)
        }
    }

    fn crc32_layout() -> FrameLayout {
        FrameLayout::new(SyncMarker::u16(0xCAFE), ChecksumAlgorithm::ChainedCrc32, 1000)
    }

    fn buffer_over(data: Vec<u8>, chunk: usize) -> StreamBuffer<ScriptedTransport> {
        StreamBuffer::new(ScriptedTransport {
            data: data.into(),
            chunk,
        })
    }

    fn soon() -> Instant {
        Instant::now() + Duration::from_millis(200)
    }

    #[test]
    fn test_clean_stream_single_frame() {
        let layout = crc32_layout();
        let frame = layout.encode_frame(0x0101, &[1, 2, 3, 4]).unwrap();
        let buf = buffer_over(frame, 64);

        let mut sync = FrameSynchronizer::new(layout);
        let got = sync.next_frame(&buf, soon()).unwrap();
        assert_eq!(got.format_id, 0x0101);
        assert_eq!(got.body, vec![1, 2, 3, 4]);
        assert_eq!(sync.stats().frames_accepted, 1);
        assert_eq!(sync.stats().bytes_skipped, 0);
        assert_eq!(buf.buffered(), 0);
    }

    #[test]
    fn test_leading_garbage_is_skipped() {
        let layout = crc32_layout();
        let mut stream = vec![0x00, 0x17, 0xCA, 0x00]; // 含一个孤立的 0xCA
        let frame = layout.encode_frame(3, &[9, 9, 9]).unwrap();
        stream.extend_from_slice(&frame);

        let buf = buffer_over(stream, 64);
        let mut sync = FrameSynchronizer::new(layout);
        let got = sync.next_frame(&buf, soon()).unwrap();
        assert_eq!(got.body, vec![9, 9, 9]);
        assert_eq!(sync.stats().bytes_skipped, 4);
    }

    #[test]
    fn test_bad_length_advances_one_byte_not_header_width() {
        let layout = crc32_layout();
        // 伪帧头：sync 命中但 length = 0（非法）
        let mut stream = vec![0xCA, 0xFE, 0x00, 0x00];
        // 紧随其后的垃圾 + 真帧
        stream.extend_from_slice(&[0xAA; 8]);
        let frame = layout.encode_frame(1, &[0x42]).unwrap();
        stream.extend_from_slice(&frame);

        let buf = buffer_over(stream, 64);
        let mut sync = FrameSynchronizer::new(layout);
        let got = sync.next_frame(&buf, soon()).unwrap();
        assert_eq!(got.body, vec![0x42]);
        assert_eq!(sync.stats().bad_length, 1);
        // 伪同步只花掉一个字节的前进，其余都是逐字节扫描
        assert_eq!(sync.stats().bytes_skipped, 12);
    }

    #[test]
    fn test_true_frame_overlapping_false_sync_is_not_skipped() {
        let layout = crc32_layout();
        let frame = layout.encode_frame(1, &[7, 7]).unwrap();

        // 在真帧前插一个会把 length 指进真帧内部的假帧头前缀：
        // 若检测器按声称长度跳跃就会吞掉真帧
        let mut stream = vec![0xCA, 0xFE, 0xF0, 0x00]; // length = 240，超出剩余数据
        stream.extend_from_slice(&frame);

        let buf = buffer_over(stream, 64);
        let mut sync = FrameSynchronizer::new(layout);
        // length=240 合法（≤1000），但整帧字节不足 → 等到截止返回 Timeout，
        // 数据原样保留，下一轮继续
        let first = sync.next_frame(&buf, Instant::now() + Duration::from_millis(20));
        assert!(matches!(first, Err(LinkError::Timeout)));

        // 流结束信号无从而来；模拟上游判定该候选死透后的继续扫描：
        // 手动丢一个字节（上层 Faulted→reset 路径），重扫仍能找到真帧
        buf.skip(1);
        let got = sync.next_frame(&buf, soon()).unwrap();
        assert_eq!(got.body, vec![7, 7]);
    }

    #[test]
    fn test_incomplete_stream_is_timeout_not_error() {
        let layout = crc32_layout();
        let frame = layout.encode_frame(1, &[1, 2, 3]).unwrap();
        let half = frame[..frame.len() / 2].to_vec();

        let buf = buffer_over(half, 64);
        let mut sync = FrameSynchronizer::new(layout);
        assert!(matches!(
            sync.next_frame(&buf, Instant::now() + Duration::from_millis(10)),
            Err(LinkError::Timeout)
        ));
        assert_eq!(sync.stats().frames_accepted, 0);
    }

    #[test]
    fn test_kermit_trailer_frame() {
        let layout = FrameLayout::new(
            SyncMarker::u32(0xA5FF00CC),
            ChecksumAlgorithm::Crc16Kermit,
            1000,
        );
        let mut stream = vec![0x5A, 0xA5, 0xFF]; // 前缀垃圾，含部分同步字
        let frame = layout.encode_frame(-5, &[0xDE, 0xAD]).unwrap();
        stream.extend_from_slice(&frame);

        let buf = buffer_over(stream, 3);
        let mut sync = FrameSynchronizer::new(layout);
        let got = sync.next_frame(&buf, soon()).unwrap();
        assert_eq!(got.format_id, -5);
        assert_eq!(got.body, vec![0xDE, 0xAD]);
    }
}
