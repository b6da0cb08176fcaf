//! 帧头布局与整帧编码/校验
//!
//! 一个参数化布局覆盖三条文档化通道的帧形态：
//!
//! ```text
//! [ sync : 2|4 ][ length : u16 LE ][ checksum : u32 LE（仅头内校验变体）]
//! [ format_id : i16 LE ][ reserved : u16 LE ]  ...body (length 字节)...
//! [ trailer checksum : u16 LE（仅尾部校验变体）]
//! ```
//!
//! - 链式 CRC-32 通道：2 字节 sync + 头内 4 字节校验（帧头 12 字节，无尾部）
//! - CRC-16/Kermit 通道：4 字节 sync + 尾部 2 字节校验（帧头 10 字节）
//!
//! `length` 只计 body 字节；整帧线上尺寸 = 帧头 + length + 尾部。

use crate::checksum::ChecksumAlgorithm;
use crate::codec::CodecError;
use crate::config::SyncMarker;

/// length 字段宽度
const LENGTH_FIELD: usize = 2;
/// format_id 字段宽度
const FORMAT_FIELD: usize = 2;
/// reserved 字段宽度
const RESERVED_FIELD: usize = 2;

/// 通道的帧布局（由 [`ChannelConfig`](crate::config::ChannelConfig) 派生）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameLayout {
    pub sync: SyncMarker,
    pub checksum: ChecksumAlgorithm,
    /// body 长度上限；`length` 字段只有通过该界限检查后才可信
    pub max_body_len: usize,
}

/// 解析出的帧头字段（尚未通过校验，不可作为数据外发）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub length: u16,
    /// 头内校验值；尾部校验变体恒为 0
    pub checksum: u32,
    pub format_id: i16,
    pub reserved: u16,
}

/// 通过全部校验、已从流中消费的帧
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub format_id: i16,
    pub reserved: u16,
    pub body: Vec<u8>,
}

impl FrameLayout {
    pub fn new(sync: SyncMarker, checksum: ChecksumAlgorithm, max_body_len: usize) -> Self {
        Self {
            sync,
            checksum,
            max_body_len,
        }
    }

    /// 头内校验字段宽度（尾部校验变体为 0）
    fn header_checksum_width(&self) -> usize {
        match self.checksum {
            ChecksumAlgorithm::ChainedCrc32 => 4,
            ChecksumAlgorithm::Crc16Kermit => 0,
        }
    }

    /// 尾部校验宽度
    pub fn trailer_size(&self) -> usize {
        match self.checksum {
            ChecksumAlgorithm::ChainedCrc32 => 0,
            ChecksumAlgorithm::Crc16Kermit => 2,
        }
    }

    /// 帧头字节数（同时是帧检测滑窗的宽度）
    pub fn header_size(&self) -> usize {
        self.sync.width() + LENGTH_FIELD + self.header_checksum_width() + FORMAT_FIELD
            + RESERVED_FIELD
    }

    /// header tail 的起始偏移（sync/length/checksum 之后）
    fn tail_offset(&self) -> usize {
        self.sync.width() + LENGTH_FIELD + self.header_checksum_width()
    }

    /// 给定 body 长度的整帧线上尺寸
    pub fn frame_size(&self, body_len: usize) -> usize {
        self.header_size() + body_len + self.trailer_size()
    }

    /// 窗口开头是否命中同步字
    pub fn sync_matches(&self, window: &[u8]) -> bool {
        self.sync.matches(window)
    }

    /// 从 header_size 字节的窗口解析帧头字段
    ///
    /// 只做字段提取；length 界限与校验由调用方按顺序裁决。
    pub fn parse_header(&self, window: &[u8]) -> Option<FrameHeader> {
        if window.len() < self.header_size() {
            return None;
        }
        let mut offset = self.sync.width();

        let length = u16::from_le_bytes([window[offset], window[offset + 1]]);
        offset += LENGTH_FIELD;

        let checksum = match self.checksum {
            ChecksumAlgorithm::ChainedCrc32 => {
                let v = u32::from_le_bytes([
                    window[offset],
                    window[offset + 1],
                    window[offset + 2],
                    window[offset + 3],
                ]);
                offset += 4;
                v
            },
            ChecksumAlgorithm::Crc16Kermit => 0,
        };

        let format_id = i16::from_le_bytes([window[offset], window[offset + 1]]);
        offset += FORMAT_FIELD;
        let reserved = u16::from_le_bytes([window[offset], window[offset + 1]]);

        Some(FrameHeader {
            length,
            checksum,
            format_id,
            reserved,
        })
    }

    /// 对完整候选帧（帧头 + body + 尾部）做精确范围校验
    pub fn verify_frame(&self, frame_bytes: &[u8]) -> bool {
        let hs = self.header_size();
        let Some(header) = self.parse_header(frame_bytes) else {
            return false;
        };
        let body_len = header.length as usize;
        if frame_bytes.len() != self.frame_size(body_len) {
            return false;
        }
        let body = &frame_bytes[hs..hs + body_len];

        match self.checksum {
            ChecksumAlgorithm::ChainedCrc32 => {
                let tail = &frame_bytes[self.tail_offset()..hs];
                self.checksum.verify(&[tail, body], header.checksum)
            },
            ChecksumAlgorithm::Crc16Kermit => {
                let trailer =
                    u16::from_le_bytes([frame_bytes[hs + body_len], frame_bytes[hs + body_len + 1]]);
                self.checksum.verify(&[&frame_bytes[..hs], body], trailer as u32)
            },
        }
    }

    /// 构建完整线上帧（发送路径与测试共用）
    ///
    /// body 长度必须落在 `[1, max_body_len]`，越界视为编程错误。
    pub fn encode_frame(&self, format_id: i16, body: &[u8]) -> Result<Vec<u8>, CodecError> {
        // length 字段是 u16，布局上限同时受字段宽度约束
        let max = self.max_body_len.min(u16::MAX as usize);
        if body.is_empty() || body.len() > max {
            return Err(CodecError::EncodingBodyLength {
                len: body.len(),
                max,
            });
        }

        let mut out = Vec::with_capacity(self.frame_size(body.len()));
        self.sync.push_wire(&mut out);
        out.extend_from_slice(&(body.len() as u16).to_le_bytes());

        match self.checksum {
            ChecksumAlgorithm::ChainedCrc32 => {
                let mut tail = Vec::with_capacity(FORMAT_FIELD + RESERVED_FIELD);
                tail.extend_from_slice(&format_id.to_le_bytes());
                tail.extend_from_slice(&0u16.to_le_bytes());

                let value = self.checksum.compute(&[&tail, body]);
                out.extend_from_slice(&value.to_le_bytes());
                out.extend_from_slice(&tail);
                out.extend_from_slice(body);
            },
            ChecksumAlgorithm::Crc16Kermit => {
                out.extend_from_slice(&format_id.to_le_bytes());
                out.extend_from_slice(&0u16.to_le_bytes());
                out.extend_from_slice(body);

                let hs = self.header_size();
                let value = self.checksum.compute(&[&out[..hs], body]);
                out.extend_from_slice(&(value as u16).to_le_bytes());
            },
        }
        Ok(out)
    }
}
