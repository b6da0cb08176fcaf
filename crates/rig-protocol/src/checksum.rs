//! 可插拔校验算法
//!
//! 每个物理通道通过配置选择一种算法，帧检测逻辑本身不感知算法差异。
//!
//! ## 链式 CRC-32（安全接口 / 网络控制器通道）
//!
//! `crc = crc32(body, seed = crc32(header_tail))`，其中 `header_tail`
//! 是帧头里 sync/length/checksum 之后的字节。
//!
//! ⚠️ 两步链式计算与单遍 `crc32(header_tail || body)` **不等价**：
//! seed 是第一段 *完成态* 的 CRC（含输出异或），作为初值直接进入第二段，
//! 输出异或没有被抵消。下游硬件就是这样算的，不要"化简"。
//!
//! ## CRC-16/Kermit（夹具控制通道）
//!
//! `crc = crc16kermit(header || body)`，覆盖含 sync/length 的整个帧头。

use crc::{CRC_16_KERMIT, CRC_32_ISO_HDLC, Crc};
use serde::{Deserialize, Serialize};

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);
const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_KERMIT);

/// 校验算法选择（按通道配置）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChecksumAlgorithm {
    /// 链式 CRC-32：`ranges[0]` 作 seed 段，其余段串联
    ChainedCrc32,
    /// CRC-16/Kermit：所有段串联，单遍计算
    Crc16Kermit,
}

impl ChecksumAlgorithm {
    /// 校验值在线上的字节宽度
    pub fn width(self) -> usize {
        match self {
            Self::ChainedCrc32 => 4,
            Self::Crc16Kermit => 2,
        }
    }

    /// 计算给定覆盖范围的校验值
    ///
    /// `ranges` 按覆盖顺序传入；对 `ChainedCrc32`，第一段是 seed 段
    /// （header tail），其余段（body）用 seed 作初值链式计算。
    pub fn compute(self, ranges: &[&[u8]]) -> u32 {
        match self {
            Self::ChainedCrc32 => {
                let Some((seed_range, chained)) = ranges.split_first() else {
                    return 0;
                };
                let seed = CRC32.checksum(seed_range);
                let mut digest = CRC32.digest_with_initial(seed);
                for range in chained {
                    digest.update(range);
                }
                digest.finalize()
            },
            Self::Crc16Kermit => {
                let mut digest = CRC16.digest();
                for range in ranges {
                    digest.update(range);
                }
                digest.finalize() as u32
            },
        }
    }

    /// 校验：重算并与期望值比较
    pub fn verify(self, ranges: &[&[u8]], expected: u32) -> bool {
        self.compute(ranges) == expected
    }
}
