//! 通道配置类型
//!
//! 配置由外部加载器（不在本层职责内）从 TOML/JSON 产出，这里只定义
//! 可反序列化的类型和三种文档化通道形态的规范构造器。
//! 时长一律用 `*_ms` 的整数毫秒字段（与管线配置的惯例一致）。

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::checksum::ChecksumAlgorithm;
use crate::header::FrameLayout;

/// 同步字：定位帧起点的固定位模式
///
/// `width` 只允许 2 或 4；线上按书写顺序落字节
/// （`0xCAFE` 在线上是 `CA FE`，`0xA5FF00CC` 是 `A5 FF 00 CC`）。
/// 反序列化经 [`RawSyncMarker`] 校验，外部配置里的非法宽度在
/// 加载时就被拒绝。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawSyncMarker")]
pub struct SyncMarker {
    value: u32,
    width: u8,
}

/// 未校验的同步字字段（仅反序列化中转用）
#[derive(Deserialize)]
struct RawSyncMarker {
    value: u32,
    width: u8,
}

impl TryFrom<RawSyncMarker> for SyncMarker {
    type Error = String;

    fn try_from(raw: RawSyncMarker) -> Result<Self, Self::Error> {
        match raw.width {
            2 => {
                if raw.value > u32::from(u16::MAX) {
                    return Err(format!(
                        "sync marker value {:#x} does not fit in 2 bytes",
                        raw.value
                    ));
                }
                Ok(SyncMarker::u16(raw.value as u16))
            },
            4 => Ok(SyncMarker::u32(raw.value)),
            w => Err(format!("sync marker width must be 2 or 4, got {w}")),
        }
    }
}

impl SyncMarker {
    /// 2 字节同步字
    pub fn u16(value: u16) -> Self {
        Self {
            value: value as u32,
            width: 2,
        }
    }

    /// 4 字节同步字
    pub fn u32(value: u32) -> Self {
        Self { value, width: 4 }
    }

    pub fn value(&self) -> u32 {
        self.value
    }

    pub fn width(&self) -> usize {
        self.width as usize
    }

    /// 窗口开头是否命中同步字
    pub fn matches(&self, window: &[u8]) -> bool {
        let w = self.width();
        debug_assert!(w == 2 || w == 4);
        let be = self.value.to_be_bytes();
        window.len() >= w && window[..w] == be[4 - w..]
    }

    /// 把线上字节追加到输出缓冲
    pub fn push_wire(&self, out: &mut Vec<u8>) {
        let w = self.width();
        let be = self.value.to_be_bytes();
        out.extend_from_slice(&be[4 - w..]);
    }
}

/// 物理链路参数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransportSettings {
    /// 串口链路
    Serial {
        /// 设备标识（如 `/dev/ttyUSB0`、`COM3`）
        device: String,
        baud_rate: u32,
    },
    /// UDP 链路；握手走独立端口（数据端口启用之前）
    Udp {
        /// 数据端口地址（`host:port`）
        data_addr: String,
        /// 握手端口地址；None 表示该通道无握手交换
        handshake_addr: Option<String>,
    },
}

/// 握手配置：明文探测串 + 应答串 + 有界重试
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeConfig {
    /// 探测串（明文字面量）
    pub probe: String,
    /// 期望的应答字面量
    pub ack: String,
    /// 最大尝试次数
    pub retries: u32,
    /// 单次尝试超时（毫秒）
    pub attempt_timeout_ms: u64,
    /// 相邻尝试之间的固定间隔（毫秒）
    pub retry_delay_ms: u64,
}

impl HandshakeConfig {
    pub fn new(probe: impl Into<String>, ack: impl Into<String>) -> Self {
        Self {
            probe: probe.into(),
            ack: ack.into(),
            retries: 3,
            attempt_timeout_ms: 100,
            retry_delay_ms: 0,
        }
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// 单条物理通道的静态配置
///
/// 启动时装配，运行期只读。`max_body_len` 是信任 `length` 字段的
/// 前置界限：界限检查不通过的候选帧一律按假同步处理。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub name: String,
    pub sync: SyncMarker,
    pub checksum: ChecksumAlgorithm,
    pub max_body_len: usize,
    pub transport: TransportSettings,
    pub handshake: Option<HandshakeConfig>,
    /// Connected 态下连续接收超时多少次后升级为 Faulted
    pub max_consecutive_timeouts: u32,
}

impl ChannelConfig {
    /// 安全接口式串口通道：2 字节 sync + 链式 CRC-32
    pub fn serial_crc32(
        name: impl Into<String>,
        sync: u16,
        device: impl Into<String>,
        baud_rate: u32,
    ) -> Self {
        Self {
            name: name.into(),
            sync: SyncMarker::u16(sync),
            checksum: ChecksumAlgorithm::ChainedCrc32,
            max_body_len: 1024,
            transport: TransportSettings::Serial {
                device: device.into(),
                baud_rate,
            },
            handshake: None,
            max_consecutive_timeouts: 5,
        }
    }

    /// 夹具控制式串口通道：4 字节 sync + 尾部 CRC-16/Kermit
    pub fn serial_kermit(
        name: impl Into<String>,
        sync: u32,
        device: impl Into<String>,
        baud_rate: u32,
    ) -> Self {
        Self {
            name: name.into(),
            sync: SyncMarker::u32(sync),
            checksum: ChecksumAlgorithm::Crc16Kermit,
            max_body_len: 1024,
            transport: TransportSettings::Serial {
                device: device.into(),
                baud_rate,
            },
            handshake: None,
            max_consecutive_timeouts: 5,
        }
    }

    /// 网络控制器式 UDP 通道：2 字节 sync + 链式 CRC-32 + 独立端口明文握手
    pub fn udp_crc32(
        name: impl Into<String>,
        sync: u16,
        data_addr: impl Into<String>,
        handshake_addr: impl Into<String>,
        handshake: HandshakeConfig,
    ) -> Self {
        Self {
            name: name.into(),
            sync: SyncMarker::u16(sync),
            checksum: ChecksumAlgorithm::ChainedCrc32,
            max_body_len: 1024,
            transport: TransportSettings::Udp {
                data_addr: data_addr.into(),
                handshake_addr: Some(handshake_addr.into()),
            },
            handshake: Some(handshake),
            max_consecutive_timeouts: 5,
        }
    }

    pub fn with_max_body_len(mut self, max_body_len: usize) -> Self {
        self.max_body_len = max_body_len;
        self
    }

    /// 派生帧布局（帧检测与发送路径共用）
    pub fn layout(&self) -> FrameLayout {
        FrameLayout::new(self.sync, self.checksum, self.max_body_len)
    }
}
