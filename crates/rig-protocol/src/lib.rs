//! # Rig Protocol
//!
//! 产线测试通道的线级协议定义（无硬件依赖）
//!
//! ## 模块
//!
//! - `codec`: 声明式消息编解码（字段表驱动，新增报文类型无需新解析代码）
//! - `checksum`: 可插拔校验算法（链式 CRC-32 / CRC-16 Kermit）
//! - `header`: 帧头布局与整帧编码/校验
//! - `registry`: 静态 `{type_code -> MessageDescriptor}` 分发表
//! - `config`: 通道配置类型（同步字、校验策略、链路参数）
//!
//! ## 分层位置
//!
//! ```text
//! Driver Layer (rig-driver)
//!     ↓ encode_frame() 构建 / verify_frame() 校验
//! FrameLayout / MessageDescriptor (本 crate)
//!     ↓ 字节流
//! Link Layer (rig-link)
//!     ↓ 串口 / UDP 适配器
//! Hardware
//! ```
//!
//! ## 字节序
//!
//! 帧头数值字段（length / checksum / format_id / reserved）一律 little-endian；
//! 同步字按书写顺序落线（`0xCAFE` 在线上是 `CA FE`）。消息体字段的字节序
//! 由 [`codec::FieldSpec`] 逐字段声明。

pub mod checksum;
pub mod codec;
pub mod config;
pub mod header;
pub mod registry;

pub use checksum::ChecksumAlgorithm;
pub use codec::{CodecError, Endianness, FieldSpec, FieldWidth, MessageDescriptor, Signedness};
pub use config::{ChannelConfig, HandshakeConfig, SyncMarker, TransportSettings};
pub use header::{Frame, FrameHeader, FrameLayout};
pub use registry::{DecodedMessage, MessageRegistry, RegistryError};
