//! # rig-sdk: 产测工装通讯 SDK
//!
//! 面向产线测试台的统一入口，把四个分层 crate 聚合成一个依赖：
//!
//! ```text
//! rig-sdk
//!  ├── rig-control   控制循环：节拍、boxcar 收敛、事件
//!  ├── rig-driver    通道状态机：握手、一问一答、故障升级
//!  ├── rig-link      物理链路：串口/UDP 传输、流缓冲、帧检测
//!  └── rig-protocol  协议：帧布局、校验、消息编解码、注册表
//! ```
//!
//! ## 快速上手
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use rig_sdk::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     rig_sdk::init_tracing();
//!
//!     // 消息注册表：type code -> 字段布局
//!     let registry = MessageRegistry::from_descriptors([MessageDescriptor::new(
//!         "FixtureStatus",
//!         0x0101,
//!         vec![
//!             FieldSpec::unsigned_le("station", FieldWidth::W1),
//!             FieldSpec::signed_le("temperature_mdeg", FieldWidth::W4),
//!         ],
//!     )])?;
//!
//!     // 2 字节 sync + 链式 CRC-32 的串口通道
//!     let config = ChannelConfig::serial_crc32("fixture", 0xCAFE, "/dev/ttyUSB0", 460_800);
//!     let transport = SerialTransport::open("/dev/ttyUSB0", 460_800)?;
//!     let mut channel = Channel::new(&config, transport, registry);
//!
//!     channel.connect()?;
//!     let status = channel.transact(0x0101, &[1, 0], Duration::from_millis(200))?;
//!     println!("{status:?}");
//!     Ok(())
//! }
//! ```

pub use rig_control as control;
pub use rig_driver as driver;
pub use rig_link as link;
pub use rig_protocol as protocol;

/// 常用类型一把抓
pub mod prelude {
    pub use rig_control::{ControlHandle, ControlLoop, LoopConfig, LoopEvent, TelemetryPlant};
    pub use rig_driver::{Channel, ConnectionState, DriverError, LoopClaim};
    pub use rig_link::{
        FrameSyncStats, FrameSynchronizer, LinkError, SerialTransport, StreamBuffer, Transport,
        UdpTransport,
    };
    pub use rig_protocol::{
        ChannelConfig, ChecksumAlgorithm, CodecError, DecodedMessage, FieldSpec, FieldWidth,
        Frame, FrameLayout, HandshakeConfig, MessageDescriptor, MessageRegistry, SyncMarker,
        TransportSettings,
    };
}

/// 初始化 tracing 订阅器（RUST_LOG 控制级别，默认 info）
///
/// 重复调用安全：第二次起静默失败。
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .try_init();
}
