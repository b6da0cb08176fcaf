//! # Rig Driver
//!
//! 通道生命周期管理：握手建连、稳态请求/应答交换、故障升级与复位。
//!
//! 每条物理通道一个 [`Channel`]，独占组合流缓冲、帧检测器与消息
//! 注册表。交换纪律是严格的一问一答（同一通道任意时刻至多一个
//! 在途请求），由 `&mut self` 的 API 形态在编译期兜住。

pub mod channel;
pub mod error;

pub use channel::{Channel, ConnectionState, LoopClaim};
pub use error::DriverError;
