//! # rig-control: 并发控制循环
//!
//! 在专用线程里按固定节拍驱动一条通道：每个 tick 发一条请求、
//! 等一条应答、把过程量样本推进 boxcar 窗口，整窗平均进入容差带
//! 时发出一次性收敛事件。
//!
//! 分层：
//!
//! ```text
//! rig-control  ←─ 本 crate：节拍、窗口、事件
//!      ↓
//! rig-driver   ←─ 通道状态机、一问一答
//!      ↓
//! rig-link     ←─ 流缓冲、帧检测、物理传输
//! ```
//!
//! 循环独占通道（所有权移入线程），同一通道同时至多一个循环由
//! [`rig_driver::Channel::claim_loop`] 保证。

pub mod boxcar;
pub mod runner;

pub use boxcar::BoxcarWindow;
pub use runner::{ControlHandle, ControlLoop, LoopConfig, LoopEvent, TelemetryPlant};
