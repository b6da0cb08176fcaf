//! # Rig Link
//!
//! 物理链路抽象层：统一的字节流读写契约 + 线程安全流缓冲 + 重同步帧检测。
//!
//! ## 模块
//!
//! - [`serial`]: 串口适配器（`serialport`）
//! - [`udp`]: UDP 适配器（数据端口 + 独立握手端口）
//! - [`mock`]: 脚本化测试适配器（feature `mock`）
//! - [`buffer`]: 可增长的线程安全字节队列（非消费 peek / 消费 read）
//! - [`sync`]: 同步字扫描 + 长度界限 + 校验验证的帧检测状态机

use std::time::{Duration, Instant};

use thiserror::Error;

pub mod buffer;
pub mod serial;
pub mod sync;
pub mod udp;

#[cfg(feature = "mock")]
pub mod mock;

pub use buffer::StreamBuffer;
pub use serial::SerialTransport;
pub use sync::{FrameSyncStats, FrameSynchronizer};
pub use udp::UdpTransport;

/// 链路层统一错误类型
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    /// 截止时刻前没拿到足够字节；通道保持原状态，由调用方决定重试
    #[error("Read timeout")]
    Timeout,

    /// 流缓冲超出容量上限（持续垃圾输入的保险丝）
    #[error("Stream buffer overflow (capacity: {capacity} bytes)")]
    BufferOverflow { capacity: usize },

    #[error("Transport error: {0}")]
    Transport(String),
}

/// 物理链路的统一读写契约
///
/// 串口与 UDP 都收敛到同一组原语；上层（流缓冲 / 连接管理）
/// 不感知链路种类。
pub trait Transport: Send {
    /// 把整段字节写到链路上
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), LinkError>;

    /// 读一块数据到 `buf`，最多等 `timeout`
    ///
    /// 契约：有数据时返回 `Ok(n)`（n > 0）；超时返回
    /// [`LinkError::Timeout`]；不会返回 `Ok(0)`。
    fn read_chunk(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, LinkError>;

    /// 丢弃链路上能立即取到的所有滞留数据（握手前清场）
    fn discard_input(&mut self) -> Result<(), LinkError> {
        let mut scratch = [0u8; 256];
        loop {
            match self.read_chunk(&mut scratch, Duration::ZERO) {
                Ok(0) | Err(LinkError::Timeout) => return Ok(()),
                Ok(_) => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// 发出握手探测并等待应答字面量
    ///
    /// 默认实现走数据通路：写 `probe`，在截止前累积读入，任何位置
    /// 出现 `ack` 即成功。UDP 适配器重写本方法，改走独立握手端口。
    fn handshake_exchange(
        &mut self,
        probe: &[u8],
        ack: &[u8],
        timeout: Duration,
    ) -> Result<(), LinkError> {
        probe_and_scan(self, probe, ack, timeout)
    }
}

/// 数据通路握手：写 `probe`，在截止前累积读入，任何位置出现
/// `ack` 即成功
///
/// trait 默认实现和 UDP 适配器的无独立端口回退共用这一份扫描。
pub(crate) fn probe_and_scan<T: Transport + ?Sized>(
    transport: &mut T,
    probe: &[u8],
    ack: &[u8],
    timeout: Duration,
) -> Result<(), LinkError> {
    transport.write_all(probe)?;
    if ack.is_empty() {
        return Ok(());
    }

    let deadline = Instant::now() + timeout;
    let mut collected: Vec<u8> = Vec::new();
    let mut chunk = [0u8; 256];
    loop {
        let left = remaining(deadline);
        if left.is_zero() {
            return Err(LinkError::Timeout);
        }
        let n = transport.read_chunk(&mut chunk, left)?;
        collected.extend_from_slice(&chunk[..n]);
        if collected.windows(ack.len()).any(|w| w == ack) {
            return Ok(());
        }
    }
}

/// 截止时刻换算成剩余等待时长（已过期则为零）
pub(crate) fn remaining(deadline: Instant) -> Duration {
    deadline.saturating_duration_since(Instant::now())
}
