//! 通道生命周期状态机
//!
//! ```text
//! Disconnected --connect()--> Connecting --ack--> Connected
//!                                  |                  |
//!                                  |(重试耗尽)        |(IO 错误 / 连续超时)
//!                                  v                  v
//!                               Faulted <-------------+
//!                                  |
//!                                  +--reset()--> Disconnected
//! ```
//!
//! 状态由 [`Channel`] 独占持有，只在本模块的转移函数里变更。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use rig_link::{FrameSynchronizer, LinkError, StreamBuffer, Transport};
use rig_protocol::config::{ChannelConfig, HandshakeConfig};
use rig_protocol::header::{Frame, FrameLayout};
use rig_protocol::registry::{DecodedMessage, MessageRegistry};

use crate::error::DriverError;

/// 取消轮询粒度：可中断等待把截止时刻切成这么大的片
const CANCEL_POLL: Duration = Duration::from_millis(10);

/// 连接状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Faulted,
}

/// 单条物理通道
///
/// 独占组合：流缓冲（接收路径）、帧检测器、消息注册表、发送路径。
/// 所有交换方法都是 `&mut self`——同一通道同一时刻至多一个在途
/// 请求是编译期性质，不需要运行期锁。
pub struct Channel<T: Transport> {
    name: String,
    state: ConnectionState,
    layout: FrameLayout,
    buffer: StreamBuffer<T>,
    synchronizer: FrameSynchronizer,
    registry: MessageRegistry,
    handshake: Option<HandshakeConfig>,
    consecutive_timeouts: u32,
    max_consecutive_timeouts: u32,
    loop_claimed: Arc<AtomicBool>,
}

/// 控制循环占用凭据：同一通道同时只发出一份
///
/// Drop 即释放占用（循环退出路径不需要显式归还）。
#[derive(Debug)]
pub struct LoopClaim {
    flag: Arc<AtomicBool>,
}

impl Drop for LoopClaim {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

impl<T: Transport> Channel<T> {
    pub fn new(config: &ChannelConfig, transport: T, registry: MessageRegistry) -> Self {
        let layout = config.layout();
        Self {
            name: config.name.clone(),
            state: ConnectionState::Disconnected,
            synchronizer: FrameSynchronizer::new(layout.clone()),
            layout,
            buffer: StreamBuffer::new(transport),
            registry,
            handshake: config.handshake.clone(),
            consecutive_timeouts: 0,
            max_consecutive_timeouts: config.max_consecutive_timeouts,
            loop_claimed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn registry(&self) -> &MessageRegistry {
        &self.registry
    }

    /// 帧检测诊断计数
    pub fn sync_stats(&self) -> rig_link::FrameSyncStats {
        self.synchronizer.stats()
    }

    fn require(&self, required: ConnectionState, operation: &'static str) -> Result<(), DriverError> {
        if self.state == required {
            Ok(())
        } else {
            Err(DriverError::InvalidState {
                state: self.state,
                operation,
            })
        }
    }

    /// 建连：发握手探测，有界重试 + 固定间隔 + 单次超时
    ///
    /// 每次尝试前都清掉链路上的滞留数据。没配握手的通道（纯串口
    /// 即插即用形态）清场后直接进入 Connected。
    pub fn connect(&mut self) -> Result<(), DriverError> {
        self.require(ConnectionState::Disconnected, "connect")?;
        self.state = ConnectionState::Connecting;

        let Some(handshake) = self.handshake.clone() else {
            self.buffer.discard_pending()?;
            self.state = ConnectionState::Connected;
            info!(channel = %self.name, "connected (no handshake configured)");
            return Ok(());
        };

        for attempt in 1..=handshake.retries {
            // 清掉上一轮尝试和断连期间的滞留数据
            self.buffer.discard_pending()?;

            match self.buffer.handshake(
                handshake.probe.as_bytes(),
                handshake.ack.as_bytes(),
                handshake.attempt_timeout(),
            ) {
                Ok(()) => {
                    self.state = ConnectionState::Connected;
                    self.consecutive_timeouts = 0;
                    info!(channel = %self.name, attempt, "handshake acknowledged, connected");
                    return Ok(());
                },
                Err(LinkError::Timeout) => {
                    warn!(
                        channel = %self.name,
                        attempt,
                        retries = handshake.retries,
                        "handshake attempt timed out"
                    );
                    if attempt < handshake.retries && !handshake.retry_delay().is_zero() {
                        thread::sleep(handshake.retry_delay());
                    }
                },
                Err(e) => {
                    error!(channel = %self.name, %e, "handshake failed with link error");
                    self.state = ConnectionState::Faulted;
                    return Err(e.into());
                },
            }
        }

        self.state = ConnectionState::Faulted;
        error!(
            channel = %self.name,
            attempts = handshake.retries,
            "handshake retries exhausted"
        );
        Err(DriverError::ConnectFailed {
            attempts: handshake.retries,
        })
    }

    /// 按注册表编码并发送一条消息（format_id = type code）
    pub fn send_message(&mut self, type_code: i16, values: &[i64]) -> Result<(), DriverError> {
        self.require(ConnectionState::Connected, "send_message")?;
        let body = self.registry.encode(type_code, values)?;
        let frame = self.layout.encode_frame(type_code, &body)?;
        self.write_frame(&frame)
    }

    /// 发送不透明消息体（UDP 通道的业务载荷路径）
    pub fn send_raw(&mut self, format_id: i16, body: &[u8]) -> Result<(), DriverError> {
        self.require(ConnectionState::Connected, "send_raw")?;
        let frame = self.layout.encode_frame(format_id, body)?;
        self.write_frame(&frame)
    }

    fn write_frame(&mut self, frame: &[u8]) -> Result<(), DriverError> {
        if let Err(e) = self.buffer.write(frame) {
            error!(channel = %self.name, %e, "send failed, escalating to Faulted");
            self.state = ConnectionState::Faulted;
            return Err(e.into());
        }
        Ok(())
    }

    /// 等待下一个完整有效帧
    ///
    /// 超时原样上抛（绝不静默内部重试）；连续超时达到阈值后通道
    /// 升级为 Faulted。校验失败的候选帧在检测器内部消化，这里只会
    /// 看到有效帧、超时或链路故障。
    pub fn recv_frame(&mut self, timeout: Duration) -> Result<Frame, DriverError> {
        self.require(ConnectionState::Connected, "recv_frame")?;
        let deadline = Instant::now() + timeout;
        match self.synchronizer.next_frame(&self.buffer, deadline) {
            Ok(frame) => {
                self.consecutive_timeouts = 0;
                Ok(frame)
            },
            Err(LinkError::Timeout) => Err(self.note_timeout()),
            Err(e) => {
                error!(channel = %self.name, %e, "receive failed, escalating to Faulted");
                self.state = ConnectionState::Faulted;
                Err(e.into())
            },
        }
    }

    /// 接收并按注册表解码
    pub fn recv_message(&mut self, timeout: Duration) -> Result<DecodedMessage, DriverError> {
        let frame = self.recv_frame(timeout)?;
        Ok(self.registry.decode(frame.format_id, &frame.body)?)
    }

    /// 可中断接收：等待期间以 [`CANCEL_POLL`] 粒度检查取消标志
    ///
    /// 控制循环的应答等待走这里——取消不但在 tick 顶部生效，也能
    /// 打断在途等待。部分组装好的帧字节留在缓冲里，下次继续。
    pub fn recv_message_interruptible(
        &mut self,
        timeout: Duration,
        cancel: &AtomicBool,
    ) -> Result<DecodedMessage, DriverError> {
        self.require(ConnectionState::Connected, "recv_message")?;
        let deadline = Instant::now() + timeout;
        loop {
            if cancel.load(Ordering::Acquire) {
                return Err(DriverError::Cancelled);
            }
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                return Err(self.note_timeout());
            }
            let slice = Instant::now() + left.min(CANCEL_POLL);
            match self.synchronizer.next_frame(&self.buffer, slice) {
                Ok(frame) => {
                    self.consecutive_timeouts = 0;
                    return Ok(self.registry.decode(frame.format_id, &frame.body)?);
                },
                Err(LinkError::Timeout) => continue,
                Err(e) => {
                    error!(channel = %self.name, %e, "receive failed, escalating to Faulted");
                    self.state = ConnectionState::Faulted;
                    return Err(e.into());
                },
            }
        }
    }

    /// 一问一答：编码发送，再等应答并解码
    pub fn transact(
        &mut self,
        type_code: i16,
        values: &[i64],
        timeout: Duration,
    ) -> Result<DecodedMessage, DriverError> {
        self.send_message(type_code, values)?;
        self.recv_message(timeout)
    }

    /// 整次等待超时的记账：计数、按阈值升级
    fn note_timeout(&mut self) -> DriverError {
        self.consecutive_timeouts += 1;
        debug!(
            channel = %self.name,
            consecutive = self.consecutive_timeouts,
            "receive timeout"
        );
        if self.consecutive_timeouts >= self.max_consecutive_timeouts {
            warn!(
                channel = %self.name,
                consecutive = self.consecutive_timeouts,
                "consecutive timeout threshold reached, escalating to Faulted"
            );
            self.state = ConnectionState::Faulted;
            DriverError::ChannelFaulted {
                consecutive: self.consecutive_timeouts,
            }
        } else {
            DriverError::Timeout
        }
    }

    /// 外部升级（控制循环连续失败超阈值时调用）
    pub fn fault(&mut self) {
        if self.state != ConnectionState::Faulted {
            warn!(channel = %self.name, from = ?self.state, "channel escalated to Faulted");
            self.state = ConnectionState::Faulted;
        }
    }

    /// Faulted → Disconnected：清空缓冲与计数，之后可重新 connect
    pub fn reset(&mut self) -> Result<(), DriverError> {
        self.require(ConnectionState::Faulted, "reset")?;
        self.buffer.discard_pending()?;
        self.consecutive_timeouts = 0;
        self.state = ConnectionState::Disconnected;
        info!(channel = %self.name, "channel reset to Disconnected");
        Ok(())
    }

    /// 占用本通道的控制循环名额
    ///
    /// 单活动循环是通道自身的显式不变量（而不是全局锁）：已被占用
    /// 时第二次申请直接拒绝。
    pub fn claim_loop(&mut self) -> Result<LoopClaim, DriverError> {
        if self
            .loop_claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(DriverError::LoopAlreadyActive);
        }
        Ok(LoopClaim {
            flag: Arc::clone(&self.loop_claimed),
        })
    }

    pub fn loop_active(&self) -> bool {
        self.loop_claimed.load(Ordering::Acquire)
    }
}
