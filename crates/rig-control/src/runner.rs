//! 控制循环运行器
//!
//! 专用线程按固定节拍执行 请求 → 应答 → 判定：
//!
//! ```text
//! tick:  build_request → send → recv(可中断) → extract → 窗口平均 → 事件
//! ```
//!
//! 节拍用绝对时间锚点推进（anchor += period），单次 tick 的抖动
//! 不会累积成漂移。等待应答期间持续检查取消标志，stop() 不需要
//! 等到当前超时走完。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, bounded};
use tracing::{debug, error, info, warn};

use rig_driver::{Channel, ConnectionState, DriverError};
use rig_link::Transport;
use rig_protocol::registry::DecodedMessage;

use crate::boxcar::BoxcarWindow;

/// 事件通道容量；循环线程从不在事件发送上阻塞，消费者不读时
/// 丢弃新事件，末尾槽位始终留给 Stopped
const EVENT_CAPACITY: usize = 16;

/// 非阻塞发事件：留最后一个槽位给 Stopped
///
/// 发送端只有循环线程一个，len() 检查与 try_send 之间容量只会
/// 变大不会变小。
fn emit(events: &Sender<LoopEvent>, event: LoopEvent) {
    if events.len() < EVENT_CAPACITY - 1 {
        let _ = events.try_send(event);
    }
}

/// 被控对象的业务适配
///
/// 循环本身不懂任何消息语义：每个 tick 问 plant 要一条请求，
/// 拿到应答后让 plant 从中抽样。`extract` 返回 `None` 表示该
/// 应答与过程量无关（比如别的遥测帧），跳过即可，不算失败。
pub trait TelemetryPlant: Send + 'static {
    /// 构造第 `seq` 个 tick 的请求（type code + 字段值）
    fn build_request(&mut self, seq: u32, elapsed_ms: u64) -> (i16, Vec<i64>);

    /// 从应答里抽出过程量样本
    fn extract(&mut self, message: &DecodedMessage) -> Option<f64>;
}

/// 循环配置
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// tick 周期
    pub period_ms: u64,
    /// boxcar 窗口长度（样本数）
    pub window_size: usize,
    /// 收敛目标
    pub target: f64,
    /// 收敛容差（|mean - target| <= tolerance 判为到达）
    pub tolerance: f64,
    /// 单个 tick 等应答的上限
    pub response_timeout_ms: u64,
    /// 连续失败多少个 tick 后循环放弃并拉故障
    pub max_consecutive_failures: u32,
}

impl LoopConfig {
    pub fn new(target: f64, tolerance: f64) -> Self {
        Self {
            period_ms: 10,
            window_size: 8,
            target,
            tolerance,
            response_timeout_ms: 50,
            max_consecutive_failures: 5,
        }
    }

    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }
}

/// 循环对外事件
///
/// `Stopped` 在每条退出路径上都是最后一个事件。消费者不及时
/// 取走时多余事件被丢弃，循环节拍不受消费速度影响。
#[derive(Debug, Clone, PartialEq)]
pub enum LoopEvent {
    /// 整窗平均首次进入容差带（每个收敛回合只发一次）
    ReachedTarget { average: f64 },
    /// 循环放弃：连续失败超限或通道故障
    Faulted { reason: String },
    /// 循环线程退出
    Stopped,
}

/// 运行中循环的句柄
///
/// 通道和 plant 的所有权在循环线程里，stop() 时归还。
pub struct ControlHandle<T: Transport + 'static, P: TelemetryPlant> {
    cancel: Arc<AtomicBool>,
    events: Receiver<LoopEvent>,
    thread: Option<JoinHandle<(Channel<T>, P)>>,
}

impl<T: Transport + 'static, P: TelemetryPlant> std::fmt::Debug for ControlHandle<T, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlHandle")
            .field("cancel", &self.cancel)
            .field("finished", &self.is_finished())
            .finish_non_exhaustive()
    }
}

impl<T: Transport + 'static, P: TelemetryPlant> ControlHandle<T, P> {
    /// 事件接收端（crossbeam，可 select / recv_timeout）
    pub fn events(&self) -> &Receiver<LoopEvent> {
        &self.events
    }

    /// 请求停止并等线程退出，归还通道与 plant
    pub fn stop(mut self) -> (Channel<T>, P) {
        self.cancel.store(true, Ordering::Release);
        // stop() 消费 self，Drop 还没跑过，线程句柄必然还在
        let thread = self.thread.take().expect("loop thread already joined");
        match thread.join() {
            Ok(pair) => pair,
            Err(payload) => std::panic::resume_unwind(payload),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(|t| t.is_finished())
    }
}

impl<T: Transport + 'static, P: TelemetryPlant> Drop for ControlHandle<T, P> {
    fn drop(&mut self) {
        // 句柄被丢弃也不能让循环线程悬着
        if let Some(thread) = self.thread.take() {
            self.cancel.store(true, Ordering::Release);
            let _ = thread.join();
        }
    }
}

/// 控制循环入口
pub struct ControlLoop;

impl ControlLoop {
    /// 占用通道的循环名额并启动循环线程
    ///
    /// 通道必须已 Connected。名额由返回句柄间接持有，线程退出时
    /// 自动释放。
    pub fn spawn<T, P>(
        mut channel: Channel<T>,
        plant: P,
        config: LoopConfig,
    ) -> Result<ControlHandle<T, P>, DriverError>
    where
        T: Transport + 'static,
        P: TelemetryPlant,
    {
        let claim = channel.claim_loop()?;
        if channel.state() != ConnectionState::Connected {
            return Err(DriverError::InvalidState {
                state: channel.state(),
                operation: "spawn control loop",
            });
        }

        let (tx, rx) = bounded(EVENT_CAPACITY);
        let cancel = Arc::new(AtomicBool::new(false));
        let cancel_for_thread = Arc::clone(&cancel);
        let name = format!("rig-loop-{}", channel.name());

        let thread = thread::Builder::new()
            .name(name)
            .spawn(move || {
                let _claim = claim;
                run(channel, plant, config, cancel_for_thread, tx)
            })
            .map_err(|e| DriverError::Link(rig_link::LinkError::Io(e)))?;

        Ok(ControlHandle {
            cancel,
            events: rx,
            thread: Some(thread),
        })
    }
}

fn run<T, P>(
    mut channel: Channel<T>,
    mut plant: P,
    config: LoopConfig,
    cancel: Arc<AtomicBool>,
    events: Sender<LoopEvent>,
) -> (Channel<T>, P)
where
    T: Transport + 'static,
    P: TelemetryPlant,
{
    let period = config.period();
    let start = Instant::now();
    let mut next_tick = start + period;
    let mut window = BoxcarWindow::new(config.window_size);
    let mut converged = false;
    let mut consecutive_failures = 0u32;
    let mut seq = 0u32;

    info!(
        channel = channel.name(),
        period_ms = config.period_ms,
        window = config.window_size,
        target = config.target,
        "control loop started"
    );

    loop {
        if cancel.load(Ordering::Acquire) {
            break;
        }

        let elapsed_ms = start.elapsed().as_millis() as u64;
        let (type_code, values) = plant.build_request(seq, elapsed_ms);
        seq = seq.wrapping_add(1);

        let outcome = match channel.send_message(type_code, &values) {
            Ok(()) => channel.recv_message_interruptible(config.response_timeout(), &cancel),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(message) => {
                consecutive_failures = 0;
                // 不相关的应答（extract = None）既不进窗口也不算失败
                if let Some(sample) = plant.extract(&message) {
                    window.push(sample);
                    if let Some(average) = window.mean() {
                        if (average - config.target).abs() <= config.tolerance {
                            if !converged {
                                converged = true;
                                info!(
                                    channel = channel.name(),
                                    average,
                                    target = config.target,
                                    "window average reached target"
                                );
                                emit(&events, LoopEvent::ReachedTarget { average });
                            }
                        } else {
                            // 离开容差带，重新武装收敛事件
                            converged = false;
                        }
                    }
                }
            },
            Err(DriverError::Cancelled) => break,
            Err(DriverError::Timeout) => {
                consecutive_failures += 1;
                debug!(
                    channel = channel.name(),
                    consecutive = consecutive_failures,
                    "tick missed response"
                );
                if consecutive_failures >= config.max_consecutive_failures {
                    warn!(
                        channel = channel.name(),
                        consecutive = consecutive_failures,
                        "consecutive tick failures exceeded limit, giving up"
                    );
                    channel.fault();
                    emit(
                        &events,
                        LoopEvent::Faulted {
                            reason: format!(
                                "{consecutive_failures} consecutive ticks without a valid response"
                            ),
                        },
                    );
                    break;
                }
            },
            Err(e) => {
                error!(channel = channel.name(), %e, "control loop tick failed");
                channel.fault();
                emit(
                    &events,
                    LoopEvent::Faulted {
                        reason: e.to_string(),
                    },
                );
                break;
            },
        }

        // 绝对锚点推进；落后超过一个周期就重新锚定，避免补跑风暴
        let now = Instant::now();
        if next_tick > now {
            spin_sleep::sleep(next_tick - now);
            next_tick += period;
        } else {
            next_tick = now + period;
        }
    }

    // emit 从不占满通道，这里的 try_send 必然还有空位
    let _ = events.try_send(LoopEvent::Stopped);
    info!(channel = channel.name(), "control loop stopped");
    (channel, plant)
}
