//! 脚本化测试传输（feature `mock`）
//!
//! 无硬件依赖：预置/动态注入入站字节，捕获全部出站写入，可限制
//! 单次读取的块大小来模拟逐字节到达的链路。握手走 trait 默认实现，
//! 应答由 responder 闭包按需注入——不设 responder 就是"永不应答
//! 的对端"。

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::{LinkError, Transport, remaining};

type Responder = Box<dyn FnMut(&[u8]) -> Vec<u8> + Send>;

/// 入站字节注入句柄（可跨线程喂数据）
#[derive(Clone)]
pub struct MockFeeder {
    rx: Arc<Mutex<VecDeque<u8>>>,
}

impl MockFeeder {
    pub fn push(&self, bytes: &[u8]) {
        self.rx.lock().extend(bytes.iter().copied());
    }

    pub fn pending(&self) -> usize {
        self.rx.lock().len()
    }
}

/// 出站捕获句柄
#[derive(Clone, Default)]
pub struct MockWrites {
    writes: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl MockWrites {
    /// 到目前为止的所有写入（每次 `write_all` 一条）
    pub fn all(&self) -> Vec<Vec<u8>> {
        self.writes.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.writes.lock().len()
    }
}

/// 脚本化传输
pub struct MockTransport {
    rx: Arc<Mutex<VecDeque<u8>>>,
    writes: MockWrites,
    /// 单次 read_chunk 最多吐多少字节（模拟慢速/逐字节链路）
    chunk_limit: usize,
    responder: Option<Responder>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            rx: Arc::new(Mutex::new(VecDeque::new())),
            writes: MockWrites::default(),
            chunk_limit: usize::MAX,
            responder: None,
        }
    }

    /// 预置入站字节
    pub fn with_inbound(self, bytes: &[u8]) -> Self {
        self.rx.lock().extend(bytes.iter().copied());
        self
    }

    /// 限制单次读取块大小（1 = 逐字节到达）
    pub fn with_chunk_limit(mut self, limit: usize) -> Self {
        self.chunk_limit = limit.max(1);
        self
    }

    /// 每次写入都触发的应答闭包；返回的字节进入入站队列
    pub fn with_responder(
        mut self,
        responder: impl FnMut(&[u8]) -> Vec<u8> + Send + 'static,
    ) -> Self {
        self.responder = Some(Box::new(responder));
        self
    }

    /// 注入句柄（测试线程异步喂数据）
    pub fn feeder(&self) -> MockFeeder {
        MockFeeder {
            rx: Arc::clone(&self.rx),
        }
    }

    /// 出站捕获句柄
    pub fn writes(&self) -> MockWrites {
        self.writes.clone()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MockTransport {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        self.writes.writes.lock().push(bytes.to_vec());
        if let Some(responder) = self.responder.as_mut() {
            let reply = responder(bytes);
            self.rx.lock().extend(reply);
        }
        Ok(())
    }

    fn read_chunk(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, LinkError> {
        let deadline = Instant::now() + timeout;
        loop {
            {
                let mut rx = self.rx.lock();
                if !rx.is_empty() {
                    let n = self.chunk_limit.min(buf.len()).min(rx.len());
                    for slot in buf.iter_mut().take(n) {
                        *slot = rx.pop_front().unwrap_or_default();
                    }
                    return Ok(n);
                }
            }
            if remaining(deadline).is_zero() {
                return Err(LinkError::Timeout);
            }
            // 1ms 轮询：注入线程与超时精度之间的折衷
            std::thread::sleep(Duration::from_millis(1));
        }
    }
}
