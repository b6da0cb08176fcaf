//! 线程安全流缓冲
//!
//! 传输层之上的可增长字节队列，支持非消费 peek 与消费 read。
//! 所有操作都由实例级可重入锁串行化：一个读取方 + 若干不共享
//! 读路径的写入方并发访问是安全的。
//!
//! 消费语义是唯一从流里移除字节的途径：一个被接纳的帧恰好被
//! 消费一次（不丢、不重）。

use std::cell::RefCell;
use std::time::Instant;

use bytes::{Buf, BytesMut};
use parking_lot::ReentrantMutex;

use crate::{LinkError, Transport, remaining};

/// 每次从传输层拉取的块大小
pub const FILL_CHUNK: usize = 4096;

/// 缓冲容量上限的默认值（1 MiB）
///
/// `length` 界限已经挡住超大候选帧，这个上限只是持续垃圾输入
/// 场景下的保险丝。
pub const DEFAULT_MAX_BUFFERED: usize = 1 << 20;

struct Inner<T> {
    buf: BytesMut,
    transport: T,
}

/// 传输层之上的线程安全字节队列
pub struct StreamBuffer<T: Transport> {
    inner: ReentrantMutex<RefCell<Inner<T>>>,
    max_buffered: usize,
}

impl<T: Transport> StreamBuffer<T> {
    pub fn new(transport: T) -> Self {
        Self::with_capacity_limit(transport, DEFAULT_MAX_BUFFERED)
    }

    pub fn with_capacity_limit(transport: T, max_buffered: usize) -> Self {
        Self {
            inner: ReentrantMutex::new(RefCell::new(Inner {
                buf: BytesMut::with_capacity(FILL_CHUNK),
                transport,
            })),
            max_buffered,
        }
    }

    /// 当前缓冲的字节数
    pub fn buffered(&self) -> usize {
        self.inner.lock().borrow().buf.len()
    }

    /// 阻塞拉取直到缓冲里至少有 `min_bytes` 字节
    ///
    /// 每次从传输层取最多 [`FILL_CHUNK`] 字节；截止时刻到达仍不足
    /// 则返回 [`LinkError::Timeout`]，已缓冲的字节原样保留。
    pub fn fill(&self, min_bytes: usize, deadline: Instant) -> Result<(), LinkError> {
        if min_bytes > self.max_buffered {
            return Err(LinkError::BufferOverflow {
                capacity: self.max_buffered,
            });
        }

        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        while inner.buf.len() < min_bytes {
            let timeout = remaining(deadline);
            if timeout.is_zero() {
                return Err(LinkError::Timeout);
            }
            let mut chunk = [0u8; FILL_CHUNK];
            let n = inner.transport.read_chunk(&mut chunk, timeout)?;
            inner.buf.extend_from_slice(&chunk[..n]);
            if inner.buf.len() > self.max_buffered {
                return Err(LinkError::BufferOverflow {
                    capacity: self.max_buffered,
                });
            }
        }
        Ok(())
    }

    /// 取接下来 `n` 字节的副本，不移除（不足则先 [`fill`](Self::fill)）
    pub fn peek(&self, n: usize, deadline: Instant) -> Result<Vec<u8>, LinkError> {
        let guard = self.inner.lock();
        self.fill(n, deadline)?;
        let inner = guard.borrow();
        Ok(inner.buf[..n].to_vec())
    }

    /// 取出并移除接下来 `n` 字节（peek 再丢弃）
    pub fn read(&self, n: usize, deadline: Instant) -> Result<Vec<u8>, LinkError> {
        let guard = self.inner.lock();
        self.fill(n, deadline)?;
        let mut inner = guard.borrow_mut();
        Ok(inner.buf.split_to(n).to_vec())
    }

    /// 丢弃已缓冲的前 `n` 字节（不触发拉取；不足 `n` 则全部丢弃）
    pub fn skip(&self, n: usize) {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        let n = n.min(inner.buf.len());
        inner.buf.advance(n);
    }

    /// 清空缓冲并丢弃传输层里能立即取到的滞留数据
    pub fn discard_pending(&self) -> Result<(), LinkError> {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        inner.buf.clear();
        inner.transport.discard_input()
    }

    /// 发送路径：整段写出（与读路径共用同一把锁）
    pub fn write(&self, bytes: &[u8]) -> Result<(), LinkError> {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        inner.transport.write_all(bytes)
    }

    /// 握手委托给传输层（串口走数据通路，UDP 走独立端口）
    pub fn handshake(
        &self,
        probe: &[u8],
        ack: &[u8],
        timeout: std::time::Duration,
    ) -> Result<(), LinkError> {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        inner.transport.handshake_exchange(probe, ack, timeout)
    }
}
