//! 串口适配器
//!
//! 安全接口与夹具控制通道的物理链路。8N1，波特率来自通道配置；
//! 超时逐调用设置，握手（若配置了）直接走数据通路的默认实现。

use std::io::Read;
use std::time::Duration;

use serialport::{ClearBuffer, SerialPort};
use tracing::info;

use crate::{LinkError, Transport};

/// `serialport` 之上的统一链路适配
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    device: String,
}

impl SerialTransport {
    /// 打开串口（8 数据位 / 无校验 / 1 停止位）
    pub fn open(device: impl Into<String>, baud_rate: u32) -> Result<Self, LinkError> {
        let device = device.into();
        let port = serialport::new(&device, baud_rate)
            .timeout(Duration::from_millis(100))
            .open()
            .map_err(|e| LinkError::Transport(format!("open {device}: {e}")))?;
        info!(device = %device, baud_rate, "serial port opened");
        Ok(Self { port, device })
    }

    pub fn device(&self) -> &str {
        &self.device
    }
}

impl Transport for SerialTransport {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        use std::io::Write;
        self.port.write_all(bytes)?;
        self.port.flush()?;
        Ok(())
    }

    fn read_chunk(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, LinkError> {
        // 零超时在部分平台语义含糊，钳到 1ms
        let timeout = timeout.max(Duration::from_millis(1));
        self.port
            .set_timeout(timeout)
            .map_err(|e| LinkError::Transport(e.to_string()))?;

        match self.port.read(buf) {
            Ok(0) => Err(LinkError::Timeout),
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Err(LinkError::Timeout),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Err(LinkError::Timeout),
            Err(e) => Err(LinkError::Io(e)),
        }
    }

    fn discard_input(&mut self) -> Result<(), LinkError> {
        // 驱动层缓冲直接清，比逐块读干净
        self.port
            .clear(ClearBuffer::Input)
            .map_err(|e| LinkError::Transport(e.to_string()))
    }
}
