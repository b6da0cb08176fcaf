//! UDP 适配器
//!
//! 网络控制器通道的物理链路。UDP 没有任何固有帧边界，收到的数据
//! 报直接拼进流缓冲，由帧检测器恢复边界。
//!
//! 握手不走数据端口：在数据端口启用之前，于独立端口上交换明文
//! 字面量（探测串 → 应答串），带有界重试与单次超时。

use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::Duration;

use tracing::{debug, info};

use crate::{LinkError, Transport};

/// `std::net::UdpSocket` 之上的统一链路适配
pub struct UdpTransport {
    socket: UdpSocket,
    peer: SocketAddr,
    /// 握手端口地址；None 表示该通道无独立握手
    handshake_peer: Option<SocketAddr>,
}

fn resolve(addr: &str) -> Result<SocketAddr, LinkError> {
    addr.to_socket_addrs()
        .map_err(|e| LinkError::Transport(format!("resolve {addr}: {e}")))?
        .next()
        .ok_or_else(|| LinkError::Transport(format!("resolve {addr}: no address")))
}

impl UdpTransport {
    /// 绑定本地任意端口并连接到对端数据地址
    pub fn connect(data_addr: &str, handshake_addr: Option<&str>) -> Result<Self, LinkError> {
        let peer = resolve(data_addr)?;
        let handshake_peer = handshake_addr.map(resolve).transpose()?;

        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.connect(peer)?;
        info!(%peer, handshake = ?handshake_peer, "udp transport bound");
        Ok(Self {
            socket,
            peer,
            handshake_peer,
        })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    fn recv_with_timeout(
        socket: &UdpSocket,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, LinkError> {
        // set_read_timeout(Some(ZERO)) 是非法参数，钳到 1ms
        let timeout = timeout.max(Duration::from_millis(1));
        socket.set_read_timeout(Some(timeout))?;
        match socket.recv(buf) {
            Ok(n) => Ok(n),
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                Err(LinkError::Timeout)
            },
            Err(e) => Err(LinkError::Io(e)),
        }
    }
}

impl Transport for UdpTransport {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        let sent = self.socket.send(bytes)?;
        if sent != bytes.len() {
            return Err(LinkError::Transport(format!(
                "short datagram send: {sent} of {} bytes",
                bytes.len()
            )));
        }
        Ok(())
    }

    fn read_chunk(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, LinkError> {
        Self::recv_with_timeout(&self.socket, buf, timeout)
    }

    /// 明文握手：独立端口上的一次 send + 一次 recv
    ///
    /// 配置了握手端口时重写默认实现；应答按整报文字面量精确匹配。
    fn handshake_exchange(
        &mut self,
        probe: &[u8],
        ack: &[u8],
        timeout: Duration,
    ) -> Result<(), LinkError> {
        let Some(handshake_peer) = self.handshake_peer else {
            // 没配独立端口就退回数据通路的默认行为
            return crate::probe_and_scan(self, probe, ack, timeout);
        };

        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.connect(handshake_peer)?;
        socket.send(probe)?;

        let mut reply = [0u8; 256];
        let n = Self::recv_with_timeout(&socket, &mut reply, timeout)?;
        if &reply[..n] == ack {
            debug!(peer = %handshake_peer, "handshake ack matched");
            Ok(())
        } else {
            debug!(
                peer = %handshake_peer,
                got = n,
                "handshake reply did not match ack literal"
            );
            Err(LinkError::Timeout)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_loopback_roundtrip() {
        let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
        let peer_addr = peer.local_addr().unwrap();

        let mut transport = UdpTransport::connect(&peer_addr.to_string(), None).unwrap();
        transport.write_all(&[1, 2, 3]).unwrap();

        let mut buf = [0u8; 16];
        let (n, from) = peer.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..n], &[1, 2, 3]);

        peer.send_to(&[9, 8], from).unwrap();
        let n = transport
            .read_chunk(&mut buf, Duration::from_millis(500))
            .unwrap();
        assert_eq!(&buf[..n], &[9, 8]);
    }

    #[test]
    fn test_read_timeout_when_peer_silent() {
        let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
        let mut transport =
            UdpTransport::connect(&peer.local_addr().unwrap().to_string(), None).unwrap();

        let start = Instant::now();
        let mut buf = [0u8; 16];
        let err = transport
            .read_chunk(&mut buf, Duration::from_millis(50))
            .unwrap_err();
        assert!(matches!(err, LinkError::Timeout));
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn test_handshake_on_side_port() {
        let data_peer = UdpSocket::bind("127.0.0.1:0").unwrap();
        let hs_peer = UdpSocket::bind("127.0.0.1:0").unwrap();
        let hs_addr = hs_peer.local_addr().unwrap();

        let responder = std::thread::spawn(move || {
            let mut buf = [0u8; 64];
            let (n, from) = hs_peer.recv_from(&mut buf).unwrap();
            assert_eq!(&buf[..n], b"HELLO-RIG");
            hs_peer.send_to(b"ACK-RIG", from).unwrap();
        });

        let mut transport = UdpTransport::connect(
            &data_peer.local_addr().unwrap().to_string(),
            Some(&hs_addr.to_string()),
        )
        .unwrap();
        transport
            .handshake_exchange(b"HELLO-RIG", b"ACK-RIG", Duration::from_millis(500))
            .unwrap();
        responder.join().unwrap();
    }

    #[test]
    fn test_handshake_falls_back_to_data_path() {
        // 未配独立握手端口：探测与应答走数据通路，应答按子串匹配
        let data_peer = UdpSocket::bind("127.0.0.1:0").unwrap();
        let mut transport =
            UdpTransport::connect(&data_peer.local_addr().unwrap().to_string(), None).unwrap();

        let responder = std::thread::spawn(move || {
            let mut buf = [0u8; 64];
            let (n, from) = data_peer.recv_from(&mut buf).unwrap();
            assert_eq!(&buf[..n], b"HELLO");
            data_peer.send_to(b"..ACK..", from).unwrap();
        });

        transport
            .handshake_exchange(b"HELLO", b"ACK", Duration::from_millis(500))
            .unwrap();
        responder.join().unwrap();
    }

    #[test]
    fn test_handshake_times_out_when_unanswered() {
        let data_peer = UdpSocket::bind("127.0.0.1:0").unwrap();
        let hs_peer = UdpSocket::bind("127.0.0.1:0").unwrap();

        let mut transport = UdpTransport::connect(
            &data_peer.local_addr().unwrap().to_string(),
            Some(&hs_peer.local_addr().unwrap().to_string()),
        )
        .unwrap();

        let start = Instant::now();
        let err = transport
            .handshake_exchange(b"HELLO", b"ACK", Duration::from_millis(80))
            .unwrap_err();
        assert!(matches!(err, LinkError::Timeout));
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(70));
        assert!(elapsed < Duration::from_millis(500));
    }
}
