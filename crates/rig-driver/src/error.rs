//! 驱动层错误类型定义

use rig_link::LinkError;
use rig_protocol::codec::CodecError;
use rig_protocol::registry::RegistryError;
use thiserror::Error;

use crate::channel::ConnectionState;

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// 链路错误（IO / 传输层）
    #[error("Link error: {0}")]
    Link(#[from] LinkError),

    /// 编解码错误（编程错误，快速失败，不重试）
    #[error("Protocol error: {0}")]
    Protocol(#[from] CodecError),

    /// 注册表错误（重复 type code / 未知 type code）
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// 握手重试耗尽
    #[error("Connect failed after {attempts} handshake attempts")]
    ConnectFailed { attempts: u32 },

    /// 截止前没有组装出完整有效帧；通道保持 Connected，调用方决定重试
    #[error("Operation timeout")]
    Timeout,

    /// 状态机不允许该操作
    #[error("Channel is {state:?}, operation `{operation}` not allowed")]
    InvalidState {
        state: ConnectionState,
        operation: &'static str,
    },

    /// 连续接收超时超过阈值，通道已升级为 Faulted
    #[error("Channel faulted after {consecutive} consecutive receive timeouts")]
    ChannelFaulted { consecutive: u32 },

    /// 该通道上已有活动控制循环
    #[error("A control loop is already active on this channel")]
    LoopAlreadyActive,

    /// 等待被取消（控制循环停止路径）
    #[error("Operation cancelled")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = DriverError::ConnectFailed { attempts: 3 };
        assert_eq!(
            format!("{err}"),
            "Connect failed after 3 handshake attempts"
        );

        let err = DriverError::Timeout;
        assert_eq!(format!("{err}"), "Operation timeout");

        let err = DriverError::InvalidState {
            state: ConnectionState::Faulted,
            operation: "send",
        };
        assert!(format!("{err}").contains("Faulted"));
        assert!(format!("{err}").contains("send"));
    }

    #[test]
    fn test_from_link_error() {
        let err: DriverError = LinkError::Timeout.into();
        assert!(matches!(err, DriverError::Link(LinkError::Timeout)));
    }

    #[test]
    fn test_from_codec_error() {
        let codec = CodecError::EncodingBodyLength { len: 0, max: 10 };
        let err: DriverError = codec.into();
        assert!(matches!(err, DriverError::Protocol(_)));
    }
}
