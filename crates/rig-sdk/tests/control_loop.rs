//! 控制循环全链路集成测试
//!
//! 模拟一个一阶响应的被控对象：每个 tick 收指令、按惯性逼近
//! 设定值回报遥测。验证 boxcar 收敛事件、停止归还与故障升级
//! 在完整协议栈（编解码 + 帧 + 缓冲 + 通道）上的行为。

use std::time::Duration;

use rig_sdk::control::{ControlLoop, LoopConfig, LoopEvent, TelemetryPlant};
use rig_sdk::driver::{Channel, ConnectionState};
use rig_sdk::link::mock::MockTransport;
use rig_sdk::protocol::{
    ChannelConfig, ChecksumAlgorithm, DecodedMessage, FieldSpec, FieldWidth, FrameLayout,
    MessageDescriptor, MessageRegistry, SyncMarker,
};

const SYNC: u16 = 0xCAFE;
const SETPOINT: i16 = 0x0201;
const TELEMETRY: i16 = 0x0202;

fn registry() -> MessageRegistry {
    MessageRegistry::from_descriptors([
        MessageDescriptor::new(
            "Setpoint",
            SETPOINT,
            vec![FieldSpec::signed_le("target_mdeg", FieldWidth::W4)],
        ),
        MessageDescriptor::new(
            "Telemetry",
            TELEMETRY,
            vec![FieldSpec::signed_le("actual_mdeg", FieldWidth::W4)],
        ),
    ])
    .unwrap()
}

fn layout() -> FrameLayout {
    FrameLayout::new(SyncMarker::u16(SYNC), ChecksumAlgorithm::ChainedCrc32, 1024)
}

/// 一阶惯性模型：每收到一条设定值指令，向设定值走 1/4 的剩余距离
fn first_order_responder() -> impl FnMut(&[u8]) -> Vec<u8> + Send + 'static {
    let lay = layout();
    let reg = registry();
    let mut actual = 0i64;
    move |request| {
        // 请求是完整的线上帧，设定值在 body 的第一个 i32 字段里
        let hs = lay.header_size();
        let target = i64::from(i32::from_le_bytes(
            request[hs..hs + 4].try_into().unwrap(),
        ));
        actual += (target - actual) / 4;
        let body = reg.encode(TELEMETRY, &[actual]).unwrap();
        lay.encode_frame(TELEMETRY, &body).unwrap()
    }
}

/// 恒定设定值的炉温式 plant
struct SetpointPlant {
    target_mdeg: i64,
}

impl TelemetryPlant for SetpointPlant {
    fn build_request(&mut self, _seq: u32, _elapsed_ms: u64) -> (i16, Vec<i64>) {
        (SETPOINT, vec![self.target_mdeg])
    }

    fn extract(&mut self, message: &DecodedMessage) -> Option<f64> {
        (message.type_code == TELEMETRY).then(|| message.values[0] as f64)
    }
}

fn connected_channel(transport: MockTransport) -> Channel<MockTransport> {
    let config = ChannelConfig::serial_crc32("oven", SYNC, "/dev/null", 115_200);
    let mut channel = Channel::new(&config, transport, registry());
    channel.connect().unwrap();
    channel
}

#[test]
fn test_full_stack_convergence() {
    let channel = connected_channel(MockTransport::new().with_responder(first_order_responder()));

    let config = LoopConfig {
        period_ms: 1,
        window_size: 4,
        target: 50_000.0,
        tolerance: 500.0,
        response_timeout_ms: 100,
        max_consecutive_failures: 3,
    };
    let plant = SetpointPlant {
        target_mdeg: 50_000,
    };

    let handle = ControlLoop::spawn(channel, plant, config).unwrap();

    let event = handle
        .events()
        .recv_timeout(Duration::from_secs(10))
        .unwrap();
    match event {
        LoopEvent::ReachedTarget { average } => {
            assert!((average - 50_000.0).abs() <= 500.0, "{average}");
        },
        other => panic!("expected ReachedTarget, got {other:?}"),
    }

    let (channel, _plant) = handle.stop();
    assert_eq!(channel.state(), ConnectionState::Connected);
}

#[test]
fn test_setpoint_change_rearms_convergence_event() {
    let channel = connected_channel(MockTransport::new().with_responder(first_order_responder()));

    let config = LoopConfig {
        period_ms: 1,
        window_size: 4,
        target: 20_000.0,
        tolerance: 200.0,
        response_timeout_ms: 100,
        max_consecutive_failures: 3,
    };
    let handle = ControlLoop::spawn(
        channel,
        SetpointPlant {
            target_mdeg: 20_000,
        },
        config,
    )
    .unwrap();

    let first = handle
        .events()
        .recv_timeout(Duration::from_secs(10))
        .unwrap();
    assert!(matches!(first, LoopEvent::ReachedTarget { .. }), "{first:?}");

    // 第一回合收敛后停止，换目标重跑：事件重新武装
    let (channel, mut plant) = handle.stop();
    plant.target_mdeg = 80_000;

    let config = LoopConfig {
        period_ms: 1,
        window_size: 4,
        target: 80_000.0,
        tolerance: 800.0,
        response_timeout_ms: 100,
        max_consecutive_failures: 3,
    };
    // 同一条通道、同一个对端模型，继续从当前温度爬
    let handle = ControlLoop::spawn(channel, plant, config).unwrap();
    let second = handle
        .events()
        .recv_timeout(Duration::from_secs(10))
        .unwrap();
    assert!(
        matches!(second, LoopEvent::ReachedTarget { .. }),
        "{second:?}"
    );
    handle.stop();
}
