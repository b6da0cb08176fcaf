//! 帧检测演示：从一段带噪声和坏帧的字节流里恢复消息
//!
//! 不需要硬件，使用 mock 传输：
//!
//! ```bash
//! cargo run -p rig-sdk --example frame_dump --features mock
//! ```

use std::time::{Duration, Instant};

use rig_sdk::link::mock::MockTransport;
use rig_sdk::prelude::*;

const SYNC: u16 = 0xCAFE;
const STATUS: i16 = 0x0101;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    rig_sdk::init_tracing();

    let registry = MessageRegistry::from_descriptors([MessageDescriptor::new(
        "FixtureStatus",
        STATUS,
        vec![
            FieldSpec::unsigned_le("station", FieldWidth::W1),
            FieldSpec::signed_le("temperature_mdeg", FieldWidth::W4),
        ],
    )])?;
    let layout = FrameLayout::new(SyncMarker::u16(SYNC), ChecksumAlgorithm::ChainedCrc32, 1024);

    // 组一段"现场质量"的流：噪声 + 校验损坏的帧 + 三条好帧
    let mut stream = vec![0x00, 0xFF, 0xCA, 0x12];
    let mut corrupted =
        layout.encode_frame(STATUS, &registry.encode(STATUS, &[9, 99_999])?)?;
    let last = corrupted.len() - 1;
    corrupted[last] ^= 0xFF;
    stream.extend_from_slice(&corrupted);
    for (station, temp) in [(1i64, 23_500i64), (2, 24_125), (3, 22_750)] {
        let body = registry.encode(STATUS, &[station, temp])?;
        stream.extend_from_slice(&layout.encode_frame(STATUS, &body)?);
    }

    let buffer = StreamBuffer::new(MockTransport::new().with_inbound(&stream));
    let mut synchronizer = FrameSynchronizer::new(layout);

    println!("scanning {} bytes of dirty stream...\n", stream.len());
    loop {
        let deadline = Instant::now() + Duration::from_millis(50);
        match synchronizer.next_frame(&buffer, deadline) {
            Ok(frame) => {
                let message = registry.decode(frame.format_id, &frame.body)?;
                println!(
                    "{}: station={} temperature={:.3} deg",
                    message.name,
                    message.values[0],
                    message.values[1] as f64 / 1000.0
                );
            },
            Err(LinkError::Timeout) => break,
            Err(e) => return Err(e.into()),
        }
    }

    let stats = synchronizer.stats();
    println!(
        "\nframes={} skipped_bytes={} bad_checksum={} bad_length={}",
        stats.frames_accepted, stats.bytes_skipped, stats.bad_checksum, stats.bad_length
    );
    Ok(())
}
