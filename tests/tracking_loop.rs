use std::collections::VecDeque;
use std::net::UdpSocket;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use rosc::{OscPacket, OscType};
use webhtc_tracker::camera::{FeedPacket, FrameSource, LandmarkFeed, PacketEstimator};
use webhtc_tracker::config::Config;
use webhtc_tracker::engine::{Command, EngineHandle, IterationOutcome, TrackingLoop};
use webhtc_tracker::error::CameraError;
use webhtc_tracker::events::{event_channel, CalibrationEvent, EngineEvent, TrackingStatus};
use webhtc_tracker::pose::{LandmarkIndex, LandmarkSample, PoseLandmarks};
use webhtc_tracker::tracker::{SharedTransform, TrackingMode};
use webhtc_tracker::transport::{OscTransport, TrackerUpdate, UpdateSink};

fn standing_pose(score: f32) -> PoseLandmarks {
    let mut landmarks = vec![LandmarkSample::new(0.5, 0.5, 0.0, 0.9); LandmarkIndex::COUNT];
    landmarks[LandmarkIndex::Nose as usize] = LandmarkSample::new(0.5, 0.2, 0.0, 0.99);
    landmarks[LandmarkIndex::LeftAnkle as usize] = LandmarkSample::new(0.45, 0.9, 0.0, 0.8);
    landmarks[LandmarkIndex::RightAnkle as usize] = LandmarkSample::new(0.55, 0.9, 0.0, 0.8);
    PoseLandmarks::new(landmarks, score)
}

fn pose_json() -> String {
    let points: Vec<String> = standing_pose(0.95)
        .landmarks
        .iter()
        .map(|l| format!(r#"{{"x":{},"y":{},"z":{},"visibility":{}}}"#, l.x, l.y, l.z, l.visibility))
        .collect();
    format!(r#"{{"pose":{{"score":0.95,"landmarks":[{}]}},"hands":[]}}"#, points.join(","))
}

struct ScriptedSource {
    frames: VecDeque<FeedPacket>,
}

impl FrameSource for ScriptedSource {
    type Frame = FeedPacket;

    fn read_frame(&mut self) -> Result<FeedPacket, CameraError> {
        self.frames.pop_front().ok_or(CameraError::NoFrame)
    }

    fn release(&mut self) {}

    fn reacquire(&mut self) -> Result<(), CameraError> {
        Ok(())
    }
}

#[derive(Default)]
struct RecordingSink {
    updates: Vec<(i32, [f32; 3])>,
}

impl UpdateSink for RecordingSink {
    fn send(&mut self, update: &TrackerUpdate<'_>) {
        self.updates.push((update.index, update.pose.position));
    }
}

#[test]
fn test_calibration_then_tracking_uses_new_transform() {
    let mut config = Config::default();
    config.calibration.warmup_secs = 0.0;
    config.calibration.duration_secs = 0.5;
    config.camera.flip_horizontal = false;

    let frames = (0..30)
        .map(|_| FeedPacket {
            pose: Some(standing_pose(0.95)),
            hands: Vec::new(),
        })
        .collect();
    let (command_tx, command_rx) = mpsc::channel();
    let (events, event_rx) = event_channel(1024);
    let transform = SharedTransform::new(config.calibration.transform().unwrap());
    let mut tracking = TrackingLoop::new(
        &config,
        ScriptedSource { frames },
        PacketEstimator::from_config(&config.tracking),
        RecordingSink::default(),
        transform.clone(),
        command_rx,
        events,
    );

    command_tx.send(Command::StartCalibration).unwrap();
    let t0 = Instant::now();
    for i in 0..30 {
        let now = t0 + Duration::from_secs_f32(i as f32 / 30.0);
        assert_eq!(tracking.run_iteration_at(now), IterationOutcome::Processed);
    }

    let events: Vec<EngineEvent> = event_rx.try_iter().collect();
    let complete = events.iter().find_map(|e| match e {
        EngineEvent::Calibration(c @ CalibrationEvent::Complete { .. }) => Some(*c),
        _ => None,
    });
    let Some(CalibrationEvent::Complete { scale, offset_y, .. }) = complete else {
        panic!("no completion in {:?}", events);
    };
    assert!((scale - 2.428571).abs() < 1e-4);
    assert!((offset_y - 1.064286).abs() < 1e-4);
    assert!(events.contains(&EngineEvent::Status(TrackingStatus::Calibrating { percent: 0 })));
    assert_eq!(tracking.status(), Some(TrackingStatus::Tracking));

    // 最後のヘッド出力は新しい変換で写像される（フィルタは完了時にリセット済み、静止入力）
    let head = tracking
        .sink()
        .updates
        .iter()
        .rev()
        .find(|u| u.0 == 0)
        .map(|u| u.1)
        .unwrap();
    let expected_y = 0.3 * scale + offset_y;
    assert!((head[1] - expected_y).abs() < 1e-4, "{:?} vs {}", head, expected_y);
    assert!((transform.get().scale() - scale).abs() < 1e-6);
}

#[test]
fn test_mode_switch_stops_body_joints() {
    let config = Config::default();
    let frames = (0..2)
        .map(|_| FeedPacket {
            pose: Some(standing_pose(0.95)),
            hands: Vec::new(),
        })
        .collect();
    let (command_tx, command_rx) = mpsc::channel();
    let (events, _event_rx) = event_channel(64);
    let mut tracking = TrackingLoop::new(
        &config,
        ScriptedSource { frames },
        PacketEstimator::from_config(&config.tracking),
        RecordingSink::default(),
        SharedTransform::new(config.calibration.transform().unwrap()),
        command_rx,
        events,
    );

    tracking.run_iteration();
    assert_eq!(tracking.sink().updates.len(), 4);

    command_tx.send(Command::SetMode(TrackingMode::HandsOnly)).unwrap();
    tracking.run_iteration();
    assert_eq!(tracking.sink().updates.len(), 4);
    assert_eq!(tracking.status(), Some(TrackingStatus::Searching));
}

#[test]
fn test_udp_feed_to_vmt_end_to_end() {
    let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
    receiver.set_read_timeout(Some(Duration::from_secs(2))).unwrap();

    let mut config = Config::default();
    config.network.vmt_addr = receiver.local_addr().unwrap().to_string();
    config.camera.feed_addr = "127.0.0.1:0".to_string();

    let feed = LandmarkFeed::from_config(&config.camera).unwrap();
    let feed_addr = feed.local_addr().unwrap();
    let transport = OscTransport::new(&config.network).unwrap();
    let (events, _event_rx) = event_channel(256);
    let handle = EngineHandle::spawn(
        &config,
        feed,
        PacketEstimator::from_config(&config.tracking),
        transport,
        events,
    )
    .unwrap();

    let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
    let packet = pose_json();
    for _ in 0..5 {
        sender.send_to(packet.as_bytes(), feed_addr).unwrap();
        std::thread::sleep(Duration::from_millis(20));
    }

    let mut buf = [0u8; 1024];
    let mut indices = Vec::new();
    while indices.len() < 4 {
        let len = receiver.recv(&mut buf).expect("no VMT message received");
        let (_, packet) = rosc::decoder::decode_udp(&buf[..len]).unwrap();
        let OscPacket::Message(msg) = packet else {
            panic!("expected message");
        };
        assert_eq!(msg.addr, "/VMT/Room/Unity");
        assert_eq!(msg.args.len(), 10);
        assert_eq!(msg.args[1], OscType::Int(1));
        assert_eq!(&msg.args[6..], &[
            OscType::Float(0.0),
            OscType::Float(0.0),
            OscType::Float(0.0),
            OscType::Float(1.0),
        ]);
        if let OscType::Int(index) = msg.args[0] {
            indices.push(index);
        }
    }
    indices.sort();
    assert_eq!(&indices[..4], &[0, 1, 2, 3]);

    assert!(handle.stop(Duration::from_secs(2)));
}

#[test]
fn test_feed_without_producer_fails_after_retries() {
    let mut config = Config::default();
    config.camera.feed_addr = "127.0.0.1:0".to_string();
    config.camera.read_timeout_ms = 10;
    config.watchdog.frame_timeout_secs = 0.05;
    config.watchdog.retry_delay_secs = 0.0;

    let feed = LandmarkFeed::from_config(&config.camera).unwrap();
    let (_command_tx, command_rx) = mpsc::channel();
    let (events, event_rx) = event_channel(256);
    let mut tracking = TrackingLoop::new(
        &config,
        feed,
        PacketEstimator::from_config(&config.tracking),
        RecordingSink::default(),
        SharedTransform::new(config.calibration.transform().unwrap()),
        command_rx,
        events,
    );

    let deadline = Instant::now() + Duration::from_secs(3);
    let mut outcomes = Vec::new();
    while Instant::now() < deadline {
        let outcome = tracking.run_iteration();
        outcomes.push(outcome);
        if outcome == IterationOutcome::CameraFailed {
            break;
        }
    }
    assert_eq!(outcomes.last(), Some(&IterationOutcome::CameraFailed), "{:?}", outcomes);
    let reconnects = outcomes
        .iter()
        .filter(|o| **o == IterationOutcome::Reconnecting)
        .count();
    assert_eq!(reconnects, config.watchdog.max_retries as usize);

    let events: Vec<EngineEvent> = event_rx.try_iter().collect();
    assert_eq!(events.iter().filter(|e| **e == EngineEvent::CameraLost).count(), 1);
    assert!(!events.contains(&EngineEvent::CameraRestored));
    assert!(events.contains(&EngineEvent::Status(TrackingStatus::CameraFailed)));
    assert!(tracking.sink().updates.is_empty());
}
