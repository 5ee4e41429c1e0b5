//! Interactive wire test: sends hand-entered tracker updates over VMT/VMC.

use anyhow::Result;
use clap::Parser;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

use webhtc_tracker::config::Config;
use webhtc_tracker::diagnostics;
use webhtc_tracker::transport::{OscTransport, TrackerUpdate, UpdateSink};
use webhtc_tracker::vmt::TrackerPose;

#[derive(Parser, Debug)]
#[command(name = "tracker_probe", version, about = "Send test tracker updates")]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// VMT tracker index
    #[arg(short, long, default_value_t = 0)]
    index: i32,

    /// VMC bone name
    #[arg(short, long, default_value = "Head")]
    bone: String,

    /// Also send VMC
    #[arg(long)]
    vmc: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt().with_env_filter("debug").init();

    let mut config = Config::load_or_default(&args.config);
    config.network.use_vmc |= args.vmc;

    println!("=== Tracker Probe ===");
    for (name, addr, status) in diagnostics::probe_outputs(&config.network) {
        println!("{} {}: {}", name, addr, status);
    }
    println!("index={} bone={}", args.index, args.bone);
    println!();
    println!("コマンド:");
    println!("  p x y z       - 位置を設定して送信 (例: p 0 1 0)");
    println!("  s             - 現在の値を送信");
    println!("  d             - 無効化して送信");
    println!("  t             - テスト送信 (位置を少しずつ動かす)");
    println!("  q             - 終了");
    println!();

    let mut transport = OscTransport::new(&config.network)?;
    let mut pose = TrackerPose::identity();
    let (index, bone) = (args.index, args.bone.as_str());

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        let parts: Vec<&str> = input.split_whitespace().collect();
        if parts.is_empty() {
            continue;
        }

        let update = |pose: TrackerPose, enabled: bool| TrackerUpdate {
            index,
            bone,
            enabled,
            pose,
        };

        match parts[0] {
            "p" if parts.len() == 4 => {
                let x: f32 = parts[1].parse()?;
                let y: f32 = parts[2].parse()?;
                let z: f32 = parts[3].parse()?;
                pose.position = [x, y, z];
                transport.send(&update(pose, true));
                println!("位置: [{}, {}, {}] 送信しました", x, y, z);
            }
            "s" => {
                transport.send(&update(pose, true));
                println!("位置: {:?} 送信しました", pose.position);
            }
            "d" => {
                transport.send(&update(pose, false));
                println!("無効化しました");
            }
            "t" => {
                println!("テスト送信中...");
                for i in 0..10 {
                    let y = i as f32 * 0.1;
                    pose.position[1] = y;
                    transport.send(&update(pose, true));
                    println!("  y = {:.1}", y);
                    std::thread::sleep(Duration::from_millis(500));
                }
                println!("テスト完了 (送信エラー: {})", transport.send_errors());
            }
            "q" => {
                println!("終了します");
                break;
            }
            _ => {
                println!("不明なコマンド: {}", parts[0]);
            }
        }
    }

    Ok(())
}
