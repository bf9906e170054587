//! 模拟底盘演示 - 自动整定 + 闭环速度控制
//!
//! 这个示例把一个一阶惯性模拟底盘同时用作被控底盘和速度/姿态传感器：
//! - 第一阶段：两路 PID 增益全零，控制循环做继电器自动整定
//! - 第二阶段：把整定结果写回配置并重配置，闭环跟踪速度指令
//!
//! # 运行
//!
//! ```bash
//! RUST_LOG=info cargo run -p scb-base --example simulated_drive
//! ```

use anyhow::{Context, bail};
use nalgebra::Vector3;
use scb_base::init_logging;
use scb_base::prelude::*;
use scb_components::mock::{DriveModel, SimulatedDrive};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn main() -> anyhow::Result<()> {
    init_logging();

    println!("🚗 Sensor-Controlled Base - Simulated Drive Demo");
    println!("================================================\n");

    let drive = Arc::new(SimulatedDrive::new("drive", DriveModel::default()));
    let mut deps = Dependencies::new();
    deps.add_base(drive.clone()).add_movement_sensor(drive.clone());

    // 1. 自动整定
    let config = ScbConfig::new(["drive"], "drive")
        .with_control_parameters(vec![
            PidConfig::untuned(PidKind::LinearVelocity),
            PidConfig::untuned(PidKind::AngularVelocity),
        ])
        .with_control_frequency(50.0);
    let scb = SensorBase::new("scb", &config, &deps).context("failed to configure base")?;
    println!("🎯 传感器角色: {}", serde_json::to_string(&scb.sensor_roles())?);
    println!("▶️  自动整定中...");

    let deadline = Instant::now() + Duration::from_secs(30);
    let tuned = loop {
        match scb.tuning_status() {
            TuningStatus::Ready(values) => break values,
            TuningStatus::InProgress if Instant::now() < deadline => {
                thread::sleep(Duration::from_millis(100));
            },
            status => bail!("auto-tuning did not finish: {:?}", status),
        }
    };
    for pid in &tuned {
        println!(
            "   - {}: p={:.4}, i={:.4}, d={:.4}",
            pid.kind, pid.p, pid.i, pid.d
        );
    }
    println!();

    // 2. 写回增益，闭环运行
    scb.reconfigure(&config.clone().with_control_parameters(tuned), &deps)?;
    let token = CancelToken::new();
    let commands = [(300.0, 0.0), (300.0, 45.0), (-200.0, 30.0), (0.0, 0.0)];
    for (linear_mmps, angular_dps) in commands {
        println!("📈 set_velocity: {} mm/s, {} deg/s", linear_mmps, angular_dps);
        scb.set_velocity(
            &token,
            Vector3::new(0.0, linear_mmps, 0.0),
            Vector3::new(0.0, 0.0, angular_dps),
            None,
        )?;

        for _ in 0..5 {
            thread::sleep(Duration::from_millis(200));
            let (linear, angular) = drive.velocities();
            let (heading, _) = scb.heading()?;
            println!(
                "   v={:+.3} m/s | ω={:+.2} deg/s | heading={:+.1}°",
                linear, angular, heading
            );
        }
    }

    scb.stop(&token, None)?;
    if let Some(stats) = scb.loop_stats() {
        println!("\n📊 ticks={} errors={}", stats.ticks, stats.errors);
    }
    scb.close()?;
    println!("✅ Done");
    Ok(())
}
