//! # Solink CLI
//!
//! 串口舵机臂遥操作命令行工具。
//!
//! ```bash
//! # 扫描并识别主/从角色
//! solink identify
//!
//! # 把当前姿态写为量程中点（EEPROM 归零偏移）
//! solink set-middle --port /dev/ttyUSB0
//!
//! # 捕获当前姿态存为标定文件
//! solink calibrate --port /dev/ttyUSB0
//!
//! # 两侧遥操作环
//! solink leader --peer 192.168.1.20:5000
//! solink follower --bind 0.0.0.0:5000
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod display;

use commands::{
    CalibrateCommand, FollowerCommand, IdentifyCommand, LeaderCommand, MonitorCommand,
    SetMiddleCommand,
};

/// Solink - 主/从遥操作命令行工具
#[derive(Parser, Debug)]
#[command(name = "solink")]
#[command(about = "Leader/follower teleoperation for serial-bus servo arms", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 扫描串口并按电压识别角色
    Identify {
        #[command(flatten)]
        args: IdentifyCommand,
    },

    /// 把当前姿态写为量程中点（EEPROM 归零偏移）
    SetMiddle {
        #[command(flatten)]
        args: SetMiddleCommand,
    },

    /// 捕获当前姿态保存为标定文件
    Calibrate {
        #[command(flatten)]
        args: CalibrateCommand,
    },

    /// 主动侧遥操作环（读位置 → 发布）
    Leader {
        #[command(flatten)]
        args: LeaderCommand,
    },

    /// 从动侧遥操作环（接收 → 治理 → 写硬件）
    Follower {
        #[command(flatten)]
        args: FollowerCommand,
    },

    /// 实时打印位置与电压
    Monitor {
        #[command(flatten)]
        args: MonitorCommand,
    },
}

fn main() -> Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("solink=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Identify { args } => args.execute(),
        Commands::SetMiddle { args } => args.execute(),
        Commands::Calibrate { args } => args.execute(),
        Commands::Leader { args } => args.execute(),
        Commands::Follower { args } => args.execute(),
        Commands::Monitor { args } => args.execute(),
    }
}
