//! warp_sim CLI 入口
//!
//! 默认运行内置的参考程序：4 线程、16-bit 寄存器、读数据为 `lane + 10` 的内存桩，
//! 逐周期打印指令、活动掩码和关注的寄存器。

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt};

use warp_sim::sim_env::{MemoryModel, SimConfig, SimEnv, SimError};
use warp_sim::warp::{CycleKind, CycleReport, WarpCore};

#[derive(Debug, Parser)]
#[command(name = "warp_sim_cli", version, about = "SIMT warp 仿真器")]
struct Args {
    /// warp 宽度
    #[arg(long, default_value_t = 4)]
    lanes: usize,

    /// 寄存器位宽（bit）
    #[arg(long, default_value_t = 16)]
    reg_width: u32,

    /// 从 ELF 文件装载程序
    #[arg(long, conflicts_with = "bin")]
    elf: Option<String>,

    /// 从原始二进制（小端 32-bit 指令字）装载程序
    #[arg(long)]
    bin: Option<String>,

    /// 内存模型：flat | lane-id[:base]
    #[arg(long, default_value = "lane-id")]
    memory: MemoryModel,

    /// 复位周期数
    #[arg(long, default_value_t = 2)]
    reset_cycles: u32,

    /// 复位之后执行的周期数（默认 64）
    #[arg(long)]
    max_cycles: Option<u64>,

    /// 每个周期打印的寄存器
    #[arg(
        long,
        value_delimiter = ',',
        default_values_t = [1u8, 2, 3],
        value_parser = clap::value_parser!(u8).range(0..16)
    )]
    watch: Vec<u8>,

    /// 逐周期输出 info 级日志
    #[arg(short, long)]
    verbose: bool,
}

/// 初始化全局 tracing subscriber
///
/// 默认级别为 `INFO`，可通过 `RUST_LOG` 覆盖。
fn init_logger() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn print_cycle(report: &CycleReport, warp: &WarpCore, watch: &[u8]) {
    let instr = match report.kind {
        CycleKind::Reset => "RESET".to_string(),
        CycleKind::Execute(instr) => instr.to_string(),
    };
    print!(
        "{:>4}  pc={:<5} {:<18} mask={}",
        report.cycle, report.pc, instr, report.mask_after
    );
    for &reg in watch {
        print!("  r{}={:?}", reg, warp.column(reg));
    }
    println!();
}

fn run(args: Args) -> Result<(), SimError> {
    let mut config = SimConfig::new()
        .with_lanes(args.lanes)
        .with_reg_width(args.reg_width)
        .with_memory(args.memory)
        .with_reset_cycles(args.reset_cycles)
        .with_verbose(args.verbose);
    if let Some(path) = args.elf {
        config = config.with_elf_path(path);
    }
    if let Some(path) = args.bin {
        config = config.with_bin_path(path);
    }
    if let Some(max) = args.max_cycles {
        config = config.with_max_cycles(max);
    }

    println!("=== warp_sim: SIMT warp 仿真器 ===\n");

    let mut env = SimEnv::from_config(config)?;

    println!("程序:");
    for (pc, instr) in env.program.instructions().iter().enumerate() {
        println!("  {:>4}: {}", pc, instr);
    }
    println!();

    // 复位周期在构建环境时已经驱动
    for report in env.reset_reports() {
        print_cycle(report, &env.warp, &args.watch);
    }
    env.run_until_limit(|report, warp| print_cycle(report, warp, &args.watch));

    println!();
    env.dump();
    Ok(())
}

fn main() -> ExitCode {
    init_logger();
    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
