//! warp_sim: 最小 SIMT 执行核心仿真库
//!
//! 一条指令流在每个周期同时作用于一组（warp）相互独立的寄存器文件，
//! 通过逐线程的活动掩码表达分支发散。
//!
//! # 模块结构
//!
//! - `isa`: 操作码、指令及其 32-bit 编码
//! - `warp`: 执行核心（寄存器文件、活动掩码、逐周期执行）
//! - `memory`: 线程级访存接口与内存实现
//! - `program`: 取指接口与指令表
//! - `sim_env`: 仿真环境（配置、程序装载、连接检查、复位）

pub mod isa;
pub mod memory;
pub mod program;
pub mod sim_env;
pub mod warp;
