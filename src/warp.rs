//! SIMT 执行核心
//!
//! 本模块定义了 warp 执行核心 `WarpCore`：
//! 一条指令流驱动 N 个线程各自的寄存器文件，
//! 分支发散只通过活动掩码表达，所有线程共享一个 PC。

use tracing::{debug, trace};

use crate::isa::{Instruction, Opcode};
use crate::memory::{MemRequest, Memory};
use crate::program::InstrSupply;

mod builder;
pub mod exu;
mod mask;
mod status;

pub use builder::{ConfigError, DEFAULT_LANES, WarpBuilder};
pub use exu::Writeback;
pub use mask::{ActivityMask, MAX_LANES};
pub use status::{RegFile, RegWidth, WarpState};

/// 周期类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleKind {
    /// 复位周期，优先于操作码分派
    Reset,
    /// 执行一条指令
    Execute(Instruction),
}

/// 单个周期的执行记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// 周期序号（从 0 开始，复位周期也计数）
    pub cycle: u64,
    /// 本周期开始时的 PC
    pub pc: u16,
    pub kind: CycleKind,
    pub mask_before: ActivityMask,
    pub mask_after: ActivityMask,
    /// 发往内存的请求，每个线程一条；复位周期为空
    pub requests: Vec<MemRequest>,
    /// 本周期结束后的 PC
    pub next_pc: u16,
}

impl CycleReport {
    /// 本周期断言写使能的线程数
    pub fn write_enables(&self) -> usize {
        self.requests.iter().filter(|r| r.we).count()
    }

    pub fn instruction(&self) -> Option<Instruction> {
        match self.kind {
            CycleKind::Execute(instr) => Some(instr),
            CycleKind::Reset => None,
        }
    }
}

/// Warp 执行核心
///
/// 状态为 (PC, N×16 个寄存器, N-bit 活动掩码)，每个周期恰好转移一次。
/// 核心没有终止状态，由外部决定运行多少周期。
///
/// 设计约定：
/// - 同一周期内的所有写回都基于周期开始时的快照计算
/// - 非活动线程的寄存器不会被修改，也不会发出写使能
/// - 核心状态不依赖全局变量
#[derive(Debug, Clone)]
pub struct WarpCore {
    state: WarpState,
    width: RegWidth,
    cycles: u64,
}

impl WarpCore {
    /// 创建默认配置（4 线程、16-bit 寄存器）的执行核心
    ///
    /// ```
    /// use warp_sim::warp::WarpCore;
    ///
    /// let warp = WarpCore::new();
    /// assert_eq!(warp.pc(), 0);
    /// assert!(warp.mask().is_all_active());
    /// ```
    pub fn new() -> Self {
        Self::with_config(DEFAULT_LANES, RegWidth::default())
    }

    pub(crate) fn with_config(lanes: usize, width: RegWidth) -> Self {
        WarpCore {
            state: WarpState::reset(lanes),
            width,
            cycles: 0,
        }
    }

    pub fn pc(&self) -> u16 {
        self.state.pc
    }

    pub fn mask(&self) -> ActivityMask {
        self.state.mask
    }

    pub fn lanes(&self) -> usize {
        self.state.lanes()
    }

    pub fn reg_width(&self) -> RegWidth {
        self.width
    }

    /// 已经过的周期数（含复位周期）
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn read_reg(&self, lane: usize, reg: u8) -> u16 {
        self.state.read(lane, reg)
    }

    /// 寄存器 `reg` 在所有线程上的值
    pub fn column(&self, reg: u8) -> Vec<u16> {
        self.state.column(reg)
    }

    pub fn state(&self) -> &WarpState {
        &self.state
    }

    /// 复位周期：寄存器清零、全部线程活动、PC 归零
    pub fn reset(&mut self) -> CycleReport {
        let pc = self.state.pc;
        let mask_before = self.state.mask;
        self.state = WarpState::reset(self.lanes());
        debug!(cycle = self.cycles, "warp reset");
        self.finish(pc, CycleKind::Reset, mask_before, Vec::new())
    }

    /// 推进一个时钟周期；`reset` 为真时忽略取指
    pub fn clock(
        &mut self,
        reset: bool,
        supply: &dyn InstrSupply,
        mem: &mut dyn Memory,
    ) -> CycleReport {
        if reset {
            self.reset()
        } else {
            self.step(supply, mem)
        }
    }

    /// 取指并执行一个周期
    pub fn step(&mut self, supply: &dyn InstrSupply, mem: &mut dyn Memory) -> CycleReport {
        let instr = supply.fetch(self.state.pc);
        self.execute(instr, mem)
    }

    /// 执行给定指令一个周期
    ///
    /// # 流程
    ///
    /// 1. 基于周期开始时的状态为每个线程生成访存请求
    /// 2. 逐线程访问内存，得到读数据
    /// 3. 计算写回（寄存器、掩码、PC）
    /// 4. 一次性提交
    pub fn execute(&mut self, instr: Instruction, mem: &mut dyn Memory) -> CycleReport {
        let pc = self.state.pc;
        let mask_before = self.state.mask;

        let requests = exu::shape_requests(&self.state, &instr);
        let responses: Vec<u16> = requests
            .iter()
            .enumerate()
            .map(|(lane, &req)| mem.access(lane, req))
            .collect();

        let wb = exu::apply(&self.state, &instr, &responses, self.width);
        trace!(
            cycle = self.cycles,
            pc,
            %instr,
            mask = %mask_before,
            writes = wb.lanes_written(),
            stores = requests.iter().filter(|r| r.we).count(),
            "issue"
        );
        wb.commit(&mut self.state);

        let mask_after = self.state.mask;
        match instr.opcode() {
            Opcode::Beq if mask_after != mask_before => {
                debug!(
                    pc,
                    active = mask_after.active_count(),
                    mask = %mask_after,
                    "warp diverged"
                );
            }
            Opcode::Jmp if !mask_before.is_all_active() => {
                debug!(pc, target = instr.imm(), "warp reconverged");
            }
            _ => {}
        }

        self.finish(pc, CycleKind::Execute(instr), mask_before, requests)
    }

    fn finish(
        &mut self,
        pc: u16,
        kind: CycleKind,
        mask_before: ActivityMask,
        requests: Vec<MemRequest>,
    ) -> CycleReport {
        let report = CycleReport {
            cycle: self.cycles,
            pc,
            kind,
            mask_before,
            mask_after: self.state.mask,
            requests,
            next_pc: self.state.pc,
        };
        self.cycles += 1;
        report
    }

    /// 运行指定周期数，返回每个周期的记录
    pub fn run(
        &mut self,
        supply: &dyn InstrSupply,
        mem: &mut dyn Memory,
        cycles: u64,
    ) -> Vec<CycleReport> {
        (0..cycles).map(|_| self.step(supply, mem)).collect()
    }

    /// 打印所有线程的寄存器和掩码（用于调试）
    pub fn dump_regs(&self) {
        println!("═══════════════════════════════════════════════════════════════════");
        println!("Warp Status Dump");
        println!("═══════════════════════════════════════════════════════════════════");
        println!(
            "PC: {}  Mask: {}  Cycles: {}  RegWidth: {}",
            self.state.pc,
            self.state.mask,
            self.cycles,
            self.width.bits()
        );
        for (lane, rf) in self.state.regs.iter().enumerate() {
            println!();
            println!(
                "─── Lane {} ({}) ───────────────────────────────────────────────",
                lane,
                if self.state.mask.is_active(lane) { "active" } else { "masked" }
            );
            for (i, value) in rf.snapshot().iter().enumerate() {
                if i % 4 == 0 {
                    print!("  ");
                }
                print!("r{:02}: 0x{:04x}  ", i, value);
                if i % 4 == 3 {
                    println!();
                }
            }
        }
        println!("═══════════════════════════════════════════════════════════════════");
    }
}

impl Default for WarpCore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests;
