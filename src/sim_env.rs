//! 仿真环境初始化模块
//!
//! 本模块负责：
//! - 读取仿真配置
//! - 解析 ELF / 原始二进制程序镜像
//! - 初始化执行核心和内存，并检查两者的连接
//! - 驱动复位周期
//!
//! # 示例
//!
//! ```
//! use warp_sim::sim_env::{MemoryModel, SimConfig, SimEnv};
//!
//! let config = SimConfig::default()
//!     .with_lanes(4)
//!     .with_memory(MemoryModel::LaneId { base: 10 });
//!
//! let mut env = SimEnv::from_config(config).expect("Failed to create sim env");
//! env.run(5);
//! assert_eq!(env.warp.pc(), 5);
//! ```

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use std::str::FromStr;

use elf::ElfBytes;
use elf::abi::{PF_X, PT_LOAD};
use elf::endian::AnyEndian;
use thiserror::Error;
use tracing::{debug, info};

use crate::isa::InstrError;
use crate::memory::{self, FlatMemory, LaneIdMemory, Memory, WiringError};
use crate::program::{self, ProgramError, ProgramRom};
use crate::warp::{ConfigError, CycleReport, WarpBuilder, WarpCore};

/// 仿真环境错误
#[derive(Debug, Error)]
pub enum SimError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("ELF parse error: {0}")]
    ElfParse(String),

    #[error("program error: {0}")]
    Program(#[from] ProgramError),

    #[error("instruction error: {0}")]
    Instr(#[from] InstrError),

    #[error("warp config error: {0}")]
    Config(#[from] ConfigError),

    #[error("wiring error: {0}")]
    Wiring(#[from] WiringError),

    #[error("unknown memory model '{0}' (expected 'flat' or 'lane-id[:base]')")]
    MemoryModel(String),
}

/// 内存模型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryModel {
    /// 共享线性内存
    Flat,
    /// 参考测试桩：读数据 = 线程号 + base
    LaneId { base: u16 },
}

impl Default for MemoryModel {
    fn default() -> Self {
        MemoryModel::LaneId {
            base: LaneIdMemory::DEFAULT_BASE,
        }
    }
}

impl FromStr for MemoryModel {
    type Err = SimError;

    /// 格式示例: "flat", "lane-id", "lane-id:100"
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_lowercase();
        match key.split_once(':') {
            None if key == "flat" => Ok(MemoryModel::Flat),
            None if key == "lane-id" => Ok(MemoryModel::default()),
            Some(("lane-id", base)) => base
                .parse()
                .map(|base| MemoryModel::LaneId { base })
                .map_err(|_| SimError::MemoryModel(s.to_string())),
            _ => Err(SimError::MemoryModel(s.to_string())),
        }
    }
}

impl MemoryModel {
    fn build(self, lanes: usize) -> Box<dyn Memory> {
        match self {
            MemoryModel::Flat => Box::new(FlatMemory::new()),
            MemoryModel::LaneId { base } => Box::new(LaneIdMemory::with_base(lanes, base)),
        }
    }
}

/// 仿真配置
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// warp 宽度
    pub lanes: usize,
    /// 寄存器位宽（bit）
    pub reg_width: u32,
    /// ELF 文件路径（可选）
    pub elf_path: Option<String>,
    /// 二进制文件路径（可选）
    pub bin_path: Option<String>,
    /// 内存模型
    pub memory: MemoryModel,
    /// 启动时驱动的复位周期数
    pub reset_cycles: u32,
    /// `run_until_limit` 执行的周期数
    pub max_cycles: u64,
    /// 是否逐周期输出 info 级日志
    pub verbose: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            lanes: crate::warp::DEFAULT_LANES,
            reg_width: 16,
            elf_path: None,
            bin_path: None,
            memory: MemoryModel::default(),
            reset_cycles: 2,
            max_cycles: 64,
            verbose: false,
        }
    }
}

impl SimConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lanes(mut self, lanes: usize) -> Self {
        self.lanes = lanes;
        self
    }

    pub fn with_reg_width(mut self, bits: u32) -> Self {
        self.reg_width = bits;
        self
    }

    /// 设置 ELF 文件路径
    pub fn with_elf_path(mut self, path: impl Into<String>) -> Self {
        self.elf_path = Some(path.into());
        self
    }

    /// 设置二进制文件路径
    pub fn with_bin_path(mut self, path: impl Into<String>) -> Self {
        self.bin_path = Some(path.into());
        self
    }

    pub fn with_memory(mut self, memory: MemoryModel) -> Self {
        self.memory = memory;
        self
    }

    pub fn with_reset_cycles(mut self, cycles: u32) -> Self {
        self.reset_cycles = cycles;
        self
    }

    pub fn with_max_cycles(mut self, max: u64) -> Self {
        self.max_cycles = max;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    fn warp_builder(&self) -> WarpBuilder {
        WarpBuilder::new()
            .with_lanes(self.lanes)
            .with_reg_width(self.reg_width)
    }
}

/// ELF 可执行段
#[derive(Debug, Clone)]
pub struct ElfSegment {
    /// 虚拟地址（字节）
    pub vaddr: u32,
    /// 段数据
    pub data: Vec<u8>,
}

/// ELF 文件解析结果
#[derive(Debug, Clone)]
pub struct ElfInfo {
    /// 入口点地址
    pub entry: u32,
    /// 可执行的 PT_LOAD 段
    pub segments: Vec<ElfSegment>,
    /// 机器类型（本 ISA 不对应任何已注册的机器类型，仅作记录）
    pub machine: u16,
}

impl ElfInfo {
    /// 解析 ELF 文件
    pub fn parse<P: AsRef<Path>>(path: P) -> Result<Self, SimError> {
        let file = File::open(path.as_ref())?;
        let mut reader = BufReader::new(file);
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;

        Self::parse_bytes(&data)
    }

    /// 从字节数组解析 ELF
    ///
    /// 只接受 32 位小端 ELF。
    pub fn parse_bytes(data: &[u8]) -> Result<Self, SimError> {
        let elf_file = ElfBytes::<AnyEndian>::minimal_parse(data)
            .map_err(|e| SimError::ElfParse(format!("Failed to parse ELF: {}", e)))?;

        let header = &elf_file.ehdr;

        if header.class != elf::file::Class::ELF32 {
            return Err(SimError::ElfParse("Only 32-bit ELF is supported".into()));
        }
        if header.endianness != AnyEndian::Little {
            return Err(SimError::ElfParse("Only little-endian ELF is supported".into()));
        }

        let mut segments = Vec::new();
        if let Some(phdrs) = elf_file.segments() {
            for phdr in phdrs {
                if phdr.p_type != PT_LOAD || (phdr.p_flags & PF_X) == 0 {
                    continue;
                }
                let data = elf_file
                    .segment_data(&phdr)
                    .map_err(|e| SimError::ElfParse(format!("Failed to read segment data: {}", e)))?
                    .to_vec();
                segments.push(ElfSegment {
                    vaddr: phdr.p_vaddr as u32,
                    data,
                });
            }
        }

        Ok(ElfInfo {
            entry: header.e_entry as u32,
            segments,
            machine: header.e_machine,
        })
    }

    /// 把所有可执行段装入指令表，PC = vaddr / 4
    pub fn to_program(&self) -> Result<ProgramRom, SimError> {
        if self.segments.is_empty() {
            return Err(SimError::ElfParse("No executable segments".into()));
        }
        let mut rom = ProgramRom::default();
        for seg in &self.segments {
            if seg.vaddr % 4 != 0 {
                return Err(SimError::ElfParse(format!(
                    "Segment at 0x{:08x} is not word aligned",
                    seg.vaddr
                )));
            }
            rom.place_le_bytes((seg.vaddr / 4) as usize, &seg.data)?;
        }
        Ok(rom)
    }
}

/// 根据配置装载程序：ELF 优先，其次原始二进制，否则使用参考程序
fn load_program(config: &SimConfig) -> Result<ProgramRom, SimError> {
    if let Some(ref elf_path) = config.elf_path {
        let elf = ElfInfo::parse(elf_path)?;
        let rom = elf.to_program()?;
        info!(
            path = %elf_path,
            entry = elf.entry,
            segments = elf.segments.len(),
            instructions = rom.len(),
            "loaded ELF program"
        );
        Ok(rom)
    } else if let Some(ref bin_path) = config.bin_path {
        let data = std::fs::read(bin_path)?;
        let rom = ProgramRom::from_le_bytes(&data)?;
        info!(path = %bin_path, instructions = rom.len(), "loaded binary program");
        Ok(rom)
    } else {
        let rom = program::reference_program()?;
        info!(instructions = rom.len(), "using built-in reference program");
        Ok(rom)
    }
}

/// 仿真环境
///
/// 封装了执行核心、指令表、内存和配置，提供统一的仿真接口
pub struct SimEnv<M: Memory = Box<dyn Memory>> {
    /// 执行核心
    pub warp: WarpCore,
    /// 指令表
    pub program: ProgramRom,
    /// 内存
    pub memory: M,
    /// 配置
    pub config: SimConfig,
    /// 最近一次复位的周期记录
    reset_reports: Vec<CycleReport>,
}

impl SimEnv<Box<dyn Memory>> {
    /// 从配置创建仿真环境
    pub fn from_config(config: SimConfig) -> Result<Self, SimError> {
        let warp = config.warp_builder().build()?;
        let program = load_program(&config)?;
        let memory = config.memory.build(config.lanes);
        Self::from_parts(warp, program, memory, config)
    }
}

impl<M: Memory> SimEnv<M> {
    /// 连接各部件并驱动复位周期
    ///
    /// 内存的线程数与 warp 不一致时返回 `SimError::Wiring`。
    pub fn from_parts(
        warp: WarpCore,
        program: ProgramRom,
        memory: M,
        config: SimConfig,
    ) -> Result<Self, SimError> {
        memory::check_wiring(warp.lanes(), &memory)?;
        info!(
            lanes = warp.lanes(),
            reg_width = warp.reg_width().bits(),
            instructions = program.len(),
            "sim env wired"
        );

        let mut env = SimEnv {
            warp,
            program,
            memory,
            config,
            reset_reports: Vec::new(),
        };
        env.reset();
        Ok(env)
    }

    /// 驱动配置中的复位周期，返回本次复位的周期记录
    pub fn reset(&mut self) -> &[CycleReport] {
        debug!(cycles = self.config.reset_cycles, "driving reset");
        self.reset_reports = (0..self.config.reset_cycles)
            .map(|_| self.warp.clock(true, &self.program, &mut self.memory))
            .collect();
        &self.reset_reports
    }

    /// 最近一次复位（含构建环境时的复位）的周期记录
    pub fn reset_reports(&self) -> &[CycleReport] {
        &self.reset_reports
    }

    /// 执行单个周期
    pub fn step(&mut self) -> CycleReport {
        let report = self.warp.step(&self.program, &mut self.memory);
        if self.config.verbose {
            info!(
                cycle = report.cycle,
                pc = report.pc,
                instr = %report.instruction().unwrap_or_default(),
                mask = %report.mask_after,
                "cycle"
            );
        }
        report
    }

    /// 运行指定周期数
    pub fn run(&mut self, cycles: u64) -> Vec<CycleReport> {
        (0..cycles).map(|_| self.step()).collect()
    }

    /// 运行 `config.max_cycles` 个周期，每个周期结束后调用 `observe`
    pub fn run_until_limit(&mut self, mut observe: impl FnMut(&CycleReport, &WarpCore)) {
        for _ in 0..self.config.max_cycles {
            let report = self.step();
            observe(&report, &self.warp);
        }
    }

    /// 打印仿真状态
    pub fn dump(&self) {
        println!("=== SimEnv Status ===");
        println!("Program length: {}", self.program.len());
        self.warp.dump_regs();
    }
}
