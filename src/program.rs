//! 取指接口与程序存储
//!
//! 执行核心只通过 `InstrSupply` 获取指令；`ProgramRom` 是固定的查找表实现。

use thiserror::Error;

use crate::isa::{self, InstrError, Instruction};

/// 取指接口：给定 PC 返回该周期要执行的指令，不得有副作用
pub trait InstrSupply {
    fn fetch(&self, pc: u16) -> Instruction;
}

impl<F: Fn(u16) -> Instruction> InstrSupply for F {
    fn fetch(&self, pc: u16) -> Instruction {
        self(pc)
    }
}

/// 程序镜像装载错误
#[derive(Debug, Error)]
pub enum ProgramError {
    #[error("program image length {len} is not a multiple of 4 bytes")]
    Misaligned { len: usize },

    #[error("invalid instruction word at pc {pc}: {source}")]
    Decode {
        pc: usize,
        #[source]
        source: InstrError,
    },

    #[error("program does not fit in the 16-bit pc space (ends at {end})")]
    TooLarge { end: usize },
}

/// PC 空间上限
pub const MAX_PROGRAM_LEN: usize = 1 << 16;

/// 固定指令查找表
///
/// 超出表尾的 PC 取到 NOP。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgramRom {
    instrs: Vec<Instruction>,
}

impl ProgramRom {
    pub fn new(instrs: Vec<Instruction>) -> Self {
        Self { instrs }
    }

    /// 从已编码的指令字构造
    pub fn from_words(words: &[u32]) -> Result<Self, ProgramError> {
        let mut rom = Self::default();
        rom.place_words(0, words)?;
        Ok(rom)
    }

    /// 从小端序字节镜像构造（原始 .bin 文件）
    pub fn from_le_bytes(bytes: &[u8]) -> Result<Self, ProgramError> {
        let mut rom = Self::default();
        rom.place_le_bytes(0, bytes)?;
        Ok(rom)
    }

    /// 把指令字放到 `base` 开始的位置，中间空洞以 NOP 填充
    pub fn place_words(&mut self, base: usize, words: &[u32]) -> Result<(), ProgramError> {
        let end = base + words.len();
        if end > MAX_PROGRAM_LEN {
            return Err(ProgramError::TooLarge { end });
        }
        if self.instrs.len() < end {
            self.instrs.resize(end, Instruction::nop());
        }
        for (i, &raw) in words.iter().enumerate() {
            let pc = base + i;
            self.instrs[pc] =
                isa::decode(raw).map_err(|source| ProgramError::Decode { pc, source })?;
        }
        Ok(())
    }

    pub fn place_le_bytes(&mut self, base: usize, bytes: &[u8]) -> Result<(), ProgramError> {
        if bytes.len() % 4 != 0 {
            return Err(ProgramError::Misaligned { len: bytes.len() });
        }
        let words: Vec<u32> = bytes
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        self.place_words(base, &words)
    }

    pub fn len(&self) -> usize {
        self.instrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instrs.is_empty()
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instrs
    }

    /// 编码回指令字
    pub fn to_words(&self) -> Vec<u32> {
        self.instrs.iter().map(isa::encode).collect()
    }
}

impl InstrSupply for ProgramRom {
    fn fetch(&self, pc: u16) -> Instruction {
        self.instrs
            .get(pc as usize)
            .copied()
            .unwrap_or(Instruction::nop())
    }
}

impl FromIterator<Instruction> for ProgramRom {
    fn from_iter<I: IntoIterator<Item = Instruction>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// 参考场景程序
///
/// ```text
/// 0: LDR r1, [r0]      ; r1 = 每个线程唯一的 id
/// 1: MOV r2, #11
/// 2: BEQ r1, r2, 3     ; 只有 r1 == 11 的线程保持活动
/// 3: ADD r3, r1, r2
/// 4: JMP 5             ; 重新汇聚
/// 5: NOP
/// ```
pub fn reference_program() -> Result<ProgramRom, InstrError> {
    Ok(ProgramRom::new(vec![
        Instruction::ldr(1, 0)?,
        Instruction::mov(2, 11)?,
        Instruction::beq(1, 2, 3)?,
        Instruction::add(3, 1, 2)?,
        Instruction::jmp(5),
        Instruction::nop(),
    ]))
}
