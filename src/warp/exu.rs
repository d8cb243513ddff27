//! Per-cycle execution: request shaping, masked apply, atomic commit.
//!
//! A cycle is split into three pure steps so that every lane reads the same
//! pre-cycle snapshot:
//!
//! 1. [`shape_requests`] builds one memory request per lane;
//! 2. the caller services them against its memory;
//! 3. [`apply`] turns (state, instruction, responses) into a [`Writeback`],
//!    which [`Writeback::commit`] installs in one go.

use super::mask::ActivityMask;
use super::status::{RegWidth, WarpState};
use crate::isa::{Instruction, Opcode};
use crate::memory::MemRequest;

/// Everything a cycle changes, computed before anything is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Writeback {
    pub next_pc: u16,
    pub rd: u8,
    /// `Some(value)` for lanes whose `rd` is written this cycle.
    pub rd_data: Vec<Option<u16>>,
    pub next_mask: ActivityMask,
}

impl Writeback {
    pub fn commit(self, state: &mut WarpState) {
        for (rf, data) in state.regs.iter_mut().zip(self.rd_data) {
            if let Some(value) = data {
                rf.write(self.rd, value);
            }
        }
        state.mask = self.next_mask;
        state.pc = self.next_pc;
    }

    /// Number of lanes that write `rd`.
    pub fn lanes_written(&self) -> usize {
        self.rd_data.iter().filter(|d| d.is_some()).count()
    }
}

/// One request per lane: address from `rs1`, data from `rs2`, write enable
/// only on STR for active lanes.
pub fn shape_requests(state: &WarpState, instr: &Instruction) -> Vec<MemRequest> {
    let is_store = instr.opcode() == Opcode::Str;
    state
        .regs
        .iter()
        .enumerate()
        .map(|(lane, rf)| MemRequest {
            addr: rf.read(instr.rs1()),
            wdata: rf.read(instr.rs2()),
            we: is_store && state.mask.is_active(lane),
        })
        .collect()
}

#[inline]
fn execute_lanes<F>(mask: &ActivityMask, lanes: usize, mut func: F) -> Vec<Option<u16>>
where
    F: FnMut(usize) -> u16,
{
    (0..lanes)
        .map(|lane| mask.is_active(lane).then(|| func(lane)))
        .collect()
}

/// Compute the writeback for one cycle.
///
/// `responses[lane]` is the read data returned for that lane's request; it is
/// consumed only by LDR on active lanes.
///
/// # Panics
///
/// If `responses` does not hold exactly one entry per lane.
pub fn apply(
    state: &WarpState,
    instr: &Instruction,
    responses: &[u16],
    width: RegWidth,
) -> Writeback {
    let lanes = state.lanes();
    assert_eq!(
        responses.len(),
        lanes,
        "expected one memory response per lane"
    );
    let mask = &state.mask;
    let (rs1, rs2) = (instr.rs1(), instr.rs2());
    let no_writes = || vec![None; lanes];

    let rd_data = match instr.opcode() {
        Opcode::Add => execute_lanes(mask, lanes, |lane| {
            width.wrapping_add(state.read(lane, rs1), state.read(lane, rs2))
        }),
        Opcode::Sub => execute_lanes(mask, lanes, |lane| {
            width.wrapping_sub(state.read(lane, rs1), state.read(lane, rs2))
        }),
        Opcode::Mov => execute_lanes(mask, lanes, |_| width.truncate(instr.imm())),
        Opcode::Ldr => execute_lanes(mask, lanes, |lane| width.truncate(responses[lane])),
        Opcode::Nop | Opcode::Str | Opcode::Beq | Opcode::Jmp => no_writes(),
    };

    let next_mask = match instr.opcode() {
        Opcode::Beq => mask.narrow(|lane| state.read(lane, rs1) == state.read(lane, rs2)),
        Opcode::Jmp => ActivityMask::all_active(lanes),
        _ => *mask,
    };

    let next_pc = if instr.opcode().is_control() {
        instr.imm()
    } else {
        state.pc.wrapping_add(1)
    };

    Writeback {
        next_pc,
        rd: instr.rd(),
        rd_data,
        next_mask,
    }
}

/// The cycle as a pure function of (state, instruction, responses).
///
/// Panics under the same condition as [`apply`].
pub fn next_state(
    state: &WarpState,
    instr: &Instruction,
    responses: &[u16],
    width: RegWidth,
) -> WarpState {
    let mut next = state.clone();
    apply(state, instr, responses, width).commit(&mut next);
    next
}
