//! Warp 执行核心测试：参考场景、边界情况与不变式

use proptest::prelude::*;

use super::*;
use crate::memory::{FlatMemory, LaneIdMemory};
use crate::program::{ProgramRom, reference_program};

fn lane_values(warp: &WarpCore, reg: u8) -> Vec<u16> {
    warp.column(reg)
}

#[test]
fn test_reference_scenario() {
    let rom = reference_program().unwrap();
    let mut mem = LaneIdMemory::new(4);
    let mut warp = WarpBuilder::new().with_lanes(4).with_reg_width(16).build().unwrap();

    // 两个复位周期
    for _ in 0..2 {
        let report = warp.clock(true, &rom, &mut mem);
        assert_eq!(report.kind, CycleKind::Reset);
        assert!(report.requests.is_empty());
        assert_eq!(warp.pc(), 0);
    }

    // LDR r1, [r0]
    warp.clock(false, &rom, &mut mem);
    assert_eq!(lane_values(&warp, 1), vec![10, 11, 12, 13]);
    assert_eq!(warp.pc(), 1);

    // MOV r2, #11
    warp.clock(false, &rom, &mut mem);
    assert_eq!(lane_values(&warp, 2), vec![11, 11, 11, 11]);

    // BEQ r1, r2, 3
    let report = warp.clock(false, &rom, &mut mem);
    assert_eq!(report.mask_after.to_vec(), vec![false, true, false, false]);
    assert_eq!(warp.mask().to_string(), "[0,1,0,0]");
    assert_eq!(warp.pc(), 3);

    // ADD r3, r1, r2
    warp.clock(false, &rom, &mut mem);
    assert_eq!(lane_values(&warp, 3), vec![0, 22, 0, 0]);

    // JMP 5
    let report = warp.clock(false, &rom, &mut mem);
    assert!(report.mask_after.is_all_active());
    assert_eq!(warp.pc(), 5);

    // NOP
    warp.clock(false, &rom, &mut mem);
    assert_eq!(warp.pc(), 6);
    assert_eq!(warp.cycles(), 8);
    assert_eq!(mem.dropped_writes(), 0);
}

#[test]
fn test_reset_overrides_dispatch() {
    let rom = reference_program().unwrap();
    let mut mem = LaneIdMemory::new(4);
    let mut warp = WarpCore::new();

    warp.run(&rom, &mut mem, 3);
    assert_eq!(warp.pc(), 3);
    assert_eq!(warp.mask().active_count(), 1);

    warp.clock(true, &rom, &mut mem);
    assert_eq!(warp.pc(), 0);
    assert!(warp.mask().is_all_active());
    assert!(warp.state().regs.iter().all(|rf| *rf == RegFile::new()));
}

#[test]
fn test_store_with_empty_mask_writes_nothing() {
    let mut mem = FlatMemory::new();
    let mut warp = WarpCore::new();
    for lane in 0..4 {
        warp.state.regs[lane].write(1, 0x100 + lane as u16);
        warp.state.regs[lane].write(2, 0xAA);
    }
    warp.state.mask = ActivityMask::from_bits(4, 0);

    let report = warp.execute(Instruction::str(1, 2).unwrap(), &mut mem);
    assert_eq!(report.write_enables(), 0);
    assert_eq!(mem.store_count(), 0);
    assert_eq!(mem.read_words(0x100, 4), vec![0; 4]);
}

#[test]
fn test_store_scatters_active_lanes() {
    let mut mem = FlatMemory::new();
    let mut warp = WarpCore::new();
    for lane in 0..4 {
        warp.state.regs[lane].write(1, 0x200 + lane as u16);
        warp.state.regs[lane].write(2, lane as u16 * 3);
    }
    warp.state.mask = ActivityMask::from_bits(4, 0b1001);

    let report = warp.execute(Instruction::str(1, 2).unwrap(), &mut mem);
    assert_eq!(report.write_enables(), 2);
    assert_eq!(mem.read_words(0x200, 4), vec![0, 0, 0, 9]);
}

#[test]
fn test_gather_then_scatter() {
    let mut mem = FlatMemory::new();
    mem.write_words(0x40, &[5, 6, 7, 8]);
    let program = ProgramRom::new(vec![
        Instruction::mov(1, 0x40).unwrap(),
        // r2 预置为线程号
        Instruction::add(1, 1, 2).unwrap(),
        Instruction::ldr(3, 1).unwrap(),
        Instruction::mov(4, 0x80).unwrap(),
        Instruction::add(4, 4, 2).unwrap(),
        Instruction::str(4, 3).unwrap(),
    ]);
    let mut warp = WarpCore::new();
    for lane in 0..4 {
        warp.state.regs[lane].write(2, lane as u16);
    }

    warp.run(&program, &mut mem, program.len() as u64);
    assert_eq!(warp.column(3), vec![5, 6, 7, 8]);
    assert_eq!(mem.read_words(0x80, 4), vec![5, 6, 7, 8]);
}

#[test]
fn test_ldr_on_masked_lane_keeps_rd() {
    let mut mem = LaneIdMemory::new(4);
    let mut warp = WarpCore::new();
    for lane in 0..4 {
        warp.state.regs[lane].write(5, 77);
    }
    warp.state.mask = ActivityMask::from_bits(4, 0b0100);

    warp.execute(Instruction::ldr(5, 0).unwrap(), &mut mem);
    assert_eq!(warp.column(5), vec![77, 77, 12, 77]);
}

#[test]
fn test_add_overflow_wraps() {
    let mut mem = FlatMemory::new();
    let mut warp = WarpCore::new();
    warp.execute(Instruction::mov(1, u16::MAX).unwrap(), &mut mem);
    warp.execute(Instruction::mov(2, u16::MAX).unwrap(), &mut mem);
    warp.execute(Instruction::add(3, 1, 2).unwrap(), &mut mem);
    assert_eq!(warp.column(3), vec![0xFFFE; 4]);
}

#[test]
fn test_narrow_register_width() {
    let mut mem = FlatMemory::new();
    let mut warp = WarpBuilder::new().with_lanes(2).with_reg_width(8).build().unwrap();
    warp.execute(Instruction::mov(1, 0x1FF).unwrap(), &mut mem);
    assert_eq!(warp.column(1), vec![0xFF, 0xFF]);
    warp.execute(Instruction::mov(2, 1).unwrap(), &mut mem);
    warp.execute(Instruction::add(3, 1, 2).unwrap(), &mut mem);
    assert_eq!(warp.column(3), vec![0, 0]);
}

#[test]
fn test_second_beq_only_narrows() {
    let mut mem = LaneIdMemory::new(4);
    let mut warp = WarpCore::new();
    // r1 = [10, 11, 12, 13]
    warp.execute(Instruction::ldr(1, 0).unwrap(), &mut mem);
    warp.execute(Instruction::mov(2, 11).unwrap(), &mut mem);
    warp.execute(Instruction::beq(1, 2, 3).unwrap(), &mut mem);
    assert_eq!(warp.mask().to_vec(), vec![false, true, false, false]);

    // 第二次发散：被屏蔽的线程即使满足条件也不会恢复
    warp.execute(Instruction::beq(0, 0, 4).unwrap(), &mut mem);
    assert_eq!(warp.mask().to_vec(), vec![false, true, false, false]);

    warp.execute(Instruction::mov(3, 12).unwrap(), &mut mem);
    warp.execute(Instruction::beq(1, 3, 6).unwrap(), &mut mem);
    assert!(warp.mask().is_empty());

    warp.execute(Instruction::jmp(0), &mut mem);
    assert!(warp.mask().is_all_active());
}

#[test]
fn test_closure_supply_and_wide_warp() {
    let mut mem = LaneIdMemory::with_base(64, 0);
    let mut warp = WarpBuilder::new().with_lanes(64).build().unwrap();
    let supply = |pc: u16| match pc {
        0 => Instruction::ldr(1, 0).unwrap(),
        1 => Instruction::mov(2, 40).unwrap(),
        2 => Instruction::beq(1, 2, 3).unwrap(),
        _ => Instruction::nop(),
    };
    warp.run(&supply, &mut mem, 3);
    assert_eq!(warp.mask().iter_active().collect::<Vec<_>>(), vec![40]);
}

// ========== 不变式 ==========

fn arb_instruction() -> impl Strategy<Value = Instruction> {
    (0u8..8, 0u8..16, 0u8..16, 0u8..16, any::<u16>()).prop_map(|(op, rd, rs1, rs2, imm)| {
        let op = Opcode::try_from(op).unwrap();
        Instruction::new(op, rd, rs1, rs2, imm).unwrap()
    })
}

/// 寄存器取值集中在少数几个值上，便于 BEQ 产生部分相等
fn arb_state(lanes: usize) -> impl Strategy<Value = WarpState> {
    (
        prop::collection::vec(prop::array::uniform16(0u16..4), lanes),
        any::<u64>(),
        any::<u16>(),
    )
        .prop_map(move |(regs, mask_bits, pc)| {
            let mut state = WarpState::reset(lanes);
            for (rf, values) in state.regs.iter_mut().zip(regs) {
                for (reg, v) in values.into_iter().enumerate() {
                    rf.write(reg as u8, v);
                }
            }
            state.mask = ActivityMask::from_bits(lanes, mask_bits);
            state.pc = pc;
            state
        })
}

fn core_from(state: WarpState) -> WarpCore {
    let mut warp = WarpBuilder::new().with_lanes(state.lanes()).build().unwrap();
    warp.state = state;
    warp
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_mask_changes_only_on_control_flow(
        state in arb_state(4),
        program in prop::collection::vec(arb_instruction(), 1..32),
    ) {
        let mut warp = core_from(state);
        let mut mem = FlatMemory::new();
        for instr in program {
            let report = warp.execute(instr, &mut mem);
            match instr.opcode() {
                Opcode::Beq => {
                    prop_assert!(report.mask_after.is_subset_of(&report.mask_before));
                }
                Opcode::Jmp => {
                    prop_assert!(report.mask_after.is_all_active());
                }
                _ => {
                    prop_assert_eq!(report.mask_after, report.mask_before);
                }
            }
        }
    }

    #[test]
    fn prop_inactive_lanes_untouched(
        state in arb_state(4),
        program in prop::collection::vec(arb_instruction(), 1..32),
    ) {
        let mut warp = core_from(state);
        let mut mem = FlatMemory::new();
        for instr in program {
            let before = warp.state().clone();
            let report = warp.execute(instr, &mut mem);
            for lane in 0..before.lanes() {
                if !before.mask.is_active(lane) {
                    prop_assert_eq!(&warp.state().regs[lane], &before.regs[lane]);
                    prop_assert!(!report.requests[lane].we);
                }
            }
        }
    }

    #[test]
    fn prop_nop_only_advances_pc(state in arb_state(4), n in 1u16..64) {
        let mut warp = core_from(state.clone());
        let mut mem = FlatMemory::new();
        for _ in 0..n {
            warp.execute(Instruction::nop(), &mut mem);
        }
        let mut expected = state;
        expected.pc = expected.pc.wrapping_add(n);
        prop_assert_eq!(warp.state(), &expected);
        prop_assert_eq!(mem.store_count(), 0);
    }

    #[test]
    fn prop_runs_are_deterministic(
        state in arb_state(4),
        program in prop::collection::vec(arb_instruction(), 1..24),
        cycles in 1u64..48,
    ) {
        let rom = ProgramRom::new(program);
        let trajectory = |state: WarpState| {
            let mut warp = core_from(state);
            let mut mem = FlatMemory::new();
            let mut states = Vec::new();
            let mut reports = Vec::new();
            for _ in 0..cycles {
                reports.push(warp.step(&rom, &mut mem));
                states.push(warp.state().clone());
            }
            (states, reports, mem.read_words(0, 4))
        };
        prop_assert_eq!(trajectory(state.clone()), trajectory(state));
    }
}
