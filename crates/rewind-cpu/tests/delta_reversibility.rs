use std::collections::BTreeMap;

use proptest::prelude::*;
use rewind_cpu::{CpuState, UNSET_MEM_BYTE};
use rewind_trace::{MemWrite, TraceRecord};

fn record(pc: u64, regs: &[(&str, u64)], mem: &[(u64, &[u8])]) -> TraceRecord {
    TraceRecord {
        pc,
        reg_writes: regs
            .iter()
            .map(|&(name, value)| (name.to_string(), value))
            .collect(),
        mem_writes: mem
            .iter()
            .map(|&(addr, bytes)| MemWrite {
                addr,
                bytes: bytes.to_vec(),
            })
            .collect(),
        ..Default::default()
    }
}

#[test]
fn apply_captures_pre_images() {
    let mut cpu = CpuState::riscv64(0x1000);
    cpu.set_register(5, 0x111);
    cpu.write_mem(0x2000, &[0x01, 0x02]);

    let forward = record(0x1004, &[("x5", 0x222)], &[(0x2000, &[0xaa, 0xbb, 0xcc])]);
    let reverse = cpu.apply(&forward);

    assert_eq!(cpu.pc(), 0x1004);
    assert_eq!(cpu.register(5), 0x222);
    assert_eq!(cpu.read_mem(0x2000, 3), vec![0xaa, 0xbb, 0xcc]);

    assert_eq!(reverse.pc, 0x1000);
    assert_eq!(reverse.reg_writes, BTreeMap::from([("x5".to_string(), 0x111)]));
    // The third byte was untouched before the write, so its pre-image is
    // the sentinel.
    assert_eq!(
        reverse.mem_writes,
        vec![MemWrite {
            addr: 0x2000,
            bytes: vec![0x01, 0x02, UNSET_MEM_BYTE],
        }]
    );
}

#[test]
fn reverse_delta_restores_state() {
    let mut cpu = CpuState::riscv64(0x1000);
    let forward = record(0x2000, &[("x1", 7), ("x2", 8)], &[(0x80, &[1, 2, 3, 4])]);
    let reverse = cpu.apply(&forward);
    cpu.apply(&reverse);

    assert_eq!(cpu.pc(), 0x1000);
    assert_eq!(cpu.register(1), 0);
    assert_eq!(cpu.register(2), 0);
    assert_eq!(cpu.read_mem(0x80, 4), vec![UNSET_MEM_BYTE; 4]);
}

#[test]
fn non_general_register_names_are_ignored() {
    let mut cpu = CpuState::riscv64(0);
    let mut forward = record(0x4, &[("x3", 5)], &[]);
    forward
        .reg_writes
        .insert("mstatus".to_string(), 0xffff_ffff);

    let reverse = cpu.apply(&forward);
    assert_eq!(cpu.register(3), 5);
    // The unmodeled name shows up in neither the state nor the pre-image.
    assert!(!reverse.reg_writes.contains_key("mstatus"));
}

#[test]
fn overlapping_writes_in_one_record_unwind_in_order() {
    let mut cpu = CpuState::riscv64(0);
    cpu.write_mem(0x100, &[0x11, 0x22]);

    // Second write overlaps the first; pre-images are captured per write,
    // so applying the reverse list in order restores the original bytes.
    let forward = TraceRecord {
        pc: 0x4,
        mem_writes: vec![
            MemWrite {
                addr: 0x100,
                bytes: vec![0xaa, 0xbb],
            },
            MemWrite {
                addr: 0x101,
                bytes: vec![0xcc],
            },
        ],
        ..Default::default()
    };
    let reverse = cpu.apply(&forward);
    assert_eq!(cpu.read_mem(0x100, 2), vec![0xaa, 0xcc]);

    cpu.apply(&reverse);
    assert_eq!(cpu.read_mem(0x100, 2), vec![0x11, 0x22]);
}

fn arb_record() -> impl Strategy<Value = TraceRecord> {
    // Indexes past the register file (>= 33) exercise the warn-and-drop
    // path; reversibility must hold for those too.
    let reg_name = (0usize..40).prop_map(|index| format!("x{index}"));
    let mem_write = (0u64..0x200, proptest::collection::vec(any::<u8>(), 1..8))
        .prop_map(|(addr, bytes)| MemWrite { addr, bytes });
    (
        any::<u64>(),
        proptest::collection::btree_map(reg_name, any::<u64>(), 0..4),
        proptest::collection::vec(mem_write, 0..4),
    )
        .prop_map(|(pc, reg_writes, mem_writes)| TraceRecord {
            pc,
            reg_writes,
            mem_writes,
            ..Default::default()
        })
}

proptest! {
    // Applying a chain of records and then their reverse deltas in reverse
    // order restores every observable: all registers and every byte either
    // side touched.
    #[test]
    fn forward_then_reverse_is_identity(
        initial_pc in any::<u64>(),
        records in proptest::collection::vec(arb_record(), 1..12),
    ) {
        let mut cpu = CpuState::riscv64(initial_pc);

        let mut touched: Vec<u64> = records
            .iter()
            .flat_map(|record| record.mem_writes.iter())
            .flat_map(|write| (0..write.bytes.len() as u64).map(move |i| write.addr + i))
            .collect();
        touched.sort_unstable();
        touched.dedup();

        let initial_regs = cpu.registers().to_vec();
        let initial_mem: Vec<u8> = touched.iter().map(|&a| cpu.read_mem(a, 1)[0]).collect();

        let reverses: Vec<_> = records.iter().map(|record| cpu.apply(record)).collect();
        for reverse in reverses.iter().rev() {
            cpu.apply(reverse);
        }

        prop_assert_eq!(cpu.registers(), initial_regs.as_slice());
        let final_mem: Vec<u8> = touched.iter().map(|&a| cpu.read_mem(a, 1)[0]).collect();
        prop_assert_eq!(final_mem, initial_mem);
    }
}
