use std::io::Cursor;

use rewind_trace::{parse_spike_log, MemWrite, TraceError};

const SPIKE_LOG: &str = "\
core   0: 0x0000000000001000 (0x00000297) auipc   t0, 0x0
core   0: 3 0x0000000000001000 (0x00000297) x5  0x0000000000001000
core   0: 0x0000000000001004 (0x02028593) addi    a1, t0, 32
core   0: 3 0x0000000000001004 (0x02028593) x11 0x0000000000001020
core   0: 0x0000000000001008 (0xf1402573) csrr    a0, mhartid
core   0: 3 0x0000000000001008 (0xf1402573) x10 0x0000000000000000
core   0: 0x000000000000100c (0x0182b283) ld      t0, 24(t0)
core   0: 3 0x000000000000100c (0x0182b283) x5  0x0000000080000000 mem 0x0000000000001018
core   0: 0x0000000000001010 (0x00028067) jr      t0
core   0: 3 0x0000000000001010 (0x00028067)
core   0: >>>>  MEM_START
core   0: 0x0000000080000000 (0x1f80006f) j       pc + 0x1f8
core   0: 3 0x0000000080000000 (0x1f80006f)
core   0: 0x0000000080004628 (0x0000c8dc) c.sw    a5, 20(s1)
core   0: 3 0x0000000080004628 (0xc8dc) mem 0x0000000080010dac 0x00000002
";

#[test]
fn parses_status_lines_into_records() {
    let records = parse_spike_log(Cursor::new(SPIKE_LOG)).unwrap();
    assert_eq!(records.len(), 7);

    let first = &records[0];
    assert_eq!(first.pc, 0x1000);
    assert_eq!(first.instruction.as_deref(), Some("00000297"));
    assert_eq!(first.disasm.as_deref(), Some("auipc t0, 0x0"));
    assert_eq!(first.reg_writes.get("x5"), Some(&0x1000));

    assert_eq!(records[1].reg_writes.get("x11"), Some(&0x1020));
    assert_eq!(records[2].reg_writes.get("x10"), Some(&0));
}

#[test]
fn memory_reads_are_recorded_as_information_only() {
    let records = parse_spike_log(Cursor::new(SPIKE_LOG)).unwrap();
    let load = &records[3];
    assert_eq!(load.pc, 0x100c);
    assert_eq!(load.reg_writes.get("x5"), Some(&0x8000_0000));
    assert_eq!(load.mem_reads, vec!["0000000000001018".to_string()]);
    assert!(load.mem_writes.is_empty());
}

#[test]
fn memory_writes_keep_textual_byte_order() {
    let records = parse_spike_log(Cursor::new(SPIKE_LOG)).unwrap();
    let store = records.last().unwrap();
    assert_eq!(store.pc, 0x8000_4628);
    // Compressed opcode keeps the producer's reported width.
    assert_eq!(store.instruction.as_deref(), Some("c8dc"));
    assert_eq!(
        store.mem_writes,
        vec![MemWrite {
            addr: 0x8001_0dac,
            bytes: vec![0x00, 0x00, 0x00, 0x02],
        }]
    );
}

#[test]
fn record_without_effects_is_fine() {
    let records = parse_spike_log(Cursor::new(SPIKE_LOG)).unwrap();
    let jump = &records[4];
    assert_eq!(jump.pc, 0x1010);
    assert!(jump.reg_writes.is_empty());
    assert!(jump.mem_writes.is_empty());
}

#[test]
fn section_markers_are_skipped() {
    // The `>>>> MEM_START` line and the interleaved disassembly lines
    // produce no records of their own.
    let records = parse_spike_log(Cursor::new(SPIKE_LOG)).unwrap();
    assert!(records.iter().all(|record| record.pc != 0));
}

#[test]
fn unparseable_effect_suffix_is_a_load_error() {
    let log = "core   0: 3 0x0000000000001000 (0x00000297) x5 0x10 ???\n";
    let err = parse_spike_log(Cursor::new(log)).unwrap_err();
    match err {
        TraceError::Line { line, .. } => assert_eq!(line, 1),
        other => panic!("expected a line error, got {other:?}"),
    }
}

#[test]
fn odd_length_memory_write_data_is_a_load_error() {
    let log = "core   0: 3 0x0000000000001000 (0x00000297) mem 0x80 0x123\n";
    assert!(matches!(
        parse_spike_log(Cursor::new(log)),
        Err(TraceError::Line { line: 1, .. })
    ));
}
