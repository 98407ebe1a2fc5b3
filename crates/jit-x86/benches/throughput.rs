//! Performance benchmarks for `jit_x86`.
//!
//! Measures:
//! - Single instruction latency (per mode and addressing form)
//! - Straight-line throughput (instructions per second into a `Vec<u8>`)
//! - Label-heavy workloads with forward and backward branches
//!
//! Run with: `cargo bench`

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use jit_x86::{CodeBuffer, Cond, Encoder, Mnemonic, Mode, ModeTag, Operand, Register};

// ─── Single-Instruction Latency ──────────────────────────────────────────────

fn bench_single_instruction(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_instruction");
    let x86 = Encoder::new(Mode::X86);
    let x64 = Encoder::new(Mode::X86_64);

    group.bench_function("x86_nop", |b| {
        b.iter(|| x86.encode(black_box(Mnemonic::Nop), ModeTag::None, &[]).unwrap())
    });

    group.bench_function("x86_mov_frame_slot", |b| {
        let ops = [Register::EDX.into(), Operand::StackSlot(-36)];
        b.iter(|| x86.encode(Mnemonic::Mov, ModeTag::RB, black_box(&ops)).unwrap())
    });

    group.bench_function("x86_64_add_reg_imm", |b| {
        let ops = [Register::R10.into(), Operand::Immediate(1000)];
        b.iter(|| x64.encode(Mnemonic::Add, ModeTag::RI, black_box(&ops)).unwrap())
    });

    group.bench_function("x86_64_mov_scaled_index", |b| {
        let ops = [
            Operand::array(Register::R13, Register::R12, 3, 0x10),
            Register::RDX.into(),
        ];
        b.iter(|| x64.encode(Mnemonic::Mov, ModeTag::AR, black_box(&ops)).unwrap())
    });

    group.bench_function("x86_64_mov_imm64", |b| {
        let ops = [Register::RAX.into(), Operand::Immediate(0x1234_5678_9ABC)];
        b.iter(|| x64.encode(Mnemonic::Mov, ModeTag::RI, black_box(&ops)).unwrap())
    });

    group.bench_function("x86_64_addsd", |b| {
        let ops = [Register::XMM8.into(), Operand::StackSlot(-8)];
        b.iter(|| x64.encode(Mnemonic::Addsd, ModeTag::RB, black_box(&ops)).unwrap())
    });

    group.bench_function("x86_64_tag_inference", |b| {
        let ops = [Register::RAX.into(), Register::RCX.into()];
        b.iter(|| x64.encode_ops(Mnemonic::Xor, black_box(&ops)).unwrap())
    });

    group.finish();
}

// ─── Straight-Line Throughput ────────────────────────────────────────────────

/// A function body's worth of frame traffic and arithmetic.
fn block(n: usize) -> Vec<(Mnemonic, Vec<Operand>)> {
    let regs = [Register::RAX, Register::RCX, Register::RDX, Register::R8, Register::R12];
    (0..n)
        .map(|i| {
            let r = regs[i % regs.len()];
            let slot = Operand::StackSlot(-8 * (i as i32 % 40) - 8);
            match i % 6 {
                0 => (Mnemonic::Mov, vec![r.into(), slot]),
                1 => (Mnemonic::Add, vec![r.into(), Operand::Immediate(i as i64)]),
                2 => (Mnemonic::Imul, vec![r.into(), Register::RCX.into()]),
                3 => (Mnemonic::Mov, vec![slot, r.into()]),
                4 => (Mnemonic::Lea, vec![r.into(), Operand::array(Register::RBX, Register::RSI, 3, 16)]),
                _ => (Mnemonic::Cmp, vec![r.into(), Operand::Immediate(100_000)]),
            }
        })
        .collect()
}

fn bench_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("throughput");
    let encoder = Encoder::new(Mode::X86_64);

    for n in [100usize, 1_000, 10_000] {
        let body = block(n);
        group.throughput(Throughput::Elements(n as u64));
        group.bench_function(format!("straight_line_{n}"), |b| {
            b.iter(|| {
                let mut buf = CodeBuffer::new();
                for (m, ops) in &body {
                    encoder.emit_ops(&mut buf, *m, ops).unwrap();
                }
                black_box(buf.finalize().unwrap().into_bytes())
            })
        });
    }

    group.finish();
}

// ─── Label-Heavy Workloads ───────────────────────────────────────────────────

fn bench_labels(c: &mut Criterion) {
    let mut group = c.benchmark_group("labels");
    let encoder = Encoder::new(Mode::X86_64);

    group.bench_function("loop_nest_100", |b| {
        b.iter(|| {
            let mut buf = CodeBuffer::new();
            let mut exits = Vec::with_capacity(100);
            for _ in 0..100 {
                let top = buf.new_label();
                let exit = buf.new_label();
                buf.bind_label(top).unwrap();
                encoder
                    .emit_ops(&mut buf, Mnemonic::Cmp, &[Register::RCX.into(), Operand::Immediate(0)])
                    .unwrap();
                encoder.emit_ops(&mut buf, Mnemonic::J(Cond::E), &[exit.into()]).unwrap();
                encoder.emit_ops(&mut buf, Mnemonic::Dec, &[Register::RCX.into()]).unwrap();
                encoder.emit_ops(&mut buf, Mnemonic::Jmp, &[top.into()]).unwrap();
                exits.push(exit);
            }
            // every exit lands on the same epilogue
            for exit in exits {
                buf.bind_label(exit).unwrap();
            }
            encoder.emit_ops(&mut buf, Mnemonic::Ret, &[]).unwrap();
            black_box(buf.finalize().unwrap().len())
        })
    });

    group.bench_function("forward_calls_1000", |b| {
        b.iter(|| {
            let mut buf = CodeBuffer::new();
            let targets: Vec<_> = (0..1000).map(|_| buf.new_label()).collect();
            for &t in &targets {
                encoder.emit_ops(&mut buf, Mnemonic::Call, &[t.into()]).unwrap();
            }
            for &t in &targets {
                buf.bind_label(t).unwrap();
                encoder.emit_ops(&mut buf, Mnemonic::Ret, &[]).unwrap();
            }
            black_box(buf.finalize().unwrap().relocations().len())
        })
    });

    group.finish();
}

criterion_group!(benches, bench_single_instruction, bench_throughput, bench_labels);
criterion_main!(benches);
