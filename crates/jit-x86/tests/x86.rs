//! x86-32 encodings, byte for byte.
//!
//! Expected bytes were taken from `as --32` listings.

use jit_x86::{encode_one, Cond, EncodeError, Mnemonic, Mode, Operand, Register};
use Operand::{Immediate, ImmediateAddress, StackArg, StackSlot};

fn enc(mnemonic: Mnemonic, ops: &[Operand]) -> Vec<u8> {
    encode_one(Mode::X86, mnemonic, ops)
        .unwrap_or_else(|e| panic!("{mnemonic} {ops:?} failed to encode: {e}"))
}

fn r(reg: Register) -> Operand {
    Operand::Register(reg)
}

const EAX: Operand = Operand::Register(Register::EAX);
const ECX: Operand = Operand::Register(Register::ECX);
const EDX: Operand = Operand::Register(Register::EDX);
const EBX: Operand = Operand::Register(Register::EBX);

// --- Fixed and stack instructions ---

#[test]
fn x86_fixed() {
    assert_eq!(enc(Mnemonic::Nop, &[]), vec![0x90]);
    assert_eq!(enc(Mnemonic::Ret, &[]), vec![0xC3]);
    assert_eq!(enc(Mnemonic::Int3, &[]), vec![0xCC]);
    assert_eq!(enc(Mnemonic::Cdq, &[]), vec![0x99]);
}

/// `ret $8` encodes as C2 08 00.
#[test]
fn x86_ret_imm16() {
    assert_eq!(enc(Mnemonic::Ret, &[Immediate(8)]), vec![0xC2, 0x08, 0x00]);
}

#[test]
fn x86_push_pop() {
    assert_eq!(enc(Mnemonic::Push, &[EAX]), vec![0x50]);
    assert_eq!(enc(Mnemonic::Push, &[r(Register::EDI)]), vec![0x57]);
    assert_eq!(enc(Mnemonic::Pop, &[EBX]), vec![0x5B]);
    assert_eq!(enc(Mnemonic::Push, &[StackSlot(-4)]), vec![0xFF, 0x75, 0xFC]);
    assert_eq!(enc(Mnemonic::Pop, &[StackSlot(-4)]), vec![0x8F, 0x45, 0xFC]);
}

#[test]
fn x86_push_imm() {
    assert_eq!(enc(Mnemonic::Push, &[Immediate(5)]), vec![0x6A, 0x05]);
    assert_eq!(
        enc(Mnemonic::Push, &[Immediate(1000)]),
        vec![0x68, 0xE8, 0x03, 0x00, 0x00]
    );
}

// --- MOV ---

/// `movl $-2, %ecx` encodes as B9 FE FF FF FF.
#[test]
fn x86_mov_reg_imm() {
    assert_eq!(
        enc(Mnemonic::Mov, &[ECX, Immediate(-2)]),
        vec![0xB9, 0xFE, 0xFF, 0xFF, 0xFF]
    );
}

#[test]
fn x86_mov_frame_slot() {
    assert_eq!(enc(Mnemonic::Mov, &[EDX, StackSlot(-36)]), vec![0x8B, 0x55, 0xDC]);
    assert_eq!(enc(Mnemonic::Mov, &[StackSlot(-36), EDX]), vec![0x89, 0x55, 0xDC]);
    assert_eq!(
        enc(Mnemonic::Mov, &[EAX, StackSlot(-132)]),
        vec![0x8B, 0x85, 0x7C, 0xFF, 0xFF, 0xFF]
    );
}

#[test]
fn x86_mov_stack_arg() {
    assert_eq!(enc(Mnemonic::Mov, &[EAX, StackArg(0)]), vec![0x8B, 0x04, 0x24]);
    assert_eq!(enc(Mnemonic::Mov, &[EAX, StackArg(4)]), vec![0x8B, 0x44, 0x24, 0x04]);
}

#[test]
fn x86_mov_memory() {
    assert_eq!(enc(Mnemonic::Mov, &[EAX, Operand::mem(Register::EAX, 0)]), vec![0x8B, 0x00]);
    assert_eq!(
        enc(Mnemonic::Mov, &[EAX, Operand::mem(Register::EBP, 0)]),
        vec![0x8B, 0x45, 0x00]
    );
    assert_eq!(
        enc(Mnemonic::Mov, &[EAX, Operand::mem(Register::ESP, 8)]),
        vec![0x8B, 0x44, 0x24, 0x08]
    );
    assert_eq!(
        enc(Mnemonic::Mov, &[EAX, Operand::mem(Register::ECX, 128)]),
        vec![0x8B, 0x81, 0x80, 0x00, 0x00, 0x00]
    );
}

/// `movl (%esi,%edi,4), %eax` encodes as 8B 04 BE.
#[test]
fn x86_mov_scaled_index() {
    assert_eq!(
        enc(
            Mnemonic::Mov,
            &[EAX, Operand::array(Register::ESI, Register::EDI, 2, 0)]
        ),
        vec![0x8B, 0x04, 0xBE]
    );
    // %ebp base cannot use mod 00
    assert_eq!(
        enc(
            Mnemonic::Mov,
            &[Operand::array(Register::EBP, Register::ECX, 0, 0), EAX]
        ),
        vec![0x89, 0x44, 0x0D, 0x00]
    );
}

#[test]
fn x86_mov_absolute() {
    // accumulator short form
    assert_eq!(
        enc(Mnemonic::Mov, &[EAX, ImmediateAddress(0x1000)]),
        vec![0xA1, 0x00, 0x10, 0x00, 0x00]
    );
    assert_eq!(
        enc(Mnemonic::Mov, &[ImmediateAddress(0x1000), EAX]),
        vec![0xA3, 0x00, 0x10, 0x00, 0x00]
    );
    assert_eq!(
        enc(Mnemonic::Mov, &[ECX, ImmediateAddress(0x1000)]),
        vec![0x8B, 0x0D, 0x00, 0x10, 0x00, 0x00]
    );
    // upper half of the unsigned 32-bit range is a valid address
    assert_eq!(
        enc(Mnemonic::Mov, &[ECX, ImmediateAddress(0xFFFF_FFFF)]),
        vec![0x8B, 0x0D, 0xFF, 0xFF, 0xFF, 0xFF]
    );
}

#[test]
fn x86_mov_mem_imm() {
    assert_eq!(
        enc(Mnemonic::Mov, &[StackSlot(-4), Immediate(7)]),
        vec![0xC7, 0x45, 0xFC, 0x07, 0x00, 0x00, 0x00]
    );
}

#[test]
fn x86_mov_word_and_byte() {
    assert_eq!(
        enc(Mnemonic::Mov, &[r(Register::CX), r(Register::AX)]),
        vec![0x66, 0x89, 0xC1]
    );
    assert_eq!(enc(Mnemonic::Mov8, &[r(Register::AL), r(Register::CL)]), vec![0x88, 0xC8]);
    assert_eq!(
        enc(Mnemonic::Mov8, &[StackSlot(-1), Immediate(255)]),
        vec![0xC6, 0x45, 0xFF, 0xFF]
    );
}

#[test]
fn x86_extend() {
    assert_eq!(
        enc(Mnemonic::Movzx8, &[EAX, r(Register::CL)]),
        vec![0x0F, 0xB6, 0xC1]
    );
    assert_eq!(
        enc(Mnemonic::Movsx16, &[EAX, StackSlot(-8)]),
        vec![0x0F, 0xBF, 0x45, 0xF8]
    );
}

// --- LEA ---

#[test]
fn x86_lea() {
    assert_eq!(enc(Mnemonic::Lea, &[ECX, StackSlot(-36)]), vec![0x8D, 0x4D, 0xDC]);
    assert_eq!(
        enc(Mnemonic::Lea32, &[ECX, StackSlot(-36)]),
        vec![0x8D, 0x8D, 0xDC, 0xFF, 0xFF, 0xFF]
    );
}

// --- ALU ---

#[test]
fn x86_alu_imm() {
    assert_eq!(enc(Mnemonic::Add, &[ECX, Immediate(1)]), vec![0x83, 0xC1, 0x01]);
    assert_eq!(enc(Mnemonic::Add, &[EAX, Immediate(1)]), vec![0x83, 0xC0, 0x01]);
    assert_eq!(
        enc(Mnemonic::Add, &[EAX, Immediate(1000)]),
        vec![0x05, 0xE8, 0x03, 0x00, 0x00]
    );
    assert_eq!(
        enc(Mnemonic::Add, &[ECX, Immediate(1000)]),
        vec![0x81, 0xC1, 0xE8, 0x03, 0x00, 0x00]
    );
    assert_eq!(
        enc(Mnemonic::Sub, &[StackSlot(-4), Immediate(1)]),
        vec![0x83, 0x6D, 0xFC, 0x01]
    );
    // 0xFFFFFFFF is -1 as a 32-bit immediate
    assert_eq!(
        enc(Mnemonic::And, &[ECX, Immediate(0xFFFF_FFFF)]),
        vec![0x83, 0xE1, 0xFF]
    );
}

#[test]
fn x86_alu_reg() {
    assert_eq!(enc(Mnemonic::Cmp, &[ECX, EDX]), vec![0x39, 0xD1]);
    assert_eq!(enc(Mnemonic::Xor, &[EAX, EAX]), vec![0x31, 0xC0]);
    assert_eq!(enc(Mnemonic::Adc, &[EAX, ECX]), vec![0x11, 0xC8]);
    assert_eq!(enc(Mnemonic::Sbb, &[EAX, ECX]), vec![0x19, 0xC8]);
    assert_eq!(enc(Mnemonic::Or, &[EAX, StackSlot(-8)]), vec![0x0B, 0x45, 0xF8]);
}

#[test]
fn x86_test() {
    assert_eq!(
        enc(Mnemonic::Test, &[EAX, Immediate(0x100)]),
        vec![0xA9, 0x00, 0x01, 0x00, 0x00]
    );
    assert_eq!(enc(Mnemonic::Test, &[ECX, ECX]), vec![0x85, 0xC9]);
    assert_eq!(
        enc(Mnemonic::Test, &[ECX, Immediate(1)]),
        vec![0xF7, 0xC1, 0x01, 0x00, 0x00, 0x00]
    );
}

#[test]
fn x86_imul() {
    assert_eq!(enc(Mnemonic::Imul, &[EAX, ECX]), vec![0x0F, 0xAF, 0xC1]);
    assert_eq!(enc(Mnemonic::Imul, &[EAX, ECX, Immediate(3)]), vec![0x6B, 0xC1, 0x03]);
    assert_eq!(
        enc(Mnemonic::Imul, &[EAX, ECX, Immediate(1000)]),
        vec![0x69, 0xC1, 0xE8, 0x03, 0x00, 0x00]
    );
}

#[test]
fn x86_unary() {
    assert_eq!(enc(Mnemonic::Neg, &[ECX]), vec![0xF7, 0xD9]);
    assert_eq!(enc(Mnemonic::Not, &[EAX]), vec![0xF7, 0xD0]);
    assert_eq!(enc(Mnemonic::Mul, &[ECX]), vec![0xF7, 0xE1]);
    assert_eq!(enc(Mnemonic::Div, &[ECX]), vec![0xF7, 0xF1]);
    assert_eq!(enc(Mnemonic::Idiv, &[StackSlot(-4)]), vec![0xF7, 0x7D, 0xFC]);
}

#[test]
fn x86_inc_dec_short() {
    assert_eq!(enc(Mnemonic::Inc, &[EAX]), vec![0x40]);
    assert_eq!(enc(Mnemonic::Dec, &[EBX]), vec![0x4B]);
    assert_eq!(enc(Mnemonic::Inc, &[StackSlot(-4)]), vec![0xFF, 0x45, 0xFC]);
}

#[test]
fn x86_shifts() {
    assert_eq!(enc(Mnemonic::Shl, &[EAX, Immediate(1)]), vec![0xD1, 0xE0]);
    assert_eq!(enc(Mnemonic::Shl, &[EAX, Immediate(4)]), vec![0xC1, 0xE0, 0x04]);
    assert_eq!(enc(Mnemonic::Shr, &[EDX, Immediate(3)]), vec![0xC1, 0xEA, 0x03]);
    assert_eq!(enc(Mnemonic::Sar, &[ECX]), vec![0xD3, 0xF9]);
    assert_eq!(enc(Mnemonic::Rol, &[EAX]), vec![0xD3, 0xC0]);
    assert_eq!(enc(Mnemonic::Ror, &[EAX]), vec![0xD3, 0xC8]);
}

#[test]
fn x86_xchg() {
    assert_eq!(enc(Mnemonic::Xchg, &[EAX, ECX]), vec![0x91]);
    assert_eq!(enc(Mnemonic::Xchg, &[ECX, EAX]), vec![0x91]);
    assert_eq!(enc(Mnemonic::Xchg, &[ECX, EDX]), vec![0x87, 0xD1]);
}

#[test]
fn x86_conditional() {
    assert_eq!(enc(Mnemonic::Cmov(Cond::E), &[EAX, ECX]), vec![0x0F, 0x44, 0xC1]);
    assert_eq!(
        enc(Mnemonic::Set(Cond::Ne), &[r(Register::AL)]),
        vec![0x0F, 0x95, 0xC0]
    );
    assert_eq!(
        enc(Mnemonic::Set(Cond::L), &[StackSlot(-1)]),
        vec![0x0F, 0x9C, 0x45, 0xFF]
    );
}

#[test]
fn x86_indirect_branches() {
    assert_eq!(enc(Mnemonic::Jmp, &[EAX]), vec![0xFF, 0xE0]);
    assert_eq!(enc(Mnemonic::Call, &[ECX]), vec![0xFF, 0xD1]);
    assert_eq!(enc(Mnemonic::Call, &[StackSlot(-4)]), vec![0xFF, 0x55, 0xFC]);
}

// --- SSE2 ---

#[test]
fn x86_sse() {
    let x0 = r(Register::XMM0);
    let x1 = r(Register::XMM1);
    assert_eq!(
        enc(Mnemonic::Movsd, &[x0, StackSlot(-8)]),
        vec![0xF2, 0x0F, 0x10, 0x45, 0xF8]
    );
    assert_eq!(
        enc(Mnemonic::Movsd, &[StackSlot(-8), x1]),
        vec![0xF2, 0x0F, 0x11, 0x4D, 0xF8]
    );
    assert_eq!(enc(Mnemonic::Addsd, &[x0, x1]), vec![0xF2, 0x0F, 0x58, 0xC1]);
    assert_eq!(enc(Mnemonic::Ucomisd, &[x0, x1]), vec![0x66, 0x0F, 0x2E, 0xC1]);
    assert_eq!(enc(Mnemonic::Xorpd, &[x0, x0]), vec![0x66, 0x0F, 0x57, 0xC0]);
    assert_eq!(enc(Mnemonic::Cvtsi2sd, &[x0, EAX]), vec![0xF2, 0x0F, 0x2A, 0xC0]);
    assert_eq!(enc(Mnemonic::Cvttsd2si, &[EAX, x1]), vec![0xF2, 0x0F, 0x2C, 0xC1]);
    assert_eq!(
        enc(
            Mnemonic::Sqrtsd,
            &[r(Register::xmm(2)), r(Register::xmm(3))]
        ),
        vec![0xF2, 0x0F, 0x51, 0xD3]
    );
}

// --- Rejections ---

#[test]
fn x86_rejects_64_bit_registers() {
    let err = encode_one(Mode::X86, Mnemonic::Mov, &[r(Register::R8), EAX]).unwrap_err();
    assert!(matches!(err, EncodeError::InvalidOperands { .. }), "{err}");
    let err = encode_one(Mode::X86, Mnemonic::Mov, &[r(Register::RAX), EAX]).unwrap_err();
    assert!(matches!(err, EncodeError::InvalidOperands { .. }), "{err}");
    let err =
        encode_one(Mode::X86, Mnemonic::Mov8, &[r(Register::SIL), r(Register::AL)]).unwrap_err();
    assert!(matches!(err, EncodeError::InvalidOperands { .. }), "{err}");
}

#[test]
fn x86_rejects_esp_index() {
    let err = encode_one(
        Mode::X86,
        Mnemonic::Mov,
        &[EAX, Operand::array(Register::EAX, Register::ESP, 0, 0)],
    )
    .unwrap_err();
    assert!(matches!(err, EncodeError::InvalidOperands { .. }), "{err}");
}

#[test]
fn x86_rejects_unsupported_and_overflow() {
    let err = encode_one(Mode::X86, Mnemonic::Lea, &[EAX, ECX]).unwrap_err();
    assert!(matches!(err, EncodeError::UnsupportedForm { .. }), "{err}");

    let err = encode_one(Mode::X86, Mnemonic::Add, &[ECX, Immediate(1 << 33)]).unwrap_err();
    assert!(matches!(err, EncodeError::ImmediateOverflow { .. }), "{err}");

    let err = encode_one(Mode::X86, Mnemonic::Shl, &[ECX, Immediate(256)]).unwrap_err();
    assert!(matches!(err, EncodeError::ImmediateOverflow { .. }), "{err}");
}
