//! The closed instruction form table.
//!
//! Every supported `(Mnemonic, ModeTag)` pair maps to one [`Form`], a small
//! declarative description that [`crate::encoder`] interprets. The outer
//! `match` is exhaustive over [`Mnemonic`], so adding a mnemonic without
//! deciding its forms does not compile.

use crate::ir::{Cond, Mnemonic, ModeTag, RegClass};

/// Opcode bytes following any prefixes: one byte or `0F xx`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Opcode {
    bytes: [u8; 2],
    len: u8,
}

impl Opcode {
    pub(crate) const fn one(op: u8) -> Self {
        Self {
            bytes: [op, 0],
            len: 1,
        }
    }

    pub(crate) const fn two(escape: u8, op: u8) -> Self {
        Self {
            bytes: [escape, op],
            len: 2,
        }
    }

    pub(crate) fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }
}

/// Source of the ModR/M `reg` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RegField {
    /// Register operand at this position.
    Operand(usize),
    /// Opcode extension `/digit`.
    Digit(u8),
}

/// How the operand size and the legal register classes are determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Width {
    /// 16/32/64 from the general-purpose register operands, which must
    /// agree; the mode's word size when there are none.
    Gpr,
    /// 8-bit operation on byte registers.
    Byte,
    /// Word-size operation whose 64-bit form needs no REX.W (push, pop,
    /// indirect branches).
    Stack,
    /// Zero/sign extension: the destination sets the size, a register
    /// source must have the given class.
    Extend(RegClass),
    /// Scalar double on XMM registers.
    Sse,
    /// XMM destination, general-purpose or memory source (`cvtsi2sd`).
    SseFromGpr,
    /// General-purpose destination, XMM or memory source (`cvttsd2si`).
    GprFromSse,
}

/// Immediate following the ModR/M bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Imm {
    None,
    /// `ib` / `iw` / `id` by operand size; `id` sign-extended for 64-bit.
    Full,
    /// `short ib` when the value fits a sign-extended byte, `Full` otherwise.
    Sx8 { short: Opcode },
}

/// One instruction form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Form {
    /// Fixed bytes.
    Fixed(&'static [u8]),
    /// One opcode byte, REX.W in 64-bit mode (`cdq` becomes `cqo`).
    WordSized(u8),
    /// `opcode iw` with an unsigned 16-bit immediate.
    Imm16(u8),
    /// `[prefix] opcode ModR/M [SIB] [disp] [imm]`.
    ModRm {
        prefix: Option<u8>,
        opcode: Opcode,
        reg: RegField,
        rm: usize,
        width: Width,
        imm: Imm,
        /// Replaces `opcode ModR/M` when the r/m operand is the accumulator
        /// and a full-width immediate follows.
        acc_short: Option<u8>,
        /// Always encode a 32-bit displacement.
        disp32: bool,
    },
    /// `opcode+r` on a word-size register (push, pop).
    PlusReg(u8),
    /// `40+r` / `48+r` in 32-bit mode, `FF /digit` in 64-bit mode.
    IncDec { digit: u8 },
    /// `mov reg, imm` with the per-width opcode choice.
    MovImm { byte: bool },
    /// `mov eax, moffs32` / `mov moffs32, eax` in 32-bit mode, `opcode /r`
    /// through an absolute address otherwise.
    Moffs { short: u8, opcode: u8, reg: usize, rm: usize },
    /// Shift by constant: `D1 /digit` for 1, `C1 /digit ib` otherwise.
    ShiftImm { digit: u8 },
    /// `6A ib` / `68 id`.
    PushImm,
    /// `90+r` against the accumulator, `87 /r` otherwise.
    Xchg,
    /// Relative branch; `rel8` selects a one-byte displacement.
    Rel { opcode: Opcode, rel8: bool },
}

// ─── Form builders ──────────────────────────────────────────

const fn modrm(opcode: Opcode, reg: RegField, rm: usize, width: Width) -> Form {
    Form::ModRm {
        prefix: None,
        opcode,
        reg,
        rm,
        width,
        imm: Imm::None,
        acc_short: None,
        disp32: false,
    }
}

/// `opcode /r` with the register in operand 0 and r/m in operand 1.
const fn load(op: u8, width: Width) -> Form {
    modrm(Opcode::one(op), RegField::Operand(0), 1, width)
}

/// `opcode /r` with r/m in operand 0 and the register in operand 1.
const fn store(op: u8, width: Width) -> Form {
    modrm(Opcode::one(op), RegField::Operand(1), 0, width)
}

const fn load_0f(op: u8, width: Width) -> Form {
    modrm(Opcode::two(0x0F, op), RegField::Operand(0), 1, width)
}

/// `opcode /digit` on operand 0.
const fn digit(op: u8, d: u8, width: Width) -> Form {
    modrm(Opcode::one(op), RegField::Digit(d), 0, width)
}

const fn with_imm(form: Form, imm_kind: Imm, short: Option<u8>) -> Form {
    match form {
        Form::ModRm {
            prefix,
            opcode,
            reg,
            rm,
            width,
            disp32,
            ..
        } => Form::ModRm {
            prefix,
            opcode,
            reg,
            rm,
            width,
            imm: imm_kind,
            acc_short: short,
            disp32,
        },
        other => other,
    }
}

const fn sse(prefix: u8, op: u8, reg: usize, rm: usize, width: Width) -> Form {
    Form::ModRm {
        prefix: Some(prefix),
        opcode: Opcode::two(0x0F, op),
        reg: RegField::Operand(reg),
        rm,
        width,
        imm: Imm::None,
        acc_short: None,
        disp32: false,
    }
}

/// Group-1 arithmetic (`add or adc sbb and sub xor cmp`) with extension `n`.
fn alu(n: u8, tag: ModeTag) -> Option<Form> {
    use ModeTag::*;
    let form = match tag {
        RR | BR | SR | MR | AR | JR => store(n * 8 + 1, Width::Gpr),
        RB | RS | RM | RA | RJ => load(n * 8 + 3, Width::Gpr),
        RI | BI | SI | MI | AI | JI => with_imm(
            digit(0x81, n, Width::Gpr),
            Imm::Sx8 {
                short: Opcode::one(0x83),
            },
            Some(n * 8 + 5),
        ),
        _ => return Option::None,
    };
    Some(form)
}

/// Forms of the `F7 /digit` unary group.
fn unary(d: u8, tag: ModeTag) -> Option<Form> {
    use ModeTag::*;
    match tag {
        R | B | S | M | A => Some(digit(0xF7, d, Width::Gpr)),
        _ => Option::None,
    }
}

fn shift(d: u8, tag: ModeTag) -> Option<Form> {
    match tag {
        ModeTag::RI => Some(Form::ShiftImm { digit: d }),
        ModeTag::R => Some(digit(0xD3, d, Width::Gpr)),
        _ => None,
    }
}

fn extend(op: u8, src: RegClass, tag: ModeTag) -> Option<Form> {
    use ModeTag::*;
    match tag {
        RR | RB | RS | RM | RA => Some(load_0f(op, Width::Extend(src))),
        _ => Option::None,
    }
}

fn sse_load(prefix: u8, op: u8, width: Width, tag: ModeTag) -> Option<Form> {
    use ModeTag::*;
    match tag {
        RR | RB | RS | RM | RA => Some(sse(prefix, op, 0, 1, width)),
        _ => Option::None,
    }
}

fn branch(rel32: Opcode, ind: u8, tag: ModeTag) -> Option<Form> {
    use ModeTag::*;
    match tag {
        L => Some(Form::Rel {
            opcode: rel32,
            rel8: false,
        }),
        R | B | S | M | A => Some(digit(0xFF, ind, Width::Stack)),
        _ => Option::None,
    }
}

fn label_only(opcode: Opcode, rel8: bool, tag: ModeTag) -> Option<Form> {
    match tag {
        ModeTag::L => Some(Form::Rel { opcode, rel8 }),
        _ => None,
    }
}

fn cond_rm(cc: Cond, base: u8) -> Opcode {
    Opcode::two(0x0F, base + cc.code())
}

/// Look up the form for `mnemonic` with operand kinds `tag`.
pub(crate) fn lookup(mnemonic: Mnemonic, tag: ModeTag) -> Option<Form> {
    use ModeTag::*;
    match mnemonic {
        Mnemonic::Nop => matches!(tag, None).then_some(Form::Fixed(&[0x90])),
        Mnemonic::Int3 => matches!(tag, None).then_some(Form::Fixed(&[0xCC])),
        Mnemonic::Cdq => matches!(tag, None).then_some(Form::WordSized(0x99)),
        Mnemonic::Ret => match tag {
            None => Some(Form::Fixed(&[0xC3])),
            I => Some(Form::Imm16(0xC2)),
            _ => Option::None,
        },
        Mnemonic::Mov => match tag {
            RR | BR | SR | MR | AR => Some(store(0x89, Width::Gpr)),
            RB | RS | RM | RA => Some(load(0x8B, Width::Gpr)),
            RJ => Some(Form::Moffs {
                short: 0xA1,
                opcode: 0x8B,
                reg: 0,
                rm: 1,
            }),
            JR => Some(Form::Moffs {
                short: 0xA3,
                opcode: 0x89,
                reg: 1,
                rm: 0,
            }),
            RI => Some(Form::MovImm { byte: false }),
            BI | SI | MI | AI | JI => Some(with_imm(
                digit(0xC7, 0, Width::Gpr),
                Imm::Full,
                Option::None,
            )),
            _ => Option::None,
        },
        Mnemonic::Mov8 => match tag {
            RR | BR | SR | MR | AR => Some(store(0x88, Width::Byte)),
            RB | RS | RM | RA => Some(load(0x8A, Width::Byte)),
            RI => Some(Form::MovImm { byte: true }),
            BI | SI | MI | AI => Some(with_imm(
                digit(0xC6, 0, Width::Byte),
                Imm::Full,
                Option::None,
            )),
            _ => Option::None,
        },
        Mnemonic::Movzx8 => extend(0xB6, RegClass::Byte, tag),
        Mnemonic::Movsx8 => extend(0xBE, RegClass::Byte, tag),
        Mnemonic::Movzx16 => extend(0xB7, RegClass::Word, tag),
        Mnemonic::Movsx16 => extend(0xBF, RegClass::Word, tag),
        Mnemonic::Lea => match tag {
            RB | RS | RM | RA | RJ => Some(load(0x8D, Width::Gpr)),
            _ => Option::None,
        },
        Mnemonic::Lea32 => match tag {
            RB | RS | RM => Some(match load(0x8D, Width::Gpr) {
                Form::ModRm {
                    prefix,
                    opcode,
                    reg,
                    rm,
                    width,
                    imm,
                    acc_short,
                    ..
                } => Form::ModRm {
                    prefix,
                    opcode,
                    reg,
                    rm,
                    width,
                    imm,
                    acc_short,
                    disp32: true,
                },
                other => other,
            }),
            _ => Option::None,
        },
        Mnemonic::Add => alu(0, tag),
        Mnemonic::Or => alu(1, tag),
        Mnemonic::Adc => alu(2, tag),
        Mnemonic::Sbb => alu(3, tag),
        Mnemonic::And => alu(4, tag),
        Mnemonic::Sub => alu(5, tag),
        Mnemonic::Xor => alu(6, tag),
        Mnemonic::Cmp => alu(7, tag),
        Mnemonic::Test => match tag {
            RR | BR | MR => Some(store(0x85, Width::Gpr)),
            RI | BI | SI | MI | AI => Some(with_imm(
                digit(0xF7, 0, Width::Gpr),
                Imm::Full,
                Some(0xA9),
            )),
            _ => Option::None,
        },
        Mnemonic::Imul => match tag {
            RR | RB | RS | RM | RA => Some(load_0f(0xAF, Width::Gpr)),
            RRI => Some(with_imm(
                load(0x69, Width::Gpr),
                Imm::Sx8 {
                    short: Opcode::one(0x6B),
                },
                Option::None,
            )),
            _ => Option::None,
        },
        Mnemonic::Not => unary(2, tag),
        Mnemonic::Neg => unary(3, tag),
        Mnemonic::Mul => unary(4, tag),
        Mnemonic::Div => unary(6, tag),
        Mnemonic::Idiv => unary(7, tag),
        Mnemonic::Inc | Mnemonic::Dec => {
            let d = u8::from(mnemonic == Mnemonic::Dec);
            match tag {
                R => Some(Form::IncDec { digit: d }),
                B | S | M | A => Some(digit(0xFF, d, Width::Gpr)),
                _ => Option::None,
            }
        }
        Mnemonic::Rol => shift(0, tag),
        Mnemonic::Ror => shift(1, tag),
        Mnemonic::Shl => shift(4, tag),
        Mnemonic::Shr => shift(5, tag),
        Mnemonic::Sar => shift(7, tag),
        Mnemonic::Push => match tag {
            R => Some(Form::PlusReg(0x50)),
            B | S | M | A => Some(digit(0xFF, 6, Width::Stack)),
            I => Some(Form::PushImm),
            _ => Option::None,
        },
        Mnemonic::Pop => match tag {
            R => Some(Form::PlusReg(0x58)),
            B | S | M | A => Some(digit(0x8F, 0, Width::Stack)),
            _ => Option::None,
        },
        Mnemonic::Xchg => match tag {
            RR => Some(Form::Xchg),
            RB | RS | RM | RA => Some(load(0x87, Width::Gpr)),
            _ => Option::None,
        },
        Mnemonic::Cmov(cc) => match tag {
            RR | RB | RS | RM | RA => Some(modrm(
                cond_rm(cc, 0x40),
                RegField::Operand(0),
                1,
                Width::Gpr,
            )),
            _ => Option::None,
        },
        Mnemonic::Set(cc) => match tag {
            R | B | S | M | A => Some(modrm(
                cond_rm(cc, 0x90),
                RegField::Digit(0),
                0,
                Width::Byte,
            )),
            _ => Option::None,
        },
        Mnemonic::Jmp => branch(Opcode::one(0xE9), 4, tag),
        Mnemonic::Call => branch(Opcode::one(0xE8), 2, tag),
        Mnemonic::J(cc) => label_only(cond_rm(cc, 0x80), false, tag),
        Mnemonic::JmpShort => label_only(Opcode::one(0xEB), true, tag),
        Mnemonic::JShort(cc) => label_only(Opcode::one(0x70 + cc.code()), true, tag),
        Mnemonic::Movsd => match tag {
            RR | RB | RS | RM | RA => Some(sse(0xF2, 0x10, 0, 1, Width::Sse)),
            BR | SR | MR | AR => Some(sse(0xF2, 0x11, 1, 0, Width::Sse)),
            _ => Option::None,
        },
        Mnemonic::Addsd => sse_load(0xF2, 0x58, Width::Sse, tag),
        Mnemonic::Subsd => sse_load(0xF2, 0x5C, Width::Sse, tag),
        Mnemonic::Mulsd => sse_load(0xF2, 0x59, Width::Sse, tag),
        Mnemonic::Divsd => sse_load(0xF2, 0x5E, Width::Sse, tag),
        Mnemonic::Sqrtsd => sse_load(0xF2, 0x51, Width::Sse, tag),
        Mnemonic::Ucomisd => sse_load(0x66, 0x2E, Width::Sse, tag),
        Mnemonic::Xorpd => sse_load(0x66, 0x57, Width::Sse, tag),
        Mnemonic::Andpd => sse_load(0x66, 0x54, Width::Sse, tag),
        Mnemonic::Cvtsi2sd => sse_load(0xF2, 0x2A, Width::SseFromGpr, tag),
        Mnemonic::Cvttsd2si => sse_load(0xF2, 0x2C, Width::GprFromSse, tag),
    }
}

/// Mode tags for which `mnemonic` has a form, in [`ModeTag::ALL`] order.
pub fn supported_tags(mnemonic: Mnemonic) -> impl Iterator<Item = ModeTag> {
    ModeTag::ALL
        .iter()
        .copied()
        .filter(move |&tag| lookup(mnemonic, tag).is_some())
}

/// Whether the table has a form for `mnemonic` with operand kinds `tag`.
#[must_use]
pub fn is_supported(mnemonic: Mnemonic, tag: ModeTag) -> bool {
    lookup(mnemonic, tag).is_some()
}
