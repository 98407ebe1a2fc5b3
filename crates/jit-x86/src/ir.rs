//! Operand model: modes, registers, operands, mnemonics, and mode tags.
//!
//! These types are pure data. They are constructed transiently by the JIT
//! back end for one emission call and consumed by the [`crate::Encoder`].

use core::fmt;

/// Target execution mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Mode {
    /// 32-bit x86 protected mode.
    X86,
    /// 64-bit x86 long mode.
    X86_64,
}

impl Mode {
    /// Machine word size in bytes (4 or 8).
    #[must_use]
    pub const fn word_bytes(self) -> u8 {
        match self {
            Mode::X86 => 4,
            Mode::X86_64 => 8,
        }
    }

    /// Machine word size in bits (32 or 64).
    #[must_use]
    pub const fn word_bits(self) -> u16 {
        self.word_bytes() as u16 * 8
    }

    /// Number of general-purpose / vector register ids available.
    #[must_use]
    pub const fn register_count(self) -> u8 {
        match self {
            Mode::X86 => 8,
            Mode::X86_64 => 16,
        }
    }

    /// The frame-base register (EBP / RBP).
    #[must_use]
    pub const fn frame_base(self) -> Register {
        match self {
            Mode::X86 => Register::EBP,
            Mode::X86_64 => Register::RBP,
        }
    }

    /// The stack-pointer register (ESP / RSP).
    #[must_use]
    pub const fn stack_pointer(self) -> Register {
        match self {
            Mode::X86 => Register::ESP,
            Mode::X86_64 => Register::RSP,
        }
    }

    /// The general-purpose register class matching the word size.
    #[must_use]
    pub const fn word_class(self) -> RegClass {
        match self {
            Mode::X86 => RegClass::Dword,
            Mode::X86_64 => RegClass::Qword,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::X86 => write!(f, "x86"),
            Mode::X86_64 => write!(f, "x86_64"),
        }
    }
}

// ─── Registers ──────────────────────────────────────────────

/// Width class of a register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RegClass {
    /// 8-bit low byte (AL, CL, …, SPL, BPL, SIL, DIL, R8B–R15B).
    Byte,
    /// 16-bit general purpose.
    Word,
    /// 32-bit general purpose.
    Dword,
    /// 64-bit general purpose.
    Qword,
    /// 128-bit SSE register.
    Xmm,
}

impl RegClass {
    /// Width of a general-purpose class in bits, 128 for XMM.
    #[must_use]
    pub const fn bits(self) -> u16 {
        match self {
            RegClass::Byte => 8,
            RegClass::Word => 16,
            RegClass::Dword => 32,
            RegClass::Qword => 64,
            RegClass::Xmm => 128,
        }
    }
}

/// A machine register: a dense id (0..15) plus a width class.
///
/// The id is the architectural register number and can index tables
/// directly. Within one mode no two distinct registers of the same class
/// share an id; the legacy high-byte registers (AH, CH, DH, BH) are not
/// representable, so byte ids 4..7 always mean SPL/BPL/SIL/DIL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Register {
    id: u8,
    class: RegClass,
}

const QWORD_NAMES: [&str; 16] = [
    "rax", "rcx", "rdx", "rbx", "rsp", "rbp", "rsi", "rdi", "r8", "r9", "r10", "r11", "r12",
    "r13", "r14", "r15",
];
const DWORD_NAMES: [&str; 16] = [
    "eax", "ecx", "edx", "ebx", "esp", "ebp", "esi", "edi", "r8d", "r9d", "r10d", "r11d",
    "r12d", "r13d", "r14d", "r15d",
];
const WORD_NAMES: [&str; 16] = [
    "ax", "cx", "dx", "bx", "sp", "bp", "si", "di", "r8w", "r9w", "r10w", "r11w", "r12w",
    "r13w", "r14w", "r15w",
];
const BYTE_NAMES: [&str; 16] = [
    "al", "cl", "dl", "bl", "spl", "bpl", "sil", "dil", "r8b", "r9b", "r10b", "r11b", "r12b",
    "r13b", "r14b", "r15b",
];
const XMM_NAMES: [&str; 16] = [
    "xmm0", "xmm1", "xmm2", "xmm3", "xmm4", "xmm5", "xmm6", "xmm7", "xmm8", "xmm9", "xmm10",
    "xmm11", "xmm12", "xmm13", "xmm14", "xmm15",
];

impl Register {
    /// Create a register from its id and class.
    ///
    /// # Panics
    ///
    /// Panics if `id` is 16 or larger.
    #[must_use]
    pub const fn new(id: u8, class: RegClass) -> Self {
        assert!(id < 16, "register id out of range (0..15)");
        Self { id, class }
    }

    /// 64-bit general-purpose register `id`.
    #[must_use]
    pub const fn qword(id: u8) -> Self {
        Self::new(id, RegClass::Qword)
    }

    /// 32-bit general-purpose register `id`.
    #[must_use]
    pub const fn dword(id: u8) -> Self {
        Self::new(id, RegClass::Dword)
    }

    /// 16-bit general-purpose register `id`.
    #[must_use]
    pub const fn word(id: u8) -> Self {
        Self::new(id, RegClass::Word)
    }

    /// 8-bit general-purpose register `id`.
    #[must_use]
    pub const fn byte(id: u8) -> Self {
        Self::new(id, RegClass::Byte)
    }

    /// SSE register `id`.
    #[must_use]
    pub const fn xmm(id: u8) -> Self {
        Self::new(id, RegClass::Xmm)
    }

    /// General-purpose register `id` of the mode's word size.
    #[must_use]
    pub const fn gpr(mode: Mode, id: u8) -> Self {
        Self::new(id, mode.word_class())
    }

    /// The dense register id (0..15).
    #[must_use]
    pub const fn id(self) -> u8 {
        self.id
    }

    /// The width class.
    #[must_use]
    pub const fn class(self) -> RegClass {
        self.class
    }

    /// The low three bits that go into a ModR/M or SIB field.
    #[must_use]
    pub const fn base_code(self) -> u8 {
        self.id & 7
    }

    /// Whether the id needs a REX extension bit (R8–R15, XMM8–XMM15).
    #[must_use]
    pub const fn is_extended(self) -> bool {
        self.id >= 8
    }

    /// Register width in bits.
    #[must_use]
    pub const fn size_bits(self) -> u16 {
        self.class.bits()
    }

    /// Whether this is a general-purpose register.
    #[must_use]
    pub const fn is_gpr(self) -> bool {
        !matches!(self.class, RegClass::Xmm)
    }

    /// Whether this is an SSE register.
    #[must_use]
    pub const fn is_xmm(self) -> bool {
        matches!(self.class, RegClass::Xmm)
    }

    /// SPL/BPL/SIL/DIL are only addressable with a REX prefix.
    #[must_use]
    pub const fn requires_rex_for_byte(self) -> bool {
        matches!(self.class, RegClass::Byte) && self.id >= 4 && self.id < 8
    }

    /// Whether this register is the accumulator (AL/AX/EAX/RAX).
    #[must_use]
    pub const fn is_accumulator(self) -> bool {
        self.id == 0 && self.is_gpr()
    }

    /// Lower-case architectural name, e.g. `"r13d"`.
    #[must_use]
    pub fn name(self) -> &'static str {
        let table = match self.class {
            RegClass::Byte => &BYTE_NAMES,
            RegClass::Word => &WORD_NAMES,
            RegClass::Dword => &DWORD_NAMES,
            RegClass::Qword => &QWORD_NAMES,
            RegClass::Xmm => &XMM_NAMES,
        };
        table[self.id as usize]
    }

    pub const EAX: Register = Register::dword(0);
    pub const ECX: Register = Register::dword(1);
    pub const EDX: Register = Register::dword(2);
    pub const EBX: Register = Register::dword(3);
    pub const ESP: Register = Register::dword(4);
    pub const EBP: Register = Register::dword(5);
    pub const ESI: Register = Register::dword(6);
    pub const EDI: Register = Register::dword(7);

    pub const RAX: Register = Register::qword(0);
    pub const RCX: Register = Register::qword(1);
    pub const RDX: Register = Register::qword(2);
    pub const RBX: Register = Register::qword(3);
    pub const RSP: Register = Register::qword(4);
    pub const RBP: Register = Register::qword(5);
    pub const RSI: Register = Register::qword(6);
    pub const RDI: Register = Register::qword(7);
    pub const R8: Register = Register::qword(8);
    pub const R9: Register = Register::qword(9);
    pub const R10: Register = Register::qword(10);
    pub const R11: Register = Register::qword(11);
    pub const R12: Register = Register::qword(12);
    pub const R13: Register = Register::qword(13);
    pub const R14: Register = Register::qword(14);
    pub const R15: Register = Register::qword(15);

    pub const AX: Register = Register::word(0);
    pub const CX: Register = Register::word(1);

    pub const AL: Register = Register::byte(0);
    pub const CL: Register = Register::byte(1);
    pub const DL: Register = Register::byte(2);
    pub const BL: Register = Register::byte(3);
    pub const SIL: Register = Register::byte(6);
    pub const DIL: Register = Register::byte(7);

    pub const XMM0: Register = Register::xmm(0);
    pub const XMM1: Register = Register::xmm(1);
    pub const XMM7: Register = Register::xmm(7);
    pub const XMM8: Register = Register::xmm(8);
    pub const XMM15: Register = Register::xmm(15);
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ─── Labels ─────────────────────────────────────────────────

/// A deferred branch target, created by [`crate::CodeBuffer::new_label`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Label(u32);

impl Label {
    /// Construct a label from its raw index.
    #[must_use]
    pub const fn from_index(index: u32) -> Self {
        Self(index)
    }

    /// The raw index within the owning buffer's label table.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

// ─── Operands ───────────────────────────────────────────────

/// An instruction operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Operand {
    /// A register.
    Register(Register),
    /// Memory at `[frame_base + offset]`.
    StackSlot(i32),
    /// Memory at `[stack_pointer + offset]`.
    StackArg(i32),
    /// Memory at `[base + disp]`.
    Memory {
        /// Base register.
        base: Register,
        /// Signed displacement.
        disp: i32,
    },
    /// Memory at `[base + index << scale_shift + disp]`.
    ScaledIndex {
        /// Base register.
        base: Register,
        /// Index register; never the stack pointer.
        index: Register,
        /// 0..=3, meaning ×1, ×2, ×4, ×8.
        scale_shift: u8,
        /// Signed displacement.
        disp: i32,
    },
    /// An immediate integer.
    Immediate(i64),
    /// Absolute address used as displacement-only memory.
    ImmediateAddress(i64),
    /// Relative branch target.
    RelativeLabel(Label),
}

impl Operand {
    /// `[base + disp]`.
    #[must_use]
    pub const fn mem(base: Register, disp: i32) -> Self {
        Operand::Memory { base, disp }
    }

    /// `[base + index << scale_shift + disp]`.
    #[must_use]
    pub const fn array(base: Register, index: Register, scale_shift: u8, disp: i32) -> Self {
        Operand::ScaledIndex {
            base,
            index,
            scale_shift,
            disp,
        }
    }

    /// The one-letter kind of this operand.
    #[must_use]
    pub const fn kind(&self) -> OperandKind {
        match self {
            Operand::Register(_) => OperandKind::Reg,
            Operand::StackSlot(_) => OperandKind::StackSlot,
            Operand::StackArg(_) => OperandKind::StackArg,
            Operand::Memory { .. } => OperandKind::Memory,
            Operand::ScaledIndex { .. } => OperandKind::ScaledIndex,
            Operand::Immediate(_) => OperandKind::Imm,
            Operand::ImmediateAddress(_) => OperandKind::ImmAddr,
            Operand::RelativeLabel(_) => OperandKind::Label,
        }
    }
}

impl From<Register> for Operand {
    fn from(reg: Register) -> Self {
        Operand::Register(reg)
    }
}

impl From<Label> for Operand {
    fn from(label: Label) -> Self {
        Operand::RelativeLabel(label)
    }
}

/// The addressing-mode kind of one operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OperandKind {
    /// `r`
    Reg,
    /// `b`
    StackSlot,
    /// `s`
    StackArg,
    /// `m`
    Memory,
    /// `a`
    ScaledIndex,
    /// `i`
    Imm,
    /// `j`
    ImmAddr,
    /// `l`
    Label,
}

impl OperandKind {
    /// Single-letter code used in mode tags.
    #[must_use]
    pub const fn letter(self) -> char {
        match self {
            OperandKind::Reg => 'r',
            OperandKind::StackSlot => 'b',
            OperandKind::StackArg => 's',
            OperandKind::Memory => 'm',
            OperandKind::ScaledIndex => 'a',
            OperandKind::Imm => 'i',
            OperandKind::ImmAddr => 'j',
            OperandKind::Label => 'l',
        }
    }

    /// Whether the operand addresses memory through ModR/M.
    #[must_use]
    pub const fn is_memory(self) -> bool {
        matches!(
            self,
            OperandKind::StackSlot
                | OperandKind::StackArg
                | OperandKind::Memory
                | OperandKind::ScaledIndex
                | OperandKind::ImmAddr
        )
    }
}

macro_rules! mode_tags {
    ($( $(#[$doc:meta])* $name:ident = $letters:literal [$($kind:ident),*] ),* $(,)?) => {
        /// Closed set of operand-kind sequences an instruction form can take.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        #[allow(clippy::upper_case_acronyms)]
        pub enum ModeTag {
            $( $(#[$doc])* $name, )*
        }

        impl ModeTag {
            /// Every mode tag.
            pub const ALL: &'static [ModeTag] = &[$(ModeTag::$name),*];

            /// The operand kinds, in operand order.
            #[must_use]
            pub const fn kinds(self) -> &'static [OperandKind] {
                match self {
                    $( ModeTag::$name => &[$(OperandKind::$kind),*], )*
                }
            }

            /// The letter string, e.g. `"rb"`; empty for no operands.
            #[must_use]
            pub const fn letters(self) -> &'static str {
                match self {
                    $( ModeTag::$name => $letters, )*
                }
            }
        }
    };
}

mode_tags! {
    /// No operands.
    None = "" [],
    R = "r" [Reg],
    B = "b" [StackSlot],
    S = "s" [StackArg],
    M = "m" [Memory],
    A = "a" [ScaledIndex],
    I = "i" [Imm],
    J = "j" [ImmAddr],
    L = "l" [Label],
    RR = "rr" [Reg, Reg],
    RB = "rb" [Reg, StackSlot],
    RS = "rs" [Reg, StackArg],
    RM = "rm" [Reg, Memory],
    RA = "ra" [Reg, ScaledIndex],
    RJ = "rj" [Reg, ImmAddr],
    RI = "ri" [Reg, Imm],
    BR = "br" [StackSlot, Reg],
    SR = "sr" [StackArg, Reg],
    MR = "mr" [Memory, Reg],
    AR = "ar" [ScaledIndex, Reg],
    JR = "jr" [ImmAddr, Reg],
    BI = "bi" [StackSlot, Imm],
    SI = "si" [StackArg, Imm],
    MI = "mi" [Memory, Imm],
    AI = "ai" [ScaledIndex, Imm],
    JI = "ji" [ImmAddr, Imm],
    RRI = "rri" [Reg, Reg, Imm],
}

impl ModeTag {
    /// Infer the tag from a list of operand kinds.
    #[must_use]
    pub fn from_kinds(kinds: &[OperandKind]) -> Option<ModeTag> {
        ModeTag::ALL.iter().copied().find(|t| t.kinds() == kinds)
    }

    /// Infer the tag from concrete operands.
    #[must_use]
    pub fn of(ops: &[Operand]) -> Option<ModeTag> {
        let mut kinds = [OperandKind::Reg; 3];
        if ops.len() > kinds.len() {
            return None;
        }
        for (slot, op) in kinds.iter_mut().zip(ops) {
            *slot = op.kind();
        }
        Self::from_kinds(&kinds[..ops.len()])
    }

    /// Whether `ops` has exactly this tag's kinds.
    #[must_use]
    pub fn matches(self, ops: &[Operand]) -> bool {
        let kinds = self.kinds();
        kinds.len() == ops.len() && kinds.iter().zip(ops).all(|(k, op)| *k == op.kind())
    }
}

impl fmt::Display for ModeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.letters())
    }
}

// ─── Mnemonics ──────────────────────────────────────────────

/// Condition code, numbered as in the `Jcc` / `SETcc` / `CMOVcc` opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Cond {
    O = 0,
    No = 1,
    B = 2,
    Ae = 3,
    E = 4,
    Ne = 5,
    Be = 6,
    A = 7,
    S = 8,
    Ns = 9,
    P = 10,
    Np = 11,
    L = 12,
    Ge = 13,
    Le = 14,
    G = 15,
}

impl Cond {
    /// All sixteen condition codes in opcode order.
    pub const ALL: [Cond; 16] = [
        Cond::O,
        Cond::No,
        Cond::B,
        Cond::Ae,
        Cond::E,
        Cond::Ne,
        Cond::Be,
        Cond::A,
        Cond::S,
        Cond::Ns,
        Cond::P,
        Cond::Np,
        Cond::L,
        Cond::Ge,
        Cond::Le,
        Cond::G,
    ];

    /// The 4-bit condition field.
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// The logical negation (flips the low bit).
    #[must_use]
    pub const fn negate(self) -> Cond {
        Cond::ALL[(self.code() ^ 1) as usize]
    }

    /// Assembler suffix, e.g. `"ne"`.
    #[must_use]
    pub const fn suffix(self) -> &'static str {
        match self {
            Cond::O => "o",
            Cond::No => "no",
            Cond::B => "b",
            Cond::Ae => "ae",
            Cond::E => "e",
            Cond::Ne => "ne",
            Cond::Be => "be",
            Cond::A => "a",
            Cond::S => "s",
            Cond::Ns => "ns",
            Cond::P => "p",
            Cond::Np => "np",
            Cond::L => "l",
            Cond::Ge => "ge",
            Cond::Le => "le",
            Cond::G => "g",
        }
    }
}

/// Instruction mnemonic.
///
/// `Mov8`/`Movzx8`/… name the byte and half-word variants explicitly; every
/// other general-purpose mnemonic takes its operand size from its register
/// operands, or from the mode's word size when it has none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Mnemonic {
    Nop,
    Ret,
    Int3,
    /// Sign-extend the accumulator into EDX / RDX (CDQ / CQO).
    Cdq,
    Mov,
    Mov8,
    Movzx8,
    Movsx8,
    Movzx16,
    Movsx16,
    Lea,
    /// LEA with the displacement always encoded in 32 bits, so the
    /// instruction length does not depend on the offset value.
    Lea32,
    Add,
    Or,
    Adc,
    Sbb,
    And,
    Sub,
    Xor,
    Cmp,
    Test,
    Imul,
    Neg,
    Not,
    Mul,
    Div,
    Idiv,
    Inc,
    Dec,
    Shl,
    Shr,
    Sar,
    Rol,
    Ror,
    Push,
    Pop,
    Xchg,
    Cmov(Cond),
    Set(Cond),
    Jmp,
    Call,
    J(Cond),
    /// `jmp rel8`.
    JmpShort,
    /// `jcc rel8`.
    JShort(Cond),
    Movsd,
    Addsd,
    Subsd,
    Mulsd,
    Divsd,
    Sqrtsd,
    Ucomisd,
    Xorpd,
    Andpd,
    Cvtsi2sd,
    Cvttsd2si,
}

const PLAIN_MNEMONICS: [Mnemonic; 51] = [
    Mnemonic::Nop,
    Mnemonic::Ret,
    Mnemonic::Int3,
    Mnemonic::Cdq,
    Mnemonic::Mov,
    Mnemonic::Mov8,
    Mnemonic::Movzx8,
    Mnemonic::Movsx8,
    Mnemonic::Movzx16,
    Mnemonic::Movsx16,
    Mnemonic::Lea,
    Mnemonic::Lea32,
    Mnemonic::Add,
    Mnemonic::Or,
    Mnemonic::Adc,
    Mnemonic::Sbb,
    Mnemonic::And,
    Mnemonic::Sub,
    Mnemonic::Xor,
    Mnemonic::Cmp,
    Mnemonic::Test,
    Mnemonic::Imul,
    Mnemonic::Neg,
    Mnemonic::Not,
    Mnemonic::Mul,
    Mnemonic::Div,
    Mnemonic::Idiv,
    Mnemonic::Inc,
    Mnemonic::Dec,
    Mnemonic::Shl,
    Mnemonic::Shr,
    Mnemonic::Sar,
    Mnemonic::Rol,
    Mnemonic::Ror,
    Mnemonic::Push,
    Mnemonic::Pop,
    Mnemonic::Xchg,
    Mnemonic::Jmp,
    Mnemonic::Call,
    Mnemonic::JmpShort,
    Mnemonic::Movsd,
    Mnemonic::Addsd,
    Mnemonic::Subsd,
    Mnemonic::Mulsd,
    Mnemonic::Divsd,
    Mnemonic::Sqrtsd,
    Mnemonic::Ucomisd,
    Mnemonic::Xorpd,
    Mnemonic::Andpd,
    Mnemonic::Cvtsi2sd,
    Mnemonic::Cvttsd2si,
];

impl Mnemonic {
    /// Every mnemonic, including one entry per condition code for the
    /// conditional families.
    pub fn all() -> impl Iterator<Item = Mnemonic> {
        PLAIN_MNEMONICS
            .into_iter()
            .chain(Cond::ALL.into_iter().map(Mnemonic::Cmov))
            .chain(Cond::ALL.into_iter().map(Mnemonic::Set))
            .chain(Cond::ALL.into_iter().map(Mnemonic::J))
            .chain(Cond::ALL.into_iter().map(Mnemonic::JShort))
    }

    /// Whether this mnemonic operates on SSE registers.
    #[must_use]
    pub const fn is_sse(self) -> bool {
        matches!(
            self,
            Mnemonic::Movsd
                | Mnemonic::Addsd
                | Mnemonic::Subsd
                | Mnemonic::Mulsd
                | Mnemonic::Divsd
                | Mnemonic::Sqrtsd
                | Mnemonic::Ucomisd
                | Mnemonic::Xorpd
                | Mnemonic::Andpd
                | Mnemonic::Cvtsi2sd
                | Mnemonic::Cvttsd2si
        )
    }

    /// Whether this mnemonic transfers control: a relative branch to a
    /// label, or for `Jmp` and `Call` also an indirect one.
    #[must_use]
    pub const fn is_relative_branch(self) -> bool {
        matches!(
            self,
            Mnemonic::Jmp | Mnemonic::Call | Mnemonic::J(_) | Mnemonic::JmpShort | Mnemonic::JShort(_)
        )
    }
}

impl fmt::Display for Mnemonic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Mnemonic::Cmov(cc) => return write!(f, "cmov{}", cc.suffix()),
            Mnemonic::Set(cc) => return write!(f, "set{}", cc.suffix()),
            Mnemonic::J(cc) => return write!(f, "j{}", cc.suffix()),
            Mnemonic::JShort(cc) => return write!(f, "j{}8", cc.suffix()),
            Mnemonic::Nop => "nop",
            Mnemonic::Ret => "ret",
            Mnemonic::Int3 => "int3",
            Mnemonic::Cdq => "cdq",
            Mnemonic::Mov => "mov",
            Mnemonic::Mov8 => "mov8",
            Mnemonic::Movzx8 => "movzx8",
            Mnemonic::Movsx8 => "movsx8",
            Mnemonic::Movzx16 => "movzx16",
            Mnemonic::Movsx16 => "movsx16",
            Mnemonic::Lea => "lea",
            Mnemonic::Lea32 => "lea32",
            Mnemonic::Add => "add",
            Mnemonic::Or => "or",
            Mnemonic::Adc => "adc",
            Mnemonic::Sbb => "sbb",
            Mnemonic::And => "and",
            Mnemonic::Sub => "sub",
            Mnemonic::Xor => "xor",
            Mnemonic::Cmp => "cmp",
            Mnemonic::Test => "test",
            Mnemonic::Imul => "imul",
            Mnemonic::Neg => "neg",
            Mnemonic::Not => "not",
            Mnemonic::Mul => "mul",
            Mnemonic::Div => "div",
            Mnemonic::Idiv => "idiv",
            Mnemonic::Inc => "inc",
            Mnemonic::Dec => "dec",
            Mnemonic::Shl => "shl",
            Mnemonic::Shr => "shr",
            Mnemonic::Sar => "sar",
            Mnemonic::Rol => "rol",
            Mnemonic::Ror => "ror",
            Mnemonic::Push => "push",
            Mnemonic::Pop => "pop",
            Mnemonic::Xchg => "xchg",
            Mnemonic::Jmp => "jmp",
            Mnemonic::Call => "call",
            Mnemonic::JmpShort => "jmp8",
            Mnemonic::Movsd => "movsd",
            Mnemonic::Addsd => "addsd",
            Mnemonic::Subsd => "subsd",
            Mnemonic::Mulsd => "mulsd",
            Mnemonic::Divsd => "divsd",
            Mnemonic::Sqrtsd => "sqrtsd",
            Mnemonic::Ucomisd => "ucomisd",
            Mnemonic::Xorpd => "xorpd",
            Mnemonic::Andpd => "andpd",
            Mnemonic::Cvtsi2sd => "cvtsi2sd",
            Mnemonic::Cvttsd2si => "cvttsd2si",
        };
        f.write_str(name)
    }
}
