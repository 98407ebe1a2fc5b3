//! x86 / x86-64 instruction encoder.
//!
//! Interprets the forms of [`crate::table`] for one instruction at a time,
//! building prefixes, REX, opcode, ModR/M, SIB, displacement and immediate
//! into a stack-allocated [`InstrBytes`]. Nothing reaches a buffer until the
//! whole instruction has been validated and built.

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use crate::buffer::{ByteSink, CodeBuffer};
use crate::error::EncodeError;
use crate::ir::{Label, Mnemonic, Mode, ModeTag, Operand, RegClass, Register};
use crate::table::{self, Form, Imm, Opcode, RegField, Width};

// ─── InstrBytes ─────────────────────────────────────────────

/// Room for the longest legal instruction (15 bytes) plus one spare.
const INSTR_CAPACITY: usize = 16;

/// The bytes of one instruction, built on the stack.
///
/// The encoder writes prefixes, opcode and operand fields here and only
/// hands the finished instruction to a [`ByteSink`].
#[derive(Clone, Copy, Default)]
pub struct InstrBytes {
    buf: [u8; INSTR_CAPACITY],
    used: u8,
}

impl InstrBytes {
    /// An instruction with no bytes yet.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            buf: [0; INSTR_CAPACITY],
            used: 0,
        }
    }

    /// Copy `src` into a fresh instruction.
    #[inline]
    #[must_use]
    pub fn from_slice(src: &[u8]) -> Self {
        let mut out = Self::new();
        out.extend_from_slice(src);
        out
    }

    /// Append one byte.
    ///
    /// # Panics
    ///
    /// When the instruction already holds 16 bytes; the form table never
    /// produces one that long.
    #[inline]
    pub fn push(&mut self, byte: u8) {
        self.extend_from_slice(&[byte]);
    }

    /// Append `bytes`.
    ///
    /// # Panics
    ///
    /// When the result would exceed 16 bytes.
    #[inline]
    pub fn extend_from_slice(&mut self, bytes: &[u8]) {
        let at = usize::from(self.used);
        let Some(dst) = self.buf.get_mut(at..at + bytes.len()) else {
            panic!("instruction longer than {INSTR_CAPACITY} bytes");
        };
        dst.copy_from_slice(bytes);
        self.used += bytes.len() as u8;
    }

    /// Length in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        usize::from(self.used)
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    #[inline]
    #[must_use]
    pub fn to_vec(&self) -> Vec<u8> {
        self[..].to_vec()
    }
}

impl core::ops::Deref for InstrBytes {
    type Target = [u8];
    #[inline]
    fn deref(&self) -> &[u8] {
        &self.buf[..usize::from(self.used)]
    }
}

impl core::ops::DerefMut for InstrBytes {
    #[inline]
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.buf[..usize::from(self.used)]
    }
}

impl AsRef<[u8]> for InstrBytes {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        self
    }
}

impl core::fmt::Debug for InstrBytes {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:02X?}", &self[..])
    }
}

impl PartialEq for InstrBytes {
    fn eq(&self, other: &Self) -> bool {
        self[..] == other[..]
    }
}

impl Eq for InstrBytes {}

impl PartialEq<[u8]> for InstrBytes {
    fn eq(&self, other: &[u8]) -> bool {
        &self[..] == other
    }
}

impl PartialEq<Vec<u8>> for InstrBytes {
    fn eq(&self, other: &Vec<u8>) -> bool {
        self[..] == other[..]
    }
}

// ─── EncodedInstr ──────────────────────────────────────────

/// Result of encoding a single instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodedInstr {
    /// The machine code bytes. A branch displacement is zero until the
    /// owning buffer fills it in.
    pub bytes: InstrBytes,
    /// Set when the instruction branches to a label.
    pub fixup: Option<BranchFixup>,
}

/// A relative branch displacement waiting for its label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BranchFixup {
    /// Offset of the displacement field within the instruction.
    pub offset: usize,
    /// Width of the displacement field in bytes (1 or 4).
    pub width: u8,
    /// Branch target.
    pub label: Label,
}

// ─── REX / ModR/M / SIB helpers ──────────────────────────────

/// Build a REX prefix byte.
#[inline]
#[must_use]
pub fn rex(w: bool, r: bool, x: bool, b: bool) -> u8 {
    let mut val: u8 = 0x40;
    if w {
        val |= 0x08;
    }
    if r {
        val |= 0x04;
    }
    if x {
        val |= 0x02;
    }
    if b {
        val |= 0x01;
    }
    val
}

/// Whether a REX prefix with at least one flag is needed.
#[inline]
fn needs_rex(w: bool, r: bool, x: bool, b: bool) -> bool {
    w || r || x || b
}

/// Build a ModR/M byte.
#[inline]
#[must_use]
pub fn modrm(mod_: u8, reg: u8, rm: u8) -> u8 {
    (mod_ << 6) | ((reg & 7) << 3) | (rm & 7)
}

/// Build a SIB byte from a scale shift (0..3).
#[inline]
#[must_use]
pub fn sib(scale_shift: u8, index: u8, base: u8) -> u8 {
    ((scale_shift & 3) << 6) | ((index & 7) << 3) | (base & 7)
}

/// Displacement encoding chosen for a base register and offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispWidth {
    /// `mod = 00`, no displacement bytes.
    None,
    /// `mod = 01`, one signed byte.
    Byte,
    /// `mod = 10`, four bytes.
    Dword,
}

impl DispWidth {
    /// The ModR/M `mod` field.
    #[must_use]
    pub const fn mod_bits(self) -> u8 {
        match self {
            DispWidth::None => 0b00,
            DispWidth::Byte => 0b01,
            DispWidth::Dword => 0b10,
        }
    }
}

/// Pick the shortest displacement for `[base + disp]`.
///
/// A base whose low three bits are `101` (EBP, RBP, R13) cannot use
/// `mod = 00`; it gets an explicit zero byte instead.
#[must_use]
pub fn disp_width(disp: i32, base: Register) -> DispWidth {
    if disp == 0 && base.base_code() != 0b101 {
        DispWidth::None
    } else if (-128..=127).contains(&disp) {
        DispWidth::Byte
    } else {
        DispWidth::Dword
    }
}

/// Emit an immediate of `bytes` width, little-endian.
fn emit_imm(buf: &mut InstrBytes, imm: i64, bytes: u8) {
    match bytes {
        1 => buf.push(imm as u8),
        2 => buf.extend_from_slice(&(imm as u16).to_le_bytes()),
        4 => buf.extend_from_slice(&(imm as u32).to_le_bytes()),
        _ => buf.extend_from_slice(&imm.to_le_bytes()),
    }
}

fn check_range(value: i64, min: i64, max: i64) -> Result<i64, EncodeError> {
    if (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(EncodeError::ImmediateOverflow { value, min, max })
    }
}

/// Validate an immediate for an operation of `bits` and fold it into the
/// signed range of that width, so `0xFFFF_FFFF` on a 32-bit operand is -1.
/// 64-bit operations take a sign-extended 32-bit immediate.
fn normalize_imm(value: i64, bits: u16) -> Result<i64, EncodeError> {
    match bits {
        8 => check_range(value, -0x80, 0xFF).map(|v| i64::from(v as i8)),
        16 => check_range(value, -0x8000, 0xFFFF).map(|v| i64::from(v as i16)),
        32 => check_range(value, -0x8000_0000, 0xFFFF_FFFF).map(|v| i64::from(v as i32)),
        _ => check_range(value, -0x8000_0000, 0x7FFF_FFFF),
    }
}

/// Immediate field width for a full-size immediate of an operation.
fn imm_bytes(bits: u16) -> u8 {
    match bits {
        8 => 1,
        16 => 2,
        _ => 4,
    }
}

fn fits_i8(value: i64) -> bool {
    (-128..=127).contains(&value)
}

fn invalid(mnemonic: Mnemonic, detail: impl Into<String>) -> EncodeError {
    EncodeError::InvalidOperands {
        mnemonic,
        detail: detail.into(),
    }
}

// ─── Addressing ─────────────────────────────────────────────

/// A resolved memory reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Address {
    Based {
        base: Register,
        index: Option<(Register, u8)>,
        disp: i32,
    },
    Absolute(i64),
}

impl Address {
    fn rex_x(self) -> bool {
        matches!(self, Address::Based { index: Some((idx, _)), .. } if idx.is_extended())
    }

    fn rex_b(self) -> bool {
        matches!(self, Address::Based { base, .. } if base.is_extended())
    }
}

/// The r/m operand of a ModR/M form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rm {
    Reg(Register),
    Mem(Address),
}

impl Rm {
    fn resolve(mode: Mode, op: &Operand) -> Option<Rm> {
        let rm = match *op {
            Operand::Register(reg) => Rm::Reg(reg),
            Operand::StackSlot(disp) => Rm::Mem(Address::Based {
                base: mode.frame_base(),
                index: None,
                disp,
            }),
            Operand::StackArg(disp) => Rm::Mem(Address::Based {
                base: mode.stack_pointer(),
                index: None,
                disp,
            }),
            Operand::Memory { base, disp } => Rm::Mem(Address::Based {
                base,
                index: None,
                disp,
            }),
            Operand::ScaledIndex {
                base,
                index,
                scale_shift,
                disp,
            } => Rm::Mem(Address::Based {
                base,
                index: Some((index, scale_shift)),
                disp,
            }),
            Operand::ImmediateAddress(addr) => Rm::Mem(Address::Absolute(addr)),
            Operand::Immediate(_) | Operand::RelativeLabel(_) => return None,
        };
        Some(rm)
    }

    fn reg(self) -> Option<Register> {
        match self {
            Rm::Reg(reg) => Some(reg),
            Rm::Mem(_) => None,
        }
    }

    fn rex_x(self) -> bool {
        match self {
            Rm::Reg(_) => false,
            Rm::Mem(addr) => addr.rex_x(),
        }
    }

    fn rex_b(self) -> bool {
        match self {
            Rm::Reg(reg) => reg.is_extended(),
            Rm::Mem(addr) => addr.rex_b(),
        }
    }

    fn forces_rex(self) -> bool {
        self.reg().is_some_and(Register::requires_rex_for_byte)
    }
}

/// Emit ModR/M, SIB and displacement for a memory operand.
fn emit_address(
    buf: &mut InstrBytes,
    mode: Mode,
    reg_field: u8,
    addr: Address,
    force_disp32: bool,
) -> Result<(), EncodeError> {
    match addr {
        Address::Absolute(value) => match mode {
            Mode::X86 => {
                let value = check_range(value, -0x8000_0000, 0xFFFF_FFFF)?;
                buf.push(modrm(0b00, reg_field, 0b101));
                buf.extend_from_slice(&(value as u32).to_le_bytes());
            }
            Mode::X86_64 => {
                // rm = 101 would be RIP-relative here; go through a SIB
                // with neither base nor index.
                let value = check_range(value, -0x8000_0000, 0x7FFF_FFFF)?;
                buf.push(modrm(0b00, reg_field, 0b100));
                buf.push(sib(0, 0b100, 0b101));
                buf.extend_from_slice(&(value as u32).to_le_bytes());
            }
        },
        Address::Based { base, index, disp } => {
            let width = if force_disp32 {
                DispWidth::Dword
            } else {
                disp_width(disp, base)
            };
            match index {
                Some((idx, shift)) => {
                    buf.push(modrm(width.mod_bits(), reg_field, 0b100));
                    buf.push(sib(shift, idx.base_code(), base.base_code()));
                }
                None if base.base_code() == 0b100 => {
                    buf.push(modrm(width.mod_bits(), reg_field, 0b100));
                    buf.push(sib(0, 0b100, base.base_code()));
                }
                None => buf.push(modrm(width.mod_bits(), reg_field, base.base_code())),
            }
            match width {
                DispWidth::None => {}
                DispWidth::Byte => buf.push(disp as i8 as u8),
                DispWidth::Dword => buf.extend_from_slice(&disp.to_le_bytes()),
            }
        }
    }
    Ok(())
}

/// Operand size of an instruction and whether it needs REX.W.
#[derive(Debug, Clone, Copy)]
struct Sizing {
    bits: u16,
    rex_w: bool,
}

// ─── Encoder ────────────────────────────────────────────────

/// Stateless instruction encoder for one execution mode.
///
/// # Examples
///
/// ```
/// use jit_x86::{CodeBuffer, Encoder, Mnemonic, Mode, ModeTag, Operand, Register};
///
/// let enc = Encoder::new(Mode::X86);
/// let mut buf = CodeBuffer::new();
/// enc.emit(&mut buf, Mnemonic::Mov, ModeTag::RB, &[Register::EDX.into(), Operand::StackSlot(-36)])?;
/// assert_eq!(buf.bytes(), &[0x8B, 0x55, 0xDC]);
/// # Ok::<(), jit_x86::EncodeError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Encoder {
    mode: Mode,
}

impl Encoder {
    /// Create an encoder for `mode`.
    #[must_use]
    pub const fn new(mode: Mode) -> Self {
        Self { mode }
    }

    /// The target mode.
    #[must_use]
    pub const fn mode(self) -> Mode {
        self.mode
    }

    /// Encode one instruction without touching any buffer.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError::InvalidOperands`] when `ops` does not match
    /// `tag` or breaks an architectural constraint,
    /// [`EncodeError::UnsupportedForm`] when the table has no such form, and
    /// [`EncodeError::ImmediateOverflow`] when an immediate does not fit.
    pub fn encode(
        self,
        mnemonic: Mnemonic,
        tag: ModeTag,
        ops: &[Operand],
    ) -> Result<EncodedInstr, EncodeError> {
        if !tag.matches(ops) {
            return Err(invalid(
                mnemonic,
                format!("operands do not match form '{}'", tag),
            ));
        }
        let form = table::lookup(mnemonic, tag).ok_or(EncodeError::UnsupportedForm {
            mnemonic,
            tag,
            mode: self.mode,
        })?;
        self.check_universe(mnemonic, ops)?;

        let mut buf = InstrBytes::new();
        let fixup = self.encode_form(&mut buf, mnemonic, form, ops)?;
        Ok(EncodedInstr { bytes: buf, fixup })
    }

    /// Encode with the mode tag inferred from the operands.
    ///
    /// # Errors
    ///
    /// As [`Encoder::encode`]; an operand list no tag describes is
    /// reported as [`EncodeError::InvalidOperands`].
    pub fn encode_ops(
        self,
        mnemonic: Mnemonic,
        ops: &[Operand],
    ) -> Result<EncodedInstr, EncodeError> {
        let tag = ModeTag::of(ops)
            .ok_or_else(|| invalid(mnemonic, "no instruction form takes these operand kinds"))?;
        self.encode(mnemonic, tag, ops)
    }

    /// Encode one instruction and append it to `buf` in a single write.
    ///
    /// # Errors
    ///
    /// As [`Encoder::encode`], plus the buffer's label and resource-limit
    /// errors. On error nothing is appended.
    pub fn emit<S: ByteSink>(
        self,
        buf: &mut CodeBuffer<S>,
        mnemonic: Mnemonic,
        tag: ModeTag,
        ops: &[Operand],
    ) -> Result<(), EncodeError> {
        let instr = self.encode(mnemonic, tag, ops)?;
        buf.append_instr(&instr)
    }

    /// [`Encoder::emit`] with the mode tag inferred from the operands.
    ///
    /// # Errors
    ///
    /// As [`Encoder::emit`].
    pub fn emit_ops<S: ByteSink>(
        self,
        buf: &mut CodeBuffer<S>,
        mnemonic: Mnemonic,
        ops: &[Operand],
    ) -> Result<(), EncodeError> {
        let instr = self.encode_ops(mnemonic, ops)?;
        buf.append_instr(&instr)
    }

    // ── validation ──

    /// Reject registers the mode cannot name and malformed addresses.
    fn check_universe(self, mnemonic: Mnemonic, ops: &[Operand]) -> Result<(), EncodeError> {
        for op in ops {
            match *op {
                Operand::Register(reg) => self.check_register(mnemonic, reg)?,
                Operand::Memory { base, .. } => self.check_address_reg(mnemonic, base)?,
                Operand::ScaledIndex {
                    base,
                    index,
                    scale_shift,
                    ..
                } => {
                    self.check_address_reg(mnemonic, base)?;
                    self.check_address_reg(mnemonic, index)?;
                    if index.id() == 4 {
                        return Err(invalid(
                            mnemonic,
                            "stack pointer cannot be an index register",
                        ));
                    }
                    if scale_shift > 3 {
                        return Err(invalid(
                            mnemonic,
                            format!("scale shift {} out of range (0..3)", scale_shift),
                        ));
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn check_register(self, mnemonic: Mnemonic, reg: Register) -> Result<(), EncodeError> {
        if self.mode == Mode::X86 {
            if reg.is_extended() || reg.class() == RegClass::Qword {
                return Err(invalid(
                    mnemonic,
                    format!("register {} requires 64-bit mode", reg),
                ));
            }
            if reg.requires_rex_for_byte() {
                return Err(invalid(
                    mnemonic,
                    format!("register {} requires a REX prefix, unavailable in 32-bit mode", reg),
                ));
            }
        }
        Ok(())
    }

    fn check_address_reg(self, mnemonic: Mnemonic, reg: Register) -> Result<(), EncodeError> {
        self.check_register(mnemonic, reg)?;
        if reg.class() != self.mode.word_class() {
            return Err(invalid(
                mnemonic,
                format!(
                    "address register {} must be {}-bit",
                    reg,
                    self.mode.word_bits()
                ),
            ));
        }
        Ok(())
    }

    /// Operand size for `width`, checking the register classes involved.
    fn sizing(
        self,
        mnemonic: Mnemonic,
        width: Width,
        reg: Option<Register>,
        rm: Rm,
    ) -> Result<Sizing, EncodeError> {
        let word = self.mode.word_bits();
        match width {
            Width::Gpr => {
                let mut size: Option<Register> = None;
                for r in reg.into_iter().chain(rm.reg()) {
                    if !r.is_gpr() || r.class() == RegClass::Byte {
                        return Err(invalid(
                            mnemonic,
                            format!("{} is not a 16/32/64-bit general-purpose register", r),
                        ));
                    }
                    match size {
                        Some(first) if first.class() != r.class() => {
                            return Err(invalid(
                                mnemonic,
                                format!("operand size mismatch: {} vs {}", first, r),
                            ));
                        }
                        _ => size = Some(r),
                    }
                }
                let bits = size.map_or(word, Register::size_bits);
                Ok(Sizing {
                    bits,
                    rex_w: bits == 64,
                })
            }
            Width::Byte => {
                for r in reg.into_iter().chain(rm.reg()) {
                    if r.class() != RegClass::Byte {
                        return Err(invalid(
                            mnemonic,
                            format!("{} is not a byte register", r),
                        ));
                    }
                }
                Ok(Sizing {
                    bits: 8,
                    rex_w: false,
                })
            }
            Width::Stack => {
                if let Some(r) = rm.reg() {
                    if r.class() != self.mode.word_class() {
                        return Err(invalid(
                            mnemonic,
                            format!("{} is not a {}-bit register", r, word),
                        ));
                    }
                }
                Ok(Sizing {
                    bits: word,
                    rex_w: false,
                })
            }
            Width::Extend(src) => {
                let dst = reg.ok_or_else(|| invalid(mnemonic, "missing destination register"))?;
                if !dst.is_gpr() || dst.size_bits() <= src.bits() {
                    return Err(invalid(
                        mnemonic,
                        format!("{} is too narrow for a {}-bit source", dst, src.bits()),
                    ));
                }
                if let Some(r) = rm.reg() {
                    if r.class() != src {
                        return Err(invalid(
                            mnemonic,
                            format!("source {} must be {}-bit", r, src.bits()),
                        ));
                    }
                }
                Ok(Sizing {
                    bits: dst.size_bits(),
                    rex_w: dst.class() == RegClass::Qword,
                })
            }
            Width::Sse => {
                for r in reg.into_iter().chain(rm.reg()) {
                    if !r.is_xmm() {
                        return Err(invalid(mnemonic, format!("{} is not an xmm register", r)));
                    }
                }
                Ok(Sizing {
                    bits: 64,
                    rex_w: false,
                })
            }
            Width::SseFromGpr => {
                if let Some(r) = reg.filter(|r| !r.is_xmm()) {
                    return Err(invalid(mnemonic, format!("{} is not an xmm register", r)));
                }
                let bits = match rm.reg() {
                    Some(r) if matches!(r.class(), RegClass::Dword | RegClass::Qword) => {
                        r.size_bits()
                    }
                    Some(r) => {
                        return Err(invalid(
                            mnemonic,
                            format!("{} is not a 32/64-bit general-purpose register", r),
                        ))
                    }
                    None => word,
                };
                Ok(Sizing {
                    bits: 64,
                    rex_w: bits == 64,
                })
            }
            Width::GprFromSse => {
                let dst = reg.ok_or_else(|| invalid(mnemonic, "missing destination register"))?;
                if !matches!(dst.class(), RegClass::Dword | RegClass::Qword) {
                    return Err(invalid(
                        mnemonic,
                        format!("{} is not a 32/64-bit general-purpose register", dst),
                    ));
                }
                if let Some(r) = rm.reg().filter(|r| !r.is_xmm()) {
                    return Err(invalid(mnemonic, format!("{} is not an xmm register", r)));
                }
                Ok(Sizing {
                    bits: 64,
                    rex_w: dst.class() == RegClass::Qword,
                })
            }
        }
    }

    /// Emit a REX prefix if any bit or a byte register demands one.
    fn emit_rex(
        self,
        buf: &mut InstrBytes,
        mnemonic: Mnemonic,
        (w, r, x, b): (bool, bool, bool, bool),
        force: bool,
    ) -> Result<(), EncodeError> {
        if !needs_rex(w, r, x, b) && !force {
            return Ok(());
        }
        if self.mode == Mode::X86 {
            return Err(invalid(mnemonic, "REX prefix unavailable in 32-bit mode"));
        }
        buf.push(rex(w, r, x, b));
        Ok(())
    }

    // ── form interpretation ──

    fn encode_form(
        self,
        buf: &mut InstrBytes,
        mnemonic: Mnemonic,
        form: Form,
        ops: &[Operand],
    ) -> Result<Option<BranchFixup>, EncodeError> {
        match form {
            Form::Fixed(bytes) => buf.extend_from_slice(bytes),
            Form::WordSized(op) => {
                if self.mode == Mode::X86_64 {
                    buf.push(rex(true, false, false, false));
                }
                buf.push(op);
            }
            Form::Imm16(op) => {
                let value = check_range(immediate(mnemonic, ops, 0)?, 0, 0xFFFF)?;
                buf.push(op);
                emit_imm(buf, value, 2);
            }
            Form::ModRm {
                prefix,
                opcode,
                reg,
                rm,
                width,
                imm,
                acc_short,
                disp32,
            } => self.encode_modrm(
                buf,
                mnemonic,
                ModRmParts {
                    prefix,
                    opcode,
                    reg,
                    rm,
                    width,
                    imm,
                    acc_short,
                    disp32,
                },
                ops,
            )?,
            Form::PlusReg(op) => {
                let r = register(mnemonic, ops, 0)?;
                if r.class() != self.mode.word_class() {
                    return Err(invalid(
                        mnemonic,
                        format!("{} is not a {}-bit register", r, self.mode.word_bits()),
                    ));
                }
                self.emit_rex(buf, mnemonic, (false, false, false, r.is_extended()), false)?;
                buf.push(op + r.base_code());
            }
            Form::IncDec { digit } => {
                let r = register(mnemonic, ops, 0)?;
                let size = self.sizing(mnemonic, Width::Gpr, None, Rm::Reg(r))?;
                if size.bits == 16 {
                    buf.push(0x66);
                }
                match self.mode {
                    Mode::X86 => buf.push(0x40 + digit * 8 + r.base_code()),
                    Mode::X86_64 => {
                        self.emit_rex(
                            buf,
                            mnemonic,
                            (size.rex_w, false, false, r.is_extended()),
                            false,
                        )?;
                        buf.push(0xFF);
                        buf.push(modrm(0b11, digit, r.base_code()));
                    }
                }
            }
            Form::MovImm { byte } => self.encode_mov_imm(buf, mnemonic, byte, ops)?,
            Form::Moffs {
                short,
                opcode,
                reg,
                rm,
            } => {
                let r = register(mnemonic, ops, reg)?;
                let addr = match ops[rm] {
                    Operand::ImmediateAddress(addr) => addr,
                    _ => return Err(invalid(mnemonic, "expected an absolute address")),
                };
                if self.mode == Mode::X86 && r.is_accumulator() {
                    let size = self.sizing(mnemonic, Width::Gpr, Some(r), Rm::Mem(Address::Absolute(addr)))?;
                    let addr = check_range(addr, -0x8000_0000, 0xFFFF_FFFF)?;
                    if size.bits == 16 {
                        buf.push(0x66);
                    }
                    buf.push(short);
                    emit_imm(buf, addr, 4);
                } else {
                    self.encode_modrm(
                        buf,
                        mnemonic,
                        ModRmParts {
                            prefix: None,
                            opcode: Opcode::one(opcode),
                            reg: RegField::Operand(reg),
                            rm,
                            width: Width::Gpr,
                            imm: Imm::None,
                            acc_short: None,
                            disp32: false,
                        },
                        ops,
                    )?;
                }
            }
            Form::ShiftImm { digit } => {
                let r = register(mnemonic, ops, 0)?;
                let count = check_range(immediate(mnemonic, ops, 1)?, 0, 0xFF)?;
                let size = self.sizing(mnemonic, Width::Gpr, None, Rm::Reg(r))?;
                if size.bits == 16 {
                    buf.push(0x66);
                }
                self.emit_rex(
                    buf,
                    mnemonic,
                    (size.rex_w, false, false, r.is_extended()),
                    false,
                )?;
                if count == 1 {
                    buf.push(0xD1);
                    buf.push(modrm(0b11, digit, r.base_code()));
                } else {
                    buf.push(0xC1);
                    buf.push(modrm(0b11, digit, r.base_code()));
                    emit_imm(buf, count, 1);
                }
            }
            Form::PushImm => {
                let value = normalize_imm(immediate(mnemonic, ops, 0)?, self.mode.word_bits())?;
                if fits_i8(value) {
                    buf.push(0x6A);
                    emit_imm(buf, value, 1);
                } else {
                    buf.push(0x68);
                    emit_imm(buf, value, 4);
                }
            }
            Form::Xchg => self.encode_xchg(buf, mnemonic, ops)?,
            Form::Rel { opcode, rel8 } => {
                let label = match ops[0] {
                    Operand::RelativeLabel(label) => label,
                    _ => return Err(invalid(mnemonic, "expected a label")),
                };
                buf.extend_from_slice(opcode.as_slice());
                let width: u8 = if rel8 { 1 } else { 4 };
                let offset = buf.len();
                emit_imm(buf, 0, width);
                return Ok(Some(BranchFixup {
                    offset,
                    width,
                    label,
                }));
            }
        }
        Ok(None)
    }

    fn encode_modrm(
        self,
        buf: &mut InstrBytes,
        mnemonic: Mnemonic,
        parts: ModRmParts,
        ops: &[Operand],
    ) -> Result<(), EncodeError> {
        let rm = Rm::resolve(self.mode, &ops[parts.rm])
            .ok_or_else(|| invalid(mnemonic, "expected a register or memory operand"))?;
        let (reg_code, reg) = match parts.reg {
            RegField::Operand(i) => {
                let r = register(mnemonic, ops, i)?;
                (r.base_code(), Some(r))
            }
            RegField::Digit(d) => (d, None),
        };
        let size = self.sizing(mnemonic, parts.width, reg, rm)?;

        let mut opcode = parts.opcode;
        let mut imm: Option<(i64, u8)> = None;
        let mut short: Option<u8> = None;
        match parts.imm {
            Imm::None => {}
            Imm::Full => {
                let value = normalize_imm(immediate(mnemonic, ops, ops.len() - 1)?, size.bits)?;
                imm = Some((value, imm_bytes(size.bits)));
                short = parts.acc_short;
            }
            Imm::Sx8 { short: sx8 } => {
                let value = normalize_imm(immediate(mnemonic, ops, ops.len() - 1)?, size.bits)?;
                if fits_i8(value) {
                    opcode = sx8;
                    imm = Some((value, 1));
                } else {
                    imm = Some((value, imm_bytes(size.bits)));
                    short = parts.acc_short;
                }
            }
        }
        let short = short.filter(|_| rm.reg().is_some_and(Register::is_accumulator));

        if size.bits == 16 {
            buf.push(0x66);
        }
        if let Some(p) = parts.prefix {
            buf.push(p);
        }
        let reg_ext = reg.is_some_and(Register::is_extended);
        let force = rm.forces_rex() || reg.is_some_and(Register::requires_rex_for_byte);

        if let Some(op) = short {
            self.emit_rex(buf, mnemonic, (size.rex_w, false, false, false), false)?;
            buf.push(op);
        } else {
            self.emit_rex(
                buf,
                mnemonic,
                (size.rex_w, reg_ext, rm.rex_x(), rm.rex_b()),
                force,
            )?;
            buf.extend_from_slice(opcode.as_slice());
            match rm {
                Rm::Reg(r) => buf.push(modrm(0b11, reg_code, r.base_code())),
                Rm::Mem(addr) => emit_address(buf, self.mode, reg_code, addr, parts.disp32)?,
            }
        }
        if let Some((value, bytes)) = imm {
            emit_imm(buf, value, bytes);
        }
        Ok(())
    }

    fn encode_mov_imm(
        self,
        buf: &mut InstrBytes,
        mnemonic: Mnemonic,
        byte: bool,
        ops: &[Operand],
    ) -> Result<(), EncodeError> {
        let r = register(mnemonic, ops, 0)?;
        let value = immediate(mnemonic, ops, 1)?;
        let width = if byte { Width::Byte } else { Width::Gpr };
        let size = self.sizing(mnemonic, width, None, Rm::Reg(r))?;
        let b = r.is_extended();
        match size.bits {
            8 => {
                let value = normalize_imm(value, 8)?;
                self.emit_rex(buf, mnemonic, (false, false, false, b), r.requires_rex_for_byte())?;
                buf.push(0xB0 + r.base_code());
                emit_imm(buf, value, 1);
            }
            64 => {
                self.emit_rex(buf, mnemonic, (true, false, false, b), false)?;
                if i32::try_from(value).is_ok() {
                    buf.push(0xC7);
                    buf.push(modrm(0b11, 0, r.base_code()));
                    emit_imm(buf, value, 4);
                } else {
                    buf.push(0xB8 + r.base_code());
                    emit_imm(buf, value, 8);
                }
            }
            bits => {
                let value = normalize_imm(value, bits)?;
                if bits == 16 {
                    buf.push(0x66);
                }
                self.emit_rex(buf, mnemonic, (false, false, false, b), false)?;
                buf.push(0xB8 + r.base_code());
                emit_imm(buf, value, imm_bytes(bits));
            }
        }
        Ok(())
    }

    fn encode_xchg(
        self,
        buf: &mut InstrBytes,
        mnemonic: Mnemonic,
        ops: &[Operand],
    ) -> Result<(), EncodeError> {
        let a = register(mnemonic, ops, 0)?;
        let b = register(mnemonic, ops, 1)?;
        let size = self.sizing(mnemonic, Width::Gpr, Some(b), Rm::Reg(a))?;
        let other = match (a.is_accumulator(), b.is_accumulator()) {
            (true, _) => Some(b),
            (false, true) => Some(a),
            (false, false) => None,
        };
        // `xchg eax, eax` as 90 would not zero the upper half in 64-bit mode.
        let other = other.filter(|o| {
            !(o.is_accumulator() && self.mode == Mode::X86_64 && size.bits == 32)
        });

        if size.bits == 16 {
            buf.push(0x66);
        }
        match other {
            Some(o) => {
                self.emit_rex(buf, mnemonic, (size.rex_w, false, false, o.is_extended()), false)?;
                buf.push(0x90 + o.base_code());
            }
            None => {
                self.emit_rex(
                    buf,
                    mnemonic,
                    (size.rex_w, b.is_extended(), false, a.is_extended()),
                    false,
                )?;
                buf.push(0x87);
                buf.push(modrm(0b11, b.base_code(), a.base_code()));
            }
        }
        Ok(())
    }
}

/// Fields of a [`Form::ModRm`], passed as one value.
#[derive(Debug, Clone, Copy)]
struct ModRmParts {
    prefix: Option<u8>,
    opcode: Opcode,
    reg: RegField,
    rm: usize,
    width: Width,
    imm: Imm,
    acc_short: Option<u8>,
    disp32: bool,
}

fn register(mnemonic: Mnemonic, ops: &[Operand], i: usize) -> Result<Register, EncodeError> {
    match ops.get(i) {
        Some(Operand::Register(r)) => Ok(*r),
        _ => Err(invalid(
            mnemonic,
            format!("operand {} must be a register", i + 1),
        )),
    }
}

fn immediate(mnemonic: Mnemonic, ops: &[Operand], i: usize) -> Result<i64, EncodeError> {
    match ops.get(i) {
        Some(Operand::Immediate(v)) => Ok(*v),
        _ => Err(invalid(
            mnemonic,
            format!("operand {} must be an immediate", i + 1),
        )),
    }
}
