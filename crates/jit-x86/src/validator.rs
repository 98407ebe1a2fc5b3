//! Differential validation against GNU `as`.
//!
//! Instructions are encoded through a [`Recorder`], rendered as AT&T
//! assembly, assembled once by the reference assembler, and compared
//! instruction by instruction. This is test support: nothing here is needed
//! to emit code.

use std::fmt::{self, Write as _};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::buffer::{CodeBuffer, Recorder};
use crate::encoder::Encoder;
use crate::error::EncodeError;
use crate::ir::{Mnemonic, Mode, ModeTag, Operand, OperandKind, RegClass, Register};
use crate::table;

/// Marker string emitted before the instructions under test.
pub const BEGIN_MARKER: &str = "<<<jit-x86-begin>>>";
/// Marker string emitted after the instructions under test.
pub const END_MARKER: &str = "<<<jit-x86-end>>>";

// ─── Errors ─────────────────────────────────────────────────

/// One instruction whose bytes differ from the reference assembler's.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    /// The assembly text given to the reference assembler.
    pub text: String,
    /// Bytes produced by the encoder.
    pub ours: Vec<u8>,
    /// Bytes produced by the reference assembler.
    pub reference: Vec<u8>,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "encoding differs for `{}`", self.text.trim())?;
        writeln!(f, "    jit-x86: {}", hexdump(&self.ours))?;
        write!(f, "    as:      {}", hexdump(&self.reference))
    }
}

/// Space-separated upper-case hex, e.g. `8B 55 DC`.
#[must_use]
pub fn hexdump(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for (i, b) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{:02X}", b);
    }
    out
}

/// Errors from a validation run.
#[derive(Debug)]
pub enum ValidatorError {
    /// Writing the source, running the assembler or reading its output failed.
    Io(std::io::Error),
    /// The assembler exited unsuccessfully.
    AssemblerFailed {
        /// Exit status, if the process exited normally.
        status: Option<i32>,
        /// Captured standard error.
        stderr: String,
    },
    /// The begin/end markers were not found in the object file.
    MarkerNotFound,
    /// The encoder rejected a case.
    Encode(EncodeError),
    /// Encoder and reference assembler disagree.
    Mismatch(Mismatch),
}

impl fmt::Display for ValidatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidatorError::Io(e) => write!(f, "i/o error: {}", e),
            ValidatorError::AssemblerFailed { status, stderr } => match status {
                Some(code) => write!(f, "assembler exited with status {}: {}", code, stderr),
                None => write!(f, "assembler terminated by signal: {}", stderr),
            },
            ValidatorError::MarkerNotFound => {
                write!(f, "test markers not found in assembler output")
            }
            ValidatorError::Encode(e) => write!(f, "encoder error: {}", e),
            ValidatorError::Mismatch(m) => write!(f, "{}", m),
        }
    }
}

impl std::error::Error for ValidatorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ValidatorError::Io(e) => Some(e),
            ValidatorError::Encode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ValidatorError {
    fn from(e: std::io::Error) -> Self {
        ValidatorError::Io(e)
    }
}

impl From<EncodeError> for ValidatorError {
    fn from(e: EncodeError) -> Self {
        ValidatorError::Encode(e)
    }
}

// ─── Reference assembler ────────────────────────────────────

/// An assembler whose output is trusted.
pub trait ReferenceAssembler {
    /// Assemble `source` for `mode` and return the bytes of the instructions
    /// it contains, in order.
    fn assemble(&self, mode: Mode, source: &str) -> Result<Vec<u8>, ValidatorError>;
}

/// The GNU assembler, invoked as a subprocess.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GnuAs {
    program: PathBuf,
}

static SCRATCH_COUNTER: AtomicUsize = AtomicUsize::new(0);

impl GnuAs {
    /// Use the assembler at `program`.
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Find a GNU assembler named `as` on the `PATH`.
    ///
    /// Returns `None` when there is none.
    pub fn detect() -> Option<Self> {
        let candidate = Self::with_program("as");
        match Command::new(&candidate.program).arg("--version").output() {
            Ok(out) if out.status.success() && out.stdout.starts_with(b"GNU assembler") => {
                log::debug!(
                    "using {}",
                    String::from_utf8_lossy(&out.stdout).lines().next().unwrap_or("as")
                );
                Some(candidate)
            }
            _ => {
                log::warn!("GNU as not found; differential validation disabled");
                None
            }
        }
    }

    /// Path of the assembler executable.
    pub fn program(&self) -> &Path {
        &self.program
    }

    fn run(&self, dir: &Path, mode: Mode, source: &str) -> Result<Vec<u8>, ValidatorError> {
        let input = dir.join("check.s");
        let output = dir.join("check.o");
        let mut text = String::with_capacity(source.len() + 128);
        let _ = writeln!(text, "\t.text");
        let _ = writeln!(text, "\t.string \"{}\"", BEGIN_MARKER);
        text.push_str(source);
        let _ = writeln!(text);
        let _ = writeln!(text, "\t.string \"{}\"", END_MARKER);
        fs::write(&input, text)?;

        let flag = match mode {
            Mode::X86 => "--32",
            Mode::X86_64 => "--64",
        };
        log::debug!(
            "{} {} ({} source lines)",
            self.program.display(),
            flag,
            source.lines().count()
        );
        let out = Command::new(&self.program)
            .arg(flag)
            .arg(&input)
            .arg("-o")
            .arg(&output)
            .output()?;
        if !out.status.success() {
            return Err(ValidatorError::AssemblerFailed {
                status: out.status.code(),
                stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
            });
        }
        let object = fs::read(&output)?;
        extract_marked(&object).map(<[u8]>::to_vec)
    }
}

impl ReferenceAssembler for GnuAs {
    fn assemble(&self, mode: Mode, source: &str) -> Result<Vec<u8>, ValidatorError> {
        let dir = std::env::temp_dir().join(format!(
            "jit-x86-{}-{}",
            std::process::id(),
            SCRATCH_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        fs::create_dir_all(&dir)?;
        let result = self.run(&dir, mode, source);
        let _ = fs::remove_dir_all(&dir);
        result
    }
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}

/// The bytes between the NUL-terminated begin marker and the end marker.
pub fn extract_marked(object: &[u8]) -> Result<&[u8], ValidatorError> {
    let begin = find(object, BEGIN_MARKER.as_bytes(), 0).ok_or(ValidatorError::MarkerNotFound)?;
    let start = begin + BEGIN_MARKER.len() + 1;
    let end = find(object, END_MARKER.as_bytes(), start).ok_or(ValidatorError::MarkerNotFound)?;
    Ok(&object[start..end])
}

// ─── AT&T rendering ─────────────────────────────────────────

fn suffix(class: RegClass) -> &'static str {
    match class {
        RegClass::Byte => "b",
        RegClass::Word => "w",
        RegClass::Dword => "l",
        RegClass::Qword | RegClass::Xmm => "q",
    }
}

fn render_operand(mode: Mode, op: &Operand) -> String {
    match *op {
        Operand::Register(r) => format!("%{}", r),
        Operand::StackSlot(off) => format!("{}(%{})", off, mode.frame_base()),
        Operand::StackArg(off) => format!("{}(%{})", off, mode.stack_pointer()),
        Operand::Memory { base, disp } if disp == 0 => format!("(%{})", base),
        Operand::Memory { base, disp } => format!("{}(%{})", disp, base),
        Operand::ScaledIndex {
            base,
            index,
            scale_shift,
            disp,
        } => {
            let disp = if disp == 0 {
                String::new()
            } else {
                disp.to_string()
            };
            format!("{}(%{},%{},{})", disp, base, index, 1u8 << scale_shift)
        }
        Operand::Immediate(v) => format!("${}", v),
        Operand::ImmediateAddress(v) => v.to_string(),
        Operand::RelativeLabel(l) => l.to_string(),
    }
}

/// Size suffix from the first general-purpose register, else the word size.
fn gpr_suffix(mode: Mode, ops: &[Operand]) -> &'static str {
    ops.iter()
        .find_map(|op| match op {
            Operand::Register(r) if r.is_gpr() => Some(suffix(r.class())),
            _ => None,
        })
        .unwrap_or(suffix(mode.word_class()))
}

fn register_class(ops: &[Operand], i: usize) -> Option<RegClass> {
    match ops.get(i) {
        Some(Operand::Register(r)) => Some(r.class()),
        _ => None,
    }
}

/// Render one instruction as GNU `as` AT&T text.
#[must_use]
pub fn render(mode: Mode, mnemonic: Mnemonic, ops: &[Operand]) -> String {
    let word = suffix(mode.word_class());
    let name = match mnemonic {
        Mnemonic::Cdq => match mode {
            Mode::X86 => "cltd".to_string(),
            Mode::X86_64 => "cqto".to_string(),
        },
        Mnemonic::Nop
        | Mnemonic::Ret
        | Mnemonic::Int3
        | Mnemonic::Set(_)
        | Mnemonic::J(_)
        | Mnemonic::Movsd
        | Mnemonic::Addsd
        | Mnemonic::Subsd
        | Mnemonic::Mulsd
        | Mnemonic::Divsd
        | Mnemonic::Sqrtsd
        | Mnemonic::Ucomisd
        | Mnemonic::Xorpd
        | Mnemonic::Andpd
        | Mnemonic::Cvttsd2si => mnemonic.to_string(),
        Mnemonic::Jmp | Mnemonic::JmpShort => "jmp".to_string(),
        Mnemonic::JShort(cc) => format!("j{}", cc.suffix()),
        Mnemonic::Call => "call".to_string(),
        Mnemonic::Push | Mnemonic::Pop => format!("{}{}", mnemonic, word),
        Mnemonic::Mov8 => "movb".to_string(),
        Mnemonic::Movzx8 | Mnemonic::Movsx8 | Mnemonic::Movzx16 | Mnemonic::Movsx16 => {
            let (stem, src) = match mnemonic {
                Mnemonic::Movzx8 => ("movz", "b"),
                Mnemonic::Movsx8 => ("movs", "b"),
                Mnemonic::Movzx16 => ("movz", "w"),
                _ => ("movs", "w"),
            };
            let dst = register_class(ops, 0).map_or(word, suffix);
            format!("{}{}{}", stem, src, dst)
        }
        Mnemonic::Lea32 => format!("lea{}", gpr_suffix(mode, ops)),
        Mnemonic::Cvtsi2sd => {
            let src = register_class(ops, 1).map_or(word, suffix);
            format!("cvtsi2sd{}", src)
        }
        Mnemonic::Mov => match (ops.first(), ops.get(1)) {
            (Some(Operand::Register(r)), Some(Operand::Immediate(v)))
                if r.class() == RegClass::Qword && i32::try_from(*v).is_err() =>
            {
                "movabsq".to_string()
            }
            _ => format!("mov{}", gpr_suffix(mode, ops)),
        },
        _ => format!("{}{}", mnemonic, gpr_suffix(mode, ops)),
    };

    let mut rendered: Vec<String> = ops.iter().map(|op| render_operand(mode, op)).collect();
    let indirect = mnemonic.is_relative_branch()
        && !matches!(ops.first(), Some(Operand::RelativeLabel(_)));
    if indirect {
        if let Some(first) = rendered.first_mut() {
            first.insert(0, '*');
        }
    }
    let by_cl = matches!(
        mnemonic,
        Mnemonic::Shl | Mnemonic::Shr | Mnemonic::Sar | Mnemonic::Rol | Mnemonic::Ror
    ) && ops.len() == 1;
    if by_cl {
        rendered.push("%cl".to_string());
    }
    rendered.reverse();
    if rendered.is_empty() {
        format!("\t{}", name)
    } else {
        format!("\t{} {}", name, rendered.join(", "))
    }
}

// ─── Cases ──────────────────────────────────────────────────

/// One instruction to validate.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Case {
    /// The mnemonic.
    pub mnemonic: Mnemonic,
    /// The operand-mode tag.
    pub tag: ModeTag,
    /// The operands, in the encoder's order.
    pub ops: Vec<Operand>,
}

impl Case {
    /// A case with the tag inferred from the operands.
    ///
    /// # Panics
    ///
    /// Panics if no mode tag describes `ops`.
    pub fn new(mnemonic: Mnemonic, ops: Vec<Operand>) -> Self {
        let tag = ModeTag::of(&ops)
            .unwrap_or_else(|| panic!("no mode tag for {mnemonic} with {ops:?}"));
        Self { mnemonic, tag, ops }
    }
}

/// Frame-slot offsets around the disp8 / disp32 boundary.
pub const FRAME_OFFSETS: [i32; 9] = [0, 4, -4, 124, 127, 128, -128, -129, -132];
/// Stack-argument offsets.
pub const ARG_OFFSETS: [i32; 4] = [0, 4, 124, 128];
/// Immediates around the imm8 boundary.
pub const IMM8_EDGES: [i64; 5] = [-128, -1, 0, 1, 127];
/// Immediates around the imm32 boundaries (beyond the imm8 ones).
pub const IMM32_EDGES: [i64; 7] = [
    -0x8000_0000,
    0x7FFF_FFFF,
    0xFFFF_FFFF,
    128,
    256,
    -129,
    -255,
];

/// Whether `case` hits a short form the encoder must pick on its own.
#[must_use]
pub fn is_short_form_case(mode: Mode, case: &Case) -> bool {
    let acc = |i: usize| matches!(case.ops.get(i), Some(Operand::Register(r)) if r.is_accumulator());
    match (case.mnemonic, case.tag) {
        (
            Mnemonic::Add
            | Mnemonic::Or
            | Mnemonic::Adc
            | Mnemonic::Sbb
            | Mnemonic::And
            | Mnemonic::Sub
            | Mnemonic::Xor
            | Mnemonic::Cmp
            | Mnemonic::Test,
            ModeTag::RI,
        ) => acc(0),
        (Mnemonic::Mov, ModeTag::RJ) => mode == Mode::X86 && acc(0),
        (Mnemonic::Mov, ModeTag::JR) => mode == Mode::X86 && acc(1),
        (Mnemonic::Xchg, ModeTag::RR) => acc(0) || acc(1),
        _ => false,
    }
}

/// Why `case` is not sent to the reference assembler, if it is not.
#[must_use]
pub fn skip_reason(mode: Mode, case: &Case) -> Option<&'static str> {
    if case.tag.kinds().contains(&OperandKind::Label) {
        Some("relative branches need an explicit test")
    } else if case.mnemonic == Mnemonic::Lea32 {
        Some("forced 32-bit displacement has no assembler spelling")
    } else if is_short_form_case(mode, case) {
        Some("short form is tested separately")
    } else {
        None
    }
}

/// Generates boundary-value cases for every form.
#[derive(Debug, Clone, Copy)]
pub struct CaseGenerator {
    mode: Mode,
    max_per_form: usize,
}

impl CaseGenerator {
    /// A generator for `mode` with a default cap of 4096 cases per form.
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            max_per_form: 4096,
        }
    }

    /// Cap the number of cases per form; larger products are sampled at a
    /// fixed stride.
    pub fn with_max_per_form(mut self, max: usize) -> Self {
        self.max_per_form = max.max(1);
        self
    }

    /// Operation sizes worth covering for `mnemonic`.
    fn size_variants(&self, mnemonic: Mnemonic) -> Vec<RegClass> {
        let wide = self.mode == Mode::X86_64;
        let mut v = match mnemonic {
            Mnemonic::Push | Mnemonic::Pop | Mnemonic::Jmp | Mnemonic::Call => {
                return vec![self.mode.word_class()]
            }
            Mnemonic::Mov8 | Mnemonic::Set(_) => return vec![RegClass::Byte],
            m if m.is_sse() && !matches!(m, Mnemonic::Cvtsi2sd | Mnemonic::Cvttsd2si) => {
                return vec![RegClass::Xmm]
            }
            Mnemonic::Cvtsi2sd | Mnemonic::Cvttsd2si | Mnemonic::Movzx16 | Mnemonic::Movsx16 => {
                vec![RegClass::Dword]
            }
            _ => vec![RegClass::Word, RegClass::Dword],
        };
        if wide {
            v.push(RegClass::Qword);
        }
        v
    }

    fn register_class_at(mnemonic: Mnemonic, position: usize, size: RegClass) -> RegClass {
        match (mnemonic, position) {
            (Mnemonic::Cvtsi2sd, 0) | (Mnemonic::Cvttsd2si, 1) => RegClass::Xmm,
            (Mnemonic::Movzx8 | Mnemonic::Movsx8, 1) => RegClass::Byte,
            (Mnemonic::Movzx16 | Mnemonic::Movsx16, 1) => RegClass::Word,
            _ => size,
        }
    }

    fn registers(&self, class: RegClass) -> Vec<Operand> {
        let count = match (class, self.mode) {
            (RegClass::Byte, Mode::X86) => 4,
            _ => self.mode.register_count(),
        };
        (0..count)
            .map(|id| Operand::Register(Register::new(id, class)))
            .collect()
    }

    fn universe(&self, kind: OperandKind, class: RegClass) -> Vec<Operand> {
        let word = self.mode.word_class();
        let ids = 0..self.mode.register_count();
        match kind {
            OperandKind::Reg => self.registers(class),
            OperandKind::StackSlot => FRAME_OFFSETS.iter().map(|&o| Operand::StackSlot(o)).collect(),
            OperandKind::StackArg => ARG_OFFSETS.iter().map(|&o| Operand::StackArg(o)).collect(),
            OperandKind::Memory => ids
                .flat_map(|b| {
                    FRAME_OFFSETS
                        .iter()
                        .map(move |&d| Operand::mem(Register::new(b, word), d))
                })
                .collect(),
            OperandKind::ScaledIndex => {
                let mut out = Vec::new();
                let n = self.mode.register_count();
                for b in 0..n {
                    for i in (0..n).filter(|&i| i != 4) {
                        for shift in 0..4u8 {
                            let d = FRAME_OFFSETS[out.len() % FRAME_OFFSETS.len()];
                            out.push(Operand::array(
                                Register::new(b, word),
                                Register::new(i, word),
                                shift,
                                d,
                            ));
                        }
                    }
                }
                out
            }
            OperandKind::Imm => IMM8_EDGES
                .iter()
                .chain(IMM32_EDGES.iter())
                .map(|&v| Operand::Immediate(v))
                .collect(),
            OperandKind::ImmAddr => IMM8_EDGES
                .iter()
                .chain(IMM32_EDGES.iter())
                .map(|&v| Operand::ImmediateAddress(v))
                .collect(),
            OperandKind::Label => Vec::new(),
        }
    }

    /// Boundary cases for one form, keeping only those the encoder accepts.
    pub fn boundary_cases(&self, mnemonic: Mnemonic, tag: ModeTag) -> Vec<Case> {
        if !table::is_supported(mnemonic, tag) {
            return Vec::new();
        }
        let encoder = Encoder::new(self.mode);
        let sized = tag.kinds().iter().enumerate().any(|(pos, &kind)| {
            kind == OperandKind::Reg
                && Self::register_class_at(mnemonic, pos, RegClass::Dword) != RegClass::Xmm
        });
        let mut variants = self.size_variants(mnemonic);
        if !sized {
            variants.truncate(1);
        }

        let mut cases = Vec::new();
        for size in variants {
            let universes: Vec<Vec<Operand>> = tag
                .kinds()
                .iter()
                .enumerate()
                .map(|(pos, &kind)| self.universe(kind, Self::register_class_at(mnemonic, pos, size)))
                .collect();
            let total: usize = universes.iter().map(Vec::len).product();
            if total == 0 && !universes.is_empty() {
                continue;
            }
            let take = total.min(self.max_per_form);
            for k in 0..take {
                let mut n = if take == total { k } else { k * total / take };
                let mut ops = Vec::with_capacity(universes.len());
                for u in &universes {
                    ops.push(u[n % u.len()]);
                    n /= u.len();
                }
                let case = Case { mnemonic, tag, ops };
                if encoder.encode(case.mnemonic, case.tag, &case.ops).is_ok() {
                    cases.push(case);
                }
            }
        }
        cases
    }

    /// Boundary cases for every form of `mnemonic`.
    pub fn mnemonic_cases(&self, mnemonic: Mnemonic) -> Vec<Case> {
        table::supported_tags(mnemonic)
            .flat_map(|tag| self.boundary_cases(mnemonic, tag))
            .collect()
    }
}

// ─── Validator ──────────────────────────────────────────────

/// Outcome of a successful [`Validator::check`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Report {
    /// Cases compared with the reference assembler.
    pub checked: usize,
    /// Cases left out by [`skip_reason`].
    pub skipped: usize,
}

/// Compares the encoder with a reference assembler.
#[derive(Debug, Clone)]
pub struct Validator<A: ReferenceAssembler> {
    mode: Mode,
    assembler: A,
}

impl<A: ReferenceAssembler> Validator<A> {
    /// A validator for `mode` using `assembler`.
    pub fn new(mode: Mode, assembler: A) -> Self {
        Self { mode, assembler }
    }

    /// Encode every case, assemble them all in one run, and compare.
    ///
    /// # Errors
    ///
    /// [`ValidatorError::Mismatch`] for the first differing instruction;
    /// [`ValidatorError::Encode`] if the encoder rejects a case; assembler
    /// and I/O failures otherwise.
    pub fn check(&self, cases: &[Case]) -> Result<Report, ValidatorError> {
        let encoder = Encoder::new(self.mode);
        let mut buf = CodeBuffer::with_sink(Recorder::new());
        let mut lines = Vec::new();
        let mut report = Report::default();

        for case in cases {
            let text = render(self.mode, case.mnemonic, &case.ops);
            if let Some(reason) = skip_reason(self.mode, case) {
                log::trace!("skip `{}`: {}", text.trim(), reason);
                report.skipped += 1;
                continue;
            }
            encoder.emit(&mut buf, case.mnemonic, case.tag, &case.ops)?;
            lines.push(text);
        }
        if report.skipped > 0 {
            log::debug!("{} of {} cases skipped", report.skipped, cases.len());
        }
        if lines.is_empty() {
            return Ok(report);
        }

        let recorder = buf.finalize()?.into_sink();
        let reference = self.assembler.assemble(self.mode, &lines.join("\n"))?;

        let mut pos = 0;
        for (text, ours) in lines.iter().zip(recorder.instructions()) {
            let end = (pos + ours.len()).min(reference.len());
            let theirs = &reference[pos..end];
            if theirs != ours {
                return Err(ValidatorError::Mismatch(Mismatch {
                    text: text.clone(),
                    ours: ours.to_vec(),
                    reference: theirs.to_vec(),
                }));
            }
            pos = end;
        }
        if pos != reference.len() {
            return Err(ValidatorError::Mismatch(Mismatch {
                text: String::from("<end of output>"),
                ours: Vec::new(),
                reference: reference[pos..].to_vec(),
            }));
        }
        report.checked = lines.len();
        Ok(report)
    }
}
