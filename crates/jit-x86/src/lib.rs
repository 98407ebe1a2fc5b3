//! # jit-x86: x86 / x86-64 Machine-Code Emitter for JIT Back Ends
//!
//! `jit-x86` turns abstract instructions (a mnemonic plus typed operands)
//! into the exact bytes GNU `as` would produce for them, ready to be copied
//! into executable memory.
//!
//! ## Quick Start
//!
//! ```rust
//! use jit_x86::{encode_one, Mnemonic, Mode, Operand, Register};
//!
//! let code = encode_one(Mode::X86, Mnemonic::Mov, &[Register::ECX.into(), Operand::Immediate(-2)])?;
//! assert_eq!(code, vec![0xB9, 0xFE, 0xFF, 0xFF, 0xFF]);
//! # Ok::<(), jit_x86::EncodeError>(())
//! ```
//!
//! ## Features
//!
//! - **Closed form table**: every supported mnemonic / operand-mode pair is
//!   listed once; anything else is rejected, never guessed.
//! - **Shortest encodings**: the same short forms GNU `as` picks, so output
//!   can be checked byte for byte.
//! - **Labels**: backward branches resolve at emission, forward branches are
//!   patched at [`CodeBuffer::finalize`].
//! - **Atomic emission**: an instruction is either appended whole or not at all.
//! - **`no_std` + `alloc`** core; the differential validator needs `std`.

#![cfg_attr(not(feature = "std"), no_std)]
#![forbid(unsafe_code)]
// ── Pedantic lint policy ─────────────────────────────────────────────────
// An encoder narrows and sign-converts integers between field widths all the
// time and spells opcodes as dense hex literals.
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_lossless,
    clippy::cast_possible_wrap,
    clippy::unreadable_literal,
    clippy::match_same_arms,
    clippy::redundant_closure_for_method_calls,
    clippy::wildcard_imports,
    clippy::enum_glob_use,
    clippy::must_use_candidate,
    clippy::module_name_repetitions,
    clippy::uninlined_format_args,
    clippy::doc_markdown,
    clippy::similar_names,
    clippy::fn_params_excessive_bools,
    clippy::too_many_lines,
    clippy::single_match_else,
    clippy::manual_let_else,
    clippy::unnecessary_wraps,
    clippy::unused_self,
    clippy::many_single_char_names,
    clippy::return_self_not_must_use,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::needless_continue
)]

extern crate alloc;

/// Code buffer, byte sinks, labels and branch patching.
pub mod buffer;
/// Instruction encoder (prefixes, REX, ModR/M, SIB, displacement, immediate).
pub mod encoder;
/// Error types.
pub mod error;
/// Operand model: modes, registers, operands, mnemonics, mode tags.
pub mod ir;
/// The closed instruction form table.
pub mod table;
/// Differential validation against GNU `as`.
#[cfg(feature = "validator")]
pub mod validator;

// Re-exports
pub use buffer::{AppliedRelocation, ByteSink, CodeBuffer, FinishedCode, Recorder, ResourceLimits};
pub use encoder::{BranchFixup, EncodedInstr, Encoder, InstrBytes};
pub use error::EncodeError;
pub use ir::{Cond, Label, Mnemonic, Mode, ModeTag, Operand, OperandKind, RegClass, Register};
pub use table::{is_supported, supported_tags};

use alloc::vec::Vec;

/// Encode a single instruction, inferring its mode tag from the operands.
///
/// Branches to labels cannot be encoded this way; use a [`CodeBuffer`].
///
/// # Errors
///
/// Returns [`EncodeError`] for operands that match no form, violate an
/// architectural constraint, or carry an out-of-range immediate.
///
/// # Examples
///
/// ```rust
/// use jit_x86::{encode_one, Mnemonic, Mode, Register};
///
/// let code = encode_one(Mode::X86_64, Mnemonic::Add, &[Register::RAX.into(), Register::RCX.into()])?;
/// assert_eq!(code, vec![0x48, 0x01, 0xC8]);
/// # Ok::<(), jit_x86::EncodeError>(())
/// ```
pub fn encode_one(mode: Mode, mnemonic: Mnemonic, ops: &[Operand]) -> Result<Vec<u8>, EncodeError> {
    let instr = Encoder::new(mode).encode_ops(mnemonic, ops)?;
    if let Some(fixup) = instr.fixup {
        return Err(EncodeError::UnresolvedLabel {
            label: fixup.label,
            site: fixup.offset,
        });
    }
    Ok(instr.bytes.to_vec())
}
