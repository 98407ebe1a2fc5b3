//! Error types for instruction encoding and label resolution.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use crate::ir::{Label, Mnemonic, Mode, ModeTag};

/// Encoding error surfaced to the JIT back end.
///
/// Every variant is fatal for the instruction sequence being compiled; the
/// encoder never truncates, wraps, or retries.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EncodeError {
    /// An operand violates an architectural constraint of the form.
    InvalidOperands {
        /// The mnemonic being encoded.
        mnemonic: Mnemonic,
        /// Description of why the operands are invalid.
        detail: String,
    },

    /// Immediate value exceeds the range of the field it is encoded into.
    ImmediateOverflow {
        /// The immediate value that overflowed.
        value: i64,
        /// Minimum allowed value.
        min: i64,
        /// Maximum allowed value.
        max: i64,
    },

    /// No table entry for this mnemonic / operand-mode combination.
    UnsupportedForm {
        /// The mnemonic that was requested.
        mnemonic: Mnemonic,
        /// The operand-mode tag that was requested.
        tag: ModeTag,
        /// The target mode.
        mode: Mode,
    },

    /// A branch refers to a label that was never bound.
    UnresolvedLabel {
        /// The unbound label.
        label: Label,
        /// Buffer offset of the displacement field waiting for it.
        site: usize,
    },

    /// A label was created but never bound, and no branch refers to it.
    UnboundLabel {
        /// The label.
        label: Label,
    },

    /// A label was bound more than once.
    DuplicateLabel {
        /// The label.
        label: Label,
        /// Offset of the first binding.
        first_offset: usize,
    },

    /// A label that this buffer never created.
    UnknownLabel {
        /// The foreign label.
        label: Label,
    },

    /// A short branch target is out of reach of its 8-bit displacement.
    BranchOutOfRange {
        /// The target label.
        label: Label,
        /// The actual displacement to the target.
        disp: i64,
        /// Maximum allowed displacement magnitude.
        max: i64,
    },

    /// A configurable resource limit was exceeded.
    ResourceLimitExceeded {
        /// Human-readable name of the resource.
        resource: String,
        /// The configured limit.
        limit: usize,
    },

    /// Multiple errors collected while finalizing a buffer.
    Multiple {
        /// The collected errors.
        errors: Vec<EncodeError>,
    },
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodeError::InvalidOperands { mnemonic, detail } => {
                write!(f, "invalid operands for '{}': {}", mnemonic, detail)
            }
            EncodeError::ImmediateOverflow { value, min, max } => {
                write!(f, "immediate value {} out of range [{}..{}]", value, min, max)
            }
            EncodeError::UnsupportedForm {
                mnemonic,
                tag,
                mode,
            } if tag.letters().is_empty() => {
                write!(f, "unsupported instruction form '{}' for {}", mnemonic, mode)
            }
            EncodeError::UnsupportedForm {
                mnemonic,
                tag,
                mode,
            } => {
                write!(
                    f,
                    "unsupported instruction form '{}_{}' for {}",
                    mnemonic, tag, mode
                )
            }
            EncodeError::UnresolvedLabel { label, site } => {
                write!(
                    f,
                    "unresolved label {} (referenced at offset {:#x})",
                    label, site
                )
            }
            EncodeError::UnboundLabel { label } => {
                write!(f, "label {} was created but never bound", label)
            }
            EncodeError::DuplicateLabel {
                label,
                first_offset,
            } => {
                write!(
                    f,
                    "label {} bound twice (first bound at offset {:#x})",
                    label, first_offset
                )
            }
            EncodeError::UnknownLabel { label } => {
                write!(f, "label {} was not created by this buffer", label)
            }
            EncodeError::BranchOutOfRange { label, disp, max } => {
                write!(
                    f,
                    "branch target {} out of range (displacement={}, max=±{})",
                    label, disp, max
                )
            }
            EncodeError::ResourceLimitExceeded { resource, limit } => {
                write!(
                    f,
                    "resource limit exceeded: {} (limit: {})",
                    resource, limit
                )
            }
            EncodeError::Multiple { errors } => {
                for (i, e) in errors.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{}", e)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for EncodeError {}
