//! Code buffer: byte sink, labels, and branch back-patching.

use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use crate::encoder::{EncodedInstr, InstrBytes};
use crate::error::EncodeError;
use crate::ir::Label;

/// Destination for encoded bytes.
///
/// The encoder appends every instruction with exactly one
/// [`ByteSink::append`] call; [`ByteSink::patch`] only ever overwrites
/// bytes inside already-appended branch displacement fields.
pub trait ByteSink {
    /// Number of bytes written so far.
    fn len(&self) -> usize;

    /// Whether nothing has been written.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append one instruction's bytes.
    fn append(&mut self, bytes: &[u8]);

    /// Overwrite `bytes.len()` bytes starting at `offset`.
    fn patch(&mut self, offset: usize, bytes: &[u8]);

    /// Everything written so far.
    fn as_bytes(&self) -> &[u8];
}

impl ByteSink for Vec<u8> {
    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn append(&mut self, bytes: &[u8]) {
        self.extend_from_slice(bytes);
    }

    fn patch(&mut self, offset: usize, bytes: &[u8]) {
        self[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    fn as_bytes(&self) -> &[u8] {
        self
    }
}

/// A sink that also remembers where each instruction starts.
///
/// Used by the differential validator to slice the output back into
/// per-instruction byte strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Recorder {
    bytes: Vec<u8>,
    starts: Vec<usize>,
}

impl Recorder {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded instructions.
    #[must_use]
    pub fn instruction_count(&self) -> usize {
        self.starts.len()
    }

    /// Start offset of every recorded instruction.
    #[must_use]
    pub fn boundaries(&self) -> &[usize] {
        &self.starts
    }

    /// The bytes of each instruction, in emission order.
    pub fn instructions(&self) -> impl Iterator<Item = &[u8]> + '_ {
        self.starts.iter().enumerate().map(move |(i, &start)| {
            let end = self.starts.get(i + 1).copied().unwrap_or(self.bytes.len());
            &self.bytes[start..end]
        })
    }

    /// Consume the recorder and return the bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

impl ByteSink for Recorder {
    fn len(&self) -> usize {
        self.bytes.len()
    }

    fn append(&mut self, bytes: &[u8]) {
        self.starts.push(self.bytes.len());
        self.bytes.extend_from_slice(bytes);
    }

    fn patch(&mut self, offset: usize, bytes: &[u8]) {
        self.bytes[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

// ─── Limits ─────────────────────────────────────────────────

/// Resource limits for a code buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ResourceLimits {
    /// Maximum output size in bytes. Default: 16 MiB.
    pub max_output_bytes: usize,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_output_bytes: 16 * 1024 * 1024,
        }
    }
}

// ─── Relocations ────────────────────────────────────────────

/// A branch displacement that was written into the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AppliedRelocation {
    /// Offset of the displacement field in the output.
    pub offset: usize,
    /// Width of the field in bytes (1 or 4).
    pub size: u8,
    /// Branch target.
    pub label: Label,
    /// Bound offset of the target.
    pub target: usize,
    /// The displacement written: `target - (offset + size)`.
    pub disp: i64,
}

/// Compute and range-check a branch displacement.
fn branch_disp(label: Label, target: usize, site: usize, width: u8) -> Result<i64, EncodeError> {
    let disp = target as i64 - (site as i64 + i64::from(width));
    let max = if width == 1 {
        i64::from(i8::MAX)
    } else {
        i64::from(i32::MAX)
    };
    if disp > max || disp < -max - 1 {
        return Err(EncodeError::BranchOutOfRange { label, disp, max });
    }
    Ok(disp)
}

fn disp_bytes(disp: i64, width: u8) -> InstrBytes {
    if width == 1 {
        InstrBytes::from_slice(&[disp as i8 as u8])
    } else {
        InstrBytes::from_slice(&(disp as i32).to_le_bytes())
    }
}

#[derive(Debug, Clone, Copy)]
struct PendingPatch {
    site: usize,
    width: u8,
    label: Label,
}

// ─── CodeBuffer ─────────────────────────────────────────────

/// An append-only code buffer with labels.
///
/// Backward branches are resolved as they are emitted; forward branches get
/// a zero-filled field and are patched by [`CodeBuffer::finalize`].
///
/// # Examples
///
/// ```
/// use jit_x86::{CodeBuffer, Encoder, Mnemonic, Mode};
///
/// let enc = Encoder::new(Mode::X86_64);
/// let mut buf = CodeBuffer::new();
/// let done = buf.new_label();
/// enc.emit_ops(&mut buf, Mnemonic::JmpShort, &[done.into()])?;
/// enc.emit_ops(&mut buf, Mnemonic::Int3, &[])?;
/// buf.bind_label(done)?;
/// enc.emit_ops(&mut buf, Mnemonic::Ret, &[])?;
/// let code = buf.finalize()?;
/// assert_eq!(code.bytes(), &[0xEB, 0x01, 0xCC, 0xC3]);
/// # Ok::<(), jit_x86::EncodeError>(())
/// ```
#[derive(Debug, Clone)]
pub struct CodeBuffer<S: ByteSink = Vec<u8>> {
    sink: S,
    labels: Vec<Option<usize>>,
    pending: Vec<PendingPatch>,
    relocations: Vec<AppliedRelocation>,
    limits: ResourceLimits,
}

impl CodeBuffer<Vec<u8>> {
    /// Create a buffer backed by a `Vec<u8>`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_sink(Vec::new())
    }
}

impl Default for CodeBuffer<Vec<u8>> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: ByteSink> CodeBuffer<S> {
    /// Create a buffer writing into `sink`.
    pub fn with_sink(sink: S) -> Self {
        Self {
            sink,
            labels: Vec::new(),
            pending: Vec::new(),
            relocations: Vec::new(),
            limits: ResourceLimits::default(),
        }
    }

    /// Replace the resource limits.
    #[must_use]
    pub fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }

    /// The active resource limits.
    pub fn limits(&self) -> &ResourceLimits {
        &self.limits
    }

    /// Create a fresh, unbound label.
    pub fn new_label(&mut self) -> Label {
        let label = Label::from_index(self.labels.len() as u32);
        self.labels.push(None);
        label
    }

    /// Bind `label` to the current position.
    ///
    /// # Errors
    ///
    /// [`EncodeError::DuplicateLabel`] if it is already bound,
    /// [`EncodeError::UnknownLabel`] if this buffer did not create it.
    pub fn bind_label(&mut self, label: Label) -> Result<(), EncodeError> {
        let position = self.sink.len();
        let slot = self
            .labels
            .get_mut(label.index())
            .ok_or(EncodeError::UnknownLabel { label })?;
        if let Some(first_offset) = *slot {
            return Err(EncodeError::DuplicateLabel {
                label,
                first_offset,
            });
        }
        *slot = Some(position);
        log::trace!("bind {} at {:#x}", label, position);
        Ok(())
    }

    /// Offset a label is bound to, if any.
    pub fn label_offset(&self, label: Label) -> Option<usize> {
        self.labels.get(label.index()).copied().flatten()
    }

    /// Current write position.
    pub fn position(&self) -> usize {
        self.sink.len()
    }

    /// The bytes written so far. Forward branch fields still read as zero.
    pub fn bytes(&self) -> &[u8] {
        self.sink.as_bytes()
    }

    /// The underlying sink.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Number of branch fields still waiting for their label.
    pub fn pending_patches(&self) -> usize {
        self.pending.len()
    }

    /// Append one encoded instruction, resolving its branch now if the
    /// target is already bound.
    ///
    /// # Errors
    ///
    /// [`EncodeError::ResourceLimitExceeded`] when the output limit would be
    /// passed, [`EncodeError::UnknownLabel`] for a foreign label and
    /// [`EncodeError::BranchOutOfRange`] for a backward short branch that
    /// cannot reach. Nothing is written on error.
    pub fn append_instr(&mut self, instr: &EncodedInstr) -> Result<(), EncodeError> {
        let start = self.sink.len();
        if start + instr.bytes.len() > self.limits.max_output_bytes {
            return Err(EncodeError::ResourceLimitExceeded {
                resource: String::from("output bytes"),
                limit: self.limits.max_output_bytes,
            });
        }
        let Some(fixup) = instr.fixup else {
            self.sink.append(&instr.bytes);
            return Ok(());
        };

        let label = fixup.label;
        let target = *self
            .labels
            .get(label.index())
            .ok_or(EncodeError::UnknownLabel { label })?;
        let site = start + fixup.offset;
        match target {
            Some(target) => {
                let disp = branch_disp(label, target, site, fixup.width)?;
                let mut bytes = instr.bytes;
                let field = disp_bytes(disp, fixup.width);
                bytes[fixup.offset..fixup.offset + field.len()].copy_from_slice(&field);
                self.sink.append(&bytes);
                self.relocations.push(AppliedRelocation {
                    offset: site,
                    size: fixup.width,
                    label,
                    target,
                    disp,
                });
            }
            None => {
                self.sink.append(&instr.bytes);
                self.pending.push(PendingPatch {
                    site,
                    width: fixup.width,
                    label,
                });
            }
        }
        Ok(())
    }

    /// Resolve every pending branch and hand over the code.
    ///
    /// # Errors
    ///
    /// [`EncodeError::UnresolvedLabel`] for a branch to a label never bound,
    /// [`EncodeError::UnboundLabel`] for an unused label never bound and
    /// [`EncodeError::BranchOutOfRange`] for a short branch that cannot
    /// reach. Several failures are reported together as
    /// [`EncodeError::Multiple`].
    pub fn finalize(mut self) -> Result<FinishedCode<S>, EncodeError> {
        let mut errors = Vec::new();
        let mut referenced = vec![false; self.labels.len()];
        for patch in core::mem::take(&mut self.pending) {
            let Some(target) = self.label_offset(patch.label) else {
                referenced[patch.label.index()] = true;
                errors.push(EncodeError::UnresolvedLabel {
                    label: patch.label,
                    site: patch.site,
                });
                continue;
            };
            match branch_disp(patch.label, target, patch.site, patch.width) {
                Ok(disp) => {
                    self.sink.patch(patch.site, &disp_bytes(disp, patch.width));
                    log::trace!(
                        "patch {:#x} -> {} ({:+})",
                        patch.site,
                        patch.label,
                        disp
                    );
                    self.relocations.push(AppliedRelocation {
                        offset: patch.site,
                        size: patch.width,
                        label: patch.label,
                        target,
                        disp,
                    });
                }
                Err(e) => errors.push(e),
            }
        }
        for (index, slot) in self.labels.iter().enumerate() {
            if slot.is_none() && !referenced[index] {
                errors.push(EncodeError::UnboundLabel {
                    label: Label::from_index(index as u32),
                });
            }
        }
        log::debug!(
            "finalize: {} bytes, {} labels, {} relocations, {} errors",
            self.sink.len(),
            self.labels.len(),
            self.relocations.len(),
            errors.len()
        );
        match errors.len() {
            0 => {}
            1 => return Err(errors.swap_remove(0)),
            _ => return Err(EncodeError::Multiple { errors }),
        }
        self.relocations.sort_by_key(|r| r.offset);
        Ok(FinishedCode {
            sink: self.sink,
            labels: self.labels,
            relocations: self.relocations,
        })
    }
}

// ─── FinishedCode ───────────────────────────────────────────

/// Fully resolved code, ready to be copied into executable memory.
#[derive(Debug, Clone)]
#[must_use]
pub struct FinishedCode<S: ByteSink = Vec<u8>> {
    sink: S,
    labels: Vec<Option<usize>>,
    relocations: Vec<AppliedRelocation>,
}

impl<S: ByteSink> FinishedCode<S> {
    /// The machine code.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        self.sink.as_bytes()
    }

    /// Code size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sink.len()
    }

    /// Whether no code was emitted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sink.is_empty()
    }

    /// Offset of `label`, if it was bound.
    #[must_use]
    pub fn label_offset(&self, label: Label) -> Option<usize> {
        self.labels.get(label.index()).copied().flatten()
    }

    /// Bound labels with their offsets.
    pub fn labels(&self) -> impl Iterator<Item = (Label, usize)> + '_ {
        self.labels
            .iter()
            .enumerate()
            .filter_map(|(i, off)| off.map(|o| (Label::from_index(i as u32), o)))
    }

    /// Every branch displacement written, ordered by offset.
    #[must_use]
    pub fn relocations(&self) -> &[AppliedRelocation] {
        &self.relocations
    }

    /// The sink.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Consume and return the sink.
    pub fn into_sink(self) -> S {
        self.sink
    }
}

impl FinishedCode<Vec<u8>> {
    /// Consume and return the bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.sink
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::{BranchFixup, Encoder};
    use crate::ir::{Cond, Mnemonic, Mode};

    fn emit(buf: &mut CodeBuffer, mnemonic: Mnemonic, ops: &[crate::Operand]) {
        Encoder::new(Mode::X86)
            .emit_ops(buf, mnemonic, ops)
            .unwrap_or_else(|e| panic!("{mnemonic}: {e}"));
    }

    #[test]
    fn forward_jump_is_patched_at_finalize() {
        let mut buf = CodeBuffer::new();
        let l = buf.new_label();
        emit(&mut buf, Mnemonic::Jmp, &[l.into()]);
        assert_eq!(buf.bytes(), &[0xE9, 0, 0, 0, 0]);
        assert_eq!(buf.pending_patches(), 1);
        emit(&mut buf, Mnemonic::Nop, &[]);
        buf.bind_label(l).unwrap();
        let code = buf.finalize().unwrap();
        assert_eq!(code.bytes(), &[0xE9, 0x01, 0, 0, 0, 0x90]);
        assert_eq!(
            code.relocations(),
            &[AppliedRelocation {
                offset: 1,
                size: 4,
                label: l,
                target: 6,
                disp: 1
            }]
        );
    }

    #[test]
    fn backward_jump_is_resolved_immediately() {
        let mut buf = CodeBuffer::new();
        let top = buf.new_label();
        buf.bind_label(top).unwrap();
        emit(&mut buf, Mnemonic::Nop, &[]);
        emit(&mut buf, Mnemonic::JShort(Cond::Ne), &[top.into()]);
        assert_eq!(buf.bytes(), &[0x90, 0x75, 0xFD]);
        assert_eq!(buf.pending_patches(), 0);
        emit(&mut buf, Mnemonic::J(Cond::E), &[top.into()]);
        assert_eq!(&buf.bytes()[3..], &[0x0F, 0x84, 0xF7, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn backward_short_branch_out_of_range_appends_nothing() {
        let mut buf = CodeBuffer::new();
        let top = buf.new_label();
        buf.bind_label(top).unwrap();
        for _ in 0..200 {
            emit(&mut buf, Mnemonic::Nop, &[]);
        }
        let before = buf.position();
        let e = Encoder::new(Mode::X86)
            .emit_ops(&mut buf, Mnemonic::JmpShort, &[top.into()])
            .unwrap_err();
        assert!(matches!(e, EncodeError::BranchOutOfRange { max: 127, .. }));
        assert_eq!(buf.position(), before);
    }

    #[test]
    fn forward_short_branch_out_of_range_fails_finalize() {
        let mut buf = CodeBuffer::new();
        let far = buf.new_label();
        emit(&mut buf, Mnemonic::JmpShort, &[far.into()]);
        for _ in 0..128 {
            emit(&mut buf, Mnemonic::Nop, &[]);
        }
        buf.bind_label(far).unwrap();
        let e = buf.finalize().unwrap_err();
        assert_eq!(
            e,
            EncodeError::BranchOutOfRange {
                label: far,
                disp: 128,
                max: 127
            }
        );
    }

    #[test]
    fn short_branch_at_exact_limit() {
        let mut buf = CodeBuffer::new();
        let far = buf.new_label();
        emit(&mut buf, Mnemonic::JmpShort, &[far.into()]);
        for _ in 0..127 {
            emit(&mut buf, Mnemonic::Nop, &[]);
        }
        buf.bind_label(far).unwrap();
        let code = buf.finalize().unwrap();
        assert_eq!(&code.bytes()[..2], &[0xEB, 0x7F]);
    }

    #[test]
    fn unbound_labels_are_reported() {
        let mut buf = CodeBuffer::new();
        let a = buf.new_label();
        let b = buf.new_label();
        emit(&mut buf, Mnemonic::Jmp, &[a.into()]);
        assert_eq!(
            buf.clone().finalize().unwrap_err(),
            EncodeError::Multiple {
                errors: vec![
                    EncodeError::UnresolvedLabel { label: a, site: 1 },
                    EncodeError::UnboundLabel { label: b },
                ]
            }
        );
        emit(&mut buf, Mnemonic::Call, &[b.into()]);
        match buf.finalize().unwrap_err() {
            EncodeError::Multiple { errors } => assert_eq!(errors.len(), 2),
            other => panic!("unexpected {other}"),
        }
    }

    #[test]
    fn label_binding_errors() {
        let mut buf = CodeBuffer::new();
        let l = buf.new_label();
        buf.bind_label(l).unwrap();
        assert_eq!(
            buf.bind_label(l),
            Err(EncodeError::DuplicateLabel {
                label: l,
                first_offset: 0
            })
        );
        let foreign = Label::from_index(42);
        assert_eq!(
            buf.bind_label(foreign),
            Err(EncodeError::UnknownLabel { label: foreign })
        );
        let instr = EncodedInstr {
            bytes: InstrBytes::from_slice(&[0xE9, 0, 0, 0, 0]),
            fixup: Some(BranchFixup {
                offset: 1,
                width: 4,
                label: foreign,
            }),
        };
        assert!(matches!(
            buf.append_instr(&instr),
            Err(EncodeError::UnknownLabel { .. })
        ));
        assert_eq!(buf.position(), 0);
    }

    #[test]
    fn label_used_many_times() {
        let mut buf = CodeBuffer::new();
        let l = buf.new_label();
        emit(&mut buf, Mnemonic::Jmp, &[l.into()]);
        emit(&mut buf, Mnemonic::JShort(Cond::L), &[l.into()]);
        buf.bind_label(l).unwrap();
        emit(&mut buf, Mnemonic::Call, &[l.into()]);
        let code = buf.finalize().unwrap();
        assert_eq!(
            code.bytes(),
            &[0xE9, 0x02, 0, 0, 0, 0x7C, 0x00, 0xE8, 0xFB, 0xFF, 0xFF, 0xFF]
        );
        assert_eq!(code.relocations().len(), 3);
        assert_eq!(code.label_offset(l), Some(7));
        assert_eq!(code.labels().collect::<Vec<_>>(), vec![(l, 7)]);
    }

    #[test]
    fn output_limit() {
        let limits = ResourceLimits {
            max_output_bytes: 2,
        };
        let mut buf = CodeBuffer::new().with_limits(limits);
        emit(&mut buf, Mnemonic::Nop, &[]);
        emit(&mut buf, Mnemonic::Nop, &[]);
        let e = Encoder::new(Mode::X86)
            .emit_ops(&mut buf, Mnemonic::Nop, &[])
            .unwrap_err();
        assert!(matches!(e, EncodeError::ResourceLimitExceeded { limit: 2, .. }));
        assert_eq!(buf.position(), 2);
    }

    #[test]
    fn recorder_tracks_boundaries() {
        let mut buf = CodeBuffer::with_sink(Recorder::new());
        let enc = Encoder::new(Mode::X86);
        let l = buf.new_label();
        enc.emit_ops(&mut buf, Mnemonic::Nop, &[]).unwrap();
        enc.emit_ops(&mut buf, Mnemonic::Jmp, &[l.into()]).unwrap();
        buf.bind_label(l).unwrap();
        enc.emit_ops(&mut buf, Mnemonic::Ret, &[]).unwrap();
        let rec = buf.finalize().unwrap().into_sink();
        assert_eq!(rec.boundaries(), &[0, 1, 6]);
        let parts: Vec<&[u8]> = rec.instructions().collect();
        assert_eq!(parts, vec![&[0x90][..], &[0xE9, 0, 0, 0, 0][..], &[0xC3][..]]);
    }
}
