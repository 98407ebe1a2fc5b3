#![no_main]
use jit_x86::{CodeBuffer, Encoder, Label, Mnemonic, Mode, Operand, RegClass, Register};
use libfuzzer_sys::fuzz_target;

const CLASSES: [RegClass; 5] = [
    RegClass::Byte,
    RegClass::Word,
    RegClass::Dword,
    RegClass::Qword,
    RegClass::Xmm,
];

/// Pulls fixed-size values off the front of the fuzz input.
struct Input<'a>(&'a [u8]);

impl Input<'_> {
    fn byte(&mut self) -> Option<u8> {
        let (&b, rest) = self.0.split_first()?;
        self.0 = rest;
        Some(b)
    }

    fn i32(&mut self) -> Option<i32> {
        let bytes = self.0.get(..4)?;
        let v = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        self.0 = &self.0[4..];
        Some(v)
    }

    fn i64(&mut self) -> Option<i64> {
        let lo = self.i32()?;
        let hi = self.i32()?;
        Some((i64::from(hi) << 32) | i64::from(lo as u32))
    }

    fn register(&mut self) -> Option<Register> {
        let b = self.byte()?;
        Some(Register::new(b & 15, CLASSES[usize::from(b >> 4) % CLASSES.len()]))
    }

    fn operand(&mut self, labels: &[Label]) -> Option<Operand> {
        Some(match self.byte()? % 8 {
            0 => Operand::Register(self.register()?),
            1 => Operand::StackSlot(self.i32()?),
            2 => Operand::StackArg(self.i32()?),
            3 => Operand::mem(self.register()?, self.i32()?),
            4 => {
                let base = self.register()?;
                let index = self.register()?;
                Operand::array(base, index, self.byte()? % 5, self.i32()?)
            }
            5 => Operand::Immediate(self.i64()?),
            6 => Operand::ImmediateAddress(self.i64()?),
            _ => Operand::RelativeLabel(labels[usize::from(self.byte()?) % labels.len()]),
        })
    }
}

fuzz_target!(|data: &[u8]| {
    let mut input = Input(data);
    let Some(flags) = input.byte() else { return };
    let mode = if flags & 1 == 0 { Mode::X86 } else { Mode::X86_64 };
    let encoder = Encoder::new(mode);
    let mnemonics: Vec<Mnemonic> = Mnemonic::all().collect();

    // Must never panic, only return Ok/Err; failed emission appends nothing.
    let mut buf = CodeBuffer::new();
    let labels = [buf.new_label(), buf.new_label(), buf.new_label(), buf.new_label()];
    while let Some(op) = input.byte() {
        if op == 0xFF {
            let _ = buf.bind_label(labels[usize::from(input.byte().unwrap_or(0)) % labels.len()]);
            continue;
        }
        let mnemonic = mnemonics[usize::from(op) % mnemonics.len()];
        let count = input.byte().map_or(0, |b| usize::from(b % 4));
        let mut ops = Vec::with_capacity(count);
        for _ in 0..count {
            match input.operand(&labels) {
                Some(o) => ops.push(o),
                None => break,
            }
        }
        let before = buf.position();
        match encoder.emit_ops(&mut buf, mnemonic, &ops) {
            Ok(()) => assert!(buf.position() > before && buf.position() - before <= 15),
            Err(_) => assert_eq!(buf.position(), before),
        }
    }
    let _ = buf.finalize();
});
