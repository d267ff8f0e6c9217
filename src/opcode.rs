//! Opcode set and the bytecode buffer it is written into.
//!
//! The original Python emulator keys its dispatch table on opcode *name*, so
//! a discriminant collision between `PUSH_CHAR` and `PUSHI` (both `34`) goes
//! unnoticed there. A Rust `#[repr(u8)] enum` cannot tolerate that collision,
//! so every variant here gets its own stable byte value (REDESIGN FLAG).

use crate::error::LalgError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    Add = 0,
    Sub = 1,
    Multiply = 2,
    Divide = 3,
    Div = 4,
    FAdd = 5,
    FSub = 6,
    FMultiply = 7,
    FDivide = 8,
    Cvr = 9,
    Xchg = 10,
    Not = 11,
    Or = 12,
    Eql = 13,
    Neq = 14,
    Les = 15,
    Lte = 16,
    Gtr = 17,
    Gte = 18,
    Jmp = 19,
    JFalse = 20,
    Pushi = 21,
    Push = 22,
    PushChar = 23,
    Pop = 24,
    PopChar = 25,
    PopRealLit = 26,
    Dump = 27,
    Retrieve = 28,
    PrintI = 29,
    PrintR = 30,
    PrintC = 31,
    PrintB = 32,
    PrintILit = 33,
    PrintStrLit = 34,
    NewLine = 35,
    RetAndPrint = 36,
    ReadInt = 37,
    ReadReal = 38,
    Halt = 39,
    Call = 40,
    Return = 41,
    /// Push a real literal's IEEE-754 bit-pattern immediate as a genuine
    /// `Value::Real`, reinterpreting the bits at push time rather than
    /// leaving a raw int on the stack for later opcodes to guess at. This
    /// keeps arithmetic/relational dispatch uniform (see `DESIGN.md`) while
    /// still carrying the literal across the wire as its IEEE-754 bit
    /// pattern, per the data model.
    PushRealLit = 42,
}

impl Opcode {
    /// Whether this opcode is followed by a 4-byte big-endian immediate.
    pub fn has_immediate(self) -> bool {
        use Opcode::*;
        matches!(
            self,
            Jmp | JFalse
                | Pushi
                | Push
                | PushChar
                | Pop
                | PopChar
                | PopRealLit
                | PrintI
                | PrintR
                | PrintC
                | PrintB
                | PrintILit
                | ReadInt
                | ReadReal
                | Call
                | PushRealLit
        )
    }

    pub fn from_u8(byte: u8) -> Option<Opcode> {
        use Opcode::*;
        Some(match byte {
            0 => Add,
            1 => Sub,
            2 => Multiply,
            3 => Divide,
            4 => Div,
            5 => FAdd,
            6 => FSub,
            7 => FMultiply,
            8 => FDivide,
            9 => Cvr,
            10 => Xchg,
            11 => Not,
            12 => Or,
            13 => Eql,
            14 => Neq,
            15 => Les,
            16 => Lte,
            17 => Gtr,
            18 => Gte,
            19 => Jmp,
            20 => JFalse,
            21 => Pushi,
            22 => Push,
            23 => PushChar,
            24 => Pop,
            25 => PopChar,
            26 => PopRealLit,
            27 => Dump,
            28 => Retrieve,
            29 => PrintI,
            30 => PrintR,
            31 => PrintC,
            32 => PrintB,
            33 => PrintILit,
            34 => PrintStrLit,
            35 => NewLine,
            36 => RetAndPrint,
            37 => ReadInt,
            38 => ReadReal,
            39 => Halt,
            40 => Call,
            41 => Return,
            42 => PushRealLit,
            _ => return None,
        })
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// An opaque reference to a forward-jump placeholder written into the
/// bytecode buffer, to be resolved once the real target is known.
#[derive(Debug, Clone, Copy)]
pub struct Hole {
    ip_of_placeholder: usize,
}

/// The fixed-capacity bytecode buffer the parser writes into and the
/// interpreter later reads from.
pub struct Bytecode {
    bytes: Vec<u8>,
    capacity: usize,
}

impl Bytecode {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn ip(&self) -> usize {
        self.bytes.len()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    fn push_byte(&mut self, b: u8) -> Result<(), LalgError> {
        if self.bytes.len() >= self.capacity {
            return Err(LalgError::runtime(
                "<buffer>",
                format!("Bytecode buffer overflow (capacity {})", self.capacity),
            ));
        }
        self.bytes.push(b);
        Ok(())
    }

    pub fn emit_op(&mut self, op: Opcode) -> Result<usize, LalgError> {
        let at = self.ip();
        self.push_byte(op as u8)?;
        Ok(at)
    }

    /// Emit a 4-byte big-endian immediate, returning the ip at which it was
    /// written (usable as a `Hole` placeholder when `value` is later
    /// overwritten).
    pub fn emit_u32(&mut self, value: u32) -> Result<usize, LalgError> {
        let at = self.ip();
        for b in value.to_be_bytes() {
            self.push_byte(b)?;
        }
        Ok(at)
    }

    pub fn emit_i32(&mut self, value: i32) -> Result<usize, LalgError> {
        self.emit_u32(value as u32)
    }

    pub fn emit_f32_bits(&mut self, value: f32) -> Result<usize, LalgError> {
        self.emit_u32(value.to_bits())
    }

    /// Emit raw bytes (used for `PRINT_STR_LIT` payloads), with no length
    /// prefix of its own — the length was already pushed to the operand
    /// stack by a preceding `PUSHI`.
    pub fn emit_raw(&mut self, data: &[u8]) -> Result<(), LalgError> {
        for &b in data {
            self.push_byte(b)?;
        }
        Ok(())
    }

    /// Emit a forward-jump placeholder (4 zero bytes) and return a `Hole`
    /// that must later be resolved with `patch`.
    pub fn emit_hole(&mut self) -> Result<Hole, LalgError> {
        let at = self.emit_u32(0)?;
        Ok(Hole {
            ip_of_placeholder: at,
        })
    }

    /// Overwrite a previously emitted hole with the real target address.
    pub fn patch(&mut self, hole: Hole, target: usize) {
        let bytes = (target as u32).to_be_bytes();
        let at = hole.ip_of_placeholder;
        self.bytes[at..at + 4].copy_from_slice(&bytes);
    }
}
