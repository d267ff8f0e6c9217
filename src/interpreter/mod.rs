//! Stack-based bytecode interpreter.
//!
//! Fetches one opcode byte at a time from the buffer the parser produced,
//! decodes its immediate (if any), and dispatches iteratively — never
//! recursively, per spec's "interpreter MUST use an iterative dispatch loop"
//! resource-model note. State is four pieces: `ip`, an operand stack of
//! tagged [`Value`]s, a sparse `dp -> Value` data store, and an output
//! buffer that is only flushed to the caller on `HALT` or on error.

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::io::BufRead;

use crate::error::LalgError;
use crate::opcode::Opcode;

/// A value living on the operand stack or in the data store.
///
/// The source stores raw numbers and lets operator choice imply the type;
/// that is unsound the moment a `REAL_LIT`'s bit pattern is pushed as an
/// integer and later read back as a float (spec's "Stack value tagging"
/// design note). Tagging every value here sidesteps the problem outright,
/// at the cost of an explicit `bits_to_float`/`float_to_bits` boundary where
/// the wire format still carries raw bits (`PushRealLit`, `PopRealLit`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Int(i32),
    Real(f32),
    Char(char),
    Bool(bool),
}

impl Value {
    fn as_int(self, op: Opcode) -> Result<i32, LalgError> {
        match self {
            Value::Int(v) => Ok(v),
            other => Err(type_error(op, "integer", other)),
        }
    }

    fn as_real(self, op: Opcode) -> Result<f32, LalgError> {
        match self {
            Value::Real(v) => Ok(v),
            Value::Int(v) => Ok(v as f32),
            other => Err(type_error(op, "real", other)),
        }
    }

    fn as_char(self, op: Opcode) -> Result<char, LalgError> {
        match self {
            Value::Char(v) => Ok(v),
            other => Err(type_error(op, "char", other)),
        }
    }

    fn as_bool(self, op: Opcode) -> Result<bool, LalgError> {
        match self {
            Value::Bool(v) => Ok(v),
            Value::Int(1) => Ok(true),
            Value::Int(0) => Ok(false),
            other => Err(type_error(op, "boolean", other)),
        }
    }

    /// Formats a value the way `PRINT_I`/`PRINT_R`/`PRINT_C`/`RET_AND_PRINT`
    /// do: by its own runtime tag, since none of those opcodes carry
    /// independent type information of their own.
    fn display(self) -> String {
        match self {
            Value::Int(v) => v.to_string(),
            Value::Real(v) => v.to_string(),
            Value::Char(v) => v.to_string(),
            Value::Bool(v) => v.to_string(),
        }
    }

    /// `PRINT_B`'s "1 -> true, else false" rule (spec §4.4), tolerant of a
    /// boolean variable having last been assigned from a `TRUE`/`FALSE`
    /// literal (which pushes a bare `Int`) rather than a comparison (which
    /// pushes a genuine `Bool`).
    fn display_as_bool(self) -> &'static str {
        match self {
            Value::Bool(true) | Value::Int(1) => "true",
            _ => "false",
        }
    }
}

fn type_error(op: Opcode, expected: &str, found: Value) -> LalgError {
    LalgError::runtime(op.to_string(), format!("Expected a {expected} value, found {found:?}"))
}

/// What came out of running a program to completion or to a fatal error.
///
/// `output` holds whatever had been printed before `result` was decided —
/// on success that is the program's entire stdout; on failure it is
/// whatever was buffered before the offending instruction, per spec §7's
/// "flushing any interpreter output buffered so far" policy.
pub struct RunOutcome {
    pub output: String,
    pub result: Result<(), LalgError>,
}

/// Run a compiled program to completion.
///
/// `input` backs `READ_INT`/`READ_REAL`: each reads and consumes one line.
pub fn run<R: BufRead>(bytecode: &[u8], input: R) -> RunOutcome {
    let mut vm = Vm {
        bytecode,
        ip: 0,
        stack: Vec::new(),
        data: HashMap::new(),
        call_stack: Vec::new(),
        output: String::new(),
        input,
    };
    let result = vm.execute();
    RunOutcome {
        output: vm.output,
        result,
    }
}

struct Vm<'a, R: BufRead> {
    bytecode: &'a [u8],
    ip: usize,
    stack: Vec<Value>,
    data: HashMap<usize, Value>,
    call_stack: Vec<usize>,
    output: String,
    input: R,
}

impl<'a, R: BufRead> Vm<'a, R> {
    fn execute(&mut self) -> Result<(), LalgError> {
        loop {
            let op = self.fetch_op()?;
            if op == Opcode::Halt {
                return Ok(());
            }
            self.dispatch(op)?;
        }
    }

    fn fetch_op(&mut self) -> Result<Opcode, LalgError> {
        let byte = *self.bytecode.get(self.ip).ok_or_else(|| {
            LalgError::runtime("<ip>", "Instruction pointer ran past the end of the bytecode buffer")
        })?;
        self.ip += 1;
        Opcode::from_u8(byte).ok_or_else(|| {
            LalgError::runtime(byte.to_string(), format!("Operation {byte} is not supported"))
        })
    }

    fn fetch_u32(&mut self) -> Result<u32, LalgError> {
        let bytes = self
            .bytecode
            .get(self.ip..self.ip + 4)
            .ok_or_else(|| LalgError::runtime("<immediate>", "Truncated immediate at end of bytecode"))?;
        self.ip += 4;
        Ok(u32::from_be_bytes(bytes.try_into().unwrap()))
    }

    fn fetch_i32(&mut self) -> Result<i32, LalgError> {
        Ok(self.fetch_u32()? as i32)
    }

    fn fetch_dp(&mut self) -> Result<usize, LalgError> {
        Ok(self.fetch_u32()? as usize)
    }

    fn pop(&mut self, op: Opcode) -> Result<Value, LalgError> {
        self.stack
            .pop()
            .ok_or_else(|| LalgError::runtime(op.to_string(), "Operand stack underflow"))
    }

    fn load(&self, dp: usize) -> Value {
        self.data.get(&dp).copied().unwrap_or(Value::Int(0))
    }

    fn dispatch(&mut self, op: Opcode) -> Result<(), LalgError> {
        use Opcode::*;
        match op {
            Add | Sub | Multiply => {
                let right = self.pop(op)?.as_int(op)?;
                let left = self.pop(op)?.as_int(op)?;
                let result = match op {
                    Add => left.wrapping_add(right),
                    Sub => left.wrapping_sub(right),
                    Multiply => left.wrapping_mul(right),
                    _ => unreachable!(),
                };
                self.stack.push(Value::Int(result));
            }
            Divide => {
                let right = self.pop(op)?.as_int(op)?;
                let left = self.pop(op)?.as_int(op)?;
                if right == 0 {
                    return Err(LalgError::runtime(op.to_string(), "Division by zero"));
                }
                self.stack.push(Value::Real(left as f32 / right as f32));
            }
            Div => {
                let right = self.pop(op)?.as_int(op)?;
                let left = self.pop(op)?.as_int(op)?;
                if right == 0 {
                    return Err(LalgError::runtime(op.to_string(), "Division by zero"));
                }
                self.stack.push(Value::Int(left / right));
            }
            FAdd | FSub | FMultiply | FDivide => {
                let right = self.pop(op)?.as_real(op)?;
                let left = self.pop(op)?.as_real(op)?;
                let result = match op {
                    FAdd => left + right,
                    FSub => left - right,
                    FMultiply => left * right,
                    FDivide => {
                        if right == 0.0 {
                            return Err(LalgError::runtime(op.to_string(), "Division by zero"));
                        }
                        left / right
                    }
                    _ => unreachable!(),
                };
                self.stack.push(Value::Real(result));
            }
            Cvr => {
                let top = self.pop(op)?.as_real(op)?;
                self.stack.push(Value::Real(top));
            }
            Xchg => {
                let len = self.stack.len();
                if len < 2 {
                    return Err(LalgError::runtime(op.to_string(), "Operand stack underflow"));
                }
                self.stack.swap(len - 1, len - 2);
            }
            Not => {
                let v = self.pop(op)?.as_bool(op)?;
                self.stack.push(Value::Bool(!v));
            }
            Or => {
                let right = self.pop(op)?.as_bool(op)?;
                let left = self.pop(op)?.as_bool(op)?;
                self.stack.push(Value::Bool(left || right));
            }
            Eql | Neq | Les | Lte | Gtr | Gte => {
                let right = self.pop(op)?;
                let left = self.pop(op)?;
                let result = compare(op, left, right)?;
                self.stack.push(Value::Bool(result));
            }
            Jmp => {
                let target = self.fetch_u32()? as usize;
                self.ip = target;
            }
            JFalse => {
                let cond = self.pop(op)?.as_bool(op)?;
                if cond {
                    self.fetch_u32()?; // skip over the immediate, per spec
                } else {
                    let target = self.fetch_u32()? as usize;
                    self.ip = target;
                }
            }
            Pushi => {
                let imm = self.fetch_i32()?;
                self.stack.push(Value::Int(imm));
            }
            Push => {
                let dp = self.fetch_dp()?;
                self.stack.push(self.load(dp));
            }
            PushChar => {
                let imm = self.fetch_u32()?;
                let c = char::from_u32(imm).unwrap_or('\0');
                self.stack.push(Value::Char(c));
            }
            PushRealLit => {
                let bits = self.fetch_u32()?;
                self.stack.push(Value::Real(f32::from_bits(bits)));
            }
            Pop => {
                let dp = self.fetch_dp()?;
                let v = self.pop(op)?;
                self.data.insert(dp, v);
            }
            PopChar => {
                let dp = self.fetch_dp()?;
                let v = self.pop(op)?.as_char(op)?;
                self.data.insert(dp, Value::Char(v));
            }
            PopRealLit => {
                let dp = self.fetch_dp()?;
                let v = self.pop(op)?.as_real(op)?;
                self.data.insert(dp, Value::Real(round_to_2_decimals(v)));
            }
            Dump => {
                let value = self.pop(op)?;
                let addr = self.pop(op)?.as_int(op)? as usize;
                self.data.insert(addr, value);
            }
            Retrieve => {
                let addr = self.pop(op)?.as_int(op)? as usize;
                self.stack.push(self.load(addr));
            }
            PrintI | PrintR | PrintC => {
                let dp = self.fetch_dp()?;
                self.output.push_str(&self.load(dp).display());
            }
            PrintB => {
                let dp = self.fetch_dp()?;
                self.output.push_str(self.load(dp).display_as_bool());
            }
            PrintILit => {
                let imm = self.fetch_i32()?;
                self.output.push_str(&imm.to_string());
            }
            PrintStrLit => {
                let len = self.pop(op)?.as_int(op)? as usize;
                let bytes = self
                    .bytecode
                    .get(self.ip..self.ip + len)
                    .ok_or_else(|| LalgError::runtime(op.to_string(), "Truncated string literal payload"))?;
                self.output.push_str(&bytes.iter().map(|&b| b as char).collect::<String>());
                self.ip += len;
            }
            NewLine => self.output.push('\n'),
            RetAndPrint => {
                let addr = self.pop(op)?.as_int(op)? as usize;
                self.output.push_str(&self.load(addr).display());
            }
            ReadInt => {
                let dp = self.fetch_dp()?;
                let v = self.read_line_as::<i32>(op)?;
                self.data.insert(dp, Value::Int(v));
            }
            ReadReal => {
                let dp = self.fetch_dp()?;
                let v = self.read_line_as::<f32>(op)?;
                self.data.insert(dp, Value::Real(v));
            }
            Call => {
                let target = self.fetch_u32()? as usize;
                self.call_stack.push(self.ip);
                self.ip = target;
            }
            Return => {
                let addr = self
                    .call_stack
                    .pop()
                    .ok_or_else(|| LalgError::runtime(op.to_string(), "Return with an empty call stack"))?;
                self.ip = addr;
            }
            Halt => unreachable!("handled in execute()"),
        }
        Ok(())
    }

    fn read_line_as<T: std::str::FromStr>(&mut self, op: Opcode) -> Result<T, LalgError> {
        let mut line = String::new();
        self.input
            .read_line(&mut line)
            .map_err(|e| LalgError::runtime(op.to_string(), format!("Failed to read input: {e}")))?;
        line.trim()
            .parse::<T>()
            .map_err(|_| LalgError::runtime(op.to_string(), format!("Could not parse input {line:?} as a number")))
    }
}

fn compare(op: Opcode, left: Value, right: Value) -> Result<bool, LalgError> {
    use Opcode::*;
    let ordering = match (left, right) {
        (Value::Int(a), Value::Int(b)) => a.cmp(&b),
        (Value::Char(a), Value::Char(b)) => a.cmp(&b),
        (Value::Real(a), Value::Real(b)) => a
            .partial_cmp(&b)
            .ok_or_else(|| LalgError::runtime(op.to_string(), "Comparison with NaN"))?,
        (Value::Bool(a), Value::Bool(b)) => a.cmp(&b),
        (a, b) => {
            return Err(LalgError::runtime(
                op.to_string(),
                format!("Cannot compare {a:?} with {b:?}"),
            ))
        }
    };
    Ok(match op {
        // Opcode names are the inverse of their lexical operator (spec
        // §4.3.1's comparison table) because the stack machine evaluates
        // and pops right-then-left; the *semantics* below match the
        // lexical operator that emitted each opcode.
        Gtr => ordering.is_lt(),
        Gte => ordering.is_le(),
        Les => ordering.is_gt(),
        Lte => ordering.is_ge(),
        Eql => ordering.is_eq(),
        Neq => ordering.is_ne(),
        _ => unreachable!(),
    })
}

fn round_to_2_decimals(v: f32) -> f32 {
    (v * 100.0).round() / 100.0
}
