//! Binary wire format for programs.
//!
//! A program is a varint instruction count followed by one record per
//! instruction: `(operation_tag:varint, operation_payload, inout_count:varint,
//! inouts:[varint])`. Payloads are variant-specific: LEB128 varints (zigzag
//! for signed values), IEEE-754 bit patterns for floats, and length-prefixed
//! UTF-8 for strings.
//!
//! The format makes no promise of compatibility between differing operation
//! catalogs. Builder-lifetime signatures on function definitions are
//! deliberately dropped: they describe type state of the producing fuzzer
//! instance, not the program.

use super::{
    code::Code,
    instruction::Instruction,
    operation::{BinaryOperator, Comparator, Operation, RegExpFlags, UnaryOperator},
    program::Program,
    variable::Variable,
};
use crate::errors::WireError;

impl Program {
    /// Serializes the program.
    #[must_use]
    pub fn dump(&self) -> Vec<u8> {
        let mut w = Writer::default();
        w.varint(self.code().len() as u64);
        for instr in self.code() {
            encode_instruction(&mut w, instr);
        }
        w.bytes
    }

    /// Deserializes a program, verifying the code invariants.
    pub fn load(bytes: &[u8]) -> Result<Self, WireError> {
        let mut r = Reader { bytes, pos: 0 };
        let count = r.varint()?;
        let mut code = Code::new();
        for _ in 0..count {
            code.append(decode_instruction(&mut r)?);
        }
        code.check()?;
        Ok(Self::new(code))
    }
}

#[derive(Default)]
struct Writer {
    bytes: Vec<u8>,
}

impl Writer {
    fn varint(&mut self, mut value: u64) {
        loop {
            let byte = (value & 0x7f) as u8;
            value >>= 7;
            if value == 0 {
                self.bytes.push(byte);
                return;
            }
            self.bytes.push(byte | 0x80);
        }
    }

    fn signed(&mut self, value: i64) {
        // Zigzag encoding keeps small magnitudes short.
        self.varint(((value << 1) ^ (value >> 63)) as u64);
    }

    fn float(&mut self, value: f64) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    fn boolean(&mut self, value: bool) {
        self.bytes.push(u8::from(value));
    }

    fn string(&mut self, value: &str) {
        self.varint(value.len() as u64);
        self.bytes.extend_from_slice(value.as_bytes());
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl Reader<'_> {
    fn byte(&mut self) -> Result<u8, WireError> {
        let b = *self.bytes.get(self.pos).ok_or(WireError::UnexpectedEof)?;
        self.pos += 1;
        Ok(b)
    }

    fn varint(&mut self) -> Result<u64, WireError> {
        let mut value = 0u64;
        let mut shift = 0u32;
        loop {
            let byte = self.byte()?;
            if shift >= 64 {
                return Err(WireError::VarintOverflow);
            }
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
        }
    }

    fn signed(&mut self) -> Result<i64, WireError> {
        let raw = self.varint()?;
        Ok(((raw >> 1) as i64) ^ -((raw & 1) as i64))
    }

    fn float(&mut self) -> Result<f64, WireError> {
        if self.pos + 8 > self.bytes.len() {
            return Err(WireError::UnexpectedEof);
        }
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&self.bytes[self.pos..self.pos + 8]);
        self.pos += 8;
        Ok(f64::from_le_bytes(buf))
    }

    fn boolean(&mut self) -> Result<bool, WireError> {
        Ok(self.byte()? != 0)
    }

    fn string(&mut self) -> Result<String, WireError> {
        let len = self.varint()? as usize;
        if self.pos + len > self.bytes.len() {
            return Err(WireError::UnexpectedEof);
        }
        let s = std::str::from_utf8(&self.bytes[self.pos..self.pos + len])
            .map_err(|_| WireError::InvalidString)?;
        self.pos += len;
        Ok(s.to_owned())
    }
}

fn unary_index(op: UnaryOperator) -> u64 {
    UnaryOperator::ALL.iter().position(|o| *o == op).expect("operator is in ALL") as u64
}

fn binary_index(op: BinaryOperator) -> u64 {
    BinaryOperator::ALL.iter().position(|o| *o == op).expect("operator is in ALL") as u64
}

fn comparator_index(op: Comparator) -> u64 {
    Comparator::ALL.iter().position(|o| *o == op).expect("operator is in ALL") as u64
}

fn decode_unary(r: &mut Reader<'_>) -> Result<UnaryOperator, WireError> {
    let idx = r.varint()? as usize;
    UnaryOperator::ALL.get(idx).copied().ok_or(WireError::UnexpectedEof)
}

fn decode_binary(r: &mut Reader<'_>) -> Result<BinaryOperator, WireError> {
    let idx = r.varint()? as usize;
    BinaryOperator::ALL.get(idx).copied().ok_or(WireError::UnexpectedEof)
}

fn decode_comparator(r: &mut Reader<'_>) -> Result<Comparator, WireError> {
    let idx = r.varint()? as usize;
    Comparator::ALL.get(idx).copied().ok_or(WireError::UnexpectedEof)
}

/// Stable operation tags. Holes are not reused.
fn tag(op: &Operation) -> u64 {
    use Operation as O;
    match op {
        O::Nop => 0,
        O::LoadInteger { .. } => 1,
        O::LoadBigInt { .. } => 2,
        O::LoadFloat { .. } => 3,
        O::LoadString { .. } => 4,
        O::LoadBoolean { .. } => 5,
        O::LoadUndefined => 6,
        O::LoadNull => 7,
        O::LoadRegExp { .. } => 8,
        O::LoadBuiltin { .. } => 9,
        O::LoadArguments => 10,
        O::CreateArray { .. } => 11,
        O::CreateArrayWithSpread { .. } => 12,
        O::CreateIntArray { .. } => 13,
        O::CreateFloatArray { .. } => 14,
        O::BeginObjectLiteral => 15,
        O::ObjectLiteralAddProperty { .. } => 16,
        O::ObjectLiteralCopyProperties => 17,
        O::BeginObjectLiteralMethod { .. } => 18,
        O::EndObjectLiteralMethod => 19,
        O::EndObjectLiteral => 20,
        O::BeginClassDefinition { .. } => 21,
        O::ClassAddInstanceProperty { .. } => 22,
        O::BeginClassConstructor { .. } => 23,
        O::EndClassConstructor => 24,
        O::BeginClassInstanceMethod { .. } => 25,
        O::EndClassInstanceMethod => 26,
        O::EndClassDefinition => 27,
        O::UnaryOperation { .. } => 28,
        O::BinaryOperation { .. } => 29,
        O::TernaryOperation => 30,
        O::Update { .. } => 31,
        O::Dup => 32,
        O::Reassign => 33,
        O::Compare { .. } => 34,
        O::TypeOf => 35,
        O::TestInstanceOf => 36,
        O::TestIn => 37,
        O::GetProperty { .. } => 38,
        O::SetProperty { .. } => 39,
        O::DeleteProperty { .. } => 40,
        O::GetElement { .. } => 41,
        O::SetElement { .. } => 42,
        O::GetComputedProperty => 43,
        O::SetComputedProperty => 44,
        O::CallFunction { .. } => 45,
        O::Construct { .. } => 46,
        O::CallMethod { .. } => 47,
        O::CallComputedMethod { .. } => 48,
        O::BeginPlainFunction { .. } => 49,
        O::EndPlainFunction => 50,
        O::BeginArrowFunction { .. } => 51,
        O::EndArrowFunction => 52,
        O::BeginGeneratorFunction { .. } => 53,
        O::EndGeneratorFunction => 54,
        O::BeginAsyncFunction { .. } => 55,
        O::EndAsyncFunction => 56,
        O::Return => 57,
        O::Yield => 58,
        O::Await => 59,
        O::ThrowException => 60,
        O::BeginTry => 61,
        O::BeginCatch => 62,
        O::BeginFinally => 63,
        O::EndTryCatchFinally => 64,
        O::BeginWhileLoop { .. } => 65,
        O::EndWhileLoop => 66,
        O::BeginDoWhileLoop { .. } => 67,
        O::EndDoWhileLoop => 68,
        O::BeginForLoop { .. } => 69,
        O::EndForLoop => 70,
        O::BeginForInLoop => 71,
        O::EndForInLoop => 72,
        O::BeginForOfLoop => 73,
        O::EndForOfLoop => 74,
        O::LoopBreak => 75,
        O::LoopContinue => 76,
        O::BeginIf { .. } => 77,
        O::BeginElse => 78,
        O::EndIf => 79,
        O::BeginSwitch => 80,
        O::BeginSwitchCase => 81,
        O::BeginSwitchDefaultCase => 82,
        O::EndSwitchCase => 83,
        O::EndSwitch => 84,
    }
}

fn encode_instruction(w: &mut Writer, instr: &Instruction) {
    use Operation as O;
    let op = instr.op();
    w.varint(tag(op));
    match op {
        O::LoadInteger { value } | O::LoadBigInt { value } => w.signed(*value),
        O::LoadFloat { value } => w.float(*value),
        O::LoadString { value } | O::LoadBuiltin { name: value } => w.string(value),
        O::LoadBoolean { value } => w.boolean(*value),
        O::LoadRegExp { pattern, flags } => {
            w.string(pattern);
            w.varint(u64::from(flags.bits()));
        }
        O::CreateArray { num_initial_values } => w.varint(u64::from(*num_initial_values)),
        O::CreateArrayWithSpread { spreads } => {
            w.varint(spreads.len() as u64);
            for &s in spreads {
                w.boolean(s);
            }
        }
        O::CreateIntArray { values } => {
            w.varint(values.len() as u64);
            for &v in values {
                w.signed(v);
            }
        }
        O::CreateFloatArray { values } => {
            w.varint(values.len() as u64);
            for &v in values {
                w.float(v);
            }
        }
        O::ObjectLiteralAddProperty { name }
        | O::GetProperty { name }
        | O::SetProperty { name }
        | O::DeleteProperty { name } => w.string(name),
        O::BeginObjectLiteralMethod { name, num_parameters, .. }
        | O::BeginClassInstanceMethod { name, num_parameters, .. } => {
            w.string(name);
            w.varint(u64::from(*num_parameters));
        }
        O::BeginClassDefinition { has_superclass } => w.boolean(*has_superclass),
        O::ClassAddInstanceProperty { name, has_value } => {
            w.string(name);
            w.boolean(*has_value);
        }
        O::BeginClassConstructor { num_parameters, .. } => w.varint(u64::from(*num_parameters)),
        O::UnaryOperation { op } => w.varint(unary_index(*op)),
        O::BinaryOperation { op } | O::Update { op } => w.varint(binary_index(*op)),
        O::Compare { op } => w.varint(comparator_index(*op)),
        O::GetElement { index } | O::SetElement { index } => w.signed(*index),
        O::CallFunction { num_arguments }
        | O::Construct { num_arguments }
        | O::CallComputedMethod { num_arguments } => w.varint(u64::from(*num_arguments)),
        O::CallMethod { name, num_arguments } => {
            w.string(name);
            w.varint(u64::from(*num_arguments));
        }
        O::BeginPlainFunction { num_parameters, .. }
        | O::BeginArrowFunction { num_parameters, .. }
        | O::BeginGeneratorFunction { num_parameters, .. }
        | O::BeginAsyncFunction { num_parameters, .. } => {
            w.varint(u64::from(*num_parameters));
        }
        O::BeginWhileLoop { comparator } | O::BeginDoWhileLoop { comparator } => {
            w.varint(comparator_index(*comparator));
        }
        O::BeginForLoop { comparator, op } => {
            w.varint(comparator_index(*comparator));
            w.varint(binary_index(*op));
        }
        O::BeginIf { inverted } => w.boolean(*inverted),
        _ => {}
    }
    w.varint(instr.inouts().len() as u64);
    for &v in instr.inouts() {
        w.varint(v.number() as u64);
    }
}

fn decode_operation(r: &mut Reader<'_>, tag: u64) -> Result<Operation, WireError> {
    use Operation as O;
    Ok(match tag {
        0 => O::Nop,
        1 => O::LoadInteger { value: r.signed()? },
        2 => O::LoadBigInt { value: r.signed()? },
        3 => O::LoadFloat { value: r.float()? },
        4 => O::LoadString { value: r.string()? },
        5 => O::LoadBoolean { value: r.boolean()? },
        6 => O::LoadUndefined,
        7 => O::LoadNull,
        8 => {
            let pattern = r.string()?;
            let flags = RegExpFlags::from_bits_truncate(r.varint()? as u32);
            O::LoadRegExp { pattern, flags }
        }
        9 => O::LoadBuiltin { name: r.string()? },
        10 => O::LoadArguments,
        11 => O::CreateArray { num_initial_values: r.varint()? as u16 },
        12 => {
            let len = r.varint()? as usize;
            let mut spreads = Vec::with_capacity(len.min(0x10000));
            for _ in 0..len {
                spreads.push(r.boolean()?);
            }
            O::CreateArrayWithSpread { spreads }
        }
        13 => {
            let len = r.varint()? as usize;
            let mut values = Vec::with_capacity(len.min(0x10000));
            for _ in 0..len {
                values.push(r.signed()?);
            }
            O::CreateIntArray { values }
        }
        14 => {
            let len = r.varint()? as usize;
            let mut values = Vec::with_capacity(len.min(0x10000));
            for _ in 0..len {
                values.push(r.float()?);
            }
            O::CreateFloatArray { values }
        }
        15 => O::BeginObjectLiteral,
        16 => O::ObjectLiteralAddProperty { name: r.string()? },
        17 => O::ObjectLiteralCopyProperties,
        18 => O::BeginObjectLiteralMethod {
            name: r.string()?,
            num_parameters: r.varint()? as u16,
            signature: None,
        },
        19 => O::EndObjectLiteralMethod,
        20 => O::EndObjectLiteral,
        21 => O::BeginClassDefinition { has_superclass: r.boolean()? },
        22 => O::ClassAddInstanceProperty { name: r.string()?, has_value: r.boolean()? },
        23 => O::BeginClassConstructor { num_parameters: r.varint()? as u16, signature: None },
        24 => O::EndClassConstructor,
        25 => O::BeginClassInstanceMethod {
            name: r.string()?,
            num_parameters: r.varint()? as u16,
            signature: None,
        },
        26 => O::EndClassInstanceMethod,
        27 => O::EndClassDefinition,
        28 => O::UnaryOperation { op: decode_unary(r)? },
        29 => O::BinaryOperation { op: decode_binary(r)? },
        30 => O::TernaryOperation,
        31 => O::Update { op: decode_binary(r)? },
        32 => O::Dup,
        33 => O::Reassign,
        34 => O::Compare { op: decode_comparator(r)? },
        35 => O::TypeOf,
        36 => O::TestInstanceOf,
        37 => O::TestIn,
        38 => O::GetProperty { name: r.string()? },
        39 => O::SetProperty { name: r.string()? },
        40 => O::DeleteProperty { name: r.string()? },
        41 => O::GetElement { index: r.signed()? },
        42 => O::SetElement { index: r.signed()? },
        43 => O::GetComputedProperty,
        44 => O::SetComputedProperty,
        45 => O::CallFunction { num_arguments: r.varint()? as u16 },
        46 => O::Construct { num_arguments: r.varint()? as u16 },
        47 => O::CallMethod { name: r.string()?, num_arguments: r.varint()? as u16 },
        48 => O::CallComputedMethod { num_arguments: r.varint()? as u16 },
        49 => O::BeginPlainFunction { num_parameters: r.varint()? as u16, signature: None },
        50 => O::EndPlainFunction,
        51 => O::BeginArrowFunction { num_parameters: r.varint()? as u16, signature: None },
        52 => O::EndArrowFunction,
        53 => O::BeginGeneratorFunction { num_parameters: r.varint()? as u16, signature: None },
        54 => O::EndGeneratorFunction,
        55 => O::BeginAsyncFunction { num_parameters: r.varint()? as u16, signature: None },
        56 => O::EndAsyncFunction,
        57 => O::Return,
        58 => O::Yield,
        59 => O::Await,
        60 => O::ThrowException,
        61 => O::BeginTry,
        62 => O::BeginCatch,
        63 => O::BeginFinally,
        64 => O::EndTryCatchFinally,
        65 => O::BeginWhileLoop { comparator: decode_comparator(r)? },
        66 => O::EndWhileLoop,
        67 => O::BeginDoWhileLoop { comparator: decode_comparator(r)? },
        68 => O::EndDoWhileLoop,
        69 => O::BeginForLoop { comparator: decode_comparator(r)?, op: decode_binary(r)? },
        70 => O::EndForLoop,
        71 => O::BeginForInLoop,
        72 => O::EndForInLoop,
        73 => O::BeginForOfLoop,
        74 => O::EndForOfLoop,
        75 => O::LoopBreak,
        76 => O::LoopContinue,
        77 => O::BeginIf { inverted: r.boolean()? },
        78 => O::BeginElse,
        79 => O::EndIf,
        80 => O::BeginSwitch,
        81 => O::BeginSwitchCase,
        82 => O::BeginSwitchDefaultCase,
        83 => O::EndSwitchCase,
        84 => O::EndSwitch,
        _ => return Err(WireError::UnknownOperation { tag }),
    })
}

fn decode_instruction(r: &mut Reader<'_>) -> Result<Instruction, WireError> {
    let t = r.varint()?;
    let op = decode_operation(r, t)?;
    let count = r.varint()? as usize;
    let expected = op.num_inputs() + op.num_outputs() + op.num_inner_outputs();
    if count != expected {
        return Err(WireError::ArityMismatch { tag: t });
    }
    let mut inouts = Vec::with_capacity(count);
    for _ in 0..count {
        let number = r.varint()? as usize;
        if number >= super::variable::MAX_VARIABLES {
            return Err(WireError::InvalidProgram(
                crate::errors::BuilderError::TooManyVariables { count: number },
            ));
        }
        inouts.push(Variable::new(number));
    }
    Ok(Instruction::new(op, inouts))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(n: usize) -> Variable {
        Variable::new(n)
    }

    #[test]
    fn round_trip_is_byte_identical() {
        let mut code = Code::new();
        code.append(Instruction::new(Operation::LoadInteger { value: -42 }, [v(0)]));
        code.append(Instruction::new(
            Operation::LoadString { value: "proteus".to_owned() },
            [v(1)],
        ));
        code.append(Instruction::new(
            Operation::BeginPlainFunction { num_parameters: 1, signature: None },
            [v(2), v(3)],
        ));
        code.append(Instruction::new(Operation::Return, [v(3)]));
        code.append(Instruction::new(Operation::EndPlainFunction, []));
        code.append(Instruction::new(
            Operation::CallFunction { num_arguments: 1 },
            [v(2), v(0), v(4)],
        ));
        let program = Program::new(code);

        let bytes = program.dump();
        let loaded = Program::load(&bytes).unwrap();
        assert_eq!(loaded.dump(), bytes);
        assert_eq!(loaded.code(), program.code());
    }

    #[test]
    fn truncated_input_is_rejected() {
        let mut code = Code::new();
        code.append(Instruction::new(Operation::LoadFloat { value: 13.37 }, [v(0)]));
        let bytes = Program::new(code).dump();
        assert!(matches!(
            Program::load(&bytes[..bytes.len() - 1]),
            Err(WireError::UnexpectedEof)
        ));
    }

    #[test]
    fn invalid_decoded_code_is_rejected() {
        // A lone Return outside a function fails the context check.
        let mut code = Code::new();
        code.append(Instruction::new(Operation::LoadInteger { value: 0 }, [v(0)]));
        code.append(Instruction::new(Operation::Return, [v(0)]));
        let bytes = Program::new(code).dump();
        assert!(matches!(
            Program::load(&bytes),
            Err(WireError::InvalidProgram(_))
        ));
    }

    #[test]
    fn signature_is_not_preserved() {
        use crate::ir::type_system::Signature;
        let mut code = Code::new();
        code.append(Instruction::new(
            Operation::BeginPlainFunction {
                num_parameters: 0,
                signature: Some(Signature::any(0)),
            },
            [v(0)],
        ));
        code.append(Instruction::new(Operation::EndPlainFunction, []));
        let loaded = Program::load(&Program::new(code).dump()).unwrap();
        assert_eq!(loaded.code()[0].op().signature(), None);
    }
}
