//! In-memory bytecode representation and the instruction decoder.

use std::io::Cursor;

use byteorder::{BigEndian, ReadBytesExt};
use thiserror::Error;

mod bci_map;

pub use bci_map::{BciMap, BciOffset};

/// Bytecode index: a byte offset from the start of a method's code array.
pub type BciType = u32;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BytecodeError {
    #[error("Truncated instruction at bci {0}")]
    Truncated(BciType),
    #[error("Unknown opcode {opcode:#04x} at bci {bci}")]
    Unknown { opcode: u8, bci: BciType },
    #[error("Unknown instruction mnemonic {0:?}")]
    UnknownMnemonic(String),
}

/// Comparison operator carried by the `if_icmp*` family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    Eq,
    Ne,
    Lt,
    Ge,
    Gt,
    Le,
}

impl ComparisonOp {
    pub fn holds(self, a: i32, b: i32) -> bool {
        match self {
            ComparisonOp::Eq => a == b,
            ComparisonOp::Ne => a != b,
            ComparisonOp::Lt => a < b,
            ComparisonOp::Ge => a >= b,
            ComparisonOp::Gt => a > b,
            ComparisonOp::Le => a <= b,
        }
    }
}

/// Kind of a local variable access, used to treat the `load`/`store`
/// families uniformly together with [`Instruction::local_access`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalOp {
    ILoad,
    IStore,
    ALoad,
    AStore,
}

/// A single decoded bytecode instruction.
///
/// Every variant knows its opcode, its encoded length and its mnemonic.
/// Families that are handled uniformly by the verifier and the interpreter
/// (integer constants, compare-branches, local loads and stores) expose
/// their shared field through the projection helpers below instead of a
/// parallel wrapper hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    IconstM1,
    Iconst0,
    Iconst1,
    Iconst2,
    Iconst3,
    Iconst4,
    Iconst5,
    Dconst0,
    Dconst1,
    Bipush(u8),

    Iload(u8),
    Iload0,
    Iload1,
    Iload2,
    Iload3,
    Istore(u8),
    Istore0,
    Istore1,
    Istore2,
    Istore3,
    Iinc { index: u8, delta: i8 },

    Aload(u8),
    Aload0,
    Aload1,
    Aload2,
    Aload3,
    Astore(u8),
    Astore0,
    Astore1,
    Astore2,
    Astore3,

    Iadd,
    Dup,

    Getstatic(u16),
    Putstatic(u16),
    Getfield(u16),
    Putfield(u16),

    New(u16),

    Invokespecial(u16),
    Return,
    Ireturn,
    Dreturn,

    Goto(BciOffset),
    IfIcmpEq(BciOffset),
    IfIcmpNe(BciOffset),
    IfIcmpLt(BciOffset),
    IfIcmpGe(BciOffset),
    IfIcmpGt(BciOffset),
    IfIcmpLe(BciOffset),
}

impl Instruction {
    pub fn opcode(&self) -> u8 {
        use Instruction::*;

        match self {
            IconstM1 => 0x02,
            Iconst0 => 0x03,
            Iconst1 => 0x04,
            Iconst2 => 0x05,
            Iconst3 => 0x06,
            Iconst4 => 0x07,
            Iconst5 => 0x08,
            Dconst0 => 0x0e,
            Dconst1 => 0x0f,
            Bipush(_) => 0x10,

            Iload(_) => 0x15,
            Iload0 => 0x1a,
            Iload1 => 0x1b,
            Iload2 => 0x1c,
            Iload3 => 0x1d,
            Istore(_) => 0x36,
            Istore0 => 0x3b,
            Istore1 => 0x3c,
            Istore2 => 0x3d,
            Istore3 => 0x3e,
            Iinc { .. } => 0x84,

            Aload(_) => 0x19,
            Aload0 => 0x2a,
            Aload1 => 0x2b,
            Aload2 => 0x2c,
            Aload3 => 0x2d,
            Astore(_) => 0x3a,
            Astore0 => 0x4b,
            Astore1 => 0x4c,
            Astore2 => 0x4d,
            Astore3 => 0x4e,

            Iadd => 0x60,
            Dup => 0x59,

            Getstatic(_) => 0xb2,
            Putstatic(_) => 0xb3,
            Getfield(_) => 0xb4,
            Putfield(_) => 0xb5,

            New(_) => 0xbb,

            Invokespecial(_) => 0xb7,
            Return => 0xb1,
            Ireturn => 0xac,
            Dreturn => 0xaf,

            Goto(_) => 0xa7,
            IfIcmpEq(_) => 0x9f,
            IfIcmpNe(_) => 0xa0,
            IfIcmpLt(_) => 0xa1,
            IfIcmpGe(_) => 0xa2,
            IfIcmpGt(_) => 0xa3,
            IfIcmpLe(_) => 0xa4,
        }
    }

    /// Number of bytes this instruction occupies in the code array,
    /// including the opcode byte.
    pub fn length(&self) -> BciType {
        use Instruction::*;

        match self {
            Bipush(_) | Iload(_) | Istore(_) | Aload(_) | Astore(_) => 2,
            Iinc { .. } => 3,
            Getstatic(_) | Putstatic(_) | Getfield(_) | Putfield(_) | New(_)
            | Invokespecial(_) => 3,
            Goto(_) | IfIcmpEq(_) | IfIcmpNe(_) | IfIcmpLt(_) | IfIcmpGe(_) | IfIcmpGt(_)
            | IfIcmpLe(_) => 3,
            _ => 1,
        }
    }

    pub fn mnemonic(&self) -> &'static str {
        use Instruction::*;

        match self {
            IconstM1 => "iconst_m1",
            Iconst0 => "iconst_0",
            Iconst1 => "iconst_1",
            Iconst2 => "iconst_2",
            Iconst3 => "iconst_3",
            Iconst4 => "iconst_4",
            Iconst5 => "iconst_5",
            Dconst0 => "dconst_0",
            Dconst1 => "dconst_1",
            Bipush(_) => "bipush",

            Iload(_) => "iload",
            Iload0 => "iload_0",
            Iload1 => "iload_1",
            Iload2 => "iload_2",
            Iload3 => "iload_3",
            Istore(_) => "istore",
            Istore0 => "istore_0",
            Istore1 => "istore_1",
            Istore2 => "istore_2",
            Istore3 => "istore_3",
            Iinc { .. } => "iinc",

            Aload(_) => "aload",
            Aload0 => "aload_0",
            Aload1 => "aload_1",
            Aload2 => "aload_2",
            Aload3 => "aload_3",
            Astore(_) => "astore",
            Astore0 => "astore_0",
            Astore1 => "astore_1",
            Astore2 => "astore_2",
            Astore3 => "astore_3",

            Iadd => "iadd",
            Dup => "dup",

            Getstatic(_) => "getstatic",
            Putstatic(_) => "putstatic",
            Getfield(_) => "getfield",
            Putfield(_) => "putfield",

            New(_) => "new",

            Invokespecial(_) => "invokespecial",
            Return => "return",
            Ireturn => "ireturn",
            Dreturn => "dreturn",

            Goto(_) => "goto",
            IfIcmpEq(_) => "if_icmpeq",
            IfIcmpNe(_) => "if_icmpne",
            IfIcmpLt(_) => "if_icmplt",
            IfIcmpGe(_) => "if_icmpge",
            IfIcmpGt(_) => "if_icmpgt",
            IfIcmpLe(_) => "if_icmple",
        }
    }

    /// The embedded value of the `iconst_*` family.
    pub fn int_const(&self) -> Option<i32> {
        use Instruction::*;

        match self {
            IconstM1 => Some(-1),
            Iconst0 => Some(0),
            Iconst1 => Some(1),
            Iconst2 => Some(2),
            Iconst3 => Some(3),
            Iconst4 => Some(4),
            Iconst5 => Some(5),
            _ => None,
        }
    }

    /// The embedded value of the `dconst_*` family.
    pub fn double_const(&self) -> Option<f64> {
        match self {
            Instruction::Dconst0 => Some(0.0),
            Instruction::Dconst1 => Some(1.0),
            _ => None,
        }
    }

    /// The comparison operator and branch offset of the `if_icmp*` family.
    pub fn compare_branch(&self) -> Option<(ComparisonOp, BciOffset)> {
        use Instruction::*;

        match *self {
            IfIcmpEq(off) => Some((ComparisonOp::Eq, off)),
            IfIcmpNe(off) => Some((ComparisonOp::Ne, off)),
            IfIcmpLt(off) => Some((ComparisonOp::Lt, off)),
            IfIcmpGe(off) => Some((ComparisonOp::Ge, off)),
            IfIcmpGt(off) => Some((ComparisonOp::Gt, off)),
            IfIcmpLe(off) => Some((ComparisonOp::Le, off)),
            _ => None,
        }
    }

    /// The access kind and local index of the load/store families, taken
    /// from the variable form's operand or the fused variant's embedded
    /// digit.
    pub fn local_access(&self) -> Option<(LocalOp, u8)> {
        use Instruction::*;

        match *self {
            Iload(idx) => Some((LocalOp::ILoad, idx)),
            Iload0 => Some((LocalOp::ILoad, 0)),
            Iload1 => Some((LocalOp::ILoad, 1)),
            Iload2 => Some((LocalOp::ILoad, 2)),
            Iload3 => Some((LocalOp::ILoad, 3)),
            Istore(idx) => Some((LocalOp::IStore, idx)),
            Istore0 => Some((LocalOp::IStore, 0)),
            Istore1 => Some((LocalOp::IStore, 1)),
            Istore2 => Some((LocalOp::IStore, 2)),
            Istore3 => Some((LocalOp::IStore, 3)),
            Aload(idx) => Some((LocalOp::ALoad, idx)),
            Aload0 => Some((LocalOp::ALoad, 0)),
            Aload1 => Some((LocalOp::ALoad, 1)),
            Aload2 => Some((LocalOp::ALoad, 2)),
            Aload3 => Some((LocalOp::ALoad, 3)),
            Astore(idx) => Some((LocalOp::AStore, idx)),
            Astore0 => Some((LocalOp::AStore, 0)),
            Astore1 => Some((LocalOp::AStore, 1)),
            Astore2 => Some((LocalOp::AStore, 2)),
            Astore3 => Some((LocalOp::AStore, 3)),
            _ => None,
        }
    }

    /// Decode a single instruction from the cursor position, leaving the
    /// cursor at the start of the next instruction.
    pub fn read(buffer: &mut Cursor<&[u8]>) -> Result<Self, BytecodeError> {
        use Instruction::*;

        let bci = buffer.position() as BciType;
        let truncated = |_| BytecodeError::Truncated(bci);

        let opcode = buffer.read_u8().map_err(truncated)?;

        let instruction = match opcode {
            0x02 => IconstM1,
            0x03 => Iconst0,
            0x04 => Iconst1,
            0x05 => Iconst2,
            0x06 => Iconst3,
            0x07 => Iconst4,
            0x08 => Iconst5,
            0x0e => Dconst0,
            0x0f => Dconst1,
            0x10 => Bipush(buffer.read_u8().map_err(truncated)?),

            0x15 => Iload(buffer.read_u8().map_err(truncated)?),
            0x1a => Iload0,
            0x1b => Iload1,
            0x1c => Iload2,
            0x1d => Iload3,
            0x36 => Istore(buffer.read_u8().map_err(truncated)?),
            0x3b => Istore0,
            0x3c => Istore1,
            0x3d => Istore2,
            0x3e => Istore3,
            0x84 => Iinc {
                index: buffer.read_u8().map_err(truncated)?,
                delta: buffer.read_i8().map_err(truncated)?,
            },

            0x19 => Aload(buffer.read_u8().map_err(truncated)?),
            0x2a => Aload0,
            0x2b => Aload1,
            0x2c => Aload2,
            0x2d => Aload3,
            0x3a => Astore(buffer.read_u8().map_err(truncated)?),
            0x4b => Astore0,
            0x4c => Astore1,
            0x4d => Astore2,
            0x4e => Astore3,

            0x60 => Iadd,
            0x59 => Dup,

            0xb2 => Getstatic(buffer.read_u16::<BigEndian>().map_err(truncated)?),
            0xb3 => Putstatic(buffer.read_u16::<BigEndian>().map_err(truncated)?),
            0xb4 => Getfield(buffer.read_u16::<BigEndian>().map_err(truncated)?),
            0xb5 => Putfield(buffer.read_u16::<BigEndian>().map_err(truncated)?),

            0xbb => New(buffer.read_u16::<BigEndian>().map_err(truncated)?),

            0xb7 => Invokespecial(buffer.read_u16::<BigEndian>().map_err(truncated)?),
            0xb1 => Return,
            0xac => Ireturn,
            0xaf => Dreturn,

            0xa7 => Goto(buffer.read_i16::<BigEndian>().map_err(truncated)?),
            0x9f => IfIcmpEq(buffer.read_i16::<BigEndian>().map_err(truncated)?),
            0xa0 => IfIcmpNe(buffer.read_i16::<BigEndian>().map_err(truncated)?),
            0xa1 => IfIcmpLt(buffer.read_i16::<BigEndian>().map_err(truncated)?),
            0xa2 => IfIcmpGe(buffer.read_i16::<BigEndian>().map_err(truncated)?),
            0xa3 => IfIcmpGt(buffer.read_i16::<BigEndian>().map_err(truncated)?),
            0xa4 => IfIcmpLe(buffer.read_i16::<BigEndian>().map_err(truncated)?),

            opcode => return Err(BytecodeError::Unknown { opcode, bci }),
        };

        Ok(instruction)
    }

    /// Build an instruction from its mnemonic and a raw operand. Branch
    /// offsets are passed as the operand reinterpreted as a signed half.
    /// Used by the textual class description parser.
    pub fn from_mnemonic(name: &str, operand: u16) -> Result<Self, BytecodeError> {
        use Instruction::*;

        Ok(match name {
            "iconst_m1" => IconstM1,
            "iconst_0" => Iconst0,
            "iconst_1" => Iconst1,
            "iconst_2" => Iconst2,
            "iconst_3" => Iconst3,
            "iconst_4" => Iconst4,
            "iconst_5" => Iconst5,
            "dconst_0" => Dconst0,
            "dconst_1" => Dconst1,
            "bipush" => Bipush(operand as u8),

            "iload" => Iload(operand as u8),
            "iload_0" => Iload0,
            "iload_1" => Iload1,
            "iload_2" => Iload2,
            "iload_3" => Iload3,
            "istore" => Istore(operand as u8),
            "istore_0" => Istore0,
            "istore_1" => Istore1,
            "istore_2" => Istore2,
            "istore_3" => Istore3,

            "aload" => Aload(operand as u8),
            "aload_0" => Aload0,
            "aload_1" => Aload1,
            "aload_2" => Aload2,
            "aload_3" => Aload3,
            "astore" => Astore(operand as u8),
            "astore_0" => Astore0,
            "astore_1" => Astore1,
            "astore_2" => Astore2,
            "astore_3" => Astore3,

            "iadd" => Iadd,
            "dup" => Dup,

            "getstatic" => Getstatic(operand),
            "putstatic" => Putstatic(operand),
            "getfield" => Getfield(operand),
            "putfield" => Putfield(operand),

            "new" => New(operand),

            "invokespecial" => Invokespecial(operand),
            "return" => Return,
            "ireturn" => Ireturn,
            "dreturn" => Dreturn,

            "goto" => Goto(operand as i16),
            "if_icmpeq" => IfIcmpEq(operand as i16),
            "if_icmpne" => IfIcmpNe(operand as i16),
            "if_icmplt" => IfIcmpLt(operand as i16),
            "if_icmpge" => IfIcmpGe(operand as i16),
            "if_icmpgt" => IfIcmpGt(operand as i16),
            "if_icmple" => IfIcmpLe(operand as i16),

            other => return Err(BytecodeError::UnknownMnemonic(other.to_string())),
        })
    }
}

/// Decode a full code array into a bci-addressed instruction sequence.
/// The buffer must parse to completion without trailing bytes.
pub fn parse_instructions(code: &[u8]) -> Result<BciMap<Instruction>, BytecodeError> {
    let mut instructions = BciMap::new();
    let mut buffer = Cursor::new(code);

    while (buffer.position() as usize) < code.len() {
        let bci = buffer.position() as BciType;
        let instruction = Instruction::read(&mut buffer)?;
        instructions.insert(bci, instruction);
    }

    Ok(instructions)
}
