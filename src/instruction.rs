use std::hash::{Hash, Hasher};

use crate::constant_pool::{ConstantPool, Symbol};
use crate::error::{DecodeError, DecodeResult};

pub mod opcodes {
    pub const ILOAD: u8 = 0x15;
    pub const ALOAD: u8 = 0x19;
    pub const ILOAD_0: u8 = 0x1A;
    pub const ALOAD_3: u8 = 0x2D;
    pub const ISTORE: u8 = 0x36;
    pub const ASTORE: u8 = 0x3A;
    pub const ISTORE_0: u8 = 0x3B;
    pub const ASTORE_3: u8 = 0x4E;
    pub const BIPUSH: u8 = 0x10;
    pub const SIPUSH: u8 = 0x11;
    pub const LDC: u8 = 0x12;
    pub const LDC_W: u8 = 0x13;
    pub const LDC2_W: u8 = 0x14;
    pub const IINC: u8 = 0x84;
    pub const IFEQ: u8 = 0x99;
    pub const GOTO: u8 = 0xA7;
    pub const JSR: u8 = 0xA8;
    pub const RET: u8 = 0xA9;
    pub const TABLESWITCH: u8 = 0xAA;
    pub const LOOKUPSWITCH: u8 = 0xAB;
    pub const GETSTATIC: u8 = 0xB2;
    pub const INVOKESTATIC: u8 = 0xB8;
    pub const INVOKEINTERFACE: u8 = 0xB9;
    pub const INVOKEDYNAMIC: u8 = 0xBA;
    pub const NEW: u8 = 0xBB;
    pub const NEWARRAY: u8 = 0xBC;
    pub const ANEWARRAY: u8 = 0xBD;
    pub const CHECKCAST: u8 = 0xC0;
    pub const INSTANCEOF: u8 = 0xC1;
    pub const WIDE: u8 = 0xC4;
    pub const MULTIANEWARRAY: u8 = 0xC5;
    pub const IFNULL: u8 = 0xC6;
    pub const IFNONNULL: u8 = 0xC7;
    pub const GOTO_W: u8 = 0xC8;
    pub const JSR_W: u8 = 0xC9;
}

use opcodes::*;

const MNEMONICS: [&str; 202] = [
    "nop", "aconst_null", "iconst_m1", "iconst_0", "iconst_1", "iconst_2", "iconst_3", "iconst_4",
    "iconst_5", "lconst_0", "lconst_1", "fconst_0", "fconst_1", "fconst_2", "dconst_0", "dconst_1",
    "bipush", "sipush", "ldc", "ldc_w", "ldc2_w", "iload", "lload", "fload", "dload", "aload",
    "iload_0", "iload_1", "iload_2", "iload_3", "lload_0", "lload_1", "lload_2", "lload_3",
    "fload_0", "fload_1", "fload_2", "fload_3", "dload_0", "dload_1", "dload_2", "dload_3",
    "aload_0", "aload_1", "aload_2", "aload_3", "iaload", "laload", "faload", "daload", "aaload",
    "baload", "caload", "saload", "istore", "lstore", "fstore", "dstore", "astore", "istore_0",
    "istore_1", "istore_2", "istore_3", "lstore_0", "lstore_1", "lstore_2", "lstore_3", "fstore_0",
    "fstore_1", "fstore_2", "fstore_3", "dstore_0", "dstore_1", "dstore_2", "dstore_3", "astore_0",
    "astore_1", "astore_2", "astore_3", "iastore", "lastore", "fastore", "dastore", "aastore",
    "bastore", "castore", "sastore", "pop", "pop2", "dup", "dup_x1", "dup_x2", "dup2", "dup2_x1",
    "dup2_x2", "swap", "iadd", "ladd", "fadd", "dadd", "isub", "lsub", "fsub", "dsub", "imul",
    "lmul", "fmul", "dmul", "idiv", "ldiv", "fdiv", "ddiv", "irem", "lrem", "frem", "drem", "ineg",
    "lneg", "fneg", "dneg", "ishl", "lshl", "ishr", "lshr", "iushr", "lushr", "iand", "land", "ior",
    "lor", "ixor", "lxor", "iinc", "i2l", "i2f", "i2d", "l2i", "l2f", "l2d", "f2i", "f2l", "f2d",
    "d2i", "d2l", "d2f", "i2b", "i2c", "i2s", "lcmp", "fcmpl", "fcmpg", "dcmpl", "dcmpg", "ifeq",
    "ifne", "iflt", "ifge", "ifgt", "ifle", "if_icmpeq", "if_icmpne", "if_icmplt", "if_icmpge",
    "if_icmpgt", "if_icmple", "if_acmpeq", "if_acmpne", "goto", "jsr", "ret", "tableswitch",
    "lookupswitch", "ireturn", "lreturn", "freturn", "dreturn", "areturn", "return", "getstatic",
    "putstatic", "getfield", "putfield", "invokevirtual", "invokespecial", "invokestatic",
    "invokeinterface", "invokedynamic", "new", "newarray", "anewarray", "arraylength", "athrow",
    "checkcast", "instanceof", "monitorenter", "monitorexit", "wide", "multianewarray", "ifnull",
    "ifnonnull", "goto_w", "jsr_w",
];

pub fn mnemonic(opcode: u8) -> Option<&'static str> {
    MNEMONICS.get(opcode as usize).copied()
}

/// Operands decoded from the code array, with pool references left as
/// indices. Branch targets are absolute offsets within the method's code.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Operands {
    None,
    Local(u16),
    Immediate(i32),
    Constant(u16),
    Branch(i64),
    Iinc { index: u16, delta: i16 },
    InvokeInterface { index: u16, count: u8 },
    MultiANewArray { index: u16, dimensions: u8 },
    TableSwitch {
        default: i64,
        low: i32,
        high: i32,
        targets: Vec<i64>,
    },
    LookupSwitch {
        default: i64,
        pairs: Vec<(i32, i64)>,
    },
}

/// One decoded opcode, borrowing the code array and the constant pool.
///
/// Equality and hashing use resolved pool operands rather than raw indices,
/// so identical bytecode compiled against differently ordered pools matches.
#[derive(Clone, Copy)]
pub struct Instruction<'a> {
    pool: &'a ConstantPool,
    code: &'a [u8],
    offset: usize,
    length: usize,
}

impl<'a> Instruction<'a> {
    pub fn opcode(&self) -> u8 {
        self.code[self.offset]
    }

    pub fn mnemonic(&self) -> &'static str {
        mnemonic(self.opcode()).unwrap_or("<invalid>")
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn bytes(&self) -> &'a [u8] {
        &self.code[self.offset..self.offset + self.length]
    }

    pub fn is_wide(&self) -> bool {
        self.opcode() == WIDE
    }

    /// The opcode an instruction acts as; for `wide` this is the modified
    /// opcode that follows it.
    pub fn effective_opcode(&self) -> u8 {
        if self.is_wide() {
            self.code[self.offset + 1]
        } else {
            self.opcode()
        }
    }

    pub fn operands(&self) -> Operands {
        let at = self.offset + 1;
        let here = self.offset as i64;
        match self.opcode() {
            BIPUSH => Operands::Immediate(self.i8_at(at) as i32),
            SIPUSH => Operands::Immediate(self.i16_at(at) as i32),
            NEWARRAY => Operands::Immediate(self.code[at] as i32),
            LDC => Operands::Constant(self.code[at] as u16),
            LDC_W | LDC2_W | GETSTATIC..=INVOKESTATIC | NEW | ANEWARRAY | CHECKCAST
            | INSTANCEOF | INVOKEDYNAMIC => Operands::Constant(self.u16_at(at)),
            INVOKEINTERFACE => Operands::InvokeInterface {
                index: self.u16_at(at),
                count: self.code[at + 2],
            },
            MULTIANEWARRAY => Operands::MultiANewArray {
                index: self.u16_at(at),
                dimensions: self.code[at + 2],
            },
            ILOAD..=ALOAD | ISTORE..=ASTORE | RET => Operands::Local(self.code[at] as u16),
            IINC => Operands::Iinc {
                index: self.code[at] as u16,
                delta: self.i8_at(at + 1) as i16,
            },
            IFEQ..=JSR | IFNULL | IFNONNULL => Operands::Branch(here + self.i16_at(at) as i64),
            GOTO_W | JSR_W => Operands::Branch(here + self.i32_at(at) as i64),
            WIDE => {
                if self.code[at] == IINC {
                    Operands::Iinc {
                        index: self.u16_at(at + 1),
                        delta: self.i16_at(at + 3),
                    }
                } else {
                    Operands::Local(self.u16_at(at + 1))
                }
            }
            TABLESWITCH => {
                let base = at + switch_padding(self.offset);
                let low = self.i32_at(base + 4);
                let high = self.i32_at(base + 8);
                let targets = (0..=(high as i64 - low as i64) as usize)
                    .map(|i| here + self.i32_at(base + 12 + 4 * i) as i64)
                    .collect();
                Operands::TableSwitch {
                    default: here + self.i32_at(base) as i64,
                    low,
                    high,
                    targets,
                }
            }
            LOOKUPSWITCH => {
                let base = at + switch_padding(self.offset);
                let npairs = self.i32_at(base + 4) as usize;
                let pairs = (0..npairs)
                    .map(|i| {
                        let pair = base + 8 + 8 * i;
                        (self.i32_at(pair), here + self.i32_at(pair + 4) as i64)
                    })
                    .collect();
                Operands::LookupSwitch {
                    default: here + self.i32_at(base) as i64,
                    pairs,
                }
            }
            _ => Operands::None,
        }
    }

    /// Constant pool index carried by this instruction, if any.
    pub fn index(&self) -> Option<u16> {
        match self.operands() {
            Operands::Constant(index)
            | Operands::InvokeInterface { index, .. }
            | Operands::MultiANewArray { index, .. } => Some(index),
            _ => None,
        }
    }

    /// Resolves the pool operand, e.g. the method an `invokevirtual` calls.
    pub fn symbol(&self) -> Option<DecodeResult<Symbol>> {
        self.index().map(|index| self.pool.symbol(index))
    }

    /// Local variable slot, including the implicit slot of `iload_1` and
    /// friends.
    pub fn local_index(&self) -> Option<u16> {
        match self.opcode() {
            op @ ILOAD_0..=ALOAD_3 => Some(((op - ILOAD_0) % 4) as u16),
            op @ ISTORE_0..=ASTORE_3 => Some(((op - ISTORE_0) % 4) as u16),
            _ => match self.operands() {
                Operands::Local(index) | Operands::Iinc { index, .. } => Some(index),
                _ => None,
            },
        }
    }

    fn key(&self) -> (u8, Option<Result<Symbol, u16>>, Operands) {
        let operands = self.operands();
        let here = self.offset as i64;
        let symbol = self
            .index()
            .map(|index| self.pool.symbol(index).map_err(|_| index));
        // Pool indices differ between classes; the resolved symbol stands
        // in for them.
        let operands = match operands {
            Operands::Constant(_) => Operands::None,
            Operands::InvokeInterface { count, .. } => Operands::Immediate(count as i32),
            Operands::MultiANewArray { dimensions, .. } => Operands::Immediate(dimensions as i32),
            Operands::Branch(target) => Operands::Branch(target - here),
            Operands::TableSwitch {
                default,
                low,
                high,
                targets,
            } => Operands::TableSwitch {
                default: default - here,
                low,
                high,
                targets: targets.into_iter().map(|t| t - here).collect(),
            },
            Operands::LookupSwitch { default, pairs } => Operands::LookupSwitch {
                default: default - here,
                pairs: pairs.into_iter().map(|(k, t)| (k, t - here)).collect(),
            },
            other => other,
        };
        (self.effective_opcode(), symbol, operands)
    }

    fn u16_at(&self, at: usize) -> u16 {
        u16::from_be_bytes([self.code[at], self.code[at + 1]])
    }

    fn i8_at(&self, at: usize) -> i8 {
        self.code[at] as i8
    }

    fn i16_at(&self, at: usize) -> i16 {
        self.u16_at(at) as i16
    }

    fn i32_at(&self, at: usize) -> i32 {
        i32::from_be_bytes([
            self.code[at],
            self.code[at + 1],
            self.code[at + 2],
            self.code[at + 3],
        ])
    }
}

impl PartialEq for Instruction<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.opcode() == other.opcode() && self.key() == other.key()
    }
}

impl Eq for Instruction<'_> {}

impl Hash for Instruction<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.opcode().hash(state);
        self.key().hash(state);
    }
}

impl std::fmt::Debug for Instruction<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instruction")
            .field("offset", &self.offset)
            .field("mnemonic", &self.mnemonic())
            .field("operands", &self.operands())
            .finish()
    }
}

impl std::fmt::Display for Instruction<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.offset, self.mnemonic())?;
        if self.is_wide() {
            write!(f, " {}", mnemonic(self.effective_opcode()).unwrap_or("?"))?;
        }
        match self.symbol() {
            Some(Ok(symbol)) => write!(f, " {symbol:?}"),
            Some(Err(_)) => write!(f, " #{}", self.index().unwrap_or(0)),
            None => Ok(()),
        }
    }
}

/// Iterator over the instructions of one code array. Stops after the first
/// malformed instruction.
pub struct Instructions<'a> {
    pool: &'a ConstantPool,
    code: &'a [u8],
    offset: usize,
    failed: bool,
}

impl<'a> Instructions<'a> {
    pub fn new(pool: &'a ConstantPool, code: &'a [u8]) -> Self {
        Self {
            pool,
            code,
            offset: 0,
            failed: false,
        }
    }
}

impl<'a> Iterator for Instructions<'a> {
    type Item = DecodeResult<Instruction<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.code.len() {
            return None;
        }
        match instruction_length(self.code, self.offset) {
            Ok(length) => {
                let instruction = Instruction {
                    pool: self.pool,
                    code: self.code,
                    offset: self.offset,
                    length,
                };
                self.offset += length;
                Some(Ok(instruction))
            }
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}

/// Checks that `code` splits cleanly into instructions.
pub(crate) fn validate(code: &[u8]) -> DecodeResult<()> {
    let mut offset = 0;
    while offset < code.len() {
        offset += instruction_length(code, offset)?;
    }
    Ok(())
}

/// Zero to three pad bytes so switch operands start on a 4-byte boundary
/// measured from the start of the code array.
fn switch_padding(offset: usize) -> usize {
    3 - (offset % 4)
}

fn instruction_length(code: &[u8], offset: usize) -> DecodeResult<usize> {
    let opcode = code[offset];
    let length = match opcode {
        BIPUSH | LDC | ILOAD..=ALOAD | ISTORE..=ASTORE | RET | NEWARRAY => 2,
        SIPUSH | LDC_W | LDC2_W | IINC | IFEQ..=JSR | GETSTATIC..=INVOKESTATIC | NEW
        | ANEWARRAY | CHECKCAST | INSTANCEOF | IFNULL | IFNONNULL => 3,
        MULTIANEWARRAY => 4,
        INVOKEINTERFACE | INVOKEDYNAMIC | GOTO_W | JSR_W => 5,
        WIDE => {
            let modified = need(code, offset, 2)?[1];
            match modified {
                IINC => 6,
                ILOAD..=ALOAD | ISTORE..=ASTORE | RET => 4,
                _ => {
                    return Err(DecodeError::BadOpcode {
                        offset: offset + 1,
                        opcode: modified,
                    });
                }
            }
        }
        TABLESWITCH => {
            let header = 1 + switch_padding(offset);
            let fixed = need(code, offset, header + 12)?;
            let low = read_i32(fixed, header + 4);
            let high = read_i32(fixed, header + 8);
            if high < low {
                return Err(DecodeError::invalid_attribute(
                    "Code",
                    format!("tableswitch at {offset} has high {high} below low {low}"),
                ));
            }
            header + 12 + 4 * ((high as i64 - low as i64 + 1) as usize)
        }
        LOOKUPSWITCH => {
            let header = 1 + switch_padding(offset);
            let fixed = need(code, offset, header + 8)?;
            let npairs = read_i32(fixed, header + 4);
            if npairs < 0 {
                return Err(DecodeError::invalid_attribute(
                    "Code",
                    format!("lookupswitch at {offset} has negative pair count"),
                ));
            }
            header + 8 + 8 * npairs as usize
        }
        op if (op as usize) < MNEMONICS.len() => 1,
        _ => return Err(DecodeError::BadOpcode { offset, opcode }),
    };
    need(code, offset, length)?;
    Ok(length)
}

fn need(code: &[u8], offset: usize, len: usize) -> DecodeResult<&[u8]> {
    code.get(offset..offset + len)
        .ok_or(DecodeError::Truncated {
            offset,
            needed: len,
            available: code.len() - offset,
        })
}

fn read_i32(bytes: &[u8], at: usize) -> i32 {
    i32::from_be_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}
