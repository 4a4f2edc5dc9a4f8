//! Bytecode model for Ultima Underworld conversation scripts.
//!
//! Provides the static opcode table, instruction decoding, a small mnemonic
//! assembler used by fixtures and tools, and the conversation image loader.

use std::fmt;

pub mod assembler;
pub mod globals;
pub mod image;
pub mod instruction;
pub mod instruction_type;

pub use assembler::{assemble, AssembleError};
pub use globals::ConvGlobals;
pub use image::{ConversationImage, DataType, ImageHeader, ImportedItem, LoadError};
pub use instruction::{DecodeError, Instruction, Instructions};
pub use instruction_type::{type_of, FrameOp, InstructionType, MemoryOp};

/// Number of opcodes known to the instruction set.
pub const OPCODE_COUNT: usize = 42;

/// Precedence of expressions that never need parentheses.
pub const ATOM_PRECEDENCE: u8 = 0xff;

/// Precedence of the unary operators `-` and `!`.
pub const UNARY_PRECEDENCE: u8 = 7;

/// Conversation bytecode opcodes, numbered as stored in the code segment.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Opcode {
    Nop = 0x00,
    OpAdd = 0x01,
    OpMul = 0x02,
    OpSub = 0x03,
    OpDiv = 0x04,
    OpMod = 0x05,
    OpOr = 0x06,
    OpAnd = 0x07,
    OpNot = 0x08,
    TstGt = 0x09,
    TstGe = 0x0a,
    TstLt = 0x0b,
    TstLe = 0x0c,
    TstEq = 0x0d,
    TstNe = 0x0e,
    Jmp = 0x0f,
    Beq = 0x10,
    Bne = 0x11,
    Bra = 0x12,
    Call = 0x13,
    Calli = 0x14,
    Ret = 0x15,
    Pushi = 0x16,
    PushiEff = 0x17,
    Pop = 0x18,
    Swap = 0x19,
    PushBp = 0x1a,
    PopBp = 0x1b,
    SpToBp = 0x1c,
    BpToSp = 0x1d,
    AddSp = 0x1e,
    FetchM = 0x1f,
    Sto = 0x20,
    Offset = 0x21,
    Start = 0x22,
    SaveReg = 0x23,
    PushReg = 0x24,
    StrCmp = 0x25,
    ExitOp = 0x26,
    SayOp = 0x27,
    RespondOp = 0x28,
    OpNeg = 0x29,
}

/// How an operand word is displayed in listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandFormat {
    /// Opcode takes no operand.
    None,
    /// Absolute code position.
    Absolute,
    /// Branch offset relative to the operand word.
    Relative,
    /// Literal value.
    Immediate,
    /// Signed offset from the base pointer.
    Frame,
    /// Imported function id.
    Intrinsic,
}

/// Static metadata for one opcode.
#[derive(Debug, Clone, Copy)]
pub struct InstructionInfo {
    pub mnemonic: &'static str,
    pub operands: u16,
    pub format: OperandFormat,
    /// Source-level operator text, empty for non-operators.
    pub operator: &'static str,
    pub precedence: u8,
    pub description: &'static str,
}

include!(concat!(env!("OUT_DIR"), "/opcode_table.rs"));

impl Opcode {
    /// All opcodes, indexed by their numeric id.
    pub const ALL: [Opcode; OPCODE_COUNT] = [
        Opcode::Nop,
        Opcode::OpAdd,
        Opcode::OpMul,
        Opcode::OpSub,
        Opcode::OpDiv,
        Opcode::OpMod,
        Opcode::OpOr,
        Opcode::OpAnd,
        Opcode::OpNot,
        Opcode::TstGt,
        Opcode::TstGe,
        Opcode::TstLt,
        Opcode::TstLe,
        Opcode::TstEq,
        Opcode::TstNe,
        Opcode::Jmp,
        Opcode::Beq,
        Opcode::Bne,
        Opcode::Bra,
        Opcode::Call,
        Opcode::Calli,
        Opcode::Ret,
        Opcode::Pushi,
        Opcode::PushiEff,
        Opcode::Pop,
        Opcode::Swap,
        Opcode::PushBp,
        Opcode::PopBp,
        Opcode::SpToBp,
        Opcode::BpToSp,
        Opcode::AddSp,
        Opcode::FetchM,
        Opcode::Sto,
        Opcode::Offset,
        Opcode::Start,
        Opcode::SaveReg,
        Opcode::PushReg,
        Opcode::StrCmp,
        Opcode::ExitOp,
        Opcode::SayOp,
        Opcode::RespondOp,
        Opcode::OpNeg,
    ];

    /// The highest opcode id the instruction set defines.
    pub const LAST: Opcode = Opcode::OpNeg;

    /// Map a code word to its opcode, if the word is a known opcode id.
    pub fn from_word(word: u16) -> Option<Self> {
        Self::ALL.get(word as usize).copied()
    }

    /// Look up an opcode by mnemonic (case-insensitive).
    pub fn from_mnemonic(name: &str) -> Option<Self> {
        let upper = name.to_ascii_uppercase();
        MNEMONICS
            .get(upper.as_str())
            .and_then(|id| Self::from_word(*id))
    }

    pub fn info(self) -> &'static InstructionInfo {
        &INSTRUCTIONS[self as usize]
    }

    pub fn mnemonic(self) -> &'static str {
        self.info().mnemonic
    }

    /// Number of operand words following the opcode word.
    pub fn operand_count(self) -> u16 {
        self.info().operands
    }

    pub fn has_operand(self) -> bool {
        self.operand_count() > 0
    }

    pub fn operator_text(self) -> &'static str {
        self.info().operator
    }

    pub fn precedence(self) -> u8 {
        self.info().precedence
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}
