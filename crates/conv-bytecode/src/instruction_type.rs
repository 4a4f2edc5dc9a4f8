use crate::Opcode;

/// High-level classification of opcodes for quick filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructionType {
    /// Arithmetic, logic and comparison operators taking two operands.
    Binary,
    /// `OPNEG` and `OPNOT`.
    Unary,
    /// Jumps and branches.
    Jump { relative: bool, conditional: bool },
    /// Local or intrinsic calls.
    Call { intrinsic: bool },
    /// `RET`.
    Return,
    /// Literal and frame-relative pushes.
    Push,
    /// Base pointer and stack pointer bookkeeping.
    Frame(FrameOp),
    /// Memory access through a pushed address.
    Memory(MemoryOp),
    /// Result register access.
    Register,
    /// Script termination, `SAY_OP` and the other conversation primitives.
    Conversation,
    /// Everything else.
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryOp {
    Load,
    Store,
    Index,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOp {
    PushBp,
    PopBp,
    SpToBp,
    BpToSp,
    AddSp,
}

impl InstructionType {
    pub fn is_operator(&self) -> bool {
        matches!(self, InstructionType::Binary | InstructionType::Unary)
    }

    pub fn is_memory(&self) -> bool {
        matches!(self, InstructionType::Memory(_))
    }

    /// True for opcodes whose operand is a code position.
    pub fn has_code_target(&self) -> bool {
        matches!(
            self,
            InstructionType::Jump { .. } | InstructionType::Call { intrinsic: false }
        )
    }
}

/// Classify an opcode into a coarse-grained type.
pub fn type_of(opcode: Opcode) -> InstructionType {
    use Opcode::*;

    match opcode {
        OpAdd | OpMul | OpSub | OpDiv | OpMod | OpOr | OpAnd | TstGt | TstGe | TstLt | TstLe
        | TstEq | TstNe => InstructionType::Binary,
        OpNeg | OpNot => InstructionType::Unary,

        Jmp => InstructionType::Jump { relative: false, conditional: false },
        Bra => InstructionType::Jump { relative: true, conditional: false },
        Beq | Bne => InstructionType::Jump { relative: true, conditional: true },

        Call => InstructionType::Call { intrinsic: false },
        Calli => InstructionType::Call { intrinsic: true },
        Ret => InstructionType::Return,

        Pushi | PushiEff => InstructionType::Push,

        PushBp => InstructionType::Frame(FrameOp::PushBp),
        PopBp => InstructionType::Frame(FrameOp::PopBp),
        SpToBp => InstructionType::Frame(FrameOp::SpToBp),
        BpToSp => InstructionType::Frame(FrameOp::BpToSp),
        AddSp => InstructionType::Frame(FrameOp::AddSp),

        FetchM => InstructionType::Memory(MemoryOp::Load),
        Sto => InstructionType::Memory(MemoryOp::Store),
        Offset => InstructionType::Memory(MemoryOp::Index),

        SaveReg | PushReg => InstructionType::Register,

        ExitOp | SayOp | RespondOp | Start => InstructionType::Conversation,

        Nop | Pop | Swap | StrCmp => InstructionType::Other,
    }
}
