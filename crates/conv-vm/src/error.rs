use conv_bytecode::Opcode;
use thiserror::Error;

/// Faults raised while executing conversation code.
///
/// Every fault finishes the machine; the instruction pointer is left on the
/// faulting instruction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VmError {
    #[error("division by zero at {pos:04x}")]
    DivisionByZero { pos: u16 },

    #[error("unknown opcode {word:#06x} at {pos:04x}")]
    UnknownOpcode { pos: u16, word: u16 },

    #[error("opcode {opcode} at {pos:04x} is not supported")]
    UnsupportedOpcode { pos: u16, opcode: Opcode },

    #[error("stack overflow at index {index:#06x}")]
    StackOverflow { index: u16 },

    #[error("stack underflow at index {index:#06x}")]
    StackUnderflow { index: u16 },

    #[error("unknown intrinsic {id:#06x} called at {pos:04x}")]
    UnknownIntrinsic { pos: u16, id: u16 },

    #[error("call depth exceeded at {pos:04x}")]
    CallDepthExceeded { pos: u16 },

    #[error("local string {id:#06x} used at {pos:04x} does not exist")]
    StringOutOfRange { pos: u16, id: u16 },

    #[error("instruction pointer {pos:04x} is outside the code segment")]
    CodeOutOfBounds { pos: u16 },

    #[error("conversation has already finished")]
    Finished,
}
