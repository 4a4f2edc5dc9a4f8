use thiserror::Error;

/// Failures that stop decompiling a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecompileError {
    #[error("jump at {pos:04x} targets {target:04x}, which starts no instruction")]
    UnresolvedJumpTarget { pos: u16, target: u16 },

    #[error("call at {pos:04x} references unknown intrinsic {id:#06x}")]
    UnknownIntrinsic { pos: u16, id: u16 },

    #[error("function '{name}' was never discovered")]
    UnknownFunction { name: String },

    #[error("operator at {pos:04x} needs {needed} operands but only {found} are available")]
    OperandCountMismatch { pos: u16, needed: u16, found: u16 },

    #[error("operator at {pos:04x}: {detail}")]
    OperandKindMismatch { pos: u16, detail: String },

    #[error("say at {pos:04x} does not use an immediate string id")]
    SayOperandNotImmediate { pos: u16 },

    #[error("string {id} used at {pos:04x} is outside the string block")]
    StringOutOfRange { pos: u16, id: u16 },

    #[error("conversation contains no code")]
    EmptyCode,
}
