//! Stack machine for Ultima Underworld conversation scripts.
//!
//! [`StackMachine`] executes one instruction per [`StackMachine::step`] and calls
//! out to an injected [`ConversationHost`] for speech, intrinsics and globals.

mod error;
pub mod host;
pub mod machine;
pub mod recording;
pub mod stack;
pub mod strings;

pub use error::VmError;
pub use host::{ConversationHost, GlobalAccess, IntrinsicCall, NullHost};
pub use machine::{FinishReason, RunOutcome, StackMachine, Step, MAX_CALL_DEPTH};
pub use recording::{HostEvent, RecordingHost, Transcript};
pub use stack::{OperandStack, EMPTY_SP, STACK_SIZE};
pub use strings::LocalStrings;
