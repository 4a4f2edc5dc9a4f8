//! The host interface the stack machine calls out to.

use crate::{LocalStrings, OperandStack, VmError};

/// A read or write of a slot in the globals region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalAccess<'a> {
    pub slot: u16,
    /// Name of the imported global at this slot, if any.
    pub name: Option<&'a str>,
    /// Current slot value for reads, the value being stored for writes.
    pub value: u16,
}

/// An intrinsic call in progress.
///
/// Arguments are pushed as addresses: argument `i` is the stack slot holding the
/// address of the `i`th argument value, counting down from just below the
/// argument count on top of the stack.
pub struct IntrinsicCall<'a> {
    pub id: u16,
    pub name: &'a str,
    /// Position of the CALLI instruction.
    pub pos: u16,
    stack: &'a OperandStack,
    strings: &'a mut LocalStrings,
}

impl<'a> IntrinsicCall<'a> {
    pub(crate) fn new(
        id: u16,
        name: &'a str,
        pos: u16,
        stack: &'a OperandStack,
        strings: &'a mut LocalStrings,
    ) -> Self {
        Self {
            id,
            name,
            pos,
            stack,
            strings,
        }
    }

    /// Argument count pushed by the caller.
    pub fn arg_count(&self) -> u16 {
        self.stack.at(self.stack.sp()).unwrap_or(0)
    }

    /// Address of argument `index`.
    pub fn arg(&self, index: u16) -> Result<u16, VmError> {
        let slot = self.stack.sp().wrapping_sub(1).wrapping_sub(index);
        if slot as usize >= self.stack.depth() {
            return Err(VmError::StackUnderflow { index: slot });
        }
        self.stack.at(slot)
    }

    /// Value argument `index` points at.
    pub fn arg_value(&self, index: u16) -> Result<u16, VmError> {
        self.stack.at(self.arg(index)?)
    }

    /// Local string whose id argument `index` points at.
    pub fn string_arg(&self, index: u16) -> Result<&str, VmError> {
        let id = self.arg_value(index)?;
        self.strings.get(id).ok_or(VmError::StringOutOfRange { pos: self.pos, id })
    }

    /// Read the zero-terminated list of words starting at `address`.
    pub fn word_list(&self, address: u16) -> Result<Vec<u16>, VmError> {
        let mut words = Vec::new();
        let mut at = address;
        loop {
            let word = self.stack.at(at)?;
            if word == 0 {
                return Ok(words);
            }
            words.push(word);
            at = at.wrapping_add(1);
        }
    }

    /// Answer string ids offered by `babl_menu`.
    pub fn menu_answers(&self) -> Result<Vec<u16>, VmError> {
        self.word_list(self.arg(0)?)
    }

    /// Answer string ids offered by `babl_fmenu`, keeping entries whose flag is set.
    pub fn flagged_menu_answers(&self) -> Result<Vec<u16>, VmError> {
        let answers = self.word_list(self.arg(0)?)?;
        let flags = self.arg(1)?;
        let mut offered = Vec::with_capacity(answers.len());
        for (offset, answer) in answers.into_iter().enumerate() {
            if self.stack.at(flags.wrapping_add(offset as u16))? != 0 {
                offered.push(answer);
            }
        }
        Ok(offered)
    }

    pub fn string(&self, id: u16) -> Option<&str> {
        self.strings.get(id)
    }

    /// Allocate a new local string, e.g. for `babl_ask` input.
    pub fn alloc_string(&mut self, text: impl Into<String>) -> u16 {
        self.strings.alloc(text)
    }

    pub fn stack(&self) -> &OperandStack {
        self.stack
    }
}

/// Callbacks from the stack machine to the embedding program.
///
/// Calls are synchronous and must not re-enter the machine.
pub trait ConversationHost {
    /// Print a line of NPC speech. `text` has its placeholders expanded.
    fn say(&mut self, string_id: u16, text: &str);

    /// Run an intrinsic. The return value becomes the result register.
    fn invoke_intrinsic(&mut self, call: &mut IntrinsicCall<'_>) -> u16;

    /// Supply the value of a global slot. The default keeps the current value.
    fn read_global(&mut self, access: GlobalAccess<'_>) -> u16 {
        access.value
    }

    /// Observe a store into a global slot.
    fn write_global(&mut self, _access: GlobalAccess<'_>) {}
}

/// A host that ignores speech and answers every intrinsic with zero.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHost;

impl ConversationHost for NullHost {
    fn say(&mut self, _string_id: u16, _text: &str) {}

    fn invoke_intrinsic(&mut self, _call: &mut IntrinsicCall<'_>) -> u16 {
        0
    }
}
