use crate::VmError;

/// Number of 16-bit slots allocated for the operand stack.
pub const STACK_SIZE: usize = 4096;

/// Stack pointer value of an empty stack.
pub const EMPTY_SP: u16 = 0xffff;

/// The machine's operand stack.
///
/// The stack is also the machine's memory: globals live in the low slots, and
/// frame-relative and absolute addresses index into it directly. The stack
/// pointer is the index of the topmost element, `0xffff` when empty.
#[derive(Debug, Clone)]
pub struct OperandStack {
    slots: Vec<u16>,
    sp: u16,
}

impl OperandStack {
    /// Create a zero-filled stack with `size` slots.
    pub fn new(size: usize) -> Self {
        Self {
            slots: vec![0; size],
            sp: EMPTY_SP,
        }
    }

    /// Zero all slots and empty the stack.
    pub fn reset(&mut self) {
        self.slots.fill(0);
        self.sp = EMPTY_SP;
    }

    /// Push a value on top of the stack.
    pub fn push(&mut self, value: u16) -> Result<(), VmError> {
        let index = self.sp.wrapping_add(1);
        let slot = self
            .slots
            .get_mut(index as usize)
            .ok_or(VmError::StackOverflow { index })?;
        *slot = value;
        self.sp = index;
        Ok(())
    }

    /// Pop the topmost value.
    pub fn pop(&mut self) -> Result<u16, VmError> {
        if self.sp == EMPTY_SP {
            return Err(VmError::StackUnderflow { index: self.sp });
        }
        let value = self.at(self.sp)?;
        self.sp = self.sp.wrapping_sub(1);
        Ok(value)
    }

    /// Read the slot at an absolute index.
    pub fn at(&self, index: u16) -> Result<u16, VmError> {
        self.slots
            .get(index as usize)
            .copied()
            .ok_or(VmError::StackOverflow { index })
    }

    /// Write the slot at an absolute index.
    pub fn set(&mut self, index: u16, value: u16) -> Result<(), VmError> {
        let slot = self
            .slots
            .get_mut(index as usize)
            .ok_or(VmError::StackOverflow { index })?;
        *slot = value;
        Ok(())
    }

    /// Index of the topmost element.
    pub fn sp(&self) -> u16 {
        self.sp
    }

    /// Move the stack pointer. `0xffff` empties the stack.
    pub fn set_sp(&mut self, sp: u16) -> Result<(), VmError> {
        if sp != EMPTY_SP && sp as usize >= self.slots.len() {
            return Err(VmError::StackOverflow { index: sp });
        }
        self.sp = sp;
        Ok(())
    }

    /// Number of elements on the stack.
    pub fn depth(&self) -> usize {
        self.sp.wrapping_add(1) as usize
    }

    /// Slots from the bottom up to and including the top.
    pub fn contents(&self) -> &[u16] {
        &self.slots[..self.depth().min(self.slots.len())]
    }
}

impl Default for OperandStack {
    fn default() -> Self {
        Self::new(STACK_SIZE)
    }
}
