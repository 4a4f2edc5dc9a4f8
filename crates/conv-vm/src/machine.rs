use conv_bytecode::{ConversationImage, Opcode};
use tracing::{debug, trace, warn};

use crate::{
    host::{ConversationHost, GlobalAccess, IntrinsicCall},
    strings::{expand_with, PlaceholderSource},
    LocalStrings, OperandStack, VmError, STACK_SIZE,
};

/// Deepest CALL nesting the machine accepts.
pub const MAX_CALL_DEPTH: u32 = 256;

/// Base pointer value before the first frame is set up.
pub const UNSET_BP: u16 = 0xffff;

/// Filler pushed by ADDSP for freshly reserved locals.
pub const LOCAL_FILL: u16 = 0xdddd;

/// Why the machine stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    /// EXIT_OP was executed.
    Exit,
    /// RET left the outermost function.
    Return,
}

/// Outcome of one [`StackMachine::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    Finished(FinishReason),
}

/// Outcome of [`StackMachine::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Finished { reason: FinishReason, steps: usize },
    StepLimit { steps: usize },
}

/// Interpreter for one conversation.
///
/// The machine owns the code, the operand stack and the local strings for the
/// duration of a run; the host is fixed at construction.
pub struct StackMachine {
    image: ConversationImage,
    host: Box<dyn ConversationHost>,
    stack: OperandStack,
    strings: LocalStrings,
    ip: u16,
    bp: u16,
    result: u16,
    depth: u32,
    finished: bool,
}

impl StackMachine {
    pub fn new(image: ConversationImage, host: Box<dyn ConversationHost>) -> Self {
        Self {
            image,
            host,
            stack: OperandStack::new(STACK_SIZE),
            strings: LocalStrings::default(),
            ip: 0,
            bp: UNSET_BP,
            result: 0,
            depth: 0,
            finished: true,
        }
    }

    /// Use `strings` as the conversation's string block.
    pub fn with_strings(mut self, strings: Vec<String>) -> Self {
        self.strings = LocalStrings::new(strings);
        self
    }

    /// Reset registers and the stack, then load the private and imported globals.
    pub fn init(&mut self, globals: &[u16]) -> Result<(), VmError> {
        self.ip = 0;
        self.bp = UNSET_BP;
        self.result = 0;
        self.depth = 0;
        self.finished = false;

        self.stack.reset();
        self.stack
            .set_sp(self.image.reserved_globals.wrapping_sub(1))?;

        for (slot, value) in globals.iter().enumerate() {
            self.stack.set(slot as u16, *value)?;
        }

        for (slot, item) in &self.image.imported_globals {
            let access = GlobalAccess {
                slot: *slot,
                name: Some(item.name.as_str()),
                value: self.stack.at(*slot)?,
            };
            let value = self.host.read_global(access);
            trace!("imported global {} = {value:#06x}", item.name);
            self.stack.set(*slot, value)?;
        }

        debug!(
            "initialized conversation with {} code words, {} reserved globals",
            self.image.code.len(),
            self.image.reserved_globals
        );
        Ok(())
    }

    /// Write the private globals back into `globals`.
    pub fn done(&self, globals: &mut [u16]) {
        for (slot, value) in globals.iter_mut().enumerate() {
            if let Ok(current) = self.stack.at(slot as u16) {
                *value = current;
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Execute one instruction.
    ///
    /// On a fault the instruction pointer stays on the faulting instruction and
    /// the machine is finished.
    pub fn step(&mut self) -> Result<Step, VmError> {
        if self.finished {
            return Err(VmError::Finished);
        }
        match self.execute() {
            Ok(Step::Finished(reason)) => {
                self.finished = true;
                debug!("conversation finished at {:04x} ({reason:?})", self.ip);
                Ok(Step::Finished(reason))
            }
            Ok(Step::Continue) => Ok(Step::Continue),
            Err(err) => {
                self.finished = true;
                warn!("conversation fault: {err}");
                Err(err)
            }
        }
    }

    /// Step until the machine finishes or `max_steps` instructions have run.
    pub fn run(&mut self, max_steps: usize) -> Result<RunOutcome, VmError> {
        for steps in 1..=max_steps {
            if let Step::Finished(reason) = self.step()? {
                return Ok(RunOutcome::Finished { reason, steps });
            }
        }
        Ok(RunOutcome::StepLimit { steps: max_steps })
    }

    fn execute(&mut self) -> Result<Step, VmError> {
        use Opcode::*;

        let pos = self.ip;
        let word = *self
            .image
            .code
            .get(pos as usize)
            .ok_or(VmError::CodeOutOfBounds { pos })?;
        let opcode = Opcode::from_word(word).ok_or(VmError::UnknownOpcode { pos, word })?;
        let operand = if opcode.has_operand() {
            *self
                .image
                .code
                .get(pos as usize + 1)
                .ok_or(VmError::CodeOutOfBounds { pos: pos.wrapping_add(1) })?
        } else {
            0
        };
        trace!(
            "{pos:04x} {opcode} {operand:#06x} sp={:04x} bp={:04x}",
            self.stack.sp(),
            self.bp
        );

        let mut next = pos.wrapping_add(1 + opcode.operand_count());
        let branch_target = operand.wrapping_add(pos).wrapping_add(1);

        match opcode {
            Nop | Start | RespondOp => {}

            OpAdd | OpMul | OpSub | OpDiv | OpMod | OpOr | OpAnd | TstGt | TstGe | TstLt
            | TstLe | TstEq | TstNe => {
                let right = self.stack.pop()?;
                let left = self.stack.pop()?;
                let value = binary(opcode, left, right).ok_or(VmError::DivisionByZero { pos })?;
                self.stack.push(value)?;
            }
            OpNot => {
                let value = self.stack.pop()?;
                self.stack.push(u16::from(value == 0))?;
            }
            OpNeg => {
                let value = self.stack.pop()?;
                self.stack.push(value.wrapping_neg())?;
            }

            Jmp => next = operand,
            Bra => next = branch_target,
            Beq => {
                if self.stack.pop()? == 0 {
                    next = branch_target;
                }
            }
            Bne => {
                if self.stack.pop()? != 0 {
                    next = branch_target;
                }
            }

            Call => {
                if self.depth >= MAX_CALL_DEPTH {
                    return Err(VmError::CallDepthExceeded { pos });
                }
                self.stack.push(pos.wrapping_add(1))?;
                self.depth += 1;
                next = operand;
            }
            Calli => self.call_intrinsic(pos, operand)?,
            Ret => {
                if self.depth == 0 {
                    return Ok(Step::Finished(FinishReason::Return));
                }
                self.depth -= 1;
                // Returning to nesting level zero ends the whole conversation.
                if self.depth == 0 {
                    return Ok(Step::Finished(FinishReason::Return));
                }
                next = self.stack.pop()?.wrapping_add(1);
            }

            Pushi => self.stack.push(operand)?,
            PushiEff => self
                .stack
                .push(self.bp.wrapping_add(operand as i16 as u16))?,
            Pop => {
                self.stack.pop()?;
            }
            Swap => {
                let first = self.stack.pop()?;
                let second = self.stack.pop()?;
                self.stack.push(first)?;
                self.stack.push(second)?;
            }

            PushBp => self.stack.push(self.bp)?,
            PopBp => self.bp = self.stack.pop()?,
            SpToBp => self.bp = self.stack.sp(),
            BpToSp => self.stack.set_sp(self.bp)?,
            AddSp => {
                let count = self.stack.pop()?;
                for _ in 0..count {
                    self.stack.push(LOCAL_FILL)?;
                }
            }

            FetchM => {
                let address = self.stack.pop()?;
                let mut value = self.stack.at(address)?;
                if address < self.image.reserved_globals {
                    let access = GlobalAccess {
                        slot: address,
                        name: self.image.global_name(address),
                        value,
                    };
                    value = self.host.read_global(access);
                    trace!("fetch global {address:#06x} = {value:#06x}");
                }
                self.stack.push(value)?;
            }
            Sto => {
                let value = self.stack.pop()?;
                let address = self.stack.pop()?;
                if address < self.image.reserved_globals {
                    trace!("store global {address:#06x} = {value:#06x}");
                    let access = GlobalAccess {
                        slot: address,
                        name: self.image.global_name(address),
                        value,
                    };
                    self.host.write_global(access);
                }
                self.stack.set(address, value)?;
            }
            Offset => {
                let index = self.stack.pop()?;
                let base = self.stack.pop()?;
                self.stack
                    .push(index.wrapping_add(base).wrapping_sub(1))?;
            }

            SaveReg => self.result = self.stack.pop()?,
            PushReg => self.stack.push(self.result)?,

            StrCmp => return Err(VmError::UnsupportedOpcode { pos, opcode }),
            ExitOp => return Ok(Step::Finished(FinishReason::Exit)),
            SayOp => {
                let id = self.stack.pop()?;
                let text = self.expand_string(id);
                self.host.say(id, &text);
            }
        }

        self.ip = next;
        Ok(Step::Continue)
    }

    fn call_intrinsic(&mut self, pos: u16, id: u16) -> Result<(), VmError> {
        let name = self
            .image
            .imported_functions
            .get(&id)
            .map(|item| item.name.as_str())
            .ok_or(VmError::UnknownIntrinsic { pos, id })?;

        let mut call = IntrinsicCall::new(id, name, pos, &self.stack, &mut self.strings);
        trace!("calling intrinsic {name} with {} arguments", call.arg_count());

        self.result = match name {
            "compare" => {
                let first = call.string_arg(0)?.to_lowercase();
                let second = call.string_arg(1)?.to_lowercase();
                u16::from(first == second)
            }
            "contains" => {
                let haystack = call.string_arg(0)?.to_lowercase();
                let needle = call.string_arg(1)?.to_lowercase();
                u16::from(haystack.contains(&needle))
            }
            "length" => call.string_arg(0)?.len() as u16,
            _ => self.host.invoke_intrinsic(&mut call),
        };
        Ok(())
    }

    fn expand_string(&self, id: u16) -> String {
        self.strings
            .get(id)
            .map(|text| self.expand_placeholders(text))
            .unwrap_or_default()
    }

    /// Replace `@GS`, `@GI`, `@SS`, `@SI`, `@PS` and `@PI` placeholders in `text`.
    pub fn expand_placeholders(&self, text: &str) -> String {
        expand_with(
            text,
            |placeholder| {
                let param = placeholder.param as u16;
                let at = |index: u16| self.stack.at(index).unwrap_or(0);
                match placeholder.source {
                    PlaceholderSource::Global => at(param),
                    PlaceholderSource::Frame => at(self.bp.wrapping_add(param)),
                    PlaceholderSource::Pointer => at(at(self.bp.wrapping_add(param))),
                }
            },
            |id| self.strings.get(id).unwrap_or_default().to_string(),
        )
    }

    /// Allocate a new local string and return its id.
    pub fn alloc_string(&mut self, text: impl Into<String>) -> u16 {
        self.strings.alloc(text)
    }

    pub fn ip(&self) -> u16 {
        self.ip
    }

    pub fn bp(&self) -> u16 {
        self.bp
    }

    pub fn sp(&self) -> u16 {
        self.stack.sp()
    }

    pub fn result_register(&self) -> u16 {
        self.result
    }

    pub fn call_depth(&self) -> u32 {
        self.depth
    }

    pub fn stack(&self) -> &OperandStack {
        &self.stack
    }

    pub fn strings(&self) -> &LocalStrings {
        &self.strings
    }

    pub fn image(&self) -> &ConversationImage {
        &self.image
    }
}

/// Evaluate `left OP right`; `None` on division by zero.
fn binary(opcode: Opcode, left: u16, right: u16) -> Option<u16> {
    use Opcode::*;

    let value = match opcode {
        OpAdd => left.wrapping_add(right),
        OpSub => left.wrapping_sub(right),
        OpMul => left.wrapping_mul(right),
        OpDiv => left.checked_div(right)?,
        OpMod => left.checked_rem(right)?,
        OpOr => u16::from(left != 0 || right != 0),
        OpAnd => u16::from(left != 0 && right != 0),
        TstGt => u16::from(left > right),
        TstGe => u16::from(left >= right),
        TstLt => u16::from(left < right),
        TstLe => u16::from(left <= right),
        TstEq => u16::from(left == right),
        TstNe => u16::from(left != right),
        _ => return None,
    };
    Some(value)
}


#[cfg(test)]
mod proptests {
    use conv_bytecode::ConversationImage;
    use proptest::prelude::*;

    use super::*;
    use crate::NullHost;

    fn eval(opcode: Opcode, left: u16, right: u16) -> Result<Vec<u16>, VmError> {
        let code = vec![
            Opcode::Pushi as u16,
            left,
            Opcode::Pushi as u16,
            right,
            opcode as u16,
            Opcode::ExitOp as u16,
        ];
        let mut m = StackMachine::new(ConversationImage::from_code(code), Box::new(NullHost));
        m.init(&[])?;
        m.run(10)?;
        Ok(m.stack().contents().to_vec())
    }

    proptest! {
        #[test]
        fn subtraction_is_left_minus_right(left: u16, right: u16) {
            prop_assert_eq!(eval(Opcode::OpSub, left, right), Ok(vec![left.wrapping_sub(right)]));
        }

        #[test]
        fn comparisons_are_boolean(left: u16, right: u16) {
            for opcode in [Opcode::TstGt, Opcode::TstGe, Opcode::TstLt, Opcode::TstLe, Opcode::TstEq, Opcode::TstNe] {
                let result = eval(opcode, left, right).unwrap();
                prop_assert!(result == vec![0] || result == vec![1]);
            }
            prop_assert_eq!(eval(Opcode::TstLt, left, right), Ok(vec![u16::from(left < right)]));
        }

        #[test]
        fn division_faults_only_on_zero_divisor(left: u16, right: u16) {
            let result = eval(Opcode::OpDiv, left, right);
            if right == 0 {
                prop_assert_eq!(result, Err(VmError::DivisionByZero { pos: 4 }));
            } else {
                prop_assert_eq!(result, Ok(vec![left / right]));
            }
        }
    }
}
