//! Jumps no structured pass explained become `return`, `continue` or `goto`.

use std::collections::HashSet;

use conv_bytecode::Opcode;
use tracing::warn;

use crate::{graph::ItemId, naming::label_name, DecompileError, Decompiler};

impl Decompiler {
    /// A conditional branch without a condition left to test is an error.
    pub(crate) fn add_goto_fallbacks(&mut self, func: usize) -> Result<(), DecompileError> {
        let (start, stop) = self.function_bounds(func);
        let end = self.functions[func].end;
        let leftovers: Vec<ItemId> = self
            .graph
            .iter_from(start)
            .take_while(|(id, _)| *id != stop)
            .filter(|(_, item)| !item.processed && item.as_opcode().is_some())
            .map(|(id, _)| id)
            .collect();

        let mut labelled = HashSet::new();
        for id in leftovers {
            let item = &self.graph[id];
            let pos = item.pos;
            let Some(op) = item.as_opcode() else {
                continue;
            };
            let target = op.target_pos;
            let label = op.target_label.clone();

            match (op.opcode, target) {
                (Some(Opcode::Jmp | Opcode::Bra), Some(target)) => {
                    if target == end {
                        self.add_statement(id, "return;", true);
                    } else if self.is_continue(pos, target) {
                        self.add_statement(id, "continue;", true);
                    } else {
                        let label = label.unwrap_or_else(|| label_name(target));
                        self.add_statement(id, format!("goto {label};"), true);
                        self.add_goto_label(target, &label, &mut labelled);
                    }
                }
                (Some(opcode @ (Opcode::Beq | Opcode::Bne)), Some(target)) => {
                    let condition = self.previous_open_expression(start, id).ok_or(
                        DecompileError::OperandCountMismatch {
                            pos,
                            needed: 1,
                            found: 0,
                        },
                    )?;
                    let (text, _) = self.condition_text(condition);
                    let label = label.unwrap_or_else(|| label_name(target));
                    let statement = if opcode == Opcode::Beq {
                        format!("if (!({text})) goto {label};")
                    } else {
                        format!("if ({text}) goto {label};")
                    };
                    self.graph[id].processed = true;
                    self.add_statement(condition, statement, true);
                    self.add_goto_label(target, &label, &mut labelled);
                }
                (Some(opcode), _) => warn!("leftover {opcode} at {pos:04x}"),
                (None, _) => warn!("leftover unknown word {:#06x} at {pos:04x}", op.word),
            }
        }
        Ok(())
    }

    fn is_continue(&self, pos: u16, target: u16) -> bool {
        self.continue_ranges
            .iter()
            .any(|&(head, tail)| head == target && head < pos && pos < tail)
    }

    fn previous_open_expression(&self, start: ItemId, from: ItemId) -> Option<ItemId> {
        let mut cursor = self.graph.prev(from);
        while let Some(id) = cursor.filter(|id| *id != start) {
            if self.graph[id].is_open_expression() {
                return Some(id);
            }
            cursor = self.graph.prev(id);
        }
        None
    }

    /// Emit `label:;` once per target.
    fn add_goto_label(&mut self, target: u16, label: &str, labelled: &mut HashSet<u16>) {
        if !labelled.insert(target) {
            return;
        }
        if let Some(at) = self.graph.find_pos(target) {
            self.add_indented_statement(at, format!("{label}:;"), -1, 1, false);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        testing::{code_text, decompiled, decompiled_err},
        DecompileError,
    };

    #[test]
    fn unstructured_jumps_share_one_label() {
        let decompiler = decompiled(
            "
                PUSHBP
                SPTOBP
                PUSHI 0
                ADDSP
                JMP there
                PUSHI 1
                SAY_OP
            there:
                PUSHI 2
                SAY_OP
                JMP back
                PUSHI 3
                SAY_OP
            back:
                JMP there
                BPTOSP
                POPBP
                RET
            ",
        );
        let text = code_text(&decompiler);
        assert_eq!(text.matches("label_000a:;").count(), 1, "{text}");
        assert_eq!(text.matches("goto label_000a;").count(), 2, "{text}");
        assert_eq!(text.matches("goto label_0012;").count(), 1, "{text}");
        assert!(text.contains(r#"label_000a:;say("two");"#), "{text}");
    }

    #[test]
    fn jump_to_the_epilogue_returns() {
        let decompiler = decompiled(
            "
                PUSHBP
                SPTOBP
                PUSHI 0
                ADDSP
                JMP out
                PUSHI 1
                SAY_OP
            out:
                BPTOSP
                POPBP
                RET
            ",
        );
        let text = code_text(&decompiler);
        assert!(text.contains(r#"return;say("one");"#), "{text}");
        assert!(!text.contains("goto"), "{text}");
    }

    #[test]
    fn backward_branch_becomes_conditional_goto() {
        let decompiler = decompiled(
            "
                PUSHBP
                SPTOBP
                PUSHI 1
                ADDSP
            again:
                PUSHI 1
                SAY_OP
                PUSHI_EFF 1
                FETCHM
                BNE again
                BPTOSP
                POPBP
                RET
            ",
        );
        let text = code_text(&decompiler);
        assert!(text.contains(r#"label_0005:;say("one");if (local_1) goto label_0005;"#), "{text}");
    }

    #[test]
    fn branch_without_a_condition_is_rejected() {
        let err = decompiled_err(
            "
                PUSHBP
                SPTOBP
                PUSHI 1
                ADDSP
                PUSHI_EFF 1
                PUSHI 1
                STO
                BEQ skip
                PUSHI 1
                SAY_OP
            skip:
                BPTOSP
                POPBP
                RET
            ",
        );
        assert_eq!(
            err,
            DecompileError::OperandCountMismatch {
                pos: 0x000a,
                needed: 1,
                found: 0
            }
        );
    }
}
