//! `switch` statements.
//!
//! Each case compiles to `lhs == rhs; BEQ next_case; body; JMP join`, with
//! every break jumping to the same join position.

use conv_bytecode::Opcode;
use tracing::debug;

use super::split_comparison;
use crate::{graph::ItemId, Decompiler};

#[derive(Debug, Clone, Copy)]
struct SwitchCase {
    beq: ItemId,
    /// The JMP ending the case body.
    exit: ItemId,
    /// A second JMP to the join directly before `exit`.
    extra_exit: Option<ItemId>,
    /// Where the next case starts.
    next: u16,
    join: u16,
}

impl Decompiler {
    pub(crate) fn find_switches(&mut self, func: usize) {
        let (_, stop) = self.function_bounds(func);
        for condition in self.open_conditions(func) {
            if self.graph[condition].is_open_expression() {
                self.try_switch(condition, stop);
            }
        }
    }

    fn match_switch_case(&self, condition: ItemId, stop: ItemId) -> Option<SwitchCase> {
        let branch = self.forward_branch(condition, stop)?;
        let next_case = self.graph.find_pos(branch.target)?;
        let exit = self.graph.prev(next_case)?;
        let join = self.open_jump_target(exit, Opcode::Jmp)?;
        if join <= branch.beq_pos {
            return None;
        }
        let extra_exit = self
            .graph
            .prev(exit)
            .filter(|id| self.open_jump_target(*id, Opcode::Jmp) == Some(join));
        Some(SwitchCase {
            beq: branch.beq,
            exit,
            extra_exit,
            next: branch.target,
            join,
        })
    }

    /// The case condition starting at `pos`, if it compares `lhs` again.
    fn next_case_condition(&self, pos: u16, lhs: &str) -> Option<ItemId> {
        let id = self.graph.find_pos(pos)?;
        let item = &self.graph[id];
        if !item.is_open_expression() {
            return None;
        }
        let text = &item.as_expression()?.text;
        (split_comparison(text)?.0 == lhs).then_some(id)
    }

    fn try_switch(&mut self, first: ItemId, stop: ItemId) {
        let (text, _) = self.condition_text(first);
        let Some((lhs, _)) = split_comparison(&text) else {
            return;
        };
        let lhs = lhs.to_string();
        let Some(mut case) = self.match_switch_case(first, stop) else {
            return;
        };
        if self.next_case_condition(case.next, &lhs).is_none() {
            return;
        }

        debug!("switch on {lhs} at {:04x}", self.graph[first].pos);
        let join = case.join;
        self.add_indented_statement(first, format!("switch ({lhs}) {{"), 0, 1, true);

        let mut condition = first;
        loop {
            self.emit_case(condition, &case);

            let following = self
                .next_case_condition(case.next, &lhs)
                .filter(|id| self.graph[*id].pos < join)
                .and_then(|id| {
                    self.match_switch_case(id, stop)
                        .filter(|next| next.join == join)
                        .map(|next| (id, next))
                });
            match following {
                Some((id, next)) => {
                    condition = id;
                    case = next;
                }
                None => break,
            }
        }

        if let Some(close_at) = self.graph.find_pos(case.next).and_then(|id| self.graph.prev(id)) {
            self.add_indented_statement(close_at, "} // end-switch", -1, 0, false);
        }
    }

    fn emit_case(&mut self, condition: ItemId, case: &SwitchCase) {
        let (text, _) = self.condition_text(condition);
        let value = split_comparison(&text).map(|(_, rhs)| rhs).unwrap_or_default();
        self.add_indented_statement(condition, format!("case {value}:"), 0, 1, true);

        self.graph[case.beq].processed = true;
        self.graph[case.exit].processed = true;
        let break_at = match case.extra_exit {
            Some(extra) => {
                self.graph[extra].processed = true;
                extra
            }
            None => case.exit,
        };
        self.add_indented_statement(break_at, "break;", 0, -1, true);
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::{code_text, decompiled};

    #[test]
    fn three_cases_share_one_join() {
        let decompiler = decompiled(
            "
                PUSHBP
                SPTOBP
                PUSHI 1
                ADDSP
            case1:
                PUSHI_EFF 1
                FETCHM
                PUSHI 1
                TSTEQ
                BEQ case2
                PUSHI 1
                SAY_OP
                JMP join
            case2:
                PUSHI_EFF 1
                FETCHM
                PUSHI 2
                TSTEQ
                BEQ case3
                PUSHI 2
                SAY_OP
                JMP join
            case3:
                PUSHI_EFF 1
                FETCHM
                PUSHI 3
                TSTEQ
                BEQ join
                PUSHI 3
                SAY_OP
                JMP join
            join:
                BPTOSP
                POPBP
                RET
            ",
        );

        let text = code_text(&decompiler);
        let expected = concat!(
            "switch (local_1) {",
            "case 1:",
            r#"say("one");"#,
            "break;",
            "case 2:",
            r#"say("two");"#,
            "break;",
            "case 3:",
            r#"say("three");"#,
            "break;",
            "} // end-switch",
            "} // end-function",
        );
        assert!(text.contains(expected), "{text}");
        assert!(!text.contains("goto"), "{text}");
    }
}
