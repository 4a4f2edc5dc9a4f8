//! `while` and `do ... while` loops.

use conv_bytecode::Opcode;
use tracing::{debug, warn};

use crate::Decompiler;

impl Decompiler {
    /// `cond; BEQ exit; body; BRA cond; exit:`
    pub(crate) fn find_while_loops(&mut self, func: usize) {
        let (_, stop) = self.function_bounds(func);
        for condition in self.open_conditions(func) {
            let Some(branch) = self.forward_branch(condition, stop) else {
                continue;
            };
            let Some(exit) = self.graph.find_pos(branch.target) else {
                continue;
            };
            let Some(bra) = self.graph.prev(exit) else {
                continue;
            };
            let Some(loop_target) = self.open_jump_target(bra, Opcode::Bra) else {
                continue;
            };
            let bra_pos = self.graph[bra].pos;
            if loop_target > bra_pos {
                continue;
            }
            let condition_pos = self.graph[condition].pos;
            if loop_target != condition_pos {
                warn!("loop at {bra_pos:04x} jumps back to {loop_target:04x}, possibly a for loop");
                continue;
            }

            debug!("while loop at {condition_pos:04x}");
            self.continue_ranges.insert((condition_pos, bra_pos));
            let (text, _) = self.condition_text(condition);
            self.add_indented_statement(condition, format!("while ({text}) {{"), 0, 1, true);
            self.graph[branch.beq].processed = true;
            self.add_indented_statement(bra, "} // end-while", -1, 0, true);
        }
    }

    /// `body: ...; cond; BEQ exit; JMP body; exit:`
    pub(crate) fn find_do_while_loops(&mut self, func: usize) {
        let (_, stop) = self.function_bounds(func);
        for condition in self.open_conditions(func) {
            let Some(branch) = self.forward_branch(condition, stop) else {
                continue;
            };
            let Some(jmp) = self.graph.next(branch.beq) else {
                continue;
            };
            let Some(body) = self.open_jump_target(jmp, Opcode::Jmp) else {
                continue;
            };
            if body > branch.beq_pos {
                continue;
            }
            let Some(body_start) = self.graph.find_pos(body) else {
                continue;
            };

            let jmp_pos = self.graph[jmp].pos;
            debug!("do-while loop from {body:04x} to {jmp_pos:04x}");
            self.continue_ranges.insert((body, jmp_pos));
            self.add_indented_statement(body_start, "do {", 0, 1, false);

            let (text, _) = self.condition_text(condition);
            self.add_indented_statement(condition, format!("}} while ({text});"), -1, 0, true);
            self.graph[branch.beq].processed = true;
            self.graph[jmp].processed = true;
            if let Some(extra) = self
                .graph
                .next(jmp)
                .filter(|id| self.graph[*id].is_open_opcode(Opcode::Jmp))
            {
                self.graph[extra].processed = true;
            }
        }
    }
}
