//! `if` and `if ... else` statements.
//!
//! Besides the plain `cond; BEQ else; then; BRA endif; else: ...; endif:`
//! shape, the compiler emits an inverted form where the BEQ skips a single
//! `JMP` straight to the code run when the condition is false:
//! `cond; BEQ then; JMP endif; [BRA endif]; then: ...; endif:`.

use conv_bytecode::Opcode;
use tracing::debug;

use super::negate;
use crate::{graph::ItemId, Decompiler};

impl Decompiler {
    pub(crate) fn find_if_statements(&mut self, func: usize) {
        let (_, stop) = self.function_bounds(func);
        for condition in self.open_conditions(func) {
            self.try_if(condition, stop);
        }
    }

    fn try_if(&mut self, condition: ItemId, stop: ItemId) {
        let Some(branch) = self.forward_branch(condition, stop) else {
            return;
        };
        let Some(target_item) = self.graph.find_pos(branch.target) else {
            return;
        };

        let else_bra = self
            .graph
            .prev(target_item)
            .filter(|id| self.graph[*id].is_open_opcode(Opcode::Bra));
        let skip_jmp = self
            .graph
            .next(branch.beq)
            .filter(|id| self.graph[*id].is_open_opcode(Opcode::Jmp));
        let inverted = skip_jmp.is_some()
            && (branch.target == branch.beq_pos.wrapping_add(4)
                || branch.target == branch.beq_pos.wrapping_add(6));

        let (mut text, precedence) = self.condition_text(condition);
        let mut else_at = None;
        let endif;

        if let (Some(bra), false) = (else_bra, inverted) {
            let Some(endif_pos) = self.open_jump_target(bra, Opcode::Bra) else {
                return;
            };
            if endif_pos < branch.target {
                return;
            }
            let Some(endif_item) = self.graph.find_pos(endif_pos) else {
                return;
            };
            self.graph[bra].processed = true;
            else_at = self.graph.next(bra);
            endif = endif_item;

            // then-code ending in JMP endif; BRA endif
            if let Some(jmp) = self
                .graph
                .prev(bra)
                .filter(|id| self.open_jump_target(*id, Opcode::Jmp) == Some(endif_pos))
            {
                self.graph[jmp].processed = true;
            }
            // else-code ending in JMP endif
            if let Some(jmp) = self
                .graph
                .prev_opcode(endif)
                .filter(|id| self.open_jump_target(*id, Opcode::Jmp) == Some(endif_pos))
            {
                self.graph[jmp].processed = true;
            }
        } else if let (Some(jmp), true) = (skip_jmp, inverted) {
            let Some(endif_pos) = self.open_jump_target(jmp, Opcode::Jmp) else {
                return;
            };
            let Some(mut endif_item) = self.graph.find_pos(endif_pos) else {
                return;
            };
            self.graph[jmp].processed = true;
            text = negate(&text, precedence);

            if let Some(bra) = self
                .graph
                .next(jmp)
                .filter(|id| self.graph[*id].is_open_opcode(Opcode::Bra))
            {
                self.graph[bra].processed = true;
            }
            // a lone JMP to the next instruction where the BEQ lands
            if self.open_jump_target(target_item, Opcode::Jmp) == Some(branch.target.wrapping_add(2)) {
                self.graph[target_item].processed = true;
            }

            // the code run when the condition holds ends by jumping over an else block
            if let Some(last) = self.graph.prev_opcode(endif_item) {
                let last_pos = self.graph[last].pos;
                if let Some(past_else) = self.open_jump_target(last, Opcode::Jmp) {
                    if last_pos > branch.beq_pos && past_else > last_pos {
                        if let Some(new_endif) = self.graph.find_pos(past_else) {
                            self.graph[last].processed = true;
                            else_at = Some(endif_item);
                            endif_item = new_endif;
                        }
                    }
                }
            }
            endif = endif_item;
        } else {
            endif = target_item;
        }

        debug!("if at {:04x}", self.graph[condition].pos);
        self.graph[branch.beq].processed = true;
        self.add_indented_statement(condition, format!("if ({text}) {{"), 0, 1, true);
        if let Some(else_at) = else_at.filter(|at| *at != endif) {
            self.add_indented_statement(else_at, "} else {", -1, 1, false);
        }
        self.add_indented_statement(endif, "} // end-if", -1, 0, false);
    }
}

#[cfg(test)]
mod tests {
    use conv_bytecode::Opcode::*;

    use crate::testing::{code_text, decompiled_code};

    const PROLOGUE: [u16; 5] = [PushBp as u16, SpToBp as u16, Pushi as u16, 1, AddSp as u16];
    const EPILOGUE: [u16; 3] = [BpToSp as u16, PopBp as u16, Ret as u16];
    const CONDITION: [u16; 6] = [PushiEff as u16, 1, FetchM as u16, Pushi as u16, 0, TstEq as u16];

    fn function(body: &[u16]) -> Vec<u16> {
        [&PROLOGUE[..], &CONDITION[..], body, &EPILOGUE[..]].concat()
    }

    fn decompile(body: &[u16]) -> String {
        code_text(&decompiled_code(function(body)))
    }

    fn assert_code(body: &[u16], expected: &[&str]) {
        let text = decompile(body);
        let expected = expected.concat();
        assert!(text.contains(&expected), "expected {expected}\n in {text}");
    }

    #[test]
    fn if_without_else() {
        assert_code(
            &[Beq as u16, 3, Call as u16, 0],
            &["int local_1;", "if (local_1 == 0) {", "func_0000();", "} // end-if"],
        );
    }

    #[test]
    fn if_with_else() {
        assert_code(
            &[Beq as u16, 5, Call as u16, 0, Bra as u16, 3, Call as u16, 0],
            &[
                "int local_1;",
                "if (local_1 == 0) {",
                "func_0000();",
                "} else {",
                "func_0000();",
                "} // end-if",
            ],
        );
    }

    #[test]
    fn if_with_else_jmp_and_bra_after_then() {
        assert_code(
            &[Beq as u16, 7, Call as u16, 0, Jmp as u16, 0x15, Bra as u16, 3, Call as u16, 0],
            &[
                "int local_1;",
                "if (local_1 == 0) {",
                "func_0000();",
                "} else {",
                "func_0000();",
                "} // end-if",
            ],
        );
    }

    #[test]
    fn if_with_else_jmp_after_else() {
        assert_code(
            &[
                Beq as u16, 7, Call as u16, 0, Jmp as u16, 0x17, Bra as u16, 5, Call as u16, 0,
                Jmp as u16, 0x17,
            ],
            &[
                "int local_1;",
                "if (local_1 == 0) {",
                "func_0000();",
                "} else {",
                "func_0000();",
                "} // end-if",
            ],
        );
    }

    #[test]
    fn inverted_if() {
        assert_code(
            &[Beq as u16, 3, Jmp as u16, 0x11, Call as u16, 0],
            &["int local_1;", "if (!(local_1 == 0)) {", "func_0000();", "} // end-if"],
        );
    }

    #[test]
    fn inverted_if_with_empty_body() {
        assert_code(
            &[
                Beq as u16, 3, Jmp as u16, 0x0f, Pushi as u16, 42, PushiEff as u16, 1, Swap as u16,
                Sto as u16,
            ],
            &["int local_1;", "if (!(local_1 == 0)) {", "} // end-if"],
        );
    }

    #[test]
    fn inverted_if_with_bra_after_jmp() {
        assert_code(
            &[Beq as u16, 5, Jmp as u16, 0x13, Bra as u16, 3, Call as u16, 0],
            &["int local_1;", "if (!(local_1 == 0)) {", "func_0000();", "} // end-if"],
        );
    }

    #[test]
    fn inverted_if_with_else() {
        assert_code(
            &[
                Beq as u16, 5, Jmp as u16, 0x15, Bra as u16, 5, Call as u16, 0, Jmp as u16, 0x17,
                Call as u16, 0xffff,
            ],
            &[
                "int local_1;",
                "if (!(local_1 == 0)) {",
                "func_0000();",
                "} else {",
                "func_ffff();",
                "} // end-if",
            ],
        );
    }

    #[test]
    fn inverted_if_with_jmp_as_else_code() {
        assert_code(
            &[Beq as u16, 5, Jmp as u16, 0x15, Bra as u16, 3, Jmp as u16, 0x13, Call as u16, 0],
            &["int local_1;", "if (!(local_1 == 0)) {", "func_0000();", "} // end-if"],
        );
    }

    #[test]
    fn empty_function_gets_a_signature() {
        let text = code_text(&decompiled_code([&PROLOGUE[..], &EPILOGUE[..]].concat()));
        assert_eq!(text, "void start() // referenced 1 times{} // end-function");
    }
}
