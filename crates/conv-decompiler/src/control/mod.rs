//! Recovering structured control flow from the remaining jumps.
//!
//! Passes run per function in a fixed order: switch, while, do-while, if and
//! finally the goto fallback for whatever jumps are left. Each pass matches a
//! condition expression followed by a BEQ and rewrites the shape it recognizes
//! into indented statements, marking the jumps it explains processed.

mod branches;
mod fallback;
mod loops;
mod switch;

use conv_bytecode::{Opcode, UNARY_PRECEDENCE};

use crate::{graph::ItemId, DecompileError, Decompiler};

/// A condition expression and the forward BEQ testing it.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Branch {
    pub beq: ItemId,
    pub beq_pos: u16,
    pub target: u16,
}

/// Split `lhs == rhs`.
pub(crate) fn split_comparison(text: &str) -> Option<(&str, &str)> {
    text.split_once(" == ")
}

/// Whether `text` is one parenthesized group.
fn is_wrapped(text: &str) -> bool {
    if !text.starts_with('(') || !text.ends_with(')') {
        return false;
    }
    let mut depth = 0usize;
    for (index, c) in text.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 && index + 1 != text.len() {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}

/// Logical negation of a condition with the given precedence.
pub(crate) fn negate(text: &str, precedence: u8) -> String {
    if let Some(inner) = text.strip_prefix('!') {
        if is_wrapped(inner) {
            return inner[1..inner.len() - 1].to_string();
        }
        if precedence >= UNARY_PRECEDENCE {
            return inner.to_string();
        }
    }
    format!("!({text})")
}

impl Decompiler {
    /// Run every control flow pass over function `func`.
    pub(crate) fn structure_function(&mut self, func: usize) -> Result<(), DecompileError> {
        self.find_switches(func);
        self.find_while_loops(func);
        self.find_do_while_loops(func);
        self.find_if_statements(func);
        self.add_goto_fallbacks(func)
    }

    /// Open condition expressions of function `func`, in code order.
    fn open_conditions(&self, func: usize) -> Vec<ItemId> {
        let (start, stop) = self.function_bounds(func);
        self.graph
            .iter_from(start)
            .take_while(|(id, _)| *id != stop)
            .filter(|(_, item)| item.is_open_expression())
            .map(|(id, _)| id)
            .collect()
    }

    /// The forward BEQ that is the first open opcode after `condition`.
    fn forward_branch(&self, condition: ItemId, stop: ItemId) -> Option<Branch> {
        let item = &self.graph[condition];
        if !item.is_open_expression() {
            return None;
        }
        let beq = self.graph.next_open_opcode(condition, stop)?;
        if !self.graph[beq].is_opcode(Opcode::Beq) {
            return None;
        }
        let beq_pos = self.graph[beq].pos;
        let target = self.graph[beq].target_pos()?;
        (target > beq_pos).then_some(Branch {
            beq,
            beq_pos,
            target,
        })
    }

    /// The open item at `id` is `opcode`; returns its resolved target.
    fn open_jump_target(&self, id: ItemId, opcode: Opcode) -> Option<u16> {
        let item = &self.graph[id];
        if item.is_open_opcode(opcode) {
            item.target_pos()
        } else {
            None
        }
    }

    fn condition_text(&self, id: ItemId) -> (String, u8) {
        let expression = self.expression(id);
        (expression.text, expression.precedence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negation_strips_or_wraps() {
        assert_eq!(negate("local_1 == 0", 3), "!(local_1 == 0)");
        assert_eq!(negate("!local_1", UNARY_PRECEDENCE), "local_1");
        assert_eq!(negate("!(a && b)", 2), "a && b");
        assert_eq!(negate("!a && b", 2), "!(!a && b)");
        assert_eq!(negate("!(a) && (b)", 2), "!(!(a) && (b))");
    }

    #[test]
    fn comparison_splits_on_first_equality() {
        assert_eq!(split_comparison("local_1 == 3"), Some(("local_1", "3")));
        assert_eq!(split_comparison("local_1 != 3"), None);
    }
}
