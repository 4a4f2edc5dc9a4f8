use conv_bytecode::{Opcode, UNARY_PRECEDENCE};

use super::Operands;
use crate::{
    graph::{ExpressionItem, ItemId, OperatorItem},
    DecompileError, Decompiler,
};

/// Wrap `expression` in parentheses when it binds looser than `precedence`.
fn parenthesize(expression: &ExpressionItem, precedence: u8) -> String {
    if precedence > expression.precedence {
        format!("({})", expression.text)
    } else {
        expression.text.clone()
    }
}

fn require_value(expression: &ExpressionItem, pos: u16) -> Result<(), DecompileError> {
    if expression.is_address {
        return Err(DecompileError::OperandKindMismatch {
            pos,
            detail: format!("'{}' is an address, expected a value", expression.text),
        });
    }
    Ok(())
}

impl Decompiler {
    pub(super) fn combine_binary(
        &mut self,
        at: ItemId,
        pos: u16,
        operator: &OperatorItem,
        operands: &Operands,
    ) -> Result<ItemId, DecompileError> {
        let mut rhs = self.expression(operands.ids[0]);
        let mut lhs = self.expression(operands.ids[1]);
        // keep constants on the right of a comparison
        if operator.opcode == Opcode::TstEq && lhs.immediate.is_some() {
            std::mem::swap(&mut lhs, &mut rhs);
        }
        require_value(&lhs, pos)?;
        require_value(&rhs, pos)?;

        let text = format!(
            "{} {} {}",
            parenthesize(&lhs, operator.precedence),
            operator.opcode.operator_text(),
            parenthesize(&rhs, operator.precedence)
        );
        let expression = ExpressionItem {
            precedence: lhs.precedence.min(rhs.precedence).min(operator.precedence),
            ..ExpressionItem::new(text, false)
        };
        Ok(self.add_expression(at, expression))
    }

    pub(super) fn combine_unary(
        &mut self,
        at: ItemId,
        pos: u16,
        operator: &OperatorItem,
        operands: &Operands,
    ) -> Result<ItemId, DecompileError> {
        let operand = self.expression(operands.ids[0]);
        require_value(&operand, pos)?;

        let text = format!(
            "{}{}",
            operator.opcode.operator_text(),
            parenthesize(&operand, UNARY_PRECEDENCE)
        );
        let expression = ExpressionItem {
            precedence: operand.precedence.min(UNARY_PRECEDENCE),
            ..ExpressionItem::new(text, false)
        };
        Ok(self.add_expression(at, expression))
    }
}
