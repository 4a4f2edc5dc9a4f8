use conv_bytecode::{DataType, Opcode};

use super::Operands;
use crate::{
    graph::{ExpressionItem, ItemId, OperatorItem},
    DecompileError, Decompiler,
};

impl Decompiler {
    /// `PUSHI offset; PUSHI_EFF local; OFFSET`
    pub(crate) fn add_local_array_element(&mut self, func: usize, pushi: ItemId) {
        let offset = self.operand(pushi);
        let local = self.graph.next(pushi).map(|id| self.operand(id)).unwrap_or_default();
        self.functions[func].note_array_access(local, offset);
        self.add_expression(pushi, ExpressionItem::new(format!("local_{local}[{offset}]"), true));
    }

    /// `PUSHI_EFF n`, with a following FETCHM reading the slot.
    ///
    /// Negative offsets address parameters, the others locals.
    pub(crate) fn add_local_or_param(&mut self, func: usize, id: ItemId) {
        let offset = self.operand(id);
        let fetch = self.consume_fetch(id);

        let expression = if offset > 0x7fff {
            let number = (-i32::from(offset as i16) - 1) as u16;
            self.functions[func].use_param(number);
            ExpressionItem::new(format!("param{number}"), true)
        } else {
            self.functions[func].use_local(offset);
            ExpressionItem::new(format!("local_{offset}"), !fetch)
        };
        self.add_expression(id, expression);
    }

    /// `PUSHI value`: a constant, or a global when a FETCHM follows.
    pub(crate) fn add_immediate(&mut self, id: ItemId) {
        let value = self.operand(id);
        let expression = if self.consume_fetch(id) {
            ExpressionItem::new(self.global_name(value), false)
        } else {
            ExpressionItem {
                immediate: Some(value),
                ..ExpressionItem::new(value.to_string(), false)
            }
        };
        self.add_expression(id, expression);
    }

    /// `[SWAP]; STO`
    pub(crate) fn add_store(&mut self, sto: ItemId) {
        let mut operator = OperatorItem::new(Opcode::Sto, 2, false, DataType::Void);
        if let Some(swap) = self.graph.prev(sto).filter(|id| self.graph[*id].is_open_opcode(Opcode::Swap)) {
            self.graph[swap].processed = true;
            operator.swap_store_args = true;
        }
        self.add_operator(sto, operator);
    }

    fn consume_fetch(&mut self, id: ItemId) -> bool {
        match self.graph.next(id) {
            Some(next) if self.graph[next].is_open_opcode(Opcode::FetchM) => {
                self.graph[next].processed = true;
                true
            }
            _ => false,
        }
    }

    fn operand(&self, id: ItemId) -> u16 {
        self.graph[id]
            .as_opcode()
            .and_then(|op| op.operand)
            .unwrap_or_default()
    }

    /// Reinterpret a pushed constant as the address of a global.
    pub(crate) fn use_as_global(&mut self, id: ItemId, slot: u16) {
        let name = self.global_name(slot);
        if let Some(expression) = self.graph[id].as_expression_mut() {
            expression.text = name;
            expression.is_address = true;
            expression.immediate = None;
        }
    }

    fn global_if_immediate(&mut self, id: ItemId) -> ExpressionItem {
        if let Some(slot) = self.expression(id).immediate {
            self.use_as_global(id, slot);
        }
        self.expression(id)
    }

    pub(super) fn combine_deref(
        &mut self,
        at: ItemId,
        pos: u16,
        operands: &Operands,
    ) -> Result<ItemId, DecompileError> {
        let address = self.global_if_immediate(operands.ids[0]);
        if !address.is_address {
            return Err(DecompileError::OperandKindMismatch {
                pos,
                detail: format!("cannot read through value '{}'", address.text),
            });
        }
        let value = ExpressionItem {
            is_address: false,
            ..address
        };
        Ok(self.add_expression(at, value))
    }

    pub(super) fn combine_array_element(
        &mut self,
        at: ItemId,
        pos: u16,
        operands: &Operands,
    ) -> Result<ItemId, DecompileError> {
        let base = self.global_if_immediate(operands.ids[0]);
        let index = self.expression(operands.ids[1]);
        if !base.is_address {
            return Err(DecompileError::OperandKindMismatch {
                pos,
                detail: format!("array base '{}' is not an address", base.text),
            });
        }
        if index.is_address {
            return Err(DecompileError::OperandKindMismatch {
                pos,
                detail: format!("array index '{}' is an address", index.text),
            });
        }
        let element = ExpressionItem::new(format!("{}[{}]", base.text, index.text), true);
        Ok(self.add_expression(at, element))
    }

    pub(super) fn combine_store(
        &mut self,
        operator_id: ItemId,
        at: ItemId,
        pos: u16,
        operator: &OperatorItem,
        operands: &Operands,
    ) -> Result<ItemId, DecompileError> {
        let (mut value_id, mut target_id) = (operands.ids[0], operands.ids[1]);
        if operator.swap_store_args {
            std::mem::swap(&mut value_id, &mut target_id);
        }

        let target = self.global_if_immediate(target_id);
        let value = self.expression(value_id);
        let literal = value
            .immediate
            .and_then(|id| self.menu_answer_literal(operator_id, &target.text, id));

        if !target.is_address {
            return Err(DecompileError::OperandKindMismatch {
                pos,
                detail: format!("cannot store into value '{}'", target.text),
            });
        }
        if value.is_address {
            return Err(DecompileError::OperandKindMismatch {
                pos,
                detail: format!("cannot store address '{}'", value.text),
            });
        }

        let text = match literal {
            Some(literal) => format!("{} = {literal}", target.text),
            None => format!("{} = {};", target.text, value.text),
        };
        Ok(self.add_statement(at, text, true))
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        testing::{code_text, decompiled, decompiled_err},
        DecompileError,
    };

    fn function(body: &str) -> String {
        format!("PUSHBP\nSPTOBP\nPUSHI 2\nADDSP\n{body}\nBPTOSP\nPOPBP\nRET")
    }

    #[test]
    fn locals_params_and_globals() {
        let decompiler = decompiled(&function(
            "
            PUSHI_EFF -2
            FETCHM
            FETCHM
            PUSHI 7
            FETCHM
            OPADD
            PUSHI_EFF 2
            SWAP
            STO
            ",
        ));
        let text = code_text(&decompiler);
        assert!(text.contains("local_2 = param1 + global_7;"), "{text}");
        assert!(text.contains("void start(int param1)"), "{text}");
        assert!(text.contains("int local_2;"), "{text}");
    }

    #[test]
    fn store_without_swap_takes_the_address_first() {
        let decompiler = decompiled(&function(
            "
            PUSHI_EFF 1
            PUSHI 5
            STO
            ",
        ));
        assert!(code_text(&decompiler).contains("local_1 = 5;"));
    }

    #[test]
    fn storing_into_a_value_is_rejected() {
        let err = decompiled_err(&function(
            "
            PUSHI_EFF 1
            FETCHM
            PUSHI 5
            STO
            ",
        ));
        assert!(matches!(err, DecompileError::OperandKindMismatch { .. }), "{err}");
    }
}
