//! Turning opcodes into expressions and statements.
//!
//! [`Decompiler::analyze_function`] walks a function's opcodes and replaces
//! each one with an expression (pushes), an operator (anything consuming stack
//! values) or a statement. [`Decompiler::combine_operators`] then folds every
//! operator together with the expressions it consumes into a new expression or
//! statement.

mod arithmetic;
mod calls;
mod memory;

use conv_bytecode::{DataType, Opcode};
use tracing::trace;

use crate::{
    graph::{ExpressionItem, GraphItem, ItemId, ItemKind, OperatorItem, StatementItem},
    DecompileError, Decompiler, Worklist,
};

const LOCAL_ARRAY_ELEMENT: [Opcode; 3] = [Opcode::Pushi, Opcode::PushiEff, Opcode::Offset];
const RETURN_VALUE: [Opcode; 2] = [Opcode::SaveReg, Opcode::Pop];

/// Expressions an operator consumes, most recently pushed first.
pub(crate) struct Operands {
    pub ids: Vec<ItemId>,
    /// A statement lies between the operator and its operands.
    pub crossed_statement: bool,
}

impl Operands {
    /// Where the combined item goes: in place of the operands when they are
    /// contiguous, otherwise at the operator.
    fn insert_point(&self, operator: ItemId) -> ItemId {
        match self.ids.last() {
            Some(earliest) if !self.crossed_statement => *earliest,
            _ => operator,
        }
    }
}

impl Decompiler {
    /// First and last item of function `func`.
    pub(crate) fn function_bounds(&self, func: usize) -> (ItemId, ItemId) {
        let info = &self.functions[func];
        (info.start_item, info.end_item)
    }

    /// Replace the opcodes of function `func` by expressions, operators and statements.
    pub(crate) fn analyze_function(
        &mut self,
        func: usize,
        worklist: &mut Worklist,
    ) -> Result<(), DecompileError> {
        let (start, stop) = self.function_bounds(func);
        let mut cursor = self.graph.next(start);
        while let Some(id) = cursor {
            if id == stop {
                break;
            }
            cursor = self.graph.next(id);

            let item = &self.graph[id];
            if item.processed {
                continue;
            }
            let Some(opcode) = item.opcode() else {
                continue;
            };

            if self.graph.match_pattern(id, stop, &LOCAL_ARRAY_ELEMENT) {
                self.add_local_array_element(func, id);
                self.graph.mark_opcodes_processed(id, LOCAL_ARRAY_ELEMENT.len());
                continue;
            }
            if self.graph.match_pattern(id, stop, &RETURN_VALUE) {
                self.add_operator(id, OperatorItem::new(Opcode::SaveReg, 1, false, DataType::Void));
                self.graph.mark_opcodes_processed(id, RETURN_VALUE.len());
                self.functions[func].return_type = DataType::Int;
                continue;
            }

            match opcode {
                Opcode::SayOp => {
                    self.add_operator(id, OperatorItem::new(opcode, 1, false, DataType::Void));
                }
                Opcode::ExitOp => {
                    self.add_statement(id, "exit;", true);
                }
                Opcode::Calli => self.add_intrinsic_call(id, stop)?,
                Opcode::Call => self.add_local_call(func, id, stop, worklist)?,
                Opcode::OpAdd
                | Opcode::OpMul
                | Opcode::OpSub
                | Opcode::OpDiv
                | Opcode::OpMod
                | Opcode::OpOr
                | Opcode::OpAnd
                | Opcode::TstGt
                | Opcode::TstGe
                | Opcode::TstLt
                | Opcode::TstLe
                | Opcode::TstEq
                | Opcode::TstNe => {
                    self.add_operator(id, OperatorItem::new(opcode, 2, true, DataType::Int));
                }
                Opcode::OpNeg | Opcode::OpNot => {
                    self.add_operator(id, OperatorItem::new(opcode, 1, true, DataType::Int));
                }
                Opcode::Sto => self.add_store(id),
                Opcode::PushiEff => self.add_local_or_param(func, id),
                Opcode::Pushi => {
                    // the argument count of an intrinsic call is picked up by the call
                    let before_calli = cursor.is_some_and(|next| self.graph[next].is_opcode(Opcode::Calli));
                    if !before_calli {
                        self.add_immediate(id);
                    }
                }
                Opcode::FetchM => {
                    self.add_operator(id, OperatorItem::new(opcode, 1, true, DataType::Int));
                }
                Opcode::Offset => {
                    self.add_operator(id, OperatorItem::new(opcode, 2, true, DataType::Int));
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Fold every operator of function `func` with its operands.
    pub(crate) fn combine_operators(&mut self, func: usize) -> Result<(), DecompileError> {
        let (start, stop) = self.function_bounds(func);
        let mut cursor = self.graph.next(start);
        while let Some(id) = cursor {
            if id == stop {
                break;
            }
            let item = &self.graph[id];
            if !item.processed {
                if let Some(operator) = item.as_operator().cloned() {
                    self.combine_operator(func, id, operator)?;
                }
            }
            cursor = self.graph.next(id);
        }
        Ok(())
    }

    fn combine_operator(
        &mut self,
        func: usize,
        id: ItemId,
        operator: OperatorItem,
    ) -> Result<(), DecompileError> {
        let pos = self.graph[id].pos;
        let (start, _) = self.function_bounds(func);
        let operands = self.collect_operands(start, id, operator.needed)?;
        let at = operands.insert_point(id);
        trace!("combining {} at {pos:04x} with {} operands", operator.opcode, operands.ids.len());

        let combined = match operator.opcode {
            Opcode::Call | Opcode::Calli => self.combine_call(func, at, pos, &operator, &operands)?,
            Opcode::SaveReg => self.combine_return(at, &operands),
            Opcode::SayOp => self.combine_say(at, pos, &operands)?,
            Opcode::FetchM => self.combine_deref(at, pos, &operands)?,
            Opcode::Offset => self.combine_array_element(at, pos, &operands)?,
            Opcode::Sto => self.combine_store(id, at, pos, &operator, &operands)?,
            Opcode::OpNeg | Opcode::OpNot => self.combine_unary(at, pos, &operator, &operands)?,
            _ => self.combine_binary(at, pos, &operator, &operands)?,
        };

        if let Some(&earliest) = operands.ids.last() {
            if matches!(self.graph[combined].kind, ItemKind::Expression(_)) {
                if let Some(label) = self.graph[earliest].label.take() {
                    let count = std::mem::take(&mut self.graph[earliest].xref_count);
                    let new_item = &mut self.graph[combined];
                    new_item.label = Some(label);
                    new_item.xref_count = count;
                }
            }
        }

        self.graph[id].processed = true;
        for operand in &operands.ids {
            self.graph[*operand].processed = true;
        }
        Ok(())
    }

    /// Walk back from `operator` collecting `needed` open expressions.
    fn collect_operands(
        &self,
        start: ItemId,
        operator: ItemId,
        needed: u16,
    ) -> Result<Operands, DecompileError> {
        let mut operands = Operands {
            ids: Vec::with_capacity(usize::from(needed)),
            crossed_statement: false,
        };
        let mut cursor = self.graph.prev(operator);
        while operands.ids.len() < usize::from(needed) {
            let Some(id) = cursor.filter(|id| *id != start) else {
                break;
            };
            let item = &self.graph[id];
            if item.is_open_expression() {
                operands.ids.push(id);
            } else if matches!(item.kind, ItemKind::Statement(_)) {
                operands.crossed_statement = true;
            }
            cursor = self.graph.prev(id);
        }

        if operands.ids.len() < usize::from(needed) {
            return Err(DecompileError::OperandCountMismatch {
                pos: self.graph[operator].pos,
                needed,
                found: operands.ids.len() as u16,
            });
        }
        Ok(operands)
    }

    /// Insert `expression` in front of `at`, which is marked processed and
    /// hands over its label.
    pub(crate) fn add_expression(&mut self, at: ItemId, expression: ExpressionItem) -> ItemId {
        let replaced = &mut self.graph[at];
        replaced.processed = true;
        let mut item = GraphItem::new(replaced.pos, ItemKind::Expression(expression));
        item.label = replaced.label.take();
        item.xref_count = std::mem::take(&mut replaced.xref_count);
        self.graph.insert_before(at, item)
    }

    pub(crate) fn add_operator(&mut self, at: ItemId, operator: OperatorItem) -> ItemId {
        let replaced = &mut self.graph[at];
        replaced.processed = true;
        let item = GraphItem::new(replaced.pos, ItemKind::Operator(operator));
        self.graph.insert_before(at, item)
    }

    /// Insert a statement in front of `at`, optionally marking `at` processed.
    pub(crate) fn add_statement(&mut self, at: ItemId, text: impl Into<String>, replaces: bool) -> ItemId {
        self.add_indented_statement(at, text, 0, 0, replaces)
    }

    pub(crate) fn add_indented_statement(
        &mut self,
        at: ItemId,
        text: impl Into<String>,
        indent_before: i32,
        indent_after: i32,
        replaces: bool,
    ) -> ItemId {
        let target = &mut self.graph[at];
        if replaces {
            target.processed = true;
        }
        let item = GraphItem::new(
            target.pos,
            ItemKind::Statement(StatementItem {
                text: text.into(),
                indent_before,
                indent_after,
            }),
        );
        self.graph.insert_before(at, item)
    }

    /// The expression behind `id`; callers only pass collected operands.
    pub(crate) fn expression(&self, id: ItemId) -> ExpressionItem {
        self.graph[id]
            .as_expression()
            .cloned()
            .unwrap_or_else(|| ExpressionItem::new("", false))
    }

    /// `global_N`, or the name of the imported global at `slot`.
    pub(crate) fn global_name(&self, slot: u16) -> String {
        self.imported_globals
            .get(&slot)
            .map(|item| item.name.clone())
            .unwrap_or_else(|| format!("global_{slot}"))
    }

    /// Quoted text of string `id`, with newlines escaped.
    pub(crate) fn string_literal(&self, id: u16) -> Option<String> {
        self.strings
            .get(usize::from(id))
            .map(|text| format!("\"{}\"", text.replace('\n', "\\n")))
    }
}
