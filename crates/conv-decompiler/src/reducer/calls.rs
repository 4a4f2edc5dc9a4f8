use conv_bytecode::{DataType, Opcode};
use tracing::{debug, warn};

use super::Operands;
use crate::{
    graph::{ExpressionItem, ItemId, ItemKind, OperatorItem},
    intrinsics::parameter_info,
    DecompileError, Decompiler, Worklist,
};

impl Decompiler {
    /// `PUSHI n; CALLI id; POP...; [PUSH_REG]`
    pub(crate) fn add_intrinsic_call(&mut self, calli: ItemId, stop: ItemId) -> Result<(), DecompileError> {
        let pos = self.graph[calli].pos;
        let id = self.graph[calli]
            .as_opcode()
            .and_then(|op| op.operand)
            .unwrap_or_default();
        let name = self
            .imported_functions
            .get(&id)
            .map(|item| item.name.clone())
            .ok_or(DecompileError::UnknownIntrinsic { pos, id })?;

        self.graph[calli].processed = true;
        let at = match self.graph.prev(calli) {
            Some(count) if self.graph[count].is_open_opcode(Opcode::Pushi) => count,
            _ => calli,
        };

        let (pops, yields_expr) = self.consume_call_cleanup(calli, stop);
        let needed = pops.saturating_sub(1);

        let mut operator = OperatorItem::new(
            Opcode::Calli,
            needed,
            yields_expr,
            if yields_expr { DataType::Int } else { DataType::Void },
        );
        operator.arg = id;
        operator.precedence = Opcode::Call.precedence();
        match parameter_info(&name) {
            Some(info) if info.len() == usize::from(needed) => operator.param_types = info.types.to_vec(),
            Some(info) => warn!(
                "{name} at {pos:04x} takes {} arguments but {needed} were pushed",
                info.len()
            ),
            None => {}
        }
        self.add_operator(at, operator);
        Ok(())
    }

    /// `CALL target; POP...; [PUSH_REG]`
    pub(crate) fn add_local_call(
        &mut self,
        func: usize,
        call: ItemId,
        stop: ItemId,
        worklist: &mut Worklist,
    ) -> Result<(), DecompileError> {
        let item = &self.graph[call];
        let pos = item.pos;
        let (target, label) = match item.as_opcode() {
            Some(op) => (op.operand.unwrap_or_default(), op.target_label.clone()),
            None => return Ok(()),
        };

        let (pops, yields_expr) = self.consume_call_cleanup(call, stop);
        let mut operator = OperatorItem::new(
            Opcode::Call,
            pops,
            yields_expr,
            if yields_expr { DataType::Int } else { DataType::Void },
        );
        operator.arg = target;
        self.add_operator(call, operator);

        let caller = &self.functions[func];
        if target == caller.start || target == caller.entry {
            warn!("recursive call to {} at {pos:04x}", caller.name);
            return Ok(());
        }
        if target == 0xffff || label.as_deref().is_some_and(|label| label.starts_with("invalid_")) {
            debug!("call at {pos:04x} has no valid target");
            return Ok(());
        }

        let callee = self.function_at(target).ok_or_else(|| DecompileError::UnknownFunction {
            name: label.unwrap_or_else(|| self.options.function_name(target)),
        })?;
        let caller_name = self.functions[func].name.clone();
        let callee_info = &mut self.functions[callee];
        callee_info.callers.insert(caller_name);
        if !worklist.visited.contains(&callee_info.start) {
            worklist.queue.push_back(callee);
        }
        Ok(())
    }

    /// Consume the POPs removing the arguments after a call, and a PUSH_REG
    /// picking up its result.
    fn consume_call_cleanup(&mut self, call: ItemId, stop: ItemId) -> (u16, bool) {
        let mut pops = 0;
        let mut cursor = self.graph.next(call);
        while let Some(id) = cursor.filter(|id| *id != stop) {
            if !self.graph[id].is_open_opcode(Opcode::Pop) {
                break;
            }
            self.graph[id].processed = true;
            pops += 1;
            cursor = self.graph.next(id);
        }

        let yields_expr = match cursor.filter(|id| *id != stop) {
            Some(id) if self.graph[id].is_open_opcode(Opcode::PushReg) => {
                self.graph[id].processed = true;
                true
            }
            _ => false,
        };
        (pops, yields_expr)
    }

    pub(super) fn combine_call(
        &mut self,
        func: usize,
        at: ItemId,
        pos: u16,
        operator: &OperatorItem,
        operands: &Operands,
    ) -> Result<ItemId, DecompileError> {
        let name = if operator.opcode == Opcode::Calli {
            self.imported_functions
                .get(&operator.arg)
                .map(|item| item.name.clone())
                .ok_or(DecompileError::UnknownIntrinsic {
                    pos,
                    id: operator.arg,
                })?
        } else {
            self.options.function_name(operator.arg)
        };

        let mut args = Vec::with_capacity(operands.ids.len());
        for (index, &id) in operands.ids.iter().enumerate() {
            let param_type = operator.param_types.get(index).copied().unwrap_or(DataType::Int);
            let expression = self.expression(id);
            if expression.is_address && expression.text.starts_with("local_") {
                self.replace_local_with_value(func, id, param_type);
            }
            if let Some(slot) = self.expression(id).immediate {
                self.use_as_global(id, slot);
            }
            args.push(self.expression(id).text);
        }

        let text = format!("{name}({})", args.join(", "));
        let combined = if operator.yields_expr {
            self.add_expression(at, ExpressionItem::new(text, false))
        } else {
            self.add_statement(at, format!("{text};"), true)
        };
        Ok(combined)
    }

    /// Substitute the constant last stored into a local passed to a call.
    ///
    /// The store is turned into a comment.
    fn replace_local_with_value(&mut self, func: usize, id: ItemId, param_type: DataType) {
        let (start, _) = self.function_bounds(func);
        let local = self.expression(id).text;
        let prefix = format!("{local} = ");

        let mut cursor = self.graph.prev(id);
        let mut store = None;
        while let Some(at) = cursor.filter(|at| *at != start) {
            if let Some(statement) = self.graph[at].as_statement() {
                if statement.text.starts_with(&prefix) {
                    store = Some(at);
                    break;
                }
            }
            cursor = self.graph.prev(at);
        }
        let Some(store) = store else {
            return;
        };

        let Some(statement) = self.graph[store].as_statement() else {
            return;
        };
        let value = statement.text[prefix.len()..].trim_end_matches(';').to_string();
        let is_number = !value.is_empty()
            && value
                .strip_prefix('-')
                .unwrap_or(&value)
                .chars()
                .all(|c| c.is_ascii_digit());
        if !is_number {
            return;
        }

        let index: String = local["local_".len()..]
            .chars()
            .take_while(char::is_ascii_digit)
            .collect();
        if let Ok(index) = index.parse::<usize>() {
            if let Some(local_type) = self.functions[func].locals_types.get_mut(index) {
                *local_type = DataType::Unknown;
            }
        }

        let mut text = value.clone();
        if param_type == DataType::String {
            if let Some(literal) = value.parse::<u16>().ok().and_then(|id| {
                self.string_literal(id).map(|literal| format!("{literal} /* {id} */"))
            }) {
                text = literal;
            }
        }
        if let Some(expression) = self.graph[id].as_expression_mut() {
            expression.text = text;
            expression.is_address = false;
            expression.immediate = None;
        }

        let store_item = &mut self.graph[store];
        store_item.processed = true;
        if let Some(statement) = store_item.as_statement_mut() {
            statement.text = format!("// {}", statement.text);
        }
    }

    pub(super) fn combine_return(&mut self, at: ItemId, operands: &Operands) -> ItemId {
        let value = operands
            .ids
            .first()
            .map(|id| self.expression(*id).text)
            .unwrap_or_default();
        self.add_statement(at, format!("return {value};"), true)
    }

    pub(super) fn combine_say(
        &mut self,
        at: ItemId,
        pos: u16,
        operands: &Operands,
    ) -> Result<ItemId, DecompileError> {
        let Some(id) = operands.ids.first().and_then(|id| self.expression(*id).immediate) else {
            return Err(DecompileError::SayOperandNotImmediate { pos });
        };
        let literal = self
            .string_literal(id)
            .ok_or(DecompileError::StringOutOfRange { pos, id })?;
        Ok(self.add_statement(at, format!("say({literal});"), true))
    }

    /// String literal for a constant stored into a menu answer array.
    ///
    /// Applies when the next intrinsic call after the store at `store` is
    /// `babl_menu`, or `babl_fmenu` passed the same array.
    pub(super) fn menu_answer_literal(&self, store: ItemId, lvalue: &str, value: u16) -> Option<String> {
        if !lvalue.contains('[') {
            return None;
        }

        let mut cursor = self.graph.next(store);
        let call = loop {
            let id = cursor?;
            if let ItemKind::Operator(op) = &self.graph[id].kind {
                if op.opcode == Opcode::Calli {
                    break id;
                }
            }
            if matches!(self.graph[id].kind, ItemKind::FunctionEnd) {
                return None;
            }
            cursor = self.graph.next(id);
        };

        let arg = self.graph[call].as_operator()?.arg;
        match self.imported_functions.get(&arg)?.name.as_str() {
            "babl_menu" => {}
            "babl_fmenu" => {
                let array = self.graph.prev(call)?;
                let op = self.graph[array].as_opcode()?;
                if op.opcode == Some(Opcode::PushiEff) {
                    let prefix = format!("local_{}[", op.operand.unwrap_or_default());
                    if !lvalue.contains(&prefix) {
                        return None;
                    }
                }
            }
            _ => return None,
        }

        if value == 0 {
            return None;
        }
        let literal = self.string_literal(value)?;
        Some(format!("{literal}; // {value}"))
    }
}

#[cfg(test)]
mod tests {
    use conv_bytecode::{assemble, ConversationImage, DataType};

    use crate::{
        testing::{code_text, decompile_image},
        DecompileError,
    };

    fn image(source: &str) -> ConversationImage {
        ConversationImage::from_code(assemble(source).unwrap())
            .with_function(0, "babl_menu", DataType::Int)
            .with_function(1, "babl_fmenu", DataType::Int)
            .with_function(2, "get_quest", DataType::Int)
            .with_global(0, "play_hunger", DataType::Int)
    }

    fn strings() -> Vec<String> {
        ["", "Hello there.", "Yes", "No\nreally"]
            .map(String::from)
            .to_vec()
    }

    #[test]
    fn intrinsic_result_feeds_an_expression() {
        let decompiler = decompile_image(
            image(
                "
                    PUSHBP
                    SPTOBP
                    PUSHI 1
                    ADDSP
                    PUSHI 4
                    PUSHI 1
                    CALLI 2
                    POP
                    POP
                    PUSH_REG
                    PUSHI_EFF 1
                    SWAP
                    STO
                    BPTOSP
                    POPBP
                    RET
                ",
            ),
            strings(),
        )
        .unwrap();
        assert!(code_text(&decompiler).contains("local_1 = get_quest(global_4);"));
    }

    #[test]
    fn menu_answers_become_string_literals() {
        let decompiler = decompile_image(
            image(
                "
                    PUSHBP
                    SPTOBP
                    PUSHI 4
                    ADDSP
                    PUSHI 2
                    PUSHI 1
                    PUSHI_EFF 1
                    OFFSET
                    SWAP
                    STO
                    PUSHI 3
                    PUSHI 2
                    PUSHI_EFF 1
                    OFFSET
                    SWAP
                    STO
                    PUSHI_EFF 1
                    PUSHI 1
                    CALLI 0
                    POP
                    POP
                    PUSH_REG
                    PUSHI_EFF 4
                    SWAP
                    STO
                    BPTOSP
                    POPBP
                    RET
                ",
            ),
            strings(),
        )
        .unwrap();

        let text = code_text(&decompiler);
        assert!(text.contains(r#"local_1[1] = "Yes"; // 2"#), "{text}");
        assert!(text.contains(r#"local_1[2] = "No\nreally"; // 3"#), "{text}");
        assert!(text.contains("local_4 = babl_menu(local_1);"), "{text}");
        assert!(text.contains("int local_1[2];"), "{text}");
    }

    #[test]
    fn constant_string_argument_is_inlined() {
        let decompiler = decompile_image(
            image(
                "
                    PUSHBP
                    SPTOBP
                    PUSHI 1
                    ADDSP
                    PUSHI 1
                    PUSHI_EFF 1
                    SWAP
                    STO
                    PUSHI_EFF 1
                    PUSHI 1
                    CALLI 0
                    POP
                    POP
                    BPTOSP
                    POPBP
                    RET
                ",
            ),
            strings(),
        )
        .unwrap();

        let text = code_text(&decompiler);
        assert!(text.contains(r#"babl_menu("Hello there." /* 1 */);"#), "{text}");
        assert!(!text.contains("int local_1;"), "{text}");
        let commented = decompiler
            .graph()
            .iter()
            .filter_map(|(_, item)| item.as_statement())
            .any(|statement| statement.text == "// local_1 = 1;");
        assert!(commented);
    }

    #[test]
    fn say_needs_a_string_in_range() {
        let source = "
            PUSHBP
            SPTOBP
            PUSHI 0
            ADDSP
            PUSHI 9
            SAY_OP
            BPTOSP
            POPBP
            RET
        ";
        let err = decompile_image(image(source), strings()).unwrap_err();
        assert_eq!(err, DecompileError::StringOutOfRange { pos: 7, id: 9 });

        let decompiler = decompile_image(image(&source.replace("PUSHI 9", "PUSHI 3")), strings()).unwrap();
        assert!(code_text(&decompiler).contains(r#"say("No\nreally");"#));
    }

    #[test]
    fn unknown_local_call_target_is_an_error() {
        let err = decompile_image(
            image(
                "
                    PUSHBP
                    SPTOBP
                    PUSHI 0
                    ADDSP
                    CALL nowhere
                nowhere:
                    BPTOSP
                    POPBP
                    RET
                ",
            ),
            strings(),
        )
        .unwrap_err();
        assert!(matches!(err, DecompileError::UnknownFunction { .. }));
    }
}
