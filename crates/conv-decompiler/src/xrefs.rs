//! Cross references: labels on every jump, branch and call target.

use conv_bytecode::{Instruction, Opcode};

use crate::{
    graph::{ItemId, ItemKind},
    naming::{label_name, START_FUNCTION},
    DecompileError, Decompiler,
};

impl Decompiler {
    /// Label every target and count how often it is referenced.
    ///
    /// The first item is labelled `start` and counts as referenced once.
    pub(crate) fn collect_xrefs(&mut self) -> Result<(), DecompileError> {
        let first = self.graph.first().ok_or(DecompileError::EmptyCode)?;
        self.graph[first].label = Some(START_FUNCTION.to_string());
        self.graph[first].xref_count = 1;

        let mut cursor = Some(first);
        while let Some(id) = cursor {
            cursor = self.graph.next(id);
            let item = &self.graph[id];
            let Some(op) = item.as_opcode() else {
                continue;
            };
            let Some(opcode) = op.opcode else {
                continue;
            };
            let pos = item.pos;

            match opcode {
                Opcode::Jmp | Opcode::Beq | Opcode::Bne | Opcode::Bra | Opcode::Call => {
                    let Some(target) = Instruction::new(opcode, op.operand).jump_target(pos) else {
                        continue;
                    };
                    if opcode == Opcode::Call && target == 0xffff {
                        continue;
                    }
                    let label = self.reference(pos, target)?;
                    self.set_target(id, Some(label), Some(target));
                }
                Opcode::Calli => {
                    let id_ = op.operand.unwrap_or_default();
                    let name = self
                        .imported_functions
                        .get(&id_)
                        .map(|item| item.name.clone())
                        .ok_or(DecompileError::UnknownIntrinsic { pos, id: id_ })?;
                    self.set_target(id, Some(name), None);
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn reference(&mut self, pos: u16, target: u16) -> Result<String, DecompileError> {
        let at = self
            .graph
            .find_pos(target)
            .ok_or(DecompileError::UnresolvedJumpTarget { pos, target })?;
        let item = &mut self.graph[at];
        if item.xref_count == 0 || item.label.is_none() {
            item.label = Some(label_name(target));
        }
        item.xref_count += 1;
        Ok(item.label.clone().unwrap_or_else(|| label_name(target)))
    }

    fn set_target(&mut self, id: ItemId, label: Option<String>, target: Option<u16>) {
        if let ItemKind::Opcode(op) = &mut self.graph[id].kind {
            op.target_label = label;
            op.target_pos = target;
        }
    }
}

#[cfg(test)]
mod tests {
    use conv_bytecode::Opcode;

    use crate::{testing::decompiler, DecompileError};

    #[test]
    fn targets_get_one_label_and_a_reference_count() {
        let mut decompiler = decompiler(
            "
                PUSHI 1
                BEQ skip
                JMP skip
            skip:
                CALL 0xffff
                RET
            ",
        );
        decompiler.disassemble().unwrap();
        let graph = decompiler.graph();

        let skip = graph.find_pos(6).unwrap();
        assert_eq!(graph[skip].label.as_deref(), Some("label_0006"));
        assert_eq!(graph[skip].xref_count, 2);

        let first = graph.first().unwrap();
        assert_eq!(graph[first].label.as_deref(), Some("start"));
        assert_eq!(graph[first].xref_count, 1);

        let call = graph[skip].as_opcode().unwrap();
        assert_eq!(call.opcode, Some(Opcode::Call));
        assert_eq!(call.target_pos, None);
    }

    #[test]
    fn jump_into_an_operand_is_rejected() {
        let mut decompiler = decompiler("PUSHI 1\nJMP 1\nRET");
        assert_eq!(
            decompiler.disassemble(),
            Err(DecompileError::UnresolvedJumpTarget { pos: 2, target: 1 })
        );
    }

    #[test]
    fn unknown_intrinsic_is_rejected() {
        let mut decompiler = decompiler("PUSHI 0\nCALLI 9\nRET");
        assert_eq!(
            decompiler.disassemble(),
            Err(DecompileError::UnknownIntrinsic { pos: 2, id: 9 })
        );
    }

    #[test]
    fn empty_code_is_rejected() {
        let mut decompiler = decompiler("");
        assert_eq!(decompiler.disassemble(), Err(DecompileError::EmptyCode));
    }

    mod proptests {
        use std::collections::BTreeSet;

        use conv_bytecode::{Instruction, Opcode};
        use proptest::prelude::*;

        use crate::testing::decompiler_for_code;

        fn jumpy_code() -> impl Strategy<Value = Vec<u16>> {
            // NOP filler with absolute jumps and calls to word positions inside the code
            (4usize..40).prop_flat_map(|len| {
                prop::collection::vec((any::<bool>(), 0..len as u16), len).prop_map(move |slots| {
                    let mut code = Vec::new();
                    for (jump, target) in slots {
                        if jump {
                            code.extend([Opcode::Jmp as u16, target * 2]);
                        } else {
                            code.extend([Opcode::Nop as u16, Opcode::Nop as u16]);
                        }
                    }
                    code
                })
            })
        }

        proptest! {
            #[test]
            fn labels_are_unique_and_counts_match_jumps(code in jumpy_code()) {
                let mut decompiler = decompiler_for_code(code.clone());
                decompiler.disassemble().unwrap();

                let graph = decompiler.graph();
                let labels: Vec<_> = graph.iter().filter_map(|(_, item)| item.label.clone()).collect();
                let unique: BTreeSet<_> = labels.iter().collect();
                prop_assert_eq!(unique.len(), labels.len());

                let jumps = graph
                    .iter()
                    .filter(|(_, item)| item.is_opcode(Opcode::Jmp))
                    .count() as u32;
                let total: u32 = graph.iter().map(|(_, item)| item.xref_count).sum();
                prop_assert_eq!(total, jumps + 1);

                for (_, item) in graph.iter() {
                    if let Some(op) = item.as_opcode().filter(|op| op.opcode == Some(Opcode::Jmp)) {
                        let target = Instruction::new(Opcode::Jmp, op.operand).jump_target(item.pos);
                        prop_assert_eq!(op.target_pos, target);
                    }
                }
            }
        }
    }
}
