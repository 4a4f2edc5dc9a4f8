//! Function discovery.
//!
//! Every function opens with `PUSHBP; SPTOBP; PUSHI n; ADDSP` and closes with
//! `BPTOSP; POPBP; RET`. Both sequences are replaced by boundary items.

use std::collections::BTreeSet;

use conv_bytecode::{DataType, Opcode};
use tracing::{debug, warn};

use crate::{
    graph::{GraphItem, ItemId, ItemKind},
    naming::{is_unused_name, unused_name, START_FUNCTION},
    Decompiler,
};

const PROLOGUE: [Opcode; 4] = [Opcode::PushBp, Opcode::SpToBp, Opcode::Pushi, Opcode::AddSp];
const EPILOGUE: [Opcode; 3] = [Opcode::BpToSp, Opcode::PopBp, Opcode::Ret];

/// A local array, declared from its highest indexed element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrayInfo {
    pub local_start: u16,
    pub size: u16,
}

/// A discovered local function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuncInfo {
    pub name: String,
    /// Position of the function start item; the START opcode when one precedes the prologue.
    pub start: u16,
    /// Position of the PUSHBP opening the prologue.
    pub entry: u16,
    /// Position of the BPTOSP opening the epilogue.
    pub end: u16,
    pub start_item: ItemId,
    pub end_item: ItemId,
    pub return_type: DataType,
    pub param_types: Vec<DataType>,
    pub locals_types: Vec<DataType>,
    pub arrays: Vec<ArrayInfo>,
    /// Names of the functions calling this one.
    pub callers: BTreeSet<String>,
}

impl FuncInfo {
    /// Record that the local array at `local_start` is indexed at `offset`.
    pub fn note_array_access(&mut self, local_start: u16, offset: u16) {
        match self.arrays.iter_mut().find(|array| array.local_start == local_start) {
            Some(array) => array.size = array.size.max(offset),
            None => self.arrays.push(ArrayInfo {
                local_start,
                size: offset,
            }),
        }
    }

    /// Mark local `index` as a plain integer.
    pub fn use_local(&mut self, index: u16) {
        let index = usize::from(index);
        if self.locals_types.len() <= index {
            self.locals_types.resize(index + 1, DataType::Unknown);
        }
        self.locals_types[index] = DataType::Int;
    }

    /// Make sure parameter `number` (1-based) is declared.
    pub fn use_param(&mut self, number: u16) {
        let number = usize::from(number);
        if self.param_types.len() < number {
            self.param_types.resize(number, DataType::Int);
        }
    }
}

impl Decompiler {
    /// Find all functions and insert their boundary items.
    pub(crate) fn find_functions(&mut self) {
        let mut cursor = self.graph.first();
        while let Some(entry) = self.graph.find_pattern(cursor, None, &PROLOGUE) {
            let entry_pos = self.graph[entry].pos;
            let Some(exit) = self.graph.find_pattern(self.graph.next(entry), None, &EPILOGUE) else {
                warn!("function at {entry_pos:04x} has no epilogue");
                break;
            };
            cursor = self.graph.next(exit);

            let info = self.add_function(entry, exit);
            debug!(
                "found function {} at {:04x}, {} locals",
                info.name,
                info.start,
                info.locals_types.len()
            );
            self.functions.push(info);
        }
    }

    fn add_function(&mut self, entry: ItemId, exit: ItemId) -> FuncInfo {
        let entry_pos = self.graph[entry].pos;
        let exit_pos = self.graph[exit].pos;

        let locals = self
            .graph
            .iter_from(entry)
            .find(|(_, item)| item.is_opcode(Opcode::Pushi))
            .and_then(|(_, item)| item.as_opcode().and_then(|op| op.operand))
            .unwrap_or(0);

        let entry_item = &mut self.graph[entry];
        let label = entry_item.label.take();
        let mut xref_count = std::mem::take(&mut entry_item.xref_count);
        let name = if entry_pos <= 1 {
            xref_count = 1;
            START_FUNCTION.to_string()
        } else {
            match label {
                Some(label) if label.starts_with("label_") => self.options.function_name(entry_pos),
                Some(label) => label,
                None => unused_name(entry_pos),
            }
        };

        let mut before = entry;
        let mut opcodes = PROLOGUE.len();
        if let Some(start) = self.graph.prev(entry).filter(|id| self.graph[*id].is_opcode(Opcode::Start)) {
            let start_item = &mut self.graph[start];
            start_item.label = None;
            if entry_pos > 1 {
                xref_count += start_item.xref_count;
            }
            start_item.xref_count = 0;
            before = start;
            opcodes += 1;
        }

        let start_pos = self.graph[before].pos;
        let mut start_item = GraphItem::new(start_pos, ItemKind::FunctionStart);
        start_item.label = Some(name.clone());
        start_item.xref_count = xref_count;
        let start_id = self.graph.insert_before(before, start_item);
        self.graph.mark_opcodes_processed(before, opcodes);

        let exit_item = &mut self.graph[exit];
        let mut end_item = GraphItem::new(exit_pos, ItemKind::FunctionEnd);
        end_item.label = exit_item.label.take();
        end_item.xref_count = std::mem::take(&mut exit_item.xref_count);
        let end_id = self.graph.insert_before(exit, end_item);
        self.graph.mark_opcodes_processed(exit, EPILOGUE.len());

        FuncInfo {
            name,
            start: start_pos,
            entry: entry_pos,
            end: exit_pos,
            start_item: start_id,
            end_item: end_id,
            return_type: DataType::Void,
            param_types: Vec::new(),
            locals_types: vec![DataType::Unknown; usize::from(locals)],
            arrays: Vec::new(),
            callers: BTreeSet::new(),
        }
    }

    /// Index of the function starting at `pos`, by start item or prologue.
    pub(crate) fn function_at(&self, pos: u16) -> Option<usize> {
        self.functions
            .iter()
            .position(|func| func.start == pos || func.entry == pos)
    }

    /// Point every CALL at the name of the function it enters.
    pub(crate) fn update_call_targets(&mut self) {
        let calls: Vec<(ItemId, u16)> = self
            .graph
            .iter()
            .filter(|(_, item)| item.is_opcode(Opcode::Call))
            .filter_map(|(id, item)| item.as_opcode().and_then(|op| op.operand).map(|target| (id, target)))
            .collect();

        for (id, target) in calls {
            let label = if target == 0xffff {
                Some("invalid_ffff".to_string())
            } else {
                match self.function_at(target) {
                    Some(index) => Some(self.functions[index].name.clone()),
                    None => self
                        .graph
                        .find_pos(target)
                        .and_then(|at| self.graph[at].label.clone()),
                }
            };
            if let ItemKind::Opcode(op) = &mut self.graph[id].kind {
                op.target_label = label;
            }
        }
    }

    /// Drop the reference counts of functions that were never reached.
    pub(crate) fn mark_unreached(&mut self, visited: &BTreeSet<u16>) {
        for func in &self.functions {
            if visited.contains(&func.start) || is_unused_name(&func.name) {
                continue;
            }
            debug!("function {} is never reached", func.name);
            self.graph[func.start_item].xref_count = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use conv_bytecode::Opcode;

    use super::ArrayInfo;
    use crate::testing::disassembled;

    #[test]
    fn prologue_and_epilogue_become_boundaries() {
        let mut decompiler = disassembled(
            "
                START
                PUSHBP
                SPTOBP
                PUSHI 2
                ADDSP
                CALL helper
                BPTOSP
                POPBP
                RET
            helper:
                PUSHBP
                SPTOBP
                PUSHI 0
                ADDSP
                BPTOSP
                POPBP
                RET
            orphan:
                PUSHBP
                SPTOBP
                PUSHI 0
                ADDSP
                BPTOSP
                POPBP
                RET
            ",
        );
        decompiler.find_functions();
        decompiler.update_call_targets();

        let names: Vec<_> = decompiler.functions().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["start", "func_000b", "unused_0013"]);

        let start = &decompiler.functions()[0];
        assert_eq!((start.start, start.entry, start.end), (0, 1, 8));
        assert_eq!(start.locals_types.len(), 2);

        let graph = decompiler.graph();
        assert_eq!(graph[start.start_item].label.as_deref(), Some("start"));
        assert_eq!(graph[start.start_item].xref_count, 1);
        assert!(graph
            .iter()
            .filter(|(_, item)| item.as_opcode().is_some())
            .all(|(_, item)| item.processed || item.is_opcode(Opcode::Call)));

        let call = graph
            .iter()
            .find_map(|(_, item)| item.as_opcode().filter(|op| op.opcode == Some(Opcode::Call)))
            .unwrap();
        assert_eq!(call.target_label.as_deref(), Some("func_000b"));
    }

    #[test]
    fn missing_epilogue_stops_the_scan() {
        let mut decompiler = disassembled("PUSHBP\nSPTOBP\nPUSHI 0\nADDSP\nRET");
        decompiler.find_functions();
        assert!(decompiler.functions().is_empty());
    }

    #[test]
    fn array_size_tracks_the_highest_offset() {
        let mut decompiler = disassembled("PUSHBP\nSPTOBP\nPUSHI 0\nADDSP\nBPTOSP\nPOPBP\nRET");
        decompiler.find_functions();
        let func = &mut decompiler.functions[0];
        func.note_array_access(3, 1);
        func.note_array_access(3, 4);
        func.note_array_access(3, 2);
        assert_eq!(func.arrays, [ArrayInfo { local_start: 3, size: 4 }]);
    }
}
