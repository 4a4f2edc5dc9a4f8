use std::collections::{BTreeMap, BTreeSet, VecDeque};

use conv_bytecode::{ConversationImage, ImportedItem};
use tracing::{debug, info};

use crate::{
    functions::FuncInfo,
    graph::CodeGraph,
    naming::{DecompileOptions, START_FUNCTION},
    DecompileError,
};

/// Functions waiting to be decompiled, and those already done.
#[derive(Debug, Default)]
pub(crate) struct Worklist {
    pub queue: VecDeque<usize>,
    /// Start positions of the functions already taken off the queue.
    pub visited: BTreeSet<u16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Fresh,
    Disassembled,
    Decompiled,
}

/// Decompiler for the code segment of one conversation.
#[derive(Debug)]
pub struct Decompiler {
    pub(crate) graph: CodeGraph,
    pub(crate) functions: Vec<FuncInfo>,
    pub(crate) imported_functions: BTreeMap<u16, ImportedItem>,
    pub(crate) imported_globals: BTreeMap<u16, ImportedItem>,
    pub(crate) strings: Vec<String>,
    pub(crate) options: DecompileOptions,
    /// `(head, tail)` code ranges of loops; a jump back to `head` from inside
    /// the range is a `continue`.
    pub(crate) continue_ranges: BTreeSet<(u16, u16)>,
    slot: Option<u16>,
    stage: Stage,
}

impl Decompiler {
    pub fn new(image: &ConversationImage, strings: Vec<String>, options: DecompileOptions) -> Self {
        Self {
            graph: CodeGraph::from_code(&image.code),
            functions: Vec::new(),
            imported_functions: image.imported_functions.clone(),
            imported_globals: image.imported_globals.clone(),
            strings,
            options,
            continue_ranges: BTreeSet::new(),
            slot: image.slot,
            stage: Stage::Fresh,
        }
    }

    /// Resolve jump targets and labels only.
    pub fn disassemble(&mut self) -> Result<(), DecompileError> {
        if self.stage == Stage::Fresh {
            self.collect_xrefs()?;
            self.stage = Stage::Disassembled;
        }
        Ok(())
    }

    /// Decompile every function reachable from `start`.
    ///
    /// Functions are taken from a FIFO queue; each one is reduced and
    /// structured exactly once, callees being queued as their calls are met.
    pub fn decompile(&mut self) -> Result<(), DecompileError> {
        match self.stage {
            Stage::Decompiled => return Ok(()),
            Stage::Fresh => self.collect_xrefs()?,
            Stage::Disassembled => {}
        }

        self.find_functions();
        self.update_call_targets();

        let start = self
            .function_index(START_FUNCTION)
            .ok_or_else(|| DecompileError::UnknownFunction {
                name: START_FUNCTION.to_string(),
            })?;
        let mut worklist = Worklist::default();
        worklist.queue.push_back(start);

        while let Some(func) = worklist.queue.pop_front() {
            if !worklist.visited.insert(self.functions[func].start) {
                continue;
            }
            debug!(
                "decompiling {} at {:04x}",
                self.functions[func].name, self.functions[func].start
            );
            self.analyze_function(func, &mut worklist)?;
            self.combine_operators(func)?;
            self.structure_function(func)?;
            self.add_signature(func);
        }

        self.mark_unreached(&worklist.visited);
        self.stage = Stage::Decompiled;
        info!(
            "decompiled {} of {} functions",
            worklist.visited.len(),
            self.functions.len()
        );
        Ok(())
    }

    pub fn graph(&self) -> &CodeGraph {
        &self.graph
    }

    pub fn functions(&self) -> &[FuncInfo] {
        &self.functions
    }

    pub fn function(&self, name: &str) -> Option<&FuncInfo> {
        self.function_index(name).map(|index| &self.functions[index])
    }

    fn function_index(&self, name: &str) -> Option<usize> {
        self.functions.iter().position(|func| func.name == name)
    }

    pub fn strings(&self) -> &[String] {
        &self.strings
    }

    pub fn slot(&self) -> Option<u16> {
        self.slot
    }

    /// Texts of all statements in graph order, including commented-out ones.
    pub fn statements(&self) -> impl Iterator<Item = &str> + '_ {
        self.graph
            .iter()
            .filter_map(|(_, item)| item.as_statement().map(|statement| statement.text.as_str()))
    }
}
