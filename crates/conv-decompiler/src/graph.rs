//! Graph items in code order.
//!
//! The graph starts as one [`ItemKind::Opcode`] item per instruction. Passes
//! insert function boundaries, operators, expressions and statements in front of
//! the opcodes they replace and mark the replaced items processed. Items are
//! never removed, so an [`ItemId`] stays valid for the life of the graph.

use std::{
    collections::HashMap,
    ops::{Index, IndexMut},
};

use conv_bytecode::{DataType, DecodeError, Instruction, Opcode, ATOM_PRECEDENCE};
use tracing::warn;

/// Stable handle to an item in a [`CodeGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(usize);

/// An instruction that has not been replaced (yet).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpcodeItem {
    /// Raw instruction word.
    pub word: u16,
    /// `None` for words outside the instruction set.
    pub opcode: Option<Opcode>,
    pub operand: Option<u16>,
    /// Label of the jump or call target, or the intrinsic name for CALLI.
    pub target_label: Option<String>,
    pub target_pos: Option<u16>,
}

/// An operation waiting to be combined with the expressions it consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorItem {
    pub opcode: Opcode,
    /// Call target position or intrinsic id.
    pub arg: u16,
    /// Number of expressions consumed.
    pub needed: u16,
    pub yields_expr: bool,
    pub result_type: DataType,
    /// A SWAP preceded the STO.
    pub swap_store_args: bool,
    pub precedence: u8,
    /// Known parameter types of an intrinsic, empty when unknown.
    pub param_types: Vec<DataType>,
}

impl OperatorItem {
    pub fn new(opcode: Opcode, needed: u16, yields_expr: bool, result_type: DataType) -> Self {
        Self {
            opcode,
            arg: 0,
            needed,
            yields_expr,
            result_type,
            swap_store_args: false,
            precedence: opcode.precedence(),
            param_types: Vec::new(),
        }
    }
}

/// A complete line of output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatementItem {
    pub text: String,
    /// Indentation change applied before printing this line.
    pub indent_before: i32,
    /// Indentation change applied after printing this line.
    pub indent_after: i32,
}

/// A value left on the stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpressionItem {
    pub text: String,
    /// The expression denotes a memory location rather than a value.
    pub is_address: bool,
    /// Value of a PUSHI that has not been interpreted yet.
    pub immediate: Option<u16>,
    pub precedence: u8,
}

impl ExpressionItem {
    pub fn new(text: impl Into<String>, is_address: bool) -> Self {
        Self {
            text: text.into(),
            is_address,
            immediate: None,
            precedence: ATOM_PRECEDENCE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemKind {
    Opcode(OpcodeItem),
    FunctionStart,
    FunctionEnd,
    Operator(OperatorItem),
    Statement(StatementItem),
    Expression(ExpressionItem),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphItem {
    /// Code position this item stands for.
    pub pos: u16,
    pub label: Option<String>,
    /// Number of jumps, branches and calls targeting this item.
    pub xref_count: u32,
    pub processed: bool,
    pub kind: ItemKind,
}

impl GraphItem {
    pub fn new(pos: u16, kind: ItemKind) -> Self {
        Self {
            pos,
            label: None,
            xref_count: 0,
            processed: false,
            kind,
        }
    }

    pub fn statement(pos: u16, text: impl Into<String>) -> Self {
        Self::new(
            pos,
            ItemKind::Statement(StatementItem {
                text: text.into(),
                ..StatementItem::default()
            }),
        )
    }

    /// Decoded opcode, for opcode items only.
    pub fn opcode(&self) -> Option<Opcode> {
        match &self.kind {
            ItemKind::Opcode(op) => op.opcode,
            _ => None,
        }
    }

    pub fn is_opcode(&self, opcode: Opcode) -> bool {
        self.opcode() == Some(opcode)
    }

    /// An unprocessed opcode item holding `opcode`.
    pub fn is_open_opcode(&self, opcode: Opcode) -> bool {
        !self.processed && self.is_opcode(opcode)
    }

    pub fn is_open_expression(&self) -> bool {
        !self.processed && matches!(self.kind, ItemKind::Expression(_))
    }

    pub fn as_opcode(&self) -> Option<&OpcodeItem> {
        match &self.kind {
            ItemKind::Opcode(op) => Some(op),
            _ => None,
        }
    }

    pub fn as_operator(&self) -> Option<&OperatorItem> {
        match &self.kind {
            ItemKind::Operator(op) => Some(op),
            _ => None,
        }
    }

    pub fn as_expression(&self) -> Option<&ExpressionItem> {
        match &self.kind {
            ItemKind::Expression(expr) => Some(expr),
            _ => None,
        }
    }

    pub fn as_expression_mut(&mut self) -> Option<&mut ExpressionItem> {
        match &mut self.kind {
            ItemKind::Expression(expr) => Some(expr),
            _ => None,
        }
    }

    pub fn as_statement(&self) -> Option<&StatementItem> {
        match &self.kind {
            ItemKind::Statement(statement) => Some(statement),
            _ => None,
        }
    }

    pub fn as_statement_mut(&mut self) -> Option<&mut StatementItem> {
        match &mut self.kind {
            ItemKind::Statement(statement) => Some(statement),
            _ => None,
        }
    }

    /// Resolved target of a jump, branch or call.
    pub fn target_pos(&self) -> Option<u16> {
        self.as_opcode().and_then(|op| op.target_pos)
    }
}

#[derive(Debug, Clone)]
struct Node {
    item: GraphItem,
    prev: Option<ItemId>,
    next: Option<ItemId>,
}

/// Doubly linked list of graph items stored in an arena.
#[derive(Debug, Clone, Default)]
pub struct CodeGraph {
    nodes: Vec<Node>,
    head: Option<ItemId>,
    tail: Option<ItemId>,
    /// First item in list order for each code position.
    first_at: HashMap<u16, ItemId>,
}

impl CodeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the initial graph: one opcode item per instruction.
    ///
    /// Words outside the instruction set become single-word items with no
    /// operand; so does an operand-taking opcode cut off by the end of the code.
    pub fn from_code(code: &[u16]) -> Self {
        let mut graph = Self::new();
        let end = code.len().min(usize::from(u16::MAX) + 1);
        let mut pos = 0;
        while pos < end {
            let at = pos as u16;
            let (opcode, operand) = match Instruction::decode(code, at) {
                Ok(instruction) => (Some(instruction.opcode), instruction.operand),
                Err(DecodeError::MissingOperand { opcode, .. }) => {
                    warn!("{opcode} at {at:04x} is missing its operand");
                    (Some(opcode), None)
                }
                Err(_) => (None, None),
            };
            graph.push_back(GraphItem::new(
                at,
                ItemKind::Opcode(OpcodeItem {
                    word: code[pos],
                    opcode,
                    operand,
                    target_label: None,
                    target_pos: None,
                }),
            ));
            pos += 1 + usize::from(operand.is_some());
        }
        graph
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn first(&self) -> Option<ItemId> {
        self.head
    }

    pub fn last(&self) -> Option<ItemId> {
        self.tail
    }

    pub fn next(&self, id: ItemId) -> Option<ItemId> {
        self.nodes[id.0].next
    }

    pub fn prev(&self, id: ItemId) -> Option<ItemId> {
        self.nodes[id.0].prev
    }

    /// First item in list order standing for `pos`.
    pub fn find_pos(&self, pos: u16) -> Option<ItemId> {
        self.first_at.get(&pos).copied()
    }

    /// Append an item at the end of the list.
    pub fn push_back(&mut self, item: GraphItem) -> ItemId {
        let id = ItemId(self.nodes.len());
        self.first_at.entry(item.pos).or_insert(id);
        self.nodes.push(Node {
            item,
            prev: self.tail,
            next: None,
        });
        match self.tail {
            Some(tail) => self.nodes[tail.0].next = Some(id),
            None => self.head = Some(id),
        }
        self.tail = Some(id);
        id
    }

    /// Insert an item directly in front of `before`.
    pub fn insert_before(&mut self, before: ItemId, item: GraphItem) -> ItemId {
        let id = ItemId(self.nodes.len());
        let prev = self.nodes[before.0].prev;
        match self.first_at.get(&item.pos) {
            Some(first) if *first != before => {}
            _ => {
                self.first_at.insert(item.pos, id);
            }
        }
        self.nodes.push(Node {
            item,
            prev,
            next: Some(before),
        });
        self.nodes[before.0].prev = Some(id);
        match prev {
            Some(prev) => self.nodes[prev.0].next = Some(id),
            None => self.head = Some(id),
        }
        id
    }

    /// Items in list order.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            graph: self,
            cursor: self.head,
        }
    }

    /// Items in list order, starting at `from`.
    pub fn iter_from(&self, from: ItemId) -> Iter<'_> {
        Iter {
            graph: self,
            cursor: Some(from),
        }
    }

    /// Whether the items from `from` on are opcode items spelling out `pattern`,
    /// all before `stop`.
    pub fn match_pattern(&self, from: ItemId, stop: ItemId, pattern: &[Opcode]) -> bool {
        let mut cursor = Some(from);
        for opcode in pattern {
            match cursor {
                Some(id) if id != stop && self[id].is_opcode(*opcode) => cursor = self.next(id),
                _ => return false,
            }
        }
        true
    }

    /// First run of opcode items matching `pattern`, ignoring other item kinds.
    pub fn find_pattern(
        &self,
        from: Option<ItemId>,
        stop: Option<ItemId>,
        pattern: &[Opcode],
    ) -> Option<ItemId> {
        let mut matched = 0;
        let mut found = None;
        let mut cursor = from;
        while let Some(id) = cursor {
            if Some(id) == stop {
                break;
            }
            if let Some(opcode) = self[id].as_opcode().map(|op| op.opcode) {
                if opcode == Some(pattern[matched]) {
                    if matched == 0 {
                        found = Some(id);
                    }
                    matched += 1;
                    if matched == pattern.len() {
                        return found;
                    }
                } else if opcode == Some(pattern[0]) {
                    found = Some(id);
                    matched = 1;
                } else {
                    matched = 0;
                    found = None;
                }
            }
            cursor = self.next(id);
        }
        None
    }

    /// Mark the next `count` opcode items from `from` on as processed.
    pub fn mark_opcodes_processed(&mut self, from: ItemId, count: usize) {
        let mut marked = 0;
        let mut cursor = Some(from);
        while let Some(id) = cursor {
            if marked == count {
                break;
            }
            if let ItemKind::Opcode(_) = self[id].kind {
                self[id].processed = true;
                marked += 1;
            }
            cursor = self.next(id);
        }
    }

    /// First unprocessed opcode item after `from`, before `stop`.
    pub fn next_open_opcode(&self, from: ItemId, stop: ItemId) -> Option<ItemId> {
        let mut cursor = self.next(from);
        while let Some(id) = cursor {
            if id == stop {
                return None;
            }
            let item = &self[id];
            if !item.processed && matches!(item.kind, ItemKind::Opcode(_)) {
                return Some(id);
            }
            cursor = self.next(id);
        }
        None
    }

    /// Nearest opcode item before `id`, processed or not.
    pub fn prev_opcode(&self, id: ItemId) -> Option<ItemId> {
        let mut cursor = self.prev(id);
        while let Some(at) = cursor {
            if matches!(self[at].kind, ItemKind::Opcode(_)) {
                return Some(at);
            }
            cursor = self.prev(at);
        }
        None
    }
}

impl Index<ItemId> for CodeGraph {
    type Output = GraphItem;

    fn index(&self, id: ItemId) -> &GraphItem {
        &self.nodes[id.0].item
    }
}

impl IndexMut<ItemId> for CodeGraph {
    fn index_mut(&mut self, id: ItemId) -> &mut GraphItem {
        &mut self.nodes[id.0].item
    }
}

pub struct Iter<'a> {
    graph: &'a CodeGraph,
    cursor: Option<ItemId>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (ItemId, &'a GraphItem);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.cursor?;
        self.cursor = self.graph.next(id);
        Some((id, &self.graph[id]))
    }
}
