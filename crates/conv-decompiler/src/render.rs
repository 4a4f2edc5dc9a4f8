//! Text output: C-like pseudocode and the annotated disassembly.

use std::fmt::Write;

use conv_bytecode::Opcode;

use crate::{
    graph::{GraphItem, ItemKind},
    naming::is_unused_name,
    Decompiler,
};

/// How listings are laid out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
    /// Spaces per indentation level.
    pub indent_width: usize,
    /// Name of the conversation partner, shown in the header.
    pub name: Option<String>,
    /// Interleave processed opcodes as comments in decompiled output.
    pub show_disassembly: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            indent_width: 3,
            name: None,
            show_disassembly: false,
        }
    }
}

/// One disassembly line for an opcode item, without indentation.
pub fn format_opcode(item: &GraphItem) -> Option<String> {
    let op = item.as_opcode()?;
    let Some(opcode) = op.opcode else {
        return Some(format!("{:04x} ??? (0x{:04x})", item.pos, op.word));
    };

    let mut line = format!("{:04x} {}", item.pos, opcode.mnemonic());
    match (opcode, &op.target_label, op.operand) {
        (Opcode::Jmp | Opcode::Beq | Opcode::Bne | Opcode::Bra | Opcode::Call, Some(label), Some(operand)) => {
            let target = op.target_pos.unwrap_or(operand);
            let _ = write!(line, " {label} // target: {target:04x}");
        }
        (Opcode::Calli, Some(name), _) => {
            let _ = write!(line, " {name}");
        }
        (_, _, Some(operand)) => {
            let _ = write!(line, " 0x{operand:04x}");
        }
        _ => {}
    }
    Some(line)
}

fn label_line(item: &GraphItem) -> Option<String> {
    let label = item.label.as_ref()?;
    (item.xref_count > 0).then(|| format!("{label}: // referenced {} times", item.xref_count))
}

impl Decompiler {
    fn header(&self, options: &RenderOptions) -> String {
        let mut header = String::from("; conversation");
        if let Some(slot) = self.slot() {
            let _ = write!(header, " {slot}");
        }
        if let Some(name) = &options.name {
            let _ = write!(header, " for {name}");
        }
        header.push_str("\n\n");
        header
    }

    /// Render the decompiled functions as pseudocode.
    pub fn render_decompiled(&self, options: &RenderOptions) -> String {
        let mut out = self.header(options);
        let mut indent: i32 = 0;
        let pad = |indent: i32| " ".repeat(indent.max(0) as usize * options.indent_width);

        let mut cursor = self.graph.first();
        while let Some(id) = cursor {
            let item = &self.graph[id];
            cursor = self.graph.next(id);

            if matches!(item.kind, ItemKind::FunctionStart) && !item.processed {
                let unused = item.xref_count == 0
                    || item.label.as_deref().is_some_and(is_unused_name);
                if unused {
                    while let Some(at) = cursor {
                        cursor = self.graph.next(at);
                        if matches!(self.graph[at].kind, ItemKind::FunctionEnd) {
                            break;
                        }
                    }
                    continue;
                }
            }

            if item.processed {
                if options.show_disassembly {
                    if let Some(line) = format_opcode(item) {
                        let _ = writeln!(out, "{}// {line}", pad(indent));
                    }
                }
                continue;
            }

            match &item.kind {
                ItemKind::Statement(statement) => {
                    indent += statement.indent_before;
                    if statement.text.is_empty() {
                        out.push('\n');
                    } else {
                        let _ = writeln!(out, "{}{}", pad(indent), statement.text);
                    }
                    indent += statement.indent_after;
                }
                ItemKind::Opcode(_) => {
                    if let Some(label) = label_line(item) {
                        let _ = writeln!(out, "{label}");
                    }
                    if let Some(line) = format_opcode(item) {
                        let _ = writeln!(out, "{}{line}", pad(indent));
                    }
                }
                ItemKind::Expression(expression) => {
                    if let Some(label) = label_line(item) {
                        let _ = writeln!(out, "{label}");
                    }
                    let _ = writeln!(out, "{}// expression: {}", pad(indent), expression.text);
                }
                _ => {}
            }
        }
        out
    }

    /// Render every instruction with labels and cross references.
    pub fn render_disassembly(&self, options: &RenderOptions) -> String {
        let mut out = self.header(options);
        let pad = " ".repeat(options.indent_width);

        for (id, item) in self.graph.iter() {
            match &item.kind {
                ItemKind::Opcode(_) => {
                    if let Some(label) = label_line(item) {
                        let _ = writeln!(out, "{label}");
                    }
                    if let Some(line) = format_opcode(item) {
                        let _ = writeln!(out, "{pad}{line}");
                    }
                }
                ItemKind::FunctionStart => {
                    let name = item.label.as_deref().unwrap_or_default();
                    let _ = writeln!(out, "\n; function {name} // referenced {} times", item.xref_count);
                    if let Some(func) = self.functions.iter().find(|func| func.start_item == id) {
                        if !func.callers.is_empty() {
                            let callers: Vec<&str> = func.callers.iter().map(String::as_str).collect();
                            let _ = writeln!(out, "; caller xrefs: {}", callers.join(", "));
                        }
                    }
                }
                ItemKind::FunctionEnd => {
                    let _ = writeln!(out, "; end of function");
                }
                _ => {}
            }
        }
        out
    }
}
