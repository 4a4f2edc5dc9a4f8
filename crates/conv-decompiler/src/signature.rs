//! Function headers, local declarations and closing braces.

use conv_bytecode::DataType;

use crate::{graph::GraphItem, Decompiler};

impl Decompiler {
    /// Wrap function `func` in its signature and braces.
    pub(crate) fn add_signature(&mut self, func: usize) {
        let info = &self.functions[func];
        let (start, end) = (info.start_item, info.end_item);

        let params: Vec<String> = info
            .param_types
            .iter()
            .enumerate()
            .map(|(index, data_type)| format!("{data_type} param{}", index + 1))
            .collect();
        let header = format!(
            "{} {}({}) // referenced {} times",
            info.return_type,
            info.name,
            params.join(", "),
            self.graph[start].xref_count
        );

        let mut declarations: Vec<String> = info
            .locals_types
            .iter()
            .enumerate()
            .filter(|(_, data_type)| **data_type != DataType::Unknown)
            .map(|(index, data_type)| format!("{data_type} local_{index};"))
            .collect();
        declarations.extend(info.arrays.iter().map(|array| {
            let element = match info.locals_types.get(usize::from(array.local_start)) {
                Some(DataType::Unknown) | None => DataType::Int,
                Some(data_type) => *data_type,
            };
            format!("{element} local_{}[{}];", array.local_start, array.size)
        }));

        self.add_statement(start, header, true);
        self.add_indented_statement(start, "{", 0, 1, false);
        for declaration in declarations {
            self.add_statement(start, declaration, false);
        }

        self.add_indented_statement(end, "} // end-function", -1, 0, true);
        match self.graph.next(end) {
            Some(next) => {
                self.add_statement(next, "", false);
            }
            None => {
                let pos = self.graph[end].pos;
                self.graph.push_back(GraphItem::statement(pos, ""));
            }
        }
    }
}
