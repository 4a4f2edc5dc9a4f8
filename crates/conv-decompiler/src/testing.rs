//! Fixtures shared by the unit tests.

use conv_bytecode::{assemble, ConversationImage};

use crate::{DecompileError, DecompileOptions, Decompiler};

fn strings() -> Vec<String> {
    ["", "one", "two", "three"].map(String::from).to_vec()
}

pub fn decompiler_for_code(code: Vec<u16>) -> Decompiler {
    Decompiler::new(&ConversationImage::from_code(code), strings(), DecompileOptions::default())
}

pub fn decompiler(source: &str) -> Decompiler {
    decompiler_for_code(assemble(source).unwrap())
}

pub fn disassembled(source: &str) -> Decompiler {
    let mut decompiler = decompiler(source);
    decompiler.disassemble().unwrap();
    decompiler
}

pub fn decompiled(source: &str) -> Decompiler {
    let mut decompiler = decompiler(source);
    decompiler.decompile().unwrap();
    decompiler
}

pub fn decompiled_code(code: Vec<u16>) -> Decompiler {
    let mut decompiler = decompiler_for_code(code);
    decompiler.decompile().unwrap();
    decompiler
}

pub fn decompiled_err(source: &str) -> DecompileError {
    decompiler(source).decompile().unwrap_err()
}

pub fn decompile_image(image: ConversationImage, strings: Vec<String>) -> Result<Decompiler, DecompileError> {
    let mut decompiler = Decompiler::new(&image, strings, DecompileOptions::default());
    decompiler.decompile()?;
    Ok(decompiler)
}

/// All unprocessed statements joined without separators.
pub fn code_text(decompiler: &Decompiler) -> String {
    decompiler
        .graph()
        .iter()
        .filter(|(_, item)| !item.processed)
        .filter_map(|(_, item)| item.as_statement())
        .map(|statement| statement.text.as_str())
        .collect()
}
