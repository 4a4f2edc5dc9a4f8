//! Build script to generate the compile-time opcode table.
//!
//! Reads `data/opcodes.toml` and renders a static `INSTRUCTIONS` array indexed by
//! opcode id, plus a `phf::Map` from mnemonic to opcode id.

use std::{env, fs, path::PathBuf};

use serde::Deserialize;

#[derive(Deserialize)]
struct OpcodeList {
    opcodes: Vec<OpcodeEntry>,
}

#[derive(Deserialize)]
struct OpcodeEntry {
    id: u16,
    name: String,
    operands: u16,
    format: String,
    #[serde(default)]
    operator: String,
    #[serde(default = "default_precedence")]
    precedence: u8,
    #[serde(default)]
    description: String,
}

fn default_precedence() -> u8 {
    0xff
}

fn main() {
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").expect("manifest dir"));
    let input_path = manifest_dir.join("data").join("opcodes.toml");
    println!("cargo:rerun-if-changed={}", input_path.display());

    let data = fs::read_to_string(&input_path)
        .unwrap_or_else(|err| panic!("failed to read {}: {err}", input_path.display()));
    let list: OpcodeList = toml::from_str(&data)
        .unwrap_or_else(|err| panic!("failed to parse {}: {err}", input_path.display()));

    // The table is indexed by opcode id, so ids must be dense and in order.
    for (index, entry) in list.opcodes.iter().enumerate() {
        if entry.id as usize != index {
            panic!(
                "opcode {} has id {:#04x}, expected {:#04x}",
                entry.name, entry.id, index
            );
        }
        if entry.operands > 1 {
            panic!("opcode {} declares {} operands", entry.name, entry.operands);
        }
    }

    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR"));
    let out_path = out_dir.join("opcode_table.rs");
    let rendered = render_opcode_table(&list.opcodes);
    fs::write(&out_path, rendered)
        .unwrap_or_else(|err| panic!("failed to write {}: {err}", out_path.display()));
}

fn render_opcode_table(entries: &[OpcodeEntry]) -> String {
    let mut output = String::new();
    output.push_str(&format!(
        "static INSTRUCTIONS: [InstructionInfo; {}] = [\n",
        entries.len()
    ));
    for entry in entries {
        output.push_str("    InstructionInfo {");
        output.push_str(&format!(
            " mnemonic: {mnemonic}, operands: {operands}, format: OperandFormat::{format}, \
             operator: {operator}, precedence: {precedence}, description: {description} ",
            mnemonic = quote(&entry.name),
            operands = entry.operands,
            format = format_variant(&entry.name, &entry.format),
            operator = quote(&entry.operator),
            precedence = entry.precedence,
            description = quote(&entry.description),
        ));
        output.push_str("},\n");
    }
    output.push_str("];\n\n");

    let mut builder = phf_codegen::Map::new();
    for entry in entries {
        builder.entry(entry.name.as_str(), &format!("{}u16", entry.id));
    }
    output.push_str(&format!(
        "static MNEMONICS: phf::Map<&'static str, u16> = {};\n",
        builder.build()
    ));
    output
}

fn format_variant(name: &str, format: &str) -> &'static str {
    match format {
        "none" => "None",
        "absolute" => "Absolute",
        "relative" => "Relative",
        "immediate" => "Immediate",
        "frame" => "Frame",
        "intrinsic" => "Intrinsic",
        other => panic!("opcode {name} has unknown operand format '{other}'"),
    }
}

fn quote(value: &str) -> String {
    let mut out = String::new();
    out.push('"');
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(ch),
        }
    }
    out.push('"');
    out
}
