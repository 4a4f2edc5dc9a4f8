//! Helpers that run whole conversations through the public API.

#![allow(dead_code)]

use conv_bytecode::ConversationImage;
use uwconv::{run_conversation, write_listing, Config, GlobalsFile, ListingKind, RunReport};

use super::fixtures::{greeting_image, greeting_strings, FAREWELL_POS};

pub fn greeting_config() -> Config {
    Config::builder().function_name(FAREWELL_POS, "farewell").build()
}

pub fn decompile(image: &ConversationImage, strings: Vec<String>, config: &Config) -> String {
    write_listing(image, strings, config, None, ListingKind::Decompiled)
        .unwrap_or_else(|err| panic!("decompilation failed: {err}"))
}

pub fn disassemble(image: &ConversationImage, config: &Config) -> String {
    write_listing(image, Vec::new(), config, None, ListingKind::Disassembly)
        .unwrap_or_else(|err| panic!("disassembly failed: {err}"))
}

/// Run the greeting with the given menu answers.
pub fn run_greeting(answers: &[u16]) -> RunReport {
    let mut globals = GlobalsFile::default();
    run_conversation(greeting_image(), greeting_strings(), &mut globals, answers, 1000)
        .unwrap_or_else(|err| panic!("run failed: {err}"))
}
