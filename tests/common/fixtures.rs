//! Conversation fixtures shared by the integration tests.

#![allow(dead_code)]

use conv_bytecode::{assemble, ConversationImage, DataType};

/// Position of the `farewell` function in [`GREETING`].
pub const FAREWELL_POS: u16 = 0x004c;

/// A greeting, a two-answer menu and a switch on the chosen answer.
pub const GREETING: &str = "
        PUSHBP
        SPTOBP
        PUSHI 4
        ADDSP
        PUSHI 1
        SAY_OP
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
        PUSHI 0
        PUSHI 3
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
        PUSHI_EFF 4
        FETCHM
        PUSHI 1
        TSTEQ
        BEQ second
        PUSHI 4
        SAY_OP
        JMP done
    second:
        PUSHI_EFF 4
        FETCHM
        PUSHI 2
        TSTEQ
        BEQ done
        CALL farewell
        JMP done
    done:
        BPTOSP
        POPBP
        RET
    farewell:
        PUSHBP
        SPTOBP
        PUSHI 0
        ADDSP
        PUSHI 5
        SAY_OP
        BPTOSP
        POPBP
        RET
";

pub fn greeting_strings() -> Vec<String> {
    [
        "",
        "Hail, stranger.",
        "Who are you?",
        "Farewell.",
        "I am Bragit.",
        "Safe travels.",
    ]
    .map(String::from)
    .to_vec()
}

pub fn image_for(source: &str) -> ConversationImage {
    let code = assemble(source).unwrap_or_else(|err| panic!("fixture does not assemble: {err}"));
    ConversationImage::from_code(code)
        .with_function(0, "babl_menu", DataType::Int)
        .with_function(1, "get_quest", DataType::Int)
}

pub fn greeting_image() -> ConversationImage {
    image_for(GREETING)
}

/// A unique path under the system temp directory.
pub fn temp_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("uwconv-{}-{name}", std::process::id()))
}
