//! End-to-end decompilation of complete conversations.

mod common;

use common::{
    fixtures::{greeting_image, greeting_strings, image_for},
    harness::{decompile, disassemble, greeting_config},
};
use uwconv::Config;

#[test]
fn greeting_decompiles_to_a_switch() {
    let text = decompile(&greeting_image(), greeting_strings(), &greeting_config());
    let expected = [
        "void start() // referenced 1 times",
        "   say(\"Hail, stranger.\");",
        "   local_1[1] = \"Who are you?\"; // 2",
        "   local_1[2] = \"Farewell.\"; // 3",
        "   local_4 = babl_menu(local_1);",
        "   switch (local_4) {",
        "      case 1:",
        "         say(\"I am Bragit.\");",
        "         break;",
        "      case 2:",
        "         farewell();",
        "         break;",
        "   } // end-switch",
        "} // end-function",
        "void farewell() // referenced 1 times",
        "   say(\"Safe travels.\");",
    ];
    for line in expected {
        assert!(text.contains(&format!("{line}\n")), "missing {line:?} in\n{text}");
    }
    assert!(!text.contains("goto"), "{text}");
}

#[test]
fn function_names_fall_back_to_positions() {
    let text = decompile(&greeting_image(), greeting_strings(), &Config::default());
    assert!(text.contains("void func_004c() // referenced 1 times\n"), "{text}");
    assert!(text.contains("         func_004c();\n"), "{text}");
}

#[test]
fn interleaved_disassembly_keeps_pseudocode() {
    let config = Config::builder()
        .show_disassembly_comments(true)
        .function_name(common::fixtures::FAREWELL_POS, "farewell")
        .build();
    let text = decompile(&greeting_image(), greeting_strings(), &config);
    assert!(text.contains("// 0027 CALLI babl_menu\n"), "{text}");
    assert!(text.contains("local_4 = babl_menu(local_1);\n"), "{text}");
}

#[test]
fn disassembly_lists_every_instruction() {
    let text = disassemble(&greeting_image(), &Config::default());
    assert!(text.contains("start: // referenced 1 times\n   0000 PUSHBP\n"), "{text}");
    assert!(text.contains("   0027 CALLI babl_menu\n"), "{text}");
    assert!(text.contains("   0045 CALL label_004c // target: 004c\n"), "{text}");
    assert!(text.contains("label_0049: // referenced 3 times\n"), "{text}");
}

#[test]
fn unreferenced_functions_are_not_printed() {
    let source = "
            PUSHBP
            SPTOBP
            PUSHI 0
            ADDSP
            PUSHI 1
            SAY_OP
            BPTOSP
            POPBP
            RET
            PUSHBP
            SPTOBP
            PUSHI 0
            ADDSP
            PUSHI 2
            SAY_OP
            BPTOSP
            POPBP
            RET
    ";
    let text = decompile(&image_for(source), greeting_strings(), &Config::default());
    assert!(text.contains("say(\"Hail, stranger.\");"), "{text}");
    assert!(!text.contains("Who are you?"), "{text}");
    assert!(!text.contains("unused_"), "{text}");
}

#[test]
fn malformed_code_is_reported() {
    let image = image_for("PUSHBP\nSPTOBP\nPUSHI 0\nADDSP\nCALLI 9\nBPTOSP\nPOPBP\nRET");
    let err = uwconv::write_listing(&image, Vec::new(), &Config::default(), None, uwconv::ListingKind::Decompiled)
        .unwrap_err();
    assert!(err.to_string().contains("unknown intrinsic"), "{err}");
}
