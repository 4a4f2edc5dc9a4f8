//! Running conversations with scripted menu answers.

mod common;

use common::{
    fixtures::{greeting_strings, image_for},
    harness::run_greeting,
};
use conv_vm::{FinishReason, HostEvent, RunOutcome};
use uwconv::{run_conversation, Error, GlobalsFile};

#[test]
fn first_answer_introduces_the_npc() {
    let report = run_greeting(&[1]);
    let said: Vec<_> = report
        .events
        .iter()
        .filter_map(|event| match event {
            HostEvent::Say { text, .. } => Some(text.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(said, ["Hail, stranger.", "I am Bragit."]);
    assert!(matches!(
        report.outcome,
        RunOutcome::Finished {
            reason: FinishReason::Return,
            ..
        }
    ));
}

#[test]
fn second_answer_calls_the_farewell() {
    let report = run_greeting(&[2]);
    assert!(report.events.contains(&HostEvent::Menu {
        name: "babl_menu".into(),
        answers: vec![2, 3],
        chosen: 2,
    }));
    assert!(report.transcript().ends_with("say: Safe travels.\n"), "{}", report.transcript());
}

#[test]
fn division_by_zero_is_a_fault() {
    let image = image_for("PUSHI 10\nPUSHI 0\nOPDIV\nEXIT_OP");
    let mut globals = GlobalsFile::default();
    let err = run_conversation(image, greeting_strings(), &mut globals, &[], 100).unwrap_err();
    assert!(matches!(err, Error::Vm(conv_vm::VmError::DivisionByZero { pos: 4 })), "{err}");
}
