//! Non-interactive runs with scripted menu answers.

use std::{collections::BTreeMap, path::Path};

use conv_bytecode::{ConvGlobals, ConversationImage};
use conv_vm::{HostEvent, RecordingHost, RunOutcome, StackMachine};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::Error;

/// Global state carried between runs, stored as JSON.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalsFile {
    /// Private globals of the conversation, by slot.
    pub private: Vec<u16>,
    /// Imported game globals, by name.
    pub imported: BTreeMap<String, u16>,
}

impl GlobalsFile {
    /// Load globals from `path`. A `.dat` file is read in the game's saved-globals
    /// layout and contributes the private globals of `slot`; anything else is JSON.
    /// A missing file yields empty globals.
    pub fn load(path: &Path, slot: Option<u16>) -> Result<Self, Error> {
        if !path.exists() {
            return Ok(Self::default());
        }
        if is_dat(path) {
            let globals = ConvGlobals::parse(&std::fs::read(path)?, false)?;
            let private = globals.get(dat_slot(slot)?).map(<[u16]>::to_vec).unwrap_or_default();
            return Ok(Self {
                private,
                ..Self::default()
            });
        }
        Ok(serde_json::from_str(&std::fs::read_to_string(path)?)?)
    }

    /// Write the globals back in the format `load` chose for `path`.
    pub fn save(&self, path: &Path, slot: Option<u16>) -> Result<(), Error> {
        if is_dat(path) {
            let mut globals = match std::fs::read(path) {
                Ok(bytes) => ConvGlobals::parse(&bytes, false)?,
                Err(_) => ConvGlobals::new(),
            };
            globals.set(dat_slot(slot)?, self.private.clone());
            std::fs::write(path, globals.to_bytes())?;
        } else {
            std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        }
        Ok(())
    }
}

fn is_dat(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("dat"))
}

fn dat_slot(slot: Option<u16>) -> Result<u16, Error> {
    slot.ok_or_else(|| Error::Config("a .dat globals file needs --slot".into()))
}

/// What a run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub events: Vec<HostEvent>,
}

impl RunReport {
    /// One line per host event.
    pub fn transcript(&self) -> String {
        self.events.iter().map(|event| format!("{event}\n")).collect()
    }
}

/// Run `image` to completion, updating `globals` with what the script stored.
pub fn run_conversation(
    image: ConversationImage,
    strings: Vec<String>,
    globals: &mut GlobalsFile,
    answers: &[u16],
    max_steps: usize,
) -> Result<RunReport, Error> {
    let mut host = RecordingHost::new()
        .with_answers(answers.iter().copied())
        .recording_globals();
    for (name, value) in &globals.imported {
        host = host.with_global(name.clone(), *value);
    }
    let transcript = host.transcript();

    if globals.private.len() < usize::from(image.reserved_globals) {
        globals.private.resize(usize::from(image.reserved_globals), 0);
    }

    let mut machine = StackMachine::new(image, Box::new(host)).with_strings(strings);
    machine.init(&globals.private)?;
    let outcome = machine.run(max_steps)?;
    match outcome {
        RunOutcome::Finished { reason, steps } => info!("conversation finished after {steps} steps ({reason:?})"),
        RunOutcome::StepLimit { steps } => warn!("conversation still running after {steps} steps"),
    }
    machine.done(&mut globals.private);

    let events = transcript.events();
    for event in &events {
        if let HostEvent::WriteGlobal {
            name: Some(name),
            value,
            ..
        } = event
        {
            globals.imported.insert(name.clone(), *value);
        }
    }
    Ok(RunReport { outcome, events })
}

#[cfg(test)]
mod tests {
    use conv_bytecode::{assemble, DataType};
    use conv_vm::FinishReason;

    use super::*;

    fn image() -> ConversationImage {
        // global 0 is imported, global 1 private
        let code = assemble(
            "
                PUSHI 0
                FETCHM
                PUSHI 1
                OPADD
                PUSHI 0
                SWAP
                STO
                PUSHI 1
                PUSHI 7
                STO
                PUSHI 2
                SAY_OP
                EXIT_OP
            ",
        )
        .unwrap();
        ConversationImage::from_code(code)
            .with_reserved_globals(2)
            .with_global(0, "play_hunger", DataType::Int)
    }

    fn strings() -> Vec<String> {
        ["", "", "You look hungry."].map(String::from).to_vec()
    }

    #[test]
    fn globals_are_written_back() {
        let mut globals = GlobalsFile::default();
        globals.imported.insert("play_hunger".into(), 41);

        let report = run_conversation(image(), strings(), &mut globals, &[], 100).unwrap();
        assert_eq!(
            report.outcome,
            RunOutcome::Finished {
                reason: FinishReason::Exit,
                steps: 13
            }
        );
        assert_eq!(globals.imported["play_hunger"], 42);
        assert_eq!(globals.private, [42, 7]);
        assert!(report.transcript().contains("say: You look hungry.\n"));
    }

    #[test]
    fn step_limit_stops_the_run() {
        let mut globals = GlobalsFile::default();
        let report = run_conversation(image(), strings(), &mut globals, &[], 3).unwrap();
        assert_eq!(report.outcome, RunOutcome::StepLimit { steps: 3 });
    }

    #[test]
    fn dat_globals_keep_other_slots() {
        let path = std::env::temp_dir().join(format!("uwconv-runner-{}.dat", std::process::id()));
        let mut saved = ConvGlobals::new();
        saved.set(1, vec![9, 9]);
        saved.set(4, vec![3]);
        std::fs::write(&path, saved.to_bytes()).unwrap();

        let mut globals = GlobalsFile::load(&path, Some(1)).unwrap();
        assert_eq!(globals.private, [9, 9]);
        run_conversation(image(), strings(), &mut globals, &[], 100).unwrap();
        globals.save(&path, Some(1)).unwrap();

        let reloaded = ConvGlobals::parse(&std::fs::read(&path).unwrap(), false).unwrap();
        assert_eq!(reloaded.get(1), Some(&[10, 7][..]));
        assert_eq!(reloaded.get(4), Some(&[3][..]));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn dat_globals_need_a_slot() {
        let result = GlobalsFile::default().save(Path::new("nowhere.dat"), None);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn globals_file_round_trips_through_json() {
        let globals: GlobalsFile = serde_json::from_str(r#"{ "private": [1, 2] }"#).unwrap();
        assert_eq!(globals.private, [1, 2]);
        assert!(globals.imported.is_empty());
    }
}
