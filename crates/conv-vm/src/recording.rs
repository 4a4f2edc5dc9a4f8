//! A scripted host that records every callback, for fixtures and the `run` command.

use std::{
    cell::RefCell,
    collections::{BTreeMap, HashMap, VecDeque},
    fmt,
    rc::Rc,
};

use tracing::debug;

use crate::host::{ConversationHost, GlobalAccess, IntrinsicCall};

/// One host callback observed while running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    Say {
        id: u16,
        text: String,
    },
    Menu {
        name: String,
        answers: Vec<u16>,
        chosen: u16,
    },
    Intrinsic {
        name: String,
        args: Vec<u16>,
        result: u16,
    },
    ReadGlobal {
        slot: u16,
        name: Option<String>,
        value: u16,
    },
    WriteGlobal {
        slot: u16,
        name: Option<String>,
        value: u16,
    },
}

impl fmt::Display for HostEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostEvent::Say { text, .. } => write!(f, "say: {text}"),
            HostEvent::Menu {
                name,
                answers,
                chosen,
            } => {
                let answers: Vec<String> = answers.iter().map(|id| format!("{id:#06x}")).collect();
                write!(f, "{name}: [{}] -> {chosen}", answers.join(", "))
            }
            HostEvent::Intrinsic { name, args, result } => {
                let args: Vec<String> = args.iter().map(u16::to_string).collect();
                write!(f, "call {name}({}) -> {result}", args.join(", "))
            }
            HostEvent::ReadGlobal { slot, name, value } => {
                write!(f, "read {} = {value}", global_label(*slot, name.as_deref()))
            }
            HostEvent::WriteGlobal { slot, name, value } => {
                write!(f, "write {} = {value}", global_label(*slot, name.as_deref()))
            }
        }
    }
}

fn global_label(slot: u16, name: Option<&str>) -> String {
    match name {
        Some(name) => name.to_string(),
        None => format!("global_{slot}"),
    }
}

/// Shared view of the events recorded by a [`RecordingHost`].
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    events: Rc<RefCell<Vec<HostEvent>>>,
}

impl Transcript {
    pub fn events(&self) -> Vec<HostEvent> {
        self.events.borrow().clone()
    }

    /// Lines of NPC speech, in order.
    pub fn said(&self) -> Vec<String> {
        self.events
            .borrow()
            .iter()
            .filter_map(|event| match event {
                HostEvent::Say { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: HostEvent) {
        self.events.borrow_mut().push(event);
    }
}

/// Host with scripted menu answers, fixed intrinsic results and global values.
#[derive(Debug, Default)]
pub struct RecordingHost {
    transcript: Transcript,
    answers: VecDeque<u16>,
    results: HashMap<String, u16>,
    globals: BTreeMap<String, u16>,
    record_globals: bool,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle to the events this host records.
    pub fn transcript(&self) -> Transcript {
        self.transcript.clone()
    }

    /// Menu answers to give, in order. Once exhausted, the first entry is chosen.
    pub fn with_answers(mut self, answers: impl IntoIterator<Item = u16>) -> Self {
        self.answers.extend(answers);
        self
    }

    /// Fixed result for an intrinsic; unlisted intrinsics return 0.
    pub fn with_result(mut self, intrinsic: impl Into<String>, value: u16) -> Self {
        self.results.insert(intrinsic.into(), value);
        self
    }

    /// Value supplied when the named imported global is read.
    pub fn with_global(mut self, name: impl Into<String>, value: u16) -> Self {
        self.globals.insert(name.into(), value);
        self
    }

    /// Also record global reads and writes.
    pub fn recording_globals(mut self) -> Self {
        self.record_globals = true;
        self
    }
}

impl ConversationHost for RecordingHost {
    fn say(&mut self, string_id: u16, text: &str) {
        self.transcript.push(HostEvent::Say {
            id: string_id,
            text: text.to_string(),
        });
    }

    fn invoke_intrinsic(&mut self, call: &mut IntrinsicCall<'_>) -> u16 {
        let menu = match call.name {
            "babl_menu" => Some(call.menu_answers()),
            "babl_fmenu" => Some(call.flagged_menu_answers()),
            _ => None,
        };
        if let Some(answers) = menu {
            let answers = answers.unwrap_or_default();
            let chosen = self.answers.pop_front().unwrap_or(1);
            debug!("{} offers {} answers, choosing {chosen}", call.name, answers.len());
            self.transcript.push(HostEvent::Menu {
                name: call.name.to_string(),
                answers,
                chosen,
            });
            return chosen;
        }

        let args = (0..call.arg_count())
            .map(|index| call.arg_value(index).unwrap_or(0))
            .collect();
        let result = self.results.get(call.name).copied().unwrap_or(0);
        self.transcript.push(HostEvent::Intrinsic {
            name: call.name.to_string(),
            args,
            result,
        });
        result
    }

    fn read_global(&mut self, access: GlobalAccess<'_>) -> u16 {
        let value = access
            .name
            .and_then(|name| self.globals.get(name).copied())
            .unwrap_or(access.value);
        if self.record_globals {
            self.transcript.push(HostEvent::ReadGlobal {
                slot: access.slot,
                name: access.name.map(str::to_string),
                value,
            });
        }
        value
    }

    fn write_global(&mut self, access: GlobalAccess<'_>) {
        if let Some(name) = access.name {
            self.globals.insert(name.to_string(), access.value);
        }
        if self.record_globals {
            self.transcript.push(HostEvent::WriteGlobal {
                slot: access.slot,
                name: access.name.map(str::to_string),
                value: access.value,
            });
        }
    }
}
