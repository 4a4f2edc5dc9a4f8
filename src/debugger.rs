//! Interactive conversation debugger.
//!
//! Reads commands line by line and steps a [`StackMachine`] whose host prints
//! speech and asks for menu answers on the same console.

use std::{
    cell::{Cell, RefCell},
    collections::BTreeSet,
    io::{BufRead, Write},
    rc::Rc,
};

use conv_bytecode::{ConversationImage, Instruction};
use conv_vm::{ConversationHost, GlobalAccess, IntrinsicCall, StackMachine, Step, EMPTY_SP};
use tracing::debug;

use crate::Error;

const HELP: &str = "\
help      h  shows this help
info      i  shows info about the machine, including breakpoints
reg       r  shows registers
list [n]  l  lists instructions from code position 0x<n> (or the current ip)
dump      d  dumps the complete stack
step [n]  s  executes n instructions (default 1)
cont      c  continues until a breakpoint is reached or the conversation ends
break n   b  toggles a breakpoint at code position 0x<n>
verbose   v  toggles verbose output
reset        restarts the conversation and deletes all breakpoints
exit      x  quits the debugger
";

/// Input and output shared by the debugger and its host.
pub struct Console {
    input: Box<dyn BufRead>,
    output: Box<dyn Write>,
}

impl Console {
    pub fn new(input: impl BufRead + 'static, output: impl Write + 'static) -> Self {
        Self {
            input: Box::new(input),
            output: Box::new(output),
        }
    }

    fn read_line(&mut self) -> Option<String> {
        let mut line = String::new();
        match self.input.read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim().to_string()),
        }
    }

    fn print(&mut self, text: &str) {
        let _ = self.output.write_all(text.as_bytes());
        let _ = self.output.flush();
    }
}

type SharedConsole = Rc<RefCell<Console>>;

/// Host that prints speech, intrinsic calls and global accesses, and reads
/// menu answers from the console.
pub struct DebuggerHost {
    console: SharedConsole,
    verbose: Rc<Cell<bool>>,
}

impl DebuggerHost {
    fn print(&self, text: &str) {
        self.console.borrow_mut().print(text);
    }

    fn choose(&self, options: &[String]) -> u16 {
        let mut console = self.console.borrow_mut();
        for (index, text) in options.iter().enumerate() {
            console.print(&format!("{}. {text}\n", index + 1));
        }
        loop {
            console.print("what do you respond? ");
            let Some(line) = console.read_line() else {
                console.print("\nno answer, choosing 1\n");
                return 1;
            };
            match line.parse::<u16>() {
                Ok(answer) if answer >= 1 && usize::from(answer) <= options.len() => {
                    console.print(&format!("response: {answer}\n\n"));
                    return answer;
                }
                _ => {}
            }
        }
    }
}

impl ConversationHost for DebuggerHost {
    fn say(&mut self, string_id: u16, text: &str) {
        if self.verbose.get() {
            self.print(&format!("SAY ({string_id:04x})\n"));
        }
        self.print(&format!("{text}\n\n"));
    }

    fn invoke_intrinsic(&mut self, call: &mut IntrinsicCall<'_>) -> u16 {
        if self.verbose.get() {
            self.print(&format!("{:04x}: CALLI {:04x}: \"{}\"\n", call.pos, call.id, call.name));
        }
        let answers = match call.name {
            "babl_menu" => call.menu_answers(),
            "babl_fmenu" => call.flagged_menu_answers(),
            _ => {
                let args: Vec<String> = (0..call.arg_count())
                    .map(|index| format!("{:04x}", call.arg_value(index).unwrap_or(0)))
                    .collect();
                self.print(&format!("calling intrinsic {}({})\n", call.name, args.join(", ")));
                return 0;
            }
        };
        let options: Vec<String> = answers
            .unwrap_or_default()
            .into_iter()
            .map(|id| call.string(id).unwrap_or_default().to_string())
            .collect();
        if options.is_empty() {
            return 0;
        }
        self.choose(&options)
    }

    fn read_global(&mut self, access: GlobalAccess<'_>) -> u16 {
        if let Some(name) = access.name {
            self.print(&format!("querying global value: {name}\n"));
        }
        access.value
    }

    fn write_global(&mut self, access: GlobalAccess<'_>) {
        if let Some(name) = access.name {
            self.print(&format!("setting global value: {name} to value {}\n", access.value));
        }
    }
}

/// How many instructions a command asks to run.
enum Run {
    Steps(usize),
    Continue,
}

pub struct Debugger {
    machine: StackMachine,
    console: SharedConsole,
    verbose: Rc<Cell<bool>>,
    breakpoints: BTreeSet<u16>,
    globals: Vec<u16>,
    last_command: String,
}

impl Debugger {
    pub fn new(image: ConversationImage, strings: Vec<String>, globals: Vec<u16>, console: Console) -> Self {
        let console = Rc::new(RefCell::new(console));
        let verbose = Rc::new(Cell::new(false));
        let host = DebuggerHost {
            console: Rc::clone(&console),
            verbose: Rc::clone(&verbose),
        };
        Self {
            machine: StackMachine::new(image, Box::new(host)).with_strings(strings),
            console,
            verbose,
            breakpoints: BTreeSet::new(),
            globals,
            last_command: String::new(),
        }
    }

    /// Private globals as left by the last finished run.
    pub fn globals(&self) -> &[u16] {
        &self.globals
    }

    fn print(&self, text: &str) {
        self.console.borrow_mut().print(text);
    }

    /// Run the command loop until `exit` or end of input.
    pub fn run(&mut self) -> Result<(), Error> {
        self.machine.init(&self.globals)?;
        self.print("type \"help\" to see all commands\n");
        loop {
            self.print("\n");
            self.list(self.machine.ip(), 1);
            self.print(">");
            let Some(line) = self.console.borrow_mut().read_line() else {
                return Ok(());
            };
            let command = if line.is_empty() {
                self.last_command.clone()
            } else {
                line.to_lowercase()
            };
            self.last_command.clone_from(&command);

            if !self.execute(&command)? {
                return Ok(());
            }
        }
    }

    /// Run one command; `false` ends the session.
    fn execute(&mut self, command: &str) -> Result<bool, Error> {
        let mut words = command.split_whitespace();
        let name = words.next().unwrap_or_default();
        let arg = words.next();
        debug!("debugger command '{command}'");

        match name {
            "help" | "h" | "?" => self.print(HELP),
            "info" | "i" => self.info(),
            "reg" | "r" => self.print(&format!(
                "registers:\ninstrp: {:04x}   stackp: {:04x}   basep: {:04x}   result_reg: {:04x}\n",
                self.machine.ip(),
                self.machine.sp(),
                self.machine.bp(),
                self.machine.result_register()
            )),
            "list" | "l" => {
                let from = arg.and_then(parse_hex).unwrap_or_else(|| self.machine.ip());
                self.list(from, 5);
            }
            "dump" | "d" => self.dump(),
            "step" | "s" | "n" => {
                let steps = arg.and_then(|arg| arg.parse().ok()).unwrap_or(1);
                self.resume(Run::Steps(steps))?;
            }
            "cont" | "c" => self.resume(Run::Continue)?,
            "break" | "b" => match arg.and_then(parse_hex) {
                Some(pos) if self.breakpoints.remove(&pos) => {
                    self.print(&format!("deleted breakpoint at {pos:04x}\n"));
                }
                Some(pos) => {
                    self.breakpoints.insert(pos);
                    self.print(&format!("added breakpoint at {pos:04x}\n"));
                }
                None => self.print("usage: break <hex position>\n"),
            },
            "verbose" | "v" => {
                self.verbose.set(!self.verbose.get());
                self.print(&format!("verbose: {}\n", on_off(self.verbose.get())));
            }
            "reset" => {
                self.print("restarting conversation, deleting all breakpoints.\n");
                self.machine.init(&self.globals)?;
                self.breakpoints.clear();
            }
            "exit" | "x" | "quit" | "q" => return Ok(false),
            _ => self.print(&format!("unknown command '{command}'; type \"help\"\n")),
        }
        Ok(true)
    }

    fn info(&self) {
        let image = self.machine.image();
        let mut text = String::new();
        if let Some(slot) = image.slot {
            text.push_str(&format!("conversation #{slot}, "));
        }
        text.push_str(&format!("string block {:04x}\n", image.string_block));
        text.push_str(&format!(
            "code size: {:04x}, call depth: {}, verbose: {}\n",
            image.code.len(),
            self.machine.call_depth(),
            on_off(self.verbose.get())
        ));
        text.push_str(&format!(
            "private globals: {:04x}; imported functions: {:04x}; imported globals: {:04x}\n",
            image.reserved_globals,
            image.imported_functions.len(),
            image.imported_globals.len()
        ));
        if self.breakpoints.is_empty() {
            text.push_str("no breakpoints set.\n");
        } else {
            let positions: Vec<String> = self.breakpoints.iter().map(|pos| format!("{pos:04x}")).collect();
            text.push_str(&format!("breakpoints: {}\n", positions.join(" ")));
        }
        self.print(&text);
    }

    fn list(&self, from: u16, count: usize) {
        let code = &self.machine.image().code;
        let mut pos = from;
        let mut text = String::new();
        for _ in 0..count {
            if usize::from(pos) >= code.len() {
                break;
            }
            match Instruction::decode(code, pos) {
                Ok(instruction) => {
                    let operand = instruction
                        .operand
                        .map(|operand| format!("{operand:04x}"))
                        .unwrap_or_else(|| "    ".to_string());
                    text.push_str(&format!(
                        "{pos:04x} {:04x} {operand}    {instruction}\n",
                        code[usize::from(pos)]
                    ));
                    pos = pos.wrapping_add(instruction.len());
                }
                Err(err) => {
                    text.push_str(&format!("{pos:04x} {:04x}          ??? ({err})\n", code[usize::from(pos)]));
                    pos = pos.wrapping_add(1);
                }
            }
        }
        self.print(&text);
    }

    fn dump(&self) {
        let stack = self.machine.stack();
        let sp = stack.sp();
        let mut text = format!("stackp = {sp:04x}\n");
        if sp != EMPTY_SP {
            for (index, value) in stack.contents().iter().take(usize::from(sp) + 1).enumerate() {
                if index % 8 == 0 {
                    text.push_str(&format!("{index:04x}:  "));
                }
                text.push_str(&format!("{value:04x} "));
                if index % 8 == 7 {
                    text.push('\n');
                }
            }
        }
        text.push('\n');
        self.print(&text);
    }

    fn resume(&mut self, run: Run) -> Result<(), Error> {
        let mut remaining = match run {
            Run::Steps(steps) => Some(steps),
            Run::Continue => None,
        };
        while remaining != Some(0) {
            match self.machine.step() {
                Ok(Step::Continue) => {}
                Ok(Step::Finished(_)) => {
                    self.print(&format!("conversation ended (at {:04x}).\n\n", self.machine.ip()));
                    self.machine.done(&mut self.globals);
                    self.machine.init(&self.globals)?;
                    return Ok(());
                }
                Err(err) => {
                    self.print(&format!("fault at ip = {:04x}: {err}\n", self.machine.ip()));
                    self.last_command.clear();
                    return Ok(());
                }
            }
            if self.breakpoints.contains(&self.machine.ip()) {
                self.print(&format!("breakpoint at {:04x} reached\n", self.machine.ip()));
                return Ok(());
            }
            if let Some(steps) = remaining.as_mut() {
                *steps -= 1;
            }
        }
        Ok(())
    }
}

fn parse_hex(text: &str) -> Option<u16> {
    u16::from_str_radix(text.trim_start_matches("0x"), 16).ok()
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "on"
    } else {
        "off"
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use conv_bytecode::{assemble, DataType};

    use super::*;

    /// Output sink the test can read back after the debugger wrote to it.
    #[derive(Clone, Default)]
    struct Sink(Rc<RefCell<Vec<u8>>>);

    impl Write for Sink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Sink {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.borrow()).into_owned()
        }
    }

    fn session(commands: &str) -> String {
        let code = assemble(
            "
                PUSHI 1
                SAY_OP
                PUSHI 2
                PUSHI 0
                PUSHI 0
                PUSHI 1
                CALLI 0
                POP
                POP
                PUSH_REG
                SAY_OP
                EXIT_OP
            ",
        )
        .unwrap();
        let image = ConversationImage::from_code(code).with_function(0, "babl_menu", DataType::Int);
        let strings = ["", "Greetings.", "Farewell"].map(String::from).to_vec();
        let sink = Sink::default();
        let console = Console::new(Cursor::new(commands.as_bytes().to_vec()), sink.clone());
        let mut debugger = Debugger::new(image, strings, Vec::new(), console);
        debugger.run().unwrap();
        sink.text()
    }

    #[test]
    fn step_shows_speech() {
        let text = session("step 2\nexit\n");
        assert!(text.contains("Greetings.\n"), "{text}");
        assert!(text.contains("0000 0016 0001    PUSHI #0001\n"), "{text}");
    }

    #[test]
    fn breakpoints_toggle_and_stop_execution() {
        let text = session("break 4\nbreak 4\nbreak 2\ncont\nreg\n");
        assert!(text.contains("added breakpoint at 0004\n"), "{text}");
        assert!(text.contains("deleted breakpoint at 0004\n"), "{text}");
        assert!(text.contains("breakpoint at 0002 reached\n"), "{text}");
        assert!(text.contains("instrp: 0002"), "{text}");
    }

    #[test]
    fn menus_read_answers_from_the_console() {
        let text = session("cont\n7\n1\nexit\n");
        assert!(text.contains("1. Farewell\n"), "{text}");
        assert!(text.contains("response: 1\n"), "{text}");
        assert!(text.contains("conversation ended"), "{text}");
    }

    #[test]
    fn empty_line_repeats_the_last_command() {
        let text = session("step\n\ninfo\n");
        assert!(text.contains("Greetings.\n"), "{text}");
        assert!(text.contains("no breakpoints set.\n"), "{text}");
    }
}
