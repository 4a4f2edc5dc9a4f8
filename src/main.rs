use std::{
    io::{self, BufReader},
    path::{Path, PathBuf},
    process::ExitCode,
};

use clap::{Args, Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use uwconv::{
    config::parse_number, load_image, load_strings, run_conversation, write_listing, Config, Console, Debugger,
    Error, GlobalsFile, ListingKind,
};

#[derive(Parser, Debug)]
#[command(name = "uwconv", about = "Ultima Underworld conversation script tools")]
struct Cli {
    /// Configuration file (.toml or .json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decompile a conversation into C-like pseudocode
    Decompile {
        #[command(flatten)]
        input: Input,
        /// Conversation partner name for the header
        #[arg(long)]
        name: Option<String>,
        /// Interleave the disassembly as comments
        #[arg(long)]
        disassembly: bool,
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List the instructions with labels and cross references
    Disassemble {
        #[command(flatten)]
        input: Input,
        #[arg(long)]
        name: Option<String>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Run a conversation with scripted menu answers
    Run {
        #[command(flatten)]
        input: Input,
        /// Globals file (JSON, or a saved-game .dat with --slot), updated after the run
        #[arg(long)]
        globals: Option<PathBuf>,
        /// Menu answers to give, in order
        #[arg(long, value_delimiter = ',')]
        answers: Vec<u16>,
        /// Instruction limit
        #[arg(long)]
        max_steps: Option<usize>,
    },
    /// Debug a conversation interactively
    Debug {
        #[command(flatten)]
        input: Input,
        #[arg(long)]
        globals: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct Input {
    /// Conversation image file
    image: PathBuf,
    /// String block as a JSON array of strings
    #[arg(long)]
    strings: Option<PathBuf>,
    /// Conversation slot, decimal or 0x hex; selects data patches
    #[arg(long, value_parser = parse_slot)]
    slot: Option<u16>,
}

fn parse_slot(text: &str) -> Result<u16, String> {
    parse_number(text).ok_or_else(|| format!("'{text}' is not a conversation slot"))
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_target(false)
        .with_ansi(false)
        .with_writer(io::stderr)
        .init();

    match execute(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn execute(cli: Cli) -> Result<(), Error> {
    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    match cli.command {
        Command::Decompile {
            input,
            name,
            disassembly,
            output,
        } => {
            let mut config = config;
            config.show_disassembly_comments |= disassembly;
            let (image, strings) = load_input(&input)?;
            info!("decompiling {}", input.image.display());
            let text = write_listing(&image, strings, &config, name, ListingKind::Decompiled)?;
            emit(output.as_deref(), &text)
        }
        Command::Disassemble { input, name, output } => {
            let (image, strings) = load_input(&input)?;
            info!("disassembling {}", input.image.display());
            let text = write_listing(&image, strings, &config, name, ListingKind::Disassembly)?;
            emit(output.as_deref(), &text)
        }
        Command::Run {
            input,
            globals,
            answers,
            max_steps,
        } => {
            let (image, strings) = load_input(&input)?;
            let mut state = load_globals(globals.as_deref(), input.slot)?;
            let max_steps = max_steps.unwrap_or(config.max_steps);
            info!("running {} for at most {max_steps} steps", input.image.display());
            let report = run_conversation(image, strings, &mut state, &answers, max_steps)?;
            print!("{}", report.transcript());
            if let Some(path) = globals {
                state.save(&path, input.slot)?;
                info!("wrote globals to {}", path.display());
            }
            Ok(())
        }
        Command::Debug { input, globals } => {
            let (image, strings) = load_input(&input)?;
            let state = load_globals(globals.as_deref(), input.slot)?;
            let console = Console::new(BufReader::new(io::stdin()), io::stdout());
            let mut debugger = Debugger::new(image, strings, state.private, console);
            debugger.run()
        }
    }
}

fn load_input(input: &Input) -> Result<(conv_bytecode::ConversationImage, Vec<String>), Error> {
    let image = load_image(&input.image, input.slot)?;
    let strings = match &input.strings {
        Some(path) => load_strings(path)?,
        None => Vec::new(),
    };
    Ok((image, strings))
}

fn load_globals(path: Option<&Path>, slot: Option<u16>) -> Result<GlobalsFile, Error> {
    match path {
        Some(path) => GlobalsFile::load(path, slot),
        None => Ok(GlobalsFile::default()),
    }
}

fn emit(output: Option<&Path>, text: &str) -> Result<(), Error> {
    match output {
        Some(path) => {
            std::fs::write(path, text)?;
            info!("wrote {}", path.display());
            Ok(())
        }
        None => {
            print!("{text}");
            Ok(())
        }
    }
}
