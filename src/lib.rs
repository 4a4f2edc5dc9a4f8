//! Command-line front end for the Ultima Underworld conversation tools.
//!
//! Wraps the decompiler and the stack machine with configuration, input
//! loading, a scripted runner and an interactive debugger.

pub mod config;
pub mod debugger;
mod error;
pub mod listing;
pub mod runner;

pub use config::{Config, ConfigBuilder};
pub use debugger::{Console, Debugger};
pub use error::Error;
pub use listing::{load_image, load_strings, write_listing, ListingKind};
pub use runner::{run_conversation, GlobalsFile, RunReport};
