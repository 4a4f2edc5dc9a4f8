//! Tool configuration, loaded from a TOML or JSON file and overridden by flags.

use std::{collections::BTreeMap, path::Path};

use conv_decompiler::{DecompileOptions, RenderOptions};
use serde::Deserialize;

use crate::Error;

/// Settings shared by all commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Spaces per indentation level in decompiled output.
    pub indent_width: usize,
    /// Interleave the disassembly as comments in decompiled output.
    pub show_disassembly_comments: bool,
    /// Name the uw1 prelude functions instead of using `func_xxxx`.
    pub well_known_names: bool,
    /// Function names by code position.
    pub function_names: BTreeMap<u16, String>,
    /// Instruction limit for `run`.
    pub max_steps: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            indent_width: 3,
            show_disassembly_comments: false,
            well_known_names: true,
            function_names: BTreeMap::new(),
            max_steps: 100_000,
        }
    }
}

impl Config {
    /// Create a new builder for `Config`.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Load a `.toml` or `.json` configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let file: ConfigFile = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::from_str(&text)?,
            _ => toml::from_str(&text)?,
        };
        file.into_builder().map(ConfigBuilder::build)
    }

    pub fn decompile_options(&self) -> DecompileOptions {
        DecompileOptions {
            well_known_names: self.well_known_names,
            function_names: self.function_names.clone(),
        }
    }

    pub fn render_options(&self, name: Option<String>) -> RenderOptions {
        RenderOptions {
            indent_width: self.indent_width,
            name,
            show_disassembly: self.show_disassembly_comments,
        }
    }
}

/// Builder for `Config`; unset values fall back to the defaults.
#[derive(Debug, Default, Clone)]
pub struct ConfigBuilder {
    indent_width: Option<usize>,
    show_disassembly_comments: Option<bool>,
    well_known_names: Option<bool>,
    function_names: BTreeMap<u16, String>,
    max_steps: Option<usize>,
}

impl ConfigBuilder {
    pub fn indent_width(mut self, width: usize) -> Self {
        self.indent_width = Some(width);
        self
    }

    pub fn show_disassembly_comments(mut self, enabled: bool) -> Self {
        self.show_disassembly_comments = Some(enabled);
        self
    }

    pub fn well_known_names(mut self, enabled: bool) -> Self {
        self.well_known_names = Some(enabled);
        self
    }

    /// Name the function starting at `pos`.
    pub fn function_name(mut self, pos: u16, name: impl Into<String>) -> Self {
        self.function_names.insert(pos, name.into());
        self
    }

    pub fn max_steps(mut self, steps: usize) -> Self {
        self.max_steps = Some(steps);
        self
    }

    pub fn build(self) -> Config {
        let defaults = Config::default();
        Config {
            indent_width: self.indent_width.unwrap_or(defaults.indent_width),
            show_disassembly_comments: self
                .show_disassembly_comments
                .unwrap_or(defaults.show_disassembly_comments),
            well_known_names: self.well_known_names.unwrap_or(defaults.well_known_names),
            function_names: self.function_names,
            max_steps: self.max_steps.unwrap_or(defaults.max_steps),
        }
    }
}

/// On-disk layout; function name keys are code positions, decimal or `0x` hex.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    indent_width: Option<usize>,
    show_disassembly_comments: Option<bool>,
    well_known_names: Option<bool>,
    function_names: BTreeMap<String, String>,
    max_steps: Option<usize>,
}

impl ConfigFile {
    fn into_builder(self) -> Result<ConfigBuilder, Error> {
        let mut builder = ConfigBuilder {
            indent_width: self.indent_width,
            show_disassembly_comments: self.show_disassembly_comments,
            well_known_names: self.well_known_names,
            max_steps: self.max_steps,
            ..ConfigBuilder::default()
        };
        for (pos, name) in self.function_names {
            let pos = parse_number(&pos).ok_or_else(|| Error::Config(format!("bad function position '{pos}'")))?;
            builder = builder.function_name(pos, name);
        }
        Ok(builder)
    }
}

/// Parse `123` or `0x7b`.
pub fn parse_number(text: &str) -> Option<u16> {
    let text = text.trim();
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}
