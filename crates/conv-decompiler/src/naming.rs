//! Function naming.

use std::collections::BTreeMap;

/// Helper functions that every uw1 conversation links in at fixed positions.
pub const WELL_KNOWN_FUNCTIONS: [(u16, &str); 12] = [
    (0x0012, "set_global_and_exit"),
    (0x0020, "is_npc_not_attacking"),
    (0x0063, "set_npc_attitude_upset_flee_player_and_exit"),
    (0x0081, "target_player_and_exit"),
    (0x008b, "target_player_and_exit"),
    (0x00b1, "set_npc_attitude_and_exit"),
    (0x00c2, "set_npc_attitude_mellow_and_exit"),
    (0x00d1, "set_npc_attitude_upset_and_exit"),
    (0x00e0, "set_global_and_exit2"),
    (0x00ea, "get_game_time"),
    (0x0106, "subtract_and_check_game_time"),
    (0x018f, "subtract_and_compare_game_times"),
];

/// Name of the function starting at code position 0 or 1.
pub const START_FUNCTION: &str = "start";

pub fn well_known_name(pos: u16) -> Option<&'static str> {
    WELL_KNOWN_FUNCTIONS
        .iter()
        .find(|(at, _)| *at == pos)
        .map(|(_, name)| *name)
}

/// Decides how local functions are named in the output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecompileOptions {
    /// Use the uw1 prelude names from [`WELL_KNOWN_FUNCTIONS`].
    pub well_known_names: bool,
    /// Explicit names by code position; these win over everything else.
    pub function_names: BTreeMap<u16, String>,
}

impl DecompileOptions {
    pub fn with_well_known_names(mut self, enabled: bool) -> Self {
        self.well_known_names = enabled;
        self
    }

    pub fn with_function_name(mut self, pos: u16, name: impl Into<String>) -> Self {
        self.function_names.insert(pos, name.into());
        self
    }

    /// Name for the function at `pos`, falling back to `func_%04x`.
    pub fn function_name(&self, pos: u16) -> String {
        if let Some(name) = self.function_names.get(&pos) {
            return name.clone();
        }
        if self.well_known_names {
            if let Some(name) = well_known_name(pos) {
                return name.to_string();
            }
        }
        format!("func_{pos:04x}")
    }
}

/// `label_%04x`
pub fn label_name(pos: u16) -> String {
    format!("label_{pos:04x}")
}

/// `unused_%04x`
pub fn unused_name(pos: u16) -> String {
    format!("unused_{pos:04x}")
}

pub fn is_unused_name(name: &str) -> bool {
    name.starts_with("unused_")
}
