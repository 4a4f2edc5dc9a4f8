use thiserror::Error;

/// Anything that stops a command.
#[derive(Debug, Error)]
pub enum Error {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to load conversation: {0}")]
    Load(#[from] conv_bytecode::LoadError),

    #[error("decompilation failed: {0}")]
    Decompile(#[from] conv_decompiler::DecompileError),

    #[error("conversation fault: {0}")]
    Vm(#[from] conv_vm::VmError),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}
