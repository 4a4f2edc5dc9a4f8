//! Loading inputs and producing decompiled or disassembled listings.

use std::path::Path;

use conv_bytecode::ConversationImage;
use conv_decompiler::Decompiler;
use tracing::info;

use crate::{Config, Error};

/// Which listing to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingKind {
    Decompiled,
    Disassembly,
}

/// Read a string block stored as a JSON array of strings.
pub fn load_strings(path: impl AsRef<Path>) -> Result<Vec<String>, Error> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

/// Load a conversation image, applying the data patches for `slot`.
pub fn load_image(path: impl AsRef<Path>, slot: Option<u16>) -> Result<ConversationImage, Error> {
    let image = ConversationImage::from_file(path.as_ref(), slot)?;
    info!(
        "loaded {} with {} code words and {} imports",
        path.as_ref().display(),
        image.code.len(),
        image.imported_functions.len() + image.imported_globals.len()
    );
    Ok(image)
}

/// Decompile or disassemble `image` into text.
pub fn write_listing(
    image: &ConversationImage,
    strings: Vec<String>,
    config: &Config,
    name: Option<String>,
    kind: ListingKind,
) -> Result<String, Error> {
    let mut decompiler = Decompiler::new(image, strings, config.decompile_options());
    let options = config.render_options(name);
    let text = match kind {
        ListingKind::Decompiled => {
            decompiler.decompile()?;
            decompiler.render_decompiled(&options)
        }
        ListingKind::Disassembly => {
            decompiler.disassemble()?;
            decompiler.render_disassembly(&options)
        }
    };
    Ok(text)
}
