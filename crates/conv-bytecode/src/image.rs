//! Conversation image model and loader.
//!
//! A conversation image is the unpacked content of one conversation slot: a small
//! header, the import table (intrinsic functions and imported globals) and the code
//! segment. All values are little-endian.

use std::{collections::BTreeMap, fmt, fs, path::Path};

use thiserror::Error;
use tracing::{debug, warn};

/// Expected value of the first header dword.
pub const IMAGE_MAGIC: u32 = 0x0000_0828;

/// Import names longer than this are truncated.
pub const MAX_IMPORT_NAME_LEN: usize = 255;

const IMPORT_KIND_GLOBAL: u16 = 0x010f;
const IMPORT_KIND_FUNCTION: u16 = 0x0111;

const TYPE_VOID: u16 = 0x0000;
const TYPE_INT: u16 = 0x0129;
const TYPE_STRING: u16 = 0x012b;

/// Word overrides for the three conversations shipped with broken code.
const DATA_PATCHES: &[(u16, usize, u16)] = &[
    // wrong opcode where a PUSHI belongs
    (6, 0x076e, 0x0016),
    // call to 0xffff; redirect to a plausible function
    (15, 0x0584, 0x0666),
    // random argument is 2 but the switch expects three answers
    (23, 0x04fd, 0x0003),
];

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("unexpected end of image at offset {offset:#x} (needed {needed} bytes)")]
    UnexpectedEof { offset: usize, needed: usize },

    #[error("import #{index} has unknown {field} {value:#06x}")]
    MalformedImportTable {
        index: usize,
        field: &'static str,
        value: u16,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Value type of an imported item, a function result, or a local variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DataType {
    Void,
    Int,
    String,
    #[default]
    Unknown,
}

impl DataType {
    fn from_word(word: u16) -> Option<Self> {
        match word {
            TYPE_VOID => Some(DataType::Void),
            TYPE_INT => Some(DataType::Int),
            TYPE_STRING => Some(DataType::String),
            _ => None,
        }
    }

    fn to_word(self) -> u16 {
        match self {
            DataType::Void | DataType::Unknown => TYPE_VOID,
            DataType::Int => TYPE_INT,
            DataType::String => TYPE_STRING,
        }
    }

    /// Source-level spelling used in function signatures.
    pub fn as_str(self) -> &'static str {
        match self {
            DataType::Void => "void",
            DataType::Int => "int",
            DataType::String => "string",
            DataType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An imported function or global.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedItem {
    pub name: String,
    pub data_type: DataType,
}

impl ImportedItem {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// Fixed-size header preceding the import table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageHeader {
    pub magic: u32,
    pub code_size: u16,
    pub string_block: u16,
    pub reserved_globals: u16,
    pub import_count: u16,
}

/// A loaded conversation: import tables plus code words.
///
/// Immutable after load except for the data patches applied by the loader.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationImage {
    /// Conversation slot the image came from, when known.
    pub slot: Option<u16>,
    pub string_block: u16,
    pub reserved_globals: u16,
    pub imported_functions: BTreeMap<u16, ImportedItem>,
    pub imported_globals: BTreeMap<u16, ImportedItem>,
    pub code: Vec<u16>,
}

impl ConversationImage {
    /// Build an image around bare code words, without imports.
    pub fn from_code(code: Vec<u16>) -> Self {
        Self {
            code,
            ..Self::default()
        }
    }

    pub fn with_slot(mut self, slot: u16) -> Self {
        self.slot = Some(slot);
        self
    }

    pub fn with_string_block(mut self, string_block: u16) -> Self {
        self.string_block = string_block;
        self
    }

    pub fn with_reserved_globals(mut self, reserved_globals: u16) -> Self {
        self.reserved_globals = reserved_globals;
        self
    }

    pub fn with_function(mut self, id: u16, name: impl Into<String>, data_type: DataType) -> Self {
        self.imported_functions
            .insert(id, ImportedItem::new(name, data_type));
        self
    }

    pub fn with_global(mut self, id: u16, name: impl Into<String>, data_type: DataType) -> Self {
        self.imported_globals
            .insert(id, ImportedItem::new(name, data_type));
        self
    }

    /// Read and parse an image file. `slot` selects the data patches to apply.
    pub fn from_file(path: impl AsRef<Path>, slot: Option<u16>) -> Result<Self, LoadError> {
        let bytes = fs::read(path.as_ref())?;
        debug!(
            "loaded {} bytes of conversation image from {}",
            bytes.len(),
            path.as_ref().display()
        );
        Self::parse(&bytes, slot)
    }

    /// Parse an image from its on-disk bytes.
    pub fn parse(bytes: &[u8], slot: Option<u16>) -> Result<Self, LoadError> {
        let mut reader = Reader::new(bytes);

        let magic = reader.read_u32()?;
        let code_size = reader.read_u16()?;
        // two reserved words, always zero
        reader.read_bytes(4)?;
        let header = ImageHeader {
            magic,
            code_size,
            string_block: reader.read_u16()?,
            reserved_globals: reader.read_u16()?,
            import_count: reader.read_u16()?,
        };
        if header.magic != IMAGE_MAGIC {
            warn!(
                "unexpected conversation image magic {:#010x}, expected {:#010x}",
                header.magic, IMAGE_MAGIC
            );
        }

        let mut image = ConversationImage {
            slot,
            string_block: header.string_block,
            reserved_globals: header.reserved_globals,
            ..ConversationImage::default()
        };

        for index in 0..header.import_count as usize {
            let name_len = reader.read_u16()? as usize;
            let name_bytes = reader.read_bytes(name_len)?;
            let kept = &name_bytes[..name_len.min(MAX_IMPORT_NAME_LEN)];
            let name = String::from_utf8_lossy(kept)
                .trim_end_matches('\0')
                .to_string();

            let id = reader.read_u16()?;
            let _always_one = reader.read_u16()?;
            let kind = reader.read_u16()?;
            let return_type = reader.read_u16()?;

            let data_type =
                DataType::from_word(return_type).ok_or(LoadError::MalformedImportTable {
                    index,
                    field: "return type",
                    value: return_type,
                })?;
            let item = ImportedItem { name, data_type };

            match kind {
                IMPORT_KIND_FUNCTION => {
                    image.imported_functions.insert(id, item);
                }
                IMPORT_KIND_GLOBAL => {
                    image.imported_globals.insert(id, item);
                }
                _ => {
                    return Err(LoadError::MalformedImportTable {
                        index,
                        field: "import kind",
                        value: kind,
                    })
                }
            }
        }

        image.code.reserve(header.code_size as usize);
        for _ in 0..header.code_size {
            image.code.push(reader.read_u16()?);
        }

        if let Some(slot) = slot {
            image.apply_patches(slot);
        }
        Ok(image)
    }

    /// Apply the known word overrides for `slot`. Returns the number of words changed.
    pub fn apply_patches(&mut self, slot: u16) -> usize {
        let mut applied = 0;
        for &(patch_slot, pos, value) in DATA_PATCHES {
            if patch_slot != slot {
                continue;
            }
            match self.code.get_mut(pos) {
                Some(word) => {
                    debug!("patching conversation {slot} word {pos:#06x}: {:#06x} -> {value:#06x}", *word);
                    *word = value;
                    applied += 1;
                }
                None => warn!("conversation {slot} too short for patch at {pos:#06x}"),
            }
        }
        applied
    }

    /// Serialize back to the on-disk layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(16 + self.code.len() * 2);
        out.extend_from_slice(&IMAGE_MAGIC.to_le_bytes());
        push_u16(&mut out, self.code.len() as u16);
        push_u16(&mut out, 0);
        push_u16(&mut out, 0);
        push_u16(&mut out, self.string_block);
        push_u16(&mut out, self.reserved_globals);
        push_u16(
            &mut out,
            (self.imported_functions.len() + self.imported_globals.len()) as u16,
        );

        let imports = self
            .imported_functions
            .iter()
            .map(|(id, item)| (IMPORT_KIND_FUNCTION, id, item))
            .chain(
                self.imported_globals
                    .iter()
                    .map(|(id, item)| (IMPORT_KIND_GLOBAL, id, item)),
            );
        for (kind, id, item) in imports {
            let name = item.name.as_bytes();
            let name = &name[..name.len().min(MAX_IMPORT_NAME_LEN)];
            push_u16(&mut out, name.len() as u16);
            out.extend_from_slice(name);
            push_u16(&mut out, *id);
            push_u16(&mut out, 1);
            push_u16(&mut out, kind);
            push_u16(&mut out, item.data_type.to_word());
        }

        for word in &self.code {
            push_u16(&mut out, *word);
        }
        out
    }

    pub fn function_name(&self, id: u16) -> Option<&str> {
        self.imported_functions.get(&id).map(|item| item.name.as_str())
    }

    pub fn global_name(&self, slot: u16) -> Option<&str> {
        self.imported_globals.get(&slot).map(|item| item.name.as_str())
    }
}

fn push_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], LoadError> {
        let end = self.offset + len;
        let slice = self
            .bytes
            .get(self.offset..end)
            .ok_or(LoadError::UnexpectedEof {
                offset: self.offset,
                needed: len,
            })?;
        self.offset = end;
        Ok(slice)
    }

    fn read_u16(&mut self) -> Result<u16, LoadError> {
        let bytes = self.read_bytes(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn read_u32(&mut self) -> Result<u32, LoadError> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}
