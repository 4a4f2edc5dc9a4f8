//! Per-conversation private globals, as stored in `babglobs.dat` / `bglobals.dat`.
//!
//! The file is a sequence of `u16 slot, u16 size` records. The saved-game variant
//! follows each record with `size` words of values; the initial variant carries only
//! the sizes and every global starts at zero.

use crate::image::LoadError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConvGlobals {
    slots: Vec<Vec<u16>>,
}

impl ConvGlobals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a globals file. `initial` selects the sizes-only layout.
    pub fn parse(bytes: &[u8], initial: bool) -> Result<Self, LoadError> {
        let mut globals = Self::new();
        let mut offset = 0;
        let read_u16 = |offset: &mut usize| -> Result<u16, LoadError> {
            let word = bytes
                .get(*offset..*offset + 2)
                .ok_or(LoadError::UnexpectedEof {
                    offset: *offset,
                    needed: 2,
                })?;
            *offset += 2;
            Ok(u16::from_le_bytes([word[0], word[1]]))
        };

        while offset < bytes.len() {
            let slot = read_u16(&mut offset)?;
            let size = read_u16(&mut offset)?;
            let values = if initial {
                vec![0; size as usize]
            } else {
                (0..size)
                    .map(|_| read_u16(&mut offset))
                    .collect::<Result<Vec<_>, _>>()?
            };
            globals.set(slot, values);
        }
        Ok(globals)
    }

    /// Serialize in the saved-game layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for (slot, values) in self.slots.iter().enumerate() {
            if values.is_empty() {
                continue;
            }
            out.extend_from_slice(&(slot as u16).to_le_bytes());
            out.extend_from_slice(&(values.len() as u16).to_le_bytes());
            for value in values {
                out.extend_from_slice(&value.to_le_bytes());
            }
        }
        out
    }

    pub fn get(&self, slot: u16) -> Option<&[u16]> {
        self.slots.get(slot as usize).map(Vec::as_slice)
    }

    pub fn get_mut(&mut self, slot: u16) -> &mut Vec<u16> {
        let index = slot as usize;
        if index >= self.slots.len() {
            self.slots.resize(index + 1, Vec::new());
        }
        &mut self.slots[index]
    }

    pub fn set(&mut self, slot: u16, values: Vec<u16>) {
        *self.get_mut(slot) = values;
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }
}
