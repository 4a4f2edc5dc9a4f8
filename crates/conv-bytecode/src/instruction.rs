//! Instruction decoding from 16-bit code words.

use std::fmt;

use thiserror::Error;

use crate::{Opcode, OperandFormat};

/// Errors raised while decoding code words.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unknown opcode {word:#06x} at {pos:04x}")]
    UnknownOpcode { pos: u16, word: u16 },

    #[error("opcode {opcode} at {pos:04x} is missing its operand word")]
    MissingOperand { pos: u16, opcode: Opcode },

    #[error("code position {pos:04x} is outside the code segment")]
    OutOfBounds { pos: u16 },
}

/// One decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub opcode: Opcode,
    pub operand: Option<u16>,
}

impl Instruction {
    pub fn new(opcode: Opcode, operand: Option<u16>) -> Self {
        Self { opcode, operand }
    }

    /// Decode the instruction starting at `pos`.
    pub fn decode(code: &[u16], pos: u16) -> Result<Self, DecodeError> {
        let word = *code
            .get(pos as usize)
            .ok_or(DecodeError::OutOfBounds { pos })?;
        let opcode = Opcode::from_word(word).ok_or(DecodeError::UnknownOpcode { pos, word })?;

        let operand = if opcode.has_operand() {
            let operand = code
                .get(pos as usize + 1)
                .copied()
                .ok_or(DecodeError::MissingOperand { pos, opcode })?;
            Some(operand)
        } else {
            None
        };

        Ok(Self { opcode, operand })
    }

    /// Number of code words occupied by this instruction.
    pub fn len(&self) -> u16 {
        1 + self.opcode.operand_count()
    }

    /// Absolute jump target of a jump, branch or local call at `pos`.
    ///
    /// Relative branches count from the operand word, i.e. `pos + 1`.
    pub fn jump_target(&self, pos: u16) -> Option<u16> {
        let operand = self.operand?;
        match self.opcode {
            Opcode::Jmp | Opcode::Call => Some(operand),
            Opcode::Beq | Opcode::Bne | Opcode::Bra => Some(operand.wrapping_add(pos).wrapping_add(1)),
            _ => None,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.opcode.mnemonic())?;
        let Some(operand) = self.operand else {
            return Ok(());
        };
        match self.opcode.info().format {
            OperandFormat::Relative => write!(f, " +{operand:04x}"),
            OperandFormat::Immediate => write!(f, " #{operand:04x}"),
            _ => write!(f, " ${operand:04x}"),
        }
    }
}

/// Iterator over the instructions of a code segment, yielding positions.
///
/// Unknown opcode words are yielded as errors and skipped one word at a time.
pub struct Instructions<'a> {
    code: &'a [u16],
    pos: usize,
}

impl<'a> Instructions<'a> {
    pub fn new(code: &'a [u16]) -> Self {
        Self { code, pos: 0 }
    }
}

impl Iterator for Instructions<'_> {
    type Item = (u16, Result<Instruction, DecodeError>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.code.len() {
            return None;
        }
        let pos = self.pos as u16;
        let decoded = Instruction::decode(self.code, pos);
        self.pos += match &decoded {
            Ok(inst) => inst.len() as usize,
            // A truncated operand ends the segment.
            Err(DecodeError::MissingOperand { .. }) => self.code.len() - self.pos,
            Err(_) => 1,
        };
        Some((pos, decoded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_operand_for_pushi() {
        let code = [Opcode::Pushi as u16, 42, Opcode::Ret as u16];
        let inst = Instruction::decode(&code, 0).unwrap();
        assert_eq!(inst, Instruction::new(Opcode::Pushi, Some(42)));
        assert_eq!(inst.len(), 2);
        assert_eq!(Instruction::decode(&code, 2).unwrap().operand, None);
    }

    #[test]
    fn relative_branches_count_from_operand_word() {
        let beq = Instruction::new(Opcode::Beq, Some(3));
        assert_eq!(beq.jump_target(0x000b), Some(0x000f));

        let back = Instruction::new(Opcode::Bra, Some(0xfff0));
        assert_eq!(back.jump_target(0x0020), Some(0x0011));

        let jmp = Instruction::new(Opcode::Jmp, Some(0x0042));
        assert_eq!(jmp.jump_target(0x0100), Some(0x0042));

        assert_eq!(Instruction::new(Opcode::Pushi, Some(1)).jump_target(0), None);
    }

    #[test]
    fn unknown_word_is_reported_with_position() {
        let code = [Opcode::Nop as u16, 0x0030];
        assert_eq!(
            Instruction::decode(&code, 1),
            Err(DecodeError::UnknownOpcode { pos: 1, word: 0x0030 })
        );
    }

    #[test]
    fn truncated_operand_is_an_error() {
        let code = [Opcode::Jmp as u16];
        assert!(matches!(
            Instruction::decode(&code, 0),
            Err(DecodeError::MissingOperand { pos: 0, .. })
        ));
    }

    #[test]
    fn iterator_walks_positions() {
        let code = [
            Opcode::Pushi as u16,
            1,
            0x00ff,
            Opcode::PushiEff as u16,
            0xffff,
            Opcode::Ret as u16,
        ];
        let positions: Vec<u16> = Instructions::new(&code).map(|(pos, _)| pos).collect();
        assert_eq!(positions, vec![0, 2, 3, 5]);
    }

    #[test]
    fn display_uses_operand_format() {
        assert_eq!(Instruction::new(Opcode::Pushi, Some(5)).to_string(), "PUSHI #0005");
        assert_eq!(Instruction::new(Opcode::Beq, Some(0x10)).to_string(), "BEQ +0010");
        assert_eq!(Instruction::new(Opcode::Jmp, Some(0x20)).to_string(), "JMP $0020");
        assert_eq!(Instruction::new(Opcode::Ret, None).to_string(), "RET");
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn iterator_covers_every_word_once(code in prop::collection::vec(0u16..0x30, 0..64)) {
            let mut expected = 0usize;
            for (pos, decoded) in Instructions::new(&code) {
                prop_assert_eq!(pos as usize, expected);
                expected += match decoded {
                    Ok(inst) => inst.len() as usize,
                    Err(DecodeError::MissingOperand { .. }) => code.len() - expected,
                    Err(_) => 1,
                };
            }
            prop_assert_eq!(expected, code.len());
        }
    }
}
