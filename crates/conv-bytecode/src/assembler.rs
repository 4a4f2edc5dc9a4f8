//! A small two-pass mnemonic assembler.
//!
//! Used by fixtures, benches and the CLI to build code segments from text:
//!
//! ```text
//! ; comment
//! top:    PUSHI_EFF 1
//!         FETCHM
//!         PUSHI 0
//!         TSTEQ
//!         BEQ done        ; branch offsets are computed from labels
//!         CALL 0x0000
//! done:   RET
//!         .word 0x00ff    ; raw word
//! ```
//!
//! Operands are decimal, `0x` hex, negative decimal (two's complement) or a label.

use std::collections::HashMap;

use thiserror::Error;

use crate::{Opcode, OperandFormat};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssembleError {
    #[error("line {line}: unknown mnemonic '{name}'")]
    UnknownMnemonic { line: usize, name: String },

    #[error("line {line}: {mnemonic} requires an operand")]
    MissingOperand { line: usize, mnemonic: &'static str },

    #[error("line {line}: {mnemonic} takes no operand")]
    UnexpectedOperand { line: usize, mnemonic: &'static str },

    #[error("line {line}: cannot parse operand '{text}'")]
    BadOperand { line: usize, text: String },

    #[error("line {line}: undefined label '{label}'")]
    UndefinedLabel { line: usize, label: String },

    #[error("line {line}: label '{label}' defined twice")]
    DuplicateLabel { line: usize, label: String },
}

enum Operand<'a> {
    Value(u16),
    Label(&'a str),
}

struct Pending<'a> {
    line: usize,
    pos: u16,
    opcode: Option<Opcode>,
    operand: Option<Operand<'a>>,
}

/// Assemble mnemonic text into code words.
pub fn assemble(source: &str) -> Result<Vec<u16>, AssembleError> {
    let mut labels: HashMap<&str, u16> = HashMap::new();
    let mut pending = Vec::new();
    let mut pos: u16 = 0;

    for (index, raw) in source.lines().enumerate() {
        let line = index + 1;
        let mut text = strip_comment(raw).trim();

        while let Some((label, rest)) = split_label(text) {
            if labels.insert(label, pos).is_some() {
                return Err(AssembleError::DuplicateLabel {
                    line,
                    label: label.to_string(),
                });
            }
            text = rest.trim();
        }
        if text.is_empty() {
            continue;
        }

        let mut parts = text.split_whitespace();
        let Some(name) = parts.next() else {
            continue;
        };
        let operand_text = parts.next();
        if let Some(extra) = parts.next() {
            return Err(AssembleError::BadOperand {
                line,
                text: extra.to_string(),
            });
        }

        if name.eq_ignore_ascii_case(".word") {
            let value = match operand_text.map(|text| parse_operand(text, line)) {
                Some(Ok(Operand::Value(value))) => value,
                Some(Ok(Operand::Label(label))) => {
                    return Err(AssembleError::BadOperand {
                        line,
                        text: label.to_string(),
                    })
                }
                Some(Err(err)) => return Err(err),
                None => {
                    return Err(AssembleError::MissingOperand {
                        line,
                        mnemonic: ".word",
                    })
                }
            };
            pending.push(Pending {
                line,
                pos,
                opcode: None,
                operand: Some(Operand::Value(value)),
            });
            pos = pos.wrapping_add(1);
            continue;
        }

        let opcode = Opcode::from_mnemonic(name).ok_or_else(|| AssembleError::UnknownMnemonic {
            line,
            name: name.to_string(),
        })?;
        let operand = match (opcode.has_operand(), operand_text) {
            (true, Some(text)) => Some(parse_operand(text, line)?),
            (true, None) => {
                return Err(AssembleError::MissingOperand {
                    line,
                    mnemonic: opcode.mnemonic(),
                })
            }
            (false, Some(_)) => {
                return Err(AssembleError::UnexpectedOperand {
                    line,
                    mnemonic: opcode.mnemonic(),
                })
            }
            (false, None) => None,
        };

        pending.push(Pending {
            line,
            pos,
            opcode: Some(opcode),
            operand,
        });
        pos = pos.wrapping_add(opcode.operand_count() + 1);
    }

    let mut code = Vec::with_capacity(pos as usize);
    for item in pending {
        let Some(opcode) = item.opcode else {
            if let Some(Operand::Value(value)) = item.operand {
                code.push(value);
            }
            continue;
        };
        code.push(opcode as u16);
        let Some(operand) = item.operand else {
            continue;
        };
        let word = match operand {
            Operand::Value(value) => value,
            Operand::Label(label) => {
                let target = *labels.get(label).ok_or_else(|| AssembleError::UndefinedLabel {
                    line: item.line,
                    label: label.to_string(),
                })?;
                if opcode.info().format == OperandFormat::Relative {
                    target.wrapping_sub(item.pos.wrapping_add(1))
                } else {
                    target
                }
            }
        };
        code.push(word);
    }
    Ok(code)
}

fn strip_comment(line: &str) -> &str {
    let end = [line.find(';'), line.find("//")]
        .into_iter()
        .flatten()
        .min()
        .unwrap_or(line.len());
    &line[..end]
}

fn split_label(text: &str) -> Option<(&str, &str)> {
    let (head, rest) = text.split_once(':')?;
    let head = head.trim();
    let valid = !head.is_empty()
        && head
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
    valid.then_some((head, rest))
}

fn parse_operand(text: &str, line: usize) -> Result<Operand<'_>, AssembleError> {
    let bad = || AssembleError::BadOperand {
        line,
        text: text.to_string(),
    };

    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        return u16::from_str_radix(hex, 16).map(Operand::Value).map_err(|_| bad());
    }
    if let Some(negative) = text.strip_prefix('-') {
        let value: i32 = negative.parse().map_err(|_| bad())?;
        if value > 0x8000 {
            return Err(bad());
        }
        return Ok(Operand::Value((-value) as i16 as u16));
    }
    if text.starts_with(|c: char| c.is_ascii_digit()) {
        return text.parse::<u16>().map(Operand::Value).map_err(|_| bad());
    }
    if text.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.') {
        return Ok(Operand::Label(text));
    }
    Err(bad())
}
