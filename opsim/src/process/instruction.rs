//! The instruction set.
//!
//! Programs are lists of [`Instruction`]. User programs are written as text,
//! one instruction per `;`-separated statement:
//!
//! ```text
//! DECLARE(x, 5); FOR(3); ADD(x, x, 1); END; PRINT("x is " + x); WRITE 0x40 x; READ y 0x40
//! ```
//!
//! Operands may be parenthesised and comma-separated, or separated by
//! whitespace. Numeric literals are decimal or `0x`-prefixed hexadecimal.

use crate::error::ParseError;

/// Maximum number of instructions of a user supplied program.
pub const MAX_USER_INSTRUCTIONS: usize = 50;

/// A value operand.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operand {
    /// An immediate value.
    Literal(u16),
    /// A variable, declared at 0 on first use.
    Var(String),
}

/// A fragment of a `PRINT` message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PrintPart {
    /// Literal text.
    Text(String),
    /// The value of a variable.
    Var(String),
}

/// An instruction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Instruction {
    /// Appends the concatenation of the parts to the process log.
    Print(Vec<PrintPart>),
    /// `var = value`.
    Declare {
        /// Destination.
        var: String,
        /// Initial value.
        value: u16,
    },
    /// `dst = lhs + rhs`, wrapping.
    Add {
        /// Destination.
        dst: String,
        /// Left operand.
        lhs: Operand,
        /// Right operand.
        rhs: Operand,
    },
    /// `dst = lhs - rhs`, wrapping.
    Subtract {
        /// Destination.
        dst: String,
        /// Left operand.
        lhs: Operand,
        /// Right operand.
        rhs: Operand,
    },
    /// Holds the core for the given number of ticks.
    Sleep(u32),
    /// Opens a loop running its body the given number of times.
    ForStart(u32),
    /// Closes the innermost loop.
    ForEnd,
    /// `var = memory[addr]`.
    Read {
        /// Destination.
        var: String,
        /// Logical address.
        addr: usize,
    },
    /// `memory[addr] = value`.
    Write {
        /// Logical address.
        addr: usize,
        /// Stored value.
        value: Operand,
    },
}

impl core::fmt::Display for Operand {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Operand::Literal(v) => write!(f, "{v}"),
            Operand::Var(name) => f.write_str(name),
        }
    }
}

impl core::fmt::Display for Instruction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Instruction::Print(parts) => {
                f.write_str("PRINT(")?;
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" + ")?;
                    }
                    match part {
                        PrintPart::Text(text) => write!(f, "\"{text}\"")?,
                        PrintPart::Var(name) => f.write_str(name)?,
                    }
                }
                f.write_str(")")
            }
            Instruction::Declare { var, value } => write!(f, "DECLARE({var}, {value})"),
            Instruction::Add { dst, lhs, rhs } => write!(f, "ADD({dst}, {lhs}, {rhs})"),
            Instruction::Subtract { dst, lhs, rhs } => {
                write!(f, "SUBTRACT({dst}, {lhs}, {rhs})")
            }
            Instruction::Sleep(n) => write!(f, "SLEEP({n})"),
            Instruction::ForStart(n) => write!(f, "FOR({n})"),
            Instruction::ForEnd => f.write_str("END"),
            Instruction::Read { var, addr } => write!(f, "READ {var} {addr:#x}"),
            Instruction::Write { addr, value } => write!(f, "WRITE {addr:#x} {value}"),
        }
    }
}

// Splits `text` at `sep`, ignoring separators inside double quotes.
fn split_outside_quotes(text: &str, sep: char) -> Result<Vec<&str>, ParseError> {
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut quoted = false;
    for (i, c) in text.char_indices() {
        if c == '"' {
            quoted = !quoted;
        } else if c == sep && !quoted {
            pieces.push(&text[start..i]);
            start = i + c.len_utf8();
        }
    }
    if quoted {
        return Err(ParseError::UnterminatedString);
    }
    pieces.push(&text[start..]);
    Ok(pieces)
}

fn is_identifier(token: &str) -> bool {
    let mut chars = token.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn parse_number(token: &str) -> Option<u64> {
    match token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => token.parse().ok(),
    }
}

/// Parses a numeric literal, keeping its low 16 bits.
fn parse_value(token: &str) -> Option<u16> {
    parse_number(token).map(|v| v as u16)
}

fn parse_count(token: &str) -> Result<u32, ParseError> {
    parse_number(token)
        .map(|v| v.min(u32::MAX as u64) as u32)
        .ok_or_else(|| ParseError::InvalidOperand(token.to_string()))
}

fn parse_addr(token: &str) -> Result<usize, ParseError> {
    parse_number(token)
        .and_then(|v| usize::try_from(v).ok())
        .ok_or_else(|| ParseError::InvalidOperand(token.to_string()))
}

fn parse_var(token: &str) -> Result<String, ParseError> {
    if is_identifier(token) {
        Ok(token.to_string())
    } else {
        Err(ParseError::InvalidOperand(token.to_string()))
    }
}

fn parse_operand(token: &str) -> Result<Operand, ParseError> {
    if let Some(v) = parse_value(token) {
        Ok(Operand::Literal(v))
    } else {
        parse_var(token).map(Operand::Var)
    }
}

fn parse_print(expr: &str) -> Result<Vec<PrintPart>, ParseError> {
    let expr = expr.trim();
    if expr.is_empty() {
        return Ok(vec![PrintPart::Text(String::new())]);
    }
    split_outside_quotes(expr, '+')?
        .into_iter()
        .map(str::trim)
        .map(|part| {
            match part
                .strip_prefix('"')
                .and_then(|rest| rest.strip_suffix('"'))
            {
                Some(text) => Ok(PrintPart::Text(text.to_string())),
                None => parse_var(part).map(PrintPart::Var),
            }
        })
        .collect()
}

fn expect(op: &'static str, args: &[&str], n: usize) -> Result<(), ParseError> {
    if args.len() == n {
        Ok(())
    } else {
        Err(ParseError::Arity {
            op,
            expected: n,
            found: args.len(),
        })
    }
}

impl Instruction {
    /// Parses a single statement.
    pub fn parse(statement: &str) -> Result<Self, ParseError> {
        let statement = statement.trim();
        let split = statement
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(statement.len());
        let (opcode, rest) = statement.split_at(split);
        let rest = rest.trim();
        let (body, parenthesised) = match rest.strip_prefix('(') {
            Some(inner) => (
                inner
                    .strip_suffix(')')
                    .ok_or_else(|| ParseError::InvalidOperand(rest.to_string()))?,
                true,
            ),
            None => (rest, false),
        };

        let opcode = opcode.to_ascii_uppercase();
        if opcode == "PRINT" {
            return parse_print(body).map(Instruction::Print);
        }

        let args: Vec<&str> = if body.trim().is_empty() {
            Vec::new()
        } else if parenthesised {
            split_outside_quotes(body, ',')?
                .into_iter()
                .map(str::trim)
                .collect()
        } else {
            body.split_whitespace().collect()
        };

        match opcode.as_str() {
            "DECLARE" => {
                expect("DECLARE", &args, 2)?;
                Ok(Instruction::Declare {
                    var: parse_var(args[0])?,
                    value: parse_value(args[1])
                        .ok_or_else(|| ParseError::InvalidOperand(args[1].to_string()))?,
                })
            }
            "ADD" | "SUBTRACT" => {
                let op = if opcode == "ADD" { "ADD" } else { "SUBTRACT" };
                expect(op, &args, 3)?;
                let (dst, lhs, rhs) = (
                    parse_var(args[0])?,
                    parse_operand(args[1])?,
                    parse_operand(args[2])?,
                );
                Ok(if op == "ADD" {
                    Instruction::Add { dst, lhs, rhs }
                } else {
                    Instruction::Subtract { dst, lhs, rhs }
                })
            }
            "SLEEP" => {
                expect("SLEEP", &args, 1)?;
                parse_count(args[0]).map(Instruction::Sleep)
            }
            "FOR" | "FOR_START" => {
                expect("FOR", &args, 1)?;
                parse_count(args[0]).map(Instruction::ForStart)
            }
            "END" | "FOR_END" => {
                expect("END", &args, 0)?;
                Ok(Instruction::ForEnd)
            }
            "READ" => {
                expect("READ", &args, 2)?;
                Ok(Instruction::Read {
                    var: parse_var(args[0])?,
                    addr: parse_addr(args[1])?,
                })
            }
            "WRITE" => {
                expect("WRITE", &args, 2)?;
                Ok(Instruction::Write {
                    addr: parse_addr(args[0])?,
                    value: parse_operand(args[1])?,
                })
            }
            _ => Err(ParseError::UnknownOpcode(opcode)),
        }
    }

    /// Parses a `;`-separated program of 1 to [`MAX_USER_INSTRUCTIONS`]
    /// instructions with balanced loops.
    pub fn parse_program(text: &str) -> Result<Vec<Self>, ParseError> {
        let program = split_outside_quotes(text, ';')?
            .into_iter()
            .filter(|s| !s.trim().is_empty())
            .map(Instruction::parse)
            .collect::<Result<Vec<_>, _>>()?;
        if program.is_empty() {
            return Err(ParseError::Empty);
        }
        if program.len() > MAX_USER_INSTRUCTIONS {
            return Err(ParseError::TooLong(program.len()));
        }

        let mut depth = 0usize;
        for instruction in &program {
            match instruction {
                Instruction::ForStart(_) => depth += 1,
                Instruction::ForEnd => {
                    depth = depth.checked_sub(1).ok_or(ParseError::UnbalancedLoop)?
                }
                _ => (),
            }
        }
        if depth != 0 {
            return Err(ParseError::UnbalancedLoop);
        }
        Ok(program)
    }
}
