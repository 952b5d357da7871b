//! Parsing and evaluating memory operands.
//!
//! A memory operand in Intel-syntax disassembly looks like
//!
//! ```text
//! fs:[esi+edi*4-0x80]
//! ```
//!
//! and is made up of, in order:
//!
//! * an optional segment register followed by `:`
//! * `[`
//! * a base register
//! * optionally, `+` an index register, itself optionally followed by `*` and a
//!   decimal scale
//! * optionally, `+` or `-` and a `0x`-prefixed hexadecimal offset
//! * `]`
//!
//! Nothing may precede or follow this. Register names always start with a
//! letter, which is what tells an index register apart from an offset.
//!
//! The address is `segment_base + base + index * scale +/- offset` computed
//! with wrapping 64-bit arithmetic, so that it matches what the CPU computed
//! even if the registers held garbage.

use nom::branch::alt;
use nom::bytes::complete::tag;
use nom::character::complete::{alpha1, alphanumeric0, char, digit1, hex_digit1};
use nom::combinator::{all_consuming, map, map_res, opt, recognize, value};
use nom::sequence::{delimited, pair, preceded, terminated, tuple};
use nom::IResult;

use crate::{Error, RegisterSnapshot};

/// Whether an offset is added to or subtracted from the rest of the address.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OffsetSign {
    Plus,
    Minus,
}

/// The components of a bracketed memory operand.
///
/// Names borrow from the operand text and have not been checked against any
/// architecture yet; that happens in [`AddressExpression::evaluate`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddressExpression<'a> {
    pub segment: Option<&'a str>,
    pub base: &'a str,
    pub index: Option<&'a str>,
    /// Only present together with `index`.
    pub scale: Option<u64>,
    pub offset: Option<(OffsetSign, u64)>,
}

fn register_name(input: &str) -> IResult<&str, &str> {
    recognize(pair(alpha1, alphanumeric0))(input)
}

fn decimal_u64(input: &str) -> IResult<&str, u64> {
    map_res(digit1, |digits: &str| digits.parse::<u64>())(input)
}

fn hex_u64(input: &str) -> IResult<&str, u64> {
    map_res(preceded(tag("0x"), hex_digit1), |digits: &str| {
        u64::from_str_radix(digits, 16)
    })(input)
}

// "fs:"
fn segment(input: &str) -> IResult<&str, &str> {
    terminated(register_name, char(':'))(input)
}

// "+edi*4"
fn index(input: &str) -> IResult<&str, (&str, Option<u64>)> {
    preceded(
        char('+'),
        pair(register_name, opt(preceded(char('*'), decimal_u64))),
    )(input)
}

// "-0x80"
fn offset(input: &str) -> IResult<&str, (OffsetSign, u64)> {
    pair(
        alt((
            value(OffsetSign::Plus, char('+')),
            value(OffsetSign::Minus, char('-')),
        )),
        hex_u64,
    )(input)
}

fn expression(input: &str) -> IResult<&str, AddressExpression<'_>> {
    all_consuming(map(
        pair(
            opt(segment),
            delimited(
                char('['),
                tuple((register_name, opt(index), opt(offset))),
                char(']'),
            ),
        ),
        |(segment, (base, index, offset))| AddressExpression {
            segment,
            base,
            index: index.map(|(name, _)| name),
            scale: index.and_then(|(_, scale)| scale),
            offset,
        },
    ))(input)
}

impl<'a> AddressExpression<'a> {
    /// Parse operand text as a memory reference.
    ///
    /// # Errors
    ///
    /// [`Error::NotAMemoryOperand`] if `text` is not in bracket syntax, which is
    /// the normal outcome for register and immediate operands.
    pub fn parse(text: &'a str) -> Result<Self, Error> {
        expression(text)
            .map(|(_, expr)| expr)
            .map_err(|_| Error::NotAMemoryOperand(text.to_string()))
    }

    /// Compute the address this expression refers to given `registers`.
    ///
    /// Names are resolved segment first, then base, then index, and the first
    /// one the architecture doesn't know about is reported.
    pub fn evaluate(&self, registers: &RegisterSnapshot) -> Result<u64, Error> {
        let segment_base = match self.segment {
            Some(name) => registers.segment_base(name)?,
            None => 0,
        };
        let base = registers.register(self.base)?;
        let index = match self.index {
            Some(name) => registers.register(name)?,
            None => 0,
        };
        let scale = match self.index {
            Some(_) => self.scale.unwrap_or(1),
            None => 1,
        };

        let address = segment_base
            .wrapping_add(base)
            .wrapping_add(index.wrapping_mul(scale));
        let address = match self.offset {
            Some((OffsetSign::Plus, offset)) => address.wrapping_add(offset),
            Some((OffsetSign::Minus, offset)) => address.wrapping_sub(offset),
            None => address,
        };

        tracing::trace!("evaluated {:?} to {:#x}", self, address);
        Ok(address)
    }
}

/// Parse `operand` and evaluate it against `registers` in one step.
pub fn resolve_operand(operand: &str, registers: &RegisterSnapshot) -> Result<u64, Error> {
    AddressExpression::parse(operand)?.evaluate(registers)
}
