//! Splitting a line of Intel-syntax disassembly into mnemonic and operands.
//!
//! The decoders emit text shaped like
//!
//! ```text
//! lock cmpxchg DWORD PTR [esi+0x10],eax
//! ```
//!
//! Tokens are runs of characters that are neither whitespace nor commas, plus
//! each comma on its own. Instruction prefixes before the mnemonic and operand
//! size qualifiers before an operand are dropped, leaving at most two operands.
//! Anything after the second operand (such as objdump's `# 0x1234` comments or
//! `<symbol>` annotations) is ignored, except for another comma, which means
//! the instruction had more operands than we can represent.

use crate::TokenizeError;

/// The mnemonic and the first two operands of an instruction.
///
/// `destination` is empty for instructions without operands, and `source` is
/// empty for instructions with fewer than two.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TokenizedInstruction {
    pub operation: String,
    pub destination: String,
    pub source: String,
}

fn is_instruction_prefix(token: &str) -> bool {
    matches!(
        token,
        "lock"
            | "rep"
            | "repe"
            | "repz"
            | "repne"
            | "repnz"
            | "xacquire"
            | "xrelease"
            | "bnd"
            | "notrack"
            // objdump prints prefixes that do not apply to any operand on
            // their own, e.g. "cs mov eax,DWORD PTR [rax]" in 64-bit code.
            | "cs"
            | "ds"
            | "ss"
            | "es"
            | "fs"
            | "gs"
            | "data16"
            | "data32"
            | "addr16"
            | "addr32"
    )
}

fn is_operand_size(token: &str) -> bool {
    const SIZES: &[&str] = &[
        "BYTE", "WORD", "DWORD", "FWORD", "QWORD", "TBYTE", "OWORD", "XMMWORD", "YMMWORD",
        "ZMMWORD", "PTR",
    ];
    SIZES.iter().any(|size| size.eq_ignore_ascii_case(token))
}

/// Iterator over the whitespace/comma separated tokens of a line.
struct Tokens<'a> {
    rest: &'a str,
}

impl<'a> Iterator for Tokens<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        let rest = self.rest.trim_start();
        if rest.is_empty() {
            self.rest = rest;
            return None;
        }
        let end = if rest.starts_with(',') {
            1
        } else {
            rest.find(|c: char| c == ',' || c.is_whitespace())
                .unwrap_or_else(|| rest.len())
        };
        let (token, rest) = rest.split_at(end);
        self.rest = rest;
        Some(token)
    }
}

fn tokens(text: &str) -> Tokens<'_> {
    Tokens { rest: text }
}

/// Split `instruction` into its mnemonic and destination/source operand text.
pub fn tokenize(instruction: &str) -> Result<TokenizedInstruction, TokenizeError> {
    let mut tokens = tokens(instruction);

    let operation = match tokens.find(|token| !is_instruction_prefix(token)) {
        Some(",") | None => return Err(TokenizeError::MissingMnemonic),
        Some(token) => token,
    };

    let destination = match tokens.find(|token| !is_operand_size(token)) {
        None => {
            return Ok(TokenizedInstruction {
                operation: operation.to_string(),
                ..Default::default()
            })
        }
        Some(",") => return Err(TokenizeError::UnexpectedSeparator),
        Some(token) => token,
    };

    match tokens.next() {
        None => {
            return Ok(TokenizedInstruction {
                operation: operation.to_string(),
                destination: destination.to_string(),
                source: String::new(),
            })
        }
        Some(",") => {}
        Some(token) => return Err(TokenizeError::ExpectedSeparator(token.to_string())),
    }

    let source = match tokens.find(|token| !is_operand_size(token)) {
        None => return Err(TokenizeError::DanglingSeparator),
        Some(",") => return Err(TokenizeError::UnexpectedSeparator),
        Some(token) => token,
    };

    // Trailing junk is fine, but another comma means we're still in the middle
    // of the operand list and something has gone wrong.
    if tokens.any(|token| token == ",") {
        return Err(TokenizeError::UnexpectedSeparator);
    }

    Ok(TokenizedInstruction {
        operation: operation.to_string(),
        destination: destination.to_string(),
        source: source.to_string(),
    })
}
