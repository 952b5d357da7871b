use std::fmt;

/// Errors encountered while locating the faulting instruction or computing
/// the address one of its operands refers to.
///
/// None of these are fatal to the caller: exploitability triage treats every
/// variant as "address undetermined" and falls back to coarser heuristics.
#[derive(Clone, Debug, thiserror::Error, PartialEq, Eq)]
pub enum Error {
    /// The fault address is not covered by the memory snapshot.
    #[error("address {address:#x} is outside of the memory snapshot")]
    OutOfBounds { address: u64 },
    /// No instruction decoder could be run on this platform.
    #[error("instruction decoder unavailable: {0}")]
    DecodeUnavailable(String),
    /// The decoder ran but produced no usable instruction text.
    #[error("failed to decode instruction: {0}")]
    DecodeFailure(String),
    /// The decoded instruction text had a malformed operand list.
    #[error("failed to tokenize instruction: {0}")]
    Tokenize(#[from] TokenizeError),
    /// The CPU architecture is not X86 or AMD64.
    #[error("unsupported CPU architecture: {0}")]
    UnsupportedArchitecture(String),
    /// A register name outside the architecture's register set.
    #[error("unsupported register: {0}")]
    UnsupportedRegister(String),
    /// A segment name outside the architecture's segment set.
    #[error("unsupported segment register: {0}")]
    UnsupportedSegment(String),
    /// The operand is a register or an immediate, not a memory reference.
    #[error("operand is not a memory reference: {0:?}")]
    NotAMemoryOperand(String),
    /// The instruction has no operand on the requested side.
    #[error("instruction has no {0} operand")]
    MissingOperand(OperandSide),
    /// The resolver failed during construction and cannot answer queries.
    #[error("faulting instruction was not resolved")]
    Unresolved,
}

impl Error {
    /// Returns just the name of the error, as a more human-friendly version of
    /// an error-code for error logging.
    pub fn name(&self) -> &'static str {
        match self {
            Error::OutOfBounds { .. } => "OutOfBounds",
            Error::DecodeUnavailable(_) => "DecodeUnavailable",
            Error::DecodeFailure(_) => "DecodeFailure",
            Error::Tokenize(_) => "TokenizeError",
            Error::UnsupportedArchitecture(_) => "UnsupportedArchitecture",
            Error::UnsupportedRegister(_) => "UnsupportedRegister",
            Error::UnsupportedSegment(_) => "UnsupportedSegment",
            Error::NotAMemoryOperand(_) => "NotAMemoryOperand",
            Error::MissingOperand(_) => "MissingOperand",
            Error::Unresolved => "Unresolved",
        }
    }
}

/// Ways a decoded instruction's operand list can be malformed.
#[derive(Clone, Debug, thiserror::Error, PartialEq, Eq)]
pub enum TokenizeError {
    /// There was no mnemonic after the instruction prefixes.
    #[error("no instruction mnemonic found")]
    MissingMnemonic,
    /// Something other than a comma followed the destination operand.
    #[error("expected comma after destination operand but found {0:?}")]
    ExpectedSeparator(String),
    /// A comma appeared where an operand was expected, or after the last operand.
    #[error("unexpected comma in operand list")]
    UnexpectedSeparator,
    /// A comma was not followed by a source operand.
    #[error("found comma but no source operand")]
    DanglingSeparator,
}

/// Which operand of a two-operand instruction is being asked about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OperandSide {
    /// The first operand (written to, for most instructions).
    Destination,
    /// The second operand.
    Source,
}

impl fmt::Display for OperandSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperandSide::Destination => f.write_str("destination"),
            OperandSide::Source => f.write_str("source"),
        }
    }
}
