//! Turning instruction bytes into a line of disassembly.
//!
//! Decoding is treated as an external capability behind the
//! [`InstructionDecoder`] trait. Every decoder produces an objdump-style
//! listing, where each instruction is on a line of the form
//!
//! ```text
//!    0:	lock cmpxchg DWORD PTR [esi+0x10],eax
//! ```
//!
//! and [`first_instruction`] extracts the instruction text from the first such
//! line. Two realizations are provided:
//!
//! * [`EmbeddedDecoder`] decodes in-process with yaxpeax-x86 (feature
//!   `disasm_yaxpeax`, on by default).
//! * [`ObjdumpDecoder`] runs GNU objdump on a temporary file.
//!
//! [`DecoderKind`] selects between them at runtime.

use std::str::FromStr;

use nom::bytes::complete::tag;
use nom::character::complete::{hex_digit1, space1};
use nom::combinator::rest;
use nom::sequence::{preceded, tuple};
use nom::IResult;

use crate::{Architecture, Error};

mod embedded;
mod objdump;

pub use embedded::EmbeddedDecoder;
pub use objdump::ObjdumpDecoder;

/// Something that can disassemble the first instruction of a byte buffer.
///
/// Implementations must be usable from several threads at once; any scratch
/// storage they need belongs to a single call.
pub trait InstructionDecoder: Send + Sync {
    /// Disassemble `bytes` as code for `arch`, returning an objdump-style listing.
    ///
    /// # Errors
    ///
    /// [`Error::DecodeUnavailable`] if the decoder cannot run at all on this
    /// system, [`Error::DecodeFailure`] if it ran but could not decode.
    fn disassemble(&self, bytes: &[u8], arch: Architecture) -> Result<String, Error>;
}

impl<D: InstructionDecoder + ?Sized> InstructionDecoder for Box<D> {
    fn disassemble(&self, bytes: &[u8], arch: Architecture) -> Result<String, Error> {
        (**self).disassemble(bytes, arch)
    }
}

impl<D: InstructionDecoder + ?Sized> InstructionDecoder for &D {
    fn disassemble(&self, bytes: &[u8], arch: Architecture) -> Result<String, Error> {
        (**self).disassemble(bytes, arch)
    }
}

/// A decoder for systems with no disassembler at all.
///
/// Every call fails with [`Error::DecodeUnavailable`], so every resolver built
/// with it stays unresolved.
#[derive(Clone, Copy, Debug, Default)]
pub struct UnavailableDecoder;

impl InstructionDecoder for UnavailableDecoder {
    fn disassemble(&self, _bytes: &[u8], _arch: Architecture) -> Result<String, Error> {
        Err(Error::DecodeUnavailable(
            "no instruction decoder configured".to_string(),
        ))
    }
}

/// Which decoder to use, for callers that pick one from configuration.
#[derive(Clone, Debug)]
pub enum DecoderKind {
    /// Decode in-process. Unavailable if built without `disasm_yaxpeax`.
    Embedded,
    /// Run objdump.
    Objdump(ObjdumpDecoder),
    /// Don't decode; every resolver stays unresolved.
    Unavailable,
}

impl Default for DecoderKind {
    fn default() -> Self {
        if cfg!(feature = "disasm_yaxpeax") {
            DecoderKind::Embedded
        } else {
            DecoderKind::Objdump(ObjdumpDecoder::new())
        }
    }
}

impl FromStr for DecoderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "embedded" => Ok(DecoderKind::Embedded),
            "objdump" => Ok(DecoderKind::Objdump(ObjdumpDecoder::new())),
            "none" => Ok(DecoderKind::Unavailable),
            other => Err(format!(
                "unknown decoder {:?} (expected one of: embedded, objdump, none)",
                other
            )),
        }
    }
}

impl InstructionDecoder for DecoderKind {
    fn disassemble(&self, bytes: &[u8], arch: Architecture) -> Result<String, Error> {
        match self {
            DecoderKind::Embedded => EmbeddedDecoder.disassemble(bytes, arch),
            DecoderKind::Objdump(objdump) => objdump.disassemble(bytes, arch),
            DecoderKind::Unavailable => UnavailableDecoder.disassemble(bytes, arch),
        }
    }
}

// "   0:	" followed by the instruction text.
fn listing_line(line: &str) -> IResult<&str, &str> {
    preceded(tuple((space1, hex_digit1, tag(":"), space1)), rest)(line)
}

/// Find the text of the first instruction in a decoder listing.
///
/// Lines that aren't instructions (file headers, section labels) are skipped.
///
/// # Errors
///
/// [`Error::DecodeFailure`] if no line has the `address: instruction` shape, or
/// if the decoder marked the first instruction as undecodable.
pub fn first_instruction(listing: &str) -> Result<&str, Error> {
    let instruction = listing
        .lines()
        .find_map(|line| listing_line(line).ok().map(|(_, text)| text.trim_end()))
        .ok_or_else(|| {
            Error::DecodeFailure("no instruction found in disassembly output".to_string())
        })?;

    if instruction == "(bad)" {
        return Err(Error::DecodeFailure(
            "bytes do not encode a valid instruction".to_string(),
        ));
    }
    Ok(instruction)
}

#[cfg(test)]
mod tests {
    use super::*;

    const OBJDUMP_OUTPUT: &str = "
/tmp/fault-address-raw-bytes-AbC123:     file format binary


Disassembly of section .data:

00000000 <.data>:
   0:	lock cmpxchg DWORD PTR [esi+0x10],eax
   4:	add    BYTE PTR [eax],al
";

    #[test]
    fn test_first_instruction() {
        assert_eq!(
            first_instruction(OBJDUMP_OUTPUT),
            Ok("lock cmpxchg DWORD PTR [esi+0x10],eax")
        );
        assert_eq!(first_instruction("  1f:  ret\r\n"), Ok("ret"));
    }

    #[test]
    fn test_malformed_listing() {
        for listing in &[
            "",
            "mov eax,ebx",
            "0:\tmov eax,ebx",
            "   zz:\tmov eax,ebx",
            "   0:mov eax,ebx",
            "00000000 <.data>:\n",
        ] {
            assert!(
                matches!(first_instruction(listing), Err(Error::DecodeFailure(_))),
                "{:?} should be rejected",
                listing
            );
        }
    }

    #[test]
    fn test_bad_instruction() {
        assert!(matches!(
            first_instruction("   0:\t(bad)  \n"),
            Err(Error::DecodeFailure(_))
        ));
    }

    #[test]
    fn test_unavailable() {
        assert!(matches!(
            UnavailableDecoder.disassemble(&[0x90], Architecture::X86),
            Err(Error::DecodeUnavailable(_))
        ));
        assert!(matches!(
            DecoderKind::Unavailable.disassemble(&[0x90], Architecture::Amd64),
            Err(Error::DecodeUnavailable(_))
        ));
    }

    #[test]
    fn test_decoder_kind_from_str() {
        assert!(matches!("embedded".parse(), Ok(DecoderKind::Embedded)));
        assert!(matches!("objdump".parse(), Ok(DecoderKind::Objdump(_))));
        assert!(matches!("none".parse(), Ok(DecoderKind::Unavailable)));
        assert!("capstone".parse::<DecoderKind>().is_err());
    }
}
