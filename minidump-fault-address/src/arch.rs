//! CPU architectures whose faulting instructions can be resolved.

use std::fmt;
use std::str::FromStr;

use crate::Error;

/// The longest possible x86 or x86-64 instruction, in bytes.
pub const MAX_INSTRUCTION_LENGTH: usize = 15;

/// The instruction sets supported by this crate.
///
/// The architecture decides which register and segment names are valid in an
/// operand, and which machine an external decoder is asked to disassemble for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Architecture {
    /// 32-bit x86.
    X86,
    /// x86-64.
    Amd64,
}

impl Architecture {
    /// The maximum number of bytes a single instruction may occupy.
    pub fn max_instruction_length(&self) -> usize {
        MAX_INSTRUCTION_LENGTH
    }

    /// The `-m` machine name objdump uses for this architecture.
    pub fn objdump_machine(&self) -> &'static str {
        match self {
            Architecture::X86 => "i386",
            Architecture::Amd64 => "i386:x86-64",
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Architecture::X86 => f.write_str("x86"),
            Architecture::Amd64 => f.write_str("amd64"),
        }
    }
}

impl FromStr for Architecture {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "x86" | "i386" => Ok(Architecture::X86),
            "amd64" | "x86_64" | "x86-64" => Ok(Architecture::Amd64),
            other => Err(Error::UnsupportedArchitecture(other.to_string())),
        }
    }
}

#[cfg(feature = "minidump")]
impl std::convert::TryFrom<minidump::system_info::Cpu> for Architecture {
    type Error = Error;

    fn try_from(cpu: minidump::system_info::Cpu) -> Result<Self, Self::Error> {
        use minidump::system_info::Cpu;
        match cpu {
            Cpu::X86 => Ok(Architecture::X86),
            Cpu::X86_64 => Ok(Architecture::Amd64),
            other => Err(Error::UnsupportedArchitecture(format!("{:?}", other))),
        }
    }
}
