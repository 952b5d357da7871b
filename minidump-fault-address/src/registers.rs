//! Register and segment tables for the supported architectures.
//!
//! Operand text names registers as strings ("esi", "r13", "fs"). Each
//! architecture has a closed set of names it understands; anything else is
//! rejected with [`Error::UnsupportedRegister`] or [`Error::UnsupportedSegment`]
//! instead of being treated as zero.
//!
//! Only full-width general purpose registers are supported, since they are the
//! only ones that can appear in an address expression.

use crate::{Architecture, Error};

macro_rules! name_table {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident { $($variant:ident => $text:literal,)+ }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        $vis enum $name {
            $($variant,)+
        }

        impl $name {
            /// Every member of the set, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant,)+];

            /// The lowercase name used in Intel-syntax disassembly.
            pub fn name(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }

            /// Look up a member by its disassembly name.
            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $($text => Some($name::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

name_table! {
    /// General purpose registers of 32-bit x86.
    pub enum X86Register {
        Eax => "eax",
        Ebx => "ebx",
        Ecx => "ecx",
        Edx => "edx",
        Edi => "edi",
        Esi => "esi",
        Ebp => "ebp",
        Esp => "esp",
        Eip => "eip",
    }
}

name_table! {
    /// Segment registers whose base is captured for 32-bit x86.
    pub enum X86Segment {
        Ds => "ds",
        Es => "es",
        Fs => "fs",
        Gs => "gs",
    }
}

name_table! {
    /// General purpose registers of x86-64.
    pub enum Amd64Register {
        Rax => "rax",
        Rbx => "rbx",
        Rcx => "rcx",
        Rdx => "rdx",
        Rdi => "rdi",
        Rsi => "rsi",
        Rbp => "rbp",
        Rsp => "rsp",
        R8 => "r8",
        R9 => "r9",
        R10 => "r10",
        R11 => "r11",
        R12 => "r12",
        R13 => "r13",
        R14 => "r14",
        R15 => "r15",
        Rip => "rip",
    }
}

name_table! {
    /// Segment registers x86-64 addressing can name.
    ///
    /// `ds` and `es` are flat in 64-bit mode and always have a base of zero.
    /// `fs` and `gs` bases are not captured, so they are absent.
    pub enum Amd64Segment {
        Ds => "ds",
        Es => "es",
    }
}

/// Captured register state of a 32-bit x86 thread.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct X86Registers {
    pub eax: u64,
    pub ebx: u64,
    pub ecx: u64,
    pub edx: u64,
    pub edi: u64,
    pub esi: u64,
    pub ebp: u64,
    pub esp: u64,
    pub eip: u64,
    /// Segment bases.
    pub ds: u64,
    pub es: u64,
    pub fs: u64,
    pub gs: u64,
}

impl X86Registers {
    pub fn get(&self, reg: X86Register) -> u64 {
        match reg {
            X86Register::Eax => self.eax,
            X86Register::Ebx => self.ebx,
            X86Register::Ecx => self.ecx,
            X86Register::Edx => self.edx,
            X86Register::Edi => self.edi,
            X86Register::Esi => self.esi,
            X86Register::Ebp => self.ebp,
            X86Register::Esp => self.esp,
            X86Register::Eip => self.eip,
        }
    }

    pub fn set(&mut self, reg: X86Register, value: u64) {
        let slot = match reg {
            X86Register::Eax => &mut self.eax,
            X86Register::Ebx => &mut self.ebx,
            X86Register::Ecx => &mut self.ecx,
            X86Register::Edx => &mut self.edx,
            X86Register::Edi => &mut self.edi,
            X86Register::Esi => &mut self.esi,
            X86Register::Ebp => &mut self.ebp,
            X86Register::Esp => &mut self.esp,
            X86Register::Eip => &mut self.eip,
        };
        *slot = value;
    }

    pub fn segment_base(&self, segment: X86Segment) -> u64 {
        match segment {
            X86Segment::Ds => self.ds,
            X86Segment::Es => self.es,
            X86Segment::Fs => self.fs,
            X86Segment::Gs => self.gs,
        }
    }

    pub fn set_segment_base(&mut self, segment: X86Segment, value: u64) {
        let slot = match segment {
            X86Segment::Ds => &mut self.ds,
            X86Segment::Es => &mut self.es,
            X86Segment::Fs => &mut self.fs,
            X86Segment::Gs => &mut self.gs,
        };
        *slot = value;
    }
}

/// Captured register state of an x86-64 thread.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Amd64Registers {
    pub rax: u64,
    pub rbx: u64,
    pub rcx: u64,
    pub rdx: u64,
    pub rdi: u64,
    pub rsi: u64,
    pub rbp: u64,
    pub rsp: u64,
    pub r8: u64,
    pub r9: u64,
    pub r10: u64,
    pub r11: u64,
    pub r12: u64,
    pub r13: u64,
    pub r14: u64,
    pub r15: u64,
    pub rip: u64,
}

impl Amd64Registers {
    pub fn get(&self, reg: Amd64Register) -> u64 {
        match reg {
            Amd64Register::Rax => self.rax,
            Amd64Register::Rbx => self.rbx,
            Amd64Register::Rcx => self.rcx,
            Amd64Register::Rdx => self.rdx,
            Amd64Register::Rdi => self.rdi,
            Amd64Register::Rsi => self.rsi,
            Amd64Register::Rbp => self.rbp,
            Amd64Register::Rsp => self.rsp,
            Amd64Register::R8 => self.r8,
            Amd64Register::R9 => self.r9,
            Amd64Register::R10 => self.r10,
            Amd64Register::R11 => self.r11,
            Amd64Register::R12 => self.r12,
            Amd64Register::R13 => self.r13,
            Amd64Register::R14 => self.r14,
            Amd64Register::R15 => self.r15,
            Amd64Register::Rip => self.rip,
        }
    }

    pub fn set(&mut self, reg: Amd64Register, value: u64) {
        let slot = match reg {
            Amd64Register::Rax => &mut self.rax,
            Amd64Register::Rbx => &mut self.rbx,
            Amd64Register::Rcx => &mut self.rcx,
            Amd64Register::Rdx => &mut self.rdx,
            Amd64Register::Rdi => &mut self.rdi,
            Amd64Register::Rsi => &mut self.rsi,
            Amd64Register::Rbp => &mut self.rbp,
            Amd64Register::Rsp => &mut self.rsp,
            Amd64Register::R8 => &mut self.r8,
            Amd64Register::R9 => &mut self.r9,
            Amd64Register::R10 => &mut self.r10,
            Amd64Register::R11 => &mut self.r11,
            Amd64Register::R12 => &mut self.r12,
            Amd64Register::R13 => &mut self.r13,
            Amd64Register::R14 => &mut self.r14,
            Amd64Register::R15 => &mut self.r15,
            Amd64Register::Rip => &mut self.rip,
        };
        *slot = value;
    }

    pub fn segment_base(&self, segment: Amd64Segment) -> u64 {
        match segment {
            Amd64Segment::Ds | Amd64Segment::Es => 0,
        }
    }
}

/// The register state an address expression is evaluated against.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegisterSnapshot {
    X86(X86Registers),
    Amd64(Amd64Registers),
}

impl RegisterSnapshot {
    /// An all-zero snapshot for `arch`.
    pub fn new(arch: Architecture) -> RegisterSnapshot {
        match arch {
            Architecture::X86 => RegisterSnapshot::X86(X86Registers::default()),
            Architecture::Amd64 => RegisterSnapshot::Amd64(Amd64Registers::default()),
        }
    }

    pub fn architecture(&self) -> Architecture {
        match self {
            RegisterSnapshot::X86(_) => Architecture::X86,
            RegisterSnapshot::Amd64(_) => Architecture::Amd64,
        }
    }

    /// Read a general purpose register by name.
    pub fn register(&self, name: &str) -> Result<u64, Error> {
        let value = match self {
            RegisterSnapshot::X86(regs) => X86Register::from_name(name).map(|r| regs.get(r)),
            RegisterSnapshot::Amd64(regs) => Amd64Register::from_name(name).map(|r| regs.get(r)),
        };
        value.ok_or_else(|| {
            tracing::debug!("unsupported {} register: {}", self.architecture(), name);
            Error::UnsupportedRegister(name.to_string())
        })
    }

    /// Read the base address of a segment register by name.
    pub fn segment_base(&self, name: &str) -> Result<u64, Error> {
        let value = match self {
            RegisterSnapshot::X86(regs) => {
                X86Segment::from_name(name).map(|s| regs.segment_base(s))
            }
            RegisterSnapshot::Amd64(regs) => {
                Amd64Segment::from_name(name).map(|s| regs.segment_base(s))
            }
        };
        value.ok_or_else(|| {
            tracing::debug!("unsupported {} segment register: {}", self.architecture(), name);
            Error::UnsupportedSegment(name.to_string())
        })
    }

    /// Set a general purpose register by name.
    pub fn set_register(&mut self, name: &str, value: u64) -> Result<(), Error> {
        match self {
            RegisterSnapshot::X86(regs) => {
                let reg = X86Register::from_name(name)
                    .ok_or_else(|| Error::UnsupportedRegister(name.to_string()))?;
                regs.set(reg, value);
            }
            RegisterSnapshot::Amd64(regs) => {
                let reg = Amd64Register::from_name(name)
                    .ok_or_else(|| Error::UnsupportedRegister(name.to_string()))?;
                regs.set(reg, value);
            }
        }
        Ok(())
    }
}

impl From<X86Registers> for RegisterSnapshot {
    fn from(regs: X86Registers) -> Self {
        RegisterSnapshot::X86(regs)
    }
}

impl From<Amd64Registers> for RegisterSnapshot {
    fn from(regs: Amd64Registers) -> Self {
        RegisterSnapshot::Amd64(regs)
    }
}

/// Build a snapshot from a minidump thread or exception context.
///
/// Register validity is not consulted: the exception context of a crash is
/// always fully populated.
///
/// The x86 `ds`, `es`, `fs` and `gs` fields of a context are segment
/// *selectors* (values such as `0x23` or `0x3b`), not linear base addresses.
/// They are copied as-is and then used as the segment base when an operand
/// carries an override, so an `fs:[...]` address resolved from a converted
/// context is offset by the selector value rather than the real TEB base.
/// Overwrite it with [`X86Registers::set_segment_base`] when the true base is
/// known.
#[cfg(feature = "minidump")]
impl std::convert::TryFrom<&minidump::MinidumpContext> for RegisterSnapshot {
    type Error = Error;

    fn try_from(context: &minidump::MinidumpContext) -> Result<Self, Self::Error> {
        use minidump::MinidumpRawContext;
        match context.raw {
            MinidumpRawContext::X86(ref raw) => Ok(RegisterSnapshot::X86(X86Registers {
                eax: raw.eax.into(),
                ebx: raw.ebx.into(),
                ecx: raw.ecx.into(),
                edx: raw.edx.into(),
                edi: raw.edi.into(),
                esi: raw.esi.into(),
                ebp: raw.ebp.into(),
                esp: raw.esp.into(),
                eip: raw.eip.into(),
                ds: raw.ds.into(),
                es: raw.es.into(),
                fs: raw.fs.into(),
                gs: raw.gs.into(),
            })),
            MinidumpRawContext::Amd64(ref raw) => Ok(RegisterSnapshot::Amd64(Amd64Registers {
                rax: raw.rax,
                rbx: raw.rbx,
                rcx: raw.rcx,
                rdx: raw.rdx,
                rdi: raw.rdi,
                rsi: raw.rsi,
                rbp: raw.rbp,
                rsp: raw.rsp,
                r8: raw.r8,
                r9: raw.r9,
                r10: raw.r10,
                r11: raw.r11,
                r12: raw.r12,
                r13: raw.r13,
                r14: raw.r14,
                r15: raw.r15,
                rip: raw.rip,
            })),
            _ => Err(Error::UnsupportedArchitecture(
                "context is not x86 or amd64".to_string(),
            )),
        }
    }
}
