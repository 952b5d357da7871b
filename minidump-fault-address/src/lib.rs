//! A library for recovering the memory address a crashing instruction touched.
//!
//! Given the memory and registers captured in a crash (for instance from a
//! minidump parsed by the [minidump](https://crates.io/crates/minidump) crate)
//! and the address of the faulting instruction, [`FaultInstructionResolver`]
//! decodes that instruction and evaluates its memory operands against the
//! registers, producing the address that was being read or written. This is the
//! input exploitability analysis needs to judge whether a crash touched
//! attacker-influenced memory.
//!
//! x86 and amd64 are supported. Decoding is done by an [`InstructionDecoder`],
//! either in-process with yaxpeax-x86 (the default) or by running objdump; see
//! [`DecoderKind`].
//!
//! ```
//! use minidump_fault_address::{Architecture, FaultInstructionResolver, RegisterSnapshot};
//!
//! // mov rax,QWORD PTR [rbp-0x800]
//! let code = [0x48, 0x8b, 0x85, 0x00, 0xf8, 0xff, 0xff];
//! let memory = (0x7ff6_0000_1000u64, &code[..]);
//! let resolver = FaultInstructionResolver::new(Architecture::Amd64, &memory, 0x7ff6_0000_1000);
//!
//! let mut registers = RegisterSnapshot::new(Architecture::Amd64);
//! registers.set_register("rbp", 0x1000).unwrap();
//! # if cfg!(feature = "disasm_yaxpeax") {
//! assert_eq!(resolver.resolve_source_address(&registers), Ok(0x800));
//! # }
//! ```
//!
//! [`InstructionDecoder`]: decoder::InstructionDecoder
//! [`DecoderKind`]: decoder::DecoderKind

#[cfg(all(doctest, feature = "disasm_yaxpeax"))]
doc_comment::doctest!("../README.md");

mod arch;
pub mod decoder;
mod error;
mod expression;
mod memory;
mod registers;
mod resolver;
mod tokenizer;

pub use arch::*;
pub use error::*;
pub use expression::*;
pub use memory::*;
pub use registers::*;
pub use resolver::*;
pub use tokenizer::*;
