#![cfg(feature = "minidump")]

use std::convert::TryFrom;

use minidump::format::{CONTEXT_AMD64, CONTEXT_X86};
use minidump::system_info::Cpu;
use minidump::{MinidumpContext, MinidumpMemory, MinidumpRawContext};
use minidump_fault_address::decoder::InstructionDecoder;
use minidump_fault_address::*;
use test_assembler::*;

struct FixedListing(&'static str);

impl InstructionDecoder for FixedListing {
    fn disassemble(&self, _bytes: &[u8], _arch: Architecture) -> Result<String, Error> {
        Ok(self.0.to_string())
    }
}

fn context(raw: MinidumpRawContext) -> MinidumpContext {
    MinidumpContext::from_raw(raw)
}

#[test]
fn test_memory_adapter() {
    let code = Section::new();
    code.start().set_const(0x0804_8000);
    let code = code
        .append_repeated(0xcc, 0x10)
        .D8(0xf0)
        .D8(0x0f)
        .D8(0xb1)
        .D8(0x46)
        .D8(0x10);
    let base = code.start().value().unwrap();
    let size = code.size();
    let bytes = code.get_contents().unwrap();
    let memory = MinidumpMemory {
        desc: Default::default(),
        base_address: base,
        size,
        bytes: &bytes,
        endian: minidump::Endian::Little,
    };

    assert!(memory.contains(0x0804_8010));
    assert!(!memory.contains(0x0804_8015));
    assert_eq!(memory.read_byte_at(0x0804_8012), Some(0xb1));

    let read = InstructionBytes::read(&memory, 0x0804_8010);
    assert_eq!(read.as_slice(), &[0xf0, 0x0f, 0xb1, 0x46, 0x10]);
}

#[test]
fn test_x86_crash() {
    let code = Section::new();
    code.start().set_const(0x0804_8000);
    let code = code.D8(0x64).D8(0x8b).D8(0x40).D8(0xfc);
    let bytes = code.get_contents().unwrap();
    let memory = MinidumpMemory {
        desc: Default::default(),
        base_address: 0x0804_8000,
        size: bytes.len() as u64,
        bytes: &bytes,
        endian: minidump::Endian::Little,
    };

    let raw = CONTEXT_X86 {
        eax: 0x2000,
        fs: 0x30,
        eip: 0x0804_8000,
        ..Default::default()
    };
    let registers = RegisterSnapshot::try_from(&context(MinidumpRawContext::X86(raw))).unwrap();
    let arch = Architecture::try_from(Cpu::X86).unwrap();

    let resolver = FaultInstructionResolver::with_decoder(
        arch,
        &memory,
        registers.register("eip").unwrap(),
        &FixedListing("   0:\tmov    eax,DWORD PTR fs:[eax-0x4]"),
    );
    assert_eq!(resolver.resolve_source_address(&registers), Ok(0x202c));
}

#[test]
fn test_amd64_crash() {
    let code = Section::new();
    code.start().set_const(0x7fff_0000_0000);
    let code = code.append_repeated(0x90, 8).D8(0x4a).D8(0x8b).D8(0x44).D8(0x09).D8(0xf0);
    let bytes = code.get_contents().unwrap();
    let memory = MinidumpMemory {
        desc: Default::default(),
        base_address: 0x7fff_0000_0000,
        size: bytes.len() as u64,
        bytes: &bytes,
        endian: minidump::Endian::Little,
    };

    let raw = CONTEXT_AMD64 {
        rcx: 0x4000,
        r9: 0x2000,
        rip: 0x7fff_0000_0008,
        ..Default::default()
    };
    let registers = RegisterSnapshot::try_from(&context(MinidumpRawContext::Amd64(raw))).unwrap();
    assert_eq!(registers.architecture(), Architecture::Amd64);

    let resolver = FaultInstructionResolver::with_decoder(
        Architecture::try_from(Cpu::X86_64).unwrap(),
        &memory,
        registers.register("rip").unwrap(),
        &FixedListing("   0:\tmov    rax,QWORD PTR [rcx+r9*1-0x10]"),
    );
    assert_eq!(resolver.instruction_bytes(), &[0x4a, 0x8b, 0x44, 0x09, 0xf0]);
    assert_eq!(resolver.resolve_source_address(&registers), Ok(0x5ff0));
}

#[test]
fn test_unsupported_cpu() {
    assert!(matches!(
        Architecture::try_from(Cpu::Arm64),
        Err(Error::UnsupportedArchitecture(_))
    ));
}
