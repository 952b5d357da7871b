use super::InstructionDecoder;
use crate::{Architecture, Error};

/// Decodes instructions in-process with yaxpeax-x86.
///
/// The instruction is rendered the way objdump prints Intel syntax (sized
/// `PTR` qualifiers, `[base+index*scale+0xdisp]` memory operands) so that it
/// goes through the same tokenizer as objdump's output. String instructions
/// and `xlat` are spelled out from their encoding in objdump's operand order,
/// and x87 stack registers implied by a memory form are left out, so that the
/// memory operand lands on the same side it does in objdump's listing.
///
/// Without the `disasm_yaxpeax` feature every call fails with
/// [`Error::DecodeUnavailable`].
#[derive(Clone, Copy, Debug, Default)]
pub struct EmbeddedDecoder;

impl InstructionDecoder for EmbeddedDecoder {
    #[cfg(feature = "disasm_yaxpeax")]
    fn disassemble(&self, bytes: &[u8], arch: Architecture) -> Result<String, Error> {
        let text = match arch {
            Architecture::X86 => yaxpeax::render_x86(bytes)?,
            Architecture::Amd64 => yaxpeax::render_amd64(bytes)?,
        };
        Ok(format!("   0:\t{}\n", text))
    }

    #[cfg(not(feature = "disasm_yaxpeax"))]
    fn disassemble(&self, _bytes: &[u8], _arch: Architecture) -> Result<String, Error> {
        Err(Error::DecodeUnavailable(
            "built without the disasm_yaxpeax feature".to_string(),
        ))
    }
}

#[cfg(feature = "disasm_yaxpeax")]
mod yaxpeax {
    use crate::Error;

    /// Instructions that address memory through fixed registers.
    const IMPLICIT_MEMORY: &[&str] = &["movs", "cmps", "scas", "lods", "stos", "ins", "outs", "xlat"];

    fn size_qualifier(bytes: u8) -> Option<&'static str> {
        Some(match bytes {
            1 => "BYTE",
            2 => "WORD",
            4 => "DWORD",
            6 => "FWORD",
            8 => "QWORD",
            10 => "TBYTE",
            16 => "XMMWORD",
            32 => "YMMWORD",
            64 => "ZMMWORD",
            _ => return None,
        })
    }

    fn accumulator(bytes: u8) -> Option<&'static str> {
        Some(match bytes {
            1 => "al",
            2 => "ax",
            4 => "eax",
            8 => "rax",
            _ => return None,
        })
    }

    fn is_x87_stack_register(operand: &str) -> bool {
        operand == "st" || operand.starts_with("st(")
    }

    fn bracketed(base: Option<&str>, index: Option<(&str, u8)>, disp: Option<i32>) -> String {
        let mut text = String::from("[");
        if let Some(base) = base {
            text.push_str(base);
        }
        if let Some((index, scale)) = index {
            if base.is_some() {
                text.push('+');
            }
            text.push_str(&format!("{}*{}", index, scale));
        }
        if let Some(disp) = disp {
            let sign = if disp < 0 { '-' } else { '+' };
            text.push_str(&format!("{}0x{:x}", sign, disp.unsigned_abs()));
        }
        text.push(']');
        text
    }

    /// Legacy prefixes at the start of an encoding that change how it is printed.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    struct LegacyPrefixes {
        lock: bool,
        /// The last segment override, which is the one that applies.
        segment: Option<&'static str>,
        address_size: bool,
        /// `0xf2` or `0xf3`, whichever came last.
        rep: Option<u8>,
    }

    fn legacy_prefixes(bytes: &[u8]) -> LegacyPrefixes {
        let mut prefixes = LegacyPrefixes::default();
        for &byte in bytes {
            match byte {
                0x26 => prefixes.segment = Some("es"),
                0x2e => prefixes.segment = Some("cs"),
                0x36 => prefixes.segment = Some("ss"),
                0x3e => prefixes.segment = Some("ds"),
                0x64 => prefixes.segment = Some("fs"),
                0x65 => prefixes.segment = Some("gs"),
                0x66 => {}
                0x67 => prefixes.address_size = true,
                0xf0 => prefixes.lock = true,
                0xf2 | 0xf3 => prefixes.rep = Some(byte),
                _ => break,
            }
        }
        prefixes
    }

    // (source index, destination index, xlat table base)
    fn string_registers(
        long_mode: bool,
        address_size: bool,
    ) -> (&'static str, &'static str, &'static str) {
        match (long_mode, address_size) {
            (true, false) => ("rsi", "rdi", "rbx"),
            (true, true) | (false, false) => ("esi", "edi", "ebx"),
            (false, true) => ("si", "di", "bx"),
        }
    }

    /// Spell out a string instruction or `xlat` in objdump's form.
    ///
    /// The operands come from the encoding itself: the source is always
    /// `seg:[rsi]` (ds unless overridden), the destination always `es:[rdi]`.
    fn render_implicit(
        mnemonic: &str,
        size: Option<u8>,
        bytes: &[u8],
        long_mode: bool,
    ) -> Result<String, Error> {
        let prefixes = legacy_prefixes(bytes);
        let (si, di, bx) = string_registers(long_mode, prefixes.address_size);
        let segment = prefixes.segment.unwrap_or("ds");

        if mnemonic == "xlat" {
            return Ok(format!("xlat BYTE PTR {}:[{}]", segment, bx));
        }

        let (qualifier, acc) = match size.map(|size| (size_qualifier(size), accumulator(size))) {
            Some((Some(qualifier), Some(acc))) => (qualifier, acc),
            _ => {
                return Err(Error::DecodeFailure(format!(
                    "unexpected operand size {:?} for {}",
                    size, mnemonic
                )))
            }
        };
        let source = format!("{} PTR {}:[{}]", qualifier, segment, si);
        let destination = format!("{} PTR es:[{}]", qualifier, di);
        let operands = match mnemonic {
            "movs" => format!("{},{}", destination, source),
            "cmps" => format!("{},{}", source, destination),
            "scas" => format!("{},{}", acc, destination),
            "lods" => format!("{},{}", acc, source),
            "stos" => format!("{},{}", destination, acc),
            "ins" => format!("{},dx", destination),
            "outs" => format!("dx,{}", source),
            other => {
                return Err(Error::DecodeFailure(format!(
                    "{} is not a string instruction",
                    other
                )))
            }
        };
        let rep = match (prefixes.rep, mnemonic) {
            (Some(0xf3), "cmps") | (Some(0xf3), "scas") => "repz ",
            (Some(0xf3), _) => "rep ",
            (Some(_), _) => "repnz ",
            (None, _) => "",
        };
        Ok(format!("{}{} {}", rep, mnemonic, operands))
    }

    macro_rules! render_for_mode {
        ($name:ident, $mode:ident, $long_mode:expr) => {
            pub(super) fn $name(bytes: &[u8]) -> Result<String, Error> {
                use yaxpeax_x86::$mode::{DecodeError, InstDecoder, Operand, Segment};

                let instruction =
                    InstDecoder::default()
                        .decode_slice(bytes)
                        .map_err(|error| match error {
                            DecodeError::ExhaustedInput => {
                                Error::DecodeFailure("instruction is truncated".to_string())
                            }
                            e => Error::DecodeFailure(e.to_string()),
                        })?;

                let mnemonic = instruction.opcode().to_string();
                let size = instruction.mem_size().and_then(|size| size.bytes_size());
                if IMPLICIT_MEMORY.contains(&mnemonic.as_str()) {
                    return render_implicit(&mnemonic, size, bytes, $long_mode);
                }
                let qualifier = size.and_then(size_qualifier);

                let mut operands = Vec::new();
                let mut has_memory = false;
                for idx in 0..instruction.operand_count() {
                    let (address, implied_segment) = match instruction.operand(idx) {
                        Operand::RegDeref(base) => (bracketed(Some(base.name()), None, None), None),
                        Operand::RegDisp(base, disp) => {
                            (bracketed(Some(base.name()), None, Some(disp)), None)
                        }
                        Operand::RegScale(index, scale) => {
                            (bracketed(None, Some((index.name(), scale)), None), None)
                        }
                        Operand::RegScaleDisp(index, scale, disp) => (
                            bracketed(None, Some((index.name(), scale)), Some(disp)),
                            None,
                        ),
                        Operand::RegIndexBase(base, index) => (
                            bracketed(Some(base.name()), Some((index.name(), 1)), None),
                            None,
                        ),
                        Operand::RegIndexBaseDisp(base, index, disp) => (
                            bracketed(Some(base.name()), Some((index.name(), 1)), Some(disp)),
                            None,
                        ),
                        Operand::RegIndexBaseScale(base, index, scale) => (
                            bracketed(Some(base.name()), Some((index.name(), scale)), None),
                            None,
                        ),
                        Operand::RegIndexBaseScaleDisp(base, index, scale, disp) => (
                            bracketed(Some(base.name()), Some((index.name(), scale)), Some(disp)),
                            None,
                        ),
                        // objdump spells absolute addresses as "ds:0x1234".
                        Operand::DisplacementU32(disp) => (format!("0x{:x}", disp), Some("ds")),
                        other => {
                            operands.push(other.to_string());
                            continue;
                        }
                    };
                    has_memory = true;

                    let segment = instruction
                        .segment_override_for_op(idx)
                        .and_then(|segment| match segment {
                            Segment::FS => Some("fs"),
                            Segment::GS => Some("gs"),
                            // The other overrides are ignored in 64-bit mode.
                            _ if $long_mode => None,
                            Segment::CS => Some("cs"),
                            Segment::DS => Some("ds"),
                            Segment::ES => Some("es"),
                            Segment::SS => Some("ss"),
                        })
                        .or(implied_segment);

                    let mut operand = String::new();
                    if let Some(qualifier) = qualifier {
                        operand.push_str(qualifier);
                        operand.push_str(" PTR ");
                    }
                    if let Some(segment) = segment {
                        operand.push_str(segment);
                        operand.push(':');
                    }
                    operand.push_str(&address);
                    operands.push(operand);
                }

                // The x87 memory forms name st(0) implicitly; objdump leaves it out.
                if has_memory {
                    operands.retain(|operand| !is_x87_stack_register(operand));
                }

                let mut text = String::new();
                if legacy_prefixes(bytes).lock {
                    text.push_str("lock ");
                }
                text.push_str(&mnemonic);
                if !operands.is_empty() {
                    text.push(' ');
                    text.push_str(&operands.join(","));
                }
                Ok(text)
            }
        };
    }

    render_for_mode!(render_x86, protected_mode, false);
    render_for_mode!(render_amd64, amd64, true);

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_bracketed() {
            assert_eq!(bracketed(Some("eax"), None, None), "[eax]");
            assert_eq!(bracketed(Some("ebp"), None, Some(-8)), "[ebp-0x8]");
            assert_eq!(
                bracketed(Some("rcx"), Some(("r9", 1)), Some(-0x10)),
                "[rcx+r9*1-0x10]"
            );
            assert_eq!(bracketed(None, Some(("ebx", 4)), Some(0)), "[ebx*4+0x0]");
            assert_eq!(
                bracketed(Some("esi"), None, Some(i32::MIN)),
                "[esi-0x80000000]"
            );
        }

        #[test]
        fn test_legacy_prefixes() {
            assert_eq!(legacy_prefixes(&[0x8b, 0x06]), LegacyPrefixes::default());
            assert_eq!(
                legacy_prefixes(&[0xf3, 0x2e, 0x64, 0x67, 0xa4]),
                LegacyPrefixes {
                    lock: false,
                    segment: Some("fs"),
                    address_size: true,
                    rep: Some(0xf3),
                }
            );
            // REX ends the legacy prefixes.
            assert_eq!(legacy_prefixes(&[0xf0, 0x48, 0x64]).segment, None);
            assert!(legacy_prefixes(&[0xf0, 0x48, 0x64]).lock);
        }

        #[test]
        fn test_render_x86() {
            assert_eq!(
                render_x86(&[0xf0, 0x0f, 0xb1, 0x46, 0x10]).unwrap(),
                "lock cmpxchg DWORD PTR [esi+0x10],eax"
            );
            assert_eq!(
                render_x86(&[0x64, 0x8b, 0x40, 0xfc]).unwrap(),
                "mov eax,DWORD PTR fs:[eax-0x4]"
            );
            assert_eq!(
                render_x86(&[0x2e, 0x8b, 0x00]).unwrap(),
                "mov eax,DWORD PTR cs:[eax]"
            );
            assert_eq!(render_x86(&[0x89, 0xd8]).unwrap(), "mov eax,ebx");
        }

        #[test]
        fn test_render_amd64() {
            assert_eq!(
                render_amd64(&[0x4a, 0x8b, 0x44, 0x09, 0xf0]).unwrap(),
                "mov rax,QWORD PTR [rcx+r9*1-0x10]"
            );
            assert_eq!(
                render_amd64(&[0x48, 0x8b, 0x85, 0x00, 0xf8, 0xff, 0xff]).unwrap(),
                "mov rax,QWORD PTR [rbp-0x800]"
            );
            assert_eq!(
                render_amd64(&[0x64, 0x48, 0x8b, 0x00]).unwrap(),
                "mov rax,QWORD PTR fs:[rax]"
            );
            assert_eq!(
                render_amd64(&[0x2e, 0x8b, 0x00]).unwrap(),
                "mov eax,DWORD PTR [rax]"
            );
        }

        #[test]
        fn test_string_instructions() {
            assert_eq!(
                render_x86(&[0xa6]).unwrap(),
                "cmps BYTE PTR ds:[esi],BYTE PTR es:[edi]"
            );
            assert_eq!(
                render_amd64(&[0xf3, 0xa6]).unwrap(),
                "repz cmps BYTE PTR ds:[rsi],BYTE PTR es:[rdi]"
            );
            assert_eq!(
                render_x86(&[0x64, 0xa4]).unwrap(),
                "movs BYTE PTR es:[edi],BYTE PTR fs:[esi]"
            );
            assert_eq!(
                render_amd64(&[0x48, 0xa5]).unwrap(),
                "movs QWORD PTR es:[rdi],QWORD PTR ds:[rsi]"
            );
            assert_eq!(
                render_amd64(&[0x67, 0xa4]).unwrap(),
                "movs BYTE PTR es:[edi],BYTE PTR ds:[esi]"
            );
            assert_eq!(
                render_x86(&[0xf2, 0xae]).unwrap(),
                "repnz scas al,BYTE PTR es:[edi]"
            );
            assert_eq!(
                render_x86(&[0xad]).unwrap(),
                "lods eax,DWORD PTR ds:[esi]"
            );
            assert_eq!(
                render_amd64(&[0xf3, 0x48, 0xab]).unwrap(),
                "rep stos QWORD PTR es:[rdi],rax"
            );
            assert_eq!(render_x86(&[0x6c]).unwrap(), "ins BYTE PTR es:[edi],dx");
            assert_eq!(render_x86(&[0x6f]).unwrap(), "outs dx,DWORD PTR ds:[esi]");
        }

        #[test]
        fn test_xlat() {
            assert_eq!(render_x86(&[0xd7]).unwrap(), "xlat BYTE PTR ds:[ebx]");
            assert_eq!(render_amd64(&[0xd7]).unwrap(), "xlat BYTE PTR ds:[rbx]");
        }

        #[test]
        fn test_x87_memory_forms() {
            assert_eq!(render_x86(&[0xd9, 0x06]).unwrap(), "fld DWORD PTR [esi]");
            assert_eq!(render_x86(&[0xdb, 0x2e]).unwrap(), "fld TBYTE PTR [esi]");
            assert_eq!(render_x86(&[0xd8, 0x06]).unwrap(), "fadd DWORD PTR [esi]");
            assert_eq!(render_x86(&[0xdf, 0x06]).unwrap(), "fild WORD PTR [esi]");
            assert_eq!(render_amd64(&[0xdd, 0x1e]).unwrap(), "fstp QWORD PTR [rsi]");
        }

        #[test]
        fn test_truncated() {
            assert!(matches!(
                render_amd64(&[0x48, 0x8b]),
                Err(Error::DecodeFailure(_))
            ));
            assert!(matches!(render_x86(&[]), Err(Error::DecodeFailure(_))));
        }
    }
}
