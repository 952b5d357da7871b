//! Finding the faulting instruction and answering address queries about it.

use crate::decoder::{first_instruction, DecoderKind, InstructionDecoder};
use crate::expression::resolve_operand;
use crate::{
    tokenize, Architecture, Error, InstructionBytes, MemorySnapshot, OperandSide,
    RegisterSnapshot, TokenizedInstruction,
};

#[derive(Clone, Debug, PartialEq, Eq)]
struct DecodedInstruction {
    text: String,
    tokens: TokenizedInstruction,
}

/// The decoded instruction found at a crash's fault address.
///
/// All the work of reading, decoding and tokenizing happens once in the
/// constructor. Construction never fails outright: if any stage fails the
/// resolver is left *unresolved*, every query returns [`Error::Unresolved`],
/// and [`failure`][Self::failure] says what went wrong. A resolver is never
/// modified after construction, so it can be queried any number of times
/// (including from several threads) with the same results.
///
/// ```
/// use minidump_fault_address::{
///     Architecture, FaultInstructionResolver, RegisterSnapshot, X86Registers,
/// };
///
/// // mov eax,DWORD PTR [esi+edi*4+0x10]
/// let code = [0x8b, 0x44, 0xbe, 0x10];
/// let resolver = FaultInstructionResolver::new(Architecture::X86, &(0x400000u64, &code[..]), 0x400000);
///
/// # if cfg!(feature = "disasm_yaxpeax") {
/// let registers = RegisterSnapshot::X86(X86Registers {
///     esi: 0x1000,
///     edi: 0x2,
///     ..Default::default()
/// });
/// assert_eq!(resolver.resolve_source_address(&registers), Ok(0x1018));
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct FaultInstructionResolver {
    architecture: Architecture,
    fault_address: u64,
    bytes: InstructionBytes,
    decoded: Result<DecodedInstruction, Error>,
}

impl FaultInstructionResolver {
    /// Resolve the instruction at `fault_address` with the default decoder.
    ///
    /// See [`DecoderKind::default`] for which decoder that is.
    pub fn new<M>(architecture: Architecture, memory: &M, fault_address: u64) -> Self
    where
        M: MemorySnapshot + ?Sized,
    {
        Self::with_decoder(
            architecture,
            memory,
            fault_address,
            &DecoderKind::default(),
        )
    }

    /// Resolve the instruction at `fault_address` using `decoder`.
    pub fn with_decoder<M, D>(
        architecture: Architecture,
        memory: &M,
        fault_address: u64,
        decoder: &D,
    ) -> Self
    where
        M: MemorySnapshot + ?Sized,
        D: InstructionDecoder + ?Sized,
    {
        let mut resolver = FaultInstructionResolver {
            architecture,
            fault_address,
            bytes: InstructionBytes::default(),
            decoded: Err(Error::Unresolved),
        };

        if !memory.contains(fault_address) {
            tracing::debug!(
                "fault address {:#x} is outside memory [{:#x}, +{:#x})",
                fault_address,
                memory.base_address(),
                memory.size()
            );
            resolver.decoded = Err(Error::OutOfBounds {
                address: fault_address,
            });
            return resolver;
        }

        resolver.bytes = InstructionBytes::read(memory, fault_address);
        resolver.decoded = decode(&resolver.bytes, architecture, decoder);
        match &resolver.decoded {
            Ok(decoded) => {
                tracing::debug!("instruction at {:#x}: {}", fault_address, decoded.text)
            }
            Err(e) => tracing::warn!(
                "couldn't resolve instruction at {:#x} ({:?}): {}",
                fault_address,
                resolver.bytes,
                e
            ),
        }
        resolver
    }

    pub fn architecture(&self) -> Architecture {
        self.architecture
    }

    pub fn fault_address(&self) -> u64 {
        self.fault_address
    }

    /// The bytes read at the fault address. Empty if the address was out of bounds.
    pub fn instruction_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Whether an instruction was successfully decoded and tokenized.
    pub fn is_resolved(&self) -> bool {
        self.decoded.is_ok()
    }

    /// Why construction failed, if it did.
    pub fn failure(&self) -> Option<&Error> {
        self.decoded.as_ref().err()
    }

    /// The decoder's text for the instruction.
    pub fn instruction_text(&self) -> Option<&str> {
        self.decoded.as_ref().ok().map(|decoded| decoded.text.as_str())
    }

    /// The mnemonic and operands of the instruction.
    pub fn instruction(&self) -> Option<&TokenizedInstruction> {
        self.decoded.as_ref().ok().map(|decoded| &decoded.tokens)
    }

    /// The address referenced by the source (second) operand.
    ///
    /// # Errors
    ///
    /// [`Error::Unresolved`] if construction failed, [`Error::MissingOperand`]
    /// if the instruction has fewer than two operands, and otherwise whatever
    /// evaluating the operand produced (most commonly
    /// [`Error::NotAMemoryOperand`]).
    pub fn resolve_source_address(&self, registers: &RegisterSnapshot) -> Result<u64, Error> {
        self.resolve(OperandSide::Source, registers)
    }

    /// The address referenced by the destination (first) operand.
    ///
    /// Fails the same way as [`resolve_source_address`][Self::resolve_source_address].
    pub fn resolve_destination_address(
        &self,
        registers: &RegisterSnapshot,
    ) -> Result<u64, Error> {
        self.resolve(OperandSide::Destination, registers)
    }

    fn resolve(&self, side: OperandSide, registers: &RegisterSnapshot) -> Result<u64, Error> {
        let tokens = self
            .instruction()
            .ok_or(Error::Unresolved)?;
        let operand = match side {
            OperandSide::Destination => &tokens.destination,
            OperandSide::Source => &tokens.source,
        };
        if operand.is_empty() {
            return Err(Error::MissingOperand(side));
        }
        let address = resolve_operand(operand, registers);
        tracing::trace!("{} operand {:?} -> {:x?}", side, operand, address);
        address
    }
}

fn decode<D>(
    bytes: &InstructionBytes,
    architecture: Architecture,
    decoder: &D,
) -> Result<DecodedInstruction, Error>
where
    D: InstructionDecoder + ?Sized,
{
    if bytes.is_empty() {
        return Err(Error::DecodeFailure(
            "no readable bytes at fault address".to_string(),
        ));
    }
    let listing = decoder.disassemble(bytes, architecture)?;
    let text = first_instruction(&listing)?;
    let tokens = tokenize(text)?;
    Ok(DecodedInstruction {
        text: text.to_string(),
        tokens,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::UnavailableDecoder;
    use crate::X86Registers;

    /// Pretends to decode anything into one fixed listing.
    struct Scripted(&'static str);

    impl InstructionDecoder for Scripted {
        fn disassemble(&self, _bytes: &[u8], _arch: Architecture) -> Result<String, Error> {
            Ok(self.0.to_string())
        }
    }

    fn registers() -> RegisterSnapshot {
        RegisterSnapshot::X86(X86Registers {
            esi: 0x1000,
            edi: 0x2,
            eax: 0x2000,
            fs: 0x30,
            ..Default::default()
        })
    }

    const CODE: [u8; 4] = [0x90; 4];

    #[test]
    fn test_resolved() {
        let memory = (0x1000u64, &CODE[..]);
        let decoder = Scripted("   0:\tlock cmpxchg DWORD PTR [esi+edi*4+0x10],eax\n");
        let resolver =
            FaultInstructionResolver::with_decoder(Architecture::X86, &memory, 0x1001, &decoder);

        assert!(resolver.is_resolved());
        assert_eq!(resolver.failure(), None);
        assert_eq!(resolver.instruction_bytes(), &[0x90, 0x90, 0x90]);
        assert_eq!(
            resolver.instruction_text(),
            Some("lock cmpxchg DWORD PTR [esi+edi*4+0x10],eax")
        );
        assert_eq!(resolver.instruction().unwrap().operation, "cmpxchg");
        assert_eq!(
            resolver.resolve_destination_address(&registers()),
            Ok(0x1018)
        );
        assert_eq!(
            resolver.resolve_source_address(&registers()),
            Err(Error::NotAMemoryOperand("eax".to_string()))
        );
    }

    #[test]
    fn test_missing_operands() {
        let memory = (0x1000u64, &CODE[..]);
        let resolver = FaultInstructionResolver::with_decoder(
            Architecture::X86,
            &memory,
            0x1000,
            &Scripted("   0:\tinc DWORD PTR fs:[eax-0x4]"),
        );
        assert_eq!(resolver.resolve_destination_address(&registers()), Ok(0x202c));
        assert_eq!(
            resolver.resolve_source_address(&registers()),
            Err(Error::MissingOperand(OperandSide::Source))
        );

        let resolver = FaultInstructionResolver::with_decoder(
            Architecture::X86,
            &memory,
            0x1000,
            &Scripted("   0:\tret"),
        );
        assert_eq!(
            resolver.resolve_destination_address(&registers()),
            Err(Error::MissingOperand(OperandSide::Destination))
        );
    }

    #[test]
    fn test_out_of_bounds() {
        let memory = (0x1000u64, &CODE[..]);
        let resolver = FaultInstructionResolver::with_decoder(
            Architecture::X86,
            &memory,
            0x1004,
            &Scripted("   0:\tmov eax,DWORD PTR [esi]"),
        );
        assert!(!resolver.is_resolved());
        assert_eq!(
            resolver.failure(),
            Some(&Error::OutOfBounds { address: 0x1004 })
        );
        assert!(resolver.instruction_bytes().is_empty());
        assert_eq!(
            resolver.resolve_source_address(&registers()),
            Err(Error::Unresolved)
        );
        assert_eq!(
            resolver.resolve_destination_address(&registers()),
            Err(Error::Unresolved)
        );
    }

    #[test]
    fn test_failures_leave_resolver_unresolved() {
        let memory = (0x1000u64, &CODE[..]);
        let failure = |decoder: &dyn InstructionDecoder| {
            FaultInstructionResolver::with_decoder(Architecture::X86, &memory, 0x1000, decoder)
                .failure()
                .cloned()
        };

        assert!(matches!(
            failure(&UnavailableDecoder),
            Some(Error::DecodeUnavailable(_))
        ));
        assert!(matches!(
            failure(&Scripted("mov eax,ebx")),
            Some(Error::DecodeFailure(_))
        ));
        assert!(matches!(
            failure(&Scripted("   0:\t(bad)")),
            Some(Error::DecodeFailure(_))
        ));
        assert_eq!(
            failure(&Scripted("   0:\tmov eax,,ebx")),
            Some(Error::Tokenize(crate::TokenizeError::UnexpectedSeparator))
        );
    }
}
