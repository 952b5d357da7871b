//! Access to the captured memory of the crashed process.

use std::convert::TryFrom;
use std::fmt;
use std::ops::Deref;

use crate::MAX_INSTRUCTION_LENGTH;

/// A contiguous region of memory captured in a crash snapshot.
///
/// Reads are byte-granular and may fail even inside `[base, base + size)`
/// (for example if the region is backed by a sparse image), which callers
/// treat as "no data here" rather than as an error.
pub trait MemorySnapshot {
    /// The address of the first byte of the region.
    fn base_address(&self) -> u64;
    /// The length of the region in bytes.
    fn size(&self) -> u64;
    /// Read the byte at `address`, if it was captured.
    fn read_byte_at(&self, address: u64) -> Option<u8>;

    /// Whether `address` falls inside `[base_address, base_address + size)`.
    fn contains(&self, address: u64) -> bool {
        address
            .checked_sub(self.base_address())
            .map_or(false, |offset| offset < self.size())
    }
}

impl<M: MemorySnapshot + ?Sized> MemorySnapshot for &M {
    fn base_address(&self) -> u64 {
        (**self).base_address()
    }
    fn size(&self) -> u64 {
        (**self).size()
    }
    fn read_byte_at(&self, address: u64) -> Option<u8> {
        (**self).read_byte_at(address)
    }
}

/// Implement MemorySnapshot for a (base address, bytes) pair for convenience.
impl<'a> MemorySnapshot for (u64, &'a [u8]) {
    fn base_address(&self) -> u64 {
        self.0
    }
    fn size(&self) -> u64 {
        self.1.len() as u64
    }
    fn read_byte_at(&self, address: u64) -> Option<u8> {
        let offset = address.checked_sub(self.0)?;
        self.1.get(usize::try_from(offset).ok()?).copied()
    }
}

#[cfg(feature = "minidump")]
impl<'a, Descriptor> MemorySnapshot for minidump::MinidumpMemoryBase<'a, Descriptor> {
    fn base_address(&self) -> u64 {
        self.base_address
    }
    fn size(&self) -> u64 {
        self.size
    }
    fn read_byte_at(&self, address: u64) -> Option<u8> {
        self.get_memory_at_address::<u8>(address)
    }
}

/// The bytes found at the fault address, at most one maximal instruction long.
///
/// Fewer than [`MAX_INSTRUCTION_LENGTH`] bytes are kept when the snapshot ends
/// (or stops being readable) early; the faulting instruction may still be
/// fully encoded in what was collected.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct InstructionBytes {
    bytes: [u8; MAX_INSTRUCTION_LENGTH],
    len: usize,
}

impl InstructionBytes {
    /// Collect bytes starting at `address`, stopping at the first unreadable one.
    pub fn read<M: MemorySnapshot + ?Sized>(memory: &M, address: u64) -> InstructionBytes {
        let mut result = InstructionBytes::default();
        for offset in 0..MAX_INSTRUCTION_LENGTH as u64 {
            // Byte-by-byte, so that a partial read still yields something to decode.
            let byte = address
                .checked_add(offset)
                .and_then(|addr| memory.read_byte_at(addr));
            match byte {
                Some(byte) => {
                    result.bytes[result.len] = byte;
                    result.len += 1;
                }
                None => break,
            }
        }
        if result.len < MAX_INSTRUCTION_LENGTH {
            tracing::trace!(
                "only {} instruction bytes readable at {:#x}",
                result.len,
                address
            );
        }
        result
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len]
    }
}

impl Deref for InstructionBytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl fmt::Debug for InstructionBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.as_slice()).finish()
    }
}
