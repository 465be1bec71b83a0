use std::fmt;
use std::mem::size_of;
use std::ptr::NonNull;

/// High byte shared by every discriminator. `0xFE` never starts well-formed UTF-8 text, which
/// makes an accidental match against string data unlikely.
pub(crate) const SENTINEL: u16 = 0xFE00;

const SENTINEL_MASK: u16 = 0xFF00;

/// Identifies the kind of container that owns a block.
///
/// The discriminator is stored in the header directly in front of every payload. Code that
/// only has the payload address can use it (via [`raw::discriminator()`][crate::raw::discriminator])
/// to tell what kind of block it is looking at.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[repr(u16)]
pub enum Discriminator {
    /// A fixed-length handle allocated from an allocator.
    Heap = 0xFEFE,

    /// A fixed-length handle bound to a scope. The storage may be an on-stack arena or a heap
    /// fallback; either way it is released when the scope ends.
    Stack = 0xFEFF,

    /// A growable sequence that tracks capacity separately from length.
    GrowableSequence = 0xFEFD,

    /// Slot storage of an associative table.
    AssociativeTable = 0xFEFC,
}

impl Discriminator {
    /// Decodes a raw header value, returning `None` if it is not one of the known discriminators.
    #[must_use]
    pub const fn from_raw(raw: u16) -> Option<Self> {
        match raw {
            0xFEFE => Some(Self::Heap),
            0xFEFF => Some(Self::Stack),
            0xFEFD => Some(Self::GrowableSequence),
            0xFEFC => Some(Self::AssociativeTable),
            _ => None,
        }
    }

    /// The raw value as stored in the header.
    #[must_use]
    pub const fn as_raw(self) -> u16 {
        self as u16
    }

    /// Whether the block carries a capacity field in front of the basic header.
    #[must_use]
    pub const fn has_capacity(self) -> bool {
        matches!(self, Self::GrowableSequence | Self::AssociativeTable)
    }
}

impl fmt::Display for Discriminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Heap => "heap",
            Self::Stack => "stack",
            Self::GrowableSequence => "growable sequence",
            Self::AssociativeTable => "associative table",
        };

        write!(f, "{name} (0x{:04X})", self.as_raw())
    }
}

/// Whether a raw header value carries the sentinel byte.
#[must_use]
pub(crate) const fn is_valid_raw(raw: u16) -> bool {
    (raw & SENTINEL_MASK) == SENTINEL
}

/// The header that sits immediately in front of every payload.
///
/// Stored as a raw `u16` so that reading a header of unknown origin never materializes an
/// invalid enum value.
#[derive(Debug)]
#[repr(C)]
pub(crate) struct Header {
    pub(crate) magic: u16,
    pub(crate) length: usize,
}

impl Header {
    pub(crate) const fn new(discriminator: Discriminator, length: usize) -> Self {
        Self {
            magic: discriminator.as_raw(),
            length,
        }
    }
}

/// Header of blocks that track capacity. The basic [`Header`] comes last, so it still ends
/// exactly at the payload address.
#[derive(Debug)]
#[repr(C)]
pub(crate) struct SeqHeader {
    pub(crate) capacity: usize,
    pub(crate) base: Header,
}

impl SeqHeader {
    pub(crate) const fn new(discriminator: Discriminator, length: usize, capacity: usize) -> Self {
        Self {
            capacity,
            base: Header::new(discriminator, length),
        }
    }
}

/// Distance from the payload back to the start of the basic header.
pub(crate) const HEADER_SIZE: usize = size_of::<Header>();

/// Distance from the payload back to the start of the capacity-tracking header.
pub(crate) const SEQ_HEADER_SIZE: usize = size_of::<SeqHeader>();

/// Locates the basic header in front of a payload.
///
/// # Safety
///
/// `payload` must be the payload address of a live block created by this crate.
pub(crate) unsafe fn header_of<T>(payload: NonNull<T>) -> NonNull<Header> {
    // SAFETY: Every block places the basic header immediately before the payload.
    unsafe { payload.cast::<u8>().byte_sub(HEADER_SIZE) }.cast()
}

/// Locates the capacity-tracking header in front of a payload.
///
/// # Safety
///
/// `payload` must be the payload address of a live block whose discriminator reports
/// [`Discriminator::has_capacity()`].
pub(crate) unsafe fn seq_header_of<T>(payload: NonNull<T>) -> NonNull<SeqHeader> {
    // SAFETY: Capacity-tracking blocks place the full header immediately before the payload.
    unsafe { payload.cast::<u8>().byte_sub(SEQ_HEADER_SIZE) }.cast()
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::mem::{align_of, offset_of};

    use static_assertions::{assert_eq_size, const_assert_eq};

    use super::*;

    assert_eq_size!(Header, [usize; 2]);
    assert_eq_size!(SeqHeader, [usize; 3]);
    const_assert_eq!(offset_of!(SeqHeader, base) + HEADER_SIZE, SEQ_HEADER_SIZE);
    const_assert_eq!(align_of::<SeqHeader>(), align_of::<Header>());

    #[test]
    fn all_discriminators_carry_sentinel() {
        for discriminator in [
            Discriminator::Heap,
            Discriminator::Stack,
            Discriminator::GrowableSequence,
            Discriminator::AssociativeTable,
        ] {
            assert!(is_valid_raw(discriminator.as_raw()));
            assert_eq!(Discriminator::from_raw(discriminator.as_raw()), Some(discriminator));
        }
    }

    #[test]
    fn sentinel_check_ignores_low_byte() {
        assert!(is_valid_raw(0xFE00));
        assert!(is_valid_raw(0xFE42));
        assert!(!is_valid_raw(0xFF00));
        assert!(!is_valid_raw(0x00FE));
        assert!(!is_valid_raw(0));
    }

    #[test]
    fn unknown_raw_values_do_not_decode() {
        assert_eq!(Discriminator::from_raw(0xFE00), None);
        assert_eq!(Discriminator::from_raw(0x1234), None);
    }

    #[test]
    fn capacity_tracking_kinds() {
        assert!(Discriminator::GrowableSequence.has_capacity());
        assert!(Discriminator::AssociativeTable.has_capacity());
        assert!(!Discriminator::Heap.has_capacity());
        assert!(!Discriminator::Stack.has_capacity());
    }

    #[test]
    fn display_includes_hex() {
        assert_eq!(Discriminator::Heap.to_string(), "heap (0xFEFE)");
    }
}
