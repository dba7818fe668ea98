//! This is a Rust library with the runtime pieces of the brine-flatbuf wire
//! format: a buffer builder that writes objects back-to-front, and read-side
//! accessors over a finished buffer.
//!
//! Buffers hold a single root table. Tables locate their fields through a
//! vtable; fields whose value equals the schema default are omitted from the
//! vtable entirely, and readers fall back to the default. Structs are stored
//! inline, vectors carry a length prefix, and all offsets are little-endian.
//!
//! ```
//! use brine_flatbuf_schema::{field_index_to_offset, Builder, Table};
//!
//! let mut b = Builder::new();
//! let start = b.start_table();
//! b.add_element::<i32>(field_index_to_offset(0), 7, 0);
//! let table = b.end_table(start, 1);
//! b.finish(table);
//!
//! let root = Table::root(b.data());
//! assert_eq!(root.get::<i32>(field_index_to_offset(0), 0), 7);
//! ```

pub mod builder;
pub mod reader;
pub mod scalar;

pub use builder::Builder;
pub use reader::{read_scalar, Table, Vector};
pub use scalar::Scalar;

/// 32-bit unsigned offset into a buffer, measured from the current end while
/// building and from the start once finished.
pub type UOffset = u32;
/// Signed offset from a table to its vtable.
pub type SOffset = i32;
/// 16-bit offset within a vtable slot.
pub type VOffset = u16;

pub const SIZE_UOFFSET: usize = 4;
pub const SIZE_SOFFSET: usize = 4;
pub const SIZE_VOFFSET: usize = 2;

/// Size of the widest scalar a table can hold. Size-class field emission
/// starts at this bucket and halves down to 1.
pub const LARGEST_SCALAR_SIZE: usize = 8;

/// Maps a field's declaration index to its vtable slot offset. The first two
/// slots hold the vtable size and the table size.
pub fn field_index_to_offset(field_id: VOffset) -> VOffset {
    (field_id + 2) * SIZE_VOFFSET as VOffset
}

/// Bytes needed on top of `size` to reach a multiple of `align`, which must
/// be a power of two.
pub fn padding_bytes(size: usize, align: usize) -> usize {
    (!size).wrapping_add(1) & (align - 1)
}

#[test]
fn field_slots() {
    assert_eq!(field_index_to_offset(0), 4);
    assert_eq!(field_index_to_offset(1), 6);
    assert_eq!(field_index_to_offset(9), 22);
}

#[test]
fn padding() {
    assert_eq!(padding_bytes(0, 4), 0);
    assert_eq!(padding_bytes(1, 4), 3);
    assert_eq!(padding_bytes(6, 4), 2);
    assert_eq!(padding_bytes(8, 8), 0);
    assert_eq!(padding_bytes(9, 8), 7);
    assert_eq!(padding_bytes(17, 1), 0);
}
