use crate::scalar::Scalar;
use crate::{
    field_index_to_offset, padding_bytes, SOffset, UOffset, VOffset, SIZE_UOFFSET, SIZE_VOFFSET,
};

/// Location of a written field value, paired with the vtable slot it fills.
#[derive(Clone, Copy)]
struct FieldLoc {
    off: UOffset,
    id: VOffset,
}

/// A buffer builder that writes data back-to-front.
///
/// The occupied region grows downward from the end of the allocation, so the
/// most recently written bytes are at the front of [`data`](Builder::data).
/// Positions handed out by the builder are measured from the fixed end of the
/// buffer and stay valid as the front moves. Offsets stored *inside* the
/// buffer are relative to the position they are stored at, which is why
/// everything an object points to must be written before the object itself.
///
/// Example usage:
///
/// ```
/// let mut b = brine_flatbuf_schema::Builder::new();
/// let s = b.create_string("abc");
/// assert_eq!(b.data(), [3, 0, 0, 0, 97, 98, 99, 0]);
/// assert_eq!(s, 8);
/// ```
pub struct Builder {
    buf: Vec<u8>,
    head: usize,
    minalign: usize,
    field_locs: Vec<FieldLoc>,
    vtables: Vec<UOffset>,
    nested: bool,
    in_struct: bool,
}

impl Builder {
    /// Creates a builder with the default initial capacity.
    pub fn new() -> Builder {
        Builder::with_capacity(1024)
    }

    /// Creates a builder whose backing store starts at `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Builder {
        let capacity = capacity.max(16);
        Builder {
            buf: vec![0; capacity],
            head: capacity,
            minalign: 1,
            field_locs: Vec::new(),
            vtables: Vec::new(),
            nested: false,
            in_struct: false,
        }
    }

    /// Resets the builder so it can serialize a fresh buffer. The backing
    /// allocation is kept.
    pub fn clear(&mut self) {
        self.head = self.buf.len();
        self.minalign = 1;
        self.field_locs.clear();
        self.vtables.clear();
        self.nested = false;
        self.in_struct = false;
    }

    /// Number of bytes written so far.
    pub fn get_size(&self) -> usize {
        self.buf.len() - self.head
    }

    /// The bytes written so far, most recent first.
    pub fn data(&self) -> &[u8] {
        &self.buf[self.head..]
    }

    fn make_space(&mut self, len: usize) {
        if self.head >= len {
            return;
        }
        let used = self.get_size();
        let mut new_len = self.buf.len();
        while new_len - used < len {
            new_len *= 2;
        }
        let mut new_buf = vec![0u8; new_len];
        new_buf[new_len - used..].copy_from_slice(&self.buf[self.head..]);
        self.buf = new_buf;
        self.head = new_len - used;
    }

    /// Writes `n` zero bytes.
    pub fn pad(&mut self, n: usize) {
        self.make_space(n);
        self.head -= n;
        for b in &mut self.buf[self.head..self.head + n] {
            *b = 0;
        }
    }

    /// Pads until the buffer size is a multiple of `elem_size`, raising the
    /// overall buffer alignment if needed.
    pub fn align(&mut self, elem_size: usize) {
        if elem_size > self.minalign {
            self.minalign = elem_size;
        }
        let padding = padding_bytes(self.get_size(), elem_size);
        self.pad(padding);
    }

    /// Pads so that `len` upcoming bytes will end on an `alignment` boundary.
    fn pre_align(&mut self, len: usize, alignment: usize) {
        let padding = padding_bytes(self.get_size() + len, alignment);
        self.pad(padding);
    }

    /// Writes raw bytes at the front of the buffer.
    pub fn push_bytes(&mut self, bytes: &[u8]) {
        self.make_space(bytes.len());
        self.head -= bytes.len();
        self.buf[self.head..self.head + bytes.len()].copy_from_slice(bytes);
    }

    /// Discards the `n` most recently written bytes.
    pub fn pop_bytes(&mut self, n: usize) {
        self.head += n;
    }

    /// Writes one aligned scalar and returns its position.
    pub fn push_element<T: Scalar>(&mut self, e: T) -> UOffset {
        self.align(T::SIZE);
        self.make_space(T::SIZE);
        self.head -= T::SIZE;
        e.write_le(&mut self.buf[self.head..]);
        self.get_size() as UOffset
    }

    /// Writes a stored offset pointing at the previously written position
    /// `off`, converting it to the relative form kept in the buffer.
    pub fn push_offset_element(&mut self, off: UOffset) -> UOffset {
        let rel = self.ref_to(off);
        self.push_element::<UOffset>(rel)
    }

    /// Converts the position `off` into an offset relative to where a
    /// `UOffset` pushed next would sit.
    pub fn ref_to(&mut self, off: UOffset) -> UOffset {
        self.align(SIZE_UOFFSET);
        debug_assert!(off as usize <= self.get_size());
        (self.get_size() - off as usize + SIZE_UOFFSET) as UOffset
    }

    fn track_field(&mut self, id: VOffset, off: UOffset) {
        self.field_locs.push(FieldLoc { off, id });
    }

    /// Writes a scalar field and records it for the current vtable. Inside a
    /// table, a value equal to its default is omitted entirely; structs
    /// always store every field.
    pub fn add_element<T: Scalar>(&mut self, id: VOffset, e: T, def: T) {
        if e == def && !self.in_struct {
            return;
        }
        let off = self.push_element(e);
        self.track_field(id, off);
    }

    /// Writes an offset field pointing at `off` and records it for the
    /// current vtable. An `off` of zero means unset and stores nothing.
    pub fn add_offset(&mut self, id: VOffset, off: UOffset) {
        if off == 0 {
            return;
        }
        let rel = self.ref_to(off);
        self.add_element::<UOffset>(id, rel, 0);
    }

    /// Records a struct that was just written inline at position `here`.
    pub fn add_struct_offset(&mut self, id: VOffset, here: UOffset) {
        self.track_field(id, here);
    }

    /// Forgets the fields recorded so far without writing a vtable.
    pub fn clear_offsets(&mut self) {
        self.field_locs.clear();
    }

    /// Writes a NUL-terminated, length-prefixed string and returns its
    /// position.
    pub fn create_string(&mut self, s: &str) -> UOffset {
        self.pre_align(s.len() + 1, SIZE_UOFFSET);
        self.pad(1);
        self.push_bytes(s.as_bytes());
        self.push_element(s.len() as UOffset)
    }

    /// Starts a new table. Field values for it may now be written.
    pub fn start_table(&mut self) -> UOffset {
        debug_assert!(!self.nested, "tables may not be nested while being built");
        self.nested = true;
        self.get_size() as UOffset
    }

    /// Finishes a table: writes its vtable, deduplicates it against every
    /// vtable written before, patches the table's vtable offset, and returns
    /// the table's position.
    pub fn end_table(&mut self, start: UOffset, numfields: VOffset) -> UOffset {
        debug_assert!(self.nested, "end_table called outside a table");
        let vtableoffsetloc = self.push_element::<SOffset>(0);
        self.pad(numfields as usize * SIZE_VOFFSET);
        let table_object_size = vtableoffsetloc - start;
        debug_assert!(table_object_size < 0x10000, "vtables use 16-bit offsets");
        self.push_element::<VOffset>(table_object_size as VOffset);
        self.push_element::<VOffset>(field_index_to_offset(numfields));
        for i in 0..self.field_locs.len() {
            let fl = self.field_locs[i];
            let pos = (vtableoffsetloc - fl.off) as VOffset;
            let slot = self.head + fl.id as usize;
            debug_assert_eq!(VOffset::read_le(&self.buf[slot..]), 0, "field set twice");
            pos.write_le(&mut self.buf[slot..]);
        }
        self.field_locs.clear();

        // Reuse an identical vtable if one exists; byte equality is enough
        // because slot contents are position-independent.
        let vt_size = VOffset::read_le(&self.buf[self.head..]) as usize;
        let mut vt_use = self.get_size() as UOffset;
        for &candidate in &self.vtables {
            let at = self.buf.len() - candidate as usize;
            let candidate_size = VOffset::read_le(&self.buf[at..]) as usize;
            if vt_size == candidate_size
                && self.buf[self.head..self.head + vt_size] == self.buf[at..at + candidate_size]
            {
                vt_use = candidate;
                break;
            }
        }
        if vt_use == self.get_size() as UOffset {
            self.vtables.push(vt_use);
        } else {
            self.pop_bytes(self.get_size() - vtableoffsetloc as usize);
        }

        let loc = self.buf.len() - vtableoffsetloc as usize;
        (vt_use as SOffset - vtableoffsetloc as SOffset).write_le(&mut self.buf[loc..]);
        self.nested = false;
        vtableoffsetloc
    }

    /// Starts an inline struct, aligned to the struct's overall alignment.
    pub fn start_struct(&mut self, alignment: usize) -> UOffset {
        self.align(alignment);
        self.in_struct = true;
        self.get_size() as UOffset
    }

    /// Ends the current inline struct and returns its position.
    pub fn end_struct(&mut self) -> UOffset {
        self.in_struct = false;
        self.get_size() as UOffset
    }

    /// Prepares for `len` bytes of vector elements with the given alignment;
    /// the length prefix is written by [`end_vector`](Builder::end_vector).
    pub fn start_vector(&mut self, len: usize, alignment: usize) -> UOffset {
        self.pre_align(len, SIZE_UOFFSET);
        self.pre_align(len, alignment);
        self.get_size() as UOffset
    }

    /// Writes the vector's length prefix and returns the vector's position.
    pub fn end_vector(&mut self, count: u32) -> UOffset {
        self.push_element::<UOffset>(count)
    }

    /// Writes the root offset. After this the buffer is complete and
    /// [`data`](Builder::data) is the finished, readable buffer.
    pub fn finish(&mut self, root: UOffset) {
        let minalign = self.minalign;
        self.pre_align(SIZE_UOFFSET, minalign);
        let rel = self.ref_to(root);
        self.push_element::<UOffset>(rel);
    }
}

impl Default for Builder {
    fn default() -> Builder {
        Builder::new()
    }
}

#[test]
fn push_element_aligns() {
    let mut b = Builder::new();
    b.push_element(1u8);
    b.push_element(0x0403_0201u32);
    assert_eq!(b.data(), [1, 2, 3, 4, 0, 0, 0, 1]);
    assert_eq!(b.get_size(), 8);
}

#[test]
fn push_and_pop_bytes() {
    let mut b = Builder::new();
    b.push_bytes(&[1, 2, 3]);
    b.push_bytes(&[4, 5]);
    assert_eq!(b.data(), [4, 5, 1, 2, 3]);
    b.pop_bytes(2);
    assert_eq!(b.data(), [1, 2, 3]);
}

#[test]
fn create_string_layout() {
    let mut b = Builder::new();
    let off = b.create_string("hello");
    // Length prefix, bytes, terminator, then tail padding so that the prefix
    // landed 4-aligned.
    assert_eq!(b.data(), [5, 0, 0, 0, 104, 101, 108, 108, 111, 0, 0, 0]);
    assert_eq!(off, 12);
}

#[test]
fn grows_from_small_capacity() {
    let mut b = Builder::with_capacity(16);
    for i in 0..100u32 {
        b.push_element(i);
    }
    assert_eq!(b.get_size(), 400);
    assert_eq!(u32::read_le(b.data()), 99);
    assert_eq!(u32::read_le(&b.data()[396..]), 0);
}

#[test]
fn single_field_table() {
    let mut b = Builder::new();
    let start = b.start_table();
    b.add_element::<i32>(field_index_to_offset(0), 7, 0);
    let table = b.end_table(start, 1);
    assert_eq!(table, 8);
    b.finish(table);
    assert_eq!(
        b.data(),
        [
            12, 0, 0, 0, // root offset
            0, 0, // alignment padding
            6, 0, 8, 0, 4, 0, // vtable: size, table size, slot 0
            6, 0, 0, 0, // table: offset to vtable
            7, 0, 0, 0, // field value
        ]
    );
}

#[test]
fn default_valued_field_is_omitted() {
    let mut b = Builder::new();
    let start = b.start_table();
    b.add_element::<i32>(field_index_to_offset(0), 5, 5);
    let table = b.end_table(start, 1);
    // No field data; the vtable slot stays zero.
    assert_eq!(b.data(), [6, 0, 4, 0, 0, 0, 4, 0, 0, 0]);
    assert_eq!(table, 4);
}

#[test]
fn struct_fields_keep_defaults() {
    let mut b = Builder::new();
    b.start_struct(4);
    b.add_element::<i32>(4, 0, 0);
    b.add_element::<u8>(0, 0, 0);
    b.pad(3);
    b.clear_offsets();
    b.end_struct();
    assert_eq!(b.get_size(), 8);
}

#[test]
fn identical_vtables_are_shared() {
    let mut b = Builder::new();
    let start = b.start_table();
    b.add_element::<i32>(field_index_to_offset(0), 7, 0);
    let first = b.end_table(start, 1);
    assert_eq!(b.get_size(), 14);

    b.align(4);
    let start = b.start_table();
    b.add_element::<i32>(field_index_to_offset(0), 8, 0);
    let second = b.end_table(start, 1);
    // Same shape: the second table points back at the first vtable (at
    // position 14) and only adds its own field data and vtable offset.
    assert_eq!(first, 8);
    assert_eq!(second, 24);
    assert_eq!(b.get_size(), 24);
    assert_eq!(i32::read_le(b.data()), 14 - second as i32);
}

#[test]
fn clear_resets_state() {
    let mut b = Builder::new();
    let start = b.start_table();
    b.add_element::<u8>(4, 3, 0);
    b.end_table(start, 1);
    b.clear();
    assert_eq!(b.get_size(), 0);
    let s = b.create_string("x");
    assert_eq!(s, 8);
    assert_eq!(b.data(), [1, 0, 0, 0, 120, 0, 0, 0]);
}
