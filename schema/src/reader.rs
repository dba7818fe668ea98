use std::borrow::Cow;

use crate::scalar::Scalar;
use crate::{SOffset, UOffset, VOffset, SIZE_UOFFSET};

/// Reads one little-endian scalar at an absolute position in a finished
/// buffer.
pub fn read_scalar<T: Scalar>(buf: &[u8], pos: usize) -> T {
    T::read_le(&buf[pos..])
}

/// A table inside a finished buffer.
///
/// Fields are looked up through the table's vtable: a missing slot means the
/// value was equal to its default and was never stored.
#[derive(Clone, Copy)]
pub struct Table<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Table<'a> {
    /// The root table a finished buffer starts with.
    pub fn root(buf: &'a [u8]) -> Table<'a> {
        let pos = read_scalar::<UOffset>(buf, 0) as usize;
        Table { buf, pos }
    }

    /// A table at a known absolute position.
    pub fn new(buf: &'a [u8], pos: usize) -> Table<'a> {
        Table { buf, pos }
    }

    /// Absolute position of this table in the buffer.
    pub fn pos(&self) -> usize {
        self.pos
    }

    fn vtable(&self) -> usize {
        let soffset = read_scalar::<SOffset>(self.buf, self.pos);
        (self.pos as isize - soffset as isize) as usize
    }

    /// Absolute position of a field's stored value, or `None` when the field
    /// was omitted.
    pub fn field_offset(&self, field: VOffset) -> Option<usize> {
        let vt = self.vtable();
        let vt_size = read_scalar::<VOffset>(self.buf, vt);
        if field < vt_size {
            let off = read_scalar::<VOffset>(self.buf, vt + field as usize);
            if off != 0 {
                return Some(self.pos + off as usize);
            }
        }
        None
    }

    /// Reads a scalar field, falling back to `default` when omitted.
    pub fn get<T: Scalar>(&self, field: VOffset, default: T) -> T {
        match self.field_offset(field) {
            Some(at) => T::read_le(&self.buf[at..]),
            None => default,
        }
    }

    /// Absolute position of an inline struct field.
    pub fn get_struct(&self, field: VOffset) -> Option<usize> {
        self.field_offset(field)
    }

    /// Follows an offset field to a nested table.
    pub fn get_table(&self, field: VOffset) -> Option<Table<'a>> {
        self.field_offset(field).map(|at| {
            let rel = read_scalar::<UOffset>(self.buf, at) as usize;
            Table::new(self.buf, at + rel)
        })
    }

    /// Follows an offset field to a string.
    pub fn get_str(&self, field: VOffset) -> Option<Cow<'a, str>> {
        self.field_offset(field).map(|at| {
            let target = at + read_scalar::<UOffset>(self.buf, at) as usize;
            let len = read_scalar::<UOffset>(self.buf, target) as usize;
            let start = target + SIZE_UOFFSET;
            String::from_utf8_lossy(&self.buf[start..start + len])
        })
    }

    /// Follows an offset field to a vector.
    pub fn get_vector(&self, field: VOffset) -> Option<Vector<'a>> {
        self.field_offset(field).map(|at| {
            let rel = read_scalar::<UOffset>(self.buf, at) as usize;
            Vector { buf: self.buf, pos: at + rel }
        })
    }
}

/// A length-prefixed vector inside a finished buffer.
#[derive(Clone, Copy)]
pub struct Vector<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Vector<'a> {
    pub fn len(&self) -> usize {
        read_scalar::<UOffset>(self.buf, self.pos) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn elems(&self) -> usize {
        self.pos + SIZE_UOFFSET
    }

    /// Reads the scalar element at `index`.
    pub fn scalar_at<T: Scalar>(&self, index: usize) -> T {
        T::read_le(&self.buf[self.elems() + index * T::SIZE..])
    }

    /// Follows the offset element at `index` to a table.
    pub fn table_at(&self, index: usize) -> Table<'a> {
        let at = self.elems() + index * SIZE_UOFFSET;
        let rel = read_scalar::<UOffset>(self.buf, at) as usize;
        Table::new(self.buf, at + rel)
    }

    /// Follows the offset element at `index` to a string.
    pub fn string_at(&self, index: usize) -> Cow<'a, str> {
        let at = self.elems() + index * SIZE_UOFFSET;
        let target = at + read_scalar::<UOffset>(self.buf, at) as usize;
        let len = read_scalar::<UOffset>(self.buf, target) as usize;
        let start = target + SIZE_UOFFSET;
        String::from_utf8_lossy(&self.buf[start..start + len])
    }

    /// Absolute position of the inline struct element at `index`, given the
    /// struct's inline size.
    pub fn struct_at(&self, index: usize, stride: usize) -> usize {
        self.elems() + index * stride
    }
}
