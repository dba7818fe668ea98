use std::collections::HashMap;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use brine_flatbuf_schema::{padding_bytes, SIZE_UOFFSET};

/// The closed set of wire types. `None` marks an untyped slot (attribute
/// values before inference), `UType` the auto-generated union tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BaseType {
    None,
    UType,
    Bool,
    Byte,
    UByte,
    Short,
    UShort,
    Int,
    UInt,
    Long,
    ULong,
    Float,
    Double,
    String,
    Vector,
    Struct,
    Union,
}

impl BaseType {
    /// Inline size in bytes when stored directly in a table or struct.
    /// Pointer types store a `UOffset`.
    pub fn size(self) -> usize {
        match self {
            BaseType::None | BaseType::UType | BaseType::Bool | BaseType::Byte | BaseType::UByte => 1,
            BaseType::Short | BaseType::UShort => 2,
            BaseType::Int | BaseType::UInt | BaseType::Float => 4,
            BaseType::Long | BaseType::ULong | BaseType::Double => 8,
            BaseType::String | BaseType::Vector | BaseType::Struct | BaseType::Union => SIZE_UOFFSET,
        }
    }

    pub fn is_scalar(self) -> bool {
        matches!(
            self,
            BaseType::UType
                | BaseType::Bool
                | BaseType::Byte
                | BaseType::UByte
                | BaseType::Short
                | BaseType::UShort
                | BaseType::Int
                | BaseType::UInt
                | BaseType::Long
                | BaseType::ULong
                | BaseType::Float
                | BaseType::Double
        )
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            BaseType::UType
                | BaseType::Bool
                | BaseType::Byte
                | BaseType::UByte
                | BaseType::Short
                | BaseType::UShort
                | BaseType::Int
                | BaseType::UInt
                | BaseType::Long
                | BaseType::ULong
        )
    }

    pub fn is_float(self) -> bool {
        matches!(self, BaseType::Float | BaseType::Double)
    }

    /// The name this type goes by in IDL source and diagnostics.
    pub fn idl_name(self) -> &'static str {
        match self {
            BaseType::None => "none",
            BaseType::UType => "utype",
            BaseType::Bool => "bool",
            BaseType::Byte => "byte",
            BaseType::UByte => "ubyte",
            BaseType::Short => "short",
            BaseType::UShort => "ushort",
            BaseType::Int => "int",
            BaseType::UInt => "uint",
            BaseType::Long => "long",
            BaseType::ULong => "ulong",
            BaseType::Float => "float",
            BaseType::Double => "double",
            BaseType::String => "string",
            BaseType::Vector => "vector",
            BaseType::Struct => "struct",
            BaseType::Union => "union",
        }
    }

    /// The types that may be written literally in a type annotation.
    pub fn lexable() -> &'static [BaseType] {
        &[
            BaseType::Bool,
            BaseType::Byte,
            BaseType::UByte,
            BaseType::Short,
            BaseType::UShort,
            BaseType::Int,
            BaseType::UInt,
            BaseType::Long,
            BaseType::ULong,
            BaseType::Float,
            BaseType::Double,
            BaseType::String,
        ]
    }
}

/// A type annotation. `element` is only meaningful for vectors; the `_ref`
/// fields hold registry names, resolved through the owning `Parser`, never
/// owning pointers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Type {
    pub base_type: BaseType,
    pub element: BaseType,
    pub struct_ref: Option<String>,
    pub enum_ref: Option<String>,
}

impl Type {
    pub fn new(base_type: BaseType) -> Type {
        Type {
            base_type,
            element: BaseType::None,
            struct_ref: None,
            enum_ref: None,
        }
    }

    /// The element type of a vector, carrying the registry references over.
    pub fn vector_type(&self) -> Type {
        Type {
            base_type: self.element,
            element: BaseType::None,
            struct_ref: self.struct_ref.clone(),
            enum_ref: self.enum_ref.clone(),
        }
    }
}

impl Default for Type {
    fn default() -> Type {
        Type::new(BaseType::None)
    }
}

/// A typed constant slot. `constant` holds the textual default for scalars
/// and doubles as scratch for stored offsets while pointer fields are being
/// serialized. `offset` is the vtable slot for table fields and the byte
/// offset for struct fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Value {
    pub type_: Type,
    pub offset: u16,
    pub constant: String,
}

impl Default for Value {
    fn default() -> Value {
        Value {
            type_: Type::default(),
            offset: 0,
            constant: "0".to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDef {
    pub name: String,
    pub doc_comment: String,
    pub attributes: HashMap<String, Value>,
    pub value: Value,
    /// Bytes written before this field when its struct is serialized.
    pub padding: usize,
    pub deprecated: bool,
}

impl FieldDef {
    pub fn new(name: &str, type_: Type) -> FieldDef {
        FieldDef {
            name: name.to_owned(),
            doc_comment: String::new(),
            attributes: HashMap::new(),
            value: Value {
                type_,
                offset: 0,
                constant: "0".to_owned(),
            },
            padding: 0,
            deprecated: false,
        }
    }
}

/// A table (`fixed = false`, vtable layout) or a struct (`fixed = true`,
/// inline layout). Created with `predecl = true` when first referenced;
/// the flag drops once the body is parsed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructDef {
    pub name: String,
    pub doc_comment: String,
    pub attributes: HashMap<String, Value>,
    pub fields: SymbolTable<FieldDef>,
    pub fixed: bool,
    pub predecl: bool,
    pub sortbysize: bool,
    pub minalign: usize,
    pub bytesize: usize,
}

impl StructDef {
    pub fn new(name: &str) -> StructDef {
        StructDef {
            name: name.to_owned(),
            doc_comment: String::new(),
            attributes: HashMap::new(),
            fields: SymbolTable::new(),
            fixed: false,
            predecl: true,
            sortbysize: false,
            minalign: 1,
            bytesize: 0,
        }
    }

    /// Rounds `bytesize` up to `alignment`, recording the padding on the
    /// last field so serialization can reproduce the layout.
    pub fn pad_last_field(&mut self, alignment: usize) {
        let padding = padding_bytes(self.bytesize, alignment);
        self.bytesize += padding;
        if let Some(last) = self.fields.last_mut() {
            last.padding = padding;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnumVal {
    pub name: String,
    pub value: i64,
    pub doc_comment: String,
    /// For union members, the table this value selects.
    pub struct_ref: Option<String>,
}

impl EnumVal {
    pub fn new(name: &str, value: i64) -> EnumVal {
        EnumVal {
            name: name.to_owned(),
            value,
            doc_comment: String::new(),
            struct_ref: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnumDef {
    pub name: String,
    pub doc_comment: String,
    pub attributes: HashMap<String, Value>,
    pub is_union: bool,
    pub underlying_type: Type,
    pub vals: SymbolTable<EnumVal>,
}

impl EnumDef {
    pub fn new(name: &str, is_union: bool) -> EnumDef {
        EnumDef {
            name: name.to_owned(),
            doc_comment: String::new(),
            attributes: HashMap::new(),
            is_union,
            underlying_type: Type::default(),
            vals: SymbolTable::new(),
        }
    }

    /// The first value with the given numeric representation.
    pub fn reverse_lookup(&self, value: i64) -> Option<&EnumVal> {
        self.vals.values().find(|v| v.value == value)
    }
}

/// An insertion-ordered name → definition map. Insertion order is what
/// declaration order, field layout, and enum numbering are all built on.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolTable<T> {
    items: Vec<(String, T)>,
    index: HashMap<String, usize>,
}

impl<T> SymbolTable<T> {
    pub fn new() -> SymbolTable<T> {
        SymbolTable {
            items: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Inserts unless the name is taken; returns true if it already existed.
    pub fn add(&mut self, name: &str, value: T) -> bool {
        if self.index.contains_key(name) {
            return true;
        }
        self.index.insert(name.to_owned(), self.items.len());
        self.items.push((name.to_owned(), value));
        false
    }

    pub fn lookup(&self, name: &str) -> Option<&T> {
        self.index.get(name).map(|&i| &self.items[i].1)
    }

    pub fn lookup_mut(&mut self, name: &str) -> Option<&mut T> {
        match self.index.get(name) {
            Some(&i) => Some(&mut self.items[i].1),
            None => None,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The value at insertion position `i`.
    pub fn at(&self, i: usize) -> &T {
        &self.items[i].1
    }

    pub fn at_mut(&mut self, i: usize) -> &mut T {
        &mut self.items[i].1
    }

    pub fn last_mut(&mut self) -> Option<&mut T> {
        self.items.last_mut().map(|(_, v)| v)
    }

    /// Values in insertion order.
    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.items.iter().map(|(_, v)| v)
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.items.iter_mut().map(|(_, v)| v)
    }

    /// Re-sends an entry to the back of the insertion order, as if it had
    /// just been added.
    pub fn move_to_back(&mut self, name: &str) {
        if let Some(&i) = self.index.get(name) {
            let entry = self.items.remove(i);
            self.items.push(entry);
            self.reindex();
        }
    }

    /// Reorders entries by the given comparison on values.
    pub fn sort_by<F>(&mut self, mut cmp: F)
    where
        F: FnMut(&T, &T) -> std::cmp::Ordering,
    {
        self.items.sort_by(|a, b| cmp(&a.1, &b.1));
        self.reindex();
    }

    fn reindex(&mut self) {
        self.index.clear();
        for (i, (name, _)) in self.items.iter().enumerate() {
            self.index.insert(name.clone(), i);
        }
    }
}

impl<T> Default for SymbolTable<T> {
    fn default() -> SymbolTable<T> {
        SymbolTable::new()
    }
}

impl<T: Serialize> Serialize for SymbolTable<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.items.len()))?;
        for (name, value) in &self.items {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_table_preserves_insertion_order() {
        let mut t = SymbolTable::new();
        assert!(!t.add("b", 2));
        assert!(!t.add("a", 1));
        assert!(t.add("b", 9));
        assert_eq!(t.len(), 2);
        assert_eq!(t.lookup("b"), Some(&2));
        assert_eq!(t.values().copied().collect::<Vec<_>>(), [2, 1]);
    }

    #[test]
    fn symbol_table_move_to_back() {
        let mut t = SymbolTable::new();
        t.add("a", 1);
        t.add("b", 2);
        t.add("c", 3);
        t.move_to_back("a");
        assert_eq!(t.values().copied().collect::<Vec<_>>(), [2, 3, 1]);
        assert_eq!(t.lookup("a"), Some(&1));
        assert_eq!(*t.at(2), 1);
    }

    #[test]
    fn symbol_table_sort_by() {
        let mut t = SymbolTable::new();
        t.add("x", 3);
        t.add("y", 1);
        t.add("z", 2);
        t.sort_by(|a, b| a.cmp(b));
        assert_eq!(t.values().copied().collect::<Vec<_>>(), [1, 2, 3]);
        assert_eq!(t.lookup("x"), Some(&3));
    }

    #[test]
    fn pad_last_field_records_padding() {
        let mut sd = StructDef::new("S");
        sd.fixed = true;
        sd.fields.add("x", FieldDef::new("x", Type::new(BaseType::Byte)));
        sd.bytesize = 1;
        sd.pad_last_field(4);
        assert_eq!(sd.bytesize, 4);
        assert_eq!(sd.fields.lookup("x").map(|f| f.padding), Some(3));
    }

    #[test]
    fn base_type_classification() {
        assert!(BaseType::UType.is_scalar());
        assert!(BaseType::Double.is_scalar());
        assert!(!BaseType::String.is_scalar());
        assert!(BaseType::Bool.is_integer());
        assert!(!BaseType::Float.is_integer());
        assert!(BaseType::Double.is_float());
        assert_eq!(BaseType::Union.size(), 4);
        assert_eq!(BaseType::ULong.size(), 8);
    }
}
