use std::collections::HashMap;

use brine_flatbuf_schema::{field_index_to_offset, Builder, UOffset, LARGEST_SCALAR_SIZE};

use crate::error::FlatbufError;
use crate::tokenizer::{Token, Tokenizer};
use crate::types::{BaseType, EnumDef, EnumVal, FieldDef, StructDef, SymbolTable, Type, Value};
use crate::verifier;

/// `strtoll`-flavored prefix parse: optional sign, then digits; anything
/// after the numeric prefix is ignored and an empty prefix is 0.
fn string_to_int(s: &str) -> i64 {
    let t = s.trim_start();
    let (negative, rest) = match t.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, t),
    };
    let mut value: i64 = 0;
    for c in rest.bytes() {
        if !c.is_ascii_digit() {
            break;
        }
        value = value.wrapping_mul(10).wrapping_add((c - b'0') as i64);
    }
    if negative {
        -value
    } else {
        value
    }
}

/// `strtod`-flavored parse; unparseable text is 0.
fn string_to_float(s: &str) -> f64 {
    s.parse().unwrap_or(0.0)
}

fn field_id(field: &FieldDef) -> i64 {
    field
        .attributes
        .get("id")
        .map_or(0, |v| string_to_int(&v.constant))
}

/// The schema registry and the parse machinery that fills it.
///
/// One `parse` call consumes a source text of declarations and at most one
/// root object literal, serialized through `builder`. Definitions accumulate
/// across calls so multiple schema texts can share a registry; the cursor,
/// the builder, and both serialization stacks reset per call.
pub struct Parser {
    pub structs: SymbolTable<StructDef>,
    pub enums: SymbolTable<EnumDef>,
    pub name_space: Vec<String>,
    pub root_struct_def: Option<String>,
    pub builder: Builder,
    tok: Tokenizer,
    field_stack: Vec<(Value, Option<FieldDef>)>,
    struct_stack: Vec<u8>,
}

impl Parser {
    pub fn new() -> Parser {
        Parser {
            structs: SymbolTable::new(),
            enums: SymbolTable::new(),
            name_space: Vec::new(),
            root_struct_def: None,
            builder: Builder::new(),
            tok: Tokenizer::new(""),
            field_stack: Vec::new(),
            struct_stack: Vec::new(),
        }
    }

    /// Parses declarations and an optional root object literal. On success
    /// the registry holds every definition and, if an object was present,
    /// `builder` holds the finished buffer.
    pub fn parse(&mut self, source: &str) -> Result<(), FlatbufError> {
        self.tok = Tokenizer::new(source);
        self.builder.clear();
        self.field_stack.clear();
        self.struct_stack.clear();
        self.tok.next()?;
        while self.tok.token != Token::Eof {
            match self.tok.token.clone() {
                Token::Namespace => {
                    self.tok.next()?;
                    self.name_space.clear();
                    loop {
                        self.name_space.push(self.tok.attribute.clone());
                        self.tok.expect(Token::Identifier)?;
                        if !self.tok.is_next(Token::Char('.'))? {
                            break;
                        }
                    }
                    self.tok.expect(Token::Char(';'))?;
                }
                Token::Char('{') => {
                    let root = match &self.root_struct_def {
                        Some(root) => root.clone(),
                        None => return Err(self.err("no root type set to parse json with")),
                    };
                    if self.builder.get_size() != 0 {
                        return Err(self.err("cannot have more than one json object in a file"));
                    }
                    let off = self.parse_table(&root)?;
                    self.builder.finish(off);
                }
                Token::Enum => self.parse_enum(false)?,
                Token::Union => self.parse_enum(true)?,
                Token::RootType => {
                    self.tok.next()?;
                    let root_type = self.tok.attribute.clone();
                    self.tok.expect(Token::Identifier)?;
                    self.tok.expect(Token::Char(';'))?;
                    match self.structs.lookup(&root_type) {
                        None => {
                            return Err(self.err(format!("unknown root type: {}", root_type)))
                        }
                        Some(sd) if sd.fixed => {
                            return Err(self.err("root type must be a table"))
                        }
                        Some(_) => self.root_struct_def = Some(root_type),
                    }
                }
                _ => self.parse_decl()?,
            }
        }
        verifier::verify(&self.structs, &self.enums, self.tok.line)?;
        debug_assert!(self.struct_stack.is_empty(), "unbalanced struct serialization");
        Ok(())
    }

    fn err(&self, msg: impl Into<String>) -> FlatbufError {
        FlatbufError::Parse {
            msg: msg.into(),
            line: self.tok.line,
        }
    }

    /// Finds a struct definition, creating a pre-declared placeholder the
    /// first time a name is referenced. Unresolved placeholders are reported
    /// at the end of the parse.
    fn lookup_create_struct(&mut self, name: &str) -> String {
        if self.structs.lookup(name).is_none() {
            self.structs.add(name, StructDef::new(name));
        }
        name.to_owned()
    }

    fn is_struct(&self, type_: &Type) -> bool {
        type_.base_type == BaseType::Struct
            && type_
                .struct_ref
                .as_ref()
                .and_then(|n| self.structs.lookup(n))
                .map_or(false, |sd| sd.fixed)
    }

    fn inline_size(&self, type_: &Type) -> usize {
        if self.is_struct(type_) {
            type_
                .struct_ref
                .as_ref()
                .and_then(|n| self.structs.lookup(n))
                .map_or(0, |sd| sd.bytesize)
        } else {
            type_.base_type.size()
        }
    }

    fn inline_alignment(&self, type_: &Type) -> usize {
        if self.is_struct(type_) {
            type_
                .struct_ref
                .as_ref()
                .and_then(|n| self.structs.lookup(n))
                .map_or(1, |sd| sd.minalign)
        } else {
            type_.base_type.size()
        }
    }

    /// Converts a textual integer constant, checking it fits `bits`.
    fn int_constant(&self, s: &str, bits: usize) -> Result<i64, FlatbufError> {
        let value = string_to_int(s);
        if bits < 64 {
            let mask = (1i64 << bits) - 1;
            if (value & !mask) != 0 && (value | mask) != -1 {
                return Err(self.err(format!("constant does not fit in a {}-bit field", bits)));
            }
        }
        Ok(value)
    }

    /// Parses one type annotation: a primitive name, a registry reference,
    /// or a vector.
    fn parse_type(&mut self) -> Result<Type, FlatbufError> {
        match self.tok.token.clone() {
            Token::TypeName(base_type) => {
                let type_ = Type::new(base_type);
                self.tok.next()?;
                Ok(type_)
            }
            Token::Identifier => {
                let name = self.tok.attribute.clone();
                let type_ = if let Some(enum_def) = self.enums.lookup(&name) {
                    let mut type_ = enum_def.underlying_type.clone();
                    if enum_def.is_union {
                        type_.base_type = BaseType::Union;
                    }
                    type_
                } else {
                    let mut type_ = Type::new(BaseType::Struct);
                    type_.struct_ref = Some(self.lookup_create_struct(&name));
                    type_
                };
                self.tok.next()?;
                Ok(type_)
            }
            Token::Char('[') => {
                self.tok.next()?;
                let subtype = self.parse_type()?;
                if subtype.base_type == BaseType::Vector {
                    return Err(self.err("nested vector types not supported (wrap in table first)"));
                }
                if subtype.base_type == BaseType::Union {
                    return Err(
                        self.err("vector of union types not supported (wrap in table first)")
                    );
                }
                let mut type_ = Type::new(BaseType::Vector);
                type_.element = subtype.base_type;
                type_.struct_ref = subtype.struct_ref;
                type_.enum_ref = subtype.enum_ref;
                self.tok.expect(Token::Char(']'))?;
                Ok(type_)
            }
            _ => Err(self.err("illegal type syntax")),
        }
    }

    /// Appends a field to a definition, assigning its vtable slot (tables)
    /// or computing its inline offset and the layout padding (structs).
    fn add_field(
        &mut self,
        struct_name: &str,
        field_name: &str,
        type_: Type,
    ) -> Result<(), FlatbufError> {
        let size = self.inline_size(&type_);
        let alignment = self.inline_alignment(&type_);
        let line = self.tok.line;
        let struct_def = match self.structs.lookup_mut(struct_name) {
            Some(sd) => sd,
            None => {
                return Err(FlatbufError::Parse {
                    msg: format!("unknown type: {}", struct_name),
                    line,
                })
            }
        };
        let mut field = FieldDef::new(field_name, type_);
        field.value.offset = field_index_to_offset(struct_def.fields.len() as u16);
        if struct_def.fixed {
            struct_def.minalign = struct_def.minalign.max(alignment);
            struct_def.pad_last_field(alignment);
            field.value.offset = struct_def.bytesize as u16;
            struct_def.bytesize += size;
        }
        if struct_def.fields.add(field_name, field) {
            return Err(FlatbufError::Parse {
                msg: format!("field already exists: {}", field_name),
                line,
            });
        }
        Ok(())
    }

    /// `ident ':' type ('=' default)? metadata? ';'`. Union fields first get
    /// an auto-generated `<name>_type` tag sibling carrying the union's
    /// underlying type.
    fn parse_field(&mut self, struct_name: &str) -> Result<(), FlatbufError> {
        let name = self.tok.attribute.clone();
        let doc_comment = self.tok.doc_comment.clone();
        self.tok.expect(Token::Identifier)?;
        self.tok.expect(Token::Char(':'))?;
        let type_ = self.parse_type()?;

        let fixed = self
            .structs
            .lookup(struct_name)
            .map_or(false, |sd| sd.fixed);
        if fixed && !type_.base_type.is_scalar() && !self.is_struct(&type_) {
            return Err(self.err("structs may contain only scalar or struct fields"));
        }

        let mut typefield_name = None;
        if type_.base_type == BaseType::Union {
            let underlying = match type_
                .enum_ref
                .as_ref()
                .and_then(|n| self.enums.lookup(n))
            {
                Some(enum_def) => enum_def.underlying_type.clone(),
                None => return Err(self.err(format!("unknown union type for field: {}", name))),
            };
            let tag_name = format!("{}_type", name);
            self.add_field(struct_name, &tag_name, underlying)?;
            typefield_name = Some(tag_name);
        }

        self.add_field(struct_name, &name, type_.clone())?;

        if self.tok.token == Token::Char('=') {
            self.tok.next()?;
            let mut value = match self
                .structs
                .lookup(struct_name)
                .and_then(|sd| sd.fields.lookup(&name))
            {
                Some(field) => field.value.clone(),
                None => Value::default(),
            };
            self.parse_single_value(&mut value)?;
            if let Some(sd) = self.structs.lookup_mut(struct_name) {
                if let Some(field) = sd.fields.lookup_mut(&name) {
                    field.value = value;
                }
            }
        }

        let mut attributes = HashMap::new();
        self.parse_metadata(&mut attributes)?;
        let deprecated = attributes.contains_key("deprecated");
        if deprecated && fixed {
            return Err(self.err("can't deprecate fields in a struct"));
        }
        if let Some(nested) = attributes.get("nested_flatbuffer").cloned() {
            if nested.type_.base_type != BaseType::String {
                return Err(self.err("nested_flatbuffer attribute must be a string (the root type)"));
            }
            if type_.base_type != BaseType::Vector || type_.element != BaseType::UByte {
                return Err(self.err("nested_flatbuffer attribute may only apply to a vector of ubyte"));
            }
            // Errors at end of parse if the named root type is never defined.
            self.lookup_create_struct(&nested.constant);
        }
        if let Some(tag_name) = &typefield_name {
            // A manually assigned union id pins the tag field to the slot
            // right before it.
            if let Some(id_attr) = attributes.get("id") {
                let id = string_to_int(&id_attr.constant);
                if id == 0 {
                    return Err(self.err(format!(
                        "union field with id 0 leaves no id for its type field: {}",
                        name
                    )));
                }
                let mut tag_id = Value::default();
                tag_id.type_ = id_attr.type_.clone();
                tag_id.constant = (id - 1).to_string();
                if let Some(sd) = self.structs.lookup_mut(struct_name) {
                    if let Some(tag) = sd.fields.lookup_mut(tag_name) {
                        tag.attributes.insert("id".to_owned(), tag_id);
                    }
                }
            }
        }
        if let Some(sd) = self.structs.lookup_mut(struct_name) {
            if let Some(field) = sd.fields.lookup_mut(&name) {
                field.doc_comment = doc_comment;
                field.attributes = attributes;
                field.deprecated = deprecated;
            }
        }
        self.tok.expect(Token::Char(';'))?;
        Ok(())
    }

    /// `'(' ident (':' value)? (',' ident (':' value)?)* ')'`, if present.
    fn parse_metadata(
        &mut self,
        attributes: &mut HashMap<String, Value>,
    ) -> Result<(), FlatbufError> {
        if self.tok.is_next(Token::Char('('))? {
            loop {
                let name = self.tok.attribute.clone();
                self.tok.expect(Token::Identifier)?;
                let mut value = Value::default();
                if self.tok.is_next(Token::Char(':'))? {
                    self.parse_single_value(&mut value)?;
                }
                attributes.insert(name, value);
                if self.tok.is_next(Token::Char(')'))? {
                    break;
                }
                self.tok.expect(Token::Char(','))?;
            }
        }
        Ok(())
    }

    fn try_typed_value(
        &mut self,
        dtoken: Token,
        check: bool,
        value: &mut Value,
        req: BaseType,
    ) -> Result<bool, FlatbufError> {
        let matched = dtoken == self.tok.token;
        if matched {
            value.constant = self.tok.attribute.clone();
            if !check {
                if value.type_.base_type == BaseType::None {
                    value.type_.base_type = req;
                } else {
                    return Err(self.err(format!(
                        "type mismatch: expecting: {}, found: {}",
                        value.type_.base_type.idl_name(),
                        req.idl_name()
                    )));
                }
            }
            self.tok.next()?;
        }
        Ok(matched)
    }

    /// Space-separated enum tokens OR'ed together. Qualified `Enum.Value`
    /// names work on plain integer fields; bare names need the field's own
    /// enum type.
    fn parse_integer_from_string(&self, type_: &Type) -> Result<i64, FlatbufError> {
        let mut result = 0i64;
        for word in self.tok.attribute.split(' ').filter(|w| !w.is_empty()) {
            if let Some(enum_name) = &type_.enum_ref {
                let enum_def = match self.enums.lookup(enum_name) {
                    Some(ed) => ed,
                    None => return Err(self.err(format!("unknown enum: {}", enum_name))),
                };
                match enum_def.vals.lookup(word) {
                    Some(ev) => result |= ev.value,
                    None => {
                        return Err(self.err(format!(
                            "unknown enum value: {}, for enum: {}",
                            word, enum_def.name
                        )))
                    }
                }
            } else {
                if !type_.base_type.is_integer() {
                    return Err(self.err(format!("not a valid value for this field: {}", word)));
                }
                let dot = match word.find('.') {
                    Some(dot) => dot,
                    None => return Err(self.err("enum values need to be qualified by an enum type")),
                };
                let (enum_name, val_name) = (&word[..dot], &word[dot + 1..]);
                let enum_def = match self.enums.lookup(enum_name) {
                    Some(ed) => ed,
                    None => return Err(self.err(format!("unknown enum: {}", enum_name))),
                };
                match enum_def.vals.lookup(val_name) {
                    Some(ev) => result |= ev.value,
                    None => return Err(self.err(format!("unknown enum value: {}", val_name))),
                }
            }
        }
        Ok(result)
    }

    fn parse_single_value(&mut self, value: &mut Value) -> Result<(), FlatbufError> {
        // A string or identifier on a non-string field is an enum literal.
        if value.type_.base_type != BaseType::String
            && value.type_.base_type != BaseType::None
            && (self.tok.token == Token::Identifier || self.tok.token == Token::StringConstant)
        {
            value.constant = self.parse_integer_from_string(&value.type_)?.to_string();
            self.tok.next()?;
        } else if self.try_typed_value(
            Token::IntegerConstant,
            value.type_.base_type.is_scalar(),
            value,
            BaseType::Int,
        )? || self.try_typed_value(
            Token::FloatConstant,
            value.type_.base_type.is_float(),
            value,
            BaseType::Float,
        )? || self.try_typed_value(
            Token::StringConstant,
            value.type_.base_type == BaseType::String,
            value,
            BaseType::String,
        )? {
        } else {
            return Err(self.err(format!(
                "cannot parse value starting with: {}",
                self.tok.token
            )));
        }
        Ok(())
    }

    /// `enum name ':' type meta? '{' ... '}'`, or with `is_union` the
    /// `union name meta? '{' ... '}'` form, which gets an implicit
    /// `NONE = 0` and promotes every member name to a table reference.
    fn parse_enum(&mut self, is_union: bool) -> Result<(), FlatbufError> {
        let doc_comment = self.tok.doc_comment.clone();
        self.tok.next()?;
        let name = self.tok.attribute.clone();
        self.tok.expect(Token::Identifier)?;
        if self.enums.lookup(&name).is_some() {
            return Err(self.err(format!("enum already exists: {}", name)));
        }
        let mut enum_def = EnumDef::new(&name, is_union);
        enum_def.doc_comment = doc_comment;
        if is_union {
            enum_def.underlying_type = Type::new(BaseType::UType);
        } else {
            if !self.tok.is_next(Token::Char(':'))? {
                return Err(self.err(
                    "must specify the underlying integer type for this enum (e.g. ': short')",
                ));
            }
            let underlying = self.parse_type()?;
            if !underlying.base_type.is_integer() {
                return Err(self.err("underlying enum type must be integral"));
            }
            enum_def.underlying_type = underlying;
        }
        // The underlying type refers back to the enum it was derived from.
        enum_def.underlying_type.enum_ref = Some(name.clone());
        self.parse_metadata(&mut enum_def.attributes)?;
        self.tok.expect(Token::Char('{'))?;
        if is_union {
            enum_def.vals.add("NONE", EnumVal::new("NONE", 0));
        }
        loop {
            let value_name = self.tok.attribute.clone();
            let value_doc = self.tok.doc_comment.clone();
            self.tok.expect(Token::Identifier)?;
            let prev_count = enum_def.vals.len();
            let next_value = if prev_count > 0 {
                enum_def.vals.at(prev_count - 1).value + 1
            } else {
                0
            };
            if enum_def.vals.lookup(&value_name).is_some() {
                return Err(self.err(format!("enum value already exists: {}", value_name)));
            }
            let mut enum_val = EnumVal::new(&value_name, next_value);
            enum_val.doc_comment = value_doc;
            if is_union {
                enum_val.struct_ref = Some(self.lookup_create_struct(&value_name));
            }
            if self.tok.is_next(Token::Char('='))? {
                enum_val.value = string_to_int(&self.tok.attribute);
                self.tok.expect(Token::IntegerConstant)?;
                if prev_count > 0 && enum_def.vals.at(prev_count - 1).value >= enum_val.value {
                    return Err(self.err("enum values must be specified in ascending order"));
                }
            }
            enum_def.vals.add(&value_name, enum_val);
            if !self.tok.is_next(Token::Char(','))? {
                break;
            }
            if self.tok.token == Token::Char('}') {
                break;
            }
        }
        self.tok.expect(Token::Char('}'))?;
        if enum_def.attributes.contains_key("bit_flags") {
            let bits = enum_def.underlying_type.base_type.size() * 8;
            for enum_val in enum_def.vals.values_mut() {
                if enum_val.value as usize >= bits {
                    return Err(FlatbufError::Parse {
                        msg: "bit flag out of range of underlying integral type".to_owned(),
                        line: self.tok.line,
                    });
                }
                enum_val.value = 1i64 << enum_val.value;
            }
        }
        self.enums.add(&name, enum_def);
        Ok(())
    }

    /// `('table' | 'struct') name meta? '{' field* '}'` plus the post-body
    /// layout work: `force_align`, final padding, and explicit `id`
    /// reordering for tables.
    fn parse_decl(&mut self) -> Result<(), FlatbufError> {
        let doc_comment = self.tok.doc_comment.clone();
        let fixed = self.tok.is_next(Token::Struct)?;
        if !fixed {
            self.tok.expect(Token::Table)?;
        }
        let name = self.tok.attribute.clone();
        self.tok.expect(Token::Identifier)?;
        self.lookup_create_struct(&name);
        {
            let line = self.tok.line;
            let struct_def = match self.structs.lookup_mut(&name) {
                Some(sd) => sd,
                None => {
                    return Err(FlatbufError::Parse {
                        msg: format!("unknown type: {}", name),
                        line,
                    })
                }
            };
            if !struct_def.predecl {
                return Err(FlatbufError::Parse {
                    msg: format!("datatype already exists: {}", name),
                    line,
                });
            }
            struct_def.predecl = false;
            struct_def.doc_comment = doc_comment;
            struct_def.fixed = fixed;
        }
        // Predeclared entries sit wherever they were first referenced; real
        // declarations keep declaration order.
        self.structs.move_to_back(&name);

        let mut attributes = HashMap::new();
        self.parse_metadata(&mut attributes)?;
        let sortbysize = !fixed && !attributes.contains_key("original_order");
        let force_align = attributes.get("force_align").cloned();
        if let Some(struct_def) = self.structs.lookup_mut(&name) {
            struct_def.attributes = attributes;
            struct_def.sortbysize = sortbysize;
        }

        self.tok.expect(Token::Char('{'))?;
        while self.tok.token != Token::Char('}') {
            self.parse_field(&name)?;
        }

        if fixed {
            if let Some(force_align) = &force_align {
                let align = string_to_int(&force_align.constant);
                let minalign = self.structs.lookup(&name).map_or(1, |sd| sd.minalign);
                if force_align.type_.base_type != BaseType::Int
                    || align < minalign as i64
                    || align > 256
                    || (align & (align - 1)) != 0
                {
                    return Err(self.err(
                        "force_align must be a power of two integer ranging from the struct's natural alignment to 256",
                    ));
                }
                if let Some(struct_def) = self.structs.lookup_mut(&name) {
                    struct_def.minalign = align as usize;
                }
            }
        }
        if let Some(struct_def) = self.structs.lookup_mut(&name) {
            let minalign = struct_def.minalign;
            struct_def.pad_last_field(minalign);
        }

        if !fixed {
            self.assign_explicit_ids(&name)?;
        }
        self.tok.expect(Token::Char('}'))?;
        Ok(())
    }

    /// If any table field carries an `id` attribute, all must; fields are
    /// then reordered by id, the ids checked contiguous from 0, and vtable
    /// slots reassigned.
    fn assign_explicit_ids(&mut self, struct_name: &str) -> Result<(), FlatbufError> {
        let line = self.tok.line;
        let (field_count, id_count) = match self.structs.lookup(struct_name) {
            Some(sd) => (
                sd.fields.len(),
                sd.fields
                    .values()
                    .filter(|f| f.attributes.contains_key("id"))
                    .count(),
            ),
            None => (0, 0),
        };
        if field_count == 0 || id_count == 0 {
            return Ok(());
        }
        if id_count != field_count {
            return Err(FlatbufError::Parse {
                msg: "either all fields or no fields must have an 'id' attribute".to_owned(),
                line,
            });
        }
        if let Some(struct_def) = self.structs.lookup_mut(struct_name) {
            struct_def
                .fields
                .sort_by(|a, b| field_id(a).cmp(&field_id(b)));
            for i in 0..struct_def.fields.len() {
                if field_id(struct_def.fields.at(i)) != i as i64 {
                    return Err(FlatbufError::Parse {
                        msg: format!(
                            "field id's must be consecutive from 0, id {} missing or set twice",
                            i
                        ),
                        line,
                    });
                }
            }
            for i in 0..struct_def.fields.len() {
                struct_def.fields.at_mut(i).value.offset = field_index_to_offset(i as u16);
            }
        }
        Ok(())
    }

    /// Dispatches a value of any declared type, leaving the parsed scalar or
    /// the stored offset in `value.constant`.
    fn parse_any_value(
        &mut self,
        value: &mut Value,
        field: Option<&FieldDef>,
    ) -> Result<(), FlatbufError> {
        match value.type_.base_type {
            BaseType::Union => {
                let field_name = field.map(|f| f.name.clone()).unwrap_or_default();
                let tag_ok = self.field_stack.last().map_or(false, |(_, f)| {
                    f.as_ref()
                        .map_or(false, |f| f.value.type_.base_type == BaseType::UType)
                });
                if !tag_ok {
                    return Err(self.err(format!(
                        "missing type field before this union value: {}",
                        field_name
                    )));
                }
                let tag_constant = self
                    .field_stack
                    .last()
                    .map(|(v, _)| v.constant.clone())
                    .unwrap_or_default();
                let tag = self.int_constant(&tag_constant, 8)?;
                let table_name = {
                    let enum_def = match value.type_.enum_ref.as_ref().and_then(|n| self.enums.lookup(n)) {
                        Some(ed) => ed,
                        None => {
                            return Err(
                                self.err(format!("unknown union type for: {}", field_name))
                            )
                        }
                    };
                    match enum_def.reverse_lookup(tag).and_then(|ev| ev.struct_ref.clone()) {
                        Some(name) => name,
                        None => {
                            return Err(self.err(format!("illegal type id for: {}", field_name)))
                        }
                    }
                };
                value.constant = self.parse_table(&table_name)?.to_string();
            }
            BaseType::Struct => {
                let struct_name = match value.type_.struct_ref.clone() {
                    Some(name) => name,
                    None => return Err(self.err("value has no struct type")),
                };
                value.constant = self.parse_table(&struct_name)?.to_string();
            }
            BaseType::String => {
                let s = self.tok.attribute.clone();
                self.tok.expect(Token::StringConstant)?;
                value.constant = self.builder.create_string(&s).to_string();
            }
            BaseType::Vector => {
                self.tok.expect(Token::Char('['))?;
                let element_type = value.type_.vector_type();
                value.constant = self.parse_vector(&element_type)?.to_string();
            }
            _ => self.parse_single_value(value)?,
        }
        Ok(())
    }

    /// Copies a finished struct from the side stack into the buffer, in
    /// place inside the object currently being written.
    fn serialize_struct(&mut self, struct_name: &str, value: &Value) -> Result<(), FlatbufError> {
        let (bytesize, minalign) = match self.structs.lookup(struct_name) {
            Some(sd) => (sd.bytesize, sd.minalign),
            None => return Err(self.err(format!("unknown type: {}", struct_name))),
        };
        let off = string_to_int(&value.constant) as usize;
        debug_assert_eq!(self.struct_stack.len() - off, bytesize);
        self.builder.align(minalign);
        let bytes = self.struct_stack[off..].to_vec();
        self.builder.push_bytes(&bytes);
        self.struct_stack.truncate(off);
        let here = self.builder.get_size() as UOffset;
        self.builder.add_struct_offset(value.offset, here);
        Ok(())
    }

    fn emit_scalar_field(&mut self, value: &Value, field: &FieldDef) -> Result<(), FlatbufError> {
        let default = &field.value.constant;
        match value.type_.base_type {
            BaseType::None | BaseType::UType | BaseType::Bool | BaseType::UByte => {
                let v = self.int_constant(&value.constant, 8)? as u8;
                let d = self.int_constant(default, 8)? as u8;
                self.builder.add_element(value.offset, v, d);
            }
            BaseType::Byte => {
                let v = self.int_constant(&value.constant, 8)? as i8;
                let d = self.int_constant(default, 8)? as i8;
                self.builder.add_element(value.offset, v, d);
            }
            BaseType::Short => {
                let v = self.int_constant(&value.constant, 16)? as i16;
                let d = self.int_constant(default, 16)? as i16;
                self.builder.add_element(value.offset, v, d);
            }
            BaseType::UShort => {
                let v = self.int_constant(&value.constant, 16)? as u16;
                let d = self.int_constant(default, 16)? as u16;
                self.builder.add_element(value.offset, v, d);
            }
            BaseType::Int => {
                let v = self.int_constant(&value.constant, 32)? as i32;
                let d = self.int_constant(default, 32)? as i32;
                self.builder.add_element(value.offset, v, d);
            }
            BaseType::UInt => {
                let v = self.int_constant(&value.constant, 32)? as u32;
                let d = self.int_constant(default, 32)? as u32;
                self.builder.add_element(value.offset, v, d);
            }
            BaseType::Long => {
                let v = self.int_constant(&value.constant, 64)?;
                let d = self.int_constant(default, 64)?;
                self.builder.add_element(value.offset, v, d);
            }
            BaseType::ULong => {
                let v = self.int_constant(&value.constant, 64)? as u64;
                let d = self.int_constant(default, 64)? as u64;
                self.builder.add_element(value.offset, v, d);
            }
            BaseType::Float => {
                let v = string_to_float(&value.constant) as f32;
                let d = string_to_float(default) as f32;
                self.builder.add_element(value.offset, v, d);
            }
            BaseType::Double => {
                let v = string_to_float(&value.constant);
                let d = string_to_float(default);
                self.builder.add_element(value.offset, v, d);
            }
            _ => {}
        }
        Ok(())
    }

    fn push_scalar_element(&mut self, value: &Value) -> Result<(), FlatbufError> {
        match value.type_.base_type {
            BaseType::None | BaseType::UType | BaseType::Bool | BaseType::UByte => {
                let v = self.int_constant(&value.constant, 8)? as u8;
                self.builder.push_element(v);
            }
            BaseType::Byte => {
                let v = self.int_constant(&value.constant, 8)? as i8;
                self.builder.push_element(v);
            }
            BaseType::Short => {
                let v = self.int_constant(&value.constant, 16)? as i16;
                self.builder.push_element(v);
            }
            BaseType::UShort => {
                let v = self.int_constant(&value.constant, 16)? as u16;
                self.builder.push_element(v);
            }
            BaseType::Int => {
                let v = self.int_constant(&value.constant, 32)? as i32;
                self.builder.push_element(v);
            }
            BaseType::UInt => {
                let v = self.int_constant(&value.constant, 32)? as u32;
                self.builder.push_element(v);
            }
            BaseType::Long => {
                let v = self.int_constant(&value.constant, 64)?;
                self.builder.push_element(v);
            }
            BaseType::ULong => {
                let v = self.int_constant(&value.constant, 64)? as u64;
                self.builder.push_element(v);
            }
            BaseType::Float => {
                let v = string_to_float(&value.constant) as f32;
                self.builder.push_element(v);
            }
            BaseType::Double => {
                let v = string_to_float(&value.constant);
                self.builder.push_element(v);
            }
            _ => {}
        }
        Ok(())
    }

    /// Parses `'{' (key ':' value)* '}'` for the named table or struct and
    /// writes it out. Tables return their buffer position; structs are
    /// finished into `struct_stack` and return their position there, to be
    /// inlined when the containing object is written.
    fn parse_table(&mut self, struct_name: &str) -> Result<UOffset, FlatbufError> {
        let struct_def = match self.structs.lookup(struct_name) {
            Some(sd) => sd.clone(),
            None => return Err(self.err(format!("unknown type: {}", struct_name))),
        };
        self.tok.expect(Token::Char('{'))?;
        let mut fieldn = 0usize;
        if !self.tok.is_next(Token::Char('}'))? {
            loop {
                let name = self.tok.attribute.clone();
                if !self.tok.is_next(Token::StringConstant)? {
                    self.tok.expect(Token::Identifier)?;
                }
                let field = match struct_def.fields.lookup(&name) {
                    Some(field) => field.clone(),
                    None => return Err(self.err(format!("unknown field: {}", name))),
                };
                if struct_def.fixed
                    && (fieldn >= struct_def.fields.len()
                        || struct_def.fields.at(fieldn).name != name)
                {
                    return Err(self.err(format!("struct field appearing out of order: {}", name)));
                }
                self.tok.expect(Token::Char(':'))?;
                let mut value = field.value.clone();
                self.parse_any_value(&mut value, Some(&field))?;
                self.field_stack.push((value, Some(field)));
                fieldn += 1;
                if self.tok.is_next(Token::Char('}'))? {
                    break;
                }
                self.tok.expect(Token::Char(','))?;
            }
        }
        if struct_def.fixed && fieldn != struct_def.fields.len() {
            return Err(self.err(format!(
                "incomplete struct initialization: {}",
                struct_def.name
            )));
        }
        let start = if struct_def.fixed {
            self.builder.start_struct(struct_def.minalign)
        } else {
            self.builder.start_table()
        };

        // Values were parsed front to back; the buffer is written back to
        // front. When sorting by size, walk one size bucket per pass from
        // the widest scalar down; `original_order` and structs use a single
        // pass that takes everything.
        let entries = self.field_stack.split_off(self.field_stack.len() - fieldn);
        let mut size = if struct_def.sortbysize {
            LARGEST_SCALAR_SIZE
        } else {
            1
        };
        while size > 0 {
            for (value, field) in entries.iter().rev() {
                let field = match field {
                    Some(field) => field,
                    None => continue,
                };
                if field.deprecated {
                    continue;
                }
                if !struct_def.sortbysize || size == value.type_.base_type.size() {
                    self.builder.pad(field.padding);
                    match value.type_.base_type {
                        BaseType::String
                        | BaseType::Vector
                        | BaseType::Struct
                        | BaseType::Union => {
                            if self.is_struct(&field.value.type_) {
                                let nested = match field.value.type_.struct_ref.clone() {
                                    Some(name) => name,
                                    None => {
                                        return Err(self.err("struct field has no struct type"))
                                    }
                                };
                                self.serialize_struct(&nested, value)?;
                            } else {
                                let off = string_to_int(&value.constant) as UOffset;
                                self.builder.add_offset(value.offset, off);
                            }
                        }
                        _ => self.emit_scalar_field(value, field)?,
                    }
                }
            }
            size /= 2;
        }

        if struct_def.fixed {
            self.builder.clear_offsets();
            self.builder.end_struct();
            // Park the finished struct in the side stack; the parent object
            // pastes it back in place when it is written.
            let off = self.struct_stack.len() as UOffset;
            let bytes = self.builder.data()[..struct_def.bytesize].to_vec();
            self.struct_stack.extend_from_slice(&bytes);
            self.builder.pop_bytes(struct_def.bytesize);
            Ok(off)
        } else {
            Ok(self
                .builder
                .end_table(start, struct_def.fields.len() as u16))
        }
    }

    /// Parses `value (',' value)* ']'` after the opening bracket and writes
    /// the vector out back to front.
    fn parse_vector(&mut self, element_type: &Type) -> Result<UOffset, FlatbufError> {
        let mut count = 0usize;
        if self.tok.token != Token::Char(']') {
            loop {
                let mut value = Value::default();
                value.type_ = element_type.clone();
                self.parse_any_value(&mut value, None)?;
                self.field_stack.push((value, None));
                count += 1;
                if self.tok.token == Token::Char(']') {
                    break;
                }
                self.tok.expect(Token::Char(','))?;
            }
        }
        self.tok.next()?;

        let inline_size = self.inline_size(element_type);
        let inline_alignment = self.inline_alignment(element_type);
        self.builder.start_vector(count * inline_size, inline_alignment);
        let entries = self.field_stack.split_off(self.field_stack.len() - count);
        for (value, _) in entries.iter().rev() {
            match value.type_.base_type {
                BaseType::String | BaseType::Vector | BaseType::Union => {
                    let off = string_to_int(&value.constant) as UOffset;
                    self.builder.push_offset_element(off);
                }
                BaseType::Struct => {
                    if self.is_struct(&value.type_) {
                        let nested = match value.type_.struct_ref.clone() {
                            Some(name) => name,
                            None => return Err(self.err("vector element has no struct type")),
                        };
                        self.serialize_struct(&nested, value)?;
                    } else {
                        let off = string_to_int(&value.constant) as UOffset;
                        self.builder.push_offset_element(off);
                    }
                }
                _ => self.push_scalar_element(value)?,
            }
        }
        self.builder.clear_offsets();
        Ok(self.builder.end_vector(count as u32))
    }
}

impl Default for Parser {
    fn default() -> Parser {
        Parser::new()
    }
}
