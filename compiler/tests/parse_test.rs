#![cfg(test)]

use brine_flatbuf_compiler::types::BaseType;
use brine_flatbuf_compiler::Parser;
use brine_flatbuf_schema::{field_index_to_offset as fio, read_scalar, Table};

fn parse(source: &str) -> Parser {
    let mut parser = Parser::new();
    parser.parse(source).expect("parse failed");
    parser
}

fn parse_err(source: &str) -> String {
    let mut parser = Parser::new();
    parser.parse(source).expect_err("parse should fail").to_string()
}

#[test]
fn table_with_default_omits_field() {
    let p = parse("table T { a:int = 5; b:int; } root_type T; { b: 7 }");
    let root = Table::root(p.builder.data());
    // `a` was never stored, so reads fall back to the schema default.
    assert_eq!(root.field_offset(fio(0)), None);
    assert_eq!(root.get::<i32>(fio(0), 5), 5);
    assert_eq!(root.get::<i32>(fio(1), 0), 7);
}

#[test]
fn explicitly_default_value_is_also_omitted() {
    let p = parse("table T { a:int = 5; b:int; } root_type T; { a: 5, b: 7 }");
    let root = Table::root(p.builder.data());
    assert_eq!(root.field_offset(fio(0)), None);
    assert_eq!(root.get::<i32>(fio(1), 0), 7);
}

#[test]
fn struct_layout_is_aligned_and_padded() {
    let p = parse("struct S { x:byte; y:int; }");
    let s = p.structs.lookup("S").expect("S missing");
    assert_eq!(s.minalign, 4);
    assert_eq!(s.bytesize, 8);
    let x = s.fields.lookup("x").expect("x missing");
    let y = s.fields.lookup("y").expect("y missing");
    assert_eq!(x.value.offset, 0);
    assert_eq!(y.value.offset, 4);
    assert_eq!(x.padding, 3);
    assert_eq!(y.padding, 0);
}

#[test]
fn struct_layout_invariants() {
    let p = parse("struct S { a:byte; b:double; c:short; }");
    let s = p.structs.lookup("S").expect("S missing");
    assert_eq!(s.minalign, 8);
    assert_eq!(s.bytesize % s.minalign, 0);
    let mut prev_end = 0;
    for field in s.fields.values() {
        let offset = field.value.offset as usize;
        let align = field.value.type_.base_type.size();
        assert_eq!(offset % align, 0, "field {} misaligned", field.name);
        assert!(offset >= prev_end, "field {} overlaps", field.name);
        prev_end = offset + field.value.type_.base_type.size();
    }
    assert!(prev_end <= s.bytesize);
}

#[test]
fn union_discriminant_and_payload() {
    let src = "table A{} table B{} union U{A,B} table R{u:U;} root_type R; {u_type:B, u:{}}";
    let p = parse(src);
    let u = p.enums.lookup("U").expect("U missing");
    assert!(u.is_union);
    assert_eq!(u.vals.lookup("NONE").map(|v| v.value), Some(0));
    assert_eq!(u.vals.lookup("A").map(|v| v.value), Some(1));
    assert_eq!(u.vals.lookup("B").map(|v| v.value), Some(2));

    let root = Table::root(p.builder.data());
    assert_eq!(root.get::<u8>(fio(0), 0), 2);
    assert!(root.get_table(fio(1)).is_some());
}

#[test]
fn union_value_before_tag_is_rejected() {
    let src = "table A{} table B{} union U{A,B} table R{u:U;} root_type R; {u:{}, u_type:B}";
    assert_eq!(
        parse_err(src),
        "line 1: missing type field before this union value: u"
    );
}

#[test]
fn forward_references_resolve_in_either_order() {
    parse("table A{b:B;} table B{x:int;} root_type A;");
    parse("table B{x:int;} table A{b:B;} root_type A;");
    let err = parse_err("table A{b:B;} root_type A;");
    assert!(err.contains("type referenced but not defined: B"), "{}", err);
}

#[test]
fn bit_flags_remap_values_and_or_together() {
    let src = "enum E:ubyte (bit_flags) { R, G, B } table T { c:E = R; } root_type T; { c: \"R G\" }";
    let p = parse(src);
    let e = p.enums.lookup("E").expect("E missing");
    assert_eq!(e.vals.lookup("R").map(|v| v.value), Some(1));
    assert_eq!(e.vals.lookup("G").map(|v| v.value), Some(2));
    assert_eq!(e.vals.lookup("B").map(|v| v.value), Some(4));

    let root = Table::root(p.builder.data());
    assert_eq!(root.get::<u8>(fio(0), 1), 3);
}

#[test]
fn bit_flag_out_of_range_is_rejected() {
    let err = parse_err("enum E:ubyte (bit_flags) { A = 8 }");
    assert!(err.contains("bit flag out of range"), "{}", err);
}

#[test]
fn explicit_ids_reassign_vtable_slots() {
    let p = parse("table T { a:int (id:1); b:int (id:0); }");
    let t = p.structs.lookup("T").expect("T missing");
    assert_eq!(t.fields.lookup("b").map(|f| f.value.offset), Some(4));
    assert_eq!(t.fields.lookup("a").map(|f| f.value.offset), Some(6));
    // Reordering puts `b` first in the field list as well.
    assert_eq!(t.fields.at(0).name, "b");
}

#[test]
fn partial_ids_are_rejected() {
    let err = parse_err("table T { a:int (id:1); b:int; }");
    assert!(
        err.contains("either all fields or no fields must have an 'id' attribute"),
        "{}",
        err
    );
}

#[test]
fn non_contiguous_ids_are_rejected() {
    let err = parse_err("table T { a:int (id:0); b:int (id:2); }");
    assert!(err.contains("id 1 missing or set twice"), "{}", err);
}

#[test]
fn union_field_id_pins_tag_to_previous_slot() {
    let p = parse("table A{} union U{A} table T { x:int (id:0); u:U (id:2); }");
    let t = p.structs.lookup("T").expect("T missing");
    let tag = t.fields.lookup("u_type").expect("tag missing");
    assert_eq!(tag.attributes.get("id").map(|v| v.constant.as_str()), Some("1"));
    assert_eq!(t.fields.lookup("x").map(|f| f.value.offset), Some(4));
    assert_eq!(tag.value.offset, 6);
    assert_eq!(t.fields.lookup("u").map(|f| f.value.offset), Some(8));
}

#[test]
fn union_field_id_zero_is_rejected() {
    let err = parse_err("table A{} union U{A} table T { u:U (id:0); }");
    assert!(err.contains("id 0"), "{}", err);
}

#[test]
fn vtable_slots_follow_declaration_order() {
    let p = parse("table T { a:bool; b:long; c:string; d:short; }");
    let t = p.structs.lookup("T").expect("T missing");
    for (i, field) in t.fields.values().enumerate() {
        assert_eq!(field.value.offset, fio(i as u16));
    }
}

#[test]
fn whitespace_and_comments_do_not_change_the_registry() {
    let a = parse("table M { x:int = 3; y:string; }");
    let b = parse("// leading\ntable\tM // trailing\n {\r\n x : int = 3 ; // mid\n y:string;\n }");
    let a = serde_json::to_value(a.structs.lookup("M").expect("M missing")).expect("json");
    let b = serde_json::to_value(b.structs.lookup("M").expect("M missing")).expect("json");
    assert_eq!(a, b);
}

#[test]
fn doc_comments_attach_to_declarations_and_fields() {
    let p = parse("\n/// A monster.\ntable Monster {\n/// Health points.\nhp:short;\n}");
    let m = p.structs.lookup("Monster").expect("Monster missing");
    assert_eq!(m.doc_comment, " A monster.");
    assert_eq!(
        m.fields.lookup("hp").map(|f| f.doc_comment.clone()),
        Some(" Health points.".to_owned())
    );
}

#[test]
fn namespace_is_recorded() {
    let p = parse("namespace wire.test.deep; table T {}");
    assert_eq!(p.name_space, ["wire", "test", "deep"]);
}

#[test]
fn registry_accumulates_across_parse_calls() {
    let mut parser = Parser::new();
    parser.parse("table T { x:int; } root_type T;").expect("schema");
    parser.parse("{ x: 9 }").expect("object");
    let root = Table::root(parser.builder.data());
    assert_eq!(root.get::<i32>(fio(0), 0), 9);
}

#[test]
fn empty_root_object() {
    let p = parse("table T { x:int = 1; } root_type T; {}");
    let root = Table::root(p.builder.data());
    assert_eq!(root.field_offset(fio(0)), None);
    assert_eq!(root.get::<i32>(fio(0), 1), 1);
}

#[test]
fn scalar_widths_round_trip() {
    let src = "table T { a:long; b:ulong; c:double; d:ubyte; e:bool = true; } root_type T; \
               { a: -5000000000, b: 18000000000, c: 0.25, d: 255, e: false }";
    let p = parse(src);
    let root = Table::root(p.builder.data());
    assert_eq!(root.get::<i64>(fio(0), 0), -5_000_000_000);
    assert_eq!(root.get::<u64>(fio(1), 0), 18_000_000_000);
    assert_eq!(root.get::<f64>(fio(2), 0.0), 0.25);
    assert_eq!(root.get::<u8>(fio(3), 0), 255);
    assert_eq!(root.get::<u8>(fio(4), 1), 0);
}

#[test]
fn original_order_keeps_reads_identical() {
    for attr in ["", "(original_order)"] {
        let src = format!(
            "table T {} {{ a:byte; b:long; c:short; }} root_type T; {{ a: 1, b: 2, c: 3 }}",
            attr
        );
        let p = parse(&src);
        let root = Table::root(p.builder.data());
        assert_eq!(root.get::<i8>(fio(0), 0), 1);
        assert_eq!(root.get::<i64>(fio(1), 0), 2);
        assert_eq!(root.get::<i16>(fio(2), 0), 3);
    }
}

#[test]
fn vectors_of_scalars_and_strings() {
    let src = "table T { nums:[int]; names:[string]; } root_type T; \
               { nums: [1, 2, 3], names: [\"a\", \"bb\"] }";
    let p = parse(src);
    let root = Table::root(p.builder.data());
    let nums = root.get_vector(fio(0)).expect("nums missing");
    assert_eq!(nums.len(), 3);
    assert_eq!(nums.scalar_at::<i32>(0), 1);
    assert_eq!(nums.scalar_at::<i32>(1), 2);
    assert_eq!(nums.scalar_at::<i32>(2), 3);
    let names = root.get_vector(fio(1)).expect("names missing");
    assert_eq!(names.len(), 2);
    assert_eq!(names.string_at(0), "a");
    assert_eq!(names.string_at(1), "bb");
}

#[test]
fn structs_nest_inside_structs() {
    let src = "struct Inner { a:short; b:short; } struct Outer { i:Inner; c:int; } \
               table T { o:Outer; } root_type T; { o: { i: { a:1, b:2 }, c:3 } }";
    let p = parse(src);
    let outer = p.structs.lookup("Outer").expect("Outer missing");
    assert_eq!(outer.minalign, 4);
    assert_eq!(outer.bytesize, 8);

    let buf = p.builder.data();
    let root = Table::root(buf);
    let at = root.get_struct(fio(0)).expect("o missing");
    assert_eq!(read_scalar::<i16>(buf, at), 1);
    assert_eq!(read_scalar::<i16>(buf, at + 2), 2);
    assert_eq!(read_scalar::<i32>(buf, at + 4), 3);
}

#[test]
fn force_align_raises_struct_alignment() {
    let p = parse("struct S (force_align: 16) { x:int; }");
    let s = p.structs.lookup("S").expect("S missing");
    assert_eq!(s.minalign, 16);
    assert_eq!(s.bytesize, 16);

    let err = parse_err("struct S (force_align: 3) { x:int; }");
    assert!(err.contains("force_align must be a power of two"), "{}", err);
}

#[test]
fn nested_flatbuffer_attribute() {
    parse("table Inner { x:int; } table T { p:[ubyte] (nested_flatbuffer: \"Inner\"); }");
    let err = parse_err("table T { p:[ubyte] (nested_flatbuffer: \"Ghost\"); }");
    assert!(err.contains("type referenced but not defined: Ghost"), "{}", err);
    let err = parse_err("table T { p:[int] (nested_flatbuffer: \"T\"); }");
    assert!(err.contains("vector of ubyte"), "{}", err);
    let err = parse_err("table T { p:[ubyte] (nested_flatbuffer: 5); }");
    assert!(err.contains("must be a string"), "{}", err);
}

#[test]
fn qualified_enum_literal_on_integer_field() {
    let p = parse("enum E:int { A = 4 } table T { x:int; } root_type T; { x: \"E.A\" }");
    let root = Table::root(p.builder.data());
    assert_eq!(root.get::<i32>(fio(0), 0), 4);

    let err = parse_err("table T { x:int; } root_type T; { x: unqualified }");
    assert!(err.contains("qualified by an enum type"), "{}", err);
}

#[test]
fn deprecated_fields_are_not_serialized() {
    let p = parse("table T { a:int (deprecated); b:int; } root_type T; { a: 1, b: 2 }");
    let root = Table::root(p.builder.data());
    assert_eq!(root.field_offset(fio(0)), None);
    assert_eq!(root.get::<i32>(fio(1), 0), 2);
}

#[test]
fn declaration_errors() {
    assert!(parse_err("table T{} table T{}").contains("datatype already exists: T"));
    assert!(parse_err("enum E:int{A} enum E:int{B}").contains("enum already exists: E"));
    assert!(parse_err("enum E:int { A = 2, B = 1 }").contains("ascending order"));
    assert!(parse_err("enum E { A }").contains("underlying integer type"));
    assert!(parse_err("enum E:float { A }").contains("must be integral"));
    assert!(parse_err("table T { x:int; x:short; }").contains("field already exists: x"));
    assert!(parse_err("struct S { s:string; }").contains("only scalar or struct fields"));
    assert!(parse_err("struct S { x:int (deprecated); }").contains("can't deprecate"));
    assert!(parse_err("table T { v:[[int]]; }").contains("nested vector"));
    assert!(parse_err("table A{} union U{A} table T { v:[U]; }").contains("vector of union"));
    assert!(parse_err("struct S { x:int; } union U { S } table T{}")
        .contains("only tables can be union elements: S"));
}

#[test]
fn root_type_errors() {
    assert!(parse_err("root_type X;").contains("unknown root type: X"));
    assert!(parse_err("struct S { x:int; } root_type S;").contains("root type must be a table"));
    assert!(parse_err("table T{} { }").contains("no root type set"));
    assert!(parse_err("table T{x:int;} root_type T; {x:1} {x:2}")
        .contains("cannot have more than one json object"));
}

#[test]
fn value_errors() {
    assert!(parse_err("table T{x:int;} root_type T; { z: 1 }").contains("unknown field: z"));
    assert!(parse_err("table T { x:int = 1.5; }")
        .contains("type mismatch: expecting: int, found: float"));
    assert!(parse_err("table T { s:string = x; }").contains("cannot parse value starting with"));
    assert!(parse_err("enum E:int{A} table T { e:E = B; }")
        .contains("unknown enum value: B, for enum: E"));
    assert!(parse_err("table T{x:byte;} root_type T; { x: 300 }")
        .contains("constant does not fit in a 8-bit field"));
    let out_of_order = "struct S{x:int;y:int;} table T{s:S;} root_type T; {s:{y:1,x:2}}";
    assert!(parse_err(out_of_order).contains("struct field appearing out of order: y"));
    let incomplete = "struct S{x:int;y:int;} table T{s:S;} root_type T; {s:{x:1}}";
    assert!(parse_err(incomplete).contains("incomplete struct initialization: S"));
}

#[test]
fn errors_carry_line_numbers() {
    let err = parse_err("table T {\n  x:int;\n  x:short;\n}");
    assert!(err.starts_with("line 3:"), "{}", err);
}

#[test]
fn trailing_commas_in_enum_bodies() {
    let p = parse("enum E:int { A, B, }");
    assert_eq!(p.enums.lookup("E").map(|e| e.vals.len()), Some(2));
    let p = parse("table A{} table B{} union U { A, B, }");
    assert_eq!(p.enums.lookup("U").map(|e| e.vals.len()), Some(3));
}

#[test]
fn quoted_keys_in_objects() {
    let p = parse("table T { x:int; } root_type T; { \"x\": 11 }");
    let root = Table::root(p.builder.data());
    assert_eq!(root.get::<i32>(fio(0), 0), 11);
}

#[test]
fn registry_snapshot() {
    let p = parse("table T { hp:short = 100; name:string; }");
    let json = serde_json::to_value(p.structs.lookup("T").expect("T missing")).expect("json");
    assert_eq!(json["name"], "T");
    assert_eq!(json["fixed"], false);
    assert_eq!(json["fields"]["hp"]["value"]["constant"], "100");
    assert_eq!(json["fields"]["hp"]["value"]["type_"]["base_type"], "Short");
    assert_eq!(json["fields"]["name"]["value"]["type_"]["base_type"], "String");
}

#[test]
fn enum_underlying_type_refers_back() {
    let p = parse("enum E:short { A }");
    let e = p.enums.lookup("E").expect("E missing");
    assert_eq!(e.underlying_type.base_type, BaseType::Short);
    assert_eq!(e.underlying_type.enum_ref.as_deref(), Some("E"));
}

#[test]
fn full_round_trip() {
    let src = r#"
namespace wire.test;

enum Color : ubyte (bit_flags) { Red, Green, Blue }

union Any { Monster, Weapon }

struct Vec3 {
  x:float;
  y:float;
  z:float;
}

table Weapon {
  name:string;
  damage:short;
}

table Monster {
  pos:Vec3;
  mana:short = 150;
  hp:short = 100;
  name:string;
  inventory:[ubyte];
  color:Color = Blue;
  weapons:[Weapon];
  equipped:Any;
}

root_type Monster;

{
  pos: { x: 1, y: 2, z: 3 },
  hp: 80,
  name: "orc",
  inventory: [0, 1, 2, 3],
  color: "Red Blue",
  weapons: [ { name: "axe", damage: 5 }, { name: "bow", damage: 3 } ],
  equipped_type: Weapon,
  equipped: { name: "axe", damage: 5 }
}
"#;
    let p = parse(src);
    let buf = p.builder.data();
    let root = Table::root(buf);

    let pos = root.get_struct(fio(0)).expect("pos missing");
    assert_eq!(read_scalar::<f32>(buf, pos), 1.0);
    assert_eq!(read_scalar::<f32>(buf, pos + 4), 2.0);
    assert_eq!(read_scalar::<f32>(buf, pos + 8), 3.0);

    assert_eq!(root.field_offset(fio(1)), None);
    assert_eq!(root.get::<i16>(fio(1), 150), 150);
    assert_eq!(root.get::<i16>(fio(2), 100), 80);
    assert_eq!(root.get_str(fio(3)).as_deref(), Some("orc"));

    let inventory = root.get_vector(fio(4)).expect("inventory missing");
    assert_eq!(inventory.len(), 4);
    for i in 0..4 {
        assert_eq!(inventory.scalar_at::<u8>(i), i as u8);
    }

    assert_eq!(root.get::<u8>(fio(5), 4), 5);

    let weapons = root.get_vector(fio(6)).expect("weapons missing");
    assert_eq!(weapons.len(), 2);
    let axe = weapons.table_at(0);
    assert_eq!(axe.get_str(fio(0)).as_deref(), Some("axe"));
    assert_eq!(axe.get::<i16>(fio(1), 0), 5);
    let bow = weapons.table_at(1);
    assert_eq!(bow.get_str(fio(0)).as_deref(), Some("bow"));
    assert_eq!(bow.get::<i16>(fio(1), 0), 3);

    assert_eq!(root.get::<u8>(fio(7), 0), 2);
    let equipped = root.get_table(fio(8)).expect("equipped missing");
    assert_eq!(equipped.get_str(fio(0)).as_deref(), Some("axe"));
    assert_eq!(equipped.get::<i16>(fio(1), 0), 5);
}
