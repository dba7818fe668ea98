use crate::error::FlatbufError;
use crate::types::{EnumDef, StructDef, SymbolTable};

/// End-of-parse registry checks: every type referenced anywhere must have
/// been defined by now, and union members may only name tables.
pub fn verify(
    structs: &SymbolTable<StructDef>,
    enums: &SymbolTable<EnumDef>,
    line: usize,
) -> Result<(), FlatbufError> {
    for struct_def in structs.values() {
        if struct_def.predecl {
            return Err(FlatbufError::Parse {
                msg: format!("type referenced but not defined: {}", struct_def.name),
                line,
            });
        }
    }
    for enum_def in enums.values() {
        if !enum_def.is_union {
            continue;
        }
        for val in enum_def.vals.values() {
            if let Some(struct_ref) = &val.struct_ref {
                if structs.lookup(struct_ref).map_or(false, |sd| sd.fixed) {
                    return Err(FlatbufError::Parse {
                        msg: format!("only tables can be union elements: {}", val.name),
                        line,
                    });
                }
            }
        }
    }
    Ok(())
}
