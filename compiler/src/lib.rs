//! brine-flatbuf-compiler
//!
//! This crate implements:
//!  1) A tokenizer for the IDL (tables, structs, enums, unions, namespaces,
//!     object literals, doc comments),
//!  2) A recursive-descent schema parser building a registry that supports
//!     forward references through pre-declared placeholders,
//!  3) A value parser that serializes the single root object literal through
//!     the backwards `brine_flatbuf_schema::Builder`,
//!  4) A post-parse verifier, and error types (`FlatbufError`).
//!
//! ```
//! use brine_flatbuf_compiler::Parser;
//! use brine_flatbuf_schema::{field_index_to_offset, Table};
//!
//! let mut parser = Parser::new();
//! parser
//!     .parse("table Point { x:int; y:int; } root_type Point; { x: 3, y: 4 }")
//!     .expect("parse failed");
//!
//! let root = Table::root(parser.builder.data());
//! assert_eq!(root.get::<i32>(field_index_to_offset(0), 0), 3);
//! assert_eq!(root.get::<i32>(field_index_to_offset(1), 0), 4);
//! ```

pub mod error;
pub mod parser;
pub mod tokenizer;
pub mod types;
pub mod verifier;

pub use error::FlatbufError;
pub use parser::Parser;
