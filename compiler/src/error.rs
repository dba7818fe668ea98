use thiserror::Error;

#[derive(Debug, Error)]
pub enum FlatbufError {
    /// Any failure while parsing a schema or object literal. The first error
    /// aborts the parse; `line` is where the cursor stood when it was raised.
    #[error("line {line}: {msg}")]
    Parse { msg: String, line: usize },
}
