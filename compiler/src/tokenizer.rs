use std::collections::HashMap;
use std::fmt;

use lazy_static::lazy_static;

use crate::error::FlatbufError;
use crate::types::BaseType;

/// One lexical token. Single-character punctuation is carried as the
/// character itself; literal and identifier text lands in
/// [`Tokenizer::attribute`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Eof,
    Char(char),
    StringConstant,
    IntegerConstant,
    FloatConstant,
    Identifier,
    Table,
    Struct,
    Enum,
    Union,
    Namespace,
    RootType,
    TypeName(BaseType),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Eof => write!(f, "end of file"),
            Token::Char(c) => write!(f, "{}", c),
            Token::StringConstant => write!(f, "string constant"),
            Token::IntegerConstant => write!(f, "integer constant"),
            Token::FloatConstant => write!(f, "float constant"),
            Token::Identifier => write!(f, "identifier"),
            Token::Table => write!(f, "table"),
            Token::Struct => write!(f, "struct"),
            Token::Enum => write!(f, "enum"),
            Token::Union => write!(f, "union"),
            Token::Namespace => write!(f, "namespace"),
            Token::RootType => write!(f, "root_type"),
            Token::TypeName(bt) => write!(f, "{}", bt.idl_name()),
        }
    }
}

lazy_static! {
    static ref KEYWORDS: HashMap<&'static str, Token> = {
        let mut m = HashMap::new();
        for bt in BaseType::lexable() {
            m.insert(bt.idl_name(), Token::TypeName(*bt));
        }
        m.insert("table", Token::Table);
        m.insert("struct", Token::Struct);
        m.insert("enum", Token::Enum);
        m.insert("union", Token::Union);
        m.insert("namespace", Token::Namespace);
        m.insert("root_type", Token::RootType);
        m
    };
}

/// Single-character-lookahead tokenizer over one source text.
///
/// `next` advances `token` and, when the token carries text, `attribute`.
/// `///` comments found on their own line accumulate into `doc_comment`,
/// which is cleared on every fetch so it always belongs to the current token.
pub struct Tokenizer {
    src: Vec<u8>,
    cursor: usize,
    pub line: usize,
    pub token: Token,
    pub attribute: String,
    pub doc_comment: String,
}

impl Tokenizer {
    pub fn new(source: &str) -> Tokenizer {
        Tokenizer {
            src: source.as_bytes().to_vec(),
            cursor: 0,
            line: 1,
            token: Token::Eof,
            attribute: String::new(),
            doc_comment: String::new(),
        }
    }

    fn err(&self, msg: impl Into<String>) -> FlatbufError {
        FlatbufError::Parse {
            msg: msg.into(),
            line: self.line,
        }
    }

    fn peek(&self) -> u8 {
        self.src.get(self.cursor).copied().unwrap_or(0)
    }

    /// Advances to the next token, skipping whitespace and comments.
    pub fn next(&mut self) -> Result<(), FlatbufError> {
        self.doc_comment.clear();
        let mut seen_newline = false;
        loop {
            let c = match self.src.get(self.cursor).copied() {
                None => {
                    self.token = Token::Eof;
                    return Ok(());
                }
                Some(c) => c,
            };
            self.cursor += 1;
            match c {
                b' ' | b'\r' | b'\t' => {}
                b'\n' => {
                    self.line += 1;
                    seen_newline = true;
                }
                b'{' | b'}' | b'(' | b')' | b'[' | b']' | b',' | b':' | b';' | b'=' => {
                    self.token = Token::Char(c as char);
                    return Ok(());
                }
                b'.' => {
                    if !self.peek().is_ascii_digit() {
                        self.token = Token::Char('.');
                        return Ok(());
                    }
                    return Err(self.err("floating point constant can't start with \".\""));
                }
                b'"' => return self.scan_string(),
                b'/' if self.peek() == b'/' => {
                    self.cursor += 1;
                    let start = self.cursor;
                    while self.cursor < self.src.len() && self.src[self.cursor] != b'\n' {
                        self.cursor += 1;
                    }
                    if self.src.get(start) == Some(&b'/') {
                        if !seen_newline {
                            return Err(
                                self.err("a documentation comment should be on a line on its own")
                            );
                        }
                        self.doc_comment
                            .push_str(&String::from_utf8_lossy(&self.src[start + 1..self.cursor]));
                    }
                }
                _ if c.is_ascii_alphabetic() => return self.scan_ident(),
                _ if c.is_ascii_digit() || c == b'-' => return self.scan_number(),
                _ => {
                    let ch = if (b' '..=b'~').contains(&c) {
                        (c as char).to_string()
                    } else {
                        format!("code: {}", c)
                    };
                    return Err(self.err(format!("illegal character: {}", ch)));
                }
            }
        }
    }

    fn scan_string(&mut self) -> Result<(), FlatbufError> {
        let mut bytes = Vec::new();
        loop {
            let c = self.peek();
            if c == b'"' {
                self.cursor += 1;
                break;
            }
            // Control characters are out, and so is running off the end of
            // the source. Bytes >= 0x20 pass through, UTF-8 included.
            if c < b' ' {
                return Err(self.err("illegal character in string constant"));
            }
            if c == b'\\' {
                self.cursor += 1;
                match self.peek() {
                    b'n' => bytes.push(b'\n'),
                    b't' => bytes.push(b'\t'),
                    b'r' => bytes.push(b'\r'),
                    b'"' => bytes.push(b'"'),
                    b'\\' => bytes.push(b'\\'),
                    _ => return Err(self.err("unknown escape code in string constant")),
                }
                self.cursor += 1;
            } else {
                bytes.push(c);
                self.cursor += 1;
            }
        }
        self.attribute = String::from_utf8_lossy(&bytes).into_owned();
        self.token = Token::StringConstant;
        Ok(())
    }

    fn scan_ident(&mut self) -> Result<(), FlatbufError> {
        let start = self.cursor - 1;
        while self.peek().is_ascii_alphanumeric() || self.peek() == b'_' {
            self.cursor += 1;
        }
        let text = String::from_utf8_lossy(&self.src[start..self.cursor]).into_owned();
        if let Some(token) = KEYWORDS.get(text.as_str()) {
            self.attribute = text;
            self.token = token.clone();
            return Ok(());
        }
        // Boolean constants become integers, which simplifies everything
        // downstream.
        if text == "true" || text == "false" {
            self.attribute = if text == "true" { "1" } else { "0" }.to_owned();
            self.token = Token::IntegerConstant;
            return Ok(());
        }
        self.attribute = text;
        self.token = Token::Identifier;
        Ok(())
    }

    fn scan_number(&mut self) -> Result<(), FlatbufError> {
        let start = self.cursor - 1;
        while self.peek().is_ascii_digit() {
            self.cursor += 1;
        }
        if self.peek() == b'.' {
            self.cursor += 1;
            while self.peek().is_ascii_digit() {
                self.cursor += 1;
            }
            // Scientific notation is only recognized after a decimal point.
            if self.peek() == b'e' || self.peek() == b'E' {
                self.cursor += 1;
                if self.peek() == b'+' || self.peek() == b'-' {
                    self.cursor += 1;
                }
                while self.peek().is_ascii_digit() {
                    self.cursor += 1;
                }
            }
            self.token = Token::FloatConstant;
        } else {
            self.token = Token::IntegerConstant;
        }
        self.attribute = String::from_utf8_lossy(&self.src[start..self.cursor]).into_owned();
        Ok(())
    }

    /// Consumes the token if it is `t`; reports whether it did.
    pub fn is_next(&mut self, t: Token) -> Result<bool, FlatbufError> {
        if t == self.token {
            self.next()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Consumes the token `t` or fails naming both sides.
    pub fn expect(&mut self, t: Token) -> Result<(), FlatbufError> {
        if t != self.token {
            return Err(self.err(format!("expecting: {} instead got: {}", t, self.token)));
        }
        self.next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_tokens(source: &str) -> Vec<Token> {
        let mut t = Tokenizer::new(source);
        let mut out = Vec::new();
        loop {
            t.next().expect("next failed");
            out.push(t.token.clone());
            if t.token == Token::Eof {
                return out;
            }
        }
    }

    #[test]
    fn tokenize_declaration() {
        assert_eq!(
            all_tokens("table T { x:int; }"),
            vec![
                Token::Table,
                Token::Identifier,
                Token::Char('{'),
                Token::Identifier,
                Token::Char(':'),
                Token::TypeName(BaseType::Int),
                Token::Char(';'),
                Token::Char('}'),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn booleans_become_integers() {
        let mut t = Tokenizer::new("true false");
        t.next().expect("next failed");
        assert_eq!(t.token, Token::IntegerConstant);
        assert_eq!(t.attribute, "1");
        t.next().expect("next failed");
        assert_eq!(t.token, Token::IntegerConstant);
        assert_eq!(t.attribute, "0");
    }

    #[test]
    fn numeric_literals() {
        let mut t = Tokenizer::new("-5 3.25 1.0e-3 700");
        t.next().expect("next failed");
        assert_eq!((t.token.clone(), t.attribute.clone()), (Token::IntegerConstant, "-5".to_owned()));
        t.next().expect("next failed");
        assert_eq!((t.token.clone(), t.attribute.clone()), (Token::FloatConstant, "3.25".to_owned()));
        t.next().expect("next failed");
        assert_eq!((t.token.clone(), t.attribute.clone()), (Token::FloatConstant, "1.0e-3".to_owned()));
        t.next().expect("next failed");
        assert_eq!((t.token.clone(), t.attribute.clone()), (Token::IntegerConstant, "700".to_owned()));
    }

    #[test]
    fn float_may_not_start_with_dot() {
        let mut t = Tokenizer::new(".5");
        let err = t.next().expect_err("should fail");
        assert_eq!(err.to_string(), "line 1: floating point constant can't start with \".\"");
    }

    #[test]
    fn string_escapes() {
        let mut t = Tokenizer::new(r#""a\n\t\"b\\" "#);
        t.next().expect("next failed");
        assert_eq!(t.token, Token::StringConstant);
        assert_eq!(t.attribute, "a\n\t\"b\\");
    }

    #[test]
    fn string_keeps_utf8() {
        let mut t = Tokenizer::new("\"🍕\"");
        t.next().expect("next failed");
        assert_eq!(t.attribute, "🍕");
    }

    #[test]
    fn bad_escape_rejected() {
        let mut t = Tokenizer::new(r#""\q""#);
        let err = t.next().expect_err("should fail");
        assert!(err.to_string().contains("unknown escape code"));
    }

    #[test]
    fn unterminated_string_rejected() {
        let mut t = Tokenizer::new("\"abc");
        assert!(t.next().is_err());
    }

    #[test]
    fn doc_comments_accumulate() {
        let mut t = Tokenizer::new("\n/// one\n/// two\ntable");
        t.next().expect("next failed");
        assert_eq!(t.token, Token::Table);
        assert_eq!(t.doc_comment, " one two");
    }

    #[test]
    fn doc_comment_must_own_its_line() {
        let mut t = Tokenizer::new("table /// nope\n");
        t.next().expect("next failed");
        let err = t.next().expect_err("should fail");
        assert!(err.to_string().contains("on a line on its own"));
    }

    #[test]
    fn plain_comments_are_skipped() {
        assert_eq!(
            all_tokens("// header\nenum // trailing\n"),
            vec![Token::Enum, Token::Eof]
        );
    }

    #[test]
    fn line_numbers_advance() {
        let mut t = Tokenizer::new("a\nb\n\nc");
        t.next().expect("next failed");
        assert_eq!(t.line, 1);
        t.next().expect("next failed");
        assert_eq!(t.line, 2);
        t.next().expect("next failed");
        assert_eq!(t.line, 4);
    }

    #[test]
    fn illegal_characters() {
        let mut t = Tokenizer::new("@");
        assert_eq!(
            t.next().expect_err("should fail").to_string(),
            "line 1: illegal character: @"
        );
        let mut t = Tokenizer::new("\u{1}");
        assert_eq!(
            t.next().expect_err("should fail").to_string(),
            "line 1: illegal character: code: 1"
        );
    }

    #[test]
    fn expect_reports_both_tokens() {
        let mut t = Tokenizer::new("table");
        t.next().expect("next failed");
        let err = t.expect(Token::Identifier).expect_err("should fail");
        assert_eq!(err.to_string(), "line 1: expecting: identifier instead got: table");
    }
}
