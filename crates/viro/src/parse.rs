//! The reader: source text to `Block` values.
//!
//! viro is homoiconic, so parsing produces ordinary runtime values: a block
//! whose elements are the top-level expressions, each tagged with its source
//! position (line/column) for diagnostics. The reader knows nothing about
//! evaluation; `fn`, `object`, datatype words, and the rest are plain words
//! here.
//!
//! Surface syntax: integers, decimals (`1.5`), quoted strings with caret
//! escapes, `#{..}` binary, `[block]`, `(paren)`, `word`, `word:`, `:word`,
//! `'word`, `--word` refinement words, `a/b/c` paths, and `;` line comments.

use std::fmt;

use crate::{
    error::CodeLoc,
    heap::{BlockBuf, Heap},
    intern::Interns,
    value::Value,
};

/// A syntax error with its source position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ParseError {
    pub message: String,
    pub loc: CodeLoc,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{message} at {loc}", message = self.message, loc = self.loc)
    }
}

/// Parses source text into a block value holding the top-level expressions.
pub(crate) fn parse_source(source: &str, heap: &mut Heap, interns: &mut Interns) -> Result<Value, ParseError> {
    let mut parser = Parser {
        src: source.chars().collect(),
        pos: 0,
        line: 1,
        column: 1,
        heap,
        interns,
    };
    let (values, locs) = parser.parse_elements(None)?;
    Ok(parser.heap.alloc_block(BlockBuf::with_locs(values, locs)))
}

const OPERATOR_CHARS: &str = "+-*/=<>";

fn is_word_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_word_continue(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '-' | '_' | '?' | '!')
}

struct Parser<'a> {
    src: Vec<char>,
    pos: usize,
    line: u32,
    column: u32,
    heap: &'a mut Heap,
    interns: &'a mut Interns,
}

impl Parser<'_> {
    fn peek(&self) -> Option<char> {
        self.src.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.src.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn loc(&self) -> CodeLoc {
        CodeLoc {
            line: self.line,
            column: self.column,
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            message: message.into(),
            loc: self.loc(),
        }
    }

    fn skip_blanks(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.advance();
                }
                Some(';') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    /// Parses elements until `terminator` (or end of input when `None`).
    fn parse_elements(&mut self, terminator: Option<char>) -> Result<(Vec<Value>, Vec<CodeLoc>), ParseError> {
        let mut values = Vec::new();
        let mut locs = Vec::new();
        loop {
            self.skip_blanks();
            match self.peek() {
                None => {
                    if let Some(t) = terminator {
                        return Err(self.error(format!("missing closing {t}")));
                    }
                    return Ok((values, locs));
                }
                Some(c) if Some(c) == terminator => {
                    self.advance();
                    return Ok((values, locs));
                }
                Some(c @ (']' | ')')) => {
                    return Err(self.error(format!("unexpected {c}")));
                }
                Some(_) => {
                    let loc = self.loc();
                    let value = self.parse_element()?;
                    values.push(value);
                    locs.push(loc);
                }
            }
        }
    }

    fn parse_element(&mut self) -> Result<Value, ParseError> {
        match self.peek().expect("parse_element called at end of input") {
            '[' => {
                self.advance();
                let (values, locs) = self.parse_elements(Some(']'))?;
                Ok(self.heap.alloc_block(BlockBuf::with_locs(values, locs)))
            }
            '(' => {
                self.advance();
                let (values, locs) = self.parse_elements(Some(')'))?;
                Ok(self.heap.alloc_paren(BlockBuf::with_locs(values, locs)))
            }
            '"' => self.parse_string(),
            '#' if self.peek_at(1) == Some('{') => self.parse_binary(),
            '\'' => {
                self.advance();
                let word = self.parse_word_text()?;
                Ok(Value::LitWord(self.interns.intern(&word)))
            }
            ':' => {
                self.advance();
                let word = self.parse_word_text()?;
                Ok(Value::GetWord(self.interns.intern(&word)))
            }
            c if c.is_ascii_digit() => self.parse_number(),
            '+' | '-' if self.peek_at(1).is_some_and(|d| d.is_ascii_digit()) => self.parse_number(),
            '-' if self.peek_at(1) == Some('-') && self.peek_at(2).is_some_and(is_word_continue) => {
                // Refinement word: `--name`.
                self.advance();
                self.advance();
                let rest = self.parse_word_text()?;
                Ok(Value::Word(self.interns.intern(&format!("--{rest}"))))
            }
            c if OPERATOR_CHARS.contains(c) => {
                let mut text = String::new();
                while let Some(c) = self.peek() {
                    if OPERATOR_CHARS.contains(c) {
                        text.push(c);
                        self.advance();
                    } else {
                        break;
                    }
                }
                Ok(Value::Word(self.interns.intern(&text)))
            }
            c if is_word_start(c) => {
                let word = self.parse_word_text()?;
                match self.peek() {
                    Some(':') => {
                        self.advance();
                        Ok(Value::SetWord(self.interns.intern(&word)))
                    }
                    Some('/') => self.parse_path(word),
                    _ => Ok(Value::Word(self.interns.intern(&word))),
                }
            }
            c => Err(self.error(format!("unexpected character {c:?}"))),
        }
    }

    fn parse_word_text(&mut self) -> Result<String, ParseError> {
        let mut text = String::new();
        match self.peek() {
            Some(c) if is_word_start(c) => {
                text.push(c);
                self.advance();
            }
            _ => return Err(self.error("expected a word")),
        }
        while let Some(c) = self.peek() {
            if is_word_continue(c) {
                text.push(c);
                self.advance();
            } else {
                break;
            }
        }
        Ok(text)
    }

    /// Continues a path after its head word: `head/segment/...`.
    fn parse_path(&mut self, head: String) -> Result<Value, ParseError> {
        let mut segments = vec![Value::Word(self.interns.intern(&head))];
        while self.peek() == Some('/') {
            self.advance();
            match self.peek() {
                Some(c) if c.is_ascii_digit() => {
                    let Value::Int(index) = self.parse_number()? else {
                        return Err(self.error("path index must be an integer"));
                    };
                    segments.push(Value::Int(index));
                }
                Some(c) if is_word_start(c) => {
                    let word = self.parse_word_text()?;
                    segments.push(Value::Word(self.interns.intern(&word)));
                }
                _ => return Err(self.error("expected a path segment")),
            }
        }
        Ok(self.heap.alloc_path(segments))
    }

    fn parse_number(&mut self) -> Result<Value, ParseError> {
        let mut text = String::new();
        if matches!(self.peek(), Some('+' | '-')) {
            text.push(self.advance().expect("sign present"));
        }
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                text.push(c);
                self.advance();
            } else {
                break;
            }
        }
        // A dot followed by a digit (or a terminating dot) makes a decimal.
        if self.peek() == Some('.') && self.peek_at(1).is_none_or(|c| c.is_ascii_digit() || !is_word_continue(c)) {
            text.push('.');
            self.advance();
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() {
                    text.push(c);
                    self.advance();
                } else {
                    break;
                }
            }
            let decimal = crate::decimal::Decimal::parse(&text)
                .ok_or_else(|| self.error(format!("invalid decimal literal {text}")))?;
            return Ok(self.heap.alloc_decimal(decimal));
        }
        let value: i64 = text
            .parse()
            .map_err(|_| self.error(format!("invalid integer literal {text}")))?;
        Ok(Value::Int(value))
    }

    fn parse_string(&mut self) -> Result<Value, ParseError> {
        self.advance(); // opening quote
        let mut text = String::new();
        loop {
            match self.advance() {
                None => return Err(self.error("unterminated string")),
                Some('"') => break,
                Some('^') => match self.advance() {
                    Some('"') => text.push('"'),
                    Some('^') => text.push('^'),
                    Some('/') => text.push('\n'),
                    Some('-') => text.push('\t'),
                    Some('(') => {
                        let mut hex = String::new();
                        loop {
                            match self.advance() {
                                Some(')') => break,
                                Some(c) if c.is_ascii_hexdigit() => hex.push(c),
                                _ => return Err(self.error("invalid ^( escape")),
                            }
                        }
                        let code = u32::from_str_radix(&hex, 16).map_err(|_| self.error("invalid ^( escape"))?;
                        let c = char::from_u32(code).ok_or_else(|| self.error("invalid ^( escape"))?;
                        text.push(c);
                    }
                    Some(other) => return Err(self.error(format!("unknown escape ^{other}"))),
                    None => return Err(self.error("unterminated string")),
                },
                Some(c) => text.push(c),
            }
        }
        Ok(self.heap.alloc_string(text))
    }

    fn parse_binary(&mut self) -> Result<Value, ParseError> {
        self.advance(); // '#'
        self.advance(); // '{'
        let mut hex = String::new();
        loop {
            match self.advance() {
                None => return Err(self.error("unterminated binary literal")),
                Some('}') => break,
                Some(c) if c.is_ascii_hexdigit() => hex.push(c),
                Some(c) if c.is_whitespace() => {}
                Some(c) => return Err(self.error(format!("invalid character {c:?} in binary literal"))),
            }
        }
        if hex.len() % 2 != 0 {
            return Err(self.error("binary literal needs an even number of hex digits"));
        }
        let bytes: Vec<u8> = hex
            .as_bytes()
            .chunks(2)
            .map(|pair| {
                let text = std::str::from_utf8(pair).expect("hex digits are ascii");
                u8::from_str_radix(text, 16).expect("checked hex digits")
            })
            .collect();
        Ok(self.heap.alloc_binary(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        frame::Frames,
        value::mold,
    };

    fn parse_mold(source: &str) -> String {
        let mut heap = Heap::new();
        let mut interns = Interns::new();
        let frames = Frames::new();
        let block = parse_source(source, &mut heap, &mut interns).expect("source parses");
        mold(&block, &heap, &frames, &interns)
    }

    /// The reader round-trips representative programs through mold.
    #[test]
    fn mold_round_trip() {
        assert_eq!(parse_mold("3 + 4 * 2"), "[3 + 4 * 2]");
        assert_eq!(parse_mold("x: 10 y: x + 5"), "[x: 10 y: x + 5]");
        assert_eq!(parse_mold("greet \"a\" --shout"), "[greet \"a\" --shout]");
        assert_eq!(parse_mold("loop 3 [r: r + 1]"), "[loop 3 [r: r + 1]]");
        assert_eq!(parse_mold("get 'x :y 'z"), "[get 'x :y 'z]");
        assert_eq!(parse_mold("a/b/2"), "[a/b/2]");
        assert_eq!(parse_mold("compose [a (a * 2)]"), "[compose [a (a * 2)]]");
    }

    /// Numbers: integers, negatives, decimals.
    #[test]
    fn numbers() {
        assert_eq!(parse_mold("42 -7 1.5 -0.25"), "[42 -7 1.5 -0.25]");
    }

    /// Comments run to end of line and produce nothing.
    #[test]
    fn comments_are_skipped() {
        assert_eq!(parse_mold("1 ; ignored\n2"), "[1 2]");
    }

    /// String escapes use carets.
    #[test]
    fn string_escapes() {
        let mut heap = Heap::new();
        let mut interns = Interns::new();
        let frames = Frames::new();
        let block = parse_source("\"a^/b^-c^\"d^^\"", &mut heap, &mut interns).unwrap();
        let molded = mold(&block, &heap, &frames, &interns);
        assert_eq!(molded, "[\"a^/b^-c^\"d^^\"]");
    }

    /// Binary literals accept spaced hex pairs.
    #[test]
    fn binary_literals() {
        assert_eq!(parse_mold("#{DE AD BE EF}"), "[#{DEADBEEF}]");
        let mut heap = Heap::new();
        let mut interns = Interns::new();
        assert!(parse_source("#{ABC}", &mut heap, &mut interns).is_err());
    }

    /// Operator words lex greedily; words carry ? and ! endings.
    #[test]
    fn operator_and_question_words() {
        assert_eq!(parse_mold("1 <= 2 <> 3"), "[1 <= 2 <> 3]");
        assert_eq!(parse_mold("length? empty? object!"), "[length? empty? object!]");
    }

    /// Unclosed delimiters report positions.
    #[test]
    fn errors_carry_positions() {
        let mut heap = Heap::new();
        let mut interns = Interns::new();
        let err = parse_source("[1 2", &mut heap, &mut interns).unwrap_err();
        assert!(err.message.contains("missing closing"));
        let err = parse_source("\n  )", &mut heap, &mut interns).unwrap_err();
        assert_eq!(err.loc.line, 2);
    }

    /// Per-element source locations are recorded on the top-level block.
    #[test]
    fn element_locations() {
        let mut heap = Heap::new();
        let mut interns = Interns::new();
        let block = parse_source("one\n  two", &mut heap, &mut interns).unwrap();
        let Value::Ref(id) = &block else { panic!("expected ref") };
        let crate::heap::HeapData::Block(handle) = heap.get(*id) else {
            panic!("expected block");
        };
        let crate::heap::HeapData::BlockBuf(buf) = heap.get(handle.buf) else {
            panic!("expected buffer");
        };
        assert_eq!(buf.loc_at(0), Some(CodeLoc { line: 1, column: 1 }));
        assert_eq!(buf.loc_at(1), Some(CodeLoc { line: 2, column: 3 }));
    }
}
