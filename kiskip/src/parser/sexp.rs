use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("Unexpected end of input")]
    UnexpectedEof,
    #[error("Unexpected token at position {0}: {1}")]
    UnexpectedToken(usize, String),
    #[error("Unterminated string starting at position {0}")]
    UnterminatedString(usize),
    #[error("Trailing content at position {0}")]
    TrailingContent(usize),
}

/// One value of the nested-list format.
///
/// Bare symbols, quoted strings and numbers are kept apart so that a document
/// re-emits each token the way it was read. `Tombstone` never comes out of
/// the lexer: it marks the slot of a deleted node until the writer compacts
/// the tree.
#[derive(Debug, Clone, PartialEq)]
pub enum SExp {
    Symbol(String),
    Str(String),
    Number(f64),
    List(Vec<SExp>),
    Tombstone,
}

impl SExp {
    pub fn symbol(s: impl Into<String>) -> Self {
        SExp::Symbol(s.into())
    }

    pub fn string(s: impl Into<String>) -> Self {
        SExp::Str(s.into())
    }

    /// Text of a symbol or string atom.
    pub fn as_atom(&self) -> Option<&str> {
        match self {
            SExp::Symbol(s) | SExp::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Text of any atom, numbers rendered the way they are written out.
    pub fn as_text(&self) -> Option<String> {
        match self {
            SExp::Symbol(s) | SExp::Str(s) => Some(s.clone()),
            SExp::Number(n) => Some(format_number(*n)),
            _ => None,
        }
    }

    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            SExp::Symbol(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            SExp::Number(n) => Some(*n),
            SExp::Symbol(s) | SExp::Str(s) => s.parse::<f64>().ok().filter(|n| n.is_finite()),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[SExp]> {
        match self {
            SExp::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_list_mut(&mut self) -> Option<&mut Vec<SExp>> {
        match self {
            SExp::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, SExp::List(_))
    }

    pub fn is_tombstone(&self) -> bool {
        matches!(self, SExp::Tombstone)
    }

    /// Entity tag of a list: its first element when that is a bare symbol.
    pub fn head(&self) -> Option<&str> {
        self.as_list()
            .and_then(|items| items.first())
            .and_then(|first| first.as_symbol())
    }

    pub fn get(&self, key: &str) -> Option<&SExp> {
        if let SExp::List(items) = self {
            for item in items {
                if item.head() == Some(key) {
                    return Some(item);
                }
            }
        }
        None
    }

    pub fn get_all(&self, key: &str) -> Vec<&SExp> {
        let mut results = Vec::new();
        if let SExp::List(items) = self {
            for item in items {
                if item.head() == Some(key) {
                    results.push(item);
                }
            }
        }
        results
    }

    /// Parse a complete text holding exactly one expression.
    pub fn parse_str(input: &str) -> Result<SExp, ParseError> {
        let mut parser = SExpParser::new(input);
        let exp = parser.parse()?;
        parser.expect_end()?;
        Ok(exp)
    }
}

impl From<f64> for SExp {
    fn from(n: f64) -> Self {
        SExp::Number(n)
    }
}

impl From<&str> for SExp {
    fn from(s: &str) -> Self {
        SExp::Str(s.to_string())
    }
}

impl From<String> for SExp {
    fn from(s: String) -> Self {
        SExp::Str(s)
    }
}

/// Render a number the way KiCad writes them: no exponent, no trailing zeros.
pub fn format_number(n: f64) -> String {
    if n == 0.0 {
        return "0".to_string();
    }
    format!("{}", n)
}

pub fn quote_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            _ => out.push(ch),
        }
    }
    out.push('"');
    out
}

impl fmt::Display for SExp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SExp::Symbol(s) => write!(f, "{}", s),
            SExp::Str(s) => write!(f, "{}", quote_string(s)),
            SExp::Number(n) => write!(f, "{}", format_number(*n)),
            SExp::List(items) => {
                write!(f, "(")?;
                let mut first = true;
                for item in items.iter().filter(|i| !i.is_tombstone()) {
                    if !first {
                        write!(f, " ")?;
                    }
                    first = false;
                    write!(f, "{}", item)?;
                }
                write!(f, ")")
            }
            SExp::Tombstone => Ok(()),
        }
    }
}

/// Up to 15 significant digits always survive a trip through an `f64`.
/// Longer tokens stay symbols unless they print back unchanged; `as_number`
/// still reads them.
fn holds_exactly(token: &str, n: f64) -> bool {
    let digits = token.chars().filter(|c| c.is_ascii_digit()).count();
    digits <= 15 || format_number(n) == token.trim_start_matches('+')
}

/// Tokens that read as numbers: optional sign, digits with at most one
/// decimal point, no redundant leading zero. Anything else stays a symbol so
/// that identifiers like `00000000-0000` or `inf` survive a round trip.
fn is_numeric_literal(s: &str) -> bool {
    let body = s.strip_prefix(|c| c == '-' || c == '+').unwrap_or(s);
    if body.is_empty() {
        return false;
    }
    let (int_part, frac_part) = match body.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (body, None),
    };
    if !int_part.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    if let Some(frac) = frac_part {
        if !frac.chars().all(|c| c.is_ascii_digit()) {
            return false;
        }
        if int_part.is_empty() && frac.is_empty() {
            return false;
        }
    } else if int_part.is_empty() {
        return false;
    }
    !(int_part.len() > 1 && int_part.starts_with('0'))
}

pub struct SExpParser {
    input: Vec<char>,
    pos: usize,
}

impl SExpParser {
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            pos: 0,
        }
    }

    pub fn parse(&mut self) -> Result<SExp, ParseError> {
        self.skip_whitespace();
        if self.is_eof() {
            return Err(ParseError::UnexpectedEof);
        }
        self.parse_sexp()
    }

    /// Fails unless only whitespace remains.
    pub fn expect_end(&mut self) -> Result<(), ParseError> {
        self.skip_whitespace();
        if self.is_eof() {
            Ok(())
        } else {
            Err(ParseError::TrailingContent(self.pos))
        }
    }

    fn parse_sexp(&mut self) -> Result<SExp, ParseError> {
        self.skip_whitespace();

        if self.is_eof() {
            return Err(ParseError::UnexpectedEof);
        }

        match self.peek() {
            '(' => self.parse_list(),
            ')' => Err(ParseError::UnexpectedToken(self.pos, ")".to_string())),
            _ => self.parse_atom(),
        }
    }

    fn parse_list(&mut self) -> Result<SExp, ParseError> {
        self.expect_char('(')?;
        let mut items = Vec::new();

        loop {
            self.skip_whitespace();

            if self.is_eof() {
                return Err(ParseError::UnexpectedEof);
            }

            if self.peek() == ')' {
                self.advance();
                break;
            }

            items.push(self.parse_sexp()?);
        }

        Ok(SExp::List(items))
    }

    fn parse_atom(&mut self) -> Result<SExp, ParseError> {
        self.skip_whitespace();

        if self.peek() == '"' {
            self.parse_string()
        } else {
            self.parse_symbol()
        }
    }

    fn parse_string(&mut self) -> Result<SExp, ParseError> {
        let start = self.pos;
        self.expect_char('"')?;
        let mut s = String::new();
        let mut escaped = false;

        while !self.is_eof() {
            let ch = self.peek();

            if escaped {
                match ch {
                    'n' => s.push('\n'),
                    't' => s.push('\t'),
                    'r' => s.push('\r'),
                    '\\' => s.push('\\'),
                    '"' => s.push('"'),
                    _ => s.push(ch),
                }
                escaped = false;
                self.advance();
            } else if ch == '\\' {
                escaped = true;
                self.advance();
            } else if ch == '"' {
                self.advance();
                return Ok(SExp::Str(s));
            } else {
                s.push(ch);
                self.advance();
            }
        }

        Err(ParseError::UnterminatedString(start))
    }

    fn parse_symbol(&mut self) -> Result<SExp, ParseError> {
        let start = self.pos;
        let mut s = String::new();

        while !self.is_eof() {
            let ch = self.peek();
            if ch.is_whitespace() || ch == '(' || ch == ')' || ch == '"' {
                break;
            }
            s.push(ch);
            self.advance();
        }

        if s.is_empty() {
            return Err(ParseError::UnexpectedToken(start, "empty symbol".to_string()));
        }

        if is_numeric_literal(&s) {
            if let Ok(n) = s.parse::<f64>() {
                if holds_exactly(&s, n) {
                    return Ok(SExp::Number(n));
                }
            }
        }
        Ok(SExp::Symbol(s))
    }

    fn skip_whitespace(&mut self) {
        while !self.is_eof() && self.peek().is_whitespace() {
            self.advance();
        }
    }

    fn peek(&self) -> char {
        if self.pos < self.input.len() {
            self.input[self.pos]
        } else {
            '\0'
        }
    }

    fn advance(&mut self) {
        if self.pos < self.input.len() {
            self.pos += 1;
        }
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn expect_char(&mut self, expected: char) -> Result<(), ParseError> {
        if self.is_eof() {
            return Err(ParseError::UnexpectedEof);
        }

        let ch = self.peek();
        if ch == expected {
            self.advance();
            Ok(())
        } else {
            Err(ParseError::UnexpectedToken(
                self.pos,
                format!("Expected '{}', found '{}'", expected, ch),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_symbol() {
        let mut parser = SExpParser::new("hello");
        let result = parser.parse().unwrap();
        assert_eq!(result, SExp::Symbol("hello".to_string()));
    }

    #[test]
    fn test_parse_string() {
        let mut parser = SExpParser::new("\"hello world\"");
        let result = parser.parse().unwrap();
        assert_eq!(result, SExp::Str("hello world".to_string()));
    }

    #[test]
    fn test_parse_numbers() {
        let result = SExp::parse_str("(at 25.4 -3.81 90)").unwrap();
        let items = result.as_list().unwrap();
        assert_eq!(items[0], SExp::Symbol("at".to_string()));
        assert_eq!(items[1], SExp::Number(25.4));
        assert_eq!(items[2], SExp::Number(-3.81));
        assert_eq!(items[3], SExp::Number(90.0));
    }

    #[test]
    fn test_identifier_like_tokens_stay_symbols() {
        let result = SExp::parse_str("(tstamp 0012 inf 5ab3-77 -)").unwrap();
        let items = result.as_list().unwrap();
        assert_eq!(items[1], SExp::Symbol("0012".to_string()));
        assert_eq!(items[2], SExp::Symbol("inf".to_string()));
        assert_eq!(items[3], SExp::Symbol("5ab3-77".to_string()));
        assert_eq!(items[4], SExp::Symbol("-".to_string()));
    }

    #[test]
    fn test_wide_integers_keep_their_digits() {
        let text = "(root (id 12345678901234567891) (width 0.254))";
        let result = SExp::parse_str(text).unwrap();
        let id = &result.get("id").unwrap().as_list().unwrap()[1];
        assert_eq!(id, &SExp::Symbol("12345678901234567891".to_string()));
        assert!(id.as_number().is_some());
        let width = &result.get("width").unwrap().as_list().unwrap()[1];
        assert_eq!(width, &SExp::Number(0.254));
        assert_eq!(result.to_string(), text);
    }

    #[test]
    fn test_parse_nested() {
        let mut parser = SExpParser::new("(a (b c) d)");
        let result = parser.parse().unwrap();
        if let SExp::List(items) = result {
            assert_eq!(items.len(), 3);
            assert_eq!(items[0], SExp::Symbol("a".to_string()));
            if let SExp::List(nested) = &items[1] {
                assert_eq!(nested.len(), 2);
            } else {
                panic!("Expected nested list");
            }
        } else {
            panic!("Expected list");
        }
    }

    #[test]
    fn test_string_escapes_round_trip() {
        let exp = SExp::parse_str(r#"(text "say \"hi\"\nbye")"#).unwrap();
        let items = exp.as_list().unwrap();
        assert_eq!(items[1], SExp::Str("say \"hi\"\nbye".to_string()));
        assert_eq!(exp.to_string(), r#"(text "say \"hi\"\nbye")"#);
    }

    #[test]
    fn test_errors() {
        assert_eq!(SExp::parse_str("(a b"), Err(ParseError::UnexpectedEof));
        assert_eq!(SExp::parse_str("(a \"b)"), Err(ParseError::UnterminatedString(3)));
        assert_eq!(SExp::parse_str("(a) (b)"), Err(ParseError::TrailingContent(4)));
        assert!(matches!(SExp::parse_str(")"), Err(ParseError::UnexpectedToken(0, _))));
    }

    #[test]
    fn test_get() {
        let sexp = SExp::parse_str("(symbol (lib_id \"Device:R\") (at 1 2 0))").unwrap();
        let lib_id = sexp.get("lib_id").unwrap();
        assert_eq!(lib_id.as_list().unwrap()[1].as_atom(), Some("Device:R"));
        assert!(sexp.get("uuid").is_none());
    }

    #[test]
    fn test_display_skips_tombstones() {
        let exp = SExp::List(vec![
            SExp::symbol("a"),
            SExp::Tombstone,
            SExp::Number(1.5),
        ]);
        assert_eq!(exp.to_string(), "(a 1.5)");
    }
}
