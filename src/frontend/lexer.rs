//! Lexer for minicc
//!
//! Converts source text into a stream of tokens. The lexer never fails:
//! anything it cannot make sense of becomes a degraded or `Unknown` token and
//! is left for the parser to reject.

use log::{debug, warn};

use crate::frontend::token::{KindTable, Token, TokenKind, OPERATORS};
use crate::utils::{Coordinates, Error, Result};

const SIMPLE_ESCAPES: &[char] = &['\'', '"', '?', '\\', 'a', 'b', 'f', 'n', 'r', 't', 'v'];
const RAW_PREFIXES: &[&str] = &["u8R\"", "uR\"", "UR\"", "LR\"", "R\""];
const ENCODING_PREFIXES: &[&str] = &["u8", "u", "U", "L"];
const MAX_RAW_DELIMITER: usize = 16;

/// The lexer state
pub struct Lexer {
    source: Vec<char>,
    line_count: usize,
    /// Current position in source
    pos: usize,
    line: usize,
    column: usize,
    /// Start position of current token
    start: usize,
    start_coords: Coordinates,
    kinds: KindTable,
    tokens: Vec<Token>,
}

impl Lexer {
    /// Create a new lexer for the given source code
    pub fn new(source: &str) -> Self {
        Self {
            source: source.chars().collect(),
            line_count: source.lines().count(),
            pos: 0,
            line: 1,
            column: 1,
            start: 0,
            start_coords: Coordinates::new(1, 1),
            kinds: KindTable::seeded(),
            tokens: Vec::new(),
        }
    }

    /// Create a lexer over an ordered sequence of source lines
    pub fn from_lines<S: AsRef<str>>(lines: &[S]) -> Self {
        let joined = lines
            .iter()
            .map(|l| l.as_ref())
            .collect::<Vec<_>>()
            .join("\n");
        Self::new(&joined)
    }

    fn reset(&mut self) {
        self.pos = 0;
        self.line = 1;
        self.column = 1;
        self.start = 0;
        self.start_coords = Coordinates::new(1, 1);
        self.kinds = KindTable::seeded();
        self.tokens.clear();
    }

    fn peek(&self) -> Option<char> {
        self.source.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.source.get(self.pos + offset).copied()
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

    fn advance_by(&mut self, n: usize) {
        for _ in 0..n {
            self.advance();
        }
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.source.len()
    }

    fn matches_ahead(&self, text: &str) -> bool {
        text.chars()
            .enumerate()
            .all(|(i, c)| self.peek_at(i) == Some(c))
    }

    /// Mark the start of the next token
    fn begin(&mut self) {
        self.start = self.pos;
        self.start_coords = Coordinates::new(self.line, self.column);
    }

    fn lexeme(&self) -> String {
        self.source[self.start..self.pos].iter().collect()
    }

    /// Push a token whose kind is fixed by the interning table
    fn push_classified(&mut self, discovered: TokenKind) {
        let lexeme = self.lexeme();
        let kind = self.kinds.classify(&lexeme, discovered);
        self.tokens.push(Token::new(kind, lexeme, self.start_coords));
    }

    /// Push a literal-interior token; these never enter the interning table
    fn push_raw(&mut self, kind: TokenKind) {
        let lexeme = self.lexeme();
        self.tokens.push(Token::new(kind, lexeme, self.start_coords));
    }

    /// Skip whitespace and comments
    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            match c {
                c if c.is_whitespace() => {
                    self.advance();
                }
                // Line comment
                '/' if self.peek_at(1) == Some('/') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                // Block comment
                '/' if self.peek_at(1) == Some('*') => {
                    let opened = Coordinates::new(self.line, self.column);
                    self.advance_by(2);
                    loop {
                        if self.is_at_end() {
                            warn!("unterminated block comment opened at {}", opened);
                            break;
                        }
                        if self.matches_ahead("*/") {
                            self.advance_by(2);
                            break;
                        }
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    /// Read an identifier or keyword
    fn read_identifier(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' || c == '$' {
                self.advance();
            } else {
                break;
            }
        }
        self.push_classified(TokenKind::Identifier);
    }

    fn consume_digits(&mut self, radix: u32) -> usize {
        let mut count = 0;
        while let Some(c) = self.peek() {
            if c.is_digit(radix) {
                self.advance();
                count += 1;
            } else if c == '\''
                && count > 0
                && self.peek_at(1).map_or(false, |n| n.is_digit(radix))
            {
                // digit separator
                self.advance();
            } else {
                break;
            }
        }
        count
    }

    /// Read a number literal (integer or float)
    fn read_number(&mut self) {
        let mut is_float = false;

        let radix = match (self.peek(), self.peek_at(1)) {
            (Some('0'), Some('x' | 'X')) => 16,
            (Some('0'), Some('b' | 'B')) => 2,
            _ => 10,
        };
        if radix != 10 {
            self.advance_by(2);
        }

        let mut digits = self.consume_digits(radix);

        if radix != 2 && self.peek() == Some('.') {
            is_float = true;
            self.advance();
            digits += self.consume_digits(radix);
        }

        if digits == 0 {
            warn!(
                "numeric literal '{}' at {} has no digits",
                self.lexeme(),
                self.start_coords
            );
        }

        let exponent = match radix {
            10 => Some(['e', 'E']),
            16 => Some(['p', 'P']),
            _ => None,
        };
        if let Some(markers) = exponent {
            if self.peek().map_or(false, |c| markers.contains(&c)) {
                let sign = usize::from(matches!(self.peek_at(1), Some('+' | '-')));
                if self.peek_at(1 + sign).map_or(false, |c| c.is_ascii_digit()) {
                    is_float = true;
                    self.advance_by(1 + sign);
                    self.consume_digits(10);
                }
            }
        }

        while let Some(c) = self.peek() {
            match c {
                'u' | 'U' | 'l' | 'L' => {
                    self.advance();
                }
                'f' | 'F' => {
                    is_float = true;
                    self.advance();
                }
                _ => break,
            }
        }

        let kind = if is_float {
            TokenKind::FloatLiteral
        } else {
            TokenKind::IntLiteral
        };
        self.push_classified(kind);
    }

    /// Read a `"` or `'` literal, splitting it into delimiter, text and
    /// escape tokens
    fn read_quoted(&mut self, quote: char) {
        let delimiter = if quote == '"' {
            TokenKind::DoubleQuote
        } else {
            TokenKind::SingleQuote
        };
        let opened = Coordinates::new(self.line, self.column);

        self.begin();
        self.advance();
        self.push_classified(delimiter);

        loop {
            self.begin();
            while let Some(c) = self.peek() {
                if c == quote || c == '\\' {
                    break;
                }
                self.advance();
            }
            if self.pos > self.start {
                self.push_raw(TokenKind::LiteralText);
            }

            match self.peek() {
                Some('\\') => self.read_escape(),
                Some(_) => {
                    self.begin();
                    self.advance();
                    self.push_classified(delimiter);
                    return;
                }
                None => {
                    warn!("unterminated literal opened at {}", opened);
                    return;
                }
            }
        }
    }

    fn consume_hex(&mut self, max: usize) -> usize {
        let mut count = 0;
        while count < max && self.peek().map_or(false, |c| c.is_ascii_hexdigit()) {
            self.advance();
            count += 1;
        }
        count
    }

    /// Read one escape sequence starting at the backslash
    fn read_escape(&mut self) {
        self.begin();
        self.advance();

        match self.peek() {
            None => warn!("dangling backslash at {}", self.start_coords),
            Some(c) if SIMPLE_ESCAPES.contains(&c) => {
                self.advance();
            }
            Some('0'..='7') => {
                let mut count = 0;
                while count < 3 && self.peek().map_or(false, |c| c.is_digit(8)) {
                    self.advance();
                    count += 1;
                }
            }
            Some('x') => {
                self.advance();
                if self.consume_hex(usize::MAX) == 0 {
                    warn!("\\x escape without digits at {}", self.start_coords);
                }
            }
            Some(marker @ ('u' | 'U')) => {
                let wanted = if marker == 'u' { 4 } else { 8 };
                self.advance();
                let got = self.consume_hex(wanted);
                if got != wanted {
                    warn!(
                        "\\{} escape at {} needs {} hex digits, found {}",
                        marker, self.start_coords, wanted, got
                    );
                }
            }
            Some(c) => {
                self.advance();
                warn!("unknown escape sequence \\{} at {}", c, self.start_coords);
            }
        }

        self.push_raw(TokenKind::EscapeSequence);
    }

    /// Read `R"delim(...)delim"` (with an optional encoding prefix) as one token
    fn read_raw_string(&mut self, prefix_len: usize) {
        self.advance_by(prefix_len);

        let mut delimiter = String::new();
        loop {
            match self.peek() {
                Some('(') => {
                    self.advance();
                    break;
                }
                Some(c)
                    if !c.is_whitespace()
                        && c != ')'
                        && c != '\\'
                        && delimiter.len() < MAX_RAW_DELIMITER =>
                {
                    delimiter.push(c);
                    self.advance();
                }
                _ => {
                    warn!("malformed raw string delimiter at {}", self.start_coords);
                    self.push_raw(TokenKind::RawString);
                    return;
                }
            }
        }

        let closing = format!("){}\"", delimiter);
        loop {
            if self.is_at_end() {
                warn!("unterminated raw string opened at {}", self.start_coords);
                break;
            }
            if self.matches_ahead(&closing) {
                self.advance_by(closing.chars().count());
                break;
            }
            self.advance();
        }
        self.push_raw(TokenKind::RawString);
    }

    /// Handle `R"`, `u8"`, `L'` and friends. Returns false when the text is
    /// an ordinary identifier.
    fn try_literal_prefix(&mut self) -> bool {
        if let Some(prefix) = RAW_PREFIXES.iter().find(|p| self.matches_ahead(p)) {
            self.read_raw_string(prefix.chars().count());
            return true;
        }

        for prefix in ENCODING_PREFIXES {
            if !self.matches_ahead(prefix) {
                continue;
            }
            let len = prefix.chars().count();
            if let Some(quote @ ('"' | '\'')) = self.peek_at(len) {
                self.advance_by(len);
                self.push_raw(TokenKind::EncodingPrefix);
                self.read_quoted(quote);
                return true;
            }
        }
        false
    }

    /// Longest operator match starting at the current character
    fn read_operator(&mut self) {
        let found = OPERATORS
            .iter()
            .find(|(text, _)| self.matches_ahead(text))
            .map(|(text, kind)| (text.chars().count(), *kind));

        match found {
            Some((len, kind)) => {
                self.advance_by(len);
                self.push_classified(kind);
            }
            None => self.read_unknown(),
        }
    }

    fn read_unknown(&mut self) {
        self.advance();
        let lexeme = self.lexeme();
        warn!("unknown character '{}' at {}", lexeme, self.start_coords);
        self.push_classified(TokenKind::Unknown);
    }

    /// Tokenize the entire source and return all tokens, ending with `Eof`.
    ///
    /// Every call starts from a clean state, so tokenizing twice yields the
    /// same sequence.
    pub fn tokenize(&mut self) -> Vec<Token> {
        self.reset();

        loop {
            self.skip_whitespace();
            let Some(c) = self.peek() else {
                break;
            };
            self.begin();

            if c.is_alphabetic() || c == '_' || c == '$' {
                if !self.try_literal_prefix() {
                    self.read_identifier();
                }
            } else if c.is_ascii_digit() {
                self.read_number();
            } else if c == '"' || c == '\'' {
                self.read_quoted(c);
            } else if let Some(kind) = TokenKind::punctuation(c) {
                self.advance();
                self.push_classified(kind);
            } else if TokenKind::starts_operator(c) {
                self.read_operator();
            } else {
                self.read_unknown();
            }
        }

        self.tokens
            .push(Token::eof(Coordinates::new(self.line_count + 1, 1)));
        debug!(
            "lexed {} tokens, {} distinct lexemes",
            self.tokens.len(),
            self.kinds.len()
        );
        std::mem::take(&mut self.tokens)
    }
}

// ==================== Token Cursor ====================

/// Read cursor over a finished token sequence, consumed by the parser
#[derive(Debug, Clone)]
pub struct TokenCursor {
    tokens: Vec<Token>,
    pos: usize,
}

impl TokenCursor {
    /// Wrap a token sequence; a trailing `Eof` is added if missing
    pub fn new(mut tokens: Vec<Token>) -> Self {
        if tokens.last().map_or(true, |t| t.kind != TokenKind::Eof) {
            let at = tokens
                .last()
                .map(|t| Coordinates::new(t.coordinates.line + 1, 1))
                .unwrap_or_else(|| Coordinates::new(1, 1));
            tokens.push(Token::eof(at));
        }
        Self { tokens, pos: 0 }
    }

    pub fn is_exhausted(&self) -> bool {
        self.current().kind == TokenKind::Eof
    }

    pub fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    pub fn peek(&self) -> &Token {
        &self.tokens[(self.pos + 1).min(self.tokens.len() - 1)]
    }

    pub fn check(&self, kind: TokenKind) -> bool {
        self.current().kind == kind
    }

    pub fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    /// Consume the current token if it has the expected kind
    pub fn advance_past(&mut self, expected: TokenKind) -> Result<Token> {
        if self.check(expected) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(&format!("{:?}", expected)))
        }
    }

    /// Build an unexpected-token error for the current token
    pub fn unexpected(&self, expected: &str) -> Error {
        let token = self.current();
        Error::UnexpectedToken {
            expected: expected.to_string(),
            found: token.lexeme.clone(),
            kind: token.kind,
            at: token.coordinates,
        }
    }
}
