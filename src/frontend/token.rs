//! Token definitions for minicc

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::utils::Coordinates;

/// A token produced by the lexer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Token {
    pub lexeme: String,
    pub coordinates: Coordinates,
    pub kind: TokenKind,
}

impl Token {
    pub fn new(kind: TokenKind, lexeme: impl Into<String>, coordinates: Coordinates) -> Self {
        Self {
            lexeme: lexeme.into(),
            coordinates,
            kind,
        }
    }

    pub fn eof(coordinates: Coordinates) -> Self {
        Self::new(TokenKind::Eof, "", coordinates)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} '{}' @ {}", self.kind, self.lexeme, self.coordinates)
    }
}

/// Token kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TokenKind {
    // ============ Identifiers and Literals ============
    Identifier,
    IntLiteral,
    FloatLiteral,

    // ============ Arithmetic ============
    /// +
    Plus,
    /// -
    Minus,
    /// *
    Star,
    /// /
    Slash,
    /// %
    Percent,
    /// ++
    PlusPlus,
    /// --
    MinusMinus,

    // ============ Assignment ============
    /// =
    Assign,
    /// +=
    PlusAssign,
    /// -=
    MinusAssign,
    /// *=
    StarAssign,
    /// /=
    SlashAssign,
    /// %=
    PercentAssign,
    /// &=
    AmpAssign,
    /// |=
    PipeAssign,
    /// ^=
    CaretAssign,
    /// <<=
    ShlAssign,
    /// >>=
    ShrAssign,

    // ============ Relational ============
    /// <
    Lt,
    /// <=
    Le,
    /// >
    Gt,
    /// >=
    Ge,
    /// ==
    EqEq,
    /// !=
    Ne,

    // ============ Logical ============
    /// &&
    AndAnd,
    /// ||
    OrOr,
    /// !
    Not,

    // ============ Bitwise ============
    /// &
    Amp,
    /// |
    Pipe,
    /// ^
    Caret,
    /// ~
    Tilde,
    /// <<
    Shl,
    /// >>
    Shr,

    // ============ Keywords ============
    If,
    Else,
    While,
    Do,
    Int,
    Return,
    /// `main`, the only function a program may define
    Main,

    // ============ Delimiters ============
    /// (
    LParen,
    /// )
    RParen,
    /// {
    LBrace,
    /// }
    RBrace,
    /// [
    LBracket,
    /// ]
    RBracket,
    /// ;
    Semicolon,
    /// ,
    Comma,
    /// ?
    Question,

    // ============ String / Char Literals ============
    /// L, u, u8 or U in front of a quote
    EncodingPrefix,
    /// "
    DoubleQuote,
    /// '
    SingleQuote,
    /// Plain text between literal delimiters
    LiteralText,
    /// A single escape sequence inside a literal
    EscapeSequence,
    /// R"delim(...)delim", kept whole
    RawString,

    // ============ Special ============
    Eof,
    Unknown,
}

/// Keyword spellings
pub const KEYWORDS: &[(&str, TokenKind)] = &[
    ("if", TokenKind::If),
    ("else", TokenKind::Else),
    ("while", TokenKind::While),
    ("do", TokenKind::Do),
    ("int", TokenKind::Int),
    ("return", TokenKind::Return),
    ("main", TokenKind::Main),
];

/// Multi-character capable operators, longest spelling first so that the
/// first prefix match is the maximal munch.
pub const OPERATORS: &[(&str, TokenKind)] = &[
    ("<<=", TokenKind::ShlAssign),
    (">>=", TokenKind::ShrAssign),
    ("++", TokenKind::PlusPlus),
    ("--", TokenKind::MinusMinus),
    ("+=", TokenKind::PlusAssign),
    ("-=", TokenKind::MinusAssign),
    ("*=", TokenKind::StarAssign),
    ("/=", TokenKind::SlashAssign),
    ("%=", TokenKind::PercentAssign),
    ("&=", TokenKind::AmpAssign),
    ("|=", TokenKind::PipeAssign),
    ("^=", TokenKind::CaretAssign),
    ("<=", TokenKind::Le),
    (">=", TokenKind::Ge),
    ("==", TokenKind::EqEq),
    ("!=", TokenKind::Ne),
    ("&&", TokenKind::AndAnd),
    ("||", TokenKind::OrOr),
    ("<<", TokenKind::Shl),
    (">>", TokenKind::Shr),
    ("+", TokenKind::Plus),
    ("-", TokenKind::Minus),
    ("*", TokenKind::Star),
    ("/", TokenKind::Slash),
    ("%", TokenKind::Percent),
    ("=", TokenKind::Assign),
    ("!", TokenKind::Not),
    ("<", TokenKind::Lt),
    (">", TokenKind::Gt),
    ("&", TokenKind::Amp),
    ("|", TokenKind::Pipe),
    ("^", TokenKind::Caret),
];

/// Characters that always form a token on their own
pub const PUNCTUATION: &[(char, TokenKind)] = &[
    ('(', TokenKind::LParen),
    (')', TokenKind::RParen),
    ('{', TokenKind::LBrace),
    ('}', TokenKind::RBrace),
    ('[', TokenKind::LBracket),
    (']', TokenKind::RBracket),
    (';', TokenKind::Semicolon),
    (',', TokenKind::Comma),
    ('?', TokenKind::Question),
    ('~', TokenKind::Tilde),
];

impl TokenKind {
    /// Characters that may start an entry of [`OPERATORS`]
    pub fn starts_operator(c: char) -> bool {
        matches!(
            c,
            '+' | '-' | '*' | '/' | '%' | '=' | '!' | '<' | '>' | '&' | '|' | '^'
        )
    }

    pub fn punctuation(c: char) -> Option<TokenKind> {
        PUNCTUATION
            .iter()
            .find(|(p, _)| *p == c)
            .map(|(_, kind)| *kind)
    }
}

/// Lexeme -> kind interning table for one lexing pass.
///
/// Seeded with every keyword, operator and delimiter; identifiers, literals and
/// unknown characters are added the first time they are seen, and that first
/// classification sticks for the rest of the run.
#[derive(Debug, Clone)]
pub struct KindTable {
    kinds: HashMap<String, TokenKind>,
}

impl KindTable {
    pub fn seeded() -> Self {
        let mut kinds = HashMap::new();
        for (text, kind) in KEYWORDS.iter().chain(OPERATORS.iter()) {
            kinds.insert(text.to_string(), *kind);
        }
        for (c, kind) in PUNCTUATION {
            kinds.insert(c.to_string(), *kind);
        }
        kinds.insert("\"".to_string(), TokenKind::DoubleQuote);
        kinds.insert("'".to_string(), TokenKind::SingleQuote);
        Self { kinds }
    }

    /// Return the recorded kind of `lexeme`, recording `discovered` on first sight
    pub fn classify(&mut self, lexeme: &str, discovered: TokenKind) -> TokenKind {
        if let Some(kind) = self.kinds.get(lexeme) {
            return *kind;
        }
        self.kinds.insert(lexeme.to_string(), discovered);
        discovered
    }

    pub fn get(&self, lexeme: &str) -> Option<TokenKind> {
        self.kinds.get(lexeme).copied()
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

impl Default for KindTable {
    fn default() -> Self {
        Self::seeded()
    }
}
