//! The lexical phase: turn a string of source text into a flat run of
//! tokens. Comments are stripped here so the parser never sees them.

use std::collections::VecDeque;
use std::fmt::Display;

use logos::Logos;

/// Token produced from the lexing step.
#[derive(Logos, Clone, Debug, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+")]
pub enum Token<'t> {
    #[token("(")]
    /// Open Parenthesis (
    OpenParen,
    #[token(")")]
    /// Close Parenthesis )
    CloseParen,
    #[token("'")]
    /// Apostrophe ', sugar for quote
    Quote,
    #[token("`")]
    /// Backtick `, sugar for backquote
    Backquote,
    #[token(",")]
    /// Comma ,, sugar for comma (inside a backquote template)
    Comma,

    #[regex(r#""(?:\\.|[^\\"])*"?"#)]
    /// String: open quote ... escaped stuff in between ... close quote
    StringTok(&'t str),

    #[regex(r";.*")]
    /// Comment: semicolon until end of line
    Comment(&'t str),

    #[regex(r#"[^\s()'`,";]+"#)]
    /// Atom: anything else, including numbers and the dot
    Atom(&'t str),
}

impl<'t> Display for Token<'t> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::OpenParen => f.write_str("("),
            Token::CloseParen => f.write_str(")"),
            Token::Quote => f.write_str("'"),
            Token::Backquote => f.write_str("`"),
            Token::Comma => f.write_str(","),
            Token::StringTok(s) => f.write_str(s),
            Token::Comment(c) => f.write_str(c),
            Token::Atom(a) => f.write_str(a),
        }
    }
}

impl<'t> Token<'t> {
    /// Check if a given token is a comment.
    fn is_comment(&self) -> bool {
        matches!(self, Token::Comment(_))
    }
}

/// Take a string and produce the list of its tokens, comments dropped.
pub fn tokenize(input: &str) -> VecDeque<Token<'_>> {
    Token::lexer(input)
        .filter_map(|res| res.ok())
        .filter(|tok| !tok.is_comment())
        .collect()
}
