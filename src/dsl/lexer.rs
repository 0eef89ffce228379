//! Lexer for model files.
//!
//! Converts source text into a sequence of tokens with span information.
//! Words may start with a digit (`size: 20`, `RollingDaysSum(x.amount, x.day, 30)`),
//! so numbers are plain [`Token::Ident`]s and lowering interprets them.

use chumsky::prelude::*;

/// A token of the model language.
#[derive(Debug, Clone, PartialEq)]
pub enum Token<'src> {
    // ========================================================================
    // Block Keywords
    // ========================================================================
    Application,
    Entity,
    Field,
    Relation,
    Translation,

    // ========================================================================
    // Literals
    // ========================================================================
    /// A word that is not a block keyword.
    Ident(&'src str),
    /// A string literal (contents without quotes).
    StringLit(&'src str),

    // ========================================================================
    // Symbols
    // ========================================================================
    /// `{`
    LBrace,
    /// `}`
    RBrace,
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `;`
    Semicolon,
    /// `,`
    Comma,
    /// `.`
    Dot,
    /// `=`
    Eq,
    /// `:`
    Colon,
}

impl<'src> std::fmt::Display for Token<'src> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Application => write!(f, "application"),
            Token::Entity => write!(f, "entity"),
            Token::Field => write!(f, "field"),
            Token::Relation => write!(f, "relation"),
            Token::Translation => write!(f, "translation"),

            Token::Ident(s) => write!(f, "{}", s),
            Token::StringLit(s) => write!(f, "\"{}\"", s),

            Token::LBrace => write!(f, "{{"),
            Token::RBrace => write!(f, "}}"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::Semicolon => write!(f, ";"),
            Token::Comma => write!(f, ","),
            Token::Dot => write!(f, "."),
            Token::Eq => write!(f, "="),
            Token::Colon => write!(f, ":"),
        }
    }
}

/// Map a word to a keyword token or return Ident.
fn keyword_or_ident(s: &str) -> Token<'_> {
    match s {
        "application" => Token::Application,
        "entity" => Token::Entity,
        "field" => Token::Field,
        "relation" => Token::Relation,
        "translation" => Token::Translation,
        _ => Token::Ident(s),
    }
}

/// Create a lexer for model files.
///
/// Returns a parser that tokenizes the input string into a sequence of
/// tokens with span information, skipping whitespace and `#` comments.
pub fn lexer<'src>(
) -> impl Parser<'src, &'src str, Vec<(Token<'src>, SimpleSpan)>, extra::Err<Rich<'src, char>>> {
    let word = any()
        .filter(|c: &char| c.is_alphanumeric() || *c == '_')
        .repeated()
        .at_least(1)
        .to_slice()
        .map(keyword_or_ident);

    // String literals: "..." (no escapes)
    let string_lit = just('"')
        .ignore_then(none_of('"').repeated().to_slice())
        .then_ignore(just('"'))
        .map(Token::StringLit);

    let symbol = choice((
        just('{').to(Token::LBrace),
        just('}').to(Token::RBrace),
        just('(').to(Token::LParen),
        just(')').to(Token::RParen),
        just(';').to(Token::Semicolon),
        just(',').to(Token::Comma),
        just('.').to(Token::Dot),
        just('=').to(Token::Eq),
        just(':').to(Token::Colon),
    ));

    // Comments: # ... until newline
    let comment = just('#')
        .then(any().and_is(just('\n').not()).repeated())
        .ignored();

    let token = choice((word, string_lit, symbol)).map_with(|tok, e| (tok, e.span()));

    token
        .padded_by(comment.padded().repeated())
        .padded()
        .repeated()
        .collect()
        .padded_by(comment.padded().repeated())
        .padded()
        .then_ignore(end())
}

/// Lex a source string into tokens.
///
/// Returns Ok with the token list on success, or Err with the lexing errors.
pub fn lex(source: &str) -> Result<Vec<(Token<'_>, SimpleSpan)>, Vec<Rich<'_, char>>> {
    let (tokens, errs) = lexer().parse(source).into_output_errors();
    if errs.is_empty() {
        Ok(tokens.unwrap_or_default())
    } else {
        Err(errs)
    }
}
