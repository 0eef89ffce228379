//! Parser for model files using chumsky.
//!
//! Transforms the token stream from the lexer into the [`Model`] AST.

use chumsky::input::ValueInput;
use chumsky::prelude::*;

use super::ast::*;
use super::lexer::Token;
use super::span::Spanned;

/// Convert a SimpleSpan to our Span type (Range<usize>)
fn to_span(span: SimpleSpan) -> std::ops::Range<usize> {
    span.start..span.end
}

/// Create the parser for model files.
///
/// The parser is generic over the input type, accepting any `ValueInput`
/// that produces `Token` values with `SimpleSpan` spans.
pub fn parser<'tokens, 'src: 'tokens, I>(
) -> impl Parser<'tokens, I, Model, extra::Err<Rich<'tokens, Token<'src>, SimpleSpan>>>
where
    I: ValueInput<'tokens, Token = Token<'src>, Span = SimpleSpan>,
{
    // ==========================================================================
    // Basic token parsers
    // ==========================================================================

    let ident = select! {
        Token::Ident(s) => s.to_string(),
    }
    .labelled("identifier")
    .map_with(|n, e| Spanned::new(n, to_span(e.span())));

    let string_lit = select! {
        Token::StringLit(s) => s.to_string(),
    }
    .labelled("string literal");

    // left.right
    let path = ident
        .clone()
        .then_ignore(just(Token::Dot))
        .then(ident.clone())
        .map(|(left, right)| PathExpr { left, right });

    // ==========================================================================
    // Formulas: Name(arg, ...)
    // ==========================================================================

    let formula = recursive(|formula| {
        let arg = choice((
            formula.map(CallArg::Call),
            path.clone().map(CallArg::Path),
            ident.clone().map(|name: Spanned<String>| CallArg::Name(name.value)),
        ))
        .map_with(|a, e| Spanned::new(a, to_span(e.span())));

        ident
            .clone()
            .then(
                arg.separated_by(just(Token::Comma))
                    .collect::<Vec<_>>()
                    .delimited_by(just(Token::LParen), just(Token::RParen)),
            )
            .map(|(name, args)| Call { name, args })
    });

    // ==========================================================================
    // Properties: key: value;
    // ==========================================================================

    let value = choice((
        formula.map(PropertyValue::Formula),
        path.map(PropertyValue::Path),
        string_lit.clone().map(PropertyValue::Text),
        ident
            .clone()
            .map(|word: Spanned<String>| PropertyValue::Word(word.value)),
    ))
    .labelled("property value")
    .map_with(|v, e| Spanned::new(v, to_span(e.span())));

    let property = ident
        .clone()
        .then_ignore(just(Token::Colon))
        .then(value)
        .then_ignore(just(Token::Semicolon))
        .map(|(key, value)| Property { key, value })
        .map_with(|p, e| Spanned::new(p, to_span(e.span())));

    let properties = property
        .repeated()
        .collect::<Vec<_>>()
        .delimited_by(just(Token::LBrace), just(Token::RBrace));

    // ==========================================================================
    // Entity members: name = field { ... } / name = relation { ... }
    // ==========================================================================

    let member_def = |keyword: Token<'src>| {
        ident
            .clone()
            .then_ignore(just(Token::Eq))
            .then_ignore(just(keyword))
            .then(properties.clone())
            .map(|(name, properties)| MemberDef { name, properties })
    };

    let member = choice((
        member_def(Token::Field).map(Member::Field),
        member_def(Token::Relation).map(Member::Relation),
    ))
    .map_with(|m, e| Spanned::new(m, to_span(e.span())));

    let entity = ident
        .clone()
        .then_ignore(just(Token::Eq))
        .then_ignore(just(Token::Entity))
        .then(
            member
                .repeated()
                .collect::<Vec<_>>()
                .delimited_by(just(Token::LBrace), just(Token::RBrace)),
        )
        .map(|(name, members)| Item::Entity(EntityDef { name, members }));

    // ==========================================================================
    // Term blocks: key = "text";
    // ==========================================================================

    let term = ident
        .clone()
        .then_ignore(just(Token::Eq))
        .then(string_lit.map_with(|s, e| Spanned::new(s, to_span(e.span()))))
        .then_ignore(just(Token::Semicolon))
        .map(|(key, text)| Term { key, text })
        .map_with(|t, e| Spanned::new(t, to_span(e.span())));

    let terms = term
        .repeated()
        .collect::<Vec<_>>()
        .delimited_by(just(Token::LBrace), just(Token::RBrace));

    let application = ident
        .clone()
        .then_ignore(just(Token::Eq))
        .then_ignore(just(Token::Application))
        .then(terms.clone())
        .map(|(name, settings)| Item::Application(ApplicationDef { name, settings }));

    let translation = ident
        .clone()
        .then_ignore(just(Token::Eq))
        .then_ignore(just(Token::Translation))
        .then(terms)
        .map(|(language, terms)| Item::Translation(TranslationDef { language, terms }));

    // ==========================================================================
    // Model
    // ==========================================================================

    let item = choice((application, entity, translation))
        .map_with(|i, e| Spanned::new(i, to_span(e.span())));

    item.repeated()
        .collect::<Vec<_>>()
        .then_ignore(end())
        .map(|items| Model { items })
}
