//! Parser for the model description language.
//!
//! A model file declares the application title, the entities with their
//! fields and relations, and label translations:
//!
//! ```text
//! # comment to end of line
//! app = application { title = "Orders"; }
//!
//! Order = entity {
//!     number = field { type: text; size: 20; listed: true; }
//!     customer = field { ref: Customer.name; sortby: Customer.name; listed: true; }
//!     lines = relation { ref: OrderLine.orderId; orderdesc: OrderLine.day; }
//!     lineCount = field { type: auto; value: Count(lines.orderId); format: "%.0f"; }
//! }
//!
//! de = translation { number = "Nummer"; }
//! ```
//!
//! # Example
//!
//! ```ignore
//! use tabula::dsl;
//!
//! let result = dsl::parse(source);
//! if let Some(model) = result.model {
//!     println!("Parsed {} items", model.items.len());
//! }
//! for diag in &result.diagnostics {
//!     eprintln!("{}", diag);
//! }
//! ```

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod span;

pub use ast::*;
pub use span::{Span, Spanned};

/// Result of parsing a model source.
#[derive(Debug)]
pub struct ParseResult {
    /// The parsed model, if parsing succeeded.
    pub model: Option<Model>,
    /// Diagnostic messages (errors and warnings).
    pub diagnostics: Vec<Diagnostic>,
}

impl ParseResult {
    /// Returns true if parsing succeeded without errors.
    pub fn is_ok(&self) -> bool {
        self.model.is_some() && !self.has_errors()
    }

    /// Returns true if there are any errors.
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Returns only the error diagnostics.
    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
    }
}

/// A diagnostic message with source location.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    /// The span in the source where the diagnostic applies.
    pub span: Span,
    /// The severity level.
    pub severity: Severity,
    /// The diagnostic message.
    pub message: String,
}

impl Diagnostic {
    /// Create a new error diagnostic.
    pub fn error(span: Span, message: impl Into<String>) -> Self {
        Self {
            span,
            severity: Severity::Error,
            message: message.into(),
        }
    }

    /// Create a new warning diagnostic.
    pub fn warning(span: Span, message: impl Into<String>) -> Self {
        Self {
            span,
            severity: Severity::Warning,
            message: message.into(),
        }
    }

    /// Render with the offending source line underlined.
    ///
    /// `source_name` is the label shown in the report header, usually the
    /// model file path.
    pub fn write_report(
        &self,
        source_name: &str,
        source: &str,
        out: impl std::io::Write,
    ) -> std::io::Result<()> {
        use ariadne::{Config, Label, Report, ReportKind, Source};

        let kind = match self.severity {
            Severity::Error => ReportKind::Error,
            Severity::Warning => ReportKind::Warning,
        };
        let name = source_name.to_string();
        // Clamp so that diagnostics at end of input still point inside the text.
        let end = self.span.end.min(source.len());
        let start = self.span.start.min(end);
        Report::build(kind, (name.clone(), start..end))
            .with_config(Config::default().with_color(false))
            .with_message(&self.message)
            .with_label(Label::new((name.clone(), start..end)).with_message(&self.message))
            .finish()
            .write((name, Source::from(source.to_string())), out)
    }
}

/// Diagnostic severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// A fatal error that prevents loading the model.
    Error,
    /// A warning that doesn't prevent loading.
    Warning,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let level = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{}: {} (at {:?})", level, self.message, self.span)
    }
}

impl std::error::Error for Diagnostic {}

/// Parse a model source string.
///
/// Returns a `ParseResult` containing the parsed model (if successful) and
/// any diagnostic messages. Errors never abort; they are all collected.
pub fn parse(source: &str) -> ParseResult {
    use chumsky::error::Rich;
    use chumsky::input::Input;
    use chumsky::span::SimpleSpan;
    use chumsky::span::Span as _;
    use chumsky::Parser as _;

    // Step 1: Lexical analysis
    let (tokens, lex_errs) = lexer::lexer().parse(source).into_output_errors();

    let mut diagnostics: Vec<Diagnostic> = lex_errs
        .into_iter()
        .map(|e: Rich<'_, char>| {
            let span = e.span();
            Diagnostic::error(span.start()..span.end(), e.to_string())
        })
        .collect();

    let tokens: Vec<(lexer::Token<'_>, SimpleSpan)> = match tokens {
        Some(t) if diagnostics.is_empty() => t,
        _ => {
            return ParseResult {
                model: None,
                diagnostics,
            };
        }
    };

    // Step 2: Parsing
    let len = source.len();
    let eoi: SimpleSpan = (len..len).into();
    let token_stream = tokens.as_slice().map(
        eoi,
        |(tok, span): &(lexer::Token<'_>, SimpleSpan)| (tok, span),
    );

    let (model, parse_errs) = parser::parser().parse(token_stream).into_output_errors();

    diagnostics.extend(
        parse_errs
            .into_iter()
            .map(|e: Rich<'_, lexer::Token<'_>, SimpleSpan>| {
                let span = e.span();
                Diagnostic::error(span.start()..span.end(), e.to_string())
            }),
    );

    ParseResult { model, diagnostics }
}
