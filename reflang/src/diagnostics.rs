//! Rendering collected compile-time errors against their source text.

use ariadne::{Config, Label, Report, ReportKind, Source};

use crate::grammar::GrammarError;
use crate::span::Span;
use crate::syntax::SyntaxError;
use crate::typeck::TypeError;

/// Anything renderable as a source-anchored diagnostic.
pub trait Diagnostic {
    fn span(&self) -> Span;
    fn message(&self) -> String;
}

impl Diagnostic for GrammarError {
    fn span(&self) -> Span {
        self.span
    }

    fn message(&self) -> String {
        self.kind.to_string()
    }
}

impl Diagnostic for TypeError {
    fn span(&self) -> Span {
        self.span
    }

    fn message(&self) -> String {
        self.kind.to_string()
    }
}

impl Diagnostic for SyntaxError {
    fn span(&self) -> Span {
        self.span
    }

    fn message(&self) -> String {
        self.message.clone()
    }
}

/// Render a batch of diagnostics into one plain-text report.
pub fn render<D: Diagnostic>(source_name: &str, source: &str, errors: &[D]) -> String {
    let mut out = Vec::new();
    for error in errors {
        let span = clamp(error.span(), source.len());
        let report = Report::build(ReportKind::Error, source_name, span.start)
            .with_config(Config::default().with_color(false))
            .with_message(error.message())
            .with_label(
                Label::new((source_name, span.range())).with_message(error.message()),
            )
            .finish();
        let _ = report.write((source_name, Source::from(source)), &mut out);
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn clamp(span: Span, len: usize) -> Span {
    let start = span.start.min(len);
    let end = span.end.clamp(start, len);
    Span::new(start, end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::compile_grammar;
    use crate::grammar::NoExternalLangs;
    use crate::syntax::parse_rules;

    #[test]
    fn test_render_grammar_errors() {
        let src = "start: missing;";
        let errors = compile_grammar("test", parse_rules(src).unwrap(), &NoExternalLangs)
            .unwrap_err();
        let rendered = render("demo.lang", src, &errors);
        assert!(rendered.contains("undefined symbol `missing`"));
        assert!(rendered.contains("demo.lang"));
    }
}
