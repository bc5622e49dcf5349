//! The ABNF core rule set (RFC 5234 appendix B), as reusable grammar text.
//!
//! Grammar validation rejects unused rules, so the rules are selected by
//! name (dependencies included) rather than appended wholesale.

/// Name, definition, and direct dependencies of each core rule.
const CORE_RULES: &[(&str, &str, &[&str])] = &[
    ("ALPHA", "ALPHA: %x41-5A | %x61-7A;", &[]),
    ("DIGIT", "DIGIT: %x30-39;", &[]),
    ("HEXDIG", "HEXDIG: DIGIT | [A-F] | [a-f];", &["DIGIT"]),
    ("DQUOTE", "DQUOTE: %x22;", &[]),
    ("SP", "SP: %x20;", &[]),
    ("HTAB", "HTAB: %x09;", &[]),
    ("WSP", "WSP: SP | HTAB;", &["SP", "HTAB"]),
    ("VCHAR", "VCHAR: %x21-7E;", &[]),
    ("CHAR", "CHAR: %x01-7F;", &[]),
    ("OCTET", "OCTET: %x00-FF;", &[]),
    ("CTL", "CTL: %x00-1F | %x7F;", &[]),
    ("CR", "CR: %x0D;", &[]),
    ("LF", "LF: %x0A;", &[]),
    ("CRLF", "CRLF: CR LF;", &["CR", "LF"]),
    ("BIT", "BIT: [0-1];", &[]),
    ("LWSP", "LWSP: (WSP | CRLF WSP)*;", &["WSP", "CRLF"]),
];

/// The definitions of the named core rules plus their dependencies, ready
/// to append to a grammar's own rules.
pub fn core_rules(names: &[&str]) -> String {
    let mut wanted: Vec<&str> = Vec::new();
    let mut queue: Vec<&str> = names.to_vec();
    while let Some(name) = queue.pop() {
        if wanted.contains(&name) {
            continue;
        }
        if let Some((_, _, deps)) = CORE_RULES.iter().find(|(n, _, _)| *n == name) {
            wanted.push(name);
            queue.extend(deps.iter().copied());
        }
    }

    let mut out = String::new();
    for (name, definition, _) in CORE_RULES {
        if wanted.contains(name) {
            out.push_str(definition);
            out.push('\n');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::{compile_grammar, NoExternalLangs};
    use crate::syntax::parse_rules;

    #[test]
    fn test_core_rules_resolve_dependencies() {
        let rules = core_rules(&["WSP"]);
        assert!(rules.contains("SP:"));
        assert!(rules.contains("HTAB:"));
        assert!(!rules.contains("DIGIT:"));
    }

    #[test]
    fn test_core_rules_compile() {
        let src = format!(
            "start: ALPHA (ALPHA | DIGIT)*;\n{}",
            core_rules(&["ALPHA", "DIGIT"])
        );
        let grammar =
            compile_grammar("Ident", parse_rules(&src).unwrap(), &NoExternalLangs).unwrap();
        assert!(grammar.member("a9z"));
        assert!(!grammar.member("9a"));
    }
}
