//! One token set serves all three DSL surfaces (rules, paths, predicates).

use std::fmt;

use logos::Logos;

fn unescape(raw: &str) -> String {
    // Strip the surrounding quotes, then resolve escapes.
    let inner = &raw[1..raw.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('0') => out.push('\0'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

fn char_range(raw: &str, radix: u32) -> Option<(char, Option<char>)> {
    let body = &raw[2..]; // past `%d` / `%x`
    let (lo, hi) = match body.split_once('-') {
        Some((lo, hi)) => (lo, Some(hi)),
        None => (body, None),
    };
    let lo = char::from_u32(u32::from_str_radix(lo, radix).ok()?)?;
    let hi = match hi {
        Some(hi) => Some(char::from_u32(u32::from_str_radix(hi, radix).ok()?)?),
        None => None,
    };
    Some((lo, hi))
}

fn bracket_range(raw: &str) -> (char, char) {
    // Shape is `[c-c]`, guaranteed by the regex.
    let mut chars = raw.chars();
    chars.next(); // `[`
    let lo = chars.next().unwrap();
    chars.next(); // `-`
    let hi = chars.next().unwrap();
    (lo, hi)
}

/// Lexical tokens shared by the grammar-rule, path, and predicate surfaces.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"//[^\r\n]*")]
pub enum Token {
    #[regex(r"[_a-zA-Z][_a-zA-Z0-9']*", |lex| lex.slice().to_string(), priority = 2)]
    Ident(String),

    #[regex(r"[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    Int(i64),

    #[regex(r#""(?:[^"\\\r\n]|\\.)*""#, |lex| unescape(lex.slice()))]
    Str(String),

    /// `%dNN` / `%xHH`, optionally ranged: `%d33-90`, `%x41-5A`.
    #[regex(r"%d[0-9]+(-[0-9]+)?", |lex| char_range(lex.slice(), 10))]
    #[regex(r"%x[0-9A-Fa-f]+(-[0-9A-Fa-f]+)?", |lex| char_range(lex.slice(), 16))]
    CharCode((char, Option<char>)),

    /// A single-character range in brackets: `[a-z]`.
    #[regex(r"\[[^\\\[\]-]-[^\\\[\]]\]", |lex| bracket_range(lex.slice()))]
    CharSet((char, char)),

    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("if")]
    If,
    #[token("then")]
    Then,
    #[token("else")]
    Else,
    #[token("in")]
    In,
    #[token("int")]
    KwInt,
    #[token("bool")]
    KwBool,
    #[token("string")]
    KwString,
    #[token("unit")]
    KwUnit,

    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[token(";")]
    Semi,
    #[token("@")]
    At,

    #[token("..")]
    DotDot,
    #[token(".")]
    Dot,
    #[token("->")]
    Arrow,
    #[token("|")]
    Pipe,
    #[token("||")]
    PipePipe,
    #[token("&&")]
    AmpAmp,
    #[token("==")]
    EqEq,
    #[token("!=")]
    BangEq,
    #[token("<=")]
    Le,
    #[token(">=")]
    Ge,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("!")]
    Bang,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("?")]
    Question,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Ident(name) => write!(f, "`{name}`"),
            Token::Int(n) => write!(f, "`{n}`"),
            Token::Str(_) => write!(f, "string literal"),
            Token::CharCode(_) => write!(f, "character code"),
            Token::CharSet(_) => write!(f, "character set"),
            Token::True => write!(f, "`true`"),
            Token::False => write!(f, "`false`"),
            Token::If => write!(f, "`if`"),
            Token::Then => write!(f, "`then`"),
            Token::Else => write!(f, "`else`"),
            Token::In => write!(f, "`in`"),
            Token::KwInt => write!(f, "`int`"),
            Token::KwBool => write!(f, "`bool`"),
            Token::KwString => write!(f, "`string`"),
            Token::KwUnit => write!(f, "`unit`"),
            Token::LParen => write!(f, "`(`"),
            Token::RParen => write!(f, "`)`"),
            Token::LBracket => write!(f, "`[`"),
            Token::RBracket => write!(f, "`]`"),
            Token::LBrace => write!(f, "`{{`"),
            Token::RBrace => write!(f, "`}}`"),
            Token::Comma => write!(f, "`,`"),
            Token::Colon => write!(f, "`:`"),
            Token::Semi => write!(f, "`;`"),
            Token::At => write!(f, "`@`"),
            Token::DotDot => write!(f, "`..`"),
            Token::Dot => write!(f, "`.`"),
            Token::Arrow => write!(f, "`->`"),
            Token::Pipe => write!(f, "`|`"),
            Token::PipePipe => write!(f, "`||`"),
            Token::AmpAmp => write!(f, "`&&`"),
            Token::EqEq => write!(f, "`==`"),
            Token::BangEq => write!(f, "`!=`"),
            Token::Le => write!(f, "`<=`"),
            Token::Ge => write!(f, "`>=`"),
            Token::Lt => write!(f, "`<`"),
            Token::Gt => write!(f, "`>`"),
            Token::Bang => write!(f, "`!`"),
            Token::Plus => write!(f, "`+`"),
            Token::Minus => write!(f, "`-`"),
            Token::Star => write!(f, "`*`"),
            Token::Slash => write!(f, "`/`"),
            Token::Percent => write!(f, "`%`"),
            Token::Question => write!(f, "`?`"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(src: &str) -> Vec<Token> {
        Token::lexer(src).map(|t| t.expect("lex error")).collect()
    }

    #[test]
    fn test_lex_rule() {
        let tokens = lex("start: part (\"/\" part)*;");
        assert_eq!(tokens[0], Token::Ident("start".into()));
        assert_eq!(tokens[1], Token::Colon);
        assert!(tokens.contains(&Token::Str("/".into())));
        assert_eq!(*tokens.last().unwrap(), Token::Semi);
    }

    #[test]
    fn test_lex_charset_and_codes() {
        assert_eq!(lex("[a-z]"), vec![Token::CharSet(('a', 'z'))]);
        assert_eq!(lex("%x41-5A"), vec![Token::CharCode(('A', Some('Z')))]);
        assert_eq!(lex("%d33"), vec![Token::CharCode(('!', None))]);
    }

    #[test]
    fn test_lex_keywords_vs_idents() {
        assert_eq!(lex("interval"), vec![Token::Ident("interval".into())]);
        assert_eq!(lex("int"), vec![Token::KwInt]);
    }

    #[test]
    fn test_lex_string_escapes() {
        assert_eq!(lex(r#""a\"b\\c""#), vec![Token::Str("a\"b\\c".into())]);
    }

    #[test]
    fn test_lex_operators_longest_match() {
        assert_eq!(lex("||"), vec![Token::PipePipe]);
        assert_eq!(lex("|"), vec![Token::Pipe]);
        assert_eq!(lex(".."), vec![Token::DotDot]);
        assert_eq!(lex("->"), vec![Token::Arrow]);
    }
}
