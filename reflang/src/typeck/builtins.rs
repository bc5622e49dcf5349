//! Signatures of the builtin operators and functions available inside
//! refinement predicates.
//!
//! The table is monomorphic; where the constraint theory distinguishes call
//! shapes (e.g. `replace` vs `replace_first`), they are distinct names
//! rather than overloads.

use super::types::SimpleType;

fn fun(args: Vec<SimpleType>, ret: SimpleType) -> SimpleType {
    SimpleType::Fun(args, Box::new(ret))
}

/// Look up the signature of a builtin name.
pub fn signature(name: &str) -> Option<SimpleType> {
    use SimpleType::{Bool, Int, List, String, Top};

    let string_list = || List(Box::new(String));

    Some(match name {
        "prefix_-" => fun(vec![Int], Int),
        "prefix_!" => fun(vec![Bool], Bool),
        "+" | "-" | "*" | "/" | "%" => fun(vec![Int, Int], Int),
        ">=" | "<=" | ">" | "<" => fun(vec![Int, Int], Bool),
        "==" | "!=" => fun(vec![Top, Top], Bool),
        "&&" | "||" => fun(vec![Bool, Bool], Bool),

        // string functions
        "length" => fun(vec![String], Int),
        "concat" => fun(vec![String, String], String),
        "substring" => fun(vec![String, Int, Int], String),
        "int" => fun(vec![String], Int),
        "str" => fun(vec![Int], String),
        "ord" => fun(vec![String], Int),
        "chr" => fun(vec![Int], String),
        "startswith" | "endswith" | "contains" => fun(vec![String, String], Bool),
        "find" => fun(vec![String, String], Int),
        "find_at" => fun(vec![String, String, Int], Int),
        "replace" | "replace_first" => fun(vec![String, String, String], String),
        "isdigit" => fun(vec![String], Bool),

        // spec-writing helpers over selections
        "first" | "last" => fun(vec![string_list()], String),
        "forall" | "exists" => fun(
            vec![fun(vec![String], Bool), string_list()],
            Bool,
        ),

        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_signatures() {
        assert_eq!(
            signature("+").unwrap().to_string(),
            "(int, int) -> int"
        );
        assert_eq!(
            signature("==").unwrap().to_string(),
            "(top, top) -> bool"
        );
        assert_eq!(
            signature("forall").unwrap().to_string(),
            "((string) -> bool, [string]) -> bool"
        );
        assert!(signature("no_such_builtin").is_none());
    }
}
