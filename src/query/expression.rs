//! Formula expression parser
//!
//! Grammar (whitespace allowed between tokens):
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := factor (('*' | '/') factor)*
//! factor  := number | name | '(' expr ')'
//! name    := [A-Za-z_][A-Za-z0-9_]*
//! number  := [0-9]+ ('.' [0-9]+)?
//! ```
//!
//! Operators are left-associative; `*` and `/` bind tighter than `+` and `-`.

use nom::{
    branch::alt,
    bytes::complete::take_while,
    character::complete::{char, digit1, multispace0, one_of, satisfy},
    combinator::{map, map_res, opt, recognize},
    multi::fold_many0,
    sequence::{delimited, pair, preceded},
    IResult, Parser,
};
use std::fmt;

use crate::error::ValidationError;

/// Deepest parenthesis nesting accepted
pub const MAX_NESTING_DEPTH: usize = 64;

/// Most binary operators accepted in one expression
///
/// Together with [`MAX_NESTING_DEPTH`] this bounds the depth of the parsed
/// tree, which the parser, evaluator and `Display` all walk recursively.
pub const MAX_OPERATORS: usize = 256;

/// Arithmetic operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
}

impl BinaryOp {
    fn from_symbol(c: char) -> Self {
        match c {
            '+' => BinaryOp::Add,
            '-' => BinaryOp::Sub,
            '*' => BinaryOp::Mul,
            _ => BinaryOp::Div,
        }
    }

    /// Apply to two values; division by exactly zero has no result
    pub fn apply(&self, lhs: f64, rhs: f64) -> Option<f64> {
        match self {
            BinaryOp::Add => Some(lhs + rhs),
            BinaryOp::Sub => Some(lhs - rhs),
            BinaryOp::Mul => Some(lhs * rhs),
            BinaryOp::Div if rhs == 0.0 => None,
            BinaryOp::Div => Some(lhs / rhs),
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
        };
        write!(f, "{}", symbol)
    }
}

/// Parsed formula expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Result of another query
    Reference(String),
    /// Numeric literal broadcast over every sample
    Constant(f64),
    /// Binary operation
    Binary {
        /// Operator
        op: BinaryOp,
        /// Left operand
        lhs: Box<Expr>,
        /// Right operand
        rhs: Box<Expr>,
    },
}

impl Expr {
    fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    /// Referenced query names, deduplicated, in order of first appearance
    pub fn references(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Reference(name) => {
                if !out.contains(&name.as_str()) {
                    out.push(name);
                }
            }
            Expr::Constant(_) => {}
            Expr::Binary { lhs, rhs, .. } => {
                lhs.collect_references(out);
                rhs.collect_references(out);
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Reference(name) => write!(f, "{}", name),
            Expr::Constant(value) => write!(f, "{}", value),
            Expr::Binary { op, lhs, rhs } => write!(f, "({} {} {})", lhs, op, rhs),
        }
    }
}

/// Parse the expression of formula `formula`
pub fn parse_expression(formula: &str, input: &str) -> Result<Expr, ValidationError> {
    let syntax = |message: String| ValidationError::Syntax {
        formula: formula.to_string(),
        message,
    };

    if input.trim().is_empty() {
        return Err(syntax("empty expression".to_string()));
    }
    check_size(input).map_err(|message| syntax(message.to_string()))?;

    match parse_sum(input) {
        Ok((remaining, expr)) => {
            if remaining.trim().is_empty() {
                Ok(expr)
            } else {
                Err(syntax(format!(
                    "unexpected input at '{}'",
                    remaining.trim()
                )))
            }
        }
        Err(e) => Err(syntax(format!("{:?}", e))),
    }
}

/// Reject input whose tree would be too deep to walk recursively
fn check_size(input: &str) -> Result<(), &'static str> {
    let mut depth = 0usize;
    let mut operators = 0usize;
    for c in input.chars() {
        match c {
            '(' => {
                depth += 1;
                if depth > MAX_NESTING_DEPTH {
                    return Err("expression nested too deeply");
                }
            }
            ')' => depth = depth.saturating_sub(1),
            '+' | '-' | '*' | '/' => {
                operators += 1;
                if operators > MAX_OPERATORS {
                    return Err("expression has too many operators");
                }
            }
            _ => {}
        }
    }
    Ok(())
}

fn parse_sum(input: &str) -> IResult<&str, Expr> {
    let (input, first) = parse_product(input)?;
    fold_many0(
        pair(delimited(multispace0, one_of("+-"), multispace0), parse_product),
        move || first.clone(),
        |lhs, (op, rhs)| Expr::binary(BinaryOp::from_symbol(op), lhs, rhs),
    )
    .parse(input)
}

fn parse_product(input: &str) -> IResult<&str, Expr> {
    let (input, first) = parse_factor(input)?;
    fold_many0(
        pair(delimited(multispace0, one_of("*/"), multispace0), parse_factor),
        move || first.clone(),
        |lhs, (op, rhs)| Expr::binary(BinaryOp::from_symbol(op), lhs, rhs),
    )
    .parse(input)
}

fn parse_factor(input: &str) -> IResult<&str, Expr> {
    delimited(
        multispace0,
        alt((parse_number, parse_reference, parse_parens)),
        multispace0,
    )
    .parse(input)
}

fn parse_number(input: &str) -> IResult<&str, Expr> {
    map_res(
        recognize((digit1, opt((char('.'), digit1)))),
        |s: &str| s.parse::<f64>().map(Expr::Constant),
    )
    .parse(input)
}

fn parse_reference(input: &str) -> IResult<&str, Expr> {
    map(
        recognize((
            satisfy(|c: char| c.is_ascii_alphabetic() || c == '_'),
            take_while(|c: char| c.is_ascii_alphanumeric() || c == '_'),
        )),
        |s: &str| Expr::Reference(s.to_string()),
    )
    .parse(input)
}

fn parse_parens(input: &str) -> IResult<&str, Expr> {
    delimited(char('('), parse_sum, preceded(multispace0, char(')'))).parse(input)
}

/// Whether `name` is usable as a query name
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> Expr {
        parse_expression("F", input).unwrap()
    }

    fn r(name: &str) -> Expr {
        Expr::Reference(name.to_string())
    }

    #[test]
    fn test_single_reference() {
        assert_eq!(parse("A"), r("A"));
        assert_eq!(parse("  F1 "), r("F1"));
    }

    #[test]
    fn test_precedence() {
        // A + B * C  ==  A + (B * C)
        assert_eq!(
            parse("A + B * C"),
            Expr::binary(BinaryOp::Add, r("A"), Expr::binary(BinaryOp::Mul, r("B"), r("C")))
        );
    }

    #[test]
    fn test_left_associative() {
        // A - B - C  ==  (A - B) - C
        assert_eq!(
            parse("A-B-C"),
            Expr::binary(BinaryOp::Sub, Expr::binary(BinaryOp::Sub, r("A"), r("B")), r("C"))
        );
        assert_eq!(parse("A/B/C").to_string(), "((A / B) / C)");
    }

    #[test]
    fn test_parentheses_and_constants() {
        assert_eq!(parse("(A + B) * 100").to_string(), "((A + B) * 100)");
        assert_eq!(parse("A / 2.5").to_string(), "(A / 2.5)");
    }

    #[test]
    fn test_references_dedup_in_order() {
        let expr = parse("(B + A) / B * 100");
        assert_eq!(expr.references(), vec!["B", "A"]);
        assert!(parse("1 + 2").references().is_empty());
    }

    #[test]
    fn test_syntax_errors() {
        for bad in ["", "A +", "A B", "(A + B", "A + * B", "A % B", "1A"] {
            let err = parse_expression("F1", bad).unwrap_err();
            assert!(
                matches!(err, ValidationError::Syntax { ref formula, .. } if formula == "F1"),
                "expected syntax error for {:?}, got {:?}",
                bad,
                err
            );
        }
    }

    fn syntax_message(input: &str) -> String {
        match parse_expression("F1", input) {
            Err(ValidationError::Syntax { message, .. }) => message,
            other => panic!("expected syntax error, got {:?}", other),
        }
    }

    #[test]
    fn test_deep_nesting_rejected() {
        let deep = format!("{}A{}", "(".repeat(10_000), ")".repeat(10_000));
        assert_eq!(syntax_message(&deep), "expression nested too deeply");

        let limit = format!(
            "{}A{}",
            "(".repeat(MAX_NESTING_DEPTH),
            ")".repeat(MAX_NESTING_DEPTH)
        );
        assert_eq!(parse(&limit), r("A"));
    }

    #[test]
    fn test_long_operator_chain_rejected() {
        let chain = vec!["A"; 100_000].join(" + ");
        assert_eq!(syntax_message(&chain), "expression has too many operators");

        let chain = vec!["A"; MAX_OPERATORS + 1].join("+");
        assert_eq!(parse(&chain).references(), vec!["A"]);
    }

    #[test]
    fn test_division_by_zero_has_no_result() {
        assert_eq!(BinaryOp::Div.apply(10.0, 0.0), None);
        assert_eq!(BinaryOp::Div.apply(0.0, 10.0), Some(0.0));
        assert_eq!(BinaryOp::Mul.apply(2.0, 3.0), Some(6.0));
    }

    #[test]
    fn test_valid_names() {
        assert!(is_valid_name("A"));
        assert!(is_valid_name("_tmp1"));
        assert!(!is_valid_name("1A"));
        assert!(!is_valid_name("A-B"));
        assert!(!is_valid_name(""));
    }
}
