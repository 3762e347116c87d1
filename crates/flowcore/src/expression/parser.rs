//! Pratt parser turning tokens into an expression tree.
//!
//! Binding powers, loosest first: `||`, `&&`, `== !=`, `> < >= <=`,
//! `+ -`, `* / %`, prefix `! -`, then postfix member/index access.

use super::lexer::{tokenize, Token};
use crate::Value;

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum BinaryOp {
    Or,
    And,
    Eq,
    NotEq,
    Gt,
    Lt,
    GtEq,
    LtEq,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Literal(Value),
    /// Root of a path: `$trigger`, `$vars`, ... or a plain context key.
    Variable(String),
    Member(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Call {
        name: String,
        args: Vec<Expr>,
        kwargs: Vec<(String, Expr)>,
    },
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

const PREFIX_POWER: u8 = 13;

/// Deepest nesting accepted, counted both as parser recursion and as tree
/// height, so neither parsing nor evaluation can exhaust the stack.
const MAX_DEPTH: usize = 128;

/// An expression and the height of its tree.
type Parsed = (Expr, usize);

fn too_deep() -> String {
    format!("expression nested too deeply (limit {})", MAX_DEPTH)
}

fn deeper(height: usize) -> Result<usize, String> {
    if height >= MAX_DEPTH {
        Err(too_deep())
    } else {
        Ok(height + 1)
    }
}

fn infix_power(token: &Token) -> Option<(BinaryOp, u8, u8)> {
    let entry = match token {
        Token::Or => (BinaryOp::Or, 1, 2),
        Token::And => (BinaryOp::And, 3, 4),
        Token::Eq => (BinaryOp::Eq, 5, 6),
        Token::NotEq => (BinaryOp::NotEq, 5, 6),
        Token::Gt => (BinaryOp::Gt, 7, 8),
        Token::Lt => (BinaryOp::Lt, 7, 8),
        Token::GtEq => (BinaryOp::GtEq, 7, 8),
        Token::LtEq => (BinaryOp::LtEq, 7, 8),
        Token::Plus => (BinaryOp::Add, 9, 10),
        Token::Minus => (BinaryOp::Sub, 9, 10),
        Token::Star => (BinaryOp::Mul, 11, 12),
        Token::Slash => (BinaryOp::Div, 11, 12),
        Token::Percent => (BinaryOp::Mod, 11, 12),
        _ => return None,
    };
    Some(entry)
}

pub(crate) fn parse(input: &str) -> Result<Expr, String> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err("empty expression".to_string());
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let (expr, _) = parser.expression(0)?;
    match parser.peek() {
        None => Ok(expr),
        Some(token) => Err(format!("unexpected token {:?}", token)),
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), String> {
        match self.next() {
            Some(ref token) if *token == expected => Ok(()),
            Some(token) => Err(format!("expected {:?}, found {:?}", expected, token)),
            None => Err(format!("expected {:?}, found end of input", expected)),
        }
    }

    fn expression(&mut self, min_power: u8) -> Result<Parsed, String> {
        if self.depth >= MAX_DEPTH {
            return Err(too_deep());
        }
        self.depth += 1;
        let parsed = self.binary(min_power);
        self.depth -= 1;
        parsed
    }

    fn binary(&mut self, min_power: u8) -> Result<Parsed, String> {
        let (mut lhs, mut height) = self.prefix()?;

        while let Some(token) = self.peek() {
            let Some((op, left, right)) = infix_power(token) else {
                break;
            };
            if left < min_power {
                break;
            }
            self.pos += 1;
            let (rhs, rhs_height) = self.expression(right)?;
            height = deeper(height.max(rhs_height))?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }

        Ok((lhs, height))
    }

    fn prefix(&mut self) -> Result<Parsed, String> {
        let token = self
            .next()
            .ok_or_else(|| "unexpected end of input".to_string())?;

        let expr = match token {
            Token::Bang => {
                let (operand, height) = self.expression(PREFIX_POWER)?;
                return Ok((Expr::Unary(UnaryOp::Not, Box::new(operand)), deeper(height)?));
            }
            Token::Minus => {
                let (operand, height) = self.expression(PREFIX_POWER)?;
                return Ok((Expr::Unary(UnaryOp::Neg, Box::new(operand)), deeper(height)?));
            }
            Token::Int(n) => (Expr::Literal(Value::from(n)), 1),
            Token::Float(f) => (Expr::Literal(super::number_literal(f)), 1),
            Token::Str(s) => (Expr::Literal(Value::String(s)), 1),
            Token::LParen => {
                let inner = self.expression(0)?;
                self.expect(Token::RParen)?;
                inner
            }
            Token::Var(name) => (Expr::Variable(name), 1),
            Token::Ident(name) => {
                if self.peek() == Some(&Token::LParen) {
                    self.pos += 1;
                    self.call(name)?
                } else {
                    (keyword_literal(&name).unwrap_or(Expr::Variable(name)), 1)
                }
            }
            other => return Err(format!("unexpected token {:?}", other)),
        };

        self.postfix(expr)
    }

    fn postfix(&mut self, (mut expr, mut height): Parsed) -> Result<Parsed, String> {
        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.pos += 1;
                    match self.next() {
                        Some(Token::Segment(seg)) | Some(Token::Ident(seg)) => {
                            height = deeper(height)?;
                            expr = Expr::Member(Box::new(expr), seg);
                        }
                        other => return Err(format!("expected path segment, found {:?}", other)),
                    }
                }
                Some(Token::LBracket) => {
                    self.pos += 1;
                    let (index, index_height) = self.expression(0)?;
                    self.expect(Token::RBracket)?;
                    height = deeper(height.max(index_height))?;
                    expr = Expr::Index(Box::new(expr), Box::new(index));
                }
                _ => return Ok((expr, height)),
            }
        }
    }

    /// Arguments after the opening paren; `name=value` pairs become kwargs.
    fn call(&mut self, name: String) -> Result<Parsed, String> {
        let mut args = Vec::new();
        let mut kwargs = Vec::new();
        let mut height = 0;

        if self.peek() == Some(&Token::RParen) {
            self.pos += 1;
            return Ok((Expr::Call { name, args, kwargs }, 1));
        }

        loop {
            let keyword = match (self.peek(), self.peek_at(1)) {
                (Some(Token::Ident(key)), Some(Token::Assign)) => Some(key.clone()),
                _ => None,
            };
            if let Some(key) = keyword {
                self.pos += 2;
                let (value, value_height) = self.expression(0)?;
                height = height.max(value_height);
                kwargs.push((key, value));
            } else if kwargs.is_empty() {
                let (arg, arg_height) = self.expression(0)?;
                height = height.max(arg_height);
                args.push(arg);
            } else {
                return Err(format!("positional argument after keyword argument in {}()", name));
            }

            match self.next() {
                Some(Token::Comma) => continue,
                Some(Token::RParen) => break,
                other => return Err(format!("expected ',' or ')' in {}(), found {:?}", name, other)),
            }
        }

        Ok((Expr::Call { name, args, kwargs }, deeper(height)?))
    }
}

fn keyword_literal(name: &str) -> Option<Expr> {
    let value = match name.to_ascii_lowercase().as_str() {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        "null" | "none" => Value::Null,
        _ => return None,
    };
    Some(Expr::Literal(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn lit(v: Value) -> Box<Expr> {
        Box::new(Expr::Literal(v))
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        assert_eq!(
            parse("1 + 2 * 3").unwrap(),
            Expr::Binary(
                BinaryOp::Add,
                lit(json!(1)),
                Box::new(Expr::Binary(BinaryOp::Mul, lit(json!(2)), lit(json!(3))))
            )
        );
    }

    #[test]
    fn comparison_binds_tighter_than_logic() {
        let expr = parse("$vars.a == 1 && $vars.b > 2").unwrap();
        assert!(matches!(expr, Expr::Binary(BinaryOp::And, _, _)));
    }

    #[test]
    fn subtraction_is_left_associative() {
        assert_eq!(
            parse("10 - 4 - 3").unwrap(),
            Expr::Binary(
                BinaryOp::Sub,
                Box::new(Expr::Binary(BinaryOp::Sub, lit(json!(10)), lit(json!(4)))),
                lit(json!(3))
            )
        );
    }

    #[test]
    fn call_with_keyword_arguments() {
        let expr = parse("round($vars.x, digits=2)").unwrap();
        match expr {
            Expr::Call { name, args, kwargs } => {
                assert_eq!(name, "round");
                assert_eq!(args.len(), 1);
                assert_eq!(kwargs[0].0, "digits");
            }
            other => panic!("expected call, got {:?}", other),
        }
    }

    #[test]
    fn nested_calls_keep_commas_in_strings() {
        let expr = parse("join(split('a,b', ','), '; ')").unwrap();
        match expr {
            Expr::Call { args, .. } => assert_eq!(args.len(), 2),
            other => panic!("expected call, got {:?}", other),
        }
    }

    #[test]
    fn keywords_are_case_insensitive() {
        assert_eq!(parse("TRUE").unwrap(), Expr::Literal(json!(true)));
        assert_eq!(parse("None").unwrap(), Expr::Literal(Value::Null));
    }

    #[test]
    fn member_and_index_chain() {
        let expr = parse("$trigger.items[0].name").unwrap();
        assert!(matches!(expr, Expr::Member(_, ref seg) if seg == "name"));
    }

    fn too_deeply(result: Result<Expr, String>) -> bool {
        matches!(result, Err(ref msg) if msg.starts_with("expression nested too deeply"))
    }

    #[test]
    fn deep_parentheses_are_rejected() {
        let n = 10_000;
        let input = format!("{}1{}", "(".repeat(n), ")".repeat(n));
        assert!(too_deeply(parse(&input)));
        assert_eq!(parse(&format!("{}1{}", "(".repeat(50), ")".repeat(50))).unwrap(), Expr::Literal(json!(1)));
    }

    #[test]
    fn long_operator_chains_are_rejected() {
        assert!(too_deeply(parse(&format!("{}1", "!".repeat(5_000)))));
        assert!(too_deeply(parse(&format!("{}1", "-".repeat(5_000)))));
        assert!(too_deeply(parse(&format!("1{}", " + 1".repeat(5_000)))));
        assert!(too_deeply(parse(&format!("$vars{}", ".a".repeat(5_000)))));
        assert!(too_deeply(parse(&format!("{}1{}", "f(".repeat(5_000), ")".repeat(5_000)))));
        assert!(parse(&format!("1{}", " + 1".repeat(100))).is_ok());
    }

    #[test]
    fn trailing_tokens_are_rejected() {
        assert!(parse("1 2").is_err());
        assert!(parse("f(a=1, 2)").is_err());
        assert!(parse("").is_err());
    }
}
