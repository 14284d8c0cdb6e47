//! Recursive-descent formula parser.
//!
//! Precedence, loosest first:
//!
//! 1. `c ? a : b`
//! 2. `??`
//! 3. `||`
//! 4. `&&`
//! 5. `==` `!=`
//! 6. `<` `<=` `>` `>=` `in`
//! 7. `+` `-`
//! 8. `*` `/` `%`
//! 9. unary `-` `+` `!`
//! 10. `**` (right-associative)
//! 11. postfix `.field` and `[index]`
//! 12. literals, identifiers, calls, `( )`, `[ ]`, `if c { a } else { b }`
//!
//! Input is untrusted, so both the recursion depth and the depth of the
//! tree being built are bounded; anything deeper is a
//! [`CompileError::NestingTooDeep`].

use crate::ast::{BinaryOp, Expr, UnaryOp};
use crate::error::CompileError;
use crate::lexer::{tokenize, Token, TokenKind};
use crate::value::Value;

/// Deepest nesting of groups, calls, brackets, blocks and prefix operators.
pub const MAX_NESTING: usize = 64;

/// Deepest expression tree the parser builds, counting operator chains.
pub const MAX_TREE_DEPTH: usize = 256;

/// Parses a formula into an expression tree.
pub fn parse(src: &str) -> Result<Expr, CompileError> {
    let tokens = tokenize(src)?;
    if tokens.len() <= 1 {
        return Err(CompileError::Empty);
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.expression()?;
    if *parser.peek() != TokenKind::Eof {
        return Err(parser.unexpected("end of formula"));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    /// Current recursion depth, see [`MAX_NESTING`].
    depth: usize,
}

impl Parser {
    // === Token access ===

    fn current(&self) -> &Token {
        // The token list always ends with Eof and `advance` never moves past it.
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek(&self) -> &TokenKind {
        &self.current().kind
    }

    fn advance(&mut self) -> TokenKind {
        let kind = self.peek().clone();
        if kind != TokenKind::Eof {
            self.pos += 1;
        }
        kind
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek() == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, expected: &'static str) -> Result<(), CompileError> {
        if self.eat(&kind) {
            Ok(())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn unexpected(&self, expected: &'static str) -> CompileError {
        let token = self.current();
        CompileError::UnexpectedToken {
            found: token.kind.to_string(),
            expected,
            offset: token.offset,
        }
    }

    /// Runs `production` one nesting level deeper.
    fn nested(
        &mut self,
        production: fn(&mut Self) -> Result<Expr, CompileError>,
    ) -> Result<Expr, CompileError> {
        if self.depth >= MAX_NESTING {
            return Err(CompileError::NestingTooDeep { max: MAX_NESTING });
        }
        self.depth += 1;
        let result = production(self);
        self.depth -= 1;
        result
    }

    // === Grammar ===

    fn expression(&mut self) -> Result<Expr, CompileError> {
        self.nested(Self::ternary)
    }

    fn ternary(&mut self) -> Result<Expr, CompileError> {
        let cond = self.coalesce()?;
        if !self.eat(&TokenKind::Question) {
            return Ok(cond);
        }
        let then = self.expression()?;
        self.expect(TokenKind::Colon, "':'")?;
        let otherwise = self.expression()?;
        Ok(Expr::Conditional {
            cond: Box::new(cond),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    fn coalesce(&mut self) -> Result<Expr, CompileError> {
        self.binary_level(
            |t| matches!(t, TokenKind::QuestionQuestion).then_some(BinaryOp::Coalesce),
            Self::or,
        )
    }

    fn or(&mut self) -> Result<Expr, CompileError> {
        self.binary_level(
            |t| matches!(t, TokenKind::OrOr).then_some(BinaryOp::Or),
            Self::and,
        )
    }

    fn and(&mut self) -> Result<Expr, CompileError> {
        self.binary_level(
            |t| matches!(t, TokenKind::AndAnd).then_some(BinaryOp::And),
            Self::equality,
        )
    }

    fn equality(&mut self) -> Result<Expr, CompileError> {
        self.binary_level(
            |t| match t {
                TokenKind::EqEq => Some(BinaryOp::Eq),
                TokenKind::NotEq => Some(BinaryOp::NotEq),
                _ => None,
            },
            Self::relational,
        )
    }

    fn relational(&mut self) -> Result<Expr, CompileError> {
        self.binary_level(
            |t| match t {
                TokenKind::Lt => Some(BinaryOp::Lt),
                TokenKind::LtEq => Some(BinaryOp::LtEq),
                TokenKind::Gt => Some(BinaryOp::Gt),
                TokenKind::GtEq => Some(BinaryOp::GtEq),
                TokenKind::In => Some(BinaryOp::In),
                _ => None,
            },
            Self::additive,
        )
    }

    fn additive(&mut self) -> Result<Expr, CompileError> {
        self.binary_level(
            |t| match t {
                TokenKind::Plus => Some(BinaryOp::Add),
                TokenKind::Minus => Some(BinaryOp::Sub),
                _ => None,
            },
            Self::multiplicative,
        )
    }

    fn multiplicative(&mut self) -> Result<Expr, CompileError> {
        self.binary_level(
            |t| match t {
                TokenKind::Star => Some(BinaryOp::Mul),
                TokenKind::Slash => Some(BinaryOp::Div),
                TokenKind::Percent => Some(BinaryOp::Mod),
                _ => None,
            },
            Self::unary,
        )
    }

    /// Parses a left-associative chain of operators drawn from `op_for`.
    fn binary_level(
        &mut self,
        op_for: fn(&TokenKind) -> Option<BinaryOp>,
        operand: fn(&mut Self) -> Result<Expr, CompileError>,
    ) -> Result<Expr, CompileError> {
        let mut lhs = operand(self)?;
        let mut depth = tree_depth(&lhs);
        while let Some(op) = op_for(self.peek()) {
            self.advance();
            let rhs = operand(self)?;
            depth = deepen(depth.max(tree_depth(&rhs)))?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, CompileError> {
        let op = match self.peek() {
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Plus => UnaryOp::Plus,
            TokenKind::Bang => UnaryOp::Not,
            _ => return self.power(),
        };
        self.advance();
        let operand = self.nested(Self::unary)?;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    fn power(&mut self) -> Result<Expr, CompileError> {
        let base = self.postfix()?;
        if !self.eat(&TokenKind::Power) {
            return Ok(base);
        }
        let exponent = self.nested(Self::unary)?;
        Ok(Expr::Binary {
            op: BinaryOp::Pow,
            lhs: Box::new(base),
            rhs: Box::new(exponent),
        })
    }

    fn postfix(&mut self) -> Result<Expr, CompileError> {
        let mut expr = self.primary()?;
        let mut depth = tree_depth(&expr);
        loop {
            if self.eat(&TokenKind::Dot) {
                let TokenKind::Ident(field) = self.peek().clone() else {
                    return Err(self.unexpected("field name"));
                };
                self.advance();
                depth = deepen(depth)?;
                expr = Expr::Member {
                    target: Box::new(expr),
                    field,
                };
            } else if self.eat(&TokenKind::LBracket) {
                let index = self.expression()?;
                self.expect(TokenKind::RBracket, "']'")?;
                depth = deepen(depth.max(tree_depth(&index)))?;
                expr = Expr::Index {
                    target: Box::new(expr),
                    index: Box::new(index),
                };
            } else {
                return Ok(expr);
            }
        }
    }

    fn primary(&mut self) -> Result<Expr, CompileError> {
        let expr = match self.peek().clone() {
            TokenKind::Int(v) => Expr::Literal(Value::Int(v)),
            TokenKind::Float(v) => Expr::Literal(Value::Float(v)),
            TokenKind::Str(s) => Expr::Literal(Value::Str(s)),
            TokenKind::True => Expr::Literal(Value::Bool(true)),
            TokenKind::False => Expr::Literal(Value::Bool(false)),
            TokenKind::Null => Expr::Literal(Value::Null),
            TokenKind::Ident(name) => {
                self.advance();
                if self.eat(&TokenKind::LParen) {
                    let args = self.list(TokenKind::RParen, "')'")?;
                    return Ok(Expr::Call { name, args });
                }
                return Ok(Expr::Ident(name));
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.expression()?;
                self.expect(TokenKind::RParen, "')'")?;
                return Ok(inner);
            }
            TokenKind::LBracket => {
                self.advance();
                let items = self.list(TokenKind::RBracket, "']'")?;
                return Ok(Expr::Array(items));
            }
            TokenKind::If => {
                self.advance();
                return self.if_expression();
            }
            _ => return Err(self.unexpected("expression")),
        };
        self.advance();
        Ok(expr)
    }

    /// Comma-separated expressions up to `close`, which is consumed.
    /// A trailing comma is allowed.
    fn list(&mut self, close: TokenKind, expected: &'static str) -> Result<Vec<Expr>, CompileError> {
        let mut items = Vec::new();
        loop {
            if self.eat(&close) {
                return Ok(items);
            }
            items.push(self.expression()?);
            if !self.eat(&TokenKind::Comma) {
                self.expect(close, expected)?;
                return Ok(items);
            }
        }
    }

    /// `if` has been consumed.
    fn if_expression(&mut self) -> Result<Expr, CompileError> {
        let cond = self.expression()?;
        let then = self.block()?;
        self.expect(TokenKind::Else, "'else'")?;
        let otherwise = if self.eat(&TokenKind::If) {
            self.nested(Self::if_expression)?
        } else {
            self.block()?
        };
        Ok(Expr::Conditional {
            cond: Box::new(cond),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    fn block(&mut self) -> Result<Expr, CompileError> {
        self.expect(TokenKind::LBrace, "'{'")?;
        let inner = self.expression()?;
        self.expect(TokenKind::RBrace, "'}'")?;
        Ok(inner)
    }
}

/// One level above `depth`, or an error past [`MAX_TREE_DEPTH`].
fn deepen(depth: usize) -> Result<usize, CompileError> {
    if depth >= MAX_TREE_DEPTH {
        return Err(CompileError::NestingTooDeep {
            max: MAX_TREE_DEPTH,
        });
    }
    Ok(depth + 1)
}

/// Height of `expr`, a leaf being 1. Walks with an explicit stack.
fn tree_depth(expr: &Expr) -> usize {
    let mut deepest = 0;
    let mut stack = vec![(expr, 1)];
    while let Some((expr, depth)) = stack.pop() {
        deepest = deepest.max(depth);
        let below = depth + 1;
        match expr {
            Expr::Literal(_) | Expr::Ident(_) => {}
            Expr::Array(items) | Expr::Call { args: items, .. } => {
                stack.extend(items.iter().map(|item| (item, below)));
            }
            Expr::Member { target, .. } => stack.push((target, below)),
            Expr::Unary { operand, .. } => stack.push((operand, below)),
            Expr::Index { target, index } => {
                stack.push((target, below));
                stack.push((index, below));
            }
            Expr::Binary { lhs, rhs, .. } => {
                stack.push((lhs, below));
                stack.push((rhs, below));
            }
            Expr::Conditional {
                cond,
                then,
                otherwise,
            } => {
                stack.push((cond, below));
                stack.push((then, below));
                stack.push((otherwise, below));
            }
        }
    }
    deepest
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(v: i64) -> Box<Expr> {
        Box::new(Expr::Literal(Value::Int(v)))
    }

    fn ident(name: &str) -> Box<Expr> {
        Box::new(Expr::Ident(name.into()))
    }

    #[test]
    fn test_multiplication_binds_tighter_than_addition() {
        assert_eq!(
            parse("1 + 2 * 3").unwrap(),
            Expr::Binary {
                op: BinaryOp::Add,
                lhs: int(1),
                rhs: Box::new(Expr::Binary {
                    op: BinaryOp::Mul,
                    lhs: int(2),
                    rhs: int(3),
                }),
            }
        );
    }

    #[test]
    fn test_subtraction_is_left_associative() {
        assert_eq!(
            parse("a - b - c").unwrap(),
            Expr::Binary {
                op: BinaryOp::Sub,
                lhs: Box::new(Expr::Binary {
                    op: BinaryOp::Sub,
                    lhs: ident("a"),
                    rhs: ident("b"),
                }),
                rhs: ident("c"),
            }
        );
    }

    #[test]
    fn test_power_is_right_associative_and_binds_above_negation() {
        assert_eq!(
            parse("-2 ** 3 ** 2").unwrap(),
            Expr::Unary {
                op: UnaryOp::Neg,
                operand: Box::new(Expr::Binary {
                    op: BinaryOp::Pow,
                    lhs: int(2),
                    rhs: Box::new(Expr::Binary {
                        op: BinaryOp::Pow,
                        lhs: int(3),
                        rhs: int(2),
                    }),
                }),
            }
        );
    }

    #[test]
    fn test_postfix_chain() {
        assert_eq!(
            parse("a.b[0]").unwrap(),
            Expr::Index {
                target: Box::new(Expr::Member {
                    target: ident("a"),
                    field: "b".into(),
                }),
                index: int(0),
            }
        );
    }

    #[test]
    fn test_calls_and_arrays() {
        assert_eq!(
            parse("sum([1, 2,], x)").unwrap(),
            Expr::Call {
                name: "sum".into(),
                args: vec![Expr::Array(vec![*int(1), *int(2)]), *ident("x")],
            }
        );
        assert_eq!(
            parse("f()").unwrap(),
            Expr::Call {
                name: "f".into(),
                args: vec![],
            }
        );
    }

    #[test]
    fn test_if_and_ternary_build_the_same_tree() {
        assert_eq!(
            parse("if a { 1 } else { 2 }").unwrap(),
            parse("a ? 1 : 2").unwrap()
        );
        assert!(matches!(
            parse("if a { 1 } else if b { 2 } else { 3 }").unwrap(),
            Expr::Conditional { .. }
        ));
    }

    #[test]
    fn test_errors() {
        assert_eq!(parse("").unwrap_err(), CompileError::Empty);
        assert_eq!(parse("   ").unwrap_err(), CompileError::Empty);
        assert!(matches!(
            parse("1 +").unwrap_err(),
            CompileError::UnexpectedToken {
                expected: "expression",
                ..
            }
        ));
        assert!(matches!(
            parse("(1 + 2").unwrap_err(),
            CompileError::UnexpectedToken { expected: "')'", .. }
        ));
        assert!(matches!(
            parse("1 2").unwrap_err(),
            CompileError::UnexpectedToken {
                expected: "end of formula",
                offset: 2,
                ..
            }
        ));
        assert!(matches!(
            parse("a.").unwrap_err(),
            CompileError::UnexpectedToken {
                expected: "field name",
                ..
            }
        ));
    }

    fn too_deep(src: &str) -> bool {
        matches!(parse(src), Err(CompileError::NestingTooDeep { .. }))
    }

    #[test]
    fn test_moderate_nesting_parses() {
        let depth = MAX_NESTING / 2;
        let src = format!("{}1{}", "(".repeat(depth), ")".repeat(depth));
        assert_eq!(parse(&src).unwrap(), *int(1));
        let sum = vec!["a"; MAX_TREE_DEPTH / 2].join(" + ");
        assert!(parse(&sum).is_ok());
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        let n = 10_000;
        assert!(too_deep(&format!("{}1{}", "(".repeat(n), ")".repeat(n))));
        assert!(too_deep(&format!("{}1{}", "[".repeat(n), "]".repeat(n))));
        assert!(too_deep(&format!("{}1{}", "f(".repeat(n), ")".repeat(n))));
        assert!(too_deep(&format!("{}1", "-".repeat(n))));
        assert!(too_deep(&vec!["2"; n].join(" ** ")));
        assert!(too_deep(&format!("{}1", "a ? 1 : ".repeat(n))));
        assert!(too_deep(&format!("{}{{ 2 }}", "if a { 1 } else ".repeat(n))));
    }

    #[test]
    fn test_long_chains_are_rejected() {
        let n = 10_000;
        assert!(too_deep(&vec!["1"; n].join(" + ")));
        assert!(too_deep(&vec!["x"; n].join(" && ")));
        assert!(too_deep(&format!("a{}", ".b".repeat(n))));
        assert!(too_deep(&format!("a{}", "[0]".repeat(n))));
    }
}
