//! Recursive-descent parser producing a resolved AST.
//!
//! Precedence, loosest first:
//!   `+ -`  <  `* / %`  <  unary `- +`  <  `**` (right-assoc)  <  call / atom
//!
//! As in most calculator grammars `-2 ** 2` is `-(2 ** 2)` and the exponent may
//! itself carry a sign (`2 ** -1`).

use super::lexer::{Spanned, Token};
use super::{ExprError, Function};

/// Deepest an expression may nest, counting signs, operators, parentheses and
/// calls. Keeps parsing, evaluation and drop within a bounded stack.
pub const MAX_DEPTH: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Plus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Const(f64),
    /// Index into the expression's variable slots.
    Var(usize),
    Unary(UnaryOp, Box<Node>),
    Binary(BinaryOp, Box<Node>, Box<Node>),
    Call(Function, Vec<Node>),
}

pub struct Parser<'a> {
    tokens: &'a [Spanned],
    pos: usize,
    variables: &'a [String],
    src_len: usize,
    depth: usize,
}

/// A node and the height of the tree below it.
type Parsed = (Node, usize);

fn grow(node: Node, child_height: usize, at: usize) -> Result<Parsed, ExprError> {
    let height = child_height + 1;
    if height > MAX_DEPTH {
        return Err(ExprError::TooDeep { pos: at });
    }
    Ok((node, height))
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Spanned], variables: &'a [String], src_len: usize) -> Self {
        Self {
            tokens,
            pos: 0,
            variables,
            src_len,
            depth: 0,
        }
    }

    pub fn parse(mut self) -> Result<Node, ExprError> {
        let (node, _) = self.expr()?;
        if let Some(tok) = self.tokens.get(self.pos) {
            return Err(ExprError::UnexpectedToken {
                found: tok.token.describe(),
                pos: tok.pos,
            });
        }
        Ok(node)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    /// Source offset of the next token.
    fn here(&self) -> usize {
        self.tokens.get(self.pos).map_or(self.src_len, |t| t.pos)
    }

    fn next(&mut self) -> Result<&'a Spanned, ExprError> {
        let tokens = self.tokens;
        let tok = tokens.get(self.pos).ok_or(ExprError::UnexpectedEnd {
            pos: self.src_len,
        })?;
        self.pos += 1;
        Ok(tok)
    }

    fn eat(&mut self, want: &Token) -> bool {
        if self.peek() == Some(want) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, want: Token) -> Result<(), ExprError> {
        let tok = self.next()?;
        if tok.token == want {
            Ok(())
        } else {
            Err(ExprError::UnexpectedToken {
                found: tok.token.describe(),
                pos: tok.pos,
            })
        }
    }

    fn enter(&mut self, at: usize) -> Result<(), ExprError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ExprError::TooDeep { pos: at });
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn expr(&mut self) -> Result<Parsed, ExprError> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            let at = self.here();
            self.pos += 1;
            let rhs = self.term()?;
            let height = lhs.1.max(rhs.1);
            lhs = grow(Node::Binary(op, Box::new(lhs.0), Box::new(rhs.0)), height, at)?;
        }
    }

    fn term(&mut self) -> Result<Parsed, ExprError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                Some(Token::Percent) => BinaryOp::Mod,
                _ => return Ok(lhs),
            };
            let at = self.here();
            self.pos += 1;
            let rhs = self.unary()?;
            let height = lhs.1.max(rhs.1);
            lhs = grow(Node::Binary(op, Box::new(lhs.0), Box::new(rhs.0)), height, at)?;
        }
    }

    fn unary(&mut self) -> Result<Parsed, ExprError> {
        let at = self.here();
        let op = if self.eat(&Token::Minus) {
            UnaryOp::Neg
        } else if self.eat(&Token::Plus) {
            UnaryOp::Plus
        } else {
            return self.power();
        };
        self.enter(at)?;
        let (inner, height) = self.unary()?;
        self.leave();
        grow(Node::Unary(op, Box::new(inner)), height, at)
    }

    fn power(&mut self) -> Result<Parsed, ExprError> {
        let base = self.atom()?;
        let at = self.here();
        if self.eat(&Token::StarStar) {
            self.enter(at)?;
            let exp = self.unary()?;
            self.leave();
            let height = base.1.max(exp.1);
            return grow(
                Node::Binary(BinaryOp::Pow, Box::new(base.0), Box::new(exp.0)),
                height,
                at,
            );
        }
        Ok(base)
    }

    fn atom(&mut self) -> Result<Parsed, ExprError> {
        let tok = self.next()?;
        match &tok.token {
            Token::Number(n) => Ok((Node::Const(*n), 1)),
            Token::LParen => {
                self.enter(tok.pos)?;
                let inner = self.expr()?;
                self.expect(Token::RParen)?;
                self.leave();
                Ok(inner)
            }
            Token::Ident(name) => {
                if self.eat(&Token::LParen) {
                    self.enter(tok.pos)?;
                    let call = self.call(name, tok.pos)?;
                    self.leave();
                    Ok(call)
                } else {
                    Ok((self.identifier(name)?, 1))
                }
            }
            other => Err(ExprError::UnexpectedToken {
                found: other.describe(),
                pos: tok.pos,
            }),
        }
    }

    fn identifier(&self, name: &str) -> Result<Node, ExprError> {
        // bound variables shadow the built-in constant
        if let Some(slot) = self.variables.iter().position(|v| v == name) {
            return Ok(Node::Var(slot));
        }
        match name {
            "pi" => Ok(Node::Const(std::f64::consts::PI)),
            _ if Function::from_name(name).is_some() => Err(ExprError::NotAValue(name.to_string())),
            _ => Err(ExprError::UnknownVariable(name.to_string())),
        }
    }

    fn call(&mut self, name: &str, at: usize) -> Result<Parsed, ExprError> {
        let func = match Function::from_name(name) {
            Some(f) => f,
            None if name == "pi" || self.variables.iter().any(|v| v == name) => {
                return Err(ExprError::NotCallable(name.to_string()))
            }
            None => return Err(ExprError::UnknownFunction(name.to_string())),
        };
        let mut args = Vec::new();
        let mut height = 0;
        if !self.eat(&Token::RParen) {
            loop {
                let (arg, h) = self.expr()?;
                args.push(arg);
                height = height.max(h);
                if self.eat(&Token::Comma) {
                    continue;
                }
                self.expect(Token::RParen)?;
                break;
            }
        }
        func.check_arity(args.len())?;
        grow(Node::Call(func, args), height, at)
    }
}
