//! Pratt parser producing an [`Expr`] tree.
//!
//! Binding powers, loosest first:
//!
//! | Operators                              | Power |
//! |----------------------------------------|-------|
//! | `\|\|`, `or`                           | 1     |
//! | `&&`, `and`                            | 3     |
//! | `== != < <= > >= in` `not in`          | 5     |
//! | prefix `!`, `not`, `-`                 | 7     |
//! | postfix `.field`, `[index]`            | 9     |

use crate::{
  error::{Error, Result},
  lex::{Spanned, Token},
  value::Value,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
  Or,
  And,
  Eq,
  Ne,
  Lt,
  Le,
  Gt,
  Ge,
  In,
  NotIn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
  Not,
  Neg,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
  Literal(Value),
  Ident(String),
  Member(Box<Expr>, String),
  Index(Box<Expr>, Box<Expr>),
  Call(String, Vec<Expr>),
  List(Vec<Expr>),
  Unary(UnaryOp, Box<Expr>),
  Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

const PREFIX_BP: u8 = 7;
const POSTFIX_BP: u8 = 9;

pub(crate) struct Parser {
  tokens: Vec<Spanned>,
  pos:    usize,
}

impl Parser {
  pub(crate) fn new(tokens: Vec<Spanned>) -> Self { Self { tokens, pos: 0 } }

  /// Parse one complete expression; trailing tokens are an error.
  pub(crate) fn parse(mut self) -> Result<Expr> {
    let expr = self.expr(0)?;
    match self.peek() {
      Token::Eof => Ok(expr),
      other => Err(self.syntax(format!("unexpected {other:?}"))),
    }
  }

  fn peek(&self) -> &Token {
    self.tokens.get(self.pos).map_or(&Token::Eof, |(_, t)| t)
  }

  fn peek_at(&self, offset: usize) -> &Token {
    self.tokens.get(self.pos + offset).map_or(&Token::Eof, |(_, t)| t)
  }

  fn offset(&self) -> usize {
    self
      .tokens
      .get(self.pos)
      .or_else(|| self.tokens.last())
      .map_or(0, |(p, _)| *p)
  }

  fn next(&mut self) -> Token {
    let tok = self.peek().clone();
    if self.pos < self.tokens.len() {
      self.pos += 1;
    }
    tok
  }

  fn syntax(&self, message: String) -> Error {
    Error::Syntax { pos: self.offset(), message }
  }

  fn expect(&mut self, want: &Token) -> Result<()> {
    if self.peek() == want {
      self.next();
      Ok(())
    } else {
      Err(self.syntax(format!("expected {want:?}, found {:?}", self.peek())))
    }
  }

  fn expr(&mut self, min_bp: u8) -> Result<Expr> {
    let mut lhs = self.prefix()?;

    loop {
      // Postfix.
      match self.peek() {
        Token::Dot if POSTFIX_BP >= min_bp => {
          self.next();
          match self.next() {
            Token::Ident(name) => lhs = Expr::Member(Box::new(lhs), name),
            other => return Err(self.syntax(format!("expected field name, found {other:?}"))),
          }
          continue;
        }
        Token::LBracket if POSTFIX_BP >= min_bp => {
          self.next();
          let index = self.expr(0)?;
          self.expect(&Token::RBracket)?;
          lhs = Expr::Index(Box::new(lhs), Box::new(index));
          continue;
        }
        _ => {}
      }

      // Infix.
      let (op, width) = match (self.peek(), self.peek_at(1)) {
        (Token::Or, _) => (BinaryOp::Or, 1),
        (Token::And, _) => (BinaryOp::And, 1),
        (Token::Eq, _) => (BinaryOp::Eq, 1),
        (Token::Ne, _) => (BinaryOp::Ne, 1),
        (Token::Lt, _) => (BinaryOp::Lt, 1),
        (Token::Le, _) => (BinaryOp::Le, 1),
        (Token::Gt, _) => (BinaryOp::Gt, 1),
        (Token::Ge, _) => (BinaryOp::Ge, 1),
        (Token::In, _) => (BinaryOp::In, 1),
        (Token::Not, Token::In) => (BinaryOp::NotIn, 2),
        _ => break,
      };
      let (lbp, rbp) = infix_bp(op);
      if lbp < min_bp {
        break;
      }
      for _ in 0..width {
        self.next();
      }
      let rhs = self.expr(rbp)?;
      lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
    }

    Ok(lhs)
  }

  fn prefix(&mut self) -> Result<Expr> {
    match self.next() {
      Token::Int(n) => Ok(Expr::Literal(Value::Int(n))),
      Token::Float(f) => Ok(Expr::Literal(Value::Float(f))),
      Token::Str(s) => Ok(Expr::Literal(Value::Str(s))),
      Token::True => Ok(Expr::Literal(Value::Bool(true))),
      Token::False => Ok(Expr::Literal(Value::Bool(false))),
      Token::Null => Ok(Expr::Literal(Value::Null)),
      Token::Not => Ok(Expr::Unary(UnaryOp::Not, Box::new(self.expr(PREFIX_BP)?))),
      Token::Minus => Ok(Expr::Unary(UnaryOp::Neg, Box::new(self.expr(PREFIX_BP)?))),
      Token::LParen => {
        let inner = self.expr(0)?;
        self.expect(&Token::RParen)?;
        Ok(inner)
      }
      Token::LBracket => {
        let items = self.list(&Token::RBracket)?;
        Ok(Expr::List(items))
      }
      Token::Ident(name) => {
        if self.peek() == &Token::LParen {
          self.next();
          let args = self.list(&Token::RParen)?;
          Ok(Expr::Call(name, args))
        } else {
          Ok(Expr::Ident(name))
        }
      }
      other => Err(self.syntax(format!("unexpected {other:?}"))),
    }
  }

  /// Comma-separated expressions up to and including `close`. A trailing
  /// comma is allowed.
  fn list(&mut self, close: &Token) -> Result<Vec<Expr>> {
    let mut items = Vec::new();
    loop {
      if self.peek() == close {
        self.next();
        return Ok(items);
      }
      items.push(self.expr(0)?);
      match self.peek() {
        Token::Comma => {
          self.next();
        }
        t if t == close => {}
        other => return Err(self.syntax(format!("expected ',' or {close:?}, found {other:?}"))),
      }
    }
  }
}

fn infix_bp(op: BinaryOp) -> (u8, u8) {
  match op {
    BinaryOp::Or => (1, 2),
    BinaryOp::And => (3, 4),
    _ => (5, 6),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::lex::tokenize;

  fn parse(src: &str) -> Result<Expr> { Parser::new(tokenize(src)?).parse() }

  fn ident(s: &str) -> Box<Expr> { Box::new(Expr::Ident(s.into())) }

  fn int(n: i64) -> Box<Expr> { Box::new(Expr::Literal(Value::Int(n))) }

  #[test]
  fn and_binds_tighter_than_or() {
    let e = parse("a || b && c").unwrap();
    assert_eq!(
      e,
      Expr::Binary(
        BinaryOp::Or,
        ident("a"),
        Box::new(Expr::Binary(BinaryOp::And, ident("b"), ident("c")))
      )
    );
  }

  #[test]
  fn comparison_binds_tighter_than_and() {
    let e = parse("a > 1 and b == 2").unwrap();
    assert_eq!(
      e,
      Expr::Binary(
        BinaryOp::And,
        Box::new(Expr::Binary(BinaryOp::Gt, ident("a"), int(1))),
        Box::new(Expr::Binary(BinaryOp::Eq, ident("b"), int(2)))
      )
    );
  }

  #[test]
  fn member_and_index_chain() {
    let e = parse("Report.drops[0].itemId").unwrap();
    assert_eq!(
      e,
      Expr::Member(
        Box::new(Expr::Index(
          Box::new(Expr::Member(ident("Report"), "drops".into())),
          int(0)
        )),
        "itemId".into()
      )
    );
  }

  #[test]
  fn not_in_is_one_operator() {
    let e = parse("x not in [1, 2,]").unwrap();
    assert_eq!(
      e,
      Expr::Binary(
        BinaryOp::NotIn,
        ident("x"),
        Box::new(Expr::List(vec![*int(1), *int(2)]))
      )
    );
  }

  #[test]
  fn calls_take_arguments() {
    let e = parse("startsWith(Task.source, 'Meo')").unwrap();
    assert!(matches!(e, Expr::Call(ref name, ref args) if name == "startsWith" && args.len() == 2));
  }

  #[test]
  fn trailing_tokens_are_rejected() {
    assert!(matches!(parse("a b"), Err(Error::Syntax { .. })));
    assert!(matches!(parse("(a"), Err(Error::Syntax { .. })));
    assert!(matches!(parse("a."), Err(Error::Syntax { .. })));
  }
}
