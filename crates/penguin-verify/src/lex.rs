//! Tokenizer for the rule language.

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
  Ident(String),
  Int(i64),
  Float(f64),
  Str(String),
  True,
  False,
  Null,
  In,
  Not,
  And,
  Or,
  Eq,
  Ne,
  Lt,
  Le,
  Gt,
  Ge,
  Minus,
  LParen,
  RParen,
  LBracket,
  RBracket,
  Comma,
  Dot,
  Eof,
}

/// A token and the byte offset it starts at.
pub(crate) type Spanned = (usize, Token);

pub(crate) fn tokenize(src: &str) -> Result<Vec<Spanned>> {
  let bytes = src.as_bytes();
  let mut out = Vec::new();
  let mut i = 0;

  while i < bytes.len() {
    let c = bytes[i];
    let start = i;
    match c {
      b' ' | b'\t' | b'\r' | b'\n' => {
        i += 1;
        continue;
      }
      b'(' => push(&mut out, &mut i, start, Token::LParen, 1),
      b')' => push(&mut out, &mut i, start, Token::RParen, 1),
      b'[' => push(&mut out, &mut i, start, Token::LBracket, 1),
      b']' => push(&mut out, &mut i, start, Token::RBracket, 1),
      b',' => push(&mut out, &mut i, start, Token::Comma, 1),
      b'-' => push(&mut out, &mut i, start, Token::Minus, 1),
      b'=' if bytes.get(i + 1) == Some(&b'=') => push(&mut out, &mut i, start, Token::Eq, 2),
      b'!' if bytes.get(i + 1) == Some(&b'=') => push(&mut out, &mut i, start, Token::Ne, 2),
      b'!' => push(&mut out, &mut i, start, Token::Not, 1),
      b'<' if bytes.get(i + 1) == Some(&b'=') => push(&mut out, &mut i, start, Token::Le, 2),
      b'<' => push(&mut out, &mut i, start, Token::Lt, 1),
      b'>' if bytes.get(i + 1) == Some(&b'=') => push(&mut out, &mut i, start, Token::Ge, 2),
      b'>' => push(&mut out, &mut i, start, Token::Gt, 1),
      b'&' if bytes.get(i + 1) == Some(&b'&') => push(&mut out, &mut i, start, Token::And, 2),
      b'|' if bytes.get(i + 1) == Some(&b'|') => push(&mut out, &mut i, start, Token::Or, 2),
      b'"' | b'\'' => {
        let (s, next) = string(src, i)?;
        out.push((start, Token::Str(s)));
        i = next;
      }
      b'.' if !bytes.get(i + 1).is_some_and(u8::is_ascii_digit) => {
        push(&mut out, &mut i, start, Token::Dot, 1)
      }
      b'0'..=b'9' | b'.' => {
        let (tok, next) = number(src, i)?;
        out.push((start, tok));
        i = next;
      }
      c if c.is_ascii_alphabetic() || c == b'_' => {
        let end = src[i..]
          .find(|ch: char| !(ch.is_ascii_alphanumeric() || ch == '_'))
          .map_or(src.len(), |n| i + n);
        out.push((start, keyword_or_ident(&src[i..end])));
        i = end;
      }
      _ => {
        let ch = src[i..].chars().next().unwrap_or('\0');
        return Err(Error::UnexpectedChar { pos: i, ch });
      }
    }
  }

  out.push((src.len(), Token::Eof));
  Ok(out)
}

fn push(out: &mut Vec<Spanned>, i: &mut usize, start: usize, tok: Token, width: usize) {
  out.push((start, tok));
  *i += width;
}

fn keyword_or_ident(word: &str) -> Token {
  match word {
    "true" => Token::True,
    "false" => Token::False,
    "null" | "nil" => Token::Null,
    "in" => Token::In,
    "not" => Token::Not,
    "and" => Token::And,
    "or" => Token::Or,
    _ => Token::Ident(word.to_owned()),
  }
}

/// Parse a quoted string starting at `start`; returns the unescaped value and
/// the offset just past the closing quote.
fn string(src: &str, start: usize) -> Result<(String, usize)> {
  let mut chars = src[start..].char_indices();
  let Some((_, quote)) = chars.next() else {
    return Err(Error::UnterminatedString(start));
  };
  let mut out = String::new();
  while let Some((off, ch)) = chars.next() {
    match ch {
      '\\' => match chars.next() {
        Some((_, 'n')) => out.push('\n'),
        Some((_, 't')) => out.push('\t'),
        Some((_, other)) => out.push(other),
        None => break,
      },
      c if c == quote => return Ok((out, start + off + c.len_utf8())),
      c => out.push(c),
    }
  }
  Err(Error::UnterminatedString(start))
}

fn number(src: &str, start: usize) -> Result<(Token, usize)> {
  let end = src[start..]
    .find(|ch: char| !(ch.is_ascii_digit() || ch == '.' || ch == '_'))
    .map_or(src.len(), |n| start + n);
  let text: String = src[start..end].chars().filter(|&c| c != '_').collect();
  let tok = if text.contains('.') {
    text
      .parse()
      .map(Token::Float)
      .map_err(|_| Error::InvalidNumber(text.clone()))?
  } else {
    text
      .parse()
      .map(Token::Int)
      .map_err(|_| Error::InvalidNumber(text.clone()))?
  };
  Ok((tok, end))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn kinds(src: &str) -> Vec<Token> {
    tokenize(src).unwrap().into_iter().map(|(_, t)| t).collect()
  }

  #[test]
  fn operators_and_keywords() {
    assert_eq!(kinds("a.b >= 3 && not c"), vec![
      Token::Ident("a".into()),
      Token::Dot,
      Token::Ident("b".into()),
      Token::Ge,
      Token::Int(3),
      Token::And,
      Token::Not,
      Token::Ident("c".into()),
      Token::Eof,
    ]);
  }

  #[test]
  fn strings_accept_both_quotes_and_escapes() {
    assert_eq!(kinds(r#"'it\'s' "x""#), vec![
      Token::Str("it's".into()),
      Token::Str("x".into()),
      Token::Eof,
    ]);
  }

  #[test]
  fn floats_and_ints() {
    assert_eq!(kinds("1.5 10 .5"), vec![
      Token::Float(1.5),
      Token::Int(10),
      Token::Float(0.5),
      Token::Eof,
    ]);
  }

  #[test]
  fn unterminated_string_is_an_error() {
    assert_eq!(tokenize("'abc"), Err(Error::UnterminatedString(0)));
  }

  #[test]
  fn stray_character_is_an_error() {
    assert_eq!(tokenize("a # b"), Err(Error::UnexpectedChar { pos: 2, ch: '#' }));
  }
}
