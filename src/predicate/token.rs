//! Expression tokenizer.
//!
//! Classifies the raw text into literals, field references, operators,
//! connectives and punctuation. A function call (`lower(name)`) is consumed
//! as a single opaque field reference equal to its verbatim text; the record
//! supplying values must already contain a field with that computed name.

use chrono::NaiveDate;

use super::CompareOp;
use crate::error::{Error, Result};

/// One lexical token.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Token {
    /// Integer literal.
    Int(i64),
    /// Float literal.
    Float(f64),
    /// Quoted string literal.
    Str(String),
    /// Bare `YYYY-MM-DD` literal.
    Date(NaiveDate),
    /// Boolean literal.
    Bool(bool),
    /// Null literal.
    Null,
    /// Variable or verbatim function-call reference.
    Field(String),
    /// Comparison operator.
    Op(CompareOp),
    /// `AND` connective.
    And,
    /// `OR` connective.
    Or,
    /// `NOT` connective.
    Not,
    /// Opening parenthesis.
    LParen,
    /// Closing parenthesis.
    RParen,
    /// List separator inside `IN (...)`.
    Comma,
}

pub(crate) fn tokenize(input: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\r' | '\n' => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '=' => {
                // Accept both `=` and `==`.
                i += if chars.get(i + 1) == Some(&'=') { 2 } else { 1 };
                tokens.push(Token::Op(CompareOp::Eq));
            }
            '!' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Op(CompareOp::Ne));
                    i += 2;
                } else {
                    return Err(Error::UnknownOperator("!".into()));
                }
            }
            '<' => match chars.get(i + 1) {
                Some('=') => {
                    tokens.push(Token::Op(CompareOp::Le));
                    i += 2;
                }
                Some('>') => {
                    tokens.push(Token::Op(CompareOp::Ne));
                    i += 2;
                }
                _ => {
                    tokens.push(Token::Op(CompareOp::Lt));
                    i += 1;
                }
            },
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Op(CompareOp::Ge));
                    i += 2;
                } else {
                    tokens.push(Token::Op(CompareOp::Gt));
                    i += 1;
                }
            }
            '\'' | '"' => {
                let (literal, next) = read_quoted(&chars, i)?;
                tokens.push(Token::Str(literal));
                i = next;
            }
            _ if c.is_ascii_digit() || c == '-' => {
                let (token, next) = read_number_like(&chars, i)?;
                tokens.push(token);
                i = next;
            }
            _ if is_ident_start(c) => {
                let (token, next) = read_word(&chars, i)?;
                tokens.push(token);
                i = next;
            }
            other => return Err(Error::Syntax(format!("unexpected character '{other}'"))),
        }
    }
    Ok(tokens)
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '.'
}

fn read_quoted(chars: &[char], start: usize) -> Result<(String, usize)> {
    let quote = chars[start];
    let mut i = start + 1;
    let mut out = String::new();
    while i < chars.len() {
        if chars[i] == quote {
            return Ok((out, i + 1));
        }
        out.push(chars[i]);
        i += 1;
    }
    Err(Error::Syntax(format!("unterminated quote: {quote}{out}")))
}

fn read_number_like(chars: &[char], start: usize) -> Result<(Token, usize)> {
    let mut i = start;
    let mut text = String::new();
    if chars[i] == '-' {
        text.push('-');
        i += 1;
    }
    while i < chars.len() && (chars[i].is_ascii_digit() || matches!(chars[i], '.' | '-' | ':')) {
        text.push(chars[i]);
        i += 1;
    }
    if let Ok(int) = text.parse::<i64>() {
        return Ok((Token::Int(int), i));
    }
    if let Ok(float) = text.parse::<f64>() {
        return Ok((Token::Float(float), i));
    }
    if let Ok(date) = NaiveDate::parse_from_str(&text, "%Y-%m-%d") {
        return Ok((Token::Date(date), i));
    }
    Err(Error::Syntax(format!("invalid literal '{text}'")))
}

fn read_word(chars: &[char], start: usize) -> Result<(Token, usize)> {
    let mut i = start;
    let mut word = String::new();
    while i < chars.len() && is_ident_char(chars[i]) {
        word.push(chars[i]);
        i += 1;
    }
    // Function call: the identifier runs straight into `(`; the balanced
    // parenthesis run is consumed verbatim as one field reference.
    if chars.get(i) == Some(&'(') {
        let (call, next) = read_call(chars, start, i)?;
        return Ok((Token::Field(call), next));
    }
    let token = match word.to_ascii_uppercase().as_str() {
        "AND" => Token::And,
        "OR" => Token::Or,
        "NOT" => Token::Not,
        "LIKE" => Token::Op(CompareOp::Like),
        "IN" => Token::Op(CompareOp::In),
        "CONTAINS" => Token::Op(CompareOp::Contains),
        "TRUE" => Token::Bool(true),
        "FALSE" => Token::Bool(false),
        "NULL" => Token::Null,
        _ => Token::Field(word),
    };
    Ok((token, i))
}

fn read_call(chars: &[char], word_start: usize, paren: usize) -> Result<(String, usize)> {
    let mut depth = 0usize;
    let mut i = paren;
    while i < chars.len() {
        match chars[i] {
            '\'' | '"' => {
                let quote = chars[i];
                i += 1;
                while i < chars.len() && chars[i] != quote {
                    i += 1;
                }
                if i == chars.len() {
                    break;
                }
            }
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    let text: String = chars[word_start..=i].iter().collect();
                    return Ok((text, i + 1));
                }
            }
            _ => {}
        }
        i += 1;
    }
    let text: String = chars[word_start..].iter().collect();
    Err(Error::Syntax(format!("unbalanced function call '{text}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_literals_and_operators() {
        let tokens = tokenize("age >= 11 AND name != 'Harry' OR flag = true").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Field("age".into()),
                Token::Op(CompareOp::Ge),
                Token::Int(11),
                Token::And,
                Token::Field("name".into()),
                Token::Op(CompareOp::Ne),
                Token::Str("Harry".into()),
                Token::Or,
                Token::Field("flag".into()),
                Token::Op(CompareOp::Eq),
                Token::Bool(true),
            ]
        );
    }

    #[test]
    fn bare_dates_are_date_literals() {
        let tokens = tokenize("day < 2023-12-25").unwrap();
        assert_eq!(
            tokens[2],
            Token::Date(NaiveDate::from_ymd_opt(2023, 12, 25).unwrap())
        );
    }

    #[test]
    fn function_calls_collapse_to_verbatim_fields() {
        let tokens = tokenize("lower(concat(a, b)) = 'x'").unwrap();
        assert_eq!(tokens[0], Token::Field("lower(concat(a, b))".into()));
        assert_eq!(tokens.len(), 3);
    }

    #[test]
    fn rejects_unknown_operator_and_unterminated_quote() {
        assert!(matches!(
            tokenize("a ! b"),
            Err(Error::UnknownOperator(_))
        ));
        assert!(matches!(tokenize("a = 'open"), Err(Error::Syntax(_))));
    }

    #[test]
    fn negative_numbers_and_floats() {
        let tokens = tokenize("x = -3 AND y = 2.5").unwrap();
        assert_eq!(tokens[2], Token::Int(-3));
        assert_eq!(tokens[6], Token::Float(2.5));
    }
}
