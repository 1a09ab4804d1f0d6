//! Expression-string conditions, e.g.
//! `applicant.age >= 18 and (country == 'UK' or isResident)`.
//!
//! Grammar, lowest precedence first:
//!
//! ```text
//! or      := and ( ("or" | "||") and )*
//! and     := unary ( ("and" | "&&") unary )*
//! unary   := ("not" | "!") unary | primary
//! primary := "(" or ")" | operand ( cmp operand )?
//! cmp     := "==" | "!=" | "<" | "<=" | ">" | ">="
//! operand := path | 'string' | "string" | number | true | false | null
//! ```
//!
//! A bare path is a reference when it names another condition, otherwise
//! a truthiness test on that answer.

use serde_json::Value;

use super::{Condition, Operand, Operator};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Path(String),
    Str(String),
    Number(String),
    Keyword(Keyword),
    Cmp(Operator),
    LParen,
    RParen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Keyword {
    And,
    Or,
    Not,
    True,
    False,
    Null,
}

fn lex(source: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '\'' | '"' => {
                let quote = c;
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && chars[end] != quote {
                    end += 1;
                }
                if end == chars.len() {
                    return Err(format!("unterminated string starting at {}", i));
                }
                tokens.push(Token::Str(chars[start..end].iter().collect()));
                i = end + 1;
            }
            '=' | '!' | '<' | '>' | '&' | '|' => {
                let next = chars.get(i + 1).copied();
                let (token, width) = match (c, next) {
                    ('=', Some('=')) => (Token::Cmp(Operator::Is), 2),
                    ('!', Some('=')) => (Token::Cmp(Operator::IsNot), 2),
                    ('<', Some('=')) => (Token::Cmp(Operator::IsAtMost), 2),
                    ('>', Some('=')) => (Token::Cmp(Operator::IsAtLeast), 2),
                    ('<', _) => (Token::Cmp(Operator::IsLessThan), 1),
                    ('>', _) => (Token::Cmp(Operator::IsMoreThan), 1),
                    ('&', Some('&')) => (Token::Keyword(Keyword::And), 2),
                    ('|', Some('|')) => (Token::Keyword(Keyword::Or), 2),
                    ('!', _) => (Token::Keyword(Keyword::Not), 1),
                    _ => return Err(format!("unexpected '{}' at {}", c, i)),
                };
                tokens.push(token);
                i += width;
            }
            c if c.is_ascii_digit()
                || (c == '-' && chars.get(i + 1).is_some_and(char::is_ascii_digit)) =>
            {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                tokens.push(Token::Number(chars[start..i].iter().collect()));
            }
            c if c.is_alphabetic() || c == '_' || c == '$' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || matches!(chars[i], '_' | '$' | '.'))
                {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                let token = match word.to_ascii_lowercase().as_str() {
                    "and" => Token::Keyword(Keyword::And),
                    "or" => Token::Keyword(Keyword::Or),
                    "not" => Token::Keyword(Keyword::Not),
                    "true" => Token::Keyword(Keyword::True),
                    "false" => Token::Keyword(Keyword::False),
                    "null" => Token::Keyword(Keyword::Null),
                    _ => Token::Path(word),
                };
                tokens.push(token);
            }
            other => return Err(format!("unexpected '{}' at {}", other, i)),
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    is_condition: &'a dyn Fn(&str) -> bool,
}

/// Parse an expression string. `is_condition` tells bare names of other
/// conditions apart from answer paths.
pub fn parse_expression(
    source: &str,
    is_condition: &dyn Fn(&str) -> bool,
) -> Result<Condition, String> {
    let tokens = lex(source)?;
    if tokens.is_empty() {
        return Err("empty expression".to_string());
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        is_condition,
    };
    let condition = parser.or()?;
    match parser.peek() {
        None => Ok(condition),
        Some(token) => Err(format!("unexpected {:?} after end of expression", token)),
    }
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn eat_keyword(&mut self, keyword: Keyword) -> bool {
        if self.peek() == Some(&Token::Keyword(keyword)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn or(&mut self) -> Result<Condition, String> {
        let mut items = vec![self.and()?];
        while self.eat_keyword(Keyword::Or) {
            items.push(self.and()?);
        }
        Ok(if items.len() == 1 {
            items.remove(0)
        } else {
            Condition::Any(items)
        })
    }

    fn and(&mut self) -> Result<Condition, String> {
        let mut items = vec![self.unary()?];
        while self.eat_keyword(Keyword::And) {
            items.push(self.unary()?);
        }
        Ok(if items.len() == 1 {
            items.remove(0)
        } else {
            Condition::All(items)
        })
    }

    fn unary(&mut self) -> Result<Condition, String> {
        if self.eat_keyword(Keyword::Not) {
            return Ok(Condition::Not(Box::new(self.unary()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Condition, String> {
        if self.peek() == Some(&Token::LParen) {
            self.pos += 1;
            let inner = self.or()?;
            return match self.next() {
                Some(Token::RParen) => Ok(inner),
                other => Err(format!("expected ')', found {:?}", other)),
            };
        }

        let left = self.operand()?;
        if let Some(Token::Cmp(op)) = self.peek().cloned() {
            self.pos += 1;
            let right = self.operand()?;
            return Ok(Condition::Compare { left, op, right });
        }

        match left {
            Operand::Field(name) if (self.is_condition)(&name) => Ok(Condition::Ref(name)),
            Operand::Field(path) => Ok(Condition::Truthy(path)),
            Operand::Literal(value) => Err(format!("expected a comparison after {}", value)),
        }
    }

    fn operand(&mut self) -> Result<Operand, String> {
        match self.next() {
            Some(Token::Path(path)) => Ok(Operand::Field(path)),
            Some(Token::Str(s)) => Ok(Operand::Literal(Value::String(s))),
            Some(Token::Number(n)) => Ok(Operand::Literal(
                serde_json::from_str(&n).unwrap_or(Value::String(n)),
            )),
            Some(Token::Keyword(Keyword::True)) => Ok(Operand::Literal(Value::Bool(true))),
            Some(Token::Keyword(Keyword::False)) => Ok(Operand::Literal(Value::Bool(false))),
            Some(Token::Keyword(Keyword::Null)) => Ok(Operand::Literal(Value::Null)),
            other => Err(format!("expected a value, found {:?}", other)),
        }
    }
}
