//! `math(EXPR)`: 64-bit integer expressions.

use crate::runtime::{interpreter::Interpreter, registry::CommandRegistry, status::ExecutionStatus};
use std::fmt;

pub fn register(registry: &mut CommandRegistry) {
    registry.add_builtin("math", math_command);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Token {
    Number(i64),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Pipe,
    Caret,
    Amp,
    Tilde,
    Shl,
    Shr,
    LParen,
    RParen,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(value) => write!(f, "{value}"),
            Token::Plus => f.write_str("+"),
            Token::Minus => f.write_str("-"),
            Token::Star => f.write_str("*"),
            Token::Slash => f.write_str("/"),
            Token::Percent => f.write_str("%"),
            Token::Pipe => f.write_str("|"),
            Token::Caret => f.write_str("^"),
            Token::Amp => f.write_str("&"),
            Token::Tilde => f.write_str("~"),
            Token::Shl => f.write_str("<<"),
            Token::Shr => f.write_str(">>"),
            Token::LParen => f.write_str("("),
            Token::RParen => f.write_str(")"),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum ExprError {
    /// The text does not form an expression.
    Parse(String),
    /// The expression is well formed but has no value.
    Evaluate(String),
}

fn tokenize(text: &str) -> Result<Vec<Token>, ExprError> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut idx = 0;
    while idx < bytes.len() {
        let c = bytes[idx];
        let token = match c {
            b' ' | b'\t' | b'\n' | b'\r' => {
                idx += 1;
                continue;
            }
            b'0' if matches!(bytes.get(idx + 1), Some(b'x' | b'X'))
                && bytes.get(idx + 2).is_some_and(u8::is_ascii_hexdigit) =>
            {
                let start = idx + 2;
                let end = start + bytes[start..].iter().take_while(|b| b.is_ascii_hexdigit()).count();
                idx = end;
                let value = u64::from_str_radix(&text[start..end], 16).map_err(|_| out_of_range())?;
                Token::Number(value as i64)
            }
            b'0'..=b'9' => {
                let start = idx;
                let end = start + bytes[start..].iter().take_while(|b| b.is_ascii_digit()).count();
                idx = end;
                Token::Number(text[start..end].parse().map_err(|_| out_of_range())?)
            }
            b'<' if bytes.get(idx + 1) == Some(&b'<') => {
                idx += 2;
                Token::Shl
            }
            b'>' if bytes.get(idx + 1) == Some(&b'>') => {
                idx += 2;
                Token::Shr
            }
            _ => {
                idx += 1;
                match c {
                    b'+' => Token::Plus,
                    b'-' => Token::Minus,
                    b'*' => Token::Star,
                    b'/' => Token::Slash,
                    b'%' => Token::Percent,
                    b'|' => Token::Pipe,
                    b'^' => Token::Caret,
                    b'&' => Token::Amp,
                    b'~' => Token::Tilde,
                    b'(' => Token::LParen,
                    b')' => Token::RParen,
                    _ => {
                        let ch = text[idx - 1..].chars().next().unwrap_or('?');
                        return Err(ExprError::Parse(format!("syntax error, unexpected '{ch}'")));
                    }
                }
            }
        };
        tokens.push(token);
    }
    Ok(tokens)
}

fn out_of_range() -> ExprError {
    ExprError::Evaluate("a numeric value is out of range".into())
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn eat(&mut self, token: Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn unexpected(&self) -> ExprError {
        match self.peek() {
            Some(token) => ExprError::Parse(format!("syntax error, unexpected '{token}'")),
            None => ExprError::Parse("syntax error, unexpected end of input".into()),
        }
    }

    fn parse(mut self) -> Result<i64, ExprError> {
        let value = self.or()?;
        if self.peek().is_some() {
            return Err(self.unexpected());
        }
        Ok(value)
    }

    fn or(&mut self) -> Result<i64, ExprError> {
        let mut value = self.xor()?;
        while self.eat(Token::Pipe) {
            value |= self.xor()?;
        }
        Ok(value)
    }

    fn xor(&mut self) -> Result<i64, ExprError> {
        let mut value = self.and()?;
        while self.eat(Token::Caret) {
            value ^= self.and()?;
        }
        Ok(value)
    }

    fn and(&mut self) -> Result<i64, ExprError> {
        let mut value = self.shift()?;
        while self.eat(Token::Amp) {
            value &= self.shift()?;
        }
        Ok(value)
    }

    fn shift(&mut self) -> Result<i64, ExprError> {
        let mut value = self.sum()?;
        loop {
            if self.eat(Token::Shl) {
                value = value.wrapping_shl(self.sum()? as u32);
            } else if self.eat(Token::Shr) {
                value = value.wrapping_shr(self.sum()? as u32);
            } else {
                return Ok(value);
            }
        }
    }

    fn sum(&mut self) -> Result<i64, ExprError> {
        let mut value = self.product()?;
        loop {
            if self.eat(Token::Plus) {
                value = value.wrapping_add(self.product()?);
            } else if self.eat(Token::Minus) {
                value = value.wrapping_sub(self.product()?);
            } else {
                return Ok(value);
            }
        }
    }

    fn product(&mut self) -> Result<i64, ExprError> {
        let mut value = self.unary()?;
        loop {
            if self.eat(Token::Star) {
                value = value.wrapping_mul(self.unary()?);
            } else if self.eat(Token::Slash) {
                let rhs = self.unary()?;
                if rhs == 0 {
                    return Err(ExprError::Evaluate("divide by zero".into()));
                }
                value = value.wrapping_div(rhs);
            } else if self.eat(Token::Percent) {
                let rhs = self.unary()?;
                if rhs == 0 {
                    return Err(ExprError::Evaluate("modulo by zero".into()));
                }
                value = value.wrapping_rem(rhs);
            } else {
                return Ok(value);
            }
        }
    }

    fn unary(&mut self) -> Result<i64, ExprError> {
        if self.eat(Token::Plus) {
            self.unary()
        } else if self.eat(Token::Minus) {
            Ok(self.unary()?.wrapping_neg())
        } else if self.eat(Token::Tilde) {
            Ok(!self.unary()?)
        } else {
            self.term()
        }
    }

    fn term(&mut self) -> Result<i64, ExprError> {
        match self.peek() {
            Some(Token::Number(value)) => {
                self.pos += 1;
                Ok(value)
            }
            Some(Token::LParen) => {
                self.pos += 1;
                let value = self.or()?;
                if !self.eat(Token::RParen) {
                    return Err(self.unexpected());
                }
                Ok(value)
            }
            _ => Err(self.unexpected()),
        }
    }
}

fn evaluate(expression: &str) -> Result<i64, String> {
    let result = tokenize(expression).and_then(|tokens| Parser { tokens, pos: 0 }.parse());
    result.map_err(|err| match err {
        ExprError::Parse(reason) => {
            format!("cannot parse the expression: \"{expression}\": {reason}.")
        }
        ExprError::Evaluate(reason) => {
            format!("cannot evaluate the expression: \"{expression}\": {reason}.")
        }
    })
}

fn math_command(interp: &mut Interpreter, args: &[String], status: &mut ExecutionStatus) -> bool {
    let Some(sub_command) = args.first() else {
        return status.fail("must be called with at least one argument.");
    };
    if sub_command != "EXPR" {
        return status.fail(format!("does not recognize sub-command {sub_command}"));
    }
    if args.len() != 3 && args.len() != 5 {
        return status.fail("EXPR called with incorrect arguments.");
    }
    let output = &args[1];
    interp.add_definition(output, "ERROR");

    let mut hexadecimal = false;
    if let Some(option) = args.get(3) {
        if option != "OUTPUT_FORMAT" {
            return status.fail(format!("sub-command EXPR option \"{option}\" is unknown."));
        }
        match args[4].as_str() {
            "DECIMAL" => {}
            "HEXADECIMAL" => hexadecimal = true,
            other => {
                return status.fail(format!(
                    "sub-command EXPR value \"{other}\" for option \"{option}\" is invalid."
                ));
            }
        }
    }

    match evaluate(&args[2]) {
        Ok(value) => {
            let text = if hexadecimal {
                format!("0x{value:x}")
            } else {
                value.to_string()
            };
            interp.add_definition(output, &text);
            true
        }
        Err(message) => status.fail(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precedence_follows_c() {
        assert_eq!(evaluate("1 + 2 * 3"), Ok(7));
        assert_eq!(evaluate("(1 + 2) * 3"), Ok(9));
        assert_eq!(evaluate("1 | 2 ^ 3 & 1"), Ok(3));
        assert_eq!(evaluate("1 << 2 + 1"), Ok(8));
        assert_eq!(evaluate("-7 / 2"), Ok(-3));
        assert_eq!(evaluate("-7 % 3"), Ok(-1));
        assert_eq!(evaluate("~0"), Ok(-1));
        assert_eq!(evaluate("- - 4"), Ok(4));
    }

    #[test]
    fn hex_literals() {
        assert_eq!(evaluate("0x10 + 0XfF"), Ok(271));
    }

    #[test]
    fn reports_bad_input() {
        assert_eq!(
            evaluate("1 / 0"),
            Err("cannot evaluate the expression: \"1 / 0\": divide by zero.".to_string())
        );
        let err = evaluate("1 +").unwrap_err();
        assert!(err.starts_with("cannot parse the expression: \"1 +\": syntax error"));
        assert!(evaluate("2 $ 3").is_err());
        assert!(evaluate("(1").is_err());
        assert!(evaluate("99999999999999999999").unwrap_err().contains("out of range"));
    }
}
