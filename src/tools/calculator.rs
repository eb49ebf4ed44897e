//! Calculator tool
//!
//! Evaluates arithmetic expressions with a small recursive-descent parser:
//! the usual operators, parentheses, and the math functions the model
//! reaches for most often. No shelling out for arithmetic.

use async_trait::async_trait;
use serde_json::Value;

use super::traits::{required_str, Tool, ToolResult};

/// Built-in tool: calculator
pub struct CalculatorTool;

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        "calculator"
    }

    fn description(&self) -> &str {
        "Performs mathematical calculations. Supports basic operators (+, -, *, /, %, **), \
         parentheses, and math functions like sqrt, sin, cos, log."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "expression": {
                    "type": "string",
                    "description": "Math expression to evaluate, e.g. '2 + 2' or 'sqrt(16)'"
                }
            },
            "required": ["expression"]
        })
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let expression = match required_str(&args, "expression") {
            Ok(expression) => expression,
            Err(failure) => return failure,
        };

        match evaluate(expression) {
            Ok(value) => ToolResult::success(format!("Result: {}", format_number(value))),
            Err(e) => ToolResult::failure(format!("Error evaluating expression: {}", e)),
        }
    }
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// Evaluate an expression string.
pub fn evaluate(input: &str) -> Result<f64, String> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    let value = parser.expression()?;
    if parser.pos != parser.tokens.len() {
        return Err(format!("Unexpected token at position {}", parser.pos));
    }
    Ok(value)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    DoubleStar,
    Slash,
    Percent,
    LParen,
    RParen,
    Comma,
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' => i += 1,
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                if chars.get(i + 1) == Some(&'*') {
                    tokens.push(Token::DoubleStar);
                    i += 2;
                } else {
                    tokens.push(Token::Star);
                    i += 1;
                }
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '%' => {
                tokens.push(Token::Percent);
                i += 1;
            }
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
            '^' => {
                tokens.push(Token::DoubleStar);
                i += 1;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_ascii_digit()
                        || chars[i] == '.'
                        || chars[i] == 'e'
                        || chars[i] == 'E'
                        || ((chars[i] == '+' || chars[i] == '-')
                            && matches!(chars.get(i.wrapping_sub(1)), Some('e') | Some('E'))))
                {
                    i += 1;
                }
                let literal: String = chars[start..i].iter().collect();
                let number = literal
                    .parse::<f64>()
                    .map_err(|_| format!("Invalid number: {}", literal))?;
                tokens.push(Token::Number(number));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => return Err(format!("Unexpected character: {}", other)),
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    // expression := term (('+' | '-') term)*
    fn expression(&mut self) -> Result<f64, String> {
        let mut value = self.term()?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.next();
                    value += self.term()?;
                }
                Some(Token::Minus) => {
                    self.next();
                    value -= self.term()?;
                }
                _ => return Ok(value),
            }
        }
    }

    // term := power (('*' | '/' | '%') power)*
    fn term(&mut self) -> Result<f64, String> {
        let mut value = self.power()?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.next();
                    value *= self.power()?;
                }
                Some(Token::Slash) => {
                    self.next();
                    let divisor = self.power()?;
                    if divisor == 0.0 {
                        return Err("Division by zero".to_string());
                    }
                    value /= divisor;
                }
                Some(Token::Percent) => {
                    self.next();
                    let divisor = self.power()?;
                    if divisor == 0.0 {
                        return Err("Division by zero".to_string());
                    }
                    value %= divisor;
                }
                _ => return Ok(value),
            }
        }
    }

    // power := unary ('**' power)?   (right associative)
    fn power(&mut self) -> Result<f64, String> {
        let base = self.unary()?;
        if matches!(self.peek(), Some(Token::DoubleStar)) {
            self.next();
            let exponent = self.power()?;
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    fn unary(&mut self) -> Result<f64, String> {
        match self.peek() {
            Some(Token::Minus) => {
                self.next();
                Ok(-self.unary()?)
            }
            Some(Token::Plus) => {
                self.next();
                self.unary()
            }
            _ => self.atom(),
        }
    }

    fn atom(&mut self) -> Result<f64, String> {
        match self.next() {
            Some(Token::Number(value)) => Ok(value),
            Some(Token::LParen) => {
                let value = self.expression()?;
                match self.next() {
                    Some(Token::RParen) => Ok(value),
                    _ => Err("Expected ')'".to_string()),
                }
            }
            Some(Token::Ident(name)) => self.ident(&name),
            other => Err(format!("Unexpected token: {:?}", other)),
        }
    }

    fn ident(&mut self, name: &str) -> Result<f64, String> {
        match name {
            "pi" => return Ok(std::f64::consts::PI),
            "e" => return Ok(std::f64::consts::E),
            "tau" => return Ok(std::f64::consts::TAU),
            _ => {}
        }

        if !matches!(self.peek(), Some(Token::LParen)) {
            return Err(format!("Unknown identifier: {}", name));
        }
        self.next();

        let mut args = vec![self.expression()?];
        while matches!(self.peek(), Some(Token::Comma)) {
            self.next();
            args.push(self.expression()?);
        }
        match self.next() {
            Some(Token::RParen) => {}
            _ => return Err("Expected ')'".to_string()),
        }

        let unary = |args: &[f64], f: fn(f64) -> f64| -> Result<f64, String> {
            if args.len() != 1 {
                return Err(format!("{} takes one argument", name));
            }
            Ok(f(args[0]))
        };

        match name {
            "sqrt" => {
                let value = unary(&args, f64::sqrt)?;
                if value.is_nan() {
                    return Err("sqrt of negative number".to_string());
                }
                Ok(value)
            }
            "sin" => unary(&args, f64::sin),
            "cos" => unary(&args, f64::cos),
            "tan" => unary(&args, f64::tan),
            "log" => unary(&args, f64::ln),
            "log2" => unary(&args, f64::log2),
            "log10" => unary(&args, f64::log10),
            "exp" => unary(&args, f64::exp),
            "abs" => unary(&args, f64::abs),
            "round" => unary(&args, f64::round),
            "floor" => unary(&args, f64::floor),
            "ceil" => unary(&args, f64::ceil),
            "min" => args
                .iter()
                .cloned()
                .fold(None::<f64>, |acc, x| Some(acc.map_or(x, |a| a.min(x))))
                .ok_or_else(|| "min needs arguments".to_string()),
            "max" => args
                .iter()
                .cloned()
                .fold(None::<f64>, |acc, x| Some(acc.map_or(x, |a| a.max(x))))
                .ok_or_else(|| "max needs arguments".to_string()),
            "pow" => {
                if args.len() != 2 {
                    return Err("pow takes two arguments".to_string());
                }
                Ok(args[0].powf(args[1]))
            }
            other => Err(format!("Unknown function: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_basic_arithmetic() {
        let tool = CalculatorTool;
        let result = tool
            .execute(serde_json::json!({"expression": "15 * 23"}))
            .await;
        assert!(result.success);
        assert_eq!(result.to_observation(), "Result: 345");
    }

    #[test]
    fn test_precedence_and_parens() {
        assert_eq!(evaluate("2 + 3 * 4").unwrap(), 14.0);
        assert_eq!(evaluate("(2 + 3) * 4").unwrap(), 20.0);
        assert_eq!(evaluate("2 ** 3 ** 2").unwrap(), 512.0);
        assert_eq!(evaluate("-3 + 5").unwrap(), 2.0);
        assert_eq!(evaluate("10 % 3").unwrap(), 1.0);
    }

    #[test]
    fn test_functions() {
        assert_eq!(evaluate("sqrt(16)").unwrap(), 4.0);
        assert_eq!(evaluate("max(1, 7, 3)").unwrap(), 7.0);
        assert_eq!(evaluate("min(4, 2)").unwrap(), 2.0);
        assert_eq!(evaluate("pow(2, 10)").unwrap(), 1024.0);
        assert!((evaluate("cos(0)").unwrap() - 1.0).abs() < 1e-12);
        assert!((evaluate("log(e)").unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_scientific_notation() {
        assert_eq!(evaluate("1.5e3").unwrap(), 1500.0);
        assert_eq!(evaluate("2e-2 * 100").unwrap(), 2.0);
    }

    #[test]
    fn test_errors() {
        assert!(evaluate("1 / 0").is_err());
        assert!(evaluate("sqrt(-1)").is_err());
        assert!(evaluate("2 +").is_err());
        assert!(evaluate("nope(3)").is_err());
        assert!(evaluate("$").is_err());
    }

    #[tokio::test]
    async fn test_missing_expression_param() {
        let tool = CalculatorTool;
        let result = tool.execute(serde_json::json!({})).await;
        assert!(!result.success);
        assert!(result.to_observation().starts_with("Error"));
    }

    #[test]
    fn test_integer_formatting() {
        assert_eq!(format_number(345.0), "345");
        assert_eq!(format_number(3.5), "3.5");
    }
}
