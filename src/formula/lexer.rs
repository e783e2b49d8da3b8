use super::FormulaError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    LParen,
    RParen,
    Comma,
}

/// A token plus the byte offset it starts at, for error messages.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub offset: usize,
}

/// Word operators of general expression languages. Never valid here.
const FORBIDDEN_WORDS: &[&str] = &["and", "or", "not", "in", "xor"];

pub fn tokenize(input: &str) -> Result<Vec<Spanned>, FormulaError> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i] as char;
        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }

        let offset = i;
        let token = match c {
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => Token::Star,
            '/' => Token::Slash,
            '%' => Token::Percent,
            '^' => Token::Caret,
            '(' => Token::LParen,
            ')' => Token::RParen,
            ',' => Token::Comma,
            '<' | '>' | '=' | '!' | '&' | '|' | '?' | ':' => {
                let mut end = i + 1;
                if end < bytes.len() && matches!(bytes[end], b'=' | b'&' | b'|') {
                    end += 1;
                }
                return Err(FormulaError::ForbiddenOperator(input[i..end].to_string()));
            }
            c if c.is_ascii_digit() || c == '.' => {
                let (value, end) = read_number(input, i)?;
                tokens.push(Spanned { token: Token::Number(value), offset });
                i = end;
                continue;
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut end = i;
                while end < bytes.len() && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_') {
                    end += 1;
                }
                let word = &input[i..end];
                if FORBIDDEN_WORDS.contains(&word) {
                    return Err(FormulaError::ForbiddenOperator(word.to_string()));
                }
                tokens.push(Spanned { token: Token::Ident(word.to_string()), offset });
                i = end;
                continue;
            }
            _ => {
                let ch = input[i..].chars().next().unwrap_or(c);
                return Err(FormulaError::Syntax {
                    offset: i,
                    message: format!("unexpected character '{ch}'"),
                });
            }
        };
        tokens.push(Spanned { token, offset });
        i += 1;
    }

    Ok(tokens)
}

fn read_number(input: &str, start: usize) -> Result<(f64, usize), FormulaError> {
    let bytes = input.as_bytes();
    let mut end = start;
    while end < bytes.len() && (bytes[end].is_ascii_digit() || bytes[end] == b'.') {
        end += 1;
    }
    // Exponent only when followed by digits, so `2e` stays a syntax error below.
    if end < bytes.len() && matches!(bytes[end], b'e' | b'E') {
        let mut probe = end + 1;
        if probe < bytes.len() && matches!(bytes[probe], b'+' | b'-') {
            probe += 1;
        }
        if probe < bytes.len() && bytes[probe].is_ascii_digit() {
            end = probe;
            while end < bytes.len() && bytes[end].is_ascii_digit() {
                end += 1;
            }
        }
    }

    let text = &input[start..end];
    text.parse::<f64>()
        .map(|value| (value, end))
        .map_err(|_| FormulaError::Syntax {
            offset: start,
            message: format!("invalid number '{text}'"),
        })
}
