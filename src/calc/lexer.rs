//! Tokenization for calc
//!
//! Tokens carry the (1-based) line they start on so syntax errors can
//! point back into multi-line input.

use nom::{
    branch::alt,
    bytes::complete::{is_not, tag},
    character::complete::{alpha1, alphanumeric1, anychar, char, digit1, not_line_ending, one_of},
    combinator::{map, map_opt, map_res, opt, recognize, value},
    multi::many0,
    sequence::{delimited, pair},
    IResult,
};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    // Keywords
    If,
    Then,
    Else,
    End,
    While,
    Do,
    And,
    Or,
    Not,
    True,
    False,
    Nil,
    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Assign,
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    // Punctuation
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Semicolon,
    Newline,
}

pub const KEYWORDS: &[&str] = &[
    "if", "then", "else", "end", "while", "do", "and", "or", "not", "true", "false", "nil",
];

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Token::Number(n) => return write!(f, "number {}", n),
            Token::Str(_) => "string literal",
            Token::Ident(name) => return write!(f, "identifier `{}'", name),
            Token::If => "'if'",
            Token::Then => "'then'",
            Token::Else => "'else'",
            Token::End => "'end'",
            Token::While => "'while'",
            Token::Do => "'do'",
            Token::And => "'and'",
            Token::Or => "'or'",
            Token::Not => "'not'",
            Token::True => "'true'",
            Token::False => "'false'",
            Token::Nil => "'nil'",
            Token::Plus => "'+'",
            Token::Minus => "'-'",
            Token::Star => "'*'",
            Token::Slash => "'/'",
            Token::Percent => "'%'",
            Token::Assign => "'='",
            Token::Eq => "'=='",
            Token::NotEq => "'!='",
            Token::Lt => "'<'",
            Token::Le => "'<='",
            Token::Gt => "'>'",
            Token::Ge => "'>='",
            Token::LParen => "'('",
            Token::RParen => "')'",
            Token::LBracket => "'['",
            Token::RBracket => "']'",
            Token::Comma => "','",
            Token::Dot => "'.'",
            Token::Semicolon => "';'",
            Token::Newline => "newline",
        };
        write!(f, "{}", text)
    }
}

/// A token and the line it starts on
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub line: usize,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LexError {
    #[error("unterminated string meets end of file")]
    UnterminatedString { line: usize },
    #[error("syntax error, unexpected character '{ch}'")]
    UnexpectedChar { ch: char, line: usize },
    #[error("syntax error, invalid escape '\\{ch}'")]
    InvalidEscape { ch: char, line: usize },
}

impl LexError {
    pub fn line(&self) -> usize {
        match self {
            LexError::UnterminatedString { line }
            | LexError::UnexpectedChar { line, .. }
            | LexError::InvalidEscape { line, .. } => *line,
        }
    }
}

fn keyword(word: &str) -> Option<Token> {
    let token = match word {
        "if" => Token::If,
        "then" => Token::Then,
        "else" => Token::Else,
        "end" => Token::End,
        "while" => Token::While,
        "do" => Token::Do,
        "and" => Token::And,
        "or" => Token::Or,
        "not" => Token::Not,
        "true" => Token::True,
        "false" => Token::False,
        "nil" => Token::Nil,
        _ => return None,
    };
    Some(token)
}

/// Spaces, tabs and `#` comments; newlines are tokens
fn blank(input: &str) -> IResult<&str, ()> {
    value(
        (),
        many0(alt((
            value((), one_of(" \t\r")),
            value((), pair(char('#'), not_line_ending)),
        ))),
    )(input)
}

const ESCAPES: &[char] = &['\\', '"', 'n', 't'];

/// Parse a double-quoted string; it may span lines
fn string(input: &str) -> IResult<&str, Token> {
    let escape = alt((
        value("\\", tag("\\")),
        value("\"", tag("\"")),
        value("\n", tag("n")),
        value("\t", tag("t")),
    ));
    map(
        delimited(
            char('"'),
            opt(nom::bytes::complete::escaped_transform(is_not("\"\\"), '\\', escape)),
            char('"'),
        ),
        |s: Option<String>| Token::Str(s.unwrap_or_default()),
    )(input)
}

fn number(input: &str) -> IResult<&str, Token> {
    map_res(
        recognize(pair(digit1, opt(pair(char('.'), digit1)))),
        |s: &str| s.parse::<f64>().map(Token::Number),
    )(input)
}

/// Identifier or keyword
fn word(input: &str) -> IResult<&str, Token> {
    map(
        recognize(pair(
            alt((alpha1, tag("_"))),
            many0(alt((alphanumeric1, tag("_")))),
        )),
        |s: &str| keyword(s).unwrap_or_else(|| Token::Ident(s.to_string())),
    )(input)
}

/// Two-character operators, then `=`, `<`, `>`
fn comparison(input: &str) -> IResult<&str, Token> {
    alt((
        value(Token::Eq, tag("==")),
        value(Token::NotEq, tag("!=")),
        value(Token::Le, tag("<=")),
        value(Token::Ge, tag(">=")),
        value(Token::Assign, char('=')),
        value(Token::Lt, char('<')),
        value(Token::Gt, char('>')),
    ))(input)
}

fn single(c: char) -> Option<Token> {
    let token = match c {
        '+' => Token::Plus,
        '-' => Token::Minus,
        '*' => Token::Star,
        '/' => Token::Slash,
        '%' => Token::Percent,
        '(' => Token::LParen,
        ')' => Token::RParen,
        '[' => Token::LBracket,
        ']' => Token::RBracket,
        ',' => Token::Comma,
        '.' => Token::Dot,
        ';' => Token::Semicolon,
        '\n' => Token::Newline,
        _ => return None,
    };
    Some(token)
}

fn token(input: &str) -> IResult<&str, Token> {
    alt((string, number, word, comparison, map_opt(anychar, single)))(input)
}

/// Why the string opened on line `start`, just before `body`, failed to
/// lex: a bad escape before the closing quote, else a missing closing quote
fn string_error(body: &str, start: usize) -> LexError {
    let mut line = start;
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        match c {
            '"' => break,
            '\\' => match chars.next() {
                Some(escaped) if ESCAPES.contains(&escaped) => {}
                Some(ch) => return LexError::InvalidEscape { ch, line },
                None => break,
            },
            '\n' => line += 1,
            _ => {}
        }
    }
    LexError::UnterminatedString { line: start }
}

/// Tokenize a complete input string
pub fn lex(input: &str) -> Result<Vec<Spanned>, LexError> {
    let mut tokens = Vec::new();
    let mut rest = input;
    let mut line = 1;

    loop {
        rest = blank(rest).map_or(rest, |(after, _)| after);
        let Some(next) = rest.chars().next() else {
            break;
        };
        match token(rest) {
            Ok((after, token)) => {
                let consumed = &rest[..rest.len() - after.len()];
                tokens.push(Spanned { token, line });
                line += consumed.matches('\n').count();
                rest = after;
            }
            Err(_) if next == '"' => return Err(string_error(&rest[1..], line)),
            Err(_) => return Err(LexError::UnexpectedChar { ch: next, line }),
        }
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<Token> {
        lex(input).unwrap().into_iter().map(|s| s.token).collect()
    }

    #[test]
    fn tokenize_arithmetic() {
        assert_eq!(
            kinds("1 + 2.5 * x"),
            vec![
                Token::Number(1.0),
                Token::Plus,
                Token::Number(2.5),
                Token::Star,
                Token::Ident("x".to_string()),
            ]
        );
    }

    #[test]
    fn tokenize_keywords_and_special_names() {
        assert_eq!(
            kinds("if _in_ then nil end"),
            vec![
                Token::If,
                Token::Ident("_in_".to_string()),
                Token::Then,
                Token::Nil,
                Token::End,
            ]
        );
    }

    #[test]
    fn tokenize_comparisons() {
        assert_eq!(
            kinds("a == b != c <= d >= e < f > g = h"),
            vec![
                Token::Ident("a".into()),
                Token::Eq,
                Token::Ident("b".into()),
                Token::NotEq,
                Token::Ident("c".into()),
                Token::Le,
                Token::Ident("d".into()),
                Token::Ge,
                Token::Ident("e".into()),
                Token::Lt,
                Token::Ident("f".into()),
                Token::Gt,
                Token::Ident("g".into()),
                Token::Assign,
                Token::Ident("h".into()),
            ]
        );
    }

    #[test]
    fn strings_handle_escapes_and_newlines() {
        assert_eq!(kinds(r#""a\"b\n""#), vec![Token::Str("a\"b\n".to_string())]);
        assert_eq!(kinds("\"\""), vec![Token::Str(String::new())]);
        let spanned = lex("\"one\ntwo\" x").unwrap();
        assert_eq!(spanned[0].token, Token::Str("one\ntwo".to_string()));
        assert_eq!(spanned[1].line, 2);
    }

    #[test]
    fn comments_are_skipped_but_newlines_kept() {
        assert_eq!(
            kinds("1 # one\n2"),
            vec![Token::Number(1.0), Token::Newline, Token::Number(2.0)]
        );
    }

    #[test]
    fn lines_are_tracked() {
        let spanned = lex("a\n\nb").unwrap();
        let lines: Vec<usize> = spanned.iter().map(|s| s.line).collect();
        assert_eq!(lines, vec![1, 1, 2, 3]);
    }

    #[test]
    fn unterminated_string() {
        assert_eq!(
            lex("x = \"abc\n").unwrap_err(),
            LexError::UnterminatedString { line: 1 }
        );
        assert_eq!(
            LexError::UnterminatedString { line: 1 }.to_string(),
            "unterminated string meets end of file"
        );
    }

    #[test]
    fn invalid_escape_is_not_unterminated() {
        assert_eq!(
            lex("\"a\\q\"").unwrap_err(),
            LexError::InvalidEscape { ch: 'q', line: 1 }
        );
        assert_eq!(
            lex("\"one\ntwo \\z").unwrap_err(),
            LexError::InvalidEscape { ch: 'z', line: 2 }
        );
        assert_eq!(
            lex("\"ok \\n but open").unwrap_err(),
            LexError::UnterminatedString { line: 1 }
        );
        assert_eq!(
            LexError::InvalidEscape { ch: 'q', line: 1 }.to_string(),
            "syntax error, invalid escape '\\q'"
        );
    }

    #[test]
    fn unexpected_character() {
        assert_eq!(
            lex("1 $ 2").unwrap_err(),
            LexError::UnexpectedChar { ch: '$', line: 1 }
        );
    }
}
