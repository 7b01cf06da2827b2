//! Parser for calc
//!
//! Recursive descent over the token stream, one function per precedence
//! level:
//!
//! ```text
//! or < and < not < comparison < + - < * / % < unary - < postfix [ ] . < primary
//! ```
//!
//! Newlines end statements except inside `( )` / `[ ]` and right after a
//! binary operator, so `1 +` on one line and `2` on the next is one
//! expression.

use super::ast::{BinaryOp, Expr, Program, Stmt, StmtKind, UnaryOp};
use super::lexer::{lex, LexError, Spanned, Token};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("syntax error, unexpected end-of-input")]
    UnexpectedEof { line: usize },
    #[error("syntax error, unexpected end-of-input, expecting '{expected}'")]
    Unclosed { expected: char, line: usize },
    #[error("missing 'end' for {keyword}")]
    MissingEnd { keyword: &'static str, line: usize },
    #[error("syntax error, unexpected {token}")]
    UnexpectedToken { token: Token, line: usize },
    #[error(transparent)]
    Lex(#[from] LexError),
}

impl ParseError {
    /// Line within the parsed source the error was found on
    pub fn line(&self) -> usize {
        match self {
            ParseError::UnexpectedEof { line }
            | ParseError::Unclosed { line, .. }
            | ParseError::MissingEnd { line, .. }
            | ParseError::UnexpectedToken { line, .. } => *line,
            ParseError::Lex(e) => e.line(),
        }
    }
}

const EQUALITY: &[(Token, BinaryOp)] = &[
    (Token::Eq, BinaryOp::Eq),
    (Token::NotEq, BinaryOp::NotEq),
    (Token::Lt, BinaryOp::Lt),
    (Token::Le, BinaryOp::Le),
    (Token::Gt, BinaryOp::Gt),
    (Token::Ge, BinaryOp::Ge),
];
const ADDITIVE: &[(Token, BinaryOp)] = &[(Token::Plus, BinaryOp::Add), (Token::Minus, BinaryOp::Sub)];
const MULTIPLICATIVE: &[(Token, BinaryOp)] = &[
    (Token::Star, BinaryOp::Mul),
    (Token::Slash, BinaryOp::Div),
    (Token::Percent, BinaryOp::Rem),
];

/// Tokenize and parse `source`
pub fn parse(source: &str) -> Result<Program, ParseError> {
    Parser::new(lex(source)?).parse()
}

/// Parser state
pub struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Spanned>) -> Self {
        Parser { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset).map(|s| &s.token)
    }

    fn advance(&mut self) -> Option<Spanned> {
        let spanned = self.tokens.get(self.pos).cloned();
        if spanned.is_some() {
            self.pos += 1;
        }
        spanned
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    /// Line of the last token, where running out of input is reported
    fn last_line(&self) -> usize {
        self.tokens.last().map_or(1, |s| s.line)
    }

    fn current_line(&self) -> usize {
        self.tokens.get(self.pos).map_or_else(|| self.last_line(), |s| s.line)
    }

    fn eof(&self) -> ParseError {
        ParseError::UnexpectedEof { line: self.last_line() }
    }

    fn unexpected(spanned: Spanned) -> ParseError {
        ParseError::UnexpectedToken {
            token: spanned.token,
            line: spanned.line,
        }
    }

    fn skip_newlines(&mut self) {
        while self.peek() == Some(&Token::Newline) {
            self.pos += 1;
        }
    }

    fn skip_separators(&mut self) {
        while matches!(self.peek(), Some(Token::Newline | Token::Semicolon)) {
            self.pos += 1;
        }
    }

    /// Parse the entire input into a Program
    pub fn parse(&mut self) -> Result<Program, ParseError> {
        let mut statements = Vec::new();
        loop {
            self.skip_separators();
            if self.is_at_end() {
                return Ok(Program { statements });
            }
            statements.push(self.statement()?);
            self.end_of_statement(&[])?;
        }
    }

    /// A statement must be followed by a separator, a block terminator or
    /// the end of input
    fn end_of_statement(&mut self, terminators: &[Token]) -> Result<(), ParseError> {
        match self.peek() {
            None | Some(Token::Newline | Token::Semicolon) => Ok(()),
            Some(token) if terminators.contains(token) => Ok(()),
            Some(_) => match self.advance() {
                Some(spanned) => Err(Self::unexpected(spanned)),
                None => Err(self.eof()),
            },
        }
    }

    /// Statements up to (not including) one of `terminators`
    fn block(&mut self, keyword: &'static str, terminators: &[Token]) -> Result<Vec<Stmt>, ParseError> {
        let mut statements = Vec::new();
        loop {
            self.skip_separators();
            match self.peek() {
                None => {
                    return Err(ParseError::MissingEnd {
                        keyword,
                        line: self.last_line(),
                    })
                }
                Some(token) if terminators.contains(token) => return Ok(statements),
                Some(_) => {}
            }
            statements.push(self.statement()?);
            self.end_of_statement(terminators)?;
        }
    }

    fn expect_end(&mut self, keyword: &'static str) -> Result<(), ParseError> {
        match self.advance() {
            Some(Spanned { token: Token::End, .. }) => Ok(()),
            Some(spanned) => Err(Self::unexpected(spanned)),
            None => Err(ParseError::MissingEnd {
                keyword,
                line: self.last_line(),
            }),
        }
    }

    fn statement(&mut self) -> Result<Stmt, ParseError> {
        let line = self.current_line();
        if let (Some(Token::Ident(name)), Some(Token::Assign)) = (self.peek(), self.peek_at(1)) {
            let name = name.clone();
            self.pos += 2;
            self.skip_newlines();
            let value = self.expression()?;
            return Ok(Stmt {
                kind: StmtKind::Assign(name, value),
                line,
            });
        }
        Ok(Stmt {
            kind: StmtKind::Expr(self.expression()?),
            line,
        })
    }

    pub fn expression(&mut self) -> Result<Expr, ParseError> {
        self.or_expr()
    }

    fn or_expr(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(&[(Token::Or, BinaryOp::Or)], Self::and_expr)
    }

    fn and_expr(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(&[(Token::And, BinaryOp::And)], Self::not_expr)
    }

    fn not_expr(&mut self) -> Result<Expr, ParseError> {
        if self.peek() == Some(&Token::Not) {
            self.pos += 1;
            let operand = self.not_expr()?;
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(operand)));
        }
        self.binary_level(EQUALITY, Self::additive)
    }

    fn additive(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(ADDITIVE, Self::term)
    }

    fn term(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(MULTIPLICATIVE, Self::unary)
    }

    /// Left-associative chain of `next` joined by any of `ops`
    fn binary_level(
        &mut self,
        ops: &[(Token, BinaryOp)],
        next: fn(&mut Self) -> Result<Expr, ParseError>,
    ) -> Result<Expr, ParseError> {
        let mut left = next(self)?;
        loop {
            let Some(op) = self
                .peek()
                .and_then(|token| ops.iter().find(|(t, _)| t == token).map(|(_, op)| *op))
            else {
                return Ok(left);
            };
            self.pos += 1;
            self.skip_newlines();
            let right = next(self)?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        if self.peek() == Some(&Token::Minus) {
            self.pos += 1;
            let operand = self.unary()?;
            return Ok(Expr::Unary(UnaryOp::Neg, Box::new(operand)));
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.primary()?;
        loop {
            match self.peek() {
                Some(Token::LBracket) => {
                    self.pos += 1;
                    self.skip_newlines();
                    let index = self.expression()?;
                    self.close(Token::RBracket, ']')?;
                    expr = Expr::Index(Box::new(expr), Box::new(index));
                }
                Some(Token::Dot) => {
                    self.pos += 1;
                    match self.advance() {
                        Some(Spanned {
                            token: Token::Ident(name),
                            ..
                        }) => expr = Expr::Index(Box::new(expr), Box::new(Expr::Str(name))),
                        Some(spanned) => return Err(Self::unexpected(spanned)),
                        None => return Err(self.eof()),
                    }
                }
                _ => return Ok(expr),
            }
        }
    }

    fn close(&mut self, token: Token, expected: char) -> Result<(), ParseError> {
        self.skip_newlines();
        match self.advance() {
            Some(spanned) if spanned.token == token => Ok(()),
            Some(spanned) => Err(Self::unexpected(spanned)),
            None => Err(ParseError::Unclosed {
                expected,
                line: self.last_line(),
            }),
        }
    }

    /// Comma-separated expressions up to `close`; the opener is consumed
    fn items(&mut self, close: Token, expected: char) -> Result<Vec<Expr>, ParseError> {
        let mut items = Vec::new();
        loop {
            self.skip_newlines();
            match self.peek() {
                None => {
                    return Err(ParseError::Unclosed {
                        expected,
                        line: self.last_line(),
                    })
                }
                Some(token) if *token == close => {
                    self.pos += 1;
                    return Ok(items);
                }
                Some(_) => {}
            }
            items.push(self.expression()?);
            self.skip_newlines();
            match self.advance() {
                Some(Spanned { token: Token::Comma, .. }) => {}
                Some(spanned) if spanned.token == close => return Ok(items),
                Some(spanned) => return Err(Self::unexpected(spanned)),
                None => {
                    return Err(ParseError::Unclosed {
                        expected,
                        line: self.last_line(),
                    })
                }
            }
        }
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        let spanned = self.advance().ok_or_else(|| self.eof())?;
        match spanned.token {
            Token::Number(n) => Ok(Expr::Number(n)),
            Token::Str(s) => Ok(Expr::Str(s)),
            Token::True => Ok(Expr::Bool(true)),
            Token::False => Ok(Expr::Bool(false)),
            Token::Nil => Ok(Expr::Nil),
            Token::Ident(name) => {
                if self.peek() == Some(&Token::LParen) {
                    self.pos += 1;
                    let args = self.items(Token::RParen, ')')?;
                    Ok(Expr::Call(name, args))
                } else {
                    Ok(Expr::Var(name))
                }
            }
            Token::LParen => {
                self.skip_newlines();
                let inner = self.expression()?;
                self.close(Token::RParen, ')')?;
                Ok(inner)
            }
            Token::LBracket => Ok(Expr::List(self.items(Token::RBracket, ']')?)),
            Token::If => self.if_expr(),
            Token::While => self.while_expr(),
            token => Err(ParseError::UnexpectedToken {
                token,
                line: spanned.line,
            }),
        }
    }

    fn if_expr(&mut self) -> Result<Expr, ParseError> {
        let cond = self.expression()?;
        if self.peek() == Some(&Token::Then) {
            self.pos += 1;
        }
        let then_branch = self.block("if", &[Token::Else, Token::End])?;
        let else_branch = if self.peek() == Some(&Token::Else) {
            self.pos += 1;
            Some(self.block("if", &[Token::End])?)
        } else {
            None
        };
        self.expect_end("if")?;
        Ok(Expr::If {
            cond: Box::new(cond),
            then_branch,
            else_branch,
        })
    }

    fn while_expr(&mut self) -> Result<Expr, ParseError> {
        let cond = self.expression()?;
        if self.peek() == Some(&Token::Do) {
            self.pos += 1;
        }
        let body = self.block("while", &[Token::End])?;
        self.expect_end("while")?;
        Ok(Expr::While {
            cond: Box::new(cond),
            body,
        })
    }
}
