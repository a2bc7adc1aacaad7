// src/condition/parser.rs

//! Recursive-descent parser for the condition vocabulary.
//!
//! ```text
//! expr    := or
//! or      := and (("||" | "or") and)*
//! and     := unary (("&&" | "and") unary)*
//! unary   := ("!" | "not") unary | primary
//! primary := "(" expr ")" | atom
//! atom    := "step" NAME STATUS
//!          | STATUS "(" NAME ")"
//!          | "output" "(" NAME ")" "contains" STRING
//!          | "true" | "false"
//! ```
//!
//! Trees deeper than [`MAX_DEPTH`] are rejected as parse errors, so
//! evaluating or dropping a parsed condition never recurses without bound.

use crate::condition::{Condition, ConditionError};
use crate::dag::StepStatus;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    LParen,
    RParen,
    Not,
    And,
    Or,
    Word(String),
    Str(String),
}

/// Deepest predicate tree (or `(`/`!` nesting) a condition may have.
pub const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone)]
struct Spanned {
    token: Token,
    pos: usize,
}

/// Parse a condition string into a [`Condition`] tree.
pub fn parse_condition(input: &str) -> Result<Condition, ConditionError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        tokens,
        idx: 0,
        end: input.len(),
        nesting: 0,
    };

    if parser.tokens.is_empty() {
        return Err(parse_err(0, "empty condition"));
    }

    let parsed = parser.parse_or()?;
    if let Some(extra) = parser.peek() {
        return Err(parse_err(
            extra.pos,
            format!("unexpected trailing {}", describe(&extra.token)),
        ));
    }
    Ok(parsed.cond)
}

fn parse_err(position: usize, message: impl Into<String>) -> ConditionError {
    ConditionError::Parse {
        position,
        message: message.into(),
    }
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')
}

fn tokenize(input: &str) -> Result<Vec<Spanned>, ConditionError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(pos, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Spanned { token: Token::LParen, pos });
            }
            ')' => {
                chars.next();
                tokens.push(Spanned { token: Token::RParen, pos });
            }
            '!' => {
                chars.next();
                tokens.push(Spanned { token: Token::Not, pos });
            }
            '&' | '|' => {
                chars.next();
                match chars.next() {
                    Some((_, next)) if next == c => {
                        let token = if c == '&' { Token::And } else { Token::Or };
                        tokens.push(Spanned { token, pos });
                    }
                    _ => return Err(parse_err(pos, format!("expected '{c}{c}'"))),
                }
            }
            '"' | '\'' => {
                let quote = c;
                chars.next();
                let mut value = String::new();
                let mut closed = false;
                while let Some((_, ch)) = chars.next() {
                    match ch {
                        '\\' => match chars.next() {
                            Some((_, escaped)) => value.push(escaped),
                            None => break,
                        },
                        ch if ch == quote => {
                            closed = true;
                            break;
                        }
                        ch => value.push(ch),
                    }
                }
                if !closed {
                    return Err(parse_err(pos, "unterminated string literal"));
                }
                tokens.push(Spanned { token: Token::Str(value), pos });
            }
            c if is_word_char(c) => {
                let mut word = String::new();
                while let Some(&(_, ch)) = chars.peek() {
                    if !is_word_char(ch) {
                        break;
                    }
                    word.push(ch);
                    chars.next();
                }
                let token = match word.to_ascii_lowercase().as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    _ => Token::Word(word),
                };
                tokens.push(Spanned { token, pos });
            }
            other => return Err(parse_err(pos, format!("unexpected character '{other}'"))),
        }
    }

    Ok(tokens)
}

fn describe(token: &Token) -> String {
    match token {
        Token::LParen => "'('".to_string(),
        Token::RParen => "')'".to_string(),
        Token::Not => "'not'".to_string(),
        Token::And => "'and'".to_string(),
        Token::Or => "'or'".to_string(),
        Token::Word(w) => format!("'{w}'"),
        Token::Str(s) => format!("string {s:?}"),
    }
}

/// Status words accepted in conditions. Only terminal statuses make sense.
fn status_word(word: &str) -> Option<StepStatus> {
    match word.to_ascii_lowercase().as_str() {
        "completed" | "succeeded" => Some(StepStatus::Completed),
        "failed" => Some(StepStatus::Failed),
        "skipped" => Some(StepStatus::Skipped),
        "cancelled" | "canceled" => Some(StepStatus::Cancelled),
        _ => None,
    }
}

/// A subtree together with its depth.
struct Parsed {
    cond: Condition,
    depth: usize,
}

impl Parsed {
    fn leaf(cond: Condition) -> Self {
        Self { cond, depth: 1 }
    }
}

fn too_deep(position: usize) -> ConditionError {
    parse_err(
        position,
        format!("condition is nested deeper than {MAX_DEPTH} levels"),
    )
}

struct Parser {
    tokens: Vec<Spanned>,
    idx: usize,
    end: usize,
    /// Open `(` and `!` levels on the current descent.
    nesting: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Spanned> {
        self.tokens.get(self.idx)
    }

    fn next(&mut self) -> Option<Spanned> {
        let tok = self.tokens.get(self.idx).cloned();
        if tok.is_some() {
            self.idx += 1;
        }
        tok
    }

    fn expect(&mut self, expected: Token) -> Result<(), ConditionError> {
        match self.next() {
            Some(t) if t.token == expected => Ok(()),
            Some(t) => Err(parse_err(
                t.pos,
                format!("expected {}, found {}", describe(&expected), describe(&t.token)),
            )),
            None => Err(parse_err(
                self.end,
                format!("expected {}, found end of input", describe(&expected)),
            )),
        }
    }

    /// Position of the next token if it is `token`.
    fn at(&self, token: Token) -> Option<usize> {
        self.peek().filter(|t| t.token == token).map(|t| t.pos)
    }

    fn descend(&mut self, pos: usize) -> Result<(), ConditionError> {
        if self.nesting >= MAX_DEPTH {
            return Err(too_deep(pos));
        }
        self.nesting += 1;
        Ok(())
    }

    fn combine(
        pos: usize,
        lhs: Parsed,
        rhs: Parsed,
        node: fn(Box<Condition>, Box<Condition>) -> Condition,
    ) -> Result<Parsed, ConditionError> {
        let depth = 1 + lhs.depth.max(rhs.depth);
        if depth > MAX_DEPTH {
            return Err(too_deep(pos));
        }
        Ok(Parsed {
            cond: node(Box::new(lhs.cond), Box::new(rhs.cond)),
            depth,
        })
    }

    fn parse_or(&mut self) -> Result<Parsed, ConditionError> {
        let mut lhs = self.parse_and()?;
        while let Some(pos) = self.at(Token::Or) {
            self.next();
            let rhs = self.parse_and()?;
            lhs = Self::combine(pos, lhs, rhs, Condition::Or)?;
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Parsed, ConditionError> {
        let mut lhs = self.parse_unary()?;
        while let Some(pos) = self.at(Token::And) {
            self.next();
            let rhs = self.parse_unary()?;
            lhs = Self::combine(pos, lhs, rhs, Condition::And)?;
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Parsed, ConditionError> {
        let Some(pos) = self.at(Token::Not) else {
            return self.parse_primary();
        };
        self.next();
        self.descend(pos)?;
        let inner = self.parse_unary()?;
        self.nesting -= 1;

        let depth = inner.depth + 1;
        if depth > MAX_DEPTH {
            return Err(too_deep(pos));
        }
        Ok(Parsed {
            cond: Condition::Not(Box::new(inner.cond)),
            depth,
        })
    }

    fn parse_primary(&mut self) -> Result<Parsed, ConditionError> {
        let Some(tok) = self.next() else {
            return Err(parse_err(self.end, "unexpected end of input"));
        };

        match tok.token {
            Token::LParen => {
                self.descend(tok.pos)?;
                let inner = self.parse_or()?;
                self.expect(Token::RParen)?;
                self.nesting -= 1;
                Ok(inner)
            }
            Token::Word(word) => self.parse_atom(word, tok.pos).map(Parsed::leaf),
            other => Err(parse_err(
                tok.pos,
                format!("expected a predicate, found {}", describe(&other)),
            )),
        }
    }

    fn parse_atom(&mut self, word: String, pos: usize) -> Result<Condition, ConditionError> {
        let lower = word.to_ascii_lowercase();
        match lower.as_str() {
            "true" => Ok(Condition::Literal(true)),
            "false" => Ok(Condition::Literal(false)),
            "step" => {
                let step = self.parse_name()?;
                let status = match self.next() {
                    Some(Spanned {
                        token: Token::Word(w),
                        pos,
                    }) => status_word(&w)
                        .ok_or_else(|| parse_err(pos, format!("unknown status '{w}'")))?,
                    Some(t) => {
                        return Err(parse_err(
                            t.pos,
                            format!("expected a status, found {}", describe(&t.token)),
                        ));
                    }
                    None => return Err(parse_err(self.end, "expected a status after step name")),
                };
                Ok(Condition::StepReached { step, status })
            }
            "output" => {
                self.expect(Token::LParen)?;
                let step = self.parse_name()?;
                self.expect(Token::RParen)?;
                match self.next() {
                    Some(Spanned {
                        token: Token::Word(w),
                        ..
                    }) if w.eq_ignore_ascii_case("contains") => {}
                    Some(t) => {
                        return Err(parse_err(
                            t.pos,
                            format!("expected 'contains', found {}", describe(&t.token)),
                        ));
                    }
                    None => return Err(parse_err(self.end, "expected 'contains'")),
                }
                match self.next() {
                    Some(Spanned {
                        token: Token::Str(needle),
                        ..
                    }) => Ok(Condition::OutputContains { step, needle }),
                    Some(t) => Err(parse_err(
                        t.pos,
                        format!("expected a string literal, found {}", describe(&t.token)),
                    )),
                    None => Err(parse_err(self.end, "expected a string literal")),
                }
            }
            _ => match status_word(&lower) {
                Some(status) => {
                    self.expect(Token::LParen)?;
                    let step = self.parse_name()?;
                    self.expect(Token::RParen)?;
                    Ok(Condition::StepReached { step, status })
                }
                None => Err(parse_err(pos, format!("unknown predicate '{word}'"))),
            },
        }
    }

    fn parse_name(&mut self) -> Result<String, ConditionError> {
        match self.next() {
            Some(Spanned {
                token: Token::Word(w),
                ..
            })
            | Some(Spanned {
                token: Token::Str(w),
                ..
            }) => Ok(w),
            Some(t) => Err(parse_err(
                t.pos,
                format!("expected a step name, found {}", describe(&t.token)),
            )),
            None => Err(parse_err(self.end, "expected a step name")),
        }
    }
}
