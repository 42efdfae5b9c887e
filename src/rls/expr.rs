//! Compiler for the restricted policy expression grammar (§4.6): column
//! references, boolean ops, comparisons, `IN`, `EXISTS(...)` sub-selects,
//! and the built-ins `auth.uid()`, `auth.role()`, `auth.jwt()->>'claim'`.
//!
//! Column references are validated against the table's Type Catalog
//! allow-list; built-ins are substituted with parameter bindings derived
//! from the principal. Compilation never changes the arity of the outer
//! statement — it only ever produces a single parenthesized boolean SQL
//! fragment plus its own positional params.

use super::principal::Principal;
use crate::error::{Error, Result};
use crate::query::builder::Param;
use crate::types::PgType;
use std::collections::HashMap;
use std::iter::Peekable;
use std::str::Chars;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(String),
    Str(String),
    LParen,
    RParen,
    Comma,
    And,
    Or,
    Not,
    In,
    Is,
    Null,
    ArrowArrow,
    Dot,
    Op(&'static str),
    Eof,
}

struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self { chars: src.chars().peekable() }
    }

    fn tokenize(mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            while matches!(self.chars.peek(), Some(c) if c.is_whitespace()) {
                self.chars.next();
            }
            let Some(&c) = self.chars.peek() else {
                tokens.push(Token::Eof);
                break;
            };
            match c {
                '(' => { self.chars.next(); tokens.push(Token::LParen); }
                ')' => { self.chars.next(); tokens.push(Token::RParen); }
                ',' => { self.chars.next(); tokens.push(Token::Comma); }
                '.' => { self.chars.next(); tokens.push(Token::Dot); }
                '\'' => {
                    self.chars.next();
                    let mut s = String::new();
                    loop {
                        match self.chars.next() {
                            Some('\'') => break,
                            Some(ch) => s.push(ch),
                            None => return Err(Error::Validation("unterminated string literal in policy expression".into())),
                        }
                    }
                    tokens.push(Token::Str(s));
                }
                '-' if self.peek2() == Some('>') => {
                    self.chars.next();
                    self.chars.next();
                    if self.chars.peek() == Some(&'>') {
                        self.chars.next();
                        tokens.push(Token::ArrowArrow);
                    } else {
                        return Err(Error::Validation("expected '->>' in policy expression".into()));
                    }
                }
                '=' => { self.chars.next(); tokens.push(Token::Op("=")); }
                '!' if self.peek2() == Some('=') => {
                    self.chars.next(); self.chars.next();
                    tokens.push(Token::Op("!="));
                }
                '<' => {
                    self.chars.next();
                    if self.chars.peek() == Some(&'=') { self.chars.next(); tokens.push(Token::Op("<=")); }
                    else { tokens.push(Token::Op("<")); }
                }
                '>' => {
                    self.chars.next();
                    if self.chars.peek() == Some(&'=') { self.chars.next(); tokens.push(Token::Op(">=")); }
                    else { tokens.push(Token::Op(">")); }
                }
                c if c.is_ascii_digit() => {
                    let mut n = String::new();
                    while matches!(self.chars.peek(), Some(c) if c.is_ascii_digit() || *c == '.') {
                        n.push(self.chars.next().unwrap());
                    }
                    tokens.push(Token::Number(n));
                }
                c if c.is_alphabetic() || c == '_' => {
                    let mut ident = String::new();
                    while matches!(self.chars.peek(), Some(c) if c.is_alphanumeric() || *c == '_') {
                        ident.push(self.chars.next().unwrap());
                    }
                    tokens.push(match ident.to_ascii_uppercase().as_str() {
                        "AND" => Token::And,
                        "OR" => Token::Or,
                        "NOT" => Token::Not,
                        "IN" => Token::In,
                        "IS" => Token::Is,
                        "NULL" => Token::Null,
                        "TRUE" => Token::Number("1".into()),
                        "FALSE" => Token::Number("0".into()),
                        _ => Token::Ident(ident),
                    });
                }
                other => return Err(Error::Validation(format!("unexpected character in policy expression: {other}"))),
            }
        }
        Ok(tokens)
    }

    fn peek2(&self) -> Option<char> {
        let mut clone = self.chars.clone();
        clone.next();
        clone.next()
    }
}

pub struct CompiledExpr {
    pub sql: String,
    pub params: Vec<Param>,
}

struct Parser<'p> {
    tokens: Vec<Token>,
    pos: usize,
    columns: &'p HashMap<String, PgType>,
    principal: &'p Principal,
    params: Vec<Param>,
}

impl<'p> Parser<'p> {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn advance(&mut self) -> Token {
        let t = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, t: &Token) -> Result<()> {
        if self.peek() == t {
            self.advance();
            Ok(())
        } else {
            Err(Error::Validation(format!(
                "expected {t:?} in policy expression, found {:?}",
                self.peek()
            )))
        }
    }

    fn parse_or(&mut self) -> Result<String> {
        let mut left = self.parse_and()?;
        while *self.peek() == Token::Or {
            self.advance();
            let right = self.parse_and()?;
            left = format!("({left} OR {right})");
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<String> {
        let mut left = self.parse_not()?;
        while *self.peek() == Token::And {
            self.advance();
            let right = self.parse_not()?;
            left = format!("({left} AND {right})");
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<String> {
        if *self.peek() == Token::Not {
            self.advance();
            let inner = self.parse_not()?;
            return Ok(format!("(NOT {inner})"));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<String> {
        let left = self.parse_primary()?;

        match self.peek().clone() {
            Token::Op(op) => {
                self.advance();
                let right = self.parse_primary()?;
                Ok(format!("{left} {op} {right}"))
            }
            Token::In => {
                self.advance();
                self.expect(&Token::LParen)?;
                let mut items = Vec::new();
                loop {
                    items.push(self.parse_primary()?);
                    if *self.peek() == Token::Comma {
                        self.advance();
                    } else {
                        break;
                    }
                }
                self.expect(&Token::RParen)?;
                Ok(format!("{left} IN ({})", items.join(", ")))
            }
            Token::Is => {
                self.advance();
                if *self.peek() == Token::Not {
                    self.advance();
                    self.expect(&Token::Null)?;
                    Ok(format!("{left} IS NOT NULL"))
                } else {
                    self.expect(&Token::Null)?;
                    Ok(format!("{left} IS NULL"))
                }
            }
            _ => Ok(left),
        }
    }

    fn parse_primary(&mut self) -> Result<String> {
        match self.advance() {
            Token::LParen => {
                let inner = self.parse_or()?;
                self.expect(&Token::RParen)?;
                Ok(format!("({inner})"))
            }
            Token::Number(n) => Ok(n),
            Token::Str(s) => {
                self.params.push(Param::Text(s));
                Ok("?".to_string())
            }
            Token::Ident(ident) if ident == "auth" => self.parse_auth_builtin(),
            Token::Ident(ident) if ident.to_ascii_uppercase() == "EXISTS" => {
                self.expect(&Token::LParen)?;
                let raw = self.collect_raw_until_matching_rparen()?;
                Ok(format!("EXISTS ({raw})"))
            }
            Token::Ident(ident) => {
                if !self.columns.contains_key(&ident) {
                    return Err(Error::UnknownColumn(ident));
                }
                Ok(format!("\"{}\"", ident.replace('"', "\"\"")))
            }
            other => Err(Error::Validation(format!(
                "unexpected token in policy expression: {other:?}"
            ))),
        }
    }

    fn parse_auth_builtin(&mut self) -> Result<String> {
        self.expect(&Token::Dot)?;
        let Token::Ident(method) = self.advance() else {
            return Err(Error::Validation("expected auth.<method> in policy expression".into()));
        };
        self.expect(&Token::LParen)?;
        self.expect(&Token::RParen)?;

        match method.as_str() {
            "uid" => {
                self.params.push(match &self.principal.user_id {
                    Some(id) => Param::Text(id.clone()),
                    None => Param::Null,
                });
                Ok("?".to_string())
            }
            "role" => {
                self.params.push(Param::Text(self.principal.role_str().to_string()));
                Ok("?".to_string())
            }
            "jwt" => {
                self.expect(&Token::ArrowArrow)?;
                let Token::Str(claim) = self.advance() else {
                    return Err(Error::Validation("expected 'claim' after auth.jwt()->>".into()));
                };
                let value = self
                    .principal
                    .claims
                    .get(&claim)
                    .and_then(|v| v.as_str())
                    .map(str::to_string);
                self.params.push(match value {
                    Some(v) => Param::Text(v),
                    None => Param::Null,
                });
                Ok("?".to_string())
            }
            other => Err(Error::Validation(format!("unknown auth builtin: auth.{other}()"))),
        }
    }

    /// `EXISTS(...)` sub-selects are trusted, admin-authored SQL text: we
    /// pass them through verbatim rather than parsing their inner grammar,
    /// stopping at the matching close paren so the outer arity is preserved.
    fn collect_raw_until_matching_rparen(&mut self) -> Result<String> {
        let mut depth = 1;
        let mut parts = Vec::new();
        loop {
            match self.advance() {
                Token::LParen => { depth += 1; parts.push("(".to_string()); }
                Token::RParen => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                    parts.push(")".to_string());
                }
                Token::Eof => return Err(Error::Validation("unterminated EXISTS(...) in policy expression".into())),
                other => parts.push(render_raw_token(&other)),
            }
        }
        Ok(parts.join(" "))
    }
}

fn render_raw_token(t: &Token) -> String {
    match t {
        Token::Ident(s) => s.clone(),
        Token::Number(s) => s.clone(),
        Token::Str(s) => format!("'{}'", s.replace('\'', "''")),
        Token::Comma => ",".to_string(),
        Token::Dot => ".".to_string(),
        Token::Op(op) => op.to_string(),
        Token::And => "AND".to_string(),
        Token::Or => "OR".to_string(),
        Token::Not => "NOT".to_string(),
        Token::In => "IN".to_string(),
        Token::Is => "IS".to_string(),
        Token::Null => "NULL".to_string(),
        Token::ArrowArrow => "->>".to_string(),
        Token::LParen | Token::RParen | Token::Eof => String::new(),
    }
}

/// Compile a single policy predicate string against `columns` (the table's
/// allow-listed Type Catalog entries) and `principal`.
pub fn compile(
    source: &str,
    columns: &HashMap<String, PgType>,
    principal: &Principal,
) -> Result<CompiledExpr> {
    let tokens = Lexer::new(source).tokenize()?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        columns,
        principal,
        params: Vec::new(),
    };
    let sql = parser.parse_or()?;
    if parser.peek() != &Token::Eof {
        return Err(Error::Validation(format!(
            "trailing tokens in policy expression: {source}"
        )));
    }
    Ok(CompiledExpr { sql, params: parser.params })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::UserRole;

    fn cols() -> HashMap<String, PgType> {
        let mut m = HashMap::new();
        m.insert("owner_id".to_string(), PgType::Uuid);
        m.insert("published".to_string(), PgType::Boolean);
        m
    }

    fn principal() -> Principal {
        Principal {
            user_id: Some("u1".to_string()),
            role: UserRole::Authenticated,
            claims: serde_json::json!({"org": "acme"}),
        }
    }

    #[test]
    fn compiles_simple_equality_against_auth_uid() {
        let compiled = compile("owner_id = auth.uid()", &cols(), &principal()).unwrap();
        assert_eq!(compiled.sql, "\"owner_id\" = ?");
        assert_eq!(compiled.params.len(), 1);
    }

    #[test]
    fn compiles_or_and_boolean_columns() {
        let compiled = compile("owner_id = auth.uid() OR published = true", &cols(), &principal()).unwrap();
        assert!(compiled.sql.contains("OR"));
        assert_eq!(compiled.params.len(), 1);
    }

    #[test]
    fn compiles_jwt_claim_lookup() {
        let compiled = compile("owner_id = auth.jwt()->>'org'", &cols(), &principal()).unwrap();
        assert_eq!(compiled.params.len(), 1);
    }

    #[test]
    fn rejects_unknown_column() {
        assert!(compile("bogus = auth.uid()", &cols(), &principal()).is_err());
    }
}
