//! Minimal SQL subset understood by the in-process store:
//! `SELECT * FROM c [WHERE c.a op literal [AND ...]]`, or a bare predicate.

use std::cmp::Ordering;

use serde_json::Value;

use super::Document;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("query syntax: {0}")]
pub struct QueryError(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Condition {
    pub path: Vec<String>,
    pub op: CmpOp,
    pub value: Value,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ParsedQuery {
    pub conditions: Vec<Condition>,
}

impl ParsedQuery {
    pub fn matches(&self, doc: &Document) -> bool {
        self.conditions.iter().all(|c| c.matches(doc))
    }

    /// Equality literal bound to the partition key path (e.g. `/username`),
    /// which lets the store target a single partition.
    pub fn partition_value(&self, pk_path: &str) -> Option<&Value> {
        let want: Vec<&str> = pk_path.trim_start_matches('/').split('/').collect();
        self.conditions
            .iter()
            .find(|c| c.op == CmpOp::Eq && c.path.iter().map(String::as_str).eq(want.iter().copied()))
            .map(|c| &c.value)
    }
}

impl Condition {
    fn matches(&self, doc: &Document) -> bool {
        let mut iter = self.path.iter();
        let Some(first) = iter.next() else { return false };
        let mut cur = match doc.get(first) {
            Some(v) => v,
            None => return false,
        };
        for seg in iter {
            cur = match cur.get(seg) {
                Some(v) => v,
                None => return false,
            };
        }
        match compare(cur, &self.value) {
            Some(ord) => match self.op {
                CmpOp::Eq => ord == Ordering::Equal,
                CmpOp::Ne => ord != Ordering::Equal,
                CmpOp::Lt => ord == Ordering::Less,
                CmpOp::Le => ord != Ordering::Greater,
                CmpOp::Gt => ord == Ordering::Greater,
                CmpOp::Ge => ord != Ordering::Less,
            },
            // Mixed types only ever satisfy inequality.
            None => self.op == CmpOp::Ne,
        }
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Word(String),
    Str(String),
    Num(f64),
    Op(CmpOp),
    Star,
    Dot,
}

fn tokenize(input: &str) -> Result<Vec<Token>, QueryError> {
    let mut out = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '*' => {
                out.push(Token::Star);
                i += 1;
            }
            '.' if !chars.get(i + 1).is_some_and(|d| d.is_ascii_digit()) => {
                out.push(Token::Dot);
                i += 1;
            }
            '\'' | '"' => {
                let quote = c;
                let start = i + 1;
                let mut j = start;
                while j < chars.len() && chars[j] != quote {
                    j += 1;
                }
                if j >= chars.len() {
                    return Err(QueryError("unterminated string literal".into()));
                }
                out.push(Token::Str(chars[start..j].iter().collect()));
                i = j + 1;
            }
            '=' => {
                out.push(Token::Op(CmpOp::Eq));
                i += 1;
            }
            '!' | '<' | '>' => {
                let next = chars.get(i + 1).copied();
                let (op, width) = match (c, next) {
                    ('!', Some('=')) => (CmpOp::Ne, 2),
                    ('<', Some('>')) => (CmpOp::Ne, 2),
                    ('<', Some('=')) => (CmpOp::Le, 2),
                    ('>', Some('=')) => (CmpOp::Ge, 2),
                    ('<', _) => (CmpOp::Lt, 1),
                    ('>', _) => (CmpOp::Gt, 1),
                    _ => return Err(QueryError(format!("unexpected '{}'", c))),
                };
                out.push(Token::Op(op));
                i += width;
            }
            c if c.is_ascii_digit() || c == '-' || c == '.' => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let n = text
                    .parse::<f64>()
                    .map_err(|_| QueryError(format!("bad number '{}'", text)))?;
                out.push(Token::Num(n));
            }
            c if c.is_alphanumeric() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                out.push(Token::Word(chars[start..i].iter().collect()));
            }
            other => return Err(QueryError(format!("unexpected '{}'", other))),
        }
    }
    Ok(out)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    alias: Option<String>,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn keyword(&mut self, kw: &str) -> bool {
        match self.peek() {
            Some(Token::Word(w)) if w.eq_ignore_ascii_case(kw) => {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }

    fn expect_keyword(&mut self, kw: &str) -> Result<(), QueryError> {
        if self.keyword(kw) {
            Ok(())
        } else {
            Err(QueryError(format!("expected {}", kw)))
        }
    }

    fn word(&mut self) -> Result<String, QueryError> {
        match self.next() {
            Some(Token::Word(w)) => Ok(w),
            other => Err(QueryError(format!("expected identifier, got {:?}", other))),
        }
    }

    fn select(&mut self) -> Result<(), QueryError> {
        self.expect_keyword("SELECT")?;
        match self.next() {
            Some(Token::Star) => {}
            _ => return Err(QueryError("only SELECT * is supported".into())),
        }
        self.expect_keyword("FROM")?;
        self.alias = Some(self.word()?);
        Ok(())
    }

    fn path(&mut self) -> Result<Vec<String>, QueryError> {
        let mut segs = vec![self.word()?];
        while self.peek() == Some(&Token::Dot) {
            self.pos += 1;
            segs.push(self.word()?);
        }
        if let Some(alias) = &self.alias {
            if segs.len() > 1 && &segs[0] == alias {
                segs.remove(0);
            }
        }
        Ok(segs)
    }

    fn literal(&mut self) -> Result<Value, QueryError> {
        match self.next() {
            Some(Token::Str(s)) => Ok(Value::String(s)),
            Some(Token::Num(n)) => serde_json::Number::from_f64(n)
                .map(Value::Number)
                .ok_or_else(|| QueryError("non-finite number".into())),
            Some(Token::Word(w)) if w.eq_ignore_ascii_case("true") => Ok(Value::Bool(true)),
            Some(Token::Word(w)) if w.eq_ignore_ascii_case("false") => Ok(Value::Bool(false)),
            Some(Token::Word(w)) if w.eq_ignore_ascii_case("null") => Ok(Value::Null),
            other => Err(QueryError(format!("expected literal, got {:?}", other))),
        }
    }

    fn condition(&mut self) -> Result<Condition, QueryError> {
        let path = self.path()?;
        let op = match self.next() {
            Some(Token::Op(op)) => op,
            other => return Err(QueryError(format!("expected operator, got {:?}", other))),
        };
        let value = self.literal()?;
        Ok(Condition { path, op, value })
    }

    fn conditions(&mut self) -> Result<Vec<Condition>, QueryError> {
        let mut out = vec![self.condition()?];
        while self.keyword("AND") {
            out.push(self.condition()?);
        }
        Ok(out)
    }
}

pub fn parse(input: &str) -> Result<ParsedQuery, QueryError> {
    let tokens = tokenize(input)?;
    let mut p = Parser {
        tokens,
        pos: 0,
        alias: None,
    };
    let is_select = matches!(p.peek(), Some(Token::Word(w)) if w.eq_ignore_ascii_case("SELECT"));
    let conditions = if is_select {
        p.select()?;
        if p.keyword("WHERE") {
            p.conditions()?
        } else {
            Vec::new()
        }
    } else {
        p.conditions()?
    };
    if let Some(t) = p.peek() {
        return Err(QueryError(format!("unexpected trailing token {:?}", t)));
    }
    Ok(ParsedQuery { conditions })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(v: Value) -> Document {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn parses_select_with_conjunction() {
        let q = parse("SELECT * FROM c WHERE c.username = 'Curt28' AND c.documentType = 'user'")
            .unwrap();
        assert_eq!(q.conditions.len(), 2);
        assert_eq!(q.conditions[0].path, vec!["username"]);
        assert_eq!(q.partition_value("/username"), Some(&json!("Curt28")));
        assert_eq!(q.partition_value("/id"), None);
    }

    #[test]
    fn bare_predicate_with_double_quotes() {
        let q = parse(r#"username = "Curt28""#).unwrap();
        assert!(q.matches(&doc(json!({"username": "Curt28"}))));
        assert!(!q.matches(&doc(json!({"username": "curt28"}))));
    }

    #[test]
    fn numeric_range() {
        let q = parse("SELECT * FROM c WHERE c.rating >= 4.7").unwrap();
        assert!(q.matches(&doc(json!({"rating": 4.7}))));
        assert!(q.matches(&doc(json!({"rating": 5}))));
        assert!(!q.matches(&doc(json!({"rating": 4.69}))));
        assert!(!q.matches(&doc(json!({"username": "x"}))));
    }

    #[test]
    fn no_where_matches_everything() {
        let q = parse("select * from root").unwrap();
        assert!(q.matches(&doc(json!({"id": "a"}))));
    }

    #[test]
    fn nested_paths_and_bools() {
        let q = parse("SELECT * FROM c WHERE c.meta.verified = true AND c.n != 3").unwrap();
        assert!(q.matches(&doc(json!({"meta": {"verified": true}, "n": 2}))));
        assert!(!q.matches(&doc(json!({"meta": {"verified": false}, "n": 2}))));
    }

    #[test]
    fn rejects_malformed() {
        assert!(parse("SELECT id FROM c").is_err());
        assert!(parse("SELECT * FROM c WHERE c.a = 'open").is_err());
        assert!(parse("SELECT * FROM c WHERE c.a = 1 OR c.b = 2").is_err());
    }
}
