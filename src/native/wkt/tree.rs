//! Bracketed keyword tree shared by the WKT reader and writer.

use std::fmt::Write as _;

use crate::native::{NativeError, NativeResult};

#[derive(Clone, Debug, PartialEq)]
pub enum WktValue {
    Node(WktNode),
    Text(String),
    Number(f64),
    /// Bare enumeration word such as `north` or `ellipsoidal`.
    Word(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct WktNode {
    pub keyword: String,
    pub values: Vec<WktValue>,
}

impl WktNode {
    pub fn new(keyword: &str) -> Self {
        Self {
            keyword: keyword.to_string(),
            values: Vec::new(),
        }
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.values.push(WktValue::Text(text.into()));
        self
    }

    pub fn number(mut self, value: f64) -> Self {
        self.values.push(WktValue::Number(value));
        self
    }

    pub fn word(mut self, word: impl Into<String>) -> Self {
        self.values.push(WktValue::Word(word.into()));
        self
    }

    pub fn child(mut self, node: WktNode) -> Self {
        self.values.push(WktValue::Node(node));
        self
    }

    pub fn push(&mut self, node: WktNode) {
        self.values.push(WktValue::Node(node));
    }

    pub fn push_opt(&mut self, node: Option<WktNode>) {
        if let Some(node) = node {
            self.push(node);
        }
    }

    pub fn is(&self, keywords: &[&str]) -> bool {
        keywords
            .iter()
            .any(|k| self.keyword.eq_ignore_ascii_case(k))
    }

    pub fn children(&self) -> impl Iterator<Item = &WktNode> {
        self.values.iter().filter_map(|v| match v {
            WktValue::Node(node) => Some(node),
            _ => None,
        })
    }

    pub fn find(&self, keywords: &[&str]) -> Option<&WktNode> {
        self.children().find(|node| node.is(keywords))
    }

    pub fn find_all<'a>(&'a self, keywords: &'a [&'a str]) -> impl Iterator<Item = &'a WktNode> {
        self.children().filter(move |node| node.is(keywords))
    }

    /// First quoted string, usually the object name.
    pub fn name(&self) -> Option<&str> {
        self.values.iter().find_map(|v| match v {
            WktValue::Text(text) => Some(text.as_str()),
            _ => None,
        })
    }

    pub fn numbers(&self) -> Vec<f64> {
        self.values
            .iter()
            .filter_map(|v| match v {
                WktValue::Number(n) => Some(*n),
                WktValue::Text(t) => t.trim().parse().ok(),
                _ => None,
            })
            .collect()
    }

    pub fn number_at(&self, index: usize) -> NativeResult<f64> {
        self.numbers().get(index).copied().ok_or_else(|| {
            NativeError::Parse(format!(
                "{} is missing numeric value #{}",
                self.keyword,
                index + 1
            ))
        })
    }

    pub fn first_word(&self) -> Option<&str> {
        self.values.iter().find_map(|v| match v {
            WktValue::Word(word) => Some(word.as_str()),
            _ => None,
        })
    }

    /// Every keyword in the tree, depth first.
    pub fn walk<'a>(&'a self, out: &mut Vec<&'a WktNode>) {
        out.push(self);
        for child in self.children() {
            child.walk(out);
        }
    }

    pub fn render(&self, multiline: bool, indentation: usize) -> String {
        let mut out = String::new();
        self.render_into(&mut out, 0, multiline, indentation);
        out
    }

    fn render_into(&self, out: &mut String, depth: usize, multiline: bool, indentation: usize) {
        out.push_str(&self.keyword);
        out.push('[');
        for (i, value) in self.values.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            match value {
                WktValue::Node(node) => {
                    if multiline {
                        out.push('\n');
                        out.push_str(&" ".repeat((depth + 1) * indentation));
                    }
                    node.render_into(out, depth + 1, multiline, indentation);
                }
                WktValue::Text(text) => {
                    out.push('"');
                    out.push_str(&text.replace('"', "\"\""));
                    out.push('"');
                }
                WktValue::Number(n) => out.push_str(&format_number(*n)),
                WktValue::Word(word) => out.push_str(word),
            }
        }
        out.push(']');
    }
}

/// Up to 15 significant digits, trailing zeros removed.
pub fn format_number(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    if value.fract() == 0.0 && value.abs() < 1e15 {
        return format!("{value:.0}");
    }
    let magnitude = value.abs().log10().floor() as i32 + 1;
    let decimals = (15 - magnitude).clamp(0, 20) as usize;
    let mut text = String::new();
    let _ = write!(text, "{value:.decimals$}");
    if text.contains('.') {
        while text.ends_with('0') {
            text.pop();
        }
        if text.ends_with('.') {
            text.pop();
        }
    }
    text
}

pub fn parse(text: &str) -> NativeResult<WktNode> {
    let mut parser = Parser { text, pos: 0 };
    parser.skip_ws();
    let node = parser.node()?;
    parser.skip_ws();
    if parser.pos < text.len() {
        return Err(NativeError::Parse(format!(
            "Parsing error: unexpected content after WKT at position {}",
            parser.pos
        )));
    }
    Ok(node)
}

struct Parser<'a> {
    text: &'a str,
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn error(&self, what: &str) -> NativeError {
        NativeError::Parse(format!("Parsing error: {what} at position {}", self.pos))
    }

    fn word(&mut self) -> &str {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-' | '+'))
        {
            self.bump();
        }
        &self.text[start..self.pos]
    }

    fn node(&mut self) -> NativeResult<WktNode> {
        let keyword = self.word().to_string();
        if keyword.is_empty() {
            return Err(self.error("expected keyword"));
        }
        self.skip_ws();
        let close = match self.bump() {
            Some('[') => ']',
            Some('(') => ')',
            _ => return Err(self.error(&format!("expected '[' after {keyword}"))),
        };
        let mut node = WktNode::new(&keyword);
        loop {
            self.skip_ws();
            match self.peek() {
                Some('"') => {
                    self.bump();
                    let text = self.quoted()?;
                    node.values.push(WktValue::Text(text));
                }
                Some(c) if c == close && node.values.is_empty() => {
                    self.bump();
                    return Ok(node);
                }
                Some(_) => {
                    let start = self.pos;
                    let token = self.word().to_string();
                    if token.is_empty() {
                        return Err(self.error("unexpected character"));
                    }
                    self.skip_ws();
                    if matches!(self.peek(), Some('[' | '(')) {
                        self.pos = start;
                        node.values.push(WktValue::Node(self.node()?));
                    } else if let Ok(n) = token.parse::<f64>() {
                        node.values.push(WktValue::Number(n));
                    } else {
                        node.values.push(WktValue::Word(token));
                    }
                }
                None => return Err(self.error("unexpected end of text")),
            }
            self.skip_ws();
            match self.bump() {
                Some(',') => continue,
                Some(c) if c == close => return Ok(node),
                _ => return Err(self.error(&format!("expected ',' or '{close}'"))),
            }
        }
    }

    fn quoted(&mut self) -> NativeResult<String> {
        let mut out = String::new();
        loop {
            match self.bump() {
                Some('"') => {
                    if self.peek() == Some('"') {
                        self.bump();
                        out.push('"');
                    } else {
                        return Ok(out);
                    }
                }
                Some(c) => out.push(c),
                None => return Err(self.error("unterminated string")),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_nodes_words_and_numbers() {
        let node = parse(r#"AXIS["easting (E)",east,ORDER[1],LENGTHUNIT["metre",1]]"#)
            .expect("parse");
        assert_eq!(node.keyword, "AXIS");
        assert_eq!(node.name(), Some("easting (E)"));
        assert_eq!(node.first_word(), Some("east"));
        let unit = node.find(&["LENGTHUNIT"]).expect("unit");
        assert_eq!(unit.number_at(0).expect("factor"), 1.0);
    }

    #[test]
    fn doubled_quotes_escape_a_quote() {
        let node = parse(r#"REMARK["say ""hi"""]"#).expect("parse");
        assert_eq!(node.name(), Some(r#"say "hi""#));
        assert_eq!(node.render(false, 0), r#"REMARK["say ""hi"""]"#);
    }

    #[test]
    fn rejects_truncated_and_trailing_text() {
        assert!(parse(r#"GEOGCRS["x""#).is_err());
        assert!(parse(r#"ID["EPSG",1] extra"#).is_err());
    }

    #[test]
    fn numbers_keep_fifteen_significant_digits() {
        assert_eq!(format_number(std::f64::consts::PI / 180.0), "0.0174532925199433");
        assert_eq!(format_number(6378137.0), "6378137");
        assert_eq!(format_number(298.257223563), "298.257223563");
        assert_eq!(format_number(-0.5), "-0.5");
    }
}
