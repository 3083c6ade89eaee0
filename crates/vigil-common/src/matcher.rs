use crate::error::MatcherError;
use crate::types::{is_valid_label_name, Labels};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Comparison applied by a [`Matcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchOp {
    #[serde(rename = "=")]
    Equal,
    #[serde(rename = "!=")]
    NotEqual,
    #[serde(rename = "=~")]
    Regex,
    #[serde(rename = "!~")]
    NotRegex,
}

impl MatchOp {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchOp::Equal => "=",
            MatchOp::NotEqual => "!=",
            MatchOp::Regex => "=~",
            MatchOp::NotRegex => "!~",
        }
    }

    fn is_regex(self) -> bool {
        matches!(self, MatchOp::Regex | MatchOp::NotRegex)
    }
}

impl std::fmt::Display for MatchOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single label predicate such as `severity="critical"` or `job=~"api.*"`.
///
/// Regex matchers are compiled once in [`Matcher::new`]; a matcher value
/// that exists is always usable. Patterns are unanchored unless the pattern
/// itself uses `^` / `$`. A label absent from the alert compares as `""`.
///
/// # Examples
///
/// ```
/// use std::collections::HashMap;
/// use vigil_common::matcher::Matcher;
///
/// let m = Matcher::parse(r#"job=~"api""#).unwrap();
/// let mut labels = HashMap::new();
/// labels.insert("job".to_string(), "billing-api-v2".to_string());
/// assert!(m.matches(&labels));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "MatcherRepr", into = "String")]
pub struct Matcher {
    name: String,
    op: MatchOp,
    value: String,
    regex: Option<Regex>,
}

impl Matcher {
    pub fn new(
        name: impl Into<String>,
        op: MatchOp,
        value: impl Into<String>,
    ) -> Result<Self, MatcherError> {
        let name = name.into();
        let value = value.into();
        if !is_valid_label_name(&name) {
            return Err(MatcherError::InvalidLabelName(name));
        }
        let regex = if op.is_regex() {
            Some(Regex::new(&value).map_err(|e| MatcherError::InvalidRegex {
                name: name.clone(),
                reason: e.to_string(),
            })?)
        } else {
            None
        };
        Ok(Self {
            name,
            op,
            value,
            regex,
        })
    }

    pub fn equal(name: impl Into<String>, value: impl Into<String>) -> Result<Self, MatcherError> {
        Self::new(name, MatchOp::Equal, value)
    }

    /// Parses `name<op>value`, where the value may be double-quoted.
    pub fn parse(input: &str) -> Result<Self, MatcherError> {
        let input = input.trim();
        let name_len = input
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .ok_or_else(|| MatcherError::Syntax(input.to_string()))?;
        let (name, rest) = input.split_at(name_len);
        let rest = rest.trim_start();

        let (op, raw_value) = if let Some(v) = rest.strip_prefix("=~") {
            (MatchOp::Regex, v)
        } else if let Some(v) = rest.strip_prefix("!~") {
            (MatchOp::NotRegex, v)
        } else if let Some(v) = rest.strip_prefix("!=") {
            (MatchOp::NotEqual, v)
        } else if let Some(v) = rest.strip_prefix('=') {
            (MatchOp::Equal, v)
        } else {
            return Err(MatcherError::Syntax(input.to_string()));
        };

        Self::new(name, op, unquote(raw_value.trim())?)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn op(&self) -> MatchOp {
        self.op
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn matches(&self, labels: &Labels) -> bool {
        let actual = labels.get(&self.name).map(String::as_str).unwrap_or("");
        match (self.op, &self.regex) {
            (MatchOp::Equal, _) => actual == self.value,
            (MatchOp::NotEqual, _) => actual != self.value,
            (MatchOp::Regex, Some(re)) => re.is_match(actual),
            (MatchOp::NotRegex, Some(re)) => !re.is_match(actual),
            // new() always compiles regex ops
            (MatchOp::Regex | MatchOp::NotRegex, None) => false,
        }
    }
}

impl PartialEq for Matcher {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.op == other.op && self.value == other.value
    }
}

impl Eq for Matcher {}

/// Writes the value double-quoted, escaping only what the parser unescapes.
impl std::fmt::Display for Matcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use std::fmt::Write;

        write!(f, "{}{}\"", self.name, self.op)?;
        for c in self.value.chars() {
            match c {
                '"' => f.write_str("\\\"")?,
                '\\' => f.write_str("\\\\")?,
                '\n' => f.write_str("\\n")?,
                '\t' => f.write_str("\\t")?,
                '\r' => f.write_str("\\r")?,
                other => f.write_char(other)?,
            }
        }
        f.write_char('"')
    }
}

impl From<Matcher> for String {
    fn from(m: Matcher) -> Self {
        m.to_string()
    }
}

/// Accepts either the textual form or an explicit object.
#[derive(Deserialize)]
#[serde(untagged)]
enum MatcherRepr {
    Text(String),
    Object {
        name: String,
        #[serde(rename = "type", alias = "op", default = "default_op")]
        op: MatchOp,
        value: String,
    },
}

fn default_op() -> MatchOp {
    MatchOp::Equal
}

impl TryFrom<MatcherRepr> for Matcher {
    type Error = MatcherError;

    fn try_from(repr: MatcherRepr) -> Result<Self, Self::Error> {
        match repr {
            MatcherRepr::Text(text) => Matcher::parse(&text),
            MatcherRepr::Object { name, op, value } => Matcher::new(name, op, value),
        }
    }
}

fn unquote(raw: &str) -> Result<String, MatcherError> {
    let Some(inner) = raw.strip_prefix('"') else {
        return Ok(raw.to_string());
    };
    let inner = inner
        .strip_suffix('"')
        .ok_or_else(|| MatcherError::Syntax(raw.to_string()))?;

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('"') => out.push('"'),
                Some('\\') => out.push('\\'),
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('r') => out.push('\r'),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => return Err(MatcherError::Syntax(raw.to_string())),
            }
        } else {
            out.push(c);
        }
    }
    Ok(out)
}

/// A conjunction of matchers. The empty set matches every label set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "MatcherSetRepr", into = "Vec<Matcher>")]
pub struct MatcherSet(Vec<Matcher>);

impl MatcherSet {
    pub fn new(matchers: Vec<Matcher>) -> Self {
        Self(matchers)
    }

    /// Parses the selector form `{a="b", c!~"d"}`; braces are optional.
    pub fn parse(input: &str) -> Result<Self, MatcherError> {
        let trimmed = input.trim();
        let body = trimmed
            .strip_prefix('{')
            .map(|s| s.strip_suffix('}').unwrap_or(s))
            .unwrap_or(trimmed);

        split_top_level(body)
            .into_iter()
            .filter(|part| !part.trim().is_empty())
            .map(Matcher::parse)
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }

    pub fn matches(&self, labels: &Labels) -> bool {
        self.0.iter().all(|m| m.matches(labels))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Matcher> {
        self.0.iter()
    }
}

impl From<MatcherSet> for Vec<Matcher> {
    fn from(set: MatcherSet) -> Self {
        set.0
    }
}

impl std::fmt::Display for MatcherSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MatcherSetRepr {
    List(Vec<Matcher>),
    Selector(String),
    Equalities(BTreeMap<String, String>),
}

impl TryFrom<MatcherSetRepr> for MatcherSet {
    type Error = MatcherError;

    fn try_from(repr: MatcherSetRepr) -> Result<Self, Self::Error> {
        match repr {
            MatcherSetRepr::List(list) => Ok(Self(list)),
            MatcherSetRepr::Selector(text) => Self::parse(&text),
            MatcherSetRepr::Equalities(map) => map
                .into_iter()
                .map(|(name, value)| Matcher::equal(name, value))
                .collect::<Result<Vec<_>, _>>()
                .map(Self),
        }
    }
}

/// Splits on commas that are not inside a double-quoted value.
fn split_top_level(body: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut escaped = false;
    let mut start = 0;
    for (i, c) in body.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                parts.push(&body[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&body[start..]);
    parts
}
