//! # LDAP Filters
//!
//! RFC 1960 style filter expressions evaluated against endpoint properties,
//! e.g. `(&(SERVICE_NAME={urn:test}echo)(!(UNTARGETABLE=true)))`.
//!
//! ## Supported Syntax
//!
//! | Form | Meaning |
//! |------|---------|
//! | `(&F1F2...)` | all match |
//! | `(|F1F2...)` | any matches |
//! | `(!F)` | negation |
//! | `(k=v)` | equality |
//! | `(k=*)` | key present |
//! | `(k=a*b*c)` | substring with wildcards |
//! | `(k~=v)` | equality ignoring case and whitespace |
//! | `(k>=v)`, `(k<=v)` | numeric when both sides parse, lexicographic otherwise |
//!
//! A backslash escapes the next character in a value. Keys are compared
//! case-sensitively, like property queries.

use nmr_types::{NmrError, Properties};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// A parsed filter expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Equal { key: String, value: String },
    Approx { key: String, value: String },
    GreaterOrEqual { key: String, value: String },
    LessOrEqual { key: String, value: String },
    Present { key: String },
    /// Wildcard match; `parts` are the literal runs between `*`s, so a
    /// leading or trailing wildcard shows up as an empty first or last part.
    Substring { key: String, parts: Vec<String> },
}

impl Filter {
    /// Parses a filter expression.
    ///
    /// # Errors
    ///
    /// [`NmrError::InvalidFilter`] with the character offset of the problem.
    pub fn parse(expression: &str) -> Result<Self, NmrError> {
        let mut parser = Parser::new(expression);
        parser.skip_whitespace();
        let filter = parser.filter()?;
        parser.skip_whitespace();
        if !parser.at_end() {
            return Err(parser.error("unexpected trailing input"));
        }
        Ok(filter)
    }

    /// Evaluates the filter against a property map.
    #[must_use]
    pub fn matches(&self, properties: &Properties) -> bool {
        match self {
            Self::And(filters) => filters.iter().all(|f| f.matches(properties)),
            Self::Or(filters) => filters.iter().any(|f| f.matches(properties)),
            Self::Not(filter) => !filter.matches(properties),
            Self::Present { key } => properties.get(key).is_some(),
            Self::Equal { key, value } => properties.get(key) == Some(value.as_str()),
            Self::Approx { key, value } => properties
                .get(key)
                .is_some_and(|actual| normalize(actual) == normalize(value)),
            Self::GreaterOrEqual { key, value } => properties
                .get(key)
                .is_some_and(|actual| compare(actual, value) != Ordering::Less),
            Self::LessOrEqual { key, value } => properties
                .get(key)
                .is_some_and(|actual| compare(actual, value) != Ordering::Greater),
            Self::Substring { key, parts } => properties
                .get(key)
                .is_some_and(|actual| substring_match(parts, actual)),
        }
    }
}

fn normalize(value: &str) -> String {
    value
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

fn compare(actual: &str, expected: &str) -> Ordering {
    match (actual.trim().parse::<f64>(), expected.trim().parse::<f64>()) {
        (Ok(a), Ok(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
        _ => actual.cmp(expected),
    }
}

fn substring_match(parts: &[String], value: &str) -> bool {
    let Some((first, rest)) = parts.split_first() else {
        return false;
    };
    let Some(mut remaining) = value.strip_prefix(first.as_str()) else {
        return false;
    };
    let Some((last, middle)) = rest.split_last() else {
        return remaining.is_empty();
    };
    for part in middle {
        match remaining.find(part.as_str()) {
            Some(index) => remaining = &remaining[index + part.len()..],
            None => return false,
        }
    }
    remaining.ends_with(last.as_str())
}

// =============================================================================
// Parser
// =============================================================================

/// Deepest accepted nesting of `&`, `|` and `!` groups.
const MAX_DEPTH: usize = 64;

struct Parser {
    chars: Vec<char>,
    pos: usize,
    depth: usize,
}

enum Operator {
    Equal,
    Approx,
    GreaterOrEqual,
    LessOrEqual,
}

impl Parser {
    fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            pos: 0,
            depth: 0,
        }
    }

    fn error(&self, reason: &str) -> NmrError {
        NmrError::InvalidFilter {
            position: self.pos,
            reason: reason.to_string(),
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), NmrError> {
        if self.peek() == Some(expected) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("expected '{expected}'")))
        }
    }

    fn filter(&mut self) -> Result<Filter, NmrError> {
        self.expect('(')?;
        if self.depth == MAX_DEPTH {
            return Err(self.error(&format!("filter nested deeper than {MAX_DEPTH} levels")));
        }
        self.depth += 1;
        let filter = self.group();
        self.depth -= 1;
        filter
    }

    fn group(&mut self) -> Result<Filter, NmrError> {
        self.skip_whitespace();
        let filter = match self.peek() {
            Some('&') => {
                self.pos += 1;
                Filter::And(self.filter_list()?)
            }
            Some('|') => {
                self.pos += 1;
                Filter::Or(self.filter_list()?)
            }
            Some('!') => {
                self.pos += 1;
                self.skip_whitespace();
                Filter::Not(Box::new(self.filter()?))
            }
            Some(_) => self.item()?,
            None => return Err(self.error("unexpected end of filter")),
        };
        self.skip_whitespace();
        self.expect(')')?;
        Ok(filter)
    }

    fn filter_list(&mut self) -> Result<Vec<Filter>, NmrError> {
        let mut filters = Vec::new();
        self.skip_whitespace();
        while self.peek() == Some('(') {
            filters.push(self.filter()?);
            self.skip_whitespace();
        }
        if filters.is_empty() {
            return Err(self.error("empty filter list"));
        }
        Ok(filters)
    }

    fn item(&mut self) -> Result<Filter, NmrError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if matches!(c, '=' | '~' | '>' | '<' | '(' | ')') {
                break;
            }
            self.pos += 1;
        }
        let key: String = self.chars[start..self.pos].iter().collect();
        let key = key.trim().to_string();
        if key.is_empty() {
            return Err(self.error("missing attribute name"));
        }

        let operator = match self.peek() {
            Some('=') => {
                self.pos += 1;
                Operator::Equal
            }
            Some(op @ ('~' | '>' | '<')) => {
                self.pos += 1;
                self.expect('=')?;
                match op {
                    '~' => Operator::Approx,
                    '>' => Operator::GreaterOrEqual,
                    _ => Operator::LessOrEqual,
                }
            }
            _ => return Err(self.error("expected an operator")),
        };

        let parts = self.value()?;
        let filter = match operator {
            Operator::Equal if parts.len() == 1 => Filter::Equal {
                key,
                value: parts.concat(),
            },
            Operator::Equal if parts.iter().all(String::is_empty) && parts.len() == 2 => {
                Filter::Present { key }
            }
            Operator::Equal => Filter::Substring { key, parts },
            Operator::Approx => Filter::Approx {
                key,
                value: parts.join("*"),
            },
            Operator::GreaterOrEqual => Filter::GreaterOrEqual {
                key,
                value: parts.join("*"),
            },
            Operator::LessOrEqual => Filter::LessOrEqual {
                key,
                value: parts.join("*"),
            },
        };
        Ok(filter)
    }

    /// Reads a value up to the closing parenthesis, split on unescaped `*`.
    fn value(&mut self) -> Result<Vec<String>, NmrError> {
        let mut parts = vec![String::new()];
        loop {
            match self.peek() {
                None => return Err(self.error("unterminated value")),
                Some(')') => break,
                Some('(') => return Err(self.error("unescaped '(' in value")),
                Some('\\') => {
                    self.pos += 1;
                    let escaped = self
                        .peek()
                        .ok_or_else(|| self.error("dangling escape"))?;
                    self.pos += 1;
                    push_char(&mut parts, escaped);
                }
                Some('*') => {
                    self.pos += 1;
                    parts.push(String::new());
                }
                Some(c) => {
                    self.pos += 1;
                    push_char(&mut parts, c);
                }
            }
        }
        Ok(parts)
    }
}

fn push_char(parts: &mut [String], c: char) {
    if let Some(last) = parts.last_mut() {
        last.push(c);
    }
}

// =============================================================================
// Rendering
// =============================================================================

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '(' | ')' | '*' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::And(filters) | Self::Or(filters) => {
                let op = if matches!(self, Self::And(_)) { '&' } else { '|' };
                write!(f, "({op}")?;
                for filter in filters {
                    write!(f, "{filter}")?;
                }
                f.write_str(")")
            }
            Self::Not(filter) => write!(f, "(!{filter})"),
            Self::Equal { key, value } => write!(f, "({key}={})", escape(value)),
            Self::Approx { key, value } => write!(f, "({key}~={})", escape(value)),
            Self::GreaterOrEqual { key, value } => write!(f, "({key}>={})", escape(value)),
            Self::LessOrEqual { key, value } => write!(f, "({key}<={})", escape(value)),
            Self::Present { key } => write!(f, "({key}=*)"),
            Self::Substring { key, parts } => {
                let rendered: Vec<String> = parts.iter().map(|p| escape(p)).collect();
                write!(f, "({key}={})", rendered.join("*"))
            }
        }
    }
}

impl FromStr for Filter {
    type Err = NmrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Filter {
    type Error = NmrError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Filter> for String {
    fn from(filter: Filter) -> Self {
        filter.to_string()
    }
}
