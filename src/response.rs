//! Parsed AGI responses and their argument bag

use indexmap::IndexMap;
use std::fmt;

/// Synthetic key an unnamed trailing token is stored under
pub const NOKEY: &str = "value";

/// One argument value in a response tail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgValue {
    /// `key=value` pair
    Text(String),
    /// `(name)` tag-only flag, e.g. `(timeout)`
    Flag,
    /// Bare token without `key=` structure, stored under [`NOKEY`]
    Bare(String),
}

/// Ordered bag of named arguments from a response tail.
///
/// Insertion order is preserved so a parsed tail can be re-serialized
/// byte-for-byte equivalent. Repeated keys keep the most recent value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Arguments {
    entries: IndexMap<String, ArgValue>,
    // most recent token that carried no key=value structure (bare token or
    // parenthesized payload), which is how unnamed verb payloads like the
    // GET VARIABLE value arrive
    last_unnamed: Option<String>,
}

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a `key=value` pair
    pub fn insert_pair(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), ArgValue::Text(value.into()));
    }

    /// Insert a `(name)` flag
    pub fn insert_flag(&mut self, name: impl Into<String>) {
        let name = name.into();
        self.last_unnamed = Some(name.clone());
        self.entries.insert(name, ArgValue::Flag);
    }

    /// Insert a bare token under the synthetic [`NOKEY`] key
    pub fn insert_bare(&mut self, token: impl Into<String>) {
        let token = token.into();
        self.last_unnamed = Some(token.clone());
        self.entries.insert(NOKEY.to_string(), ArgValue::Bare(token));
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// String value of a named or bare entry. Flags have no string value.
    pub fn string(&self, key: &str) -> Option<&str> {
        match self.entries.get(key)? {
            ArgValue::Text(s) | ArgValue::Bare(s) => Some(s),
            ArgValue::Flag => None,
        }
    }

    /// Integer value of an entry; `0` when absent or unparseable
    pub fn number(&self, key: &str) -> i64 {
        self.string(key)
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(0)
    }

    /// Presence test, `true` for any entry kind under `key` (this is how
    /// tag-only flags such as `(timeout)` are read)
    pub fn boolean(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Entry read as an ASCII code point, converted to the character it
    /// names. `None` when the value is absent, zero, or out of ASCII range.
    pub fn char_value(&self, key: &str) -> Option<char> {
        let code = self.number(key);
        if (1..=127).contains(&code) {
            Some(code as u8 as char)
        } else {
            None
        }
    }

    /// The most recent unnamed token (bare, or the payload of a
    /// parenthesized token). Used by verbs like `GET VARIABLE` whose
    /// payload arrives without a key.
    pub fn nokey(&self) -> Option<&str> {
        self.last_unnamed.as_deref()
    }

    /// Iterate entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ArgValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl fmt::Display for Arguments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (key, value) in &self.entries {
            if !first {
                write!(f, " ")?;
            }
            first = false;
            match value {
                ArgValue::Text(s) => write!(f, "{}={}", key, s)?,
                ArgValue::Flag => write!(f, "({})", key)?,
                ArgValue::Bare(s) => write!(f, "{}", s)?,
            }
        }
        Ok(())
    }
}

/// Parsed form of a single Asterisk reply line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Three-digit response code (typically 200, 510, 511, 520)
    pub code: u16,
    /// Integer `result=` value; `0` when absent
    pub result: i64,
    /// Remaining named arguments, flags, and unnamed tokens
    pub args: Arguments,
}

impl Response {
    pub fn new(code: u16, args: Arguments) -> Self {
        let result = args.number("result");
        Self { code, result, args }
    }

    /// The raw `result=` text, preserving non-numeric payloads such as the
    /// digit string `GET DATA` returns (`result=0042`, `result=12*3`)
    pub fn result_text(&self) -> Option<&str> {
        self.args.string("result")
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.args.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{} {}", self.code, self.args)
        }
    }
}
