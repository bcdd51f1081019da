//! Dotted/bracket paths into JSON values (`inputs.text`, `widgets_values[0]`).
//!
//! Lookups never fail: a missing segment yields `None` so callers can try a
//! fallback path. Writes create intermediate objects and arrays on demand
//! and pad arrays with `null`; they fail only when an existing value on the
//! way is not a container.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// One step of a [`ParamPath`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Index(usize),
}

/// A parsed path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamPath {
    segments: Vec<Segment>,
}

/// Failure to parse or apply a path.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PathError {
    #[error("Invalid path '{path}': {reason}")]
    Syntax { path: String, reason: String },

    #[error("Path is empty")]
    Empty,

    #[error("Cannot descend into {found} at segment '{segment}'")]
    NotAContainer { segment: String, found: &'static str },

    #[error("Input '{0}' is a node reference and cannot be overwritten")]
    ReferenceInput(String),

    #[error("Field '{0}' is reserved")]
    Reserved(String),
}

impl ParamPath {
    pub fn new(segments: Vec<Segment>) -> Self {
        Self { segments }
    }

    /// Shorthand for `inputs.<name>`.
    pub fn input(name: &str) -> Self {
        Self::new(vec![
            Segment::Key("inputs".to_string()),
            Segment::Key(name.to_string()),
        ])
    }

    pub fn parse(raw: &str) -> Result<Self, PathError> {
        let syntax = |reason: &str| PathError::Syntax {
            path: raw.to_string(),
            reason: reason.to_string(),
        };

        let mut segments = Vec::new();
        let mut key = String::new();
        let mut chars = raw.chars().peekable();
        // True right after a closing bracket, where a key may not follow directly.
        let mut after_index = false;

        while let Some(c) = chars.next() {
            match c {
                '.' => {
                    if key.is_empty() && !after_index {
                        return Err(syntax("empty key"));
                    }
                    if !key.is_empty() {
                        segments.push(Segment::Key(std::mem::take(&mut key)));
                    }
                    after_index = false;
                    if chars.peek().is_none() {
                        return Err(syntax("trailing '.'"));
                    }
                }
                '[' => {
                    if !key.is_empty() {
                        segments.push(Segment::Key(std::mem::take(&mut key)));
                    } else if segments.is_empty() {
                        return Err(syntax("path must start with a key"));
                    }
                    let mut digits = String::new();
                    loop {
                        match chars.next() {
                            Some(']') => break,
                            Some(d) if d.is_ascii_digit() => digits.push(d),
                            Some(_) => return Err(syntax("index must be a non-negative integer")),
                            None => return Err(syntax("unclosed '['")),
                        }
                    }
                    let index = digits
                        .parse::<usize>()
                        .map_err(|_| syntax("index must be a non-negative integer"))?;
                    segments.push(Segment::Index(index));
                    after_index = true;
                }
                ']' => return Err(syntax("unexpected ']'")),
                other => {
                    if after_index {
                        return Err(syntax("expected '.' or '[' after index"));
                    }
                    key.push(other);
                }
            }
        }
        if !key.is_empty() {
            segments.push(Segment::Key(key));
        }
        if segments.is_empty() {
            return Err(PathError::Empty);
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }
}

impl fmt::Display for ParamPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Key(k) if i == 0 => write!(f, "{k}")?,
                Segment::Key(k) => write!(f, ".{k}")?,
                Segment::Index(n) => write!(f, "[{n}]")?,
            }
        }
        Ok(())
    }
}

impl FromStr for ParamPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for ParamPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ParamPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Value access
// ---------------------------------------------------------------------------

/// Follow `segments` from `root`. Returns `None` when any step is missing.
pub fn get<'a>(root: &'a Value, segments: &[Segment]) -> Option<&'a Value> {
    segments.iter().try_fold(root, |current, segment| match segment {
        Segment::Key(k) => current.as_object()?.get(k),
        Segment::Index(i) => current.as_array()?.get(*i),
    })
}

/// Write `value` at `segments` below `root`, creating containers as needed.
///
/// `null` placeholders are replaced by whatever container the next segment
/// requires; any other scalar on the way is a structural failure.
pub fn set(root: &mut Value, segments: &[Segment], value: Value) -> Result<(), PathError> {
    let Some((first, rest)) = segments.split_first() else {
        *root = value;
        return Ok(());
    };

    match first {
        Segment::Key(k) => {
            if root.is_null() {
                *root = Value::Object(serde_json::Map::new());
            }
            let found = kind_of(root);
            let obj = root.as_object_mut().ok_or_else(|| PathError::NotAContainer {
                segment: k.clone(),
                found,
            })?;
            let slot = obj.entry(k.clone()).or_insert(Value::Null);
            set(slot, rest, value)
        }
        Segment::Index(i) => {
            if root.is_null() {
                *root = Value::Array(Vec::new());
            }
            let found = kind_of(root);
            let arr = root.as_array_mut().ok_or_else(|| PathError::NotAContainer {
                segment: format!("[{i}]"),
                found,
            })?;
            if arr.len() <= *i {
                arr.resize(*i + 1, Value::Null);
            }
            set(&mut arr[*i], rest, value)
        }
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
