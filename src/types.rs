use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Reserved keywords that match a group of records instead of one key.
///
/// - `all`: every visible record (hidden ones skipped).
/// - `ALL`: every record, hidden included.
/// - `hidden_only`: only internal records.
/// - `autorun_only`: visible records with `autorun` set, suspended or not.
/// - `autorun_enabled`: visible records with `autorun` set and not suspended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selector {
    All,
    #[serde(rename = "ALL")]
    Everything,
    HiddenOnly,
    AutorunOnly,
    AutorunEnabled,
}

impl Selector {
    pub fn keyword(&self) -> &'static str {
        match self {
            Selector::All => "all",
            Selector::Everything => "ALL",
            Selector::HiddenOnly => "hidden_only",
            Selector::AutorunOnly => "autorun_only",
            Selector::AutorunEnabled => "autorun_enabled",
        }
    }

    /// Keywords are matched case-sensitively: `all` and `ALL` differ.
    pub fn from_keyword(s: &str) -> Option<Self> {
        match s {
            "all" => Some(Selector::All),
            "ALL" => Some(Selector::Everything),
            "hidden_only" => Some(Selector::HiddenOnly),
            "autorun_only" => Some(Selector::AutorunOnly),
            "autorun_enabled" => Some(Selector::AutorunEnabled),
            _ => None,
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// A literal record key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Id(u32),
    Name(String),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Id(id) => write!(f, "id={id}"),
            Key::Name(name) => write!(f, "name={name}"),
        }
    }
}

impl From<u32> for Key {
    fn from(id: u32) -> Self {
        Key::Id(id)
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Key::Name(name.to_string())
    }
}

/// What a control verb acts on: one literal key or a selector.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    Key(Key),
    Selector(Selector),
}

impl Target {
    pub fn is_selector(&self) -> bool {
        matches!(self, Target::Selector(_))
    }
}

impl FromStr for Target {
    type Err = String;

    /// Selector keywords win, then integers are ids, anything else is a name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("empty target (expected an id, a name or a selector)".to_string());
        }
        if let Some(selector) = Selector::from_keyword(s) {
            return Ok(Target::Selector(selector));
        }
        match s.parse::<u32>() {
            Ok(id) => Ok(Target::Key(Key::Id(id))),
            Err(_) => Ok(Target::Key(Key::Name(s.to_string()))),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Key(key) => key.fmt(f),
            Target::Selector(selector) => selector.fmt(f),
        }
    }
}
