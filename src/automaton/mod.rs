//! Tree automaton consumed by the compressor and the decompressor.
//!
//! The automaton is compiled from a schema by an external tool and handed
//! to rngzip as JSON (see [`TreeAutomaton`]) or built in code with
//! [`AutomatonBuilder`]. [`Automaton`] wraps it with a stable transition
//! order and the query interface both codecs use.
//!
//! ```json
//! {
//!   "initial": 0,
//!   "names": [{"local": "e"}, {"local": "a"}],
//!   "states": [
//!     {"final": false, "transitions": [
//!       {"alphabet": {"element": {"name": {"name": 0}}}, "child": 1, "sibling": 2}]},
//!     ...
//!   ]
//! }
//! ```

mod adapter;
mod builder;

use serde::{Deserialize, Serialize};

use crate::qname::QName;

pub use adapter::{Automaton, StateId, Transition};
pub use builder::AutomatonBuilder;

/// Code of names that do not occur in the name table. Only wildcard name
/// classes accept it.
pub const UNKNOWN_NAME: u32 = u32::MAX;

// ============================================================================
// Serialized model
// ============================================================================

/// Automaton as stored on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeAutomaton {
    pub initial: StateId,
    #[serde(default)]
    pub names: Vec<NameEntry>,
    pub states: Vec<StateDef>,
}

/// One entry of the name table; its index is the name code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameEntry {
    #[serde(default)]
    pub uri: String,
    pub local: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateDef {
    #[serde(rename = "final", default)]
    pub is_final: bool,
    #[serde(default)]
    pub transitions: Vec<TransitionDef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionDef {
    pub alphabet: Alphabet,
    /// Content nested inside the transition (element content, attribute value).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child: Option<StateId>,
    /// Where to continue after the transition.
    pub sibling: StateId,
}

/// What a transition consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Alphabet {
    Element {
        name: NameClass,
    },
    Attribute {
        name: NameClass,
    },
    /// Taken when no present attribute matches `negative` without matching
    /// `positive`.
    NonExistentAttribute {
        negative: Vec<NameClass>,
        #[serde(default)]
        positive: Vec<NameClass>,
    },
    Data {
        #[serde(default)]
        datatype: Datatype,
    },
    Value {
        value: String,
    },
    Interleave,
    List,
}

impl Alphabet {
    /// Short kind name, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Element { .. } => "element",
            Self::Attribute { .. } => "attribute",
            Self::NonExistentAttribute { .. } => "non-existent attribute",
            Self::Data { .. } => "data",
            Self::Value { .. } => "value",
            Self::Interleave => "interleave",
            Self::List => "list",
        }
    }

    /// True for alphabets whose name the decompressor cannot derive from the
    /// automaton alone.
    pub fn has_wildcard_name(&self) -> bool {
        match self {
            Self::Element { name } | Self::Attribute { name } => !name.is_specific(),
            _ => false,
        }
    }
}

/// Set of names, expressed over name codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameClass {
    /// Exactly one name.
    Name(u32),
    /// Every name.
    Any,
    /// Every name except the listed ones.
    AnyExcept(Vec<u32>),
    /// Every name in one namespace.
    NsName(String),
}

impl NameClass {
    /// Does the class contain the name with this code (and namespace)?
    pub fn accepts(&self, code: u32, name: &QName) -> bool {
        match self {
            Self::Name(c) => *c == code && code != UNKNOWN_NAME,
            Self::Any => true,
            Self::AnyExcept(codes) => code == UNKNOWN_NAME || !codes.contains(&code),
            Self::NsName(uri) => *name.uri == **uri,
        }
    }

    /// A single-name class identifies its name without further data.
    pub fn is_specific(&self) -> bool {
        matches!(self, Self::Name(_))
    }
}

/// Datatypes a data transition can test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Datatype {
    #[default]
    String,
    Token,
    Integer,
    Decimal,
    Boolean,
}

impl Datatype {
    /// Lexical check of `text` (surrounding whitespace is allowed except for
    /// `string`, which accepts everything).
    pub fn accepts(self, text: &str) -> bool {
        let t = text.trim_matches(|c: char| matches!(c, ' ' | '\t' | '\n' | '\r'));
        match self {
            Self::String | Self::Token => true,
            Self::Integer => {
                let digits = t.strip_prefix(['+', '-']).unwrap_or(t);
                !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
            }
            Self::Decimal => {
                let body = t.strip_prefix(['+', '-']).unwrap_or(t);
                let (int, frac) = body.split_once('.').unwrap_or((body, ""));
                (!int.is_empty() || !frac.is_empty())
                    && int.bytes().all(|b| b.is_ascii_digit())
                    && frac.bytes().all(|b| b.is_ascii_digit())
            }
            Self::Boolean => matches!(t, "true" | "false" | "1" | "0"),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Token => "token",
            Self::Integer => "integer",
            Self::Decimal => "decimal",
            Self::Boolean => "boolean",
        }
    }
}
