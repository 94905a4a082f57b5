//! Qualified names of elements and attributes.
//!
//! Identity is (namespace URI, local name); the prefix is kept only as a
//! serialization hint. The compressed form never carries prefixes.
//!
//! Names matched by a wildcard name class travel on the data channel in
//! Clark notation, `{uri}local` (or just `local` without a namespace).

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use ahash::AHasher;

use crate::{Error, Result};

/// Namespace-qualified name.
///
/// `identity` is a precomputed 64-bit hash of (uri, local_name), so map
/// lookups do not rehash the strings.
#[derive(Clone)]
pub struct QName {
    /// The namespace URI. Empty string means no namespace.
    pub uri: Rc<str>,
    /// The local name.
    pub local_name: Rc<str>,
    /// Prefix seen in the source document, if any.
    pub prefix: Option<Rc<str>>,
    identity: u64,
}

impl fmt::Debug for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QName")
            .field("uri", &self.uri)
            .field("local_name", &self.local_name)
            .field("prefix", &self.prefix)
            .finish()
    }
}

/// Identity hash of (uri, local_name).
fn compute_identity(uri: &str, local_name: &str) -> u64 {
    let mut hasher = AHasher::default();
    uri.hash(&mut hasher);
    local_name.hash(&mut hasher);
    hasher.finish()
}

/// Equality ignores the prefix.
impl PartialEq for QName {
    fn eq(&self, other: &Self) -> bool {
        self.identity == other.identity && self.uri == other.uri && self.local_name == other.local_name
    }
}

impl Eq for QName {}

impl PartialEq<QName> for Rc<QName> {
    fn eq(&self, other: &QName) -> bool {
        **self == *other
    }
}

impl PartialOrd for QName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Ordered by uri, then local_name; the prefix is ignored.
impl Ord for QName {
    fn cmp(&self, other: &Self) -> Ordering {
        self.uri.cmp(&other.uri).then_with(|| self.local_name.cmp(&other.local_name))
    }
}

impl Hash for QName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity.hash(state);
    }
}

/// Display: `uri:local` with a namespace, otherwise just `local`.
impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.uri.is_empty() {
            f.write_str(&self.local_name)
        } else {
            write!(f, "{}:{}", self.uri, self.local_name)
        }
    }
}

impl QName {
    /// Creates a name without prefix.
    pub fn new(uri: impl Into<Rc<str>>, local_name: impl Into<Rc<str>>) -> Self {
        let uri = uri.into();
        let local_name = local_name.into();
        let identity = compute_identity(&uri, &local_name);
        Self { uri, local_name, prefix: None, identity }
    }

    /// Creates a name that remembers its source prefix.
    pub fn with_prefix(uri: impl Into<Rc<str>>, local_name: impl Into<Rc<str>>, prefix: impl Into<Rc<str>>) -> Self {
        let mut q = Self::new(uri, local_name);
        let prefix = prefix.into();
        if !prefix.is_empty() {
            q.prefix = Some(prefix);
        }
        q
    }

    /// Name without namespace.
    pub fn local(local_name: impl Into<Rc<str>>) -> Self {
        Self::new("", local_name)
    }

    /// Clark notation: `{uri}local`, or `local` without namespace.
    pub fn to_clark(&self) -> String {
        if self.uri.is_empty() {
            self.local_name.to_string()
        } else {
            format!("{{{}}}{}", self.uri, self.local_name)
        }
    }

    /// Parses Clark notation as written by [`to_clark`](Self::to_clark).
    pub fn from_clark(s: &str) -> Result<Self> {
        let qname = match s.strip_prefix('{') {
            Some(rest) => {
                let (uri, local) = rest
                    .split_once('}')
                    .ok_or_else(|| Error::MalformedContent(format!("unterminated namespace in name '{s}'").into()))?;
                Self::new(uri, local)
            }
            None => Self::local(s),
        };
        if qname.local_name.is_empty() {
            return Err(Error::MalformedContent(format!("empty local name in '{s}'").into()));
        }
        Ok(qname)
    }
}
