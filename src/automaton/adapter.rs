//! Normalized view of a [`TreeAutomaton`].
//!
//! Choice numbering is the compressed representation, so compressor and
//! decompressor must see every state's transitions in the same order. The
//! serialized order carries no meaning; each state's transitions are sorted
//! by (child id presence and value, sibling id, alphabet description).

use std::cmp::Ordering;
use std::fmt::Write as _;
use std::io::Read;

use xxhash_rust::xxh64::xxh64;

use super::{Alphabet, NameClass, TreeAutomaton, UNKNOWN_NAME};
use crate::qname::QName;
use crate::{Error, FastIndexSet, Result};

/// Index of an automaton state.
pub type StateId = u32;

/// A transition after normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub alphabet: Alphabet,
    pub child: Option<StateId>,
    pub sibling: StateId,
}

#[derive(Debug, Clone)]
struct State {
    is_final: bool,
    transitions: Vec<Transition>,
}

/// Read-only automaton with stable transition order.
#[derive(Debug, Clone)]
pub struct Automaton {
    initial: StateId,
    /// Name table; the index is the name code.
    names: FastIndexSet<QName>,
    states: Vec<State>,
    checksum: u64,
}

impl Automaton {
    /// Validates and normalizes `tree`.
    pub fn new(tree: TreeAutomaton) -> Result<Self> {
        let state_count = tree.states.len();
        if state_count == 0 {
            return Err(Error::invalid_automaton("automaton has no states"));
        }
        if state_count > UNKNOWN_NAME as usize || tree.names.len() >= UNKNOWN_NAME as usize {
            return Err(Error::invalid_automaton("automaton too large"));
        }
        if tree.initial as usize >= state_count {
            return Err(Error::invalid_automaton(format!("initial state #{} does not exist", tree.initial)));
        }

        let mut names = FastIndexSet::with_capacity_and_hasher(tree.names.len(), Default::default());
        for entry in tree.names {
            let q = QName::new(entry.uri, entry.local);
            if names.contains(&q) {
                return Err(Error::invalid_automaton(format!("name {q} listed twice")));
            }
            names.insert(q);
        }

        let mut automaton = Self { initial: tree.initial, names, states: Vec::with_capacity(state_count), checksum: 0 };
        for (id, def) in tree.states.into_iter().enumerate() {
            let mut keyed = Vec::with_capacity(def.transitions.len());
            for t in def.transitions {
                automaton.validate(id, &t.alphabet, t.child, t.sibling, state_count)?;
                let description = automaton.describe(&t.alphabet);
                keyed.push((description, Transition { alphabet: t.alphabet, child: t.child, sibling: t.sibling }));
            }
            keyed.sort_by(|(d1, t1), (d2, t2)| compare_transitions(t1, d1, t2, d2));
            automaton.states.push(State {
                is_final: def.is_final,
                transitions: keyed.into_iter().map(|(_, t)| t).collect(),
            });
        }
        automaton.checksum = xxh64(automaton.canonical_text().as_bytes(), 0);
        log::debug!(
            "automaton: {} states, {} names, checksum {:016x}",
            automaton.states.len(),
            automaton.names.len(),
            automaton.checksum
        );
        Ok(automaton)
    }

    /// Parses the JSON form of a [`TreeAutomaton`].
    pub fn from_json(text: &str) -> Result<Self> {
        let tree: TreeAutomaton =
            serde_json::from_str(text).map_err(|e| Error::invalid_automaton(e.to_string()))?;
        Self::new(tree)
    }

    /// Reads the JSON form from `reader`.
    pub fn from_reader(reader: impl Read) -> Result<Self> {
        let tree: TreeAutomaton =
            serde_json::from_reader(reader).map_err(|e| Error::invalid_automaton(e.to_string()))?;
        Self::new(tree)
    }

    fn validate(
        &self,
        state: usize,
        alphabet: &Alphabet,
        child: Option<StateId>,
        sibling: StateId,
        state_count: usize,
    ) -> Result<()> {
        let target_ok = |s: StateId| (s as usize) < state_count;
        if !target_ok(sibling) || !child.is_none_or(target_ok) {
            return Err(Error::invalid_automaton(format!("state #{state}: transition to a missing state")));
        }
        let code_ok = |c: &u32| (*c as usize) < self.names.len();
        let class_ok = |nc: &NameClass| match nc {
            NameClass::Name(c) => code_ok(c),
            NameClass::AnyExcept(cs) => cs.iter().all(code_ok),
            NameClass::Any | NameClass::NsName(_) => true,
        };
        let ok = match alphabet {
            Alphabet::Element { name } | Alphabet::Attribute { name } => class_ok(name),
            Alphabet::NonExistentAttribute { negative, positive } => {
                negative.iter().all(class_ok) && positive.iter().all(class_ok)
            }
            Alphabet::Data { .. } | Alphabet::Value { .. } => true,
            Alphabet::Interleave => return Err(Error::UnsupportedAlphabet("interleave")),
            Alphabet::List => return Err(Error::UnsupportedAlphabet("list")),
        };
        if ok {
            Ok(())
        } else {
            Err(Error::invalid_automaton(format!("state #{state}: unknown name code")))
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    pub fn initial_state(&self) -> StateId {
        self.initial
    }

    pub fn transition_count(&self, state: StateId) -> usize {
        self.states[state as usize].transitions.len()
    }

    /// Number of alternatives at `state`: its transitions, plus one "stop"
    /// choice if the state is final.
    pub fn choice_count(&self, state: StateId) -> u32 {
        let s = &self.states[state as usize];
        s.transitions.len() as u32 + u32::from(s.is_final)
    }

    pub fn is_final(&self, state: StateId) -> bool {
        self.states[state as usize].is_final
    }

    /// Final without transitions: nothing left but to stop.
    pub fn is_epsilon(&self, state: StateId) -> bool {
        let s = &self.states[state as usize];
        s.is_final && s.transitions.is_empty()
    }

    /// Neither final nor any transitions: a dead end.
    pub fn is_null(&self, state: StateId) -> bool {
        let s = &self.states[state as usize];
        !s.is_final && s.transitions.is_empty()
    }

    pub fn transitions(&self, state: StateId) -> &[Transition] {
        &self.states[state as usize].transitions
    }

    pub fn alphabet(&self, state: StateId, transition: usize) -> &Alphabet {
        &self.states[state as usize].transitions[transition].alphabet
    }

    /// Child of a transition; `None` if absent or a null state.
    pub fn child_of(&self, state: StateId, transition: usize) -> Option<StateId> {
        self.states[state as usize].transitions[transition].child.filter(|&c| !self.is_null(c))
    }

    pub fn sibling_of(&self, state: StateId, transition: usize) -> StateId {
        self.states[state as usize].transitions[transition].sibling
    }

    /// Name code of `name`, or [`UNKNOWN_NAME`].
    pub fn encode_name(&self, name: &QName) -> u32 {
        self.names.get_index_of(name).map_or(UNKNOWN_NAME, |code| code as u32)
    }

    pub fn decode_name(&self, code: u32) -> Option<&QName> {
        self.names.get_index(code as usize)
    }

    /// Hash of the normalized automaton, stored in compressed files.
    pub fn checksum(&self) -> u64 {
        self.checksum
    }

    // ========================================================================
    // Descriptions
    // ========================================================================

    /// Structural description, used for ordering and in messages.
    pub fn describe(&self, alphabet: &Alphabet) -> String {
        match alphabet {
            Alphabet::Element { name } => format!("<{}>", self.describe_class(name)),
            Alphabet::Attribute { name } => format!("@{}", self.describe_class(name)),
            Alphabet::NonExistentAttribute { negative, positive } => {
                let mut s = format!("!@{}", self.describe_classes(negative));
                if !positive.is_empty() {
                    let _ = write!(s, "-({})", self.describe_classes(positive));
                }
                s
            }
            Alphabet::Data { .. } => "{{DATA}}".to_string(),
            Alphabet::Value { value } => format!("\"{value}\""),
            Alphabet::Interleave => "{{INTERLEAVE}}".to_string(),
            Alphabet::List => "{{LIST}}".to_string(),
        }
    }

    fn describe_classes(&self, classes: &[NameClass]) -> String {
        classes.iter().map(|nc| self.describe_class(nc)).collect::<Vec<_>>().join("|")
    }

    fn describe_class(&self, class: &NameClass) -> String {
        match class {
            NameClass::Name(code) => self.describe_code(*code),
            NameClass::Any => "*".to_string(),
            NameClass::AnyExcept(codes) => {
                let names: Vec<String> = codes.iter().map(|&c| self.describe_code(c)).collect();
                format!("*-({})", names.join("|"))
            }
            NameClass::NsName(uri) => format!("{uri}:*"),
        }
    }

    fn describe_code(&self, code: u32) -> String {
        self.decode_name(code).map_or_else(|| format!("#{code}"), |q| q.to_string())
    }

    /// Text hashed by [`checksum`](Self::checksum).
    fn canonical_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}\n{}", self.states.len(), self.initial);
        for (id, state) in self.states.iter().enumerate() {
            let id = id as StateId;
            let flags = u8::from(self.is_epsilon(id)) | u8::from(state.is_final) << 1 | u8::from(self.is_null(id)) << 2;
            let _ = writeln!(out, "{}\n{flags}", state.transitions.len());
            for t in &state.transitions {
                let child = t.child.map_or(-1, i64::from);
                let _ = writeln!(out, "{child}\n{}\n{}", t.sibling, self.describe(&t.alphabet));
            }
        }
        out
    }
}

/// Order: childless before with child, then child id, sibling id, description.
fn compare_transitions(t1: &Transition, d1: &str, t2: &Transition, d2: &str) -> Ordering {
    t1.child
        .cmp(&t2.child)
        .then_with(|| t1.sibling.cmp(&t2.sibling))
        .then_with(|| d1.cmp(d2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automaton::{Datatype, NameEntry, StateDef, TransitionDef};

    fn names(locals: &[&str]) -> Vec<NameEntry> {
        locals.iter().map(|l| NameEntry { uri: String::new(), local: l.to_string() }).collect()
    }

    fn tr(alphabet: Alphabet, child: Option<StateId>, sibling: StateId) -> TransitionDef {
        TransitionDef { alphabet, child, sibling }
    }

    fn elem(code: u32) -> Alphabet {
        Alphabet::Element { name: NameClass::Name(code) }
    }

    fn sample(reversed: bool) -> TreeAutomaton {
        let mut transitions = vec![
            tr(elem(0), Some(2), 1),
            tr(elem(1), Some(2), 1),
            tr(Alphabet::Data { datatype: Datatype::String }, None, 1),
            tr(Alphabet::Value { value: "v".into() }, None, 1),
            tr(elem(0), Some(1), 1),
        ];
        if reversed {
            transitions.reverse();
        }
        TreeAutomaton {
            initial: 0,
            names: names(&["a", "b"]),
            states: vec![
                StateDef { is_final: false, transitions },
                StateDef { is_final: true, transitions: vec![] },
                StateDef { is_final: false, transitions: vec![] },
            ],
        }
    }

    #[test]
    fn transition_order_is_independent_of_input_order() {
        let a = Automaton::new(sample(false)).unwrap();
        let b = Automaton::new(sample(true)).unwrap();
        assert_eq!(a.transitions(0), b.transitions(0));
        assert_eq!(a.checksum(), b.checksum());
    }

    #[test]
    fn sort_key() {
        let a = Automaton::new(sample(false)).unwrap();
        let described: Vec<String> = a.transitions(0).iter().map(|t| a.describe(&t.alphabet)).collect();
        // ohne Kind zuerst ("\"v\"" < "{{DATA}}"), dann Kind 1, dann Kind 2 nach Name
        assert_eq!(described, vec!["\"v\"", "{{DATA}}", "<a>", "<a>", "<b>"]);
        assert_eq!(a.transitions(0)[2].child, Some(1));
        assert_eq!(a.transitions(0)[3].child, Some(2));
    }

    #[test]
    fn state_predicates() {
        let a = Automaton::new(sample(false)).unwrap();
        assert_eq!(a.state_count(), 3);
        assert_eq!(a.choice_count(0), 5);
        assert_eq!(a.choice_count(1), 1);
        assert!(a.is_epsilon(1) && a.is_final(1));
        assert!(a.is_null(2) && !a.is_final(2));
        assert!(!a.is_epsilon(0) && !a.is_null(0));
    }

    #[test]
    fn child_of_skips_null_states() {
        let a = Automaton::new(sample(false)).unwrap();
        assert_eq!(a.child_of(0, 2), Some(1));
        assert_eq!(a.child_of(0, 3), None);
        assert_eq!(a.child_of(0, 0), None);
        assert_eq!(a.sibling_of(0, 0), 1);
    }

    #[test]
    fn name_codes() {
        let a = Automaton::new(sample(false)).unwrap();
        assert_eq!(a.encode_name(&QName::local("b")), 1);
        assert_eq!(a.encode_name(&QName::local("zzz")), UNKNOWN_NAME);
        assert_eq!(a.decode_name(0), Some(&QName::local("a")));
        assert_eq!(a.decode_name(7), None);
    }

    #[test]
    fn checksum_depends_on_structure() {
        let a = Automaton::new(sample(false)).unwrap();
        let mut other = sample(false);
        other.states[1].is_final = false;
        let b = Automaton::new(other).unwrap();
        assert_ne!(a.checksum(), b.checksum());
    }

    #[test]
    fn descriptions() {
        let a = Automaton::new(sample(false)).unwrap();
        assert_eq!(a.describe(&Alphabet::Attribute { name: NameClass::Any }), "@*");
        assert_eq!(
            a.describe(&Alphabet::NonExistentAttribute {
                negative: vec![NameClass::AnyExcept(vec![0])],
                positive: vec![NameClass::Name(1)],
            }),
            "!@*-(a)-(b)"
        );
        assert_eq!(a.describe(&Alphabet::Element { name: NameClass::NsName("urn:x".into()) }), "<urn:x:*>");
    }

    #[test]
    fn rejects_interleave_and_list() {
        let mut tree = sample(false);
        tree.states[0].transitions.push(tr(Alphabet::Interleave, None, 1));
        assert_eq!(Automaton::new(tree).unwrap_err(), Error::UnsupportedAlphabet("interleave"));
        let mut tree = sample(false);
        tree.states[0].transitions.push(tr(Alphabet::List, None, 1));
        assert_eq!(Automaton::new(tree).unwrap_err(), Error::UnsupportedAlphabet("list"));
    }

    #[test]
    fn rejects_dangling_references() {
        let mut tree = sample(false);
        tree.states[0].transitions.push(tr(elem(0), None, 9));
        assert!(matches!(Automaton::new(tree), Err(Error::InvalidAutomaton(_))));

        let mut tree = sample(false);
        tree.states[0].transitions.push(tr(elem(5), None, 1));
        assert!(matches!(Automaton::new(tree), Err(Error::InvalidAutomaton(_))));

        let mut tree = sample(false);
        tree.initial = 3;
        assert!(matches!(Automaton::new(tree), Err(Error::InvalidAutomaton(_))));
    }

    #[test]
    fn rejects_duplicate_names() {
        let mut tree = sample(false);
        tree.names = names(&["a", "a"]);
        assert!(matches!(Automaton::new(tree), Err(Error::InvalidAutomaton(_))));
    }

    #[test]
    fn from_json_errors_are_configuration_errors() {
        assert!(matches!(Automaton::from_json("{"), Err(Error::InvalidAutomaton(_))));
        assert!(matches!(Automaton::from_json(r#"{"initial":0,"states":[]}"#), Err(Error::InvalidAutomaton(_))));
    }
}
