use super::{Alphabet, Datatype, NameClass, NameEntry, StateDef, TransitionDef, TreeAutomaton};
use crate::automaton::{Automaton, StateId};
use crate::qname::QName;
use crate::{FastHashMap, Result};

/// Builds a [`TreeAutomaton`] in code.
///
/// ```
/// use rngzip::automaton::{AutomatonBuilder, Datatype};
///
/// // element doc { text }
/// let mut b = AutomatonBuilder::new();
/// let start = b.state(false);
/// let content = b.state(true);
/// let end = b.state(true);
/// b.element(start, "doc", Some(content), end);
/// b.data(content, Datatype::String, content);
/// let automaton = b.build().unwrap();
/// assert_eq!(automaton.choice_count(content), 2);
/// ```
#[derive(Debug, Default)]
pub struct AutomatonBuilder {
    initial: StateId,
    names: Vec<NameEntry>,
    codes: FastHashMap<QName, u32>,
    states: Vec<StateDef>,
}

impl AutomatonBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a state. The first state added is the initial state unless
    /// [`initial`](Self::initial) says otherwise.
    pub fn state(&mut self, is_final: bool) -> StateId {
        self.states.push(StateDef { is_final, transitions: Vec::new() });
        (self.states.len() - 1) as StateId
    }

    pub fn initial(&mut self, state: StateId) -> &mut Self {
        self.initial = state;
        self
    }

    /// Name code for `name`, adding it to the name table on first use.
    pub fn name(&mut self, name: QName) -> u32 {
        if let Some(&code) = self.codes.get(&name) {
            return code;
        }
        let code = self.names.len() as u32;
        self.names.push(NameEntry { uri: name.uri.to_string(), local: name.local_name.to_string() });
        self.codes.insert(name, code);
        code
    }

    /// Adds a transition with an arbitrary alphabet.
    pub fn transition(&mut self, from: StateId, alphabet: Alphabet, child: Option<StateId>, sibling: StateId) -> &mut Self {
        if let Some(state) = self.states.get_mut(from as usize) {
            state.transitions.push(TransitionDef { alphabet, child, sibling });
        }
        self
    }

    /// Element without namespace.
    pub fn element(&mut self, from: StateId, local: &str, child: Option<StateId>, sibling: StateId) -> &mut Self {
        let code = self.name(QName::local(local));
        self.transition(from, Alphabet::Element { name: NameClass::Name(code) }, child, sibling)
    }

    /// Attribute without namespace; `value` is the attribute value state.
    pub fn attribute(&mut self, from: StateId, local: &str, value: StateId, sibling: StateId) -> &mut Self {
        let code = self.name(QName::local(local));
        self.transition(from, Alphabet::Attribute { name: NameClass::Name(code) }, Some(value), sibling)
    }

    /// "Attribute `local` is absent" test.
    pub fn absent_attribute(&mut self, from: StateId, local: &str, sibling: StateId) -> &mut Self {
        let code = self.name(QName::local(local));
        let alphabet = Alphabet::NonExistentAttribute { negative: vec![NameClass::Name(code)], positive: Vec::new() };
        self.transition(from, alphabet, None, sibling)
    }

    pub fn data(&mut self, from: StateId, datatype: Datatype, sibling: StateId) -> &mut Self {
        self.transition(from, Alphabet::Data { datatype }, None, sibling)
    }

    pub fn value(&mut self, from: StateId, value: &str, sibling: StateId) -> &mut Self {
        self.transition(from, Alphabet::Value { value: value.to_string() }, None, sibling)
    }

    /// The serializable model.
    pub fn into_tree(self) -> TreeAutomaton {
        TreeAutomaton { initial: self.initial, names: self.names, states: self.states }
    }

    /// Validates and normalizes the automaton.
    pub fn build(self) -> Result<Automaton> {
        Automaton::new(self.into_tree())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_interned() {
        let mut b = AutomatonBuilder::new();
        let a1 = b.name(QName::local("a"));
        let x = b.name(QName::new("urn:x", "a"));
        let a2 = b.name(QName::local("a"));
        assert_eq!(a1, a2);
        assert_ne!(a1, x);
        assert_eq!(b.into_tree().names.len(), 2);
    }

    #[test]
    fn builds_optional_attribute_model() {
        // element e { attribute a {text}?, text }
        let mut b = AutomatonBuilder::new();
        let s0 = b.state(false);
        let s1 = b.state(false);
        let s2 = b.state(true);
        let end = b.state(true);
        let value = b.state(false);
        let value_end = b.state(true);
        b.element(s0, "e", Some(s1), end);
        b.attribute(s1, "a", value, s2);
        b.absent_attribute(s1, "a", s2);
        b.data(value, Datatype::String, value_end);
        b.data(s2, Datatype::String, s2);
        let a = b.build().unwrap();
        assert_eq!(a.initial_state(), s0);
        assert_eq!(a.choice_count(s1), 2);
        // ohne Kind zuerst
        assert!(matches!(a.alphabet(s1, 0), Alphabet::NonExistentAttribute { .. }));
        assert!(matches!(a.alphabet(s1, 1), Alphabet::Attribute { .. }));
    }

    #[test]
    fn initial_state_override() {
        let mut b = AutomatonBuilder::new();
        let _unused = b.state(true);
        let s = b.state(true);
        b.initial(s);
        assert_eq!(b.build().unwrap().initial_state(), s);
    }
}
