//! One speculative interpretation of the document so far.
//!
//! A branch owns a persistent frame stack (shared with its forks) and a
//! [`TentativeOutput`]. Every step consumes the branch and yields zero or
//! more successors: zero is reported as a rejection error, more than one
//! means the step was ambiguous and the branch forked.

use std::rc::Rc;

use super::tentative::{Playback, TentativeOutput};
use crate::automaton::{Alphabet, Automaton, NameClass, StateId};
use crate::event::AtContent;
use crate::qname::QName;
use crate::rnz::attribute_context;
use crate::{Error, Result};

/// Attribute whose value a frame is currently matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AttrCursor {
    /// Index in the element's attribute list.
    index: usize,
    /// Value already consumed by a data or value transition.
    done: bool,
}

#[derive(Debug)]
struct Frame {
    state: StateId,
    attr: Option<AttrCursor>,
    next: Option<Rc<Frame>>,
}

/// A transition chosen at the top frame, plus what goes with it.
#[derive(Debug)]
struct Match {
    /// Transition index; equal to the transition count for "stop".
    transition: usize,
    /// Attribute consumed by an attribute transition.
    attribute: Option<usize>,
    /// Name written for wildcard name classes.
    name: Option<Rc<QName>>,
    /// Text written to the data channel.
    content: Option<Rc<str>>,
    /// Data context of `content`.
    context: Option<Rc<str>>,
}

impl Match {
    fn plain(transition: usize) -> Self {
        Self { transition, attribute: None, name: None, content: None, context: None }
    }
}

#[derive(Debug)]
pub(super) struct Branch {
    stack: Option<Rc<Frame>>,
    /// Per attribute of the current start tag: accounted for by a transition.
    consumed: Vec<bool>,
    in_attributes: bool,
    /// Attribute steps without progress; bounds epsilon cycles.
    idle_steps: usize,
    pub(super) out: TentativeOutput,
}

impl Branch {
    /// Branch positioned at the automaton's initial state.
    pub(super) fn new(initial: StateId) -> Self {
        Self {
            stack: Some(Rc::new(Frame { state: initial, attr: None, next: None })),
            consumed: Vec::new(),
            in_attributes: false,
            idle_steps: 0,
            out: TentativeOutput::default(),
        }
    }

    pub(super) fn in_attributes(&self) -> bool {
        self.in_attributes
    }

    pub(super) fn is_done(&self) -> bool {
        self.stack.is_none()
    }

    fn fork(&mut self) -> Self {
        Self {
            stack: self.stack.clone(),
            consumed: self.consumed.clone(),
            in_attributes: self.in_attributes,
            idle_steps: self.idle_steps,
            out: self.out.fork(),
        }
    }

    // ========================================================================
    // Steps
    // ========================================================================

    /// Start tag of `name`; enters the attribute phase for `attr_count`
    /// attributes.
    pub(super) fn start_element(
        self,
        a: &Automaton,
        sink: &mut impl Playback,
        name: &Rc<QName>,
        attr_count: usize,
    ) -> Result<Vec<Self>> {
        let Some(frame) = self.stack.clone() else {
            return Err(Error::rejected(format!("<{name}>"), ""));
        };
        let code = a.encode_name(name);
        let mut matches = Vec::new();
        for (t, transition) in a.transitions(frame.state).iter().enumerate() {
            if let Alphabet::Element { name: class } = &transition.alphabet
                && class.accepts(code, name)
                && a.child_of(frame.state, t).is_some()
            {
                let mut m = Match::plain(t);
                if !class.is_specific() {
                    m.name = Some(Rc::clone(name));
                }
                matches.push(m);
            }
        }
        if matches.is_empty() {
            return Err(Error::rejected(format!("<{name}>"), expected(a, frame.state)));
        }
        let mut next = self.exec(a, sink, &frame, matches)?;
        for b in &mut next {
            b.consumed = vec![false; attr_count];
            b.in_attributes = true;
            b.idle_steps = 0;
        }
        Ok(next)
    }

    /// One transition of the attribute phase.
    ///
    /// Branches whose attribute phase has ended pass through unchanged.
    pub(super) fn attribute_step(self, a: &Automaton, sink: &mut impl Playback, attrs: &[AtContent]) -> Result<Vec<Self>> {
        if !self.in_attributes {
            return Ok(vec![self]);
        }
        let Some(frame) = self.stack.clone() else {
            return Err(Error::invalid_automaton("attribute phase without element"));
        };
        // Epsilon-Zyklus: nur dieser Zweig stirbt, andere Lesarten bleiben.
        if self.idle_steps > a.state_count() {
            return Err(Error::rejected(format!("attribute loop at #{}", frame.state), ""));
        }
        match frame.attr {
            Some(cursor) => self.attribute_value_step(a, sink, &frame, cursor, attrs),
            None => self.attribute_name_step(a, sink, &frame, attrs),
        }
    }

    /// Matches the value of the attribute under `cursor` inside its value
    /// state.
    fn attribute_value_step(
        self,
        a: &Automaton,
        sink: &mut impl Playback,
        frame: &Rc<Frame>,
        cursor: AttrCursor,
        attrs: &[AtContent],
    ) -> Result<Vec<Self>> {
        let state = frame.state;
        let Some(attr) = attrs.get(cursor.index) else {
            return Err(Error::invalid_automaton("attribute cursor out of range"));
        };
        let count = a.transition_count(state);
        let mut matches = Vec::new();
        if a.is_final(state) && (cursor.done || attr.value.is_empty()) {
            matches.push(Match::plain(count));
        } else if !cursor.done {
            matches = text_matches(a, state, &attr.value);
            if matches.iter().any(|m| m.content.is_some()) {
                let context: Rc<str> = attribute_context(&attr.qname).into();
                for m in &mut matches {
                    m.context = Some(Rc::clone(&context));
                }
            }
        }
        if matches.is_empty() {
            return Err(if cursor.done {
                Error::IncompleteElement(format!("@{}: {}", attr.qname, expected(a, state)).into())
            } else {
                Error::rejected(format!("@{}=\"{}\"", attr.qname, attr.value), expected(a, state))
            });
        }
        self.exec(a, sink, frame, matches)
    }

    /// Attribute and non-existent-attribute transitions of an element
    /// content state. Ends the phase when none applies.
    fn attribute_name_step(
        mut self,
        a: &Automaton,
        sink: &mut impl Playback,
        frame: &Rc<Frame>,
        attrs: &[AtContent],
    ) -> Result<Vec<Self>> {
        let state = frame.state;
        let accepts = |class: &NameClass, at: &AtContent| class.accepts(a.encode_name(&at.qname), &at.qname);
        let mut matches = Vec::new();
        for (t, transition) in a.transitions(state).iter().enumerate() {
            match &transition.alphabet {
                Alphabet::Attribute { name: class } => {
                    if a.child_of(state, t).is_none() {
                        continue;
                    }
                    let found = attrs
                        .iter()
                        .enumerate()
                        .find(|(i, at)| self.consumed.get(*i) == Some(&false) && accepts(class, at));
                    if let Some((i, at)) = found {
                        let mut m = Match::plain(t);
                        m.attribute = Some(i);
                        if !class.is_specific() {
                            m.name = Some(Rc::clone(&at.qname));
                        }
                        matches.push(m);
                    }
                }
                Alphabet::NonExistentAttribute { negative, positive } => {
                    let present = attrs.iter().enumerate().any(|(i, at)| {
                        self.consumed.get(i) == Some(&false)
                            && negative.iter().any(|c| accepts(c, at))
                            && !positive.iter().any(|c| accepts(c, at))
                    });
                    if !present {
                        matches.push(Match::plain(t));
                    }
                }
                _ => {}
            }
        }

        if matches.is_empty() {
            if let Some(at) = self.consumed.iter().zip(attrs).find_map(|(c, at)| (!c).then_some(at)) {
                return Err(Error::UnexpectedAttribute(at.qname.to_string().into()));
            }
            self.in_attributes = false;
            return Ok(vec![self]);
        }
        self.exec(a, sink, frame, matches)
    }

    /// Text content of the current element; `context` is that element's
    /// data context, `None` outside the root.
    pub(super) fn characters(
        self,
        a: &Automaton,
        sink: &mut impl Playback,
        text: &Rc<str>,
        context: Option<&Rc<str>>,
    ) -> Result<Vec<Self>> {
        let mut matches = match &self.stack {
            Some(frame) => text_matches(a, frame.state, text),
            None => Vec::new(),
        };
        for m in &mut matches {
            m.context = context.cloned();
        }
        if matches.is_empty() {
            if is_xml_whitespace(text) {
                return Ok(vec![self]);
            }
            return Err(Error::UnexpectedText(abbreviate(text).into()));
        }
        let Some(frame) = self.stack.clone() else {
            return Ok(vec![self]);
        };
        self.exec(a, sink, &frame, matches)
    }

    /// End tag of the current element, or end of document.
    pub(super) fn end(self, a: &Automaton, sink: &mut impl Playback) -> Result<Vec<Self>> {
        let Some(frame) = self.stack.clone() else {
            return Err(Error::rejected("end tag", ""));
        };
        if !a.is_final(frame.state) {
            return Err(Error::IncompleteElement(expected(a, frame.state).into()));
        }
        let stop = Match::plain(a.transition_count(frame.state));
        self.exec(a, sink, &frame, vec![stop])
    }

    // ========================================================================
    // Execution
    // ========================================================================

    /// Pops `frame` and applies every match in its own branch, forking when
    /// there is more than one.
    fn exec(mut self, a: &Automaton, sink: &mut impl Playback, frame: &Rc<Frame>, matches: Vec<Match>) -> Result<Vec<Self>> {
        let state = frame.state;
        let limit = a.choice_count(state);
        let count = a.transition_count(state);
        self.stack = frame.next.clone();

        let mut branches: Vec<Self> = Vec::with_capacity(matches.len());
        for _ in 1..matches.len() {
            let fork = self.fork();
            branches.push(fork);
        }
        branches.push(self);

        for (b, m) in branches.iter_mut().zip(matches) {
            if limit > 1 {
                b.out.write_choice(sink, state, m.transition as u32)?;
            }
            if let Some(name) = &m.name {
                b.out.write_content(sink, None, name.to_clark().into())?;
            }
            if let Some(slot) = m.attribute.and_then(|i| b.consumed.get_mut(i)) {
                *slot = true;
                b.idle_steps = 0;
            } else {
                b.idle_steps += 1;
            }
            if m.transition < count {
                let sibling_attr = frame.attr.map(|c| AttrCursor { index: c.index, done: true });
                b.push(a.sibling_of(state, m.transition), sibling_attr);
                if let Some(child) = a.child_of(state, m.transition) {
                    let child_attr = m.attribute.map(|index| AttrCursor { index, done: false });
                    b.push(child, child_attr);
                }
            }
            if let Some(content) = m.content {
                b.out.write_content(sink, m.context, content)?;
            }
        }
        Ok(branches)
    }

    fn push(&mut self, state: StateId, attr: Option<AttrCursor>) {
        let next = self.stack.take();
        self.stack = Some(Rc::new(Frame { state, attr, next }));
    }
}

/// Data and value transitions of `state` that accept `text`.
fn text_matches(a: &Automaton, state: StateId, text: &Rc<str>) -> Vec<Match> {
    let mut matches = Vec::new();
    for (t, transition) in a.transitions(state).iter().enumerate() {
        match &transition.alphabet {
            Alphabet::Data { datatype } if datatype.accepts(text) => {
                let mut m = Match::plain(t);
                m.content = Some(Rc::clone(text));
                matches.push(m);
            }
            Alphabet::Value { value } if **value == **text => matches.push(Match::plain(t)),
            _ => {}
        }
    }
    matches
}

/// Alternatives at `state`, joined for error messages.
fn expected(a: &Automaton, state: StateId) -> String {
    let mut parts: Vec<String> = a.transitions(state).iter().map(|t| a.describe(&t.alphabet)).collect();
    if a.is_final(state) {
        parts.push("end".to_string());
    }
    parts.join("|")
}

fn is_xml_whitespace(text: &str) -> bool {
    text.bytes().all(|b| matches!(b, b' ' | b'\t' | b'\r' | b'\n'))
}

fn abbreviate(text: &str) -> String {
    const MAX: usize = 40;
    match text.char_indices().nth(MAX) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automaton::{AutomatonBuilder, Datatype};

    #[derive(Debug, Default)]
    struct Collect(Vec<String>);

    impl Playback for Collect {
        fn play_choice(&mut self, state: StateId, choice: u32) -> Result<()> {
            self.0.push(format!("{choice}@{state}"));
            Ok(())
        }

        fn play_content(&mut self, context: Option<&str>, content: &str) -> Result<()> {
            match context {
                Some(cx) => self.0.push(format!("{cx}:{content}")),
                None => self.0.push(content.to_string()),
            }
            Ok(())
        }
    }

    fn one(mut v: Vec<Branch>) -> Branch {
        assert_eq!(v.len(), 1, "expected exactly one successor");
        v.remove(0)
    }

    /// element doc { (element a {empty} | element b {empty})* }
    fn list_automaton() -> Automaton {
        let mut b = AutomatonBuilder::new();
        let s0 = b.state(false);
        let content = b.state(true);
        let empty = b.state(true);
        let end = b.state(true);
        b.element(s0, "doc", Some(content), end);
        b.element(content, "a", Some(empty), content);
        b.element(content, "b", Some(empty), content);
        b.build().unwrap()
    }

    fn run_attributes(mut branch: Branch, a: &Automaton, sink: &mut Collect, attrs: &[AtContent]) -> Result<Branch> {
        while branch.in_attributes() {
            branch = one(branch.attribute_step(a, sink, attrs)?);
        }
        Ok(branch)
    }

    #[test]
    fn element_choices_are_written_directly() {
        let a = list_automaton();
        let mut sink = Collect::default();
        let doc = Rc::new(QName::local("doc"));
        let b_name = Rc::new(QName::local("b"));
        let b = one(Branch::new(a.initial_state()).start_element(&a, &mut sink, &doc, 0).unwrap());
        let b = run_attributes(b, &a, &mut sink, &[]).unwrap();
        let b = one(b.start_element(&a, &mut sink, &b_name, 0).unwrap());
        let b = run_attributes(b, &a, &mut sink, &[]).unwrap();
        let b = one(b.end(&a, &mut sink).unwrap());
        let b = one(b.end(&a, &mut sink).unwrap());
        let b = one(b.end(&a, &mut sink).unwrap());
        assert!(b.is_done());
        // content: <a> = 0, <b> = 1, stop = 2
        assert_eq!(sink.0, ["1@1", "2@1"]);
    }

    #[test]
    fn unknown_element_is_rejected_with_alternatives() {
        let a = list_automaton();
        let mut sink = Collect::default();
        let doc = Rc::new(QName::local("doc"));
        let b = one(Branch::new(a.initial_state()).start_element(&a, &mut sink, &doc, 0).unwrap());
        let b = run_attributes(b, &a, &mut sink, &[]).unwrap();
        let err = b.start_element(&a, &mut sink, &Rc::new(QName::local("c")), 0).unwrap_err();
        let Error::Rejected { found, expected } = err else {
            panic!("expected rejection");
        };
        assert_eq!(found, "<c>");
        assert!(expected.contains("<a>") && expected.contains("<b>"), "{expected}");
    }

    #[test]
    fn whitespace_is_ignorable_other_text_is_not() {
        let a = list_automaton();
        let mut sink = Collect::default();
        let doc = Rc::new(QName::local("doc"));
        let b = one(Branch::new(a.initial_state()).start_element(&a, &mut sink, &doc, 0).unwrap());
        let b = run_attributes(b, &a, &mut sink, &[]).unwrap();
        let cx: Rc<str> = Rc::from("doc");
        let b = one(b.characters(&a, &mut sink, &Rc::from("\n  "), Some(&cx)).unwrap());
        assert!(sink.0.is_empty());
        let err = b.characters(&a, &mut sink, &Rc::from("text"), Some(&cx)).unwrap_err();
        assert!(matches!(err, Error::UnexpectedText(_)));
    }

    #[test]
    fn missing_required_content_is_incomplete() {
        let mut ab = AutomatonBuilder::new();
        let s0 = ab.state(false);
        let content = ab.state(false);
        let after = ab.state(true);
        let end = ab.state(true);
        ab.element(s0, "doc", Some(content), end);
        ab.data(content, Datatype::Integer, after);
        let a = ab.build().unwrap();

        let mut sink = Collect::default();
        let doc = Rc::new(QName::local("doc"));
        let b = one(Branch::new(a.initial_state()).start_element(&a, &mut sink, &doc, 0).unwrap());
        let b = run_attributes(b, &a, &mut sink, &[]).unwrap();
        assert!(matches!(b.end(&a, &mut sink).unwrap_err(), Error::IncompleteElement(_)));
    }

    #[test]
    fn datatype_filters_text() {
        let mut ab = AutomatonBuilder::new();
        let s0 = ab.state(false);
        let content = ab.state(false);
        let after = ab.state(true);
        let end = ab.state(true);
        ab.element(s0, "n", Some(content), end);
        ab.data(content, Datatype::Integer, after);
        let a = ab.build().unwrap();

        let mut sink = Collect::default();
        let n = Rc::new(QName::local("n"));
        let b = one(Branch::new(a.initial_state()).start_element(&a, &mut sink, &n, 0).unwrap());
        let b = run_attributes(b, &a, &mut sink, &[]).unwrap();
        let cx: Rc<str> = Rc::from("n");
        assert!(matches!(
            b.characters(&a, &mut sink, &Rc::from("x1"), Some(&cx)).unwrap_err(),
            Error::UnexpectedText(_)
        ));

        let b = one(Branch::new(a.initial_state()).start_element(&a, &mut sink, &n, 0).unwrap());
        let b = run_attributes(b, &a, &mut sink, &[]).unwrap();
        let _b = one(b.characters(&a, &mut sink, &Rc::from("42"), Some(&cx)).unwrap());
        assert_eq!(sink.0, ["n:42"]);
    }

    #[test]
    fn undeclared_attribute_is_rejected() {
        let a = list_automaton();
        let mut sink = Collect::default();
        let doc = Rc::new(QName::local("doc"));
        let attrs = [AtContent { qname: Rc::new(QName::local("x")), value: "1".into() }];
        let b = one(Branch::new(a.initial_state()).start_element(&a, &mut sink, &doc, 1).unwrap());
        let err = b.attribute_step(&a, &mut sink, &attrs).unwrap_err();
        assert_eq!(err, Error::UnexpectedAttribute("x".into()));
    }

    #[test]
    fn ambiguous_element_forks() {
        // <a> führt entweder zu Text- oder zu leerem Inhalt
        let mut ab = AutomatonBuilder::new();
        let s0 = ab.state(false);
        let text = ab.state(false);
        let empty = ab.state(true);
        let after = ab.state(true);
        let end = ab.state(true);
        ab.element(s0, "a", Some(text), end);
        ab.element(s0, "a", Some(empty), end);
        ab.data(text, Datatype::String, after);
        let a = ab.build().unwrap();

        let mut sink = Collect::default();
        let name = Rc::new(QName::local("a"));
        let next = Branch::new(a.initial_state()).start_element(&a, &mut sink, &name, 0).unwrap();
        assert_eq!(next.len(), 2);
        assert!(next.iter().all(|b| b.out.is_tentative()));
        assert!(sink.0.is_empty());
    }

    #[test]
    fn attribute_values_carry_attribute_context() {
        let mut ab = AutomatonBuilder::new();
        let s0 = ab.state(false);
        let content = ab.state(true);
        let value = ab.state(false);
        let value_end = ab.state(true);
        let end = ab.state(true);
        ab.element(s0, "e", Some(content), end);
        ab.transition(content, Alphabet::Attribute { name: NameClass::Any }, Some(value), content);
        ab.data(value, Datatype::String, value_end);
        let a = ab.build().unwrap();

        let mut sink = Collect::default();
        let e = Rc::new(QName::local("e"));
        let attrs = [AtContent { qname: Rc::new(QName::new("urn:x", "id")), value: "7".into() }];
        let b = one(Branch::new(a.initial_state()).start_element(&a, &mut sink, &e, 1).unwrap());
        let _b = run_attributes(b, &a, &mut sink, &attrs).unwrap();
        // Wildcard-Name ohne Kontext, Wert mit @-Kontext
        assert_eq!(sink.0, ["0@1", "{urn:x}id", "@{urn:x}id:7"]);
    }

    #[test]
    fn attribute_loop_rejects_only_its_branch() {
        // leeres Attribut-Verbot, das immer wieder auf sich selbst zeigt
        let mut ab = AutomatonBuilder::new();
        let s0 = ab.state(false);
        let looped = ab.state(true);
        let end = ab.state(true);
        ab.element(s0, "r", Some(looped), end);
        ab.absent_attribute(looped, "a", looped);
        let a = ab.build().unwrap();

        let mut sink = Collect::default();
        let r = Rc::new(QName::local("r"));
        let mut b = one(Branch::new(a.initial_state()).start_element(&a, &mut sink, &r, 0).unwrap());
        let err = loop {
            match b.attribute_step(&a, &mut sink, &[]) {
                Ok(next) => b = one(next),
                Err(e) => break e,
            }
        };
        assert!(err.is_rejection(), "{err:?}");
        assert!(err.to_string().contains("attribute loop at #1"), "{err}");
    }

    #[test]
    fn abbreviate_long_text() {
        assert_eq!(abbreviate("short"), "short");
        let long = "x".repeat(50);
        assert_eq!(abbreviate(&long), format!("{}...", "x".repeat(40)));
    }
}
