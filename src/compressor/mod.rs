//! Automaton-driven compressor.
//!
//! Document events are matched against the tree automaton. Each match that
//! is a real choice writes the transition index to the bit channel; text,
//! attribute values and wildcard names go to the data channel. When an
//! event matches several transitions, the compressor forks and carries
//! every interpretation forward in lock-step until only one survives; the
//! survivor's buffered output is then committed.
//!
//! # Example
//!
//! ```
//! use rngzip::automaton::{AutomatonBuilder, Datatype};
//! use rngzip::compressor::Compressor;
//! use rngzip::config::TraceConfig;
//! use rngzip::event::Event;
//! use rngzip::qname::QName;
//! use rngzip::rnz::{Record, RecordingOutput};
//! use rngzip::settings::Settings;
//!
//! // element doc { text }
//! let mut b = AutomatonBuilder::new();
//! let start = b.state(false);
//! let content = b.state(true);
//! let end = b.state(true);
//! b.element(start, "doc", Some(content), end);
//! b.data(content, Datatype::String, content);
//! let automaton = b.build().unwrap();
//!
//! let output = RecordingOutput::new(Settings::default());
//! let mut c = Compressor::new(&automaton, output, TraceConfig::default()).unwrap();
//! for event in [
//!     Event::StartDocument,
//!     Event::start(QName::local("doc")),
//!     Event::characters("hello"),
//!     Event::EndElement,
//!     Event::EndDocument,
//! ] {
//!     c.handle(&event).unwrap();
//! }
//! let records = c.finish().unwrap().into_records();
//! assert_eq!(records[1], Record::Content("hello".into()));
//! ```

mod branch;
mod tentative;

use std::rc::Rc;

use branch::Branch;
use tentative::Playback;

use crate::automaton::{Automaton, StateId};
use crate::choice::ChoiceCoder;
use crate::config::TraceConfig;
use crate::event::{AtContent, Event};
use crate::qname::QName;
use crate::rnz::{RnzOutput, element_context};
use crate::{Error, Result};

// ============================================================================
// Sink
// ============================================================================

/// Committed writes: one coder per choice point, all feeding one output.
struct Sink<O: RnzOutput> {
    output: O,
    coders: Vec<Option<ChoiceCoder>>,
}

impl<O: RnzOutput> Playback for Sink<O> {
    fn play_choice(&mut self, state: StateId, choice: u32) -> Result<()> {
        let Some(coder) = self.coders.get_mut(state as usize).and_then(Option::as_mut) else {
            return Err(Error::invalid_automaton(format!("state #{state} is not a choice point")));
        };
        self.output.write_choice(coder, choice)
    }

    fn play_content(&mut self, context: Option<&str>, content: &str) -> Result<()> {
        self.output.write_content(context, content)
    }
}

// ============================================================================
// Compressor
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Prolog,
    Body,
    Done,
}

#[derive(Clone, Copy)]
enum Step<'e> {
    Start(&'e Rc<QName>, usize),
    Attributes(&'e [AtContent]),
    Characters(&'e Rc<str>, Option<&'e Rc<str>>),
    End,
}

/// Compresses one document into an [`RnzOutput`].
pub struct Compressor<'a, O: RnzOutput> {
    automaton: &'a Automaton,
    sink: Sink<O>,
    branches: Vec<Branch>,
    /// Start tag whose attributes are still being collected.
    pending: Option<(Rc<QName>, Vec<AtContent>)>,
    /// Data contexts of the open elements, innermost last. Every branch
    /// sees the same nesting, so one stack serves all of them.
    elements: Vec<Rc<str>>,
    phase: Phase,
    trace_forks: bool,
    forks: u64,
}

impl<'a, O: RnzOutput> Compressor<'a, O> {
    /// Prepares one choice coder per choice point of `automaton`.
    pub fn new(automaton: &'a Automaton, output: O, trace: TraceConfig) -> Result<Self> {
        let mut coders = Vec::with_capacity(automaton.state_count());
        for state in 0..automaton.state_count() {
            let limit = automaton.choice_count(state as StateId);
            coders.push(if limit > 1 { Some(output.make_coder(limit, state)?) } else { None });
        }
        log::debug!(
            "compressor: {} states, {} choice points",
            automaton.state_count(),
            coders.iter().filter(|c| c.is_some()).count()
        );
        Ok(Self {
            automaton,
            sink: Sink { output, coders },
            branches: vec![Branch::new(automaton.initial_state())],
            pending: None,
            elements: Vec::new(),
            phase: Phase::Prolog,
            trace_forks: trace.forks,
            forks: 0,
        })
    }

    /// Feeds one event.
    ///
    /// `Attribute` events must directly follow their `StartElement`; the
    /// start tag is matched once the first non-attribute event arrives.
    pub fn handle(&mut self, event: &Event) -> Result<()> {
        match event {
            Event::StartDocument => {
                if self.phase != Phase::Prolog {
                    return Err(Error::XmlParseError("unexpected start of document".into()));
                }
                self.phase = Phase::Body;
                Ok(())
            }
            Event::StartElement(name) => {
                self.in_body()?;
                self.flush_start_tag()?;
                self.pending = Some((Rc::clone(name), Vec::new()));
                Ok(())
            }
            Event::Attribute(at) => {
                self.in_body()?;
                match &mut self.pending {
                    Some((_, attrs)) => {
                        attrs.push(at.clone());
                        Ok(())
                    }
                    None => Err(Error::XmlParseError(format!("attribute @{} outside of a start tag", at.qname))),
                }
            }
            Event::Characters(ch) => {
                self.in_body()?;
                self.flush_start_tag()?;
                if ch.value.is_empty() {
                    return Ok(());
                }
                let context = self.elements.last().cloned();
                self.advance(Step::Characters(&ch.value, context.as_ref()))
            }
            Event::EndElement => {
                self.in_body()?;
                self.flush_start_tag()?;
                self.advance(Step::End)?;
                self.elements.pop();
                Ok(())
            }
            Event::EndDocument => {
                self.in_body()?;
                self.flush_start_tag()?;
                self.advance(Step::End)?;
                self.end_document()
            }
        }
    }

    /// Returns the output after a complete document.
    pub fn finish(self) -> Result<O> {
        if self.phase != Phase::Done {
            return Err(Error::IncompleteElement("end of document".into()));
        }
        if self.forks > 0 {
            log::debug!("compressor: {} ambiguous steps", self.forks);
        }
        Ok(self.sink.output)
    }

    /// Read access to the output, e.g. for inspecting a recording.
    pub fn output(&self) -> &O {
        &self.sink.output
    }

    fn in_body(&self) -> Result<()> {
        match self.phase {
            Phase::Body => Ok(()),
            Phase::Prolog => Err(Error::XmlParseError("event before start of document".into())),
            Phase::Done => Err(Error::XmlParseError("event after end of document".into())),
        }
    }

    fn flush_start_tag(&mut self) -> Result<()> {
        let Some((name, attrs)) = self.pending.take() else {
            return Ok(());
        };
        self.advance(Step::Start(&name, attrs.len()))?;
        self.elements.push(element_context(&name).into());
        while self.branches.iter().any(Branch::in_attributes) {
            self.advance(Step::Attributes(&attrs))?;
        }
        Ok(())
    }

    /// Applies `step` to every live branch. Branches rejecting the step die;
    /// a lone speculative survivor is committed.
    fn advance(&mut self, step: Step<'_>) -> Result<()> {
        let a = self.automaton;
        let before = self.branches.len();
        let mut survivors = Vec::with_capacity(before);
        let mut rejection = None;
        for branch in std::mem::take(&mut self.branches) {
            let sink = &mut self.sink;
            let result = match step {
                Step::Start(name, count) => branch.start_element(a, sink, name, count),
                Step::Attributes(attrs) => branch.attribute_step(a, sink, attrs),
                Step::Characters(text, context) => branch.characters(a, sink, text, context),
                Step::End => branch.end(a, sink),
            };
            match result {
                Ok(next) => {
                    if next.len() > 1 {
                        self.forks += 1;
                        if self.trace_forks {
                            log::trace!("fork into {} branches", next.len());
                        }
                    }
                    survivors.extend(next);
                }
                Err(e) if e.is_rejection() => {
                    if self.trace_forks {
                        log::trace!("branch dropped: {e}");
                    }
                    rejection = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        if survivors.is_empty() {
            return Err(rejection.unwrap_or_else(|| Error::rejected("event", "")));
        }
        if let [only] = survivors.as_mut_slice()
            && only.out.is_tentative()
        {
            let played = only.out.commit(&mut self.sink)?;
            if self.trace_forks {
                log::trace!("commit: {before} -> 1 branch, {played} writes");
            }
        }
        self.branches = survivors;
        Ok(())
    }

    /// Picks the cheapest of the remaining interpretations.
    fn end_document(&mut self) -> Result<()> {
        if self.branches.iter().any(|b| !b.is_done()) {
            return Err(Error::IncompleteElement("end of document".into()));
        }
        if self.branches.len() > 1 {
            let best = self
                .branches
                .iter()
                .enumerate()
                .min_by_key(|(_, b)| b.out.magnitude())
                .map_or(0, |(i, _)| i);
            let mut chosen = self.branches.swap_remove(best);
            if self.trace_forks {
                log::trace!(
                    "end of document with {} interpretations, keeping magnitude {}",
                    self.branches.len() + 1,
                    chosen.out.magnitude()
                );
            }
            chosen.out.commit(&mut self.sink)?;
            self.branches = vec![chosen];
        }
        self.phase = Phase::Done;
        Ok(())
    }
}
