//! Speculative output of a grammar branch.
//!
//! While several branches are alive, nothing may reach the real output:
//! each branch records its writes in a persistent linked log. Forking shares
//! the log prefix; committing replays the surviving branch's log once, in
//! write order, and drops the branch back to direct writes.

use std::cell::Cell;
use std::rc::Rc;

use crate::Result;
use crate::automaton::StateId;

/// Where committed writes go.
pub(super) trait Playback {
    fn play_choice(&mut self, state: StateId, choice: u32) -> Result<()>;
    fn play_content(&mut self, context: Option<&str>, content: &str) -> Result<()>;
}

#[derive(Debug)]
enum Entry {
    /// Fork point; carries no output.
    Sentinel,
    Choice { state: StateId, choice: u32 },
    Content { context: Option<Rc<str>>, content: Rc<str> },
}

#[derive(Debug)]
struct LogNode {
    prev: Option<Rc<LogNode>>,
    entry: Entry,
    /// Total cost up to and including this entry.
    magnitude: u64,
    committed: Cell<bool>,
}

/// Output handle of one branch.
///
/// Without history the branch is the only one alive and writes go straight
/// to the sink.
#[derive(Debug, Default)]
pub(super) struct TentativeOutput {
    history: Option<Rc<LogNode>>,
}

impl TentativeOutput {
    pub(super) fn is_tentative(&self) -> bool {
        self.history.is_some()
    }

    /// Estimated size of everything not yet committed: one per choice, one
    /// per content character.
    pub(super) fn magnitude(&self) -> u64 {
        self.history.as_ref().map_or(0, |n| n.magnitude)
    }

    /// Second handle sharing this log. Both handles become tentative.
    pub(super) fn fork(&mut self) -> Self {
        if self.history.is_none() {
            self.push(Entry::Sentinel, 0);
        }
        Self { history: self.history.clone() }
    }

    pub(super) fn write_choice(&mut self, sink: &mut impl Playback, state: StateId, choice: u32) -> Result<()> {
        if self.is_tentative() {
            self.push(Entry::Choice { state, choice }, 1);
            Ok(())
        } else {
            sink.play_choice(state, choice)
        }
    }

    pub(super) fn write_content(
        &mut self,
        sink: &mut impl Playback,
        context: Option<Rc<str>>,
        content: Rc<str>,
    ) -> Result<()> {
        if self.is_tentative() {
            let cost = content.chars().count() as u64;
            self.push(Entry::Content { context, content }, cost);
            Ok(())
        } else {
            sink.play_content(context.as_deref(), &content)
        }
    }

    /// Replays the uncommitted part of the log into `sink` and switches to
    /// direct writes. Returns the number of replayed entries.
    pub(super) fn commit(&mut self, sink: &mut impl Playback) -> Result<usize> {
        let Some(tail) = self.history.take() else {
            return Ok(0);
        };
        // Rückwärts bis zum ersten bereits geschriebenen Eintrag sammeln.
        let mut pending: Vec<&Rc<LogNode>> = Vec::new();
        let mut cursor = Some(&tail);
        while let Some(node) = cursor {
            if node.committed.get() {
                break;
            }
            pending.push(node);
            cursor = node.prev.as_ref();
        }
        let mut played = 0;
        for node in pending.into_iter().rev() {
            match &node.entry {
                Entry::Sentinel => {}
                Entry::Choice { state, choice } => {
                    sink.play_choice(*state, *choice)?;
                    played += 1;
                }
                Entry::Content { context, content } => {
                    sink.play_content(context.as_deref(), content)?;
                    played += 1;
                }
            }
            node.committed.set(true);
        }
        Ok(played)
    }

    fn push(&mut self, entry: Entry, cost: u64) {
        let prev = self.history.take();
        let magnitude = prev.as_ref().map_or(0, |n| n.magnitude) + cost;
        self.history = Some(Rc::new(LogNode { prev, entry, magnitude, committed: Cell::new(false) }));
    }
}
