//! Stack map table representation.
//!
//! The class file stores stack map frames as deltas against the previous
//! frame. The builder records those deltas as actions and materializes the
//! final `bci -> frame` mapping once the method's initial locals (derived
//! from its descriptor) are known.

use crate::instruction::{BciMap, BciType};
use crate::types::Type;
use crate::verifier::frame::StackFrame;

/// An ordered mapping from bci to the stack frame declared at that point,
/// including the synthesized entry frame at bci 0.
#[derive(Debug)]
pub struct StackMapTable {
    frames: BciMap<StackFrame>,
}

impl StackMapTable {
    pub fn at(&self, bci: BciType) -> Option<&StackFrame> {
        self.frames.get(bci)
    }

    pub fn iter(&self) -> impl Iterator<Item = (BciType, &StackFrame)> {
        self.frames.iter()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
enum FrameAction {
    /// Same locals as the previous frame, empty stack.
    Same,
    /// Previous locals extended with new ones, empty stack.
    Append(Vec<Type>),
    /// Fully specified locals and stack.
    Full(Vec<Type>, Vec<Type>),
}

/// Builder accepting a monotonically increasing sequence of frame actions.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct StackMapTableBuilder {
    actions: Vec<(BciType, FrameAction)>,
}

impl StackMapTableBuilder {
    pub fn new() -> Self {
        StackMapTableBuilder::default()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Next frame is the same as the previous one.
    pub fn add_same(&mut self, bci: BciType) {
        debug_assert!(self.bci_monotonic(bci));
        self.actions.push((bci, FrameAction::Same));
    }

    /// Next frame appends locals to the previous one.
    pub fn add_append(&mut self, bci: BciType, locals: Vec<Type>) {
        debug_assert!(self.bci_monotonic(bci));
        self.actions.push((bci, FrameAction::Append(locals)));
    }

    /// Next frame is fully constructed from the arguments.
    pub fn add_full(&mut self, bci: BciType, locals: Vec<Type>, stack: Vec<Type>) {
        debug_assert!(self.bci_monotonic(bci));
        self.actions.push((bci, FrameAction::Full(locals, stack)));
    }

    /// Materialize the table by folding the recorded actions against the
    /// frame implied by `initial_locals`. A declared frame at bci 0 takes
    /// precedence over the synthesized entry frame.
    pub fn create_table(&self, initial_locals: &[Type]) -> StackMapTable {
        let mut frames = BciMap::new();
        frames.insert(0, StackFrame::new(initial_locals, &[]));

        let mut locals = initial_locals.to_vec();
        let mut stack: Vec<Type> = Vec::new();

        for (bci, action) in &self.actions {
            match action {
                FrameAction::Same => stack.clear(),
                FrameAction::Append(extra) => {
                    locals.extend_from_slice(extra);
                    stack.clear();
                }
                FrameAction::Full(new_locals, new_stack) => {
                    locals = new_locals.clone();
                    stack = new_stack.clone();
                }
            }

            frames.replace(*bci, StackFrame::new(&locals, &stack));
        }

        StackMapTable { frames }
    }

    fn bci_monotonic(&self, bci: BciType) -> bool {
        match self.actions.last() {
            Some((last, _)) => bci > *last,
            None => true,
        }
    }
}
