// SPDX-License-Identifier: MIT OR Apache-2.0
//! Sequences started by clicking a trigger shape.

use crate::config::SequencerConfig;
use crate::sequence::{RebuildPolicy, SequenceHelper, SequenceKind};
use crate::text::TextSource;
use slidekit_timing::{EventSource, EventTrigger, NodeId, ShapeId, TimingTree};
use std::ops::{Deref, DerefMut};

/// A sequence whose click groups wait for a click on one shape
#[derive(Debug)]
pub struct InteractiveSequence {
    sequence: SequenceHelper,
}

impl InteractiveSequence {
    /// Create an empty interactive sequence on `root`
    pub fn new(root: NodeId, trigger: ShapeId, config: &SequencerConfig) -> Self {
        let mut sequence =
            SequenceHelper::new(SequenceKind::Interactive, Some(root), config).with_policy(RebuildPolicy::Deferred);
        sequence.set_event_source(Some(trigger));
        Self { sequence }
    }

    /// Parse an interactive sequence, reading the trigger from its click groups
    pub fn from_root(tree: &TimingTree, text: &dyn TextSource, root: NodeId, config: &SequencerConfig) -> Self {
        let mut sequence = SequenceHelper::from_root(tree, text, SequenceKind::Interactive, root, config)
            .with_policy(RebuildPolicy::Deferred);

        let trigger = tree
            .children(root)
            .iter()
            .filter_map(|click| tree.node(*click)?.timing.begin?.as_event().copied())
            .find(|event| event.trigger == EventTrigger::OnClick)
            .and_then(|event| match event.source {
                Some(EventSource::Shape(shape)) => Some(shape),
                _ => None,
            });
        if trigger.is_none() {
            tracing::warn!("Interactive sequence {:?} has no trigger shape", root);
        }
        sequence.set_event_source(trigger);
        Self { sequence }
    }

    /// Shape whose click starts the sequence
    pub fn trigger_shape(&self) -> Option<ShapeId> {
        self.sequence.event_source()
    }

    /// Change the trigger shape; takes effect on the next rebuild
    pub fn set_trigger_shape(&mut self, shape: ShapeId) {
        self.sequence.set_event_source(Some(shape));
    }
}

impl Deref for InteractiveSequence {
    type Target = SequenceHelper;

    fn deref(&self) -> &Self::Target {
        &self.sequence
    }
}

impl DerefMut for InteractiveSequence {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.sequence
    }
}
