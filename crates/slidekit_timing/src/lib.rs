// SPDX-License-Identifier: MIT OR Apache-2.0
//! Timing tree model for Slidekit.
//!
//! This crate holds the animation document model that the sequencer reads
//! from and writes to:
//! - Time containers (parallel, sequence, iterate)
//! - Animate, audio and command leaves
//! - Typed user data for sequencer bookkeeping
//! - Shape and paragraph targets
//! - "Something changed" notification
//!
//! ## Architecture
//!
//! Nodes live in an arena owned by [`TimingTree`] and refer to each other by
//! [`NodeId`]. Capability checks are a match on [`NodeKind`].

pub mod target;
pub mod value;
pub mod node;
pub mod tree;

pub use target::{ShapeId, ParagraphTarget, Target};
pub use value::AnimValue;
pub use node::{
    NodeId, NodeKind, TimingNode, Timing, TimeValue, TimingEvent, EventSource, EventTrigger,
    Fill, Restart, EndSync, UserData, EffectNodeType, PresetClass, GroupId,
    IterateType, IterateProps, SubItem, AnimateKind, AnimateProps, TransformType,
    AudioProps, CommandProps, Command,
};
pub use tree::{TimingTree, TreeChanged, TreeError};
