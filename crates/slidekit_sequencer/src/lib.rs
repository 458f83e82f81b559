// SPDX-License-Identifier: MIT OR Apache-2.0
//! Custom animation sequencer for Slidekit.
//!
//! This crate turns an ordered list of animation effects into a timing tree
//! and back:
//! - Effects wrapping one timing subtree each
//! - Click groups and with groups generated from effect triggers
//! - Hide and dim after-effects
//! - Text groups animating a shape paragraph by paragraph
//! - Interactive sequences started by a trigger shape
//!
//! ## Architecture
//!
//! The sequencer is built on:
//! - [`slidekit_timing::TimingTree`] as the single source of truth for playback
//! - [`SequenceHelper`] for list edits and tree regeneration
//! - [`MainSequence`] for debounced two-way sync with the tree
//! - [`TextSource`] for the text of the slide's shapes

pub mod effect;
pub mod text_group;
pub mod sequence;
pub mod interactive;
pub mod main_sequence;
pub mod preset;
pub mod text;
pub mod listener;
pub mod scheduler;
pub mod config;
pub mod error;

pub use effect::{Effect, EffectId, ValueSlot};
pub use text_group::{TextGroup, DepthFlag, PARA_LEVELS};
pub use sequence::{SequenceHelper, SequenceKind, RebuildPolicy, CUSTOM_MOTION_PATH_PRESET};
pub use interactive::InteractiveSequence;
pub use main_sequence::{MainSequence, SequenceRef, RebuildLock, ChangeGuard};
pub use preset::{EffectPreset, PresetLibrary, AnimationTemplate};
pub use text::{TextSource, NoText, SlideText, Paragraph, count_subitems};
pub use listener::ListenerId;
pub use scheduler::{RebuildScheduler, TimerMode};
pub use config::SequencerConfig;
pub use error::{SequencerError, Result};
