// SPDX-License-Identifier: MIT OR Apache-2.0
//! The main sequence of a slide and its interactive sequences.
//!
//! [`MainSequence`] owns the slide's [`TimingTree`] and keeps it in sync with
//! the effect lists in both directions:
//!
//! - Edits made through the sequence API mark the lists dirty and start the
//!   rebuild timer in [`TimerMode::RebuildTree`].
//! - Edits made directly to the tree (through [`MainSequence::tree_mut`]) are
//!   picked up from its change feed and start the same timer in
//!   [`TimerMode::RecreateList`].
//!
//! The owner drives the timer by calling [`MainSequence::tick`] from its
//! event loop. When the deadline passes, exactly one of the two directions
//! runs.

use crate::config::SequencerConfig;
use crate::effect::{Effect, EffectId};
use crate::error::warn_on_err;
use crate::interactive::InteractiveSequence;
use crate::listener::ListenerId;
use crate::preset::EffectPreset;
use crate::scheduler::{RebuildScheduler, TimerMode};
use crate::sequence::{RebuildPolicy, SequenceHelper, SequenceKind};
use crate::text::TextSource;
use slidekit_timing::{
    EffectNodeType, GroupId, NodeId, NodeKind, Restart, ShapeId, Target, TimingNode, TimingTree, TreeChanged,
};
use std::ops::{Deref, DerefMut};
use std::rc::Rc;
use std::sync::mpsc::Receiver;
use std::time::Instant;

/// Which sequence of a slide an edit goes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SequenceRef {
    /// The main click sequence
    Main,
    /// The interactive sequence triggered by this shape
    Interactive(ShapeId),
}

/// The animation sequences of one slide
pub struct MainSequence {
    tree: TimingTree,
    text: Rc<dyn TextSource>,
    config: SequencerConfig,
    sequence: SequenceHelper,
    interactive: Vec<InteractiveSequence>,
    scheduler: RebuildScheduler,
    changes: Option<Receiver<TreeChanged>>,
    /// Set while the tree is being regenerated
    rebuilding: bool,
    rebuild_lock: u32,
    pending_rebuild: bool,
    /// Nesting depth of [`ChangeGuard`]s
    ignore_changes: u32,
}

impl MainSequence {
    /// Create the sequences of an empty slide
    pub fn new(text: Rc<dyn TextSource>) -> Self {
        Self::from_tree(TimingTree::new(), text, SequencerConfig::default())
    }

    /// Adopt an existing timing tree
    pub fn from_tree(tree: TimingTree, text: Rc<dyn TextSource>, config: SequencerConfig) -> Self {
        let sequence = SequenceHelper::new(SequenceKind::Main, None, &config).with_policy(RebuildPolicy::Deferred);
        let scheduler = RebuildScheduler::new(config.rebuild_delay());
        let mut main = Self {
            tree,
            text,
            config,
            sequence,
            interactive: Vec::new(),
            scheduler,
            changes: None,
            rebuilding: false,
            rebuild_lock: 0,
            pending_rebuild: false,
            ignore_changes: 0,
        };
        main.create_main_sequence();
        main
    }

    /// Drop the current state and adopt another timing tree
    pub fn reset_with_tree(&mut self, tree: TimingTree) {
        self.reset();
        self.tree = tree;
        self.create_main_sequence();
    }

    /// Give up the timing tree, flushing any pending list edits first
    pub fn into_tree(mut self) -> TimingTree {
        self.pump_tree_changes(Instant::now());
        if self.scheduler.mode() == Some(TimerMode::RebuildTree) {
            self.scheduler.stop();
            self.impl_rebuild();
        }
        self.reset();
        std::mem::take(&mut self.tree)
    }

    fn create_main_sequence(&mut self) {
        let timing_root = self.tree.root();
        let mut main_root = None;
        let mut interactive_roots = Vec::new();
        for child in self.tree.children(timing_root) {
            match self.tree.node(*child).and_then(TimingNode::node_type) {
                Some(EffectNodeType::MainSequence) if main_root.is_none() => main_root = Some(*child),
                Some(EffectNodeType::InteractiveSequence) => interactive_roots.push(*child),
                _ => {}
            }
        }

        let root = match main_root {
            Some(root) => root,
            None => {
                tracing::debug!("No main sequence in timing tree, creating one");
                let root = self.tree.create(NodeKind::Seq);
                if let Some(node) = self.tree.node_mut(root) {
                    node.user_data.node_type = Some(EffectNodeType::MainSequence);
                    // An empty sequence would otherwise never end
                    node.timing.duration = Some(0.0);
                }
                if let Err(err) = self.tree.append_child(timing_root, root) {
                    tracing::error!("Failed to attach main sequence: {}", err);
                }
                root
            }
        };

        self.sequence.set_event_source(None);
        self.sequence.create(&self.tree, self.text.as_ref(), root);
        for root in interactive_roots {
            self.interactive
                .push(InteractiveSequence::from_root(&self.tree, self.text.as_ref(), root, &self.config));
        }
        tracing::debug!(
            "Created main sequence with {} effects and {} interactive sequences",
            self.sequence.len(),
            self.interactive.len()
        );

        self.sequence.notify_listeners();
        self.sequence.take_notified();
        self.changes = Some(self.tree.subscribe_changes());
    }

    /// Forget every sequence and stop listening to the tree
    fn reset(&mut self) {
        self.scheduler.stop();
        self.tree.unsubscribe_changes();
        self.changes = None;
        self.sequence.reset();
        for interactive in &mut self.interactive {
            interactive.reset();
        }
        self.interactive.clear();
        self.pending_rebuild = false;
    }

    /// The timing tree
    pub fn tree(&self) -> &TimingTree {
        &self.tree
    }

    /// The timing tree for direct edits.
    ///
    /// Changes made here are treated as external and reparsed when the
    /// rebuild timer fires, unless a [`ChangeGuard`] is held.
    pub fn tree_mut(&mut self) -> &mut TimingTree {
        &mut self.tree
    }

    /// Text of the slide's shapes
    pub fn text(&self) -> &dyn TextSource {
        self.text.as_ref()
    }

    /// Active configuration
    pub fn config(&self) -> &SequencerConfig {
        &self.config
    }

    /// The main click sequence
    pub fn sequence(&self) -> &SequenceHelper {
        &self.sequence
    }

    /// Interactive sequences in creation order
    pub fn interactive_sequences(&self) -> &[InteractiveSequence] {
        &self.interactive
    }

    /// Main sequence followed by every interactive sequence
    pub fn sequences(&self) -> impl Iterator<Item = &SequenceHelper> {
        std::iter::once(&self.sequence).chain(self.interactive.iter().map(Deref::deref))
    }

    /// Register a callback run whenever any sequence changed
    pub fn add_listener(&mut self, callback: Box<dyn FnMut()>) -> ListenerId {
        self.sequence.add_listener(callback)
    }

    /// Unregister a callback
    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        self.sequence.remove_listener(id)
    }

    /// Root of the main sequence, regenerating the tree first if list edits
    /// are pending
    pub fn root_node(&mut self) -> Option<NodeId> {
        if self.rebuild_lock > 0 {
            tracing::warn!("MainSequence::root_node: rebuilds are locked, the tree may be stale");
        }
        self.pump_tree_changes(Instant::now());
        if self.scheduler.mode() == Some(TimerMode::RebuildTree) {
            self.scheduler.stop();
            self.impl_rebuild();
        }
        self.sequence.root()
    }

    /// Sequence holding an effect
    pub fn sequence_of(&self, id: EffectId) -> Option<SequenceRef> {
        if self.sequence.contains(id) {
            return Some(SequenceRef::Main);
        }
        self.interactive
            .iter()
            .find(|s| s.contains(id))
            .and_then(InteractiveSequence::trigger_shape)
            .map(SequenceRef::Interactive)
    }

    /// Run an edit on one sequence.
    ///
    /// The tree changes the edit makes are not mistaken for external ones,
    /// and a rebuild is scheduled if the edit asked for one.
    pub fn edit<R>(
        &mut self,
        which: SequenceRef,
        edit: impl FnOnce(&mut SequenceHelper, &mut TimingTree, &dyn TextSource) -> R,
    ) -> Option<R> {
        let result = {
            let mut guard = ChangeGuard::new(self);
            let main: &mut MainSequence = &mut guard;
            let text = Rc::clone(&main.text);
            let helper = match which {
                SequenceRef::Main => Some(&mut main.sequence),
                SequenceRef::Interactive(shape) => main
                    .interactive
                    .iter_mut()
                    .find(|s| s.trigger_shape() == Some(shape))
                    .map(DerefMut::deref_mut),
            };
            match helper {
                Some(helper) => Some(edit(helper, &mut main.tree, text.as_ref())),
                None => {
                    tracing::warn!("MainSequence::edit: no sequence for {:?}", which);
                    None
                }
            }
        };
        self.after_edit();
        result
    }

    /// Run an edit on every sequence, reporting whether any changed
    fn edit_each(&mut self, mut edit: impl FnMut(&mut SequenceHelper, &mut TimingTree, &dyn TextSource) -> bool) -> bool {
        let changed = {
            let mut guard = ChangeGuard::new(self);
            let main: &mut MainSequence = &mut guard;
            let text = Rc::clone(&main.text);
            let mut changed = edit(&mut main.sequence, &mut main.tree, text.as_ref());
            for interactive in &mut main.interactive {
                changed |= edit(&mut **interactive, &mut main.tree, text.as_ref());
            }
            changed
        };
        self.after_edit();
        changed
    }

    /// Collect rebuild requests and notifications raised by an edit
    fn after_edit(&mut self) {
        let mut rebuild = self.sequence.take_rebuild_request();
        let mut notify = false;
        for interactive in &mut self.interactive {
            rebuild |= interactive.take_rebuild_request();
            notify |= interactive.take_notified();
        }
        if notify {
            self.sequence.notify_listeners();
        }
        self.sequence.take_notified();
        if rebuild {
            self.rebuild();
        }
    }

    /// Create an effect from a preset at the end of the main sequence
    pub fn append_preset(&mut self, preset: &EffectPreset, sub_type: &str, target: Target, duration: Option<f64>) -> Option<EffectId> {
        self.edit(SequenceRef::Main, |sequence, tree, text| {
            sequence.append_preset(tree, text, preset, sub_type, target, duration)
        })
        .flatten()
    }

    /// Create a motion path effect at the end of the main sequence
    pub fn append_motion_path(
        &mut self,
        path: &str,
        target: Target,
        duration: Option<f64>,
        preset_id: Option<&str>,
    ) -> Option<EffectId> {
        self.edit(SequenceRef::Main, |sequence, tree, text| {
            sequence.append_motion_path(tree, text, path, target, duration, preset_id)
        })
        .flatten()
    }

    /// Adopt an existing effect subtree at the end of the main sequence
    pub fn append_node(&mut self, node: NodeId) -> Option<EffectId> {
        self.edit(SequenceRef::Main, |sequence, tree, text| {
            let effect = warn_on_err("MainSequence::append_node", Effect::from_node(tree, node, text))?;
            Some(sequence.append(tree, effect))
        })
        .flatten()
    }

    /// Remove an effect from whichever sequence holds it
    pub fn remove(&mut self, id: EffectId) -> bool {
        let Some(which) = self.sequence_of(id) else {
            tracing::warn!("MainSequence::remove: unknown effect {:?}", id);
            return false;
        };
        self.edit(which, |sequence, tree, _| sequence.remove(tree, id))
            .unwrap_or(false)
    }

    /// Swap an effect's preset, keeping its place and settings
    pub fn replace(&mut self, id: EffectId, preset: &EffectPreset, sub_type: &str, duration: Option<f64>) {
        if let Some(which) = self.sequence_of(id) {
            self.edit(which, |sequence, tree, text| {
                sequence.replace(tree, text, id, preset, sub_type, duration);
            });
        }
    }

    /// Move an effect before another one of the same sequence, or to its end
    pub fn move_to_before_effect(&mut self, id: EffectId, before: Option<EffectId>) {
        if let Some(which) = self.sequence_of(id) {
            self.edit(which, |sequence, tree, _| sequence.move_to_before_effect(tree, id, before));
        }
    }

    /// Edit an effect's properties
    pub fn update_effect<R>(
        &mut self,
        id: EffectId,
        update: impl FnOnce(&mut Effect, &mut TimingTree, &dyn TextSource) -> R,
    ) -> Option<R> {
        let which = self.sequence_of(id)?;
        self.edit(which, |sequence, tree, text| {
            sequence.update_effect(tree, id, |effect, tree| update(effect, tree, text))
        })
        .flatten()
    }

    /// Turn an effect into a text group; see [`SequenceHelper::create_text_group`]
    pub fn create_text_group(
        &mut self,
        id: EffectId,
        text_grouping: Option<u32>,
        grouping_auto: Option<f64>,
        animate_form: bool,
        text_reverse: bool,
    ) -> Option<GroupId> {
        let which = self.sequence_of(id)?;
        self.edit(which, |sequence, tree, text| {
            sequence.create_text_group(tree, text, id, text_grouping, grouping_auto, animate_form, text_reverse)
        })
        .flatten()
    }

    /// Change a group's grouping level
    pub fn set_text_grouping(&mut self, which: SequenceRef, group: GroupId, text_grouping: Option<u32>) {
        self.edit(which, |sequence, tree, text| sequence.set_text_grouping(tree, text, group, text_grouping));
    }

    /// Animate a group's shape along with its text, or not
    pub fn set_animate_form(&mut self, which: SequenceRef, group: GroupId, animate_form: bool) {
        self.edit(which, |sequence, tree, text| sequence.set_animate_form(tree, text, group, animate_form));
    }

    /// Change a group's automatic paragraph delay
    pub fn set_text_grouping_auto(&mut self, which: SequenceRef, group: GroupId, grouping_auto: Option<f64>) {
        self.edit(which, |sequence, tree, text| sequence.set_text_grouping_auto(tree, text, group, grouping_auto));
    }

    /// Change a group's paragraph order
    pub fn set_text_reverse(&mut self, which: SequenceRef, group: GroupId, text_reverse: bool) {
        self.edit(which, |sequence, tree, text| sequence.set_text_reverse(tree, text, group, text_reverse));
    }

    /// Remove every effect on a deleted shape
    pub fn dispose_shape(&mut self, shape: ShapeId) -> bool {
        self.edit_each(|sequence, tree, _| sequence.dispose_shape(tree, shape))
    }

    /// Whether the shape is animated or triggers an interactive sequence
    pub fn has_effect(&self, shape: ShapeId) -> bool {
        self.sequence.has_effect(shape)
            || self
                .interactive
                .iter()
                .any(|s| s.trigger_shape() == Some(shape) || s.has_effect(shape))
    }

    /// Text was inserted into a shape
    pub fn insert_text_range(&mut self, target: Target) {
        self.edit_each(|sequence, tree, text| {
            sequence.insert_text_range(tree, text, target);
            false
        });
    }

    /// A paragraph is about to be deleted
    pub fn dispose_text_range(&mut self, target: Target) {
        self.edit_each(|sequence, tree, text| {
            sequence.dispose_text_range(tree, text, target);
            false
        });
    }

    /// A shape left text editing
    pub fn on_text_changed(&mut self, shape: ShapeId) {
        self.edit_each(|sequence, tree, text| {
            sequence.on_text_changed(tree, text, shape);
            false
        });
    }

    /// Move an effect to the sequence triggered by `trigger`, or back to the
    /// main sequence. Returns whether the effect moved.
    pub fn set_trigger(&mut self, id: EffectId, trigger: Option<ShapeId>) -> bool {
        let Some(from) = self.sequence_of(id) else {
            tracing::warn!("MainSequence::set_trigger: unknown effect {:?}", id);
            return false;
        };
        let to = trigger.map_or(SequenceRef::Main, SequenceRef::Interactive);
        if from == to {
            return false;
        }
        if let Some(shape) = trigger {
            let exists = self.interactive.iter().any(|s| s.trigger_shape() == Some(shape));
            if !exists && self.create_interactive_sequence(shape).is_none() {
                return false;
            }
        }

        let Some(effect) = self.edit(from, |sequence, tree, _| sequence.take_effect(tree, id)).flatten() else {
            return false;
        };
        self.edit(to, |sequence, _, _| sequence.adopt_effect(effect)).is_some()
    }

    /// Create an empty sequence started by clicking `shape`
    pub fn create_interactive_sequence(&mut self, shape: ShapeId) -> Option<NodeId> {
        let parent = self.sequence.root().and_then(|root| self.tree.parent(root));
        let Some(parent) = parent else {
            tracing::error!("MainSequence::create_interactive_sequence: main sequence is not attached");
            return None;
        };

        let mut guard = ChangeGuard::new(self);
        let root = guard.tree.create(NodeKind::Seq);
        if let Some(node) = guard.tree.node_mut(root) {
            node.user_data.node_type = Some(EffectNodeType::InteractiveSequence);
            node.timing.restart = Restart::WhenNotActive;
        }
        if let Err(err) = guard.tree.append_child(parent, root) {
            tracing::warn!("MainSequence::create_interactive_sequence: {}", err);
            guard.tree.free(root);
            return None;
        }
        let interactive = InteractiveSequence::new(root, shape, &guard.config);
        guard.interactive.push(interactive);
        tracing::debug!("Created interactive sequence for {:?}", shape);
        Some(root)
    }

    /// Effect whose subtree root is `node`, in any sequence
    pub fn find_effect(&self, node: NodeId) -> Option<&Effect> {
        self.sequences().find_map(|s| s.find_effect(node))
    }

    /// Effect by ID, in any sequence
    pub fn effect(&self, id: EffectId) -> Option<&Effect> {
        self.sequences().find_map(|s| s.effect(id))
    }

    /// Position of an effect counting the main sequence first, then every
    /// interactive sequence in order
    pub fn offset_from_effect(&self, id: EffectId) -> Option<usize> {
        let mut base = 0;
        for sequence in self.sequences() {
            if let Some(offset) = sequence.offset_from_effect(id) {
                return Some(base + offset);
            }
            base += sequence.len();
        }
        None
    }

    /// Effect at a position counted like [`MainSequence::offset_from_effect`]
    pub fn effect_from_offset(&self, offset: usize) -> Option<&Effect> {
        let mut offset = offset;
        for sequence in self.sequences() {
            if offset < sequence.len() {
                return sequence.effect_from_offset(offset);
            }
            offset -= sequence.len();
        }
        None
    }

    /// Number of effects in the main sequence
    pub fn count(&self) -> usize {
        self.sequence.len()
    }

    /// Number of effects in all sequences
    pub fn total_count(&self) -> usize {
        self.sequences().map(SequenceHelper::len).sum()
    }

    /// Request a tree rebuild; it runs when the timer fires
    pub fn rebuild(&mut self) {
        self.scheduler.start(TimerMode::RebuildTree, Instant::now());
    }

    /// Mode of the pending timer, if any
    pub fn pending_timer(&self) -> Option<TimerMode> {
        self.scheduler.mode()
    }

    /// Hold back rebuilds until the matching [`MainSequence::unlock_rebuilds`]
    pub fn lock_rebuilds(&mut self) {
        self.rebuild_lock += 1;
    }

    /// Release one lock; the last one runs a held back rebuild right away
    pub fn unlock_rebuilds(&mut self) {
        if self.rebuild_lock == 0 {
            tracing::error!("MainSequence::unlock_rebuilds: no matching lock_rebuilds");
        } else {
            self.rebuild_lock -= 1;
        }
        if self.rebuild_lock == 0 && self.pending_rebuild {
            self.pending_rebuild = false;
            self.impl_rebuild();
        }
    }

    /// Whether rebuilds are held back
    pub fn is_rebuild_locked(&self) -> bool {
        self.rebuild_lock > 0
    }

    /// Hold back rebuilds while the returned guard lives
    pub fn lock(&mut self) -> RebuildLock<'_> {
        self.lock_rebuilds();
        RebuildLock { main: self }
    }

    /// Treat tree changes as our own while the returned guard lives
    pub fn change_guard(&mut self) -> ChangeGuard<'_> {
        ChangeGuard::new(self)
    }

    /// Nesting depth of live change guards
    pub fn change_guard_depth(&self) -> u32 {
        self.ignore_changes
    }

    /// Advance the timer. Returns whether a rebuild or reparse ran.
    pub fn tick(&mut self, now: Instant) -> bool {
        self.pump_tree_changes(now);
        match self.scheduler.poll(now) {
            Some(mode) => {
                self.fire(mode);
                true
            }
            None => false,
        }
    }

    /// Run the pending timer now, whatever its deadline
    pub fn flush(&mut self) -> bool {
        self.pump_tree_changes(Instant::now());
        match self.scheduler.take() {
            Some(mode) => {
                self.fire(mode);
                true
            }
            None => false,
        }
    }

    fn fire(&mut self, mode: TimerMode) {
        tracing::trace!("Rebuild timer fired in {:?} mode", mode);
        match mode {
            TimerMode::RebuildTree => self.impl_rebuild(),
            TimerMode::RecreateList => self.recreate(),
        }
    }

    fn pump_tree_changes(&mut self, now: Instant) {
        let Some(changes) = &self.changes else {
            return;
        };
        if changes.try_iter().count() == 0 {
            return;
        }
        if !self.rebuilding && self.ignore_changes == 0 {
            tracing::debug!("Timing tree changed externally, scheduling reparse");
            self.scheduler.start(TimerMode::RecreateList, now);
        }
    }

    /// Discard notifications caused by our own writes.
    ///
    /// Callers pump the feed before writing, so only their own changes are
    /// left in it.
    fn drain_changes(&mut self) {
        if let Some(changes) = &self.changes {
            let drained = changes.try_iter().count();
            if drained > 0 {
                tracing::trace!("Ignored {} own tree changes", drained);
            }
        }
    }

    fn impl_rebuild(&mut self) {
        if self.rebuild_lock > 0 {
            self.pending_rebuild = true;
            return;
        }

        // External edits made before this point still need their reparse
        self.pump_tree_changes(Instant::now());
        self.rebuilding = true;
        self.sequence.rebuild_tree(&mut self.tree);

        let mut kept = Vec::with_capacity(self.interactive.len());
        for mut interactive in std::mem::take(&mut self.interactive) {
            if interactive.is_empty() {
                if let Some(root) = interactive.root() {
                    self.tree.free(root);
                }
                tracing::debug!("Removed empty interactive sequence {:?}", interactive.trigger_shape());
            } else {
                interactive.rebuild_tree(&mut self.tree);
                kept.push(interactive);
            }
        }
        self.interactive = kept;

        self.sequence.notify_listeners();
        self.sequence.take_notified();
        self.drain_changes();
        self.rebuilding = false;
        tracing::debug!("Rebuilt timing tree with {} effects", self.total_count());
    }

    fn recreate(&mut self) {
        self.reset();
        self.create_main_sequence();
    }
}

impl std::fmt::Debug for MainSequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MainSequence")
            .field("sequence", &self.sequence)
            .field("interactive", &self.interactive)
            .field("scheduler", &self.scheduler)
            .field("rebuilding", &self.rebuilding)
            .field("rebuild_lock", &self.rebuild_lock)
            .field("pending_rebuild", &self.pending_rebuild)
            .field("ignore_changes", &self.ignore_changes)
            .finish_non_exhaustive()
    }
}

/// Holds back rebuilds until dropped
pub struct RebuildLock<'a> {
    main: &'a mut MainSequence,
}

impl Deref for RebuildLock<'_> {
    type Target = MainSequence;

    fn deref(&self) -> &Self::Target {
        self.main
    }
}

impl DerefMut for RebuildLock<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.main
    }
}

impl Drop for RebuildLock<'_> {
    fn drop(&mut self) {
        self.main.unlock_rebuilds();
    }
}

/// Marks tree writes as the sequencer's own until dropped.
///
/// The count is released on every exit path, unwinding included.
pub struct ChangeGuard<'a> {
    main: &'a mut MainSequence,
}

impl<'a> ChangeGuard<'a> {
    fn new(main: &'a mut MainSequence) -> Self {
        main.pump_tree_changes(Instant::now());
        main.ignore_changes += 1;
        Self { main }
    }
}

impl Deref for ChangeGuard<'_> {
    type Target = MainSequence;

    fn deref(&self) -> &Self::Target {
        self.main
    }
}

impl DerefMut for ChangeGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.main
    }
}

impl Drop for ChangeGuard<'_> {
    fn drop(&mut self) {
        self.main.drain_changes();
        self.main.ignore_changes = self.main.ignore_changes.saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preset::PresetLibrary;
    use crate::text::SlideText;
    use slidekit_timing::{EventSource, EventTrigger, TimeValue};
    use std::cell::Cell;
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::time::Duration;

    fn slow_config() -> SequencerConfig {
        SequencerConfig {
            rebuild_delay_ms: 1000,
            ..SequencerConfig::default()
        }
    }

    fn setup() -> (MainSequence, Rc<SlideText>) {
        let text = Rc::new(SlideText::new());
        let main = MainSequence::from_tree(TimingTree::new(), text.clone(), slow_config());
        (main, text)
    }

    fn appear(main: &mut MainSequence, shape: ShapeId) -> EffectId {
        let library = PresetLibrary::builtin();
        let preset = library.get("ooo-entrance-appear").unwrap();
        main.append_preset(preset, "", Target::Shape(shape), None).unwrap()
    }

    fn click_groups(main: &MainSequence, root: NodeId) -> Vec<NodeId> {
        main.tree().children(root).to_vec()
    }

    fn later() -> Instant {
        Instant::now() + Duration::from_secs(10)
    }

    #[test]
    fn test_new_creates_empty_main_sequence() {
        let (main, _) = setup();
        let root = main.sequence().root().unwrap();
        let node = main.tree().node(root).unwrap();

        assert_eq!(node.node_type(), Some(EffectNodeType::MainSequence));
        assert_eq!(node.timing.duration, Some(0.0));
        assert_eq!(main.tree().parent(root), Some(main.tree().root()));
        assert_eq!(main.count(), 0);
        assert_eq!(main.pending_timer(), None);
    }

    #[test]
    fn test_edits_are_debounced() {
        let (mut main, _) = setup();
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        main.add_listener(Box::new(move || counter.set(counter.get() + 1)));

        appear(&mut main, ShapeId::new());
        appear(&mut main, ShapeId::new());
        let root = main.sequence().root().unwrap();
        assert!(click_groups(&main, root).is_empty());
        assert_eq!(main.pending_timer(), Some(TimerMode::RebuildTree));

        // Own edits do not turn into a reparse
        assert!(!main.tick(Instant::now()));
        assert_eq!(main.pending_timer(), Some(TimerMode::RebuildTree));
        assert_eq!(calls.get(), 0);

        assert!(main.tick(later()));
        assert_eq!(click_groups(&main, root).len(), 2);
        assert_eq!(calls.get(), 1);
        assert_eq!(main.pending_timer(), None);

        // The rebuild's own tree writes are ignored too
        assert!(!main.tick(later()));
    }

    #[test]
    fn test_external_edit_recreates_list() {
        let (mut main, _) = setup();
        let id = appear(&mut main, ShapeId::new());
        main.flush();
        let node = main.effect(id).unwrap().node();

        main.tree_mut().free(node);
        assert!(!main.tick(Instant::now()));
        assert_eq!(main.pending_timer(), Some(TimerMode::RecreateList));
        main.flush();
        assert_eq!(main.count(), 0);
        assert!(main.effect(id).is_none());
    }

    #[test]
    fn test_external_edit_survives_unrelated_edit() {
        let (mut main, _) = setup();
        let id = appear(&mut main, ShapeId::new());
        main.flush();
        let node = main.effect(id).unwrap().node();

        main.tree_mut().free(node);
        main.on_text_changed(ShapeId::new());
        assert_eq!(main.pending_timer(), Some(TimerMode::RecreateList));
        main.flush();
        assert_eq!(main.count(), 0);

        let shape = ShapeId::new();
        let added = appear(&mut main, shape);
        main.flush();
        let root = main.sequence().root().unwrap();
        let placed = main.effect(added).unwrap().node();
        let with = main.tree().parent(placed).unwrap();
        let click = main.tree().parent(with).unwrap();
        assert_eq!(main.tree().parent(click), Some(root));
        assert_eq!(click_groups(&main, root).len(), 1);
    }

    #[test]
    fn test_external_edit_before_root_node() {
        let (mut main, _) = setup();
        let id = appear(&mut main, ShapeId::new());
        main.flush();
        let node = main.effect(id).unwrap().node();

        main.tree_mut().free(node);
        assert!(main.root_node().is_some());
        assert_eq!(main.pending_timer(), Some(TimerMode::RecreateList));
        main.flush();
        assert!(main.effect(id).is_none());
    }

    #[test]
    fn test_recreate_keeps_effects() {
        let (mut main, _) = setup();
        let shape = ShapeId::new();
        appear(&mut main, shape);
        main.flush();

        let root = main.sequence().root().unwrap();
        let first_click = click_groups(&main, root)[0];
        main.tree_mut().node_mut(first_click).unwrap().timing.acceleration = 0.0;
        main.flush();

        assert_eq!(main.count(), 1);
        assert!(main.has_effect(shape));
        assert_eq!(main.sequence().root(), Some(root));
    }

    #[test]
    fn test_lock_defers_rebuild() {
        let (mut main, _) = setup();
        main.lock_rebuilds();
        appear(&mut main, ShapeId::new());
        main.flush();

        let root = main.sequence().root().unwrap();
        assert!(click_groups(&main, root).is_empty());
        assert!(main.is_rebuild_locked());

        main.unlock_rebuilds();
        assert!(!main.is_rebuild_locked());
        assert_eq!(click_groups(&main, root).len(), 1);

        // Unbalanced unlock is only logged
        main.unlock_rebuilds();
        assert!(!main.is_rebuild_locked());
    }

    #[test]
    fn test_rebuild_lock_guard() {
        let (mut main, _) = setup();
        let root = main.sequence().root().unwrap();
        {
            let mut lock = main.lock();
            appear(&mut lock, ShapeId::new());
            lock.flush();
            assert!(lock.is_rebuild_locked());
            assert!(lock.tree().children(root).is_empty());
        }
        assert!(!main.is_rebuild_locked());
        assert_eq!(click_groups(&main, root).len(), 1);
    }

    #[test]
    fn test_change_guard_released_on_panic() {
        let (mut main, _) = setup();
        let result = catch_unwind(AssertUnwindSafe(|| {
            main.edit(SequenceRef::Main, |_, _, _| panic!("edit failed"));
        }));

        assert!(result.is_err());
        assert_eq!(main.change_guard_depth(), 0);
    }

    #[test]
    fn test_change_guard_hides_own_writes() {
        let (mut main, _) = setup();
        {
            let mut guard = main.change_guard();
            assert_eq!(guard.change_guard_depth(), 1);
            let node = guard.tree_mut().create(NodeKind::Par);
            let timing_root = guard.tree().root();
            guard.tree_mut().append_child(timing_root, node).unwrap();
        }
        assert_eq!(main.change_guard_depth(), 0);
        assert!(!main.tick(later()));
        assert_eq!(main.pending_timer(), None);
    }

    #[test]
    fn test_set_trigger_moves_effect() {
        let (mut main, _) = setup();
        let trigger = ShapeId::new();
        let id = appear(&mut main, ShapeId::new());
        main.flush();

        assert!(main.set_trigger(id, Some(trigger)));
        assert!(!main.set_trigger(id, Some(trigger)));
        assert_eq!(main.count(), 0);
        assert_eq!(main.total_count(), 1);
        assert_eq!(main.interactive_sequences().len(), 1);
        assert_eq!(main.sequence_of(id), Some(SequenceRef::Interactive(trigger)));
        assert!(main.has_effect(trigger));
        main.flush();

        let interactive = &main.interactive_sequences()[0];
        let is_root = interactive.root().unwrap();
        let node = main.tree().node(is_root).unwrap();
        assert_eq!(node.node_type(), Some(EffectNodeType::InteractiveSequence));
        assert_eq!(node.timing.restart, Restart::WhenNotActive);

        let click = click_groups(&main, is_root)[0];
        let begin = main.tree().node(click).unwrap().timing.begin.unwrap();
        let event = *begin.as_event().unwrap();
        assert_eq!(event.trigger, EventTrigger::OnClick);
        assert_eq!(event.source, Some(EventSource::Shape(trigger)));

        let main_root = main.sequence().root().unwrap();
        assert!(click_groups(&main, main_root).is_empty());
        assert_eq!(main.tree().node(main_root).unwrap().timing.duration, Some(0.0));

        // Moving back prunes the empty interactive sequence
        assert!(main.set_trigger(id, None));
        main.flush();
        assert!(main.interactive_sequences().is_empty());
        assert!(!main.tree().contains(is_root));
        assert_eq!(main.count(), 1);
    }

    #[test]
    fn test_aggregated_offsets() {
        let (mut main, _) = setup();
        let a = appear(&mut main, ShapeId::new());
        let b = appear(&mut main, ShapeId::new());
        let c = appear(&mut main, ShapeId::new());
        main.set_trigger(c, Some(ShapeId::new()));
        main.flush();

        assert_eq!(main.offset_from_effect(a), Some(0));
        assert_eq!(main.offset_from_effect(b), Some(1));
        assert_eq!(main.offset_from_effect(c), Some(2));
        assert_eq!(main.effect_from_offset(2).map(Effect::id), Some(c));
        assert!(main.effect_from_offset(3).is_none());

        let node = main.effect(c).unwrap().node();
        assert_eq!(main.find_effect(node).map(Effect::id), Some(c));
    }

    #[test]
    fn test_root_node_forces_pending_rebuild() {
        let (mut main, _) = setup();
        appear(&mut main, ShapeId::new());

        let root = main.root_node().unwrap();
        assert_eq!(main.pending_timer(), None);
        assert_eq!(click_groups(&main, root).len(), 1);
    }

    #[test]
    fn test_round_trip_through_tree() {
        let (mut main, text) = setup();
        let trigger = ShapeId::new();
        let shape = ShapeId::new();
        text.set_text(shape, "One\nTwo");
        let a = appear(&mut main, shape);
        appear(&mut main, ShapeId::new());
        let c = appear(&mut main, ShapeId::new());
        main.set_trigger(c, Some(trigger));
        main.create_text_group(a, Some(1), None, false, false);

        let tree = main.into_tree();
        let parsed = MainSequence::from_tree(tree, text, slow_config());
        assert_eq!(parsed.count(), 3);
        assert_eq!(parsed.total_count(), 4);
        assert_eq!(parsed.interactive_sequences()[0].trigger_shape(), Some(trigger));
        assert_eq!(parsed.sequence().groups().count(), 1);
    }

    #[test]
    fn test_dispose_shape_in_every_sequence() {
        let (mut main, _) = setup();
        let shape = ShapeId::new();
        appear(&mut main, shape);
        let moved = appear(&mut main, shape);
        main.set_trigger(moved, Some(ShapeId::new()));
        main.flush();

        assert!(main.dispose_shape(shape));
        assert_eq!(main.total_count(), 0);
        main.flush();
        assert!(main.interactive_sequences().is_empty());
        assert!(!main.dispose_shape(shape));
    }

    #[test]
    fn test_text_range_forwarding() {
        let (mut main, text) = setup();
        let shape = ShapeId::new();
        text.set_text(shape, "A\nB\nC");
        let library = PresetLibrary::builtin();
        let preset = library.get("ooo-entrance-appear").unwrap();
        let last = main.append_preset(preset, "", Target::paragraph(shape, 2), None).unwrap();
        let moved = main.append_preset(preset, "", Target::paragraph(shape, 1), None).unwrap();
        main.set_trigger(moved, Some(ShapeId::new()));

        main.dispose_text_range(Target::paragraph(shape, 1));
        assert!(main.effect(moved).is_none());
        assert_eq!(main.effect(last).unwrap().target(), Some(Target::paragraph(shape, 1)));

        text.set_paragraphs(shape, Vec::new());
        main.on_text_changed(shape);
        assert!(!main.effect(last).unwrap().has_text());
    }

    #[test]
    fn test_update_effect_routes_to_owner() {
        let (mut main, _) = setup();
        let id = appear(&mut main, ShapeId::new());
        main.set_trigger(id, Some(ShapeId::new()));
        main.flush();

        let updated = main.update_effect(id, |effect, tree, text| {
            effect.set_duration(tree, text, 3.0);
            effect.duration()
        });
        assert_eq!(updated, Some(Some(3.0)));
        assert_eq!(main.pending_timer(), Some(TimerMode::RebuildTree));
        assert!(main.update_effect(EffectId::new(), |_, _, _| ()).is_none());
    }

    #[test]
    fn test_append_node_adopts_subtree() {
        let (mut main, _) = setup();
        let library = PresetLibrary::builtin();
        let node = library.get("ooo-emphasis-spin").unwrap().create(main.tree_mut(), "");
        let id = main.append_node(node).unwrap();
        main.flush();

        assert_eq!(main.effect(id).unwrap().node(), node);
        assert_eq!(main.find_effect(node).map(Effect::id), Some(id));
        let begin = main.tree().node(node).unwrap().timing.begin;
        assert_eq!(begin, Some(TimeValue::Seconds(0.0)));
    }
}
