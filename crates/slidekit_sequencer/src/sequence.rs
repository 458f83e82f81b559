// SPDX-License-Identifier: MIT OR Apache-2.0
//! Ordered effect lists and their timing tree layout.
//!
//! A [`SequenceHelper`] owns a flat list of effects and keeps the subtree
//! under its root in a fixed three-level shape:
//!
//! ```text
//! root ── click group ── with group ── effect subtree
//!                                   └─ after-effect leaf
//! ```
//!
//! Every click group waits for a click (or starts at 0 if the first effect
//! does not), every with group starts when the previous one ended, and the
//! effects inside a with group play together. [`SequenceHelper::rebuild`]
//! regenerates the click and with groups from the list.

use crate::config::SequencerConfig;
use crate::effect::{Effect, EffectId};
use crate::error::{warn_on_err, Result, SequencerError};
use crate::listener::{ListenerId, Listeners};
use crate::preset::EffectPreset;
use crate::text::TextSource;
use crate::text_group::{paragraph_trigger, TextGroup};
use indexmap::IndexMap;
use slidekit_timing::{
    AnimateKind, AnimateProps, EffectNodeType, EventSource, EventTrigger, Fill, GroupId, NodeId,
    NodeKind, PresetClass, ShapeId, SubItem, Target, TimeValue, TimingEvent, TimingNode, TimingTree,
};
use std::cmp::Reverse;
use std::collections::HashSet;

/// Preset identifier of user drawn motion paths
pub const CUSTOM_MOTION_PATH_PRESET: &str = "ooo-motionpath-custom";

/// Role of a sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SequenceKind {
    /// Free standing
    Default,
    /// The slide's main click sequence
    Main,
    /// Started by clicking a trigger shape
    Interactive,
}

/// When structural edits regenerate the tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RebuildPolicy {
    /// Rebuild right after every edit
    #[default]
    Immediate,
    /// Only record that a rebuild is due; the owner schedules it
    Deferred,
}

/// An after-effect leaf waiting to be placed
#[derive(Debug, Clone, Copy)]
struct PendingAfterEffect {
    node: NodeId,
    master: NodeId,
    on_next: bool,
}

/// An ordered list of effects bound to a sequence root
#[derive(Debug)]
pub struct SequenceHelper {
    kind: SequenceKind,
    root: Option<NodeId>,
    effects: IndexMap<EffectId, Effect>,
    groups: IndexMap<GroupId, TextGroup>,
    event_source: Option<ShapeId>,
    policy: RebuildPolicy,
    rebuild_requested: bool,
    notified: bool,
    after_effect_duration: f64,
    motion_path_duration: f64,
    listeners: Listeners,
}

impl SequenceHelper {
    /// Create an empty sequence
    pub fn new(kind: SequenceKind, root: Option<NodeId>, config: &SequencerConfig) -> Self {
        Self {
            kind,
            root,
            effects: IndexMap::new(),
            groups: IndexMap::new(),
            event_source: None,
            policy: RebuildPolicy::Immediate,
            rebuild_requested: false,
            notified: false,
            after_effect_duration: config.after_effect_duration,
            motion_path_duration: config.motion_path_default_duration,
            listeners: Listeners::default(),
        }
    }

    /// Create a sequence by parsing an existing root
    pub fn from_root(tree: &TimingTree, text: &dyn TextSource, kind: SequenceKind, root: NodeId, config: &SequencerConfig) -> Self {
        let mut sequence = Self::new(kind, Some(root), config);
        sequence.create(tree, text, root);
        sequence
    }

    /// Set when structural edits rebuild the tree
    pub fn with_policy(mut self, policy: RebuildPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Role of the sequence
    pub fn kind(&self) -> SequenceKind {
        self.kind
    }

    /// Root node
    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// Rebuild policy
    pub fn policy(&self) -> RebuildPolicy {
        self.policy
    }

    /// Shape whose click starts each click group; `None` means any advance
    pub fn event_source(&self) -> Option<ShapeId> {
        self.event_source
    }

    /// Set the shape whose click starts each click group
    pub fn set_event_source(&mut self, shape: Option<ShapeId>) {
        self.event_source = shape;
    }

    /// Number of effects
    pub fn len(&self) -> usize {
        self.effects.len()
    }

    /// Whether the sequence holds no effects
    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    /// Effects in order
    pub fn effects(&self) -> impl Iterator<Item = &Effect> {
        self.effects.values()
    }

    /// Look up an effect
    pub fn effect(&self, id: EffectId) -> Option<&Effect> {
        self.effects.get(&id)
    }

    /// Whether the effect belongs to this sequence
    pub fn contains(&self, id: EffectId) -> bool {
        self.effects.contains_key(&id)
    }

    /// Effect whose subtree root is `node`
    pub fn find_effect(&self, node: NodeId) -> Option<&Effect> {
        self.effects.values().find(|e| e.node() == node)
    }

    /// Position of an effect in the list
    pub fn offset_from_effect(&self, id: EffectId) -> Option<usize> {
        self.effects.get_index_of(&id)
    }

    /// Effect at a position in the list
    pub fn effect_from_offset(&self, offset: usize) -> Option<&Effect> {
        self.effects.get_index(offset).map(|(_, e)| e)
    }

    /// Text group by ID
    pub fn find_group(&self, id: GroupId) -> Option<&TextGroup> {
        self.groups.get(&id)
    }

    /// All text groups
    pub fn groups(&self) -> impl Iterator<Item = &TextGroup> {
        self.groups.values()
    }

    /// Register a callback run after every rebuild
    pub fn add_listener(&mut self, callback: Box<dyn FnMut()>) -> ListenerId {
        self.listeners.add(callback)
    }

    /// Unregister a callback
    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    /// Number of registered callbacks
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Run all registered callbacks
    pub fn notify_listeners(&mut self) {
        self.notified = true;
        self.listeners.notify();
    }

    pub(crate) fn set_root(&mut self, root: Option<NodeId>) {
        self.root = root;
    }

    /// Whether a deferred rebuild is due, clearing the request
    pub(crate) fn take_rebuild_request(&mut self) -> bool {
        std::mem::take(&mut self.rebuild_requested)
    }

    /// Whether listeners ran since the last call, clearing the flag
    pub(crate) fn take_notified(&mut self) -> bool {
        std::mem::take(&mut self.notified)
    }

    fn request_rebuild(&mut self, tree: &mut TimingTree) {
        match self.policy {
            RebuildPolicy::Immediate => self.rebuild(tree),
            RebuildPolicy::Deferred => self.rebuild_requested = true,
        }
    }

    /// Forget every effect and group; the tree is left alone
    pub fn reset(&mut self) {
        self.effects.clear();
        self.groups.clear();
        self.root = None;
        self.rebuild_requested = false;
    }

    /// Parse the effects under a sequence root.
    ///
    /// Containers with a trigger become effects; dim and hide leaves are
    /// attached to the effect named in their master element.
    pub fn create(&mut self, tree: &TimingTree, text: &dyn TextSource, root: NodeId) {
        self.root = Some(root);
        for click in tree.children(root) {
            for with in tree.children(*click) {
                self.create_effects(tree, text, *with);
            }
        }
        self.update_text_groups();
    }

    fn create_effects(&mut self, tree: &TimingTree, text: &dyn TextSource, with: NodeId) {
        for child in tree.children(with) {
            let Some(node) = tree.node(*child) else {
                continue;
            };
            match &node.kind {
                NodeKind::Par | NodeKind::Iterate(_) if node.node_type().is_some() => {
                    if let Some(effect) = warn_on_err("SequenceHelper::create", Effect::from_node(tree, *child, text)) {
                        self.effects.insert(effect.id(), effect);
                    }
                }
                NodeKind::Animate(props) if matches!(props.kind, AnimateKind::Set | AnimateKind::AnimateColor) => {
                    self.process_after_effect(tree, *child);
                }
                _ => {}
            }
        }
    }

    fn process_after_effect(&mut self, tree: &TimingTree, node: NodeId) {
        let Some(after) = tree.node(node) else {
            return;
        };
        let Some(master) = after.user_data.master_element else {
            return;
        };
        let Some(effect) = self.effects.values_mut().find(|e| e.node() == master) else {
            return;
        };

        effect.set_has_after_effect(true);
        match after.animate() {
            Some(props) if props.kind == AnimateKind::AnimateColor => {
                effect.set_dim_color(props.to.clone());
                effect.set_after_effect_on_next(true);
            }
            _ => {
                effect.set_dim_color(None);
                effect.set_after_effect_on_next(tree.parent(node) != tree.parent(master));
            }
        }
    }

    /// Add an effect at the end
    pub fn append(&mut self, tree: &mut TimingTree, effect: Effect) -> EffectId {
        let id = effect.id();
        self.effects.insert(id, effect);
        self.request_rebuild(tree);
        id
    }

    /// Create an effect from a preset and add it at the end.
    ///
    /// Paragraph targets and text-only presets animate the text only. A
    /// positive `duration` overrides the preset's.
    pub fn append_preset(
        &mut self,
        tree: &mut TimingTree,
        text: &dyn TextSource,
        preset: &EffectPreset,
        sub_type: &str,
        target: Target,
        duration: Option<f64>,
    ) -> Option<EffectId> {
        let node = preset.create(tree, sub_type);
        let Some(mut effect) = warn_on_err("SequenceHelper::append_preset", Effect::from_node(tree, node, text)) else {
            tree.free(node);
            return None;
        };

        let sub_item = if target.is_paragraph() || preset.text_only {
            SubItem::OnlyText
        } else {
            SubItem::AsWhole
        };
        effect.set_target(tree, text, target);
        effect.set_target_sub_item(tree, sub_item);
        if let Some(duration) = duration.filter(|d| *d > 0.0) {
            effect.set_duration(tree, text, duration);
        }
        Some(self.append(tree, effect))
    }

    /// Create a motion path effect along an SVG path and add it at the end.
    ///
    /// Without a `preset_id` the effect counts as a user drawn path.
    pub fn append_motion_path(
        &mut self,
        tree: &mut TimingTree,
        text: &dyn TextSource,
        path: &str,
        target: Target,
        duration: Option<f64>,
        preset_id: Option<&str>,
    ) -> Option<EffectId> {
        warn_on_err(
            "SequenceHelper::append_motion_path",
            self.try_append_motion_path(tree, text, path, target, duration, preset_id),
        )
    }

    fn try_append_motion_path(
        &mut self,
        tree: &mut TimingTree,
        text: &dyn TextSource,
        path: &str,
        target: Target,
        duration: Option<f64>,
        preset_id: Option<&str>,
    ) -> Result<EffectId> {
        let duration = duration.filter(|d| *d > 0.0).unwrap_or(self.motion_path_duration);

        let container = tree.create(NodeKind::Par);
        let motion = tree.create(NodeKind::Animate(AnimateProps::new(AnimateKind::AnimateMotion, "").with_path(path)));
        {
            let timing = &mut tree.get_mut(motion)?.timing;
            timing.duration = Some(duration);
            timing.fill = Fill::Hold;
        }
        {
            let node = tree.get_mut(container)?;
            node.timing.begin = Some(TimeValue::Seconds(0.0));
            node.timing.fill = Fill::Hold;
            node.timing.acceleration = 0.5;
            node.timing.decelerate = 0.5;
            node.user_data.node_type = Some(EffectNodeType::OnClick);
            node.user_data.preset_class = Some(PresetClass::MotionPath);
            node.user_data.preset_id = Some(preset_id.unwrap_or(CUSTOM_MOTION_PATH_PRESET).to_string());
        }
        if let Err(err) = tree.append_child(container, motion) {
            tree.free(container);
            tree.free(motion);
            return Err(err.into());
        }

        let mut effect = Effect::from_node(tree, container, text)?;
        effect.set_target(tree, text, target);
        if target.is_paragraph() {
            effect.set_target_sub_item(tree, SubItem::OnlyText);
        }
        Ok(self.append(tree, effect))
    }

    /// Swap an effect's subtree for a fresh one from a preset
    pub fn replace(
        &mut self,
        tree: &mut TimingTree,
        text: &dyn TextSource,
        id: EffectId,
        preset: &EffectPreset,
        sub_type: &str,
        duration: Option<f64>,
    ) {
        let Some(effect) = self.effects.get_mut(&id) else {
            tracing::warn!("SequenceHelper::replace: {}", SequencerError::EffectNotFound(id));
            return;
        };
        let node = preset.create(tree, sub_type);
        effect.replace_node(tree, text, node);
        if let Some(duration) = duration.filter(|d| *d > 0.0) {
            effect.set_duration(tree, text, duration);
        }
        self.request_rebuild(tree);
    }

    /// Edit an effect in place, then rebuild
    pub fn update_effect<R>(
        &mut self,
        tree: &mut TimingTree,
        id: EffectId,
        update: impl FnOnce(&mut Effect, &mut TimingTree) -> R,
    ) -> Option<R> {
        let effect = self.effects.get_mut(&id)?;
        let result = update(effect, tree);
        self.request_rebuild(tree);
        Some(result)
    }

    /// Remove an effect and free its subtree
    pub fn remove(&mut self, tree: &mut TimingTree, id: EffectId) -> bool {
        let removed = self.discard_effect(tree, id);
        self.request_rebuild(tree);
        removed
    }

    fn discard_effect(&mut self, tree: &mut TimingTree, id: EffectId) -> bool {
        match self.effects.shift_remove(&id) {
            Some(effect) => {
                tree.free(effect.node());
                true
            }
            None => false,
        }
    }

    /// Take an effect out of the list, keeping its subtree alive but detached
    pub(crate) fn take_effect(&mut self, tree: &mut TimingTree, id: EffectId) -> Option<Effect> {
        let effect = self.effects.shift_remove(&id)?;
        tree.detach(effect.node());
        self.rebuild_requested = true;
        Some(effect)
    }

    /// Add an effect taken from another sequence
    pub(crate) fn adopt_effect(&mut self, effect: Effect) {
        self.effects.insert(effect.id(), effect);
        self.rebuild_requested = true;
    }

    /// Move an effect right before another one, or to the end
    pub fn move_to_before_effect(&mut self, tree: &mut TimingTree, id: EffectId, before: Option<EffectId>) {
        if before == Some(id) {
            return;
        }
        let Some(effect) = self.effects.shift_remove(&id) else {
            tracing::warn!("SequenceHelper::move_to_before_effect: {}", SequencerError::EffectNotFound(id));
            return;
        };
        let position = before
            .and_then(|b| self.effects.get_index_of(&b))
            .unwrap_or(self.effects.len());
        self.effects.shift_insert(position, id, effect);
        self.request_rebuild(tree);
    }

    /// Remove every effect that targets a shape
    pub fn dispose_shape(&mut self, tree: &mut TimingTree, shape: ShapeId) -> bool {
        let doomed: Vec<EffectId> = self
            .effects
            .values()
            .filter(|e| e.target_shape() == Some(shape))
            .map(Effect::id)
            .collect();
        for id in &doomed {
            self.discard_effect(tree, *id);
        }
        if !doomed.is_empty() {
            self.request_rebuild(tree);
        }
        !doomed.is_empty()
    }

    /// Whether any effect targets the shape
    pub fn has_effect(&self, shape: ShapeId) -> bool {
        self.effects.values().any(|e| e.target_shape() == Some(shape))
    }

    /// Numbering levels of an animated shape's paragraphs
    pub fn paragraph_numbering_levels(&self, text: &dyn TextSource, shape: ShapeId) -> Option<Vec<u32>> {
        if !self.has_effect(shape) {
            return None;
        }
        text.numbering_levels(shape)
    }

    /// Refresh text state of every effect on the shape; rebuild on change
    fn refresh_text(&mut self, tree: &mut TimingTree, text: &dyn TextSource, shape: ShapeId) {
        let levels = self.paragraph_numbering_levels(text, shape);
        let mut changed = false;
        for effect in self.effects.values_mut() {
            if effect.target_shape() == Some(shape) {
                changed |= effect.check_for_text(tree, text, levels.as_deref());
            }
        }
        if changed {
            self.request_rebuild(tree);
        }
    }

    /// Text was inserted into a shape
    pub fn insert_text_range(&mut self, tree: &mut TimingTree, text: &dyn TextSource, target: Target) {
        if let Some(para) = target.as_paragraph() {
            self.refresh_text(tree, text, para.shape);
        }
    }

    /// The text of a shape changed
    pub fn on_text_changed(&mut self, tree: &mut TimingTree, text: &dyn TextSource, shape: ShapeId) {
        self.refresh_text(tree, text, shape);
    }

    /// A paragraph is about to be deleted.
    ///
    /// Effects on the deleted paragraph go away and effects on later
    /// paragraphs move up by one. When the previous paragraph is empty the
    /// deletion merges into it, so that paragraph's effects go instead.
    pub fn dispose_text_range(&mut self, tree: &mut TimingTree, text: &dyn TextSource, target: Target) {
        let Some(para) = target.as_paragraph() else {
            return;
        };
        let mut changed = false;

        let mut paragraph_effects = Vec::new();
        for effect in self.effects.values_mut() {
            match effect.target() {
                Some(Target::Paragraph(p)) if p.shape == para.shape => paragraph_effects.push((effect.id(), p)),
                Some(Target::Shape(shape)) if shape == para.shape => {
                    changed |= effect.check_for_text(tree, text, None);
                }
                _ => {}
            }
        }

        let deleted = match para.previous() {
            Some(previous) if text.is_paragraph_empty(previous) => previous.paragraph,
            _ => para.paragraph,
        };

        for (id, p) in paragraph_effects {
            if p.paragraph == deleted {
                self.discard_effect(tree, id);
                changed = true;
            } else if p.paragraph > deleted {
                if let Some(effect) = self.effects.get_mut(&id) {
                    effect.set_target(tree, text, Target::paragraph(p.shape, p.paragraph - 1));
                    changed = true;
                }
            }
        }

        if changed {
            self.request_rebuild(tree);
        }
    }

    /// Regenerate the click and with groups and notify listeners
    pub fn rebuild(&mut self, tree: &mut TimingTree) {
        self.rebuild_tree(tree);
        self.notify_listeners();
    }

    /// Regenerate the click and with groups without notifying
    pub(crate) fn rebuild_tree(&mut self, tree: &mut TimingTree) {
        self.rebuild_requested = false;
        warn_on_err("SequenceHelper::rebuild", self.try_rebuild(tree));
    }

    fn try_rebuild(&mut self, tree: &mut TimingTree) -> Result<()> {
        let root = self.root.ok_or(SequencerError::NoRoot)?;

        // Effects whose subtree was freed behind our back have nothing to place
        let before = self.effects.len();
        self.effects.retain(|_, effect| tree.contains(effect.node()));
        if self.effects.len() < before {
            tracing::warn!(
                "SequenceHelper::rebuild: dropped {} effects whose nodes are gone",
                before - self.effects.len()
            );
        }
        let live: HashSet<NodeId> = self.effects.values().map(Effect::node).collect();

        for click in tree.children(root).to_vec() {
            if live.contains(&click) {
                tree.detach(click);
                continue;
            }
            for with in tree.children(click).to_vec() {
                if live.contains(&with) {
                    tree.detach(with);
                    continue;
                }
                for child in tree.children(with).to_vec() {
                    if live.contains(&child) {
                        tree.detach(child);
                    } else {
                        tree.free(child);
                    }
                }
                tree.free(with);
            }
            tree.free(click);
        }

        if self.effects.is_empty() {
            tree.get_mut(root)?.timing.duration = Some(0.0);
            self.update_text_groups();
            return Ok(());
        }

        let mut pending = Vec::new();
        let mut index = 0;
        let count = self.effects.len();
        let node_type_at = |effects: &IndexMap<EffectId, Effect>, i: usize| {
            effects.get_index(i).and_then(|(_, e)| e.node_type())
        };

        while index < count {
            let click = tree.create(NodeKind::Par);
            let begin = if index == 0 && node_type_at(&self.effects, 0) != Some(EffectNodeType::OnClick) {
                TimeValue::Seconds(0.0)
            } else {
                self.click_begin()
            };
            tree.get_mut(click)?.timing.begin = Some(begin);
            tree.append_child(root, click)?;

            let mut with_begin = 0.0;
            loop {
                let with = tree.create(NodeKind::Par);
                tree.get_mut(with)?.timing.begin = Some(TimeValue::Seconds(with_begin));
                tree.append_child(click, with)?;

                let mut with_duration = 0.0_f64;
                while let Some((_, effect)) = self.effects.get_index(index) {
                    match tree.append_child(with, effect.node()) {
                        Ok(()) => {
                            if effect.has_after_effect() {
                                pending.push(PendingAfterEffect {
                                    node: effect.create_after_effect_node(tree, self.after_effect_duration),
                                    master: effect.node(),
                                    on_next: effect.after_effect_on_next(),
                                });
                            }
                            with_duration =
                                with_duration.max(effect.begin() + effect.absolute_duration().unwrap_or(0.0));
                        }
                        Err(err) => tracing::warn!("SequenceHelper::rebuild: skipping {:?}: {}", effect.id(), err),
                    }

                    index += 1;
                    if node_type_at(&self.effects, index) != Some(EffectNodeType::WithPrevious) {
                        break;
                    }
                }
                with_begin += with_duration;

                if index >= count || node_type_at(&self.effects, index) == Some(EffectNodeType::OnClick) {
                    break;
                }
            }
        }

        self.update_text_groups();

        for after in pending {
            if let Err(err) = place_after_effect(tree, after) {
                tracing::warn!("SequenceHelper::rebuild: dropping after-effect: {}", err);
                tree.free(after.node);
            }
        }

        tree.get_mut(root)?.timing.duration = None;
        tracing::trace!("Rebuilt {:?} sequence with {} effects", self.kind, count);
        Ok(())
    }

    fn click_begin(&self) -> TimeValue {
        let event = match self.event_source {
            Some(shape) => TimingEvent::from_source(EventSource::Shape(shape), EventTrigger::OnClick),
            None => TimingEvent::new(EventTrigger::OnNext),
        };
        TimeValue::Event(event)
    }

    /// Rebuild the text groups from the group IDs of the effects
    pub fn update_text_groups(&mut self) {
        self.groups.clear();
        for effect in self.effects.values() {
            let (Some(group_id), Some(shape)) = (effect.group_id(), effect.target_shape()) else {
                continue;
            };
            self.groups
                .entry(group_id)
                .or_insert_with(|| TextGroup::new(shape, group_id))
                .add_effect(effect);
        }
        for group in self.groups.values_mut() {
            group.trim_trailing_with_previous();
        }
    }

    fn next_group_id(&self) -> GroupId {
        (0..)
            .map(GroupId)
            .find(|id| !self.groups.contains_key(id))
            .unwrap_or(GroupId(u32::MAX))
    }

    /// Turn an effect into a text group animating a shape's paragraphs.
    ///
    /// With a grouping of 0, or when the shape itself is animated, the effect
    /// stays on the whole shape; otherwise it becomes the first paragraph
    /// effect. Every other non-empty paragraph gets a copy of the effect.
    pub fn create_text_group(
        &mut self,
        tree: &mut TimingTree,
        text: &dyn TextSource,
        effect_id: EffectId,
        text_grouping: Option<u32>,
        grouping_auto: Option<f64>,
        animate_form: bool,
        text_reverse: bool,
    ) -> Option<GroupId> {
        let group_id = self.next_group_id();
        let Some(effect) = self.effects.get_mut(&effect_id) else {
            tracing::warn!("SequenceHelper::create_text_group: {}", SequencerError::EffectNotFound(effect_id));
            return None;
        };
        let Some(shape) = effect.target_shape() else {
            tracing::warn!("SequenceHelper::create_text_group: effect has no target");
            return None;
        };

        let mut group = TextGroup::new(shape, group_id);
        let mut used = false;
        if text_grouping == Some(0) || animate_form {
            let sub_item = match (text_grouping, animate_form) {
                (Some(0), true) => SubItem::AsWhole,
                (Some(0), false) => SubItem::OnlyText,
                _ => SubItem::OnlyBackground,
            };
            effect.set_target(tree, text, Target::Shape(shape));
            effect.set_target_sub_item(tree, sub_item);
            effect.set_group_id(tree, Some(group_id));
            group.add_effect(effect);
            used = true;
        }
        group.set_text_grouping(text_grouping);
        group.set_grouping_auto(grouping_auto);
        group.set_text_reverse(text_reverse);
        self.groups.insert(group_id, group);

        self.create_paragraph_effects(tree, text, group_id, effect_id, used);
        self.notify_listeners();
        self.request_rebuild(tree);
        Some(group_id)
    }

    /// Give every non-empty paragraph of the group's shape an effect
    fn create_paragraph_effects(
        &mut self,
        tree: &mut TimingTree,
        text: &dyn TextSource,
        group_id: GroupId,
        source: EffectId,
        mut used: bool,
    ) {
        let Some(group) = self.groups.get(&group_id) else {
            return;
        };
        let Some(grouping) = group.text_grouping() else {
            return;
        };
        let (shape, auto, reverse) = (group.target(), group.grouping_auto(), group.text_reverse());
        let Some(paragraphs) = text.paragraphs(shape) else {
            tracing::warn!("SequenceHelper::create_text_group: shape holds no text");
            return;
        };

        let mut indices: Vec<u32> = paragraphs
            .iter()
            .enumerate()
            .filter(|(_, p)| !p.is_empty())
            .map(|(i, _)| i as u32)
            .collect();
        if reverse {
            indices.reverse();
        }

        let mut anchor = source;
        for paragraph in indices {
            let id = if used {
                let Some(original) = self.effects.get(&source) else {
                    return;
                };
                let Some(copy) = warn_on_err("SequenceHelper::create_text_group", original.clone_effect(tree, text)) else {
                    continue;
                };
                let id = copy.id();
                let position = self
                    .effects
                    .get_index_of(&anchor)
                    .map_or(self.effects.len(), |i| i + 1);
                self.effects.shift_insert(position, id, copy);
                id
            } else {
                used = true;
                source
            };
            anchor = id;

            let Some(effect) = self.effects.get_mut(&id) else {
                continue;
            };
            effect.set_target(tree, text, Target::paragraph(shape, paragraph));
            effect.set_target_sub_item(tree, SubItem::OnlyText);
            effect.set_group_id(tree, Some(group_id));
            let (node_type, begin) = paragraph_trigger(effect.para_depth(), Some(grouping), auto);
            effect.set_node_type(tree, node_type);
            effect.set_begin(tree, begin);
            if let Some(group) = self.groups.get_mut(&group_id) {
                group.add_effect(effect);
            }
        }
    }

    /// Members of a group, resetting the group's inferred state
    fn drain_group(&mut self, group_id: GroupId, context: &str) -> Option<Vec<EffectId>> {
        let Some(group) = self.groups.get_mut(&group_id) else {
            tracing::warn!("{}: {}", context, SequencerError::GroupNotFound(group_id));
            return None;
        };
        let members = group.effects().to_vec();
        group.reset();
        Some(members)
    }

    fn add_to_group(&mut self, group_id: GroupId, id: EffectId) {
        if let (Some(group), Some(effect)) = (self.groups.get_mut(&group_id), self.effects.get(&id)) {
            group.add_effect(effect);
        }
    }

    fn is_paragraph_effect(&self, id: EffectId) -> bool {
        self.effects
            .get(&id)
            .and_then(Effect::target)
            .is_some_and(|t| t.is_paragraph())
    }

    /// Change how many outline levels start on their own trigger.
    ///
    /// `None` collapses the group back to its shape effect; going from `None`
    /// to a level creates paragraph effects from the first member.
    pub fn set_text_grouping(&mut self, tree: &mut TimingTree, text: &dyn TextSource, group_id: GroupId, text_grouping: Option<u32>) {
        let Some(group) = self.groups.get(&group_id) else {
            tracing::warn!("SequenceHelper::set_text_grouping: {}", SequencerError::GroupNotFound(group_id));
            return;
        };
        let current = group.text_grouping();
        if current == text_grouping {
            return;
        }

        match (current, text_grouping) {
            (None, Some(_)) => {
                let Some(&source) = group.effects().first() else {
                    tracing::warn!("SequenceHelper::set_text_grouping: group {:?} is empty", group_id);
                    return;
                };
                if let Some(group) = self.groups.get_mut(&group_id) {
                    group.set_text_grouping(text_grouping);
                }
                self.create_paragraph_effects(tree, text, group_id, source, true);
            }
            (Some(_), None) => {
                let Some(members) = self.drain_group(group_id, "SequenceHelper::set_text_grouping") else {
                    return;
                };
                for id in members {
                    if self.is_paragraph_effect(id) {
                        self.discard_effect(tree, id);
                    } else {
                        self.add_to_group(group_id, id);
                    }
                }
            }
            _ => {
                let auto = group.grouping_auto();
                let Some(members) = self.drain_group(group_id, "SequenceHelper::set_text_grouping") else {
                    return;
                };
                for id in members {
                    if self.is_paragraph_effect(id) {
                        if let Some(effect) = self.effects.get_mut(&id) {
                            let (node_type, begin) = paragraph_trigger(effect.para_depth(), text_grouping, auto);
                            effect.set_node_type(tree, node_type);
                            effect.set_begin(tree, begin);
                        }
                    }
                    self.add_to_group(group_id, id);
                }
            }
        }

        self.notify_listeners();
        self.request_rebuild(tree);
    }

    /// Animate the shape itself along with its paragraphs, or stop doing so
    pub fn set_animate_form(&mut self, tree: &mut TimingTree, text: &dyn TextSource, group_id: GroupId, animate_form: bool) {
        if self.groups.get(&group_id).is_some_and(|g| g.animate_form() == animate_form) {
            return;
        }
        let Some(members) = self.drain_group(group_id, "SequenceHelper::set_animate_form") else {
            return;
        };
        let Some(&first) = members.first() else {
            return;
        };
        let mut rest = members.as_slice();

        if animate_form {
            if members.len() == 1 && !self.is_paragraph_effect(first) {
                if let Some(effect) = self.effects.get_mut(&first) {
                    effect.set_target_sub_item(tree, SubItem::AsWhole);
                }
                self.add_to_group(group_id, first);
                rest = &[];
            } else if let Some(effect) = self.effects.get(&first) {
                if let (Some(mut form), Some(shape)) = (
                    warn_on_err("SequenceHelper::set_animate_form", effect.clone_effect(tree, text)),
                    effect.target_shape(),
                ) {
                    form.set_target(tree, text, Target::Shape(shape));
                    form.set_target_sub_item(tree, SubItem::OnlyBackground);
                    let id = form.id();
                    let position = self.effects.get_index_of(&first).unwrap_or(self.effects.len());
                    self.effects.shift_insert(position, id, form);
                    self.add_to_group(group_id, id);
                }
            }
        }

        if !animate_form && members.len() == 1 {
            let shape = self.effects.get(&first).and_then(Effect::target_shape);
            if let (Some(effect), Some(shape)) = (self.effects.get_mut(&first), shape) {
                effect.set_target(tree, text, Target::Shape(shape));
                effect.set_target_sub_item(tree, SubItem::OnlyText);
            }
            self.add_to_group(group_id, first);
        } else {
            for id in rest {
                if self.is_paragraph_effect(*id) {
                    self.add_to_group(group_id, *id);
                } else {
                    self.discard_effect(tree, *id);
                }
            }
        }

        self.notify_listeners();
        self.request_rebuild(tree);
    }

    /// Set the automatic delay between paragraphs; `None` means click
    pub fn set_text_grouping_auto(&mut self, tree: &mut TimingTree, _text: &dyn TextSource, group_id: GroupId, grouping_auto: Option<f64>) {
        let grouping = self.groups.get(&group_id).and_then(TextGroup::text_grouping);
        let Some(members) = self.drain_group(group_id, "SequenceHelper::set_text_grouping_auto") else {
            return;
        };
        for id in members {
            if self.is_paragraph_effect(id) {
                if let Some(effect) = self.effects.get_mut(&id) {
                    let (node_type, begin) = paragraph_trigger(effect.para_depth(), grouping, grouping_auto);
                    effect.set_node_type(tree, node_type);
                    effect.set_begin(tree, begin);
                }
            }
            self.add_to_group(group_id, id);
        }

        self.notify_listeners();
        self.request_rebuild(tree);
    }

    /// Run the paragraphs last to first, or first to last.
    ///
    /// Members are sorted by paragraph and placed contiguously where the
    /// first of them was. A shape member leads in forward order and trails
    /// in reverse order.
    pub fn set_text_reverse(&mut self, tree: &mut TimingTree, _text: &dyn TextSource, group_id: GroupId, text_reverse: bool) {
        if self.groups.get(&group_id).is_some_and(|g| g.text_reverse() == text_reverse) {
            return;
        }
        let Some(members) = self.drain_group(group_id, "SequenceHelper::set_text_reverse") else {
            return;
        };

        let mut sorted: Vec<(i64, EffectId)> = members
            .into_iter()
            .map(|id| {
                let key = match self.effects.get(&id).and_then(Effect::target) {
                    Some(Target::Paragraph(p)) => i64::from(p.paragraph),
                    _ if text_reverse => i64::MAX,
                    _ => -1,
                };
                (key, id)
            })
            .collect();
        if text_reverse {
            sorted.sort_by_key(|(key, _)| Reverse(*key));
        } else {
            sorted.sort_by_key(|(key, _)| *key);
        }

        let mut ids = sorted.into_iter().map(|(_, id)| id);
        if let Some(first) = ids.next() {
            self.add_to_group(group_id, first);
            let mut anchor = first;
            for id in ids {
                let Some(effect) = self.effects.shift_remove(&id) else {
                    continue;
                };
                let position = self
                    .effects
                    .get_index_of(&anchor)
                    .map_or(self.effects.len(), |i| i + 1);
                self.effects.shift_insert(position, id, effect);
                self.add_to_group(group_id, id);
                anchor = id;
            }
        }

        self.notify_listeners();
        self.request_rebuild(tree);
    }
}

/// Put an after-effect leaf where it belongs relative to its master.
///
/// Same-click leaves go right after the master. Next-click leaves go into
/// the next with group of the click group, else into the first with group
/// of the next click group, else into a new click group.
fn place_after_effect(tree: &mut TimingTree, after: PendingAfterEffect) -> Result<()> {
    tree.get_mut(after.node)?.user_data.master_element = Some(after.master);
    let with = tree.parent(after.master).ok_or(SequencerError::Detached(after.master))?;

    if !after.on_next {
        tree.insert_after(with, after.node, after.master)?;
        return Ok(());
    }

    let click = tree.parent(with).ok_or(SequencerError::Detached(with))?;
    let sequence = tree.parent(click).ok_or(SequencerError::Detached(click))?;

    let container = match next_sibling(tree, click, with) {
        Some(next_with) => next_with,
        None => match next_sibling(tree, sequence, click) {
            Some(next_click) => match tree.children(next_click).first().copied() {
                Some(first) => first,
                None => {
                    let next_with = new_with_group(tree)?;
                    tree.append_child(next_click, next_with)?;
                    next_with
                }
            },
            None => {
                let next_click = tree.create(NodeKind::Par);
                tree.get_mut(next_click)?.timing.begin = Some(TimeValue::Event(TimingEvent::new(EventTrigger::OnNext)));
                tree.insert_after(sequence, next_click, click)?;
                let next_with = new_with_group(tree)?;
                tree.append_child(next_click, next_with)?;
                next_with
            }
        },
    };

    let begin = tree
        .children(container)
        .first()
        .and_then(|first| tree.node(*first))
        .and_then(TimingNode::begin_seconds)
        .filter(|b| *b >= 0.0);
    if let Some(begin) = begin {
        tree.get_mut(after.node)?.timing.begin = Some(TimeValue::Seconds(begin));
    }
    tree.append_child(container, after.node)?;
    Ok(())
}

fn next_sibling(tree: &TimingTree, parent: NodeId, node: NodeId) -> Option<NodeId> {
    let siblings = tree.children(parent);
    let position = siblings.iter().position(|c| *c == node)?;
    siblings.get(position + 1).copied()
}

fn new_with_group(tree: &mut TimingTree) -> Result<NodeId> {
    let with = tree.create(NodeKind::Par);
    tree.get_mut(with)?.timing.begin = Some(TimeValue::Seconds(0.0));
    Ok(with)
}
