// SPDX-License-Identifier: MIT OR Apache-2.0
//! A single user-visible animation effect.
//!
//! An [`Effect`] caches the interesting attributes of one effect subtree in
//! the timing tree. Setters write through to the tree; reads of values that
//! only live in the tree (colors, paths, properties) go to the tree directly.

use crate::error::{warn_on_err, Result, SequencerError};
use crate::text::{count_subitems, TextSource};
use serde::{Deserialize, Serialize};
use slidekit_timing::{
    AnimValue, AnimateKind, AnimateProps, AudioProps, Command, CommandProps, EffectNodeType,
    EventSource, EventTrigger, Fill, GroupId, IterateProps, IterateType, NodeId, NodeKind,
    PresetClass, ShapeId, SubItem, Target, TimeValue, TimingEvent, TimingTree, TransformType,
};
use uuid::Uuid;

/// Unique identifier for an effect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EffectId(pub Uuid);

impl EffectId {
    /// Create a new random effect ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EffectId {
    fn default() -> Self {
        Self::new()
    }
}

/// Which value of an animate leaf to read or write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSlot {
    /// The end value
    To,
    /// The relative change
    By,
}

/// Attributes that carry colors
const COLOR_ATTRIBUTES: [&str; 4] = ["FillColor", "LineColor", "CharColor", "DimColor"];

/// One animation effect backed by a timing subtree
#[derive(Debug, Clone)]
pub struct Effect {
    id: EffectId,
    node: NodeId,
    node_type: Option<EffectNodeType>,
    preset_class: Option<PresetClass>,
    preset_id: String,
    preset_sub_type: String,
    property: String,
    group_id: Option<GroupId>,
    begin: f64,
    duration: Option<f64>,
    absolute_duration: Option<f64>,
    fill: Fill,
    acceleration: f64,
    decelerate: f64,
    auto_reverse: bool,
    iterate_type: Option<IterateType>,
    iterate_interval: f64,
    target: Option<Target>,
    target_sub_item: SubItem,
    para_depth: Option<u32>,
    has_text: bool,
    audio: Option<NodeId>,
    command: Option<Command>,
    has_after_effect: bool,
    dim_color: Option<AnimValue>,
    after_effect_on_next: bool,
}

impl Effect {
    fn blank(node: NodeId) -> Self {
        Self {
            id: EffectId::new(),
            node,
            node_type: None,
            preset_class: None,
            preset_id: String::new(),
            preset_sub_type: String::new(),
            property: String::new(),
            group_id: None,
            begin: 0.0,
            duration: None,
            absolute_duration: None,
            fill: Fill::Default,
            acceleration: 0.0,
            decelerate: 0.0,
            auto_reverse: false,
            iterate_type: None,
            iterate_interval: 0.0,
            target: None,
            target_sub_item: SubItem::AsWhole,
            para_depth: None,
            has_text: false,
            audio: None,
            command: None,
            has_after_effect: false,
            dim_color: None,
            after_effect_on_next: false,
        }
    }

    /// Create an effect by parsing an existing subtree
    pub fn from_node(tree: &TimingTree, node: NodeId, text: &dyn TextSource) -> Result<Self> {
        let mut effect = Self::blank(node);
        effect.read_node(tree)?;
        effect.check_for_text(tree, text, None);
        Ok(effect)
    }

    /// Refresh every cached attribute from the subtree
    fn read_node(&mut self, tree: &TimingTree) -> Result<()> {
        let node = tree.get(self.node)?;

        let user = &node.user_data;
        self.node_type = user.node_type;
        self.preset_id = user.preset_id.clone().unwrap_or_default();
        self.preset_sub_type = user.preset_sub_type.clone().unwrap_or_default();
        self.preset_class = user.preset_class;
        self.property = user.preset_property.clone().unwrap_or_default();
        self.group_id = user.group_id;

        let timing = &node.timing;
        self.begin = node.begin_seconds().unwrap_or(0.0);
        self.acceleration = timing.acceleration;
        self.decelerate = timing.decelerate;
        self.auto_reverse = timing.auto_reverse;
        self.fill = timing.fill;

        match node.iterate() {
            Some(props) => {
                self.iterate_interval = props.interval;
                self.iterate_type = Some(props.iterate_type);
                self.target = props.target;
                self.target_sub_item = props.sub_item;
            }
            None => {
                self.iterate_interval = 0.0;
                self.iterate_type = None;
            }
        }

        self.duration = None;
        self.audio = None;
        self.command = None;
        for child_id in node.children() {
            let child = tree.get(*child_id)?;
            if child.is_audio() {
                self.audio = Some(*child_id);
                continue;
            }
            if let Some(command) = child.command() {
                self.command = Some(command.command);
                if self.target.is_none() {
                    self.target = command.target;
                }
                continue;
            }

            let end = child.begin_seconds().unwrap_or(0.0).max(0.0)
                + child.timing.duration.unwrap_or(0.0);
            if self.duration.map_or(true, |d| end > d) {
                self.duration = Some(end);
            }
            if self.target.is_none() {
                if let Some(animate) = child.animate() {
                    self.target = animate.target;
                    self.target_sub_item = animate.sub_item;
                }
            }
        }

        self.absolute_duration = self
            .duration
            .map(|d| d * node.timing.repeat_count.unwrap_or(1.0));
        Ok(())
    }

    /// Effect ID
    pub fn id(&self) -> EffectId {
        self.id
    }

    /// Root node of the effect subtree
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Trigger of the effect
    pub fn node_type(&self) -> Option<EffectNodeType> {
        self.node_type
    }

    /// Preset family
    pub fn preset_class(&self) -> Option<PresetClass> {
        self.preset_class
    }

    /// Preset identifier
    pub fn preset_id(&self) -> &str {
        &self.preset_id
    }

    /// Preset variant
    pub fn preset_sub_type(&self) -> &str {
        &self.preset_sub_type
    }

    /// Property the UI offers for editing
    pub fn property(&self) -> &str {
        &self.property
    }

    /// Text group membership
    pub fn group_id(&self) -> Option<GroupId> {
        self.group_id
    }

    /// Delay in seconds
    pub fn begin(&self) -> f64 {
        self.begin
    }

    /// Longest child end time, if known
    pub fn duration(&self) -> Option<f64> {
        self.duration
    }

    /// Total playing time including repeats and iteration
    pub fn absolute_duration(&self) -> Option<f64> {
        self.absolute_duration
    }

    /// Fill mode
    pub fn fill(&self) -> Fill {
        self.fill
    }

    /// Acceleration fraction
    pub fn acceleration(&self) -> f64 {
        self.acceleration
    }

    /// Deceleration fraction
    pub fn decelerate(&self) -> f64 {
        self.decelerate
    }

    /// Whether the effect plays backwards afterwards
    pub fn auto_reverse(&self) -> bool {
        self.auto_reverse
    }

    /// Iteration granularity, `None` when not iterating
    pub fn iterate_type(&self) -> Option<IterateType> {
        self.iterate_type
    }

    /// Delay between iterations
    pub fn iterate_interval(&self) -> f64 {
        self.iterate_interval
    }

    /// Animated element
    pub fn target(&self) -> Option<Target> {
        self.target
    }

    /// Shape the target belongs to
    pub fn target_shape(&self) -> Option<ShapeId> {
        self.target.map(|t| t.shape())
    }

    /// Part of the shape that is animated
    pub fn target_sub_item(&self) -> SubItem {
        self.target_sub_item
    }

    /// Outline level of the targeted paragraph
    pub fn para_depth(&self) -> Option<u32> {
        self.para_depth
    }

    /// Whether the target holds text
    pub fn has_text(&self) -> bool {
        self.has_text
    }

    /// Audio leaf, if any
    pub fn audio(&self) -> Option<NodeId> {
        self.audio
    }

    /// Command of the command leaf, if any
    pub fn command(&self) -> Option<Command> {
        self.command
    }

    /// Whether the effect stops all sounds
    pub fn stop_audio(&self) -> bool {
        self.command == Some(Command::StopAudio)
    }

    /// Whether a dim or hide follows the effect
    pub fn has_after_effect(&self) -> bool {
        self.has_after_effect
    }

    /// Dim color; `None` means hide
    pub fn dim_color(&self) -> Option<&AnimValue> {
        self.dim_color.as_ref()
    }

    /// Whether the after-effect waits for the next click
    pub fn after_effect_on_next(&self) -> bool {
        self.after_effect_on_next
    }

    /// Enable or disable the after-effect
    pub fn set_has_after_effect(&mut self, has_after_effect: bool) {
        self.has_after_effect = has_after_effect;
    }

    /// Dim to a color instead of hiding
    pub fn set_dim_color(&mut self, dim_color: Option<AnimValue>) {
        self.dim_color = dim_color;
    }

    /// Move the after-effect to the next click
    pub fn set_after_effect_on_next(&mut self, on_next: bool) {
        self.after_effect_on_next = on_next;
    }

    /// Refresh text-derived state: whether the target has text, the
    /// paragraph depth and the iterated duration.
    ///
    /// `levels` is a precomputed numbering level table of the target shape.
    /// Returns whether anything changed.
    pub fn check_for_text(&mut self, tree: &TimingTree, text: &dyn TextSource, levels: Option<&[u32]>) -> bool {
        let mut changed = false;

        match self.target {
            Some(Target::Paragraph(para)) => {
                let levels = match levels {
                    Some(levels) => Some(levels.to_vec()),
                    None => text.numbering_levels(para.shape),
                };
                if let Some(levels) = levels {
                    let has_text = !levels.is_empty();
                    changed |= has_text != self.has_text;
                    self.has_text = has_text;
                    if has_text {
                        let depth = levels.get(para.paragraph as usize).copied().unwrap_or(0);
                        changed |= Some(depth) != self.para_depth;
                        self.para_depth = Some(depth);
                    }
                }
            }
            Some(Target::Shape(shape)) => {
                let has_text = text.has_text(shape);
                changed |= has_text != self.has_text;
                self.has_text = has_text;
            }
            None => {
                changed |= self.has_text;
                self.has_text = false;
            }
        }

        changed | self.calculate_iterate_duration(tree, text)
    }

    /// Recompute the absolute duration of an iterating effect
    fn calculate_iterate_duration(&mut self, tree: &TimingTree, text: &dyn TextSource) -> bool {
        let Some(props) = tree.node(self.node).and_then(|n| n.iterate()) else {
            return false;
        };

        let mut duration = self.duration.unwrap_or(0.0);
        let sub_item_duration = duration;
        if props.sub_item != SubItem::OnlyBackground {
            if let Some(target) = &props.target {
                let count = count_subitems(text, target, props.iterate_type);
                if count > 1 {
                    duration += (count - 1) as f64 * props.interval;
                }
            }
        }
        if props.sub_item == SubItem::AsWhole {
            duration += sub_item_duration;
        }

        let changed = self.absolute_duration != Some(duration);
        self.absolute_duration = Some(duration);
        changed
    }

    /// Retarget the effect and every leaf under it
    pub fn set_target(&mut self, tree: &mut TimingTree, text: &dyn TextSource, target: Target) {
        warn_on_err("Effect::set_target", self.try_set_target(tree, text, target));
    }

    fn try_set_target(&mut self, tree: &mut TimingTree, text: &dyn TextSource, target: Target) -> Result<()> {
        self.target = Some(target);
        let iterating = match tree.get_mut(self.node)?.iterate_mut() {
            Some(props) => {
                props.target = Some(target);
                true
            }
            None => false,
        };
        if !iterating {
            for child in tree.children(self.node).to_vec() {
                let node = tree.get_mut(child)?;
                if let Some(animate) = node.animate_mut() {
                    animate.target = Some(target);
                } else if let Some(command) = node.command_mut() {
                    command.target = Some(target);
                }
            }
        }
        self.check_for_text(tree, text, None);
        Ok(())
    }

    /// Choose which part of the shape is animated
    pub fn set_target_sub_item(&mut self, tree: &mut TimingTree, sub_item: SubItem) {
        warn_on_err("Effect::set_target_sub_item", self.try_set_target_sub_item(tree, sub_item));
    }

    fn try_set_target_sub_item(&mut self, tree: &mut TimingTree, sub_item: SubItem) -> Result<()> {
        self.target_sub_item = sub_item;
        let iterating = match tree.get_mut(self.node)?.iterate_mut() {
            Some(props) => {
                props.sub_item = sub_item;
                true
            }
            None => false,
        };
        if !iterating {
            for child in tree.children(self.node).to_vec() {
                if let Some(animate) = tree.get_mut(child)?.animate_mut() {
                    animate.sub_item = sub_item;
                }
            }
        }
        Ok(())
    }

    /// Change the trigger
    pub fn set_node_type(&mut self, tree: &mut TimingTree, node_type: EffectNodeType) {
        if self.node_type == Some(node_type) {
            return;
        }
        if let Some(node) = warn_on_err("Effect::set_node_type", tree.get_mut(self.node).map_err(SequencerError::from)) {
            node.user_data.node_type = Some(node_type);
            self.node_type = Some(node_type);
        }
    }

    /// Set the preset family and identifier
    pub fn set_preset_class_and_id(&mut self, tree: &mut TimingTree, class: PresetClass, preset_id: &str) {
        if self.preset_class == Some(class) && self.preset_id == preset_id {
            return;
        }
        let result = tree.get_mut(self.node).map_err(SequencerError::from);
        if let Some(node) = warn_on_err("Effect::set_preset_class_and_id", result) {
            node.user_data.preset_class = Some(class);
            node.user_data.preset_id = Some(preset_id.to_string());
            self.preset_class = Some(class);
            self.preset_id = preset_id.to_string();
        }
    }

    /// Assign or clear text group membership
    pub fn set_group_id(&mut self, tree: &mut TimingTree, group_id: Option<GroupId>) {
        self.group_id = group_id;
        let result = tree.get_mut(self.node).map_err(SequencerError::from);
        if let Some(node) = warn_on_err("Effect::set_group_id", result) {
            node.user_data.group_id = group_id;
        }
    }

    /// Set the delay
    pub fn set_begin(&mut self, tree: &mut TimingTree, begin: f64) {
        self.begin = begin;
        let result = tree.get_mut(self.node).map_err(SequencerError::from);
        if let Some(node) = warn_on_err("Effect::set_begin", result) {
            node.timing.begin = Some(TimeValue::Seconds(begin));
        }
    }

    /// Set the acceleration fraction
    pub fn set_acceleration(&mut self, tree: &mut TimingTree, acceleration: f64) {
        self.acceleration = acceleration;
        let result = tree.get_mut(self.node).map_err(SequencerError::from);
        if let Some(node) = warn_on_err("Effect::set_acceleration", result) {
            node.timing.acceleration = acceleration;
        }
    }

    /// Set the deceleration fraction
    pub fn set_decelerate(&mut self, tree: &mut TimingTree, decelerate: f64) {
        self.decelerate = decelerate;
        let result = tree.get_mut(self.node).map_err(SequencerError::from);
        if let Some(node) = warn_on_err("Effect::set_decelerate", result) {
            node.timing.decelerate = decelerate;
        }
    }

    /// Play backwards after playing forwards
    pub fn set_auto_reverse(&mut self, tree: &mut TimingTree, auto_reverse: bool) {
        self.auto_reverse = auto_reverse;
        let result = tree.get_mut(self.node).map_err(SequencerError::from);
        if let Some(node) = warn_on_err("Effect::set_auto_reverse", result) {
            node.timing.auto_reverse = auto_reverse;
        }
    }

    /// Set the fill mode
    pub fn set_fill(&mut self, tree: &mut TimingTree, fill: Fill) {
        self.fill = fill;
        let result = tree.get_mut(self.node).map_err(SequencerError::from);
        if let Some(node) = warn_on_err("Effect::set_fill", result) {
            node.timing.fill = fill;
        }
    }

    /// Repeat count of the effect
    pub fn repeat_count(&self, tree: &TimingTree) -> Option<f64> {
        tree.node(self.node).and_then(|n| n.timing.repeat_count)
    }

    /// Set the repeat count; the absolute duration follows
    pub fn set_repeat_count(&mut self, tree: &mut TimingTree, repeat_count: Option<f64>) {
        let result = tree.get_mut(self.node).map_err(SequencerError::from);
        if let Some(node) = warn_on_err("Effect::set_repeat_count", result) {
            node.timing.repeat_count = repeat_count;
            self.absolute_duration = self.duration.map(|d| d * repeat_count.unwrap_or(1.0));
        }
    }

    /// End condition of the effect
    pub fn end(&self, tree: &TimingTree) -> Option<TimeValue> {
        tree.node(self.node).and_then(|n| n.timing.end)
    }

    /// Set the end condition
    pub fn set_end(&mut self, tree: &mut TimingTree, end: Option<TimeValue>) {
        let result = tree.get_mut(self.node).map_err(SequencerError::from);
        if let Some(node) = warn_on_err("Effect::set_end", result) {
            node.timing.end = end;
        }
    }

    /// Stretch or shrink the effect to a new duration.
    ///
    /// Every child with a nonzero begin or duration is scaled by the ratio
    /// of new to old duration. Nothing happens while the old duration is
    /// unknown.
    pub fn set_duration(&mut self, tree: &mut TimingTree, text: &dyn TextSource, duration: f64) {
        warn_on_err("Effect::set_duration", self.try_set_duration(tree, text, duration));
    }

    fn try_set_duration(&mut self, tree: &mut TimingTree, text: &dyn TextSource, duration: f64) -> Result<()> {
        let Some(old) = self.duration else {
            return Ok(());
        };
        if old == duration {
            return Ok(());
        }
        if old > 0.0 {
            let scale = duration / old;
            for child in tree.children(self.node).to_vec() {
                let timing = &mut tree.get_mut(child)?.timing;
                if let Some(TimeValue::Seconds(begin)) = timing.begin {
                    if begin != 0.0 {
                        timing.begin = Some(TimeValue::Seconds(begin * scale));
                    }
                }
                if let Some(child_duration) = timing.duration {
                    if child_duration != 0.0 {
                        timing.duration = Some(child_duration * scale);
                    }
                }
            }
        }

        self.duration = Some(duration);
        let repeat = self.repeat_count(tree).unwrap_or(1.0);
        self.absolute_duration = Some(duration * repeat);
        self.calculate_iterate_duration(tree, text);
        Ok(())
    }

    /// Switch between iterating and plain effects, or change the granularity.
    ///
    /// Turning iteration on or off swaps the container node; children,
    /// timing and user data move to the new container.
    pub fn set_iterate_type(&mut self, tree: &mut TimingTree, text: &dyn TextSource, iterate_type: Option<IterateType>) {
        warn_on_err("Effect::set_iterate_type", self.try_set_iterate_type(tree, text, iterate_type));
    }

    fn try_set_iterate_type(&mut self, tree: &mut TimingTree, text: &dyn TextSource, iterate_type: Option<IterateType>) -> Result<()> {
        if self.iterate_type == iterate_type {
            return Ok(());
        }

        if self.iterate_type.is_none() || iterate_type.is_none() {
            let old = self.node;
            let kind = match iterate_type {
                Some(t) => NodeKind::Iterate(IterateProps {
                    target: self.target,
                    sub_item: self.target_sub_item,
                    ..IterateProps::new(t)
                }),
                None => NodeKind::Par,
            };
            let (timing, user_data) = {
                let source = tree.get(old)?;
                (source.timing.clone(), source.user_data.clone())
            };
            let container = tree.create(kind);
            {
                let node = tree.get_mut(container)?;
                node.timing = timing;
                node.user_data = user_data;
            }
            for child in tree.children(old).to_vec() {
                tree.append_child(container, child)?;
            }
            tree.replace(old, container)?;
            tree.free(old);
            self.node = container;

            // Leaves of an iterate container take their target from it
            let leaf_target = if iterate_type.is_some() { None } else { self.target };
            for child in tree.children(container).to_vec() {
                if let Some(animate) = tree.get_mut(child)?.animate_mut() {
                    animate.target = leaf_target;
                    animate.sub_item = self.target_sub_item;
                }
            }
        }

        if let (Some(t), Some(props)) = (iterate_type, tree.get_mut(self.node)?.iterate_mut()) {
            props.iterate_type = t;
        }
        self.iterate_type = iterate_type;
        self.check_for_text(tree, text, None);
        Ok(())
    }

    /// Set the delay between iterations
    pub fn set_iterate_interval(&mut self, tree: &mut TimingTree, text: &dyn TextSource, interval: f64) {
        if self.iterate_interval == interval {
            return;
        }
        let result = tree.get_mut(self.node).map_err(SequencerError::from).and_then(|node| {
            let id = node.id;
            node.iterate_mut().ok_or(SequencerError::MissingCapability {
                node: id,
                expected: "an iterate container",
            })
        });
        if let Some(props) = warn_on_err("Effect::set_iterate_interval", result) {
            props.interval = interval;
            self.iterate_interval = interval;
            self.calculate_iterate_duration(tree, text);
        }
    }

    /// Swap the subtree for a new one, carrying over target, timing, audio
    /// and iteration. The old subtree is freed.
    pub fn replace_node(&mut self, tree: &mut TimingTree, text: &dyn TextSource, node: NodeId) {
        warn_on_err("Effect::replace_node", self.try_replace_node(tree, text, node));
    }

    fn try_replace_node(&mut self, tree: &mut TimingTree, text: &dyn TextSource, node: NodeId) -> Result<()> {
        tree.get(node)?;
        let old = self.node;
        let saved = self.clone();

        tree.replace(old, node)?;
        self.node = node;
        self.read_node(tree)?;

        self.set_audio(tree, saved.audio);
        if let Some(node_type) = saved.node_type {
            self.set_node_type(tree, node_type);
        }
        if let Some(target) = saved.target {
            self.set_target(tree, text, target);
        }
        self.set_target_sub_item(tree, saved.target_sub_item);
        if let Some(duration) = saved.duration {
            self.set_duration(tree, text, duration);
        }
        self.set_begin(tree, saved.begin);
        self.set_fill(tree, saved.fill);
        self.set_acceleration(tree, saved.acceleration);
        self.set_decelerate(tree, saved.decelerate);
        self.set_auto_reverse(tree, saved.auto_reverse);
        if saved.iterate_type != self.iterate_type {
            self.set_iterate_type(tree, text, saved.iterate_type);
        }
        if saved.iterate_type.is_some() && saved.iterate_interval != self.iterate_interval {
            self.set_iterate_interval(tree, text, saved.iterate_interval);
        }

        tree.free(old);
        Ok(())
    }

    /// Create the detached dim or hide node that follows this effect.
    ///
    /// It starts when this effect ends, or at 0 in the next click group.
    pub fn create_after_effect_node(&self, tree: &mut TimingTree, duration: f64) -> NodeId {
        let props = match &self.dim_color {
            Some(color) => AnimateProps::new(AnimateKind::AnimateColor, "DimColor").with_to(color.clone()),
            None => AnimateProps::new(AnimateKind::Set, "Visibility").with_to(false),
        };
        let props = AnimateProps {
            target: self.target,
            ..props
        };

        let begin = if self.after_effect_on_next {
            TimeValue::Seconds(0.0)
        } else {
            TimeValue::Event(TimingEvent::from_source(EventSource::Node(self.node), EventTrigger::EndEvent))
        };

        let id = tree.create(NodeKind::Animate(props));
        if let Some(node) = tree.node_mut(id) {
            node.timing.begin = Some(begin);
            node.timing.duration = Some(duration);
            node.timing.fill = Fill::Hold;
        }
        id
    }

    /// Deep copy the subtree into a new detached effect
    pub fn clone_effect(&self, tree: &mut TimingTree, text: &dyn TextSource) -> Result<Effect> {
        let node = tree.deep_clone(self.node)?;
        let mut effect = Self::from_node(tree, node, text)?;
        effect.has_after_effect = self.has_after_effect;
        effect.dim_color = self.dim_color.clone();
        effect.after_effect_on_next = self.after_effect_on_next;
        Ok(effect)
    }

    /// Motion path of the first motion leaf
    pub fn path(&self, tree: &TimingTree) -> Option<String> {
        self.animate_children(tree)
            .find(|props| props.kind == AnimateKind::AnimateMotion)
            .and_then(|props| props.path.clone())
    }

    /// Set the motion path of the first motion leaf
    pub fn set_path(&mut self, tree: &mut TimingTree, path: &str) {
        let motion = tree.children(self.node).iter().copied().find(|child| {
            tree.node(*child)
                .and_then(|n| n.animate())
                .is_some_and(|props| props.kind == AnimateKind::AnimateMotion)
        });
        match motion.and_then(|id| tree.node_mut(id)).and_then(|n| n.animate_mut()) {
            Some(props) => props.path = Some(path.to_string()),
            None => tracing::warn!("Effect::set_path: effect has no motion leaf"),
        }
    }

    /// Read a value of the first leaf of a kind animating an attribute
    pub fn property_value(&self, tree: &TimingTree, kind: AnimateKind, attribute: &str, slot: ValueSlot) -> Option<AnimValue> {
        self.animate_children(tree)
            .find(|props| props.kind == kind && props.attribute_name == attribute)
            .and_then(|props| match slot {
                ValueSlot::To => props.to.clone(),
                ValueSlot::By => props.by.clone(),
            })
    }

    /// Write a value on every leaf of a kind animating an attribute.
    ///
    /// Returns whether any leaf changed.
    pub fn set_property_value(&mut self, tree: &mut TimingTree, kind: AnimateKind, attribute: &str, slot: ValueSlot, value: AnimValue) -> bool {
        self.update_animate_children(tree, |props| {
            if props.kind != kind || props.attribute_name != attribute {
                return false;
            }
            let field = match slot {
                ValueSlot::To => &mut props.to,
                ValueSlot::By => &mut props.by,
            };
            if field.as_ref() == Some(&value) {
                return false;
            }
            *field = Some(value.clone());
            true
        })
    }

    /// Read a color of the effect.
    ///
    /// With keyframes, `index` picks the keyframe; otherwise 0 is the start
    /// color and anything else the end color.
    pub fn color(&self, tree: &TimingTree, index: usize) -> Option<AnimValue> {
        self.animate_children(tree)
            .find(|props| is_color_leaf(props))
            .and_then(|props| {
                if !props.values.is_empty() {
                    props.values.get(index).cloned()
                } else if index == 0 {
                    props.from.clone()
                } else {
                    props.to.clone()
                }
            })
    }

    /// Write a color on every color leaf; returns whether any changed
    pub fn set_color(&mut self, tree: &mut TimingTree, index: usize, color: AnimValue) -> bool {
        self.update_animate_children(tree, |props| {
            if !is_color_leaf(props) {
                return false;
            }
            if !props.values.is_empty() {
                return match props.values.get_mut(index) {
                    Some(existing) if *existing != color => {
                        *existing = color.clone();
                        true
                    }
                    _ => false,
                };
            }
            let field = if index == 0 { &mut props.from } else { &mut props.to };
            if field.as_ref() == Some(&color) {
                return false;
            }
            *field = Some(color.clone());
            true
        })
    }

    /// Read a value of the first transformation leaf of a kind
    pub fn transformation_property(&self, tree: &TimingTree, transform: TransformType, slot: ValueSlot) -> Option<AnimValue> {
        self.animate_children(tree)
            .find(|props| props.kind == AnimateKind::AnimateTransform && props.transform_type == Some(transform))
            .and_then(|props| match slot {
                ValueSlot::To => props.to.clone(),
                ValueSlot::By => props.by.clone(),
            })
    }

    /// Write a value on every transformation leaf of a kind
    pub fn set_transformation_property(&mut self, tree: &mut TimingTree, transform: TransformType, slot: ValueSlot, value: AnimValue) -> bool {
        self.update_animate_children(tree, |props| {
            if props.kind != AnimateKind::AnimateTransform || props.transform_type != Some(transform) {
                return false;
            }
            let field = match slot {
                ValueSlot::To => &mut props.to,
                ValueSlot::By => &mut props.by,
            };
            if field.as_ref() == Some(&value) {
                return false;
            }
            *field = Some(value.clone());
            true
        })
    }

    /// Add a sound to the effect
    pub fn create_audio(&mut self, tree: &mut TimingTree, source: &str, volume: f64) {
        if self.audio.is_some() {
            tracing::warn!("Effect::create_audio: effect already has audio");
            return;
        }
        let audio = tree.create(NodeKind::Audio(AudioProps {
            source: source.to_string(),
            volume,
        }));
        if let Some(node) = tree.node_mut(audio) {
            node.timing.end = Some(TimeValue::Event(TimingEvent::from_source(
                EventSource::Node(self.node),
                EventTrigger::EndEvent,
            )));
        }
        self.set_audio(tree, Some(audio));
    }

    /// Replace the sound of the effect
    pub fn set_audio(&mut self, tree: &mut TimingTree, audio: Option<NodeId>) {
        if self.audio == audio {
            return;
        }
        self.remove_audio(tree);
        self.audio = audio;
        if let Some(audio) = audio {
            if let Err(err) = tree.append_child(self.node, audio) {
                tracing::warn!("Effect::set_audio: {}", err);
                self.audio = None;
            }
        }
    }

    /// Remove the sound or the stop-sound command
    pub fn remove_audio(&mut self, tree: &mut TimingTree) {
        let child = if let Some(audio) = self.audio.take() {
            Some(audio)
        } else if self.command == Some(Command::StopAudio) {
            self.command = None;
            tree.children(self.node).iter().copied().find(|child| {
                tree.node(*child)
                    .and_then(|n| n.command())
                    .is_some_and(|c| c.command == Command::StopAudio)
            })
        } else {
            None
        };
        if let Some(child) = child {
            tree.free(child);
        }
    }

    /// Make the effect stop all sounds instead of playing one
    pub fn set_stop_audio(&mut self, tree: &mut TimingTree) {
        if self.stop_audio() {
            return;
        }
        if self.audio.is_some() {
            self.remove_audio(tree);
        }
        let command = tree.create(NodeKind::Command(CommandProps {
            command: Command::StopAudio,
            target: None,
        }));
        match tree.append_child(self.node, command) {
            Ok(()) => self.command = Some(Command::StopAudio),
            Err(err) => {
                tracing::warn!("Effect::set_stop_audio: {}", err);
                tree.free(command);
            }
        }
    }

    fn animate_children<'a>(&self, tree: &'a TimingTree) -> impl Iterator<Item = &'a AnimateProps> + 'a {
        tree.children(self.node)
            .iter()
            .filter_map(move |child| tree.node(*child).and_then(|n| n.animate()))
    }

    fn update_animate_children(&self, tree: &mut TimingTree, mut update: impl FnMut(&mut AnimateProps) -> bool) -> bool {
        let mut changed = false;
        for child in tree.children(self.node).to_vec() {
            let is_animate = tree.node(child).is_some_and(|n| n.animate().is_some());
            if !is_animate {
                continue;
            }
            if let Some(props) = tree.node_mut(child).and_then(|n| n.animate_mut()) {
                changed |= update(props);
            }
        }
        changed
    }
}

fn is_color_leaf(props: &AnimateProps) -> bool {
    match props.kind {
        AnimateKind::AnimateColor => true,
        AnimateKind::Set | AnimateKind::Animate => COLOR_ATTRIBUTES.contains(&props.attribute_name.as_str()),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preset::PresetLibrary;
    use crate::text::{NoText, SlideText};

    fn fade(tree: &mut TimingTree) -> Effect {
        let library = PresetLibrary::builtin();
        let node = library.get("ooo-entrance-fade-in").unwrap().create(tree, "");
        Effect::from_node(tree, node, &NoText).unwrap()
    }

    #[test]
    fn test_parse_duration() {
        let mut tree = TimingTree::new();
        let effect = fade(&mut tree);
        assert_eq!(effect.node_type(), Some(EffectNodeType::OnClick));
        assert_eq!(effect.preset_id(), "ooo-entrance-fade-in");
        assert_eq!(effect.preset_class(), Some(PresetClass::Entrance));
        assert_eq!(effect.duration(), Some(0.5));
        assert_eq!(effect.absolute_duration(), Some(0.5));
        assert_eq!(effect.target(), None);
    }

    #[test]
    fn test_audio_does_not_count_towards_duration() {
        let mut tree = TimingTree::new();
        let mut effect = fade(&mut tree);
        effect.create_audio(&mut tree, "applause.wav", 1.0);
        if let Some(audio) = effect.audio().and_then(|a| tree.node_mut(a)) {
            audio.timing.duration = Some(10.0);
        }

        let reparsed = Effect::from_node(&tree, effect.node(), &NoText).unwrap();
        assert_eq!(reparsed.duration(), Some(0.5));
        assert_eq!(reparsed.audio(), effect.audio());
    }

    #[test]
    fn test_set_duration_scales_children() {
        let mut tree = TimingTree::new();
        let mut effect = fade(&mut tree);
        effect.set_duration(&mut tree, &NoText, 2.0);

        assert_eq!(effect.duration(), Some(2.0));
        let durations: Vec<f64> = tree
            .children(effect.node())
            .iter()
            .filter_map(|c| tree.node(*c).and_then(|n| n.timing.duration))
            .collect();
        // 0.001 * 4 and 0.5 * 4
        assert_eq!(durations, vec![0.004, 2.0]);
    }

    #[test]
    fn test_set_duration_without_known_duration_is_ignored() {
        let mut tree = TimingTree::new();
        let node = tree.create(NodeKind::Par);
        let mut effect = Effect::from_node(&tree, node, &NoText).unwrap();
        assert_eq!(effect.duration(), None);
        effect.set_duration(&mut tree, &NoText, 3.0);
        assert_eq!(effect.duration(), None);
    }

    #[test]
    fn test_repeat_count_multiplies_duration() {
        let mut tree = TimingTree::new();
        let mut effect = fade(&mut tree);
        effect.set_repeat_count(&mut tree, Some(3.0));
        assert_eq!(effect.absolute_duration(), Some(1.5));
        assert_eq!(effect.repeat_count(&tree), Some(3.0));
    }

    #[test]
    fn test_set_target_reaches_leaves() {
        let mut tree = TimingTree::new();
        let text = SlideText::new();
        let shape = ShapeId::new();
        text.set_text(shape, "Hello");
        let mut effect = fade(&mut tree);

        effect.set_target(&mut tree, &text, Target::Shape(shape));
        assert!(effect.has_text());
        for child in tree.children(effect.node()) {
            let props = tree.node(*child).unwrap().animate().unwrap();
            assert_eq!(props.target, Some(Target::Shape(shape)));
        }

        effect.set_target_sub_item(&mut tree, SubItem::OnlyText);
        let reparsed = Effect::from_node(&tree, effect.node(), &text).unwrap();
        assert_eq!(reparsed.target(), Some(Target::Shape(shape)));
        assert_eq!(reparsed.target_sub_item(), SubItem::OnlyText);
    }

    #[test]
    fn test_paragraph_depth() {
        let mut tree = TimingTree::new();
        let text = SlideText::new();
        let shape = ShapeId::new();
        text.set_paragraphs(
            shape,
            vec![
                crate::text::Paragraph::new("Top"),
                crate::text::Paragraph::with_level("Sub", 2),
            ],
        );
        let mut effect = fade(&mut tree);
        effect.set_target(&mut tree, &text, Target::paragraph(shape, 1));
        assert_eq!(effect.para_depth(), Some(2));
        assert!(effect.has_text());

        // A level table passed in wins over the text source
        assert!(effect.check_for_text(&tree, &text, Some(&[0, 4][..])));
        assert_eq!(effect.para_depth(), Some(4));
        assert!(!effect.check_for_text(&tree, &text, Some(&[0, 4][..])));
    }

    #[test]
    fn test_iterate_duration() {
        let mut tree = TimingTree::new();
        let text = SlideText::new();
        let shape = ShapeId::new();
        text.set_text(shape, "abcd");
        let mut effect = fade(&mut tree);
        effect.set_target(&mut tree, &text, Target::Shape(shape));

        effect.set_iterate_type(&mut tree, &text, Some(IterateType::ByLetter));
        assert!(tree.node(effect.node()).unwrap().iterate().is_some());
        effect.set_iterate_interval(&mut tree, &text, 0.1);

        // 0.5 + 3 * 0.1 for the letters, plus 0.5 for the whole shape
        let expected = 0.5 + 3.0 * 0.1 + 0.5;
        assert!((effect.absolute_duration().unwrap() - expected).abs() < 1e-9);

        effect.set_target_sub_item(&mut tree, SubItem::OnlyBackground);
        effect.check_for_text(&tree, &text, None);
        assert_eq!(effect.absolute_duration(), Some(0.5));
    }

    #[test]
    fn test_iterate_type_swaps_container() {
        let mut tree = TimingTree::new();
        let with_group = tree.create(NodeKind::Par);
        let mut effect = fade(&mut tree);
        tree.append_child(with_group, effect.node()).unwrap();
        let old = effect.node();

        effect.set_iterate_type(&mut tree, &NoText, Some(IterateType::ByWord));
        let container = effect.node();
        assert_ne!(container, old);
        assert!(!tree.contains(old));
        assert_eq!(tree.children(with_group), &[container]);
        assert_eq!(tree.children(container).len(), 2);
        assert_eq!(tree.node(container).unwrap().node_type(), Some(EffectNodeType::OnClick));

        effect.set_iterate_type(&mut tree, &NoText, Some(IterateType::ByLetter));
        assert_eq!(effect.node(), container);
        assert_eq!(tree.node(container).unwrap().iterate().unwrap().iterate_type, IterateType::ByLetter);

        effect.set_iterate_type(&mut tree, &NoText, None);
        assert!(matches!(tree.node(effect.node()).unwrap().kind, NodeKind::Par));
        assert_eq!(effect.iterate_type(), None);
    }

    #[test]
    fn test_iterate_interval_needs_iterate_container() {
        let mut tree = TimingTree::new();
        let mut effect = fade(&mut tree);
        effect.set_iterate_interval(&mut tree, &NoText, 0.3);
        assert_eq!(effect.iterate_interval(), 0.0);
    }

    #[test]
    fn test_replace_node_keeps_settings() {
        let mut tree = TimingTree::new();
        let library = PresetLibrary::builtin();
        let shape = ShapeId::new();
        let with_group = tree.create(NodeKind::Par);
        let mut effect = fade(&mut tree);
        tree.append_child(with_group, effect.node()).unwrap();
        effect.set_target(&mut tree, &NoText, Target::Shape(shape));
        effect.set_node_type(&mut tree, EffectNodeType::WithPrevious);
        effect.set_begin(&mut tree, 1.5);
        effect.set_duration(&mut tree, &NoText, 3.0);
        effect.create_audio(&mut tree, "bell.wav", 0.5);
        let audio = effect.audio();
        let old = effect.node();

        let node = library.get("ooo-emphasis-spin").unwrap().create(&mut tree, "");
        effect.replace_node(&mut tree, &NoText, node);

        assert_eq!(effect.node(), node);
        assert!(!tree.contains(old));
        assert_eq!(tree.children(with_group), &[node]);
        assert_eq!(effect.preset_id(), "ooo-emphasis-spin");
        assert_eq!(effect.node_type(), Some(EffectNodeType::WithPrevious));
        assert_eq!(effect.begin(), 1.5);
        assert_eq!(effect.duration(), Some(3.0));
        assert_eq!(effect.target(), Some(Target::Shape(shape)));
        assert_eq!(effect.audio(), audio);
        assert_eq!(tree.parent(audio.unwrap()), Some(node));
    }

    #[test]
    fn test_after_effect_node() {
        let mut tree = TimingTree::new();
        let shape = ShapeId::new();
        let mut effect = fade(&mut tree);
        effect.set_target(&mut tree, &NoText, Target::Shape(shape));

        let hide = effect.create_after_effect_node(&mut tree, 0.001);
        let node = tree.node(hide).unwrap();
        let props = node.animate().unwrap();
        assert_eq!(props.kind, AnimateKind::Set);
        assert_eq!(props.attribute_name, "Visibility");
        assert_eq!(props.to, Some(AnimValue::Bool(false)));
        assert_eq!(props.target, Some(Target::Shape(shape)));
        assert_eq!(node.timing.fill, Fill::Hold);
        assert_eq!(node.timing.duration, Some(0.001));
        let begin = node.timing.begin.unwrap();
        let event = begin.as_event().unwrap();
        assert_eq!(event.trigger, EventTrigger::EndEvent);
        assert_eq!(event.source, Some(EventSource::Node(effect.node())));

        effect.set_dim_color(Some(AnimValue::Color(0x808080)));
        effect.set_after_effect_on_next(true);
        let dim = effect.create_after_effect_node(&mut tree, 0.001);
        let node = tree.node(dim).unwrap();
        let props = node.animate().unwrap();
        assert_eq!(props.kind, AnimateKind::AnimateColor);
        assert_eq!(props.attribute_name, "DimColor");
        assert_eq!(props.to, Some(AnimValue::Color(0x808080)));
        assert_eq!(node.begin_seconds(), Some(0.0));
    }

    #[test]
    fn test_clone_effect_is_independent() {
        let mut tree = TimingTree::new();
        let mut effect = fade(&mut tree);
        effect.set_has_after_effect(true);
        let copy = effect.clone_effect(&mut tree, &NoText).unwrap();

        assert_ne!(copy.id(), effect.id());
        assert_ne!(copy.node(), effect.node());
        assert!(copy.has_after_effect());
        assert_eq!(copy.duration(), effect.duration());
        assert_eq!(tree.parent(copy.node()), None);
    }

    #[test]
    fn test_colors_and_properties() {
        let mut tree = TimingTree::new();
        let library = PresetLibrary::builtin();
        let node = library.get("ooo-emphasis-fill-color").unwrap().create(&mut tree, "");
        let mut effect = Effect::from_node(&tree, node, &NoText).unwrap();

        assert_eq!(effect.color(&tree, 1), Some(AnimValue::Color(0xff0000)));
        assert_eq!(effect.color(&tree, 0), None);
        assert!(effect.set_color(&mut tree, 1, AnimValue::Color(0x00ff00)));
        assert!(!effect.set_color(&mut tree, 1, AnimValue::Color(0x00ff00)));
        assert_eq!(effect.color(&tree, 1), Some(AnimValue::Color(0x00ff00)));

        let fill = effect.property_value(&tree, AnimateKind::AnimateColor, "FillColor", ValueSlot::To);
        assert_eq!(fill, Some(AnimValue::Color(0x00ff00)));
        assert!(!effect.set_property_value(&mut tree, AnimateKind::Set, "FillColor", ValueSlot::To, AnimValue::Color(1)));
    }

    #[test]
    fn test_transformation_property() {
        let mut tree = TimingTree::new();
        let library = PresetLibrary::builtin();
        let node = library.get("ooo-emphasis-spin").unwrap().create(&mut tree, "");
        let mut effect = Effect::from_node(&tree, node, &NoText).unwrap();

        let by = effect.transformation_property(&tree, TransformType::Rotate, ValueSlot::By);
        assert_eq!(by, Some(AnimValue::Number(360.0)));
        assert!(effect.set_transformation_property(&mut tree, TransformType::Rotate, ValueSlot::By, AnimValue::Number(-90.0)));
        assert_eq!(
            effect.transformation_property(&tree, TransformType::Rotate, ValueSlot::By),
            Some(AnimValue::Number(-90.0))
        );
        assert_eq!(effect.transformation_property(&tree, TransformType::Scale, ValueSlot::By), None);
    }

    #[test]
    fn test_stop_audio_replaces_sound() {
        let mut tree = TimingTree::new();
        let mut effect = fade(&mut tree);
        effect.create_audio(&mut tree, "drum.wav", 1.0);
        let audio = effect.audio().unwrap();

        effect.set_stop_audio(&mut tree);
        assert!(effect.stop_audio());
        assert_eq!(effect.audio(), None);
        assert!(!tree.contains(audio));

        effect.remove_audio(&mut tree);
        assert!(!effect.stop_audio());
        assert_eq!(tree.children(effect.node()).len(), 2);
    }

    #[test]
    fn test_path() {
        let mut tree = TimingTree::new();
        let container = tree.create(NodeKind::Par);
        let motion = tree.create(NodeKind::Animate(
            AnimateProps::new(AnimateKind::AnimateMotion, "").with_path("M 0 0 L 1 1"),
        ));
        tree.append_child(container, motion).unwrap();
        let mut effect = Effect::from_node(&tree, container, &NoText).unwrap();

        assert_eq!(effect.path(&tree).as_deref(), Some("M 0 0 L 1 1"));
        effect.set_path(&mut tree, "M 0 0 L 0 1");
        assert_eq!(effect.path(&tree).as_deref(), Some("M 0 0 L 0 1"));
    }
}
