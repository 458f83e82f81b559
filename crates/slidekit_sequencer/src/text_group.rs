// SPDX-License-Identifier: MIT OR Apache-2.0
//! Text groups: one animation applied paragraph by paragraph.

use crate::effect::{Effect, EffectId};
use slidekit_timing::{EffectNodeType, GroupId, ShapeId, SubItem, Target};

/// Deepest outline level that takes part in grouping
pub const PARA_LEVELS: usize = 5;

/// What the members at one outline level agree on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DepthFlag {
    /// No member at this level yet
    #[default]
    Unset,
    /// All members at this level share a trigger
    Uniform(EffectNodeType),
    /// Members disagree
    Mixed,
}

impl DepthFlag {
    fn triggers(self) -> bool {
        matches!(self, Self::Uniform(t) if t != EffectNodeType::Default)
    }
}

/// Effects that animate the paragraphs of one shape as a unit
#[derive(Debug, Clone)]
pub struct TextGroup {
    target: ShapeId,
    group_id: GroupId,
    effects: Vec<EffectId>,
    text_grouping: Option<u32>,
    animate_form: bool,
    text_reverse: bool,
    grouping_auto: Option<f64>,
    last_paragraph: Option<u32>,
    depth_flags: [DepthFlag; PARA_LEVELS],
}

impl TextGroup {
    /// Create an empty group
    pub fn new(target: ShapeId, group_id: GroupId) -> Self {
        Self {
            target,
            group_id,
            effects: Vec::new(),
            text_grouping: None,
            animate_form: false,
            text_reverse: false,
            grouping_auto: None,
            last_paragraph: None,
            depth_flags: [DepthFlag::Unset; PARA_LEVELS],
        }
    }

    /// Shape whose text is grouped
    pub fn target(&self) -> ShapeId {
        self.target
    }

    /// Group ID, unique within the sequence
    pub fn group_id(&self) -> GroupId {
        self.group_id
    }

    /// Members in sequence order
    pub fn effects(&self) -> &[EffectId] {
        &self.effects
    }

    /// Outline levels that start on their own trigger; `None` means the
    /// text is not split into paragraphs
    pub fn text_grouping(&self) -> Option<u32> {
        self.text_grouping
    }

    /// Whether the shape itself is animated too
    pub fn animate_form(&self) -> bool {
        self.animate_form
    }

    /// Whether paragraphs run last to first
    pub fn text_reverse(&self) -> bool {
        self.text_reverse
    }

    /// Automatic delay between paragraphs; `None` means click to advance
    pub fn grouping_auto(&self) -> Option<f64> {
        self.grouping_auto
    }

    /// Trigger agreement at an outline level
    pub fn depth_flag(&self, level: usize) -> DepthFlag {
        self.depth_flags.get(level).copied().unwrap_or_default()
    }

    pub(crate) fn set_text_grouping(&mut self, text_grouping: Option<u32>) {
        self.text_grouping = text_grouping;
    }

    pub(crate) fn set_grouping_auto(&mut self, grouping_auto: Option<f64>) {
        self.grouping_auto = grouping_auto;
    }

    pub(crate) fn set_text_reverse(&mut self, text_reverse: bool) {
        self.text_reverse = text_reverse;
    }

    /// Add a member and refine the inferred grouping settings
    pub fn add_effect(&mut self, effect: &Effect) {
        self.effects.push(effect.id());

        match effect.target() {
            Some(Target::Paragraph(para)) => {
                if let Some(last) = self.last_paragraph {
                    self.text_reverse = last > para.paragraph;
                }
                self.last_paragraph = Some(para.paragraph);

                let Some(depth) = effect.para_depth().map(|d| d as usize) else {
                    return;
                };
                if depth >= PARA_LEVELS {
                    return;
                }

                let node_type = effect.node_type().unwrap_or(EffectNodeType::Default);
                self.depth_flags[depth] = match self.depth_flags[depth] {
                    DepthFlag::Unset => DepthFlag::Uniform(node_type),
                    DepthFlag::Uniform(t) if t == node_type => DepthFlag::Uniform(t),
                    _ => DepthFlag::Mixed,
                };
                if node_type == EffectNodeType::AfterPrevious {
                    self.grouping_auto = Some(effect.begin());
                }

                let mut grouping = PARA_LEVELS;
                while grouping > 0 && !self.depth_flags[grouping - 1].triggers() {
                    grouping -= 1;
                }
                self.text_grouping = Some(grouping as u32);
            }
            _ => {
                self.animate_form = effect.target_sub_item() != SubItem::OnlyText;
            }
        }
    }

    /// Drop levels at the end whose members all start with the previous one
    pub(crate) fn trim_trailing_with_previous(&mut self) {
        let Some(mut grouping) = self.text_grouping else {
            return;
        };
        while grouping > 0
            && self.depth_flags[grouping as usize - 1] == DepthFlag::Uniform(EffectNodeType::WithPrevious)
        {
            grouping -= 1;
        }
        self.text_grouping = Some(grouping);
    }

    /// Forget all members and inferred settings
    pub fn reset(&mut self) {
        self.effects.clear();
        self.text_grouping = None;
        self.animate_form = false;
        self.text_reverse = false;
        self.grouping_auto = None;
        self.last_paragraph = None;
        self.depth_flags = [DepthFlag::Unset; PARA_LEVELS];
    }
}

/// Trigger and delay of a paragraph effect at `depth`.
///
/// Paragraphs above the grouping level start on their own: on click, or
/// after the previous one when an automatic delay is set. Deeper paragraphs
/// start with the previous one. An unknown depth counts as top level.
pub(crate) fn paragraph_trigger(depth: Option<u32>, grouping: Option<u32>, auto: Option<f64>) -> (EffectNodeType, f64) {
    let starts_group = grouping.is_some_and(|g| depth.map_or(true, |d| d < g));
    match (starts_group, auto) {
        (true, Some(delay)) => (EffectNodeType::AfterPrevious, delay),
        (true, None) => (EffectNodeType::OnClick, 0.0),
        (false, _) => (EffectNodeType::WithPrevious, 0.0),
    }
}
