// SPDX-License-Identifier: MIT OR Apache-2.0
//! Effect presets: named templates that create effect subtrees.

use indexmap::IndexMap;
use slidekit_timing::{
    AnimValue, AnimateKind, AnimateProps, EffectNodeType, Fill, NodeId, NodeKind, PresetClass,
    TimeValue, TimingTree, TransformType,
};

/// One animate leaf of a preset
#[derive(Debug, Clone, PartialEq)]
pub struct AnimationTemplate {
    /// Leaf attributes
    pub props: AnimateProps,
    /// Offset inside the effect, in seconds
    pub begin: f64,
    /// Duration in seconds
    pub duration: f64,
}

impl AnimationTemplate {
    /// Create a template starting with the effect
    pub fn new(props: AnimateProps, duration: f64) -> Self {
        Self {
            props,
            begin: 0.0,
            duration,
        }
    }

    /// Delay the leaf inside the effect
    pub fn starting_at(mut self, begin: f64) -> Self {
        self.begin = begin;
        self
    }
}

/// A named effect template
#[derive(Debug, Clone, PartialEq)]
pub struct EffectPreset {
    /// Preset identifier, e.g. `ooo-entrance-fade-in`
    pub id: String,
    /// Preset family
    pub class: PresetClass,
    /// Display label
    pub label: String,
    /// Property the UI offers for editing
    pub property: Option<String>,
    /// Preset only makes sense on text
    pub text_only: bool,
    /// Leaves per variant; the empty key is the default variant
    variants: IndexMap<String, Vec<AnimationTemplate>>,
}

impl EffectPreset {
    /// Create a preset without variants
    pub fn new(id: impl Into<String>, class: PresetClass, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            class,
            label: label.into(),
            property: None,
            text_only: false,
            variants: IndexMap::new(),
        }
    }

    /// Add a variant
    pub fn with_variant(mut self, sub_type: impl Into<String>, leaves: Vec<AnimationTemplate>) -> Self {
        self.variants.insert(sub_type.into(), leaves);
        self
    }

    /// Set the editable property
    pub fn with_property(mut self, property: impl Into<String>) -> Self {
        self.property = Some(property.into());
        self
    }

    /// Mark the preset as text-only
    pub fn text_only(mut self) -> Self {
        self.text_only = true;
        self
    }

    /// Names of all variants
    pub fn sub_types(&self) -> impl Iterator<Item = &str> {
        self.variants.keys().map(String::as_str)
    }

    /// Longest end time over all leaves of a variant
    pub fn duration(&self, sub_type: &str) -> f64 {
        self.leaves(sub_type)
            .map(|leaves| leaves.iter().map(|l| l.begin + l.duration).fold(0.0, f64::max))
            .unwrap_or(0.0)
    }

    fn leaves(&self, sub_type: &str) -> Option<&Vec<AnimationTemplate>> {
        self.variants
            .get(sub_type)
            .or_else(|| self.variants.first().map(|(_, leaves)| leaves))
    }

    /// Create a detached effect subtree for a variant.
    ///
    /// Unknown variants fall back to the first one. The node is a click
    /// effect starting at 0 that holds its end state.
    pub fn create(&self, tree: &mut TimingTree, sub_type: &str) -> NodeId {
        let container = tree.create(NodeKind::Par);
        if let Some(node) = tree.node_mut(container) {
            node.timing.begin = Some(TimeValue::Seconds(0.0));
            node.timing.fill = Fill::Hold;
            node.user_data.node_type = Some(EffectNodeType::OnClick);
            node.user_data.preset_id = Some(self.id.clone());
            node.user_data.preset_class = Some(self.class);
            node.user_data.preset_property = self.property.clone();
            if self.variants.contains_key(sub_type) && !sub_type.is_empty() {
                node.user_data.preset_sub_type = Some(sub_type.to_string());
            }
        }

        for template in self.leaves(sub_type).into_iter().flatten() {
            let leaf = tree.create(NodeKind::Animate(template.props.clone()));
            if let Some(node) = tree.node_mut(leaf) {
                node.timing.begin = Some(TimeValue::Seconds(template.begin));
                node.timing.duration = Some(template.duration);
                node.timing.fill = Fill::Hold;
            }
            if let Err(err) = tree.append_child(container, leaf) {
                tracing::warn!("Preset {}: {}", self.id, err);
            }
        }
        container
    }
}

/// Registry of known presets
#[derive(Debug, Clone, Default)]
pub struct PresetLibrary {
    presets: IndexMap<String, EffectPreset>,
}

impl PresetLibrary {
    /// Create an empty library
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a library holding the built-in presets
    pub fn builtin() -> Self {
        let mut library = Self::new();
        for preset in builtin_presets() {
            library.register(preset);
        }
        library
    }

    /// Add or replace a preset
    pub fn register(&mut self, preset: EffectPreset) {
        self.presets.insert(preset.id.clone(), preset);
    }

    /// Look up a preset
    pub fn get(&self, id: &str) -> Option<&EffectPreset> {
        self.presets.get(id)
    }

    /// All presets of a family
    pub fn by_class(&self, class: PresetClass) -> impl Iterator<Item = &EffectPreset> {
        self.presets.values().filter(move |p| p.class == class)
    }

    /// Number of presets
    pub fn len(&self) -> usize {
        self.presets.len()
    }

    /// Whether the library is empty
    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }
}

fn show() -> AnimationTemplate {
    AnimationTemplate::new(AnimateProps::new(AnimateKind::Set, "Visibility").with_to(true), 0.001)
}

fn fly_in(attribute: &str, from: &str, duration: f64) -> Vec<AnimationTemplate> {
    let axis = if attribute == "X" { "x" } else { "y" };
    vec![
        show(),
        AnimationTemplate::new(
            AnimateProps::new(AnimateKind::Animate, attribute)
                .with_values(vec![AnimValue::Text(from.to_string()), AnimValue::Text(format!("#ppt_{axis}"))]),
            duration,
        ),
    ]
}

/// Reveal by shrinking the clip inset on one side
fn wipe(edge: &str) -> Vec<AnimationTemplate> {
    vec![
        show(),
        AnimationTemplate::new(AnimateProps::new(AnimateKind::Animate, edge).with_from(1.0).with_to(0.0), 0.5),
    ]
}

fn builtin_presets() -> Vec<EffectPreset> {
    vec![
        EffectPreset::new("ooo-entrance-appear", PresetClass::Entrance, "Appear")
            .with_variant("", vec![show()]),
        EffectPreset::new("ooo-entrance-fade-in", PresetClass::Entrance, "Fade In").with_variant(
            "",
            vec![
                show(),
                AnimationTemplate::new(
                    AnimateProps::new(AnimateKind::Animate, "Opacity").with_from(0.0).with_to(1.0),
                    0.5,
                ),
            ],
        ),
        EffectPreset::new("ooo-entrance-fly-in", PresetClass::Entrance, "Fly In")
            .with_property("Direction")
            .with_variant("from-bottom", fly_in("Y", "1+ppt_h/2", 0.5))
            .with_variant("from-left", fly_in("X", "0-ppt_w/2", 0.5))
            .with_variant("from-right", fly_in("X", "1+ppt_w/2", 0.5))
            .with_variant("from-top", fly_in("Y", "0-ppt_h/2", 0.5)),
        EffectPreset::new("ooo-entrance-wipe", PresetClass::Entrance, "Wipe")
            .with_property("Direction")
            .with_variant("from-bottom", wipe("ClipTop"))
            .with_variant("from-left", wipe("ClipRight"))
            .with_variant("from-right", wipe("ClipLeft"))
            .with_variant("from-top", wipe("ClipBottom")),
        EffectPreset::new("ooo-entrance-zoom", PresetClass::Entrance, "Zoom").with_variant(
            "in",
            vec![
                show(),
                AnimationTemplate::new(
                    AnimateProps::new(AnimateKind::Animate, "Width").with_from(0.0).with_to(1.0),
                    0.5,
                ),
                AnimationTemplate::new(
                    AnimateProps::new(AnimateKind::Animate, "Height").with_from(0.0).with_to(1.0),
                    0.5,
                ),
            ],
        ),
        EffectPreset::new("ooo-entrance-typewriter", PresetClass::Entrance, "Typewriter")
            .text_only()
            .with_variant("", vec![show()]),
        EffectPreset::new("ooo-emphasis-spin", PresetClass::Emphasis, "Spin")
            .with_property("Spin")
            .with_variant(
                "",
                vec![AnimationTemplate::new(
                    AnimateProps::new(AnimateKind::AnimateTransform, "Rotate")
                        .with_transform(TransformType::Rotate)
                        .with_by(360.0),
                    2.0,
                )],
            ),
        EffectPreset::new("ooo-emphasis-transparency", PresetClass::Emphasis, "Transparency")
            .with_property("Transparency")
            .with_variant(
                "",
                vec![AnimationTemplate::new(
                    AnimateProps::new(AnimateKind::Set, "Opacity").with_to(0.5),
                    1.0,
                )],
            ),
        EffectPreset::new("ooo-emphasis-fill-color", PresetClass::Emphasis, "Change Fill Color")
            .with_property("FillColor")
            .with_variant(
                "",
                vec![AnimationTemplate::new(
                    AnimateProps::new(AnimateKind::AnimateColor, "FillColor").with_to(AnimValue::Color(0xff0000)),
                    2.0,
                )],
            ),
        EffectPreset::new("ooo-exit-disappear", PresetClass::Exit, "Disappear").with_variant(
            "",
            vec![AnimationTemplate::new(
                AnimateProps::new(AnimateKind::Set, "Visibility").with_to(false),
                0.001,
            )],
        ),
    ]
}
