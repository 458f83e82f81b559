// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node definitions for the timing tree.

use crate::target::{ShapeId, Target};
use crate::value::AnimValue;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a timing node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub Uuid);

impl NodeId {
    /// Create a new random node ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

/// Role of a node inside an effect sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EffectNodeType {
    /// No special role
    Default,
    /// Starts on the next click
    OnClick,
    /// Starts together with the previous effect
    WithPrevious,
    /// Starts when the previous effect ends
    AfterPrevious,
    /// Root of the main sequence
    MainSequence,
    /// Root of the slide's timing
    TimingRoot,
    /// Root of a sequence triggered by clicking a shape
    InteractiveSequence,
}

/// Preset family of an effect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PresetClass {
    /// User defined
    Custom,
    /// Entrance
    Entrance,
    /// Exit
    Exit,
    /// Emphasis
    Emphasis,
    /// Motion path
    MotionPath,
    /// OLE verb
    OleAction,
    /// Media call
    MediaCall,
}

/// Identifier of a text group inside one sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupId(pub u32);

/// How an iterate container walks its target text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IterateType {
    /// One iteration per paragraph
    ByParagraph,
    /// One iteration per word
    ByWord,
    /// One iteration per character
    ByLetter,
}

/// Which part of a shape an animation affects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SubItem {
    /// Background and text together
    #[default]
    AsWhole,
    /// Only the background
    OnlyBackground,
    /// Only the text
    OnlyText,
}

/// Fill behaviour after the active duration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Fill {
    /// Inherit from the default
    #[default]
    Default,
    /// Remove the effect
    Remove,
    /// Freeze the last value
    Freeze,
    /// Hold until the parent ends
    Hold,
    /// Hold until the next transition
    Transition,
    /// Decide automatically
    Auto,
    /// Inherit from the parent
    Inherit,
}

/// Restart policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Restart {
    /// Inherit from the default
    #[default]
    Default,
    /// May restart at any time
    Always,
    /// May restart only when not active
    WhenNotActive,
    /// Never restarts
    Never,
    /// Inherit from the parent
    Inherit,
}

/// End synchronisation of a container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EndSync {
    /// Ends with the first child
    First,
    /// Ends with the last child
    Last,
    /// Ends when all children ended
    All,
}

/// Event kind a node may wait for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventTrigger {
    /// Click on the event source
    OnClick,
    /// Next-effect advance (click, key, remote)
    OnNext,
    /// Previous-effect request
    OnPrev,
    /// Source node began
    BeginEvent,
    /// Source node ended
    EndEvent,
    /// Audio was stopped
    OnStopAudio,
}

/// Origin of an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventSource {
    /// A shape on the slide
    Shape(ShapeId),
    /// Another timing node
    Node(NodeId),
}

/// A symbolic begin or end condition
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimingEvent {
    /// Where the event comes from; `None` means the presentation itself
    pub source: Option<EventSource>,
    /// What happens
    pub trigger: EventTrigger,
    /// Repeat iteration the event refers to
    pub repeat: u32,
}

impl TimingEvent {
    /// Create an event without a source
    pub fn new(trigger: EventTrigger) -> Self {
        Self { source: None, trigger, repeat: 0 }
    }

    /// Create an event fired by a given source
    pub fn from_source(source: EventSource, trigger: EventTrigger) -> Self {
        Self { source: Some(source), trigger, repeat: 0 }
    }
}

/// A begin or end value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TimeValue {
    /// Offset in seconds
    Seconds(f64),
    /// Wait for an event
    Event(TimingEvent),
    /// Never, unless started explicitly
    Indefinite,
}

impl TimeValue {
    /// Get the offset in seconds, if this is a fixed time
    pub fn as_seconds(&self) -> Option<f64> {
        match self {
            Self::Seconds(s) => Some(*s),
            _ => None,
        }
    }

    /// Get the event, if this is an event condition
    pub fn as_event(&self) -> Option<&TimingEvent> {
        match self {
            Self::Event(e) => Some(e),
            _ => None,
        }
    }
}

/// Timing attributes shared by every node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timing {
    /// Begin condition
    pub begin: Option<TimeValue>,
    /// Simple duration in seconds
    pub duration: Option<f64>,
    /// End condition
    pub end: Option<TimeValue>,
    /// End synchronisation
    pub end_sync: Option<EndSync>,
    /// Repeat count
    pub repeat_count: Option<f64>,
    /// Total repeat duration
    pub repeat_duration: Option<f64>,
    /// Fill mode
    pub fill: Fill,
    /// Default fill mode for children
    pub fill_default: Fill,
    /// Restart policy
    pub restart: Restart,
    /// Default restart policy for children
    pub restart_default: Restart,
    /// Acceleration fraction
    pub acceleration: f64,
    /// Deceleration fraction
    pub decelerate: f64,
    /// Play backwards after playing forwards
    pub auto_reverse: bool,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            begin: None,
            duration: None,
            end: None,
            end_sync: None,
            repeat_count: None,
            repeat_duration: None,
            fill: Fill::Default,
            fill_default: Fill::Default,
            restart: Restart::Default,
            restart_default: Restart::Default,
            acceleration: 0.0,
            decelerate: 0.0,
            auto_reverse: false,
        }
    }
}

/// Sequencer bookkeeping stored on a node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserData {
    /// Role inside a sequence
    pub node_type: Option<EffectNodeType>,
    /// Preset identifier
    pub preset_id: Option<String>,
    /// Preset variant
    pub preset_sub_type: Option<String>,
    /// Preset family
    pub preset_class: Option<PresetClass>,
    /// Preset property the UI edits
    pub preset_property: Option<String>,
    /// Text group membership
    pub group_id: Option<GroupId>,
    /// Effect node an after-effect belongs to
    pub master_element: Option<NodeId>,
}

/// Iterate container attributes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterateProps {
    /// Iteration granularity
    pub iterate_type: IterateType,
    /// Delay between iterations
    pub interval: f64,
    /// Text being iterated
    pub target: Option<Target>,
    /// Part of the shape being iterated
    pub sub_item: SubItem,
}

impl IterateProps {
    /// Create iterate properties
    pub fn new(iterate_type: IterateType) -> Self {
        Self {
            iterate_type,
            interval: 0.0,
            target: None,
            sub_item: SubItem::AsWhole,
        }
    }
}

/// Kind of animate leaf
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnimateKind {
    /// Interpolating attribute animation
    Animate,
    /// Discrete set
    Set,
    /// Color animation
    AnimateColor,
    /// Motion along a path
    AnimateMotion,
    /// Transformation
    AnimateTransform,
}

/// Transformation applied by an animate-transform node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransformType {
    /// Translation
    Translate,
    /// Scaling
    Scale,
    /// Rotation
    Rotate,
    /// Horizontal skew
    SkewX,
    /// Vertical skew
    SkewY,
}

/// Animate leaf attributes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimateProps {
    /// Kind of animation
    pub kind: AnimateKind,
    /// Animated element
    pub target: Option<Target>,
    /// Part of the shape that is animated
    pub sub_item: SubItem,
    /// Animated attribute
    pub attribute_name: String,
    /// Start value
    pub from: Option<AnimValue>,
    /// End value
    pub to: Option<AnimValue>,
    /// Relative change
    pub by: Option<AnimValue>,
    /// Keyframe values
    pub values: Vec<AnimValue>,
    /// Keyframe times
    pub key_times: Vec<f64>,
    /// Motion path in SVG path syntax
    pub path: Option<String>,
    /// Transformation kind for animate-transform
    pub transform_type: Option<TransformType>,
}

impl AnimateProps {
    /// Create an animate leaf for an attribute
    pub fn new(kind: AnimateKind, attribute_name: impl Into<String>) -> Self {
        Self {
            kind,
            target: None,
            sub_item: SubItem::AsWhole,
            attribute_name: attribute_name.into(),
            from: None,
            to: None,
            by: None,
            values: Vec::new(),
            key_times: Vec::new(),
            path: None,
            transform_type: None,
        }
    }

    /// Set the end value
    pub fn with_to(mut self, to: impl Into<AnimValue>) -> Self {
        self.to = Some(to.into());
        self
    }

    /// Set the start value
    pub fn with_from(mut self, from: impl Into<AnimValue>) -> Self {
        self.from = Some(from.into());
        self
    }

    /// Set the relative change
    pub fn with_by(mut self, by: impl Into<AnimValue>) -> Self {
        self.by = Some(by.into());
        self
    }

    /// Set keyframe values
    pub fn with_values(mut self, values: Vec<AnimValue>) -> Self {
        self.values = values;
        self
    }

    /// Set the transformation kind
    pub fn with_transform(mut self, transform_type: TransformType) -> Self {
        self.transform_type = Some(transform_type);
        self
    }

    /// Set the motion path
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

/// Audio leaf attributes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioProps {
    /// Media URL
    pub source: String,
    /// Volume, 1.0 is unchanged
    pub volume: f64,
}

/// Commands a command leaf can issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Command {
    /// Application defined
    Custom,
    /// OLE verb
    Verb,
    /// Start media playback
    Play,
    /// Toggle media pause
    TogglePause,
    /// Stop media playback
    Stop,
    /// Stop all sounds
    StopAudio,
}

/// Command leaf attributes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandProps {
    /// Issued command
    pub command: Command,
    /// Element the command acts on
    pub target: Option<Target>,
}

/// Node kind with its kind-specific attributes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeKind {
    /// Children run in parallel
    Par,
    /// Children run one after another
    Seq,
    /// Children are repeated for each text sub-item
    Iterate(IterateProps),
    /// Attribute animation
    Animate(AnimateProps),
    /// Sound playback
    Audio(AudioProps),
    /// Command
    Command(CommandProps),
}

impl NodeKind {
    /// Whether nodes of this kind may have children
    pub fn is_container(&self) -> bool {
        matches!(self, Self::Par | Self::Seq | Self::Iterate(_))
    }

    /// Display name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Par => "par",
            Self::Seq => "seq",
            Self::Iterate(_) => "iterate",
            Self::Animate(props) => match props.kind {
                AnimateKind::Animate => "animate",
                AnimateKind::Set => "set",
                AnimateKind::AnimateColor => "animateColor",
                AnimateKind::AnimateMotion => "animateMotion",
                AnimateKind::AnimateTransform => "animateTransform",
            },
            Self::Audio(_) => "audio",
            Self::Command(_) => "command",
        }
    }
}

/// A node in the timing tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingNode {
    /// Unique node ID
    pub id: NodeId,
    /// Kind and kind-specific attributes
    pub kind: NodeKind,
    /// Timing attributes
    pub timing: Timing,
    /// Sequencer bookkeeping
    pub user_data: UserData,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
}

impl TimingNode {
    /// Create a detached node
    pub fn new(kind: NodeKind) -> Self {
        Self {
            id: NodeId::new(),
            kind,
            timing: Timing::default(),
            user_data: UserData::default(),
            parent: None,
            children: Vec::new(),
        }
    }

    /// Parent node, if attached
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Child nodes in order
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Whether this node may have children
    pub fn is_container(&self) -> bool {
        self.kind.is_container()
    }

    /// Iterate attributes, if this is an iterate container
    pub fn iterate(&self) -> Option<&IterateProps> {
        match &self.kind {
            NodeKind::Iterate(props) => Some(props),
            _ => None,
        }
    }

    /// Mutable iterate attributes, if this is an iterate container
    pub fn iterate_mut(&mut self) -> Option<&mut IterateProps> {
        match &mut self.kind {
            NodeKind::Iterate(props) => Some(props),
            _ => None,
        }
    }

    /// Animate attributes, if this is an animate leaf
    pub fn animate(&self) -> Option<&AnimateProps> {
        match &self.kind {
            NodeKind::Animate(props) => Some(props),
            _ => None,
        }
    }

    /// Mutable animate attributes, if this is an animate leaf
    pub fn animate_mut(&mut self) -> Option<&mut AnimateProps> {
        match &mut self.kind {
            NodeKind::Animate(props) => Some(props),
            _ => None,
        }
    }

    /// Command attributes, if this is a command leaf
    pub fn command(&self) -> Option<&CommandProps> {
        match &self.kind {
            NodeKind::Command(props) => Some(props),
            _ => None,
        }
    }

    /// Mutable command attributes, if this is a command leaf
    pub fn command_mut(&mut self) -> Option<&mut CommandProps> {
        match &mut self.kind {
            NodeKind::Command(props) => Some(props),
            _ => None,
        }
    }

    /// Whether this is an audio leaf
    pub fn is_audio(&self) -> bool {
        matches!(self.kind, NodeKind::Audio(_))
    }

    /// Role inside a sequence, from the user data
    pub fn node_type(&self) -> Option<EffectNodeType> {
        self.user_data.node_type
    }

    /// Begin offset in seconds, if the begin is a fixed time
    pub fn begin_seconds(&self) -> Option<f64> {
        self.timing.begin.as_ref().and_then(TimeValue::as_seconds)
    }
}
