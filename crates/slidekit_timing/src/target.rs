// SPDX-License-Identifier: MIT OR Apache-2.0
//! Animation targets: whole shapes or single paragraphs of a shape's text.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a shape on a slide
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShapeId(pub Uuid);

impl ShapeId {
    /// Create a new random shape ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ShapeId {
    fn default() -> Self {
        Self::new()
    }
}

/// One paragraph of a shape's text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParagraphTarget {
    /// Shape owning the text
    pub shape: ShapeId,
    /// Zero-based paragraph index
    pub paragraph: u32,
}

impl ParagraphTarget {
    /// Create a paragraph target
    pub fn new(shape: ShapeId, paragraph: u32) -> Self {
        Self { shape, paragraph }
    }

    /// The paragraph right before this one, if any
    pub fn previous(&self) -> Option<Self> {
        self.paragraph
            .checked_sub(1)
            .map(|paragraph| Self { shape: self.shape, paragraph })
    }
}

/// What an animation node acts on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Target {
    /// The whole shape
    Shape(ShapeId),
    /// A single paragraph of the shape's text
    Paragraph(ParagraphTarget),
}

impl Target {
    /// Create a paragraph target
    pub fn paragraph(shape: ShapeId, paragraph: u32) -> Self {
        Self::Paragraph(ParagraphTarget::new(shape, paragraph))
    }

    /// The shape this target belongs to
    pub fn shape(&self) -> ShapeId {
        match self {
            Self::Shape(shape) => *shape,
            Self::Paragraph(para) => para.shape,
        }
    }

    /// The paragraph target, if this targets a paragraph
    pub fn as_paragraph(&self) -> Option<ParagraphTarget> {
        match self {
            Self::Paragraph(para) => Some(*para),
            Self::Shape(_) => None,
        }
    }

    /// Whether this targets a single paragraph
    pub fn is_paragraph(&self) -> bool {
        matches!(self, Self::Paragraph(_))
    }
}

impl From<ShapeId> for Target {
    fn from(shape: ShapeId) -> Self {
        Self::Shape(shape)
    }
}

impl From<ParagraphTarget> for Target {
    fn from(para: ParagraphTarget) -> Self {
        Self::Paragraph(para)
    }
}
