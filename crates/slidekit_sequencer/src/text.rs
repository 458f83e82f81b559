// SPDX-License-Identifier: MIT OR Apache-2.0
//! Access to the text of animated shapes.

use slidekit_timing::{IterateType, ParagraphTarget, ShapeId, Target};
use std::cell::RefCell;
use std::collections::HashMap;
use unicode_segmentation::UnicodeSegmentation;

/// One paragraph of a shape's text
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Paragraph {
    /// Paragraph text without the line break
    pub text: String,
    /// Outline level, 0 is the top level
    pub numbering_level: u32,
}

impl Paragraph {
    /// Create a top level paragraph
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            numbering_level: 0,
        }
    }

    /// Create a paragraph at an outline level
    pub fn with_level(text: impl Into<String>, numbering_level: u32) -> Self {
        Self {
            text: text.into(),
            numbering_level,
        }
    }

    /// Whether the paragraph holds no text
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Read access to the text of shapes
pub trait TextSource {
    /// Paragraphs of a shape, or `None` if the shape cannot hold text
    fn paragraphs(&self, shape: ShapeId) -> Option<Vec<Paragraph>>;

    /// Numbering level of every paragraph
    fn numbering_levels(&self, shape: ShapeId) -> Option<Vec<u32>> {
        self.paragraphs(shape)
            .map(|paras| paras.iter().map(|p| p.numbering_level).collect())
    }

    /// Whether the shape holds any text
    fn has_text(&self, shape: ShapeId) -> bool {
        self.paragraphs(shape)
            .is_some_and(|paras| paras.iter().any(|p| !p.is_empty()))
    }

    /// A single paragraph
    fn paragraph(&self, target: ParagraphTarget) -> Option<Paragraph> {
        self.paragraphs(target.shape)?
            .into_iter()
            .nth(target.paragraph as usize)
    }

    /// Whether the paragraph exists and is empty
    fn is_paragraph_empty(&self, target: ParagraphTarget) -> bool {
        self.paragraph(target).is_some_and(|p| p.is_empty())
    }
}

/// Text source for shapes that never hold text
#[derive(Debug, Clone, Copy, Default)]
pub struct NoText;

impl TextSource for NoText {
    fn paragraphs(&self, _shape: ShapeId) -> Option<Vec<Paragraph>> {
        None
    }
}

/// In-memory text of a slide's shapes
///
/// Interior mutability lets the text be edited while sequences hold a
/// shared reference to it.
#[derive(Debug, Default)]
pub struct SlideText {
    shapes: RefCell<HashMap<ShapeId, Vec<Paragraph>>>,
}

impl SlideText {
    /// Create an empty text store
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace all paragraphs of a shape
    pub fn set_paragraphs(&self, shape: ShapeId, paragraphs: Vec<Paragraph>) {
        self.shapes.borrow_mut().insert(shape, paragraphs);
    }

    /// Replace the text of a shape, one top level paragraph per line
    pub fn set_text(&self, shape: ShapeId, text: &str) {
        let paragraphs = text.lines().map(Paragraph::new).collect();
        self.set_paragraphs(shape, paragraphs);
    }

    /// Insert a paragraph; indices past the end append
    pub fn insert_paragraph(&self, shape: ShapeId, index: usize, paragraph: Paragraph) {
        let mut shapes = self.shapes.borrow_mut();
        let paras = shapes.entry(shape).or_default();
        let index = index.min(paras.len());
        paras.insert(index, paragraph);
    }

    /// Remove a paragraph, returning it if it existed
    pub fn remove_paragraph(&self, shape: ShapeId, index: usize) -> Option<Paragraph> {
        let mut shapes = self.shapes.borrow_mut();
        let paras = shapes.get_mut(&shape)?;
        (index < paras.len()).then(|| paras.remove(index))
    }

    /// Forget a shape
    pub fn remove_shape(&self, shape: ShapeId) {
        self.shapes.borrow_mut().remove(&shape);
    }
}

impl TextSource for SlideText {
    fn paragraphs(&self, shape: ShapeId) -> Option<Vec<Paragraph>> {
        self.shapes.borrow().get(&shape).cloned()
    }
}

/// Count the sub-items an iterate container walks over.
///
/// A paragraph target only counts inside that paragraph, a shape target
/// counts across all paragraphs. Words follow Unicode word boundaries and
/// letters are grapheme clusters.
pub fn count_subitems(text: &dyn TextSource, target: &Target, iterate_type: IterateType) -> usize {
    let paragraphs: Vec<Paragraph> = match target {
        Target::Paragraph(para) => text.paragraph(*para).into_iter().collect(),
        Target::Shape(shape) => text.paragraphs(*shape).unwrap_or_default(),
    };

    paragraphs
        .iter()
        .map(|p| match iterate_type {
            IterateType::ByParagraph => 1,
            IterateType::ByWord => p.text.split_word_bounds().count(),
            IterateType::ByLetter => p.text.graphemes(true).count(),
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slide_text_editing() {
        let text = SlideText::new();
        let shape = ShapeId::new();
        text.set_text(shape, "One\n\nThree");

        assert!(text.has_text(shape));
        assert!(text.is_paragraph_empty(ParagraphTarget::new(shape, 1)));
        assert!(!text.is_paragraph_empty(ParagraphTarget::new(shape, 5)));

        text.insert_paragraph(shape, 1, Paragraph::with_level("Two", 1));
        assert_eq!(text.numbering_levels(shape), Some(vec![0, 1, 0, 0]));

        assert_eq!(text.remove_paragraph(shape, 2), Some(Paragraph::new("")));
        assert_eq!(text.remove_paragraph(shape, 9), None);
        assert_eq!(text.paragraphs(shape).map(|p| p.len()), Some(3));
    }

    #[test]
    fn test_shape_without_text() {
        let shape = ShapeId::new();
        assert!(!NoText.has_text(shape));
        assert_eq!(NoText.numbering_levels(shape), None);

        let text = SlideText::new();
        text.set_paragraphs(shape, vec![Paragraph::new("")]);
        assert!(!text.has_text(shape));
    }

    #[test]
    fn test_count_subitems() {
        let text = SlideText::new();
        let shape = ShapeId::new();
        text.set_text(shape, "Hi there\nyou");

        let whole = Target::Shape(shape);
        assert_eq!(count_subitems(&text, &whole, IterateType::ByParagraph), 2);
        // "Hi", " ", "there" and "you"
        assert_eq!(count_subitems(&text, &whole, IterateType::ByWord), 4);
        assert_eq!(count_subitems(&text, &whole, IterateType::ByLetter), 11);

        let second = Target::paragraph(shape, 1);
        assert_eq!(count_subitems(&text, &second, IterateType::ByLetter), 3);
        assert_eq!(count_subitems(&NoText, &whole, IterateType::ByWord), 0);
    }

    #[test]
    fn test_graphemes_count_as_one_letter() {
        let text = SlideText::new();
        let shape = ShapeId::new();
        text.set_text(shape, "e\u{301}a");
        let whole = Target::Shape(shape);
        assert_eq!(count_subitems(&text, &whole, IterateType::ByLetter), 2);
    }
}
