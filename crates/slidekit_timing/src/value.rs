// SPDX-License-Identifier: MIT OR Apache-2.0
//! Values carried by animate nodes.

use serde::{Deserialize, Serialize};

/// Value of an animated attribute (`from`, `to`, `by`, or a keyframe)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AnimValue {
    /// Boolean, e.g. visibility
    Bool(bool),
    /// Scalar
    Number(f64),
    /// Packed 0xRRGGBB color
    Color(u32),
    /// 2D pair, e.g. scale or translation
    Pair([f64; 2]),
    /// Free-form formula or string
    Text(String),
}

impl AnimValue {
    /// Get the color, if this is one
    pub fn as_color(&self) -> Option<u32> {
        match self {
            Self::Color(c) => Some(*c),
            _ => None,
        }
    }

    /// Get the number, if this is one
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Get the boolean, if this is one
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<bool> for AnimValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for AnimValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}
