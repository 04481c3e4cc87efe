//! Identifiers, frame routing tags and page geometry shared by every WebPilot crate.

use std::fmt;

use thiserror::Error;
use uuid::Uuid;

/// Raised when an identifier or tag is built from untrusted text.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreTypeError {
    #[error("invalid frame origin: {0:?}")]
    InvalidOrigin(String),
}

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
        #[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
        pub struct $name(pub String);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

uuid_id!(
    /// One browser session; owns its pages exclusively.
    SessionId
);
uuid_id!(PageId);
uuid_id!(TaskId);
uuid_id!(ActionId);
uuid_id!(
    /// Identity of one captured observation. A selector map is only valid
    /// for the observation carrying the same id.
    ObservationId
);

/// Browser-assigned tab handle (a CDP target id for Chromium backends).
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct TabId(pub String);

impl TabId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which document an element lives in.
///
/// Elements from embedded frames share the index space of the top document;
/// the tag is what dispatch uses to route an interaction to the right frame.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-full", serde(tag = "kind", rename_all = "snake_case"))]
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Default)]
pub enum FrameTag {
    #[default]
    MainDocument,
    Frame {
        /// Serialized origin, e.g. `https://widgets.example.net`.
        origin: String,
    },
}

impl FrameTag {
    /// Builds a frame tag from an origin string, rejecting empty and opaque origins.
    pub fn frame(origin: impl Into<String>) -> Result<Self, CoreTypeError> {
        let origin = origin.into();
        let trimmed = origin.trim();
        if trimmed.is_empty() || trimmed == "null" {
            return Err(CoreTypeError::InvalidOrigin(origin));
        }
        Ok(FrameTag::Frame {
            origin: trimmed.trim_end_matches('/').to_string(),
        })
    }

    pub fn is_main(&self) -> bool {
        matches!(self, FrameTag::MainDocument)
    }

    pub fn origin(&self) -> Option<&str> {
        match self {
            FrameTag::MainDocument => None,
            FrameTag::Frame { origin } => Some(origin.as_str()),
        }
    }
}

impl fmt::Display for FrameTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameTag::MainDocument => f.write_str("main"),
            FrameTag::Frame { origin } => write!(f, "frame({origin})"),
        }
    }
}

/// Axis-aligned box in CSS pixels relative to the top document.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn area(&self) -> f64 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    pub fn is_empty(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }

    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// Viewport and scroll state captured alongside a page snapshot.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
    pub scroll_x: f64,
    pub scroll_y: f64,
    pub document_height: f64,
}

impl Viewport {
    /// Pixels of document left below the visible area.
    pub fn pixels_below(&self) -> f64 {
        (self.document_height - self.scroll_y - self.height).max(0.0)
    }
}

#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TabInfo {
    pub id: TabId,
    pub url: String,
    pub title: String,
    pub active: bool,
}
