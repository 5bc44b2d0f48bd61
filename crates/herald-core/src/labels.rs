//! Category labels and announcement rendering.
//!
//! [`render`] is pure: the same labels and tail always produce an identical
//! [`StyledMessage`].

use serde::{Deserialize, Serialize};

/// Label carried by every record whose entity is a rare visual variant.
pub const RARE_VARIANT_LABEL: &str = "shiny";

/// Text placed between two rendered labels.
pub const LABEL_SEPARATOR: &str = " ";

/// Named chat colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextColor {
    Gold,
    LightPurple,
    Aqua,
    DarkAqua,
    Red,
    Gray,
    Yellow,
}

impl TextColor {
    /// 0xRRGGBB value of the color.
    pub fn rgb(self) -> u32 {
        match self {
            TextColor::Gold => 0xFFAA00,
            TextColor::LightPurple => 0xFF55FF,
            TextColor::Aqua => 0x55FFFF,
            TextColor::DarkAqua => 0x00AAAA,
            TextColor::Red => 0xFF5555,
            TextColor::Gray => 0xAAAAAA,
            TextColor::Yellow => 0xFFFF55,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Style {
    pub color: TextColor,
    pub bold: bool,
}

/// One run of text with an optional style.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub text: String,
    pub style: Option<Style>,
}

impl Segment {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            style: None,
        }
    }

    pub fn styled(text: impl Into<String>, style: Style) -> Self {
        Self {
            text: text.into(),
            style: Some(style),
        }
    }

    pub fn is_styled(&self) -> bool {
        self.style.is_some()
    }
}

/// A rendered announcement, ready for a session to display.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyledMessage {
    pub segments: Vec<Segment>,
}

impl StyledMessage {
    /// A message consisting of a single unstyled segment.
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            segments: vec![Segment::plain(text)],
        }
    }

    /// Concatenated text with styling dropped.
    pub fn plain_text(&self) -> String {
        self.segments.iter().map(|s| s.text.as_str()).collect()
    }

    pub fn styled_segments(&self) -> impl Iterator<Item = &Segment> {
        self.segments.iter().filter(|s| s.is_styled())
    }
}

/// Catalog entry for one label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelStyle {
    pub display: &'static str,
    pub color: TextColor,
    pub bold: bool,
}

impl LabelStyle {
    fn style(&self) -> Style {
        Style {
            color: self.color,
            bold: self.bold,
        }
    }
}

/// Case-fold and drop everything that is not alphanumeric.
pub fn normalize_label(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Look up a normalized label key in the static catalog.
pub fn catalog_entry(key: &str) -> Option<LabelStyle> {
    let entry = match key {
        "shiny" => LabelStyle {
            display: "Shiny",
            color: TextColor::Gold,
            bold: true,
        },
        "legendary" => LabelStyle {
            display: "Legendary",
            color: TextColor::LightPurple,
            bold: true,
        },
        "mythical" => LabelStyle {
            display: "Mythical",
            color: TextColor::Aqua,
            bold: true,
        },
        "ultrabeast" => LabelStyle {
            display: "Ultra Beast",
            color: TextColor::DarkAqua,
            bold: true,
        },
        "paradox" => LabelStyle {
            display: "Paradox",
            color: TextColor::Red,
            bold: true,
        },
        _ => return None,
    };
    Some(entry)
}

/// Display names of the labels that map to catalog entries, deduplicated
/// in first-seen order.
pub fn label_displays<S: AsRef<str>>(labels: &[S]) -> Vec<&'static str> {
    let mut seen: Vec<String> = Vec::new();
    let mut out = Vec::new();
    for raw in labels {
        let key = normalize_label(raw.as_ref());
        if seen.contains(&key) {
            continue;
        }
        if let Some(entry) = catalog_entry(&key) {
            out.push(entry.display);
        }
        seen.push(key);
    }
    out
}

/// Render labels followed by an unstyled tail.
pub fn render<S: AsRef<str>>(labels: &[S], tail: &str) -> StyledMessage {
    let mut seen: Vec<String> = Vec::new();
    let mut segments = Vec::new();

    for raw in labels {
        let key = normalize_label(raw.as_ref());
        if seen.contains(&key) {
            continue;
        }
        if let Some(entry) = catalog_entry(&key) {
            if !segments.is_empty() {
                segments.push(Segment::plain(LABEL_SEPARATOR));
            }
            segments.push(Segment::styled(entry.display, entry.style()));
        }
        seen.push(key);
    }

    if segments.is_empty() {
        return StyledMessage::plain(tail);
    }

    segments.push(Segment::plain(" "));
    segments.push(Segment::plain(tail));
    StyledMessage { segments }
}
