//! Node color contract.
//!
//! Every allocation site has one user-assigned highlight color. The
//! normal (non-highlighted) background is that color blended halfway to
//! white, and each background gets black or white text depending on its
//! luminance.

use std::fmt;
use std::str::FromStr;

use massif_view_protocol::Color;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Luminance below which text is drawn in white.
const FOREGROUND_THRESHOLD: f64 = 0.8;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ColorParseError {
    #[error("expected a color of the form #rrggbb, got {0:?}")]
    Malformed(String),
}

/// An opaque 24-bit color written as `#rrggbb`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HexColor(pub [u8; 3]);

impl HexColor {
    pub const WHITE: HexColor = HexColor([0xff, 0xff, 0xff]);
    pub const BLACK: HexColor = HexColor([0x00, 0x00, 0x00]);

    pub fn to_color(self) -> Color {
        let [r, g, b] = self.0;
        Color::rgb8(r, g, b)
    }
}

impl FromStr for HexColor {
    type Err = ColorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || ColorParseError::Malformed(s.to_string());
        let digits = s.strip_prefix('#').ok_or_else(malformed)?;
        if digits.len() != 6 || !digits.is_ascii() {
            return Err(malformed());
        }
        let channel = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).map_err(|_| malformed());
        Ok(Self([channel(0)?, channel(2)?, channel(4)?]))
    }
}

impl fmt::Display for HexColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [r, g, b] = self.0;
        write!(f, "#{r:02x}{g:02x}{b:02x}")
    }
}

impl TryFrom<String> for HexColor {
    type Error = ColorParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<HexColor> for String {
    fn from(value: HexColor) -> Self {
        value.to_string()
    }
}

/// A color with channels normalized to `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgb {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

impl From<HexColor> for Rgb {
    fn from(hex: HexColor) -> Self {
        let [r, g, b] = hex.0;
        Self {
            r: f64::from(r) / 255.0,
            g: f64::from(g) / 255.0,
            b: f64::from(b) / 255.0,
        }
    }
}

impl Rgb {
    /// Blend 50% toward white.
    pub fn lighten(self) -> Self {
        Self {
            r: 0.5 + self.r / 2.0,
            g: 0.5 + self.g / 2.0,
            b: 0.5 + self.b / 2.0,
        }
    }

    /// Weighted brightness used to pick a text color.
    pub fn luminance(self) -> f64 {
        self.r + self.g + self.b / 2.0
    }

    pub fn to_hex(self) -> HexColor {
        let q = |c: f64| (255.0 * c).round().clamp(0.0, 255.0) as u8;
        HexColor([q(self.r), q(self.g), q(self.b)])
    }
}

/// Black or white, whichever reads better on `background`.
pub fn foreground_for(background: Rgb) -> HexColor {
    if background.luminance() < FOREGROUND_THRESHOLD {
        HexColor::WHITE
    } else {
        HexColor::BLACK
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorPair {
    pub background: HexColor,
    pub foreground: HexColor,
}

/// The colors a node is drawn with in its two display states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeColors {
    /// The user-assigned color, unchanged, with its contrasting text color.
    pub highlighted: ColorPair,
    /// The lightened variant used when the node is not highlighted.
    pub normal: ColorPair,
}

impl NodeColors {
    pub fn derive(base: HexColor) -> Self {
        let hl_rgb = Rgb::from(base);
        // Luminance of the normal state is taken from the unrounded blend.
        let normal_rgb = hl_rgb.lighten();
        Self {
            highlighted: ColorPair {
                background: base,
                foreground: foreground_for(hl_rgb),
            },
            normal: ColorPair {
                background: normal_rgb.to_hex(),
                foreground: foreground_for(normal_rgb),
            },
        }
    }

    pub fn base(&self) -> HexColor {
        self.highlighted.background
    }

    pub fn pair(&self, highlighted: bool) -> ColorPair {
        if highlighted {
            self.highlighted
        } else {
            self.normal
        }
    }
}

/// Colors offered by interactive front ends when the user recolors a node.
pub const PALETTE: [HexColor; 12] = [
    HexColor([0xe6, 0x39, 0x46]),
    HexColor([0xf4, 0x84, 0x5f]),
    HexColor([0xff, 0xb7, 0x03]),
    HexColor([0x8a, 0xc9, 0x26]),
    HexColor([0x2a, 0x9d, 0x8f]),
    HexColor([0x45, 0x7b, 0x9d]),
    HexColor([0x1d, 0x35, 0x57]),
    HexColor([0x6a, 0x4c, 0x93]),
    HexColor([0xb5, 0x17, 0x9e]),
    HexColor([0x80, 0x80, 0x80]),
    HexColor([0x8d, 0x5b, 0x4c]),
    HexColor([0x00, 0x96, 0xc7]),
];

/// The palette entry after `current`, wrapping; the first entry when
/// `current` is not in the palette.
pub fn next_palette_color(current: HexColor) -> HexColor {
    let next = PALETTE
        .iter()
        .position(|c| *c == current)
        .map_or(0, |i| (i + 1) % PALETTE.len());
    PALETTE[next]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(s: &str) -> HexColor {
        s.parse().unwrap()
    }

    #[test]
    fn parses_and_formats_hex() {
        assert_eq!(hex("#1a2B3c").0, [0x1a, 0x2b, 0x3c]);
        assert_eq!(hex("#1a2b3c").to_string(), "#1a2b3c");
    }

    #[test]
    fn rejects_malformed_colors() {
        assert!("1a2b3c".parse::<HexColor>().is_err());
        assert!("#1a2b3".parse::<HexColor>().is_err());
        assert!("#zz0000".parse::<HexColor>().is_err());
        assert!("#ééé".parse::<HexColor>().is_err());
    }

    #[test]
    fn normal_background_is_halfway_to_white() {
        let colors = NodeColors::derive(hex("#000000"));
        // 0.5 * 255 = 127.5 rounds up.
        assert_eq!(colors.normal.background, hex("#808080"));
        assert_eq!(colors.highlighted.background, hex("#000000"));
    }

    #[test]
    fn foreground_follows_luminance_of_each_state() {
        // Dark blue: highlighted text white, lightened (0.5, 0.5, ~0.77) has
        // luminance ~1.39 so normal text is black.
        let colors = NodeColors::derive(hex("#000080"));
        assert_eq!(colors.highlighted.foreground, HexColor::WHITE);
        assert_eq!(colors.normal.foreground, HexColor::BLACK);

        // Blue is weighted at half: pure blue luminance 0.5 < 0.8.
        let blue = NodeColors::derive(hex("#0000ff"));
        assert_eq!(blue.highlighted.foreground, HexColor::WHITE);

        let yellow = NodeColors::derive(hex("#ffff00"));
        assert_eq!(yellow.highlighted.foreground, HexColor::BLACK);
    }

    #[test]
    fn serde_uses_hex_strings() {
        let json = serde_json::to_string(&hex("#00ff7f")).unwrap();
        assert_eq!(json, "\"#00ff7f\"");
        let back: HexColor = serde_json::from_str(&json).unwrap();
        assert_eq!(back, hex("#00ff7f"));
        assert!(serde_json::from_str::<HexColor>("\"green\"").is_err());
    }

    #[test]
    fn palette_cycles() {
        assert_eq!(next_palette_color(PALETTE[0]), PALETTE[1]);
        assert_eq!(next_palette_color(PALETTE[PALETTE.len() - 1]), PALETTE[0]);
        assert_eq!(next_palette_color(hex("#010203")), PALETTE[0]);
    }
}
