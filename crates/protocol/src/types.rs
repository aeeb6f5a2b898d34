use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }

    pub fn area(&self) -> f64 {
        self.w * self.h
    }

    /// Whether the rect has positive extent on both axes.
    pub fn is_drawable(&self) -> bool {
        self.w > 0.0 && self.h > 0.0
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.x < self.x + self.w && p.y >= self.y && p.y < self.y + self.h
    }

    /// Shrink every edge by `amount`. Extents may become negative.
    pub fn inset(&self, amount: f64) -> Self {
        Self {
            x: self.x + amount,
            y: self.y + amount,
            w: self.w - 2.0 * amount,
            h: self.h - 2.0 * amount,
        }
    }
}

/// An RGB color with channels in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn rgb8(r: u8, g: u8, b: u8) -> Self {
        Self {
            r: f32::from(r) / 255.0,
            g: f32::from(g) / 255.0,
            b: f32::from(b) / 255.0,
            a: 1.0,
        }
    }

    /// Channels as 8-bit integers, rounded to nearest.
    pub fn to_rgb8(&self) -> (u8, u8, u8) {
        let q = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
        (q(self.r), q(self.g), q(self.b))
    }

    /// CSS-style `#rrggbb` string (alpha is dropped).
    pub fn to_hex(&self) -> String {
        let (r, g, b) = self.to_rgb8();
        format!("#{r:02x}{g:02x}{b:02x}")
    }
}

/// The region a view is asked to draw into, in logical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    /// Device pixel ratio.
    pub dpr: f64,
}

impl Viewport {
    /// A viewport anchored at the origin with a device pixel ratio of 1.
    pub fn sized(width: f64, height: f64) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width,
            height,
            dpr: 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_hex_round_trips_through_rgb8() {
        let c = Color::rgb8(0x12, 0xab, 0xff);
        assert_eq!(c.to_hex(), "#12abff");
    }

    #[test]
    fn inset_shrinks_both_axes() {
        let r = Rect::new(10.0, 10.0, 20.0, 8.0).inset(2.0);
        assert_eq!(r, Rect::new(12.0, 12.0, 16.0, 4.0));
        assert!(r.is_drawable());
        assert!(!Rect::new(0.0, 0.0, 3.0, 3.0).inset(2.0).is_drawable());
    }

    #[test]
    fn contains_is_half_open() {
        let r = Rect::new(0.0, 0.0, 10.0, 10.0);
        assert!(r.contains(Point::new(0.0, 0.0)));
        assert!(r.contains(Point::new(9.9, 9.9)));
        assert!(!r.contains(Point::new(10.0, 5.0)));
    }
}
