//! Rectangles and sizes shared by fragments, regions and the layout projection

use serde::{Deserialize, Serialize};

/// Width/height pair (image pixels or viewport points)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

/// Axis-aligned rectangle, origin at the top-left corner
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
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

    pub fn zero() -> Self {
        Self::default()
    }

    pub fn min_x(&self) -> f64 {
        self.x
    }

    pub fn min_y(&self) -> f64 {
        self.y
    }

    pub fn max_x(&self) -> f64 {
        self.x + self.width
    }

    pub fn max_y(&self) -> f64 {
        self.y + self.height
    }

    pub fn area(&self) -> f64 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    pub fn union(&self, other: &Self) -> Self {
        let x0 = self.min_x().min(other.min_x());
        let y0 = self.min_y().min(other.min_y());
        let x1 = self.max_x().max(other.max_x());
        let y1 = self.max_y().max(other.max_y());
        Self::new(x0, y0, x1 - x0, y1 - y0)
    }

    /// True when `other` lies entirely inside this rectangle (edges inclusive)
    pub fn contains(&self, other: &Self) -> bool {
        other.min_x() >= self.min_x()
            && other.min_y() >= self.min_y()
            && other.max_x() <= self.max_x()
            && other.max_y() <= self.max_y()
    }

    /// Project a normalized (0..1) rectangle onto an image shown aspect-fit
    /// inside `content`, returning viewport coordinates.
    ///
    /// The image is scaled uniformly to fit and centered on the free axis.
    pub fn projected(&self, image: Size, content: Size) -> Self {
        if image.is_empty() || content.is_empty() {
            return Self::zero();
        }
        let scale = (content.width / image.width).min(content.height / image.height);
        let shown_width = image.width * scale;
        let shown_height = image.height * scale;
        let offset_x = (content.width - shown_width) / 2.0;
        let offset_y = (content.height - shown_height) / 2.0;

        Self::new(
            offset_x + self.x * shown_width,
            offset_y + self.y * shown_height,
            self.width * shown_width,
            self.height * shown_height,
        )
    }

    /// Encoded as `x,y,width,height` in fixture tables
    pub fn to_table_string(&self) -> String {
        format!("{},{},{},{}", self.x, self.y, self.width, self.height)
    }

    pub fn from_table_string(s: &str) -> Option<Self> {
        let parts: Vec<f64> = s
            .split(',')
            .map(|p| p.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .ok()?;
        match parts.as_slice() {
            [x, y, w, h] => Some(Self::new(*x, *y, *w, *h)),
            _ => None,
        }
    }
}
