//! Page geometry read by the proximity loops.

use serde::{Deserialize, Serialize};

/// Viewport width below which the page is treated as mobile.
pub const MOBILE_BREAKPOINT: f64 = 768.0;

/// Visible window onto the page, in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    /// Width.
    pub width: f64,
    /// Height.
    pub height: f64,
    /// Document offset of the top edge.
    pub scroll_y: f64,
}

impl Viewport {
    /// A 1440×900 desktop window at the top of the page.
    #[must_use]
    pub const fn desktop() -> Self {
        Self {
            width: 1440.0,
            height: 900.0,
            scroll_y: 0.0,
        }
    }

    /// A 390×844 phone window at the top of the page.
    #[must_use]
    pub const fn mobile() -> Self {
        Self {
            width: 390.0,
            height: 844.0,
            scroll_y: 0.0,
        }
    }

    /// Returns `true` below the mobile breakpoint.
    #[must_use]
    pub fn is_mobile(&self) -> bool {
        self.width < MOBILE_BREAKPOINT
    }
}

/// Vertical extent of an element, in document coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    /// Document offset of the top edge.
    pub top: f64,
    /// Height.
    pub height: f64,
}

impl Rect {
    /// Creates a rect.
    #[must_use]
    pub const fn new(top: f64, height: f64) -> Self {
        Self { top, height }
    }

    /// Document offset of the bottom edge.
    #[must_use]
    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    /// Document offset of the vertical centre.
    #[must_use]
    pub fn center_y(&self) -> f64 {
        self.top + self.height / 2.0
    }
}

/// A text element the beam can hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    /// Element id used for class writes.
    pub id: String,
    /// Position on the page.
    pub rect: Rect,
}

impl Target {
    /// Creates a target.
    #[must_use]
    pub fn new(id: impl Into<String>, top: f64, height: f64) -> Self {
        Self {
            id: id.into(),
            rect: Rect::new(top, height),
        }
    }
}

/// Source of live page geometry.
pub trait Scene: Send + Sync {
    /// Current viewport.
    fn viewport(&self) -> Viewport;

    /// Beam targets in document order.
    fn targets(&self) -> Vec<Target>;
}

/// Fixed geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticScene {
    /// Viewport.
    pub viewport: Viewport,
    /// Beam targets.
    pub targets: Vec<Target>,
}

impl StaticScene {
    /// A page of `count` evenly spaced 24px text lines filling the viewport.
    #[must_use]
    pub fn text_page(viewport: Viewport, count: usize) -> Self {
        #[allow(clippy::cast_precision_loss)]
        let spacing = viewport.height / (count.max(1) as f64 + 1.0);
        let targets = (1..=count)
            .map(|i| {
                #[allow(clippy::cast_precision_loss)]
                let centre = spacing * i as f64;
                Target::new(format!("line-{i}"), centre - 12.0, 24.0)
            })
            .collect();
        Self { viewport, targets }
    }
}

impl Scene for StaticScene {
    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn targets(&self) -> Vec<Target> {
        self.targets.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mobile_breakpoint() {
        assert!(Viewport::mobile().is_mobile());
        assert!(!Viewport::desktop().is_mobile());
        let edge = Viewport {
            width: 768.0,
            ..Viewport::desktop()
        };
        assert!(!edge.is_mobile());
    }

    #[test]
    fn rect_geometry() {
        let r = Rect::new(100.0, 40.0);
        assert!((r.center_y() - 120.0).abs() < f64::EPSILON);
        assert!((r.bottom() - 140.0).abs() < f64::EPSILON);
    }

    #[test]
    fn text_page_spreads_lines() {
        let scene = StaticScene::text_page(Viewport::desktop(), 8);
        let targets = scene.targets();
        assert_eq!(targets.len(), 8);
        assert_eq!(targets[0].id, "line-1");
        assert!((targets[0].rect.center_y() - 100.0).abs() < 1e-9);
        assert!(targets.windows(2).all(|w| w[0].rect.top < w[1].rect.top));
    }
}
