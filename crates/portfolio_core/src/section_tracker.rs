//! Scroll-position section tracking.
//!
//! The tracker owns the active section name in a `watch` channel. Hosts feed
//! it one evaluation per scroll event and render from a subscribed receiver,
//! which only reports a change when the active section actually moves.

use anyhow::Context;
use serde::Deserialize;
use shared::domain::{RegionGeometry, SectionRegion, Viewport};
use tokio::sync::watch;
use tracing::debug;

use crate::config::DEFAULT_SCROLL_BIAS_PX;

pub const DEFAULT_SECTIONS: [&str; 5] = ["intro", "about", "experience", "projects", "contact"];

/// Offset added to the scroll position to get the evaluation point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EvaluationBias {
    /// Fixed pixel offset below the top of the viewport.
    Fixed(f64),
    /// Fraction of the viewport height, e.g. `0.5` for the viewport middle.
    ViewportFraction(f64),
}

impl Default for EvaluationBias {
    fn default() -> Self {
        EvaluationBias::Fixed(DEFAULT_SCROLL_BIAS_PX)
    }
}

impl EvaluationBias {
    pub fn offset(self, viewport: &Viewport) -> f64 {
        match self {
            EvaluationBias::Fixed(px) => px,
            EvaluationBias::ViewportFraction(fraction) => viewport.height * fraction,
        }
    }
}

/// Layout queries supplied by the host page.
pub trait LayoutSource {
    /// `None` when the region is not currently mounted.
    fn region_geometry(&self, name: &str) -> Option<RegionGeometry>;
    fn viewport(&self) -> Viewport;
}

/// In-memory layout, loadable from TOML:
///
/// ```toml
/// [viewport]
/// scroll_offset = 0.0
/// height = 800.0
///
/// [[section]]
/// name = "intro"
/// top_offset = 0.0
/// height = 900.0
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StaticLayout {
    #[serde(default)]
    pub viewport: Viewport,
    #[serde(default, rename = "section")]
    pub regions: Vec<SectionRegion>,
}

impl StaticLayout {
    pub fn new(viewport: Viewport, regions: Vec<SectionRegion>) -> Self {
        Self { viewport, regions }
    }

    pub fn from_toml_str(raw: &str) -> anyhow::Result<Self> {
        toml::from_str(raw).context("failed to parse layout description")
    }

    pub fn scroll_to(&mut self, scroll_offset: f64) {
        self.viewport.scroll_offset = scroll_offset;
    }
}

impl LayoutSource for StaticLayout {
    fn region_geometry(&self, name: &str) -> Option<RegionGeometry> {
        self.regions
            .iter()
            .find(|region| region.name == name)
            .map(SectionRegion::geometry)
    }

    fn viewport(&self) -> Viewport {
        self.viewport
    }
}

pub struct SectionTracker {
    sections: Vec<String>,
    bias: EvaluationBias,
    active: watch::Sender<String>,
}

impl SectionTracker {
    /// `sections` must be listed in visual top-to-bottom order; the first
    /// matching region wins.
    pub fn new<I, S>(sections: I, default: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let (active, _) = watch::channel(default.into());
        Self {
            sections: sections.into_iter().map(Into::into).collect(),
            bias: EvaluationBias::default(),
            active,
        }
    }

    pub fn with_default_sections() -> Self {
        Self::new(DEFAULT_SECTIONS, DEFAULT_SECTIONS[0])
    }

    pub fn with_bias(mut self, bias: EvaluationBias) -> Self {
        self.bias = bias;
        self
    }

    pub fn sections(&self) -> &[String] {
        &self.sections
    }

    pub fn bias(&self) -> EvaluationBias {
        self.bias
    }

    pub fn active(&self) -> String {
        self.active.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<String> {
        self.active.subscribe()
    }

    /// Re-evaluates the active section against the current layout and
    /// returns it. A point inside no region keeps the previous section.
    pub fn evaluate<L>(&self, layout: &L) -> String
    where
        L: LayoutSource + ?Sized,
    {
        let viewport = layout.viewport();
        let point = viewport.scroll_offset + self.bias.offset(&viewport);

        if let Some(section) = self.locate(layout, point) {
            let changed = self.active.send_if_modified(|current| {
                if current == section {
                    false
                } else {
                    current.clear();
                    current.push_str(section);
                    true
                }
            });
            if changed {
                debug!(section, point, "active section changed");
            }
        }

        self.active()
    }

    fn locate<L>(&self, layout: &L, point: f64) -> Option<&str>
    where
        L: LayoutSource + ?Sized,
    {
        self.sections
            .iter()
            .find(|name| {
                layout
                    .region_geometry(name)
                    .is_some_and(|geometry| geometry.contains(point))
            })
            .map(String::as_str)
    }
}

#[cfg(test)]
#[path = "tests/section_tracker_tests.rs"]
mod tests;
