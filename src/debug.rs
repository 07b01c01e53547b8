//! Debug rendering of split reads
//!
//! For every split read the splitter can hand the original signal and both
//! halves to a [`DebugSink`]. [`SvgDebugSink`] draws them as three stacked
//! panels, marking the split boundary on the original trace.

use std::fs;
use std::path::{Path, PathBuf};

use auto_impl::auto_impl;
use svg::node::element::{Line, Polyline, Rectangle, Text};
use svg::Document;
use uuid::Uuid;

use crate::Result;

/// Receives the signals of every split read
#[auto_impl(&, Box, Arc)]
pub trait DebugSink {
    fn render(
        &self,
        read_id: &Uuid,
        original: &[i16],
        left: &[i16],
        right: &[i16],
        boundary: u64,
    ) -> Result<()>;
}

const WIDTH: f64 = 2300.0;
const PANEL_HEIGHT: f64 = 200.0;
const MARGIN: f64 = 20.0;

/// Writes one SVG per split read into a directory
#[derive(Debug, Clone)]
pub struct SvgDebugSink {
    dir: PathBuf,
    max_points: usize,
}
impl SvgDebugSink {
    /// Creates the sink, creating `dir` if needed
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        fs::create_dir_all(dir.as_ref())?;
        Ok(Self {
            dir: dir.as_ref().to_path_buf(),
            max_points: 5000,
        })
    }

    /// Caps the number of points drawn per trace
    #[must_use]
    pub fn max_points(mut self, max_points: usize) -> Self {
        self.max_points = max_points.max(2);
        self
    }

    /// Path of the image written for a read
    #[must_use]
    pub fn image_path(&self, read_id: &Uuid) -> PathBuf {
        self.dir.join(format!("{read_id}.svg"))
    }

    /// Builds the document without writing it
    #[must_use]
    pub fn document(
        &self,
        read_id: &Uuid,
        original: &[i16],
        left: &[i16],
        right: &[i16],
        boundary: u64,
    ) -> Document {
        let height = 3.0 * (PANEL_HEIGHT + MARGIN) + MARGIN;
        let mut doc = Document::new()
            .set("viewBox", (0.0, 0.0, WIDTH, height))
            .set("width", WIDTH)
            .set("height", height)
            .set("style", "background:#ffffff");

        let panels = [("original", original), ("left", left), ("right", right)];
        for (idx, (label, signal)) in panels.into_iter().enumerate() {
            let top = MARGIN + idx as f64 * (PANEL_HEIGHT + MARGIN);
            doc = doc
                .add(
                    Rectangle::new()
                        .set("x", 0)
                        .set("y", top)
                        .set("width", WIDTH)
                        .set("height", PANEL_HEIGHT)
                        .set("fill", "none")
                        .set("stroke", "#e0e0e0"),
                )
                .add(
                    Text::new(format!("{read_id} {label} ({} samples)", signal.len()))
                        .set("x", 4)
                        .set("y", top - 4.0)
                        .set("font-family", "Helvetica, Arial, sans-serif")
                        .set("font-size", 12)
                        .set("fill", "#202020"),
                )
                .add(
                    Polyline::new()
                        .set("points", self.trace(signal, top))
                        .set("fill", "none")
                        .set("stroke", "#1f77b4")
                        .set("stroke-width", 0.5),
                );

            if idx == 0 && !signal.is_empty() {
                let x = boundary as f64 / signal.len() as f64 * WIDTH;
                doc = doc.add(
                    Line::new()
                        .set("x1", x)
                        .set("y1", top)
                        .set("x2", x)
                        .set("y2", top + PANEL_HEIGHT)
                        .set("stroke", "red")
                        .set("stroke-width", 1.0),
                );
            }
        }
        doc
    }

    /// Scales a signal into polyline points inside a panel
    fn trace(&self, signal: &[i16], top: f64) -> String {
        if signal.is_empty() {
            return String::new();
        }
        let (min, max) = signal
            .iter()
            .fold((i16::MAX, i16::MIN), |(lo, hi), &s| (lo.min(s), hi.max(s)));
        let range = f64::from(max) - f64::from(min);
        let step = signal.len().div_ceil(self.max_points).max(1);
        let denom = (signal.len() - 1).max(1) as f64;

        let mut points = String::new();
        for (i, &sample) in signal.iter().enumerate().step_by(step) {
            let x = i as f64 / denom * WIDTH;
            let y = if range > 0.0 {
                top + (f64::from(max) - f64::from(sample)) / range * PANEL_HEIGHT
            } else {
                top + PANEL_HEIGHT / 2.0
            };
            if !points.is_empty() {
                points.push(' ');
            }
            points.push_str(&format!("{x:.1},{y:.1}"));
        }
        points
    }
}
impl DebugSink for SvgDebugSink {
    fn render(
        &self,
        read_id: &Uuid,
        original: &[i16],
        left: &[i16],
        right: &[i16],
        boundary: u64,
    ) -> Result<()> {
        let doc = self.document(read_id, original, left, right, boundary);
        svg::save(self.image_path(read_id), &doc)?;
        Ok(())
    }
}
