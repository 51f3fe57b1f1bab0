use serde::{Deserialize, Serialize};

/// An RGB colour; rendered with a separate fill opacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb(pub u8, pub u8, pub u8);

/// One labelled bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartBar {
    pub label: String,
    pub hours: f64,
}

/// Renderer-agnostic description of a ranked bar chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSpec {
    pub title: String,
    pub y_axis_label: String,
    pub dataset_label: String,
    /// Suffix appended to each value annotation, e.g. "h".
    pub value_suffix: String,
    pub color: Rgb,
    pub width: u32,
    pub height: u32,
    pub bars: Vec<ChartBar>,
    /// Attachment name without extension.
    pub file_stem: String,
}

/// Encoded chart ready to attach to a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedChart {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub content_type: String,
}
