//! Declarative chart description produced by the interpreter.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    Bar,
    HorizontalBar,
    Line,
    Scatter,
    Pie,
    Histogram,
}

/// One plotted data series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub kind: ChartKind,

    /// Category labels, empty for purely numeric series
    pub labels: Vec<String>,

    /// Numeric x positions for line and scatter series
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xs: Option<Vec<f64>>,

    pub values: Vec<f64>,

    /// Bin count for histograms
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bins: Option<usize>,
}

impl Series {
    pub fn new(kind: ChartKind, labels: Vec<String>, values: Vec<f64>) -> Self {
        Self {
            kind,
            labels,
            xs: None,
            values,
            bins: None,
        }
    }

    pub fn with_xs(mut self, xs: Vec<f64>) -> Self {
        self.xs = Some(xs);
        self
    }

    pub fn with_bins(mut self, bins: usize) -> Self {
        self.bins = Some(bins);
        self
    }

    pub fn points(&self) -> usize {
        self.values.len()
    }
}

/// One set of axes.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Panel {
    pub title: Option<String>,
    pub x_label: Option<String>,
    pub y_label: Option<String>,
    pub series: Vec<Series>,
}

/// A figure: a grid of panels.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSpec {
    pub title: Option<String>,
    pub rows: usize,
    pub cols: usize,
    pub panels: Vec<Panel>,
}

impl Default for ChartSpec {
    fn default() -> Self {
        Self {
            title: None,
            rows: 1,
            cols: 1,
            panels: vec![Panel::default()],
        }
    }
}

impl ChartSpec {
    /// Total plotted values across every panel.
    pub fn points(&self) -> usize {
        self.panels
            .iter()
            .flat_map(|p| &p.series)
            .map(Series::points)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.points() == 0
    }

    /// Kinds drawn, in panel then series order.
    pub fn kinds(&self) -> Vec<ChartKind> {
        self.panels
            .iter()
            .flat_map(|p| p.series.iter().map(|s| s.kind))
            .collect()
    }
}
