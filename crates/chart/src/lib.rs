//! Charts from tabular questions for ragchart.
//!
//! A [`TabularAgent`] answers the question from a SQL database, the
//! [`ChartCodeGenerator`] turns that answer into plotting code, the
//! [`SandboxRenderer`] draws it without executing it, and the
//! [`ChartExplainer`] writes the narrative shown next to the image.

pub mod agent;
pub mod explainer;
pub mod generator;
pub mod pipeline;
pub mod sandbox;

#[cfg(test)]
mod testing;
#[cfg(test)]
mod tests;

pub use agent::{validate_query, QueryRows, SqlAgent, TabularAgent, TabularAnswer};
pub use explainer::{strip_plotting_lines, ChartExplainer, Explanation};
pub use generator::ChartCodeGenerator;
pub use pipeline::{ChartArtifact, ChartPipeline};
pub use sandbox::{ChartKind, ChartSpec, RenderOutcome, SandboxLimits, SandboxRenderer};
