//! Rendering model-written plotting code without executing it.
//!
//! Code moves through `NoCode -> CodeExtracted -> Executed -> Rendered`. The
//! extracted block is tokenized, parsed into a small statement tree and
//! evaluated by an allow-list interpreter whose only output is a
//! [`ChartSpec`]. The spec is then rasterized to PNG.

pub mod extract;
pub mod interpreter;
pub mod lexer;
pub mod parser;
pub mod raster;
pub mod spec;

pub use extract::{extract_code, first_block};
pub use interpreter::Interpreter;
pub use spec::{ChartKind, ChartSpec, Panel, Series};

use ragchart_core::{AppError, AppResult, ChartSettings};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Shared stop signal for a render running on a blocking thread.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn check(&self) -> AppResult<()> {
        if self.is_cancelled() {
            return Err(AppError::Sandbox("render cancelled".to_string()));
        }
        Ok(())
    }
}

/// Limits applied to one render.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SandboxLimits {
    pub max_code_bytes: usize,
    pub max_statements: usize,
    pub max_points: usize,
    pub timeout: Duration,
}

impl From<&ChartSettings> for SandboxLimits {
    fn from(settings: &ChartSettings) -> Self {
        Self {
            max_code_bytes: settings.max_code_bytes,
            max_statements: settings.max_statements,
            max_points: settings.max_points,
            timeout: Duration::from_secs(settings.render_timeout_secs),
        }
    }
}

/// Result of a render attempt that did not fail.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RenderOutcome {
    /// The text held no plotting code
    NoCode,
    /// A chart was drawn
    Rendered {
        spec: ChartSpec,
        image_base64: String,
    },
}

impl RenderOutcome {
    pub fn image(&self) -> Option<&str> {
        match self {
            Self::NoCode => None,
            Self::Rendered { image_base64, .. } => Some(image_base64),
        }
    }
}

/// Turns generated text into a base64 PNG.
#[derive(Debug, Clone)]
pub struct SandboxRenderer {
    limits: SandboxLimits,
    dpi: u32,
}

impl SandboxRenderer {
    pub fn new(settings: &ChartSettings) -> AppResult<Self> {
        if settings.dpi == 0 || settings.dpi > raster::MAX_DPI {
            return Err(AppError::Config(format!(
                "chart dpi must be between 1 and {}, got {}",
                raster::MAX_DPI,
                settings.dpi
            )));
        }
        Ok(Self {
            limits: SandboxLimits::from(settings),
            dpi: settings.dpi,
        })
    }

    pub fn limits(&self) -> &SandboxLimits {
        &self.limits
    }

    #[cfg(test)]
    fn with_timeout(mut self, timeout: Duration) -> Self {
        self.limits.timeout = timeout;
        self
    }

    /// Render the first plotting block found in `generated`.
    ///
    /// A missing block is [`RenderOutcome::NoCode`]. Rejected code, an empty
    /// figure or an overrun of the time limit is an [`AppError::Sandbox`].
    /// On overrun the blocking work stops at its next [`CancelFlag`] check.
    pub async fn render(&self, generated: &str) -> AppResult<RenderOutcome> {
        let Some(code) = extract_code(generated)? else {
            tracing::debug!("No code block in generated text");
            return Ok(RenderOutcome::NoCode);
        };

        if code.len() > self.limits.max_code_bytes {
            return Err(AppError::Sandbox(format!(
                "code block is {} bytes, limit is {}",
                code.len(),
                self.limits.max_code_bytes
            )));
        }
        tracing::debug!(bytes = code.len(), "Code extracted");

        let limits = self.limits;
        let dpi = self.dpi;
        let cancel = CancelFlag::default();
        let worker = cancel.clone();
        let task = tokio::task::spawn_blocking(move || -> AppResult<(ChartSpec, String)> {
            let tokens = lexer::tokenize(&code)?;
            let program = parser::parse(tokens, limits.max_statements)?;
            let spec = Interpreter::new(limits.max_points)
                .with_cancel(worker.clone())
                .run(&program)?;
            tracing::debug!(
                statements = program.len(),
                points = spec.points(),
                "Code executed"
            );

            let image = raster::rasterize(&spec, dpi, &worker)?;
            worker.check()?;
            let encoded = raster::encode_png_base64(&image)?;
            Ok((spec, encoded))
        });

        let joined = match tokio::time::timeout(limits.timeout, task).await {
            Ok(joined) => joined,
            Err(_) => {
                cancel.cancel();
                tracing::warn!(timeout_ms = limits.timeout.as_millis() as u64, "Render timed out");
                return Err(AppError::Sandbox(format!(
                    "rendering exceeded {}s",
                    limits.timeout.as_secs_f64()
                )));
            }
        };
        let (spec, image_base64) =
            joined.map_err(|e| AppError::Sandbox(format!("render task failed: {}", e)))??;

        tracing::info!(
            kinds = ?spec.kinds(),
            bytes = image_base64.len(),
            "Chart rendered"
        );
        Ok(RenderOutcome::Rendered { spec, image_base64 })
    }
}
