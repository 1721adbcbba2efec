//! Per-stage and per-exposure processing reports.

use super::artifacts::Stage;
use crate::error::DataIncomplete;
use crate::source_mask::MaskReport;

/// Outcome of one stage of one exposure.
#[derive(Debug, Clone, PartialEq)]
pub struct StageReport {
    pub stage: Stage,
    /// Artifacts were current and loaded instead of recomputed.
    pub reused: bool,
    pub mask: Option<MaskReport>,
    pub gaps: Vec<DataIncomplete>,
    /// Global factor of the Unit pass.
    pub renormalization: Option<f32>,
    pub uncorrected_samples: usize,
    /// (plane, unit) pairs left without sky subtraction.
    pub sky_skipped: usize,
}

impl StageReport {
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            reused: false,
            mask: None,
            gaps: Vec::new(),
            renormalization: None,
            uncorrected_samples: 0,
            sky_skipped: 0,
        }
    }

    pub fn reused(stage: Stage) -> Self {
        Self {
            reused: true,
            ..Self::new(stage)
        }
    }

    /// Warn about every recorded gap, then summarize.
    pub fn log(&self, exposure: &str) {
        for gap in &self.gaps {
            tracing::warn!(exposure, stage = %self.stage, "{gap}");
        }
        if self.sky_skipped > 0 {
            tracing::warn!(
                exposure,
                stage = %self.stage,
                skipped = self.sky_skipped,
                "Sky left in place where a unit plane has no finite flux"
            );
        }
        if self.reused {
            tracing::info!(exposure, stage = %self.stage, "Stage reused from cache");
            return;
        }
        tracing::info!(
            exposure,
            stage = %self.stage,
            gaps = self.gaps.len(),
            sources = self.mask.as_ref().map_or(0, |m| m.sources),
            "Stage complete"
        );
    }
}

/// Reports of all stages of one exposure, in execution order.
#[derive(Debug, Clone, PartialEq)]
pub struct ExposureReport {
    pub exposure: String,
    pub stages: Vec<StageReport>,
}

impl ExposureReport {
    pub fn new(exposure: impl Into<String>) -> Self {
        Self {
            exposure: exposure.into(),
            stages: Vec::new(),
        }
    }

    pub fn push(&mut self, report: StageReport) {
        report.log(&self.exposure);
        self.stages.push(report);
    }

    pub fn stage(&self, stage: Stage) -> Option<&StageReport> {
        self.stages.iter().find(|r| r.stage == stage)
    }

    pub fn gap_count(&self) -> usize {
        self.stages.iter().map(|r| r.gaps.len()).sum()
    }
}
