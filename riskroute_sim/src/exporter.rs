//! JSON exporter for scenario runs.
//!
//! Writes the fusion timeline and computed routes of each run so that a run
//! can be inspected or diffed against another seed offline.

use crate::runner::{RouteRecord, ScenarioResult, SimError, TickFrame};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Export of one scenario run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunExport {
    pub scenario: String,
    pub seed: u64,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,

    /// Duration in seconds
    pub duration_sec: f64,

    /// One frame per fusion tick
    pub frames: Vec<TickFrame>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<RouteRecord>,
}

impl From<&ScenarioResult> for RunExport {
    fn from(result: &ScenarioResult) -> Self {
        Self {
            scenario: result.scenario.clone(),
            seed: result.seed,
            passed: result.passed,
            failure_reason: result.failure_reason.clone(),
            duration_sec: result.final_time_secs,
            frames: result.timeline.clone(),
            routes: result.routes.clone(),
        }
    }
}

/// Complete simulation export.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimExport {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub runs: Vec<RunExport>,
}

impl SimExport {
    /// Creates an empty export container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a finished run.
    pub fn add_run(&mut self, result: &ScenarioResult) {
        self.total += 1;
        if result.passed {
            self.passed += 1;
        } else {
            self.failed += 1;
        }
        self.runs.push(RunExport::from(result));
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<(), SimError> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::ScenarioRunner;
    use crate::scenarios::ScenarioId;

    #[test]
    fn test_export_counts_and_frames() {
        let result = ScenarioRunner::new(5).run(ScenarioId::ClearRoads);
        let mut export = SimExport::new();
        export.add_run(&result);

        assert_eq!(export.total, 1);
        assert_eq!(export.passed + export.failed, 1);
        assert_eq!(export.runs[0].frames.len() as u64, result.total_ticks);

        let json = serde_json::to_value(&export).unwrap();
        assert_eq!(json["runs"][0]["scenario"], "clear_roads");
    }

    #[test]
    fn test_write_to_file() {
        let result = ScenarioRunner::new(5).run(ScenarioId::BridgeOut);
        let mut export = SimExport::new();
        export.add_run(&result);

        let path = std::env::temp_dir().join(format!("riskroute-export-{}.json", std::process::id()));
        export.write_to_file(&path).unwrap();
        let back: SimExport = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(back.runs[0].routes.len(), result.routes.len());
    }
}
