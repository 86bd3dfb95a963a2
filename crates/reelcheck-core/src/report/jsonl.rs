use super::{EventSink, ReporterError};
use crate::runner::RunEvent;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub const OUTCOMES_FILE: &str = "outcomes.jsonl";

/// Streams each outcome to `outcomes.jsonl` as soon as its test finishes.
pub struct JsonlWriter {
    path: PathBuf,
    file: Option<BufWriter<File>>,
}

impl JsonlWriter {
    pub fn new(reports_dir: &Path) -> Self {
        Self {
            path: reports_dir.join(OUTCOMES_FILE),
            file: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&mut self) -> Result<&mut BufWriter<File>, ReporterError> {
        let file = match self.file.take() {
            Some(file) => file,
            None => {
                if let Some(parent) = self.path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                BufWriter::new(File::create(&self.path)?)
            }
        };
        Ok(self.file.insert(file))
    }
}

impl EventSink for JsonlWriter {
    fn name(&self) -> &str {
        "outcomes-jsonl"
    }

    fn handle(&mut self, event: &RunEvent) -> Result<(), ReporterError> {
        match event {
            RunEvent::RunStarted { .. } => {
                self.file = None;
                self.open()?;
            }
            RunEvent::TestCompleted { outcome } | RunEvent::TestSkipped { outcome } => {
                let line = serde_json::to_string(outcome)?;
                let file = self.open()?;
                writeln!(file, "{line}")?;
                file.flush()?;
            }
            RunEvent::RunCompleted { .. } => {
                if let Some(mut file) = self.file.take() {
                    file.flush()?;
                }
            }
            RunEvent::TestStarted { .. } => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OutcomeStatus;
    use crate::report::fixtures;

    #[test]
    fn test_one_line_per_finished_test() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = JsonlWriter::new(dir.path());
        let results = fixtures::mixed_results();

        writer
            .handle(&RunEvent::RunStarted {
                total: 2,
                workers: 1,
            })
            .unwrap();
        writer
            .handle(&RunEvent::TestStarted {
                test_id: "TC-035".to_string(),
                title: String::new(),
                suite: "functional".to_string(),
            })
            .unwrap();
        writer
            .handle(&RunEvent::TestCompleted {
                outcome: results.outcomes[0].clone(),
            })
            .unwrap();

        // Visible before the run ends.
        let partial = std::fs::read_to_string(writer.path()).unwrap();
        assert_eq!(partial.lines().count(), 1);

        writer
            .handle(&RunEvent::TestSkipped {
                outcome: results.outcomes[3].clone(),
            })
            .unwrap();
        writer.handle(&RunEvent::RunCompleted { results }).unwrap();

        let content = std::fs::read_to_string(dir.path().join(OUTCOMES_FILE)).unwrap();
        let statuses: Vec<OutcomeStatus> = content
            .lines()
            .map(|l| serde_json::from_str::<crate::models::TestOutcome>(l).unwrap().status)
            .collect();
        assert_eq!(statuses, vec![OutcomeStatus::Passed, OutcomeStatus::Skipped]);
    }
}
