//! Event Logger - persists run events to a JSONL file

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tokio::sync::broadcast;
use tracing::{debug, error, warn};

use super::types::{EventLogEntry, RunEvent};

/// Appends one JSON line per event
pub struct EventLogger {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl EventLogger {
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        debug!(?path, "EventLogger::new: called");
        Self { path, writer: None }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn writer(&mut self) -> eyre::Result<&mut BufWriter<File>> {
        if self.writer.is_none() {
            if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
            debug!(path = ?self.path, "EventLogger::writer: opened log file");
            self.writer = Some(BufWriter::new(file));
        }
        self.writer
            .as_mut()
            .ok_or_else(|| eyre::eyre!("event log writer unavailable"))
    }

    pub fn write_event(&mut self, event: &RunEvent) -> eyre::Result<()> {
        debug!(event_type = event.event_type(), "EventLogger::write_event: called");
        let json = serde_json::to_string(&EventLogEntry::new(event.clone()))?;
        let writer = self.writer()?;
        writeln!(writer, "{}", json)?;
        writer.flush()?;
        Ok(())
    }

    /// Consume events until the run finishes or the bus closes
    ///
    /// Meant to be spawned as a background task before the run starts.
    pub async fn run(mut self, mut rx: broadcast::Receiver<RunEvent>) {
        debug!("EventLogger::run: starting");
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Err(e) = self.write_event(&event) {
                        error!(error = %e, "EventLogger: failed to write event");
                    }
                    if event.is_terminal() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(missed = n, "EventLogger: lagged behind, missed events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("EventLogger: channel closed, shutting down");
                    break;
                }
            }
        }
        if let Some(mut writer) = self.writer.take() {
            let _ = writer.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use tempfile::TempDir;

    #[test]
    fn test_write_event_appends_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("runs").join("events.jsonl");
        let mut logger = EventLogger::new(&path);

        for id in ["a", "b"] {
            logger
                .write_event(&RunEvent::TaskCompleted {
                    request_id: "r".to_string(),
                    task_id: id.to_string(),
                })
                .unwrap();
        }

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["task_id"], "a");
    }

    #[tokio::test]
    async fn test_run_stops_on_terminal_event() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("events.jsonl");
        let bus = EventBus::new(16);
        let handle = tokio::spawn(EventLogger::new(&path).run(bus.subscribe()));

        let emitter = bus.emitter_for("r");
        emitter.task_started("a");
        emitter.run_finished("completed");
        handle.await.unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.contains("RunFinished"));
    }
}
