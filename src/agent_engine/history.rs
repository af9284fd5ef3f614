use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::errors::AgentResult;
use crate::stats::CycleRecord;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub ts: i64,
    pub session_id: String,
    #[serde(flatten)]
    pub cycle: CycleRecord,
}

/// Append-only JSONL record of closed cycles, one file per session.
pub struct CycleLedger {
    pub session_id: String,
    file_path: PathBuf,
}

impl CycleLedger {
    pub fn new() -> Self {
        Self::in_dir(&data_dir_or_cwd())
    }

    pub fn in_dir(dir: &Path) -> Self {
        let session_id = uuid::Uuid::new_v4().to_string();
        let file_path = dir.join(format!("session_{session_id}.jsonl"));
        Self {
            session_id,
            file_path,
        }
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    pub fn append(&self, cycle: &CycleRecord) -> AgentResult<()> {
        let entry = LedgerEntry {
            ts: chrono::Utc::now().timestamp_millis(),
            session_id: self.session_id.clone(),
            cycle: cycle.clone(),
        };
        let line = serde_json::to_string(&entry)?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)?;
        writeln!(file, "{}", line)?;
        tracing::debug!(path = %self.file_path.display(), "cycle appended to ledger");
        Ok(())
    }
}

impl Default for CycleLedger {
    fn default() -> Self {
        Self::new()
    }
}

/// `<data dir>/sword-agent/sessions`, falling back to the working directory.
fn data_dir_or_cwd() -> PathBuf {
    if let Some(data_dir) = dirs::data_local_dir() {
        let d = data_dir.join("sword-agent").join("sessions");
        if std::fs::create_dir_all(&d).is_ok() {
            return d;
        }
    }
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent_engine::state::Mode;

    #[test]
    fn cycles_append_as_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = CycleLedger::in_dir(dir.path());
        let record = CycleRecord {
            mode: Mode::GoldMine,
            item_name: "녹슨 검".into(),
            final_level: 7,
            sale_gold: Some(2_400),
            enhance_cost: 900,
            net_profit: 1_500,
            duration_secs: 42.0,
            success: true,
        };
        ledger.append(&record).unwrap();
        ledger.append(&record).unwrap();

        let content = std::fs::read_to_string(ledger.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let entry: LedgerEntry = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(entry.cycle, record);
        assert_eq!(entry.session_id, ledger.session_id);
    }
}
