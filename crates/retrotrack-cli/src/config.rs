use std::{
    fs::{self, File},
    io,
    path::{Path, PathBuf},
};

use anyhow::Context;
use retrotrack_telemetry::Campaign;
use serde::{Deserialize, Serialize};

/// Where a campaign keeps its files and how its sessions are recorded.
///
/// Every field has a default, so a config file only needs the fields it changes:
///
/// ```json
/// { "ledger": "runs/ppo/trainLog.txt", "sink_dir": "runs/ppo", "workers": 6 }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub(crate) struct CampaignConfig {
    pub(crate) ledger: PathBuf,
    pub(crate) sink_dir: PathBuf,
    pub(crate) sink_prefix: String,
    pub(crate) log_interval: u64,
    pub(crate) workers: usize,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        Self {
            ledger: PathBuf::from("trainLog.txt"),
            sink_dir: PathBuf::from("."),
            sink_prefix: "training_data".to_owned(),
            log_interval: 5000,
            workers: 4,
        }
    }
}

impl CampaignConfig {
    pub(crate) fn open<P>(path: P) -> anyhow::Result<Self>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open campaign config: {}", path.display()))?;
        serde_json::from_reader(io::BufReader::new(file))
            .with_context(|| format!("Failed to parse campaign config: {}", path.display()))
    }

    /// Sample table of one worker in one session.
    pub(crate) fn sink_path(&self, session: usize, worker: usize) -> PathBuf {
        self.sink_dir
            .join(format!("{}_s{session}_w{worker}.csv", self.sink_prefix))
    }

    /// Consolidated, campaign-relative table of one session.
    pub(crate) fn merged_path(&self, session: usize) -> PathBuf {
        self.sink_dir
            .join(format!("{}_s{session}_merged.csv", self.sink_prefix))
    }

    /// Session index under which `workers` record their sample tables.
    ///
    /// A resumed campaign numbers sessions after its ledger blocks. A fresh or unreadable ledger
    /// may leave tables of an earlier campaign behind, so the first index without a table for
    /// any of `workers` is used instead of appending to them.
    pub(crate) fn session_for(&self, campaign: &Campaign, workers: &[usize]) -> usize {
        let mut session = campaign.session_index();
        if campaign.state().is_resumed() {
            return session;
        }
        while self.merged_path(session).exists()
            || workers.iter().any(|&w| self.sink_path(session, w).exists())
        {
            session += 1;
        }
        session
    }

    /// Worker sample tables of the sessions before `session`.
    pub(crate) fn previous_sink_paths(&self, session: usize) -> anyhow::Result<Vec<PathBuf>> {
        let entries = match fs::read_dir(&self.sink_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to list sink directory: {}", self.sink_dir.display())
                });
            }
        };

        let mut paths = vec![];
        for entry in entries {
            let entry = entry.with_context(|| {
                format!("Failed to list sink directory: {}", self.sink_dir.display())
            })?;
            let name = entry.file_name();
            let Some((entry_session, _worker)) =
                name.to_str().and_then(|n| self.parse_sink_name(n))
            else {
                continue;
            };
            if entry_session < session {
                paths.push(entry.path());
            }
        }
        paths.sort();
        Ok(paths)
    }

    fn parse_sink_name(&self, name: &str) -> Option<(usize, usize)> {
        let rest = name
            .strip_prefix(self.sink_prefix.as_str())?
            .strip_prefix("_s")?
            .strip_suffix(".csv")?;
        let (session, worker) = rest.split_once("_w")?;
        Some((session.parse().ok()?, worker.parse().ok()?))
    }
}

/// Campaign options shared by the commands that run a session.
///
/// Flags override values read from `--config`.
#[derive(Default, Debug, Clone, clap::Args)]
pub(crate) struct CampaignArgs {
    /// Campaign config file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Ledger file
    #[arg(long)]
    ledger: Option<PathBuf>,
    /// Directory of the sample tables
    #[arg(long)]
    sink_dir: Option<PathBuf>,
    /// File name prefix of the sample tables
    #[arg(long)]
    sink_prefix: Option<String>,
    /// Steps between two progress lines
    #[arg(long)]
    log_interval: Option<u64>,
}

impl CampaignArgs {
    pub(crate) fn resolve(&self) -> anyhow::Result<CampaignConfig> {
        let mut config = match &self.config {
            Some(path) => CampaignConfig::open(path)?,
            None => CampaignConfig::default(),
        };
        if let Some(ledger) = &self.ledger {
            config.ledger.clone_from(ledger);
        }
        if let Some(sink_dir) = &self.sink_dir {
            config.sink_dir.clone_from(sink_dir);
        }
        if let Some(sink_prefix) = &self.sink_prefix {
            config.sink_prefix.clone_from(sink_prefix);
        }
        if let Some(log_interval) = self.log_interval {
            config.log_interval = log_interval;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use retrotrack_telemetry::SessionLedger;

    use super::*;

    #[test]
    fn test_partial_config_file_uses_defaults() {
        let config: CampaignConfig =
            serde_json::from_str(r#"{ "sink_dir": "runs/dqn", "workers": 6 }"#).unwrap();
        assert_eq!(config.sink_dir, PathBuf::from("runs/dqn"));
        assert_eq!(config.workers, 6);
        assert_eq!(config.ledger, PathBuf::from("trainLog.txt"));
        assert_eq!(config.log_interval, 5000);
    }

    #[test]
    fn test_flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("campaign.json");
        fs::write(&path, r#"{ "ledger": "a.txt", "log_interval": 100 }"#).unwrap();

        let args = CampaignArgs {
            config: Some(path),
            ledger: Some(PathBuf::from("b.txt")),
            ..CampaignArgs::default()
        };
        let config = args.resolve().unwrap();
        assert_eq!(config.ledger, PathBuf::from("b.txt"));
        assert_eq!(config.log_interval, 100);
    }

    #[test]
    fn test_previous_sink_paths() {
        let dir = tempfile::tempdir().unwrap();
        let config = CampaignConfig {
            sink_dir: dir.path().to_owned(),
            ..CampaignConfig::default()
        };
        for name in [
            "training_data_s0_w0.csv",
            "training_data_s0_w1.csv",
            "training_data_s1_w0.csv",
            "training_data_s0_merged.csv",
            "training_data_s2_w0.csv",
            "other_s0_w0.csv",
        ] {
            fs::write(dir.path().join(name), "").unwrap();
        }

        let paths = config.previous_sink_paths(2).unwrap();
        let names = paths
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect::<Vec<_>>();
        assert_eq!(
            names,
            vec![
                "training_data_s0_w0.csv",
                "training_data_s0_w1.csv",
                "training_data_s1_w0.csv"
            ]
        );
        assert_eq!(config.sink_path(2, 3), dir.path().join("training_data_s2_w3.csv"));
    }

    #[test]
    fn test_missing_sink_dir_has_no_history() {
        let config = CampaignConfig {
            sink_dir: PathBuf::from("/nonexistent/retrotrack"),
            ..CampaignConfig::default()
        };
        assert!(config.previous_sink_paths(5).unwrap().is_empty());
    }

    #[test]
    fn test_session_after_unreadable_ledger_skips_existing_tables() {
        let dir = tempfile::tempdir().unwrap();
        let config = CampaignConfig {
            ledger: dir.path().join("trainLog.txt"),
            sink_dir: dir.path().to_owned(),
            ..CampaignConfig::default()
        };
        for name in [
            "training_data_s0_w0.csv",
            "training_data_s0_w1.csv",
            "training_data_s1_w0.csv",
        ] {
            fs::write(dir.path().join(name), "Time (minutes),Score\n0.5,3\n").unwrap();
        }
        fs::write(&config.ledger, "garbage").unwrap();

        let campaign = Campaign::begin(SessionLedger::new(&config.ledger));
        assert!(campaign.state().is_unreadable());
        assert_eq!(config.session_for(&campaign, &[0, 1]), 2);
        assert_eq!(config.session_for(&campaign, &[1]), 1);
        assert_eq!(config.session_for(&campaign, &[2]), 0);
    }

    #[test]
    fn test_session_of_resumed_campaign_follows_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let config = CampaignConfig {
            ledger: dir.path().join("trainLog.txt"),
            sink_dir: dir.path().to_owned(),
            ..CampaignConfig::default()
        };
        fs::write(dir.path().join("training_data_s1_w0.csv"), "").unwrap();
        Campaign::begin(SessionLedger::new(&config.ledger))
            .finish()
            .unwrap();

        let campaign = Campaign::begin(SessionLedger::new(&config.ledger));
        assert!(campaign.state().is_resumed());
        assert_eq!(config.session_for(&campaign, &[0]), 1);
    }
}
