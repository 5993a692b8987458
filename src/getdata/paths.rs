use anyhow::Result;
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct GetDataPaths {
    pub home: PathBuf,
    pub frames_dir: PathBuf,
    pub download_log_dir: PathBuf,
    pub time_log_dir: PathBuf,
    pub final_frames_dir: PathBuf,
}

impl GetDataPaths {
    pub fn under(home: PathBuf) -> Self {
        Self {
            frames_dir: home.join("frames"),
            download_log_dir: home.join("logs"),
            time_log_dir: home.join("timelogs"),
            final_frames_dir: home.join("final"),
            home,
        }
    }

    /// Frames for one proposal are staged in their own directory so a frame
    /// left behind for retry is never accounted against another proposal.
    pub fn staging_dir(&self, proposal: &str) -> PathBuf {
        self.frames_dir.join(proposal)
    }

    pub fn ledger_path(&self, proposal: &str) -> PathBuf {
        self.time_log_dir.join(format!("TimeLog_{proposal}.txt"))
    }

    pub fn summary_path(&self, proposal: &str) -> PathBuf {
        self.time_log_dir.join(format!("Time_{proposal}.html"))
    }

    pub fn downloads_path(&self, proposal: &str) -> PathBuf {
        self.download_log_dir
            .join(format!("Downloads_{proposal}.txt"))
    }

    pub fn catalog_path(&self, proposal: &str) -> PathBuf {
        self.download_log_dir.join(format!("Catalog_{proposal}.txt"))
    }

    pub fn run_log_path(&self, date: &str) -> PathBuf {
        self.download_log_dir.join(format!("DownloadLog_{date}.txt"))
    }
}

fn required_home_dir() -> Result<PathBuf> {
    if let Some(home) = dirs::home_dir() {
        return Ok(home);
    }
    Err(anyhow::anyhow!("HOME directory could not be resolved"))
}

fn env_or_default_path(var: &str, fallback: PathBuf) -> PathBuf {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => fallback,
    }
}

pub fn resolve_paths() -> Result<GetDataPaths> {
    let home = match env::var("GETDATA_HOME") {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => required_home_dir()?.join(".obscontrol"),
    };
    let defaults = GetDataPaths::under(home);

    Ok(GetDataPaths {
        frames_dir: env_or_default_path("GETDATA_FRAME_DIR", defaults.frames_dir),
        download_log_dir: env_or_default_path("GETDATA_DOWNLOADLOG_DIR", defaults.download_log_dir),
        time_log_dir: env_or_default_path("GETDATA_TIMELOG_DIR", defaults.time_log_dir),
        final_frames_dir: env_or_default_path(
            "GETDATA_FINALFRAME_DIR",
            defaults.final_frames_dir,
        ),
        home: defaults.home,
    })
}
