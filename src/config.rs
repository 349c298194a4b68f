use std::path::PathBuf;

use crate::api::Session;
use crate::cli::SessionArgs;

/// Resolved runtime configuration shared by every command.
pub struct Config {
    pub session: Session,
    pub storage_dir: PathBuf,
}

impl Config {
    pub fn from_args(args: &SessionArgs) -> anyhow::Result<Self> {
        let session = Session::new(&args.base_url, &args.access_token, &args.user_id)?;
        Ok(Self {
            session,
            storage_dir: expand_tilde(&args.directory),
        })
    }

    /// Root of the offline artifact tree for this user and host.
    pub fn offline_root(&self) -> PathBuf {
        self.session.offline_root(&self.storage_dir)
    }

    /// State database path, next to the user's offline tree.
    pub fn db_path(&self) -> PathBuf {
        self.storage_dir
            .join(format!(
                "{}-{}",
                self.session.host(),
                self.session.user_id()
            ))
            .join("state.db")
    }
}

/// Expand ~ to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}
