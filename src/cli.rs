use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "offcourse", about = "Selective offline sync for LMS course content")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Choose which courses, tabs and files to keep offline
    Select(SelectArgs),
    /// Download the saved selection
    Sync(SyncArgs),
    /// Show offline state and disk usage
    Status(StatusArgs),
    /// Remove artifacts pending cleanup without running a sync
    Cleanup(CleanupArgs),
}

impl Command {
    pub fn session(&self) -> &SessionArgs {
        match self {
            Command::Select(args) => &args.session,
            Command::Sync(args) => &args.session,
            Command::Status(args) => &args.session,
            Command::Cleanup(args) => &args.session,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct SessionArgs {
    /// Base URL of the LMS instance (e.g. https://school.instructure.com)
    #[arg(long, env = "OFFCOURSE_BASE_URL")]
    pub base_url: String,

    /// API access token.
    /// WARNING: passing via --access-token is visible in process listings.
    /// Prefer the OFFCOURSE_TOKEN environment variable instead.
    #[arg(long, env = "OFFCOURSE_TOKEN", hide_env_values = true)]
    pub access_token: String,

    /// Server id of the signed-in user
    #[arg(long, env = "OFFCOURSE_USER_ID")]
    pub user_id: String,

    /// Directory for offline content and state
    #[arg(short = 'd', long, default_value = "~/.offcourse")]
    pub directory: String,

    /// Log level
    #[arg(long, value_enum, default_value = "info")]
    pub log_level: LogLevel,
}

#[derive(Args, Debug)]
pub struct SelectArgs {
    #[command(flatten)]
    pub session: SessionArgs,

    /// Limit the command to one course id
    #[arg(long)]
    pub course: Option<String>,

    /// Select every tab and file of every course
    #[arg(long)]
    pub all: bool,

    /// Tab to select (files, modules, people, ...); repeatable
    #[arg(long = "tab")]
    pub tabs: Vec<String>,

    /// File id to select; repeatable
    #[arg(long = "file")]
    pub files: Vec<String>,

    /// Start from an empty selection instead of the saved one
    #[arg(long)]
    pub clear: bool,

    /// Print the content tree with selection markers, changing nothing
    #[arg(long)]
    pub list: bool,

    /// Refresh lists from the server even when the cache is fresh
    #[arg(long)]
    pub refresh: bool,
}

#[derive(Args, Debug)]
pub struct SyncArgs {
    #[command(flatten)]
    pub session: SessionArgs,

    /// Concurrent file downloads per course
    #[arg(long, default_value_t = 4)]
    pub concurrency: usize,

    /// Retries per download on transient failures
    #[arg(long, default_value_t = 0)]
    pub max_retries: u32,

    /// Report what would change without touching disk or state
    #[arg(long)]
    pub dry_run: bool,

    /// Disable progress bar
    #[arg(long)]
    pub no_progress_bar: bool,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    #[command(flatten)]
    pub session: SessionArgs,
}

#[derive(Args, Debug)]
pub struct CleanupArgs {
    #[command(flatten)]
    pub session: SessionArgs,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base(cmd: &[&str]) -> Vec<String> {
        let mut args = vec!["offcourse".to_string()];
        args.extend(cmd.iter().map(|s| s.to_string()));
        args.extend(
            [
                "--base-url",
                "https://school.test",
                "--access-token",
                "tok",
                "--user-id",
                "u1",
            ]
            .iter()
            .map(|s| s.to_string()),
        );
        args
    }

    #[test]
    fn select_accepts_repeated_tabs_and_files() {
        let cli = Cli::try_parse_from(base(&[
            "select", "--course", "c1", "--tab", "files", "--tab", "modules", "--file", "9",
        ]))
        .unwrap();
        let Command::Select(args) = cli.command else {
            panic!("expected select");
        };
        assert_eq!(args.tabs, vec!["files", "modules"]);
        assert_eq!(args.files, vec!["9"]);
        assert_eq!(args.course.as_deref(), Some("c1"));
    }

    #[test]
    fn sync_defaults() {
        let cli = Cli::try_parse_from(base(&["sync"])).unwrap();
        let Command::Sync(args) = cli.command else {
            panic!("expected sync");
        };
        assert_eq!(args.concurrency, 4);
        assert_eq!(args.max_retries, 0);
        assert!(!args.dry_run);
    }

    #[test]
    fn missing_token_is_a_parse_error() {
        let result = Cli::try_parse_from([
            "offcourse",
            "status",
            "--base-url",
            "https://school.test",
            "--user-id",
            "u1",
        ]);
        assert!(result.is_err());
    }
}
