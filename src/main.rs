//! offcourse: selective offline mirror of LMS course content.
//!
//! Builds a per-course selection tree (tabs and files), persists the chosen
//! ids, and syncs the selection to a local filesystem layout: files stream
//! to durable artifacts, module pages render to HTML, rosters are cached,
//! and hosted-video embeds are replaced with local copies. Re-running a
//! sync is a safe no-op for anything already current.

#![warn(clippy::all)]

mod api;
mod cli;
mod config;
mod disk;
mod retry;
mod selection;
mod shutdown;
mod state;
mod store;
mod sync;

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use api::Api;
use cli::Command;
use config::Config;
use retry::RetryConfig;
use selection::{CourseSyncSelector, NodeRef, TabKind};
use state::{SqliteStateDb, StateDb};
use store::Store;
use sync::{CategoryReport, SyncConfig, SyncError, SyncOrchestrator, SyncReport};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    let filter = cli.command.session().log_level.as_filter();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    match cli.command {
        Command::Select(args) => run_select(args).await,
        Command::Sync(args) => run_sync(args).await,
        Command::Status(args) => run_status(args).await,
        Command::Cleanup(args) => run_cleanup(args).await,
    }
}

async fn open_db(config: &Config) -> anyhow::Result<Arc<SqliteStateDb>> {
    let db_path = config.db_path();
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(Arc::new(SqliteStateDb::open(&db_path).await?))
}

async fn run_select(args: cli::SelectArgs) -> anyhow::Result<()> {
    if !args.all && !args.clear && !args.list && args.tabs.is_empty() && args.files.is_empty() {
        anyhow::bail!("nothing to do: pass --all, --tab/--file, --clear or --list");
    }
    if (!args.tabs.is_empty() || !args.files.is_empty()) && args.course.is_none() {
        anyhow::bail!("--tab and --file require --course");
    }

    let config = Config::from_args(&args.session)?;
    let db = open_db(&config).await?;
    let api = Arc::new(Api::new(config.session.clone()));
    let store = Store::new(api, db.clone());

    let entries =
        selection::load_course_sync_entries(&store, args.course.as_deref(), args.refresh).await?;
    if entries.is_empty() {
        anyhow::bail!("no matching courses");
    }
    let mut selector = CourseSyncSelector::new(entries);

    // Start from the saved selection so repeated invocations are additive.
    if !args.clear {
        restore_saved_selection(&mut selector, db.as_ref()).await?;
    }

    if args.list {
        print_tree(&selector);
        return Ok(());
    }

    if args.all {
        selector.toggle_all_courses_selection(true);
    }
    if let Some(course) = &args.course {
        for tab in &args.tabs {
            let kind = TabKind::parse(tab)
                .ok_or_else(|| anyhow::anyhow!("unknown tab: {tab}"))?;
            selector.set_selected(NodeRef::Tab { course, kind }, true)?;
        }
        for file in &args.files {
            selector.set_selected(NodeRef::File { course, file }, true)?;
        }
    }

    selector.save_selection(db.as_ref()).await?;
    println!(
        "Selected {} items ({}) across {} courses",
        selector.selected_count(),
        disk::format_bytes(selector.selected_size()),
        selector.entries().len()
    );
    Ok(())
}

/// Re-apply the persisted node ids onto a freshly loaded tree. Nodes that
/// no longer exist on the server are dropped with a debug log.
async fn restore_saved_selection(
    selector: &mut CourseSyncSelector,
    db: &dyn StateDb,
) -> anyhow::Result<()> {
    let course_ids: Vec<String> = selector.entries().iter().map(|e| e.id.clone()).collect();
    for course in &course_ids {
        let nodes = db.get_selection(course).await?;
        for node in selector.restore_selection(course, &nodes)? {
            tracing::debug!(course = %course, node = %node, "dropping stale selection node");
        }
    }
    Ok(())
}

fn print_tree(selector: &CourseSyncSelector) {
    for entry in selector.entries() {
        let marker = match entry.selection_state() {
            selection::SelectionState::All => "[x]",
            selection::SelectionState::Partial => "[~]",
            selection::SelectionState::Empty => "[ ]",
        };
        println!("{} {}  {}", marker, entry.id, entry.name);
        for tab in &entry.tabs {
            println!(
                "    [{}] tab:{}  {}",
                if tab.selected { 'x' } else { ' ' },
                tab.kind.as_str(),
                tab.label
            );
        }
        for file in &entry.files {
            println!(
                "    [{}] file:{}  {} ({})",
                if file.selected { 'x' } else { ' ' },
                file.id,
                file.display_name,
                disk::format_bytes(file.size_bytes)
            );
        }
    }
    println!(
        "\n{} items selected ({})",
        selector.selected_count(),
        disk::format_bytes(selector.selected_size())
    );
}

async fn run_sync(args: cli::SyncArgs) -> anyhow::Result<()> {
    let config = Config::from_args(&args.session)?;
    let db = open_db(&config).await?;
    let api = Arc::new(Api::new(config.session.clone()));
    let store = Arc::new(Store::new(api.clone(), db.clone()));

    tracing::info!(
        user = %config.session,
        concurrency = args.concurrency,
        "Starting offcourse sync"
    );

    let cancel = shutdown::install_signal_handler();
    let orchestrator = SyncOrchestrator::new(
        api,
        store,
        db,
        config.offline_root(),
        SyncConfig {
            concurrency: args.concurrency,
            retry: RetryConfig {
                max_retries: args.max_retries,
                ..Default::default()
            },
            dry_run: args.dry_run,
            no_progress_bar: args.no_progress_bar,
        },
    );

    let report = orchestrator.sync(&cancel).await?;
    print_report(&report);

    if report.has_failures() {
        std::process::exit(1);
    }
    Ok(())
}

fn category_line(name: &str, category: &Option<Result<CategoryReport, SyncError>>) {
    match category {
        None => {}
        Some(Ok(report)) => println!(
            "  {:<8} {} synced, {} skipped, {} failed",
            name,
            report.synced,
            report.skipped,
            report.failed.len()
        ),
        Some(Err(e)) => println!("  {:<8} FAILED: {}", name, e),
    }
}

fn print_report(report: &SyncReport) {
    for course in &report.courses {
        println!("Course {}:", course.course_id);
        category_line("files", &course.files);
        category_line("modules", &course.modules);
        category_line("people", &course.people);
        if course.cleaned > 0 {
            println!("  cleaned  {} removed", course.cleaned);
        }
        if let Some(Ok(files)) = &course.files {
            for failure in &files.failed {
                println!("    failed file {}: {}", failure.id, failure.error);
            }
        }
    }
    category_line("videos", &report.studio);
    if report.interrupted {
        println!("Sync interrupted; re-run to resume.");
    }
}

async fn run_status(args: cli::StatusArgs) -> anyhow::Result<()> {
    let config = Config::from_args(&args.session)?;
    let db_path = config.db_path();
    if !db_path.exists() {
        println!("No state database found at {}", db_path.display());
        println!("Run a select and a sync first.");
        return Ok(());
    }

    let db = SqliteStateDb::open(&db_path).await?;
    let summary = db.get_summary().await?;
    let space = disk::measure(&config.offline_root()).await?;

    println!("State database: {}", db_path.display());
    println!();
    println!("Files:");
    println!("  Total:      {}", summary.total_files);
    println!("  Downloaded: {}", summary.downloaded);
    println!("  Pending:    {}", summary.pending);
    println!("  Failed:     {}", summary.failed);
    println!("  Recorded:   {}", disk::format_bytes(summary.bytes_on_disk));
    println!("Videos offline: {}", summary.studio_videos);
    println!("Courses selected: {}", summary.selected_courses);
    if let Some(completed) = &summary.last_run_completed_at {
        println!(
            "Last sync completed: {}",
            completed.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
    println!();
    println!("Disk:");
    println!("  Offline content: {}", disk::format_bytes(space.app_used));
    println!("  Other usage:     {}", disk::format_bytes(space.other_used));
    println!("  Available:       {}", disk::format_bytes(space.available));
    println!("  Volume total:    {}", disk::format_bytes(space.total));
    Ok(())
}

async fn run_cleanup(args: cli::CleanupArgs) -> anyhow::Result<()> {
    let config = Config::from_args(&args.session)?;
    let db_path = config.db_path();
    if !db_path.exists() {
        println!("No state database found at {}", db_path.display());
        return Ok(());
    }

    let db: Arc<dyn StateDb> = Arc::new(SqliteStateDb::open(&db_path).await?);
    let files = sync::FilesInteractor::new(
        reqwest::Client::new(),
        config.session.access_token().to_string(),
        db.clone(),
        config.offline_root(),
        1,
        RetryConfig::default(),
        false,
    );

    let mut removed = 0;
    for course in db.get_cleanup_courses().await? {
        removed += files.cleanup_deselected(&course).await?;
    }
    println!("Removed {} artifacts", removed);
    Ok(())
}
