use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;

use photosync_lib::config::{default_config_path, ConfigStore};
use photosync_lib::logging::ActivityLog;
use photosync_lib::remote::live::DEFAULT_API_BASE;
use photosync_lib::remote::ClientMode;
use photosync_lib::sync_engine::{
    CycleStatus, ReconciliationEngine, SyncFailureKind, WorkerContext, DEFAULT_SYNC_INTERVAL,
};

#[derive(Parser)]
#[command(name = "sync-cli")]
#[command(about = "Run one photo album sync cycle", long_about = None)]
struct Cli {
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Use the offline album library
    #[arg(long)]
    simulated: bool,

    #[arg(long, default_value = DEFAULT_API_BASE)]
    api_base: String,

    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Sync even if auto_sync is off in the configuration
    #[arg(short, long)]
    force: bool,

    #[arg(long)]
    list_albums: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    photosync_lib::logging::init();
    let cli = Cli::parse();

    let path = cli.config.unwrap_or_else(default_config_path);
    let force = cli.force;
    let store = Arc::new(ConfigStore::open_with(path.clone(), |c| {
        if force {
            c.auto_sync = true;
        }
    }));

    let mode = if cli.simulated {
        ClientMode::Simulated
    } else {
        ClientMode::Live {
            base_url: cli.api_base,
        }
    };
    let client = mode.build()?;

    if cli.list_albums {
        let current = store.get();
        let credential = current
            .credential()
            .ok_or_else(|| anyhow::anyhow!("No api_key in {path:?}"))?;
        let albums = client.list_albums(credential).await?;
        println!("Found {} album(s):", albums.len());
        println!("{:<4} {:<40} {:>8}", "SEL", "TITLE", "ITEMS");
        println!("{}", "-".repeat(54));
        for album in albums {
            let mark = if current.is_selected(&album.title) { "[x]" } else { "[ ]" };
            println!("{:<4} {:<40} {:>8}", mark, album.title, album.item_count);
        }
        return Ok(());
    }

    let engine = ReconciliationEngine::new(
        store.clone(),
        client,
        Arc::new(ActivityLog::default()),
        DEFAULT_SYNC_INTERVAL,
    );

    if cli.dry_run {
        println!("🔍 Dry-run mode - comparing albums with {:?}...", store.get().local_folder);
        println!();

        let plans = engine.plan().await?;
        for plan in &plans {
            if !plan.found {
                println!("   ❓ {} - not found remotely, skipped", plan.title);
                continue;
            }
            println!(
                "   📁 {} - {} present, {} to download",
                plan.title,
                plan.present,
                plan.missing.len()
            );
            for name in &plan.missing {
                println!("      ➕ {name}");
            }
        }
        if plans.iter().all(|p| p.missing.is_empty()) {
            println!("✅ Albums are in sync!");
        }
        return Ok(());
    }

    println!("🚀 Starting synchronization...");
    println!("   Folder: {:?}", store.get().local_folder);
    println!("   Albums: {}", store.get().selected_albums.join(", "));
    println!();

    let ctx = WorkerContext::standalone();
    let interrupt = ctx.cancel_token().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );

    let progress = |progress: photosync_lib::sync_engine::SyncProgress| {
        pb.set_length(progress.total_items);
        pb.set_position(progress.processed_items);
        match (progress.album, progress.current_file) {
            (Some(album), Some(file)) => pb.set_message(format!("{album} - {file}")),
            (Some(album), None) => pb.set_message(album),
            _ => {}
        }
    };
    let report = engine.run_cycle(&ctx, &progress).await;

    match report.status {
        CycleStatus::Completed => pb.finish_with_message("✅ Synchronization complete!"),
        CycleStatus::NotReady => {
            pb.abandon();
            eprintln!("❌ Sync is not ready: enable auto_sync (or pass --force) and set local_folder and api_key in {path:?}");
            std::process::exit(1);
        }
        CycleStatus::AuthRejected => {
            pb.abandon_with_message("❌ Credential rejected!");
        }
        CycleStatus::Superseded => {
            pb.abandon_with_message("⏹ Interrupted");
        }
    }

    println!();
    println!("📊 Results:");
    println!("   Albums scanned: {}", report.albums_scanned);
    println!("   Files downloaded: {}", report.items_downloaded);
    println!("   Already present: {}", report.items_present);
    println!("   Unavailable: {}", report.items_unavailable);
    println!("   Bytes downloaded: {} MB", report.bytes_downloaded / 1_048_576);
    for title in &report.albums_missing {
        println!("   ❓ Album not found remotely: {title}");
    }
    if !report.failures.is_empty() {
        println!("   Errors: {}", report.failures.len());
        for failure in &report.failures {
            let kind_str = match failure.kind {
                SyncFailureKind::Auth => "Auth",
                SyncFailureKind::Network => "Network",
                SyncFailureKind::Filesystem => "Filesystem",
            };
            eprintln!(
                "   ⚠️  [{}] {}/{}: {}",
                kind_str,
                failure.album.as_deref().unwrap_or("-"),
                failure.filename.as_deref().unwrap_or("-"),
                failure.message
            );
        }
    }

    if report.status == CycleStatus::AuthRejected {
        std::process::exit(1);
    }
    Ok(())
}
