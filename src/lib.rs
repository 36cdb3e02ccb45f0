pub mod config;
pub mod control_server;
pub mod desktop;
pub mod error_codes;
pub mod input_validation;
pub mod logging;
pub mod path_validation;
pub mod remote;
pub mod supervisor;
pub mod sync_engine;
pub mod tray;
pub mod ui_dispatch;


use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use config::ConfigStore;
use control_server::ControlState;
use desktop::{DesktopUi, TerminalSettingsDialog};
use logging::ActivityLog;
pub use remote::ClientMode;
use supervisor::SyncSupervisor;
use sync_engine::ReconciliationEngine;
use tray::{ConsoleInput, ConsoleTray, TrayIntegration};
use ui_dispatch::{UiDispatcher, UiEvent};

/// Process-level options, filled from the command line.
#[derive(Debug, Clone)]
pub struct AppOptions {
    pub config_path: PathBuf,
    pub client_mode: ClientMode,
    pub bind: IpAddr,
    pub port: u16,
    pub web_dir: PathBuf,
    pub interval: Duration,
    pub queue_capacity: usize,
}

/// Run the companion until the user quits.
///
/// The calling thread becomes the UI-owning thread; it must not be inside a
/// tokio runtime.
pub fn run(options: AppOptions) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("photosync-rt")
        .build()
        .context("failed to start async runtime")?;

    let store = Arc::new(ConfigStore::open(options.config_path.clone()));
    let activity = Arc::new(ActivityLog::default());
    let client = options
        .client_mode
        .build()
        .context("failed to create album client")?;
    info!(client = client.name(), "album client ready");

    let engine = Arc::new(ReconciliationEngine::new(
        Arc::clone(&store),
        Arc::clone(&client),
        Arc::clone(&activity),
        options.interval,
    ));
    let supervisor = Arc::new(SyncSupervisor::new(engine, runtime.handle().clone()));

    let (dispatcher, event_loop) = ui_dispatch::channel(options.queue_capacity);
    let shutdown = CancellationToken::new();

    let state = Arc::new(ControlState {
        store: Arc::clone(&store),
        supervisor: Arc::clone(&supervisor),
        activity,
    });
    let server = spawn_control_server(&runtime, &options, state, shutdown.clone());

    spawn_quit_on_ctrl_c(&runtime, dispatcher.clone());

    supervisor.start()?;

    let input = ConsoleInput::new();
    let mut tray = ConsoleTray::new(input.clone());
    tray.start(dispatcher)?;

    let mut ui = DesktopUi::new(
        store,
        client,
        Arc::clone(&supervisor),
        runtime.handle().clone(),
        TerminalSettingsDialog::stdout(input),
    );
    let exit = event_loop.run(&mut ui, &shutdown);
    info!(?exit, "shutting down");

    supervisor.stop();
    tray.stop();
    shutdown.cancel();
    if let Some(server) = server {
        if let Err(e) = runtime.block_on(server) {
            warn!("control server task failed: {e}");
        }
    }
    runtime.shutdown_timeout(Duration::from_secs(2));
    Ok(())
}

fn spawn_control_server(
    runtime: &Runtime,
    options: &AppOptions,
    state: Arc<ControlState>,
    shutdown: CancellationToken,
) -> Option<tokio::task::JoinHandle<()>> {
    let web_dir = control_server::resolve_web_dir(&options.web_dir)?;
    let app = control_server::router(state, Some(&web_dir));

    let addr = SocketAddr::new(options.bind, options.port);
    let listener = match runtime.block_on(tokio::net::TcpListener::bind(addr)) {
        Ok(listener) => listener,
        Err(e) => {
            error!("failed to bind control server to {addr}: {e}");
            return None;
        }
    };

    Some(runtime.spawn(async move {
        if let Err(e) = control_server::serve(listener, app, shutdown).await {
            error!("control server error: {e}");
        }
    }))
}

fn spawn_quit_on_ctrl_c(runtime: &Runtime, dispatcher: UiDispatcher) {
    runtime.spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        info!("interrupt received");
        // Quit blocks until the queue has room.
        let _ = tokio::task::spawn_blocking(move || dispatcher.post(UiEvent::Quit)).await;
    });
}
