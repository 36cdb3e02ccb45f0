//! The UI-owning side of the companion: settings dialog, folder opener and the
//! handler the dispatch loop drives.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::runtime::Handle;
use tracing::{info, warn};

use crate::config::{ConfigStore, SettingsChange};
use crate::remote::RemoteAlbumClient;
use crate::supervisor::SyncSupervisor;
use crate::tray::ConsoleInput;
use crate::ui_dispatch::UiHandler;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlbumChoice {
    pub title: String,
    pub item_count: u64,
    pub selected: bool,
}

/// Everything the settings dialog shows.
#[derive(Debug, Clone)]
pub struct SettingsView {
    pub local_folder: PathBuf,
    pub auto_sync: bool,
    pub selected_albums: Vec<String>,
    pub albums: Vec<AlbumChoice>,
    /// Set when the remote album list couldn't be loaded.
    pub albums_error: Option<String>,
}

pub trait SettingsDialog {
    /// Show the dialog modally. `Ok(None)` means it was dismissed.
    fn show(&mut self, view: &SettingsView) -> Result<Option<SettingsChange>>;
}

/// Settings dialog rendered as a console questionnaire.
pub struct TerminalSettingsDialog<W: Write> {
    input: ConsoleInput,
    out: W,
}

impl TerminalSettingsDialog<std::io::Stdout> {
    pub fn stdout(input: ConsoleInput) -> Self {
        Self::new(input, std::io::stdout())
    }
}

impl<W: Write> TerminalSettingsDialog<W> {
    pub fn new(input: ConsoleInput, out: W) -> Self {
        Self { input, out }
    }

    fn render(&mut self, view: &SettingsView) -> std::io::Result<()> {
        writeln!(self.out, "\nSettings")?;
        writeln!(self.out, "  Local folder: {}", view.local_folder.display())?;
        writeln!(self.out, "  Auto sync:    {}", if view.auto_sync { "on" } else { "off" })?;
        writeln!(self.out, "  Albums:")?;
        if let Some(error) = &view.albums_error {
            writeln!(self.out, "    (could not load albums: {error})")?;
        }
        for (index, album) in view.albums.iter().enumerate() {
            writeln!(
                self.out,
                "    [{}] {}. {} ({} items)",
                if album.selected { "x" } else { " " },
                index + 1,
                album.title,
                album.item_count
            )?;
        }
        self.out.flush()
    }

    fn ask(&mut self, prompt: &crate::tray::Prompt, question: &str) -> Result<Option<String>> {
        write!(self.out, "{question} ")?;
        self.out.flush()?;
        Ok(prompt.read_line())
    }
}

impl<W: Write> SettingsDialog for TerminalSettingsDialog<W> {
    fn show(&mut self, view: &SettingsView) -> Result<Option<SettingsChange>> {
        self.render(view)?;

        let prompt = self.input.begin_prompt();
        let questions = [
            "Local folder (blank keeps current):",
            "Albums to sync, comma-separated numbers, '-' for none (blank keeps current):",
            "Auto sync? [y/n] (blank keeps current):",
            "Apply? [y/N]:",
        ];

        let mut answers = Vec::with_capacity(questions.len());
        for question in questions {
            match self.ask(&prompt, question)? {
                Some(answer) => answers.push(answer),
                None => return Ok(None),
            }
        }

        parse_answers(view, &answers)
    }
}

/// Turn questionnaire answers into a settings change. `Ok(None)` if the user
/// didn't confirm.
pub fn parse_answers(view: &SettingsView, answers: &[String]) -> Result<Option<SettingsChange>> {
    let answer = |i: usize| answers.get(i).map(|s| s.trim()).unwrap_or("");

    if !matches!(answer(3).to_ascii_lowercase().as_str(), "y" | "yes") {
        return Ok(None);
    }

    let local_folder = match answer(0) {
        "" => view.local_folder.clone(),
        path => PathBuf::from(path),
    };

    let selected_albums = match answer(1) {
        "" => view.selected_albums.clone(),
        "-" => Vec::new(),
        list => list
            .split(',')
            .map(|n| {
                let n = n.trim();
                let index: usize = n.parse().with_context(|| format!("not an album number: {n:?}"))?;
                index
                    .checked_sub(1)
                    .and_then(|i| view.albums.get(i))
                    .map(|album| album.title.clone())
                    .with_context(|| format!("no album numbered {index}"))
            })
            .collect::<Result<Vec<_>>>()?,
    };

    let auto_sync = match answer(2).to_ascii_lowercase().as_str() {
        "" => view.auto_sync,
        "y" | "yes" | "on" => true,
        "n" | "no" | "off" => false,
        other => anyhow::bail!("expected y or n, got {other:?}"),
    };

    Ok(Some(SettingsChange {
        local_folder,
        selected_albums,
        auto_sync,
    }))
}

/// Open `path` in the platform file manager.
pub fn open_in_file_manager(path: &Path) -> Result<()> {
    let program = if cfg!(target_os = "macos") {
        "open"
    } else if cfg!(target_os = "windows") {
        "explorer"
    } else {
        "xdg-open"
    };

    Command::new(program)
        .arg(path)
        .spawn()
        .with_context(|| format!("failed to launch {program}"))?;
    Ok(())
}

type Opener = Box<dyn FnMut(&Path) -> Result<()>>;

/// Handles UI intents on the UI-owning thread.
pub struct DesktopUi<D: SettingsDialog> {
    store: Arc<ConfigStore>,
    client: Arc<dyn RemoteAlbumClient>,
    supervisor: Arc<SyncSupervisor>,
    runtime: Handle,
    dialog: D,
    opener: Opener,
}

impl<D: SettingsDialog> DesktopUi<D> {
    pub fn new(
        store: Arc<ConfigStore>,
        client: Arc<dyn RemoteAlbumClient>,
        supervisor: Arc<SyncSupervisor>,
        runtime: Handle,
        dialog: D,
    ) -> Self {
        Self {
            store,
            client,
            supervisor,
            runtime,
            dialog,
            opener: Box::new(open_in_file_manager),
        }
    }

    pub fn with_opener(mut self, opener: impl FnMut(&Path) -> Result<()> + 'static) -> Self {
        self.opener = Box::new(opener);
        self
    }

    /// Current configuration plus the remote album list.
    pub fn settings_view(&self) -> SettingsView {
        let config = self.store.get();

        let (albums, albums_error) = match config.credential() {
            None => (Vec::new(), Some("no API key configured".to_string())),
            Some(credential) => match self.runtime.block_on(self.client.list_albums(credential)) {
                Ok(albums) => (
                    albums
                        .into_iter()
                        .map(|album| AlbumChoice {
                            selected: config.is_selected(&album.title),
                            title: album.title,
                            item_count: album.item_count,
                        })
                        .collect(),
                    None,
                ),
                Err(e) => (Vec::new(), Some(e.to_string())),
            },
        };

        SettingsView {
            local_folder: config.local_folder.clone(),
            auto_sync: config.auto_sync,
            selected_albums: config.selected_albums.clone(),
            albums,
            albums_error,
        }
    }

    fn run_settings(&mut self) -> Result<()> {
        let view = self.settings_view();
        let Some(change) = self.dialog.show(&view)? else {
            info!("settings dismissed");
            return Ok(());
        };
        change.validate()?;

        self.store.update(|config| change.apply(config));
        info!("settings saved, restarting sync");
        self.supervisor.restart()?;
        Ok(())
    }

    fn run_open_folder(&mut self) -> Result<()> {
        let folder = self.store.get().local_folder.clone();
        std::fs::create_dir_all(&folder)
            .with_context(|| format!("failed to create {}", folder.display()))?;
        (self.opener)(&folder)
    }
}

impl<D: SettingsDialog> UiHandler for DesktopUi<D> {
    fn open_settings(&mut self) {
        if let Err(e) = self.run_settings() {
            warn!("settings failed: {e:#}");
        }
    }

    fn open_folder(&mut self) {
        if let Err(e) = self.run_open_folder() {
            warn!("failed to open local folder: {e:#}");
        }
    }

    fn sync_now(&mut self) {
        if let Err(e) = self.supervisor.sync_now() {
            warn!("{e}");
        }
    }
}
