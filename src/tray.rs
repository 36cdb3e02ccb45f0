//! Tray integration.
//!
//! The graphical tray icon is a platform collaborator outside this crate; what
//! lives here is the seam it plugs into and a console stand-in that reads menu
//! commands from stdin.

use std::io::{self, BufRead};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::ui_dispatch::{DispatchError, UiDispatcher, UiEvent};

pub trait TrayIntegration: Send {
    /// Start delivering menu actions to `dispatcher`.
    fn start(&mut self, dispatcher: UiDispatcher) -> Result<()>;

    fn stop(&mut self);
}

const HELP: &str = "commands: settings | folder | sync | quit";

/// Map a console line to a tray menu action.
pub fn parse_command(line: &str) -> Option<UiEvent> {
    match line.trim().to_ascii_lowercase().as_str() {
        "settings" | "s" => Some(UiEvent::OpenSettings),
        "folder" | "open" | "f" => Some(UiEvent::OpenFolder),
        "sync" | "sync now" => Some(UiEvent::SyncNow),
        "quit" | "exit" | "q" => Some(UiEvent::Quit),
        _ => None,
    }
}

#[derive(Default)]
struct InputState {
    prompt: Option<Sender<String>>,
    closed: bool,
}

/// Shares one line-oriented input between tray commands and modal prompts.
///
/// While a [`Prompt`] is alive every line goes to it instead of being parsed
/// as a command.
#[derive(Clone, Default)]
pub struct ConsoleInput {
    state: Arc<Mutex<InputState>>,
}

impl ConsoleInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_prompt(&self) -> Prompt {
        let (tx, rx) = mpsc::channel();
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        if !state.closed {
            state.prompt = Some(tx);
        }
        Prompt {
            input: self.clone(),
            rx,
        }
    }

    /// Hand `line` to the active prompt, or give it back for command parsing.
    fn route(&self, line: String) -> Option<String> {
        let state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        match &state.prompt {
            Some(tx) => match tx.send(line) {
                Ok(()) => None,
                Err(mpsc::SendError(line)) => Some(line),
            },
            None => Some(line),
        }
    }

    /// No more input will arrive; pending and future prompts read nothing.
    fn close(&self) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state.closed = true;
        state.prompt = None;
    }
}

pub struct Prompt {
    input: ConsoleInput,
    rx: Receiver<String>,
}

impl Prompt {
    /// Next line, or `None` once the input is closed.
    pub fn read_line(&self) -> Option<String> {
        self.rx.recv().ok()
    }
}

impl Drop for Prompt {
    fn drop(&mut self) {
        let mut state = self.input.state.lock().unwrap_or_else(|p| p.into_inner());
        state.prompt = None;
    }
}

/// Headless tray driven by stdin.
pub struct ConsoleTray {
    input: ConsoleInput,
    shutdown: CancellationToken,
    reader: Option<Box<dyn BufRead + Send>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl ConsoleTray {
    pub fn new(input: ConsoleInput) -> Self {
        Self::with_reader(input, Box::new(io::BufReader::new(io::stdin())))
    }

    pub fn with_reader(input: ConsoleInput, reader: Box<dyn BufRead + Send>) -> Self {
        Self {
            input,
            shutdown: CancellationToken::new(),
            reader: Some(reader),
            handle: None,
        }
    }

    /// Wait for the reader thread. Only returns once its input hit EOF.
    pub fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl TrayIntegration for ConsoleTray {
    fn start(&mut self, dispatcher: UiDispatcher) -> Result<()> {
        let reader = self
            .reader
            .take()
            .context("console tray already started")?;
        let input = self.input.clone();
        let shutdown = self.shutdown.clone();

        let handle = thread::Builder::new()
            .name("tray".to_string())
            .spawn(move || pump(reader, &input, &dispatcher, &shutdown))
            .context("failed to spawn tray thread")?;
        self.handle = Some(handle);

        info!("{HELP}");
        Ok(())
    }

    /// Stops dispatching. A read already blocked on stdin is left to finish
    /// with the process.
    fn stop(&mut self) {
        self.shutdown.cancel();
        if self.handle.as_ref().is_some_and(|h| h.is_finished()) {
            self.join();
        }
    }
}

fn pump(
    reader: Box<dyn BufRead + Send>,
    input: &ConsoleInput,
    dispatcher: &UiDispatcher,
    shutdown: &CancellationToken,
) {
    for line in reader.lines() {
        if shutdown.is_cancelled() {
            break;
        }
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!("tray input failed: {e}");
                break;
            }
        };

        let Some(line) = input.route(line) else {
            continue;
        };
        if line.trim().is_empty() {
            continue;
        }

        match parse_command(&line) {
            Some(event) => match dispatcher.post(event) {
                Ok(()) => {}
                Err(DispatchError::Closed) => break,
                Err(e) => warn!("{e}"),
            },
            None => println!("unknown command {:?}; {HELP}", line.trim()),
        }
    }

    input.close();
    debug!("tray input closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui_dispatch::{channel, LoopExit, UiHandler};
    use std::io::Cursor;

    #[derive(Default)]
    struct Recorder(Vec<UiEvent>);

    impl UiHandler for Recorder {
        fn open_settings(&mut self) {
            self.0.push(UiEvent::OpenSettings);
        }
        fn open_folder(&mut self) {
            self.0.push(UiEvent::OpenFolder);
        }
        fn sync_now(&mut self) {
            self.0.push(UiEvent::SyncNow);
        }
    }

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command("settings"), Some(UiEvent::OpenSettings));
        assert_eq!(parse_command("  SYNC "), Some(UiEvent::SyncNow));
        assert_eq!(parse_command("open"), Some(UiEvent::OpenFolder));
        assert_eq!(parse_command("q"), Some(UiEvent::Quit));
        assert_eq!(parse_command("reboot"), None);
    }

    #[test]
    fn test_console_tray_posts_commands_in_order() {
        let (dispatcher, event_loop) = channel(8);
        let reader = Cursor::new("sync\n\nbogus\nfolder\nquit\n");
        let mut tray = ConsoleTray::with_reader(ConsoleInput::new(), Box::new(reader));
        tray.start(dispatcher).unwrap();

        let mut recorder = Recorder::default();
        let exit = event_loop.run(&mut recorder, &CancellationToken::new());
        tray.join();

        assert_eq!(exit, LoopExit::Quit);
        assert_eq!(recorder.0, vec![UiEvent::SyncNow, UiEvent::OpenFolder]);
    }

    #[test]
    fn test_start_twice_fails() {
        let (dispatcher, _event_loop) = channel(8);
        let mut tray = ConsoleTray::with_reader(ConsoleInput::new(), Box::new(Cursor::new("")));
        tray.start(dispatcher.clone()).unwrap();
        assert!(tray.start(dispatcher).is_err());
        tray.join();
    }

    #[test]
    fn test_prompt_captures_lines() {
        let input = ConsoleInput::new();
        let prompt = input.begin_prompt();

        assert_eq!(input.route("answer".to_string()), None);
        assert_eq!(prompt.read_line().as_deref(), Some("answer"));

        drop(prompt);
        assert_eq!(input.route("sync".to_string()).as_deref(), Some("sync"));
    }

    #[test]
    fn test_closed_input_ends_prompts() {
        let input = ConsoleInput::new();
        let pending = input.begin_prompt();
        input.close();
        assert_eq!(pending.read_line(), None);
        assert_eq!(input.begin_prompt().read_line(), None);
    }
}
