//! Interactive line terminal.
//!
//! Reads commands from a line source (stdin in the binary), drives the
//! [`ConnectionManager`], and prints link events as they arrive.
//!
//! ```text
//! /connect 98:D3:31:F5:12:7A   connect to a device
//! /reconnect                   connect to the last used device
//! /disconnect                  drop the link and disable auto-reconnect
//! /auto on|off                 toggle auto-reconnect
//! /state                       print the current state
//! /save                        write the current settings to the config file
//! /forward /reverse /left /right   send a movement command
//! /quit                        leave the terminal
//! anything else                sent to the robot as one line
//! ```
//!
//! Input is read on a dedicated OS thread (see [`spawn_line_reader`]).  A
//! blocking read there can outlive the runtime without holding up shutdown.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use robolink_core::{parse_device_line, ConnectionState, DeviceId, DeviceMessage, RobotCommand};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::application::connection_manager::ConnectionManager;
use crate::application::error::LinkError;
use crate::application::events::EventSink;
use crate::infrastructure::storage::config::{
    config_file_path, save_config, save_config_to, AppConfig, ConfigError,
};

/// Lines buffered between the reader thread and the terminal loop.
const INPUT_QUEUE: usize = 16;

/// Errors in user input.  Reported to the user, never fatal.
#[derive(Debug, Error, PartialEq)]
pub enum TerminalError {
    #[error("usage: {0}")]
    MissingArgument(&'static str),
    #[error("invalid argument for {command}: {value}")]
    InvalidArgument { command: &'static str, value: String },
}

/// One parsed line of terminal input.
#[derive(Debug, Clone, PartialEq)]
pub enum TerminalCommand {
    Connect(String),
    Reconnect,
    Disconnect,
    AutoReconnect(bool),
    State,
    Save,
    Move(RobotCommand),
    Quit,
    /// Raw text for the robot.
    Send(String),
    /// Blank input.
    Nothing,
}

/// Whether the terminal loop keeps running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Parses one line of user input.
///
/// # Errors
///
/// Returns [`TerminalError`] when a known command has a missing or invalid
/// argument.
pub fn parse_command(input: &str) -> Result<TerminalCommand, TerminalError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(TerminalCommand::Nothing);
    }

    let mut parts = trimmed.splitn(2, char::is_whitespace);
    let head = parts.next().unwrap_or_default();
    let arg = parts.next().map(str::trim).filter(|a| !a.is_empty());

    let command = match head {
        "/connect" => TerminalCommand::Connect(
            arg.ok_or(TerminalError::MissingArgument("/connect <device>"))?
                .to_string(),
        ),
        "/reconnect" => TerminalCommand::Reconnect,
        "/disconnect" => TerminalCommand::Disconnect,
        "/auto" => match arg {
            Some("on") => TerminalCommand::AutoReconnect(true),
            Some("off") => TerminalCommand::AutoReconnect(false),
            Some(other) => {
                return Err(TerminalError::InvalidArgument {
                    command: "/auto",
                    value: other.to_string(),
                })
            }
            None => return Err(TerminalError::MissingArgument("/auto on|off")),
        },
        "/state" => TerminalCommand::State,
        "/save" => TerminalCommand::Save,
        "/quit" | "/exit" => TerminalCommand::Quit,
        _ => match head.strip_prefix('/').map(str::parse::<RobotCommand>) {
            Some(Ok(movement)) if arg.is_none() => TerminalCommand::Move(movement),
            // Raw input keeps its original spacing.
            _ => TerminalCommand::Send(input.trim_end_matches(['\r', '\n']).to_string()),
        },
    };
    Ok(command)
}

/// The loaded config and where `/save` writes it.
#[derive(Debug, Clone, Default)]
pub struct ConfigFile {
    pub config: AppConfig,
    /// `None` means the platform config location.
    pub path: Option<PathBuf>,
}

impl ConfigFile {
    pub fn new(config: AppConfig, path: Option<PathBuf>) -> Self {
        Self { config, path }
    }

    /// Writes the config and returns the path it was written to.
    ///
    /// # Errors
    ///
    /// See [`save_config_to`].
    pub fn save(&self) -> Result<PathBuf, ConfigError> {
        match &self.path {
            Some(path) => {
                save_config_to(&self.config, path)?;
                Ok(path.clone())
            }
            None => {
                save_config(&self.config)?;
                config_file_path()
            }
        }
    }
}

/// Applies `command` to the manager.
///
/// # Errors
///
/// Returns an error only if writing to `out` fails.
pub async fn execute<W: Write>(
    manager: &ConnectionManager,
    config: &mut ConfigFile,
    command: TerminalCommand,
    out: &mut W,
) -> io::Result<Flow> {
    match command {
        TerminalCommand::Connect(raw) => match DeviceId::new(&raw) {
            Ok(device) => manager.connect(device),
            Err(e) => writeln!(out, "[Error] {}", LinkError::from(e))?,
        },
        TerminalCommand::Reconnect => manager.reconnect(),
        TerminalCommand::Disconnect => manager.disconnect(),
        TerminalCommand::AutoReconnect(true) => {
            manager.enable_auto_reconnect();
            writeln!(out, "auto-reconnect on")?;
        }
        TerminalCommand::AutoReconnect(false) => {
            manager.disable_auto_reconnect();
            writeln!(out, "auto-reconnect off")?;
        }
        TerminalCommand::State => {
            let auto = if manager.is_auto_reconnect_enabled() {
                "on"
            } else {
                "off"
            };
            writeln!(out, "[State] {} (auto-reconnect {auto})", manager.state())?;
        }
        TerminalCommand::Save => {
            config.config.link.auto_reconnect = manager.is_auto_reconnect_enabled();
            match config.save() {
                Ok(path) => {
                    info!("config saved to {}", path.display());
                    writeln!(out, "config saved to {}", path.display())?;
                }
                Err(e) => writeln!(out, "[Error] failed to save config: {e}")?,
            }
        }
        TerminalCommand::Move(cmd) => send_line(manager, cmd.as_wire(), out).await?,
        TerminalCommand::Send(text) => send_line(manager, &text, out).await?,
        TerminalCommand::Quit => return Ok(Flow::Quit),
        TerminalCommand::Nothing => {}
    }
    Ok(Flow::Continue)
}

async fn send_line<W: Write>(manager: &ConnectionManager, text: &str, out: &mut W) -> io::Result<()> {
    if manager.state() != ConnectionState::Connected {
        writeln!(out, "not connected; line dropped")?;
    }
    manager.write_line(text).await;
    Ok(())
}

/// Reads `input` line by line on a dedicated thread.
///
/// The thread stops at end of input, after a read error (which is forwarded)
/// or once the receiver is dropped and the next line arrives.
///
/// # Errors
///
/// Returns an error if the thread cannot be spawned.
pub fn spawn_line_reader<R>(input: R) -> io::Result<mpsc::Receiver<io::Result<String>>>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::channel(INPUT_QUEUE);
    std::thread::Builder::new()
        .name("terminal-input".into())
        .spawn(move || {
            for line in input.lines() {
                let failed = line.is_err();
                if tx.blocking_send(line).is_err() || failed {
                    break;
                }
            }
            debug!("terminal input closed");
        })?;
    Ok(rx)
}

/// Runs the command loop until `/quit` or end of input.
///
/// # Errors
///
/// Returns an error if reading the input or writing `out` fails.
pub async fn run_terminal<W: Write>(
    manager: &ConnectionManager,
    config: &mut ConfigFile,
    mut lines: mpsc::Receiver<io::Result<String>>,
    out: &mut W,
) -> io::Result<()> {
    while let Some(line) = lines.recv().await {
        let line = line?;
        match parse_command(&line) {
            Ok(command) => {
                debug!("terminal command: {command:?}");
                if execute(manager, config, command, out).await? == Flow::Quit {
                    break;
                }
            }
            Err(e) => writeln!(out, "[Error] {e}")?,
        }
        out.flush()?;
    }
    Ok(())
}

// ── Event printing ────────────────────────────────────────────────────────────

/// Human-readable summary of a decoded device message.
pub fn describe(message: &DeviceMessage) -> String {
    match message {
        DeviceMessage::TargetUpdate { id, value } => format!("target {id} = {value}"),
        DeviceMessage::RobotPosition { x, y, rotation } => {
            format!("robot at ({x}, {y}) facing {rotation} deg")
        }
        DeviceMessage::Status(status) => format!("status: {status}"),
        DeviceMessage::Obstacle { id, x, y } => format!("obstacle {id} at ({x}, {y})"),
        DeviceMessage::ClearMap => "clear map".to_string(),
        DeviceMessage::Text(text) => text.clone(),
    }
}

/// [`EventSink`] that prints events as terminal lines.
pub struct ConsoleSink<W: Write + Send> {
    out: W,
}

impl ConsoleSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> ConsoleSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn print(&mut self, line: &str) {
        // A closed stdout is not something the link can act on.
        let _ = writeln!(self.out, "{line}").and_then(|()| self.out.flush());
    }
}

impl<W: Write + Send> EventSink for ConsoleSink<W> {
    fn on_state_changed(&mut self, state: ConnectionState, detail: &str) {
        self.print(&format!("[State] {state} - {detail}"));
    }

    fn on_line_received(&mut self, line: &str) {
        self.print(&format!("[RX] {line}"));
        match parse_device_line(line) {
            Ok(messages) => {
                for message in messages
                    .iter()
                    .filter(|m| !matches!(m, DeviceMessage::Text(_)))
                {
                    self.print(&format!("     -> {}", describe(message)));
                }
            }
            Err(e) => self.print(&format!("     -> {e}")),
        }
    }

    fn on_error(&mut self, error: &LinkError) {
        self.print(&format!("[Error] {error}"));
    }
}
