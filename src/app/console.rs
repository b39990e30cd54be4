use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError};

use tracing::{debug, warn};

use crate::app::catalog::{search, DEFAULT_GROUPS};
use crate::app::commands::Workbench;
use crate::app::state::AppState;
use crate::app::terminal::TerminalKey;

pub const HELP: &str = "\
Commands:
  start                    start the ADB server and list devices
  stop                     stop the ADB server
  devices                  refresh the device list
  select <n|label>         select a device by number or by \"model - serial\"
  packages [query]         load packages (no query) or filter the loaded list
  uninstall <pkg>...       uninstall packages for the configured user
  groups [query]           search the built-in package groups
  uninstall-group <name>   uninstall every package of a group
  root                     toggle root mode
  cleanup <file>           remove the device paths listed in <file> (root mode)
  keep-data <on|off>       keep app data on uninstall (saved to the config file)
  shell                    open an interactive shell on the selected device
  help                     show this help
  quit                     stop ADB if it was started and exit

Inside the shell: :int interrupts, :up/:down recall history, :exit-shell returns here.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Start,
    Stop,
    Devices,
    Select(String),
    Packages(Option<String>),
    Uninstall(Vec<String>),
    Groups(String),
    UninstallGroup(String),
    Root,
    Cleanup(PathBuf),
    KeepData(bool),
    Shell,
    Help,
    Quit,
}

pub fn parse_command(line: &str) -> Result<ConsoleCommand, String> {
    let line = line.trim();
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };
    let required = |what: &str| {
        if rest.is_empty() {
            Err(format!("{verb} requires {what}"))
        } else {
            Ok(rest.to_string())
        }
    };
    let command = match verb.to_lowercase().as_str() {
        "start" => ConsoleCommand::Start,
        "stop" => ConsoleCommand::Stop,
        "devices" => ConsoleCommand::Devices,
        "select" => ConsoleCommand::Select(required("a device number or label")?),
        "packages" => ConsoleCommand::Packages((!rest.is_empty()).then(|| rest.to_string())),
        "uninstall" => ConsoleCommand::Uninstall(
            rest.split_whitespace().map(str::to_string).collect(),
        ),
        "groups" => ConsoleCommand::Groups(rest.to_string()),
        "uninstall-group" => ConsoleCommand::UninstallGroup(required("a group name")?),
        "root" => ConsoleCommand::Root,
        "cleanup" => ConsoleCommand::Cleanup(PathBuf::from(required("a file path")?)),
        "keep-data" => match required("on or off")?.to_lowercase().as_str() {
            "on" => ConsoleCommand::KeepData(true),
            "off" => ConsoleCommand::KeepData(false),
            _ => return Err("keep-data takes on or off".to_string()),
        },
        "shell" => ConsoleCommand::Shell,
        "help" | "?" => ConsoleCommand::Help,
        "quit" | "exit" => ConsoleCommand::Quit,
        "" => return Err(String::new()),
        other => return Err(format!("Unknown command: {other}. Type help.")),
    };
    Ok(command)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Line-oriented front-end. Owns the coordination state; the stdin reader only forwards
/// lines over a channel so the loop keeps pumping completions while the user is idle.
pub struct Console {
    workbench: Workbench,
    state: AppState,
    in_shell: bool,
    /// How much of the terminal transcript has already been printed.
    printed: usize,
}

impl Console {
    pub fn new(workbench: Workbench) -> Self {
        Self {
            workbench,
            state: AppState::new(),
            in_shell: false,
            printed: 0,
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn run(mut self) {
        let (sender, receiver) = mpsc::channel::<String>();
        let reader = std::thread::Builder::new()
            .name("stdin-reader".to_string())
            .spawn(move || {
                for line in io::stdin().lock().lines() {
                    match line {
                        Ok(line) => {
                            if sender.send(line).is_err() {
                                break;
                            }
                        }
                        Err(err) => {
                            warn!(error = %err, "failed to read stdin");
                            break;
                        }
                    }
                }
            });
        if let Err(err) = reader {
            warn!(error = %err, "failed to start stdin reader");
            return;
        }

        let tick = self.workbench.config().tick_interval();
        let mut out = io::stdout();
        let _ = writeln!(out, "{HELP}");
        loop {
            match receiver.recv_timeout(tick) {
                Ok(line) => {
                    if self.handle_line(&line, &mut out) == Flow::Quit {
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
            self.after_tick(&mut out);
        }
        self.workbench.shutdown(&mut self.state);
    }

    /// One coordination cycle: apply finished work, then drain the terminal.
    pub fn after_tick(&mut self, out: &mut impl Write) {
        self.workbench.pump(&mut self.state);
        if let Some(terminal) = self.state.terminal.as_mut() {
            terminal.tick();
        }
        self.flush_terminal(out);
    }

    pub fn handle_line(&mut self, line: &str, out: &mut impl Write) -> Flow {
        if self.in_shell {
            self.handle_shell_line(line, out);
            return Flow::Continue;
        }
        if self.state.pending_cleanup.is_some() {
            match line.trim().to_lowercase().as_str() {
                "y" | "yes" => self.workbench.confirm_cleanup(&mut self.state, true),
                "n" | "no" => self.workbench.confirm_cleanup(&mut self.state, false),
                _ => {
                    let _ = writeln!(out, "Please answer y or n.");
                }
            }
            return Flow::Continue;
        }

        let command = match parse_command(line) {
            Ok(command) => command,
            Err(message) => {
                if !message.is_empty() {
                    let _ = writeln!(out, "{message}");
                }
                return Flow::Continue;
            }
        };
        debug!(command = ?command, "console command");
        let bench = &mut self.workbench;
        let state = &mut self.state;
        match command {
            ConsoleCommand::Start => bench.start(state),
            ConsoleCommand::Stop => bench.stop(state),
            ConsoleCommand::Devices => {
                bench.refresh_devices(state);
            }
            ConsoleCommand::Select(choice) => bench.select(state, &choice),
            ConsoleCommand::Packages(None) => bench.load_packages(state),
            ConsoleCommand::Packages(Some(query)) => {
                for (index, entry) in bench.visible_packages(state, &query).iter().enumerate() {
                    let _ = writeln!(
                        out,
                        "{:>4}. {:<60} {:<8} {}",
                        index + 1,
                        entry.package_name,
                        entry.status,
                        entry.origin
                    );
                }
            }
            ConsoleCommand::Uninstall(packages) => bench.uninstall(state, packages),
            ConsoleCommand::Groups(query) => {
                if query.trim().is_empty() {
                    for group in DEFAULT_GROUPS {
                        let _ = writeln!(out, "{} ({} packages)", group.name, group.packages.len());
                    }
                } else {
                    for (group, package) in search(&query) {
                        let _ = writeln!(out, "{group:<10} {package}");
                    }
                }
            }
            ConsoleCommand::UninstallGroup(name) => bench.uninstall_group(state, &name),
            ConsoleCommand::Root => bench.toggle_root_mode(state),
            ConsoleCommand::Cleanup(path) => bench.request_cleanup(state, path),
            ConsoleCommand::KeepData(keep) => bench.set_keep_data(keep),
            ConsoleCommand::Shell => {
                if state.terminal.is_none() {
                    bench.open_terminal(state);
                    self.printed = 0;
                }
                if self.state.terminal.is_some() {
                    self.in_shell = true;
                    self.flush_terminal(out);
                }
            }
            ConsoleCommand::Help => {
                let _ = writeln!(out, "{HELP}");
            }
            ConsoleCommand::Quit => return Flow::Quit,
        }
        Flow::Continue
    }

    fn handle_shell_line(&mut self, line: &str, out: &mut impl Write) {
        let Some(terminal) = self.state.terminal.as_mut() else {
            self.in_shell = false;
            return;
        };
        let keys = match line.trim() {
            ":exit-shell" => {
                self.in_shell = false;
                let _ = writeln!(out);
                return;
            }
            ":int" => vec![TerminalKey::Interrupt],
            ":up" => vec![TerminalKey::Up],
            ":down" => vec![TerminalKey::Down],
            _ => vec![
                TerminalKey::Escape,
                TerminalKey::Paste(line.to_string()),
                TerminalKey::Enter,
            ],
        };
        let typed_from = terminal.buffer().input_start();
        let mut echoed_to = None;
        for key in keys {
            let submitting = key == TerminalKey::Enter;
            // The submitted line plus its newline, already echoed by the user's terminal.
            let submitted_end = terminal.transcript().len() + 1;
            match terminal.handle_key(key) {
                Ok(()) if submitting => echoed_to = Some(submitted_end),
                Ok(()) => {}
                Err(err) => {
                    let _ = writeln!(out, "\n{}", err.error);
                }
            }
        }
        if matches!(line.trim(), ":up" | ":down") {
            let _ = write!(out, "\r{}{}", terminal.prompt(), terminal.buffer().input());
            let _ = out.flush();
            return;
        }
        if let Some(end) = echoed_to {
            if self.printed == typed_from {
                self.printed = end;
            }
        }
        self.flush_terminal(out);
    }

    /// Prints the read-only part of the transcript that has not been shown yet.
    fn flush_terminal(&mut self, out: &mut impl Write) {
        let Some(terminal) = self.state.terminal.as_ref() else {
            return;
        };
        let frozen = terminal.buffer().input_start();
        if !self.in_shell || frozen <= self.printed {
            return;
        }
        let _ = write!(out, "{}", &terminal.transcript()[self.printed..frozen]);
        let _ = out.flush();
        self.printed = frozen;
    }
}
