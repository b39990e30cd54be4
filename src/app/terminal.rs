use std::io::{BufRead, BufReader, Read};
use std::process::Child;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::app::adb::runner::{device_args, shell_quote, spawn_piped, Bridge};
use crate::app::device::probe_root;
use crate::app::error::AppError;

pub const INTERRUPT_NOTICE: &str = "\nProcess terminated by user\n";
pub const ROOT_GRANTED: &str = "Switched to root mode\n";
pub const ROOT_DENIED: &str = "Root access is required for this command\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalMode {
    AwaitingInput,
    ChildRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrivilegeMode {
    Normal,
    Root,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalKey {
    Char(char),
    Enter,
    Backspace,
    Delete,
    Left,
    Right,
    Home,
    End,
    Up,
    Down,
    Escape,
    Interrupt,
    Paste(String),
    /// Pointer placed the cursor at a byte offset of the transcript.
    Click(usize),
}

/// Transcript with a read-only region before `input_start` and an editable tail after it.
#[derive(Debug, Default)]
pub struct TerminalBuffer {
    text: String,
    input_start: usize,
    cursor: usize,
}

impl TerminalBuffer {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn input(&self) -> &str {
        &self.text[self.input_start..]
    }

    pub fn input_start(&self) -> usize {
        self.input_start
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Appends text that becomes history immediately; the boundary moves past it.
    pub fn append_frozen(&mut self, value: &str) {
        self.text.push_str(value);
        self.input_start = self.text.len();
        self.cursor = self.input_start;
    }

    pub fn insert(&mut self, value: &str) {
        self.clamp_cursor();
        self.text.insert_str(self.cursor, value);
        self.cursor += value.len();
    }

    pub fn backspace(&mut self) {
        self.clamp_cursor();
        if self.cursor <= self.input_start {
            return;
        }
        let previous = self.previous_boundary(self.cursor);
        self.text.replace_range(previous..self.cursor, "");
        self.cursor = previous;
    }

    pub fn delete(&mut self) {
        self.clamp_cursor();
        if self.cursor >= self.text.len() {
            return;
        }
        let next = self.next_boundary(self.cursor);
        self.text.replace_range(self.cursor..next, "");
    }

    pub fn move_left(&mut self) {
        if self.cursor > self.input_start {
            self.cursor = self.previous_boundary(self.cursor);
        }
        self.clamp_cursor();
    }

    pub fn move_right(&mut self) {
        if self.cursor < self.text.len() {
            self.cursor = self.next_boundary(self.cursor);
        }
        self.clamp_cursor();
    }

    pub fn move_home(&mut self) {
        self.cursor = self.input_start;
    }

    pub fn move_end(&mut self) {
        self.cursor = self.text.len();
    }

    pub fn place_cursor(&mut self, position: usize) {
        self.cursor = position;
        self.clamp_cursor();
    }

    pub fn replace_input(&mut self, value: &str) {
        self.text.truncate(self.input_start);
        self.text.push_str(value);
        self.cursor = self.text.len();
    }

    pub fn clear_input(&mut self) {
        self.replace_input("");
    }

    fn clamp_cursor(&mut self) {
        let mut cursor = self.cursor.clamp(self.input_start, self.text.len());
        while !self.text.is_char_boundary(cursor) {
            cursor += 1;
        }
        self.cursor = cursor;
    }

    fn previous_boundary(&self, from: usize) -> usize {
        self.text[..from]
            .char_indices()
            .next_back()
            .map(|(index, _)| index)
            .unwrap_or(0)
    }

    fn next_boundary(&self, from: usize) -> usize {
        self.text[from..]
            .chars()
            .next()
            .map(|ch| from + ch.len_utf8())
            .unwrap_or(from)
    }
}

/// Append-only command history with a cursor that wraps in both directions.
#[derive(Debug, Default)]
pub struct CommandHistory {
    entries: Vec<String>,
    cursor: usize,
}

impl CommandHistory {
    pub fn push(&mut self, command: &str) {
        self.entries.push(command.to_string());
        self.cursor = self.entries.len();
    }

    pub fn previous(&mut self) -> Option<&str> {
        let len = self.entries.len();
        if len == 0 {
            return None;
        }
        self.cursor = (self.cursor + len - 1) % len;
        Some(&self.entries[self.cursor])
    }

    pub fn next(&mut self) -> Option<&str> {
        let len = self.entries.len();
        if len == 0 {
            return None;
        }
        self.cursor = (self.cursor + 1) % len;
        Some(&self.entries[self.cursor])
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }
}

/// Launches the shell children of a terminal and answers the `su` probe.
pub trait ShellBackend: Send + Sync {
    /// The returned child must have piped stdout and stderr.
    fn spawn(&self, command: &str, privilege: PrivilegeMode) -> std::io::Result<Child>;

    fn has_root(&self) -> bool;
}

pub struct AdbShell {
    bridge: Bridge,
    serial: String,
    trace_id: String,
}

impl AdbShell {
    pub fn new(bridge: Bridge, serial: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self {
            bridge,
            serial: serial.into(),
            trace_id: trace_id.into(),
        }
    }
}

/// `adb -s <serial> shell <command>`, or wrapped in `su -c '<command>'` in root mode.
pub fn shell_args(serial: &str, command: &str, privilege: PrivilegeMode) -> Vec<String> {
    match privilege {
        PrivilegeMode::Normal => device_args(serial, &["shell", command]),
        PrivilegeMode::Root => device_args(serial, &["shell", "su", "-c", &shell_quote(command)]),
    }
}

impl ShellBackend for AdbShell {
    fn spawn(&self, command: &str, privilege: PrivilegeMode) -> std::io::Result<Child> {
        spawn_piped(self.bridge.program(), &shell_args(&self.serial, command, privilege))
    }

    fn has_root(&self) -> bool {
        probe_root(&self.bridge, &self.serial, &self.trace_id)
    }
}

#[derive(Debug)]
enum OutputItem {
    Line(String),
    EndOfStream,
}

#[derive(Debug)]
struct TaggedOutput {
    generation: u64,
    item: OutputItem,
}

struct ActiveChild {
    generation: u64,
    child: Child,
}

/// The one child a terminal may own. Acquiring while held is rejected.
#[derive(Clone, Default)]
struct ChildSlot {
    inner: Arc<Mutex<Option<ActiveChild>>>,
}

impl ChildSlot {
    fn guard(&self) -> MutexGuard<'_, Option<ActiveChild>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_held(&self) -> bool {
        self.guard().is_some()
    }

    fn acquire(&self, generation: u64, child: Child) -> Result<(), Child> {
        let mut slot = self.guard();
        if slot.is_some() {
            return Err(child);
        }
        *slot = Some(ActiveChild { generation, child });
        Ok(())
    }

    /// Takes the child back only if it is still the one from `generation`.
    fn release(&self, generation: u64) -> Option<Child> {
        let mut slot = self.guard();
        match slot.as_ref() {
            Some(active) if active.generation == generation => slot.take().map(|a| a.child),
            _ => None,
        }
    }

    fn take(&self) -> Option<Child> {
        self.guard().take().map(|active| active.child)
    }
}

pub struct TerminalSession {
    model: String,
    serial: String,
    backend: Arc<dyn ShellBackend>,
    buffer: TerminalBuffer,
    history: CommandHistory,
    privilege: PrivilegeMode,
    mode: TerminalMode,
    slot: ChildSlot,
    sender: Sender<TaggedOutput>,
    receiver: Receiver<TaggedOutput>,
    next_generation: u64,
    live_generation: Option<u64>,
}

impl TerminalSession {
    pub fn open(
        model: impl Into<String>,
        serial: impl Into<String>,
        backend: Arc<dyn ShellBackend>,
    ) -> Self {
        let (sender, receiver) = mpsc::channel();
        let mut session = Self {
            model: model.into(),
            serial: serial.into(),
            backend,
            buffer: TerminalBuffer::default(),
            history: CommandHistory::default(),
            privilege: PrivilegeMode::Normal,
            mode: TerminalMode::AwaitingInput,
            slot: ChildSlot::default(),
            sender,
            receiver,
            next_generation: 0,
            live_generation: None,
        };
        session.redraw_prompt();
        session
    }

    pub fn prompt(&self) -> String {
        match self.privilege {
            PrivilegeMode::Normal => format!("{}@android$ ", self.model),
            PrivilegeMode::Root => format!("{}@root$ ", self.model),
        }
    }

    /// Serial of the device this terminal's commands run on.
    pub fn serial(&self) -> &str {
        &self.serial
    }

    pub fn mode(&self) -> TerminalMode {
        self.mode
    }

    pub fn privilege(&self) -> PrivilegeMode {
        self.privilege
    }

    pub fn buffer(&self) -> &TerminalBuffer {
        &self.buffer
    }

    pub fn transcript(&self) -> &str {
        self.buffer.text()
    }

    pub fn history(&self) -> &CommandHistory {
        &self.history
    }

    /// Only `Enter` can fail, when a child is still running.
    pub fn handle_key(&mut self, key: TerminalKey) -> Result<(), AppError> {
        if key == TerminalKey::Interrupt {
            self.interrupt();
            return Ok(());
        }
        if self.mode == TerminalMode::ChildRunning {
            if key == TerminalKey::Enter {
                return Err(Self::busy());
            }
            debug!(key = ?key, "input ignored while a command runs");
            return Ok(());
        }
        match key {
            TerminalKey::Char(ch) => self.buffer.insert(ch.encode_utf8(&mut [0u8; 4])),
            TerminalKey::Enter => return self.submit(),
            TerminalKey::Backspace => self.buffer.backspace(),
            TerminalKey::Delete => self.buffer.delete(),
            TerminalKey::Left => self.buffer.move_left(),
            TerminalKey::Right => self.buffer.move_right(),
            TerminalKey::Home => self.buffer.move_home(),
            TerminalKey::End => self.buffer.move_end(),
            TerminalKey::Up => {
                if let Some(entry) = self.history.previous() {
                    self.buffer.replace_input(entry);
                }
            }
            TerminalKey::Down => {
                if let Some(entry) = self.history.next() {
                    self.buffer.replace_input(entry);
                }
            }
            TerminalKey::Escape => self.buffer.clear_input(),
            TerminalKey::Paste(text) => {
                let single_line: String = text
                    .chars()
                    .map(|ch| if ch == '\n' || ch == '\r' { ' ' } else { ch })
                    .collect();
                self.buffer.insert(&single_line);
            }
            TerminalKey::Click(position) => self.buffer.place_cursor(position),
            TerminalKey::Interrupt => {}
        }
        Ok(())
    }

    /// Accepts the current input line.
    pub fn submit(&mut self) -> Result<(), AppError> {
        if self.mode == TerminalMode::ChildRunning || self.slot.is_held() {
            return Err(Self::busy());
        }
        let command = self.buffer.input().trim().to_string();
        self.buffer.append_frozen("\n");
        if command.is_empty() {
            return Ok(());
        }
        self.history.push(&command);

        match command.as_str() {
            "su" => {
                if self.backend.has_root() {
                    self.privilege = PrivilegeMode::Root;
                    self.buffer.append_frozen(ROOT_GRANTED);
                } else {
                    self.buffer.append_frozen(ROOT_DENIED);
                }
                self.redraw_prompt();
            }
            "exit" => {
                self.privilege = PrivilegeMode::Normal;
                self.redraw_prompt();
            }
            _ => self.start_child(&command),
        }
        Ok(())
    }

    /// Kills the running child, if any, and returns to the prompt.
    pub fn interrupt(&mut self) {
        if self.mode != TerminalMode::ChildRunning {
            return;
        }
        // An exited child already queued its output and end-of-stream marker.
        let Some(child) = self.slot.take() else {
            return;
        };
        terminate(child);
        self.live_generation = None;
        self.mode = TerminalMode::AwaitingInput;
        self.buffer.append_frozen(INTERRUPT_NOTICE);
        self.redraw_prompt();
    }

    /// Moves every queued output line into the transcript. Stops after the end-of-stream
    /// marker so the prompt is drawn once per child. Returns how many items were applied.
    pub fn tick(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(output) = self.receiver.try_recv() {
            if Some(output.generation) != self.live_generation {
                continue;
            }
            applied += 1;
            match output.item {
                OutputItem::Line(line) => self.buffer.append_frozen(&line),
                OutputItem::EndOfStream => {
                    self.live_generation = None;
                    self.mode = TerminalMode::AwaitingInput;
                    self.buffer.append_frozen("\n");
                    self.redraw_prompt();
                    break;
                }
            }
        }
        applied
    }

    fn start_child(&mut self, command: &str) {
        let mut child = match self.backend.spawn(command, self.privilege) {
            Ok(child) => child,
            Err(err) => {
                warn!(command = %command, error = %err, "failed to start terminal command");
                self.buffer
                    .append_frozen(&format!("Failed to start command: {err}\n"));
                self.redraw_prompt();
                return;
            }
        };
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        self.next_generation += 1;
        let generation = self.next_generation;
        if let Err(mut rejected) = self.slot.acquire(generation, child) {
            let _ = rejected.kill();
            let _ = rejected.wait();
            self.buffer.append_frozen(&format!("{}\n", Self::busy().error));
            self.redraw_prompt();
            return;
        }
        self.live_generation = Some(generation);
        self.mode = TerminalMode::ChildRunning;

        let sender = self.sender.clone();
        let slot = self.slot.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("terminal-reader-{generation}"))
            .spawn(move || read_child_output(generation, stdout, stderr, slot, sender));
        if let Err(err) = spawned {
            warn!(error = %err, "failed to start terminal reader");
            // Without a reader nobody would ever release the child.
            self.interrupt();
        }
    }

    fn redraw_prompt(&mut self) {
        let prompt = self.prompt();
        self.buffer.append_frozen(&prompt);
    }

    fn busy() -> AppError {
        AppError::precondition(
            "A command is still running. Interrupt it or wait for the prompt.",
            "",
        )
    }
}

impl Drop for TerminalSession {
    fn drop(&mut self) {
        if let Some(child) = self.slot.take() {
            terminate(child);
        }
    }
}

fn terminate(mut child: Child) {
    if let Err(err) = child.kill() {
        warn!(error = %err, "failed to terminate terminal child");
    }
    let _ = child.wait();
}

fn collect_lines<R: Read>(reader: R) -> Vec<String> {
    let mut reader = BufReader::new(reader);
    let mut lines = Vec::new();
    loop {
        let mut line = String::new();
        match reader.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => lines.push(line),
            Err(err) => {
                debug!(error = %err, "terminal stream closed");
                break;
            }
        }
    }
    lines
}

/// Forwards all of stdout, then all of stderr, then the end-of-stream marker. The child is
/// reaped and the slot released before the marker is sent.
fn read_child_output(
    generation: u64,
    stdout: Option<impl Read + Send + 'static>,
    stderr: Option<impl Read + Send + 'static>,
    slot: ChildSlot,
    sender: Sender<TaggedOutput>,
) {
    // stderr is collected concurrently so a child filling it cannot stall on a full pipe.
    let stderr_lines = stderr.map(|stream| std::thread::spawn(move || collect_lines(stream)));

    let send = |item: OutputItem| sender.send(TaggedOutput { generation, item }).is_ok();

    if let Some(stream) = stdout {
        let mut reader = BufReader::new(stream);
        loop {
            let mut line = String::new();
            match reader.read_line(&mut line) {
                Ok(0) => break,
                Ok(_) => {
                    if !send(OutputItem::Line(line)) {
                        break;
                    }
                }
                Err(err) => {
                    debug!(error = %err, "terminal stdout closed");
                    break;
                }
            }
        }
    }
    if let Some(handle) = stderr_lines {
        for line in handle.join().unwrap_or_default() {
            if !send(OutputItem::Line(line)) {
                break;
            }
        }
    }

    if let Some(mut child) = slot.release(generation) {
        let _ = child.wait();
    }
    let _ = send(OutputItem::EndOfStream);
}
