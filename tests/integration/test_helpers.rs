//! Shared fakes for manager and watchdog integration tests.
//!
//! The fake terminal keeps its observable state behind an `Arc` so a test
//! can kill a window, change the activity probe, or read what was typed
//! while the session owns the adapter.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use agent_conductor::cli::{AgentCli, CliKind};
use agent_conductor::config::GlobalConfig;
use agent_conductor::models::cli_status::CliStatus;
use agent_conductor::models::health::ActivityProbe;
use agent_conductor::orchestrator::session_manager::{AdapterFactory, SessionManager, StartRequest};
use agent_conductor::process::ShellDialect;
use agent_conductor::services::{
    RecoveryNotifier, SettingsReader, TaskRecord, TaskStatusReader, TemplateFields, TemplateRenderer,
};
use agent_conductor::terminal::{TerminalAdapter, TerminalKind, WindowHandle, WindowRequest};
use agent_conductor::{AppError, Result};
use futures_util::future::{BoxFuture, FutureExt};

/// Observable state of one fake terminal.
#[derive(Debug)]
pub struct TerminalState {
    pub task_id: Mutex<Option<String>>,
    pub alive: AtomicBool,
    pub fail_create: AtomicBool,
    pub fail_send: AtomicBool,
    pub create_delay: Mutex<Duration>,
    pub probe: Mutex<ActivityProbe>,
    pub sent: Mutex<Vec<String>>,
    pub commands: Mutex<Vec<String>>,
    pub creates: AtomicUsize,
    pub closes: AtomicUsize,
}

impl TerminalState {
    fn new(fail_create: bool, probe: ActivityProbe) -> Self {
        Self {
            task_id: Mutex::new(None),
            alive: AtomicBool::new(false),
            fail_create: AtomicBool::new(fail_create),
            fail_send: AtomicBool::new(false),
            create_delay: Mutex::new(Duration::ZERO),
            probe: Mutex::new(probe),
            sent: Mutex::new(Vec::new()),
            commands: Mutex::new(Vec::new()),
            creates: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
        }
    }

    /// Simulate the user closing the window or the worker crashing.
    pub fn kill_window(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    pub fn set_probe(&self, probe: ActivityProbe) {
        *self.probe.lock().unwrap() = probe;
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

/// In-memory terminal adapter.
pub struct FakeTerminal {
    state: Arc<TerminalState>,
    window: Option<WindowHandle>,
}

impl TerminalAdapter for FakeTerminal {
    fn kind(&self) -> TerminalKind {
        TerminalKind::Kitty
    }

    fn name(&self) -> &'static str {
        "Fake"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn create_window<'a>(&'a mut self, request: &'a WindowRequest) -> BoxFuture<'a, Result<WindowHandle>> {
        async move {
            let delay = *self.state.create_delay.lock().unwrap();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            *self.state.task_id.lock().unwrap() = Some(request.task_id.clone());
            if self.state.fail_create.load(Ordering::SeqCst) {
                return Err(AppError::Terminal("window refused".into()));
            }
            self.state.creates.fetch_add(1, Ordering::SeqCst);
            self.state.commands.lock().unwrap().push(request.command.clone());
            self.state.alive.store(true, Ordering::SeqCst);
            let handle = WindowHandle {
                id: format!("fake-{}", request.task_id),
                socket_path: None,
                window_id: None,
                pid: None,
            };
            self.window = Some(handle.clone());
            Ok(handle)
        }
        .boxed()
    }

    fn send_text<'a>(&'a mut self, text: &'a str, _press_enter: bool) -> BoxFuture<'a, Result<()>> {
        async move {
            if self.window.is_none() {
                return Err(AppError::InvalidState("no window".into()));
            }
            if self.state.fail_send.load(Ordering::SeqCst) {
                return Err(AppError::Terminal("send refused".into()));
            }
            self.state.sent.lock().unwrap().push(text.to_owned());
            Ok(())
        }
        .boxed()
    }

    fn close_window(&mut self) -> BoxFuture<'_, Result<()>> {
        async move {
            if self.window.take().is_some() {
                self.state.closes.fetch_add(1, Ordering::SeqCst);
                self.state.alive.store(false, Ordering::SeqCst);
            }
            Ok(())
        }
        .boxed()
    }

    fn window(&self) -> Option<&WindowHandle> {
        self.window.as_ref()
    }

    fn clear_window(&mut self) {
        self.window = None;
    }

    fn is_window_alive(&self) -> bool {
        self.window.is_some() && self.state.alive.load(Ordering::SeqCst)
    }

    fn is_agent_active(&self) -> BoxFuture<'_, ActivityProbe> {
        let probe = *self.state.probe.lock().unwrap();
        async move { probe }.boxed()
    }
}

/// Agent CLI with configurable capabilities.
#[derive(Debug)]
pub struct FakeCli {
    pub kind: CliKind,
    pub status_query: bool,
}

impl AgentCli for FakeCli {
    fn kind(&self) -> CliKind {
        self.kind
    }

    fn name(&self) -> &'static str {
        self.kind.as_str()
    }

    fn start_command(&self, _working_dir: &Path, _shell: ShellDialect) -> String {
        format!("{} --start", self.kind)
    }

    fn clear_session_command(&self) -> Option<&'static str> {
        (self.kind != CliKind::Codex).then_some("/clear")
    }

    fn supports_status_query(&self) -> bool {
        self.status_query
    }

    fn supports_resume(&self) -> bool {
        false
    }

    fn query_status(&self) -> BoxFuture<'_, CliStatus> {
        async {
            CliStatus {
                is_running: true,
                session_id: Some("fake".into()),
                tokens_used: 10,
                tokens_max: 100,
            }
        }
        .boxed()
    }

    fn format_prompt(&self, text: &str) -> String {
        format!("[{}] {text}", self.kind)
    }

    fn is_available(&self) -> bool {
        true
    }
}

/// Factory handing out fake adapters and remembering each terminal's state.
#[derive(Default)]
pub struct FakeFactory {
    terminals: Mutex<Vec<Arc<TerminalState>>>,
    pub terminal_unavailable: AtomicBool,
    pub fail_create: AtomicBool,
    pub unavailable_clis: Mutex<HashSet<CliKind>>,
    pub status_query: AtomicBool,
    pub default_probe: Mutex<Option<ActivityProbe>>,
}

impl FakeFactory {
    /// Latest terminal that opened (or tried to open) a window for `task_id`.
    pub fn terminal_for(&self, task_id: &str) -> Arc<TerminalState> {
        self.terminals
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|state| state.task_id.lock().unwrap().as_deref() == Some(task_id))
            .cloned()
            .unwrap_or_else(|| panic!("no terminal used for {task_id}"))
    }

    /// Most recently built terminal.
    pub fn latest_terminal(&self) -> Arc<TerminalState> {
        self.terminals.lock().unwrap().last().cloned().expect("a terminal was built")
    }
}

impl AdapterFactory for FakeFactory {
    fn terminal(&self, _kind: &str) -> Result<Box<dyn TerminalAdapter>> {
        if self.terminal_unavailable.load(Ordering::SeqCst) {
            return Err(AppError::Unavailable("fake terminal is not installed".into()));
        }
        let probe = self.default_probe.lock().unwrap().unwrap_or(ActivityProbe::Unsupported);
        let state = Arc::new(TerminalState::new(self.fail_create.load(Ordering::SeqCst), probe));
        self.terminals.lock().unwrap().push(Arc::clone(&state));
        Ok(Box::new(FakeTerminal { state, window: None }))
    }

    fn cli(&self, kind: CliKind) -> Result<Arc<dyn AgentCli>> {
        if self.unavailable_clis.lock().unwrap().contains(&kind) {
            return Err(AppError::Unavailable(format!("{kind} is not installed")));
        }
        Ok(Arc::new(FakeCli {
            kind,
            status_query: self.status_query.load(Ordering::SeqCst),
        }))
    }
}

/// Renders `template:locale:task_id`.
#[derive(Default)]
pub struct FakeRenderer {
    pub fail: AtomicBool,
    pub rendered: Mutex<Vec<String>>,
}

impl TemplateRenderer for FakeRenderer {
    fn render<'a>(
        &'a self,
        template: &'a str,
        locale: &'a str,
        fields: &'a TemplateFields,
    ) -> BoxFuture<'a, Result<String>> {
        async move {
            if self.fail.load(Ordering::SeqCst) {
                return Err(AppError::Template(format!("{template} is broken")));
            }
            self.rendered.lock().unwrap().push(template.to_owned());
            Ok(format!("{template}:{locale}:{}", fields.task_id))
        }
        .boxed()
    }
}

/// Task store keyed by task id.
#[derive(Default)]
pub struct FakeTaskReader {
    pub statuses: Mutex<HashMap<String, String>>,
    pub fail: AtomicBool,
    pub hang: AtomicBool,
}

impl FakeTaskReader {
    pub fn set(&self, task_id: &str, status: &str) {
        self.statuses.lock().unwrap().insert(task_id.to_owned(), status.to_owned());
    }
}

impl TaskStatusReader for FakeTaskReader {
    fn raw_task<'a>(&'a self, task_id: &'a str) -> BoxFuture<'a, Result<Option<TaskRecord>>> {
        async move {
            if self.hang.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(AppError::Io("task store offline".into()));
            }
            Ok(self.statuses.lock().unwrap().get(task_id).map(|status| TaskRecord {
                status: status.clone(),
                extra: HashMap::new(),
            }))
        }
        .boxed()
    }
}

/// Records every notification; optionally fails them all.
#[derive(Default)]
pub struct FakeNotifier {
    pub calls: Mutex<Vec<(String, String)>>,
    pub fail: AtomicBool,
    pub hang: AtomicBool,
}

impl RecoveryNotifier for FakeNotifier {
    fn notify<'a>(&'a self, task_id: &'a str, reason: &'a str) -> BoxFuture<'a, Result<()>> {
        async move {
            self.calls.lock().unwrap().push((task_id.to_owned(), reason.to_owned()));
            if self.hang.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            if self.fail.load(Ordering::SeqCst) {
                Err(AppError::Io("observer unreachable".into()))
            } else {
                Ok(())
            }
        }
        .boxed()
    }
}

/// Config with short timeouts, no settle pauses and no status polling.
pub fn test_config(max_concurrent: usize) -> GlobalConfig {
    let raw = format!(
        r#"
terminal = "kitty"
default_cli = "claude_code"
language = "en"
max_concurrent_sessions = {max_concurrent}
callback_base = "http://127.0.0.1:9999"

[timeouts]
lock_seconds = 1
slot_seconds = 1
terminal_seconds = 1
cleanup_seconds = 1
render_seconds = 1
settle_millis = 0
clear_settle_millis = 0

[watchdog]
check_interval_seconds = 1
status_poll_seconds = 0
"#
    );
    GlobalConfig::from_toml_str(&raw).expect("valid test config")
}

/// Manager wired to fakes.
pub struct Harness {
    pub manager: Arc<SessionManager>,
    pub factory: Arc<FakeFactory>,
    pub renderer: Arc<FakeRenderer>,
}

pub fn harness(max_concurrent: usize) -> Harness {
    harness_with(test_config(max_concurrent))
}

pub fn harness_with(config: GlobalConfig) -> Harness {
    let factory = Arc::new(FakeFactory::default());
    let renderer = Arc::new(FakeRenderer::default());
    let settings: Arc<dyn SettingsReader> = Arc::new(config.clone());
    let manager = Arc::new(SessionManager::with_factory(
        config,
        settings,
        Arc::clone(&renderer) as Arc<dyn TemplateRenderer>,
        Arc::clone(&factory) as Arc<dyn AdapterFactory>,
    ));
    Harness {
        manager,
        factory,
        renderer,
    }
}

/// Start request carrying everything a new session needs.
pub fn start_request(task_id: &str) -> StartRequest {
    StartRequest::new(task_id)
        .working_dir(format!("/work/{task_id}"))
        .doc_path(format!("docs/{task_id}.md"))
}
