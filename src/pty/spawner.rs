//! Starting pseudo-terminals: generic shell, direct CLI and SSH.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::broadcast;

use super::backend::{PtyBackend, PtyEvent, SpawnRequest};
use super::env::{auth_passthrough, build_base_env, fallback_shell, namespaced_vars, HostEnv};
use super::error::{SpawnError, SpawnMode};
use super::registry::{PtyInfo, PtyKind, PtyRecord, PtyRegistry, MIN_COLS, MIN_ROWS};
use crate::provider::{
    build_args, provider_for_cli, BuildArgsOptions, ProviderResolver, ProviderStatusCache,
    ProviderStatusSource, ResolvedProviderCommand,
};
use crate::session::SessionIsolation;
use crate::shell::{parse_command_argv, quote_posix, quote_windows, CommandResolver, Platform};
use crate::telemetry::{ErrorReporter, SpawnReport, SpawnStage, TracingReporter};

const EVENT_CAPACITY: usize = 4096;
const DIRECT_EXIT_CAPACITY: usize = 64;
const DEFAULT_COLS: u16 = 80;
const DEFAULT_ROWS: u16 = 24;

/// Characters that only make sense if a shell interprets the command.
const SHELL_METACHARACTERS: &[char] = &[
    '|', '&', ';', '<', '>', '(', ')', '$', '`', '*', '?', '[', ']', '{', '}', '!', '~', '\n', '\r',
];

/// Generic shell spawn.
///
/// When `shell` names a known agent CLI (e.g. `claude`), the user's login
/// shell runs that agent and then becomes an interactive shell once the
/// agent exits.
#[derive(Debug, Clone, Default)]
pub struct StartOptions {
    pub id: String,
    pub cwd: Option<PathBuf>,
    pub shell: Option<String>,
    pub env: BTreeMap<String, String>,
    pub cols: u16,
    pub rows: u16,
    pub auto_approve: bool,
    pub initial_prompt: Option<String>,
    pub skip_resume: bool,
    /// Command run before the agent, e.g. activating a toolchain
    pub shell_setup: Option<String>,
}

/// Direct spawn of a provider's CLI without a shell.
#[derive(Debug, Clone, Default)]
pub struct DirectStartOptions {
    pub id: String,
    pub provider_id: String,
    pub cwd: PathBuf,
    pub cols: u16,
    pub rows: u16,
    pub auto_approve: bool,
    pub initial_prompt: Option<String>,
    pub env: BTreeMap<String, String>,
    pub resume: bool,
}

/// Remote terminal through the system `ssh` client.
#[derive(Debug, Clone, Default)]
pub struct SshStartOptions {
    pub id: String,
    /// Host or alias from the user's ssh config
    pub target: String,
    pub ssh_args: Vec<String>,
    pub remote_init_command: Option<String>,
    pub cols: u16,
    pub rows: u16,
    /// Only `PTYDECK_`-prefixed entries are forwarded
    pub env: BTreeMap<String, String>,
}

/// A direct-spawned CLI exited; the caller may start a shell in its place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectSpawnExited {
    pub id: String,
    pub cwd: PathBuf,
    pub code: Option<u32>,
}

struct Launch {
    mode: SpawnMode,
    id: String,
    program: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    cwd: Option<PathBuf>,
    cols: u16,
    rows: u16,
    kind: PtyKind,
    is_direct: bool,
    provider: Option<&'static str>,
}

/// Builds commands and environments for each spawn mode and registers the
/// resulting processes.
pub struct PtySpawner {
    backend: Arc<dyn PtyBackend>,
    registry: Arc<PtyRegistry>,
    isolation: SessionIsolation,
    resolver: ProviderResolver,
    status: Arc<dyn ProviderStatusSource>,
    commands: Arc<CommandResolver>,
    reporter: Arc<dyn ErrorReporter>,
    host: HostEnv,
    platform: Platform,
    login_shell: Option<String>,
    ssh_program: String,
    events: broadcast::Sender<PtyEvent>,
    direct_exits: broadcast::Sender<DirectSpawnExited>,
    generation: AtomicU64,
}

impl PtySpawner {
    pub fn new(
        backend: Arc<dyn PtyBackend>,
        registry: Arc<PtyRegistry>,
        isolation: SessionIsolation,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (direct_exits, _) = broadcast::channel(DIRECT_EXIT_CAPACITY);
        Self {
            backend,
            registry,
            isolation,
            resolver: ProviderResolver::builtin(),
            status: Arc::new(ProviderStatusCache::new()),
            commands: Arc::new(CommandResolver::from_env()),
            reporter: Arc::new(TracingReporter),
            host: HostEnv::capture(),
            platform: Platform::current(),
            login_shell: None,
            ssh_program: "ssh".to_string(),
            events,
            direct_exits,
            generation: AtomicU64::new(0),
        }
    }

    pub fn with_resolver(mut self, resolver: ProviderResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_status_source(mut self, status: Arc<dyn ProviderStatusSource>) -> Self {
        self.status = status;
        self
    }

    pub fn with_command_resolver(mut self, commands: Arc<CommandResolver>) -> Self {
        self.commands = commands;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_host_env(mut self, host: HostEnv) -> Self {
        self.host = host;
        self
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// Override the login shell (defaults to `$SHELL` / `%COMSPEC%`).
    pub fn with_login_shell(mut self, shell: Option<String>) -> Self {
        self.login_shell = shell.filter(|s| !s.trim().is_empty());
        self
    }

    pub fn with_ssh_program(mut self, program: impl Into<String>) -> Self {
        self.ssh_program = program.into();
        self
    }

    pub fn registry(&self) -> &Arc<PtyRegistry> {
        &self.registry
    }

    /// Output and exit events of every process this spawner starts.
    pub fn subscribe_events(&self) -> broadcast::Receiver<PtyEvent> {
        self.events.subscribe()
    }

    pub fn subscribe_direct_exits(&self) -> broadcast::Receiver<DirectSpawnExited> {
        self.direct_exits.subscribe()
    }

    fn login_shell(&self) -> String {
        self.login_shell
            .clone()
            .unwrap_or_else(|| self.host.default_shell(self.platform))
    }

    fn ensure_enabled(&self) -> Result<(), SpawnError> {
        if self.host.kill_switch_enabled() {
            return Err(SpawnError::Disabled);
        }
        Ok(())
    }

    fn ensure_backend(&self) -> Result<(), SpawnError> {
        self.backend
            .check_available()
            .map_err(SpawnError::BackendUnavailable)
    }

    fn effective_cwd(&self, cwd: Option<&Path>) -> PathBuf {
        cwd.map(Path::to_path_buf)
            .or_else(|| self.host.get("HOME").map(PathBuf::from))
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Agent argv: session isolation first, then the provider's own flags.
    fn agent_args(
        &self,
        resolved: &ResolvedProviderCommand,
        id: &str,
        cwd: &Path,
        resume: bool,
        auto_approve: bool,
        initial_prompt: Option<&str>,
    ) -> Vec<String> {
        let mut args = Vec::new();
        let session_isolated = self
            .isolation
            .apply(&mut args, resolved.provider, id, cwd, resume);
        args.extend(build_args(&BuildArgsOptions {
            resolved,
            resume,
            session_isolated,
            auto_approve,
            initial_prompt,
        }));
        args
    }

    /// Start an interactive shell, retrying once with a bare fallback shell.
    pub fn start(&self, opts: StartOptions) -> Result<PtyInfo, SpawnError> {
        self.ensure_enabled()?;
        self.ensure_backend()?;

        let cwd = self.effective_cwd(opts.cwd.as_deref());
        let (cols, rows) = term_size(opts.cols, opts.rows);
        let launch = self.plan_shell(&opts, &cwd, cols, rows);

        let primary = match self.launch(launch, SpawnStage::Attempt) {
            Ok(info) => return Ok(info),
            Err(e) => e,
        };

        let shell = fallback_shell(self.platform);
        tracing::warn!(pty_id = %opts.id, fallback = shell, "Retrying with fallback shell");
        let fallback = Launch {
            mode: SpawnMode::Shell,
            id: opts.id.clone(),
            program: shell.to_string(),
            args: Vec::new(),
            env: build_base_env(&self.host, shell, self.platform),
            cwd: Some(cwd),
            cols,
            rows,
            kind: PtyKind::Local,
            is_direct: false,
            provider: None,
        };

        self.launch(fallback, SpawnStage::FallbackAttempt)
            .map_err(|fallback| SpawnError::Fatal { primary, fallback })
    }

    fn plan_shell(&self, opts: &StartOptions, cwd: &Path, cols: u16, rows: u16) -> Launch {
        let login_shell = self.login_shell();
        let requested = opts
            .shell
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| login_shell.clone());
        let setup = opts
            .shell_setup
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());

        let agent = provider_for_cli(basename(&requested))
            .and_then(|p| self.resolver.resolve(p.id));

        let (program, args, provider) = match &agent {
            Some(resolved) => {
                let agent_args = self.agent_args(
                    resolved,
                    &opts.id,
                    cwd,
                    !opts.skip_resume,
                    opts.auto_approve,
                    opts.initial_prompt.as_deref(),
                );
                let args = self.agent_shell_args(&login_shell, setup, &resolved.cli, &agent_args);
                (login_shell.clone(), args, Some(resolved.provider.id))
            }
            None => {
                let args = self.plain_shell_args(&requested, setup);
                (requested, args, None)
            }
        };

        let mut env = build_base_env(&self.host, &program, self.platform);
        if let Some(resolved) = &agent {
            env.extend(auth_passthrough(&self.host));
            env.extend(resolved.env.clone().unwrap_or_default());
        }
        env.extend(opts.env.clone());

        Launch {
            mode: SpawnMode::Shell,
            id: opts.id.clone(),
            program,
            args,
            env,
            cwd: Some(cwd.to_path_buf()),
            cols,
            rows,
            kind: PtyKind::Local,
            is_direct: false,
            provider,
        }
    }

    /// `-c` style invocation: setup, the agent, then an interactive shell.
    fn agent_shell_args(
        &self,
        shell: &str,
        setup: Option<&str>,
        cli: &str,
        agent_args: &[String],
    ) -> Vec<String> {
        match self.platform {
            Platform::Posix => {
                let invocation = std::iter::once(cli.to_string())
                    .chain(agent_args.iter().map(|a| quote_posix(a)))
                    .collect::<Vec<_>>()
                    .join(" ");
                let steps: Vec<&str> = setup.into_iter().chain([invocation.as_str()]).collect();
                let command = format!("{}; exec {} -il", steps.join(" && "), quote_posix(shell));
                vec![shell_command_flag(shell).to_string(), command]
            }
            Platform::Windows => {
                let invocation = std::iter::once(cli.to_string())
                    .chain(agent_args.iter().map(|a| quote_windows(a)))
                    .collect::<Vec<_>>()
                    .join(" ");
                let steps: Vec<&str> = setup.into_iter().chain([invocation.as_str()]).collect();
                vec!["/d".to_string(), "/k".to_string(), steps.join(" && ")]
            }
        }
    }

    fn plain_shell_args(&self, shell: &str, setup: Option<&str>) -> Vec<String> {
        match (self.platform, setup) {
            (Platform::Posix, None) => vec!["-il".to_string()],
            (Platform::Posix, Some(setup)) => vec![
                shell_command_flag(shell).to_string(),
                format!("{setup}; exec {} -il", quote_posix(shell)),
            ],
            (Platform::Windows, None) => Vec::new(),
            (Platform::Windows, Some(setup)) => {
                vec!["/d".to_string(), "/k".to_string(), setup.to_string()]
            }
        }
    }

    /// Start a provider's CLI without a shell.
    ///
    /// `Ok(None)` means the CLI cannot be reduced to a single executable
    /// (not installed, unknown provider, a custom command that needs a
    /// shell); the caller falls back to [`start`](Self::start).
    pub fn start_direct(&self, opts: DirectStartOptions) -> Result<Option<PtyInfo>, SpawnError> {
        self.ensure_enabled()?;

        let status = self.status.status(&opts.provider_id);
        let Some(status) = status.filter(|s| s.installed) else {
            tracing::debug!(provider = %opts.provider_id, "Provider not installed, no direct spawn");
            return Ok(None);
        };
        let Some(resolved) = self.resolver.resolve(&opts.provider_id) else {
            tracing::debug!(provider = %opts.provider_id, "Unknown provider, no direct spawn");
            return Ok(None);
        };
        let Some(executable) = self.direct_executable(&resolved, status.path.as_deref()) else {
            tracing::debug!(
                provider = %opts.provider_id,
                cli = %resolved.cli,
                "CLI needs a shell, no direct spawn"
            );
            return Ok(None);
        };

        self.ensure_backend()?;

        let agent_args = self.agent_args(
            &resolved,
            &opts.id,
            &opts.cwd,
            opts.resume,
            opts.auto_approve,
            opts.initial_prompt.as_deref(),
        );
        let (program, args) = wrap_script(&executable, agent_args, self.platform);

        let mut env = build_base_env(&self.host, &self.login_shell(), self.platform);
        env.extend(auth_passthrough(&self.host));
        env.extend(resolved.env.clone().unwrap_or_default());
        env.extend(opts.env);

        let (cols, rows) = term_size(opts.cols, opts.rows);
        let launch = Launch {
            mode: SpawnMode::Direct,
            id: opts.id,
            program,
            args,
            env,
            cwd: Some(opts.cwd),
            cols,
            rows,
            kind: PtyKind::Local,
            is_direct: true,
            provider: Some(resolved.provider.id),
        };

        self.launch(launch, SpawnStage::Attempt)
            .map(Some)
            .map_err(|source| SpawnError::Spawn {
                mode: SpawnMode::Direct,
                source,
            })
    }

    fn direct_executable(
        &self,
        resolved: &ResolvedProviderCommand,
        status_path: Option<&Path>,
    ) -> Option<PathBuf> {
        if !resolved.has_custom_cli() {
            if let Some(path) = status_path {
                return Some(path.to_path_buf());
            }
            return self.commands.resolve(&resolved.cli);
        }

        let tokens = parse_command_argv(&resolved.cli, self.platform);
        let [token] = tokens.as_slice() else {
            return None;
        };
        if has_shell_metacharacters(token, is_absolute_for(token, self.platform)) {
            return None;
        }
        self.commands.resolve(token)
    }

    /// Open a terminal on a remote host with the system ssh client, so the
    /// user's ssh config (aliases, jump hosts, agents) applies.
    pub fn start_ssh(&self, opts: SshStartOptions) -> Result<PtyInfo, SpawnError> {
        self.ensure_enabled()?;
        self.ensure_backend()?;

        let target = opts.target.trim();
        if target.is_empty() {
            return Err(SpawnError::Spawn {
                mode: SpawnMode::Ssh,
                source: anyhow::anyhow!("SSH target is empty"),
            });
        }

        let mut args = vec!["-tt".to_string()];
        args.extend(opts.ssh_args.iter().cloned());
        args.push(target.to_string());
        if let Some(init) = opts
            .remote_init_command
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            args.push(init.to_string());
        }

        let mut env = build_base_env(&self.host, &self.login_shell(), self.platform);
        env.extend(auth_passthrough(&self.host));
        env.extend(namespaced_vars(&opts.env));

        let (cols, rows) = term_size(opts.cols, opts.rows);
        let launch = Launch {
            mode: SpawnMode::Ssh,
            id: opts.id,
            program: self.ssh_program.clone(),
            args,
            env,
            cwd: None,
            cols,
            rows,
            kind: PtyKind::Ssh,
            is_direct: false,
            provider: None,
        };

        self.launch(launch, SpawnStage::Attempt)
            .map_err(|source| SpawnError::Spawn {
                mode: SpawnMode::Ssh,
                source,
            })
    }

    fn launch(&self, launch: Launch, stage: SpawnStage) -> anyhow::Result<PtyInfo> {
        let mut report = SpawnReport {
            stage,
            mode: launch.mode,
            pty_id: launch.id.clone(),
            program: launch.program.clone(),
            cwd: launch.cwd.clone(),
            args: launch.args.clone(),
            provider: launch.provider.map(String::from),
            error: None,
        };
        self.reporter.report_spawn(&report);

        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let request = SpawnRequest {
            id: launch.id.clone(),
            generation,
            program: launch.program,
            args: launch.args,
            cwd: launch.cwd.clone(),
            env: launch.env,
            cols: launch.cols,
            rows: launch.rows,
        };

        let process = match self.backend.spawn(request, self.events.clone()) {
            Ok(process) => process,
            Err(e) => {
                report.stage = match stage {
                    SpawnStage::FallbackAttempt => SpawnStage::FallbackFailed,
                    _ => SpawnStage::Failed,
                };
                report.error = Some(format!("{e:#}"));
                self.reporter.report_spawn(&report);
                return Err(e);
            }
        };

        let record = PtyRecord {
            id: launch.id,
            pid: process.pid(),
            process: Arc::new(Mutex::new(process)),
            cwd: launch.cwd,
            is_direct: launch.is_direct,
            kind: launch.kind,
            cols: launch.cols,
            rows: launch.rows,
            generation,
        };
        let info = record.info();
        // A displaced record is dropped here, which closes its PTY
        drop(self.registry.insert(record));

        tracing::info!(
            pty_id = %info.id,
            mode = %launch.mode,
            pid = ?info.pid,
            provider = ?launch.provider,
            "PTY started"
        );
        Ok(info)
    }

    /// Forget an exited process and announce direct-spawn exits.
    ///
    /// Exits of a generation that has since been replaced are ignored.
    pub fn handle_exit(&self, id: &str, generation: u64, code: Option<u32>) -> Option<PtyInfo> {
        let record = self.registry.remove_if_generation(id, generation)?;
        tracing::info!(pty_id = %id, ?code, "PTY exited");

        let info = record.info();
        if record.is_direct {
            if let Some(cwd) = record.cwd {
                let _ = self.direct_exits.send(DirectSpawnExited {
                    id: id.to_string(),
                    cwd,
                    code,
                });
            }
        }
        Some(info)
    }

    /// Feed exit events into [`handle_exit`](Self::handle_exit) until the
    /// spawner is dropped.
    pub async fn run_exit_pump(self: Arc<Self>) {
        let mut events = self.subscribe_events();
        let weak = Arc::downgrade(&self);
        drop(self);

        loop {
            match events.recv().await {
                Ok(PtyEvent::Exit {
                    id,
                    generation,
                    code,
                }) => {
                    let Some(spawner) = weak.upgrade() else {
                        break;
                    };
                    spawner.handle_exit(&id, generation, code);
                }
                Ok(PtyEvent::Data { .. }) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Exit pump lagged behind PTY events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}

fn term_size(cols: u16, rows: u16) -> (u16, u16) {
    let cols = if cols == 0 { DEFAULT_COLS } else { cols.max(MIN_COLS) };
    let rows = if rows == 0 { DEFAULT_ROWS } else { rows.max(MIN_ROWS) };
    (cols, rows)
}

/// Final path component, accepting either separator.
fn basename(path: &str) -> &str {
    path.rsplit(&['/', '\\'][..]).next().unwrap_or(path)
}

/// `-c` flag for running a command in `shell`.
fn shell_command_flag(shell: &str) -> &'static str {
    let name = basename(shell).to_ascii_lowercase();
    match name.strip_suffix(".exe").unwrap_or(&name) {
        "bash" | "zsh" => "-lic",
        "fish" => "-ic",
        _ => "-lc",
    }
}

fn is_absolute_for(path: &str, platform: Platform) -> bool {
    match platform {
        Platform::Posix => path.starts_with('/'),
        Platform::Windows => {
            let bytes = path.as_bytes();
            path.starts_with("\\\\")
                || (bytes.len() >= 3
                    && bytes[0].is_ascii_alphabetic()
                    && bytes[1] == b':'
                    && matches!(bytes[2], b'\\' | b'/'))
        }
    }
}

/// Absolute paths may contain parentheses (`Program Files (x86)`).
fn has_shell_metacharacters(token: &str, absolute: bool) -> bool {
    token
        .chars()
        .filter(|c| !(absolute && matches!(c, '(' | ')')))
        .any(|c| SHELL_METACHARACTERS.contains(&c))
}

/// Windows cannot exec scripts directly; route them through their host.
fn wrap_script(executable: &Path, args: Vec<String>, platform: Platform) -> (String, Vec<String>) {
    let path = executable.to_string_lossy().into_owned();
    if platform != Platform::Windows {
        return (path, args);
    }

    let ext = executable
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("cmd" | "bat") => {
            let mut wrapped = vec!["/d".to_string(), "/s".to_string(), "/c".to_string(), path];
            wrapped.extend(args);
            ("cmd.exe".to_string(), wrapped)
        }
        Some("ps1") => {
            let mut wrapped: Vec<String> = ["-NoProfile", "-ExecutionPolicy", "Bypass", "-File"]
                .into_iter()
                .map(String::from)
                .collect();
            wrapped.push(path);
            wrapped.extend(args);
            ("powershell.exe".to_string(), wrapped)
        }
        _ => (path, args),
    }
}
