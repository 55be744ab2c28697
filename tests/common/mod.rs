//! Shared test utilities: a recording PTY backend and spawner fixtures

#![allow(dead_code)]

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use tempfile::TempDir;

use ptydeck::provider::{ProviderResolver, ProviderStatus, ProviderStatusCache};
use ptydeck::pty::{
    HostEnv, PtyBackend, PtyEvent, PtyEventSender, PtyProcess, PtyRegistry, PtySpawner,
    SpawnRequest,
};
use ptydeck::session::{SessionIsolation, SessionMap};
use ptydeck::shell::{CommandResolver, Platform};
use ptydeck::telemetry::{ErrorReporter, SpawnReport};

/// Everything the fake backend was asked to do
#[derive(Debug, Default)]
pub struct Recorded {
    pub spawns: Vec<SpawnRequest>,
    pub writes: Vec<(String, Vec<u8>)>,
    pub resizes: Vec<(String, u16, u16)>,
    pub kills: Vec<String>,
}

/// PTY backend that records calls instead of starting processes
#[derive(Default)]
pub struct FakeBackend {
    pub recorded: Arc<Mutex<Recorded>>,
    /// Programs whose spawn fails
    pub failing: Mutex<HashSet<String>>,
    pub unavailable: Mutex<Option<String>>,
    events: Mutex<Option<PtyEventSender>>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_program(&self, program: &str) {
        self.failing.lock().unwrap().insert(program.to_string());
    }

    pub fn set_unavailable(&self, reason: &str) {
        *self.unavailable.lock().unwrap() = Some(reason.to_string());
    }

    pub fn spawns(&self) -> Vec<SpawnRequest> {
        self.recorded.lock().unwrap().spawns.clone()
    }

    pub fn last_spawn(&self) -> SpawnRequest {
        self.spawns().pop().expect("nothing was spawned")
    }

    /// Publish output as if process `id` of `generation` had printed it
    pub fn emit_output(&self, id: &str, generation: u64, text: &str) {
        self.send(PtyEvent::Data {
            id: id.to_string(),
            generation,
            bytes: Arc::from(text.as_bytes()),
        });
    }

    pub fn emit_exit(&self, id: &str, generation: u64, code: Option<u32>) {
        self.send(PtyEvent::Exit {
            id: id.to_string(),
            generation,
            code,
        });
    }

    fn send(&self, event: PtyEvent) {
        let sender = self.events.lock().unwrap().clone();
        sender.expect("spawn first").send(event).expect("no receivers");
    }
}

impl PtyBackend for FakeBackend {
    fn check_available(&self) -> std::result::Result<(), String> {
        match self.unavailable.lock().unwrap().clone() {
            Some(reason) => Err(reason),
            None => Ok(()),
        }
    }

    fn spawn(&self, request: SpawnRequest, events: PtyEventSender) -> Result<Box<dyn PtyProcess>> {
        *self.events.lock().unwrap() = Some(events);
        let failing = self.failing.lock().unwrap().contains(&request.program);
        let id = request.id.clone();
        self.recorded.lock().unwrap().spawns.push(request);
        if failing {
            anyhow::bail!("posix_spawnp failed: No such file or directory");
        }
        Ok(Box::new(FakeProcess {
            id,
            recorded: self.recorded.clone(),
        }))
    }
}

struct FakeProcess {
    id: String,
    recorded: Arc<Mutex<Recorded>>,
}

impl PtyProcess for FakeProcess {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        self.recorded
            .lock()
            .unwrap()
            .writes
            .push((self.id.clone(), data.to_vec()));
        Ok(())
    }

    fn resize(&mut self, cols: u16, rows: u16) -> Result<()> {
        self.recorded
            .lock()
            .unwrap()
            .resizes
            .push((self.id.clone(), cols, rows));
        Ok(())
    }

    fn kill(&mut self) -> Result<()> {
        self.recorded.lock().unwrap().kills.push(self.id.clone());
        Ok(())
    }

    fn pid(&self) -> Option<u32> {
        Some(4242)
    }
}

/// Reporter that keeps every report
#[derive(Default)]
pub struct CollectingReporter {
    pub reports: Mutex<Vec<SpawnReport>>,
}

impl ErrorReporter for CollectingReporter {
    fn report_spawn(&self, report: &SpawnReport) {
        self.reports.lock().unwrap().push(report.clone());
    }
}

/// A spawner wired to a [`FakeBackend`] with a temporary data directory
pub struct Fixture {
    pub dir: TempDir,
    pub backend: Arc<FakeBackend>,
    pub registry: Arc<PtyRegistry>,
    pub status: Arc<ProviderStatusCache>,
    pub reporter: Arc<CollectingReporter>,
    pub map: Arc<SessionMap>,
    /// Executable lookup over `<dir>/bin`, shared by every spawner
    pub commands: Arc<CommandResolver>,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let map = Arc::new(SessionMap::in_dir(dir.path(), 100));
        let commands = Arc::new(CommandResolver::with_path(
            Some(dir.path().join("bin").into_os_string()),
            Platform::Posix,
            "",
        ));
        Self {
            dir,
            backend: FakeBackend::new(),
            registry: Arc::new(PtyRegistry::new()),
            status: Arc::new(ProviderStatusCache::new()),
            reporter: Arc::new(CollectingReporter::default()),
            map,
            commands,
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Host environment with a login shell, a credential and an unrelated
    /// secret that must never be forwarded.
    pub fn host(&self) -> HostEnv {
        let home = self.path().to_string_lossy().into_owned();
        HostEnv::from_pairs([
            ("HOME", home.as_str()),
            ("USER", "dev"),
            ("SHELL", "/bin/zsh"),
            ("PATH", "/usr/local/bin:/usr/bin:/bin"),
            ("ANTHROPIC_API_KEY", "sk-ant-test"),
            ("DATABASE_PASSWORD", "hunter2"),
        ])
    }

    pub fn spawner(&self) -> PtySpawner {
        self.spawner_with(ProviderResolver::builtin(), self.host())
    }

    pub fn spawner_with(&self, resolver: ProviderResolver, host: HostEnv) -> PtySpawner {
        let backend: Arc<dyn PtyBackend> = self.backend.clone();
        PtySpawner::new(backend, self.registry.clone(), SessionIsolation::new(self.map.clone()))
            .with_resolver(resolver)
            .with_status_source(self.status.clone())
            .with_command_resolver(self.commands.clone())
            .with_reporter(self.reporter.clone())
            .with_host_env(host)
            .with_platform(Platform::Posix)
    }

    /// Mark `provider` installed at an executable inside the fixture
    pub fn install(&self, provider: &str, name: &str) -> PathBuf {
        let path = self.executable(name);
        self.status
            .set(provider, ProviderStatus::installed_at(path.clone()));
        path
    }

    /// Create an executable file under `<dir>/bin`
    pub fn executable(&self, name: &str) -> PathBuf {
        let bin = self.path().join("bin");
        std::fs::create_dir_all(&bin).unwrap();
        let path = bin.join(name);
        std::fs::write(&path, "#!/bin/sh\nexit 0\n").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        path
    }
}
