//! Integration tests for the three spawn modes against a recording backend

mod common;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use common::Fixture;
use ptydeck::provider::{ProviderCustomConfig, ProviderResolver};
use ptydeck::pty::{
    DirectStartOptions, HostEnv, PtyKind, SpawnError, SpawnMode, SshStartOptions, StartOptions,
};
use ptydeck::session::deterministic_uuid;
use ptydeck::telemetry::SpawnStage;

fn resolver_with(provider: &str, custom: ProviderCustomConfig) -> ProviderResolver {
    let mut map = HashMap::new();
    map.insert(provider.to_string(), custom);
    ProviderResolver::new(Arc::new(map))
}

#[test]
fn test_shell_spawn_runs_agent_then_login_shell() {
    let fx = Fixture::new();
    let spawner = fx.spawner();

    let info = spawner
        .start(StartOptions {
            id: "claude-main-t1".into(),
            cwd: Some(fx.path().to_path_buf()),
            shell: Some("claude".into()),
            auto_approve: true,
            skip_resume: true,
            ..Default::default()
        })
        .unwrap();

    let request = fx.backend.last_spawn();
    let uuid = deterministic_uuid("t1");
    assert_eq!(request.program, "/bin/zsh");
    assert_eq!(
        request.args,
        vec![
            "-lic".to_string(),
            format!("claude --session-id {uuid} --dangerously-skip-permissions; exec /bin/zsh -il"),
        ]
    );
    assert_eq!((request.cols, request.rows), (80, 24));
    assert_eq!(request.env["TERM_PROGRAM"], "ptydeck");
    assert_eq!(request.env["ANTHROPIC_API_KEY"], "sk-ant-test");
    assert!(!request.env.contains_key("DATABASE_PASSWORD"));

    assert!(!info.is_direct);
    assert_eq!(info.kind, PtyKind::Local);
    assert_eq!(fx.map.get("claude-main-t1"), Some(uuid));
}

#[test]
fn test_plain_shell_gets_no_credentials() {
    let fx = Fixture::new();
    let spawner = fx.spawner();

    spawner
        .start(StartOptions {
            id: "shell-main-1".into(),
            cols: 120,
            rows: 40,
            ..Default::default()
        })
        .unwrap();

    let request = fx.backend.last_spawn();
    assert_eq!(request.program, "/bin/zsh");
    assert_eq!(request.args, vec!["-il"]);
    assert_eq!(request.cwd.as_deref(), Some(fx.path()));
    assert_eq!((request.cols, request.rows), (120, 40));
    assert!(!request.env.contains_key("ANTHROPIC_API_KEY"));
}

#[test]
fn test_shell_setup_runs_before_agent() {
    let fx = Fixture::new();
    let spawner = fx.spawner();

    spawner
        .start(StartOptions {
            id: "codex-main-t9".into(),
            shell: Some("/usr/local/bin/codex".into()),
            shell_setup: Some("source .venv/bin/activate".into()),
            initial_prompt: Some("add tests".into()),
            skip_resume: true,
            ..Default::default()
        })
        .unwrap();

    let request = fx.backend.last_spawn();
    assert_eq!(
        request.args[1],
        "source .venv/bin/activate && codex 'add tests'; exec /bin/zsh -il"
    );
}

#[test]
fn test_failed_shell_falls_back_to_bare_shell() {
    let fx = Fixture::new();
    fx.backend.fail_program("/bin/zsh");
    let spawner = fx.spawner();

    let info = spawner
        .start(StartOptions {
            id: "claude-main-t1".into(),
            shell: Some("claude".into()),
            ..Default::default()
        })
        .unwrap();

    let spawns = fx.backend.spawns();
    assert_eq!(spawns.len(), 2);
    assert_eq!(spawns[1].program, "/bin/sh");
    assert!(spawns[1].args.is_empty());
    assert!(!spawns[1].env.contains_key("ANTHROPIC_API_KEY"));
    assert!(fx.registry.has_pty(&info.id));

    let stages: Vec<SpawnStage> = fx
        .reporter
        .reports
        .lock()
        .unwrap()
        .iter()
        .map(|r| r.stage)
        .collect();
    assert_eq!(
        stages,
        vec![
            SpawnStage::Attempt,
            SpawnStage::Failed,
            SpawnStage::FallbackAttempt
        ]
    );
}

#[test]
fn test_both_shells_failing_is_fatal() {
    let fx = Fixture::new();
    fx.backend.fail_program("/bin/zsh");
    fx.backend.fail_program("/bin/sh");
    let spawner = fx.spawner();

    let err = spawner
        .start(StartOptions {
            id: "shell-main-1".into(),
            ..Default::default()
        })
        .unwrap_err();

    assert!(matches!(err, SpawnError::Fatal { .. }));
    assert!(fx.registry.is_empty());
    let reports = fx.reporter.reports.lock().unwrap();
    let last = reports.last().unwrap();
    assert_eq!(last.stage, SpawnStage::FallbackFailed);
    assert!(last.error.as_deref().unwrap().contains("posix_spawnp"));
}

#[test]
fn test_kill_switch_blocks_every_mode() {
    let fx = Fixture::new();
    let host = HostEnv::from_pairs([("SHELL", "/bin/bash"), ("PTYDECK_DISABLE_PTY", "1")]);
    let spawner = fx.spawner_with(ProviderResolver::builtin(), host);
    fx.install("claude", "claude");

    let shell = spawner.start(StartOptions::default());
    assert!(matches!(shell, Err(SpawnError::Disabled)));
    let direct = spawner.start_direct(DirectStartOptions {
        id: "claude-main-t1".into(),
        provider_id: "claude".into(),
        cwd: fx.path().to_path_buf(),
        ..Default::default()
    });
    assert!(matches!(direct, Err(SpawnError::Disabled)));
    let ssh = spawner.start_ssh(SshStartOptions {
        target: "devbox".into(),
        ..Default::default()
    });
    assert!(matches!(ssh, Err(SpawnError::Disabled)));
    assert!(fx.backend.spawns().is_empty());
}

#[test]
fn test_kill_switch_set_to_false_is_ignored() {
    let fx = Fixture::new();
    let host = HostEnv::from_pairs([("SHELL", "/bin/bash"), ("PTYDECK_DISABLE_PTY", "false")]);
    let spawner = fx.spawner_with(ProviderResolver::builtin(), host);
    assert!(spawner.start(StartOptions::default()).is_ok());
}

#[test]
fn test_unavailable_backend() {
    let fx = Fixture::new();
    fx.backend.set_unavailable("/dev/ptmx is missing");
    let spawner = fx.spawner();

    let err = spawner.start(StartOptions::default()).unwrap_err();
    assert!(matches!(err, SpawnError::BackendUnavailable(_)));
    assert!(err.to_string().contains("/dev/ptmx"));
}

#[test]
fn test_direct_spawn_of_missing_provider_returns_none() {
    let fx = Fixture::new();
    fx.backend.set_unavailable("not checked before status");
    let spawner = fx.spawner();

    let result = spawner
        .start_direct(DirectStartOptions {
            id: "claude-main-t1".into(),
            provider_id: "claude".into(),
            cwd: fx.path().to_path_buf(),
            ..Default::default()
        })
        .unwrap();
    assert!(result.is_none());

    fx.install("nope", "nope");
    let unknown = spawner
        .start_direct(DirectStartOptions {
            id: "nope-main-t1".into(),
            provider_id: "nope".into(),
            cwd: fx.path().to_path_buf(),
            ..Default::default()
        })
        .unwrap();
    assert!(unknown.is_none());

    // Nothing beyond the status lookup was touched
    assert!(fx.backend.spawns().is_empty());
    let recorded = fx.backend.recorded.lock().unwrap();
    assert!(recorded.writes.is_empty() && recorded.kills.is_empty());
    drop(recorded);
    assert_eq!(fx.commands.cached_len(), 0);
    assert!(!fx.map.path().exists());
    assert!(fx.map.is_empty());
    assert!(fx.registry.is_empty());
    assert!(fx.reporter.reports.lock().unwrap().is_empty());
}

#[test]
fn test_direct_spawn_uses_installed_path() {
    let fx = Fixture::new();
    let codex = fx.install("codex", "codex");
    let spawner = fx.spawner();

    let info = spawner
        .start_direct(DirectStartOptions {
            id: "codex-main-t2".into(),
            provider_id: "codex".into(),
            cwd: fx.path().to_path_buf(),
            auto_approve: true,
            initial_prompt: Some("fix the build".into()),
            ..Default::default()
        })
        .unwrap()
        .expect("direct spawn");

    let request = fx.backend.last_spawn();
    assert_eq!(request.program, codex.to_string_lossy());
    assert_eq!(
        request.args,
        vec!["--dangerously-bypass-approvals-and-sandbox", "fix the build"]
    );
    assert_eq!(request.env["ANTHROPIC_API_KEY"], "sk-ant-test");
    assert!(!request.env.contains_key("DATABASE_PASSWORD"));
    assert!(info.is_direct);
    assert_eq!(info.pid, Some(4242));
}

#[test]
fn test_direct_spawn_resumes_recorded_session() {
    let fx = Fixture::new();
    fx.install("claude", "claude");
    fx.map.set(
        "claude-main-t3",
        "0b5e4c9a-2f1d-4e8a-9c3b-7d6f5a4e3b2c",
        fx.path(),
    );
    let spawner = fx.spawner();

    spawner
        .start_direct(DirectStartOptions {
            id: "claude-main-t3".into(),
            provider_id: "claude".into(),
            cwd: fx.path().to_path_buf(),
            resume: true,
            ..Default::default()
        })
        .unwrap()
        .expect("direct spawn");

    let request = fx.backend.last_spawn();
    assert_eq!(
        request.args,
        vec!["--resume", "0b5e4c9a-2f1d-4e8a-9c3b-7d6f5a4e3b2c"]
    );
}

#[test]
fn test_direct_spawn_rejects_custom_cli_needing_a_shell() {
    let fx = Fixture::new();
    fx.install("codex", "codex");

    for cli in ["codex | tee log.txt", "npx codex", "$HOME/bin/codex", "codex-missing"] {
        let resolver = resolver_with(
            "codex",
            ProviderCustomConfig {
                cli: Some(cli.into()),
                ..Default::default()
            },
        );
        let spawner = fx.spawner_with(resolver, fx.host());
        let result = spawner
            .start_direct(DirectStartOptions {
                id: "codex-main-t4".into(),
                provider_id: "codex".into(),
                cwd: fx.path().to_path_buf(),
                ..Default::default()
            })
            .unwrap();
        assert!(result.is_none(), "{cli} should not spawn directly");
    }
    assert!(fx.backend.spawns().is_empty());
}

#[test]
fn test_direct_spawn_of_custom_absolute_cli() {
    let fx = Fixture::new();
    fx.install("codex", "codex");
    let nightly = fx.executable("codex-nightly");
    let resolver = resolver_with(
        "codex",
        ProviderCustomConfig {
            cli: Some(nightly.to_string_lossy().into_owned()),
            extra_args: Some("--model o3".into()),
            env: Some(HashMap::from([
                ("CODEX_HOME".to_string(), serde_json::json!("/tmp/codex")),
                ("bad key".to_string(), serde_json::json!("dropped")),
            ])),
            ..Default::default()
        },
    );
    let spawner = fx.spawner_with(resolver, fx.host());

    spawner
        .start_direct(DirectStartOptions {
            id: "codex-main-t5".into(),
            provider_id: "codex".into(),
            cwd: fx.path().to_path_buf(),
            ..Default::default()
        })
        .unwrap()
        .expect("direct spawn");

    let request = fx.backend.last_spawn();
    assert_eq!(request.program, nightly.to_string_lossy());
    assert_eq!(request.args, vec!["--model", "o3"]);
    assert_eq!(request.env["CODEX_HOME"], "/tmp/codex");
    assert!(!request.env.contains_key("bad key"));
}

#[test]
fn test_direct_exit_is_announced_once() {
    let fx = Fixture::new();
    fx.install("codex", "codex");
    let spawner = fx.spawner();
    let mut exits = spawner.subscribe_direct_exits();

    let info = spawner
        .start_direct(DirectStartOptions {
            id: "codex-main-t6".into(),
            provider_id: "codex".into(),
            cwd: fx.path().to_path_buf(),
            ..Default::default()
        })
        .unwrap()
        .unwrap();

    // A stale generation does not touch the live record
    assert!(spawner.handle_exit(&info.id, info.generation + 1, Some(0)).is_none());
    assert!(fx.registry.has_pty(&info.id));

    spawner.handle_exit(&info.id, info.generation, Some(0)).unwrap();
    let exit = exits.try_recv().unwrap();
    assert_eq!(exit.id, "codex-main-t6");
    assert_eq!(exit.cwd, fx.path());
    assert_eq!(exit.code, Some(0));
    assert!(!fx.registry.has_pty(&info.id));
    assert!(spawner.handle_exit(&info.id, info.generation, Some(0)).is_none());
}

#[test]
fn test_shell_exit_is_not_announced() {
    let fx = Fixture::new();
    let spawner = fx.spawner();
    let mut exits = spawner.subscribe_direct_exits();

    let info = spawner.start(StartOptions::default()).unwrap();
    spawner.handle_exit(&info.id, info.generation, Some(1)).unwrap();
    assert!(exits.try_recv().is_err());
}

#[tokio::test]
async fn test_exit_pump_reacts_to_backend_exit() {
    let fx = Fixture::new();
    fx.install("codex", "codex");
    let spawner = Arc::new(fx.spawner());
    let mut exits = spawner.subscribe_direct_exits();

    let info = spawner
        .start_direct(DirectStartOptions {
            id: "codex-main-t7".into(),
            provider_id: "codex".into(),
            cwd: fx.path().to_path_buf(),
            ..Default::default()
        })
        .unwrap()
        .unwrap();

    tokio::spawn(spawner.clone().run_exit_pump());
    tokio::task::yield_now().await;

    fx.backend.emit_exit(&info.id, info.generation, Some(0));
    let exit = tokio::time::timeout(Duration::from_secs(2), exits.recv())
        .await
        .expect("exit announced")
        .unwrap();
    assert_eq!(exit.id, info.id);
    assert!(!fx.registry.has_pty(&info.id));
}

#[test]
fn test_respawn_replaces_record_and_ignores_old_exit() {
    let fx = Fixture::new();
    let spawner = fx.spawner();

    let first = spawner
        .start(StartOptions {
            id: "shell-main-1".into(),
            ..Default::default()
        })
        .unwrap();
    let second = spawner
        .start(StartOptions {
            id: "shell-main-1".into(),
            ..Default::default()
        })
        .unwrap();
    assert!(second.generation > first.generation);

    assert!(spawner.handle_exit("shell-main-1", first.generation, None).is_none());
    assert_eq!(fx.registry.info("shell-main-1").unwrap().generation, second.generation);
}

#[test]
fn test_ssh_spawn() {
    let fx = Fixture::new();
    let spawner = fx.spawner().with_ssh_program("/usr/bin/ssh");

    let info = spawner
        .start_ssh(SshStartOptions {
            id: "ssh-main-r1".into(),
            target: " devbox ".into(),
            ssh_args: vec!["-p".into(), "2222".into()],
            remote_init_command: Some("cd ~/app && exec $SHELL -l".into()),
            env: BTreeMap::from([
                ("PTYDECK_TASK".to_string(), "r1".to_string()),
                ("PTYDECK_".to_string(), "bare prefix".to_string()),
                ("AWS_SECRET".to_string(), "nope".to_string()),
            ]),
            ..Default::default()
        })
        .unwrap();

    let request = fx.backend.last_spawn();
    assert_eq!(request.program, "/usr/bin/ssh");
    assert_eq!(
        request.args,
        vec!["-tt", "-p", "2222", "devbox", "cd ~/app && exec $SHELL -l"]
    );
    assert!(request.cwd.is_none());
    assert_eq!(request.env["PTYDECK_TASK"], "r1");
    assert!(!request.env.contains_key("PTYDECK_"));
    assert!(!request.env.contains_key("AWS_SECRET"));
    assert_eq!(request.env["ANTHROPIC_API_KEY"], "sk-ant-test");
    assert_eq!(info.kind, PtyKind::Ssh);
}

#[test]
fn test_ssh_without_target_fails() {
    let fx = Fixture::new();
    let spawner = fx.spawner();

    let err = spawner
        .start_ssh(SshStartOptions {
            id: "ssh-main-r2".into(),
            target: "   ".into(),
            ..Default::default()
        })
        .unwrap_err();
    assert!(matches!(
        err,
        SpawnError::Spawn {
            mode: SpawnMode::Ssh,
            ..
        }
    ));
    assert!(fx.backend.spawns().is_empty());
}

#[test]
fn test_registry_operations_reach_the_process() {
    let fx = Fixture::new();
    let spawner = fx.spawner();
    let info = spawner
        .start(StartOptions {
            id: "shell-main-2".into(),
            ..Default::default()
        })
        .unwrap();

    fx.registry.write(&info.id, b"ls\r");
    fx.registry.resize(&info.id, 132, 50);
    fx.registry.resize(&info.id, 132, 50);
    fx.registry.resize(&info.id, 0, 0);
    assert!(fx.registry.kill(&info.id));

    let recorded = fx.backend.recorded.lock().unwrap();
    assert_eq!(recorded.writes, vec![(info.id.clone(), b"ls\r".to_vec())]);
    assert_eq!(
        recorded.resizes,
        vec![(info.id.clone(), 132, 50), (info.id.clone(), 2, 1)]
    );
    assert_eq!(recorded.kills, vec![info.id.clone()]);
}
