//! Integration tests wiring a governance stack from configuration files.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anchor_config::loader::load_with_env;
use anchor_config::{Config, LoadOptions};
use anchor_core::{AgentId, Clock, ManualClock};
use anchor_policy::{PolicyRegistry, PolicySource, ReasonCode};
use anchor_runtime::GovernedStore;
use anchor_runtime::config_bridge::{build_audit_log, seed_policies, to_reaper_config, to_store_config};
use anchor_test::{test_dir, test_start_time};
use serde_json::{Map, json};

const SUPPORT_BOT: &str = r#"
[store]
lock_timeout_ms = 250

[retention]
tombstone_grace_secs = 600

[agents.support_bot.policies]
block_pii = true
block_secrets = true
retention_days = 30
denied_key_prefixes = ["internal:"]

[agents.support_bot.policies.retention_by_prefix]
"session:" = 1

[[agents.support_bot.policies.custom_blocked_patterns]]
name = "ticket_ref"
regex = "TICKET-[0-9]{6}"
"#;

fn write_file(dir: &Path, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

fn options(dir: &Path, explicit: Option<std::path::PathBuf>) -> LoadOptions {
    LoadOptions {
        explicit,
        home: Some(dir.join("home")),
        system: Some(dir.join("system.toml")),
    }
}

struct Stack {
    clock: ManualClock,
    store: GovernedStore,
}

fn build(cfg: &Config, clock: ManualClock) -> Stack {
    let shared: Arc<dyn Clock> = Arc::new(clock.clone());
    let registry = Arc::new(PolicyRegistry::new(Arc::clone(&shared)));
    seed_policies(cfg, &registry).unwrap();
    let audit = Arc::new(build_audit_log(cfg, Arc::clone(&shared)).unwrap());
    let policies: Arc<dyn PolicySource> = registry;
    let store = GovernedStore::builder(policies, audit)
        .clock(shared)
        .config(to_store_config(cfg))
        .build();
    Stack { clock, store }
}

#[tokio::test]
async fn test_configured_policy_is_enforced() {
    let dir = test_dir();
    let path = write_file(dir.path(), "anchor.toml", SUPPORT_BOT);
    let cfg = Config::load_file(&path).unwrap();
    let stack = build(&cfg, ManualClock::new(test_start_time()));
    let agent = AgentId::new("support_bot").unwrap();

    let pii = stack
        .store
        .write(&agent, "user:email", json!("a@b.com"), Map::new())
        .await
        .unwrap();
    assert_eq!(pii.reason, Some(ReasonCode::PiiDetected));

    let prefix = stack
        .store
        .write(&agent, "internal:flag", json!(true), Map::new())
        .await
        .unwrap();
    assert_eq!(prefix.reason, Some(ReasonCode::PrefixDenied));

    let custom = stack
        .store
        .write(&agent, "notes:1", json!("see TICKET-123456"), Map::new())
        .await
        .unwrap();
    assert_eq!(
        custom.reason,
        Some(ReasonCode::CustomPatternMatched("ticket_ref".into()))
    );

    let session = stack
        .store
        .write(&agent, "session:cart", json!(["book"]), Map::new())
        .await
        .unwrap();
    assert!(session.allowed);
    assert_eq!(session.expires_at, Some(stack.clock.now().plus_days(1)));

    // Agents without a configured policy are unrestricted.
    let other = AgentId::new("other_bot").unwrap();
    assert!(
        stack
            .store
            .write(&other, "user:email", json!("a@b.com"), Map::new())
            .await
            .unwrap()
            .allowed
    );
}

#[test]
fn test_runtime_settings_follow_config() {
    let dir = test_dir();
    let path = write_file(dir.path(), "anchor.toml", SUPPORT_BOT);
    let cfg = Config::load_file(&path).unwrap();

    assert_eq!(
        to_store_config(&cfg).lock_timeout,
        std::time::Duration::from_millis(250)
    );
    let reaper = to_reaper_config(&cfg);
    assert!(reaper.enabled);
    assert_eq!(reaper.tombstone_grace, std::time::Duration::from_secs(600));
}

#[test]
fn test_layers_and_environment_precedence() {
    let dir = test_dir();
    write_file(dir.path(), "system.toml", "[logging]\nlevel = \"warn\"\nformat = \"json\"\n");
    std::fs::create_dir_all(dir.path().join("home")).unwrap();
    write_file(&dir.path().join("home"), "config.toml", "[logging]\nlevel = \"debug\"\n");
    let explicit = write_file(dir.path(), "explicit.toml", SUPPORT_BOT);

    let env: HashMap<String, String> = [("ANCHOR_LOCK_TIMEOUT_MS".to_owned(), "900".to_owned())]
        .into_iter()
        .collect();
    let resolved = load_with_env(&options(dir.path(), Some(explicit)), &env).unwrap();

    assert_eq!(resolved.loaded_files.len(), 3);
    assert_eq!(resolved.env_overrides, 1);
    let cfg = resolved.config;
    assert_eq!(cfg.logging.level, "debug");
    assert_eq!(cfg.logging.format, "json");
    assert_eq!(cfg.store.lock_timeout_ms, 900);
    assert!(cfg.agents["support_bot"].policies.block_pii);
}

#[test]
fn test_invalid_agent_regex_rejected_when_seeding() {
    let dir = test_dir();
    let path = write_file(
        dir.path(),
        "bad.toml",
        "[[agents.x.policies.custom_blocked_patterns]]\nname = \"broken\"\nregex = \"(\"\n",
    );
    let cfg = Config::load_file(&path).unwrap();
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(test_start_time()));
    let registry = PolicyRegistry::new(clock);
    assert!(seed_policies(&cfg, &registry).is_err());
}

#[tokio::test]
async fn test_file_audit_backend_from_config() {
    let dir = test_dir();
    let audit_dir = dir.path().join("audit");
    let env: HashMap<String, String> = [
        ("ANCHOR_AUDIT_BACKEND".to_owned(), "file".to_owned()),
        (
            "ANCHOR_AUDIT_PATH".to_owned(),
            audit_dir.display().to_string(),
        ),
    ]
    .into_iter()
    .collect();
    let cfg = load_with_env(&options(dir.path(), None), &env)
        .unwrap()
        .config;

    let agent = AgentId::new("support_bot").unwrap();
    {
        let stack = build(&cfg, ManualClock::new(test_start_time()));
        stack
            .store
            .write(&agent, "k", json!(1), Map::new())
            .await
            .unwrap();
        stack.store.audit().flush().unwrap();
    }
    assert!(audit_dir.join("support_bot.jsonl").exists());

    let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(test_start_time()));
    let reopened = build_audit_log(&cfg, clock).unwrap();
    let verification = reopened.verify(&agent).unwrap();
    assert!(verification.valid);
    assert_eq!(verification.events_checked, 1);
}
