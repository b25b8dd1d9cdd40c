//! Integration tests for plugin install, enable, disable, update, and uninstall.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use serde_json::json;

use plughost_core::error::ErrorKind;
use plughost_core::events::{PluginEvent, RuntimeEvent};
use plughost_runtime::builder::PluginBuilder;
use plughost_runtime::commands::Command;
use plughost_runtime::hooks::definitions::{Hook, HookContext};
use plughost_runtime::installer::{BuiltinInstaller, InstallOptions, PluginInstaller};
use plughost_runtime::lifecycle::PluginState;
use plughost_runtime::manager::PluginStatus;
use plughost_runtime::manifest::PluginInfo;
use plughost_runtime::registry::{MemoryPluginRegistry, PluginRegistry};
use plughost_runtime::semver::VersionReq;

use crate::helpers::{
    CallLog, TestRuntime, manifest, record, sample_builder, sample_plugin, value_hook,
};

#[tokio::test]
async fn test_operations_require_initialization() {
    let app = TestRuntime::unstarted(BuiltinInstaller::new(), MemoryPluginRegistry::new());
    let log = CallLog::default();
    let plugin_log = log.clone();
    app.provide(move || sample_plugin("audit", "1.0.0", &plugin_log));

    let err = app
        .manager()
        .install("audit", &InstallOptions::default())
        .await
        .unwrap_err();
    assert!(err.is(ErrorKind::NotInitialized));

    let err = app.manager().enable("audit").await.unwrap_err();
    assert!(err.is(ErrorKind::NotInitialized));

    app.manager().initialize().await.unwrap();
    app.manager().initialize().await.unwrap();
    assert!(app.manager().is_initialized());
    app.manager()
        .install("audit", &InstallOptions::default())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_enable_disable_round_trip() {
    let app = TestRuntime::new().await;
    let log = CallLog::default();
    let plugin_log = log.clone();
    app.provide(move || sample_plugin("audit", "1.0.0", &plugin_log));
    let manager = app.manager();

    let installed = manager
        .install("builtin:audit", &InstallOptions::default())
        .await
        .unwrap();
    assert_eq!(installed.name, "audit");
    assert_eq!(installed.version, "1.0.0");
    assert!(!installed.enabled);
    assert!(manager.is_installed("audit").await);
    assert!(!manager.is_enabled("audit").await);

    manager.enable("audit").await.unwrap();
    assert!(manager.is_enabled("audit").await);
    assert_eq!(app.dispatcher().hook_count().await, 1);
    assert_eq!(app.runtime.commands().count().await, 1);

    let summary = manager.get_plugin("audit").await.unwrap();
    assert_eq!(summary.status, PluginStatus::Enabled);
    assert_eq!(summary.state, PluginState::Active);

    let output = app
        .runtime
        .execute_command("audit:hello", vec!["x".into()])
        .await
        .unwrap();
    assert_eq!(output, json!({ "plugin": "audit", "args": ["x"] }));

    manager.disable("audit").await.unwrap();
    assert_eq!(app.dispatcher().hook_count().await, 0);
    assert_eq!(app.runtime.commands().count().await, 0);
    assert_eq!(
        manager.get_plugin("audit").await.unwrap().state,
        PluginState::Deactivated
    );

    manager.uninstall("audit").await.unwrap();
    assert!(manager.list().await.is_empty());
    assert_eq!(app.dispatcher().hook_count().await, 0);
    assert!(app.registry.list_plugins().await.unwrap().is_empty());

    assert_eq!(
        log.entries(),
        vec![
            "audit:install",
            "audit:init",
            "audit:activate",
            "audit:deactivate",
            "audit:cleanup",
            "audit:uninstall",
        ]
    );
}

#[tokio::test]
async fn test_enable_and_disable_are_idempotent() {
    let app = TestRuntime::new().await;
    let log = CallLog::default();
    let plugin_log = log.clone();
    app.provide(move || sample_plugin("audit", "1.0.0", &plugin_log));
    let manager = app.manager();

    manager
        .install("audit", &InstallOptions::default())
        .await
        .unwrap();
    manager.disable("audit").await.unwrap();
    manager.enable("audit").await.unwrap();
    manager.enable("audit").await.unwrap();
    assert_eq!(log.count("audit:init"), 1);
    assert_eq!(app.dispatcher().hook_count().await, 1);

    manager.disable("audit").await.unwrap();
    manager.disable("audit").await.unwrap();
    assert_eq!(log.count("audit:deactivate"), 1);

    let err = manager.enable("missing").await.unwrap_err();
    assert!(err.is(ErrorKind::NotFound));
    let err = manager.disable("missing").await.unwrap_err();
    assert!(err.is(ErrorKind::NotFound));
    let err = manager.uninstall("missing").await.unwrap_err();
    assert!(err.is(ErrorKind::NotFound));
}

#[tokio::test]
async fn test_install_refuses_duplicate_unless_forced() {
    let app = TestRuntime::new().await;
    let log = CallLog::default();
    let plugin_log = log.clone();
    app.provide(move || sample_plugin("audit", "1.0.0", &plugin_log));
    let manager = app.manager();

    manager
        .install("audit", &InstallOptions::default())
        .await
        .unwrap();
    let err = manager
        .install("audit", &InstallOptions::default())
        .await
        .unwrap_err();
    assert!(err.is(ErrorKind::Conflict));

    manager.enable("audit").await.unwrap();
    let reinstalled = manager
        .install("audit", &InstallOptions::forced())
        .await
        .unwrap();
    assert_eq!(reinstalled.name, "audit");
    assert_eq!(manager.list().await.len(), 1);
    assert!(!manager.is_enabled("audit").await);
    assert_eq!(app.dispatcher().hook_count().await, 0);
}

#[tokio::test]
async fn test_failed_forced_reinstall_keeps_existing_plugin() {
    let app = TestRuntime::new().await;
    let log = CallLog::default();
    let plugin_log = log.clone();
    app.provide(move || sample_plugin("audit", "1.0.0", &plugin_log));
    let broken_log = log.clone();
    app.installer.register_source("audit-broken", move || {
        sample_builder("audit", "2.0.0", &broken_log)
            .on_install(|_ctx| async { Err::<(), _>(anyhow::anyhow!("boom")) })
            .build_arc()
    });
    let manager = app.manager();

    manager
        .install("audit", &InstallOptions::default())
        .await
        .unwrap();
    manager.enable("audit").await.unwrap();

    let err = manager
        .install("audit-broken", &InstallOptions::forced())
        .await
        .unwrap_err();
    assert!(err.is(ErrorKind::Lifecycle));
    assert!(err.to_string().contains("boom"));

    let summary = manager.get_plugin("audit").await.unwrap();
    assert_eq!(summary.version, "1.0.0");
    assert_eq!(summary.status, PluginStatus::Enabled);
    assert_eq!(summary.state, PluginState::Active);
    assert_eq!(log.count("audit:deactivate"), 0);
    assert_eq!(app.dispatcher().hook_count().await, 1);

    manager.uninstall("audit").await.unwrap();
    assert!(!manager.is_installed("audit").await);
}

#[tokio::test]
async fn test_reinstall_from_other_source_leaves_package_alone() {
    let app = TestRuntime::new().await;
    let log = CallLog::default();
    let plugin_log = log.clone();
    app.provide(move || sample_plugin("audit", "1.0.0", &plugin_log));
    let next_log = log.clone();
    app.installer
        .register_source("audit-next", move || sample_plugin("audit", "2.0.0", &next_log));
    let manager = app.manager();

    manager
        .install("audit", &InstallOptions::default())
        .await
        .unwrap();
    manager.enable("audit").await.unwrap();

    assert!(
        manager
            .install("audit-next", &InstallOptions::default())
            .await
            .is_err()
    );
    assert_eq!(app.installer.installed_source("audit").as_deref(), Some("audit"));
    assert!(manager.is_enabled("audit").await);
    assert_eq!(manager.get_plugin("audit").await.unwrap().version, "1.0.0");
}

#[tokio::test]
async fn test_failed_install_registers_nothing() {
    let app = TestRuntime::new().await;
    let log = CallLog::default();
    let plugin_log = log.clone();
    app.provide(move || {
        sample_builder("fragile", "1.0.0", &plugin_log)
            .on_install(|_ctx| async { Err::<(), _>(anyhow::anyhow!("disk full")) })
            .build_arc()
    });
    let manager = app.manager();

    let err = manager
        .install("nowhere", &InstallOptions::default())
        .await
        .unwrap_err();
    assert!(err.is(ErrorKind::Installation));

    let err = manager
        .install("fragile", &InstallOptions::default())
        .await
        .unwrap_err();
    assert!(err.is(ErrorKind::Lifecycle));

    assert!(!manager.is_installed("fragile").await);
    assert!(app.registry.get_plugin_info("fragile").await.unwrap().is_none());
    assert_eq!(manager.get_stats().await.total, 0);
}

#[tokio::test]
async fn test_auto_enable_on_install() {
    let app = TestRuntime::new().await;
    let log = CallLog::default();
    let plugin_log = log.clone();
    app.provide(move || sample_plugin("audit", "1.0.0", &plugin_log));

    let options = InstallOptions {
        enable: Some(true),
        config: Some(json!({ "level": "verbose" })),
        ..InstallOptions::default()
    };
    let installed = app.manager().install("audit", &options).await.unwrap();

    assert!(installed.enabled);
    assert!(app.manager().is_enabled("audit").await);
    let ctx = app.manager().plugin_context("audit").await.unwrap();
    assert_eq!(ctx.config_value("level"), Some(json!("verbose")));
    let record = app.registry.get_plugin_info("audit").await.unwrap().unwrap();
    assert!(record.enabled);
}

#[tokio::test]
async fn test_failed_enable_is_transactional() {
    let app = TestRuntime::new().await;
    let log = CallLog::default();
    let plugin_log = log.clone();
    app.provide(move || {
        sample_builder("broken", "1.0.0", &plugin_log)
            .on_activate(|_ctx| async { Err::<(), _>(anyhow::anyhow!("activation refused")) })
            .build_arc()
    });
    let manager = app.manager();

    manager
        .install("broken", &InstallOptions::default())
        .await
        .unwrap();
    let err = manager.enable("broken").await.unwrap_err();
    assert!(err.is(ErrorKind::Lifecycle));
    assert!(err.to_string().contains("activation refused"));

    let summary = manager.get_plugin("broken").await.unwrap();
    assert_eq!(summary.status, PluginStatus::Error);
    assert_eq!(summary.state, PluginState::Error);
    assert_eq!(app.dispatcher().hook_count().await, 0);
    assert_eq!(app.runtime.commands().count().await, 0);
    assert_eq!(log.count("broken:cleanup"), 1);
    assert!(!app.registry.get_plugin_info("broken").await.unwrap().unwrap().enabled);

    let history = manager.state_history("broken").await.unwrap();
    let last = history.last().unwrap();
    assert_eq!(last.to, PluginState::Error);
    assert!(last.error.as_deref().unwrap().contains("activation refused"));

    manager.disable("broken").await.unwrap();
    assert_eq!(
        manager.get_plugin("broken").await.unwrap().status,
        PluginStatus::Disabled
    );
    manager.uninstall("broken").await.unwrap();
    assert!(manager.list().await.is_empty());
}

#[tokio::test]
async fn test_command_conflict_rolls_back_second_plugin() {
    let app = TestRuntime::new().await;
    let log = CallLog::default();
    let first_log = log.clone();
    app.provide(move || sample_plugin("audit", "1.0.0", &first_log));
    let second_log = log.clone();
    app.provide(move || {
        sample_builder("copycat", "1.0.0", &second_log)
            .command(Command::from_fn(
                "audit:hello",
                |_ctx, _args| async { Ok(json!("stolen")) },
            ))
            .build_arc()
    });
    let manager = app.manager();

    manager
        .install("audit", &InstallOptions::default())
        .await
        .unwrap();
    manager
        .install("copycat", &InstallOptions::default())
        .await
        .unwrap();
    manager.enable("audit").await.unwrap();

    let err = manager.enable("copycat").await.unwrap_err();
    assert!(err.is(ErrorKind::Lifecycle));
    assert!(app.runtime.commands().plugin_commands("copycat").await.is_empty());
    assert!(app.dispatcher().get_plugin_hooks("copycat").await.is_empty());

    let owner = app.runtime.commands().get("audit:hello").await.unwrap();
    assert_eq!(owner.plugin_name, "audit");
}

#[tokio::test]
async fn test_validation_blocks_enable() {
    let app = TestRuntime::new().await;
    let log = CallLog::default();
    let plugin_log = log.clone();
    app.provide(move || {
        sample_builder("twice", "1.0.0", &plugin_log)
            .hook(value_hook("test:ping", 0, json!("again")))
            .build_arc()
    });
    let manager = app.manager();

    manager
        .install("twice", &InstallOptions::default())
        .await
        .unwrap();
    let err = manager.enable("twice").await.unwrap_err();
    assert!(err.is(ErrorKind::Validation));
    assert_eq!(log.count("twice:init"), 0);
    assert_eq!(
        manager.get_plugin("twice").await.unwrap().status,
        PluginStatus::Installed
    );
}

#[tokio::test]
async fn test_dependencies_must_be_enabled() {
    let app = TestRuntime::new().await;
    let log = CallLog::default();
    let base_log = log.clone();
    app.provide(move || sample_plugin("base", "1.4.0", &base_log));
    let dependent_log = log.clone();
    app.provide(move || {
        let manifest = manifest("reports", "0.1.0")
            .with_dependency("base", VersionReq::parse("^1.2").unwrap());
        PluginBuilder::new(manifest)
            .on_init(record(&dependent_log, "reports", "init"))
            .hook(value_hook("test:ping", 0, json!("reports")))
            .build_arc()
    });
    let manager = app.manager();

    manager
        .install("base", &InstallOptions::default())
        .await
        .unwrap();
    manager
        .install("reports", &InstallOptions::default())
        .await
        .unwrap();

    let err = manager.enable("reports").await.unwrap_err();
    assert!(err.is(ErrorKind::Validation));
    assert!(err.to_string().contains("base"));

    manager.enable("base").await.unwrap();
    manager.enable("reports").await.unwrap();
    assert!(manager.is_enabled("reports").await);
}

#[tokio::test]
async fn test_initialize_restores_enabled_plugins_in_dependency_order() {
    let log = CallLog::default();
    let installer = BuiltinInstaller::new();
    let base_log = log.clone();
    installer.register_source("base", move || sample_plugin("base", "1.0.0", &base_log));
    let dependent_log = log.clone();
    installer.register_source("reports", move || {
        let manifest = manifest("reports", "1.0.0")
            .with_dependency("base", VersionReq::parse("^1").unwrap());
        PluginBuilder::new(manifest)
            .on_init(record(&dependent_log, "reports", "init"))
            .hook(value_hook("test:ping", 0, json!("reports")))
            .build_arc()
    });
    let idle_log = log.clone();
    installer.register_source("idle", move || sample_plugin("idle", "1.0.0", &idle_log));

    let mut records = Vec::new();
    for (source, enabled) in [("reports", true), ("idle", false), ("base", true)] {
        let plugin = installer
            .install_plugin(source, &InstallOptions::default())
            .await
            .plugin
            .unwrap();
        let mut info = PluginInfo::from_plugin(plugin.as_ref(), source);
        info.enabled = enabled;
        records.push(info);
    }

    let app = TestRuntime::unstarted(installer, MemoryPluginRegistry::with_records(records));
    app.runtime.start().await.unwrap();

    let manager = app.manager();
    assert_eq!(manager.list().await.len(), 3);
    assert!(manager.is_enabled("base").await);
    assert!(manager.is_enabled("reports").await);
    assert!(!manager.is_enabled("idle").await);
    assert_eq!(
        manager.get_plugin("idle").await.unwrap().status,
        PluginStatus::Installed
    );

    let inits: Vec<String> = log
        .entries()
        .into_iter()
        .filter(|e| e.ends_with(":init"))
        .collect();
    assert_eq!(inits, vec!["base:init", "reports:init"]);

    app.runtime.stop().await.unwrap();
    assert!(!manager.is_enabled("base").await);
    assert!(!manager.is_enabled("reports").await);
}

#[tokio::test]
async fn test_suspend_and_resume() {
    let app = TestRuntime::new().await;
    let log = CallLog::default();
    let plugin_log = log.clone();
    app.provide(move || sample_plugin("audit", "1.0.0", &plugin_log));
    let manager = app.manager();

    manager
        .install("audit", &InstallOptions::default())
        .await
        .unwrap();
    let err = manager.suspend("audit").await.unwrap_err();
    assert!(err.is(ErrorKind::Conflict));

    manager.enable("audit").await.unwrap();
    manager.suspend("audit").await.unwrap();
    assert_eq!(
        manager.get_plugin("audit").await.unwrap().state,
        PluginState::Suspended
    );

    let result = app
        .dispatcher()
        .fire("test:ping", HookContext::new(), Vec::new())
        .await
        .unwrap();
    assert!(result.executed_hooks.is_empty());
    assert!(app.dispatcher().has_hook("test:ping").await);

    manager.resume("audit").await.unwrap();
    let result = app
        .dispatcher()
        .fire("test:ping", HookContext::new(), Vec::new())
        .await
        .unwrap();
    assert_eq!(result.results, vec![json!("audit")]);
    assert_eq!(log.count("audit:ping"), 1);
}

#[tokio::test]
async fn test_update_reports_version_change_and_stays_enabled() {
    let app = TestRuntime::new().await;
    let log = CallLog::default();
    let builds = Arc::new(AtomicU32::new(0));

    let plugin_log = log.clone();
    let counter = builds.clone();
    app.installer.register_source("audit", move || {
        let version = if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            "1.0.0"
        } else {
            "1.1.0"
        };
        let update_log = plugin_log.clone();
        sample_builder("audit", version, &plugin_log)
            .on_update(move |_ctx, previous| {
                update_log.push(format!("audit:update-from-{previous}"));
                async { Ok(()) }
            })
            .build_arc()
    });
    let manager = app.manager();

    manager
        .install("audit", &InstallOptions::default())
        .await
        .unwrap();
    manager
        .configure("audit", json!({ "retention": 7 }))
        .await
        .unwrap();
    manager.enable("audit").await.unwrap();

    let updated = manager.update("audit").await.unwrap();
    assert_eq!(updated.previous_version, "1.0.0");
    assert_eq!(updated.version, "1.1.0");
    assert!(updated.version_changed);

    let summary = manager.get_plugin("audit").await.unwrap();
    assert_eq!(summary.version, "1.1.0");
    assert_eq!(summary.status, PluginStatus::Enabled);
    assert_eq!(log.count("audit:update-from-1.0.0"), 1);
    assert_eq!(log.count("audit:init"), 2);
    assert_eq!(app.dispatcher().hook_count().await, 1);

    let record = app.registry.get_plugin_info("audit").await.unwrap().unwrap();
    assert_eq!(record.manifest.version.to_string(), "1.1.0");
    assert_eq!(record.config, json!({ "retention": 7 }));
}

#[tokio::test]
async fn test_failed_update_restores_previous_version() {
    let app = TestRuntime::new().await;
    let log = CallLog::default();
    let builds = Arc::new(AtomicU32::new(0));

    let plugin_log = log.clone();
    let counter = builds.clone();
    app.installer.register_source("audit", move || {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            sample_plugin("audit", "1.0.0", &plugin_log)
        } else {
            sample_builder("audit", "1.1.0", &plugin_log)
                .on_update(|_ctx, _previous| async {
                    Err::<(), _>(anyhow::anyhow!("schema migration failed"))
                })
                .build_arc()
        }
    });
    let manager = app.manager();

    manager
        .install("audit", &InstallOptions::default())
        .await
        .unwrap();
    manager.enable("audit").await.unwrap();

    let err = manager.update("audit").await.unwrap_err();
    assert!(err.to_string().contains("schema migration failed"));

    let summary = manager.get_plugin("audit").await.unwrap();
    assert_eq!(summary.version, "1.0.0");
    assert_eq!(summary.status, PluginStatus::Enabled);
    assert_eq!(summary.state, PluginState::Active);
    assert_eq!(log.count("audit:init"), 2);
    assert_eq!(app.dispatcher().hook_count().await, 1);

    let record = app.registry.get_plugin_info("audit").await.unwrap().unwrap();
    assert!(record.enabled);
    assert_eq!(record.manifest.version.to_string(), "1.0.0");
}

#[tokio::test]
async fn test_configure_notifies_running_plugin() {
    let app = TestRuntime::new().await;
    let log = CallLog::default();
    let plugin_log = log.clone();
    app.provide(move || {
        let change_log = plugin_log.clone();
        sample_builder("audit", "1.0.0", &plugin_log)
            .on_config_change(move |_ctx, config| {
                change_log.push(format!("audit:config={config}"));
                async { Ok(()) }
            })
            .build_arc()
    });
    let manager = app.manager();

    manager
        .install("audit", &InstallOptions::default())
        .await
        .unwrap();
    manager.enable("audit").await.unwrap();
    manager
        .configure("audit", json!({ "level": 2 }))
        .await
        .unwrap();

    assert_eq!(log.count(r#"audit:config={"level":2}"#), 1);
    let ctx = manager.plugin_context("audit").await.unwrap();
    assert_eq!(ctx.config_value("level"), Some(json!(2)));
    let record = app.registry.get_plugin_info("audit").await.unwrap().unwrap();
    assert_eq!(record.config, json!({ "level": 2 }));
}

#[tokio::test]
async fn test_lifecycle_events_and_hooks() {
    let app = TestRuntime::new().await;
    let log = CallLog::default();
    let plugin_log = log.clone();
    app.provide(move || sample_plugin("audit", "1.0.0", &plugin_log));
    let listener_log = log.clone();
    app.provide(move || {
        let seen = listener_log.clone();
        PluginBuilder::new(manifest("watcher", "1.0.0"))
            .hook(Hook::from_fn("plugin:enabled", move |_ctx, args| {
                let seen = seen.clone();
                async move {
                    seen.push(format!("watcher saw {}", args[0].as_str().unwrap_or("?")));
                    Ok(json!(null))
                }
            }))
            .build_arc()
    });
    let manager = app.manager();
    let mut events = app.runtime.container().event_emitter().unwrap().subscribe();

    manager
        .install("watcher", &InstallOptions::default())
        .await
        .unwrap();
    manager.enable("watcher").await.unwrap();
    manager
        .install("audit", &InstallOptions::default())
        .await
        .unwrap();
    manager.enable("audit").await.unwrap();

    assert_eq!(log.count("watcher saw audit"), 1);

    let mut names = Vec::new();
    let mut state_changes = 0;
    while let Ok(event) = events.try_recv() {
        if let RuntimeEvent::Plugin(PluginEvent::StateChanged { name, .. }) = &event.payload
            && name == "audit"
        {
            state_changes += 1;
        }
        names.push(event.payload.name());
    }
    assert!(names.contains(&"plugin:installed"));
    assert!(names.contains(&"plugin:enabled"));
    assert!(names.contains(&"hook:registered"));
    // loading, loaded, initializing, initialized, activating, active
    assert_eq!(state_changes, 6);
}

#[tokio::test]
async fn test_pass_through_registration_requires_known_plugin() {
    let app = TestRuntime::new().await;
    let log = CallLog::default();
    let plugin_log = log.clone();
    app.provide(move || sample_plugin("audit", "1.0.0", &plugin_log));
    let manager = app.manager();

    let err = manager
        .register_hook("ghost", value_hook("extra:hook", 0, json!(1)))
        .await
        .unwrap_err();
    assert!(err.is(ErrorKind::NotFound));

    manager
        .install("audit", &InstallOptions::default())
        .await
        .unwrap();
    manager
        .register_hook("audit", value_hook("extra:hook", 0, json!(1)))
        .await
        .unwrap();
    assert!(app.dispatcher().has_hook("extra:hook").await);
    assert_eq!(manager.unregister_hook("audit", "extra:hook").await.unwrap(), 1);

    let command = Command::from_fn("audit:extra", |_ctx, _args| async {
        Ok(json!("extra"))
    });
    let err = manager
        .register_command("audit", command.clone())
        .await
        .unwrap_err();
    assert!(err.is(ErrorKind::Conflict));

    manager.enable("audit").await.unwrap();
    manager.register_command("audit", command).await.unwrap();
    assert_eq!(
        app.runtime
            .execute_command("audit:extra", Vec::new())
            .await
            .unwrap(),
        json!("extra")
    );
    manager
        .unregister_command("audit", "audit:extra")
        .await
        .unwrap();
    assert!(!app.runtime.commands().contains("audit:extra").await);
}

#[tokio::test]
async fn test_stats_count_by_status_and_state() {
    let app = TestRuntime::new().await;
    let log = CallLog::default();
    for name in ["one", "two", "three"] {
        let plugin_log = log.clone();
        app.provide(move || sample_plugin(name, "1.0.0", &plugin_log));
        app.manager()
            .install(name, &InstallOptions::default())
            .await
            .unwrap();
    }
    app.manager().enable("one").await.unwrap();
    app.manager().enable("two").await.unwrap();
    app.manager().disable("two").await.unwrap();

    let stats = app.manager().get_stats().await;
    assert_eq!(stats.total, 3);
    assert_eq!(stats.by_status.get("enabled"), Some(&1));
    assert_eq!(stats.by_status.get("disabled"), Some(&1));
    assert_eq!(stats.by_status.get("installed"), Some(&1));
    assert_eq!(stats.by_state.get("active"), Some(&1));
    assert_eq!(stats.by_state.get("deactivated"), Some(&1));
    assert_eq!(stats.by_state.get("loaded"), Some(&1));
    assert_eq!(stats.registered_hooks, 1);
    assert_eq!(stats.registered_commands, 1);
}
