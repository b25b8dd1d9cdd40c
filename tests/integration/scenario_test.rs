//! End-to-end scenario: two plugins observing commands through `command:*` hooks.

use serde_json::{Value, json};

use plughost_core::error::ErrorKind;
use plughost_runtime::builder::PluginBuilder;
use plughost_runtime::commands::Command;
use plughost_runtime::hooks::definitions::{Hook, HookContext, HookExecutionOptions};
use plughost_runtime::installer::InstallOptions;

use crate::helpers::{CallLog, TestRuntime, manifest};

fn observer(name: &str, priority: i32, log: &CallLog) -> PluginBuilder {
    let owner = name.to_string();
    let seen = log.clone();
    PluginBuilder::new(manifest(name, "1.0.0")).hook(
        Hook::from_fn("command:after", move |_ctx, args| {
            let owner = owner.clone();
            let seen = seen.clone();
            async move {
                let command = args.first().and_then(Value::as_str).unwrap_or_default();
                seen.push(format!("{owner} after {command}"));
                Ok(json!({ "observer": owner, "command": command }))
            }
        })
        .with_priority(priority),
    )
}

async fn setup(log: &CallLog) -> TestRuntime {
    let app = TestRuntime::new().await;

    let audit_log = log.clone();
    app.provide(move || observer("audit", 10, &audit_log).build_arc());

    let metrics_log = log.clone();
    app.provide(move || {
        let errors = metrics_log.clone();
        observer("metrics", 1, &metrics_log)
            .hook(Hook::from_fn("command:error", move |_ctx, args| {
                let errors = errors.clone();
                async move {
                    let message = args.get(2).and_then(Value::as_str).unwrap_or_default();
                    errors.push(format!("metrics error {message}"));
                    Ok(Value::Null)
                }
            }))
            .build_arc()
    });

    app.provide(|| {
        PluginBuilder::new(manifest("shell", "1.0.0"))
            .command(
                Command::from_fn("shell:echo", |_ctx, args| async move {
                    Ok(json!(args.join(" ")))
                })
                .with_alias("echo"),
            )
            .command(Command::from_fn("shell:fail", |_ctx, _args| async {
                Err::<Value, _>(anyhow::anyhow!("exit status 1"))
            }))
            .build_arc()
    });

    let enable = InstallOptions {
        enable: Some(true),
        ..InstallOptions::default()
    };
    for name in ["audit", "metrics", "shell"] {
        app.manager().install(name, &enable).await.unwrap();
    }
    app
}

#[tokio::test]
async fn test_command_after_runs_audit_before_metrics() {
    let log = CallLog::default();
    let app = setup(&log).await;

    let args = vec![json!("shell:echo"), json!(["hi"]), json!("hi")];
    let result = app
        .dispatcher()
        .execute_hooks(
            "command:after",
            HookContext::new(),
            &HookExecutionOptions::default(),
            args,
        )
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(
        result.executed_hooks,
        vec!["command:after".to_string(), "command:after".to_string()]
    );
    assert_eq!(result.results[0]["observer"], json!("audit"));
    assert_eq!(result.results[1]["observer"], json!("metrics"));
}

#[tokio::test]
async fn test_command_execution_fires_observers() {
    let log = CallLog::default();
    let app = setup(&log).await;

    let output = app
        .runtime
        .execute_command("echo", vec!["hello".into(), "world".into()])
        .await
        .unwrap();
    assert_eq!(output, json!("hello world"));
    assert_eq!(
        log.entries(),
        vec!["audit after shell:echo", "metrics after shell:echo"]
    );

    let err = app
        .runtime
        .execute_command("shell:fail", Vec::new())
        .await
        .unwrap_err();
    assert!(err.is(ErrorKind::HookExecution));
    assert!(err.to_string().contains("exit status 1"));
    assert_eq!(log.count("metrics error exit status 1"), 1);
    assert_eq!(log.count("audit after shell:fail"), 0);
}

#[tokio::test]
async fn test_disabling_observer_removes_it_from_dispatch() {
    let log = CallLog::default();
    let app = setup(&log).await;

    app.manager().disable("audit").await.unwrap();
    app.runtime
        .execute_command("shell:echo", vec!["x".into()])
        .await
        .unwrap();

    assert_eq!(log.entries(), vec!["metrics after shell:echo"]);

    app.manager().uninstall("shell").await.unwrap();
    let err = app
        .runtime
        .execute_command("echo", Vec::new())
        .await
        .unwrap_err();
    assert!(err.is(ErrorKind::NotFound));
}

#[tokio::test]
async fn test_hook_stats_track_command_traffic() {
    let log = CallLog::default();
    let app = setup(&log).await;

    for _ in 0..3 {
        app.runtime
            .execute_command("shell:echo", Vec::new())
            .await
            .unwrap();
    }

    let stats = app.dispatcher().hook_stats(Some("command:after"));
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].executions, 6);
    assert_eq!(stats[0].errors, 0);

    let hooks = app.dispatcher().get_hooks(Some("command:after")).await;
    let owners: Vec<&str> = hooks.iter().map(|h| h.plugin_name.as_str()).collect();
    assert_eq!(owners, vec!["audit", "metrics"]);
    assert!(hooks.iter().all(|h| h.execution_count == 3));
}
