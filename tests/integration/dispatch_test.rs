//! Integration tests for hook dispatch through a wired runtime.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use serde_json::json;

use plughost_runtime::hooks::definitions::{
    Hook, HookContext, HookExecutionOptions, HookFailureKind,
};

use crate::helpers::{TestRuntime, value_hook};

#[tokio::test]
async fn test_priority_order_with_ties() {
    let app = TestRuntime::new().await;
    let dispatcher = app.dispatcher();

    dispatcher
        .register_hook(value_hook("order:test", 1, json!("p1")), "alpha")
        .await
        .unwrap();
    dispatcher
        .register_hook(value_hook("order:test", 5, json!("p5-first")), "alpha")
        .await
        .unwrap();
    dispatcher
        .register_hook(value_hook("order:test", 3, json!("p3")), "beta")
        .await
        .unwrap();
    dispatcher
        .register_hook(value_hook("order:test", 5, json!("p5-second")), "beta")
        .await
        .unwrap();

    let result = dispatcher
        .fire("order:test", HookContext::new(), Vec::new())
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(
        result.results,
        vec![json!("p5-first"), json!("p5-second"), json!("p3"), json!("p1")]
    );
}

#[tokio::test]
async fn test_once_hook_runs_exactly_once() {
    let app = TestRuntime::new().await;
    let dispatcher = app.dispatcher();
    let calls = Arc::new(AtomicU32::new(0));

    let counter = calls.clone();
    dispatcher
        .register_hook(
            Hook::from_fn("once:test", move |_ctx, _args| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(json!("ran"))
                }
            })
            .once(),
            "alpha",
        )
        .await
        .unwrap();

    for _ in 0..3 {
        dispatcher
            .fire("once:test", HookContext::new(), Vec::new())
            .await
            .unwrap();
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!dispatcher.has_hook("once:test").await);
    assert!(dispatcher.get_hooks(Some("once:test")).await.is_empty());
}

#[tokio::test]
async fn test_parallel_once_hook_runs_once() {
    let app = TestRuntime::new().await;
    let dispatcher = app.dispatcher().clone();
    let calls = Arc::new(AtomicU32::new(0));

    let counter = calls.clone();
    dispatcher
        .register_hook(
            Hook::from_fn("once:race", move |_ctx, _args| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Ok(json!(null))
                }
            })
            .once(),
            "alpha",
        )
        .await
        .unwrap();

    let first = {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move {
            dispatcher
                .fire("once:race", HookContext::new(), Vec::new())
                .await
        })
    };
    let second = dispatcher
        .fire("once:race", HookContext::new(), Vec::new())
        .await
        .unwrap();
    let first = first.await.unwrap().unwrap();

    let executed = first.executed_hooks.len() + second.executed_hooks.len();
    assert_eq!(executed, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_timeout_isolates_stuck_handler() {
    let app = TestRuntime::new().await;
    let dispatcher = app.dispatcher();

    dispatcher
        .register_hook(
            Hook::from_fn("slow:test", |_ctx, _args| async {
                futures::future::pending::<()>().await;
                Ok(json!("never"))
            })
            .with_priority(10),
            "stuck",
        )
        .await
        .unwrap();
    dispatcher
        .register_hook(value_hook("slow:test", 1, json!("fast")), "healthy")
        .await
        .unwrap();

    let options = HookExecutionOptions::new().with_timeout(Duration::from_millis(50));
    let started = Instant::now();
    let result = dispatcher
        .execute_hooks("slow:test", HookContext::new(), &options, Vec::new())
        .await
        .unwrap();
    let elapsed = started.elapsed();

    assert!(!result.success);
    assert_eq!(result.results, vec![json!("fast")]);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].kind, HookFailureKind::Timeout);
    assert_eq!(result.errors[0].hook_name, "slow:test");
    assert_eq!(result.errors[0].plugin_name, "stuck");
    assert_eq!(result.executed_hooks.len(), 2);
    assert!(elapsed < Duration::from_secs(1), "took {elapsed:?}");
}

#[tokio::test]
async fn test_hook_timeout_overrides_option_timeout() {
    let app = TestRuntime::new().await;
    let dispatcher = app.dispatcher();

    dispatcher
        .register_hook(
            Hook::from_fn("slow:own-timeout", |_ctx, _args| async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(json!("late"))
            })
            .with_timeout(Duration::from_millis(20)),
            "alpha",
        )
        .await
        .unwrap();

    let options = HookExecutionOptions::new().with_timeout(Duration::from_secs(5));
    let result = dispatcher
        .execute_hooks("slow:own-timeout", HookContext::new(), &options, Vec::new())
        .await
        .unwrap();

    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].kind, HookFailureKind::Timeout);
}

#[tokio::test]
async fn test_retry_accounting() {
    let app = TestRuntime::new().await;
    let dispatcher = app.dispatcher();
    let attempts = Arc::new(AtomicU32::new(0));

    let counter = attempts.clone();
    dispatcher
        .register_hook(
            Hook::from_fn("flaky:test", move |_ctx, _args| {
                let counter = counter.clone();
                async move {
                    let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    if attempt < 3 {
                        Err(anyhow::anyhow!("attempt {attempt} failed"))
                    } else {
                        Ok(json!(attempt))
                    }
                }
            }),
            "alpha",
        )
        .await
        .unwrap();

    let options = HookExecutionOptions::new().with_retries(2, Duration::from_millis(5));
    let result = dispatcher
        .execute_hooks("flaky:test", HookContext::new(), &options, Vec::new())
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.results, vec![json!(3)]);
    assert_eq!(attempts.load(Ordering::SeqCst), 3);

    let stats = dispatcher.hook_stats(Some("flaky:test"));
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].executions, 1);
    assert_eq!(stats[0].errors, 0);
}

#[tokio::test]
async fn test_stop_on_error_aborts_lower_priority() {
    let app = TestRuntime::new().await;
    let dispatcher = app.dispatcher();

    dispatcher
        .register_hook(
            Hook::from_fn("abort:test", |_ctx, _args| async {
                Err::<serde_json::Value, _>(anyhow::anyhow!("boom"))
            })
            .with_priority(10),
            "failing",
        )
        .await
        .unwrap();
    dispatcher
        .register_hook(value_hook("abort:test", 1, json!("lower")), "healthy")
        .await
        .unwrap();

    let options = HookExecutionOptions::new().stop_on_error();
    let result = dispatcher
        .execute_hooks("abort:test", HookContext::new(), &options, Vec::new())
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.executed_hooks, vec!["abort:test".to_string()]);
    assert!(result.results.is_empty());
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].plugin_name, "failing");

    let result = dispatcher
        .fire("abort:test", HookContext::new(), Vec::new())
        .await
        .unwrap();
    assert_eq!(result.executed_hooks.len(), 2);
    assert_eq!(result.results, vec![json!("lower")]);
}

#[tokio::test]
async fn test_parallel_results_keep_priority_positions() {
    let app = TestRuntime::new().await;
    let dispatcher = app.dispatcher();

    for (priority, delay_ms) in [(3u64, 40u64), (2, 5), (1, 20)] {
        dispatcher
            .register_hook(
                Hook::from_fn("parallel:test", move |_ctx, _args| async move {
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    Ok(json!(priority))
                })
                .with_priority(priority as i32),
                "alpha",
            )
            .await
            .unwrap();
    }
    dispatcher
        .register_hook(
            Hook::from_fn("parallel:test", |_ctx, _args| async {
                Err::<serde_json::Value, _>(anyhow::anyhow!("fails"))
            })
            .with_priority(0),
            "beta",
        )
        .await
        .unwrap();

    let options = HookExecutionOptions::new().parallel().stop_on_error();
    let started = Instant::now();
    let result = dispatcher
        .execute_hooks("parallel:test", HookContext::new(), &options, Vec::new())
        .await
        .unwrap();

    assert_eq!(result.results, vec![json!(3), json!(2), json!(1)]);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.executed_hooks.len(), 4);
    assert!(started.elapsed() < Duration::from_millis(60 * 3));
}

#[tokio::test]
async fn test_unregister_plugin_hooks_is_atomic() {
    let app = TestRuntime::new().await;
    let dispatcher = app.dispatcher();

    for name in ["a:one", "a:two", "shared:hook"] {
        dispatcher
            .register_hook(value_hook(name, 0, json!(name)), "alpha")
            .await
            .unwrap();
    }
    dispatcher
        .register_hook(value_hook("shared:hook", 0, json!("beta")), "beta")
        .await
        .unwrap();

    let removed = dispatcher.unregister_hooks("alpha").await;
    assert_eq!(removed, 3);

    let remaining = dispatcher.get_hooks(None).await;
    assert!(remaining.iter().all(|h| h.plugin_name != "alpha"));
    assert_eq!(remaining.len(), 1);
    assert_eq!(dispatcher.hook_names().await, vec!["shared:hook".to_string()]);
    assert!(!dispatcher.has_hook("a:one").await);
}

#[tokio::test]
async fn test_in_flight_dispatch_uses_snapshot() {
    let app = TestRuntime::new().await;
    let dispatcher = app.dispatcher().clone();

    let late = dispatcher.clone();
    dispatcher
        .register_hook(
            Hook::from_fn("snapshot:test", move |_ctx, _args| {
                let late = late.clone();
                async move {
                    late.register_hook(value_hook("snapshot:test", 0, json!("late")), "beta")
                        .await?;
                    Ok(json!("first"))
                }
            })
            .with_priority(10)
            .once(),
            "alpha",
        )
        .await
        .unwrap();

    let result = dispatcher
        .fire("snapshot:test", HookContext::new(), Vec::new())
        .await
        .unwrap();
    assert_eq!(result.results, vec![json!("first")]);

    let result = dispatcher
        .fire("snapshot:test", HookContext::new(), Vec::new())
        .await
        .unwrap();
    assert_eq!(result.results, vec![json!("late")]);
}

#[tokio::test]
async fn test_condition_guards_dispatch() {
    let app = TestRuntime::new().await;
    let dispatcher = app.dispatcher();

    dispatcher
        .register_hook(
            value_hook("guarded:test", 0, json!("admin only")).with_condition_fn(
                |ctx, _args| async move { Ok(ctx.get_string("role") == Some("admin")) },
            ),
            "alpha",
        )
        .await
        .unwrap();

    let result = dispatcher
        .fire(
            "guarded:test",
            HookContext::new().with_string("role", "guest"),
            Vec::new(),
        )
        .await
        .unwrap();
    assert!(result.success);
    assert!(result.executed_hooks.is_empty());
    assert_eq!(result.skipped_hooks, vec!["guarded:test".to_string()]);

    let result = dispatcher
        .fire(
            "guarded:test",
            HookContext::new().with_string("role", "admin"),
            Vec::new(),
        )
        .await
        .unwrap();
    assert_eq!(result.results, vec![json!("admin only")]);
}
