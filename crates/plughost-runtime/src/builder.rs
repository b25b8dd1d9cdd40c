//! Builder for closure-based plugins.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use semver::Version;
use serde_json::Value;

use crate::api::context::PluginContext;
use crate::commands::Command;
use crate::hooks::definitions::Hook;
use crate::manifest::{Plugin, PluginManifest};

type PhaseFn = Arc<dyn Fn(Arc<PluginContext>) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;
type UpdateFn =
    Arc<dyn Fn(Arc<PluginContext>, Version) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;
type ConfigFn =
    Arc<dyn Fn(Arc<PluginContext>, Value) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

fn phase<F, Fut>(f: F) -> PhaseFn
where
    F: Fn(Arc<PluginContext>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |ctx| f(ctx).boxed())
}

/// Callbacks of a [`BuiltPlugin`], one slot per lifecycle phase.
#[derive(Clone, Default)]
struct Callbacks {
    init: Option<PhaseFn>,
    cleanup: Option<PhaseFn>,
    install: Option<PhaseFn>,
    activate: Option<PhaseFn>,
    deactivate: Option<PhaseFn>,
    uninstall: Option<PhaseFn>,
    update: Option<UpdateFn>,
    config_change: Option<ConfigFn>,
}

/// Assembles a [`Plugin`] from a manifest, hooks, commands, and closures.
///
/// ```rust,ignore
/// let plugin = PluginBuilder::new(manifest)
///     .hook(Hook::from_fn("command:after", |_ctx, args| async move { Ok(args[0].clone()) }))
///     .on_activate(|ctx| async move {
///         ctx.logger.info("ready");
///         Ok(())
///     })
///     .build();
/// ```
#[derive(Clone)]
pub struct PluginBuilder {
    manifest: PluginManifest,
    hooks: Vec<Hook>,
    commands: Vec<Command>,
    callbacks: Callbacks,
}

impl PluginBuilder {
    /// Starts a builder for `manifest`.
    pub fn new(manifest: PluginManifest) -> Self {
        Self {
            manifest,
            hooks: Vec::new(),
            commands: Vec::new(),
            callbacks: Callbacks::default(),
        }
    }

    /// Adds a hook.
    pub fn hook(mut self, hook: Hook) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Adds a command.
    pub fn command(mut self, command: Command) -> Self {
        self.commands.push(command);
        self
    }

    /// Sets the `init` callback.
    pub fn on_init<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Arc<PluginContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.callbacks.init = Some(phase(f));
        self
    }

    /// Sets the `cleanup` callback.
    pub fn on_cleanup<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Arc<PluginContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.callbacks.cleanup = Some(phase(f));
        self
    }

    /// Sets the `on_install` callback.
    pub fn on_install<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Arc<PluginContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.callbacks.install = Some(phase(f));
        self
    }

    /// Sets the `on_activate` callback.
    pub fn on_activate<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Arc<PluginContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.callbacks.activate = Some(phase(f));
        self
    }

    /// Sets the `on_deactivate` callback.
    pub fn on_deactivate<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Arc<PluginContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.callbacks.deactivate = Some(phase(f));
        self
    }

    /// Sets the `on_uninstall` callback.
    pub fn on_uninstall<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Arc<PluginContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.callbacks.uninstall = Some(phase(f));
        self
    }

    /// Sets the `on_update` callback; it receives the previous version.
    pub fn on_update<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Arc<PluginContext>, Version) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.callbacks.update = Some(Arc::new(move |ctx, v| f(ctx, v).boxed()));
        self
    }

    /// Sets the `on_config_change` callback.
    pub fn on_config_change<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Arc<PluginContext>, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.callbacks.config_change = Some(Arc::new(move |ctx, c| f(ctx, c).boxed()));
        self
    }

    /// Builds the plugin.
    pub fn build(self) -> BuiltPlugin {
        BuiltPlugin {
            manifest: self.manifest,
            hooks: self.hooks,
            commands: self.commands,
            callbacks: self.callbacks,
        }
    }

    /// Builds the plugin behind an `Arc<dyn Plugin>`.
    pub fn build_arc(self) -> Arc<dyn Plugin> {
        Arc::new(self.build())
    }
}

/// A plugin assembled by [`PluginBuilder`].
pub struct BuiltPlugin {
    manifest: PluginManifest,
    hooks: Vec<Hook>,
    commands: Vec<Command>,
    callbacks: Callbacks,
}

async fn run_phase(callback: &Option<PhaseFn>, ctx: Arc<PluginContext>) -> anyhow::Result<()> {
    match callback {
        Some(f) => f(ctx).await,
        None => Ok(()),
    }
}

#[async_trait]
impl Plugin for BuiltPlugin {
    fn manifest(&self) -> &PluginManifest {
        &self.manifest
    }

    fn commands(&self) -> Vec<Command> {
        self.commands.clone()
    }

    fn hooks(&self) -> Vec<Hook> {
        self.hooks.clone()
    }

    async fn init(&self, ctx: Arc<PluginContext>) -> anyhow::Result<()> {
        run_phase(&self.callbacks.init, ctx).await
    }

    async fn cleanup(&self, ctx: Arc<PluginContext>) -> anyhow::Result<()> {
        run_phase(&self.callbacks.cleanup, ctx).await
    }

    async fn on_install(&self, ctx: Arc<PluginContext>) -> anyhow::Result<()> {
        run_phase(&self.callbacks.install, ctx).await
    }

    async fn on_activate(&self, ctx: Arc<PluginContext>) -> anyhow::Result<()> {
        run_phase(&self.callbacks.activate, ctx).await
    }

    async fn on_deactivate(&self, ctx: Arc<PluginContext>) -> anyhow::Result<()> {
        run_phase(&self.callbacks.deactivate, ctx).await
    }

    async fn on_uninstall(&self, ctx: Arc<PluginContext>) -> anyhow::Result<()> {
        run_phase(&self.callbacks.uninstall, ctx).await
    }

    async fn on_update(&self, ctx: Arc<PluginContext>, previous_version: &Version) -> anyhow::Result<()> {
        match &self.callbacks.update {
            Some(f) => f(ctx, previous_version.clone()).await,
            None => Ok(()),
        }
    }

    async fn on_config_change(&self, ctx: Arc<PluginContext>, config: &Value) -> anyhow::Result<()> {
        match &self.callbacks.config_change {
            Some(f) => f(ctx, config.clone()).await,
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for BuiltPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuiltPlugin")
            .field("name", &self.manifest.name)
            .field("hooks", &self.hooks.len())
            .field("commands", &self.commands.len())
            .finish()
    }
}
