//! Common imports for plugin authors.
//!
//! ```ignore
//! use plughost_runtime::prelude::*;
//! ```

pub use crate::api::context::{PluginContext, PluginLogger};
pub use crate::builder::{BuiltPlugin, PluginBuilder};
pub use crate::commands::Command;
pub use crate::hooks::definitions::{
    Hook, HookArgs, HookContext, HookExecutionOptions, HookExecutionResult, StandardHook,
};
pub use crate::installer::{BuiltinInstaller, InstallOptions};
pub use crate::lifecycle::PluginState;
pub use crate::manager::PluginStatus;
pub use crate::manifest::{Plugin, PluginManifest};
pub use crate::plugin_manifest;
pub use crate::runtime::PluginRuntime;

pub use plughost_core::error::{AppError, ErrorKind};
pub use plughost_core::result::AppResult;
