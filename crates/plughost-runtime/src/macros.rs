//! Convenience macros for plugin development.

/// Builds a [`PluginManifest`](crate::manifest::PluginManifest), evaluating
/// to an `AppResult` because versions and ranges are parsed.
///
/// # Example
/// ```rust,ignore
/// let manifest = plugin_manifest!(
///     name: "metrics",
///     version: "1.0.0",
///     description: "Counts commands",
///     dependencies: { "audit" => "^1" },
///     permissions: ["fs:write"]
/// )?;
/// ```
#[macro_export]
macro_rules! plugin_manifest {
    (
        name: $name:expr,
        version: $version:expr
        $(, description: $desc:expr)?
        $(, author: $author:expr)?
        $(, dependencies: { $($dep:expr => $req:expr),* $(,)? })?
        $(, permissions: [$($perm:expr),* $(,)?])?
    ) => {
        (|| -> $crate::plughost_core::result::AppResult<$crate::manifest::PluginManifest> {
            #[allow(unused_mut)]
            let mut manifest = $crate::manifest::PluginManifest::parse($name, $version)?;
            $( manifest = manifest.with_description($desc); )?
            $( manifest = manifest.with_author($author); )?
            $($(
                manifest = manifest.with_dependency($dep, $crate::semver::VersionReq::parse($req)?);
            )*)?
            $($( manifest = manifest.with_permission($perm); )*)?
            Ok(manifest)
        })()
    };
}
