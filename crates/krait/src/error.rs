use thiserror::Error;

/// Typed failures raised by the discovery engine.
///
/// Loader and extractor failures are fatal and propagate unchanged to the
/// driver; requirement-mapping gaps are downgraded to warnings at the call
/// site and never surface here.
#[derive(Debug, Error)]
pub enum TrackError {
    /// The target module name could not be found on any scan root.
    #[error("unknown target module '{0}'")]
    UnknownTargetModule(String),

    /// The module was found but its source could not be read or parsed.
    #[error("failed to load module '{name}'")]
    LoaderFailure {
        name: String,
        #[source]
        cause: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The import extractor hit an internal inconsistency in a module's
    /// compiled form.
    #[error("import extraction failed for '{module}': {reason}")]
    ExtractorFailure { module: String, reason: String },

    /// A closure was requested for a module that was never scanned. Distinct
    /// from a scanned module with zero dependencies.
    #[error("module '{0}' was not tracked in this run")]
    UntrackedQuery(String),

    /// Raised by a missing-module placeholder on meaningful use.
    #[error("no module named '{0}'")]
    ModuleNotFound(String),
}

impl TrackError {
    pub(crate) fn loader_failure(
        name: impl Into<String>,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::LoaderFailure {
            name: name.into(),
            cause: Box::new(cause),
        }
    }
}
