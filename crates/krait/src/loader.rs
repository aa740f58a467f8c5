//! Loading of module sources into parsed, immutable records.
//!
//! Nothing is ever executed: a module's "compiled form" here is the AST
//! produced by `ruff_python_parser`, which the extractor walks. Names that
//! cannot be found on disk yield a [`MissingModule`] placeholder whose every
//! accessor raises the domain module-not-found error, so discovery proceeds
//! even when optional dependencies are absent from the current environment.

use log::debug;
use ruff_python_ast::ModModule;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::TrackError;
use crate::module_name::ModuleName;
use crate::resolver::{ImportKind, ModuleResolver};

/// Common surface over loaded records and missing-module placeholders.
pub trait ModuleSource {
    fn name(&self) -> &ModuleName;
    fn path(&self) -> Result<&Path, TrackError>;
    fn is_package(&self) -> Result<bool, TrackError>;
    fn source(&self) -> Result<&str, TrackError>;
    fn ast(&self) -> Result<&ModModule, TrackError>;
}

/// An immutable record of one loaded module. Created on first discovery and
/// never mutated afterwards.
#[derive(Debug)]
pub struct ModuleRecord {
    pub name: ModuleName,
    pub path: PathBuf,
    /// Defined by a package initialiser file (`__init__.py`)
    pub is_package: bool,
    pub source: String,
    ast: ModModule,
}

impl ModuleRecord {
    /// Parse a source string into a record. The source is kept alongside the
    /// AST so import sites can be rendered with their line context.
    pub(crate) fn parse(
        name: ModuleName,
        path: PathBuf,
        is_package: bool,
        source: String,
    ) -> Result<Self, TrackError> {
        let parsed = ruff_python_parser::parse_module(&source)
            .map_err(|err| TrackError::loader_failure(name.as_str(), err))?;
        Ok(Self {
            name,
            path,
            is_package,
            ast: parsed.into_syntax(),
            source,
        })
    }
}

impl ModuleSource for ModuleRecord {
    fn name(&self) -> &ModuleName {
        &self.name
    }

    fn path(&self) -> Result<&Path, TrackError> {
        Ok(&self.path)
    }

    fn is_package(&self) -> Result<bool, TrackError> {
        Ok(self.is_package)
    }

    fn source(&self) -> Result<&str, TrackError> {
        Ok(&self.source)
    }

    fn ast(&self) -> Result<&ModModule, TrackError> {
        Ok(&self.ast)
    }
}

/// Placeholder for a module that could not be found.
///
/// It carries only its intended name and behaves as a nominal stand-in: any
/// meaningful use returns [`TrackError::ModuleNotFound`] naming the module,
/// mirroring a lazily-deferred import error.
#[derive(Debug, Clone)]
pub struct MissingModule {
    name: ModuleName,
}

impl MissingModule {
    pub fn new(name: ModuleName) -> Self {
        Self { name }
    }

    fn not_found(&self) -> TrackError {
        TrackError::ModuleNotFound(self.name.as_str().to_owned())
    }
}

impl ModuleSource for MissingModule {
    fn name(&self) -> &ModuleName {
        &self.name
    }

    fn path(&self) -> Result<&Path, TrackError> {
        Err(self.not_found())
    }

    fn is_package(&self) -> Result<bool, TrackError> {
        Err(self.not_found())
    }

    fn source(&self) -> Result<&str, TrackError> {
        Err(self.not_found())
    }

    fn ast(&self) -> Result<&ModModule, TrackError> {
        Err(self.not_found())
    }
}

#[derive(Debug)]
pub enum ModuleHandle {
    Loaded(Box<ModuleRecord>),
    Missing(MissingModule),
}

/// Loads modules by name using a [`ModuleResolver`] for path lookup.
#[derive(Debug)]
pub struct ModuleLoader<'a> {
    resolver: &'a ModuleResolver,
}

impl<'a> ModuleLoader<'a> {
    pub fn new(resolver: &'a ModuleResolver) -> Self {
        Self { resolver }
    }

    /// Load a module by absolute name.
    ///
    /// Internal names resolve against the first-party scan roots; third-party
    /// names resolve against site-packages (only meaningful at full depth). A
    /// name without a source file yields `ModuleHandle::Missing`; unreadable
    /// or unparseable sources are fatal loader failures.
    pub fn load(
        &self,
        name: &ModuleName,
        tracked_root: &str,
    ) -> Result<ModuleHandle, TrackError> {
        let kind = self.resolver.classify(name.as_str(), tracked_root);
        let path = match kind {
            ImportKind::Internal => self.resolver.resolve_module_path(name.as_str()),
            ImportKind::ThirdParty => self.resolver.resolve_in_site_packages(name.as_str()),
            ImportKind::Standard => None,
        };

        let Some(path) = path else {
            debug!("No source file found for {}", name);
            return Ok(ModuleHandle::Missing(MissingModule::new(name.clone())));
        };

        self.load_from_path(name.clone(), path)
    }

    pub fn load_from_path(
        &self,
        name: ModuleName,
        path: PathBuf,
    ) -> Result<ModuleHandle, TrackError> {
        let source = fs::read_to_string(&path)
            .map_err(|err| TrackError::loader_failure(name.as_str(), err))?;
        let is_package = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n == "__init__.py");

        crate::debug2!("Loading {} from {:?} (package: {})", name, path, is_package);

        let record = ModuleRecord::parse(name, path, is_package, source)?;
        Ok(ModuleHandle::Loaded(Box::new(record)))
    }
}
