//! Static import tracking for modular Python libraries: resolve a package's
//! sub-modules, extract the imports their loading triggers, and map each
//! sub-module to the third-party distributions it actually requires.

pub mod config;
pub mod dirs;
pub mod error;
pub mod extractor;
pub mod krait_graph;
pub mod loader;
pub mod logging;
pub mod module_name;
pub mod orchestrator;
pub mod report;
pub mod requirements;
pub mod resolver;
pub mod site_packages;
pub mod tracker;
pub mod util;

pub use config::{Config, TrackerMode};
pub use error::TrackError;
pub use orchestrator::{CancelToken, track_module, track_module_isolated};
pub use requirements::{KeepOptional, RequirementsOptions, parse_requirements};
pub use tracker::{Submodules, TrackOptions};
