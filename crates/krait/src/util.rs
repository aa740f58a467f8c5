use std::path::Path;

/// Convert a path relative to a scan root into a dotted module name, dropping
/// the `.py` extension and collapsing `__init__.py` onto its directory.
pub fn module_name_from_relative(relative_path: &Path) -> Option<String> {
    let mut parts: Vec<String> = relative_path
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();

    let last_part = parts.last_mut()?;
    if let Some(stem) = last_part.strip_suffix(".py") {
        *last_part = stem.to_owned();
    }
    if last_part == "__init__" {
        parts.pop();
    }
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("."))
}

/// Convert a file system path to a dotted module name by stripping the
/// `src_dir` prefix. A root-level `__init__.py` maps to the directory name.
pub fn path_to_module_name(src_dir: &Path, file_path: &Path) -> Option<String> {
    let relative_path = file_path.strip_prefix(src_dir).ok()?;
    if relative_path.components().count() == 1
        && relative_path.file_name().and_then(|n| n.to_str()) == Some("__init__.py")
    {
        return src_dir
            .file_name()
            .and_then(|os| os.to_str())
            .map(|s| s.to_owned());
    }
    module_name_from_relative(relative_path)
}

/// 1-based line number of a byte offset into `source`.
pub fn line_number(source: &str, offset: usize) -> usize {
    let offset = offset.min(source.len());
    source[..offset].bytes().filter(|&b| b == b'\n').count() + 1
}

/// The trimmed text of the line containing `offset`.
pub fn line_text(source: &str, offset: usize) -> &str {
    let offset = offset.min(source.len());
    let start = source[..offset].rfind('\n').map_or(0, |i| i + 1);
    let end = source[offset..]
        .find('\n')
        .map_or(source.len(), |i| offset + i);
    source[start..end].trim()
}

/// Scoped guard that sets or unsets an environment variable and restores the
/// original value on drop, panic included.
#[must_use = "EnvVarGuard must be held in scope to ensure cleanup"]
pub struct EnvVarGuard {
    key: &'static str,
    original_value: Option<String>,
}

impl EnvVarGuard {
    pub fn set(key: &'static str, value: &str) -> Self {
        let original_value = std::env::var(key).ok();
        // SAFETY: callers serialize tests that mutate the environment, and the
        // Drop impl restores the original state.
        unsafe {
            std::env::set_var(key, value);
        }
        Self {
            key,
            original_value,
        }
    }

    pub fn unset(key: &'static str) -> Self {
        let original_value = std::env::var(key).ok();
        // SAFETY: see `set`.
        unsafe {
            std::env::remove_var(key);
        }
        Self {
            key,
            original_value,
        }
    }
}

impl Drop for EnvVarGuard {
    fn drop(&mut self) {
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            // SAFETY: restores the environment to its pre-guard state.
            unsafe {
                match self.original_value.take() {
                    Some(original) => std::env::set_var(self.key, original),
                    None => std::env::remove_var(self.key),
                }
            }
        }));
    }
}
