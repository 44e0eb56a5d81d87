use crate::error::{CelerisError, CelerisResult};
use crate::kernel::KernelId;
use rustc_hash::FxHashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// WGSL source text per kernel
///
/// Shaders are not bundled with the crate. They are loaded from a directory
/// holding one `<KernelName>.wgsl` file per kernel, or inserted directly.
/// A kernel without source fails when a pass using it is prepared.
#[derive(Debug, Clone, Default)]
pub struct KernelSources {
    root: PathBuf,
    sources: FxHashMap<KernelId, String>,
}

impl KernelSources {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every `<KernelName>.wgsl` present in `dir`
    ///
    /// # Errors
    /// Returns [`CelerisError::Io`] if `dir` cannot be read or a present file
    /// cannot be loaded
    pub fn from_dir<P: AsRef<Path>>(dir: P) -> CelerisResult<Self> {
        let root = dir.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(CelerisError::io(
                &root,
                std::io::Error::new(std::io::ErrorKind::NotFound, "kernel directory not found"),
            ));
        }
        let mut sources = FxHashMap::default();
        for kernel in KernelId::ALL {
            let path = root.join(kernel.file_name());
            if path.is_file() {
                let text = fs::read_to_string(&path).map_err(|e| CelerisError::io(&path, e))?;
                sources.insert(kernel, text);
            } else {
                debug!("No shader for {} in {}", kernel.name(), root.display());
            }
        }
        debug!("Loaded {} of {} kernels", sources.len(), KernelId::ALL.len());
        Ok(Self { root, sources })
    }

    /// Add or replace the source of one kernel
    pub fn insert(&mut self, kernel: KernelId, source: impl Into<String>) {
        self.sources.insert(kernel, source.into());
    }

    #[must_use]
    pub fn get(&self, kernel: KernelId) -> Option<&str> {
        self.sources.get(&kernel).map(String::as_str)
    }

    /// Source of `kernel`, or the error naming the file that was expected
    ///
    /// # Errors
    /// Returns [`CelerisError::MissingKernel`]
    pub fn require(&self, kernel: KernelId) -> CelerisResult<&str> {
        self.get(kernel).ok_or_else(|| CelerisError::MissingKernel {
            kernel: kernel.name(),
            file: self.root.join(kernel.file_name()),
        })
    }

    /// Kernels without source, in dispatch-table order
    #[must_use]
    pub fn missing(&self) -> Vec<KernelId> {
        KernelId::ALL
            .into_iter()
            .filter(|k| !self.sources.contains_key(k))
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_kernel_names_expected_file() {
        let mut sources = KernelSources::new();
        sources.insert(KernelId::NearDry, "@compute @workgroup_size(16, 16) fn main() {}");

        assert!(sources.require(KernelId::NearDry).is_ok());
        match sources.require(KernelId::TridiagX) {
            Err(CelerisError::MissingKernel { kernel, file }) => {
                assert_eq!(kernel, "TridiagX");
                assert!(file.ends_with("TridiagX.wgsl"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(sources.missing().len(), KernelId::ALL.len() - 1);
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        assert!(matches!(
            KernelSources::from_dir("/nonexistent/celeris/shaders"),
            Err(CelerisError::Io { .. })
        ));
    }
}
