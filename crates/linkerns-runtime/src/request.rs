//! Parameters of an isolated load.

use std::ffi::c_int;
use std::path::{Path, PathBuf};

use linkerns_common::error::{LinkerNsError, Result};
use linkerns_common::types::{HookParam, NamespaceHandle};

/// Everything the isolated loader needs to load one library.
#[derive(Debug, Clone)]
pub struct LoadRequest {
    /// Library to load.
    pub library_path: PathBuf,
    /// Directory for the renamed copy; `None` uses a memory-backed file.
    pub target_dir: Option<PathBuf>,
    /// `dlopen` mode flags.
    pub mode: c_int,
    /// Directory searched for the hook library.
    pub hook_dir: Option<PathBuf>,
    /// Hook library to inject, by name.
    pub hook_name: Option<String>,
    /// Namespace whose libraries remain visible to the loaded library.
    pub parent: NamespaceHandle,
    /// Also make the platform's default namespace visible.
    pub link_to_default: bool,
    /// Pointer handed to the hook through its parameter slot.
    pub hook_param: Option<HookParam>,
}

impl LoadRequest {
    /// Creates a request for `library_path` under `parent`, loading with
    /// `RTLD_NOW` into a memory-backed copy without hooks.
    #[must_use]
    pub fn new(library_path: impl Into<PathBuf>, parent: NamespaceHandle) -> Self {
        Self {
            library_path: library_path.into(),
            target_dir: None,
            mode: libc::RTLD_NOW,
            hook_dir: None,
            hook_name: None,
            parent,
            link_to_default: false,
            hook_param: None,
        }
    }

    /// Writes the renamed copy into `dir` instead of memory.
    #[must_use]
    pub fn target_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.target_dir = Some(dir.into());
        self
    }

    /// Sets the `dlopen` mode flags.
    #[must_use]
    pub const fn mode(mut self, mode: c_int) -> Self {
        self.mode = mode;
        self
    }

    /// Injects the hook library `name`, found in `dir`.
    #[must_use]
    pub fn hook(mut self, dir: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        self.hook_dir = Some(dir.into());
        self.hook_name = Some(name.into());
        self
    }

    /// Passes `param` to the hook's parameter slot.
    #[must_use]
    pub const fn hook_param(mut self, param: HookParam) -> Self {
        self.hook_param = Some(param);
        self
    }

    /// Sets whether the default namespace is linked in.
    #[must_use]
    pub const fn link_to_default(mut self, link: bool) -> Self {
        self.link_to_default = link;
        self
    }

    /// Returns the library path as UTF-8.
    ///
    /// # Errors
    ///
    /// Returns `LinkerNsError::InvalidArgument` for a non-UTF-8 path.
    pub fn library_str(&self) -> Result<&str> {
        utf8(&self.library_path)
    }

    /// Returns the new namespace's search path: the library's directory,
    /// followed by the hook directory when one is set.
    ///
    /// # Errors
    ///
    /// Returns `LinkerNsError::InvalidArgument` for a non-UTF-8 directory.
    pub fn search_path(&self) -> Result<Option<String>> {
        let library_dir = self
            .library_path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty());
        let dirs = library_dir
            .into_iter()
            .chain(self.hook_dir.as_deref())
            .map(utf8)
            .collect::<Result<Vec<_>>>()?;
        Ok((!dirs.is_empty()).then(|| dirs.join(":")))
    }

    /// Returns the name given to a memory-backed copy.
    #[must_use]
    pub fn memfd_name(&self) -> String {
        self.library_path
            .file_name()
            .map_or_else(|| "linkerns".into(), |name| name.to_string_lossy().into_owned())
    }
}

fn utf8(path: &Path) -> Result<&str> {
    path.to_str().ok_or_else(|| LinkerNsError::InvalidArgument {
        message: format!("path is not valid UTF-8: {}", path.display()),
    })
}

#[cfg(test)]
mod tests {
    use std::ffi::c_void;
    use std::ptr::NonNull;

    use super::*;

    fn parent() -> NamespaceHandle {
        NamespaceHandle::from_raw(NonNull::<c_void>::dangling().as_ptr()).unwrap()
    }

    #[test]
    fn defaults_use_memory_copy_and_rtld_now() {
        let request = LoadRequest::new("/data/local/tmp/libfoo.so", parent());
        assert!(request.target_dir.is_none());
        assert_eq!(request.mode, libc::RTLD_NOW);
        assert!(!request.link_to_default);
        assert!(request.hook_name.is_none());
    }

    #[test]
    fn search_path_is_library_directory() {
        let request = LoadRequest::new("/data/app/lib/libfoo.so", parent());
        assert_eq!(request.search_path().unwrap().as_deref(), Some("/data/app/lib"));
    }

    #[test]
    fn search_path_appends_hook_directory() {
        let request =
            LoadRequest::new("/data/app/lib/libfoo.so", parent()).hook("/data/hooks", "libhook.so");
        assert_eq!(
            request.search_path().unwrap().as_deref(),
            Some("/data/app/lib:/data/hooks")
        );
    }

    #[test]
    fn bare_library_name_has_no_search_path() {
        let request = LoadRequest::new("libfoo.so", parent());
        assert_eq!(request.search_path().unwrap(), None);
    }

    #[test]
    fn memfd_name_is_file_name() {
        let request = LoadRequest::new("/vendor/lib64/libvulkan.so", parent());
        assert_eq!(request.memfd_name(), "libvulkan.so");
    }
}
