//! The seam between namespace logic and the platform linker.
//!
//! [`LinkerApi`] covers exactly the entry points the resolver binds: the
//! four private namespace routines, the extended open routine and symbol
//! lookup. Everything above this trait is platform-independent.

use std::ffi::{CString, c_int, c_void};
use std::os::fd::{AsRawFd, BorrowedFd};
use std::ptr::NonNull;

use linkerns_common::constants::{ANDROID_DLEXT_USE_LIBRARY_FD, ANDROID_DLEXT_USE_NAMESPACE};
use linkerns_common::error::{LinkerNsError, Result};
use linkerns_common::types::{LibraryHandle, NamespaceHandle, NamespaceType};

/// Which caller the linker is told is performing a namespace operation.
///
/// The linker grants or denies namespace operations based on the library
/// that contains the reported caller address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallerIdentity {
    /// Report an address inside this library; normal isolation rules apply.
    Caller,
    /// Report a specific code address, normally the return address captured
    /// by a native entry point with [`caller_identity!`]. The linker then
    /// applies the rules of whichever library called that entry point.
    ///
    /// [`caller_identity!`]: crate::caller_identity
    Address(usize),
    /// Report the address of the public `dlopen` trampoline, which lives in
    /// a platform library. The linker then treats the request as coming from
    /// the platform and applies its unrestricted default namespace.
    Trampoline,
}

/// Captures the return address of the enclosing function as a
/// [`CallerIdentity::Address`].
///
/// Must be the first statement of an `extern "C"` entry point, before
/// anything can overwrite the link register. Falls back to
/// [`CallerIdentity::Caller`] on targets other than aarch64.
#[macro_export]
macro_rules! caller_identity {
    () => {{
        #[cfg(target_arch = "aarch64")]
        let identity = {
            let lr: usize;
            // SAFETY: copies the link register after stripping any pointer
            // authentication code (`xpaclri`, a no-op before ARMv8.3); x30 is
            // declared clobbered and restored from the frame on return.
            unsafe {
                ::std::arch::asm!(
                    "hint #7",
                    "mov {lr}, x30",
                    lr = out(reg) lr,
                    out("x30") _,
                    options(nomem, nostack, preserves_flags),
                );
            }
            $crate::linker::CallerIdentity::Address(lr)
        };
        #[cfg(not(target_arch = "aarch64"))]
        let identity = $crate::linker::CallerIdentity::Caller;
        identity
    }};
}

/// Parameters for creating a linker namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamespaceRequest<'a> {
    /// Namespace name, used by the linker for diagnostics.
    pub name: &'a str,
    /// Colon-separated search path for libraries requested by name.
    pub ld_library_path: Option<&'a str>,
    /// Colon-separated fallback search path.
    pub default_library_path: Option<&'a str>,
    /// Namespace type flags.
    pub kind: NamespaceType,
    /// Colon-separated allowlist for isolated namespaces.
    pub permitted_when_isolated_path: Option<&'a str>,
    /// Namespace to inherit from, or the caller's namespace when `None`.
    pub parent: Option<NamespaceHandle>,
}

impl<'a> NamespaceRequest<'a> {
    /// A shared namespace with no search paths and no parent.
    #[must_use]
    pub const fn shared(name: &'a str) -> Self {
        Self {
            name,
            ld_library_path: None,
            default_library_path: None,
            kind: NamespaceType::SHARED,
            permitted_when_isolated_path: None,
            parent: None,
        }
    }

    /// Sets the search path.
    #[must_use]
    pub const fn search_path(mut self, path: Option<&'a str>) -> Self {
        self.ld_library_path = path;
        self
    }

    /// Sets the parent namespace.
    #[must_use]
    pub const fn parent(mut self, parent: Option<NamespaceHandle>) -> Self {
        self.parent = parent;
        self
    }
}

/// Where and how the extended open routine loads a library.
#[derive(Debug, Clone, Copy)]
pub struct ExtLoad<'fd> {
    /// Namespace the library is loaded into.
    pub namespace: NamespaceHandle,
    /// Descriptor to read the library from instead of opening its path.
    pub library_fd: Option<BorrowedFd<'fd>>,
}

impl<'fd> ExtLoad<'fd> {
    /// Loads by path into `namespace`.
    #[must_use]
    pub const fn into_namespace(namespace: NamespaceHandle) -> Self {
        Self {
            namespace,
            library_fd: None,
        }
    }

    /// Loads from `fd` into `namespace`.
    #[must_use]
    pub const fn from_fd(namespace: NamespaceHandle, fd: BorrowedFd<'fd>) -> Self {
        Self {
            namespace,
            library_fd: Some(fd),
        }
    }

    /// Returns the `android_dlextinfo` flag word for this load.
    #[must_use]
    pub const fn flags(&self) -> u64 {
        match self.library_fd {
            Some(_) => ANDROID_DLEXT_USE_NAMESPACE | ANDROID_DLEXT_USE_LIBRARY_FD,
            None => ANDROID_DLEXT_USE_NAMESPACE,
        }
    }

    /// Returns the raw descriptor, or `-1` when loading by path.
    #[must_use]
    pub fn raw_fd(&self) -> c_int {
        self.library_fd.map_or(-1, |fd| fd.as_raw_fd())
    }
}

/// The resolved linker entry points.
pub trait LinkerApi: Send + Sync {
    /// Creates a namespace, reporting `caller` to the linker's access checks.
    ///
    /// # Errors
    ///
    /// Returns an error if the linker rejects the request.
    fn create_namespace(
        &self,
        request: &NamespaceRequest<'_>,
        caller: CallerIdentity,
    ) -> Result<NamespaceHandle>;

    /// Makes every library visible in `to` resolvable from `from`.
    ///
    /// # Errors
    ///
    /// Returns an error if the linker rejects the link.
    fn link_namespaces_all_libs(&self, from: NamespaceHandle, to: NamespaceHandle) -> Result<()>;

    /// Makes the colon-separated `shared_libs` of `to` resolvable from `from`.
    ///
    /// # Errors
    ///
    /// Returns an error if the linker rejects the link.
    fn link_namespaces(
        &self,
        from: NamespaceHandle,
        to: NamespaceHandle,
        shared_libs: &str,
    ) -> Result<()>;

    /// Looks up a namespace the platform exports under `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if no such namespace is exported.
    fn get_exported_namespace(&self, name: &str) -> Result<NamespaceHandle>;

    /// Loads a library through the extended open routine.
    ///
    /// # Errors
    ///
    /// Returns an error if the linker fails to load the library.
    fn dlopen_ext(&self, path: &str, mode: c_int, target: &ExtLoad<'_>) -> Result<LibraryHandle>;

    /// Looks up `name` in a loaded library.
    fn symbol(&self, library: LibraryHandle, name: &str) -> Option<NonNull<c_void>>;
}

/// Converts a Rust string into a C string for the linker.
///
/// # Errors
///
/// Returns `LinkerNsError::InvalidArgument` if `value` contains a NUL byte.
pub fn c_string(what: &str, value: &str) -> Result<CString> {
    CString::new(value).map_err(|_| LinkerNsError::InvalidArgument {
        message: format!("{what} contains an interior NUL byte: {value:?}"),
    })
}
