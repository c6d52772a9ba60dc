//! C ABI for native callers.
//!
//! Every function reports failure with a sentinel: a null pointer or
//! `false`. Null string arguments mean "absent". In unwinding builds a
//! panic is turned into the same sentinel; with `panic = "abort"` (the
//! release profile) it aborts the process instead.

use std::ffi::{CStr, c_char, c_int, c_void};
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;

use linkerns_common::error::{LinkerNsError, Result};
use linkerns_common::types::{HookParam, NamespaceHandle, NamespaceType};
use linkerns_core::linker::{CallerIdentity, NamespaceRequest};
use linkerns_core::namespace::NamespaceController;
use linkerns_core::resolver;

use crate::loader::LoaderContext;
use crate::request::LoadRequest;

fn guarded<T>(operation: &'static str, fallback: T, f: impl FnOnce() -> Result<T>) -> T {
    match std::panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => value,
        Ok(Err(e)) => {
            tracing::debug!(operation, error = %e, "call failed");
            fallback
        }
        Err(_) => {
            tracing::error!(operation, "panic caught at C boundary");
            fallback
        }
    }
}

/// Reads an optional NUL-terminated UTF-8 string.
///
/// # Safety
///
/// `ptr` must be null or point to a NUL-terminated string that outlives `'a`.
unsafe fn optional_str<'a>(what: &str, ptr: *const c_char) -> Result<Option<&'a str>> {
    if ptr.is_null() {
        return Ok(None);
    }
    // SAFETY: non-null and NUL-terminated per the caller's contract.
    let text = unsafe { CStr::from_ptr(ptr) };
    text.to_str()
        .map(Some)
        .map_err(|_| LinkerNsError::InvalidArgument {
            message: format!("{what} is not valid UTF-8"),
        })
}

/// Reads a required NUL-terminated UTF-8 string.
///
/// # Safety
///
/// Same as [`optional_str`].
unsafe fn required_str<'a>(what: &str, ptr: *const c_char) -> Result<&'a str> {
    // SAFETY: forwarded caller contract.
    unsafe { optional_str(what, ptr) }?.ok_or_else(|| LinkerNsError::InvalidArgument {
        message: format!("{what} is null"),
    })
}

fn required_namespace(what: &str, ptr: *mut c_void) -> Result<NamespaceHandle> {
    NamespaceHandle::from_raw(ptr).ok_or_else(|| LinkerNsError::InvalidArgument {
        message: format!("{what} is null"),
    })
}

/// Shared body of both create variants.
///
/// # Safety
///
/// String arguments must be null or valid NUL-terminated strings.
unsafe fn create(
    caller: CallerIdentity,
    name: *const c_char,
    ld_library_path: *const c_char,
    default_library_path: *const c_char,
    kind: u64,
    permitted_when_isolated_path: *const c_char,
    parent: *mut c_void,
) -> *mut c_void {
    let operation = match caller {
        CallerIdentity::Trampoline => "create namespace (escaped)",
        CallerIdentity::Caller | CallerIdentity::Address(_) => "create namespace",
    };
    guarded(operation, std::ptr::null_mut(), || {
        // SAFETY: forwarded caller contract for every string argument.
        let request = unsafe {
            NamespaceRequest {
                name: required_str("namespace name", name)?,
                ld_library_path: optional_str("ld_library_path", ld_library_path)?,
                default_library_path: optional_str("default_library_path", default_library_path)?,
                kind: NamespaceType::from_bits(kind),
                permitted_when_isolated_path: optional_str(
                    "permitted_when_isolated_path",
                    permitted_when_isolated_path,
                )?,
                parent: NamespaceHandle::from_raw(parent),
            }
        };
        let ns = NamespaceController::resolved()?.create_as(&request, caller)?;
        Ok(ns.as_ptr())
    })
}

/// Returns whether the linker namespace entry points were resolved.
#[unsafe(no_mangle)]
pub extern "C" fn linkerns_load_status() -> bool {
    guarded("load status", false, || Ok(resolver::is_ready()))
}

/// Creates a linker namespace on behalf of the calling library.
///
/// The linker sees this function's return address as the caller, so the
/// request is judged by the library that called it.
///
/// # Safety
///
/// String arguments must be null or valid NUL-terminated strings; `parent`
/// must be null or a namespace handle obtained from the linker.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn linkerns_create_namespace(
    name: *const c_char,
    ld_library_path: *const c_char,
    default_library_path: *const c_char,
    kind: u64,
    permitted_when_isolated_path: *const c_char,
    parent: *mut c_void,
) -> *mut c_void {
    let caller = linkerns_core::caller_identity!();
    // SAFETY: forwarded caller contract.
    unsafe {
        create(
            caller,
            name,
            ld_library_path,
            default_library_path,
            kind,
            permitted_when_isolated_path,
            parent,
        )
    }
}

/// Creates a linker namespace as if called from the platform's `dlopen`,
/// bypassing the caller's own namespace restrictions.
///
/// # Safety
///
/// Same as [`linkerns_create_namespace`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn linkerns_create_namespace_escape(
    name: *const c_char,
    ld_library_path: *const c_char,
    default_library_path: *const c_char,
    kind: u64,
    permitted_when_isolated_path: *const c_char,
    parent: *mut c_void,
) -> *mut c_void {
    // SAFETY: forwarded caller contract.
    unsafe {
        create(
            CallerIdentity::Trampoline,
            name,
            ld_library_path,
            default_library_path,
            kind,
            permitted_when_isolated_path,
            parent,
        )
    }
}

/// Makes every library visible in `to` resolvable from `from`.
#[unsafe(no_mangle)]
pub extern "C" fn linkerns_link_namespaces_all_libs(from: *mut c_void, to: *mut c_void) -> bool {
    guarded("link namespaces (all libraries)", false, || {
        let from = required_namespace("source namespace", from)?;
        let to = required_namespace("target namespace", to)?;
        NamespaceController::resolved()?.link_all(from, to)?;
        Ok(true)
    })
}

/// Makes the colon-separated `shared_libs` of `to` resolvable from `from`.
///
/// # Safety
///
/// `shared_libs` must be a valid NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn linkerns_link_namespaces(
    from: *mut c_void,
    to: *mut c_void,
    shared_libs: *const c_char,
) -> bool {
    guarded("link namespaces", false, || {
        let from = required_namespace("source namespace", from)?;
        let to = required_namespace("target namespace", to)?;
        // SAFETY: forwarded caller contract.
        let shared_libs = unsafe { required_str("shared_libs", shared_libs) }?;
        NamespaceController::resolved()?.link_selective(from, to, shared_libs)?;
        Ok(true)
    })
}

/// Looks up a namespace exported by the platform.
///
/// # Safety
///
/// `name` must be a valid NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn linkerns_get_exported_namespace(name: *const c_char) -> *mut c_void {
    guarded("get exported namespace", std::ptr::null_mut(), || {
        // SAFETY: forwarded caller contract.
        let name = unsafe { required_str("namespace name", name) }?;
        Ok(NamespaceController::resolved()?.exported(name)?.as_ptr())
    })
}

/// Loads `hook_name` into `namespace` and hands it `hook_param`.
///
/// # Safety
///
/// `hook_name` must be a valid NUL-terminated string; `namespace` must be a
/// handle obtained from the linker; `hook_param`, if non-null, must stay
/// valid for as long as the hook uses it.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn linkerns_namespace_apply_hook(
    hook_name: *const c_char,
    namespace: *mut c_void,
    hook_param: *const c_void,
) -> bool {
    guarded("apply hook", false, || {
        // SAFETY: forwarded caller contract.
        let hook_name = unsafe { required_str("hook name", hook_name) }?;
        let namespace = required_namespace("namespace", namespace)?;
        let context = LoaderContext::global()?;
        let _ = context
            .namespaces()
            .apply_hook(hook_name, namespace, HookParam::from_raw(hook_param))?;
        Ok(true)
    })
}

/// Loads `lib_path` into a new namespace under a unique soname, optionally
/// alongside a hook library.
///
/// With a null `target_dir` the renamed copy lives in a memory-backed file.
///
/// # Safety
///
/// String arguments must be null or valid NUL-terminated strings;
/// `parent` must be a namespace handle obtained from the linker;
/// `hook_param`, if non-null, must stay valid for as long as the hook uses it.
#[allow(clippy::too_many_arguments)]
#[unsafe(no_mangle)]
pub unsafe extern "C" fn linkerns_dlopen_unique_hooked(
    lib_path: *const c_char,
    target_dir: *const c_char,
    mode: c_int,
    hook_dir: *const c_char,
    hook_name: *const c_char,
    parent: *mut c_void,
    link_to_default: bool,
    hook_param: *const c_void,
) -> *mut c_void {
    guarded("isolated load", std::ptr::null_mut(), || {
        // SAFETY: forwarded caller contract for every string argument.
        let (lib_path, target_dir, hook_dir, hook_name) = unsafe {
            (
                required_str("library path", lib_path)?,
                optional_str("target directory", target_dir)?,
                optional_str("hook directory", hook_dir)?,
                optional_str("hook name", hook_name)?,
            )
        };
        let parent = required_namespace("parent namespace", parent)?;

        let mut request = LoadRequest::new(lib_path, parent)
            .mode(mode)
            .link_to_default(link_to_default);
        if let Some(dir) = target_dir {
            request = request.target_dir(dir);
        }
        request.hook_dir = hook_dir.map(PathBuf::from);
        request.hook_name = hook_name.map(str::to_owned);
        if let Some(param) = HookParam::from_raw(hook_param) {
            request = request.hook_param(param);
        }

        let loaded = LoaderContext::global()?.load_isolated(&request)?;
        Ok(loaded.into_handle().as_ptr())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(not(all(target_os = "android", target_arch = "aarch64")))]
    #[test]
    fn status_is_false_off_device() {
        assert!(!linkerns_load_status());
    }

    #[test]
    fn null_name_yields_null_namespace() {
        let ns = unsafe {
            linkerns_create_namespace(
                std::ptr::null(),
                std::ptr::null(),
                std::ptr::null(),
                NamespaceType::SHARED.bits(),
                std::ptr::null(),
                std::ptr::null_mut(),
            )
        };
        assert!(ns.is_null());
    }

    #[test]
    fn escaped_create_without_linker_yields_null() {
        let name = c"escaped";
        let ns = unsafe {
            linkerns_create_namespace_escape(
                name.as_ptr(),
                std::ptr::null(),
                std::ptr::null(),
                NamespaceType::SHARED.bits(),
                std::ptr::null(),
                std::ptr::null_mut(),
            )
        };
        #[cfg(not(all(target_os = "android", target_arch = "aarch64")))]
        assert!(ns.is_null());
        let _ = ns;
    }

    #[test]
    fn null_namespaces_are_not_linked() {
        assert!(!linkerns_link_namespaces_all_libs(
            std::ptr::null_mut(),
            std::ptr::null_mut()
        ));
    }

    #[test]
    fn null_library_path_fails_load() {
        let handle = unsafe {
            linkerns_dlopen_unique_hooked(
                std::ptr::null(),
                std::ptr::null(),
                libc::RTLD_NOW,
                std::ptr::null(),
                std::ptr::null(),
                std::ptr::null_mut(),
                false,
                std::ptr::null(),
            )
        };
        assert!(handle.is_null());
    }

    #[test]
    fn invalid_utf8_is_rejected() {
        let bytes = b"lib\xff.so\0";
        let err = unsafe { required_str("name", bytes.as_ptr().cast()) }.unwrap_err();
        assert!(matches!(err, LinkerNsError::InvalidArgument { .. }));
    }

    #[test]
    fn null_optional_string_is_absent() {
        let value = unsafe { optional_str("path", std::ptr::null()) }.unwrap();
        assert_eq!(value, None);
    }
}
