//! Bindings to the private entry points of the Android/aarch64 linker.

use std::ffi::{CStr, CString, c_char, c_int, c_void};
use std::ptr::{self, NonNull};

use linkerns_common::constants::{
    LIBDL_ANDROID_LIBRARY, LIBDL_LIBRARY, LINKER_LIBRARY, SYM_CREATE_NAMESPACE, SYM_DLOPEN_EXT,
    SYM_GET_EXPORTED_NAMESPACE, SYM_LINK_NAMESPACES, SYM_LINK_NAMESPACES_ALL_LIBS,
};
use linkerns_common::error::{LinkerNsError, Result};
use linkerns_common::types::{LibraryHandle, NamespaceHandle};

use crate::address;
use crate::linker::{CallerIdentity, ExtLoad, LinkerApi, NamespaceRequest, c_string};

type LoaderDlopenFn = unsafe extern "C" fn(*const c_char, c_int, *const c_void) -> *mut c_void;
type CreateNamespaceFn = unsafe extern "C" fn(
    *const c_char,
    *const c_char,
    *const c_char,
    u64,
    *const c_char,
    *mut c_void,
    *const c_void,
) -> *mut c_void;
type LinkNamespacesAllLibsFn = unsafe extern "C" fn(*mut c_void, *mut c_void) -> bool;
type LinkNamespacesFn = unsafe extern "C" fn(*mut c_void, *mut c_void, *const c_char) -> bool;
type GetExportedNamespaceFn = unsafe extern "C" fn(*const c_char) -> *mut c_void;
type DlopenExtFn =
    unsafe extern "C" fn(*const c_char, c_int, *const AndroidDlextinfo) -> *mut c_void;

/// `android_dlextinfo` from `<android/dlext.h>`.
#[repr(C)]
struct AndroidDlextinfo {
    flags: u64,
    reserved_addr: *mut c_void,
    reserved_size: libc::size_t,
    relro_fd: c_int,
    library_fd: c_int,
    library_fd_offset: i64,
    library_namespace: *mut c_void,
}

/// Never called; its address marks code belonging to this library.
#[inline(never)]
extern "C" fn caller_anchor() {}

/// Returns the caller address reported to the linker for `caller`.
///
/// This is the only place a caller identity is turned into an address. Reporting the
/// `dlopen` trampoline makes the linker attribute the request to libdl,
/// which is exempt from the namespace restrictions applied to apps.
fn reported_address(caller: CallerIdentity) -> *const c_void {
    match caller {
        CallerIdentity::Caller => caller_anchor as *const c_void,
        CallerIdentity::Address(addr) => ptr::with_exposed_provenance(addr),
        CallerIdentity::Trampoline => libc::dlopen as *const c_void,
    }
}

fn last_dl_error() -> String {
    // SAFETY: dlerror returns either null or a thread-local NUL-terminated string.
    let message = unsafe { libc::dlerror() };
    if message.is_null() {
        return "unknown linker error".into();
    }
    // SAFETY: non-null, NUL-terminated, valid until the next dl* call on this thread.
    unsafe { CStr::from_ptr(message) }.to_string_lossy().into_owned()
}

fn resolve_step(step: impl Into<String>) -> LinkerNsError {
    LinkerNsError::Resolve { step: step.into() }
}

fn optional_c_string(what: &str, value: Option<&str>) -> Result<Option<CString>> {
    value.map(|v| c_string(what, v)).transpose()
}

fn as_ptr_or_null(value: Option<&CString>) -> *const c_char {
    value.map_or(ptr::null(), |s| s.as_ptr())
}

/// Opens `library` through the internal open routine as if called from `dlopen`.
fn open_privileged(loader_dlopen: LoaderDlopenFn, library: &str) -> Result<*mut c_void> {
    let name = c_string("library", library)?;
    // SAFETY: `loader_dlopen` is the internal open routine located by address
    // discovery and takes (filename, flags, caller_addr).
    let handle = unsafe {
        loader_dlopen(
            name.as_ptr(),
            libc::RTLD_LAZY,
            reported_address(CallerIdentity::Trampoline),
        )
    };
    if handle.is_null() {
        return Err(resolve_step(format!("open {library}: {}", last_dl_error())));
    }
    tracing::debug!(library, "opened linker library");
    Ok(handle)
}

fn lookup(handle: *mut c_void, symbol: &str) -> Result<*mut c_void> {
    let name = c_string("symbol", symbol)?;
    // SAFETY: `handle` came from a successful open and `name` is NUL-terminated.
    let address = unsafe { libc::dlsym(handle, name.as_ptr()) };
    if address.is_null() {
        return Err(resolve_step(format!("missing symbol {symbol}")));
    }
    Ok(address)
}

/// The bound private entry points of the platform linker.
pub struct ResolvedLinker {
    link_namespaces_all_libs: LinkNamespacesAllLibsFn,
    link_namespaces: LinkNamespacesFn,
    create_namespace: CreateNamespaceFn,
    get_exported_namespace: GetExportedNamespaceFn,
    dlopen_ext: DlopenExtFn,
}

/// Locates and binds every private entry point.
///
/// # Errors
///
/// Returns `LinkerNsError::Resolve` naming the first step that failed.
pub fn resolve(scan_limit: usize) -> Result<ResolvedLinker> {
    let trampoline = reported_address(CallerIdentity::Trampoline).cast::<u32>();
    // SAFETY: `dlopen` is mapped code in libdl; its trampoline reaches a BL
    // within a handful of instructions.
    let target = unsafe { address::scan_code(trampoline, scan_limit) }
        .filter(|target| *target != 0)
        .ok_or_else(|| resolve_step("no branch-with-link in the dlopen trampoline"))?;
    tracing::debug!(target = format_args!("{target:#x}"), "located internal open routine");
    // SAFETY: `target` is the non-null branch target of dlopen's call to
    // `__loader_dlopen(const char*, int, const void*)`.
    let loader_dlopen = unsafe { std::mem::transmute::<usize, LoaderDlopenFn>(target) };

    let linker = open_privileged(loader_dlopen, LINKER_LIBRARY)?;
    let link_namespaces_all_libs = lookup(linker, SYM_LINK_NAMESPACES_ALL_LIBS)?;
    let link_namespaces = lookup(linker, SYM_LINK_NAMESPACES)?;

    let libdl_android = open_privileged(loader_dlopen, LIBDL_ANDROID_LIBRARY)?;
    let create_namespace = lookup(libdl_android, SYM_CREATE_NAMESPACE)?;
    let get_exported_namespace = lookup(libdl_android, SYM_GET_EXPORTED_NAMESPACE)?;

    // Resolved from libdl directly so a hook that interposes the global
    // symbol cannot redirect our own loads.
    let libdl_name = c_string("library", LIBDL_LIBRARY)?;
    // SAFETY: plain public dlopen of a system library.
    let libdl = unsafe { libc::dlopen(libdl_name.as_ptr(), libc::RTLD_LAZY) };
    if libdl.is_null() {
        return Err(resolve_step(format!("open {LIBDL_LIBRARY}: {}", last_dl_error())));
    }
    let dlopen_ext = lookup(libdl, SYM_DLOPEN_EXT)?;

    // SAFETY: every address is a non-null export whose C signature matches
    // the corresponding function pointer type.
    unsafe {
        Ok(ResolvedLinker {
            link_namespaces_all_libs: std::mem::transmute::<*mut c_void, LinkNamespacesAllLibsFn>(
                link_namespaces_all_libs,
            ),
            link_namespaces: std::mem::transmute::<*mut c_void, LinkNamespacesFn>(link_namespaces),
            create_namespace: std::mem::transmute::<*mut c_void, CreateNamespaceFn>(
                create_namespace,
            ),
            get_exported_namespace: std::mem::transmute::<*mut c_void, GetExportedNamespaceFn>(
                get_exported_namespace,
            ),
            dlopen_ext: std::mem::transmute::<*mut c_void, DlopenExtFn>(dlopen_ext),
        })
    }
}

impl LinkerApi for ResolvedLinker {
    fn create_namespace(
        &self,
        request: &NamespaceRequest<'_>,
        caller: CallerIdentity,
    ) -> Result<NamespaceHandle> {
        let name = c_string("namespace name", request.name)?;
        let search = optional_c_string("search path", request.ld_library_path)?;
        let default = optional_c_string("default search path", request.default_library_path)?;
        let permitted = optional_c_string("permitted path", request.permitted_when_isolated_path)?;
        let parent = request.parent.map_or(ptr::null_mut(), NamespaceHandle::as_ptr);

        // SAFETY: all strings are NUL-terminated and outlive the call; null
        // is accepted for every optional argument.
        let raw = unsafe {
            (self.create_namespace)(
                name.as_ptr(),
                as_ptr_or_null(search.as_ref()),
                as_ptr_or_null(default.as_ref()),
                request.kind.bits(),
                as_ptr_or_null(permitted.as_ref()),
                parent,
                reported_address(caller),
            )
        };
        NamespaceHandle::from_raw(raw).ok_or_else(|| LinkerNsError::Namespace {
            operation: "create namespace",
            message: last_dl_error(),
        })
    }

    fn link_namespaces_all_libs(&self, from: NamespaceHandle, to: NamespaceHandle) -> Result<()> {
        // SAFETY: both handles were produced by the linker.
        if unsafe { (self.link_namespaces_all_libs)(from.as_ptr(), to.as_ptr()) } {
            Ok(())
        } else {
            Err(LinkerNsError::Namespace {
                operation: "link namespaces (all libraries)",
                message: last_dl_error(),
            })
        }
    }

    fn link_namespaces(
        &self,
        from: NamespaceHandle,
        to: NamespaceHandle,
        shared_libs: &str,
    ) -> Result<()> {
        let libs = c_string("shared library list", shared_libs)?;
        // SAFETY: both handles were produced by the linker; `libs` outlives the call.
        if unsafe { (self.link_namespaces)(from.as_ptr(), to.as_ptr(), libs.as_ptr()) } {
            Ok(())
        } else {
            Err(LinkerNsError::Namespace {
                operation: "link namespaces",
                message: last_dl_error(),
            })
        }
    }

    fn get_exported_namespace(&self, name: &str) -> Result<NamespaceHandle> {
        let cname = c_string("namespace name", name)?;
        // SAFETY: `cname` is NUL-terminated and outlives the call.
        let raw = unsafe { (self.get_exported_namespace)(cname.as_ptr()) };
        NamespaceHandle::from_raw(raw).ok_or_else(|| LinkerNsError::Namespace {
            operation: "get exported namespace",
            message: format!("no namespace exported as {name:?}"),
        })
    }

    fn dlopen_ext(&self, path: &str, mode: c_int, target: &ExtLoad<'_>) -> Result<LibraryHandle> {
        let cpath = c_string("library path", path)?;
        let info = AndroidDlextinfo {
            flags: target.flags(),
            reserved_addr: ptr::null_mut(),
            reserved_size: 0,
            relro_fd: 0,
            library_fd: target.raw_fd(),
            library_fd_offset: 0,
            library_namespace: target.namespace.as_ptr(),
        };
        // SAFETY: `info` is a fully initialised dlextinfo whose descriptor, if
        // flagged, is borrowed for the duration of the call.
        let raw = unsafe { (self.dlopen_ext)(cpath.as_ptr(), mode, &raw const info) };
        LibraryHandle::from_raw(raw).ok_or_else(|| LinkerNsError::Load {
            path: path.into(),
            message: last_dl_error(),
        })
    }

    fn symbol(&self, library: LibraryHandle, name: &str) -> Option<NonNull<c_void>> {
        let cname = c_string("symbol", name).ok()?;
        // SAFETY: `library` is a live handle and `cname` is NUL-terminated.
        NonNull::new(unsafe { libc::dlsym(library.as_ptr(), cname.as_ptr()) })
    }
}
