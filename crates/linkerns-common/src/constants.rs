//! Linker binary names, private symbol names, and ABI flag values.

/// Core linker binary that exports the namespace linking primitives.
pub const LINKER_LIBRARY: &str = "ld-android.so";

/// Private library exporting namespace creation and exported-namespace lookup.
pub const LIBDL_ANDROID_LIBRARY: &str = "libdl_android.so";

/// Public library exporting the extended open routine.
pub const LIBDL_LIBRARY: &str = "libdl.so";

/// Private symbol: link every library of one namespace into another.
pub const SYM_LINK_NAMESPACES_ALL_LIBS: &str = "__loader_android_link_namespaces_all_libs";

/// Private symbol: link a selected list of libraries between namespaces.
pub const SYM_LINK_NAMESPACES: &str = "__loader_android_link_namespaces";

/// Private symbol: create a namespace on behalf of a caller address.
pub const SYM_CREATE_NAMESPACE: &str = "__loader_android_create_namespace";

/// Private symbol: look up a namespace exported by the platform.
pub const SYM_GET_EXPORTED_NAMESPACE: &str = "__loader_android_get_exported_namespace";

/// Public symbol: extended open with `android_dlextinfo`.
pub const SYM_DLOPEN_EXT: &str = "android_dlopen_ext";

/// Default name of the pointer-sized slot a hook library may export.
pub const HOOK_PARAM_SYMBOL: &str = "hook_param";

/// Default name of the escaped copy of the default namespace.
pub const DEFAULT_NAMESPACE_COPY: &str = "default_copy";

/// Default extension of on-disk patched copies.
pub const PATCHED_EXTENSION: &str = "so";

/// Suffix between the counter value and the extension of patched copies.
pub const PATCHED_SUFFIX: &str = "_patched";

/// Prefix of descriptor pseudo-paths handed to the linker.
pub const PROC_SELF_FD: &str = "/proc/self/fd";

/// Number of characters of the soname overwritten per load.
pub const IDENTITY_LEN: usize = 3;

/// Upper bound on instruction words scanned in the `dlopen` trampoline.
pub const TRAMPOLINE_SCAN_LIMIT: usize = 64;

/// `android_dlextinfo` flag: load from `library_fd` instead of opening the path.
pub const ANDROID_DLEXT_USE_LIBRARY_FD: u64 = 0x10;

/// `android_dlextinfo` flag: load into `library_namespace`.
pub const ANDROID_DLEXT_USE_NAMESPACE: u64 = 0x200;
