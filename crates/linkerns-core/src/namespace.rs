//! Namespace creation, linking and hook injection.
//!
//! [`NamespaceController`] turns the raw [`LinkerApi`] entry points into
//! the operations the isolated loader composes. It works over any linker
//! implementation, so its contract is testable without a device.

use std::ffi::c_void;

use linkerns_common::constants::HOOK_PARAM_SYMBOL;
use linkerns_common::error::{LinkerNsError, Result};
use linkerns_common::types::{HookParam, LibraryHandle, NamespaceHandle};

use crate::linker::{CallerIdentity, ExtLoad, LinkerApi, NamespaceRequest};

/// Namespace operations over a resolved linker.
#[derive(Clone, Copy)]
pub struct NamespaceController<'a> {
    linker: &'a dyn LinkerApi,
    hook_param_symbol: &'a str,
}

impl std::fmt::Debug for NamespaceController<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamespaceController")
            .field("hook_param_symbol", &self.hook_param_symbol)
            .finish_non_exhaustive()
    }
}

impl<'a> NamespaceController<'a> {
    /// Creates a controller over `linker` using the default hook slot name.
    #[must_use]
    pub fn new(linker: &'a dyn LinkerApi) -> Self {
        Self {
            linker,
            hook_param_symbol: HOOK_PARAM_SYMBOL,
        }
    }

    /// Creates a controller over the process-wide resolved linker.
    ///
    /// # Errors
    ///
    /// Returns `LinkerNsError::NotReady` if resolution failed.
    pub fn resolved() -> Result<NamespaceController<'static>> {
        crate::resolver::require_linker().map(NamespaceController::new)
    }

    /// Overrides the symbol name of the hook parameter slot.
    #[must_use]
    pub const fn with_hook_param_symbol(mut self, symbol: &'a str) -> Self {
        self.hook_param_symbol = symbol;
        self
    }

    /// Returns the underlying linker.
    #[must_use]
    pub fn linker(&self) -> &'a dyn LinkerApi {
        self.linker
    }

    /// Creates a namespace on behalf of this library.
    ///
    /// # Errors
    ///
    /// Returns an error if the linker rejects the request.
    pub fn create(&self, request: &NamespaceRequest<'_>) -> Result<NamespaceHandle> {
        self.create_as(request, CallerIdentity::Caller)
    }

    /// Creates a namespace while presenting the `dlopen` trampoline as the
    /// caller, escaping the restrictions of this process's own namespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the linker rejects the request.
    pub fn create_escaped(&self, request: &NamespaceRequest<'_>) -> Result<NamespaceHandle> {
        self.create_as(request, CallerIdentity::Trampoline)
    }

    /// Creates a namespace reporting `caller` to the linker's access checks.
    ///
    /// Native entry points pass the return address they captured, so the
    /// linker judges the request by the library that called them.
    ///
    /// # Errors
    ///
    /// Returns an error if the linker rejects the request.
    pub fn create_as(
        &self,
        request: &NamespaceRequest<'_>,
        caller: CallerIdentity,
    ) -> Result<NamespaceHandle> {
        let ns = self.linker.create_namespace(request, caller)?;
        tracing::debug!(name = request.name, ?caller, ns = %ns, "namespace created");
        Ok(ns)
    }

    /// Makes everything visible in `to` resolvable from `from`.
    ///
    /// # Errors
    ///
    /// Returns an error if the linker rejects the link.
    pub fn link_all(&self, from: NamespaceHandle, to: NamespaceHandle) -> Result<()> {
        self.linker.link_namespaces_all_libs(from, to)?;
        tracing::debug!(from = %from, to = %to, "linked namespaces (all libraries)");
        Ok(())
    }

    /// Makes only the colon-separated `shared_libs` of `to` resolvable from `from`.
    ///
    /// # Errors
    ///
    /// Returns an error if the linker rejects the link.
    pub fn link_selective(
        &self,
        from: NamespaceHandle,
        to: NamespaceHandle,
        shared_libs: &str,
    ) -> Result<()> {
        self.linker.link_namespaces(from, to, shared_libs)?;
        tracing::debug!(from = %from, to = %to, shared_libs, "linked namespaces");
        Ok(())
    }

    /// Looks up a namespace exported by the platform, e.g. `"sphal"`.
    ///
    /// # Errors
    ///
    /// Returns an error if no namespace is exported under `name`.
    pub fn exported(&self, name: &str) -> Result<NamespaceHandle> {
        self.linker.get_exported_namespace(name)
    }

    /// Loads `hook_library` into `namespace` with global visibility and hands
    /// it `param` through its parameter slot.
    ///
    /// The hook and the caller must agree: a parameter needs a slot to land
    /// in, and a hook exporting a slot expects to receive a parameter.
    ///
    /// # Errors
    ///
    /// Returns an error if the hook cannot be loaded or the hook contract is
    /// violated.
    pub fn apply_hook(
        &self,
        hook_library: &str,
        namespace: NamespaceHandle,
        param: Option<HookParam>,
    ) -> Result<LibraryHandle> {
        let hook = self.linker.dlopen_ext(
            hook_library,
            libc::RTLD_GLOBAL,
            &ExtLoad::into_namespace(namespace),
        )?;
        let slot = self.linker.symbol(hook, self.hook_param_symbol);

        match (slot, param) {
            (Some(slot), Some(param)) => {
                // SAFETY: the hook exports the slot as a pointer-sized,
                // writable `const void*` variable.
                unsafe { slot.cast::<*const c_void>().write(param.as_ptr()) };
                tracing::debug!(hook = hook_library, "hook parameter installed");
            }
            (None, None) => {}
            (None, Some(_)) => {
                tracing::warn!(
                    hook = hook_library,
                    symbol = self.hook_param_symbol,
                    "hook has no parameter slot"
                );
                return Err(LinkerNsError::HookContract {
                    message: format!(
                        "{hook_library} does not export {} to receive the parameter",
                        self.hook_param_symbol
                    ),
                });
            }
            (Some(_), None) => {
                tracing::warn!(
                    hook = hook_library,
                    symbol = self.hook_param_symbol,
                    "hook parameter missing"
                );
                return Err(LinkerNsError::HookContract {
                    message: format!(
                        "{hook_library} exports {} but no parameter was supplied",
                        self.hook_param_symbol
                    ),
                });
            }
        }

        tracing::info!(hook = hook_library, ns = %namespace, "hook applied");
        Ok(hook)
    }
}
