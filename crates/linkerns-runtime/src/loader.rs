//! The isolated load orchestration.
//!
//! [`LoaderContext`] binds a linker, a soname patcher and the target-id
//! counter together. [`LoaderContext::load_isolated`] runs one load as a
//! strict sequence of steps; the first failing step aborts the attempt and
//! nothing created before it is rolled back.

use std::os::fd::AsFd;
use std::sync::{Mutex, OnceLock, PoisonError};

use linkerns_common::config::LoaderConfig;
use linkerns_common::error::{LinkerNsError, Result};
use linkerns_common::types::{LibraryHandle, NamespaceHandle, SonameIdentity, TargetId};
use linkerns_core::linker::{ExtLoad, LinkerApi, NamespaceRequest};
use linkerns_core::namespace::NamespaceController;
use linkerns_core::resolver;
use linkerns_elf::{ElfSonamePatcher, SonamePatcher};

use crate::counter::TargetCounter;
use crate::destination::PatchedCopy;
use crate::request::LoadRequest;

static GLOBAL: OnceLock<Option<LoaderContext<'static>>> = OnceLock::new();

/// A library loaded into its own namespace under a fresh identity.
#[derive(Debug)]
pub struct IsolatedLibrary {
    /// Handle returned by the linker.
    pub handle: LibraryHandle,
    /// Namespace the library was loaded into.
    pub namespace: NamespaceHandle,
    /// Hook library loaded alongside, if any.
    pub hook: Option<LibraryHandle>,
    /// Counter value consumed by this load.
    pub target_id: TargetId,
    /// Identity written over the library's soname.
    pub identity: SonameIdentity,
    /// The renamed copy the library was loaded from.
    pub copy: PatchedCopy,
}

impl IsolatedLibrary {
    /// Returns the library handle, closing the copy's descriptor.
    ///
    /// The linker keeps its own mappings, so the handle stays valid.
    #[must_use]
    pub fn into_handle(self) -> LibraryHandle {
        self.handle
    }
}

/// Shared state for isolated loads.
pub struct LoaderContext<'a> {
    linker: &'a dyn LinkerApi,
    patcher: Box<dyn SonamePatcher>,
    config: LoaderConfig,
    counter: Mutex<TargetCounter>,
}

impl std::fmt::Debug for LoaderContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoaderContext")
            .field("config", &self.config)
            .field("counter", &self.counter)
            .finish_non_exhaustive()
    }
}

impl<'a> LoaderContext<'a> {
    /// Creates a context over `linker` that patches with [`ElfSonamePatcher`].
    ///
    /// # Errors
    ///
    /// Returns `LinkerNsError::Config` if `config` is invalid.
    pub fn new(linker: &'a dyn LinkerApi, config: LoaderConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            linker,
            patcher: Box::new(ElfSonamePatcher),
            config,
            counter: Mutex::new(TargetCounter::new()),
        })
    }

    /// Replaces the soname patcher.
    #[must_use]
    pub fn with_patcher(mut self, patcher: impl SonamePatcher + 'static) -> Self {
        self.patcher = Box::new(patcher);
        self
    }

    /// Returns the active configuration.
    #[must_use]
    pub const fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Returns a namespace controller sharing this context's linker.
    #[must_use]
    pub fn namespaces(&self) -> NamespaceController<'_> {
        NamespaceController::new(self.linker).with_hook_param_symbol(&self.config.hook_param_symbol)
    }

    /// Returns the id the next load will consume.
    #[must_use]
    pub fn next_target_id(&self) -> TargetId {
        self.counter
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .peek()
    }

    /// Loads `request.library_path` into a new namespace under a fresh
    /// soname.
    ///
    /// Loads are serialized; the counter advances once the destination
    /// for the renamed copy is open, whether or not later steps succeed.
    ///
    /// # Errors
    ///
    /// Returns the error of the first step that fails.
    pub fn load_isolated(&self, request: &LoadRequest) -> Result<IsolatedLibrary> {
        let mut counter = self.counter.lock().unwrap_or_else(PoisonError::into_inner);
        let namespaces = self.namespaces();

        let library = request.library_str()?;
        let search_path = request.search_path()?;
        let namespace = namespaces.create(
            &NamespaceRequest::shared(library)
                .search_path(search_path.as_deref())
                .parent(Some(request.parent)),
        )?;

        if request.link_to_default {
            let default_ns = namespaces
                .create_escaped(&NamespaceRequest::shared(&self.config.default_namespace_name))?;
            namespaces.link_all(namespace, default_ns)?;
        }
        namespaces.link_all(namespace, request.parent)?;

        let hook = match (request.hook_name.as_deref(), request.hook_param) {
            (Some(name), param) => Some(namespaces.apply_hook(name, namespace, param)?),
            (None, Some(_)) => {
                tracing::warn!(library, "hook parameter supplied without a hook library");
                return Err(LinkerNsError::HookContract {
                    message: "a hook parameter requires a hook library".into(),
                });
            }
            (None, None) => None,
        };

        let copy = match request.target_dir.as_deref() {
            Some(dir) => {
                PatchedCopy::in_directory(dir, counter.peek(), &self.config.patched_extension)?
            }
            None => PatchedCopy::anonymous(&request.memfd_name())?,
        };
        let target_id = counter.advance();
        let identity = target_id.identity();

        self.patcher
            .patch(&request.library_path, copy.file(), identity)?;

        let pseudo_path = copy.pseudo_path();
        let handle = self.linker.dlopen_ext(
            &pseudo_path,
            request.mode,
            &ExtLoad::from_fd(namespace, copy.file().as_fd()),
        )?;

        tracing::info!(
            library,
            id = %target_id,
            identity = %identity,
            ns = %namespace,
            copy = %copy.path().map_or_else(|| pseudo_path.clone(), |p| p.display().to_string()),
            "isolated library loaded"
        );
        Ok(IsolatedLibrary {
            handle,
            namespace,
            hook,
            target_id,
            identity,
            copy,
        })
    }
}

impl LoaderContext<'static> {
    /// Returns the process-wide context, resolving the linker with default
    /// settings on first use.
    ///
    /// # Errors
    ///
    /// Returns `LinkerNsError::NotReady` if the linker could not be resolved.
    pub fn global() -> Result<&'static Self> {
        GLOBAL
            .get_or_init(|| build_global(LoaderConfig::default()))
            .as_ref()
            .ok_or(LinkerNsError::NotReady)
    }

    /// Builds the process-wide context with `config` unless it already
    /// exists, and returns it.
    ///
    /// # Errors
    ///
    /// Returns `LinkerNsError::Config` for an invalid `config`, or
    /// `LinkerNsError::NotReady` if the linker could not be resolved.
    pub fn init_global(config: LoaderConfig) -> Result<&'static Self> {
        config.validate()?;
        GLOBAL
            .get_or_init(|| build_global(config))
            .as_ref()
            .ok_or(LinkerNsError::NotReady)
    }
}

fn build_global(config: LoaderConfig) -> Option<LoaderContext<'static>> {
    if !resolver::initialize(&config) {
        return None;
    }
    let linker = resolver::resolved_linker()?;
    match LoaderContext::new(linker, config) {
        Ok(context) => Some(context),
        Err(e) => {
            tracing::warn!(error = %e, "isolated loader disabled");
            None
        }
    }
}
