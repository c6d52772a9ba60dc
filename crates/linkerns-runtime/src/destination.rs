//! Destinations for renamed library copies.
//!
//! A copy either lives in a caller-chosen directory as
//! `<counter>_patched.<ext>` or in an anonymous memory-backed file. Either
//! way the linker reaches it through its descriptor.

use std::fs::File;
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use linkerns_common::constants::PROC_SELF_FD;
use linkerns_common::error::{LinkerNsError, Result};
use linkerns_common::types::TargetId;

/// An open file holding a renamed copy of a library.
#[derive(Debug)]
pub struct PatchedCopy {
    file: File,
    path: Option<PathBuf>,
}

impl PatchedCopy {
    /// Creates (or truncates) `<dir>/<id>_patched.<extension>`, mode `0600`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened for writing.
    pub fn in_directory(dir: &Path, id: TargetId, extension: &str) -> Result<Self> {
        let path = dir.join(id.patched_file_name(extension));
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(&path)
            .map_err(|e| LinkerNsError::Io {
                path: path.clone(),
                source: e,
            })?;
        tracing::debug!(path = %path.display(), "opened patched copy");
        Ok(Self {
            file,
            path: Some(path),
        })
    }

    /// Creates an anonymous, executable, memory-backed file.
    ///
    /// # Errors
    ///
    /// Returns `LinkerNsError::Unsupported` if the kernel lacks
    /// `memfd_create`, or an I/O error if creation fails otherwise.
    #[cfg(any(target_os = "linux", target_os = "android"))]
    pub fn anonymous(name: &str) -> Result<Self> {
        use std::os::fd::{FromRawFd, OwnedFd, RawFd};

        use nix::errno::Errno;

        let cname = linkerns_core::linker::c_string("memfd name", name)?;
        // Invoked as a raw syscall so bionic releases without the wrapper work.
        // SAFETY: `cname` is NUL-terminated and outlives the call.
        let ret = unsafe {
            libc::syscall(libc::SYS_memfd_create, cname.as_ptr(), 0 as libc::c_uint)
        };
        match Errno::result(ret) {
            Ok(fd) => {
                let fd = RawFd::try_from(fd).map_err(|_| LinkerNsError::InvalidArgument {
                    message: format!("memfd_create returned out-of-range descriptor {fd}"),
                })?;
                // SAFETY: the kernel just returned this descriptor and nothing else owns it.
                let file = File::from(unsafe { OwnedFd::from_raw_fd(fd) });
                tracing::debug!(name, fd, "created memory-backed copy");
                Ok(Self { file, path: None })
            }
            Err(Errno::ENOSYS) => Err(LinkerNsError::Unsupported {
                feature: "memfd_create".into(),
            }),
            Err(e) => Err(LinkerNsError::Io {
                path: PathBuf::from(format!("memfd:{name}")),
                source: e.into(),
            }),
        }
    }

    /// Stub for platforms without memory-backed files.
    ///
    /// # Errors
    ///
    /// Always returns `LinkerNsError::Unsupported`.
    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    pub fn anonymous(_name: &str) -> Result<Self> {
        Err(LinkerNsError::Unsupported {
            feature: "memfd_create".into(),
        })
    }

    /// Returns the open file.
    #[must_use]
    pub const fn file(&self) -> &File {
        &self.file
    }

    /// Returns the on-disk path, or `None` for a memory-backed copy.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Returns a path naming this copy through its descriptor,
    /// e.g. `/proc/self/fd/12`.
    #[must_use]
    pub fn pseudo_path(&self) -> String {
        format!("{PROC_SELF_FD}/{}", self.file.as_raw_fd())
    }

    /// Releases the file, closing the descriptor when dropped.
    #[must_use]
    pub fn into_file(self) -> File {
        self.file
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Seek, SeekFrom, Write};

    use super::*;

    #[test]
    fn directory_copy_is_named_by_counter() {
        let dir = tempfile::tempdir().expect("tempdir");
        let copy = PatchedCopy::in_directory(dir.path(), TargetId::new(4), "so").expect("open");
        assert_eq!(copy.path(), Some(dir.path().join("4_patched.so").as_path()));
        assert!(dir.path().join("4_patched.so").exists());
    }

    #[test]
    fn directory_copy_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().expect("tempdir");
        let copy = PatchedCopy::in_directory(dir.path(), TargetId::new(0), "so").expect("open");
        let mode = copy.file().metadata().unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn reopening_truncates_stale_content() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("0_patched.so"), b"stale").unwrap();
        let copy = PatchedCopy::in_directory(dir.path(), TargetId::new(0), "so").expect("open");
        assert_eq!(copy.file().metadata().unwrap().len(), 0);
    }

    #[test]
    fn missing_directory_is_an_io_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = PatchedCopy::in_directory(&dir.path().join("absent"), TargetId::new(0), "so")
            .unwrap_err();
        assert!(matches!(err, LinkerNsError::Io { .. }));
    }

    #[test]
    fn pseudo_path_names_descriptor() {
        let dir = tempfile::tempdir().expect("tempdir");
        let copy = PatchedCopy::in_directory(dir.path(), TargetId::new(1), "so").expect("open");
        let expected = format!("/proc/self/fd/{}", copy.file().as_raw_fd());
        assert_eq!(copy.pseudo_path(), expected);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn anonymous_copy_is_readable_through_pseudo_path() {
        let copy = PatchedCopy::anonymous("libfoo.so").expect("memfd");
        assert!(copy.path().is_none());
        let mut file = copy.file();
        file.write_all(b"payload").unwrap();
        let _ = file.seek(SeekFrom::Start(0)).unwrap();

        let mut through_proc = String::new();
        let _ = File::open(copy.pseudo_path())
            .unwrap()
            .read_to_string(&mut through_proc)
            .unwrap();
        assert_eq!(through_proc, "payload");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn anonymous_name_with_nul_is_rejected() {
        let err = PatchedCopy::anonymous("lib\0foo").unwrap_err();
        assert!(matches!(err, LinkerNsError::InvalidArgument { .. }));
    }
}
