//! Read-only view of an ELF shared object.
//!
//! Structural parsing is done by `goblin`; this module only locates the
//! soname's bytes in the file so they can be rewritten in place. Both 32-
//! and 64-bit little-endian objects are accepted.

use std::ops::Range;

use goblin::elf::dynamic::{DT_SONAME, DT_STRTAB};
use goblin::elf::header::{
    EI_CLASS, EI_DATA, ELFCLASS32, ELFCLASS64, ELFDATA2LSB, ELFMAG, SELFMAG, SIZEOF_IDENT,
};
use goblin::elf::program_header::PT_LOAD;
use goblin::elf::Elf;

use crate::error::ElfError;

/// A parsed view over the bytes of a shared object.
#[derive(Debug)]
pub struct ElfImage<'a> {
    data: &'a [u8],
    elf: Elf<'a>,
}

impl<'a> ElfImage<'a> {
    /// Validates the ELF identification and parses `data`.
    ///
    /// # Errors
    ///
    /// Returns an error if `data` is not a well-formed little-endian
    /// ELF32/ELF64 object.
    pub fn parse(data: &'a [u8]) -> Result<Self, ElfError> {
        let ident = data.get(..SIZEOF_IDENT).ok_or(ElfError::NotElf)?;
        if &ident[..SELFMAG] != ELFMAG {
            return Err(ElfError::NotElf);
        }
        match ident[EI_CLASS] {
            ELFCLASS32 | ELFCLASS64 => {}
            other => return Err(ElfError::UnsupportedClass(other)),
        }
        if ident[EI_DATA] != ELFDATA2LSB {
            return Err(ElfError::UnsupportedEncoding(ident[EI_DATA]));
        }
        let elf = Elf::parse(data).map_err(|e| ElfError::Malformed(e.to_string()))?;
        Ok(Self { data, elf })
    }

    /// Returns whether this is a 64-bit object.
    #[must_use]
    pub const fn is_64bit(&self) -> bool {
        self.elf.is_64
    }

    /// Maps a virtual address to its offset in the file through the
    /// `PT_LOAD` segments.
    fn file_offset_of(&self, addr: u64) -> Option<u64> {
        self.elf
            .program_headers
            .iter()
            .filter(|ph| ph.p_type == PT_LOAD)
            .find_map(|ph| {
                let delta = addr.checked_sub(ph.p_vaddr)?;
                if delta >= ph.p_filesz {
                    return None;
                }
                ph.p_offset.checked_add(delta)
            })
    }

    /// Returns the file range of the soname string, excluding its terminator.
    ///
    /// # Errors
    ///
    /// Returns an error if the object has no soname or it cannot be located
    /// in the file.
    pub fn soname_range(&self) -> Result<Range<usize>, ElfError> {
        let dynamic = self.elf.dynamic.as_ref().ok_or(ElfError::NoDynamicSegment)?;
        let lookup = |tag: u64| {
            dynamic
                .dyns
                .iter()
                .find(|entry| entry.d_tag == tag)
                .map(|entry| entry.d_val)
        };
        let strtab = lookup(DT_STRTAB).ok_or(ElfError::NoStringTable)?;
        let soname = lookup(DT_SONAME).ok_or(ElfError::NoSoname)?;

        let start = self
            .file_offset_of(strtab)
            .ok_or(ElfError::UnmappedAddress(strtab))?
            .checked_add(soname)
            .and_then(|offset| usize::try_from(offset).ok())
            .ok_or(ElfError::UnmappedAddress(strtab))?;

        let tail = self.data.get(start..).ok_or(ElfError::Truncated {
            what: "soname",
            offset: start,
        })?;
        let len = tail
            .iter()
            .position(|b| *b == 0)
            .ok_or(ElfError::Unterminated)?;
        Ok(start..start + len)
    }

    /// Returns the soname bytes, excluding the terminator.
    ///
    /// # Errors
    ///
    /// See [`ElfImage::soname_range`].
    pub fn soname(&self) -> Result<&'a [u8], ElfError> {
        let range = self.soname_range()?;
        Ok(&self.data[range])
    }
}

/// Returns the soname of the shared object in `data`.
///
/// # Errors
///
/// Returns an error if `data` is not a shared object with a soname.
pub fn read_soname(data: &[u8]) -> Result<String, ElfError> {
    let image = ElfImage::parse(data)?;
    Ok(String::from_utf8_lossy(image.soname()?).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture;

    /// Offset of the first (`PT_LOAD`) program header in a 64-bit fixture.
    const LOAD_PHDR: usize = 64;

    #[test]
    fn reads_soname_from_elf64() {
        let data = fixture::shared_object(true, Some("libvulkan_freedreno.so"));
        let image = ElfImage::parse(&data).expect("parse");
        assert!(image.is_64bit());
        assert_eq!(read_soname(&data).unwrap(), "libvulkan_freedreno.so");
    }

    #[test]
    fn reads_soname_from_elf32() {
        let data = fixture::shared_object(false, Some("libfoo.so"));
        let image = ElfImage::parse(&data).expect("parse");
        assert!(!image.is_64bit());
        assert_eq!(image.soname().unwrap(), b"libfoo.so");
    }

    #[test]
    fn located_soname_matches_dynamic_string_table() {
        let data = fixture::shared_object(true, Some("libGLESv2_adreno.so"));
        let image = ElfImage::parse(&data).unwrap();
        assert_eq!(image.elf.soname, Some("libGLESv2_adreno.so"));
        assert_eq!(image.soname().unwrap(), b"libGLESv2_adreno.so");
    }

    #[test]
    fn rejects_non_elf() {
        assert_eq!(ElfImage::parse(b"#!/bin/sh\n").unwrap_err(), ElfError::NotElf);
        assert_eq!(ElfImage::parse(b"").unwrap_err(), ElfError::NotElf);
    }

    #[test]
    fn rejects_big_endian() {
        let mut data = fixture::shared_object(true, Some("libfoo.so"));
        data[EI_DATA] = 2;
        assert_eq!(
            ElfImage::parse(&data).unwrap_err(),
            ElfError::UnsupportedEncoding(2)
        );
    }

    #[test]
    fn rejects_unknown_class() {
        let mut data = fixture::shared_object(true, Some("libfoo.so"));
        data[EI_CLASS] = 9;
        assert_eq!(ElfImage::parse(&data).unwrap_err(), ElfError::UnsupportedClass(9));
    }

    #[test]
    fn missing_soname_is_reported() {
        let data = fixture::shared_object(true, None);
        assert_eq!(read_soname(&data).unwrap_err(), ElfError::NoSoname);
    }

    #[test]
    fn truncated_file_is_reported() {
        let data = fixture::shared_object(true, Some("libfoo.so"));
        let err = read_soname(&data[..100]).unwrap_err();
        assert!(matches!(err, ElfError::Malformed(_)));
    }

    #[test]
    fn missing_dynamic_segment_is_reported() {
        let mut data = fixture::shared_object(true, Some("libfoo.so"));
        // Second program header is PT_DYNAMIC; turn it into PT_NOTE.
        data[LOAD_PHDR + 56] = 4;
        assert_eq!(read_soname(&data).unwrap_err(), ElfError::NoDynamicSegment);
    }

    #[test]
    fn huge_load_offset_is_rejected() {
        let mut data = fixture::shared_object(true, Some("libfoo.so"));
        data[LOAD_PHDR + 8..LOAD_PHDR + 16].copy_from_slice(&u64::MAX.to_le_bytes());
        assert!(read_soname(&data).is_err());
    }

    #[test]
    fn overflowing_segment_mapping_is_unmapped() {
        let data = fixture::shared_object(true, Some("libfoo.so"));
        let mut image = ElfImage::parse(&data).unwrap();
        image.elf.program_headers[0].p_offset = u64::MAX;
        let strtab = image
            .elf
            .dynamic
            .as_ref()
            .and_then(|d| d.dyns.iter().find(|e| e.d_tag == DT_STRTAB))
            .map(|e| e.d_val)
            .unwrap();
        assert_eq!(image.file_offset_of(strtab), None);
        assert_eq!(image.soname_range().unwrap_err(), ElfError::UnmappedAddress(strtab));
    }

    #[test]
    fn address_outside_load_segments_is_unmapped() {
        let data = fixture::shared_object(true, Some("libfoo.so"));
        let image = ElfImage::parse(&data).unwrap();
        assert_eq!(image.file_offset_of(0x10), None);
        assert_eq!(image.file_offset_of(0x1_0000), Some(0));
    }
}
