//! Synthetic shared objects for tests.

const BASE: u64 = 0x1_0000;

fn put(out: &mut [u8], at: usize, value: u64, width: usize) {
    out[at..at + width].copy_from_slice(&value.to_le_bytes()[..width]);
}

/// Builds a minimal little-endian shared object with one `PT_LOAD` covering
/// the whole file, a `PT_DYNAMIC` segment and a `.dynstr` holding `soname`.
///
/// There is no section header table.
pub fn shared_object(is_64: bool, soname: Option<&str>) -> Vec<u8> {
    let (ehsize, phentsize, dynent, word) = if is_64 { (64, 56, 16, 8) } else { (52, 32, 8, 4) };

    let phoff = ehsize;
    let strtab_off = phoff + 2 * phentsize;
    let mut strtab = vec![0u8];
    if let Some(name) = soname {
        strtab.extend_from_slice(name.as_bytes());
        strtab.push(0);
    }
    let dyn_off = (strtab_off + strtab.len() + 7) & !7;
    let mut dynamic = vec![(5u64, BASE + strtab_off as u64), (10, strtab.len() as u64)];
    if soname.is_some() {
        dynamic.push((14, 1));
    }
    dynamic.push((0, 0));
    let dyn_len = dynamic.len() * dynent;
    let total = dyn_off + dyn_len;

    let mut out = vec![0u8; total];
    out[..4].copy_from_slice(b"\x7fELF");
    out[4] = if is_64 { 2 } else { 1 };
    out[5] = 1;
    out[6] = 1;
    put(&mut out, 16, 3, 2);
    put(&mut out, 18, if is_64 { 183 } else { 40 }, 2);
    put(&mut out, 20, 1, 4);
    if is_64 {
        put(&mut out, 32, phoff as u64, 8);
        put(&mut out, 52, ehsize as u64, 2);
        put(&mut out, 54, phentsize as u64, 2);
        put(&mut out, 56, 2, 2);
    } else {
        put(&mut out, 28, phoff as u64, 4);
        put(&mut out, 40, ehsize as u64, 2);
        put(&mut out, 42, phentsize as u64, 2);
        put(&mut out, 44, 2, 2);
    }

    let segments = [
        (1u64, 0u64, BASE, total as u64),
        (2, dyn_off as u64, BASE + dyn_off as u64, dyn_len as u64),
    ];
    for (index, (kind, offset, vaddr, size)) in segments.into_iter().enumerate() {
        let at = phoff + index * phentsize;
        put(&mut out, at, kind, 4);
        if is_64 {
            put(&mut out, at + 8, offset, 8);
            put(&mut out, at + 16, vaddr, 8);
            put(&mut out, at + 24, vaddr, 8);
            put(&mut out, at + 32, size, 8);
            put(&mut out, at + 40, size, 8);
        } else {
            put(&mut out, at + 4, offset, 4);
            put(&mut out, at + 8, vaddr, 4);
            put(&mut out, at + 12, vaddr, 4);
            put(&mut out, at + 16, size, 4);
            put(&mut out, at + 20, size, 4);
        }
    }

    out[strtab_off..strtab_off + strtab.len()].copy_from_slice(&strtab);
    for (index, (tag, value)) in dynamic.into_iter().enumerate() {
        let at = dyn_off + index * dynent;
        put(&mut out, at, tag, word);
        put(&mut out, at + word, value, word);
    }
    out
}
