//! Compact string storage: a single pointer-width word addressing an
//! individually heap-allocated, length-prefixed byte buffer.
//!
//! Adapted from the thin-pointer trick in the teacher's `BumpStr`
//! (`crates/doc/src/bump_str.rs`), which stores a string's length as a
//! leading `u32` ahead of its bytes so that the handle itself is a
//! single pointer rather than Rust's "fat" `&str`. Unlike `BumpStr`,
//! which carves its storage out of a shared bump arena freed all at
//! once, a compact CSON string is individually owned (spec.md §3: "the
//! buffer is uniquely owned") and must be allocated and freed one at a
//! time via the global allocator, since `ref`/`unref` duplicate and
//! free it independently of any other value's lifetime.

use std::alloc::{self, Layout};
use std::ptr::NonNull;

use crate::error::Error;

const HEADER_ALIGN: usize = std::mem::align_of::<u32>();
const HEADER_SIZE: usize = std::mem::size_of::<u32>();

fn layout_for(len: usize) -> Result<Layout, Error> {
    Layout::from_size_align(HEADER_SIZE + len, HEADER_ALIGN).map_err(|_| Error::OutOfMemory(len))
}

/// Allocate a new length-prefixed buffer holding a copy of `s`,
/// returning the raw pointer to its header (the value a compact-string
/// word's payload bits are derived from).
pub(crate) fn alloc(s: &str) -> Result<NonNull<u8>, Error> {
    let len = s.len();
    let layout = layout_for(len)?;

    // Safety: `layout`'s size is always > 0 (it includes the header),
    // and we immediately check the returned pointer for null.
    let ptr = unsafe { alloc::alloc(layout) };
    let Some(ptr) = NonNull::new(ptr) else {
        return Err(Error::OutOfMemory(len));
    };

    // Safety: `ptr` is freshly allocated with `layout`'s size/align and
    // is not aliased; we write the header then the payload bytes.
    unsafe {
        ptr.cast::<u32>().as_ptr().write(len as u32);
        std::ptr::copy_nonoverlapping(s.as_ptr(), ptr.as_ptr().add(HEADER_SIZE), len);
    }

    Ok(ptr)
}

/// Read back the string stored behind `ptr`, previously returned by
/// [`alloc`]. Safety: `ptr` must point to a live buffer created by
/// `alloc` and not yet passed to [`free`].
pub(crate) unsafe fn as_str<'a>(ptr: NonNull<u8>) -> &'a str {
    let len = unsafe { ptr.cast::<u32>().as_ptr().read() } as usize;
    let bytes = unsafe { std::slice::from_raw_parts(ptr.as_ptr().add(HEADER_SIZE), len) };
    // Safety: `alloc` only ever copies bytes out of a valid `&str`.
    unsafe { std::str::from_utf8_unchecked(bytes) }
}

/// Free a buffer previously returned by [`alloc`]. Safety: `ptr` must
/// not be read or freed again afterwards.
pub(crate) unsafe fn free(ptr: NonNull<u8>) {
    let len = unsafe { ptr.cast::<u32>().as_ptr().read() } as usize;
    let layout = layout_for(len).expect("layout was valid at alloc time");
    unsafe { alloc::dealloc(ptr.as_ptr(), layout) };
}

/// `ref()` on a compact string: the buffer is uniquely owned, so a
/// "reference" is a fresh, independently-owned duplicate rather than a
/// shared-count bump.
pub(crate) unsafe fn duplicate(ptr: NonNull<u8>) -> Result<NonNull<u8>, Error> {
    alloc(unsafe { as_str(ptr) })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_alloc_roundtrip_and_free() {
        let ptr = alloc("hello\0world!").unwrap();
        unsafe {
            assert_eq!(as_str(ptr), "hello\0world!");
            let dup = duplicate(ptr).unwrap();
            assert_eq!(as_str(dup), as_str(ptr));
            free(ptr);
            free(dup);
        }
    }

    #[test]
    fn test_empty_string() {
        let ptr = alloc("").unwrap();
        unsafe {
            assert_eq!(as_str(ptr), "");
            free(ptr);
        }
    }
}
