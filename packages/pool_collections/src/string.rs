use std::ffi::CStr;
use std::fmt::{self, Write as _};
use std::str::{self, Utf8Error};

use memory_pool::{MemoryPool, SourceTag};

use crate::PoolVec;

/// A nul-terminated byte string stored in pool memory.
///
/// The string is a [`PoolVec<u8>`] holding the content followed by a single `0` byte, so the
/// buffer can be handed to code that expects a C string via [`as_c_str()`](Self::as_c_str).
/// Lengths and positions count bytes and exclude the terminator.
///
/// As with the other pool collections, pass the pool the string was created with to every
/// operation and release the storage with [`free()`](Self::free).
///
/// # Examples
///
/// ```
/// use memory_pool::{MemoryPool, source_tag};
/// use pool_collections::PoolString;
///
/// let mut pool = MemoryPool::new();
///
/// let mut text = PoolString::new(&mut pool, "Test", source_tag!());
/// text.catf(&mut pool, format_args!(" {}", 100), source_tag!());
/// assert_eq!(text.as_bytes(&pool), b"Test 100");
///
/// text.del(&mut pool, 1, 2);
/// assert_eq!(text.to_str(&pool).unwrap(), "Tt 100");
///
/// text.free(&mut pool);
/// pool.destroy().unwrap();
/// ```
#[derive(Debug)]
pub struct PoolString {
    /// Content plus terminator. Never empty.
    chars: PoolVec<u8>,
}

impl PoolString {
    /// Creates a string holding `text`.
    #[must_use]
    pub fn new(pool: &mut MemoryPool, text: &str, tag: SourceTag) -> Self {
        let mut string = Self {
            chars: PoolVec::new(pool, tag),
        };

        string.set(pool, text, tag);
        string
    }

    /// The number of bytes, excluding the terminator.
    #[must_use]
    pub fn len(&self) -> usize {
        // Cannot underflow because the terminator is always present.
        self.chars.len().wrapping_sub(1)
    }

    /// Whether the string has no content.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Makes room for `capacity` bytes including the terminator.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` does not exceed the current length.
    pub fn reserve(&mut self, pool: &mut MemoryPool, capacity: usize, tag: SourceTag) {
        assert!(
            capacity > self.len(),
            "cannot reserve {capacity} bytes for a string of {} bytes",
            self.len()
        );

        self.chars.reserve(pool, capacity, tag);
    }

    /// Replaces the content with `text`.
    pub fn set(&mut self, pool: &mut MemoryPool, text: &str, tag: SourceTag) {
        self.replace_range(pool, 0, text.as_bytes(), tag);
    }

    /// Replaces the content with formatted text.
    ///
    /// ```
    /// use memory_pool::{MemoryPool, source_tag};
    /// use pool_collections::PoolString;
    ///
    /// let mut pool = MemoryPool::new();
    /// let mut text = PoolString::new(&mut pool, "old", source_tag!());
    ///
    /// text.setf(&mut pool, format_args!("{}-{:03}", "id", 7), source_tag!());
    /// assert_eq!(text.as_bytes(&pool), b"id-007");
    ///
    /// text.free(&mut pool);
    /// ```
    pub fn setf(&mut self, pool: &mut MemoryPool, args: fmt::Arguments<'_>, tag: SourceTag) {
        self.format_at(pool, 0, args, tag);
    }

    /// Appends `text`.
    pub fn cat(&mut self, pool: &mut MemoryPool, text: &str, tag: SourceTag) {
        let end = self.len();
        self.replace_range(pool, end, text.as_bytes(), tag);
    }

    /// Appends formatted text.
    pub fn catf(&mut self, pool: &mut MemoryPool, args: fmt::Arguments<'_>, tag: SourceTag) {
        let end = self.len();
        self.format_at(pool, end, args, tag);
    }

    /// Deletes `count` bytes starting at `start`.
    ///
    /// # Panics
    ///
    /// Panics if `count` is zero or the range reaches beyond the end of the content.
    pub fn del(&mut self, pool: &mut MemoryPool, start: usize, count: usize) {
        assert!(
            start
                .checked_add(count)
                .is_some_and(|end| end <= self.len()),
            "cannot delete {count} bytes at {start} from a string of {} bytes",
            self.len()
        );

        self.chars.remove(pool, start, count);
    }

    /// Inserts `bytes` before position `start`. A `start` equal to the length appends.
    ///
    /// # Panics
    ///
    /// Panics if `bytes` is empty or `start` is beyond the end of the content.
    pub fn ins(&mut self, pool: &mut MemoryPool, start: usize, bytes: &[u8], tag: SourceTag) {
        assert!(
            start <= self.len(),
            "cannot insert at {start} into a string of {} bytes",
            self.len()
        );

        self.chars
            .insert(pool, start, bytes.len(), tag)
            .copy_from_slice(bytes);
    }

    /// The content, without the terminator.
    #[must_use]
    pub fn as_bytes<'p>(&self, pool: &'p MemoryPool) -> &'p [u8] {
        self.as_bytes_with_nul(pool)
            .split_last()
            .map(|(_, content)| content)
            .expect("the terminator is always present")
    }

    /// The content followed by the terminator.
    #[must_use]
    pub fn as_bytes_with_nul<'p>(&self, pool: &'p MemoryPool) -> &'p [u8] {
        self.chars.as_slice(pool)
    }

    /// The content as a C string. If the content itself contains a `0` byte, the C string
    /// ends there.
    #[must_use]
    pub fn as_c_str<'p>(&self, pool: &'p MemoryPool) -> &'p CStr {
        CStr::from_bytes_until_nul(self.as_bytes_with_nul(pool))
            .expect("the terminator is always present")
    }

    /// The content as UTF-8 text.
    ///
    /// # Errors
    ///
    /// Fails if the content is not valid UTF-8, which can happen after inserting arbitrary
    /// bytes or deleting part of a multi-byte character.
    pub fn to_str<'p>(&self, pool: &'p MemoryPool) -> Result<&'p str, Utf8Error> {
        str::from_utf8(self.as_bytes(pool))
    }

    /// A case-insensitive hash of the content, see [`string_hash()`].
    #[must_use]
    pub fn hash(&self, pool: &MemoryPool) -> i32 {
        string_hash(self.as_bytes(pool))
    }

    /// Returns the storage to the pool.
    pub fn free(self, pool: &mut MemoryPool) {
        self.chars.free(pool);
    }

    /// Truncates the content to `start` bytes and appends `bytes`.
    fn replace_range(&mut self, pool: &mut MemoryPool, start: usize, bytes: &[u8], tag: SourceTag) {
        let end = start
            .checked_add(bytes.len())
            .expect("string length exceeds the size of virtual memory");

        let chars = self.resize_content(pool, end, tag);
        chars
            .get_mut(start..end)
            .expect("content range lies within the resized string")
            .copy_from_slice(bytes);
    }

    /// Truncates the content to `start` bytes and appends formatted text.
    ///
    /// The text is formatted twice: once to measure it and once into the resized buffer.
    fn format_at(
        &mut self,
        pool: &mut MemoryPool,
        start: usize,
        args: fmt::Arguments<'_>,
        tag: SourceTag,
    ) {
        let mut counter = ByteCounter::default();
        counter
            .write_fmt(args)
            .expect("formatting into a byte counter cannot fail");

        let end = start
            .checked_add(counter.count)
            .expect("string length exceeds the size of virtual memory");

        let chars = self.resize_content(pool, end, tag);
        let mut writer = SliceWriter {
            remaining: chars
                .get_mut(start..end)
                .expect("content range lies within the resized string"),
        };
        writer
            .write_fmt(args)
            .expect("formatted text has the length it was measured to have");
    }

    /// Sets the content length, writes the terminator and returns the whole buffer.
    fn resize_content<'p>(
        &mut self,
        pool: &'p mut MemoryPool,
        len: usize,
        tag: SourceTag,
    ) -> &'p mut [u8] {
        let with_nul = len
            .checked_add(1)
            .expect("string length exceeds the size of virtual memory");

        self.chars.resize(pool, with_nul, tag);

        let chars = self.chars.as_mut_slice(pool);
        *chars.last_mut().expect("the terminator is always present") = 0;
        chars
    }
}

/// A case-insensitive multiplicative hash over a byte string.
///
/// Each byte is treated as a signed character, folded to upper case for ASCII letters and
/// mixed in with `hash = 131 * hash + byte`, wrapping on overflow.
///
/// ```
/// use pool_collections::string_hash;
///
/// assert_eq!(string_hash(b"Hello"), string_hash(b"HELLO"));
/// assert_ne!(string_hash(b"Hello"), string_hash(b"World"));
/// assert_eq!(string_hash(b""), 0);
/// ```
#[must_use]
pub fn string_hash(bytes: &[u8]) -> i32 {
    bytes.iter().fold(0_i32, |hash, &byte| {
        let chr = i8::from_ne_bytes([byte]);

        // Clears bit 5 whenever bit 6 is also set, which maps 'a'..='z' onto 'A'..='Z'.
        let folded = chr.wrapping_sub(chr & (chr >> 1) & 0x20);

        hash.wrapping_mul(131).wrapping_add(i32::from(folded))
    })
}

/// Counts the bytes that formatting would produce.
#[derive(Debug, Default)]
struct ByteCounter {
    count: usize,
}

impl fmt::Write for ByteCounter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.count = self.count.checked_add(s.len()).ok_or(fmt::Error)?;
        Ok(())
    }
}

/// Writes formatted text into a fixed buffer, failing if it does not fit.
#[derive(Debug)]
struct SliceWriter<'a> {
    remaining: &'a mut [u8],
}

impl fmt::Write for SliceWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let remaining = std::mem::take(&mut self.remaining);

        if s.len() > remaining.len() {
            return Err(fmt::Error);
        }

        let (target, rest) = remaining.split_at_mut(s.len());
        target.copy_from_slice(s.as_bytes());
        self.remaining = rest;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use memory_pool::source_tag;
    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;

    assert_impl_all!(PoolString: Send, std::fmt::Debug);
    assert_not_impl_any!(PoolString: Sync, Clone);

    #[test]
    fn new_string_is_terminated() {
        let mut pool = MemoryPool::new();

        let text = PoolString::new(&mut pool, "abc", source_tag!());
        assert_eq!(text.len(), 3);
        assert_eq!(text.as_bytes_with_nul(&pool), b"abc\0");
        assert_eq!(text.as_c_str(&pool), c"abc");

        text.free(&mut pool);
        assert!(pool.is_empty());
    }

    #[test]
    fn empty_string_has_only_terminator() {
        let mut pool = MemoryPool::new();

        let text = PoolString::new(&mut pool, "", source_tag!());
        assert!(text.is_empty());
        assert_eq!(text.as_bytes_with_nul(&pool), b"\0");

        text.free(&mut pool);
    }

    #[test]
    fn cat_then_del() {
        let mut pool = MemoryPool::new();

        let mut text = PoolString::new(&mut pool, "Test", source_tag!());
        text.cat(&mut pool, " 100", source_tag!());
        assert_eq!(text.len(), 8);
        assert_eq!(text.to_str(&pool).unwrap(), "Test 100");

        text.del(&mut pool, 1, 2);
        assert_eq!(text.to_str(&pool).unwrap(), "Tt 100");
        assert_eq!(text.as_bytes_with_nul(&pool).last(), Some(&0));

        text.free(&mut pool);
    }

    #[test]
    fn set_shrinks_and_grows() {
        let mut pool = MemoryPool::new();

        let mut text = PoolString::new(&mut pool, "a fairly long piece of text", source_tag!());
        text.set(&mut pool, "short", source_tag!());
        assert_eq!(text.as_bytes_with_nul(&pool), b"short\0");

        let long = "x".repeat(400);
        text.set(&mut pool, &long, source_tag!());
        assert_eq!(text.to_str(&pool).unwrap(), long);
        assert_eq!(pool.live_allocations(), 1);

        text.free(&mut pool);
    }

    #[test]
    fn formatted_set_and_cat() {
        let mut pool = MemoryPool::new();

        let mut text = PoolString::new(&mut pool, "", source_tag!());
        text.setf(&mut pool, format_args!("{}={}", "answer", 42), source_tag!());
        text.catf(&mut pool, format_args!(", ratio~{:.2}", 1.23456), source_tag!());

        assert_eq!(text.to_str(&pool).unwrap(), "answer=42, ratio~1.23");
        assert_eq!(text.as_bytes_with_nul(&pool).last(), Some(&0));

        text.free(&mut pool);
    }

    #[test]
    fn ins_in_middle_and_at_end() {
        let mut pool = MemoryPool::new();

        let mut text = PoolString::new(&mut pool, "Tt 100", source_tag!());
        text.ins(&mut pool, 1, b"es", source_tag!());
        assert_eq!(text.to_str(&pool).unwrap(), "Test 100");

        let end = text.len();
        text.ins(&mut pool, end, b"!", source_tag!());
        assert_eq!(text.as_bytes_with_nul(&pool), b"Test 100!\0");

        text.free(&mut pool);
    }

    #[test]
    fn reserve_keeps_content() {
        let mut pool = MemoryPool::new();

        let mut text = PoolString::new(&mut pool, "keep", source_tag!());
        text.reserve(&mut pool, 300, source_tag!());
        assert_eq!(text.as_bytes_with_nul(&pool), b"keep\0");

        text.free(&mut pool);
    }

    #[test]
    fn hash_ignores_ascii_case() {
        let mut pool = MemoryPool::new();

        let lower = PoolString::new(&mut pool, "pool", source_tag!());
        let upper = PoolString::new(&mut pool, "POOL", source_tag!());
        assert_eq!(lower.hash(&pool), upper.hash(&pool));

        // 'P' = 80, 'O' = 79, 'L' = 76
        let expected = ((80 * 131 + 79) * 131 + 79) * 131 + 76;
        assert_eq!(lower.hash(&pool), expected);

        lower.free(&mut pool);
        upper.free(&mut pool);
    }

    #[test]
    fn hash_treats_high_bytes_as_signed() {
        // 0xE9 is -23 as a signed byte. Bits 5 and 6 are both set, so 32 is subtracted.
        assert_eq!(string_hash(&[0xE9]), -55);
    }

    #[test]
    #[should_panic(expected = "cannot delete")]
    fn del_cannot_remove_terminator() {
        let mut pool = MemoryPool::new();

        let mut text = PoolString::new(&mut pool, "abc", source_tag!());
        text.del(&mut pool, 2, 2);
    }

    #[test]
    fn invalid_utf8_is_reported() {
        let mut pool = MemoryPool::new();

        let mut text = PoolString::new(&mut pool, "é", source_tag!());
        text.del(&mut pool, 1, 1);
        assert!(text.to_str(&pool).is_err());
        assert_eq!(text.as_c_str(&pool).to_bytes(), &[0xC3]);

        text.free(&mut pool);
    }
}
