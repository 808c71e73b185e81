use std::fmt;

/// Identifies the place in the source code that requested an allocation.
///
/// Tags are shown in leak reports. Use the [`source_tag!`](crate::source_tag) macro to
/// capture the current file and line.
///
/// When the `tracking` feature is disabled, tags are accepted but not stored and reports
/// show [`SourceTag::unknown()`] instead.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct SourceTag {
    file: &'static str,
    line: u32,
}

impl SourceTag {
    /// Creates a tag for the given file and line.
    #[must_use]
    pub const fn new(file: &'static str, line: u32) -> Self {
        Self { file, line }
    }

    /// The tag used when the real origin of an allocation is not known.
    #[must_use]
    pub const fn unknown() -> Self {
        Self::new("unknown", 0)
    }

    /// The source file that requested the allocation.
    #[must_use]
    pub const fn file(&self) -> &'static str {
        self.file
    }

    /// The line in [`file()`](Self::file) that requested the allocation.
    #[must_use]
    pub const fn line(&self) -> u32 {
        self.line
    }
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.file, self.line)
    }
}

/// Creates a [`SourceTag`] for the location where the macro is invoked.
///
/// # Examples
///
/// ```
/// use memory_pool::{MemoryPool, source_tag};
///
/// let mut pool = MemoryPool::new();
/// let allocation = pool.allocate(16, source_tag!());
/// pool.free(allocation);
/// ```
#[macro_export]
macro_rules! source_tag {
    () => {
        $crate::SourceTag::new(file!(), line!())
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_report_format() {
        let tag = SourceTag::new("main.rs", 42);
        assert_eq!(tag.to_string(), "main.rs(42)");
    }

    #[test]
    fn macro_captures_this_file() {
        let tag = crate::source_tag!();
        assert!(tag.file().ends_with("source_tag.rs"));
        assert!(tag.line() > 0);
    }

    #[test]
    fn unknown_has_zero_line() {
        assert_eq!(SourceTag::unknown().line(), 0);
        assert_eq!(SourceTag::unknown().to_string(), "unknown(0)");
    }
}
