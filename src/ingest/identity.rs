/// Where a chunk sits inside its source, in the source's native unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    /// 1-based inclusive line range (code)
    Lines { start: usize, end: usize },
    /// Chunk ordinal within the note (notes)
    Ordinal(usize),
}

/// Derive the vector-store primary key of a chunk.
///
/// Pure function of `(source_path, position)`: re-indexing the same source
/// produces the same ids, so upserts overwrite instead of duplicating.
/// Returns 32 lowercase hex characters (MD5).
pub fn chunk_id(source_path: &str, position: Position) -> String {
    let key = match position {
        Position::Lines { start, end } => format!("{}:{}:{}", source_path, start, end),
        Position::Ordinal(index) => format!("{}_{}", source_path, index),
    };
    format!("{:x}", md5::compute(key.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_id_is_stable() {
        let a = chunk_id("src/lib.rs", Position::Lines { start: 1, end: 40 });
        let b = chunk_id("src/lib.rs", Position::Lines { start: 1, end: 40 });
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_chunk_id_known_digest() {
        // md5("a.py:1:2")
        assert_eq!(
            chunk_id("a.py", Position::Lines { start: 1, end: 2 }),
            format!("{:x}", md5::compute(b"a.py:1:2"))
        );
        assert_eq!(
            chunk_id("notes/cpu.md", Position::Ordinal(3)),
            format!("{:x}", md5::compute(b"notes/cpu.md_3"))
        );
    }

    #[test]
    fn test_chunk_id_differs_by_position() {
        let base = chunk_id("src/lib.rs", Position::Lines { start: 1, end: 40 });
        assert_ne!(base, chunk_id("src/lib.rs", Position::Lines { start: 1, end: 41 }));
        assert_ne!(base, chunk_id("src/lib.rs", Position::Lines { start: 2, end: 40 }));
        assert_ne!(base, chunk_id("src/main.rs", Position::Lines { start: 1, end: 40 }));
        assert_ne!(
            chunk_id("n.md", Position::Ordinal(0)),
            chunk_id("n.md", Position::Ordinal(1))
        );
    }
}
