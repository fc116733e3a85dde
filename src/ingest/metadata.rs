use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::OnceLock;
use std::time::SystemTime;

/// Structured note metadata, shared by every chunk of a note
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct VaultMetadata {
    pub title: String,
    pub tags: BTreeSet<String>,
    pub created_date: Option<String>,
    pub modified_date: Option<String>,
}

/// Filesystem timestamps of a source file (best effort)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileTimes {
    pub created: Option<SystemTime>,
    pub modified: Option<SystemTime>,
}

impl FileTimes {
    pub fn from_metadata(meta: &std::fs::Metadata) -> Self {
        Self {
            created: meta.created().ok(),
            modified: meta.modified().ok(),
        }
    }
}

/// A `---` delimited block at the start of a note
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrontMatter<'a> {
    /// Lines between the delimiters
    pub block: &'a str,
    /// Everything after the closing delimiter
    pub body: &'a str,
}

/// Locate a leading front-matter block.
///
/// The first line must be `---` and a later line must be `---` as well;
/// an unclosed block is not front-matter.
pub fn split_front_matter(content: &str) -> Option<FrontMatter<'_>> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let mut lines = content.split_inclusive('\n');

    let opening = lines.next()?;
    if opening.trim_end() != "---" {
        return None;
    }

    let block_start = opening.len();
    let mut offset = block_start;
    for line in lines {
        if line.trim_end() == "---" {
            return Some(FrontMatter {
                block: &content[block_start..offset],
                body: &content[offset + line.len()..],
            });
        }
        offset += line.len();
    }
    None
}

/// Extract title, tags and timestamps for a note.
///
/// Front-matter `title`/`name` override the file stem; `tags`/`tag` take a
/// bracketed list or a scalar. Inline `#tag` tokens anywhere in the raw
/// content are merged in.
pub fn extract_metadata(content: &str, path: &Path, times: FileTimes) -> VaultMetadata {
    let mut metadata = VaultMetadata {
        title: path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default(),
        tags: BTreeSet::new(),
        created_date: times.created.map(format_time),
        modified_date: times.modified.map(format_time),
    };

    if let Some(front) = split_front_matter(content) {
        for (key, value) in front_matter_pairs(front.block) {
            match key.as_str() {
                "title" | "name" => {
                    if !value.is_empty() {
                        metadata.title = value.to_string();
                    }
                }
                "tags" | "tag" => metadata.tags.extend(parse_tag_value(value)),
                _ => {}
            }
        }
    }

    metadata
        .tags
        .extend(inline_tags(content).map(|t| t.to_string()));

    metadata
}

/// `key: value` lines of a front-matter block; keys are lowercased and
/// values are trimmed and unquoted. Lines without a colon are ignored.
fn front_matter_pairs(block: &str) -> impl Iterator<Item = (String, &str)> {
    block.lines().filter_map(|line| {
        let (key, value) = line.split_once(':')?;
        Some((key.trim().to_lowercase(), unquote(value)))
    })
}

fn parse_tag_value(value: &str) -> Vec<String> {
    let items: Vec<&str> = match value.strip_prefix('[').and_then(|v| v.strip_suffix(']')) {
        Some(list) => list.split(',').map(unquote).collect(),
        None => vec![value],
    };
    items
        .into_iter()
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn unquote(value: &str) -> &str {
    value.trim().trim_matches(|c| c == '"' || c == '\'')
}

fn inline_tag_regex() -> &'static Regex {
    static TAG: OnceLock<Regex> = OnceLock::new();
    TAG.get_or_init(|| Regex::new(r"#([\w-]+)").expect("Invalid inline tag pattern"))
}

/// Inline `#tag` tokens (Unicode word characters, hyphen, underscore)
pub fn inline_tags(content: &str) -> impl Iterator<Item = &str> {
    inline_tag_regex()
        .captures_iter(content)
        .filter_map(|cap| cap.get(1).map(|m| m.as_str()))
}

fn format_time(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::{Duration, UNIX_EPOCH};
    use tempfile::TempDir;

    fn tags(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_front_matter_title_and_list_tags() {
        let content = "---\ntitle: \"Arch Notes\"\ntags: [cpu, memory]\n---\nBody #exam";
        let meta = extract_metadata(content, Path::new("vault/arch.md"), FileTimes::default());
        assert_eq!(meta.title, "Arch Notes");
        assert_eq!(meta.tags, tags(&["cpu", "memory", "exam"]));
    }

    #[test]
    fn test_defaults_to_file_stem() {
        let meta = extract_metadata("plain body", Path::new("notes/Pipelining.md"), FileTimes::default());
        assert_eq!(meta.title, "Pipelining");
        assert!(meta.tags.is_empty());
        assert!(meta.created_date.is_none());
        assert!(meta.modified_date.is_none());
    }

    #[test]
    fn test_name_key_and_scalar_tag() {
        let content = "---\nName: 'Cache Design'\ntag: hardware\nauthor: someone\n---\ntext";
        let meta = extract_metadata(content, Path::new("c.md"), FileTimes::default());
        assert_eq!(meta.title, "Cache Design");
        assert_eq!(meta.tags, tags(&["hardware"]));
    }

    #[test]
    fn test_quoted_list_items_and_duplicates() {
        let content = "---\ntags: [\"cpu\", 'cpu', , memory]\n---\n#cpu and #memory again";
        let meta = extract_metadata(content, Path::new("d.md"), FileTimes::default());
        assert_eq!(meta.tags, tags(&["cpu", "memory"]));
    }

    #[test]
    fn test_inline_tags_unicode_hyphen_underscore() {
        let content = "Review #컴퓨터구조 and #cache-line plus #write_back. # Heading";
        let found: Vec<&str> = inline_tags(content).collect();
        assert_eq!(found, vec!["컴퓨터구조", "cache-line", "write_back"]);
    }

    #[test]
    fn test_unclosed_front_matter_is_body() {
        let content = "---\ntitle: Nope\nstill body";
        assert!(split_front_matter(content).is_none());
        let meta = extract_metadata(content, Path::new("u.md"), FileTimes::default());
        assert_eq!(meta.title, "u");
    }

    #[test]
    fn test_split_front_matter_bounds() {
        let content = "---\ntitle: A\n---\nfirst line\n";
        let front = split_front_matter(content).unwrap();
        assert_eq!(front.block, "title: A\n");
        assert_eq!(front.body, "first line\n");

        assert!(split_front_matter("no front matter\n---\n").is_none());
    }

    #[test]
    fn test_timestamps_are_rfc3339() {
        let times = FileTimes {
            created: Some(UNIX_EPOCH + Duration::from_secs(1_700_000_000)),
            modified: Some(UNIX_EPOCH),
        };
        let meta = extract_metadata("x", &PathBuf::from("t.md"), times);
        assert_eq!(meta.created_date.as_deref(), Some("2023-11-14T22:13:20Z"));
        assert_eq!(meta.modified_date.as_deref(), Some("1970-01-01T00:00:00Z"));
    }

    #[test]
    fn test_file_times_from_metadata() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("n.md");
        std::fs::write(&path, "x").unwrap();
        let times = FileTimes::from_metadata(&std::fs::metadata(&path).unwrap());
        assert!(times.modified.is_some());
    }
}
