use super::metadata::split_front_matter;
use pulldown_cmark::{Event, Parser as CmarkParser, TagEnd};
use regex::Regex;
use std::sync::OnceLock;

/// Reduce a note to plain text ready for paragraph splitting.
///
/// Drops the front-matter block and markdown markup: link and image targets
/// go away while link text and image alt text stay, heading markers,
/// emphasis and code-span backticks are removed. Block boundaries become a
/// blank line and runs of blank lines collapse to one.
pub fn normalize_note(content: &str) -> String {
    let body = match split_front_matter(content) {
        Some(front) => front.body,
        None => content,
    };

    let mut out = String::with_capacity(body.len());

    for event in CmarkParser::new(body) {
        match event {
            Event::Text(text) | Event::Code(text) => out.push_str(&text),
            Event::Html(html) | Event::InlineHtml(html) => out.push_str(&html),
            Event::SoftBreak | Event::HardBreak => out.push('\n'),
            Event::Rule => end_block(&mut out),
            Event::End(TagEnd::Item) => out.push('\n'),
            Event::End(
                TagEnd::Paragraph
                | TagEnd::Heading(_)
                | TagEnd::CodeBlock
                | TagEnd::BlockQuote(_)
                | TagEnd::List(_)
                | TagEnd::HtmlBlock,
            ) => end_block(&mut out),
            _ => {}
        }
    }

    collapse_blank_lines(&out)
}

fn end_block(out: &mut String) {
    let trimmed = out.trim_end().len();
    out.truncate(trimmed);
    out.push_str("\n\n");
}

fn collapse_blank_lines(text: &str) -> String {
    static BLANK_RUN: OnceLock<Regex> = OnceLock::new();
    let re = BLANK_RUN.get_or_init(|| Regex::new(r"\n\s*\n").expect("Invalid blank-line pattern"));
    re.replace_all(text, "\n\n").trim().to_string()
}
