//! Row rendering: style spans + cursor position to HTML markup.
//!
//! Everything here is a pure function of its arguments so the screen model
//! can be exercised without a browser. Offsets are `char` offsets, matching
//! the server's view of the line.
//!
//! The prompt slice (`pre_offset..prompt_offset`) is inserted verbatim: the
//! server sends it pre-escaped (e.g. `"&gt; "`), and escaping it again would
//! corrupt the entities. All other text is escaped here.

use crate::protocol::RowSpan;

/// Class on the span wrapping the prompt slice of a command line.
pub const PROMPT_CLASS: &str = "cmd-prompt";
/// Class on the single-character span marking the cursor.
pub const CURSOR_CLASS: &str = "cursor";

/// Escape `&`, `<`, `>` for safe inclusion in markup text content.
#[must_use]
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            other => out.push(other),
        }
    }
    out
}

/// Escape a line that may begin with a prompt.
///
/// The `pre_offset..prompt_offset` slice becomes the styled prompt; the
/// remainder is escaped command text. With `prompt_offset == 0` the whole
/// line is escaped.
#[must_use]
pub fn escape_with_prompt(text: &str, pre_offset: usize, prompt_offset: usize) -> String {
    if prompt_offset == 0 {
        return escape(text);
    }
    let prompt: String = text
        .chars()
        .skip(pre_offset)
        .take(prompt_offset.saturating_sub(pre_offset))
        .collect();
    let rest: String = text.chars().skip(prompt_offset).collect();
    format!(
        "<span class=\"{PROMPT_CLASS}\">{prompt}</span>{}",
        escape(&rest)
    )
}

/// Markup for one styled span; unstyled spans stay bare escaped text.
#[must_use]
pub fn span_markup(styles: &[String], text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let escaped = escape(text);
    if styles.is_empty() {
        escaped
    } else {
        format!("<span class=\"{}\">{escaped}</span>", styles.join(" "))
    }
}

/// Markup for the cursor overlaying one character.
#[must_use]
pub fn cursor_markup(ch: char) -> String {
    format!("<span class=\"{CURSOR_CLASS}\">{}</span>", escape(&ch.to_string()))
}

/// Rendering of a command-line (prompt-bearing) row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptRowMarkup {
    pub markup: String,
    /// Cursor sat exactly at the end of the line (history recall arms only
    /// in this state).
    pub cursor_at_eol: bool,
    /// The typed command: everything after the prompt offset.
    pub command: String,
}

/// Render a prompt row. Styles are ignored: the prompt slice carries its own
/// markup and the typed remainder renders plain.
#[must_use]
pub fn render_prompt_row(
    spans: &[RowSpan],
    pre_offset: usize,
    prompt_offset: usize,
    cursor_x: Option<usize>,
) -> PromptRowMarkup {
    let line: String = spans.iter().map(|span| span.text.as_str()).collect();
    let len = line.chars().count();
    let command = line.chars().skip(prompt_offset).collect();

    let Some(cursor_x) = cursor_x else {
        return PromptRowMarkup {
            markup: escape_with_prompt(&line, pre_offset, prompt_offset),
            cursor_at_eol: false,
            command,
        };
    };

    let cursor_at_eol = cursor_x >= len;
    let cursor_char = if cursor_at_eol {
        ' '
    } else {
        line.chars().nth(cursor_x).unwrap_or(' ')
    };
    let before: String = line.chars().take(cursor_x).collect();
    let after: String = line.chars().skip(cursor_x + 1).collect();
    PromptRowMarkup {
        markup: format!(
            "{}{}{}",
            escape_with_prompt(&before, pre_offset, prompt_offset),
            cursor_markup(cursor_char),
            escape(&after)
        ),
        cursor_at_eol,
        command,
    }
}

/// Render a plain output row from its styled spans.
///
/// When the cursor falls inside a span, that span is split into
/// before/at/after pieces; past the end of all spans, the line is padded
/// with spaces up to the cursor column.
#[must_use]
pub fn render_plain_row(spans: &[RowSpan], cursor_x: Option<usize>) -> String {
    let mut markup = String::new();
    let mut row_offset = 0usize;

    for span in spans {
        let span_len = span.text.chars().count();
        let split = cursor_x
            .filter(|x| *x >= row_offset && *x < row_offset + span_len)
            .map(|x| x - row_offset);
        match split {
            Some(rel) => {
                let before: String = span.text.chars().take(rel).collect();
                let at = span.text.chars().nth(rel).unwrap_or(' ');
                let after: String = span.text.chars().skip(rel + 1).collect();
                markup.push_str(&span_markup(&span.styles, &before));
                markup.push_str(&cursor_markup(at));
                markup.push_str(&span_markup(&span.styles, &after));
            }
            None => markup.push_str(&span_markup(&span.styles, &span.text)),
        }
        row_offset += span_len;
    }

    if let Some(x) = cursor_x
        && x >= row_offset
    {
        for _ in row_offset..x {
            markup.push(' ');
        }
        markup.push_str(&cursor_markup(' '));
    }

    markup
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(styles: &[&str], text: &str) -> RowSpan {
        RowSpan::from((
            styles.iter().map(|s| (*s).to_string()).collect::<Vec<_>>(),
            text.to_string(),
        ))
    }

    #[test]
    fn escape_covers_markup_metacharacters() {
        assert_eq!(escape("a < b & c > d"), "a &lt; b &amp; c &gt; d");
        assert_eq!(escape("plain"), "plain");
    }

    #[test]
    fn prompt_slice_is_inserted_verbatim() {
        let markup = escape_with_prompt("&gt; ls <dir>", 0, 5);
        assert_eq!(
            markup,
            "<span class=\"cmd-prompt\">&gt; </span>ls &lt;dir&gt;"
        );
    }

    #[test]
    fn pre_offset_trims_the_prompt_head() {
        let markup = escape_with_prompt("__$ ls", 2, 4);
        assert_eq!(markup, "<span class=\"cmd-prompt\">$ </span>ls");
    }

    #[test]
    fn styled_span_wraps_with_classes() {
        assert_eq!(
            span_markup(&["bold".to_string(), "red".to_string()], "hi"),
            "<span class=\"bold red\">hi</span>"
        );
        assert_eq!(span_markup(&[], "hi"), "hi");
        assert_eq!(span_markup(&["bold".to_string()], ""), "");
    }

    #[test]
    fn prompt_row_cursor_mid_line_splits_text() {
        let spans = [span(&[], "bash$ ls -la")];
        let rendered = render_prompt_row(&spans, 0, 6, Some(7));
        assert!(!rendered.cursor_at_eol);
        assert_eq!(
            rendered.markup,
            "<span class=\"cmd-prompt\">bash$ </span>l<span class=\"cursor\">s</span> -la"
        );
        assert_eq!(rendered.command, "ls -la");
    }

    #[test]
    fn prompt_row_cursor_at_end_pads_one_space() {
        // 12 chars of text, cursor at column 12: trailing cursor, no text loss.
        let spans = [span(&[], "bash$ ls -la")];
        let rendered = render_prompt_row(&spans, 0, 5, Some(12));
        assert!(rendered.cursor_at_eol);
        assert_eq!(
            rendered.markup,
            "<span class=\"cmd-prompt\">bash$</span> ls -la<span class=\"cursor\"> </span>"
        );
    }

    #[test]
    fn prompt_row_without_cursor_is_plain() {
        let spans = [span(&[], "bash$ make")];
        let rendered = render_prompt_row(&spans, 0, 6, None);
        assert!(!rendered.cursor_at_eol);
        assert_eq!(rendered.markup, "<span class=\"cmd-prompt\">bash$ </span>make");
        assert_eq!(rendered.command, "make");
    }

    #[test]
    fn plain_row_cursor_splits_the_styled_span() {
        let spans = [span(&["dim"], "abc"), span(&["bold"], "def")];
        let markup = render_plain_row(&spans, Some(4));
        assert_eq!(
            markup,
            "<span class=\"dim\">abc</span><span class=\"bold\">d</span>\
             <span class=\"cursor\">e</span><span class=\"bold\">f</span>"
        );
    }

    #[test]
    fn plain_row_cursor_past_end_pads_spaces() {
        let spans = [span(&[], "ab")];
        let markup = render_plain_row(&spans, Some(5));
        assert_eq!(markup, "ab   <span class=\"cursor\"> </span>");
    }

    #[test]
    fn plain_row_without_cursor_concatenates_spans() {
        let spans = [span(&[], "a<b"), span(&["err"], "&c")];
        assert_eq!(
            render_plain_row(&spans, None),
            "a&lt;b<span class=\"err\">&amp;c</span>"
        );
    }
}
