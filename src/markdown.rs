/// Markdown → ratatui lines for the transcript pane.
///
/// The transcript is re-rendered after every streamed chunk, so input is
/// frequently half-finished Markdown (an unclosed fence, a dangling `**`).
/// Anything the parser hands back that we don't style is emitted as plain
/// text rather than dropped.
use pulldown_cmark::{Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use ratatui::{
    style::{Color, Modifier, Style},
    text::{Line, Span},
};

// ── Palette ───────────────────────────────────────────────────────────────────

const TEXT: Color = Color::Rgb(210, 230, 255);
const HEADING: Color = Color::Rgb(0, 210, 210);
const CODE_FG: Color = Color::Rgb(255, 180, 120);
const CODE_BG: Color = Color::Rgb(24, 24, 36);
const QUOTE: Color = Color::Rgb(120, 120, 150);
const LINK: Color = Color::Rgb(110, 160, 255);
const DIM: Color = Color::DarkGray;

pub fn render(content: &str) -> Vec<Line<'static>> {
    let options = Options::ENABLE_TABLES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS;
    let mut r = Renderer::default();
    for event in Parser::new_ext(content, options) {
        r.event(event);
    }
    r.flush_line();
    // Trailing blank lines only push the last real line off screen
    while r.lines.last().is_some_and(|l| l.width() == 0) {
        r.lines.pop();
    }
    r.lines
}

#[derive(Default)]
struct Renderer {
    lines: Vec<Line<'static>>,
    spans: Vec<Span<'static>>,
    // Counters rather than flags so `# **bold** heading` unwinds correctly
    bold: usize,
    italic: usize,
    strike: usize,
    heading: Option<HeadingLevel>,
    quote_depth: usize,
    in_code_block: bool,
    list_stack: Vec<Option<u64>>,
    link_url: Option<String>,
}

impl Renderer {
    fn event(&mut self, event: Event) {
        match event {
            Event::Start(tag) => self.start(tag),
            Event::End(tag) => self.end(tag),
            Event::Text(text) => self.text(&text),
            Event::Code(code) => {
                let style = Style::default().fg(CODE_FG).bg(CODE_BG);
                self.spans.push(Span::styled(code.into_string(), style));
            }
            Event::SoftBreak => self.spans.push(Span::raw(" ")),
            Event::HardBreak => self.flush_line(),
            Event::Rule => {
                self.flush_line();
                self.lines.push(Line::styled("─".repeat(40), Style::default().fg(DIM)));
                self.blank();
            }
            Event::TaskListMarker(done) => {
                let mark = if done { "[x] " } else { "[ ] " };
                self.spans.push(Span::styled(mark, Style::default().fg(DIM)));
            }
            // Models often emit XML-ish tags; show them rather than swallow them
            Event::Html(html) | Event::InlineHtml(html) => self.text(&html),
            Event::InlineMath(s) | Event::DisplayMath(s) | Event::FootnoteReference(s) => {
                self.text(&s)
            }
        }
    }

    fn start(&mut self, tag: Tag) {
        match tag {
            Tag::Paragraph => {}
            Tag::Heading { level, .. } => {
                self.flush_line();
                self.heading = Some(level);
                self.bold += 1;
                let marks = "#".repeat(heading_rank(level));
                self.spans.push(Span::styled(format!("{marks} "), Style::default().fg(DIM)));
            }
            Tag::BlockQuote(_) => {
                self.flush_line();
                self.quote_depth += 1;
            }
            Tag::CodeBlock(_) => {
                self.flush_line();
                self.in_code_block = true;
            }
            Tag::List(start) => {
                self.flush_line();
                self.list_stack.push(start);
            }
            Tag::Item => {
                self.flush_line();
                let indent = "  ".repeat(self.list_stack.len().saturating_sub(1));
                let marker = match self.list_stack.last_mut() {
                    Some(Some(n)) => {
                        let m = format!("{indent}{n}. ");
                        *n += 1;
                        m
                    }
                    _ => format!("{indent}• "),
                };
                self.spans.push(Span::styled(marker, Style::default().fg(HEADING)));
            }
            Tag::Table(_) => self.flush_line(),
            Tag::Emphasis => self.italic += 1,
            Tag::Strong => self.bold += 1,
            Tag::Strikethrough => self.strike += 1,
            Tag::Link { dest_url, .. } => self.link_url = Some(dest_url.into_string()),
            _ => {}
        }
    }

    fn end(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Paragraph => {
                self.flush_line();
                if self.list_stack.is_empty() {
                    self.blank();
                }
            }
            TagEnd::Heading(_) => {
                self.bold = self.bold.saturating_sub(1);
                self.flush_line();
                self.heading = None;
                self.blank();
            }
            TagEnd::BlockQuote(_) => {
                self.flush_line();
                self.quote_depth = self.quote_depth.saturating_sub(1);
                if self.quote_depth == 0 {
                    self.blank();
                }
            }
            TagEnd::CodeBlock => {
                self.in_code_block = false;
                self.blank();
            }
            TagEnd::List(_) => {
                self.flush_line();
                self.list_stack.pop();
                if self.list_stack.is_empty() {
                    self.blank();
                }
            }
            TagEnd::Item | TagEnd::TableHead | TagEnd::TableRow => self.flush_line(),
            TagEnd::TableCell => self.spans.push(Span::styled(" │ ", Style::default().fg(DIM))),
            TagEnd::Table => self.blank(),
            TagEnd::Emphasis => self.italic = self.italic.saturating_sub(1),
            TagEnd::Strong => self.bold = self.bold.saturating_sub(1),
            TagEnd::Strikethrough => self.strike = self.strike.saturating_sub(1),
            TagEnd::Link => {
                if let Some(url) = self.link_url.take() {
                    self.spans.push(Span::styled(format!(" ({url})"), Style::default().fg(DIM)));
                }
            }
            _ => {}
        }
    }

    fn text(&mut self, text: &str) {
        if self.in_code_block {
            let style = Style::default().fg(CODE_FG).bg(CODE_BG);
            for line in text.lines() {
                self.lines.push(Line::from(vec![
                    Span::styled("  ", style),
                    Span::styled(line.to_string(), style),
                ]));
            }
            return;
        }
        let style = self.style();
        self.spans.push(Span::styled(text.to_string(), style));
    }

    fn style(&self) -> Style {
        let mut style = Style::default().fg(TEXT);
        if self.heading.is_some() {
            style = style.fg(HEADING);
        }
        if self.link_url.is_some() {
            style = style.fg(LINK).add_modifier(Modifier::UNDERLINED);
        }
        if self.quote_depth > 0 {
            style = style.fg(QUOTE);
        }
        if self.bold > 0 {
            style = style.add_modifier(Modifier::BOLD);
        }
        if self.italic > 0 || self.quote_depth > 0 {
            style = style.add_modifier(Modifier::ITALIC);
        }
        if self.strike > 0 {
            style = style.add_modifier(Modifier::CROSSED_OUT);
        }
        style
    }

    fn flush_line(&mut self) {
        if self.spans.is_empty() {
            return;
        }
        let mut spans = Vec::with_capacity(self.spans.len() + 1);
        if self.quote_depth > 0 {
            spans.push(Span::styled("│ ".repeat(self.quote_depth), Style::default().fg(QUOTE)));
        }
        spans.append(&mut self.spans);
        self.lines.push(Line::from(spans));
    }

    /// One blank separator line, never two in a row and never at the top.
    fn blank(&mut self) {
        if self.lines.last().is_some_and(|l| l.width() > 0) {
            self.lines.push(Line::default());
        }
    }
}

fn heading_rank(level: HeadingLevel) -> usize {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(lines: &[Line]) -> Vec<String> {
        lines
            .iter()
            .map(|l| l.spans.iter().map(|s| s.content.as_ref()).collect::<String>())
            .collect()
    }

    #[test]
    fn test_paragraphs_are_separated_once() {
        let out = plain(&render("first\n\nsecond\n\n\n\nthird"));
        assert_eq!(out, vec!["first", "", "second", "", "third"]);
    }

    #[test]
    fn test_transcript_labels_stay_on_their_own_lines() {
        let out = plain(&render("You ->\nhi\n\nGPT ->\nhello there\n\n"));
        assert_eq!(out, vec!["You -> hi", "", "GPT -> hello there"]);
    }

    #[test]
    fn test_heading_is_bold() {
        let lines = render("# Title\nbody");
        assert_eq!(plain(&lines)[0], "# Title");
        let title = lines[0].spans.iter().find(|s| s.content == "Title").unwrap();
        assert!(title.style.add_modifier.contains(Modifier::BOLD));
    }

    #[test]
    fn test_lists_nested_and_numbered() {
        let out = plain(&render("1. one\n2. two\n   - inner\n"));
        assert_eq!(out, vec!["1. one", "2. two", "  • inner"]);
    }

    #[test]
    fn test_code_block_lines_are_kept_verbatim() {
        let out = plain(&render("```rust\nfn main() {\n    let x = 1;\n}\n```\nafter"));
        assert_eq!(out, vec!["  fn main() {", "      let x = 1;", "  }", "", "after"]);
    }

    #[test]
    fn test_unclosed_fence_still_shows_content() {
        let out = plain(&render("look:\n\n```\npartial line"));
        assert!(out.iter().any(|l| l.contains("partial line")));
    }

    #[test]
    fn test_inline_styles() {
        let lines = render("a **b** *c* `d` ~~e~~");
        let spans = &lines[0].spans;
        let find = |t: &str| spans.iter().find(|s| s.content == t).unwrap().style;
        assert!(find("b").add_modifier.contains(Modifier::BOLD));
        assert!(find("c").add_modifier.contains(Modifier::ITALIC));
        assert_eq!(find("d").fg, Some(CODE_FG));
        assert!(find("e").add_modifier.contains(Modifier::CROSSED_OUT));
    }

    #[test]
    fn test_links_show_url() {
        let out = plain(&render("see [docs](https://example.com)"));
        assert_eq!(out, vec!["see docs (https://example.com)"]);
    }

    #[test]
    fn test_blockquote_prefix() {
        let out = plain(&render("> quoted"));
        assert_eq!(out, vec!["│ quoted"]);
    }

    #[test]
    fn test_html_is_not_swallowed() {
        let out = plain(&render("<think>hmm</think> ok"));
        assert!(out.concat().contains("<think>"));
    }

    #[test]
    fn test_table_cells_are_separated() {
        let out = plain(&render("| a | b |\n|---|---|\n| 1 | 2 |\n"));
        assert_eq!(out, vec!["a │ b │ ", "1 │ 2 │ "]);
    }

    #[test]
    fn test_empty_input() {
        assert!(render("").is_empty());
    }
}
