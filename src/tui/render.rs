/// Ratatui draw entry-point for askgpt.
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
};
use unicode_width::UnicodeWidthStr;

use super::input::{InputMode, PROMPT_COLOR};
use super::{AppState, FOOTER_HEIGHT, HEADER_HEIGHT, INPUT_HEIGHT};

pub const SPINNER_GLYPHS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

/// Rule colour of whichever bar belongs to the focused pane.
const ACTIVE_RULE: Color = Color::Rgb(0x71, 0xeb, 0x34);
const IDLE_RULE: Color = Color::Rgb(60, 60, 80);
const BAR_BG: Color = Color::Rgb(8, 8, 14);

pub fn draw(f: &mut Frame, state: &AppState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(HEADER_HEIGHT),
            Constraint::Min(0),
            Constraint::Length(FOOTER_HEIGHT),
            Constraint::Length(INPUT_HEIGHT),
        ])
        .split(f.area());

    draw_header(f, state, chunks[0]);
    draw_transcript(f, state, chunks[1]);
    draw_footer(f, state, chunks[2]);
    draw_input(f, state, chunks[3]);
}

/// `left` + a rule filling the gap + `right`, exactly `width` columns wide.
fn rule_line(left: Vec<Span<'static>>, right: Vec<Span<'static>>, rule: Style, width: u16) -> Line<'static> {
    let used: usize = left
        .iter()
        .chain(right.iter())
        .map(|s| s.content.width())
        .sum();
    let fill = (width as usize).saturating_sub(used);
    let mut spans = left;
    spans.push(Span::styled("─".repeat(fill), rule));
    spans.extend(right);
    Line::from(spans)
}

// ── Header ────────────────────────────────────────────────────────────────────

fn draw_header(f: &mut Frame, state: &AppState, area: Rect) {
    let rule = if state.input.focused() { IDLE_RULE } else { ACTIVE_RULE };
    let left = vec![
        Span::styled(" AskGPT ", Style::default().fg(Color::White).add_modifier(Modifier::BOLD)),
    ];
    let right = vec![
        Span::styled(format!(" {}", state.profile), Style::default().fg(Color::Cyan)),
        Span::styled(" · ", Style::default().fg(Color::DarkGray)),
        Span::styled(format!("{} ", state.model), Style::default().fg(Color::Rgb(100, 180, 220))),
    ];
    f.render_widget(
        Paragraph::new(rule_line(left, right, Style::default().fg(rule), area.width))
            .style(Style::default().bg(BAR_BG)),
        area,
    );
}

// ── Transcript ────────────────────────────────────────────────────────────────

fn draw_transcript(f: &mut Frame, state: &AppState, area: Rect) {
    // Wrap at word_wrap on wide terminals; the viewport already counted lines at this width
    let area = Rect { width: state.transcript_width().min(area.width), ..area };

    if state.rendered.is_empty() {
        let hint = Line::from(vec![
            Span::styled(" Type a question and press ", Style::default().fg(Color::DarkGray)),
            Span::styled("Enter", Style::default().fg(PROMPT_COLOR)),
            Span::styled(
                " · Ctrl+J/Ctrl+K switch to the transcript · Ctrl+C quits",
                Style::default().fg(Color::DarkGray),
            ),
        ]);
        f.render_widget(Paragraph::new(hint).wrap(Wrap { trim: false }), area);
        return;
    }

    let offset = u16::try_from(state.viewport.offset()).unwrap_or(u16::MAX);
    f.render_widget(
        Paragraph::new(state.rendered.clone())
            .wrap(Wrap { trim: false })
            .scroll((offset, 0)),
        area,
    );
}

// ── Footer ────────────────────────────────────────────────────────────────────

fn draw_footer(f: &mut Frame, state: &AppState, area: Rect) {
    let rule = if state.input.focused() { ACTIVE_RULE } else { IDLE_RULE };

    let left = if state.answering {
        let glyph = SPINNER_GLYPHS[(state.spinner_tick as usize) % SPINNER_GLYPHS.len()];
        let (label, color) = if state.cancelling() {
            ("Cancelling", Color::Yellow)
        } else {
            ("Answering", Color::Cyan)
        };
        vec![
            Span::styled(format!(" {glyph} "), Style::default().fg(color)),
            Span::styled(
                format!("{label} "),
                Style::default().fg(Color::Black).bg(color).add_modifier(Modifier::BOLD),
            ),
            Span::raw(" "),
        ]
    } else {
        let turns = match state.turns_completed {
            0 => String::new(),
            1 => " 1 turn ".to_string(),
            n => format!(" {n} turns "),
        };
        vec![Span::styled(turns, Style::default().fg(Color::DarkGray))]
    };

    let pct = state.viewport.scroll_percent() * 100.0;
    let right = vec![Span::styled(
        format!(" {pct:3.0}% "),
        Style::default().fg(if state.viewport.at_bottom() { Color::DarkGray } else { Color::White }),
    )];

    f.render_widget(
        Paragraph::new(rule_line(left, right, Style::default().fg(rule), area.width))
            .style(Style::default().bg(BAR_BG)),
        area,
    );
}

// ── Input ─────────────────────────────────────────────────────────────────────

fn draw_input(f: &mut Frame, state: &AppState, area: Rect) {
    let border = if state.input.focused() { PROMPT_COLOR } else { IDLE_RULE };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let prompt = state.input.prompt();
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(prompt.width() as u16), Constraint::Min(0)])
        .split(inner);

    let prompt_style = match state.input.mode() {
        InputMode::Insert => Style::default().fg(PROMPT_COLOR).add_modifier(Modifier::BOLD),
        InputMode::Normal => Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
    };
    f.render_widget(Paragraph::new(Span::styled(prompt, prompt_style)), cols[0]);
    f.render_widget(state.input.textarea(), cols[1]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigFile, ResolvedConfig};
    use ratatui::{Terminal, backend::TestBackend};

    fn screen(state: &AppState, width: u16, height: u16) -> Vec<String> {
        let mut terminal = Terminal::new(TestBackend::new(width, height)).unwrap();
        terminal.draw(|f| draw(f, state)).unwrap();
        let buf = terminal.backend().buffer().clone();
        (0..height)
            .map(|y| (0..width).map(|x| buf[(x, y)].symbol().to_string()).collect())
            .collect()
    }

    fn state(width: u16, height: u16) -> AppState {
        let resolved = ResolvedConfig::resolve(&ConfigFile::default(), None, None, None, None);
        let mut state = AppState::new(&resolved, false);
        state.resize(width, height);
        state
    }

    #[test]
    fn test_rule_line_fills_width() {
        let line = rule_line(
            vec![Span::raw("ab")],
            vec![Span::raw("cd")],
            Style::default(),
            10,
        );
        assert_eq!(line.width(), 10);
        // Never negative when the labels overflow
        let tight = rule_line(vec![Span::raw("abcdef")], vec![Span::raw("ghij")], Style::default(), 6);
        assert_eq!(tight.width(), 10);
    }

    #[test]
    fn test_empty_screen_layout() {
        let rows = screen(&state(60, 10), 60, 10);
        assert!(rows[0].starts_with(" AskGPT ─"));
        assert!(rows[0].trim_end().ends_with("deepseek-v3"));
        assert!(rows[1].contains("Type a question"));
        assert!(rows[8].contains("> "));
        assert!(rows[6].trim_end().ends_with("100%"));
    }

    #[test]
    fn test_answering_badge() {
        let mut s = state(60, 10);
        s.answering = true;
        let rows = screen(&s, 60, 10);
        assert!(rows[6].contains("Answering"));
    }

    #[test]
    fn test_transcript_is_drawn() {
        let mut s = state(60, 10);
        s.rendered = crate::markdown::render("You ->\nhello\n\nGPT ->\nworld");
        let rows = screen(&s, 60, 10);
        assert!(rows[1].starts_with("You -> hello"));
        assert!(rows[3].starts_with("GPT -> world"));
    }
}
