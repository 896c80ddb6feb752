/// Scroll state for the transcript pane.
///
/// The offset is always kept within `[0, total - height]`; callers never
/// clamp themselves.
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

/// Lines moved per mouse-wheel notch.
pub const WHEEL_DELTA: usize = 3;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Viewport {
    pub width: u16,
    pub height: u16,
    y_offset: usize,
    total_lines: usize,
}

impl Viewport {
    #[cfg(test)]
    pub fn new(width: u16, height: u16) -> Self {
        Self { width, height, ..Default::default() }
    }

    pub fn offset(&self) -> usize {
        self.y_offset
    }

    #[cfg(test)]
    pub fn total_lines(&self) -> usize {
        self.total_lines
    }

    pub fn resize(&mut self, width: u16, height: u16) {
        self.width = width;
        self.height = height;
        self.clamp();
    }

    pub fn set_content_lines(&mut self, total: usize) {
        self.total_lines = total;
        self.clamp();
    }

    /// `Paragraph::scroll` takes a u16 row, so offsets beyond it can't be drawn.
    fn max_offset(&self) -> usize {
        self.total_lines
            .saturating_sub(self.height as usize)
            .min(u16::MAX as usize)
    }

    fn clamp(&mut self) {
        self.y_offset = self.y_offset.min(self.max_offset());
    }

    #[cfg(test)]
    pub fn at_top(&self) -> bool {
        self.y_offset == 0
    }

    pub fn at_bottom(&self) -> bool {
        self.y_offset >= self.max_offset()
    }

    pub fn goto_top(&mut self) {
        self.y_offset = 0;
    }

    pub fn goto_bottom(&mut self) {
        self.y_offset = self.max_offset();
    }

    pub fn scroll_up(&mut self, n: usize) {
        self.y_offset = self.y_offset.saturating_sub(n);
    }

    pub fn scroll_down(&mut self, n: usize) {
        self.y_offset = self.y_offset.saturating_add(n).min(self.max_offset());
    }

    pub fn page_up(&mut self) {
        self.scroll_up((self.height as usize).max(1));
    }

    pub fn page_down(&mut self) {
        self.scroll_down((self.height as usize).max(1));
    }

    pub fn half_page_up(&mut self) {
        self.scroll_up((self.height as usize / 2).max(1));
    }

    pub fn half_page_down(&mut self) {
        self.scroll_down((self.height as usize / 2).max(1));
    }

    /// 1.0 when everything fits; otherwise how far through the scrollable range we are.
    pub fn scroll_percent(&self) -> f64 {
        let max = self.max_offset();
        if max == 0 {
            return 1.0;
        }
        (self.y_offset as f64 / max as f64).clamp(0.0, 1.0)
    }

    /// Pager-style navigation. Returns false for keys it doesn't know.
    pub fn handle_key(&mut self, key: KeyEvent) -> bool {
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            return false;
        }
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => self.scroll_up(1),
            KeyCode::Down | KeyCode::Char('j') => self.scroll_down(1),
            KeyCode::PageUp | KeyCode::Char('b') => self.page_up(),
            KeyCode::PageDown | KeyCode::Char('f') | KeyCode::Char(' ') => self.page_down(),
            KeyCode::Char('u') => self.half_page_up(),
            KeyCode::Char('d') => self.half_page_down(),
            KeyCode::Home | KeyCode::Char('g') => self.goto_top(),
            KeyCode::End | KeyCode::Char('G') => self.goto_bottom(),
            _ => return false,
        }
        true
    }
}
