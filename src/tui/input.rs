/// Modal single-line input: a `TextArea` with vi-style insert/normal modes.
///
/// Insert mode forwards keys to the text field. Normal mode only understands
/// cursor-left, cursor-right and enter-insert; everything else is dropped.
/// `Esc` always lands in Normal mode.
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::style::{Color, Modifier, Style};
use tui_textarea::{CursorMove, TextArea};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Insert,
    Normal,
}

/// One key with its required modifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyBinding {
    pub code: KeyCode,
    pub modifiers: KeyModifiers,
}

impl KeyBinding {
    pub const fn plain(code: KeyCode) -> Self {
        Self { code, modifiers: KeyModifiers::NONE }
    }

    pub fn matches(&self, key: &KeyEvent) -> bool {
        // Shift is implied by the char itself for letters
        key.code == self.code && key.modifiers.difference(KeyModifiers::SHIFT) == self.modifiers
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyMap {
    pub left: KeyBinding,
    pub right: KeyBinding,
    pub escape: KeyBinding,
    pub insert: KeyBinding,
}

impl Default for KeyMap {
    fn default() -> Self {
        Self {
            left: KeyBinding::plain(KeyCode::Char('h')),
            right: KeyBinding::plain(KeyCode::Char('l')),
            escape: KeyBinding::plain(KeyCode::Esc),
            insert: KeyBinding::plain(KeyCode::Char('i')),
        }
    }
}

pub const INSERT_PROMPT: &str = "> ";
pub const NORMAL_PROMPT: &str = "< ";

pub const PROMPT_COLOR: Color = Color::Rgb(0x34, 0xeb, 0x8f);

pub struct ModalInput {
    textarea: TextArea<'static>,
    focused: bool,
    mode: InputMode,
    pub keymap: KeyMap,
}

impl Default for ModalInput {
    fn default() -> Self {
        Self::new()
    }
}

impl ModalInput {
    /// Starts focused, in Insert mode.
    pub fn new() -> Self {
        let mut input = Self {
            textarea: TextArea::default(),
            focused: true,
            mode: InputMode::Insert,
            keymap: KeyMap::default(),
        };
        input.restyle();
        input
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    pub fn focused(&self) -> bool {
        self.focused
    }

    pub fn focus(&mut self) {
        self.focused = true;
        self.restyle();
    }

    pub fn blur(&mut self) {
        self.focused = false;
        self.restyle();
    }

    pub fn prompt(&self) -> &'static str {
        match self.mode {
            InputMode::Insert => INSERT_PROMPT,
            InputMode::Normal => NORMAL_PROMPT,
        }
    }

    pub fn value(&self) -> String {
        self.textarea.lines().join("\n")
    }

    /// Cursor column in characters.
    #[cfg(test)]
    pub fn cursor(&self) -> usize {
        self.textarea.cursor().1
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.textarea.lines().iter().map(|l| l.chars().count()).sum()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clear the text; mode and focus are kept.
    pub fn reset(&mut self) {
        self.textarea = TextArea::default();
        self.restyle();
    }

    pub fn textarea(&self) -> &TextArea<'static> {
        &self.textarea
    }

    /// Route one key. Returns true if the key was consumed.
    pub fn handle_key(&mut self, key: KeyEvent) -> bool {
        if !self.focused || key.kind == KeyEventKind::Release {
            return false;
        }

        if self.keymap.escape.matches(&key) {
            self.enter_normal();
            return true;
        }

        match self.mode {
            InputMode::Normal => {
                if self.keymap.insert.matches(&key) {
                    self.enter_insert();
                } else if self.keymap.left.matches(&key) {
                    self.textarea.move_cursor(CursorMove::Back);
                } else if self.keymap.right.matches(&key) {
                    self.textarea.move_cursor(CursorMove::Forward);
                } else {
                    return false;
                }
                true
            }
            InputMode::Insert => {
                // Single line: Enter belongs to the caller, and the textarea
                // would otherwise split the line on Enter / Ctrl+M.
                if key.code == KeyCode::Enter
                    || (key.modifiers.contains(KeyModifiers::CONTROL)
                        && key.code == KeyCode::Char('m'))
                {
                    return false;
                }
                self.textarea.input(key);
                true
            }
        }
    }

    fn enter_normal(&mut self) {
        self.mode = InputMode::Normal;
        self.restyle();
    }

    fn enter_insert(&mut self) {
        self.mode = InputMode::Insert;
        self.restyle();
    }

    fn restyle(&mut self) {
        let cursor = match (self.focused, self.mode) {
            (false, _) => Style::default(),
            (true, InputMode::Insert) => Style::default().add_modifier(Modifier::REVERSED),
            (true, InputMode::Normal) => Style::default().fg(Color::Black).bg(PROMPT_COLOR),
        };
        self.textarea.set_cursor_style(cursor);
        self.textarea.set_cursor_line_style(Style::default());
        self.textarea.set_placeholder_text(match self.mode {
            InputMode::Insert => "ask something · Enter to send",
            InputMode::Normal => "normal mode · i to insert",
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE)
    }

    fn esc() -> KeyEvent {
        KeyEvent::new(KeyCode::Esc, KeyModifiers::NONE)
    }

    fn type_str(input: &mut ModalInput, s: &str) {
        for c in s.chars() {
            input.handle_key(key(c));
        }
    }

    #[test]
    fn test_starts_focused_in_insert() {
        let input = ModalInput::new();
        assert!(input.focused());
        assert_eq!(input.mode(), InputMode::Insert);
        assert_eq!(input.prompt(), INSERT_PROMPT);
        assert!(input.is_empty());
    }

    #[test]
    fn test_insert_mode_types_text() {
        let mut input = ModalInput::new();
        type_str(&mut input, "hello");
        assert_eq!(input.value(), "hello");
        assert_eq!(input.cursor(), 5);
    }

    #[test]
    fn test_escape_always_reaches_normal() {
        let mut input = ModalInput::new();
        input.handle_key(esc());
        assert_eq!(input.mode(), InputMode::Normal);
        // Already normal, stays normal
        input.handle_key(esc());
        assert_eq!(input.mode(), InputMode::Normal);
        input.handle_key(key('i'));
        input.handle_key(esc());
        assert_eq!(input.mode(), InputMode::Normal);
        assert_eq!(input.prompt(), NORMAL_PROMPT);
    }

    #[test]
    fn test_i_from_normal_enters_insert_without_typing() {
        let mut input = ModalInput::new();
        type_str(&mut input, "ab");
        input.handle_key(esc());
        input.handle_key(key('i'));
        assert_eq!(input.mode(), InputMode::Insert);
        assert_eq!(input.value(), "ab");

        // In insert mode 'i' is just a letter
        input.handle_key(key('i'));
        assert_eq!(input.mode(), InputMode::Insert);
        assert_eq!(input.value(), "abi");
    }

    #[test]
    fn test_other_keys_never_change_mode() {
        let mut input = ModalInput::new();
        for k in ['h', 'l', 'x', 'q', 'j'] {
            input.handle_key(key(k));
            assert_eq!(input.mode(), InputMode::Insert);
        }
        input.handle_key(esc());
        for k in ['h', 'l', 'x', 'q', 'a'] {
            input.handle_key(key(k));
            assert_eq!(input.mode(), InputMode::Normal);
        }
        input.handle_key(KeyEvent::new(KeyCode::Enter, KeyModifiers::NONE));
        assert_eq!(input.mode(), InputMode::Normal);
    }

    #[test]
    fn test_normal_mode_does_not_edit() {
        let mut input = ModalInput::new();
        type_str(&mut input, "abc");
        input.handle_key(esc());
        type_str(&mut input, "xqa");
        assert_eq!(input.value(), "abc");
    }

    #[test]
    fn test_normal_cursor_stays_in_bounds() {
        let mut input = ModalInput::new();
        type_str(&mut input, "abc");
        input.handle_key(esc());

        for _ in 0..10 {
            input.handle_key(key('h'));
            assert!(input.cursor() <= input.len());
        }
        assert_eq!(input.cursor(), 0);

        for _ in 0..10 {
            input.handle_key(key('l'));
            assert!(input.cursor() <= input.len());
        }
        assert_eq!(input.cursor(), 3);
    }

    #[test]
    fn test_cursor_moves_by_chars_not_bytes() {
        let mut input = ModalInput::new();
        type_str(&mut input, "héé");
        input.handle_key(esc());
        input.handle_key(key('h'));
        assert_eq!(input.cursor(), 2);
        input.handle_key(key('i'));
        input.handle_key(key('x'));
        assert_eq!(input.value(), "héxé");
    }

    #[test]
    fn test_enter_is_left_to_caller() {
        let mut input = ModalInput::new();
        type_str(&mut input, "q");
        assert!(!input.handle_key(KeyEvent::new(KeyCode::Enter, KeyModifiers::NONE)));
        assert!(!input.handle_key(KeyEvent::new(KeyCode::Char('m'), KeyModifiers::CONTROL)));
        assert_eq!(input.value(), "q");
    }

    #[test]
    fn test_blurred_input_ignores_keys() {
        let mut input = ModalInput::new();
        input.blur();
        assert!(!input.handle_key(key('a')));
        assert!(!input.handle_key(esc()));
        assert_eq!(input.mode(), InputMode::Insert);
        assert!(input.is_empty());

        input.focus();
        input.handle_key(key('a'));
        assert_eq!(input.value(), "a");
    }

    #[test]
    fn test_reset_clears_text_keeps_mode() {
        let mut input = ModalInput::new();
        type_str(&mut input, "question");
        input.handle_key(esc());
        input.reset();
        assert!(input.is_empty());
        assert_eq!(input.cursor(), 0);
        assert_eq!(input.mode(), InputMode::Normal);
    }

    #[test]
    fn test_custom_keymap() {
        let mut input = ModalInput::new();
        input.keymap.left = KeyBinding::plain(KeyCode::Left);
        type_str(&mut input, "ab");
        input.handle_key(esc());
        input.handle_key(key('h'));
        assert_eq!(input.cursor(), 2);
        input.handle_key(KeyEvent::new(KeyCode::Left, KeyModifiers::NONE));
        assert_eq!(input.cursor(), 1);
    }
}
