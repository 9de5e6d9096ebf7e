//! Single-line input field.
//!
//! Cursor positions are byte offsets into the buffer and always sit on a
//! char boundary.

/// Keys the field understands, independent of the terminal backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyInput {
    Char(char),
    Backspace,
    Delete,
    Left,
    Right,
    Home,
    End,
    Enter,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputAction {
    None,
    Edited,
    /// The accept key was pressed; carries the field value verbatim.
    Submit(String),
}

#[derive(Debug, Default)]
pub struct InputField {
    buffer: String,
    cursor: usize,
    enabled: bool,
}

impl InputField {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(&self) -> &str {
        &self.buffer
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
        self.cursor = 0;
    }

    pub fn handle_key(&mut self, key: KeyInput) -> InputAction {
        if !self.enabled {
            return InputAction::None;
        }
        match key {
            KeyInput::Enter => return InputAction::Submit(self.buffer.clone()),
            KeyInput::Char(c) => {
                if c.is_control() {
                    return InputAction::None;
                }
                self.buffer.insert(self.cursor, c);
                self.cursor += c.len_utf8();
            }
            KeyInput::Backspace => {
                if self.cursor == 0 {
                    return InputAction::None;
                }
                let prev = self.prev_boundary();
                self.buffer.remove(prev);
                self.cursor = prev;
            }
            KeyInput::Delete => {
                if self.cursor >= self.buffer.len() {
                    return InputAction::None;
                }
                self.buffer.remove(self.cursor);
            }
            KeyInput::Left => self.cursor = self.prev_boundary(),
            KeyInput::Right => self.cursor = self.next_boundary(),
            KeyInput::Home => self.cursor = 0,
            KeyInput::End => self.cursor = self.buffer.len(),
        }
        InputAction::Edited
    }

    fn prev_boundary(&self) -> usize {
        self.buffer[..self.cursor]
            .char_indices()
            .next_back()
            .map_or(0, |(i, _)| i)
    }

    fn next_boundary(&self) -> usize {
        self.buffer[self.cursor..]
            .chars()
            .next()
            .map_or(self.cursor, |c| self.cursor + c.len_utf8())
    }
}
