use norachat_core::{ConversationStore, Dispatch, Dispatcher, Message, Provider};
use tokio::sync::watch;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

pub struct App {
    pub should_quit: bool,
    pub input_mode: InputMode,

    // Conversation
    pub dispatcher: Dispatcher,
    pub provider: Provider,
    pub model: String,
    pub pending: Option<JoinHandle<Dispatch>>,

    // Input box
    pub input: String,
    pub cursor: usize, // cursor position in input, in chars

    // Chat pane
    pub scroll: u16,
    pub pin_to_bottom: bool,
    pub chat_height: u16, // inner height of the chat pane, set by the renderer
    pub chat_lines: u16,  // wrapped line count of the last render

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation
}

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

impl App {
    pub fn new(dispatcher: Dispatcher, provider: Provider, model: String) -> Self {
        Self {
            should_quit: false,
            input_mode: InputMode::Editing,
            dispatcher,
            provider,
            model,
            pending: None,
            input: String::new(),
            cursor: 0,
            scroll: 0,
            pin_to_bottom: true,
            chat_height: 0,
            chat_lines: 0,
            animation_frame: 0,
        }
    }

    pub fn store(&self) -> &ConversationStore {
        self.dispatcher.store()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.store().messages()
    }

    pub fn is_awaiting(&self) -> bool {
        self.store().is_awaiting()
    }

    /// A request is outstanding, or spawned but not yet marked as awaiting
    pub fn is_sending(&self) -> bool {
        self.is_awaiting()
            || self
                .pending
                .as_ref()
                .is_some_and(|task| !task.is_finished())
    }

    pub fn conversation_updates(&self) -> watch::Receiver<usize> {
        self.store().subscribe()
    }

    /// Send the current input unless a reply is still outstanding.
    ///
    /// Returns whether a request was started. The input is kept when nothing
    /// was sent.
    pub fn submit(&mut self) -> bool {
        if self.input.is_empty() || self.is_sending() {
            return false;
        }

        let text = std::mem::take(&mut self.input);
        self.cursor = 0;
        self.pin_to_bottom = true;

        let dispatcher = self.dispatcher.clone();
        self.pending = Some(tokio::spawn(async move {
            let outcome = dispatcher.send_message(text.as_str()).await;
            log::debug!("Dispatch finished: {:?}", outcome);
            outcome
        }));
        true
    }

    /// Called whenever the conversation length changes
    pub fn on_conversation_changed(&mut self) {
        self.pin_to_bottom = true;
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.is_awaiting() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
        if self.pending.as_ref().is_some_and(|task| task.is_finished()) {
            self.pending = None;
        }
    }

    pub fn shutdown(&mut self) {
        if let Some(task) = self.pending.take() {
            task.abort();
        }
    }

    // Input editing
    pub fn insert_char(&mut self, c: char) {
        let byte_pos = char_to_byte_index(&self.input, self.cursor);
        self.input.insert(byte_pos, c);
        self.cursor += 1;
    }

    pub fn backspace(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
            let byte_pos = char_to_byte_index(&self.input, self.cursor);
            self.input.remove(byte_pos);
        }
    }

    pub fn delete(&mut self) {
        if self.cursor < self.input.chars().count() {
            let byte_pos = char_to_byte_index(&self.input, self.cursor);
            self.input.remove(byte_pos);
        }
    }

    pub fn cursor_left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn cursor_right(&mut self) {
        self.cursor = (self.cursor + 1).min(self.input.chars().count());
    }

    pub fn cursor_home(&mut self) {
        self.cursor = 0;
    }

    pub fn cursor_end(&mut self) {
        self.cursor = self.input.chars().count();
    }

    // Chat scrolling
    fn max_scroll(&self) -> u16 {
        self.chat_lines.saturating_sub(self.chat_height)
    }

    pub fn scroll_up(&mut self, lines: u16) {
        self.pin_to_bottom = false;
        self.scroll = self.scroll.min(self.max_scroll()).saturating_sub(lines);
    }

    pub fn scroll_down(&mut self, lines: u16) {
        self.scroll = self.scroll.saturating_add(lines).min(self.max_scroll());
        if self.scroll >= self.max_scroll() {
            self.pin_to_bottom = true;
        }
    }

    pub fn page_up(&mut self) {
        self.scroll_up((self.chat_height / 2).max(1));
    }

    pub fn page_down(&mut self) {
        self.scroll_down((self.chat_height / 2).max(1));
    }

    pub fn scroll_to_top(&mut self) {
        self.pin_to_bottom = false;
        self.scroll = 0;
    }

    /// Record the rendered chat size and follow the newest message if pinned
    pub fn update_chat_layout(&mut self, total_lines: u16, visible_height: u16) {
        self.chat_lines = total_lines;
        self.chat_height = visible_height;
        if self.pin_to_bottom {
            self.scroll = self.max_scroll();
        } else {
            self.scroll = self.scroll.min(self.max_scroll());
        }
    }
}
