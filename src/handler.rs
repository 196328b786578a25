use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use crate::app::{App, InputMode};
use crate::tui::AppEvent;

const WHEEL_LINES: u16 = 3;

pub fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Resize => {}
        AppEvent::ConversationChanged(len) => {
            log::debug!("Conversation now has {} messages", len);
            app.on_conversation_changed();
        }
        AppEvent::Tick => app.tick_animation(),
    }
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    match key.code {
        KeyCode::PageUp => return app.page_up(),
        KeyCode::PageDown => return app.page_down(),
        _ => {}
    }

    match app.input_mode {
        InputMode::Normal => handle_normal_mode(app, key),
        InputMode::Editing => handle_editing_mode(app, key),
    }
}

fn handle_normal_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => app.should_quit = true,
        KeyCode::Char('i') | KeyCode::Enter | KeyCode::Tab => app.input_mode = InputMode::Editing,
        KeyCode::Char('j') | KeyCode::Down => app.scroll_down(1),
        KeyCode::Char('k') | KeyCode::Up => app.scroll_up(1),
        KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => app.page_down(),
        KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => app.page_up(),
        KeyCode::Char('g') => app.scroll_to_top(),
        KeyCode::Char('G') => app.scroll_down(u16::MAX),
        _ => {}
    }
}

fn handle_editing_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc | KeyCode::Tab => app.input_mode = InputMode::Normal,
        KeyCode::Enter => {
            // Submission is gated while a reply is pending
            if app.is_sending() {
                log::debug!("Submit ignored while a reply is pending");
            } else {
                app.submit();
            }
        }
        KeyCode::Backspace => app.backspace(),
        KeyCode::Delete => app.delete(),
        KeyCode::Left => app.cursor_left(),
        KeyCode::Right => app.cursor_right(),
        KeyCode::Home => app.cursor_home(),
        KeyCode::End => app.cursor_end(),
        KeyCode::Up => app.scroll_up(1),
        KeyCode::Down => app.scroll_down(1),
        KeyCode::Char(c) => app.insert_char(c),
        _ => {}
    }
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    match mouse.kind {
        MouseEventKind::ScrollDown => app.scroll_down(WHEEL_LINES),
        MouseEventKind::ScrollUp => app.scroll_up(WHEEL_LINES),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use norachat_core::{CompletionClient, Dispatcher, Persona, Provider};
    use std::sync::Arc;

    struct FailingClient;

    #[async_trait]
    impl CompletionClient for FailingClient {
        async fn complete(&self, _prompt: &str) -> anyhow::Result<String> {
            Err(anyhow!("network unreachable"))
        }
    }

    fn app() -> App {
        let dispatcher = Dispatcher::with_greeting(Arc::new(FailingClient), Persona::default());
        App::new(dispatcher, Provider::Gemini, "gemini-pro".to_string())
    }

    fn press(app: &mut App, code: KeyCode) {
        handle_event(app, AppEvent::Key(KeyEvent::new(code, KeyModifiers::NONE))).unwrap();
    }

    #[test]
    fn test_ctrl_c_quits_from_editing() {
        let mut app = app();
        let key = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        handle_event(&mut app, AppEvent::Key(key)).unwrap();
        assert!(app.should_quit);
    }

    #[test]
    fn test_typing_goes_to_input() {
        let mut app = app();
        for c in "hi q".chars() {
            press(&mut app, KeyCode::Char(c));
        }
        assert_eq!(app.input, "hi q");
        assert!(!app.should_quit);
    }

    #[test]
    fn test_mode_switching() {
        let mut app = app();
        press(&mut app, KeyCode::Esc);
        assert_eq!(app.input_mode, InputMode::Normal);
        press(&mut app, KeyCode::Char('i'));
        assert_eq!(app.input_mode, InputMode::Editing);
        press(&mut app, KeyCode::Esc);
        press(&mut app, KeyCode::Char('q'));
        assert!(app.should_quit);
    }

    #[tokio::test]
    async fn test_enter_submits_and_failure_stays_silent() {
        let mut app = app();
        for c in "fail case".chars() {
            press(&mut app, KeyCode::Char(c));
        }
        press(&mut app, KeyCode::Enter);
        assert!(app.input.is_empty());

        app.pending.take().unwrap().await.unwrap();
        let texts: Vec<String> = app.messages().into_iter().map(|m| m.text).collect();
        assert_eq!(texts.len(), 2);
        assert_eq!(texts[1], "fail case");
        assert!(!app.is_awaiting());
    }

    #[test]
    fn test_shift_g_jumps_to_bottom_after_scrolling_up() {
        let mut app = app();
        app.update_chat_layout(50, 10);
        press(&mut app, KeyCode::Esc);
        press(&mut app, KeyCode::Char('k'));
        press(&mut app, KeyCode::Char('k'));
        assert_eq!(app.scroll, 38);

        press(&mut app, KeyCode::Char('G'));
        assert_eq!(app.scroll, 40);
        assert!(app.pin_to_bottom);
    }

    #[tokio::test]
    async fn test_double_enter_sends_once() {
        let mut app = app();
        for c in "once".chars() {
            press(&mut app, KeyCode::Char(c));
        }
        press(&mut app, KeyCode::Enter);
        for c in "again".chars() {
            press(&mut app, KeyCode::Char(c));
        }
        press(&mut app, KeyCode::Enter);
        assert_eq!(app.input, "again");

        app.pending.take().unwrap().await.unwrap();
        let texts: Vec<String> = app.messages().into_iter().map(|m| m.text).collect();
        assert_eq!(texts.len(), 2);
        assert_eq!(texts[1], "once");
    }

    #[test]
    fn test_conversation_change_pins_scroll() {
        let mut app = app();
        app.update_chat_layout(40, 10);
        app.scroll_up(10);
        assert!(!app.pin_to_bottom);

        handle_event(&mut app, AppEvent::ConversationChanged(3)).unwrap();
        assert!(app.pin_to_bottom);
    }
}
