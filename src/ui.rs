use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph, Wrap},
};
use crate::app::{App, InputMode};
use norachat_core::{Message, Sender};
use norachat_core::state::CODE_FENCE;

fn user_style() -> Style {
    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
}

fn assistant_style() -> Style {
    Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
}

fn code_style() -> Style {
    Style::default().fg(Color::Green)
}

/// Number of terminal rows `lines` occupy when word-wrapped to `width` columns.
///
/// Uses the same wrapping as the chat paragraph so the pinned view reaches
/// the real bottom.
fn wrapped_height(lines: &[Line<'_>], width: u16) -> u16 {
    let rows = Paragraph::new(Text::from(lines.to_vec()))
        .wrap(Wrap { trim: false })
        .line_count(width.max(1));
    rows.min(u16::MAX as usize) as u16
}

/// Inline markdown: `**bold**` and `` `code` `` spans
fn parse_markdown_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut chars = text.chars().peekable();
    let mut current_text = String::new();

    while let Some(c) = chars.next() {
        let closing = match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                "**"
            }
            '`' => "`",
            _ => {
                current_text.push(c);
                continue;
            }
        };

        // Collect until the matching delimiter
        let mut inner = String::new();
        let mut found_close = false;
        while let Some(c) = chars.next() {
            if closing == "`" && c == '`' {
                found_close = true;
                break;
            }
            if closing == "**" && c == '*' && chars.peek() == Some(&'*') {
                chars.next();
                found_close = true;
                break;
            }
            inner.push(c);
        }

        if found_close && !inner.is_empty() {
            if !current_text.is_empty() {
                spans.push(Span::raw(std::mem::take(&mut current_text)));
            }
            let style = if closing == "`" {
                code_style()
            } else {
                Style::default().add_modifier(Modifier::BOLD)
            };
            spans.push(Span::styled(inner, style));
        } else {
            // No closing delimiter, treat as literal
            current_text.push_str(closing);
            current_text.push_str(&inner);
            if found_close {
                current_text.push_str(closing);
            }
        }
    }

    if !current_text.is_empty() {
        spans.push(Span::raw(current_text));
    }

    if spans.is_empty() {
        Line::default()
    } else {
        Line::from(spans)
    }
}

/// Markdown mode: fenced blocks are shown verbatim in the code style
fn markdown_lines(text: &str) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    let mut in_code = false;

    for line in text.lines() {
        if line.trim_start().starts_with(CODE_FENCE) {
            in_code = !in_code;
            let lang = line.trim_start().trim_start_matches('`').trim();
            if in_code && !lang.is_empty() {
                lines.push(Line::from(Span::styled(
                    format!("┌ {}", lang),
                    Style::default().fg(Color::DarkGray),
                )));
            } else {
                lines.push(Line::from(Span::styled(
                    if in_code { "┌" } else { "└" },
                    Style::default().fg(Color::DarkGray),
                )));
            }
        } else if in_code {
            lines.push(Line::from(Span::styled(format!("│ {}", line), code_style())));
        } else {
            lines.push(parse_markdown_line(line));
        }
    }

    lines
}

/// One chat bubble: sender label, body, then the timestamp for plain messages
fn message_lines(msg: &Message, assistant_name: &str) -> Vec<Line<'static>> {
    let mut lines = Vec::new();

    let (label, style) = match msg.sender {
        Sender::User => ("You:".to_string(), user_style()),
        Sender::Assistant => (format!("{}:", assistant_name), assistant_style()),
    };
    lines.push(Line::from(Span::styled(label, style)));

    if msg.contains_code() {
        lines.extend(markdown_lines(&msg.text));
    } else {
        lines.extend(msg.text.lines().map(|l| Line::from(l.to_string())));
        lines.push(Line::from(Span::styled(
            msg.formatted_timestamp(),
            Style::default().fg(Color::DarkGray),
        )));
    }

    lines.push(Line::default());
    lines
}

fn chat_lines(
    messages: &[Message],
    assistant_name: &str,
    awaiting: bool,
    frame: u8,
) -> Vec<Line<'static>> {
    let mut lines: Vec<Line> = messages
        .iter()
        .flat_map(|msg| message_lines(msg, assistant_name))
        .collect();

    if awaiting {
        lines.push(Line::from(Span::styled(format!("{}:", assistant_name), assistant_style())));
        // Animated ellipsis: cycles through ".", "..", "..."
        let dots = ".".repeat((frame as usize) + 1);
        lines.push(Line::from(Span::styled(
            format!("Thinking{}", dots),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )));
    }

    lines
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, chat, input, footer
    let [header_area, chat_area, input_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(3),
        Constraint::Length(3),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);
    render_chat(app, frame, chat_area);
    render_input(app, frame, input_area);
    render_footer(app, frame, footer_area);
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let persona = app.dispatcher.persona();
    let title = Line::from(vec![
        Span::styled(
            format!(" {} Assistant ", persona.product),
            Style::default().fg(Color::Cyan).bold(),
        ),
        Span::styled(
            format!(" Powered by {} · {} ", app.provider.display_name(), app.model),
            Style::default().fg(Color::Gray),
        ),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    let border_color = if app.input_mode == InputMode::Normal {
        Color::Cyan
    } else {
        Color::DarkGray
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(format!(" Chat with {} ", app.dispatcher.persona().name));

    let messages = app.messages();
    let lines = chat_lines(
        &messages,
        &app.dispatcher.persona().name,
        app.is_awaiting(),
        app.animation_frame,
    );

    // Inner size minus borders
    let inner_width = area.width.saturating_sub(2);
    let inner_height = area.height.saturating_sub(2);
    app.update_chat_layout(wrapped_height(&lines, inner_width), inner_height);

    let chat = Paragraph::new(Text::from(lines))
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((app.scroll, 0));

    frame.render_widget(chat, area);
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let awaiting = app.is_sending();
    let border_color = if awaiting {
        Color::DarkGray
    } else if app.input_mode == InputMode::Editing {
        Color::Yellow
    } else {
        Color::Gray
    };
    let title = if awaiting { " Waiting for reply... " } else { " Message (Enter to send) " };

    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title);

    // Horizontal scroll keeps the cursor visible
    let inner_width = area.width.saturating_sub(2) as usize;
    let scroll_offset = if inner_width > 0 && app.cursor >= inner_width {
        app.cursor - inner_width + 1
    } else {
        0
    };

    let visible_text: String = app.input
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    let input = Paragraph::new(visible_text)
        .style(Style::default().fg(Color::Cyan))
        .block(input_block);

    frame.render_widget(input, area);

    if app.input_mode == InputMode::Editing {
        let cursor_x = (app.cursor - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let (mode_text, mode_style) = match app.input_mode {
        InputMode::Normal => (" NORMAL ", Style::default().bg(Color::Blue).fg(Color::White)),
        InputMode::Editing => (" INSERT ", Style::default().bg(Color::Yellow).fg(Color::Black)),
    };

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().fg(Color::White);

    let hints: &[(&str, &str)] = match app.input_mode {
        InputMode::Editing => &[
            ("Enter", "send"),
            ("Esc", "normal"),
            ("PgUp/PgDn", "scroll"),
            ("^C", "quit"),
        ],
        InputMode::Normal => &[
            ("i", "type"),
            ("j/k", "scroll"),
            ("g/G", "top/bottom"),
            ("q", "quit"),
        ],
    };

    let mut spans = vec![Span::styled(mode_text, mode_style), Span::raw(" ")];
    for (key, label) in hints {
        spans.push(Span::styled(format!(" {} ", key), key_style));
        spans.push(Span::styled(format!(" {} ", label), label_style));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}
