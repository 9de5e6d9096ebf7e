//! Full-screen ratatui frontend.

use std::io::{self, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use ratatui::{
    DefaultTerminal, Frame,
    crossterm::{
        event::{
            self, DisableFocusChange, EnableFocusChange, Event, KeyCode, KeyEvent, KeyEventKind,
            KeyModifiers,
        },
        execute,
    },
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Padding, Paragraph, Wrap},
};
use tracing::debug;

use crate::connection::Status;
use crate::input::KeyInput;
use crate::panel::{Frontend, PanelEvent, PanelHandle, PanelView};
use crate::transcript::Origin;

const CONNECTED: Color = Color::Green;
const DISCONNECTED: Color = Color::Rgb(255, 165, 0);

/// Owns the terminal for the lifetime of the panel. Dropping it stops the
/// input thread and restores the terminal.
pub struct TerminalFrontend {
    terminal: DefaultTerminal,
    shutdown: Arc<AtomicBool>,
    input_thread: Option<JoinHandle<()>>,
}

impl TerminalFrontend {
    pub fn start(handle: PanelHandle) -> io::Result<Self> {
        let terminal = ratatui::init();
        if let Err(e) = execute!(io::stdout(), EnableFocusChange) {
            ratatui::restore();
            return Err(e);
        }

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let input_thread = std::thread::spawn(move || input_loop(handle, shutdown_thread));

        Ok(Self {
            terminal,
            shutdown,
            input_thread: Some(input_thread),
        })
    }
}

impl Frontend for TerminalFrontend {
    fn draw(&mut self, view: &PanelView<'_>) -> io::Result<()> {
        self.terminal.draw(|frame| draw_panel(frame, view))?;
        Ok(())
    }
}

impl Drop for TerminalFrontend {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(thread) = self.input_thread.take() {
            let _ = thread.join();
        }
        let mut stdout = io::stdout();
        let _ = execute!(stdout, DisableFocusChange);
        let _ = stdout.flush();
        ratatui::restore();
    }
}

/// Poll with a short timeout so the shutdown flag is noticed promptly.
fn input_loop(handle: PanelHandle, shutdown: Arc<AtomicBool>) {
    while !shutdown.load(Ordering::Relaxed) {
        match event::poll(Duration::from_millis(100)) {
            Ok(false) => continue,
            Ok(true) => {}
            Err(e) => {
                debug!(error = %e, "terminal event poll failed");
                handle.quit();
                break;
            }
        }
        let ev = match event::read() {
            Ok(ev) => ev,
            Err(e) => {
                debug!(error = %e, "terminal event read failed");
                handle.quit();
                break;
            }
        };
        if let Some(event) = map_event(ev) {
            if !handle.post(event) {
                break;
            }
        }
    }
}

pub fn map_event(ev: Event) -> Option<PanelEvent> {
    match ev {
        Event::Key(key) => map_key(key),
        Event::FocusGained => Some(PanelEvent::Focus),
        Event::Resize(..) => Some(PanelEvent::Redraw),
        _ => None,
    }
}

pub fn map_key(key: KeyEvent) -> Option<PanelEvent> {
    if key.kind != KeyEventKind::Press {
        return None;
    }
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    let input = match key.code {
        KeyCode::Esc => return Some(PanelEvent::Quit),
        KeyCode::Char('c') | KeyCode::Char('d') if ctrl => return Some(PanelEvent::Quit),
        KeyCode::Char(_) if ctrl => return None,
        KeyCode::Char(c) => KeyInput::Char(c),
        KeyCode::Enter => KeyInput::Enter,
        KeyCode::Backspace => KeyInput::Backspace,
        KeyCode::Delete => KeyInput::Delete,
        KeyCode::Left => KeyInput::Left,
        KeyCode::Right => KeyInput::Right,
        KeyCode::Home => KeyInput::Home,
        KeyCode::End => KeyInput::End,
        _ => return None,
    };
    Some(PanelEvent::Key(input))
}

pub fn draw_panel(frame: &mut Frame, view: &PanelView<'_>) {
    let [output_area, input_area] =
        Layout::vertical([Constraint::Min(3), Constraint::Length(3)]).areas(frame.area());
    draw_output(frame, output_area, view);
    draw_input(frame, input_area, view);
}

fn draw_output(frame: &mut Frame, area: Rect, view: &PanelView<'_>) {
    let mut lines: Vec<Line<'static>> = Vec::new();
    for entry in view.transcript.entries() {
        if !lines.is_empty() {
            lines.push(Line::default());
        }
        match entry.origin {
            Origin::Inbound => lines.extend(entry.lines.iter().cloned()),
            Origin::Echo => {
                let marker = Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD);
                for (i, line) in entry.lines.iter().enumerate() {
                    let prefix = if i == 0 { "› " } else { "  " };
                    let mut spans = vec![Span::styled(prefix, marker)];
                    spans.extend(line.spans.iter().cloned());
                    lines.push(Line::from(spans));
                }
            }
        }
    }

    let block = Block::default()
        .title(" copilot ")
        .title(
            Line::styled(
                format!(" {} ", view.endpoint.url()),
                Style::default().add_modifier(Modifier::DIM),
            )
            .alignment(Alignment::Right),
        )
        .borders(Borders::ALL)
        .padding(Padding::horizontal(1));
    let inner = block.inner(area);

    // Pin the newest output to the bottom. Measured before the block is
    // attached so the count is rows of text at the inner width.
    let output = Paragraph::new(lines).wrap(Wrap { trim: false });
    let content_height = u16::try_from(output.line_count(inner.width)).unwrap_or(u16::MAX);
    let scroll = content_height.saturating_sub(inner.height);
    frame.render_widget(output.block(block).scroll((scroll, 0)), area);
}

fn draw_input(frame: &mut Frame, area: Rect, view: &PanelView<'_>) {
    let (dot_color, label) = match view.status {
        Status::Connected => (CONNECTED, "connected"),
        Status::Connecting => (DISCONNECTED, "connecting"),
        Status::Disconnected => (DISCONNECTED, "disconnected"),
    };
    let block = Block::default()
        .title(Line::from(vec![
            Span::raw(" "),
            Span::styled("●", Style::default().fg(dot_color)),
            Span::raw(format!(" {label} ")),
        ]))
        .title_bottom(Line::styled(
            " enter send · esc quit ",
            Style::default().add_modifier(Modifier::DIM),
        ))
        .borders(Borders::ALL);
    let inner = block.inner(area);

    let input = view.input;
    let body = if input.is_enabled() {
        Line::raw(input.value().to_string())
    } else if input.value().is_empty() {
        Line::styled(
            "waiting for server…",
            Style::default().add_modifier(Modifier::DIM),
        )
    } else {
        Line::styled(
            input.value().to_string(),
            Style::default().add_modifier(Modifier::DIM),
        )
    };
    frame.render_widget(Paragraph::new(body).block(block), area);

    if input.is_enabled() && inner.width > 0 {
        let before = Span::raw(&input.value()[..input.cursor()]).width();
        let offset = u16::try_from(before).unwrap_or(u16::MAX);
        let x = inner.x.saturating_add(offset).min(inner.right().saturating_sub(1));
        frame.set_cursor_position((x, inner.y));
    }
}
