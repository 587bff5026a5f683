use std::io::Write;

use anyhow::Result;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use crossterm::{
    cursor,
    event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseButton, MouseEventKind},
    style::Print,
    terminal::{Clear, ClearType},
};
use pdfscope_core::{Command, RenderImage};
use png::{BitDepth, ColorType, Encoder};
use tracing::trace;

/// Writes images over the kitty graphics protocol. Every view owns one image id so its
/// placement can be replaced or deleted independently of the others.
pub struct KittyRenderer<W: Write> {
    writer: W,
}

pub struct DrawParams {
    pub columns: u32,
    pub rows: u32,
}

impl DrawParams {
    pub fn clamped(columns: u32, rows: u32) -> Self {
        Self {
            columns: columns.max(1),
            rows: rows.max(1),
        }
    }
}

impl<W: Write> KittyRenderer<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn writer(&mut self) -> &mut W {
        &mut self.writer
    }

    /// Transmits `image` and places it at the cursor, scaled into `params` cells. A previous
    /// image with the same id is replaced.
    pub fn draw(&mut self, image: &RenderImage, params: DrawParams, image_id: u32) -> Result<()> {
        let mut buffer = Vec::new();
        let mut encoder = Encoder::new(&mut buffer, image.width, image.height);
        encoder.set_color(ColorType::Rgba);
        encoder.set_depth(BitDepth::Eight);
        let mut writer = encoder.write_header()?;
        writer.write_image_data(&image.pixels)?;
        writer.finish()?;

        let encoded = BASE64.encode(&buffer);
        trace!(image_id, bytes = encoded.len(), "transmitting image");
        let mut chunks = encoded.as_bytes().chunks(4096).peekable();
        let mut first = true;

        while let Some(chunk) = chunks.next() {
            let more = chunks.peek().is_some();
            if first {
                write!(
                    self.writer,
                    "\u{1b}_Ga=T,f=100,C=1,q=2,i={},p=1,c={},r={},s={},v={},z=-1,m={}",
                    image_id,
                    params.columns,
                    params.rows,
                    image.width,
                    image.height,
                    u8::from(more)
                )?;
                first = false;
            } else {
                write!(self.writer, "\u{1b}_Gm={},q=2", u8::from(more))?;
            }
            if !chunk.is_empty() {
                self.writer.write_all(b";")?;
                self.writer.write_all(chunk)?;
            }
            write!(self.writer, "\u{1b}\\")?;
        }

        self.writer.flush()?;
        Ok(())
    }

    pub fn delete_image(&mut self, image_id: u32) -> Result<()> {
        write!(self.writer, "\u{1b}_Ga=d,d=I,i={},q=2\u{1b}\\", image_id)?;
        Ok(())
    }

    pub fn write_text(&mut self, column: u16, row: u16, text: &str) -> Result<()> {
        for (offset, line) in text.lines().enumerate() {
            crossterm::queue!(
                &mut self.writer,
                cursor::MoveTo(column, row.saturating_add(offset as u16)),
                Print(line)
            )?;
        }
        Ok(())
    }

    pub fn begin_sync_update(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}[?2026h")?;
        Ok(())
    }

    pub fn end_sync_update(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}[?2026l")?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn clear_all(&mut self) -> Result<()> {
        crossterm::execute!(
            &mut self.writer,
            Clear(ClearType::All),
            cursor::MoveTo(0, 0)
        )?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    Command(Command),
    PointerMoved {
        column: u16,
        row: u16,
    },
    PointerLeft,
    Clicked {
        column: u16,
        row: u16,
    },
    Zoom {
        column: u16,
        row: u16,
        zoom_in: bool,
    },
    Scroll {
        column: u16,
        row: u16,
        steps_x: i32,
        steps_y: i32,
    },
    Resize {
        columns: u16,
        rows: u16,
    },
    Quit,
    None,
}

/// Maps crossterm events to [`UiEvent`]s. Digits typed before a navigation or scroll key
/// multiply it, so `3n` moves three pages forward.
#[derive(Debug, Default)]
pub struct EventMapper {
    pending_count: Option<usize>,
    pending_digits: String,
}

impl EventMapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn map_event(&mut self, event: Event) -> UiEvent {
        match event {
            Event::Key(key) => self.map_key(key),
            Event::Mouse(mouse) => {
                let (column, row) = (mouse.column, mouse.row);
                let zoom = mouse.modifiers.contains(KeyModifiers::CONTROL);
                let sideways = mouse.modifiers.contains(KeyModifiers::SHIFT);
                match mouse.kind {
                    MouseEventKind::Moved | MouseEventKind::Drag(MouseButton::Left) => {
                        UiEvent::PointerMoved { column, row }
                    }
                    MouseEventKind::Down(MouseButton::Left) => UiEvent::Clicked { column, row },
                    MouseEventKind::ScrollUp if zoom => UiEvent::Zoom {
                        column,
                        row,
                        zoom_in: true,
                    },
                    MouseEventKind::ScrollDown if zoom => UiEvent::Zoom {
                        column,
                        row,
                        zoom_in: false,
                    },
                    MouseEventKind::ScrollUp => wheel(column, row, sideways, -1),
                    MouseEventKind::ScrollDown => wheel(column, row, sideways, 1),
                    MouseEventKind::ScrollLeft => wheel(column, row, true, -1),
                    MouseEventKind::ScrollRight => wheel(column, row, true, 1),
                    _ => UiEvent::None,
                }
            }
            Event::Resize(columns, rows) => UiEvent::Resize { columns, rows },
            Event::FocusLost => UiEvent::PointerLeft,
            _ => UiEvent::None,
        }
    }

    fn map_key(&mut self, key: KeyEvent) -> UiEvent {
        if key.kind == KeyEventKind::Release {
            return UiEvent::None;
        }
        match (key.code, key.modifiers) {
            (KeyCode::Char('c'), modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
                self.reset_count();
                UiEvent::Quit
            }
            (KeyCode::Char(c), KeyModifiers::NONE) if c.is_ascii_digit() => {
                if let Some(digit) = c.to_digit(10) {
                    self.push_digit(digit as usize);
                }
                UiEvent::None
            }
            (KeyCode::PageDown, _) | (KeyCode::Char('n'), KeyModifiers::NONE) => {
                let count = self.take_count() as isize;
                UiEvent::Command(Command::Navigate { delta: count })
            }
            (KeyCode::PageUp, _) | (KeyCode::Char('p'), KeyModifiers::NONE) => {
                let count = self.take_count() as isize;
                UiEvent::Command(Command::Navigate { delta: -count })
            }
            (KeyCode::Char('r'), KeyModifiers::NONE) => {
                self.reset_count();
                UiEvent::Command(Command::Navigate { delta: 0 })
            }
            (KeyCode::Left, _) | (KeyCode::Char('h'), KeyModifiers::NONE) => self.scroll(-1, 0),
            (KeyCode::Right, _) | (KeyCode::Char('l'), KeyModifiers::NONE) => self.scroll(1, 0),
            (KeyCode::Up, _) | (KeyCode::Char('k'), KeyModifiers::NONE) => self.scroll(0, -1),
            (KeyCode::Down, _) | (KeyCode::Char('j'), KeyModifiers::NONE) => self.scroll(0, 1),
            (KeyCode::Char('+'), _) => {
                self.reset_count();
                UiEvent::Command(Command::ZoomIn)
            }
            (KeyCode::Char('-'), _) => {
                self.reset_count();
                UiEvent::Command(Command::ZoomOut)
            }
            (KeyCode::Char('='), _) => {
                self.reset_count();
                UiEvent::Command(Command::ResetZoom)
            }
            (KeyCode::Tab, _) => {
                self.reset_count();
                UiEvent::Command(Command::FocusNext)
            }
            (KeyCode::Char('c'), KeyModifiers::NONE) => {
                self.reset_count();
                UiEvent::Command(Command::CopyDocumentWords)
            }
            (KeyCode::Char('q'), _) => {
                self.reset_count();
                UiEvent::Quit
            }
            _ => {
                self.reset_count();
                UiEvent::None
            }
        }
    }

    fn push_digit(&mut self, digit: usize) {
        let current = self.pending_count.unwrap_or(0);
        let next = current.saturating_mul(10).saturating_add(digit);
        self.pending_count = Some(next);
        if let Some(c) = char::from_digit(digit as u32, 10) {
            self.pending_digits.push(c);
        }
    }

    fn take_count(&mut self) -> usize {
        let count = self
            .pending_count
            .take()
            .filter(|&count| count > 0)
            .unwrap_or(1);
        self.pending_digits.clear();
        count.min(isize::MAX as usize)
    }

    fn reset_count(&mut self) {
        self.pending_count = None;
        self.pending_digits.clear();
    }

    fn scroll(&mut self, steps_x: i32, steps_y: i32) -> UiEvent {
        let multiplier = i32::try_from(self.take_count()).unwrap_or(i32::MAX);
        UiEvent::Command(Command::ScrollBy {
            steps_x: steps_x.saturating_mul(multiplier),
            steps_y: steps_y.saturating_mul(multiplier),
        })
    }

    pub fn pending_input(&self) -> Option<String> {
        if self.pending_digits.is_empty() {
            None
        } else {
            Some(self.pending_digits.clone())
        }
    }
}

fn wheel(column: u16, row: u16, sideways: bool, step: i32) -> UiEvent {
    let (steps_x, steps_y) = if sideways { (step, 0) } else { (0, step) };
    UiEvent::Scroll {
        column,
        row,
        steps_x,
        steps_y,
    }
}

pub fn coalesce_pointer_moves(events: Vec<UiEvent>) -> Vec<UiEvent> {
    let mut out: Vec<UiEvent> = Vec::with_capacity(events.len());
    for event in events {
        if matches!(event, UiEvent::PointerMoved { .. })
            && matches!(out.last(), Some(UiEvent::PointerMoved { .. }))
        {
            out.pop();
        }
        out.push(event);
    }
    out
}
