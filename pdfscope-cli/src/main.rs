mod layout;

use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use crossterm::cursor;
use crossterm::event::{
    self, DisableFocusChange, DisableMouseCapture, EnableFocusChange, EnableMouseCapture,
};
use crossterm::style::{Attribute, Print, SetAttribute};
use crossterm::terminal::{self, Clear, ClearType};
use directories::ProjectDirs;
use pdfscope_core::config::CONFIG_FILE_NAME;
use pdfscope_core::{
    load_document, Command, DocumentProvider, LoadTicket, LoadedDocument, PageView, RenderImage,
    Session, SessionEvent, ViewError, ViewPhase, ViewerConfig,
};
use pdfscope_render::PdfiumRenderFactory;
use pdfscope_tty::{coalesce_pointer_moves, DrawParams, EventMapper, KittyRenderer, UiEvent};
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, EnvFilter};

use crate::layout::{Layout, Pane};

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const HELP_TEXT: &str = "n/p page | +/- zoom | arrows scroll | Tab view | c copy data | q quit";

type LoadResult = (LoadTicket, Result<LoadedDocument, ViewError>);

#[derive(Debug, Parser)]
#[command(
    name = "pdfscope",
    version,
    about = "Inspect PDF word boxes and coordinates in a kitty-compatible terminal"
)]
struct Args {
    /// Configuration file to use instead of the platform default
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// PDF files to view side by side
    files: Vec<PathBuf>,
}

struct RawModeGuard;

impl RawModeGuard {
    fn new() -> anyhow::Result<Self> {
        terminal::enable_raw_mode()?;
        let mut stdout = io::stdout();
        crossterm::execute!(stdout, cursor::Hide, EnableMouseCapture, EnableFocusChange)?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let mut stdout = io::stdout();
        let _ = crossterm::execute!(stdout, DisableFocusChange, DisableMouseCapture, cursor::Show);
        let _ = terminal::disable_raw_mode();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let project_dirs = ProjectDirs::from("net", "pdfscope", "pdfscope")
        .ok_or_else(|| anyhow!("unable to resolve platform data directories"))?;
    let _log_guard = init_logging(&project_dirs)?;
    let config = load_config(&args, &project_dirs)?;

    let provider = Arc::new(PdfiumRenderFactory::new(config.pdfium_library.as_deref())?);
    let mut session = Session::new(config);
    session.select(args.files);

    let (load_tx, mut load_rx) = mpsc::unbounded_channel::<LoadResult>();
    let _raw = RawModeGuard::new()?;
    let mut renderer = KittyRenderer::new(io::stdout());
    renderer.clear_all()?;

    let mut app = App::new();
    let result = app.run(
        &mut session,
        &mut renderer,
        &provider,
        &load_tx,
        &mut load_rx,
    );

    for index in 0..app.panes.len() {
        renderer.delete_image(image_id(index))?;
    }
    renderer.clear_all()?;
    session.close_all();
    result
}

fn load_config(args: &Args, project_dirs: &ProjectDirs) -> Result<ViewerConfig> {
    let config = match &args.config {
        Some(path) => ViewerConfig::load(path)
            .with_context(|| format!("failed to load configuration from {:?}", path))?,
        None => ViewerConfig::load_or_default(project_dirs.config_dir()).with_context(|| {
            format!(
                "failed to load {} from {:?}",
                CONFIG_FILE_NAME,
                project_dirs.config_dir()
            )
        })?,
    };
    info!(?config, "configuration loaded");
    Ok(config)
}

enum LoopAction {
    Continue,
    Redraw,
    Relayout,
    Quit,
}

struct Toast {
    message: String,
    expires: Instant,
}

struct App {
    layout: Option<Layout>,
    panes: Vec<Pane>,
    mapper: EventMapper,
    pointer: Option<usize>,
    toast: Option<Toast>,
    clipboard: Option<arboard::Clipboard>,
    dirty: bool,
}

impl App {
    fn new() -> Self {
        let clipboard = match arboard::Clipboard::new() {
            Ok(clipboard) => Some(clipboard),
            Err(err) => {
                warn!(?err, "clipboard unavailable");
                None
            }
        };
        Self {
            layout: None,
            panes: Vec::new(),
            mapper: EventMapper::new(),
            pointer: None,
            toast: None,
            clipboard,
            dirty: true,
        }
    }

    fn run(
        &mut self,
        session: &mut Session,
        renderer: &mut KittyRenderer<io::Stdout>,
        provider: &Arc<PdfiumRenderFactory>,
        load_tx: &UnboundedSender<LoadResult>,
        load_rx: &mut UnboundedReceiver<LoadResult>,
    ) -> Result<()> {
        let events = session.events();
        loop {
            if self.layout.is_none() {
                self.relayout(session, renderer)?;
            }
            spawn_loads(session, provider, load_tx);

            while let Ok((ticket, outcome)) = load_rx.try_recv() {
                session.complete_load(ticket, outcome);
            }

            let pending: Vec<SessionEvent> = events.lock().drain(..).collect();
            for event in pending {
                self.handle_session_event(event, session);
            }

            if self
                .toast
                .as_ref()
                .is_some_and(|toast| toast.expires <= Instant::now())
            {
                self.toast = None;
                self.dirty = true;
            }

            if self.dirty {
                self.redraw(session, renderer)?;
                self.dirty = false;
            }

            if !event::poll(POLL_INTERVAL)? {
                continue;
            }
            let pending_input = self.mapper.pending_input();
            let mut batch = vec![self.mapper.map_event(event::read()?)];
            while event::poll(Duration::ZERO)? {
                batch.push(self.mapper.map_event(event::read()?));
            }

            let focused = session.focused();
            for ui_event in coalesce_pointer_moves(batch) {
                match self.handle_event(ui_event, session)? {
                    LoopAction::Continue => {}
                    LoopAction::Redraw => self.dirty = true,
                    LoopAction::Relayout => self.layout = None,
                    LoopAction::Quit => return Ok(()),
                }
            }
            if session.focused() != focused || self.mapper.pending_input() != pending_input {
                self.dirty = true;
            }
        }
    }

    /// Measures the terminal and hands every view its pane. The first call is the
    /// layout-ready signal that releases deferred opens.
    fn relayout(
        &mut self,
        session: &mut Session,
        renderer: &mut KittyRenderer<io::Stdout>,
    ) -> Result<()> {
        let layout = match Layout::measure() {
            Ok(layout) => layout,
            Err(err) => {
                warn!(?err, "terminal size query failed; guessing cell size");
                let (columns, rows) = terminal::size()?;
                Layout::from_window(columns, rows, 0, 0)
            }
        };
        for index in 0..self.panes.len() {
            renderer.delete_image(image_id(index))?;
        }
        self.panes = layout.panes(session.views().len());
        for (index, pane) in self.panes.iter().enumerate() {
            session.set_layout(
                index,
                layout.container_width(pane),
                layout.pane_pixels(pane),
            );
        }
        info!(
            columns = layout.columns,
            rows = layout.rows,
            cell_width = layout.cell_width,
            cell_height = layout.cell_height,
            "layout ready"
        );
        self.layout = Some(layout);
        self.dirty = true;
        Ok(())
    }

    fn handle_event(&mut self, event: UiEvent, session: &mut Session) -> Result<LoopAction> {
        let Some(layout) = self.layout else {
            return Ok(LoopAction::Continue);
        };
        match event {
            UiEvent::Command(command) => {
                let redraw = matches!(command, Command::FocusNext);
                session.apply(command)?;
                Ok(if redraw {
                    LoopAction::Redraw
                } else {
                    LoopAction::Continue
                })
            }
            UiEvent::PointerMoved { column, row } => {
                let target = layout.locate(&self.panes, column, row);
                self.move_pointer(target.map(|(index, _)| index), session)?;
                if let Some((index, point)) = target {
                    session.apply_to(index, Command::Hover { point })?;
                }
                Ok(LoopAction::Continue)
            }
            UiEvent::PointerLeft => {
                self.move_pointer(None, session)?;
                Ok(LoopAction::Continue)
            }
            UiEvent::Clicked { column, row } => {
                if let Some((index, point)) = layout.locate(&self.panes, column, row) {
                    self.move_pointer(Some(index), session)?;
                    session.apply_to(index, Command::Hover { point })?;
                    session.apply_to(index, Command::Click)?;
                }
                Ok(LoopAction::Continue)
            }
            UiEvent::Zoom {
                column,
                row,
                zoom_in,
            } => {
                if let Some((index, _)) = layout.locate(&self.panes, column, row) {
                    let command = if zoom_in {
                        Command::ZoomIn
                    } else {
                        Command::ZoomOut
                    };
                    session.apply_to(index, command)?;
                }
                Ok(LoopAction::Continue)
            }
            UiEvent::Scroll {
                column,
                row,
                steps_x,
                steps_y,
            } => {
                if let Some((index, _)) = layout.locate(&self.panes, column, row) {
                    session.apply_to(index, Command::ScrollBy { steps_x, steps_y })?;
                }
                Ok(LoopAction::Continue)
            }
            UiEvent::Resize { .. } => Ok(LoopAction::Relayout),
            UiEvent::Quit => Ok(LoopAction::Quit),
            UiEvent::None => Ok(LoopAction::Continue),
        }
    }

    fn move_pointer(&mut self, target: Option<usize>, session: &mut Session) -> Result<()> {
        if let Some(previous) = self.pointer {
            if target != Some(previous) {
                session.apply_to(previous, Command::PointerLeft)?;
            }
        }
        self.pointer = target;
        Ok(())
    }

    fn handle_session_event(&mut self, event: SessionEvent, session: &Session) {
        match event {
            SessionEvent::RedrawNeeded(_)
            | SessionEvent::ViewOpened(_)
            | SessionEvent::ViewClosed(_) => self.dirty = true,
            SessionEvent::LoadFailed { view, message } => {
                warn!(%view, %message, "view failed");
                self.dirty = true;
            }
            SessionEvent::WordSelected {
                selection, payload, ..
            } => {
                info!(page = selection.page, text = %selection.word.text, "word selected");
                self.copy_to_clipboard(payload);
            }
            SessionEvent::DocumentExported {
                view,
                word_count,
                payload,
            } => {
                let path = session.view_by_id(view).map(|v| v.path().to_path_buf());
                info!(?path, word_count, "document words exported");
                self.copy_to_clipboard(payload);
            }
            SessionEvent::Notification { message, .. } => {
                let duration = Duration::from_millis(session.config().toast_millis);
                self.toast = Some(Toast {
                    message,
                    expires: Instant::now() + duration,
                });
                self.dirty = true;
            }
        }
    }

    fn copy_to_clipboard(&mut self, payload: String) {
        let Some(clipboard) = self.clipboard.as_mut() else {
            warn!("clipboard unavailable; payload dropped");
            return;
        };
        if let Err(err) = clipboard.set_text(payload) {
            warn!(?err, "failed to write clipboard");
        }
    }

    fn redraw(&self, session: &Session, renderer: &mut KittyRenderer<io::Stdout>) -> Result<()> {
        let Some(layout) = self.layout else {
            return Ok(());
        };
        renderer.begin_sync_update()?;
        {
            let mut writer = renderer.writer();
            crossterm::queue!(&mut writer, Clear(ClearType::All))?;
        }

        if let Some(placeholder) = session.placeholder() {
            let column = layout.columns.saturating_sub(placeholder.len() as u16) / 2;
            renderer.write_text(column, layout.rows / 2, placeholder)?;
        }

        let multiple = session.views().len() > 1;
        for (index, (view, pane)) in session.views().iter().zip(&self.panes).enumerate() {
            let focused = multiple && index == session.focused();
            draw_header(renderer, view, pane, focused)?;
            draw_view(renderer, &layout, view, pane, image_id(index))?;
        }

        let status = self.status_line();
        renderer.write_text(0, layout.status_row(), &truncate(&status, layout.columns))?;
        renderer.end_sync_update()?;
        Ok(())
    }

    fn status_line(&self) -> String {
        if let Some(toast) = &self.toast {
            return toast.message.clone();
        }
        match self.mapper.pending_input() {
            Some(pending) => format!("{HELP_TEXT} | {pending}"),
            None => HELP_TEXT.to_string(),
        }
    }
}

fn spawn_loads<P>(session: &mut Session, provider: &Arc<P>, load_tx: &UnboundedSender<LoadResult>)
where
    P: DocumentProvider + 'static,
{
    for request in session.take_load_requests() {
        let provider = Arc::clone(provider);
        let load_tx = load_tx.clone();
        let handle = Handle::current();
        // Backend calls are synchronous, keep them off the runtime workers.
        tokio::task::spawn_blocking(move || {
            let outcome = handle.block_on(load_document(
                provider.as_ref(),
                &request.path,
                request.base_scale,
            ));
            if let Err(err) = load_tx.send((request.ticket, outcome)) {
                if let (_, Ok(mut loaded)) = err.0 {
                    loaded.backend.close();
                }
            }
        });
    }
}

fn image_id(pane: usize) -> u32 {
    u32::try_from(pane).unwrap_or(u32::MAX - 1) + 1
}

fn draw_header(
    renderer: &mut KittyRenderer<io::Stdout>,
    view: &PageView,
    pane: &Pane,
    focused: bool,
) -> Result<()> {
    let mut header = match view.phase() {
        ViewPhase::Ready => format!(
            "{} | {} of {} | {:.0}%",
            view.title(),
            view.current_page_label(),
            view.page_count(),
            view.zoom() * 100.0
        ),
        ViewPhase::Loading => format!("{} | loading", view.title()),
        _ => view.title(),
    };
    header = truncate(&header, pane.columns);
    let mut writer = renderer.writer();
    crossterm::queue!(
        &mut writer,
        cursor::MoveTo(pane.column, pane.row.saturating_sub(1))
    )?;
    if focused {
        crossterm::queue!(
            &mut writer,
            SetAttribute(Attribute::Reverse),
            Print(header),
            SetAttribute(Attribute::Reset)
        )?;
    } else {
        crossterm::queue!(&mut writer, Print(header))?;
    }
    Ok(())
}

fn draw_view(
    renderer: &mut KittyRenderer<io::Stdout>,
    layout: &Layout,
    view: &PageView,
    pane: &Pane,
    image_id: u32,
) -> Result<()> {
    let frame = match view.phase() {
        ViewPhase::Ready => view.compose_frame(),
        _ => None,
    };
    let Some(frame) = frame else {
        renderer.delete_image(image_id)?;
        if let Some(message) = view.error_message() {
            for (offset, line) in wrap(&message, pane.columns).iter().enumerate() {
                let row = pane.row.saturating_add(offset as u16);
                if row >= pane.row + pane.rows {
                    break;
                }
                renderer.write_text(pane.column, row, line)?;
            }
        }
        return Ok(());
    };

    let (frame, params) = pad_to_cells(frame, layout);
    {
        let mut writer = renderer.writer();
        crossterm::queue!(&mut writer, cursor::MoveTo(pane.column, pane.row))?;
    }
    renderer.draw(&frame, params, image_id)?;

    let scroll = view.scroll_offset();
    if let Some(crosshair) = view.crosshair_overlay() {
        let anchor = crosshair.label.text_anchor.offset(-scroll.x, -scroll.y);
        let (column, row) = layout.cell_for(pane, anchor);
        let room = pane.column + pane.columns - column;
        renderer.write_text(column, row, &truncate(&crosshair.label.text, room))?;
    }
    if let Some(tooltip) = view.tooltip_content() {
        let (column, row) = layout.cell_for(pane, tooltip.anchor);
        let room = pane.column + pane.columns - column;
        for (offset, line) in tooltip.text.lines().enumerate() {
            let row = row.saturating_add(offset as u16);
            if row >= pane.row + pane.rows {
                break;
            }
            renderer.write_text(column, row, &truncate(line, room))?;
        }
    }
    Ok(())
}

/// Pads `frame` with transparent pixels to a whole number of cells so the terminal does not
/// stretch it.
fn pad_to_cells(frame: RenderImage, layout: &Layout) -> (RenderImage, DrawParams) {
    let (columns, rows) = layout.cells_for(frame.width, frame.height);
    let width = ((f64::from(columns) * layout.cell_width).round() as u32).max(frame.width);
    let height = ((f64::from(rows) * layout.cell_height).round() as u32).max(frame.height);
    let params = DrawParams::clamped(columns, rows);
    if width == frame.width && height == frame.height {
        return (frame, params);
    }

    let mut pixels = vec![0u8; width as usize * height as usize * 4];
    let source_stride = frame.width as usize * 4;
    let target_stride = width as usize * 4;
    for (row, chunk) in frame.pixels.chunks_exact(source_stride).enumerate() {
        let start = row * target_stride;
        pixels[start..start + source_stride].copy_from_slice(chunk);
    }
    (
        RenderImage {
            width,
            height,
            pixels,
        },
        params,
    )
}

fn truncate(text: &str, width: u16) -> String {
    text.chars().take(usize::from(width)).collect()
}

fn wrap(text: &str, width: u16) -> Vec<String> {
    let width = usize::from(width.max(1));
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(width)
        .map(|chunk| chunk.iter().collect())
        .collect()
}

fn init_logging(project_dirs: &ProjectDirs) -> Result<WorkerGuard> {
    let log_dir = project_dirs.data_local_dir().join("logs");
    fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::never(log_dir, "pdfscope.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .try_init()
        .map_err(|err| anyhow!(err))?;

    Ok(guard)
}
