use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::config::ViewerConfig;
use crate::error::ViewError;
use crate::geometry::{to_page, DevicePoint, DeviceRect, WordToken};
use crate::raster::{PageContent, RasterCache};
use crate::surface::{Crosshair, Surface};
use crate::{DocumentBackend, DocumentProvider, RenderImage, RenderRequest, ViewId};

pub const TOOLTIP_OFFSET: f64 = 10.0;

pub type WordSelectedCallback = Box<dyn FnMut(&WordSelection) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewPhase {
    Empty,
    Loading,
    Ready,
    Error,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WordSelection {
    pub page: usize,
    #[serde(flatten)]
    pub word: WordToken,
}

impl WordSelection {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentWord {
    pub page: usize,
    #[serde(flatten)]
    pub word: WordToken,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tooltip {
    pub text: String,
    pub anchor: DevicePoint,
}

impl Tooltip {
    pub fn for_word(word: &WordToken, pointer: DevicePoint) -> Self {
        Self {
            text: format!(
                "Text: {}\nx0: {:.2}, top: {:.2}\nx1: {:.2}, bottom: {:.2}",
                word.text, word.x0, word.top, word.x1, word.bottom
            ),
            anchor: pointer.offset(TOOLTIP_OFFSET, TOOLTIP_OFFSET),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadTicket {
    view: ViewId,
    generation: u64,
}

impl LoadTicket {
    pub fn view(&self) -> ViewId {
        self.view
    }
}

#[derive(Debug, Clone)]
pub struct PageData {
    pub index: usize,
    pub raster: RenderImage,
    pub words: Vec<WordToken>,
}

pub struct LoadedDocument {
    pub backend: Box<dyn DocumentBackend>,
    /// The first page may fail on its own; the document still stays open for retries.
    pub first_page: Result<PageData, ViewError>,
}

pub fn load_page(
    backend: &dyn DocumentBackend,
    index: usize,
    base_scale: f64,
) -> Result<PageData, ViewError> {
    let raster = backend
        .render_page(RenderRequest {
            page_index: index,
            scale: base_scale,
        })
        .map_err(|err| ViewError::render(index, &err))?;
    let words = backend
        .extract_words(index)
        .map_err(|err| ViewError::render(index, &err))?;
    Ok(PageData {
        index,
        raster,
        words,
    })
}

#[instrument(skip(provider))]
pub async fn load_document<P>(
    provider: &P,
    path: &Path,
    base_scale: f64,
) -> Result<LoadedDocument, ViewError>
where
    P: DocumentProvider + ?Sized,
{
    let backend = provider
        .open(path)
        .await
        .map_err(|err| ViewError::open(path, &err))?;
    let first_page = if backend.info().page_count() == 0 {
        Err(ViewError::Render {
            page: 0,
            message: "document has no pages".into(),
        })
    } else {
        load_page(backend.as_ref(), 0, base_scale)
    };
    Ok(LoadedDocument {
        backend,
        first_page,
    })
}

pub struct PageView {
    id: ViewId,
    path: PathBuf,
    config: ViewerConfig,
    phase: ViewPhase,
    document: Option<Box<dyn DocumentBackend>>,
    current_page: usize,
    zoom: f64,
    auto_fit_pending: bool,
    cache: RasterCache,
    surface: Surface,
    hovered: Option<WordToken>,
    tooltip: Option<Tooltip>,
    scroll: DevicePoint,
    viewport: (u32, u32),
    container_width: Option<f64>,
    layout_ready: bool,
    open_armed: bool,
    generation: u64,
    error: Option<ViewError>,
    on_word_selected: Option<WordSelectedCallback>,
}

impl PageView {
    pub fn new(path: PathBuf, config: ViewerConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            path,
            zoom: 1.0,
            config,
            phase: ViewPhase::Empty,
            document: None,
            current_page: 0,
            auto_fit_pending: true,
            cache: RasterCache::new(),
            surface: Surface::new(),
            hovered: None,
            tooltip: None,
            scroll: DevicePoint::default(),
            viewport: (0, 0),
            container_width: None,
            layout_ready: false,
            open_armed: true,
            generation: 0,
            error: None,
            on_word_selected: None,
        }
    }

    pub fn id(&self) -> ViewId {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn title(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    pub fn phase(&self) -> ViewPhase {
        self.phase
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    pub fn base_scale(&self) -> f64 {
        self.config.base_scale
    }

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    pub fn page_count(&self) -> usize {
        self.document
            .as_ref()
            .map(|doc| doc.info().page_count())
            .unwrap_or(0)
    }

    pub fn words(&self) -> &[WordToken] {
        self.cache.page().map(|page| page.words()).unwrap_or(&[])
    }

    pub fn hovered_word(&self) -> Option<&WordToken> {
        self.hovered.as_ref()
    }

    pub fn error(&self) -> Option<&ViewError> {
        self.error.as_ref()
    }

    pub fn scroll_offset(&self) -> DevicePoint {
        self.scroll
    }

    pub fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    pub fn on_word_selected(&mut self, callback: WordSelectedCallback) {
        self.on_word_selected = Some(callback);
    }

    pub fn set_layout(&mut self, container_width: Option<f64>, viewport: (u32, u32)) {
        self.container_width = container_width;
        self.viewport = viewport;
        self.layout_ready = true;
        self.clamp_scroll();
    }

    pub fn wants_open(&self) -> bool {
        self.open_armed && self.layout_ready && self.document.is_none()
    }

    pub fn take_deferred_open(&mut self) -> Option<LoadTicket> {
        if !self.wants_open() {
            return None;
        }
        self.open()
    }

    pub fn open(&mut self) -> Option<LoadTicket> {
        let reopenable = match self.phase {
            ViewPhase::Empty => true,
            ViewPhase::Error => self.document.is_none(),
            _ => false,
        };
        if !reopenable {
            return None;
        }
        self.open_armed = false;
        self.generation += 1;
        self.phase = ViewPhase::Loading;
        self.error = None;
        self.surface.clear();
        debug!(view = %self.id, path = ?self.path, "load started");
        Some(LoadTicket {
            view: self.id,
            generation: self.generation,
        })
    }

    #[instrument(skip(self, outcome), fields(view = %self.id))]
    pub fn complete_load(
        &mut self,
        ticket: LoadTicket,
        outcome: Result<LoadedDocument, ViewError>,
    ) -> bool {
        let current = ticket.view == self.id
            && ticket.generation == self.generation
            && self.phase == ViewPhase::Loading;
        if !current {
            if let Ok(mut loaded) = outcome {
                debug!("discarding stale load result");
                loaded.backend.close();
            }
            return false;
        }

        match outcome {
            Ok(loaded) => {
                self.document = Some(loaded.backend);
                self.current_page = 0;
                match loaded.first_page {
                    Ok(page) => self.install_page(page),
                    Err(err) => self.fail(err),
                }
            }
            Err(err) => self.fail(err),
        }
        true
    }

    /// Moves `delta` pages. Out-of-range targets are ignored. From `Error`, retries the
    /// target page, or re-arms the open when the document never opened.
    #[instrument(skip(self), fields(view = %self.id))]
    pub fn navigate(&mut self, delta: isize) -> bool {
        match self.phase {
            ViewPhase::Ready => {}
            ViewPhase::Error if self.document.is_some() => {}
            ViewPhase::Error => {
                self.open_armed = true;
                return false;
            }
            _ => return false,
        }

        let page_count = self.page_count();
        let target = self.current_page as isize + delta;
        if target < 0 || target as usize >= page_count {
            debug!(target, page_count, "navigation out of range ignored");
            return false;
        }
        let target = target as usize;

        let Some(document) = self.document.as_deref() else {
            return false;
        };
        match load_page(document, target, self.config.base_scale) {
            Ok(page) => self.install_page(page),
            Err(err) => {
                self.current_page = target;
                self.fail(err);
            }
        }
        true
    }

    pub fn zoom_by(&mut self, factor: f64) -> bool {
        if !(factor.is_finite() && factor > 0.0) {
            return false;
        }
        self.set_zoom(self.zoom * factor)
    }

    /// Sets the zoom, clamped to the configured bounds, and redraws from the cached raster.
    pub fn set_zoom(&mut self, zoom: f64) -> bool {
        if self.phase != ViewPhase::Ready || !(zoom.is_finite() && zoom > 0.0) {
            return false;
        }
        let zoom = match self.cache.raster_size() {
            Some((width, height)) => self.config.clamp_zoom_for(zoom, width, height),
            None => self.config.clamp_zoom(zoom),
        };
        if zoom == self.zoom {
            return false;
        }
        debug!(view = %self.id, from = self.zoom, to = zoom, "zoom changed");
        self.zoom = zoom;
        self.redraw();
        true
    }

    pub fn scroll_by(&mut self, dx: f64, dy: f64) -> bool {
        if self.phase != ViewPhase::Ready {
            return false;
        }
        let before = self.scroll;
        self.scroll = self.scroll.offset(dx, dy);
        self.clamp_scroll();
        self.scroll != before
    }

    pub fn hover(&mut self, pointer: DevicePoint) -> bool {
        if self.phase != ViewPhase::Ready {
            return false;
        }
        let (base_scale, zoom) = (self.config.base_scale, self.zoom);
        let content = pointer.offset(self.scroll.x, self.scroll.y);
        let page_point = to_page(content, base_scale, zoom);

        self.hovered = self.cache.page().and_then(|page| {
            page.word_index()
                .hit_test(page.words(), content, base_scale, zoom)
                .map(|idx| page.words()[idx].clone())
        });
        self.tooltip = self
            .hovered
            .as_ref()
            .map(|word| Tooltip::for_word(word, pointer));

        let crosshair = Crosshair::new(content, page_point, self.surface.extent(), self.scroll);
        self.surface.set_crosshair(Some(crosshair));
        true
    }

    pub fn pointer_left(&mut self) -> bool {
        let had_overlay = self.hovered.is_some() || self.surface.crosshair().is_some();
        self.hovered = None;
        self.tooltip = None;
        self.surface.set_crosshair(None);
        had_overlay
    }

    pub fn click(&mut self) -> Option<WordSelection> {
        if self.phase != ViewPhase::Ready {
            return None;
        }
        let selection = WordSelection {
            page: self.current_page + 1,
            word: self.hovered.clone()?,
        };
        if let Some(callback) = self.on_word_selected.as_mut() {
            callback(&selection);
        }
        Some(selection)
    }

    pub fn export_document_words(&self) -> Result<Vec<DocumentWord>, ViewError> {
        let Some(document) = self.document.as_deref() else {
            return Ok(Vec::new());
        };
        let mut all = Vec::new();
        for index in 0..document.info().page_count() {
            let words = document
                .extract_words(index)
                .map_err(|err| ViewError::render(index, &err))?;
            all.extend(words.into_iter().map(|word| DocumentWord {
                page: index + 1,
                word,
            }));
        }
        Ok(all)
    }

    pub fn close(&mut self) {
        if self.phase == ViewPhase::Closed {
            return;
        }
        if let Some(mut document) = self.document.take() {
            document.close();
        }
        self.cache.clear();
        self.surface.clear();
        self.hovered = None;
        self.tooltip = None;
        self.open_armed = false;
        self.generation += 1;
        self.phase = ViewPhase::Closed;
        debug!(view = %self.id, "view closed");
    }

    pub fn current_page_label(&self) -> String {
        format!("Page {}", self.current_page + 1)
    }

    pub fn presentation_bitmap(&self) -> Option<&RenderImage> {
        self.surface.bitmap()
    }

    pub fn overlay_rectangles(&self) -> &[DeviceRect] {
        self.surface.boxes()
    }

    pub fn crosshair_overlay(&self) -> Option<&Crosshair> {
        self.surface.crosshair()
    }

    pub fn tooltip_content(&self) -> Option<&Tooltip> {
        self.tooltip.as_ref()
    }

    pub fn error_message(&self) -> Option<String> {
        match self.phase {
            ViewPhase::Error => self.error.as_ref().map(|err| format!("Error: {err}")),
            _ => None,
        }
    }

    pub fn surface_generation(&self) -> u64 {
        self.surface.generation()
    }

    pub fn compose_frame(&self) -> Option<RenderImage> {
        let origin = (self.scroll.x.max(0.0) as u32, self.scroll.y.max(0.0) as u32);
        let (width, height) = self.viewport;
        if width == 0 || height == 0 {
            return None;
        }
        self.surface.compose_viewport(origin, width, height)
    }

    fn install_page(&mut self, page: PageData) {
        let index = page.index;
        let (raster_width, raster_height) = (page.raster.width, page.raster.height);
        self.cache.store(PageContent::new(
            index,
            page.raster,
            page.words,
            self.config.hit_grid_cell,
        ));
        self.current_page = index;
        self.hovered = None;
        self.tooltip = None;
        self.scroll = DevicePoint::default();
        self.error = None;
        if self.auto_fit_pending {
            let fit = self
                .config
                .fit_policy()
                .zoom_for_container(self.container_width, raster_width);
            self.zoom = fit;
            self.auto_fit_pending = false;
            debug!(view = %self.id, zoom = self.zoom, container = ?self.container_width, "auto-fit");
        }
        self.zoom = self
            .config
            .clamp_zoom_for(self.zoom, raster_width, raster_height);
        self.phase = ViewPhase::Ready;
        self.redraw();
    }

    fn redraw(&mut self) {
        let (base_scale, zoom) = (self.config.base_scale, self.zoom);
        let page_index = match self.cache.page() {
            Some(page) => page.page_index(),
            None => {
                self.surface.clear();
                return;
            }
        };
        let bitmap = match self.cache.presentation(zoom) {
            Ok(Some(bitmap)) => bitmap,
            Ok(None) => {
                self.surface.clear();
                return;
            }
            Err(err) => {
                self.fail(ViewError::render(page_index, &err));
                return;
            }
        };
        let boxes = self
            .words()
            .iter()
            .map(|word| word.device_rect(base_scale, zoom))
            .collect();
        self.surface.redraw(bitmap, boxes);
        self.clamp_scroll();
    }

    fn fail(&mut self, err: ViewError) {
        warn!(view = %self.id, path = ?self.path, error = %err, "view entered error state");
        self.cache.clear();
        self.surface.clear();
        self.hovered = None;
        self.tooltip = None;
        self.error = Some(err);
        self.phase = ViewPhase::Error;
    }

    fn clamp_scroll(&mut self) {
        let (extent_w, extent_h) = self.surface.extent();
        let max_x = f64::from(extent_w.saturating_sub(self.viewport.0));
        let max_y = f64::from(extent_h.saturating_sub(self.viewport.1));
        self.scroll.x = self.scroll.x.clamp(0.0, max_x);
        self.scroll.y = self.scroll.y.clamp(0.0, max_y);
    }
}

impl Drop for PageView {
    fn drop(&mut self) {
        self.close();
    }
}
