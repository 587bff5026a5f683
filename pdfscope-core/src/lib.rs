use std::path::{Path, PathBuf};

use anyhow::Result;
use uuid::Uuid;

pub mod config;
pub mod error;
pub mod geometry;
pub mod raster;
pub mod session;
pub mod surface;
pub mod view;

#[cfg(test)]
mod test_support;

pub use config::ViewerConfig;
pub use error::{ConfigError, ViewError};
pub use geometry::{
    to_device, to_page, DeviceLine, DevicePoint, DeviceRect, PageGeometry, PagePoint, PageSize,
    WordToken,
};
pub use session::{LoadRequest, Session, PLACEHOLDER_TEXT};
pub use surface::{Crosshair, CrosshairLabel};
pub use view::{
    load_document, load_page, DocumentWord, LoadTicket, LoadedDocument, PageData, PageView,
    Tooltip, ViewPhase, WordSelection,
};

pub type ViewId = Uuid;

#[derive(Debug, Clone)]
pub struct DocumentInfo {
    pub path: PathBuf,
    pub pages: Vec<PageSize>,
}

impl DocumentInfo {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderRequest {
    pub page_index: usize,
    pub scale: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// An open document. Each handle is owned by exactly one view.
pub trait DocumentBackend: Send + Sync {
    fn info(&self) -> &DocumentInfo;
    fn render_page(&self, request: RenderRequest) -> Result<RenderImage>;
    /// Words of one page in extraction order, in page space with a top-left origin.
    fn extract_words(&self, page_index: usize) -> Result<Vec<WordToken>>;
    /// Releases the underlying document. Must tolerate repeated calls.
    fn close(&mut self);
}

#[async_trait::async_trait]
pub trait DocumentProvider: Send + Sync {
    async fn open(&self, path: &Path) -> Result<Box<dyn DocumentBackend>>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Navigate { delta: isize },
    ZoomIn,
    ZoomOut,
    ResetZoom,
    ScrollBy { steps_x: i32, steps_y: i32 },
    Hover { point: DevicePoint },
    PointerLeft,
    Click,
    CopyDocumentWords,
    FocusNext,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    ViewOpened(ViewId),
    ViewClosed(ViewId),
    RedrawNeeded(ViewId),
    LoadFailed {
        view: ViewId,
        message: String,
    },
    WordSelected {
        view: ViewId,
        selection: WordSelection,
        payload: String,
    },
    DocumentExported {
        view: ViewId,
        word_count: usize,
        payload: String,
    },
    Notification {
        view: Option<ViewId>,
        message: String,
    },
}
