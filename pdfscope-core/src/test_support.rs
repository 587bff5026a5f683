use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use parking_lot::Mutex;

use crate::{
    DocumentBackend, DocumentInfo, DocumentProvider, PageSize, RenderImage, RenderRequest,
    WordToken,
};

pub const PAGE_COUNT: usize = 3;
/// 200 page units wide, so the raster is 600 px at base scale 3.
pub const PAGE_SIZE: PageSize = PageSize {
    width: 200.0,
    height: 100.0,
};

#[derive(Debug, Default)]
pub struct Ledger {
    pub opened: Vec<PathBuf>,
    pub closed: Vec<PathBuf>,
    pub renders: Vec<(PathBuf, usize)>,
}

impl Ledger {
    pub fn open_handles(&self) -> Vec<PathBuf> {
        let mut open = self.opened.clone();
        for closed in &self.closed {
            if let Some(pos) = open.iter().position(|p| p == closed) {
                open.remove(pos);
            }
        }
        open
    }

    pub fn close_count(&self, path: &Path) -> usize {
        self.closed.iter().filter(|p| p.as_path() == path).count()
    }
}

pub fn page_words(page: usize) -> Vec<WordToken> {
    vec![
        WordToken::new(format!("p{page}-first"), 10.0, 10.0, 50.0, 20.0),
        WordToken::new(format!("p{page}-second"), 60.0, 10.0, 90.0, 20.0),
        WordToken::new(format!("p{page}-overlap"), 40.0, 15.0, 70.0, 30.0),
    ]
}

pub struct FakeBackend {
    info: DocumentInfo,
    ledger: Arc<Mutex<Ledger>>,
    failing_page: Option<usize>,
    closed: bool,
}

impl DocumentBackend for FakeBackend {
    fn info(&self) -> &DocumentInfo {
        &self.info
    }

    fn render_page(&self, request: RenderRequest) -> Result<RenderImage> {
        if self.failing_page == Some(request.page_index) {
            return Err(anyhow!("corrupt content stream"));
        }
        self.ledger
            .lock()
            .renders
            .push((self.info.path.clone(), request.page_index));
        let width = (PAGE_SIZE.width * request.scale) as u32;
        let height = (PAGE_SIZE.height * request.scale) as u32;
        let shade = 200 + request.page_index as u8;
        Ok(RenderImage {
            width,
            height,
            pixels: vec![shade; width as usize * height as usize * 4],
        })
    }

    fn extract_words(&self, page_index: usize) -> Result<Vec<WordToken>> {
        if page_index >= PAGE_COUNT {
            return Err(anyhow!("page {page_index} out of range"));
        }
        Ok(page_words(page_index))
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.ledger.lock().closed.push(self.info.path.clone());
        }
    }
}

/// Opens any path except ones whose file name starts with `broken`; pages named by
/// `failing_page` fail to rasterize in files whose name starts with `flaky`.
#[derive(Default, Clone)]
pub struct FakeProvider {
    pub ledger: Arc<Mutex<Ledger>>,
    pub failing_page: Option<usize>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failing_page(page: usize) -> Self {
        Self {
            failing_page: Some(page),
            ..Self::default()
        }
    }

    pub fn open_now(&self, path: &Path) -> Result<Box<dyn DocumentBackend>> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if name.starts_with("broken") {
            return Err(anyhow!("not a PDF file"));
        }
        self.ledger.lock().opened.push(path.to_path_buf());
        Ok(Box::new(FakeBackend {
            info: DocumentInfo {
                path: path.to_path_buf(),
                pages: vec![PAGE_SIZE; PAGE_COUNT],
            },
            ledger: Arc::clone(&self.ledger),
            failing_page: self.failing_page.filter(|_| name.starts_with("flaky")),
            closed: false,
        }))
    }
}

#[async_trait::async_trait]
impl DocumentProvider for FakeProvider {
    async fn open(&self, path: &Path) -> Result<Box<dyn DocumentBackend>> {
        self.open_now(path)
    }
}
