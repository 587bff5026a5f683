use std::convert::TryFrom;
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use pdfium_render::prelude::*;
use pdfscope_core::{
    DocumentBackend, DocumentInfo, DocumentProvider, PageSize, RenderImage, RenderRequest,
    WordToken,
};
use tracing::{debug, instrument, warn};

use crate::words::{group_words, CharBox};

/// Environment variable naming the pdfium shared library to bind.
pub const PDFIUM_LIBRARY_ENV: &str = "PDFSCOPE_PDFIUM_LIBRARY_PATH";

pub struct PdfiumRenderFactory {
    pdfium: Arc<Pdfium>,
}

impl PdfiumRenderFactory {
    /// Binds pdfium from `library` if given, then from [`PDFIUM_LIBRARY_ENV`], the working
    /// directory and finally the system library path.
    pub fn new(library: Option<&Path>) -> Result<Self> {
        let pdfium = match bind_pdfium_from_hint(library) {
            Some(pdfium) => pdfium,
            None => bind_pdfium_default()?,
        };
        Ok(Self {
            pdfium: Arc::new(pdfium),
        })
    }
}

#[async_trait]
impl DocumentProvider for PdfiumRenderFactory {
    async fn open(&self, path: &Path) -> Result<Box<dyn DocumentBackend>> {
        let absolute = path
            .canonicalize()
            .with_context(|| format!("failed to resolve path for {:?}", path))?;
        let document = PdfiumDocument::open(Arc::clone(&self.pdfium), absolute)?;
        Ok(Box::new(document))
    }
}

struct PdfiumDocument {
    info: DocumentInfo,
    // Declared before `_pdfium` so the document is dropped first.
    document: Mutex<Option<PdfDocument<'static>>>,
    _pdfium: Arc<Pdfium>,
}

impl PdfiumDocument {
    fn open(pdfium: Arc<Pdfium>, path: PathBuf) -> Result<Self> {
        let document = pdfium
            .load_pdf_from_file(&path, None)
            .with_context(|| format!("failed to open {:?}", path))?;
        // SAFETY: the document borrows the bindings owned by `pdfium`. It lives in
        // `self.document`, which is declared before `self._pdfium` and therefore dropped first,
        // and `close` only ever drops it earlier.
        let document = unsafe { mem::transmute::<PdfDocument<'_>, PdfDocument<'static>>(document) };

        let pages = document
            .pages()
            .iter()
            .map(|page| PageSize {
                width: f64::from(page.width().value),
                height: f64::from(page.height().value),
            })
            .collect::<Vec<_>>();
        debug!(path = %path.display(), pages = pages.len(), "opened document");

        Ok(Self {
            info: DocumentInfo {
                path,
                pages,
            },
            document: Mutex::new(Some(document)),
            _pdfium: pdfium,
        })
    }

    fn with_page<R, F>(&self, page_index: usize, f: F) -> Result<R>
    where
        F: FnOnce(&PdfPage<'_>) -> Result<R>,
    {
        let guard = self.document.lock();
        let document = guard
            .as_ref()
            .ok_or_else(|| anyhow!("{} is closed", self.info.path.display()))?;
        let index: PdfPageIndex = page_index
            .try_into()
            .map_err(|_| anyhow!("page {} is out of supported range", page_index))?;
        let page = document
            .pages()
            .get(index)
            .with_context(|| format!("page {} out of range", page_index))?;
        f(&page)
    }
}

impl DocumentBackend for PdfiumDocument {
    fn info(&self) -> &DocumentInfo {
        &self.info
    }

    #[instrument(skip(self), fields(path = %self.info.path.display()))]
    fn render_page(&self, request: RenderRequest) -> Result<RenderImage> {
        self.with_page(request.page_index, |page| {
            let config =
                PdfRenderConfig::new().scale_page_by_factor(request.scale.max(0.1) as f32);
            let bitmap = page
                .render_with_config(&config)
                .with_context(|| format!("failed to render page {}", request.page_index))?;
            let image = bitmap.as_image().to_rgba8();
            Ok(RenderImage {
                width: u32::try_from(bitmap.width()).unwrap_or_default(),
                height: u32::try_from(bitmap.height()).unwrap_or_default(),
                pixels: image.into_raw(),
            })
        })
    }

    fn extract_words(&self, page_index: usize) -> Result<Vec<WordToken>> {
        self.with_page(page_index, |page| {
            let page_height = f64::from(page.height().value);
            let text = page
                .text()
                .with_context(|| format!("failed to extract text for page {}", page_index))?;
            let mut chars = Vec::new();
            for ch in text.chars().iter() {
                let Some(unicode) = ch.unicode_char() else {
                    continue;
                };
                let bounds = match ch.loose_bounds() {
                    Ok(bounds) => bounds,
                    Err(err) => {
                        warn!(?err, page = page_index, "failed to resolve glyph bounds");
                        continue;
                    }
                };
                chars.push(CharBox::from_pdf_space(
                    unicode,
                    f64::from(bounds.left().value),
                    f64::from(bounds.bottom().value),
                    f64::from(bounds.right().value),
                    f64::from(bounds.top().value),
                    page_height,
                ));
            }
            Ok(group_words(&chars))
        })
    }

    fn close(&mut self) {
        if self.document.lock().take().is_some() {
            debug!(path = %self.info.path.display(), "closed document");
        }
    }
}

fn bind_pdfium_from_hint(library: Option<&Path>) -> Option<Pdfium> {
    let hint = library
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os(PDFIUM_LIBRARY_ENV).map(PathBuf::from))
        .filter(|path| !path.as_os_str().is_empty())?;
    match Pdfium::bind_to_library(&hint) {
        Ok(bindings) => Some(Pdfium::new(bindings)),
        Err(err) => {
            warn!(
                "failed to load Pdfium from configured path {}: {}",
                hint.display(),
                err
            );
            None
        }
    }
}

fn bind_pdfium_default() -> Result<Pdfium> {
    let mut errors = Vec::new();

    let cwd_path = Pdfium::pdfium_platform_library_name_at_path("./");

    match Pdfium::bind_to_library(&cwd_path) {
        Ok(bindings) => return Ok(Pdfium::new(bindings)),
        Err(err) => {
            errors.push(format!("{}: {}", cwd_path.display(), err));
        }
    }

    match Pdfium::bind_to_system_library() {
        Ok(bindings) => Ok(Pdfium::new(bindings)),
        Err(err) => {
            errors.push(format!("system: {err}"));
            Err(anyhow!(
                "failed to bind to a pdfium library; set {} or install it ({})",
                PDFIUM_LIBRARY_ENV,
                errors.join(", ")
            ))
        }
    }
}
