pub mod words;

#[cfg(feature = "pdf")]
mod pdfium;

#[cfg(feature = "pdf")]
pub use pdfium::{PdfiumRenderFactory, PDFIUM_LIBRARY_ENV};
pub use words::{group_words, CharBox};
