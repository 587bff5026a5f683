use anyhow::{anyhow, Result};
use image::imageops::{self, FilterType};
use image::RgbaImage;
use tracing::debug;

use crate::geometry::{PageGeometry, WordToken};
use crate::hit_test::WordIndex;
use crate::RenderImage;

#[derive(Debug, Clone)]
pub struct PageContent {
    pub geometry: PageGeometry,
    pub raster: RenderImage,
    index: WordIndex,
}

impl PageContent {
    pub fn new(
        index: usize,
        raster: RenderImage,
        words: Vec<WordToken>,
        cell_size: f64,
    ) -> Self {
        let word_index = WordIndex::build(&words, cell_size);
        Self {
            geometry: PageGeometry { index, words },
            raster,
            index: word_index,
        }
    }

    pub fn page_index(&self) -> usize {
        self.geometry.index
    }

    pub fn words(&self) -> &[WordToken] {
        &self.geometry.words
    }

    pub fn word_index(&self) -> &WordIndex {
        &self.index
    }
}

/// High-resolution raster of the current page. Zoom changes resample it; page changes
/// replace it.
#[derive(Default)]
pub struct RasterCache {
    page: Option<PageContent>,
}

impl RasterCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&mut self, content: PageContent) {
        self.page = Some(content);
    }

    pub fn clear(&mut self) {
        self.page = None;
    }

    pub fn page(&self) -> Option<&PageContent> {
        self.page.as_ref()
    }

    pub fn raster_size(&self) -> Option<(u32, u32)> {
        self.page
            .as_ref()
            .map(|page| (page.raster.width, page.raster.height))
    }

    /// Presentation bitmap at `zoom`, resampled from the cached raster. The caller owns the
    /// result; nothing is retained here.
    pub fn presentation(&self, zoom: f64) -> Result<Option<RenderImage>> {
        let Some(page) = self.page.as_ref() else {
            return Ok(None);
        };
        let image = resample(&page.raster, zoom)?;
        debug!(
            page = page.page_index(),
            zoom,
            width = image.width,
            height = image.height,
            "resampled presentation"
        );
        Ok(Some(image))
    }
}

pub fn presentation_size(width: u32, height: u32, zoom: f64) -> (u32, u32) {
    let scale = |value: u32| -> u32 {
        let scaled = (f64::from(value) * zoom).floor();
        if !scaled.is_finite() || scaled < 1.0 {
            1
        } else if scaled > f64::from(u32::MAX) {
            u32::MAX
        } else {
            scaled as u32
        }
    };
    (scale(width), scale(height))
}

pub fn resample(image: &RenderImage, zoom: f64) -> Result<RenderImage> {
    if image.width == 0 || image.height == 0 {
        return Err(anyhow!("cannot resample an empty raster"));
    }
    let (width, height) = presentation_size(image.width, image.height, zoom);
    if width == image.width && height == image.height {
        return Ok(image.clone());
    }
    let source = RgbaImage::from_raw(image.width, image.height, image.pixels.clone())
        .ok_or_else(|| {
            anyhow!(
                "raster buffer of {} bytes does not match {}x{} RGBA",
                image.pixels.len(),
                image.width,
                image.height
            )
        })?;
    let resized = imageops::resize(&source, width, height, FilterType::Lanczos3);
    Ok(RenderImage {
        width,
        height,
        pixels: resized.into_raw(),
    })
}

pub fn crop(
    image: &RenderImage,
    origin_x: u32,
    origin_y: u32,
    width: u32,
    height: u32,
) -> RenderImage {
    if image.width == 0 || image.height == 0 {
        return RenderImage {
            width: 0,
            height: 0,
            pixels: Vec::new(),
        };
    }

    let width = width.min(image.width).max(1);
    let height = height.min(image.height).max(1);
    let origin_x = origin_x.min(image.width - width);
    let origin_y = origin_y.min(image.height - height);

    let stride = image.width as usize * 4;
    let mut pixels = Vec::with_capacity(width as usize * height as usize * 4);
    for row in 0..height {
        let start = (origin_y + row) as usize * stride + origin_x as usize * 4;
        pixels.extend_from_slice(&image.pixels[start..start + width as usize * 4]);
    }

    RenderImage {
        width,
        height,
        pixels,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank(width: u32, height: u32) -> RenderImage {
        RenderImage {
            width,
            height,
            pixels: vec![255; width as usize * height as usize * 4],
        }
    }

    fn content(page: usize, width: u32) -> PageContent {
        PageContent::new(
            page,
            blank(width, width / 2),
            vec![WordToken::new(format!("p{page}"), 1.0, 1.0, 5.0, 5.0)],
            32.0,
        )
    }

    #[test]
    fn presentation_size_truncates() {
        assert_eq!(presentation_size(600, 800, 0.75), (450, 600));
        assert_eq!(presentation_size(601, 801, 0.5), (300, 400));
        assert_eq!(presentation_size(10, 10, 0.0001), (1, 1));
    }

    #[test]
    fn resample_produces_scaled_dimensions() {
        let image = resample(&blank(600, 200), 0.75).unwrap();
        assert_eq!((image.width, image.height), (450, 150));
        assert_eq!(image.pixels.len(), 450 * 150 * 4);
    }

    #[test]
    fn resample_rejects_mismatched_buffer() {
        let image = RenderImage {
            width: 4,
            height: 4,
            pixels: vec![0; 3],
        };
        assert!(resample(&image, 2.0).is_err());
    }

    #[test]
    fn zoom_change_reuses_raster() {
        let mut cache = RasterCache::new();
        assert!(cache.presentation(1.0).unwrap().is_none());
        cache.store(content(0, 600));
        let width = cache.presentation(0.5).unwrap().unwrap().width;
        assert_eq!(width, 300);
        let width = cache.presentation(1.0).unwrap().unwrap().width;
        assert_eq!(width, 600);
        assert_eq!(cache.raster_size(), Some((600, 300)));
    }

    #[test]
    fn page_change_replaces_raster_and_words() {
        let mut cache = RasterCache::new();
        cache.store(content(0, 600));
        cache.store(content(1, 400));
        assert_eq!(cache.raster_size(), Some((400, 200)));
        let page = cache.page().unwrap();
        assert_eq!(page.page_index(), 1);
        assert_eq!(page.words()[0].text, "p1");
        assert_eq!(page.raster.width, 400);
    }

    #[test]
    fn crop_clamps_to_image() {
        let mut image = blank(4, 4);
        image.pixels[(3 * 4 + 3) * 4] = 7;
        let cropped = crop(&image, 10, 10, 2, 2);
        assert_eq!((cropped.width, cropped.height), (2, 2));
        assert_eq!(cropped.pixels[3 * 4], 7);
    }
}
