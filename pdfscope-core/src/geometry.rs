use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PagePoint {
    pub x: f64,
    pub y: f64,
}

impl PagePoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DevicePoint {
    pub x: f64,
    pub y: f64,
}

impl DevicePoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: f64, dy: f64) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceRect {
    pub x0: f64,
    pub top: f64,
    pub x1: f64,
    pub bottom: f64,
}

impl DeviceRect {
    pub fn new(x0: f64, top: f64, x1: f64, bottom: f64) -> Self {
        Self {
            x0,
            top,
            x1,
            bottom,
        }
    }

    pub fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f64 {
        self.bottom - self.top
    }

    pub fn contains(&self, point: DevicePoint) -> bool {
        self.x0 <= point.x && point.x <= self.x1 && self.top <= point.y && point.y <= self.bottom
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceLine {
    pub from: DevicePoint,
    pub to: DevicePoint,
}

/// A unit of extracted text with its page-space bounding box.
///
/// Coordinates use a top-left origin: `top` and `bottom` are distances from the top edge
/// of the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordToken {
    pub text: String,
    pub x0: f64,
    pub top: f64,
    pub x1: f64,
    pub bottom: f64,
}

impl WordToken {
    pub fn new(text: impl Into<String>, x0: f64, top: f64, x1: f64, bottom: f64) -> Self {
        Self {
            text: text.into(),
            x0,
            top,
            x1,
            bottom,
        }
    }

    pub fn device_rect(&self, base_scale: f64, zoom: f64) -> DeviceRect {
        let top_left = to_device(PagePoint::new(self.x0, self.top), base_scale, zoom);
        let bottom_right = to_device(PagePoint::new(self.x1, self.bottom), base_scale, zoom);
        DeviceRect::new(top_left.x, top_left.y, bottom_right.x, bottom_right.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageGeometry {
    pub index: usize,
    pub words: Vec<WordToken>,
}

pub fn to_device(point: PagePoint, base_scale: f64, zoom: f64) -> DevicePoint {
    let scale = base_scale * zoom;
    DevicePoint::new(point.x * scale, point.y * scale)
}

pub fn to_page(point: DevicePoint, base_scale: f64, zoom: f64) -> PagePoint {
    let scale = base_scale * zoom;
    PagePoint::new(point.x / scale, point.y / scale)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitPolicy {
    pub allowance: f64,
    pub min_width: f64,
    pub fallback_zoom: f64,
}

impl FitPolicy {
    pub fn zoom_for_container(&self, container_width: Option<f64>, raster_width: u32) -> f64 {
        let available = container_width.map(|width| width - self.allowance);
        fit_zoom(available, raster_width, self.min_width, self.fallback_zoom)
    }
}

/// `available / raster_width`, falling back to `fallback` when `available` is missing,
/// not above `min_width`, or the raster is empty.
pub fn fit_zoom(available: Option<f64>, raster_width: u32, min_width: f64, fallback: f64) -> f64 {
    match available {
        Some(width) if width.is_finite() && width > min_width && raster_width > 0 => {
            width / f64::from(raster_width)
        }
        _ => fallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() <= 1e-9 * a.abs().max(b.abs()).max(1.0)
    }

    #[test]
    fn device_and_page_round_trip() {
        let base = 3.0;
        for zoom in [0.05, 0.3, 0.75, 1.0, 1.21, 4.0, 9.9] {
            for point in [
                PagePoint::new(0.0, 0.0),
                PagePoint::new(10.0, 20.0),
                PagePoint::new(612.0, 792.0),
                PagePoint::new(0.333, 123.456),
            ] {
                let back = to_page(to_device(point, base, zoom), base, zoom);
                assert!(approx(back.x, point.x), "x drifted at zoom {zoom}");
                assert!(approx(back.y, point.y), "y drifted at zoom {zoom}");
            }
        }
    }

    #[test]
    fn origin_stays_anchored_across_zoom() {
        for zoom in [0.5, 1.0, 2.0] {
            assert_eq!(
                to_device(PagePoint::default(), 3.0, zoom),
                DevicePoint::default()
            );
        }
    }

    #[test]
    fn fit_zoom_matches_available_width() {
        assert_eq!(fit_zoom(Some(450.0), 600, 100.0, 0.3), 0.75);
        assert_eq!((600.0 * fit_zoom(Some(450.0), 600, 100.0, 0.3)) as u32, 450);
    }

    #[test]
    fn fit_zoom_falls_back_before_layout() {
        assert_eq!(fit_zoom(None, 600, 100.0, 0.3), 0.3);
        assert_eq!(fit_zoom(Some(80.0), 600, 100.0, 0.3), 0.3);
        assert_eq!(fit_zoom(Some(450.0), 0, 100.0, 0.3), 0.3);
    }

    #[test]
    fn fit_policy_subtracts_allowance() {
        let policy = FitPolicy {
            allowance: 30.0,
            min_width: 100.0,
            fallback_zoom: 0.3,
        };
        assert_eq!(policy.zoom_for_container(Some(480.0), 600), 0.75);
        assert_eq!(policy.zoom_for_container(Some(120.0), 600), 0.3);
    }

    #[test]
    fn word_device_rect_scales_uniformly() {
        let word = WordToken::new("w", 10.0, 10.0, 50.0, 20.0);
        let rect = word.device_rect(3.0, 1.0);
        assert_eq!(rect, DeviceRect::new(30.0, 30.0, 150.0, 60.0));
        assert!(rect.contains(DevicePoint::new(150.0, 60.0)));
        assert!(!rect.contains(DevicePoint::new(150.5, 60.0)));
    }
}
