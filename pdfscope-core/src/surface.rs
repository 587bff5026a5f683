use crate::geometry::{DeviceLine, DevicePoint, DeviceRect, PagePoint};
use crate::raster::crop;
use crate::RenderImage;

const BOX_COLOR: [u8; 3] = [220, 30, 30];
const CROSSHAIR_COLOR: [u8; 3] = [30, 60, 220];
const LABEL_FILL: [u8; 3] = [255, 255, 255];
const LABEL_BORDER: [u8; 3] = [0, 0, 0];
const DASH_ON: i64 = 4;
const DASH_PERIOD: i64 = 8;

pub const LABEL_MARGIN: f64 = 5.0;
pub const LABEL_WIDTH: f64 = 120.0;
pub const LABEL_HEIGHT: f64 = 20.0;

#[derive(Debug, Clone, PartialEq)]
pub struct CrosshairLabel {
    pub text: String,
    pub rect: DeviceRect,
    pub text_anchor: DevicePoint,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Crosshair {
    pub position: DevicePoint,
    pub page_position: PagePoint,
    pub vertical: DeviceLine,
    pub horizontal: DeviceLine,
    pub label: CrosshairLabel,
}

impl Crosshair {
    pub fn new(
        position: DevicePoint,
        page_position: PagePoint,
        extent: (u32, u32),
        visible_origin: DevicePoint,
    ) -> Self {
        let (width, height) = (f64::from(extent.0), f64::from(extent.1));
        let left = visible_origin.x + LABEL_MARGIN;
        let top = visible_origin.y + LABEL_MARGIN;
        Self {
            position,
            page_position,
            vertical: DeviceLine {
                from: DevicePoint::new(position.x, 0.0),
                to: DevicePoint::new(position.x, height),
            },
            horizontal: DeviceLine {
                from: DevicePoint::new(0.0, position.y),
                to: DevicePoint::new(width, position.y),
            },
            label: CrosshairLabel {
                text: format!("X: {:.2}, Y: {:.2}", page_position.x, page_position.y),
                rect: DeviceRect::new(left, top, left + LABEL_WIDTH, top + LABEL_HEIGHT),
                text_anchor: DevicePoint::new(left + 5.0, top + LABEL_HEIGHT / 2.0),
            },
        }
    }
}

#[derive(Debug, Default)]
pub struct Surface {
    bitmap: Option<RenderImage>,
    boxes: Vec<DeviceRect>,
    crosshair: Option<Crosshair>,
    generation: u64,
}

impl Surface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.bitmap = None;
        self.boxes.clear();
        self.crosshair = None;
        self.generation += 1;
    }

    pub fn redraw(&mut self, bitmap: RenderImage, boxes: Vec<DeviceRect>) {
        self.clear();
        self.bitmap = Some(bitmap);
        self.boxes = boxes;
    }

    pub fn set_crosshair(&mut self, crosshair: Option<Crosshair>) {
        self.crosshair = crosshair;
    }

    pub fn bitmap(&self) -> Option<&RenderImage> {
        self.bitmap.as_ref()
    }

    pub fn boxes(&self) -> &[DeviceRect] {
        &self.boxes
    }

    pub fn crosshair(&self) -> Option<&Crosshair> {
        self.crosshair.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn extent(&self) -> (u32, u32) {
        self.bitmap
            .as_ref()
            .map(|image| (image.width, image.height))
            .unwrap_or((0, 0))
    }

    pub fn compose_viewport(
        &self,
        origin: (u32, u32),
        width: u32,
        height: u32,
    ) -> Option<RenderImage> {
        let bitmap = self.bitmap.as_ref()?;
        let mut frame = crop(bitmap, origin.0, origin.1, width, height);
        let (extent_w, extent_h) = self.extent();
        let shift_x = f64::from(origin.0.min(extent_w.saturating_sub(frame.width)));
        let shift_y = f64::from(origin.1.min(extent_h.saturating_sub(frame.height)));
        let local = |rect: &DeviceRect| {
            DeviceRect::new(
                rect.x0 - shift_x,
                rect.top - shift_y,
                rect.x1 - shift_x,
                rect.bottom - shift_y,
            )
        };

        for rect in &self.boxes {
            stroke_rect(&mut frame, local(rect), BOX_COLOR);
        }
        if let Some(crosshair) = &self.crosshair {
            let x = (crosshair.position.x - shift_x).round() as i64;
            let y = (crosshair.position.y - shift_y).round() as i64;
            dashed_vline(&mut frame, x, CROSSHAIR_COLOR);
            dashed_hline(&mut frame, y, CROSSHAIR_COLOR);
            let label = local(&crosshair.label.rect);
            fill_rect(&mut frame, label, LABEL_FILL);
            stroke_rect(&mut frame, label, LABEL_BORDER);
        }
        Some(frame)
    }
}

fn put_pixel(image: &mut RenderImage, x: i64, y: i64, color: [u8; 3]) {
    if x < 0 || y < 0 || x >= i64::from(image.width) || y >= i64::from(image.height) {
        return;
    }
    let offset = (y as usize * image.width as usize + x as usize) * 4;
    image.pixels[offset..offset + 3].copy_from_slice(&color);
    image.pixels[offset + 3] = 255;
}

fn stroke_rect(image: &mut RenderImage, rect: DeviceRect, color: [u8; 3]) {
    let (x0, x1) = (rect.x0.round() as i64, rect.x1.round() as i64);
    let (y0, y1) = (rect.top.round() as i64, rect.bottom.round() as i64);
    if x1 < 0 || y1 < 0 || x0 >= i64::from(image.width) || y0 >= i64::from(image.height) {
        return;
    }
    for x in x0.max(0)..=x1.min(i64::from(image.width) - 1) {
        put_pixel(image, x, y0, color);
        put_pixel(image, x, y1, color);
    }
    for y in y0.max(0)..=y1.min(i64::from(image.height) - 1) {
        put_pixel(image, x0, y, color);
        put_pixel(image, x1, y, color);
    }
}

fn fill_rect(image: &mut RenderImage, rect: DeviceRect, color: [u8; 3]) {
    let x_start = rect.x0.round().max(0.0) as i64;
    let x_end = (rect.x1.round() as i64).min(i64::from(image.width) - 1);
    let y_start = rect.top.round().max(0.0) as i64;
    let y_end = (rect.bottom.round() as i64).min(i64::from(image.height) - 1);
    for y in y_start..=y_end {
        for x in x_start..=x_end {
            put_pixel(image, x, y, color);
        }
    }
}

fn dashed_vline(image: &mut RenderImage, x: i64, color: [u8; 3]) {
    for y in 0..i64::from(image.height) {
        if y.rem_euclid(DASH_PERIOD) < DASH_ON {
            put_pixel(image, x, y, color);
        }
    }
}

fn dashed_hline(image: &mut RenderImage, y: i64, color: [u8; 3]) {
    for x in 0..i64::from(image.width) {
        if x.rem_euclid(DASH_PERIOD) < DASH_ON {
            put_pixel(image, x, y, color);
        }
    }
}
