use anyhow::Result;
use crossterm::terminal;
use pdfscope_core::DevicePoint;

const FALLBACK_CELL: (f64, f64) = (8.0, 16.0);
const CHROME_ROWS: u16 = 2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Layout {
    pub columns: u16,
    pub rows: u16,
    pub cell_width: f64,
    pub cell_height: f64,
    /// False when the terminal reported no pixel size and the cell size is a guess.
    pub pixels_known: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pane {
    pub column: u16,
    pub row: u16,
    pub columns: u16,
    pub rows: u16,
}

impl Layout {
    pub fn measure() -> Result<Self> {
        let window = terminal::window_size()?;
        Ok(Self::from_window(
            window.columns,
            window.rows,
            window.width,
            window.height,
        ))
    }

    pub fn from_window(columns: u16, rows: u16, pixel_width: u16, pixel_height: u16) -> Self {
        let columns = columns.max(1);
        let rows = rows.max(1);
        let pixels_known = pixel_width > 0 && pixel_height > 0;
        let (cell_width, cell_height) = if pixels_known {
            (
                f64::from(pixel_width) / f64::from(columns),
                f64::from(pixel_height) / f64::from(rows),
            )
        } else {
            FALLBACK_CELL
        };
        Self {
            columns,
            rows,
            cell_width,
            cell_height,
            pixels_known,
        }
    }

    pub fn status_row(&self) -> u16 {
        self.rows.saturating_sub(1)
    }

    pub fn panes(&self, count: usize) -> Vec<Pane> {
        let count = match u16::try_from(count) {
            Ok(0) | Err(_) => return Vec::new(),
            Ok(count) => count,
        };
        let gaps = count - 1;
        let width = (self.columns.saturating_sub(gaps) / count).max(1);
        let rows = self.rows.saturating_sub(CHROME_ROWS).max(1);
        (0..count)
            .map(|index| Pane {
                column: index.saturating_mul(width + 1),
                row: 1,
                columns: width,
                rows,
            })
            .collect()
    }

    pub fn pane_pixels(&self, pane: &Pane) -> (u32, u32) {
        (
            (f64::from(pane.columns) * self.cell_width).floor() as u32,
            (f64::from(pane.rows) * self.cell_height).floor() as u32,
        )
    }

    /// Width handed to auto-fit; unknown when cell pixels are guessed.
    pub fn container_width(&self, pane: &Pane) -> Option<f64> {
        self.pixels_known
            .then(|| f64::from(pane.columns) * self.cell_width)
    }

    /// Pane under the cell plus the cell center relative to the pane's top-left corner.
    pub fn locate(&self, panes: &[Pane], column: u16, row: u16) -> Option<(usize, DevicePoint)> {
        panes.iter().enumerate().find_map(|(index, pane)| {
            let inside = column >= pane.column
                && column < pane.column + pane.columns
                && row >= pane.row
                && row < pane.row + pane.rows;
            inside.then(|| {
                let x = (f64::from(column - pane.column) + 0.5) * self.cell_width;
                let y = (f64::from(row - pane.row) + 0.5) * self.cell_height;
                (index, DevicePoint::new(x, y))
            })
        })
    }

    pub fn cell_for(&self, pane: &Pane, point: DevicePoint) -> (u16, u16) {
        let column = (point.x / self.cell_width).floor().max(0.0) as u16;
        let row = (point.y / self.cell_height).floor().max(0.0) as u16;
        (
            pane.column + column.min(pane.columns.saturating_sub(1)),
            pane.row + row.min(pane.rows.saturating_sub(1)),
        )
    }

    pub fn cells_for(&self, width: u32, height: u32) -> (u32, u32) {
        (
            (f64::from(width) / self.cell_width).ceil().max(1.0) as u32,
            (f64::from(height) / self.cell_height).ceil().max(1.0) as u32,
        )
    }
}
