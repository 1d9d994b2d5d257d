//! Regular grid prediction targets
//!
//! A north-up affine grid description. Cell `(row, col)` spans
//! ```text
//! x ∈ [origin_x + col·cell_width,  origin_x + (col+1)·cell_width]
//! y ∈ [origin_y + (row+1)·cell_height, origin_y + row·cell_height]   (cell_height < 0)
//! ```

use geo::{Point, Polygon, Rect, coord};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    /// X coordinate of the upper-left corner
    pub origin_x: f64,
    /// Y coordinate of the upper-left corner
    pub origin_y: f64,
    pub cell_width: f64,
    /// Usually negative (rows run southwards)
    pub cell_height: f64,
    pub rows: usize,
    pub cols: usize,
}

impl GridSpec {
    pub fn new(origin_x: f64, origin_y: f64, cell_width: f64, cell_height: f64, rows: usize, cols: usize) -> Self {
        Self {
            origin_x,
            origin_y,
            cell_width,
            cell_height,
            rows,
            cols,
        }
    }

    /// Grid covering `(x_min, y_min)–(x_max, y_max)` with `rows × cols` cells.
    pub fn from_extent(x_min: f64, y_min: f64, x_max: f64, y_max: f64, rows: usize, cols: usize) -> Result<Self> {
        if rows == 0 || cols == 0 {
            return Err(Error::InvalidParameter {
                name: "grid shape",
                value: format!("{rows}x{cols}"),
                reason: "rows and cols must be positive".into(),
            });
        }
        if !(x_max > x_min && y_max > y_min) {
            return Err(Error::InvalidParameter {
                name: "grid extent",
                value: format!("({x_min}, {y_min}, {x_max}, {y_max})"),
                reason: "max must exceed min on both axes".into(),
            });
        }
        Ok(Self {
            origin_x: x_min,
            origin_y: y_max,
            cell_width: (x_max - x_min) / cols as f64,
            cell_height: -(y_max - y_min) / rows as f64,
            rows,
            cols,
        })
    }

    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Centre of cell `(row, col)`.
    pub fn cell_center(&self, row: usize, col: usize) -> Point<f64> {
        Point::new(
            self.origin_x + (col as f64 + 0.5) * self.cell_width,
            self.origin_y + (row as f64 + 0.5) * self.cell_height,
        )
    }

    /// Footprint of cell `(row, col)` as a polygon.
    pub fn cell_polygon(&self, row: usize, col: usize) -> Polygon<f64> {
        let x0 = self.origin_x + col as f64 * self.cell_width;
        let y0 = self.origin_y + row as f64 * self.cell_height;
        Rect::new(
            coord! { x: x0, y: y0 },
            coord! { x: x0 + self.cell_width, y: y0 + self.cell_height },
        )
        .to_polygon()
    }

    /// All cell centres in row-major order.
    pub fn centers(&self) -> Vec<Point<f64>> {
        (0..self.rows)
            .flat_map(|row| (0..self.cols).map(move |col| self.cell_center(row, col)))
            .collect()
    }

    /// All cell polygons in row-major order.
    pub fn cells(&self) -> Vec<Polygon<f64>> {
        (0..self.rows)
            .flat_map(|row| (0..self.cols).map(move |col| self.cell_polygon(row, col)))
            .collect()
    }
}
