#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Presentation contracts that turn liquid sandbox snapshots into pixels.
//!
//! Adapters capture a [`WaterFrame`] from the world's [`WaterView`] and the
//! splash engine's overlay droplets, then hand it to a [`FrameSink`] that knows
//! how to show or store it.

use std::{error::Error, fmt, io::Write};

use anyhow::Result as AnyResult;
use glam::Vec2;
use liquid_sandbox_core::{CellCoord, Droplet, DropletColor, WaterView};

/// RGBA color used when presenting frames.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Color {
    /// Red channel intensity in the range 0.0..=1.0.
    pub red: f32,
    /// Green channel intensity in the range 0.0..=1.0.
    pub green: f32,
    /// Blue channel intensity in the range 0.0..=1.0.
    pub blue: f32,
    /// Alpha channel intensity in the range 0.0..=1.0.
    pub alpha: f32,
}

impl Color {
    /// Creates a new color from floating point channels.
    #[must_use]
    pub const fn new(red: f32, green: f32, blue: f32, alpha: f32) -> Self {
        Self {
            red,
            green,
            blue,
            alpha,
        }
    }

    /// Creates an opaque color from byte RGB values.
    #[must_use]
    pub const fn from_rgb_u8(red: u8, green: u8, blue: u8) -> Self {
        Self {
            red: red as f32 / 255.0,
            green: green as f32 / 255.0,
            blue: blue as f32 / 255.0,
            alpha: 1.0,
        }
    }

    /// Returns a new color lightened towards white by the provided amount.
    #[must_use]
    pub fn lighten(self, amount: f32) -> Self {
        let amount = amount.clamp(0.0, 1.0);

        Self {
            red: lighten_channel(self.red, amount),
            green: lighten_channel(self.green, amount),
            blue: lighten_channel(self.blue, amount),
            alpha: self.alpha,
        }
    }

    /// Returns a new color darkened towards black by the provided amount.
    #[must_use]
    pub fn darken(self, amount: f32) -> Self {
        let keep = 1.0 - amount.clamp(0.0, 1.0);

        Self {
            red: self.red * keep,
            green: self.green * keep,
            blue: self.blue * keep,
            alpha: self.alpha,
        }
    }

    /// Composites `self` over an opaque background.
    #[must_use]
    pub fn over(self, background: Color) -> Self {
        let alpha = self.alpha.clamp(0.0, 1.0);
        let mix = |front: f32, back: f32| front * alpha + back * (1.0 - alpha);

        Self {
            red: mix(self.red, background.red),
            green: mix(self.green, background.green),
            blue: mix(self.blue, background.blue),
            alpha: 1.0,
        }
    }

    /// Byte RGBA representation.
    #[must_use]
    pub fn to_rgba_u8(self) -> [u8; 4] {
        let byte = |channel: f32| (channel.clamp(0.0, 1.0) * 255.0).round() as u8;
        [
            byte(self.red),
            byte(self.green),
            byte(self.blue),
            byte(self.alpha),
        ]
    }
}

impl From<DropletColor> for Color {
    fn from(color: DropletColor) -> Self {
        Self::new(
            f32::from(color.red()) / 255.0,
            f32::from(color.green()) / 255.0,
            f32::from(color.blue()) / 255.0,
            f32::from(color.alpha()) / 255.0,
        )
    }
}

fn lighten_channel(channel: f32, amount: f32) -> f32 {
    channel + (1.0 - channel) * amount
}

/// Colors and shading parameters applied when capturing frames.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WaterPalette {
    /// Color of empty open cells.
    pub background: Color,
    /// Color of solid cells.
    pub solid: Color,
    /// Color of water at the exposed surface.
    pub water: Color,
    /// Darkening applied per wet cell above.
    pub depth_shading: f32,
    /// Upper bound on depth darkening.
    pub max_depth_shading: f32,
    /// Lightening applied to surface cells.
    pub surface_highlight: f32,
    /// Pixels along each cell edge.
    pub pixels_per_cell: u32,
}

impl Default for WaterPalette {
    fn default() -> Self {
        Self {
            background: Color::from_rgb_u8(18, 22, 30),
            solid: Color::from_rgb_u8(96, 88, 80),
            water: Color::from_rgb_u8(52, 128, 220),
            depth_shading: 0.06,
            max_depth_shading: 0.6,
            surface_highlight: 0.25,
            pixels_per_cell: 4,
        }
    }
}

/// RGBA bitmap of the grid with overlay droplets composited on top.
///
/// Pixel rows run top to bottom, so grid row zero ends up at the bottom of the
/// image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WaterFrame {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl WaterFrame {
    /// Renders the view and droplets with the provided palette.
    ///
    /// Partially filled cells are drawn as a band rising from the cell floor.
    pub fn capture(
        view: WaterView<'_>,
        droplets: &[Droplet],
        palette: &WaterPalette,
    ) -> Result<Self, RenderingError> {
        let scale = palette.pixels_per_cell;
        if scale == 0 {
            return Err(RenderingError::InvalidPixelsPerCell {
                pixels_per_cell: scale,
            });
        }
        let geometry = view.geometry();
        let width = geometry.columns().saturating_mul(scale);
        let height = geometry.rows().saturating_mul(scale);
        let mut frame = Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize * 4],
        };

        for index in 0..geometry.cell_count() {
            let Some(cell) = geometry.cell_at(index) else {
                continue;
            };
            frame.paint_cell(view, cell, palette);
        }

        let pixel_size = geometry.cell_size() / scale as f32;
        for droplet in droplets {
            let local = (droplet.position - geometry.origin()) / pixel_size;
            frame.paint_disc(local, droplet.radius / pixel_size, Color::from(droplet.color));
        }
        Ok(frame)
    }

    /// Width in pixels.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Row-major RGBA bytes, top row first.
    #[must_use]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// RGBA value at the pixel, if inside the frame.
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 4;
        let bytes = self.pixels.get(offset..offset + 4)?;
        Some([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    /// Writes the frame as a binary PPM image, dropping alpha.
    pub fn write_ppm<W: Write>(&self, mut writer: W) -> std::io::Result<()> {
        write!(writer, "P6\n{} {}\n255\n", self.width, self.height)?;
        for pixel in self.pixels.chunks_exact(4) {
            writer.write_all(&pixel[..3])?;
        }
        writer.flush()
    }

    fn paint_cell(&mut self, view: WaterView<'_>, cell: CellCoord, palette: &WaterPalette) {
        let scale = palette.pixels_per_cell;
        let left = cell.column() * scale;
        let bottom = cell.row() * scale;

        if view.is_solid(cell) {
            self.fill_band(left, bottom, scale, scale, palette.solid);
            return;
        }
        self.fill_band(left, bottom, scale, scale, palette.background);
        if !view.is_wet(cell) {
            return;
        }

        let fill = (view.water(cell) / view.max_water()).clamp(0.0, 1.0);
        let shade =
            (view.depth(cell) as f32 * palette.depth_shading).min(palette.max_depth_shading);
        let mut color = palette.water.darken(shade);
        if view.is_surface(cell) {
            color = color.lighten(palette.surface_highlight);
        }
        let rows = ((fill * scale as f32).ceil() as u32).clamp(1, scale);
        self.fill_band(left, bottom, scale, rows, color.over(palette.background));
    }

    /// Fills `rows` pixel rows of a `size`-wide block counted upward from `bottom`.
    fn fill_band(&mut self, left: u32, bottom: u32, size: u32, rows: u32, color: Color) {
        let rgba = color.to_rgba_u8();
        for offset in 0..rows {
            let Some(y) = self.height.checked_sub(bottom + offset + 1) else {
                continue;
            };
            for x in left..(left + size).min(self.width) {
                self.put(x, y, rgba);
            }
        }
    }

    fn paint_disc(&mut self, center: Vec2, radius: f32, color: Color) {
        let radius = radius.max(0.5);
        let min_x = (center.x - radius).floor().max(0.0) as u32;
        let max_x = (center.x + radius).ceil().min(self.width as f32) as u32;
        let min_y = (center.y - radius).floor().max(0.0) as u32;
        let max_y = (center.y + radius).ceil().min(self.height as f32) as u32;
        for grid_y in min_y..max_y {
            for x in min_x..max_x {
                let sample = Vec2::new(x as f32 + 0.5, grid_y as f32 + 0.5);
                if sample.distance_squared(center) > radius * radius {
                    continue;
                }
                let y = self.height - 1 - grid_y;
                let Some(existing) = self.pixel(x, y) else {
                    continue;
                };
                let background = Color::new(
                    f32::from(existing[0]) / 255.0,
                    f32::from(existing[1]) / 255.0,
                    f32::from(existing[2]) / 255.0,
                    1.0,
                );
                self.put(x, y, color.over(background).to_rgba_u8());
            }
        }
    }

    fn put(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        let offset = (y as usize * self.width as usize + x as usize) * 4;
        if let Some(slot) = self.pixels.get_mut(offset..offset + 4) {
            slot.copy_from_slice(&rgba);
        }
    }
}

/// Character-cell rendering of the grid, top row first.
///
/// Solid cells print as `#`, water as `.`, `-`, `~` or `=` by fill level and
/// droplets as `*`.
#[must_use]
pub fn ascii_frame(view: WaterView<'_>, droplets: &[Droplet]) -> String {
    let geometry = view.geometry();
    let columns = geometry.columns() as usize;
    let rows = geometry.rows() as usize;
    let mut glyphs = vec![vec![' '; columns]; rows];

    for index in 0..geometry.cell_count() {
        let Some(cell) = geometry.cell_at(index) else {
            continue;
        };
        let glyph = if view.is_solid(cell) {
            '#'
        } else if !view.is_wet(cell) {
            ' '
        } else {
            match view.water(cell) / view.max_water() {
                fill if fill < 0.25 => '.',
                fill if fill < 0.5 => '-',
                fill if fill < 0.9 => '~',
                _ => '=',
            }
        };
        glyphs[cell.row() as usize][cell.column() as usize] = glyph;
    }
    for droplet in droplets {
        if let Some(cell) = geometry.world_to_cell(droplet.position) {
            glyphs[cell.row() as usize][cell.column() as usize] = '*';
        }
    }

    let mut text = String::with_capacity((columns + 1) * rows);
    for row in glyphs.iter().rev() {
        text.extend(row.iter());
        text.push('\n');
    }
    text
}

/// Destination for captured frames.
pub trait FrameSink {
    /// Presents or stores a frame captured at the given tick.
    fn present(&mut self, tick: u64, view: WaterView<'_>, droplets: &[Droplet]) -> AnyResult<()>;
}

/// Errors that can occur when capturing frames.
#[derive(Debug, PartialEq, Eq)]
pub enum RenderingError {
    /// Pixels per cell must be positive to avoid an empty frame.
    InvalidPixelsPerCell {
        /// Provided pixel count that failed validation.
        pixels_per_cell: u32,
    },
}

impl fmt::Display for RenderingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidPixelsPerCell { pixels_per_cell } => {
                write!(
                    f,
                    "pixels_per_cell must be positive (received {pixels_per_cell})"
                )
            }
        }
    }
}

impl Error for RenderingError {}

#[cfg(test)]
mod tests {
    use super::*;
    use liquid_sandbox_core::GridGeometry;

    struct Grid {
        geometry: GridGeometry,
        water: Vec<f32>,
        solid: Vec<bool>,
        settled: Vec<bool>,
        depth: Vec<u32>,
        surface: Vec<bool>,
    }

    impl Grid {
        fn new(columns: u32, rows: u32) -> Self {
            let geometry = GridGeometry::new(columns, rows, 1.0, Vec2::ZERO);
            let count = geometry.cell_count();
            Self {
                geometry,
                water: vec![0.0; count],
                solid: vec![false; count],
                settled: vec![false; count],
                depth: vec![0; count],
                surface: vec![false; count],
            }
        }

        fn view(&self) -> WaterView<'_> {
            WaterView::new(
                self.geometry,
                &self.water,
                &self.solid,
                &self.settled,
                &self.depth,
                &self.surface,
                1.0,
                0.001,
            )
        }
    }

    #[test]
    fn lighten_and_darken_move_towards_white_and_black() {
        let color = Color::new(0.5, 0.5, 0.5, 1.0);
        assert_eq!(color.lighten(0.5), Color::new(0.75, 0.75, 0.75, 1.0));
        assert_eq!(color.darken(0.5), Color::new(0.25, 0.25, 0.25, 1.0));
        assert_eq!(color.lighten(2.0), Color::new(1.0, 1.0, 1.0, 1.0));
    }

    #[test]
    fn zero_pixels_per_cell_is_rejected_without_panicking() {
        let grid = Grid::new(2, 2);
        let palette = WaterPalette {
            pixels_per_cell: 0,
            ..WaterPalette::default()
        };
        assert_eq!(
            WaterFrame::capture(grid.view(), &[], &palette),
            Err(RenderingError::InvalidPixelsPerCell { pixels_per_cell: 0 })
        );
    }

    #[test]
    fn capture_places_grid_row_zero_at_the_bottom() {
        let mut grid = Grid::new(2, 2);
        grid.water[0] = 1.0;
        grid.solid[3] = true;
        let palette = WaterPalette {
            pixels_per_cell: 2,
            ..WaterPalette::default()
        };

        let frame = WaterFrame::capture(grid.view(), &[], &palette).expect("frame");

        assert_eq!((frame.width(), frame.height()), (4, 4));
        assert_eq!(frame.pixels().len(), 4 * 4 * 4);
        let water = palette.water.over(palette.background).to_rgba_u8();
        assert_eq!(frame.pixel(0, 3), Some(water));
        assert_eq!(frame.pixel(3, 0), Some(palette.solid.to_rgba_u8()));
        assert_eq!(frame.pixel(0, 0), Some(palette.background.to_rgba_u8()));
        assert_eq!(frame.pixel(4, 0), None);
    }

    #[test]
    fn half_full_cells_fill_from_the_floor() {
        let mut grid = Grid::new(1, 1);
        grid.water[0] = 0.5;
        let palette = WaterPalette {
            pixels_per_cell: 4,
            ..WaterPalette::default()
        };

        let frame = WaterFrame::capture(grid.view(), &[], &palette).expect("frame");

        let background = palette.background.to_rgba_u8();
        assert_eq!(frame.pixel(0, 0), Some(background));
        assert_eq!(frame.pixel(0, 1), Some(background));
        assert_ne!(frame.pixel(0, 2), Some(background));
        assert_ne!(frame.pixel(0, 3), Some(background));
    }

    #[test]
    fn droplets_are_composited_over_the_grid() {
        let grid = Grid::new(2, 2);
        let palette = WaterPalette {
            pixels_per_cell: 4,
            ..WaterPalette::default()
        };
        let droplet = Droplet {
            position: Vec2::new(1.0, 1.0),
            radius: 0.25,
            color: DropletColor::from_rgba(255, 255, 255, 255),
        };

        let frame = WaterFrame::capture(grid.view(), &[droplet], &palette).expect("frame");

        assert_eq!(frame.pixel(4, 4), Some([255, 255, 255, 255]));
        assert_eq!(frame.pixel(0, 0), Some(palette.background.to_rgba_u8()));
    }

    #[test]
    fn ascii_frame_prints_top_row_first() {
        let mut grid = Grid::new(3, 2);
        grid.water[0] = 1.0;
        grid.water[1] = 0.3;
        grid.solid[5] = true;

        let text = ascii_frame(grid.view(), &[]);

        assert_eq!(text, "  #\n=- \n");
    }

    #[test]
    fn ppm_output_has_header_and_rgb_payload() {
        let grid = Grid::new(1, 1);
        let palette = WaterPalette {
            pixels_per_cell: 2,
            ..WaterPalette::default()
        };
        let frame = WaterFrame::capture(grid.view(), &[], &palette).expect("frame");
        let mut bytes = Vec::new();

        frame.write_ppm(&mut bytes).expect("ppm");

        let header = b"P6\n2 2\n255\n";
        assert_eq!(&bytes[..header.len()], header);
        assert_eq!(bytes.len(), header.len() + 2 * 2 * 3);
    }
}
