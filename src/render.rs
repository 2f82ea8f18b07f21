use crate::error::{CacheError, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use std::path::{Path, PathBuf};

const BOX_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

/// Render image location for an image: `out_dir/<stem>_render.jpg`
pub fn render_path(image: &Path, out_dir: &Path) -> PathBuf {
    out_dir.join(format!("{}_render.jpg", crate::cache::image_stem(image)))
}

/// Draw each box as a one pixel outline, coordinates rounded to integers.
/// Corners may come in either order; a zero-size box draws as a line or point.
pub fn draw_boxes(image: &mut RgbImage, boxes: &[[f32; 4]]) {
    for b in boxes {
        let (ax, ay) = (b[0].round() as i32, b[1].round() as i32);
        let (bx, by) = (b[2].round() as i32, b[3].round() as i32);
        let (x1, x2) = (ax.min(bx), ax.max(bx));
        let (y1, y2) = (ay.min(by), ay.max(by));
        let width = x2.abs_diff(x1) + 1;
        let height = y2.abs_diff(y1) + 1;
        let rect = Rect::at(x1, y1).of_size(width, height);
        draw_hollow_rect_mut(image, rect, BOX_COLOR);
    }
}

pub fn save_render(image: &RgbImage, boxes: &[[f32; 4]], path: &Path) -> Result<()> {
    let mut canvas = image.clone();
    draw_boxes(&mut canvas, boxes);
    canvas.save(path).map_err(|source| CacheError::Image {
        path: path.to_path_buf(),
        source,
    })
}
