use crate::error::{CacheError, Result};
use image::RgbImage;
use ndarray::Array4;

/// Network input for one image, plus what is needed to map detections back
#[derive(Debug, Clone)]
pub struct PreparedInput {
    /// `1 x 3 x H x W`, BGR, mean subtracted
    pub tensor: Array4<f32>,
    /// Reflect padding added on the left/right (x) and top/bottom (y)
    pub pad: (usize, usize),
}

impl PreparedInput {
    /// Tensor (width, height); the scale basis for normalized detections
    pub fn size(&self) -> (usize, usize) {
        let shape = self.tensor.shape();
        (shape[3], shape[2])
    }
}

/// Convert an image to DSFD input. No resize and no scaling, only the
/// channel swap and mean subtraction.
pub fn to_tensor(image: &RgbImage, mean_bgr: [f32; 3]) -> Array4<f32> {
    let (width, height) = image.dimensions();
    let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));

    for (x, y, pixel) in image.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        tensor[[0, 0, y, x]] = f32::from(pixel[2]) - mean_bgr[0];
        tensor[[0, 1, y, x]] = f32::from(pixel[1]) - mean_bgr[1];
        tensor[[0, 2, y, x]] = f32::from(pixel[0]) - mean_bgr[2];
    }

    tensor
}

/// Padding in pixels for a relative padding factor, rounding halves to even
pub fn padding_for(width: u32, height: u32, factor: f64) -> (usize, usize) {
    let pad_x = (f64::from(width) * factor).round_ties_even().max(0.0) as usize;
    let pad_y = (f64::from(height) * factor).round_ties_even().max(0.0) as usize;
    (pad_x, pad_y)
}

/// Reflect-pad the spatial dimensions. The edge row/column is not repeated,
/// so each pad must be smaller than the dimension it extends.
pub fn reflect_pad(tensor: &Array4<f32>, pad_x: usize, pad_y: usize) -> Result<Array4<f32>> {
    let (n, c, h, w) = tensor.dim();
    if pad_x > 0 && pad_x >= w {
        return Err(CacheError::InvalidPadding { pad: pad_x, dim: w });
    }
    if pad_y > 0 && pad_y >= h {
        return Err(CacheError::InvalidPadding { pad: pad_y, dim: h });
    }

    let out_h = h + 2 * pad_y;
    let out_w = w + 2 * pad_x;
    let padded = Array4::from_shape_fn((n, c, out_h, out_w), |(b, ch, y, x)| {
        let src_y = reflect_index(y as isize - pad_y as isize, h);
        let src_x = reflect_index(x as isize - pad_x as isize, w);
        tensor[[b, ch, src_y, src_x]]
    });

    Ok(padded)
}

fn reflect_index(i: isize, len: usize) -> usize {
    let last = len as isize - 1;
    if i < 0 {
        (-i) as usize
    } else if i > last {
        (2 * last - i) as usize
    } else {
        i as usize
    }
}

/// Build the network input for an image, optionally padded
pub fn prepare(image: &RgbImage, mean_bgr: [f32; 3], padding: Option<f64>) -> Result<PreparedInput> {
    let tensor = to_tensor(image, mean_bgr);

    match padding {
        Some(factor) => {
            let (pad_x, pad_y) = padding_for(image.width(), image.height(), factor);
            let tensor = reflect_pad(&tensor, pad_x, pad_y)?;
            Ok(PreparedInput { tensor, pad: (pad_x, pad_y) })
        }
        None => Ok(PreparedInput { tensor, pad: (0, 0) }),
    }
}
