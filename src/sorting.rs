use image::Rgba;

/// Channels are 16 bit, the metric works on their 8 bit counterparts.
const DEPTH_SCALE: u16 = 0x101;

#[inline]
pub fn alpha8(pixel: &Rgba<u16>) -> u16 {
    pixel[3] / DEPTH_SCALE
}

/// Alpha-weighted perceptual luma of a pixel, roughly in `[0; 255]`.
///
/// Fully transparent pixels are always `0.0`.
#[inline]
pub fn lightness(pixel: &Rgba<u16>) -> f64 {
    let Rgba([r, g, b, a]) = *pixel;
    if a == 0 {
        return 0.0;
    }
    let alpha = (a / DEPTH_SCALE) as f64 / 255.0;
    let [r, g, b] = [r, g, b].map(|c| (c / DEPTH_SCALE) as f64 * alpha);
    0.2126 * r + 0.7152 * g + 0.0722 * b
}

/// Sorts a chunk by descending lightness, keeping ties in encounter order.
pub fn sort_chunk(chunk: &mut [Rgba<u16>]) {
    chunk.sort_by(|a, b| lightness(b).total_cmp(&lightness(a)));
}
