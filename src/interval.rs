use image::Rgba;

use std::ops::Range;
use std::str;

use crate::sorting::{alpha8, lightness};

/// Lightness band that closes a chunk under threshold chunking.
pub const BAND: std::ops::RangeInclusive<f64> = 64.0..=96.0;
/// Pixels more transparent than this never close a chunk on their own.
pub const MIN_ALPHA: u16 = 32;

/// Decides where the chunks of a scan line begin and end.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Detector {
    /// Close a chunk on pixels whose lightness falls into [`BAND`], and
    /// optionally on lightness changes of more than `delta` percent
    /// relative to the previous pixel. Neither trigger fires before the
    /// chunk holds `min_chunk` pixels.
    Threshold {
        min_chunk: Option<usize>,
        delta: Option<f64>,
    },
    /// Close a chunk every `size` pixels. `None` or zero sorts whole lines.
    Fixed { size: Option<usize> },
}

impl Default for Detector {
    fn default() -> Self {
        Detector::Threshold {
            min_chunk: None,
            delta: None,
        }
    }
}

impl Detector {
    /// Splits a scan line into consecutive, non-overlapping chunks covering
    /// every pixel of the line.
    pub fn chunks(&self, line: &[Rgba<u16>]) -> Vec<Range<usize>> {
        match *self {
            Detector::Threshold { min_chunk, delta } => threshold(line, min_chunk, delta),
            Detector::Fixed { size } => fixed(line.len(), size),
        }
    }
}

fn threshold(line: &[Rgba<u16>], min_chunk: Option<usize>, delta: Option<f64>) -> Vec<Range<usize>> {
    let len = line.len();
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut prev = None;
    for (pos, pixel) in line.iter().enumerate() {
        let cur = lightness(pixel);
        let size = pos + 1 - start;
        let big_enough = min_chunk.map_or(true, |min| size >= min);
        let triggered = in_band(pixel, cur)
            || match (delta, prev) {
                (Some(percent), Some(prev)) => changed(prev, cur, percent),
                _ => false,
            };
        if size > len - pos || (triggered && big_enough) {
            chunks.push(start..pos + 1);
            start = pos + 1;
        }
        prev = Some(cur);
    }
    if start < len {
        chunks.push(start..len);
    }
    chunks
}

fn fixed(len: usize, size: Option<usize>) -> Vec<Range<usize>> {
    if len == 0 {
        return Vec::new();
    }
    let size = size.filter(|&size| size > 0).unwrap_or(len);
    (0..len)
        .step_by(size)
        .map(|start| start..len.min(start + size))
        .collect()
}

fn in_band(pixel: &Rgba<u16>, lightness: f64) -> bool {
    alpha8(pixel) >= MIN_ALPHA && BAND.contains(&lightness)
}

fn changed(prev: f64, cur: f64, percent: f64) -> bool {
    if prev == 0.0 {
        return cur > 0.0;
    }
    let diff = (cur - prev) / prev * 100.0;
    diff < -percent || diff > percent
}

/// Which detector the command line selected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Chunking {
    Threshold,
    Fixed,
}

impl str::FromStr for Chunking {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "threshold" => Ok(Chunking::Threshold),
            "fixed" => Ok(Chunking::Fixed),
            _ => Err(String::from(s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(values: &[u8]) -> Vec<Rgba<u16>> {
        values
            .iter()
            .map(|&v| {
                let v = v as u16 * 0x101;
                Rgba([v, v, v, u16::MAX])
            })
            .collect()
    }

    #[test]
    fn in_band_pixels_close_chunks() {
        let line = line(&[10, 20, 90, 95, 30, 40, 94, 12, 88, 77]);
        let chunks = Detector::default().chunks(&line);
        assert_eq!(chunks, vec![0..3, 3..4, 4..7, 7..9, 9..10]);
    }

    #[test]
    fn forced_close_when_chunk_outgrows_the_rest_of_the_line() {
        let line = line(&[10; 10]);
        let chunks = Detector::default().chunks(&line);
        assert_eq!(chunks, vec![0..6, 6..9, 9..10]);
    }

    #[test]
    fn band_edges_are_inclusive() {
        let mut line = line(&[10, 10, 10, 10, 10, 10, 10, 10]);
        // 64 and 96 exactly, in their 16 bit form
        line[1] = Rgba([64 * 0x101, 64 * 0x101, 64 * 0x101, u16::MAX]);
        line[2] = Rgba([0, 0, 0, u16::MAX]);
        line[3] = Rgba([96 * 0x101, 96 * 0x101, 96 * 0x101, u16::MAX]);
        let l64 = lightness(&line[1]);
        let l96 = lightness(&line[3]);
        let chunks = Detector::default().chunks(&line);
        assert_eq!(chunks.contains(&(0..2)), BAND.contains(&l64));
        assert_eq!(chunks.iter().any(|c| c.end == 4), BAND.contains(&l96));
    }

    #[test]
    fn translucent_pixels_do_not_trigger() {
        let v = 80 * 0x101;
        let faint = Rgba([v, v, v, 31 * 0x101]);
        let mut line = line(&[10, 10, 10, 10, 10, 10]);
        line[1] = faint;
        assert_eq!(Detector::default().chunks(&line), vec![0..4, 4..6]);
    }

    #[test]
    fn min_chunk_defers_in_band_closes() {
        let line = line(&[90, 90, 90, 90, 90, 10, 10, 10, 10, 10, 10, 10]);
        let detector = Detector::Threshold {
            min_chunk: Some(3),
            delta: None,
        };
        let chunks = detector.chunks(&line);
        assert_eq!(chunks, vec![0..3, 3..9, 9..12]);
        for chunk in &chunks {
            let last = chunk.end - 1;
            let forced = chunk.len() > line.len() - last;
            let at_end = chunk.end == line.len();
            assert!(chunk.len() >= 3 || forced || at_end, "{:?}", chunk);
        }
    }

    #[test]
    fn zero_min_chunk_is_no_minimum() {
        let line = line(&[90, 90, 90, 10]);
        let zero = Detector::Threshold {
            min_chunk: Some(0),
            delta: None,
        };
        assert_eq!(zero.chunks(&line), Detector::default().chunks(&line));
    }

    #[test]
    fn delta_trigger_is_opt_in() {
        let line = line(&[10, 10, 200, 200, 200, 200, 200, 200, 200, 200]);
        let plain = Detector::default().chunks(&line);
        assert!(!plain.iter().any(|c| c.end == 3));

        let delta = Detector::Threshold {
            min_chunk: None,
            delta: Some(50.0),
        };
        let chunks = delta.chunks(&line);
        assert_eq!(chunks[0], 0..3);
    }

    #[test]
    fn delta_from_black() {
        assert!(changed(0.0, 1.0, 1000.0));
        assert!(!changed(0.0, 0.0, 0.0));
        assert!(changed(100.0, 40.0, 50.0));
        assert!(!changed(100.0, 150.0, 50.0));
    }

    #[test]
    fn fixed_chunks_split_every_k() {
        let line = line(&[0; 10]);
        let detector = Detector::Fixed { size: Some(4) };
        assert_eq!(detector.chunks(&line), vec![0..4, 4..8, 8..10]);
        let detector = Detector::Fixed { size: Some(5) };
        assert_eq!(detector.chunks(&line), vec![0..5, 5..10]);
    }

    #[test]
    fn unset_fixed_size_sorts_the_whole_line() {
        let line = line(&[0; 7]);
        assert_eq!(Detector::Fixed { size: None }.chunks(&line), vec![0..7]);
        assert_eq!(Detector::Fixed { size: Some(0) }.chunks(&line), vec![0..7]);
        assert_eq!(Detector::Fixed { size: Some(70) }.chunks(&line), vec![0..7]);
    }

    #[test]
    fn empty_and_single_pixel_lines() {
        for detector in [Detector::default(), Detector::Fixed { size: Some(3) }] {
            assert!(detector.chunks(&[]).is_empty());
            assert_eq!(detector.chunks(&line(&[90])), vec![0..1]);
        }
    }

    #[test]
    fn parse_chunking() {
        assert_eq!("fixed".parse(), Ok(Chunking::Fixed));
        assert_eq!("threshold".parse(), Ok(Chunking::Threshold));
        assert!("edges".parse::<Chunking>().is_err());
    }
}
