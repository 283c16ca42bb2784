use image::{ImageBuffer, Rgba};
use log::{debug, trace};

use std::str;

pub mod sorting;

pub mod interval;
use self::interval::Detector;

/// 16 bit RGBA pixel grid the sorting passes operate on.
pub type Grid = ImageBuffer<Rgba<u16>, Vec<u16>>;

/// Orientation of the scan lines of a single pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Axis {
    /// Horizontal lines, scanned left to right.
    Row,
    /// Vertical lines, scanned top to bottom.
    Column,
}

impl Axis {
    fn lines(self, width: u32, height: u32) -> (u32, u32) {
        match self {
            Axis::Row => (height, width),
            Axis::Column => (width, height),
        }
    }

    #[inline]
    fn coords(self, line: u32, pos: u32) -> (u32, u32) {
        match self {
            Axis::Row => (pos, line),
            Axis::Column => (line, pos),
        }
    }
}

/// Which passes a run applies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Rows only.
    X,
    /// Columns only.
    Y,
    /// Columns, then rows of the column-sorted grid.
    Both,
}

impl Direction {
    pub fn axes(self) -> &'static [Axis] {
        match self {
            Direction::X => &[Axis::Row],
            Direction::Y => &[Axis::Column],
            Direction::Both => &[Axis::Column, Axis::Row],
        }
    }
}

impl Default for Direction {
    fn default() -> Self {
        Direction::Both
    }
}

impl str::FromStr for Direction {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "x" => Ok(Direction::X),
            "y" => Ok(Direction::Y),
            "both" => Ok(Direction::Both),
            _ => Err(String::from(s)),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Config {
    pub direction: Direction,
    pub detector: Detector,
}

/// Runs every pass `config.direction` asks for, each on the output of the
/// previous one.
pub fn sort_image(image: &Grid, config: &Config) -> Grid {
    let mut axes = config.direction.axes().iter();
    let first = match axes.next() {
        Some(&axis) => sort_pass(image, axis, &config.detector),
        None => image.clone(),
    };
    axes.fold(first, |image, &axis| sort_pass(&image, axis, &config.detector))
}

/// Sorts every chunk of every scan line along `axis` into a new grid.
pub fn sort_pass(image: &Grid, axis: Axis, detector: &Detector) -> Grid {
    let (width, height) = image.dimensions();
    let (lines, len) = axis.lines(width, height);
    debug!("sorting {}x{} image along {:?} with {:?}", width, height, axis, detector);
    #[cfg(feature = "rayon")]
    let out = sort_lines_parallel(image, axis, detector, lines, len);
    #[cfg(not(feature = "rayon"))]
    let out = sort_lines(image, axis, detector, lines, len);
    out
}

#[cfg_attr(feature = "rayon", allow(dead_code))]
fn sort_lines(image: &Grid, axis: Axis, detector: &Detector, lines: u32, len: u32) -> Grid {
    let mut out = Grid::new(image.width(), image.height());
    // allocate buffer outside to prevent frequent reallocations
    let mut scratch = Vec::with_capacity(len as usize);
    for line in 0..lines {
        sort_line(image, axis, detector, line, &mut scratch);
        write_line(&mut out, axis, line, scratch.drain(..));
    }
    out
}

/// Same output as `sort_lines`, lines are sorted in parallel and written
/// back serially.
#[cfg(feature = "rayon")]
fn sort_lines_parallel(
    image: &Grid,
    axis: Axis,
    detector: &Detector,
    lines: u32,
    len: u32,
) -> Grid {
    use rayon::prelude::*;
    let sorted: Vec<Vec<Rgba<u16>>> = (0..lines)
        .into_par_iter()
        .map(|line| {
            let mut scratch = Vec::with_capacity(len as usize);
            sort_line(image, axis, detector, line, &mut scratch);
            scratch
        })
        .collect();
    let mut out = Grid::new(image.width(), image.height());
    for (line, pixels) in sorted.into_iter().enumerate() {
        write_line(&mut out, axis, line as u32, pixels);
    }
    out
}

fn sort_line(
    image: &Grid,
    axis: Axis,
    detector: &Detector,
    line: u32,
    scratch: &mut Vec<Rgba<u16>>,
) {
    let (_, len) = axis.lines(image.width(), image.height());
    scratch.extend((0..len).map(|pos| {
        let (x, y) = axis.coords(line, pos);
        *image.get_pixel(x, y)
    }));
    let chunks = detector.chunks(scratch);
    trace!("{:?} {}: {} chunks", axis, line, chunks.len());
    for chunk in chunks {
        sorting::sort_chunk(&mut scratch[chunk]);
    }
}

fn write_line<I>(out: &mut Grid, axis: Axis, line: u32, pixels: I)
where
    I: IntoIterator<Item = Rgba<u16>>,
{
    for (pos, pixel) in pixels.into_iter().enumerate() {
        let (x, y) = axis.coords(line, pos as u32);
        out.put_pixel(x, y, pixel);
    }
}
