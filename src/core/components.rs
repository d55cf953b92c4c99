//! Binary masks and 8-connected component labeling.

use super::geometry::Rect;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    width: u32,
    height: u32,
    bits: Vec<bool>,
}

impl Mask {
    /// All clear.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            bits: vec![false; width as usize * height as usize],
        }
    }

    pub fn from_fn<F>(width: u32, height: u32, mut f: F) -> Self
    where
        F: FnMut(u32, u32) -> bool,
    {
        let mut bits = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                bits.push(f(x, y));
            }
        }
        Self {
            width,
            height,
            bits,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> bool {
        self.bits[y as usize * self.width as usize + x as usize]
    }

    #[inline]
    pub fn set(&mut self, x: u32, y: u32, value: bool) {
        self.bits[y as usize * self.width as usize + x as usize] = value;
    }

    /// Number of set pixels.
    pub fn count(&self) -> usize {
        self.bits.iter().filter(|&&b| b).count()
    }

    /// Total pixels, set or not.
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Share of set pixels.
    pub fn ratio(&self) -> f64 {
        if self.bits.is_empty() {
            return 0.0;
        }
        self.count() as f64 / self.bits.len() as f64
    }

    pub fn iter_set(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        let w = self.width.max(1);
        self.bits
            .iter()
            .enumerate()
            .filter(|(_, &b)| b)
            .map(move |(i, _)| ((i as u32) % w, (i as u32) / w))
    }
}

/// A connected group of set pixels.
#[derive(Debug, Clone)]
pub struct Component {
    pub bbox: Rect,
    pub pixels: Vec<(u32, u32)>,
}

impl Component {
    pub fn pixel_count(&self) -> usize {
        self.pixels.len()
    }
}

/// Labels 8-connected components in row-major order of their first pixel.
pub fn label(mask: &Mask) -> Vec<Component> {
    let (w, h) = (mask.width, mask.height);
    let mut visited = vec![false; mask.bits.len()];
    let mut components = Vec::new();
    let mut stack = Vec::new();

    for start in 0..mask.bits.len() {
        if !mask.bits[start] || visited[start] {
            continue;
        }
        visited[start] = true;
        stack.push(start);

        let mut pixels = Vec::new();
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (u32::MAX, u32::MAX, 0, 0);

        while let Some(idx) = stack.pop() {
            let x = (idx % w as usize) as u32;
            let y = (idx / w as usize) as u32;
            pixels.push((x, y));
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);

            for dy in -1i64..=1 {
                for dx in -1i64..=1 {
                    if dx == 0 && dy == 0 {
                        continue;
                    }
                    let nx = x as i64 + dx;
                    let ny = y as i64 + dy;
                    if nx < 0 || ny < 0 || nx >= w as i64 || ny >= h as i64 {
                        continue;
                    }
                    let n = ny as usize * w as usize + nx as usize;
                    if mask.bits[n] && !visited[n] {
                        visited[n] = true;
                        stack.push(n);
                    }
                }
            }
        }

        components.push(Component {
            bbox: Rect::from_corners(min_x, min_y, max_x, max_y),
            pixels,
        });
    }

    components
}
