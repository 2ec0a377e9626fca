/// Borrowed, row-major, channel-interleaved 8-bit image.
#[derive(Clone, Copy, Debug)]
pub struct ImageView<'a> {
    pub width: usize,
    pub height: usize,
    pub channels: usize,
    pub data: &'a [u8], // len = w*h*channels
}

/// Owned counterpart of [`ImageView`]. Frames and rectified outputs are both
/// stored this way.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Image {
    pub width: usize,
    pub height: usize,
    pub channels: usize,
    pub data: Vec<u8>,
}

impl Image {
    /// Black image of the given size.
    pub fn new(width: usize, height: usize, channels: usize) -> Self {
        Self {
            width,
            height,
            channels,
            data: vec![0; width * height * channels],
        }
    }

    /// Wrap a raw buffer; `None` unless `data.len() == width * height * channels`.
    pub fn from_raw(width: usize, height: usize, channels: usize, data: Vec<u8>) -> Option<Self> {
        let expected = width.checked_mul(height)?.checked_mul(channels)?;
        (channels > 0 && data.len() == expected).then_some(Self {
            width,
            height,
            channels,
            data,
        })
    }

    pub fn view(&self) -> ImageView<'_> {
        ImageView {
            width: self.width,
            height: self.height,
            channels: self.channels,
            data: &self.data,
        }
    }

    /// Pixel at integer coordinates, `None` out of bounds.
    pub fn pixel(&self, x: usize, y: usize) -> Option<&[u8]> {
        self.view().pixel(x, y)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl<'a> ImageView<'a> {
    /// `true` when `data` holds exactly `width * height * channels` bytes.
    pub fn is_well_formed(&self) -> bool {
        self.width
            .checked_mul(self.height)
            .and_then(|n| n.checked_mul(self.channels))
            .is_some_and(|n| n == self.data.len())
    }

    pub fn pixel(&self, x: usize, y: usize) -> Option<&'a [u8]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let start = (y * self.width + x) * self.channels;
        self.data.get(start..start + self.channels)
    }

    #[inline]
    fn at(&self, x: usize, y: usize, c: usize) -> f32 {
        self.data[(y * self.width + x) * self.channels + c] as f32
    }
}

/// Slack, in pixels, allowed outside the image border before a sample
/// counts as background.
pub const EDGE_TOLERANCE: f32 = 1e-3;

/// Bilinearly sample every channel at `(x, y)` into `out`.
///
/// Integer coordinates address pixel centres. Returns `false` and leaves
/// `out` untouched when the point lies outside `[0, w-1] x [0, h-1]`
/// (plus [`EDGE_TOLERANCE`] to absorb round-off from projective maps).
#[inline]
pub fn sample_bilinear(src: &ImageView<'_>, x: f32, y: f32, out: &mut [u8]) -> bool {
    if src.width == 0
        || src.height == 0
        || !x.is_finite()
        || !y.is_finite()
        || !src.is_well_formed()
    {
        return false;
    }
    let max_x = (src.width - 1) as f32;
    let max_y = (src.height - 1) as f32;
    if x < -EDGE_TOLERANCE
        || y < -EDGE_TOLERANCE
        || x > max_x + EDGE_TOLERANCE
        || y > max_y + EDGE_TOLERANCE
    {
        return false;
    }
    let x = x.clamp(0.0, max_x);
    let y = y.clamp(0.0, max_y);

    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    let x1 = (x0 + 1).min(src.width - 1);
    let y1 = (y0 + 1).min(src.height - 1);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    for (c, o) in out.iter_mut().enumerate().take(src.channels) {
        let p00 = src.at(x0, y0, c);
        let p10 = src.at(x1, y0, c);
        let p01 = src.at(x0, y1, c);
        let p11 = src.at(x1, y1, c);

        let a = p00 + fx * (p10 - p00);
        let b = p01 + fx * (p11 - p01);
        *o = (a + fy * (b - a)).round().clamp(0.0, 255.0) as u8;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp() -> Image {
        // 3x2 RGB, red channel = 10 * x, green = 100 * y, blue constant.
        let mut data = Vec::new();
        for y in 0..2u8 {
            for x in 0..3u8 {
                data.extend_from_slice(&[10 * x, 100 * y, 7]);
            }
        }
        Image::from_raw(3, 2, 3, data).expect("valid buffer")
    }

    #[test]
    fn from_raw_checks_length() {
        assert!(Image::from_raw(2, 2, 3, vec![0; 11]).is_none());
        assert!(Image::from_raw(2, 2, 0, Vec::new()).is_none());
        assert!(Image::from_raw(2, 2, 1, vec![0; 4]).is_some());
    }

    #[test]
    fn integer_coordinates_return_exact_pixels() {
        let img = ramp();
        let mut out = [0u8; 3];
        assert!(sample_bilinear(&img.view(), 2.0, 1.0, &mut out));
        assert_eq!(&out, img.pixel(2, 1).expect("in bounds"));
    }

    #[test]
    fn fractional_coordinates_interpolate() {
        let img = ramp();
        let mut out = [0u8; 3];
        assert!(sample_bilinear(&img.view(), 0.5, 0.5, &mut out));
        assert_eq!(out, [5, 50, 7]);
    }

    #[test]
    fn short_buffer_is_not_sampled() {
        let data = vec![1u8; 10];
        let view = ImageView {
            width: 3,
            height: 2,
            channels: 3,
            data: &data,
        };
        assert!(!view.is_well_formed());
        let mut out = [9u8; 3];
        assert!(!sample_bilinear(&view, 2.0, 1.0, &mut out));
        assert_eq!(out, [9, 9, 9]);
    }

    #[test]
    fn outside_points_are_rejected() {
        let img = ramp();
        let mut out = [9u8; 3];
        assert!(!sample_bilinear(&img.view(), -0.1, 0.0, &mut out));
        assert!(!sample_bilinear(&img.view(), 0.0, 1.5, &mut out));
        assert!(!sample_bilinear(&img.view(), f32::NAN, 0.0, &mut out));
        assert_eq!(out, [9, 9, 9]);
    }
}
