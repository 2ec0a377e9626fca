use birdseye_core::Image;
use birdseye_pipeline::{FrameSource, Marker, Presentation, SourceError};
use image::{DynamicImage, ImageReader, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_circle_mut;
use std::path::{Path, PathBuf};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// File extensions accepted by [`ImageSequenceSource`].
pub const FRAME_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp"];

/// Copy an `image::RgbImage` into the pipeline's frame type.
pub fn frame_from_rgb(img: &RgbImage) -> Image {
    Image {
        width: img.width() as usize,
        height: img.height() as usize,
        channels: 3,
        data: img.as_raw().clone(),
    }
}

/// Convert any decoded image into a 3-channel frame.
pub fn frame_from_dynamic(img: DynamicImage) -> Image {
    let rgb = img.into_rgb8();
    let (width, height) = (rgb.width() as usize, rgb.height() as usize);
    Image {
        width,
        height,
        channels: 3,
        data: rgb.into_raw(),
    }
}

/// Back to `RgbImage`. Grayscale frames are replicated into all channels;
/// `None` for other channel counts or inconsistent buffers.
pub fn frame_to_rgb(frame: &Image) -> Option<RgbImage> {
    let w = u32::try_from(frame.width).ok()?;
    let h = u32::try_from(frame.height).ok()?;
    match frame.channels {
        3 => RgbImage::from_raw(w, h, frame.data.clone()),
        1 => RgbImage::from_raw(w, h, frame.data.iter().flat_map(|&v| [v, v, v]).collect()),
        _ => None,
    }
}

/// Draw each marker as a hollow circle.
pub fn render_markers(canvas: &mut RgbImage, markers: &[Marker]) {
    for m in markers {
        let center = (m.center.x.round() as i32, m.center.y.round() as i32);
        draw_hollow_circle_mut(canvas, center, m.radius.round() as i32, Rgb(m.color));
    }
}

/// The two displayed images of one presentation: the annotated source frame
/// and, when the frame was rectified, the annotated rectified view.
pub struct RenderedPresentation {
    pub source: RgbImage,
    pub rectified: Option<RgbImage>,
}

pub fn render_presentation(p: &Presentation) -> Option<RenderedPresentation> {
    let mut source = frame_to_rgb(&p.frame)?;
    render_markers(&mut source, &p.frame_markers);

    let rectified = match &p.rectified {
        Some(out) => {
            let mut img = frame_to_rgb(&out.image)?;
            render_markers(&mut img, &out.markers);
            Some(img)
        }
        None => None,
    };
    Some(RenderedPresentation { source, rectified })
}

/// A directory of still images played back as a video stream, in file-name
/// order.
pub struct ImageSequenceSource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    cursor: usize,
}

impl ImageSequenceSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            files: Vec::new(),
            cursor: 0,
        }
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }
}

fn is_frame_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| FRAME_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn load_frame(path: &Path) -> Result<Image, String> {
    let img = ImageReader::open(path)
        .map_err(|e| e.to_string())?
        .decode()
        .map_err(|e| e.to_string())?;
    Ok(frame_from_dynamic(img))
}

impl FrameSource for ImageSequenceSource {
    fn open(&mut self) -> Result<(), SourceError> {
        let entries = std::fs::read_dir(&self.dir)
            .map_err(|e| SourceError::Unavailable(format!("{}: {e}", self.dir.display())))?;
        let mut files: Vec<PathBuf> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && is_frame_file(p))
            .collect();
        files.sort();
        if files.is_empty() {
            return Err(SourceError::Unavailable(format!(
                "{}: no frames found",
                self.dir.display()
            )));
        }
        log::info!("{} frames in {}", files.len(), self.dir.display());
        self.files = files;
        self.cursor = 0;
        Ok(())
    }

    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self)))]
    fn next_frame(&mut self) -> Result<Option<Image>, SourceError> {
        let Some(path) = self.files.get(self.cursor) else {
            return Ok(None);
        };
        let index = self.cursor;
        self.cursor += 1;
        load_frame(path)
            .map(Some)
            .map_err(|reason| SourceError::Read {
                index,
                reason: format!("{}: {reason}", path.display()),
            })
    }
}
