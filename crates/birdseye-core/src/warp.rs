use crate::{sample_bilinear, Homography, Image, ImageView};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Inverse warp: for each output pixel, map to the source via `h_src_from_dst`
/// and sample bilinearly.
///
/// Output pixels whose preimage lies outside the source or at infinity keep
/// the background value 0. The output has the source's channel count. A
/// source whose buffer does not match its dimensions yields an all-background
/// image.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(src, h_src_from_dst), fields(src_w = src.width, src_h = src.height))
)]
pub fn warp_perspective(
    src: &ImageView<'_>,
    h_src_from_dst: &Homography,
    out_w: usize,
    out_h: usize,
) -> Image {
    let channels = src.channels;
    let mut out = Image::new(out_w, out_h, channels);
    if channels == 0 {
        return out;
    }
    if !src.is_well_formed() {
        log::warn!(
            "warp source is {}x{}x{} but holds {} bytes; output left blank",
            src.width,
            src.height,
            channels,
            src.data.len()
        );
        return out;
    }

    for (y, row) in out.data.chunks_exact_mut(out_w.max(1) * channels).enumerate() {
        for (x, px) in row.chunks_exact_mut(channels).enumerate() {
            if let Some((sx, sy)) = h_src_from_dst.try_apply_f64(x as f64, y as f64) {
                sample_bilinear(src, sx as f32, sy as f32, px);
            }
        }
    }

    out
}
