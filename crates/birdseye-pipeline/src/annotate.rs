use crate::params::AnnotationParams;
use birdseye_core::ProjectionError;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Hollow circle to be drawn over a presented image.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub center: Point2<f32>,
    pub radius: f32,
    pub color: [u8; 3],
}

/// One marker per point; points at infinity are dropped with a warning.
pub fn markers_for(
    points: &[Result<Point2<f32>, ProjectionError>],
    style: &AnnotationParams,
) -> Vec<Marker> {
    points
        .iter()
        .filter_map(|p| match p {
            Ok(center) => Some(Marker {
                center: *center,
                radius: style.radius,
                color: style.color,
            }),
            Err(err) => {
                log::warn!("skipping annotation: {err}");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn points_at_infinity_are_left_out() {
        let style = AnnotationParams {
            radius: 4.0,
            color: [255, 0, 0],
        };
        let points = [
            Ok(Point2::new(10.0, 20.0)),
            Err(ProjectionError::AtInfinity { index: 1 }),
            Ok(Point2::new(30.0, 40.0)),
        ];

        let markers = markers_for(&points, &style);
        assert_eq!(markers.len(), 2);
        assert_eq!(markers[0].center, Point2::new(10.0, 20.0));
        assert_eq!(markers[1].center, Point2::new(30.0, 40.0));
        assert!(markers.iter().all(|m| m.radius == 4.0 && m.color == [255, 0, 0]));
    }

    #[test]
    fn nothing_to_annotate() {
        let points = [Err(ProjectionError::AtInfinity { index: 0 })];
        assert!(markers_for(&points, &AnnotationParams::default()).is_empty());
    }
}
