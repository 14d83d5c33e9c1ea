//! Landmark geometry
//!
//! This module derives scale and region information from a landmark set:
//! - Bounding box and face scale (box diagonal)
//! - Region partitioning into mouth, eyes and brows

use crate::config::BandingScheme;
use crate::error::AnalysisError;
use crate::types::{BoundingBox, LandmarkSet, RegionMap};

/// Added to the face scale before dividing by it
pub const SCALE_EPSILON: f64 = 1e-9;

/// Landmark count of the dlib / OpenFace 68-point convention
pub const DLIB_68_LANDMARKS: usize = 68;

/// Compute the bounding box of a landmark set
pub fn bounding_box(landmarks: &LandmarkSet) -> Result<BoundingBox, AnalysisError> {
    let first = landmarks.points.first().ok_or(AnalysisError::EmptyLandmarks)?;

    let init = BoundingBox::new(first.x, first.y, first.x, first.y);
    Ok(landmarks.iter().fold(init, |b, p| {
        BoundingBox::new(
            b.x_min.min(p.x),
            b.y_min.min(p.y),
            b.x_max.max(p.x),
            b.y_max.max(p.y),
        )
    }))
}

/// Face scale: the bounding-box diagonal in pixels. A degenerate box yields 0.
pub fn face_scale(bbox: &BoundingBox) -> f64 {
    bbox.diagonal()
}

/// Fixed region table for the 68-point layout.
///
/// Jaw (0-16) and nose (27-35) belong to no region.
pub fn dlib68_regions() -> RegionMap {
    RegionMap::new(
        (48..=67).collect(),
        (36..=47).collect(),
        (17..=26).collect(),
    )
}

/// Partition landmark indices into mouth, eyes and brows.
///
/// 68-point sets use the fixed index table. Any other count is split into
/// horizontal bands of the bounding box (`bbox` if given, otherwise the box of
/// `landmarks`), with image y growing downward so brows are the top band.
pub fn map_regions(
    landmarks: &LandmarkSet,
    bbox: Option<&BoundingBox>,
    banding: BandingScheme,
) -> Result<RegionMap, AnalysisError> {
    if landmarks.len() == DLIB_68_LANDMARKS {
        return Ok(dlib68_regions());
    }

    let bbox = match bbox {
        Some(b) => *b,
        None => bounding_box(landmarks)?,
    };

    let (brow_edge, mouth_edge) = banding.edges();
    let brow_th = bbox.y_min + brow_edge * bbox.height();
    let mouth_th = bbox.y_min + mouth_edge * bbox.height();

    let mut mouth = Vec::new();
    let mut eyes = Vec::new();
    let mut brows = Vec::new();

    for (i, p) in landmarks.iter().enumerate() {
        if p.y >= mouth_th {
            mouth.push(i);
        } else if p.y >= brow_th {
            eyes.push(i);
        } else {
            brows.push(i);
        }
    }

    Ok(RegionMap::new(mouth, eyes, brows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Point, Region};
    use pretty_assertions::assert_eq;

    fn column(n: usize, step: f64) -> LandmarkSet {
        LandmarkSet::new((0..n).map(|i| Point::new(0.0, i as f64 * step)).collect())
    }

    #[test]
    fn test_bounding_box() {
        let lm = LandmarkSet::from_xy(&[(3.0, 7.0), (-1.0, 2.0), (5.0, 4.0)]);
        let bbox = bounding_box(&lm).unwrap();
        assert_eq!(bbox, BoundingBox::new(-1.0, 2.0, 5.0, 7.0));
    }

    #[test]
    fn test_bounding_box_empty() {
        let result = bounding_box(&LandmarkSet::default());
        assert!(matches!(result, Err(AnalysisError::EmptyLandmarks)));
    }

    #[test]
    fn test_face_scale() {
        let bbox = BoundingBox::new(0.0, 0.0, 30.0, 40.0);
        assert!((face_scale(&bbox) - 50.0).abs() < 1e-12);

        let point = BoundingBox::new(2.0, 2.0, 2.0, 2.0);
        assert_eq!(face_scale(&point), 0.0);
    }

    #[test]
    fn test_dlib68_table() {
        let lm = column(68, 1.0);
        let regions = map_regions(&lm, None, BandingScheme::default()).unwrap();
        assert_eq!(regions.indices(Region::Eyes), (36..=47).collect::<Vec<_>>().as_slice());
        assert_eq!(regions.indices(Region::Brows), (17..=26).collect::<Vec<_>>().as_slice());
        assert_eq!(regions.size(Region::Mouth), 20);
        assert_eq!(regions.region_of(30), None);
    }

    #[test]
    fn test_lower_face_banding() {
        // y = 0..=100 in steps of 10
        let lm = column(11, 10.0);
        let regions = map_regions(&lm, None, BandingScheme::LowerFace).unwrap();
        assert_eq!(regions.indices(Region::Brows), &[0, 1, 2, 3]);
        assert_eq!(regions.indices(Region::Eyes), &[4, 5]);
        assert_eq!(regions.indices(Region::Mouth), &[6, 7, 8, 9, 10]);
    }

    #[test]
    fn test_thirds_banding() {
        let lm = column(11, 10.0);
        let regions = map_regions(&lm, None, BandingScheme::Thirds).unwrap();
        assert_eq!(regions.indices(Region::Brows), &[0, 1, 2, 3]);
        assert_eq!(regions.indices(Region::Eyes), &[4, 5, 6]);
        assert_eq!(regions.indices(Region::Mouth), &[7, 8, 9, 10]);
    }

    #[test]
    fn test_banding_covers_all_indices() {
        let lm = LandmarkSet::from_xy(&[(1.0, 9.0), (4.0, 1.0), (2.0, 5.0), (8.0, 3.0), (0.0, 7.5)]);
        let regions = map_regions(&lm, None, BandingScheme::default()).unwrap();
        let mut all: Vec<usize> = Region::ALL
            .iter()
            .flat_map(|&r| regions.indices(r).to_vec())
            .collect();
        all.sort_unstable();
        assert_eq!(all, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_flat_landmarks_fall_into_mouth() {
        let lm = LandmarkSet::from_xy(&[(0.0, 50.0), (10.0, 50.0), (20.0, 50.0)]);
        let regions = map_regions(&lm, None, BandingScheme::default()).unwrap();
        assert_eq!(regions.size(Region::Mouth), 3);
    }

    #[test]
    fn test_explicit_bbox_overrides_landmark_bounds() {
        let lm = column(3, 10.0);
        let bbox = BoundingBox::new(0.0, 0.0, 0.0, 100.0);
        let regions = map_regions(&lm, Some(&bbox), BandingScheme::default()).unwrap();
        assert_eq!(regions.size(Region::Brows), 3);
    }
}
