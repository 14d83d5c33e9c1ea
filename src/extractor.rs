//! Landmark extraction adapters
//!
//! Face detection itself happens outside this crate. Extractors hand the
//! pipeline an ordered landmark set, or `None` when no face was found.

use crate::error::AnalysisError;
use crate::types::{LandmarkSet, Point};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Trait for landmark sources
pub trait LandmarkExtractor {
    /// Input the extractor reads landmarks from
    type Image: ?Sized;

    /// Extract landmarks, returning `Ok(None)` when no face is present
    fn extract(&self, image: &Self::Image) -> Result<Option<LandmarkSet>, AnalysisError>;
}

/// Extractor over landmarks that were already computed elsewhere
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticExtractor;

impl LandmarkExtractor for StaticExtractor {
    type Image = Option<LandmarkSet>;

    fn extract(&self, image: &Self::Image) -> Result<Option<LandmarkSet>, AnalysisError> {
        Ok(image.clone())
    }
}

/// Extractor reading landmark files written by an external detector.
///
/// `.csv` files are parsed as OpenFace FeatureExtraction output; anything else
/// is parsed as JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct LandmarkFileExtractor;

impl LandmarkExtractor for LandmarkFileExtractor {
    type Image = Path;

    fn extract(&self, path: &Path) -> Result<Option<LandmarkSet>, AnalysisError> {
        let content = fs::read_to_string(path)
            .map_err(|e| AnalysisError::FileNotReadable(format!("{}: {}", path.display(), e)))?;

        let is_csv = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("csv"));

        let landmarks = if is_csv {
            parse_openface_csv(&content)?
        } else {
            parse_landmark_json(&content)?
        };

        tracing::debug!(
            path = %path.display(),
            landmarks = landmarks.as_ref().map(LandmarkSet::len),
            "read landmark file"
        );
        Ok(landmarks)
    }
}

/// Parse landmarks from JSON.
///
/// Accepts an array of `[x, y]`, `[x, y, z]` or `{"x": .., "y": ..}` points, or
/// an object with such an array under `"landmarks"`. `null` and an empty array
/// mean no face was detected. The z coordinate is dropped.
pub fn parse_landmark_json(json: &str) -> Result<Option<LandmarkSet>, AnalysisError> {
    let value: Value = serde_json::from_str(json)?;
    landmarks_from_value(&value)
}

fn landmarks_from_value(value: &Value) -> Result<Option<LandmarkSet>, AnalysisError> {
    match value {
        Value::Null => Ok(None),
        Value::Object(map) => match map.get("landmarks") {
            Some(inner) => landmarks_from_value(inner),
            None => Err(AnalysisError::ParseError(
                "object has no \"landmarks\" field".to_string(),
            )),
        },
        Value::Array(items) if items.is_empty() => Ok(None),
        Value::Array(items) => {
            let points = items
                .iter()
                .enumerate()
                .map(|(i, item)| point_from_value(i, item))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Some(LandmarkSet::new(points)))
        }
        other => Err(AnalysisError::ParseError(format!(
            "expected landmark array, found {other}"
        ))),
    }
}

fn point_from_value(index: usize, value: &Value) -> Result<Point, AnalysisError> {
    let bad = || AnalysisError::ParseError(format!("landmark {index} is not a 2D or 3D point"));

    let (x, y) = match value {
        Value::Array(coords) if coords.len() == 2 || coords.len() == 3 => {
            (coords[0].as_f64(), coords[1].as_f64())
        }
        Value::Object(map) => (
            map.get("x").and_then(Value::as_f64),
            map.get("y").and_then(Value::as_f64),
        ),
        _ => return Err(bad()),
    };

    match (x, y) {
        (Some(x), Some(y)) => Ok(Point::new(x, y)),
        _ => Err(bad()),
    }
}

#[derive(Clone, Copy)]
enum Axis {
    X,
    Y,
}

/// Recognize landmark coordinate column names such as `x_0`, `y12`, `X3`,
/// `landmark_5_x` or `5-y`. Other columns yield `None`.
fn landmark_column(name: &str) -> Option<(usize, Axis)> {
    let name = name.trim();
    let axis_of = |c: char| match c.to_ascii_lowercase() {
        'x' => Some(Axis::X),
        'y' => Some(Axis::Y),
        _ => None,
    };

    let first = name.chars().next()?;
    if let Some(axis) = axis_of(first) {
        let rest = &name[first.len_utf8()..];
        let digits = rest.strip_prefix(['_', '-']).unwrap_or(rest);
        if let Ok(index) = digits.parse() {
            return Some((index, axis));
        }
    }

    let last = name.chars().next_back()?;
    let axis = axis_of(last)?;
    let head = &name[..name.len() - last.len_utf8()];
    let head = head.strip_suffix(['_', '-']).unwrap_or(head);
    let digits = head.rsplit('_').next()?;
    digits.parse().ok().map(|index| (index, axis))
}

/// Parse the first data row of an OpenFace FeatureExtraction CSV.
///
/// When a landmark index appears in several column families (OpenFace writes
/// 2D `x_i` before 3D `X_i`), the first column wins.
pub fn parse_openface_csv(csv: &str) -> Result<Option<LandmarkSet>, AnalysisError> {
    let mut lines = csv.lines().filter(|l| !l.trim().is_empty());
    let header = lines
        .next()
        .ok_or_else(|| AnalysisError::ParseError("CSV has no header".to_string()))?;
    let Some(row) = lines.next() else {
        return Ok(None);
    };

    let values: Vec<&str> = row.split(',').map(str::trim).collect();
    let mut columns: BTreeMap<usize, (Option<usize>, Option<usize>)> = BTreeMap::new();
    for (col, name) in header.split(',').enumerate() {
        if let Some((index, axis)) = landmark_column(name) {
            let entry = columns.entry(index).or_default();
            let slot = match axis {
                Axis::X => &mut entry.0,
                Axis::Y => &mut entry.1,
            };
            slot.get_or_insert(col);
        }
    }

    let value_at = |col: usize| -> Result<f64, AnalysisError> {
        values
            .get(col)
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| AnalysisError::ParseError(format!("column {col} is not a number")))
    };

    let points = columns
        .values()
        .filter_map(|&(x, y)| Some((x?, y?)))
        .map(|(x, y)| Ok(Point::new(value_at(x)?, value_at(y)?)))
        .collect::<Result<Vec<_>, AnalysisError>>()?;

    if points.is_empty() {
        return Err(AnalysisError::ParseError(
            "CSV format not recognized: no landmark coordinate columns".to_string(),
        ));
    }
    Ok(Some(LandmarkSet::new(points)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_json_pairs_and_triples() {
        let lm = parse_landmark_json("[[1, 2], [3.5, 4, 9]]").unwrap().unwrap();
        assert_eq!(lm, LandmarkSet::from_xy(&[(1.0, 2.0), (3.5, 4.0)]));
    }

    #[test]
    fn test_json_object_forms() {
        let lm = parse_landmark_json(r#"{"landmarks": [{"x": 1, "y": 2}]}"#)
            .unwrap()
            .unwrap();
        assert_eq!(lm[0], Point::new(1.0, 2.0));
    }

    #[test]
    fn test_json_no_face() {
        assert_eq!(parse_landmark_json("null").unwrap(), None);
        assert_eq!(parse_landmark_json("[]").unwrap(), None);
        assert_eq!(parse_landmark_json(r#"{"landmarks": null}"#).unwrap(), None);
    }

    #[test]
    fn test_json_malformed_point() {
        let err = parse_landmark_json("[[1, 2], [3]]").unwrap_err();
        assert!(err.to_string().contains("landmark 1"));
        assert!(parse_landmark_json(r#"{"points": []}"#).is_err());
    }

    #[test]
    fn test_openface_csv() {
        let csv = "frame, face_id, confidence, x_0, x_1, y_0, y_1, X_0, Y_0, pose_Tx\n\
                   1, 0, 0.98, 10.5, 20.0, 30.0, 40.0, 999, 999, 5\n";
        let lm = parse_openface_csv(csv).unwrap().unwrap();
        assert_eq!(lm, LandmarkSet::from_xy(&[(10.5, 30.0), (20.0, 40.0)]));
    }

    #[test]
    fn test_suffix_style_columns() {
        let csv = "landmark_0_x,landmark_0_y,landmark_1_x,landmark_1_y\n1,2,3,4\n";
        let lm = parse_openface_csv(csv).unwrap().unwrap();
        assert_eq!(lm, LandmarkSet::from_xy(&[(1.0, 2.0), (3.0, 4.0)]));
    }

    #[test]
    fn test_csv_without_landmarks() {
        assert!(parse_openface_csv("frame,confidence\n1,0.5\n").is_err());
        assert_eq!(parse_openface_csv("x_0,y_0\n").unwrap(), None);
    }

    #[test]
    fn test_missing_file_is_not_readable() {
        let result = LandmarkFileExtractor.extract(Path::new("/nonexistent/neutral.json"));
        assert!(matches!(result, Err(AnalysisError::FileNotReadable(_))));
    }

    #[test]
    fn test_file_extractor_reads_json() {
        let dir = std::env::temp_dir().join(format!("facial-state-extractor-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("face.json");
        fs::write(&path, "[[0, 0], [10, 10]]").unwrap();

        let lm = LandmarkFileExtractor.extract(&path).unwrap().unwrap();
        assert_eq!(lm.len(), 2);
        fs::remove_dir_all(&dir).unwrap();
    }
}
