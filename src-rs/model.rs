//! Persisted annotation records and their wire form.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

use crate::color::parse_color;
use crate::error::InputError;
use crate::geometry::Point;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    #[default]
    Stroke,
    Text,
}

impl FromStr for Tool {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stroke" | "draw" | "pen" => Ok(Self::Stroke),
            "text" => Ok(Self::Text),
            other => Err(format!("unknown tool '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextLabel {
    pub x: f64,
    pub y: f64,
    pub text: String,
}

impl TextLabel {
    pub fn anchor(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

/// Shape of one annotation. Serialized as the `kind` / `geometry` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "geometry", rename_all = "lowercase")]
pub enum Geometry {
    Stroke(Vec<Point>),
    Text(TextLabel),
}

impl Geometry {
    pub fn tool(&self) -> Tool {
        match self {
            Self::Stroke(_) => Tool::Stroke,
            Self::Text(_) => Tool::Text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    pub id: String,
    #[serde(flatten)]
    pub geometry: Geometry,
    pub color: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl Annotation {
    /// Checks the invariants a renderable record must hold.
    pub fn validate(&self) -> Result<(), InputError> {
        match &self.geometry {
            Geometry::Stroke(points) if points.is_empty() => {
                return Err(InputError::EmptyStroke {
                    id: self.id.clone(),
                })
            }
            Geometry::Text(label) if label.text.trim().is_empty() => {
                return Err(InputError::EmptyText {
                    id: self.id.clone(),
                })
            }
            _ => {}
        }
        parse_color(&self.color)?;
        Ok(())
    }
}

/// Ordered annotations of one image. Order is creation order and z-order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnnotationSet(Vec<Annotation>);

/// A stored record that could not be decoded into an [`Annotation`].
#[derive(Debug, Clone, Serialize)]
pub struct RejectedRecord {
    pub index: usize,
    pub id: Option<String>,
    pub reason: String,
}

impl AnnotationSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, annotation: Annotation) {
        self.0.push(annotation);
    }

    pub fn as_slice(&self) -> &[Annotation] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Annotation> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_vec(self) -> Vec<Annotation> {
        self.0
    }

    pub fn to_json_pretty(&self) -> Result<String, InputError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Strict decode: any bad record fails the whole set.
    pub fn from_json(raw: &str) -> Result<Self, InputError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Decodes record by record, keeping every well-formed one in order.
    ///
    /// Accepts either a bare array or an object carrying an `annotations`
    /// array; any other top-level shape is an error rather than an empty set.
    pub fn from_json_lenient(raw: &str) -> Result<(Self, Vec<RejectedRecord>), InputError> {
        let value: Value = serde_json::from_str(raw)?;
        let records = match value {
            Value::Array(items) => items,
            Value::Object(mut obj) => match obj.remove("annotations") {
                Some(Value::Array(items)) => items,
                Some(_) => return Err(InputError::SetShape("a non-array `annotations` field")),
                None => return Err(InputError::SetShape("an object without `annotations`")),
            },
            other => return Err(InputError::SetShape(json_kind(&other))),
        };

        let mut set = Self::new();
        let mut rejected = Vec::new();
        for (index, record) in records.into_iter().enumerate() {
            let id = record
                .get("id")
                .and_then(Value::as_str)
                .map(ToString::to_string);
            match serde_json::from_value::<Annotation>(record) {
                Ok(annotation) => set.push(annotation),
                Err(err) => rejected.push(RejectedRecord {
                    index,
                    id,
                    reason: err.to_string(),
                }),
            }
        }
        Ok((set, rejected))
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

impl From<Vec<Annotation>> for AnnotationSet {
    fn from(items: Vec<Annotation>) -> Self {
        Self(items)
    }
}

impl<'a> IntoIterator for &'a AnnotationSet {
    type Item = &'a Annotation;
    type IntoIter = std::slice::Iter<'a, Annotation>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::TimeZone;
    use serde_json::json;

    fn stamp() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap()
    }

    fn stroke(id: &str, points: Vec<Point>) -> Annotation {
        Annotation {
            id: id.to_string(),
            geometry: Geometry::Stroke(points),
            color: "#FF0000".to_string(),
            created_by: "dr-a".to_string(),
            created_at: stamp(),
        }
    }

    #[test]
    fn stroke_uses_documented_wire_form() {
        let ann = stroke("ann-1", vec![Point::new(1.0, 2.0), Point::new(3.5, 4.0)]);
        let value = serde_json::to_value(&ann).unwrap();
        assert_eq!(
            value,
            json!({
                "id": "ann-1",
                "kind": "stroke",
                "geometry": [{"x": 1.0, "y": 2.0}, {"x": 3.5, "y": 4.0}],
                "color": "#FF0000",
                "createdBy": "dr-a",
                "createdAt": "2024-05-01T09:30:00Z",
            })
        );
    }

    #[test]
    fn text_decodes_from_wire_form() {
        let raw = json!({
            "id": "ann-2",
            "kind": "text",
            "geometry": {"x": 100, "y": 100, "text": "NPDR"},
            "color": "#00FF00",
            "createdBy": "dr-a",
            "createdAt": "2024-05-01T09:30:00Z",
        });
        let ann: Annotation = serde_json::from_value(raw).unwrap();
        assert_eq!(
            ann.geometry,
            Geometry::Text(TextLabel {
                x: 100.0,
                y: 100.0,
                text: "NPDR".to_string(),
            })
        );
        assert_eq!(ann.geometry.tool(), Tool::Text);
    }

    #[test]
    fn validate_flags_empty_stroke_and_bad_color() {
        assert_matches!(
            stroke("s", Vec::new()).validate(),
            Err(InputError::EmptyStroke { id }) if id == "s"
        );
        let mut ann = stroke("c", vec![Point::new(0.0, 0.0)]);
        ann.color = "tomato".to_string();
        assert_matches!(ann.validate(), Err(InputError::InvalidColor(_)));
    }

    #[test]
    fn lenient_decode_keeps_good_records_in_order() {
        let raw = json!({
            "annotations": [
                serde_json::to_value(stroke("a", vec![Point::new(0.0, 0.0)])).unwrap(),
                {"id": "broken", "kind": "stroke", "geometry": "not points"},
                serde_json::to_value(stroke("b", vec![Point::new(1.0, 1.0)])).unwrap(),
            ]
        })
        .to_string();
        let (set, rejected) = AnnotationSet::from_json_lenient(&raw).unwrap();
        let ids: Vec<&str> = set.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].index, 1);
        assert_eq!(rejected[0].id.as_deref(), Some("broken"));
    }

    #[test]
    fn lenient_decode_rejects_unexpected_top_level_shapes() {
        for raw in ["{}", r#"{"annotations": 5}"#, "42", "\"text\"", "null"] {
            assert_matches!(
                AnnotationSet::from_json_lenient(raw),
                Err(InputError::SetShape(_)),
                "{raw}"
            );
        }
        let (set, rejected) = AnnotationSet::from_json_lenient(r#"{"annotations": []}"#).unwrap();
        assert!(set.is_empty() && rejected.is_empty());
    }

    #[test]
    fn set_serializes_as_bare_array() {
        let set = AnnotationSet::from(vec![stroke("a", vec![Point::new(0.0, 0.0)])]);
        let value = serde_json::to_value(&set).unwrap();
        assert!(value.is_array());
        assert_eq!(AnnotationSet::from_json(&value.to_string()).unwrap(), set);
    }

    #[test]
    fn tool_accepts_legacy_draw_name() {
        assert_eq!("draw".parse::<Tool>(), Ok(Tool::Stroke));
        assert_eq!("TEXT".parse::<Tool>(), Ok(Tool::Text));
    }
}
