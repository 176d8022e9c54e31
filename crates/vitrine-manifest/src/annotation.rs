use serde::{Deserialize, Serialize};

use crate::extension::ExtensionMap;

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// A labeled location in the scene. Independent of any data entry.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default)]
    pub position: Vec3,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera_position: Option<Vec3>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera_target: Option<Vec3>,
    #[serde(flatten)]
    pub extensions: ExtensionMap,
}

impl Annotation {
    pub fn new(id: impl Into<String>, title: impl Into<String>, position: Vec3) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            position,
            ..Self::default()
        }
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_camera(mut self, position: Vec3, target: Vec3) -> Self {
        self.camera_position = Some(position);
        self.camera_target = Some(target);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn annotation_without_camera() {
        let a = Annotation::new("a1", "Crack", Vec3::new(1.0, 0.5, -2.0)).with_body("hairline");
        let value = serde_json::to_value(&a).unwrap();
        assert_eq!(
            value,
            json!({
                "id": "a1",
                "title": "Crack",
                "body": "hairline",
                "position": { "x": 1.0, "y": 0.5, "z": -2.0 }
            })
        );
    }

    #[test]
    fn annotation_requires_title() {
        let result: Result<Annotation, _> =
            serde_json::from_value(json!({ "id": "a1", "position": { "x": 0, "y": 0, "z": 0 } }));
        assert!(result.is_err());
    }
}
