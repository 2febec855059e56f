use serde::{Deserialize, Serialize};

/// Linear RGBA, each channel in `0..=1`.
pub type Rgba = [f32; 4];

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeometryStyle {
    pub fill_color: Rgba,
    pub line_color: Rgba,
    pub stroke_color: Rgba,
    /// Screen pixels.
    pub line_width: f32,
    pub stroke_width: f32,
}

impl Default for GeometryStyle {
    fn default() -> Self {
        Self {
            fill_color: [0.19, 0.62, 0.85, 0.4],
            line_color: [0.19, 0.62, 0.85, 1.0],
            stroke_color: [1.0, 1.0, 1.0, 0.95],
            line_width: 3.0,
            stroke_width: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::GeometryStyle;

    #[test]
    fn partial_style_keeps_defaults() {
        let style: GeometryStyle = serde_json::from_str(r#"{"line_width":1.5}"#).unwrap();
        assert_eq!(style.line_width, 1.5);
        assert_eq!(style.fill_color, GeometryStyle::default().fill_color);
    }
}
