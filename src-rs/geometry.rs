//! Screen, element and image-intrinsic coordinate spaces.
//!
//! Annotations are always stored in image-intrinsic pixels. Pointer input
//! arrives in viewport space and is mapped through [`to_image_space`].

use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Native pixel dimensions of the base image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// On-screen bounding box of the rendered image element, in viewport pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ElementBounds {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl ElementBounds {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// Bounds of an element displayed at the image's native size.
    pub fn at_intrinsic(left: f64, top: f64, size: ImageSize) -> Self {
        Self::new(left, top, f64::from(size.width), f64::from(size.height))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MappingMode {
    /// Element-local pixels are taken as image pixels. Only correct while the
    /// element is displayed at its intrinsic resolution.
    #[default]
    Intrinsic,
    /// Element-local pixels are rescaled by `intrinsic / rendered` per axis.
    Scaled,
}

impl FromStr for MappingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "intrinsic" | "none" => Ok(Self::Intrinsic),
            "scaled" | "scale" => Ok(Self::Scaled),
            other => Err(format!("unknown mapping mode '{other}'")),
        }
    }
}

/// Maps a viewport point into image-intrinsic pixel space.
///
/// Points outside the element are not clamped; they stay valid positions.
pub fn to_image_space(
    screen: Point,
    bounds: ElementBounds,
    intrinsic: ImageSize,
    mode: MappingMode,
) -> Point {
    let local_x = screen.x - bounds.left;
    let local_y = screen.y - bounds.top;
    match mode {
        MappingMode::Intrinsic => Point::new(local_x, local_y),
        MappingMode::Scaled => Point::new(
            rescale(local_x, bounds.width, intrinsic.width),
            rescale(local_y, bounds.height, intrinsic.height),
        ),
    }
}

fn rescale(value: f64, rendered: f64, intrinsic: u32) -> f64 {
    if rendered.abs() <= f64::EPSILON || !rendered.is_finite() {
        return value;
    }
    value * f64::from(intrinsic) / rendered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intrinsic_mapping_subtracts_element_origin() {
        let bounds = ElementBounds::new(100.0, 40.0, 400.0, 300.0);
        let mapped = to_image_space(
            Point::new(110.0, 90.0),
            bounds,
            ImageSize::new(400, 300),
            MappingMode::Intrinsic,
        );
        assert_eq!(mapped, Point::new(10.0, 50.0));
    }

    #[test]
    fn intrinsic_mapping_ignores_display_scale() {
        let bounds = ElementBounds::new(0.0, 0.0, 200.0, 150.0);
        let mapped = to_image_space(
            Point::new(50.0, 50.0),
            bounds,
            ImageSize::new(400, 300),
            MappingMode::Intrinsic,
        );
        assert_eq!(mapped, Point::new(50.0, 50.0));
    }

    #[test]
    fn scaled_mapping_corrects_for_display_size() {
        let bounds = ElementBounds::new(20.0, 10.0, 200.0, 150.0);
        let mapped = to_image_space(
            Point::new(70.0, 60.0),
            bounds,
            ImageSize::new(400, 300),
            MappingMode::Scaled,
        );
        assert_eq!(mapped, Point::new(100.0, 100.0));
    }

    #[test]
    fn scaled_mapping_with_collapsed_element_falls_back_to_local() {
        let bounds = ElementBounds::new(5.0, 5.0, 0.0, 0.0);
        let mapped = to_image_space(
            Point::new(15.0, 25.0),
            bounds,
            ImageSize::new(400, 300),
            MappingMode::Scaled,
        );
        assert_eq!(mapped, Point::new(10.0, 20.0));
    }

    #[test]
    fn out_of_bounds_points_are_not_clamped() {
        let bounds = ElementBounds::new(100.0, 100.0, 400.0, 300.0);
        let mapped = to_image_space(
            Point::new(50.0, 700.0),
            bounds,
            ImageSize::new(400, 300),
            MappingMode::Intrinsic,
        );
        assert_eq!(mapped, Point::new(-50.0, 600.0));
    }

    #[test]
    fn mapping_mode_parses_aliases() {
        assert_eq!("Scaled".parse::<MappingMode>(), Ok(MappingMode::Scaled));
        assert_eq!(" none ".parse::<MappingMode>(), Ok(MappingMode::Intrinsic));
        assert!("zoom".parse::<MappingMode>().is_err());
    }
}
