use crate::config::ContourParams;
use crate::error::{Result, VisionError};
use crate::models::{BoundingBox, Region};
use image::GrayImage;
use imageproc::contours::{find_contours, BorderType};
use imageproc::geometry::arc_length;
use imageproc::point::Point;

/// One traced border of the binary mask
#[derive(Debug, Clone)]
pub struct TracedContour {
    pub points: Vec<Point<i32>>,
    pub border_type: BorderType,
}

/// Traces contours in a binary mask.
///
/// Implementations return outer borders and hole borders, in traversal order.
pub trait ContourExtractor: Send + Sync {
    fn extract(&self, mask: &GrayImage) -> Result<Vec<TracedContour>>;
}

/// Border following from `imageproc`
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageprocExtractor;

impl ContourExtractor for ImageprocExtractor {
    fn extract(&self, mask: &GrayImage) -> Result<Vec<TracedContour>> {
        if mask.width() == 0 || mask.height() == 0 {
            return Err(VisionError::ContourExtraction("mask is empty".to_string()));
        }
        if let Some(value) = mask.pixels().map(|p| p[0]).find(|v| *v != 0 && *v != 255) {
            return Err(VisionError::ContourExtraction(format!(
                "mask is not binary (found value {})",
                value
            )));
        }

        Ok(find_contours::<i32>(mask)
            .into_iter()
            .map(|contour| TracedContour {
                points: contour.points,
                border_type: contour.border_type,
            })
            .collect())
    }
}

/// Polygon area of a closed contour (shoelace formula)
pub fn polygon_area(points: &[Point<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let twice_area: i64 = points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64)
        .sum();
    twice_area.abs() as f64 / 2.0
}

/// Inclusive axis-aligned box around the points
pub fn bounding_box(points: &[Point<i32>]) -> Option<BoundingBox> {
    let first = points.first()?;
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
    for p in points {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    if min_x < 0 || min_y < 0 {
        return None;
    }
    Some(BoundingBox::from_extremes(
        min_x as u32,
        min_y as u32,
        max_x as u32,
        max_y as u32,
    ))
}

/// Compute features for every traced contour and keep those inside the area bounds
pub fn regions_from_contours(contours: &[TracedContour], params: &ContourParams) -> Vec<Region> {
    contours
        .iter()
        .enumerate()
        .filter_map(|(index, contour)| {
            let bbox = bounding_box(&contour.points)?;
            if bbox.width == 0 || bbox.height == 0 {
                return None;
            }

            let area = polygon_area(&contour.points);
            if !params.accepts_area(area) {
                return None;
            }

            Some(Region {
                index,
                bounding_box: bbox,
                area,
                perimeter: arc_length(&contour.points, true),
                aspect_ratio: bbox.aspect_ratio(),
                synthetic: false,
            })
        })
        .collect()
}

/// Trace `mask` and return the regions that pass the area filter
pub fn find_regions(
    extractor: &dyn ContourExtractor,
    mask: &GrayImage,
    params: &ContourParams,
) -> Result<Vec<Region>> {
    let contours = extractor.extract(mask)?;
    Ok(regions_from_contours(&contours, params))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(side: i32) -> Vec<Point<i32>> {
        vec![
            Point::new(0, 0),
            Point::new(side, 0),
            Point::new(side, side),
            Point::new(0, side),
        ]
    }

    #[test]
    fn test_polygon_area_of_square() {
        assert_eq!(polygon_area(&square(40)), 1600.0);
    }

    #[test]
    fn test_polygon_area_ignores_winding() {
        let mut reversed = square(10);
        reversed.reverse();
        assert_eq!(polygon_area(&reversed), 100.0);
    }

    #[test]
    fn test_degenerate_contours_have_no_area() {
        assert_eq!(polygon_area(&[Point::new(3, 3)]), 0.0);
        assert_eq!(polygon_area(&[Point::new(0, 0), Point::new(5, 0)]), 0.0);
    }

    #[test]
    fn test_bounding_box_is_inclusive() {
        let bbox = bounding_box(&square(9)).unwrap();
        assert_eq!((bbox.width, bbox.height), (10, 10));
    }

    #[test]
    fn test_non_binary_mask_is_rejected() {
        let mask = GrayImage::from_pixel(4, 4, image::Luma([12]));
        assert!(ImageprocExtractor.extract(&mask).is_err());
    }

    #[test]
    fn test_filter_keeps_traversal_index() {
        let contours = vec![
            TracedContour {
                points: square(5),
                border_type: BorderType::Outer,
            },
            TracedContour {
                points: square(40),
                border_type: BorderType::Outer,
            },
        ];
        let regions = regions_from_contours(&contours, &ContourParams::default());
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].index, 1);
        assert_eq!(regions[0].aspect_ratio, 1.0);
    }
}
