use std::path::Path;

use anyhow::{anyhow, bail, Context as _};
use kurbo::{Point, Rect, Vec2};
use serde::Deserialize;
use wbb_geom::NormalizedPoint;

#[derive(Deserialize)]
struct RawPoint {
    x: f64,
    y: f64,
}

/// Reads a drawing from `path`.
///
/// Two formats are understood: a JSON array of `{"x": .., "y": ..}` objects, or plain text
/// with one `x,y` pair per line. With `fit`, the points are scaled into the drawing area
/// first; otherwise they must already be in it.
pub fn load(path: &Path, fit: bool) -> anyhow::Result<Vec<NormalizedPoint>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("couldn't read {}", path.display()))?;
    let points = parse(&text).with_context(|| format!("bad drawing in {}", path.display()))?;
    normalize(&points, fit)
}

pub fn parse(text: &str) -> anyhow::Result<Vec<Point>> {
    let points = if text.trim_start().starts_with('[') {
        let raw: Vec<RawPoint> = serde_json::from_str(text)?;
        raw.into_iter().map(|p| Point::new(p.x, p.y)).collect()
    } else {
        parse_pairs(text)?
    };

    if let Some(i) = points.iter().position(|p| !p.is_finite()) {
        bail!("point {} is not a number: {:?}", i + 1, points[i]);
    }
    Ok(points)
}

fn parse_pairs(text: &str) -> anyhow::Result<Vec<Point>> {
    let mut points = Vec::new();
    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let bad = || anyhow!("line {}: expected \"x,y\", got {line:?}", i + 1);
        let (x, y) = line.split_once(',').ok_or_else(bad)?;
        let x = x.trim().parse::<f64>().map_err(|_| bad())?;
        let y = y.trim().parse::<f64>().map_err(|_| bad())?;
        points.push(Point::new(x, y));
    }
    Ok(points)
}

/// Turns parsed points into positions, scaling them to fit if asked to.
pub fn normalize(points: &[Point], fit: bool) -> anyhow::Result<Vec<NormalizedPoint>> {
    let fitted;
    let points: &[Point] = if fit {
        fitted = fit_to_unit_square(points);
        &fitted
    } else {
        points
    };
    points
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let q = NormalizedPoint::new(p.x, p.y)?;
            if !q.is_in_unit_square() {
                bail!("point {} at {q} is outside of the drawing area (try --fit)", i + 1);
            }
            Ok(q)
        })
        .collect()
}

/// Scales `points` proportionally so that they fill the unit square in one direction, and
/// centers them in the other.
pub fn fit_to_unit_square(points: &[Point]) -> Vec<Point> {
    let Some(first) = points.first() else {
        return Vec::new();
    };
    let bbox = points
        .iter()
        .fold(Rect::from_points(*first, *first), |r, p| r.union_pt(*p));
    let extent = bbox.width().max(bbox.height());
    if extent == 0.0 {
        return vec![Point::new(0.5, 0.5); points.len()];
    }
    let scale = 1.0 / extent;
    let offset = Vec2::new(
        (1.0 - bbox.width() * scale) / 2.0,
        (1.0 - bbox.height() * scale) / 2.0,
    );
    points
        .iter()
        .map(|p| ((*p - bbox.origin()) * scale).to_point() + offset)
        .map(|p| Point::new(p.x.clamp(0.0, 1.0), p.y.clamp(0.0, 1.0)))
        .collect()
}
