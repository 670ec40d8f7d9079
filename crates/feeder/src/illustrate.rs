use std::path::Path;

use log::{info, warn};
use svg::{
    node::element::{path::Data, Circle, Path as SvgPath, Rectangle},
    Document,
};
use wbb_geom::{LeftRight, NormalizedPoint};
use wbb_plotter::{sim::SimulatedMotor, PositionMonitor};

// Browsers don't like tiny SVGs, so the unit square is drawn this big.
const SIZE: f64 = 1000.0;

/// Where the head went during a simulated run, one point per synchronized move.
pub fn trajectory(
    left: &SimulatedMotor,
    right: &SimulatedMotor,
    monitor: &PositionMonitor<SimulatedMotor>,
) -> Vec<NormalizedPoint> {
    let lefts = left.synchronized_targets();
    let rights = right.synchronized_targets();
    if lefts.len() != rights.len() {
        warn!(
            "the motors made a different number of moves ({} and {})",
            lefts.len(),
            rights.len()
        );
    }
    lefts
        .into_iter()
        .zip(rights)
        .filter_map(|(l, r)| match monitor.point_at_counts(LeftRight::new(l, r)) {
            Ok(p) => Some(p),
            Err(e) => {
                warn!("can't draw the move to ({l}, {r}): {e}");
                None
            }
        })
        .collect()
}

pub fn document(points: &[NormalizedPoint]) -> Document {
    let board = Rectangle::new()
        .set("width", SIZE)
        .set("height", SIZE)
        .set("fill", "none")
        .set("stroke", "lightgray")
        .set("stroke-width", 2);
    let mut document = Document::new()
        .set("viewBox", (-0.05 * SIZE, -0.05 * SIZE, 1.1 * SIZE, 1.1 * SIZE))
        .add(board);

    if let Some((first, rest)) = points.split_first() {
        let mut data = Data::new().move_to((first.x() * SIZE, first.y() * SIZE));
        for p in rest {
            data = data.line_to((p.x() * SIZE, p.y() * SIZE));
        }
        document = document.add(
            SvgPath::new()
                .set("fill", "none")
                .set("stroke", "black")
                .set("stroke-width", 1)
                .set("d", data),
        );
    }
    for p in points {
        document = document.add(
            Circle::new()
                .set("cx", p.x() * SIZE)
                .set("cy", p.y() * SIZE)
                .set("r", 2.0)
                .set("fill", "blue"),
        );
    }
    document
}

pub fn write(
    path: &Path,
    left: &SimulatedMotor,
    right: &SimulatedMotor,
    monitor: &PositionMonitor<SimulatedMotor>,
) -> anyhow::Result<()> {
    let points = trajectory(left, right, monitor);
    svg::save(path, &document(&points))?;
    info!("wrote {} moves to {}", points.len(), path.display());
    Ok(())
}
