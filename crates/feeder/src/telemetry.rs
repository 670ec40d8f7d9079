use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
    time::Duration,
};

use anyhow::Context as _;
use log::info;
use wbb_plotter::{report, MotorDriver, PositionMonitor, TelemetrySink};
use wbb_protocol::Snapshot;

/// Writes each snapshot to the log.
pub struct LogSink;

impl TelemetrySink for LogSink {
    fn publish(&mut self, snapshot: &Snapshot) -> anyhow::Result<()> {
        let fields: Vec<_> = snapshot
            .entries()
            .iter()
            .map(|(k, v)| format!("{k}={v:.3}"))
            .collect();
        info!("telemetry {}", fields.join(" "));
        Ok(())
    }
}

/// Writes each snapshot as one line of JSON.
pub struct JsonLinesSink<W> {
    out: W,
}

impl JsonLinesSink<BufWriter<File>> {
    pub fn create(path: &Path) -> anyhow::Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("couldn't create {}", path.display()))?;
        Ok(JsonLinesSink::new(BufWriter::new(file)))
    }
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        JsonLinesSink { out }
    }
}

impl<W: Write> TelemetrySink for JsonLinesSink<W> {
    fn publish(&mut self, snapshot: &Snapshot) -> anyhow::Result<()> {
        serde_json::to_writer(&mut self.out, snapshot)?;
        writeln!(self.out)?;
        self.out.flush()?;
        Ok(())
    }
}

pub fn sink(path: Option<&Path>) -> anyhow::Result<Box<dyn TelemetrySink + Send>> {
    Ok(match path {
        Some(p) => Box::new(JsonLinesSink::create(p)?),
        None => Box::new(LogSink),
    })
}

/// Publishes a snapshot every `period`, forever. Only ever reads positions.
pub async fn run<D: MotorDriver>(
    monitor: PositionMonitor<D>,
    mut sink: Box<dyn TelemetrySink + Send>,
    period: Duration,
) {
    let mut interval = tokio::time::interval(period.max(Duration::from_millis(10)));
    loop {
        interval.tick().await;
        report(&monitor, sink.as_mut());
    }
}
