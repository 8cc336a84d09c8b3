use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::StreamExt;
use location_tracker::{
    Coordinate, EngineConfig, FileLocationRepository, SimulatedSource, Subscription,
    TrackingEngine, TrackingEvent,
};
use tracing::{debug, info, warn};

const START_LATITUDE: f64 = 41.0082;
const START_LONGITUDE: f64 = 28.9784;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let store =
        std::env::var("TRACKER_STORE").unwrap_or_else(|_| "tracked_locations.json".to_string());
    let steps: usize = env_or("TRACKER_STEPS", 20)?;
    let step_meters: f64 = env_or("TRACKER_STEP_METERS", 5.0)?;

    let start = Coordinate::new(START_LATITUDE, START_LONGITUDE)?;
    let repository = Arc::new(FileLocationRepository::new(&store));
    let source = Arc::new(SimulatedSource::new(start));

    let (engine, events) =
        TrackingEngine::start(EngineConfig::default(), repository, source.clone()).await;
    source.attach(engine.source_sink());

    info!(
        session_id = %engine.session_id(),
        store = %store,
        steps,
        step_meters,
        "Simulation starting"
    );

    let observer = tokio::spawn(log_events(events));

    engine.request_permission().await?;
    engine.start_tracking().await?;

    let mut walk =
        Box::pin(Arc::clone(&source).random_walk(step_meters, steps, Duration::from_millis(200)));
    while let Some(sample) = walk.next().await {
        debug!(sample = %sample, "Moved");
    }

    engine.stop_tracking().await?;
    engine.flush().await?;

    let history = engine.history().await?;
    info!(
        recorded = history.len(),
        last = ?history.last().map(|point| point.to_string()),
        "Simulation finished"
    );

    engine.shutdown().await;
    observer.await?;

    Ok(())
}

async fn log_events(mut events: Subscription) {
    while let Some(event) = events.recv().await {
        match event {
            TrackingEvent::TrackedPointAdded(point) => info!(point = %point, "Recorded point"),
            TrackingEvent::PositionUpdated(point) => debug!(point = %point, "Position updated"),
            TrackingEvent::ErrorRaised(e) => warn!(error = %e, "Tracking error"),
            other => info!(event = ?other, "Tracking event"),
        }
    }
}

fn env_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(value) => value
            .parse()
            .with_context(|| format!("{name} has an invalid value: {value}")),
        Err(_) => Ok(default),
    }
}
