// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the scada-acquisition project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Scan cycle snapshots and their consumers

use std::fmt;
use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use log::{debug, error};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use super::TagValue;

/// Values read during one scan cycle.
///
/// Only successfully read tags carry a value, in tag map declaration order.
/// Tags whose read failed this cycle are listed by [`Snapshot::failed`], so a
/// consumer can tell a failed read from a tag that is not configured.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    cycle: u64,
    taken_at: DateTime<Utc>,
    #[serde(serialize_with = "serialize_values")]
    values: Vec<(String, TagValue)>,
    failed: Vec<String>,
}

fn serialize_values<S: Serializer>(
    values: &[(String, TagValue)],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(values.len()))?;
    for (name, value) in values {
        map.serialize_entry(name, value)?;
    }
    map.end()
}

impl Snapshot {
    /// Start an empty snapshot for scan cycle `cycle`.
    pub fn new(cycle: u64) -> Self {
        Self {
            cycle,
            taken_at: Utc::now(),
            values: Vec::new(),
            failed: Vec::new(),
        }
    }

    pub(crate) fn insert(&mut self, name: impl Into<String>, value: TagValue) {
        self.values.push((name.into(), value));
    }

    pub(crate) fn record_failure(&mut self, name: impl Into<String>) {
        self.failed.push(name.into());
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }

    pub fn get(&self, name: &str) -> Option<TagValue> {
        self.values
            .iter()
            .find(|(tag, _)| tag == name)
            .map(|(_, value)| *value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, TagValue)> {
        self.values.iter().map(|(name, value)| (name.as_str(), *value))
    }

    /// Tags that could not be read this cycle, in declaration order.
    pub fn failed(&self) -> &[String] {
        &self.failed
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// An empty snapshot means acquisition was degraded for the whole cycle.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cycle {} at {}:",
            self.cycle,
            self.taken_at.format("%Y-%m-%d %H:%M:%S%.3f")
        )?;
        for (name, value) in &self.values {
            write!(f, " {name}={value}")?;
        }
        if !self.failed.is_empty() {
            write!(f, " (failed: {})", self.failed.join(", "))?;
        }
        Ok(())
    }
}

/// Consumer of scan cycle snapshots.
///
/// Any `FnMut(&Snapshot) -> anyhow::Result<()>` closure is a handler.
#[async_trait]
pub trait SnapshotHandler: Send {
    async fn handle(&mut self, snapshot: &Snapshot) -> anyhow::Result<()>;
}

#[async_trait]
impl<F> SnapshotHandler for F
where
    F: FnMut(&Snapshot) -> anyhow::Result<()> + Send,
{
    async fn handle(&mut self, snapshot: &Snapshot) -> anyhow::Result<()> {
        self(snapshot)
    }
}

/// Hand a snapshot to a handler, absorbing its errors and panics.
pub(crate) async fn deliver(handler: &mut dyn SnapshotHandler, snapshot: &Snapshot) {
    match AssertUnwindSafe(handler.handle(snapshot)).catch_unwind().await {
        Ok(Ok(())) => debug!("Snapshot of cycle {} delivered", snapshot.cycle),
        Ok(Err(e)) => error!("Snapshot handler failed on cycle {}: {:#}", snapshot.cycle, e),
        Err(_) => error!("Snapshot handler panicked on cycle {}", snapshot.cycle),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Snapshot {
        let mut snapshot = Snapshot::new(7);
        snapshot.insert("engine_temp_1", TagValue::Number(87.5));
        snapshot.insert("pump_1_status", TagValue::Bool(true));
        snapshot.record_failure("flight_hours");
        snapshot.insert("cycles_count", TagValue::Integer(850));
        snapshot
    }

    #[test]
    fn test_values_keep_insertion_order() {
        let snapshot = sample();
        let names: Vec<&str> = snapshot.iter().map(|(name, _)| name).collect();
        assert_eq!(names, ["engine_temp_1", "pump_1_status", "cycles_count"]);
        assert_eq!(snapshot.get("pump_1_status"), Some(TagValue::Bool(true)));
        assert_eq!(snapshot.get("flight_hours"), None);
        assert_eq!(snapshot.failed(), ["flight_hours".to_string()]);
        assert_eq!(snapshot.len(), 3);
    }

    #[test]
    fn test_json_form_is_an_ordered_mapping() {
        let json = serde_json::to_string(&sample()).unwrap();
        assert!(json.contains(
            r#""values":{"engine_temp_1":87.5,"pump_1_status":true,"cycles_count":850}"#
        ));
        assert!(json.contains(r#""failed":["flight_hours"]"#));
        assert!(json.contains(r#""cycle":7"#));
    }

    #[tokio::test]
    async fn test_closure_handler_receives_snapshot() {
        let mut seen = Vec::new();
        let mut handler = |snapshot: &Snapshot| -> anyhow::Result<()> {
            seen.push(snapshot.cycle());
            Ok(())
        };
        deliver(&mut handler, &sample()).await;
        deliver(&mut handler, &Snapshot::new(8)).await;
        assert_eq!(seen, [7, 8]);
    }

    #[tokio::test]
    async fn test_failing_and_panicking_handlers_are_absorbed() {
        let mut failing = |_: &Snapshot| -> anyhow::Result<()> { anyhow::bail!("consumer offline") };
        deliver(&mut failing, &sample()).await;

        let mut panicking = |_: &Snapshot| -> anyhow::Result<()> { panic!("consumer bug") };
        deliver(&mut panicking, &sample()).await;
    }
}
