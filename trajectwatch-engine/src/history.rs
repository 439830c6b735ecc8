use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use trajectwatch_protocol::{AlignedRow, Direction, Measurement, Traject};

use crate::log::MeasurementLog;

/// Reads a traject's log back as history.
#[derive(Clone)]
pub struct HistoryReader {
    log: MeasurementLog,
}

impl HistoryReader {
    pub fn new(log: MeasurementLog) -> Self {
        Self { log }
    }

    pub fn log(&self) -> &MeasurementLog {
        &self.log
    }

    /// Raw records in append order. Not re-sorted.
    pub async fn history_for(&self, traject: &Traject) -> Vec<Measurement> {
        self.log.read_all(&traject.log_file).await
    }

    /// History restricted by `query`, with direction series and the aligned table.
    pub async fn view(&self, traject: &Traject, query: &HistoryQuery) -> HistoryView {
        let records = query.apply(self.history_for(traject).await);
        HistoryView::build(traject.clone(), records)
    }
}

/// Optional restrictions applied to a history read.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryQuery {
    /// Keep only records from this UTC calendar day.
    #[serde(default)]
    pub date: Option<NaiveDate>,
    /// Keep only the last `limit` records (after the day filter).
    #[serde(default)]
    pub limit: Option<usize>,
}

impl HistoryQuery {
    pub fn apply(&self, records: Vec<Measurement>) -> Vec<Measurement> {
        let mut records = match self.date {
            Some(day) => filter_day(records, day),
            None => records,
        };
        if let Some(limit) = self.limit {
            let skip = records.len().saturating_sub(limit);
            records.drain(..skip);
        }
        records
    }
}

/// Forward and reverse series of a traject's history.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DirectionalSeries {
    pub forward: Vec<Measurement>,
    pub reverse: Vec<Measurement>,
}

/// Everything the dashboard needs to draw one traject.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryView {
    pub traject: Traject,
    pub records: Vec<Measurement>,
    pub forward: Vec<Measurement>,
    pub reverse: Vec<Measurement>,
    pub rows: Vec<AlignedRow>,
}

impl HistoryView {
    pub fn build(traject: Traject, records: Vec<Measurement>) -> Self {
        let DirectionalSeries { forward, reverse } = split_by_direction(&traject, &records);
        let rows = align_by_minute(&traject, &records);
        Self {
            traject,
            records,
            forward,
            reverse,
            rows,
        }
    }
}

/// Splits records into forward/reverse by their endpoints.
///
/// Records matching neither orientation of the traject are dropped.
pub fn split_by_direction(traject: &Traject, records: &[Measurement]) -> DirectionalSeries {
    let mut series = DirectionalSeries::default();
    for record in records {
        match traject.direction_of(&record.origin, &record.destination) {
            Some(Direction::Forward) => series.forward.push(record.clone()),
            Some(Direction::Reverse) => series.reverse.push(record.clone()),
            None => {}
        }
    }
    series
}

/// Pairs forward and reverse records whose timestamps floor to the same minute.
///
/// Rows come out in ascending minute order. When one direction has several
/// records in a minute the last one in append order wins; a direction with no
/// record in that minute is `None`.
pub fn align_by_minute(traject: &Traject, records: &[Measurement]) -> Vec<AlignedRow> {
    let mut minutes: BTreeMap<_, (Option<Measurement>, Option<Measurement>)> = BTreeMap::new();

    for record in records {
        let Some(direction) = traject.direction_of(&record.origin, &record.destination) else {
            continue;
        };
        let slot = minutes.entry(record.minute()).or_default();
        match direction {
            Direction::Forward => slot.0 = Some(record.clone()),
            Direction::Reverse => slot.1 = Some(record.clone()),
        }
    }

    minutes
        .into_iter()
        .map(|(minute, (forward, reverse))| AlignedRow {
            minute,
            forward,
            reverse,
        })
        .collect()
}

/// Records whose timestamp falls on `day` (UTC).
pub fn filter_day(records: Vec<Measurement>, day: NaiveDate) -> Vec<Measurement> {
    records
        .into_iter()
        .filter(|record| record.timestamp.date_naive() == day)
        .collect()
}
