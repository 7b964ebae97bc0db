//! Bounded cache of open archive handles.
//!
//! The cache keeps at most `handles_per_parameter` open sub-interval handles for
//! each parameter (one by default). A request for a year outside every cached
//! sub-interval evicts the least recently used handle, then scans the available
//! download intervals in order. Callers alternating between years far apart for
//! the same parameter therefore pay for a reopen on every switch; batching
//! requests by parameter and time avoids this.

use super::{ArchiveBackend, ArchiveReader, DOWNLOAD_INTERVALS};
use crate::errors::{PaleoError, PaleoResult};
use crate::grid::Grid;
use crate::months::month_name;
use crate::naming::{archive_key, archive_record_name};
use crate::parameters::ParameterId;
use crate::time::{YearAD, YearPoint, YearSpan};
use log::{debug, warn};
use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::rc::Rc;

/// One open archive positioned on a sub-interval group
#[derive(Debug, Clone)]
struct CacheEntry {
    download_interval: YearSpan,
    sub_interval: String,
    coverage: YearSpan,
    reader: Rc<dyn ArchiveReader>,
}

#[derive(Debug)]
pub struct ArchiveHandleCache {
    backend: Box<dyn ArchiveBackend>,
    window: u32,
    handles_per_parameter: NonZeroUsize,
    /// Open groups of each parameter keyed by sub-interval label
    entries: HashMap<ParameterId, LruCache<String, CacheEntry>>,
    available: HashMap<ParameterId, Vec<YearSpan>>,
    opens: usize,
}

impl ArchiveHandleCache {
    pub fn new(backend: Box<dyn ArchiveBackend>, window: u32, handles_per_parameter: usize) -> Self {
        Self {
            backend,
            window,
            handles_per_parameter: NonZeroUsize::new(handles_per_parameter)
                .unwrap_or(NonZeroUsize::MIN),
            entries: HashMap::new(),
            available: HashMap::new(),
            opens: 0,
        }
    }

    /// Re-check which archive files are present for every gridded parameter
    pub fn refresh_available(&mut self) {
        self.available = ParameterId::GRIDDED
            .iter()
            .map(|parameter| (*parameter, self.scan_available(*parameter)))
            .collect();
    }

    fn scan_available(&self, parameter: ParameterId) -> Vec<YearSpan> {
        DOWNLOAD_INTERVALS
            .iter()
            .filter(|interval| {
                archive_key(parameter, interval)
                    .map(|key| self.backend.exists(&key))
                    .unwrap_or(false)
            })
            .copied()
            .collect()
    }

    /// Download intervals with an archive present for `parameter`
    pub fn available_intervals(&mut self, parameter: ParameterId) -> Vec<YearSpan> {
        if !self.available.contains_key(&parameter) {
            let intervals = self.scan_available(parameter);
            self.available.insert(parameter, intervals);
        }
        self.available.get(&parameter).cloned().unwrap_or_default()
    }

    pub fn has_archives(&mut self, parameter: ParameterId) -> bool {
        !self.available_intervals(parameter).is_empty()
    }

    /// Whether archives covering every year of `span` are present
    pub fn data_present(&mut self, parameter: ParameterId, span: &YearSpan) -> bool {
        let available = self.available_intervals(parameter);
        super::download_intervals_required(span)
            .iter()
            .all(|required| available.contains(required))
    }

    /// Sub-interval label currently cached for a parameter (most recent first)
    pub fn cached_sub_intervals(&self, parameter: ParameterId) -> Vec<String> {
        self.entries
            .get(&parameter)
            .map(|entries| entries.iter().map(|(label, _)| label.clone()).collect())
            .unwrap_or_default()
    }

    /// Number of archive files opened since creation
    pub fn open_count(&self) -> usize {
        self.opens
    }

    /// Close every cached handle
    pub fn clear(&mut self) {
        if !self.entries.is_empty() {
            debug!("Closing {} cached archive parameter(s)", self.entries.len());
        }
        self.entries.clear();
    }

    /// Read one month of one year for a parameter
    pub fn read_month(
        &mut self,
        parameter: ParameterId,
        year_ad: YearAD,
        month_index: usize,
    ) -> PaleoResult<Grid> {
        let entry = match self.cached_entry(parameter, year_ad) {
            Some(entry) => entry,
            None => self.open_entry(parameter, year_ad, month_index)?,
        };
        self.read_from(&entry, parameter, year_ad, month_index)
    }

    fn cached_entry(&mut self, parameter: ParameterId, year_ad: YearAD) -> Option<CacheEntry> {
        let entries = self.entries.get_mut(&parameter)?;
        let label = entries
            .iter()
            .find(|(_, entry)| entry.coverage.contains(year_ad))
            .map(|(label, _)| label.clone())?;
        entries.get(&label).cloned()
    }

    fn open_entry(
        &mut self,
        parameter: ParameterId,
        year_ad: YearAD,
        month_index: usize,
    ) -> PaleoResult<CacheEntry> {
        self.evict_for(parameter);

        for interval in self.available_intervals(parameter) {
            if !interval.expanded(self.window).contains(year_ad) {
                continue;
            }
            let reader = self.reader_for(parameter, &interval)?;
            for label in reader.sub_intervals() {
                let coverage: YearSpan = match label.parse() {
                    Ok(span) => span,
                    Err(_) => {
                        warn!("Ignoring archive group with unrecognised label '{label}'");
                        continue;
                    }
                };
                if coverage.contains(year_ad) {
                    debug!(
                        "Caching {} archive {} group {}",
                        parameter,
                        interval.label(),
                        label
                    );
                    let entry = CacheEntry {
                        download_interval: interval,
                        sub_interval: label,
                        coverage,
                        reader,
                    };
                    let capacity = self.handles_per_parameter;
                    self.entries
                        .entry(parameter)
                        .or_insert_with(|| LruCache::new(capacity))
                        .put(entry.sub_interval.clone(), entry.clone());
                    return Ok(entry);
                }
            }
        }

        Err(PaleoError::not_found(
            self.backend.locate(&format!("{}-*.nc", parameter.name())),
            format!(
                "archive data for {} {} {}",
                parameter.title(),
                month_name(month_index),
                YearPoint::from_year_ad(year_ad)
            ),
        ))
    }

    /// Drop least recently used handles until there is room for one more
    fn evict_for(&mut self, parameter: ParameterId) {
        let Some(entries) = self.entries.get_mut(&parameter) else {
            return;
        };
        while entries.len() >= entries.cap().get() {
            match entries.pop_lru() {
                Some((label, evicted)) => debug!(
                    "Evicting {} archive {} group {}",
                    parameter,
                    evicted.download_interval.label(),
                    label
                ),
                None => break,
            }
        }
    }

    /// Reuse a handle already open on the same archive, otherwise open it
    fn reader_for(
        &mut self,
        parameter: ParameterId,
        interval: &YearSpan,
    ) -> PaleoResult<Rc<dyn ArchiveReader>> {
        if let Some(entry) = self
            .entries
            .get(&parameter)
            .and_then(|entries| {
                entries
                    .iter()
                    .map(|(_, entry)| entry)
                    .find(|entry| entry.download_interval == *interval)
            })
        {
            return Ok(Rc::clone(&entry.reader));
        }

        let key = archive_key(parameter, interval)?;
        debug!("Opening archive {}", self.backend.locate(&key));
        let reader: Rc<dyn ArchiveReader> = match self.backend.open(&key) {
            Ok(reader) => Rc::from(reader),
            Err(PaleoError::ArchiveOpenFailed { path, cause }) => {
                return Err(PaleoError::ArchiveOpenFailed { path, cause })
            }
            Err(other) => {
                return Err(PaleoError::ArchiveOpenFailed {
                    path: self.backend.locate(&key),
                    cause: other.to_string(),
                })
            }
        };
        self.opens += 1;
        if reader.metadata().window != self.window {
            warn!(
                "Archive {} was produced with an overlap window of {} years, configured window is {}",
                key,
                reader.metadata().window,
                self.window
            );
        }
        Ok(reader)
    }

    fn read_from(
        &self,
        entry: &CacheEntry,
        parameter: ParameterId,
        year_ad: YearAD,
        month_index: usize,
    ) -> PaleoResult<Grid> {
        let record = archive_record_name(year_ad);
        entry
            .reader
            .read_month(&entry.sub_interval, &record, month_index)?
            .ok_or_else(|| {
                let key = archive_key(parameter, &entry.download_interval).unwrap_or_default();
                PaleoError::not_found(
                    format!("{}#{}/{}", self.backend.locate(&key), entry.sub_interval, record),
                    format!(
                        "{} data for {} {}",
                        parameter.title(),
                        month_name(month_index),
                        record
                    ),
                )
            })
    }
}
