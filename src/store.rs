//! ==============================================================================
//! store.rs - per-zone reading logs mirrored to json files
//! ==============================================================================
//!
//! purpose:
//!     owns the in-memory history of every zone and its on-disk copy.
//!
//! responsibilities:
//!     - load each zone from `<data_dir>/<zone>.json`, seeding empty zones
//!     - append stamped readings (no validation, no dedup)
//!     - rewrite every zone file in full on persist (pretty json, no rename)
//!     - hand out owned snapshots for the query endpoints
//!
//! relationships:
//!     - used by: main.rs (startup load via open_shared, persistence timer)
//!     - used by: server.rs (ingest, query, final save in serve_until)
//!     - uses: seed.rs (synthetic history), domain.rs (Zone, Reading)
//!
//! sharing:
//!     the store is created once at startup and wrapped in SharedStore.
//!     ingest holds the lock across append -> broadcast -> persist so two
//!     submissions never interleave.
//!
//! ==============================================================================

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::domain::{now_timestamp, Reading, Zone};
use crate::error::StoreError;
use crate::seed;

pub type SharedStore = Arc<Mutex<ZoneStore>>;

/// knobs taken from the `[storage]` config section
#[derive(Clone, Debug)]
pub struct StoreOptions {
    /// drop the oldest readings once a zone grows past this many
    pub max_readings_per_zone: Option<usize>,
    /// write synthetic history for zones that load empty
    pub seed_on_empty: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self { max_readings_per_zone: None, seed_on_empty: true }
    }
}

/// what happened to one zone during `load()`
#[derive(Debug)]
pub enum LoadOutcome {
    Loaded(usize),
    Missing,
    Empty,
    Unreadable(StoreError),
}

#[derive(Debug)]
pub struct ZoneLoad {
    pub zone: Zone,
    pub outcome: LoadOutcome,
    /// number of synthetic readings added (0 when the zone had data)
    pub seeded: usize,
}

pub struct ZoneStore {
    data_dir: PathBuf,
    options: StoreOptions,
    logs: HashMap<Zone, Vec<Reading>>,
}

impl ZoneStore {
    /// create an empty store rooted at `data_dir`, creating the directory
    pub fn new(data_dir: impl Into<PathBuf>, options: StoreOptions) -> Self {
        let data_dir = data_dir.into();
        if let Err(e) = fs::create_dir_all(&data_dir) {
            warn!(dir = %data_dir.display(), error = %e, "could not create data directory");
        }

        let logs = Zone::ALL.into_iter().map(|zone| (zone, Vec::new())).collect();
        Self { data_dir, options, logs }
    }

    pub fn into_shared(self) -> SharedStore {
        Arc::new(Mutex::new(self))
    }

    pub fn path_for(&self, zone: Zone) -> PathBuf {
        self.data_dir.join(zone.file_name())
    }

    /// replace every zone log with its file contents, seeding empty zones
    ///
    /// never fails: unreadable files are logged and treated as empty. freshly
    /// seeded data is written straight back so a second load reads it.
    pub fn load(&mut self) -> Vec<ZoneLoad> {
        let mut report = Vec::with_capacity(Zone::ALL.len());

        for zone in Zone::ALL {
            let path = self.path_for(zone);
            let (readings, outcome) = match read_zone_file(&path) {
                Ok(None) => {
                    info!(zone = zone.display_name(), "no data file found, starting empty");
                    (Vec::new(), LoadOutcome::Missing)
                }
                Ok(Some(readings)) if readings.is_empty() => {
                    info!(zone = zone.display_name(), "data file is empty");
                    (Vec::new(), LoadOutcome::Empty)
                }
                Ok(Some(readings)) => {
                    info!(zone = zone.display_name(), count = readings.len(), "loaded readings");
                    let count = readings.len();
                    (readings, LoadOutcome::Loaded(count))
                }
                Err(e) => {
                    error!(zone = zone.display_name(), error = %e, "failed to load readings");
                    set_aside(&path);
                    (Vec::new(), LoadOutcome::Unreadable(e))
                }
            };

            self.logs.insert(zone, readings);
            report.push(ZoneLoad { zone, outcome, seeded: 0 });
        }

        if self.options.seed_on_empty {
            let now = Utc::now();
            let mut rng = rand::rng();
            for entry in report.iter_mut() {
                let log = self.log_mut(entry.zone);
                if log.is_empty() {
                    *log = seed::synthetic_history(entry.zone, now, &mut rng);
                    entry.seeded = log.len();
                    info!(zone = entry.zone.display_name(), count = entry.seeded, "seeded synthetic history");
                }
            }

            if report.iter().any(|entry| entry.seeded > 0) {
                self.persist();
            }
        }

        report
    }

    /// stamp `payload` with the current time and append it to `zone`
    pub fn append(&mut self, zone: Zone, payload: &Value) -> &Reading {
        let reading = Reading::stamped(payload, now_timestamp());
        // a cap of zero would drop the reading just stored
        let cap = self.options.max_readings_per_zone.map(|cap| cap.max(1));

        let log = self.log_mut(zone);
        log.push(reading);
        if let Some(cap) = cap {
            if log.len() > cap {
                let excess = log.len() - cap;
                log.drain(..excess);
            }
        }

        &log[log.len() - 1]
    }

    /// owned copy of a zone's full history
    pub fn snapshot(&self, zone: Zone) -> Vec<Reading> {
        self.logs.get(&zone).cloned().unwrap_or_default()
    }

    pub fn len(&self, zone: Zone) -> usize {
        self.logs.get(&zone).map_or(0, Vec::len)
    }

    pub fn is_empty(&self, zone: Zone) -> bool {
        self.len(zone) == 0
    }

    /// encode every zone now so the file writes can happen off the lock
    pub fn persist_job(&self) -> PersistJob {
        let files = Zone::ALL
            .into_iter()
            .map(|zone| {
                let log = self.logs.get(&zone).map(Vec::as_slice).unwrap_or_default();
                let encoded = serde_json::to_vec_pretty(log).map_err(StoreError::from);
                ZoneFile { zone, path: self.path_for(zone), count: log.len(), encoded }
            })
            .collect();
        PersistJob { files }
    }

    /// rewrite every zone file on the calling thread
    pub fn persist(&self) -> PersistSummary {
        self.persist_job().run()
    }

    /// rewrite every zone file on the blocking pool
    pub async fn persist_async(&self) -> PersistSummary {
        let job = self.persist_job();
        match tokio::task::spawn_blocking(move || job.run()).await {
            Ok(summary) => summary,
            Err(e) => {
                error!(error = %e, "persist task failed");
                PersistSummary::default()
            }
        }
    }

    fn log_mut(&mut self, zone: Zone) -> &mut Vec<Reading> {
        self.logs.entry(zone).or_default()
    }
}

struct ZoneFile {
    zone: Zone,
    path: PathBuf,
    count: usize,
    encoded: Result<Vec<u8>, StoreError>,
}

/// pre-encoded zone files waiting to be written
pub struct PersistJob {
    files: Vec<ZoneFile>,
}

impl PersistJob {
    pub fn run(self) -> PersistSummary {
        let mut summary = PersistSummary::default();

        for file in self.files {
            let result = file.encoded.and_then(|bytes| {
                fs::write(&file.path, bytes)
                    .map_err(|source| StoreError::Write { path: file.path.clone(), source })
            });

            match &result {
                Ok(()) => debug!(zone = file.zone.display_name(), count = file.count, "saved readings"),
                Err(e) => error!(zone = file.zone.display_name(), error = %e, "failed to save readings"),
            }
            summary.zones.push((file.zone, result.map(|()| file.count)));
        }

        summary
    }
}

/// per-zone result of one persist pass (count written, or the failure)
#[derive(Debug, Default)]
pub struct PersistSummary {
    pub zones: Vec<(Zone, Result<usize, StoreError>)>,
}

impl PersistSummary {
    pub fn all_ok(&self) -> bool {
        self.zones.iter().all(|(_, result)| result.is_ok())
    }
}

/// create and load a store on the blocking pool
pub async fn open_shared(
    data_dir: PathBuf,
    options: StoreOptions,
) -> Result<SharedStore, tokio::task::JoinError> {
    tokio::task::spawn_blocking(move || {
        let mut store = ZoneStore::new(data_dir, options);
        store.load();
        store.into_shared()
    })
    .await
}

/// persist every `period`, whether or not anything changed
///
/// the first write happens one full period after start.
pub async fn run_persist_timer(store: SharedStore, period: Duration) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    loop {
        ticker.tick().await;
        debug!("periodic save");
        store.lock().await.persist_async().await;
    }
}

/// `Ok(None)` when the file does not exist; blank files parse as empty
fn read_zone_file(path: &Path) -> Result<Option<Vec<Reading>>, StoreError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => return Err(StoreError::Read { path: path.to_path_buf(), source }),
    };

    if content.trim().is_empty() {
        return Ok(Some(Vec::new()));
    }

    // entries are not checked against the reading shape, only the array is
    let entries: Vec<Value> = serde_json::from_str(&content)
        .map_err(|source| StoreError::Parse { path: path.to_path_buf(), source })?;
    Ok(Some(entries.into_iter().map(Reading::from_stored).collect()))
}

/// keep an unreadable file around as `<name>.corrupt` before it is overwritten
fn set_aside(path: &Path) {
    if !path.exists() {
        return;
    }
    let mut aside = path.as_os_str().to_owned();
    aside.push(".corrupt");
    match fs::rename(path, &aside) {
        Ok(()) => warn!(path = %path.display(), "moved unreadable data file aside"),
        Err(e) => warn!(path = %path.display(), error = %e, "could not move unreadable data file aside"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn store_in(dir: &Path) -> ZoneStore {
        ZoneStore::new(dir, StoreOptions::default())
    }

    #[test]
    fn empty_directory_seeds_both_zones_and_writes_them() {
        let dir = tempdir().unwrap();
        let mut store = store_in(dir.path());

        let report = store.load();

        for entry in &report {
            assert!(matches!(entry.outcome, LoadOutcome::Missing));
            assert_eq!(entry.seeded, seed::SEED_COUNT);
        }
        for zone in Zone::ALL {
            assert_eq!(store.len(zone), seed::SEED_COUNT);
            assert!(store.path_for(zone).exists());
        }
    }

    #[test]
    fn loading_twice_does_not_duplicate_seed() {
        let dir = tempdir().unwrap();
        let mut store = store_in(dir.path());
        store.load();
        let first = store.snapshot(Zone::Bluetezelt);

        let report = store.load();

        assert!(report.iter().all(|entry| entry.seeded == 0));
        assert_eq!(store.snapshot(Zone::Bluetezelt), first);
        assert_eq!(store.len(Zone::Aufzuchtszelt), seed::SEED_COUNT);
    }

    #[test]
    fn persist_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let mut store = store_in(dir.path());
        store.load();
        store.append(Zone::Aufzuchtszelt, &json!({"temperature": 22.25, "humidity": 71.5, "note": "door open"}));
        store.append(Zone::Aufzuchtszelt, &json!({"humidity": null}));
        assert!(store.persist().all_ok());

        let mut reloaded = store_in(dir.path());
        reloaded.load();

        for zone in Zone::ALL {
            assert_eq!(reloaded.snapshot(zone), store.snapshot(zone));
        }
    }

    #[test]
    fn append_grows_only_its_zone() {
        let dir = tempdir().unwrap();
        let mut store = store_in(dir.path());
        store.load();

        let reading = store.append(Zone::Bluetezelt, &json!({"temperature": 24.5, "humidity": 55})).clone();

        assert_eq!(store.len(Zone::Bluetezelt), seed::SEED_COUNT + 1);
        assert_eq!(store.len(Zone::Aufzuchtszelt), seed::SEED_COUNT);
        assert_eq!(store.snapshot(Zone::Bluetezelt).last(), Some(&reading));
    }

    #[test]
    fn existing_data_is_not_reseeded() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bluetezelt.json");
        fs::write(&path, r#"[{"timestamp": "2024-05-01T12:00:00.000Z", "temperature": 26.0, "humidity": 58}]"#).unwrap();

        let mut store = store_in(dir.path());
        let report = store.load();

        assert!(matches!(report[0].outcome, LoadOutcome::Loaded(1)));
        assert_eq!(report[0].seeded, 0);
        assert_eq!(store.len(Zone::Bluetezelt), 1);
        assert_eq!(store.len(Zone::Aufzuchtszelt), seed::SEED_COUNT);
    }

    #[test]
    fn odd_entries_do_not_discard_history() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("bluetezelt.json"),
            r#"[{"temperature": 26, "humidity": 58, "timestamp": "2024-05-01T12:00:00.000Z"}, [1, 2]]"#,
        )
        .unwrap();

        let mut store = store_in(dir.path());
        let report = store.load();

        assert!(matches!(report[0].outcome, LoadOutcome::Loaded(2)));
        assert_eq!(report[0].seeded, 0);
        let readings = store.snapshot(Zone::Bluetezelt);
        assert_eq!(readings[0].timestamp, "2024-05-01T12:00:00.000Z");
        assert_eq!(readings[1].fields["payload"], json!([1, 2]));
        assert!(!dir.path().join("bluetezelt.json.corrupt").exists());
    }

    #[test]
    fn blank_and_corrupt_files_fall_back_to_seed() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("bluetezelt.json"), "   \n").unwrap();
        fs::write(dir.path().join("aufzuchtszelt.json"), "[{\"temperature\": ").unwrap();

        let mut store = store_in(dir.path());
        let report = store.load();

        assert!(matches!(report[0].outcome, LoadOutcome::Empty));
        assert!(matches!(report[1].outcome, LoadOutcome::Unreadable(StoreError::Parse { .. })));
        assert!(report.iter().all(|entry| entry.seeded == seed::SEED_COUNT));
        assert!(dir.path().join("aufzuchtszelt.json.corrupt").exists());
    }

    #[test]
    fn snapshot_is_detached_from_store() {
        let dir = tempdir().unwrap();
        let mut store = store_in(dir.path());
        store.load();

        let mut copy = store.snapshot(Zone::Bluetezelt);
        copy.clear();

        assert_eq!(store.len(Zone::Bluetezelt), seed::SEED_COUNT);
    }

    #[test]
    fn cap_drops_oldest_readings() {
        let dir = tempdir().unwrap();
        let options = StoreOptions { max_readings_per_zone: Some(2), seed_on_empty: false };
        let mut store = ZoneStore::new(dir.path(), options);
        store.load();
        assert!(store.is_empty(Zone::Bluetezelt));

        for n in 0..3 {
            store.append(Zone::Bluetezelt, &json!({"n": n}));
        }

        let kept: Vec<Value> = store.snapshot(Zone::Bluetezelt).iter().map(|r| r.fields["n"].clone()).collect();
        assert_eq!(kept, vec![json!(1), json!(2)]);
    }

    #[test]
    fn write_failure_is_reported_not_raised() {
        let dir = tempdir().unwrap();
        let mut store = store_in(dir.path());
        store.load();
        // a directory where the zone file should be makes the write fail
        let blocked = store.path_for(Zone::Bluetezelt);
        fs::remove_file(&blocked).unwrap();
        fs::create_dir(&blocked).unwrap();

        let summary = store.persist();

        assert!(!summary.all_ok());
        let (_, aufzucht) = summary.zones.iter().find(|(zone, _)| *zone == Zone::Aufzuchtszelt).unwrap();
        assert!(matches!(aufzucht, Ok(n) if *n == seed::SEED_COUNT));
    }

    #[tokio::test]
    async fn open_shared_loads_off_the_runtime() {
        let dir = tempdir().unwrap();

        let shared = open_shared(dir.path().to_path_buf(), StoreOptions::default()).await.unwrap();

        let store = shared.lock().await;
        for zone in Zone::ALL {
            assert_eq!(store.len(zone), seed::SEED_COUNT);
            assert!(store.path_for(zone).exists());
        }
    }

    #[tokio::test]
    async fn timer_persists_without_appends() {
        let dir = tempdir().unwrap();
        let mut store = store_in(dir.path());
        store.load();
        let path = store.path_for(Zone::Bluetezelt);
        fs::remove_file(&path).unwrap();

        let shared = store.into_shared();
        let timer = tokio::spawn(run_persist_timer(shared, Duration::from_millis(50)));

        let mut written = false;
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            if path.exists() {
                written = true;
                break;
            }
        }
        timer.abort();
        assert!(written);
    }
}
