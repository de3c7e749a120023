//! Persistence for fix histories, observation histories, and refined
//! estimates
//!
//! Three JSON documents under one data directory, mirroring what the REST
//! layer reads and writes:
//! - `observations.json`: class -> full geolocation input records
//! - `fixes.json`: class -> append-only `{lat, lon, confidence}` history
//! - `refined.json`: class -> latest refined `{lat, lon}` estimate
//!
//! The store assumes a single writer per class (one geolocation worker); the
//! mutex serializes the occasional concurrent reader and the resolver's
//! refined-estimate writes. Scaling to several geolocation workers would
//! need per-class serialization on top of this.

pub mod pose;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::core::{Fix, RefinedEstimate, TargetObservation};

pub use pose::{JsonPoseSource, PoseError, PoseSource};

const OBSERVATIONS_FILE: &str = "observations.json";
const FIXES_FILE: &str = "fixes.json";
const REFINED_FILE: &str = "refined.json";

/// Storage failure. Surfaced to the caller; the pipeline treats a failed
/// append as a dropped record, not a crash.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O failure on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed store document {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Default)]
struct StoreState {
    observations: HashMap<String, Vec<TargetObservation>>,
    fixes: HashMap<String, Vec<Fix>>,
    refined: HashMap<String, RefinedEstimate>,
}

/// Write-through JSON store for per-class geolocation state.
#[derive(Debug)]
pub struct TargetStore {
    data_dir: PathBuf,
    state: Mutex<StoreState>,
}

impl TargetStore {
    /// Open (or create) a store rooted at `data_dir`, loading any existing
    /// documents.
    pub fn open(data_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir).map_err(|source| StoreError::Io {
            path: data_dir.clone(),
            source,
        })?;

        let state = StoreState {
            observations: load_document(&data_dir.join(OBSERVATIONS_FILE))?,
            fixes: load_document(&data_dir.join(FIXES_FILE))?,
            refined: load_document(&data_dir.join(REFINED_FILE))?,
        };

        Ok(Self {
            data_dir,
            state: Mutex::new(state),
        })
    }

    /// Append one fix to a class's history.
    pub fn append_fix(&self, class: &str, fix: Fix) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.fixes.entry(class.to_string()).or_default().push(fix);
        write_document(&self.data_dir.join(FIXES_FILE), &state.fixes)
    }

    /// Append one full observation record to a class's history.
    pub fn append_observation(
        &self,
        class: &str,
        observation: TargetObservation,
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        state
            .observations
            .entry(class.to_string())
            .or_default()
            .push(observation);
        write_document(&self.data_dir.join(OBSERVATIONS_FILE), &state.observations)
    }

    /// Snapshot of a class's fix history, if the class is known.
    pub fn fixes(&self, class: &str) -> Option<Vec<Fix>> {
        self.lock().fixes.get(class).cloned()
    }

    /// Snapshot of a class's observation history, if the class is known.
    pub fn observations(&self, class: &str) -> Option<Vec<TargetObservation>> {
        self.lock().observations.get(class).cloned()
    }

    /// Classes with at least one recorded observation.
    pub fn known_classes(&self) -> Vec<String> {
        let mut classes: Vec<String> = self.lock().observations.keys().cloned().collect();
        classes.sort();
        classes
    }

    /// Overwrite a class's refined estimate.
    pub fn set_refined(&self, class: &str, estimate: RefinedEstimate) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.refined.insert(class.to_string(), estimate);
        write_document(&self.data_dir.join(REFINED_FILE), &state.refined)
    }

    /// Latest refined estimate for a class, if any.
    pub fn refined(&self, class: &str) -> Option<RefinedEstimate> {
        self.lock().refined.get(class).cloned()
    }

    /// Clear a class's histories wholesale. The refined estimate, if any,
    /// is kept until the next successful adjustment overwrites it.
    pub fn clear_class(&self, class: &str) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.observations.remove(class);
        state.fixes.remove(class);
        write_document(&self.data_dir.join(OBSERVATIONS_FILE), &state.observations)?;
        write_document(&self.data_dir.join(FIXES_FILE), &state.fixes)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreState> {
        // A poisoned mutex means a writer panicked mid-append; the in-memory
        // state is still a valid snapshot, so continue with it.
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn load_document<T: DeserializeOwned + Default>(path: &Path) -> Result<T, StoreError> {
    match fs::read_to_string(path) {
        Ok(contents) => serde_json::from_str(&contents).map_err(|source| StoreError::Malformed {
            path: path.to_path_buf(),
            source,
        }),
        Err(source) if source.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
        Err(source) => Err(StoreError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn write_document<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let contents =
        serde_json::to_string_pretty(value).map_err(|source| StoreError::Malformed {
            path: path.to_path_buf(),
            source,
        })?;
    fs::write(path, contents).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}
