use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, warn};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::error::Result;
use crate::models::TrainedModel;

/// `put` replaces the whole model at once; `get` returns either the old or
/// the new model, never a mix of the two.
pub trait ModelRegistry: Send + Sync {
    fn get(&self, state: &str) -> Result<Option<Arc<TrainedModel>>>;
    fn put(&self, model: TrainedModel) -> Result<()>;
    fn states(&self) -> Result<Vec<String>>;
}

#[derive(Default)]
pub struct MemoryRegistry {
    models: RwLock<HashMap<String, Arc<TrainedModel>>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ModelRegistry for MemoryRegistry {
    fn get(&self, state: &str) -> Result<Option<Arc<TrainedModel>>> {
        Ok(self.models.read().get(state).cloned())
    }

    fn put(&self, model: TrainedModel) -> Result<()> {
        let entry = Arc::new(model);
        self.models.write().insert(entry.state.clone(), entry);
        Ok(())
    }

    fn states(&self) -> Result<Vec<String>> {
        let mut states: Vec<String> = self.models.read().keys().cloned().collect();
        states.sort();
        Ok(states)
    }
}

/// One JSON document per state. Writes land in a scratch file that is then
/// renamed over the target, which replaces the file atomically.
pub struct FileRegistry {
    dir: PathBuf,
}

impl FileRegistry {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, state: &str) -> PathBuf {
        self.dir.join(format!("forecast_{}.json", model_key(state)))
    }
}

impl ModelRegistry for FileRegistry {
    fn get(&self, state: &str) -> Result<Option<Arc<TrainedModel>>> {
        let path = self.path_for(state);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let model: TrainedModel = serde_json::from_slice(&bytes)?;
        if model.state != state {
            warn!(
                "{} holds a model for {}, not {}",
                path.display(),
                model.state,
                state
            );
            return Ok(None);
        }
        Ok(Some(Arc::new(model)))
    }

    fn put(&self, model: TrainedModel) -> Result<()> {
        let target = self.path_for(&model.state);
        let scratch = self.dir.join(format!(".{}.tmp", Uuid::new_v4()));
        let payload = serde_json::to_vec_pretty(&model)?;

        fs::write(&scratch, payload)?;
        if let Err(err) = fs::rename(&scratch, &target) {
            warn!("could not move model into {}: {err}", target.display());
            let _ = fs::remove_file(&scratch);
            return Err(err.into());
        }
        debug!("stored model for {} at {}", model.state, target.display());
        Ok(())
    }

    fn states(&self) -> Result<Vec<String>> {
        let mut states = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let is_model = path
                .file_name()
                .and_then(|name| name.to_str())
                .map(|name| name.starts_with("forecast_") && name.ends_with(".json"))
                .unwrap_or(false);
            if !is_model {
                continue;
            }
            let model: TrainedModel = serde_json::from_slice(&fs::read(&path)?)?;
            states.push(model.state);
        }
        states.sort();
        Ok(states)
    }
}

/// File-safe key: a readable slug of the ASCII alphanumerics plus a
/// name-based UUID prefix of the exact state string, so names that slug
/// alike ("Foo-bar", "Foo Bar") or not at all (non-Latin scripts) stay apart.
pub fn model_key(state: &str) -> String {
    let slug = state
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| part.to_ascii_lowercase())
        .collect::<Vec<_>>()
        .join("_");
    let digest = Uuid::new_v5(&Uuid::NAMESPACE_OID, state.as_bytes()).simple().to_string();
    if slug.is_empty() {
        digest[..12].to_string()
    } else {
        format!("{slug}_{}", &digest[..12])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trainer::{self, tests::linear_series};

    fn model_for(state: &str, days: usize) -> TrainedModel {
        trainer::train(state, &linear_series(days)).unwrap()
    }

    #[test]
    fn memory_registry_replaces_models() {
        let registry = MemoryRegistry::new();
        assert!(registry.get("Goa").unwrap().is_none());

        registry.put(model_for("Goa", 30)).unwrap();
        let first = registry.get("Goa").unwrap().unwrap();
        registry.put(model_for("Goa", 40)).unwrap();
        let second = registry.get("Goa").unwrap().unwrap();

        assert_eq!(first.sample_count, 23);
        assert_eq!(second.sample_count, 33);
        assert_eq!(registry.states().unwrap(), vec!["Goa".to_string()]);
    }

    #[test]
    fn file_registry_round_trips_and_leaves_no_scratch_files() {
        let dir = tempfile::tempdir().unwrap();
        let registry = FileRegistry::open(dir.path()).unwrap();

        registry.put(model_for("Tamil Nadu", 30)).unwrap();
        registry.put(model_for("Tamil Nadu", 35)).unwrap();

        let stored = registry.get("Tamil Nadu").unwrap().unwrap();
        assert_eq!(stored.sample_count, 28);
        assert_eq!(stored.feature_order, vec!["t", "lag7", "roll7"]);
        assert!(registry.get("Kerala").unwrap().is_none());
        assert_eq!(registry.states().unwrap(), vec!["Tamil Nadu".to_string()]);

        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(names[0].starts_with("forecast_tamil_nadu_"));
        assert!(names[0].ends_with(".json"));
    }

    #[test]
    fn keys_are_file_safe_and_distinct() {
        let names = [
            "Jammu and Kashmir",
            "Dadra & Nagar Haveli",
            "Foo-bar",
            "Foo Bar",
            "तमिलनाडु",
            "ਪੰਜਾਬ",
        ];
        let keys: Vec<String> = names.iter().map(|name| model_key(name)).collect();

        assert!(keys[0].starts_with("jammu_and_kashmir_"));
        assert!(keys[1].starts_with("dadra_nagar_haveli_"));
        for key in &keys {
            assert!(!key.is_empty());
            assert!(key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
        }
        let unique: std::collections::HashSet<&String> = keys.iter().collect();
        assert_eq!(unique.len(), keys.len());
        assert_eq!(model_key("Foo Bar"), model_key("Foo Bar"));
    }

    #[test]
    fn file_registry_never_serves_another_states_model() {
        let dir = tempfile::tempdir().unwrap();
        let registry = FileRegistry::open(dir.path()).unwrap();

        registry.put(model_for("Foo-bar", 30)).unwrap();
        assert!(registry.get("Foo Bar").unwrap().is_none());

        registry.put(model_for("Foo Bar", 35)).unwrap();
        assert_eq!(registry.get("Foo-bar").unwrap().unwrap().sample_count, 23);
        assert_eq!(registry.get("Foo Bar").unwrap().unwrap().sample_count, 28);

        // a file renamed by hand does not leak into another key
        fs::rename(registry.path_for("Foo-bar"), registry.path_for("Goa")).unwrap();
        assert!(registry.get("Goa").unwrap().is_none());
    }

    fn assert_consistent(model: &TrainedModel) {
        assert_eq!(model.coefficients.len(), model.feature_order.len());
        let window = model.training_window;
        let days = (window.end - window.start).num_days() as usize + 1;
        assert_eq!(model.sample_count, days - 7);
        assert!(model.sample_count == 23 || model.sample_count == 33);
    }

    fn hammer(registry: &dyn ModelRegistry) {
        let short = model_for("Goa", 30);
        let long = model_for("Goa", 40);
        registry.put(short.clone()).unwrap();

        std::thread::scope(|scope| {
            scope.spawn(|| {
                for round in 0..60 {
                    let model = if round % 2 == 0 { long.clone() } else { short.clone() };
                    registry.put(model).unwrap();
                }
            });
            for _ in 0..3 {
                scope.spawn(|| {
                    for _ in 0..200 {
                        let model = registry.get("Goa").unwrap().unwrap();
                        assert_consistent(&model);
                    }
                });
            }
        });
    }

    #[test]
    fn concurrent_readers_see_whole_models_in_memory() {
        hammer(&MemoryRegistry::new());
    }

    #[test]
    fn concurrent_readers_see_whole_models_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        hammer(&FileRegistry::open(dir.path()).unwrap());
    }
}
