//! Benchmark project storage
//!
//! A project owns an ordered list of image names and, through its name
//! prefix, every image payload, ground truth, detection result and setting
//! stored for it.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, warn};

use super::{get_json, keys, set_json, KeyValueStore};
use crate::error::{BenchError, Result};
use crate::util::{filename_without_extension, move_item_down, move_item_up};
use crate::vision::{EngineRegistry, Setting};

/// Persisted project record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectInfo {
    /// Project name, also the key namespace
    pub name: String,
    /// Image names in benchmark order, optionally prefixed `"<category>/"`
    pub images: Vec<String>,
}

/// Per-project engine selection and settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReaderConfig {
    /// Registry name of the engine
    pub engine: String,
    /// Label used in reports
    pub display_name: String,
    /// Optional chart color
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Settings applied before detection
    #[serde(default)]
    pub settings: Vec<Setting>,
}

/// Counts produced by a directory import
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub images: usize,
    pub ground_truths: usize,
}

/// Names of every stored project
pub fn list_projects(store: &dyn KeyValueStore) -> Result<Vec<String>> {
    Ok(get_json(store, keys::PROJECTS)?.unwrap_or_default())
}

/// Create an empty project
pub fn create_project(store: &dyn KeyValueStore, name: &str) -> Result<ProjectInfo> {
    let mut names = list_projects(store)?;
    if names.iter().any(|n| n == name) {
        return Err(BenchError::ProjectExists(name.to_string()));
    }

    let project = ProjectInfo {
        name: name.to_string(),
        images: Vec::new(),
    };
    save_project(store, &project)?;
    names.push(name.to_string());
    set_json(store, keys::PROJECTS, &names)?;

    info!("Created project {}", name);
    Ok(project)
}

/// Load a project record
pub fn load_project(store: &dyn KeyValueStore, name: &str) -> Result<ProjectInfo> {
    get_json(store, &keys::project_info(name))?
        .ok_or_else(|| BenchError::ProjectNotFound(name.to_string()))
}

/// Persist a project record
pub fn save_project(store: &dyn KeyValueStore, project: &ProjectInfo) -> Result<()> {
    set_json(store, &keys::project_info(&project.name), project)
}

/// Store an image payload and append it to the project list.
///
/// Re-adding an existing image replaces the payload only.
pub fn add_image(store: &dyn KeyValueStore, project: &mut ProjectInfo, image: &str, data: &[u8]) -> Result<()> {
    store.set(&keys::image(&project.name, image), &STANDARD.encode(data))?;
    if !project.images.iter().any(|i| i == image) {
        project.images.push(image.to_string());
    }
    save_project(store, project)
}

/// Decode a stored image payload
pub fn load_image(store: &dyn KeyValueStore, project: &str, image: &str) -> Result<Option<Vec<u8>>> {
    match store.get(&keys::image(project, image))? {
        Some(encoded) => STANDARD
            .decode(encoded.as_bytes())
            .map(Some)
            .map_err(|e| BenchError::Image(format!("{image}: {e}"))),
        None => Ok(None),
    }
}

/// Store the ground-truth text of an image
pub fn set_ground_truth(store: &dyn KeyValueStore, project: &str, image: &str, text: &str) -> Result<()> {
    store.set(&keys::ground_truth(project, image), text)
}

/// Read the ground-truth text of an image
pub fn ground_truth(store: &dyn KeyValueStore, project: &str, image: &str) -> Result<Option<String>> {
    store.get(&keys::ground_truth(project, image))
}

/// Import a directory of labeled images.
///
/// Image files become project images; a `.txt` file with the same basename is
/// stored as the image's ground truth. Files inside a first-level
/// subdirectory are prefixed with `"<subdir>/"`, which acts as the category.
pub fn import_directory(store: &dyn KeyValueStore, project: &mut ProjectInfo, dir: &Path) -> Result<ImportSummary> {
    let mut summary = ImportSummary::default();
    import_files(store, project, dir, None, &mut summary)?;

    let mut subdirs = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            subdirs.push(entry.path());
        }
    }
    subdirs.sort();

    for subdir in subdirs {
        let Some(category) = subdir.file_name().and_then(|n| n.to_str()) else {
            warn!("Skipping directory with non UTF-8 name: {:?}", subdir);
            continue;
        };
        let category = category.to_string();
        import_files(store, project, &subdir, Some(&category), &mut summary)?;
    }

    info!(
        "Imported {} images and {} ground truth files into {}",
        summary.images, summary.ground_truths, project.name
    );
    Ok(summary)
}

fn import_files(
    store: &dyn KeyValueStore,
    project: &mut ProjectInfo,
    dir: &Path,
    category: Option<&str>,
    summary: &mut ImportSummary,
) -> Result<()> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();

    for path in files {
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if image::ImageFormat::from_path(&path).is_err() {
            continue;
        }

        let image_name = match category {
            Some(category) => format!("{category}/{file_name}"),
            None => file_name.to_string(),
        };
        add_image(store, project, &image_name, &std::fs::read(&path)?)?;
        summary.images += 1;
        debug!("Imported image {}", image_name);

        let truth_path = path.with_file_name(format!("{}.txt", filename_without_extension(file_name)));
        if truth_path.is_file() {
            let text = std::fs::read_to_string(&truth_path)?;
            set_ground_truth(store, &project.name, &image_name, text.trim_end_matches(['\r', '\n']))?;
            summary.ground_truths += 1;
        }
    }

    Ok(())
}

/// Record a stored detection result file name (no duplicates)
pub fn record_detection_result(store: &dyn KeyValueStore, project: &str, filename: &str) -> Result<()> {
    let key = keys::detection_result_list(project);
    let mut names: Vec<String> = get_json(store, &key)?.unwrap_or_default();
    if !names.iter().any(|n| n == filename) {
        names.push(filename.to_string());
        set_json(store, &key, &names)?;
    }
    Ok(())
}

/// File names of every recorded detection result
pub fn recorded_detection_results(store: &dyn KeyValueStore, project: &str) -> Result<Vec<String>> {
    Ok(get_json(store, &keys::detection_result_list(project))?.unwrap_or_default())
}

/// Engines among `engines` with a recorded result for `image`
pub fn engines_with_result<'a>(recorded: &[String], image: &str, engines: &'a [String]) -> Vec<&'a str> {
    engines
        .iter()
        .filter(|engine| recorded.contains(&keys::detection_result_filename(image, engine)))
        .map(String::as_str)
        .collect()
}

/// Remove every image, label and detection result of a project.
///
/// The project record survives with an empty image list; settings are kept.
pub fn remove_project_files(store: &dyn KeyValueStore, project: &mut ProjectInfo) -> Result<()> {
    let name = project.name.clone();

    for image in &project.images {
        store.remove(&keys::image(&name, image))?;
        store.remove(&keys::ground_truth(&name, image))?;
        store.remove(&keys::ground_truth_regions(&name, image))?;
    }

    let list_key = keys::detection_result_list(&name);
    let detection_files: Option<Vec<String>> = get_json(store, &list_key)?;
    for filename in detection_files.unwrap_or_default() {
        store.remove(&keys::detection_result(&name, &filename))?;
    }

    store.remove(&list_key)?;
    store.remove(&keys::results_archive(&name))?;

    project.images.clear();
    save_project(store, project)?;

    info!("Removed all files of project {}", name);
    Ok(())
}

/// Delete a project together with everything stored under its name
pub fn delete_project(store: &dyn KeyValueStore, name: &str) -> Result<()> {
    let mut project = load_project(store, name)?;
    remove_project_files(store, &mut project)?;

    store.remove(&keys::settings(name))?;
    store.remove(&keys::project_info(name))?;

    // Entries that never made it into a listing, e.g. a detection result
    // whose list update failed
    for key in store.keys_with_prefix(&keys::namespace(name))? {
        debug!("Removing orphaned entry {}", key);
        store.remove(&key)?;
    }

    let mut names = list_projects(store)?;
    names.retain(|n| n != name);
    set_json(store, keys::PROJECTS, &names)?;

    info!("Deleted project {}", name);
    Ok(())
}

/// One configuration per registered engine, no custom settings
pub fn default_reader_configs(registry: &EngineRegistry) -> Vec<ReaderConfig> {
    registry
        .engines()
        .into_iter()
        .map(|engine| ReaderConfig {
            engine: engine.to_string(),
            display_name: engine.to_string(),
            color: None,
            settings: Vec::new(),
        })
        .collect()
}

/// Stored reader configurations, or the defaults when none are stored
pub fn load_project_reader_configs(
    store: &dyn KeyValueStore,
    project: &str,
    registry: &EngineRegistry,
) -> Result<Vec<ReaderConfig>> {
    match get_json(store, &keys::settings(project))? {
        Some(configs) => Ok(configs),
        None => Ok(default_reader_configs(registry)),
    }
}

/// Persist reader configurations
pub fn save_project_reader_configs(store: &dyn KeyValueStore, project: &str, configs: &[ReaderConfig]) -> Result<()> {
    set_json(store, &keys::settings(project), &configs)
}

/// Set (or add) one setting value on an engine's configuration
pub fn update_reader_setting(
    configs: &mut [ReaderConfig],
    registry: &EngineRegistry,
    engine: &str,
    name: &str,
    value: &str,
) -> Result<()> {
    let factory = registry.factory(engine)?;
    let Some(def) = factory.supported_settings().into_iter().find(|d| d.name == name) else {
        return Err(BenchError::InvalidSetting {
            engine: engine.to_string(),
            name: name.to_string(),
            message: "not supported by this engine".to_string(),
        });
    };

    let config = configs
        .iter_mut()
        .find(|c| c.engine == engine)
        .ok_or_else(|| BenchError::UnknownEngine(engine.to_string()))?;

    match config.settings.iter_mut().find(|s| s.name == name) {
        Some(setting) => setting.value = value.to_string(),
        None => config.settings.push(Setting::new(name, value, def.kind)),
    }
    Ok(())
}

/// Direction for reordering reader configurations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveDirection {
    Up,
    Down,
}

/// Move an engine's configuration one slot; returns whether anything moved
pub fn move_reader_config(configs: &mut [ReaderConfig], engine: &str, direction: MoveDirection) -> Result<bool> {
    let index = configs
        .iter()
        .position(|c| c.engine == engine)
        .ok_or_else(|| BenchError::UnknownEngine(engine.to_string()))?;
    Ok(match direction {
        MoveDirection::Up => move_item_up(configs, index),
        MoveDirection::Down => move_item_down(configs, index),
    })
}
