//! Per-frame recorder for intermediate images of the matching algorithms.
//!
//! Create one `ImageLogger` per frame of video. It is only active when the
//! debug level is at least 2 at construction time; otherwise every method is a
//! no-op and nothing touches the file system.

use crate::errors::StbtError;
use crate::frame::{Frame, StoredImage};
use crate::runtime::DebugRuntime;
use crate::verbosity::{ddebug_to, debug_level, warn_to};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

pub const MANIFEST_FILE: &str = "manifest.json";

static FRAME_NUMBER: AtomicU64 = AtomicU64::new(1);

fn next_frame_number() -> u64 {
    FRAME_NUMBER.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for MetadataValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u32> for MetadataValue {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<f32> for MetadataValue {
    fn from(value: f32) -> Self {
        Self::Float(f64::from(value))
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

pub type Metadata = BTreeMap<String, MetadataValue>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggedImage {
    pub name: String,
    pub image: StoredImage,
}

struct Recording {
    runtime: DebugRuntime,
    frame_number: u64,
    outdir: PathBuf,
    images: Vec<LoggedImage>,
    pyramid_levels: BTreeSet<u32>,
    data: Metadata,
}

pub struct ImageLogger {
    name: String,
    recording: Option<Recording>,
}

#[derive(Serialize)]
struct Manifest<'a> {
    name: &'a str,
    frame_number: u64,
    images: Vec<&'a str>,
    pyramid_levels: &'a BTreeSet<u32>,
    data: &'a Metadata,
}

pub fn output_dir_for(root: &Path, name: &str, frame_number: u64) -> PathBuf {
    root.join(name).join(format!("{frame_number:05}"))
}

impl ImageLogger {
    /// Recorder writing under `./stbt-debug` with the real file system.
    pub fn new<K, V>(
        name: &str,
        metadata: impl IntoIterator<Item = (K, V)>,
    ) -> Result<Self, StbtError>
    where
        K: Into<String>,
        V: Into<MetadataValue>,
    {
        Self::with_runtime(&DebugRuntime::new(), name, metadata)
    }

    /// Fails only if the debug level cannot be resolved. A directory that
    /// cannot be created disables the recorder with a warning instead.
    pub fn with_runtime<K, V>(
        runtime: &DebugRuntime,
        name: &str,
        metadata: impl IntoIterator<Item = (K, V)>,
    ) -> Result<Self, StbtError>
    where
        K: Into<String>,
        V: Into<MetadataValue>,
    {
        let disabled = Self {
            name: name.to_string(),
            recording: None,
        };
        if debug_level()? < 2 {
            return Ok(disabled);
        }

        let frame_number = next_frame_number();
        let outdir = output_dir_for(&runtime.debug_root, name, frame_number);
        if let Err(error) = runtime.file_system.create_dir_all(&outdir) {
            warn_to(
                runtime.error_stream.as_ref(),
                &format!(
                    "Failed to create directory '{}'; won't save debug images.",
                    outdir.display()
                ),
            );
            ddebug_to(runtime.error_stream.as_ref(), &error.to_string())?;
            return Ok(disabled);
        }

        let data = metadata
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Ok(Self {
            name: name.to_string(),
            recording: Some(Recording {
                runtime: runtime.clone(),
                frame_number,
                outdir,
                images: Vec::new(),
                pyramid_levels: BTreeSet::new(),
                data,
            }),
        })
    }

    pub fn enabled(&self) -> bool {
        self.recording.is_some()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn frame_number(&self) -> Option<u64> {
        self.recording.as_ref().map(|r| r.frame_number)
    }

    pub fn outdir(&self) -> Option<&Path> {
        self.recording.as_ref().map(|r| r.outdir.as_path())
    }

    pub fn image_names(&self) -> Vec<&str> {
        self.recording
            .as_ref()
            .map(|r| r.images.iter().map(|img| img.name.as_str()).collect())
            .unwrap_or_default()
    }

    pub fn image(&self, name: &str) -> Option<&StoredImage> {
        self.recording
            .as_ref()?
            .images
            .iter()
            .find(|img| img.name == name)
            .map(|img| &img.image)
    }

    pub fn pyramid_levels(&self) -> Vec<u32> {
        self.recording
            .as_ref()
            .map(|r| r.pyramid_levels.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn metadata(&self) -> Option<&Metadata> {
        self.recording.as_ref().map(|r| &r.data)
    }

    pub fn set<K, V>(&mut self, metadata: impl IntoIterator<Item = (K, V)>)
    where
        K: Into<String>,
        V: Into<MetadataValue>,
    {
        let Some(recording) = self.recording.as_mut() else {
            return;
        };
        recording
            .data
            .extend(metadata.into_iter().map(|(k, v)| (k.into(), v.into())));
    }

    /// Saves `image` as `<outdir>/<name>.png`, or `level<N>-<name>.png` when a
    /// pyramid level is given. Float images are stretched from [0.0, 1.0] to
    /// 8-bit range first; integer images are written at their own depth.
    pub fn imwrite(
        &mut self,
        name: &str,
        image: &dyn Frame,
        pyramid_level: Option<u32>,
    ) -> Result<(), StbtError> {
        let Some(recording) = self.recording.as_mut() else {
            return Ok(());
        };
        let name = match pyramid_level {
            Some(level) => {
                recording.pyramid_levels.insert(level);
                format!("level{level}-{name}")
            }
            None => name.to_string(),
        };
        if recording.images.iter().any(|img| img.name == name) {
            return Err(StbtError::DuplicateArtifact(name));
        }

        let copy = image.view()?.to_stored();
        let png = copy.to_png()?;
        let path = recording.outdir.join(format!("{name}.png"));
        recording.runtime.file_system.write_bytes(&path, &png)?;
        recording.images.push(LoggedImage { name, image: copy });
        Ok(())
    }

    /// Writes `manifest.json` describing what was recorded so far. Returns the
    /// path written, or `None` when disabled.
    pub fn write_manifest(&self) -> Result<Option<PathBuf>, StbtError> {
        let Some(recording) = self.recording.as_ref() else {
            return Ok(None);
        };
        let manifest = Manifest {
            name: &self.name,
            frame_number: recording.frame_number,
            images: recording.images.iter().map(|img| img.name.as_str()).collect(),
            pyramid_levels: &recording.pyramid_levels,
            data: &recording.data,
        };
        let json = serde_json::to_vec_pretty(&manifest)
            .map_err(|e| StbtError::Io(e.to_string()))?;
        let path = recording.outdir.join(MANIFEST_FILE);
        recording.runtime.file_system.write_bytes(&path, &json)?;
        Ok(Some(path))
    }
}
