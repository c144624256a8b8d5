// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! Dataset access abstraction for the polyline load flow.
//!
//! The reprojection core never touches a dataset directly. It reads records
//! through [`DatasetStore::fetch_batch`] and writes results back through
//! [`DatasetStore::store_batch`], so any host able to list sample fields and
//! set a field by key can drive it.
//!
//! # Store Implementations
//!
//! - [`MemoryDatasetStore`]: samples held in memory (tests, embedding)
//! - [`JsonDatasetStore`]: a JSON dataset snapshot on disk
//!
//! # Sample Layout
//!
//! Samples are JSON objects. Grouped datasets carry a `group` object whose
//! `id` identifies the multi-modal sample and whose `name` is the group slice
//! (for example `projection` for the orthographic image, `pcd` for the point
//! cloud). Field names may be dotted paths such as `group.id`.
//!
//! Results are only ever written into a point cloud slice. Unless one is
//! named explicitly, it is the first group slice whose media type is `pcd` or
//! `3d`, taken from the snapshot's `group_media_types` map or from the
//! samples' `media_type` field.
//!
//! ```json
//! {
//!   "samples": [
//!     {
//!       "group": { "id": "g-0001", "name": "projection" },
//!       "media_type": "image",
//!       "tags": ["annotate"],
//!       "polyline_2d": { "polylines": [ { "label": "lane", "points": [[[0.1, 0.9], [0.2, 0.1]]] } ] },
//!       "orthographic_projection_metadata": { "min_bound": [-50, -50, -5], "max_bound": [50, 50, 5], "width": 1080, "height": 1080 }
//!     },
//!     { "group": { "id": "g-0001", "name": "pcd" }, "media_type": "point-cloud" }
//!   ]
//! }
//! ```

use crate::{Error, GroupedPolylines3d};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{
    collections::{HashMap, HashSet},
    fs::File,
    io::{BufReader, BufWriter},
    path::{Path, PathBuf},
};

/// Field holding a sample's group identifier.
pub const GROUP_ID_FIELD: &str = "group.id";

/// Field holding a sample's group slice name.
pub const GROUP_SLICE_FIELD: &str = "group.name";

/// Field holding a sample's tags.
pub const TAGS_FIELD: &str = "tags";

/// Field holding a sample's media type.
pub const MEDIA_TYPE_FIELD: &str = "media_type";

/// Snapshot key mapping group slice names to media types.
const GROUP_MEDIA_TYPES_KEY: &str = "group_media_types";

/// Media types of group slices holding point clouds.
pub const POINT_CLOUD_MEDIA_TYPES: [&str; 2] = ["pcd", "3d"];

/// The requested field values of one sample.
///
/// Fields that are missing or `null` in the sample are absent from the
/// record.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Record {
    values: HashMap<String, Value>,
}

impl Record {
    /// Extract `fields` from a sample.
    pub fn from_sample(sample: &Value, fields: &[&str]) -> Self {
        let values = fields
            .iter()
            .filter_map(|field| {
                lookup(sample, field)
                    .filter(|value| !value.is_null())
                    .map(|value| (field.to_string(), value.clone()))
            })
            .collect();
        Self { values }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    /// Field value as a lookup key, see [`value_key`].
    pub fn key(&self, field: &str) -> Option<String> {
        self.get(field).and_then(value_key)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: Value) {
        self.values.insert(field.into(), value);
    }
}

/// Convert a field value to a key string.
///
/// Strings are used verbatim, numbers and booleans by their JSON text.
/// `null`, arrays and objects are not keys.
pub fn value_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Resolve a dotted field path inside a sample.
pub fn lookup<'a>(sample: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(sample, |value, segment| value.as_object()?.get(segment))
}

/// Set a dotted field path inside a sample, creating intermediate objects.
///
/// Fails when an intermediate segment exists but is not an object.
fn assign(sample: &mut Value, path: &str, value: Value) -> Result<(), Error> {
    let mut segments = path.split('.').peekable();
    let mut current = sample;

    while let Some(segment) = segments.next() {
        let object = current.as_object_mut().ok_or_else(|| {
            Error::InvalidParameters(format!(
                "cannot set field {}: segment {} is not inside an object",
                path, segment
            ))
        })?;

        if segments.peek().is_none() {
            object.insert(segment.to_owned(), value);
            return Ok(());
        }

        current = object
            .entry(segment.to_owned())
            .or_insert_with(|| Value::Object(Map::new()));
    }

    Err(Error::InvalidParameters("empty field path".to_owned()))
}

/// Read and write access to a host dataset.
///
/// # Example Implementation
///
/// ```rust,ignore
/// use polyline_lift::{DatasetStore, Error, GroupedPolylines3d, Record};
///
/// struct DatabaseStore { /* connection */ }
///
/// impl DatasetStore for DatabaseStore {
///     fn fetch_batch(&self, fields: &[&str]) -> Result<Vec<Record>, Error> {
///         // SELECT fields FROM samples WHERE slice = 'projection'
///         Ok(vec![])
///     }
///
///     fn target_slice(&self) -> Result<String, Error> {
///         Ok("pcd".to_owned())
///     }
///
///     fn store_batch(
///         &mut self,
///         field: &str,
///         values: &GroupedPolylines3d,
///         key_field: &str,
///     ) -> Result<usize, Error> {
///         // UPDATE samples SET field = value WHERE key_field = key
///         Ok(values.len())
///     }
/// }
/// ```
pub trait DatasetStore {
    /// Fetch the given fields of every sample in scope, in dataset order.
    fn fetch_batch(&self, fields: &[&str]) -> Result<Vec<Record>, Error>;

    /// The group slice [`store_batch`](Self::store_batch) writes into.
    ///
    /// Fails when no point cloud slice is configured or can be inferred, and
    /// when the slice would be the one annotations are read from.
    fn target_slice(&self) -> Result<String, Error>;

    /// Write `values` into `field` of every sample of the target slice whose
    /// `key_field` matches a key of `values`.
    ///
    /// Returns the number of samples written.
    fn store_batch(
        &mut self,
        field: &str,
        values: &GroupedPolylines3d,
        key_field: &str,
    ) -> Result<usize, Error>;
}

/// In-memory dataset of JSON samples.
///
/// Reads can be restricted to one group slice and to groups carrying an
/// annotate tag. Writes go to the point cloud slice, see
/// [`DatasetStore::target_slice`].
///
/// ```rust
/// use polyline_lift::{DatasetStore, MemoryDatasetStore};
/// use serde_json::json;
///
/// let store = MemoryDatasetStore::new(vec![
///     json!({"group": {"id": "a", "name": "projection"}, "polyline_2d": null}),
///     json!({"group": {"id": "a", "name": "pcd"}}),
/// ])
/// .with_source_slice("projection");
///
/// let records = store.fetch_batch(&["polyline_2d", "group.id"])?;
/// assert_eq!(records.len(), 1);
/// assert!(records[0].get("polyline_2d").is_none());
/// assert_eq!(records[0].key("group.id").as_deref(), Some("a"));
/// # Ok::<(), polyline_lift::Error>(())
/// ```
#[derive(Clone, Debug, Default)]
pub struct MemoryDatasetStore {
    samples: Vec<Value>,
    source_slice: Option<String>,
    target_slice: Option<String>,
    annotate_tag: Option<String>,
    group_media_types: Vec<(String, String)>,
}

impl MemoryDatasetStore {
    pub fn new(samples: Vec<Value>) -> Self {
        Self {
            samples,
            ..Default::default()
        }
    }

    /// Only fetch samples from this group slice.
    pub fn with_source_slice(mut self, slice: impl Into<String>) -> Self {
        self.source_slice = Some(slice.into());
        self
    }

    /// Write into this group slice instead of the inferred point cloud slice.
    pub fn with_target_slice(mut self, slice: impl Into<String>) -> Self {
        self.target_slice = Some(slice.into());
        self
    }

    /// When any sample carries `tag`, only fetch groups containing a tagged
    /// sample.
    pub fn with_annotate_tag(mut self, tag: impl Into<String>) -> Self {
        self.annotate_tag = Some(tag.into());
        self
    }

    /// Declare the media type of each group slice. Without it, media types
    /// are read from the samples.
    pub fn with_group_media_types<I, K, V>(mut self, media_types: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.group_media_types = media_types
            .into_iter()
            .map(|(slice, media_type)| (slice.into(), media_type.into()))
            .collect();
        self
    }

    /// Media type of each group slice, in declaration or dataset order.
    pub fn group_media_types(&self) -> Vec<(String, String)> {
        if !self.group_media_types.is_empty() {
            return self.group_media_types.clone();
        }

        let mut media_types: Vec<(String, String)> = Vec::new();
        for sample in &self.samples {
            let slice = lookup(sample, GROUP_SLICE_FIELD).and_then(Value::as_str);
            let media_type = lookup(sample, MEDIA_TYPE_FIELD).and_then(Value::as_str);
            if let (Some(slice), Some(media_type)) = (slice, media_type) {
                if !media_types.iter().any(|(s, _)| s == slice) {
                    media_types.push((slice.to_owned(), media_type.to_owned()));
                }
            }
        }
        media_types
    }

    pub fn samples(&self) -> &[Value] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<Value> {
        self.samples
    }

    fn in_slice(sample: &Value, slice: Option<&str>) -> bool {
        match slice {
            Some(slice) => lookup(sample, GROUP_SLICE_FIELD).and_then(Value::as_str) == Some(slice),
            None => true,
        }
    }

    /// Group ids of tagged samples, or `None` when no sample is tagged.
    fn tagged_groups(&self) -> Option<HashSet<String>> {
        let tag = self.annotate_tag.as_deref()?;
        let has_tag = |sample: &&Value| {
            lookup(sample, TAGS_FIELD)
                .and_then(Value::as_array)
                .is_some_and(|tags| tags.iter().any(|t| t.as_str() == Some(tag)))
        };

        let groups: HashSet<String> = self
            .samples
            .iter()
            .filter(has_tag)
            .filter_map(|sample| lookup(sample, GROUP_ID_FIELD).and_then(value_key))
            .collect();

        if groups.is_empty() {
            None
        } else {
            debug!("Restricting to {} groups tagged {:?}", groups.len(), tag);
            Some(groups)
        }
    }
}

impl DatasetStore for MemoryDatasetStore {
    fn fetch_batch(&self, fields: &[&str]) -> Result<Vec<Record>, Error> {
        let tagged = self.tagged_groups();
        let records: Vec<Record> = self
            .samples
            .iter()
            .filter(|sample| Self::in_slice(sample, self.source_slice.as_deref()))
            .filter(|sample| match &tagged {
                Some(groups) => lookup(sample, GROUP_ID_FIELD)
                    .and_then(value_key)
                    .is_some_and(|id| groups.contains(&id)),
                None => true,
            })
            .map(|sample| Record::from_sample(sample, fields))
            .collect();

        debug!(
            "Fetched {} records with fields {:?} from {} samples",
            records.len(),
            fields,
            self.samples.len()
        );
        Ok(records)
    }

    fn target_slice(&self) -> Result<String, Error> {
        let slice = match &self.target_slice {
            Some(slice) => slice.clone(),
            None => {
                let slice = self
                    .group_media_types()
                    .into_iter()
                    .find(|(slice, media_type)| {
                        POINT_CLOUD_MEDIA_TYPES.contains(&media_type.as_str())
                            && self.source_slice.as_deref() != Some(slice.as_str())
                    })
                    .map(|(slice, _)| slice)
                    .ok_or_else(|| {
                        Error::MissingField(format!(
                            "no group slice with media type {}, a point cloud slice must be given",
                            POINT_CLOUD_MEDIA_TYPES.join(" or ")
                        ))
                    })?;
                debug!("Inferred point cloud slice {}", slice);
                slice
            }
        };

        if self.source_slice.as_deref() == Some(slice.as_str()) {
            return Err(Error::InvalidParameters(format!(
                "point cloud slice {} is the slice annotations are read from",
                slice
            )));
        }

        Ok(slice)
    }

    fn store_batch(
        &mut self,
        field: &str,
        values: &GroupedPolylines3d,
        key_field: &str,
    ) -> Result<usize, Error> {
        let target = self.target_slice()?;
        let mut matched: HashSet<&str> = HashSet::with_capacity(values.len());
        let mut written = 0;

        for sample in self.samples.iter_mut() {
            if !Self::in_slice(sample, Some(target.as_str())) {
                continue;
            }

            let Some(key) = lookup(sample, key_field).and_then(value_key) else {
                continue;
            };

            if let Some((group_id, polylines)) = values.get_key_value(&key) {
                assign(sample, field, serde_json::to_value(polylines)?)?;
                matched.insert(group_id.as_str());
                written += 1;
            }
        }

        let unmatched = values.len() - matched.len();
        if unmatched > 0 {
            warn!(
                "{} of {} groups had no sample with a matching {} to store {} into",
                unmatched,
                values.len(),
                key_field,
                field
            );
        }

        debug!("Stored {} into {} samples of slice {}", field, written, target);
        Ok(written)
    }
}

/// On-disk layout of a dataset snapshot.
#[derive(Serialize, Deserialize, Default)]
struct Snapshot {
    #[serde(default)]
    samples: Vec<Value>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

/// Dataset snapshot stored as a JSON file.
///
/// Loads the whole snapshot on [`open`](Self::open); writes stay in memory
/// until [`save`](Self::save) or [`save_to`](Self::save_to). Top-level keys
/// other than `samples` are preserved.
#[derive(Debug)]
pub struct JsonDatasetStore {
    path: PathBuf,
    store: MemoryDatasetStore,
    extra: Map<String, Value>,
}

impl JsonDatasetStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let snapshot: Snapshot = serde_json::from_reader(BufReader::new(file))?;
        debug!(
            "Opened dataset snapshot {:?} with {} samples",
            path,
            snapshot.samples.len()
        );

        let mut store = MemoryDatasetStore::new(snapshot.samples);
        if let Some(media_types) = snapshot
            .extra
            .get(GROUP_MEDIA_TYPES_KEY)
            .and_then(Value::as_object)
        {
            store = store.with_group_media_types(
                media_types
                    .iter()
                    .filter_map(|(slice, media_type)| Some((slice.clone(), media_type.as_str()?))),
            );
        }

        Ok(Self {
            path,
            store,
            extra: snapshot.extra,
        })
    }

    pub fn with_source_slice(mut self, slice: impl Into<String>) -> Self {
        self.store = self.store.with_source_slice(slice);
        self
    }

    pub fn with_target_slice(mut self, slice: impl Into<String>) -> Self {
        self.store = self.store.with_target_slice(slice);
        self
    }

    pub fn with_annotate_tag(mut self, tag: impl Into<String>) -> Self {
        self.store = self.store.with_annotate_tag(tag);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn samples(&self) -> &[Value] {
        self.store.samples()
    }

    /// Write the snapshot back to the file it was opened from.
    pub fn save(&self) -> Result<(), Error> {
        self.save_to(&self.path)
    }

    /// Write the snapshot to `path`.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<(), Error> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let snapshot = SnapshotRef {
            samples: self.store.samples(),
            extra: &self.extra,
        };
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, &snapshot)?;

        debug!("Saved dataset snapshot to {:?}", path);
        Ok(())
    }
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    samples: &'a [Value],
    #[serde(flatten)]
    extra: &'a Map<String, Value>,
}

impl DatasetStore for JsonDatasetStore {
    fn fetch_batch(&self, fields: &[&str]) -> Result<Vec<Record>, Error> {
        self.store.fetch_batch(fields)
    }

    fn target_slice(&self) -> Result<String, Error> {
        self.store.target_slice()
    }

    fn store_batch(
        &mut self,
        field: &str,
        values: &GroupedPolylines3d,
        key_field: &str,
    ) -> Result<usize, Error> {
        self.store.store_batch(field, values, key_field)
    }
}
