// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! Settings for the polyline load flow.
//!
//! Settings are layered with the `config` crate, later layers overriding
//! earlier ones:
//!
//! 1. Built-in defaults ([`Settings::default`])
//! 2. An optional settings file (TOML, JSON or YAML, chosen by extension)
//! 3. Environment variables prefixed `POLYLINE_LIFT_`
//!
//! # Configuration
//!
//! - `POLYLINE_LIFT_PLANE_HEIGHT`: plane height in meters (default: -1.6)
//! - `POLYLINE_LIFT_LABEL_FIELD`: output field for 3D polylines
//!   (default: `polylines_3d`)
//! - `POLYLINE_LIFT_PCD_SLICE`: group slice holding point clouds (default:
//!   inferred from the slice media types)
//! - `POLYLINE_LIFT_PARALLEL`: reproject groups in parallel (default: false)
//!
//! ```toml
//! plane_height = -1.75
//! label_field = "lanes_3d"
//! pcd_slice = "lidar"
//! ```

use crate::{DEFAULT_PLANE_HEIGHT, Error};
use config::{Config, Environment, File};
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable prefix for settings overrides.
pub const ENV_PREFIX: &str = "POLYLINE_LIFT";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Height of the plane annotations are lifted onto.
    pub plane_height: f64,
    /// Field holding the 2D polylines on projection samples.
    pub projection_field: String,
    /// Field holding the projection metadata on projection samples.
    pub metadata_field: String,
    /// Field identifying the sample group, shared by all slices of a group.
    pub key_field: String,
    /// Field the 3D polylines are written to on point cloud samples.
    pub label_field: String,
    /// Group slice holding the orthographic projection images.
    pub projection_slice: String,
    /// Group slice holding the point clouds. `None` picks the first slice
    /// whose media type is `pcd` or `3d`.
    pub pcd_slice: Option<String>,
    /// Tag marking groups selected for annotation. `None` disables the filter.
    pub annotate_tag: Option<String>,
    /// Reproject groups on the rayon thread pool.
    pub parallel: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            plane_height: DEFAULT_PLANE_HEIGHT,
            projection_field: "polyline_2d".to_owned(),
            metadata_field: "orthographic_projection_metadata".to_owned(),
            key_field: "group.id".to_owned(),
            label_field: "polylines_3d".to_owned(),
            projection_slice: "projection".to_owned(),
            pcd_slice: None,
            annotate_tag: Some("annotate".to_owned()),
            parallel: false,
        }
    }
}

impl Settings {
    /// Load settings from defaults, an optional file and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, Error> {
        Self::load_with_env(path, Environment::with_prefix(ENV_PREFIX))
    }

    fn load_with_env(path: Option<&Path>, env: Environment) -> Result<Self, Error> {
        let mut builder = Config::builder().add_source(Config::try_from(&Settings::default())?);

        if let Some(path) = path {
            debug!("Loading settings from {:?}", path);
            builder = builder.add_source(File::from(path).required(true));
        }

        let settings: Settings = builder
            .add_source(env.try_parsing(true))
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        debug!("Settings: {:?}", settings);
        Ok(settings)
    }

    /// Check values that would make the load flow meaningless.
    pub fn validate(&self) -> Result<(), Error> {
        if !self.plane_height.is_finite() {
            return Err(Error::InvalidParameters(format!(
                "plane_height must be finite, got {}",
                self.plane_height
            )));
        }

        for (name, value) in [
            ("projection_field", &self.projection_field),
            ("metadata_field", &self.metadata_field),
            ("key_field", &self.key_field),
            ("label_field", &self.label_field),
        ] {
            if value.is_empty() {
                return Err(Error::InvalidParameters(format!("{} must not be empty", name)));
            }
        }

        Ok(())
    }
}
