//! Maps a discovered URL to its place in the download tree.
//!
//! Routing is pure: the same URL and source always give the same metadata and
//! target, and nothing here touches the network or the file system.

pub mod file_metadata;

use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use crate::{
    error::{Error, Result},
    source::{Persistence, SourceDescriptor, SourceKind},
};

pub use file_metadata::FileMetadata;

/// Where a file is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetLocation {
    /// Fully determined by the file name.
    File(PathBuf),
    /// Needs the calendar date found in the file's content:
    /// `<dir>/<YYYY-MM-DD>/<leaf>`.
    Partitioned { dir: PathBuf, leaf: PathBuf },
}

impl TargetLocation {
    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        match self {
            TargetLocation::File(path) => path.clone(),
            TargetLocation::Partitioned { dir, leaf } => {
                dir.join(date.format("%Y-%m-%d").to_string()).join(leaf)
            }
        }
    }

    pub fn fixed_path(&self) -> Option<&Path> {
        match self {
            TargetLocation::File(path) => Some(path),
            TargetLocation::Partitioned { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Routed {
    pub metadata: FileMetadata,
    pub target: TargetLocation,
}

/// The last path segment of a URL, without query or fragment.
pub fn file_name(url: &str) -> &str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/').next().unwrap_or(path)
}

pub fn route(url: &str, source: &SourceDescriptor) -> Result<Routed> {
    let name = file_name(url);
    if name.is_empty() {
        return Err(Error::routing(url, "URL has no file name"));
    }

    match source.kind {
        SourceKind::Grib => route_grib(name, source),
        SourceKind::Forecasts | SourceKind::Reports => route_poi(name, source),
    }
}

// <root>/<model>/grib/<run>/<field>/<name re-encoded>
fn route_grib(name: &str, source: &SourceDescriptor) -> Result<Routed> {
    let metadata = FileMetadata::from_grib_name(name)?;
    let run = metadata
        .run
        .as_deref()
        .ok_or_else(|| Error::routing(name, "missing model run"))?;

    let stored_name = match &source.persistence {
        Persistence::Transcode { from, to } => {
            let stem = name
                .strip_suffix(&format!(".{from}"))
                .ok_or_else(|| Error::routing(name, format!("expected a .{from} archive")))?;
            format!("{stem}.{to}")
        }
        _ => name.to_string(),
    };

    let path = source
        .root
        .join(&metadata.model)
        .join(source.kind.name())
        .join(run)
        .join(&metadata.field)
        .join(stored_name);

    Ok(Routed {
        metadata,
        target: TargetLocation::File(path),
    })
}

// <root>/poi/<kind>/<YYYY-MM-DD>/<station>/<name>
fn route_poi(name: &str, source: &SourceDescriptor) -> Result<Routed> {
    let metadata = FileMetadata::from_poi_name(name)?;

    let target = TargetLocation::Partitioned {
        dir: source.root.join("poi").join(source.kind.name()),
        leaf: Path::new(&metadata.field).join(name),
    };

    Ok(Routed { metadata, target })
}
