use crate::config::VolumeConfig;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A currently attached volume as reported by the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeDescriptor {
    pub stable_id: String,
    pub label: String,
    pub root: PathBuf,
    pub total_space: u64,
    pub free_space: u64,
}

/// Source of attached volumes.
pub trait VolumeSupplier {
    fn attached_volumes(&self) -> io::Result<Vec<VolumeDescriptor>>;
}

impl VolumeSupplier for [VolumeDescriptor] {
    fn attached_volumes(&self) -> io::Result<Vec<VolumeDescriptor>> {
        Ok(self.to_vec())
    }
}

impl VolumeSupplier for Vec<VolumeDescriptor> {
    fn attached_volumes(&self) -> io::Result<Vec<VolumeDescriptor>> {
        Ok(self.clone())
    }
}

/// Volumes declared in the configuration file. A volume counts as attached when its root
/// directory exists; capacity is read from the filesystem holding it.
pub struct ConfiguredVolumes {
    volumes: Vec<VolumeConfig>,
}

impl ConfiguredVolumes {
    pub fn new(volumes: Vec<VolumeConfig>) -> Self {
        Self { volumes }
    }
}

impl VolumeSupplier for ConfiguredVolumes {
    fn attached_volumes(&self) -> io::Result<Vec<VolumeDescriptor>> {
        let mut attached = Vec::new();
        for volume in &self.volumes {
            let root = Path::new(&volume.root);
            if !root.is_dir() {
                debug!("Volume '{}' not attached at {}", volume.label, volume.root);
                continue;
            }
            attached.push(VolumeDescriptor {
                stable_id: volume.id.clone(),
                label: volume.label.clone(),
                root: root.canonicalize()?,
                total_space: fs2::total_space(root)?,
                free_space: fs2::available_space(root)?,
            });
        }
        Ok(attached)
    }
}

/// The attached volume whose root is the longest prefix of `path`.
pub fn volume_containing<'a>(
    volumes: &'a [VolumeDescriptor],
    path: &Path,
) -> Option<&'a VolumeDescriptor> {
    volumes
        .iter()
        .filter(|v| path.starts_with(&v.root))
        .max_by_key(|v| v.root.components().count())
}
