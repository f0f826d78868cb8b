/// Asset loading
///
/// Loads happen on background threads and resolve independently; the game
/// joins on all of them before the first frame. A restart bumps the epoch,
/// so results from loads started before the restart are discarded instead
/// of landing in a reused slot.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::thread;

use glam::Vec3;
use log::{debug, warn};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("failed to read `{path}`: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse `{path}`: {source}")]
    Parse {
        path: String,
        #[source]
        source: tobj::LoadError,
    },
    #[error("asset worker disappeared before the load resolved")]
    WorkerLost,
}

/// Triangle mesh decoded to a vertex cloud. Normals may be empty for
/// meshes only used as collision input.
#[derive(Debug, Clone)]
pub struct MeshData {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub indices: Vec<u32>,
}

impl MeshData {
    /// The point cloud convex-hull construction consumes.
    pub fn vertex_cloud(&self) -> &[Vec3] {
        &self.positions
    }

    /// Procedural axis-aligned box, used when no authored mesh is
    /// configured.
    pub fn cuboid(half_extents: Vec3) -> Self {
        let h = half_extents;
        let positions = vec![
            Vec3::new(-h.x, -h.y, -h.z),
            Vec3::new(h.x, -h.y, -h.z),
            Vec3::new(h.x, h.y, -h.z),
            Vec3::new(-h.x, h.y, -h.z),
            Vec3::new(-h.x, -h.y, h.z),
            Vec3::new(h.x, -h.y, h.z),
            Vec3::new(h.x, h.y, h.z),
            Vec3::new(-h.x, h.y, h.z),
        ];
        let indices = vec![
            0, 2, 1, 0, 3, 2, // back
            4, 5, 6, 4, 6, 7, // front
            0, 1, 5, 0, 5, 4, // bottom
            3, 6, 2, 3, 7, 6, // top
            0, 4, 7, 0, 7, 3, // left
            1, 2, 6, 1, 6, 5, // right
        ];
        Self {
            positions,
            normals: Vec::new(),
            indices,
        }
    }
}

/// An asset the core treats as opaque past decoding.
#[derive(Debug, Clone)]
pub enum Asset {
    Mesh(MeshData),
    Blob(Vec<u8>),
}

/// Resolved name → asset mapping handed to the game once every requested
/// load completed.
#[derive(Default)]
pub struct AssetStore {
    assets: HashMap<String, Asset>,
}

impl AssetStore {
    pub fn mesh(&self, name: &str) -> Option<&MeshData> {
        match self.assets.get(name) {
            Some(Asset::Mesh(mesh)) => Some(mesh),
            _ => None,
        }
    }

    pub fn blob(&self, name: &str) -> Option<&[u8]> {
        match self.assets.get(name) {
            Some(Asset::Blob(bytes)) => Some(bytes.as_slice()),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}

struct Completed {
    epoch: u64,
    name: String,
    result: Result<Asset, AssetError>,
}

/// Background asset loader.
pub struct AssetLoader {
    epoch: u64,
    outstanding: usize,
    tx: Sender<Completed>,
    rx: Receiver<Completed>,
}

impl AssetLoader {
    pub fn new() -> Self {
        let (tx, rx) = channel();
        Self {
            epoch: 0,
            outstanding: 0,
            tx,
            rx,
        }
    }

    /// Queue an OBJ mesh load.
    pub fn request_mesh(&mut self, name: impl Into<String>, path: PathBuf) {
        self.spawn(name.into(), move || load_mesh(&path));
    }

    /// Queue an opaque byte load (textures, audio, whatever the backend
    /// wants to decode itself).
    pub fn request_blob(&mut self, name: impl Into<String>, path: PathBuf) {
        self.spawn(name.into(), move || load_blob(&path));
    }

    fn spawn<F>(&mut self, name: String, load: F)
    where
        F: FnOnce() -> Result<Asset, AssetError> + Send + 'static,
    {
        let tx = self.tx.clone();
        let epoch = self.epoch;
        self.outstanding += 1;
        thread::spawn(move || {
            let result = load();
            // The receiver may be gone if the game shut down mid-load.
            let _ = tx.send(Completed {
                epoch,
                name,
                result,
            });
        });
    }

    /// Abandon every in-flight load. Their results still arrive on the
    /// channel but carry a stale epoch and are dropped on receipt.
    pub fn restart(&mut self) {
        self.epoch += 1;
        self.outstanding = 0;
    }

    /// Join on every outstanding load. `progress` fires once per
    /// completion. Any single failure rejects the whole load, leaving the
    /// caller's previous state untouched.
    pub fn wait_all<P>(&mut self, mut progress: P) -> Result<AssetStore, AssetError>
    where
        P: FnMut(&str, usize, usize),
    {
        let total = self.outstanding;
        let mut store = AssetStore::default();
        let mut done = 0;

        while self.outstanding > 0 {
            let message = self.rx.recv().map_err(|_| AssetError::WorkerLost)?;
            if message.epoch != self.epoch {
                debug!("discarding stale load `{}`", message.name);
                continue;
            }
            self.outstanding -= 1;
            match message.result {
                Ok(asset) => {
                    done += 1;
                    progress(&message.name, done, total);
                    store.assets.insert(message.name, asset);
                }
                Err(err) => {
                    warn!("asset load failed, rejecting the batch: {err}");
                    self.restart();
                    return Err(err);
                }
            }
        }
        Ok(store)
    }
}

impl Default for AssetLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn load_blob(path: &PathBuf) -> Result<Asset, AssetError> {
    std::fs::read(path)
        .map(Asset::Blob)
        .map_err(|source| AssetError::Io {
            path: path.display().to_string(),
            source,
        })
}

fn load_mesh(path: &PathBuf) -> Result<Asset, AssetError> {
    let options = tobj::LoadOptions {
        triangulate: true,
        single_index: true,
        ..Default::default()
    };
    let (models, _materials) =
        tobj::load_obj(path, &options).map_err(|source| AssetError::Parse {
            path: path.display().to_string(),
            source,
        })?;

    let mut mesh = MeshData {
        positions: Vec::new(),
        normals: Vec::new(),
        indices: Vec::new(),
    };
    for model in models {
        let base = mesh.positions.len() as u32;
        for p in model.mesh.positions.chunks_exact(3) {
            mesh.positions.push(Vec3::new(p[0], p[1], p[2]));
        }
        for n in model.mesh.normals.chunks_exact(3) {
            mesh.normals.push(Vec3::new(n[0], n[1], n[2]));
        }
        mesh.indices
            .extend(model.mesh.indices.iter().map(|i| base + i));
    }
    Ok(Asset::Mesh(mesh))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn blob_load_reports_progress_once_per_asset() {
        let path = std::env::temp_dir().join("ironsight_blob_test.bin");
        fs::write(&path, b"opaque bytes").unwrap();

        let mut loader = AssetLoader::new();
        loader.request_blob("sky", path.clone());

        let mut calls = Vec::new();
        let store = loader
            .wait_all(|name, done, total| calls.push((name.to_string(), done, total)))
            .unwrap();

        assert_eq!(calls, vec![("sky".to_string(), 1, 1)]);
        assert_eq!(store.blob("sky"), Some(b"opaque bytes".as_slice()));

        fs::remove_file(&path).ok();
    }

    #[test]
    fn obj_meshes_decode_to_a_vertex_cloud() {
        let path = std::env::temp_dir().join("ironsight_mesh_test.obj");
        fs::write(
            &path,
            "v 0 0 0\nv 1 0 0\nv 0 1 0\nv 0 0 1\nf 1 2 3\nf 1 2 4\nf 1 3 4\nf 2 3 4\n",
        )
        .unwrap();

        let mut loader = AssetLoader::new();
        loader.request_mesh("tetra", path.clone());
        let store = loader.wait_all(|_, _, _| {}).unwrap();

        let mesh = store.mesh("tetra").unwrap();
        assert_eq!(mesh.positions.len(), 4);
        assert_eq!(mesh.indices.len(), 12);

        fs::remove_file(&path).ok();
    }

    #[test]
    fn missing_file_rejects_the_whole_batch() {
        let good = std::env::temp_dir().join("ironsight_good_test.bin");
        fs::write(&good, b"fine").unwrap();

        let mut loader = AssetLoader::new();
        loader.request_blob("good", good.clone());
        loader.request_blob("bad", PathBuf::from("/nonexistent/ironsight.bin"));

        assert!(loader.wait_all(|_, _, _| {}).is_err());

        fs::remove_file(&good).ok();
    }

    #[test]
    fn stale_epoch_results_are_discarded() {
        let path = std::env::temp_dir().join("ironsight_epoch_test.bin");
        fs::write(&path, b"payload").unwrap();

        let mut loader = AssetLoader::new();
        loader.request_blob("slot", path.clone());
        // Restart before the load resolves: whatever arrives is stale.
        loader.restart();
        loader.request_blob("slot", path.clone());

        let store = loader.wait_all(|_, _, _| {}).unwrap();
        // Exactly one result survived, from the current epoch.
        assert_eq!(store.len(), 1);
        assert_eq!(store.blob("slot"), Some(b"payload".as_slice()));

        fs::remove_file(&path).ok();
    }
}
