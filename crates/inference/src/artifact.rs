//! On-disk model artifacts keyed by network name, ratio and held-out case.

use crate::error::{InferenceError, InferenceResult};
use burn::module::Module;
use burn::record::{BinFileRecorder, FullPrecisionSettings};
use burn::tensor::backend::Backend;
use models::{SegmentationModel, SegmentationModelConfig};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactKey {
    pub net_name: String,
    pub ratio: usize,
    pub case_id: u32,
}

impl ArtifactKey {
    pub fn new(net_name: impl Into<String>, ratio: usize, case_id: u32) -> Self {
        Self {
            net_name: net_name.into(),
            ratio,
            case_id,
        }
    }

    /// `{net_name}.d{ratio}.mosaic{case_id}.bin`
    pub fn file_name(&self) -> String {
        format!("{}.d{}.mosaic{}.bin", self.net_name, self.ratio, self.case_id)
    }
}

/// Directory of trained model weights. One file per [`ArtifactKey`].
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, key: &ArtifactKey) -> PathBuf {
        self.root.join(key.file_name())
    }

    pub fn exists(&self, key: &ArtifactKey) -> bool {
        self.path(key).is_file()
    }

    /// Restore weights for `key` into a model built from `cfg`.
    ///
    /// Absent or unreadable artifacts yield `None`; the latter is logged so the
    /// caller can retrain.
    pub fn try_load<B: Backend>(
        &self,
        key: &ArtifactKey,
        cfg: &SegmentationModelConfig,
        device: &B::Device,
    ) -> Option<SegmentationModel<B>> {
        let path = self.path(key);
        if !path.is_file() {
            return None;
        }
        let model = match SegmentationModel::<B>::new(cfg, device) {
            Ok(model) => model,
            Err(err) => {
                log::warn!("cannot rebuild model for {}: {err}", path.display());
                return None;
            }
        };
        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        match model.load_file(path.clone(), &recorder, device) {
            Ok(model) => {
                log::info!("loaded model artifact {}", path.display());
                Some(model)
            }
            Err(err) => {
                log::warn!(
                    "failed to load model artifact {}: {err}; it will be retrained",
                    path.display()
                );
                None
            }
        }
    }

    pub fn save<B: Backend>(
        &self,
        key: &ArtifactKey,
        model: &SegmentationModel<B>,
    ) -> InferenceResult<PathBuf> {
        let path = self.path(key);
        std::fs::create_dir_all(&self.root).map_err(|e| InferenceError::Recorder {
            path: self.root.clone(),
            message: e.to_string(),
        })?;
        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        model
            .clone()
            .save_file(path.clone(), &recorder)
            .map_err(|e| InferenceError::Recorder {
                path: path.clone(),
                message: e.to_string(),
            })?;
        log::info!("saved model artifact {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_encodes_key() {
        let key = ArtifactKey::new("unet", 2, 7);
        assert_eq!(key.file_name(), "unet.d2.mosaic7.bin");
        let store = ArtifactStore::new("/tmp/models");
        assert_eq!(store.path(&key), PathBuf::from("/tmp/models/unet.d2.mosaic7.bin"));
    }
}
