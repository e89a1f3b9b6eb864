//! Resolution and lazy loading of the served model.
//!
//! The model is loaded once per process on first use and shared by all requests afterwards. A
//! failed load is not remembered, the next request tries again.
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{anyhow, bail, Context, Result};
use reqwest::Client;
use tokio::sync::OnceCell;

use crate::{
    nn::{InferModel, Thresholds, YoloModel},
    utils::download_file,
};

/// Number of classes of COCO-trained models.
const COCO_CLASSES: usize = 80;
/// Mask coefficients per proposal of YOLOv8 segmentation heads.
const SEG_MASKS: usize = 32;

/// Static properties of a known model id.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ModelSpec {
    pub id: &'static str,
    pub input_size: u32,
    pub num_classes: usize,
    pub num_masks: usize,
}

const KNOWN_MODELS: &[ModelSpec] = &[
    ModelSpec::coco("yolov8n-640", 0),
    ModelSpec::coco("yolov8s-640", 0),
    ModelSpec::coco("yolov8m-640", 0),
    ModelSpec::coco("yolov8n-seg-640", SEG_MASKS),
    ModelSpec::coco("yolov8s-seg-640", SEG_MASKS),
    ModelSpec::coco("yolov8m-seg-640", SEG_MASKS),
];

impl ModelSpec {
    const fn coco(id: &'static str, num_masks: usize) -> Self {
        Self {
            id,
            input_size: 640,
            num_classes: COCO_CLASSES,
            num_masks,
        }
    }

    pub fn lookup(id: &str) -> Result<Self> {
        KNOWN_MODELS
            .iter()
            .find(|spec| spec.id == id)
            .copied()
            .ok_or_else(|| {
                let known: Vec<_> = KNOWN_MODELS.iter().map(|spec| spec.id).collect();
                anyhow!("unknown model id {}, known ids: {}", id, known.join(", "))
            })
    }
}

/// Location of model files on disk, optionally backed by a download URL.
#[derive(Clone, Debug)]
pub struct ModelStore {
    dir: PathBuf,
    base_url: Option<String>,
}

impl ModelStore {
    pub fn new(dir: impl Into<PathBuf>, base_url: Option<String>) -> Self {
        Self {
            dir: dir.into(),
            base_url,
        }
    }

    /// Default directory below the user cache dir.
    pub fn default_dir() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("predict_server")
            .join("models")
    }

    pub fn model_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.onnx", id))
    }

    /// Path of a model file, downloading it first if needed.
    pub async fn fetch(&self, id: &str) -> Result<PathBuf> {
        let path = self.model_path(id);
        if path.exists() {
            return Ok(path);
        }

        let Some(base_url) = &self.base_url else {
            bail!(
                "model file {} not found and no download URL configured",
                path.display()
            );
        };

        let url = format!("{}/{}.onnx", base_url.trim_end_matches('/'), id);
        log::info!("Downloading {} to {}", url, path.display());
        download_file(&Client::new(), &url, &path).await?;

        Ok(path)
    }
}

/// Builds a model from a file on disk. Runs on the blocking thread pool.
type LoadFn = dyn Fn(&Path, ModelSpec, Thresholds) -> Result<Arc<dyn InferModel>> + Send + Sync;

fn load_yolo(
    path: &Path,
    spec: ModelSpec,
    thresholds: Thresholds,
) -> Result<Arc<dyn InferModel>> {
    let model = YoloModel::load(
        path,
        spec.input_size,
        spec.num_classes,
        spec.num_masks,
        thresholds,
    )?;
    Ok(Arc::new(model))
}

/// Hands out the process-wide model instance.
pub struct ModelRegistry {
    model_id: String,
    store: ModelStore,
    thresholds: Thresholds,
    loader: Arc<LoadFn>,
    model: OnceCell<Arc<dyn InferModel>>,
}

impl ModelRegistry {
    pub fn new(model_id: impl Into<String>, store: ModelStore, thresholds: Thresholds) -> Self {
        Self::with_loader(model_id, store, thresholds, load_yolo)
    }

    /// Registry building its model with `loader` instead of loading an ONNX file with tract.
    pub fn with_loader<F>(
        model_id: impl Into<String>,
        store: ModelStore,
        thresholds: Thresholds,
        loader: F,
    ) -> Self
    where
        F: Fn(&Path, ModelSpec, Thresholds) -> Result<Arc<dyn InferModel>> + Send + Sync + 'static,
    {
        Self {
            model_id: model_id.into(),
            store,
            thresholds,
            loader: Arc::new(loader),
            model: OnceCell::new(),
        }
    }

    /// Registry that serves an already constructed model.
    pub fn preloaded(model_id: impl Into<String>, model: Arc<dyn InferModel>) -> Self {
        Self {
            model_id: model_id.into(),
            store: ModelStore::new(ModelStore::default_dir(), None),
            thresholds: Thresholds::default(),
            loader: Arc::new(load_yolo),
            model: OnceCell::new_with(Some(model)),
        }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn is_loaded(&self) -> bool {
        self.model.initialized()
    }

    /// Get the model, loading it on first use.
    pub async fn get(&self) -> Result<Arc<dyn InferModel>> {
        let model = self
            .model
            .get_or_try_init(|| self.load())
            .await
            .with_context(|| format!("failed to load model {}", self.model_id))?;

        Ok(Arc::clone(model))
    }

    async fn load(&self) -> Result<Arc<dyn InferModel>> {
        let spec = ModelSpec::lookup(&self.model_id)?;
        let path = self.store.fetch(spec.id).await?;
        let thresholds = self.thresholds;
        let loader = Arc::clone(&self.loader);

        // Optimizing the graph takes a while, keep it off the async workers.
        tokio::task::spawn_blocking(move || loader(&path, spec, thresholds)).await?
    }

    pub fn store_dir(&self) -> &Path {
        &self.store.dir
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::detections::Detections;
    use image::RgbImage;
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    struct NoopModel;

    impl InferModel for NoopModel {
        fn infer(&self, _image: &RgbImage) -> Result<Detections> {
            Ok(Detections::new())
        }
    }

    fn scratch_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("predict_server-{}-{}", name, std::process::id()))
    }

    #[test]
    fn test_lookup_known_and_unknown_ids() {
        let spec = ModelSpec::lookup("yolov8s-seg-640").unwrap();
        assert_eq!(spec.input_size, 640);
        assert_eq!(spec.num_classes, 80);
        assert_eq!(spec.num_masks, 32);
        assert_eq!(ModelSpec::lookup("yolov8s-640").unwrap().num_masks, 0);

        let err = ModelSpec::lookup("resnet50").unwrap_err();
        assert!(err.to_string().contains("unknown model id resnet50"));
    }

    #[test]
    fn test_model_path() {
        let store = ModelStore::new("/models", None);
        assert_eq!(
            store.model_path("yolov8n-640"),
            PathBuf::from("/models/yolov8n-640.onnx")
        );
    }

    #[tokio::test]
    async fn test_fetch_without_file_or_url_fails() {
        let store = ModelStore::new(scratch_dir("missing"), None);
        let err = store.fetch("yolov8n-640").await.unwrap_err();
        assert!(err.to_string().contains("no download URL configured"));
    }

    #[tokio::test]
    async fn test_fetch_existing_file() -> Result<()> {
        let dir = scratch_dir("existing");
        std::fs::create_dir_all(&dir)?;
        std::fs::write(dir.join("yolov8n-640.onnx"), b"onnx")?;

        let store = ModelStore::new(&dir, None);
        assert_eq!(store.fetch("yolov8n-640").await?, dir.join("yolov8n-640.onnx"));

        std::fs::remove_dir_all(&dir)?;
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_load_is_retried() {
        let dir = scratch_dir("retry");
        let registry = ModelRegistry::new(
            "yolov8n-640",
            ModelStore::new(&dir, None),
            Thresholds::default(),
        );

        for _ in 0..2 {
            let err = registry.get().await.err().map(|e| format!("{:#}", e));
            assert!(err.unwrap_or_default().contains("failed to load model yolov8n-640"));
            assert!(!registry.is_loaded());
        }
    }

    #[tokio::test]
    async fn test_lazy_load_runs_once() -> Result<()> {
        let dir = scratch_dir("lazy");
        std::fs::create_dir_all(&dir)?;
        std::fs::write(dir.join("yolov8n-seg-640.onnx"), b"onnx")?;

        let loads = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&loads);
        let registry = ModelRegistry::with_loader(
            "yolov8n-seg-640",
            ModelStore::new(&dir, None),
            Thresholds::default(),
            move |path: &Path, spec: ModelSpec, _thresholds: Thresholds| {
                assert!(path.ends_with("yolov8n-seg-640.onnx"));
                assert_eq!(spec.num_masks, 32);
                counter.fetch_add(1, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(20));
                Ok(Arc::new(NoopModel) as Arc<dyn InferModel>)
            },
        );
        assert!(!registry.is_loaded());

        let (a, b, c) = tokio::join!(registry.get(), registry.get(), registry.get());
        let (a, b, c) = (a?, b?, c?);
        let d = registry.get().await?;

        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&a, &b) && Arc::ptr_eq(&b, &c) && Arc::ptr_eq(&c, &d));
        assert!(registry.is_loaded());

        std::fs::remove_dir_all(&dir)?;
        Ok(())
    }

    #[tokio::test]
    async fn test_preloaded_model_is_shared() -> Result<()> {
        let registry = ModelRegistry::preloaded("fake", Arc::new(NoopModel));
        assert!(registry.is_loaded());

        let a = registry.get().await?;
        let b = registry.get().await?;
        assert!(Arc::ptr_eq(&a, &b));

        Ok(())
    }
}
