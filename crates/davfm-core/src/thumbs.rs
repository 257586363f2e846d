//! On-disk thumbnail cache and batch loading.
//!
//! Thumbnails are keyed by `(host bucket, resource path sans extension)`
//! and stored as JPEG files under `thumbs/`. The cache is content-immutable:
//! a hit never re-fetches or re-renders, even if the origin resource has
//! changed since (accepted staleness trade-off — there is no invalidation
//! on remote modification).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use image::DynamicImage;

use crate::error::{CoreError, CoreResult};
use crate::model::{Host, Resource};
use crate::repo::{path as rpath, ResourceRepository};
use crate::task::{spawn_task, TaskHandle, TaskKind};

/// Thumbnails produced by one batch: resource path → cached JPEG file.
pub type ThumbMap = HashMap<String, PathBuf>;

/// Content-addressed on-disk cache of rendered preview images.
pub struct ThumbnailCache {
    root: PathBuf,
}

impl ThumbnailCache {
    /// Creates a cache rooted at `root` (conventionally `thumbs/`).
    /// The directory is created lazily on first store.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Derives the on-disk location of a resource's thumbnail:
    /// `<root>/<host bucket>/<path sans extension>.jpg`, with colons
    /// (Windows drive letters) stripped from the path part.
    pub fn thumb_path(&self, host: &Host, res: &Resource) -> PathBuf {
        let mut rel = format!("{}.jpg", rpath::strip_extension(res.path()));
        if rel.contains(':') {
            rel = rel.replace(':', "");
        }
        self.root
            .join(host.thumb_bucket())
            .join(rel.trim_start_matches('/'))
    }

    /// Returns `true` when a thumbnail for the resource is already cached.
    pub fn exists(&self, host: &Host, res: &Resource) -> bool {
        self.thumb_path(host, res).exists()
    }

    /// Loads a cached thumbnail.
    pub fn load(&self, host: &Host, res: &Resource) -> CoreResult<DynamicImage> {
        let file = self.thumb_path(host, res);
        image::open(&file)
            .map_err(|e| CoreError::Cache(format!("reading '{}': {e}", file.display())))
    }

    /// Persists a rendered thumbnail and returns its path.
    ///
    /// If a thumbnail already exists for the key, the existing file is kept
    /// untouched and returned.
    pub fn store(&self, host: &Host, res: &Resource, image: &DynamicImage) -> CoreResult<PathBuf> {
        let file = self.thumb_path(host, res);
        if file.exists() {
            return Ok(file);
        }
        if let Some(parent) = file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        tracing::debug!(path = res.path(), thumb = %file.display(), "saving thumbnail");
        image
            .to_rgb8()
            .save_with_format(&file, image::ImageFormat::Jpeg)
            .map_err(|e| CoreError::Cache(format!("writing '{}': {e}", file.display())))?;
        Ok(file)
    }
}

/// Decodes resource content and scales it down to `width`, preserving the
/// aspect ratio. Images decode directly; PDFs contribute the first page's
/// largest embedded image.
pub fn render_thumbnail(res: &Resource, bytes: &[u8], width: u32) -> CoreResult<DynamicImage> {
    let image = if res.is_pdf() {
        pdf_first_page_image(bytes)?
    } else {
        image::load_from_memory(bytes)
            .map_err(|e| CoreError::Cache(format!("decoding '{}': {e}", res.name())))?
    };
    Ok(image.thumbnail(width, width))
}

/// Extracts the largest DCT-encoded (JPEG) image from the first page of a
/// PDF. Pages without a decodable embedded image yield a cache error, which
/// batch jobs log and skip.
fn pdf_first_page_image(bytes: &[u8]) -> CoreResult<DynamicImage> {
    let doc = lopdf::Document::load_mem(bytes)
        .map_err(|e| CoreError::Cache(format!("PDF parse: {e}")))?;

    let pages = doc.get_pages();
    let (_, first_page) = pages
        .iter()
        .next()
        .ok_or_else(|| CoreError::Cache("PDF has no pages".to_string()))?;

    let mut best: Option<(i64, Vec<u8>)> = None;
    let (direct, referenced) = doc
        .get_page_resources(*first_page)
        .map_err(|e| CoreError::Cache(format!("PDF page resources: {e}")))?;
    let mut resource_dicts: Vec<&lopdf::Dictionary> = Vec::new();
    if let Some(dict) = direct {
        resource_dicts.push(dict);
    }
    for id in referenced {
        if let Ok(dict) = doc.get_object(id).and_then(lopdf::Object::as_dict) {
            resource_dicts.push(dict);
        }
    }

    for resources in resource_dicts {
        let Ok(xobjects) = resources.get(b"XObject") else {
            continue;
        };
        let Some(xobjects) = resolve_dict(&doc, xobjects) else {
            continue;
        };
        for (_, value) in xobjects.iter() {
            let stream = match value {
                lopdf::Object::Reference(id) => {
                    match doc.get_object(*id).and_then(lopdf::Object::as_stream) {
                        Ok(s) => s,
                        Err(_) => continue,
                    }
                }
                lopdf::Object::Stream(s) => s,
                _ => continue,
            };
            if !is_jpeg_image_stream(stream) {
                continue;
            }
            let width = stream.dict.get(b"Width").and_then(lopdf::Object::as_i64);
            let height = stream.dict.get(b"Height").and_then(lopdf::Object::as_i64);
            let area = width.unwrap_or(0).saturating_mul(height.unwrap_or(0));
            if best.as_ref().map(|(a, _)| area > *a).unwrap_or(true) {
                best = Some((area, stream.content.clone()));
            }
        }
    }

    let (_, content) =
        best.ok_or_else(|| CoreError::Cache("no decodable image on first PDF page".to_string()))?;
    image::load_from_memory(&content)
        .map_err(|e| CoreError::Cache(format!("decoding embedded PDF image: {e}")))
}

fn resolve_dict<'a>(
    doc: &'a lopdf::Document,
    object: &'a lopdf::Object,
) -> Option<&'a lopdf::Dictionary> {
    match object {
        lopdf::Object::Reference(id) => doc
            .get_object(*id)
            .and_then(lopdf::Object::as_dict)
            .ok(),
        lopdf::Object::Dictionary(dict) => Some(dict),
        _ => None,
    }
}

/// An XObject stream qualifies when its subtype is `Image` and its filter
/// chain contains `DCTDecode` (raw JPEG content).
fn is_jpeg_image_stream(stream: &lopdf::Stream) -> bool {
    let is_image = stream
        .dict
        .get(b"Subtype")
        .and_then(lopdf::Object::as_name)
        .map(|name| name == b"Image")
        .unwrap_or(false);
    if !is_image {
        return false;
    }
    match stream.dict.get(b"Filter") {
        Ok(lopdf::Object::Name(name)) => name == b"DCTDecode",
        Ok(lopdf::Object::Array(filters)) => filters.iter().any(|f| {
            lopdf::Object::as_name(f)
                .map(|name| name == b"DCTDecode")
                .unwrap_or(false)
        }),
        _ => false,
    }
}

/// Spawns a Thumbnail task that fills the cache for every image/PDF entry
/// in `items`. Per-item failures are logged and skipped; the batch never
/// aborts because of one bad item.
pub fn spawn_thumbnail_batch(
    repo: Arc<dyn ResourceRepository>,
    cache: Arc<ThumbnailCache>,
    items: Vec<Resource>,
    width: u32,
) -> TaskHandle<ThumbMap> {
    let host = repo.host().clone();
    spawn_task(TaskKind::Thumbnail, move |ctx| async move {
        let mut thumbs = ThumbMap::new();
        let total = items.len() as u64;
        for item in &items {
            if ctx.is_cancelled() {
                tracing::debug!("thumbnail batch cancelled");
                break;
            }
            if !(item.is_image() || item.is_pdf()) {
                continue;
            }

            let cached = if cache.exists(&host, item) {
                Ok(cache.thumb_path(&host, item))
            } else {
                fetch_and_store(repo.as_ref(), &cache, &host, item, width).await
            };
            match cached {
                Ok(file) => {
                    thumbs.insert(item.path().to_string(), file);
                }
                Err(e) => {
                    tracing::warn!(path = item.path(), error = %e, "skipping thumbnail");
                }
            }

            ctx.progress(thumbs.len() as u64, total);
            ctx.message(format!("Loaded thumbnail for {}", item.name()));
        }
        Ok(thumbs)
    })
}

async fn fetch_and_store(
    repo: &dyn ResourceRepository,
    cache: &ThumbnailCache,
    host: &Host,
    item: &Resource,
    width: u32,
) -> CoreResult<PathBuf> {
    let bytes = repo.get_content(item).await?;
    let image = render_thumbnail(item, &bytes, width)?;
    cache.store(host, item, &image)
}

/// Drives at most one thumbnail batch per view.
///
/// Starting a new batch cancels the previous one first and waits for it to
/// settle, so no image belonging to a superseded batch is ever written
/// after its replacement has started.
pub struct ThumbnailLoader {
    cache: Arc<ThumbnailCache>,
    width: u32,
    current: Option<TaskHandle<ThumbMap>>,
}

impl ThumbnailLoader {
    pub fn new(cache: Arc<ThumbnailCache>, width: u32) -> Self {
        Self {
            cache,
            width,
            current: None,
        }
    }

    /// Cancels any running batch, waits for it to settle, then starts a
    /// batch for `items`.
    pub async fn restart(&mut self, repo: Arc<dyn ResourceRepository>, items: Vec<Resource>) {
        if let Some(previous) = self.current.take() {
            previous.cancel();
            let _ = previous.join().await;
        }
        self.current = Some(spawn_thumbnail_batch(
            repo,
            self.cache.clone(),
            items,
            self.width,
        ));
    }

    /// Cancels the running batch, if any, without starting a new one.
    pub fn cancel(&mut self) {
        if let Some(current) = &self.current {
            current.cancel();
        }
    }

    /// Observer access to the running batch.
    pub fn current_mut(&mut self) -> Option<&mut TaskHandle<ThumbMap>> {
        self.current.as_mut()
    }

    /// Detaches the running batch so the caller can join it.
    pub fn take(&mut self) -> Option<TaskHandle<ThumbMap>> {
        self.current.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::HostId;
    use crate::repo::{LocalRepository, ProgressFn};
    use crate::task::TaskUpdate;
    use async_trait::async_trait;
    use std::path::Path;
    use tempfile::TempDir;
    use tokio::sync::Semaphore;

    fn remote_host() -> Host {
        Host::remote("https://dav.example.com", "/files", None, None)
    }

    fn png_resource(path: &str) -> Resource {
        Resource::new(
            path,
            rpath::file_name(path),
            "image/png",
            64,
            None,
            None,
            false,
            HostId::new("test"),
        )
    }

    fn png_bytes() -> Vec<u8> {
        let img = image::DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
            8,
            8,
            image::Rgb([10, 200, 30]),
        ));
        let mut buf = std::io::Cursor::new(Vec::new());
        img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[test]
    fn thumb_path_replaces_extension() {
        let tmp = TempDir::new().unwrap();
        let cache = ThumbnailCache::new(tmp.path());
        let path = cache.thumb_path(&remote_host(), &png_resource("/files/pics/cat.png"));
        assert_eq!(
            path,
            tmp.path().join("dav.example.com/files/pics/cat.jpg")
        );
    }

    #[test]
    fn thumb_path_local_bucket() {
        let tmp = TempDir::new().unwrap();
        let cache = ThumbnailCache::new(tmp.path());
        let path = cache.thumb_path(&Host::local_root("/"), &png_resource("/home/kim/cat.png"));
        assert_eq!(path, tmp.path().join("local/home/kim/cat.jpg"));
    }

    #[test]
    fn thumb_path_strips_colons() {
        let tmp = TempDir::new().unwrap();
        let cache = ThumbnailCache::new(tmp.path());
        let path = cache.thumb_path(&Host::local_root("/"), &png_resource("C:/pics/cat.png"));
        assert!(!path.to_string_lossy().contains(':'));
    }

    #[test]
    fn store_and_load_round_trip() {
        let tmp = TempDir::new().unwrap();
        let cache = ThumbnailCache::new(tmp.path());
        let host = remote_host();
        let res = png_resource("/files/cat.png");

        let img = image::DynamicImage::ImageRgb8(image::RgbImage::new(16, 8));
        assert!(!cache.exists(&host, &res));
        let file = cache.store(&host, &res, &img).unwrap();
        assert!(file.exists());
        assert!(cache.exists(&host, &res));

        let loaded = cache.load(&host, &res).unwrap();
        assert_eq!(loaded.width(), 16);
        assert_eq!(loaded.height(), 8);
    }

    #[test]
    fn store_is_immutable_on_hit() {
        let tmp = TempDir::new().unwrap();
        let cache = ThumbnailCache::new(tmp.path());
        let host = remote_host();
        let res = png_resource("/files/cat.png");

        cache
            .store(&host, &res, &image::DynamicImage::ImageRgb8(image::RgbImage::new(16, 8)))
            .unwrap();
        // Second store with different dimensions must keep the first file.
        cache
            .store(&host, &res, &image::DynamicImage::ImageRgb8(image::RgbImage::new(4, 4)))
            .unwrap();
        let loaded = cache.load(&host, &res).unwrap();
        assert_eq!(loaded.width(), 16);
    }

    #[test]
    fn load_missing_thumb_is_cache_error() {
        let tmp = TempDir::new().unwrap();
        let cache = ThumbnailCache::new(tmp.path());
        let err = cache
            .load(&remote_host(), &png_resource("/files/none.png"))
            .unwrap_err();
        assert!(matches!(err, CoreError::Cache(_)));
    }

    #[test]
    fn render_thumbnail_scales_preserving_aspect() {
        let res = png_resource("/files/wide.png");
        let img = image::DynamicImage::ImageRgb8(image::RgbImage::new(64, 32));
        let mut buf = std::io::Cursor::new(Vec::new());
        img.write_to(&mut buf, image::ImageFormat::Png).unwrap();

        let thumb = render_thumbnail(&res, &buf.into_inner(), 16).unwrap();
        assert_eq!(thumb.width(), 16);
        assert_eq!(thumb.height(), 8);
    }

    #[test]
    fn render_thumbnail_rejects_garbage() {
        let res = png_resource("/files/broken.png");
        assert!(matches!(
            render_thumbnail(&res, b"not an image", 16).unwrap_err(),
            CoreError::Cache(_)
        ));
    }

    #[test]
    fn pdf_without_pages_is_cache_error() {
        assert!(pdf_first_page_image(b"%PDF-1.4 garbage").is_err());
    }

    #[tokio::test]
    async fn batch_fills_cache_from_local_repo() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.png"), png_bytes()).unwrap();
        std::fs::write(tmp.path().join("b.png"), png_bytes()).unwrap();
        std::fs::write(tmp.path().join("notes.txt"), "plain").unwrap();

        let host = Host::local_root(tmp.path().to_string_lossy().into_owned());
        let repo: Arc<dyn ResourceRepository> = Arc::new(LocalRepository::new(host.clone()));
        let cache = Arc::new(ThumbnailCache::new(tmp.path().join("thumbs")));
        let items = repo
            .list_files(&tmp.path().to_string_lossy())
            .await
            .unwrap();

        let handle = spawn_thumbnail_batch(repo, cache.clone(), items, 16);
        let thumbs = handle.join().await.unwrap();

        // Only the two images get thumbnails; the text file is skipped.
        assert_eq!(thumbs.len(), 2);
        for file in thumbs.values() {
            assert!(file.exists());
        }
    }

    #[tokio::test]
    async fn batch_isolates_bad_items() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("good.png"), png_bytes()).unwrap();
        std::fs::write(tmp.path().join("bad.png"), b"corrupt").unwrap();

        let host = Host::local_root(tmp.path().to_string_lossy().into_owned());
        let repo: Arc<dyn ResourceRepository> = Arc::new(LocalRepository::new(host));
        let cache = Arc::new(ThumbnailCache::new(tmp.path().join("thumbs")));
        let items = repo
            .list_files(&tmp.path().to_string_lossy())
            .await
            .unwrap();

        let thumbs = spawn_thumbnail_batch(repo, cache, items, 16)
            .join()
            .await
            .unwrap();
        assert_eq!(thumbs.len(), 1);
        assert!(thumbs.keys().all(|p| p.ends_with("good.png")));
    }

    /// Test double whose `get_content` blocks until a permit is released,
    /// making cancellation points deterministic.
    struct GatedRepo {
        host: Host,
        gate: Arc<Semaphore>,
        payload: Vec<u8>,
    }

    #[async_trait]
    impl ResourceRepository for GatedRepo {
        async fn connect(&self) -> CoreResult<()> {
            Ok(())
        }
        async fn list(&self, _path: &str, _depth: u32) -> CoreResult<Vec<Resource>> {
            Ok(Vec::new())
        }
        async fn get_content(&self, _res: &Resource) -> CoreResult<Vec<u8>> {
            let permit = self.gate.acquire().await.expect("gate closed");
            permit.forget();
            Ok(self.payload.clone())
        }
        async fn download(&self, _res: &Resource, _cb: ProgressFn) -> CoreResult<std::path::PathBuf> {
            unreachable!()
        }
        async fn upload(&self, _parent: &Resource, _local: &Path) -> CoreResult<String> {
            unreachable!()
        }
        async fn delete(&self, _res: &Resource) -> CoreResult<()> {
            unreachable!()
        }
        async fn move_to(&self, _src: &Resource, _dest: &Resource) -> CoreResult<()> {
            unreachable!()
        }
        async fn create_directory(&self, _parent: &Resource, _name: &str) -> CoreResult<String> {
            unreachable!()
        }
        async fn search(&self, _parent: &Resource, _query: &str) -> CoreResult<Vec<Resource>> {
            unreachable!()
        }
        async fn disconnect(&self) -> CoreResult<()> {
            Ok(())
        }
        fn host(&self) -> &Host {
            &self.host
        }
    }

    #[tokio::test]
    async fn cancelled_batch_keeps_only_committed_results() {
        let tmp = TempDir::new().unwrap();
        let gate = Arc::new(Semaphore::new(0));
        let repo: Arc<dyn ResourceRepository> = Arc::new(GatedRepo {
            host: remote_host(),
            gate: gate.clone(),
            payload: png_bytes(),
        });
        let cache = Arc::new(ThumbnailCache::new(tmp.path()));
        let items = vec![
            png_resource("/files/one.png"),
            png_resource("/files/two.png"),
            png_resource("/files/three.png"),
        ];

        let mut handle = spawn_thumbnail_batch(repo, cache, items, 16);

        // Let the first item through, wait for it to be committed.
        gate.add_permits(1);
        loop {
            match handle.updates().recv().await.unwrap() {
                TaskUpdate::Progress(p) if p > 0.0 => break,
                update => assert!(!update.is_terminal(), "batch ended early: {update:?}"),
            }
        }

        // Cancel while item two is blocked in fetch, then unblock everything.
        handle.cancel();
        gate.add_permits(2);

        let thumbs = handle.join().await.unwrap();
        // Item two may have been in flight at cancel time and is allowed to
        // commit; item three must never start.
        assert!(thumbs.len() < 3);
        assert!(!thumbs.contains_key("/files/three.png"));
        assert!(thumbs.contains_key("/files/one.png"));
    }

    #[tokio::test]
    async fn loader_restart_supersedes_previous_batch() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.png"), png_bytes()).unwrap();
        let host = Host::local_root(tmp.path().to_string_lossy().into_owned());
        let repo: Arc<dyn ResourceRepository> = Arc::new(LocalRepository::new(host));
        let cache = Arc::new(ThumbnailCache::new(tmp.path().join("thumbs")));
        let items = repo
            .list_files(&tmp.path().to_string_lossy())
            .await
            .unwrap();

        let mut loader = ThumbnailLoader::new(cache, 16);
        loader.restart(repo.clone(), items.clone()).await;
        loader.restart(repo, items).await;

        let thumbs = loader.take().unwrap().join().await.unwrap();
        assert_eq!(thumbs.len(), 1);
        assert!(loader.take().is_none());
    }
}
