//! The export pipeline: render every frame, write them to scratch, zip
//! them up, and account for the run.
//!
//! Frame files are staged on disk under a per-run scratch directory that is
//! removed when the run ends, whether it succeeded or failed partway. The
//! archive itself is assembled in memory and handed back as bytes; nothing
//! of a run outlives the returned archive.

use std::io::{Cursor, Write};
use std::path::PathBuf;
use std::sync::Arc;

use metrics::counter;
use tracing::{info, warn};
use zip::CompressionMethod;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::application::context::UserContext;
use crate::application::media::{MediaError, MediaStore};
use crate::application::render::{FrameRenderer, RenderError, encode_frame, plan_frames};
use crate::application::repos::{ImagesRepo, ItemSetsRepo, RepoError};
use crate::domain::types::ExportFormat;

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("no background image is uploaded for this user")]
    MissingImage,
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Media(#[from] MediaError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("scratch file handling failed")]
    Scratch(#[from] std::io::Error),
    #[error("building the archive failed")]
    Archive(#[from] zip::result::ZipError),
}

/// A finished export run.
#[derive(Debug)]
pub struct ExportArchive {
    /// Download name, `{user_code}_output.zip`.
    pub file_name: String,
    pub bytes: Vec<u8>,
    /// How many frames the archive holds.
    pub rendered: usize,
}

pub struct ExportPipeline {
    item_sets: Arc<dyn ItemSetsRepo>,
    images: Arc<dyn ImagesRepo>,
    media: Arc<dyn MediaStore>,
    renderer: Arc<dyn FrameRenderer>,
    scratch_root: PathBuf,
}

impl ExportPipeline {
    pub fn new(
        item_sets: Arc<dyn ItemSetsRepo>,
        images: Arc<dyn ImagesRepo>,
        media: Arc<dyn MediaStore>,
        renderer: Arc<dyn FrameRenderer>,
        scratch_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            item_sets,
            images,
            media,
            renderer,
            scratch_root: scratch_root.into(),
        }
    }

    /// Render the user's full item grid into numbered frames and return
    /// them as a zip archive. The background image must already be
    /// uploaded; that is checked before anything touches disk.
    pub async fn export(
        &self,
        cx: &UserContext,
        format: ExportFormat,
    ) -> Result<ExportArchive, ExportError> {
        let code = cx.user_code();
        let image = self
            .images
            .find_for_user(code)
            .await?
            .ok_or(ExportError::MissingImage)?;
        let item_sets = self.item_sets.list_for_user(code).await?;
        let plans = plan_frames(&item_sets);

        let background = self.media.fetch(&image.image_url).await?;

        // Scratch dir is torn down on drop, so a failure mid-render leaves
        // nothing behind.
        let scratch = tempfile::Builder::new()
            .prefix(&format!("{code}-export-"))
            .tempdir_in(&self.scratch_root)?;

        let mut frame_paths = Vec::with_capacity(plans.len());
        for plan in &plans {
            let frame = self.renderer.render(&background, plan)?;
            let encoded = encode_frame(&frame, format)?;
            let file_name = format!("output_index_{}.{}", plan.index, format.extension());
            let path = scratch.path().join(&file_name);
            std::fs::write(&path, encoded)?;
            frame_paths.push((file_name, path));
        }

        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options =
            SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        for (entry_name, path) in &frame_paths {
            writer.start_file(entry_name.as_str(), options)?;
            writer.write_all(&std::fs::read(path)?)?;
        }
        let bytes = writer.finish()?.into_inner();

        let rendered = frame_paths.len();
        if let Err(err) = self.images.record_export(code, rendered as i32).await {
            // The archive is already built; accounting failure is not worth
            // failing the download over.
            warn!(user_code = %code, error = %err, "export counter update failed");
        }
        counter!("stampino_exports_total").increment(1);
        counter!("stampino_export_frames_total").increment(rendered as u64);
        info!(user_code = %code, %format, rendered, "export archive built");

        Ok(ExportArchive {
            file_name: format!("{code}_output.zip"),
            bytes,
            rendered,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use image::{Rgba, RgbaImage};

    use super::*;
    use crate::application::render::FramePlan;
    use crate::application::testing::{FakeImages, FakeItemSets, FakeMedia};

    /// Renders a solid frame without touching fonts or the background.
    struct StubRenderer {
        fail_at: Option<usize>,
    }

    impl FrameRenderer for StubRenderer {
        fn render(&self, _background: &[u8], plan: &FramePlan) -> Result<RgbaImage, RenderError> {
            if Some(plan.index) == self.fail_at {
                return Err(RenderError::MissingFont(
                    crate::infra::assets::MissingFont {
                        font_name: "stub".to_string(),
                    },
                ));
            }
            Ok(RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 255])))
        }
    }

    struct Harness {
        pipeline: ExportPipeline,
        images: Arc<FakeImages>,
        _scratch_root: tempfile::TempDir,
        scratch_path: PathBuf,
    }

    fn harness(fail_at: Option<usize>) -> Harness {
        let item_sets = Arc::new(FakeItemSets::new());
        item_sets.seed("b3x9", "Name", vec!["a1".into(), "a2".into()]);
        item_sets.seed("b3x9", "City", vec!["b1".into()]);

        let images = Arc::new(FakeImages::new());
        images.seed("b3x9", "bg.png", "https://media.test/main/bg.png");

        let media = Arc::new(FakeMedia::new());
        media.seed("https://media.test/main/bg.png", vec![1, 2, 3]);

        let scratch_root = tempfile::tempdir().expect("scratch root");
        let scratch_path = scratch_root.path().to_path_buf();
        let pipeline = ExportPipeline::new(
            item_sets,
            Arc::clone(&images) as Arc<dyn ImagesRepo>,
            media,
            Arc::new(StubRenderer { fail_at }),
            &scratch_path,
        );
        Harness {
            pipeline,
            images,
            _scratch_root: scratch_root,
            scratch_path,
        }
    }

    fn cx() -> UserContext {
        UserContext::new("b3x9".parse().unwrap())
    }

    fn scratch_entries(path: &PathBuf) -> usize {
        std::fs::read_dir(path).expect("scratch root readable").count()
    }

    #[tokio::test]
    async fn export_zips_one_entry_per_frame() {
        let h = harness(None);
        let archive = h.pipeline.export(&cx(), ExportFormat::Png).await.unwrap();

        assert_eq!(archive.file_name, "b3x9_output.zip");
        assert_eq!(archive.rendered, 2);

        let mut zip = zip::ZipArchive::new(Cursor::new(archive.bytes)).unwrap();
        let names: Vec<String> = (0..zip.len())
            .map(|i| zip.by_index(i).unwrap().name().to_string())
            .collect();
        assert_eq!(names, ["output_index_0.png", "output_index_1.png"]);

        // Entries are real PNG payloads, not placeholders.
        let mut first = Vec::new();
        zip.by_name("output_index_0.png")
            .unwrap()
            .read_to_end(&mut first)
            .unwrap();
        assert_eq!(&first[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[tokio::test]
    async fn export_records_counters() {
        let h = harness(None);
        h.pipeline.export(&cx(), ExportFormat::Jpeg).await.unwrap();
        let record = h.images.snapshot("b3x9").unwrap();
        assert_eq!(record.export_image_count, 2);
        assert_eq!(record.exports, 1);

        h.pipeline.export(&cx(), ExportFormat::Jpeg).await.unwrap();
        assert_eq!(h.images.snapshot("b3x9").unwrap().exports, 2);
    }

    #[tokio::test]
    async fn missing_background_fails_before_any_writes() {
        let h = harness(None);
        let err = h
            .pipeline
            .export(&UserContext::new("zz99".parse().unwrap()), ExportFormat::Png)
            .await
            .unwrap_err();
        assert!(matches!(err, ExportError::MissingImage));
        assert_eq!(scratch_entries(&h.scratch_path), 0);
    }

    #[tokio::test]
    async fn mid_run_failure_cleans_the_scratch_directory() {
        let h = harness(Some(1));
        let err = h.pipeline.export(&cx(), ExportFormat::Png).await.unwrap_err();
        assert!(matches!(err, ExportError::Render(_)));
        // The first frame was written, then the run failed; nothing may
        // remain on disk.
        assert_eq!(scratch_entries(&h.scratch_path), 0);
    }

    #[tokio::test]
    async fn user_with_no_items_gets_an_empty_archive() {
        let item_sets = Arc::new(FakeItemSets::new());
        let images = Arc::new(FakeImages::new());
        images.seed("b3x9", "bg.png", "https://media.test/main/bg.png");
        let media = Arc::new(FakeMedia::new());
        media.seed("https://media.test/main/bg.png", vec![1]);
        let scratch_root = tempfile::tempdir().unwrap();
        let pipeline = ExportPipeline::new(
            item_sets,
            images,
            media,
            Arc::new(StubRenderer { fail_at: None }),
            scratch_root.path(),
        );

        let archive = pipeline.export(&cx(), ExportFormat::Pdf).await.unwrap();
        assert_eq!(archive.rendered, 0);
        let zip = zip::ZipArchive::new(Cursor::new(archive.bytes)).unwrap();
        assert_eq!(zip.len(), 0);
    }
}
