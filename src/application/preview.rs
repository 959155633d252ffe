//! Single-frame preview: the first frame of the grid, published to the
//! media store so the edit surface can show it inline.

use std::sync::Arc;

use tracing::info;

use crate::application::context::UserContext;
use crate::application::media::{MediaError, MediaFolder, MediaStore};
use crate::application::render::{FramePlan, FrameRenderer, RenderError, encode_frame, plan_frames};
use crate::application::repos::{ImagesRepo, ItemSetsRepo, RepoError};
use crate::domain::types::ExportFormat;

#[derive(Debug, thiserror::Error)]
pub enum PreviewError {
    #[error("no background image is uploaded for this user")]
    MissingImage,
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Media(#[from] MediaError),
    #[error(transparent)]
    Render(#[from] RenderError),
}

pub struct PreviewService {
    item_sets: Arc<dyn ItemSetsRepo>,
    images: Arc<dyn ImagesRepo>,
    media: Arc<dyn MediaStore>,
    renderer: Arc<dyn FrameRenderer>,
}

impl PreviewService {
    pub fn new(
        item_sets: Arc<dyn ItemSetsRepo>,
        images: Arc<dyn ImagesRepo>,
        media: Arc<dyn MediaStore>,
        renderer: Arc<dyn FrameRenderer>,
    ) -> Self {
        Self {
            item_sets,
            images,
            media,
            renderer,
        }
    }

    /// Composite frame 0, upload it to the preview folder, and remember its
    /// URL on the image record. Any previous preview asset for the user is
    /// deleted first so exactly one preview exists per user.
    pub async fn refresh(&self, cx: &UserContext) -> Result<String, PreviewError> {
        let code = cx.user_code();
        let image = self
            .images
            .find_for_user(code)
            .await?
            .ok_or(PreviewError::MissingImage)?;
        let item_sets = self.item_sets.list_for_user(code).await?;

        // A user with no items still gets a preview: the bare background.
        let plan = plan_frames(&item_sets)
            .into_iter()
            .next()
            .unwrap_or(FramePlan {
                index: 0,
                placements: Vec::new(),
            });

        let background = self.media.fetch(&image.image_url).await?;
        let frame = self.renderer.render(&background, &plan)?;

        let format = preview_format(&image.file_name);
        let bytes = encode_frame(&frame, format)?;

        self.media
            .delete_by_tag(MediaFolder::Preview, code.as_str())
            .await?;
        let asset = self
            .media
            .upload(
                MediaFolder::Preview,
                &format!("{code}_preview.{}", format.extension()),
                bytes,
                code.as_str(),
            )
            .await?;
        self.images.set_preview_url(code, &asset.url).await?;

        info!(user_code = %code, url = %asset.url, "preview refreshed");
        Ok(asset.url)
    }
}

/// Previews keep the raster family of the uploaded background; anything
/// unrecognized falls back to PNG.
fn preview_format(file_name: &str) -> ExportFormat {
    let ext = file_name.rsplit('.').next().unwrap_or("");
    match ext.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => ExportFormat::Jpeg,
        _ => ExportFormat::Png,
    }
}

#[cfg(test)]
mod tests {
    use image::{Rgba, RgbaImage};

    use super::*;
    use crate::application::testing::{FakeImages, FakeItemSets, FakeMedia};

    struct StubRenderer;

    impl FrameRenderer for StubRenderer {
        fn render(&self, _background: &[u8], _plan: &FramePlan) -> Result<RgbaImage, RenderError> {
            Ok(RgbaImage::from_pixel(2, 2, Rgba([10, 20, 30, 255])))
        }
    }

    struct Harness {
        service: PreviewService,
        images: Arc<FakeImages>,
        media: Arc<FakeMedia>,
    }

    fn harness(file_name: &str) -> Harness {
        let item_sets = Arc::new(FakeItemSets::new());
        item_sets.seed("b3x9", "Name", vec!["a1".into()]);
        let images = Arc::new(FakeImages::new());
        images.seed("b3x9", file_name, "https://media.test/main/bg");
        let media = Arc::new(FakeMedia::new());
        media.seed("https://media.test/main/bg", vec![1, 2, 3]);

        let service = PreviewService::new(
            item_sets,
            Arc::clone(&images) as Arc<dyn ImagesRepo>,
            Arc::clone(&media) as Arc<dyn MediaStore>,
            Arc::new(StubRenderer),
        );
        Harness {
            service,
            images,
            media,
        }
    }

    fn cx() -> UserContext {
        UserContext::new("b3x9".parse().unwrap())
    }

    #[tokio::test]
    async fn refresh_uploads_and_records_the_preview_url() {
        let h = harness("bg.png");
        let url = h.service.refresh(&cx()).await.unwrap();
        assert!(url.ends_with("b3x9_preview.png"));
        assert_eq!(
            h.images.snapshot("b3x9").unwrap().preview_url.as_deref(),
            Some(url.as_str())
        );
    }

    #[tokio::test]
    async fn refresh_replaces_the_previous_preview_asset() {
        let h = harness("bg.png");
        h.service.refresh(&cx()).await.unwrap();
        h.service.refresh(&cx()).await.unwrap();
        assert_eq!(h.media.urls_in(MediaFolder::Preview, "b3x9").len(), 1);
    }

    #[tokio::test]
    async fn jpeg_backgrounds_get_jpeg_previews() {
        let h = harness("photo.JPG");
        let url = h.service.refresh(&cx()).await.unwrap();
        assert!(url.ends_with("b3x9_preview.jpeg"));
    }

    #[tokio::test]
    async fn refresh_requires_an_uploaded_background() {
        let h = harness("bg.png");
        let err = h
            .service
            .refresh(&UserContext::new("zz99".parse().unwrap()))
            .await
            .unwrap_err();
        assert!(matches!(err, PreviewError::MissingImage));
    }

    #[tokio::test]
    async fn no_items_still_previews_the_bare_background() {
        let item_sets = Arc::new(FakeItemSets::new());
        let images = Arc::new(FakeImages::new());
        images.seed("b3x9", "bg.png", "https://media.test/main/bg");
        let media = Arc::new(FakeMedia::new());
        media.seed("https://media.test/main/bg", vec![1]);
        let service = PreviewService::new(item_sets, images, media, Arc::new(StubRenderer));

        assert!(service.refresh(&cx()).await.is_ok());
    }
}
