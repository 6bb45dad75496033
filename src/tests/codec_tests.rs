#[cfg(test)]
mod tests {
    use crate::codec::heic::{Converter, ConverterChain};
    use crate::codec::raster::{self, Orientation};
    use crate::codec::{run_tool, CodecError, ExternalCodec, ThumbOutcome, ThumbnailGenerator, Thumbnailer};
    use crate::tests::support::{Fixture, MockGenerator};
    use crate::types::{MediaFile, MediaKind};
    use async_trait::async_trait;
    use image::{DynamicImage, GenericImageView, RgbImage};
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    fn media_file(fx: &Fixture, rel: &str) -> MediaFile {
        let file_path = fx.touch(rel);
        let kind = MediaKind::from_path(&file_path).unwrap();
        MediaFile { file_path, source_root: fx.media_root(), kind }
    }

    fn thumbnailer(fx: &Fixture, generator: Arc<MockGenerator>) -> Thumbnailer {
        Thumbnailer::new(fx.thumb_dir(), generator, "bildwald-test-no-such-ffprobe".into(), 16)
    }

    fn leftovers(fx: &Fixture) -> Vec<String> {
        std::fs::read_dir(fx.thumb_dir())
            .unwrap()
            .filter_map(Result::ok)
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect()
    }

    #[tokio::test]
    async fn ensure_thumbnail_is_idempotent() {
        let fx = Fixture::new();
        let generator = Arc::new(MockGenerator::default());
        let t = thumbnailer(&fx, generator.clone());
        let file = media_file(&fx, "a.jpg");

        assert_eq!(t.ensure_thumbnail(&file).await.unwrap(), ThumbOutcome::Generated);
        assert_eq!(t.ensure_thumbnail(&file).await.unwrap(), ThumbOutcome::Existing);

        assert_eq!(generator.call_count(), 1);
        assert!(t.thumbnail_exists(&file.file_id()));
        assert_eq!(t.thumbnail_path(&file.file_id()), fx.thumb_dir().join(format!("{}.thumb.jpg", file.file_id())));
    }

    #[tokio::test]
    async fn failed_generation_leaves_no_artifact() {
        let fx = Fixture::new();
        let generator = Arc::new(MockGenerator::failing(&["broken.jpg"]));
        let t = thumbnailer(&fx, generator.clone());
        let file = media_file(&fx, "broken.jpg");

        let err = t.ensure_thumbnail(&file).await.unwrap_err();
        assert!(matches!(err, CodecError::ToolFailed { .. }));
        assert!(!t.thumbnail_exists(&file.file_id()));
        assert!(leftovers(&fx).is_empty(), "partial output must be removed: {:?}", leftovers(&fx));

        // retried on the next attempt since only existence gates generation
        let _ = t.ensure_thumbnail(&file).await;
        assert_eq!(generator.call_count(), 2);
    }

    #[tokio::test]
    async fn duration_is_only_probed_for_thumbnailed_videos() {
        let fx = Fixture::new();
        let t = thumbnailer(&fx, Arc::new(MockGenerator::default()));
        let image = media_file(&fx, "a.jpg");
        let video = media_file(&fx, "b.mp4");

        assert_eq!(t.video_duration(&image).await, None);
        assert_eq!(t.video_duration(&video).await, None);

        t.ensure_thumbnail(&video).await.unwrap();
        // probe tool is missing: failure yields None, never an error
        assert_eq!(t.video_duration(&video).await, None);
    }

    #[tokio::test]
    async fn run_tool_reports_missing_binaries() {
        let err = run_tool("bildwald-test-no-such-tool", ["--version"]).await.unwrap_err();
        assert!(matches!(err, CodecError::ToolMissing { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn run_tool_reports_nonzero_exit() {
        let err = run_tool("sh", ["-c", "echo first >&2; echo boom >&2; exit 3"]).await.unwrap_err();
        match err {
            CodecError::ToolFailed { stderr, .. } => assert_eq!(stderr, "boom"),
            other => panic!("unexpected error: {other}"),
        }
    }

    struct ScriptedConverter {
        name: &'static str,
        succeed: bool,
        baked: bool,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl Converter for ScriptedConverter {
        fn name(&self) -> &str {
            self.name
        }

        fn orientation_baked(&self) -> bool {
            self.baked
        }

        async fn try_convert(&self, _source: &Path, dest: &Path) -> Result<(), CodecError> {
            self.log.lock().unwrap().push(self.name);
            if self.succeed {
                std::fs::write(dest, b"jpeg").unwrap();
                Ok(())
            } else {
                std::fs::write(dest, b"half").unwrap();
                Err(CodecError::ToolMissing { tool: self.name.to_string() })
            }
        }
    }

    fn scripted(plan: &[(&'static str, bool)], log: &Arc<Mutex<Vec<&'static str>>>) -> ConverterChain {
        ConverterChain::new(
            plan.iter()
                .map(|&(name, succeed)| -> Box<dyn Converter> {
                    Box::new(ScriptedConverter { name, succeed, baked: name != "sips", log: log.clone() })
                })
                .collect(),
        )
    }

    #[tokio::test]
    async fn converter_chain_stops_at_first_success() {
        let fx = Fixture::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = scripted(&[("heif-convert", false), ("ffmpeg", true), ("sips", true)], &log);
        let dest = fx.dir.path().join("out.jpg");

        let used = chain.convert(Path::new("x.heic"), &dest).await.unwrap();
        assert_eq!(used.name(), "ffmpeg");
        assert!(used.orientation_baked());
        assert_eq!(*log.lock().unwrap(), vec!["heif-convert", "ffmpeg"]);
    }

    #[tokio::test]
    async fn converter_chain_exhaustion_is_a_hard_failure() {
        let fx = Fixture::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = scripted(&[("heif-convert", false), ("ffmpeg", false), ("sips", false)], &log);
        let dest = fx.dir.path().join("out.jpg");

        match chain.convert(Path::new("x.heic"), &dest).await {
            Err(CodecError::ConvertersExhausted { attempts, .. }) => assert_eq!(attempts.len(), 3),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(used) => panic!("{} should have failed", used.name()),
        }
        assert_eq!(*log.lock().unwrap(), vec!["heif-convert", "ffmpeg", "sips"]);
        assert!(!dest.exists(), "failed stages must not leave output behind");
    }

    #[test]
    fn converter_chain_follows_configured_order() {
        let fx = Fixture::new();
        let mut cfg = fx.config();
        assert_eq!(ConverterChain::from_config(&cfg).names(), vec!["heif-convert", "ffmpeg", "sips"]);

        cfg.thumbnails.heic_converters = vec!["ffmpeg".into(), "heif-convert".into()];
        assert_eq!(ConverterChain::from_config(&cfg).names(), vec!["ffmpeg", "heif-convert"]);
    }

    #[test]
    fn cover_square_crops_instead_of_letterboxing() {
        let wide = DynamicImage::ImageRgb8(RgbImage::new(400, 200));
        assert_eq!(raster::cover_square(&wide, 300).dimensions(), (300, 300));

        let tall = DynamicImage::ImageRgb8(RgbImage::new(90, 500));
        assert_eq!(raster::cover_square(&tall, 300).dimensions(), (300, 300));
    }

    #[test]
    fn orientation_rotates_before_crop() {
        let wide = DynamicImage::ImageRgb8(RgbImage::new(40, 20));
        assert_eq!(Orientation::Rotate90Cw.apply(wide.clone()).dimensions(), (20, 40));
        assert_eq!(Orientation::Rotate180.apply(wide.clone()).dimensions(), (40, 20));
        assert_eq!(Orientation::Normal.apply(wide).dimensions(), (40, 20));
        assert_eq!(Orientation::from(6), Orientation::Rotate90Cw);
        assert_eq!(Orientation::from(0), Orientation::Normal);
    }

    #[test]
    fn render_square_jpeg_writes_a_square_jpeg() {
        let fx = Fixture::new();
        let src = fx.dir.path().join("wide.png");
        let mut img = RgbImage::new(400, 200);
        for (x, _, px) in img.enumerate_pixels_mut() {
            *px = image::Rgb([(x % 255) as u8, 40, 200]);
        }
        img.save(&src).unwrap();
        assert_eq!(Orientation::from_path(&src), None);

        let dest = fx.dir.path().join("out.jpg");
        raster::render_square_jpeg(&src, &dest, 300, 82, Orientation::Normal).unwrap();

        let out = image::open(&dest).unwrap();
        assert_eq!(out.dimensions(), (300, 300));
        assert_eq!(image::guess_format(&std::fs::read(&dest).unwrap()).unwrap(), image::ImageFormat::Jpeg);
    }

    #[test]
    fn render_rejects_undecodable_input() {
        let fx = Fixture::new();
        let src = fx.touch("garbage.jpg");
        let dest = fx.dir.path().join("out.jpg");
        let err = raster::render_square_jpeg(&src, &dest, 300, 82, Orientation::Normal).unwrap_err();
        assert!(matches!(err, CodecError::Image(_)));
    }

    #[tokio::test]
    async fn external_codec_renders_plain_images() {
        let fx = Fixture::new();
        let src = fx.media_root().join("photo.png");
        RgbImage::new(120, 80).save(&src).unwrap();
        let codec = ExternalCodec::from_config(&fx.config());
        let dest = fx.thumb_dir().join("x.jpg");

        codec.generate(&src, &dest, MediaKind::Image).await.unwrap();
        assert_eq!(image::open(&dest).unwrap().dimensions(), (300, 300));
    }
}
