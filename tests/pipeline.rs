//! End-to-end run of the build and serve paths with the real encoder.
//!
//! Builds a small site on disk with generated images, then drives the
//! plugin hooks the way the CLI does.

use image::{ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use webp_picture::chain::{Chain, RequestInfo};
use webp_picture::config::{Command, PluginConfig};
use webp_picture::imaging::builtin_provider;
use webp_picture::plugin::{BundleAsset, ResolvedConfig, WebpPicturePlugin};
use webp_picture::serve::StaticFiles;

const PAGE: &str = r#"<!doctype html>
<html>
<body>
  <img src="img/photo.jpg" alt="Photo">
  <picture>
    <source media="(min-width: 800px)" srcset="img/logo.png 1x">
    <img src="img/logo.png">
  </picture>
  <img src="https://cdn.example.com/remote.jpg">
  <img src="icon.svg">
</body>
</html>
"#;

fn write_jpeg(path: &Path) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let img = RgbImage::from_fn(40, 30, |x, y| Rgb([(x * 6) as u8, (y * 8) as u8, 128]));
    img.save_with_format(path, ImageFormat::Jpeg).unwrap();
}

fn write_png(path: &Path) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let img = RgbaImage::from_fn(16, 16, |x, y| {
        if x < 4 && y < 4 {
            Rgba([0, 0, 0, 0])
        } else {
            Rgba([200, 40, 40, 255])
        }
    });
    img.save_with_format(path, ImageFormat::Png).unwrap();
}

fn is_webp(bytes: &[u8]) -> bool {
    bytes.len() > 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP"
}

fn plugin(root: &Path, command: Command) -> WebpPicturePlugin {
    let mut plugin = WebpPicturePlugin::new(PluginConfig::default(), Arc::new(builtin_provider()));
    plugin.config_resolved(ResolvedConfig {
        command,
        root: root.to_path_buf(),
        out_dir: "dist".into(),
    });
    plugin
}

#[test]
fn build_rewrites_html_and_converts_images() {
    let tmp = TempDir::new().unwrap();
    let dist = tmp.path().join("dist");
    write_jpeg(&dist.join("img/photo.jpg"));
    write_png(&dist.join("img/logo.png"));
    std::fs::write(dist.join("notes.txt"), "not an image").unwrap();

    let plugin = plugin(tmp.path(), Command::Build);

    let mut assets = vec![BundleAsset {
        file_name: "index.html".into(),
        source: PAGE.into(),
    }];
    assert_eq!(plugin.generate_bundle(&mut assets), 1);
    let html = &assets[0].source;
    assert!(html.contains(
        r#"<picture><source srcset="img/photo.webp" type="image/webp"/><img src="img/photo.jpg" alt="Photo"></picture>"#
    ));
    assert!(html.contains(
        r#"<source srcset="img/logo.webp 1x" type="image/webp" media="(min-width: 800px)"/>"#
    ));
    assert!(html.contains(r#"<source srcset="img/logo.webp" type="image/webp"/><img src="img/logo.png">"#));
    assert!(!html.contains("remote.webp"));
    assert!(!html.contains("icon.webp"));

    let mut again = assets.clone();
    assert_eq!(plugin.generate_bundle(&mut again), 0);

    let first = plugin.write_bundle(None).unwrap();
    assert_eq!(first.jobs, 2);
    assert_eq!(first.stats.encoded, 2);
    assert_eq!(first.stats.failed, 0);
    assert!(first.store_written);
    assert!(is_webp(&std::fs::read(dist.join("img/photo.webp")).unwrap()));
    assert!(is_webp(&std::fs::read(dist.join("img/logo.webp")).unwrap()));

    let store = std::fs::read_to_string(tmp.path().join(".cache/webp-picture.json")).unwrap();
    let json: serde_json::Value = serde_json::from_str(&store).unwrap();
    assert_eq!(json["files"].as_object().unwrap().len(), 2);

    let second = plugin.write_bundle(None).unwrap();
    assert_eq!(second.stats.up_to_date, 2);
    assert_eq!(second.stats.encoded, 0);
    assert!(!second.store_written);
}

#[test]
fn corrupt_image_does_not_stop_the_batch() {
    let tmp = TempDir::new().unwrap();
    let dist = tmp.path().join("dist");
    write_png(&dist.join("good.png"));
    std::fs::write(dist.join("broken.jpg"), b"definitely not a jpeg").unwrap();

    let report = plugin(tmp.path(), Command::Build).write_bundle(None).unwrap();
    assert_eq!(report.stats.encoded, 1);
    assert_eq!(report.stats.failed, 1);
    assert!(dist.join("good.webp").exists());
    assert!(!dist.join("broken.webp").exists());
}

#[test]
fn dev_server_chain_serves_previews_and_rewritten_pages() {
    let tmp = TempDir::new().unwrap();
    write_jpeg(&tmp.path().join("img/photo.jpg"));
    write_png(&tmp.path().join("public/favicon.png"));
    std::fs::write(tmp.path().join("index.html"), PAGE).unwrap();

    let plugin = plugin(tmp.path(), Command::Serve);
    let chain = Chain::new()
        .with(plugin.middleware().unwrap())
        .with(StaticFiles::new(tmp.path(), plugin.rewrite_options()));

    let preview = chain.dispatch(&RequestInfo::get("/img/photo.webp"));
    assert_eq!(preview.status, 200);
    assert_eq!(preview.content_type, "image/webp");
    assert_eq!(preview.cache_control, Some("no-store"));
    assert!(is_webp(&preview.body));
    assert!(!tmp.path().join("img/photo.webp").exists());

    let public = chain.dispatch(&RequestInfo::get("/favicon.webp"));
    assert_eq!(public.status, 200);

    let page = chain.dispatch(&RequestInfo::get("/"));
    assert_eq!(page.status, 200);
    let body = String::from_utf8(page.body).unwrap();
    assert!(body.contains(r#"<source srcset="img/photo.webp" type="image/webp"/>"#));

    let original = chain.dispatch(&RequestInfo::get("/img/photo.jpg"));
    assert_eq!(original.content_type, "image/jpeg");

    assert_eq!(chain.dispatch(&RequestInfo::get("/missing.webp")).status, 404);
}
