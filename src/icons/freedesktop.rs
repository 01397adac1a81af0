//! Portable icon platform
//!
//! Shortcuts are `.desktop` entries and symbolic links. Icons come from the
//! entry's `Icon=` key, decoded raster or SVG images, or the mime-type icons
//! of the configured theme directories.

use image::{ImageFormat, RgbaImage};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use super::platform::{IconPlatform, PlatformError};
use super::resolver::clamp_icon_size;

/// Sizes tried when the exact size is not installed, best first
const FALLBACK_SIZES: &[u32] = &[256, 128, 96, 64, 48, 32, 24, 16];

/// Index of a decoded bitmap held by the platform
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct SlabHandle(u64);

pub struct FreedesktopPlatform {
    theme_dirs: Vec<PathBuf>,
    slab: Mutex<HashMap<u64, RgbaImage>>,
    next_handle: AtomicU64,
}

impl FreedesktopPlatform {
    pub fn new(theme_dirs: Vec<PathBuf>) -> Self {
        Self {
            theme_dirs,
            slab: Mutex::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
        }
    }

    /// Handles given out and not yet released
    pub fn live_handles(&self) -> usize {
        self.slab.lock().map(|s| s.len()).unwrap_or(0)
    }

    fn register(&self, image: RgbaImage) -> SlabHandle {
        let id = self.next_handle.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut slab) = self.slab.lock() {
            slab.insert(id, image);
        }
        SlabHandle(id)
    }

    /// Decode a raster image, or rasterize an SVG at `size`
    fn decode(&self, path: &Path, size: u32) -> Result<Option<SlabHandle>, PlatformError> {
        if is_svg(path) {
            let data = fs::read(path).map_err(|e| PlatformError::io(path, e))?;
            return rasterize_svg(path, &data, size).map(|image| Some(self.register(image)));
        }
        if ImageFormat::from_path(path).is_err() {
            return Ok(None);
        }
        let image = image::open(path).map_err(|e| PlatformError::decode(path, e))?;
        Ok(Some(self.register(image.to_rgba8())))
    }

    /// Look up `<theme>/<n>x<n>/<context>/<name>.png`, preferring `size`,
    /// then `<theme>/scalable/<context>/<name>.svg`
    fn theme_icon(&self, contexts: &[&str], names: &[String], size: u32) -> Option<PathBuf> {
        let sizes = std::iter::once(size).chain(FALLBACK_SIZES.iter().copied().filter(|s| *s != size));
        for s in sizes {
            for theme in &self.theme_dirs {
                let dir = theme.join(format!("{}x{}", s, s));
                if let Some(found) = find_in(&dir, contexts, names, "png") {
                    return Some(found);
                }
            }
        }

        for theme in &self.theme_dirs {
            if let Some(found) = find_in(&theme.join("scalable"), contexts, names, "svg") {
                return Some(found);
            }
        }

        let pixmaps = Path::new("/usr/share/pixmaps");
        ["png", "svg"]
            .iter()
            .flat_map(|ext| names.iter().map(move |name| pixmaps.join(format!("{}.{}", name, ext))))
            .find(|p| p.is_file())
    }
}

fn find_in(dir: &Path, contexts: &[&str], names: &[String], extension: &str) -> Option<PathBuf> {
    contexts
        .iter()
        .flat_map(|context| names.iter().map(move |name| dir.join(context).join(format!("{}.{}", name, extension))))
        .find(|candidate| candidate.is_file())
}

fn is_svg(path: &Path) -> bool {
    path.extension()
        .map(|e| e.eq_ignore_ascii_case("svg") || e.eq_ignore_ascii_case("svgz"))
        .unwrap_or(false)
}

/// Render an SVG document into a `size`x`size` bitmap, keeping its aspect ratio
fn rasterize_svg(path: &Path, data: &[u8], size: u32) -> Result<RgbaImage, PlatformError> {
    use resvg::{tiny_skia, usvg};

    let size = clamp_icon_size(size);
    let tree = usvg::Tree::from_data(data, &usvg::Options::default()).map_err(|e| PlatformError::decode(path, e))?;
    let mut pixmap =
        tiny_skia::Pixmap::new(size, size).ok_or_else(|| PlatformError::decode(path, "empty render target"))?;

    let view = tree.size();
    let scale = (size as f32 / view.width()).min(size as f32 / view.height());
    if !scale.is_finite() || scale <= 0.0 {
        return Err(PlatformError::decode(path, "SVG has no drawable size"));
    }
    let offset_x = (size as f32 - view.width() * scale) / 2.0;
    let offset_y = (size as f32 - view.height() * scale) / 2.0;
    let transform = tiny_skia::Transform::from_row(scale, 0.0, 0.0, scale, offset_x, offset_y);
    resvg::render(&tree, transform, &mut pixmap.as_mut());

    let mut image = RgbaImage::new(size, size);
    for (pixel, out) in pixmap.pixels().iter().zip(image.pixels_mut()) {
        let color = pixel.demultiply();
        *out = image::Rgba([color.red(), color.green(), color.blue(), color.alpha()]);
    }
    Ok(image)
}

fn is_desktop_entry(path: &Path) -> bool {
    path.extension().map(|e| e.eq_ignore_ascii_case("desktop")).unwrap_or(false)
}

/// First value of `key` in the `[Desktop Entry]` group
fn desktop_entry_value(path: &Path, key: &str) -> Result<Option<String>, PlatformError> {
    let content = fs::read_to_string(path).map_err(|e| PlatformError::io(path, e))?;
    let mut in_entry = false;

    for line in content.lines() {
        let line = line.trim();
        if line.starts_with('[') {
            in_entry = line == "[Desktop Entry]";
            continue;
        }
        if !in_entry || line.starts_with('#') {
            continue;
        }
        if let Some((k, v)) = line.split_once('=') {
            if k.trim() == key {
                let v = v.trim();
                return Ok((!v.is_empty()).then(|| v.to_string()));
            }
        }
    }

    Ok(None)
}

/// Program path from an `Exec=` line, field codes and arguments dropped
fn exec_program(exec: &str) -> Option<PathBuf> {
    let exec = exec.trim();
    let program = if let Some(rest) = exec.strip_prefix('"') {
        rest.split('"').next()?
    } else {
        exec.split_whitespace().next()?
    };

    let program = Path::new(program);
    if program.is_absolute() {
        return Some(program.to_path_buf());
    }

    let search = std::env::var_os("PATH")?;
    std::env::split_paths(&search)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}

impl IconPlatform for FreedesktopPlatform {
    type Handle = SlabHandle;

    fn is_shortcut(&self, path: &Path) -> bool {
        is_desktop_entry(path)
            || fs::symlink_metadata(path)
                .map(|m| m.file_type().is_symlink())
                .unwrap_or(false)
    }

    fn shortcut_icon(&self, path: &Path, size: u32) -> Result<Option<SlabHandle>, PlatformError> {
        if !is_desktop_entry(path) {
            return Ok(None);
        }
        let Some(icon) = desktop_entry_value(path, "Icon")? else {
            return Ok(None);
        };

        let location = Path::new(&icon);
        if location.is_absolute() {
            return self.decode(location, size);
        }
        match self.theme_icon(&["apps"], &[icon.clone()], size) {
            Some(found) => self.decode(&found, size),
            None => Ok(None),
        }
    }

    fn shortcut_target(&self, path: &Path) -> Result<Option<PathBuf>, PlatformError> {
        if is_desktop_entry(path) {
            if let Some(url) = desktop_entry_value(path, "URL")? {
                return Ok(url.strip_prefix("file://").map(PathBuf::from));
            }
            return Ok(desktop_entry_value(path, "Exec")?.as_deref().and_then(exec_program));
        }

        let link = match fs::read_link(path) {
            Ok(link) => link,
            Err(_) => return Ok(None),
        };
        if link.is_absolute() {
            return Ok(Some(link));
        }
        Ok(path.parent().map(|parent| parent.join(link)))
    }

    fn shell_image(&self, path: &Path, size: u32) -> Result<Option<SlabHandle>, PlatformError> {
        if !path.is_file() {
            return Ok(None);
        }
        self.decode(path, size)
    }

    fn file_type_icon(&self, path: &Path, size: u32) -> Result<Option<SlabHandle>, PlatformError> {
        let (contexts, names): (&[&str], Vec<String>) = if path.is_dir() {
            (&["places"][..], vec!["folder".to_string(), "inode-directory".to_string()])
        } else {
            let mime = mime_guess::from_path(path).first_or_octet_stream();
            (
                &["mimetypes"][..],
                vec![
                    mime.essence_str().replace('/', "-"),
                    format!("{}-x-generic", mime.type_()),
                    "application-octet-stream".to_string(),
                    "unknown".to_string(),
                ],
            )
        };

        match self.theme_icon(contexts, &names, size) {
            Some(found) => self.decode(&found, size),
            None => Ok(None),
        }
    }

    fn to_rgba(&self, handle: &SlabHandle) -> Result<RgbaImage, PlatformError> {
        let slab = self.slab.lock().map_err(|_| PlatformError::StaleHandle(handle.0))?;
        slab.get(&handle.0).cloned().ok_or(PlatformError::StaleHandle(handle.0))
    }

    fn release(&self, handle: SlabHandle) {
        if let Ok(mut slab) = self.slab.lock() {
            slab.remove(&handle.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::icons::IconResolver;

    fn write_png(path: &Path, size: u32) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        RgbaImage::from_pixel(size, size, image::Rgba([0, 128, 255, 255]))
            .save(path)
            .unwrap();
    }

    #[test]
    fn test_desktop_entry_parsing() {
        let dir = tempfile::tempdir().unwrap();
        let entry = dir.path().join("editor.desktop");
        fs::write(
            &entry,
            "[Desktop Action new]\nIcon=wrong\n\n[Desktop Entry]\nName=Editor\nIcon=editor\nExec=\"/opt/my editor/bin/ed\" %F\n",
        )
        .unwrap();

        assert_eq!(desktop_entry_value(&entry, "Icon").unwrap().as_deref(), Some("editor"));
        assert_eq!(desktop_entry_value(&entry, "Comment").unwrap(), None);

        let platform = FreedesktopPlatform::new(Vec::new());
        assert!(platform.is_shortcut(&entry));
        assert_eq!(
            platform.shortcut_target(&entry).unwrap(),
            Some(PathBuf::from("/opt/my editor/bin/ed"))
        );
    }

    #[test]
    fn test_shortcut_icon_from_theme() {
        let dir = tempfile::tempdir().unwrap();
        let theme = dir.path().join("hicolor");
        write_png(&theme.join("48x48/apps/editor.png"), 48);

        let entry = dir.path().join("editor.desktop");
        fs::write(&entry, "[Desktop Entry]\nIcon=editor\n").unwrap();

        let resolver = IconResolver::new(FreedesktopPlatform::new(vec![theme]));
        let icon = resolver.resolve(&entry, 32).unwrap();
        assert_eq!(icon.dimensions(), (32, 32));
        assert_eq!(resolver.platform().live_handles(), 0);
    }

    #[test]
    fn test_raster_image_decodes_directly() {
        let dir = tempfile::tempdir().unwrap();
        let photo = dir.path().join("photo.png");
        write_png(&photo, 20);

        let resolver = IconResolver::new(FreedesktopPlatform::new(Vec::new()));
        assert!(resolver.resolve(&photo, 64).is_some());
        assert_eq!(resolver.platform().live_handles(), 0);
    }

    #[test]
    fn test_mime_icon_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let theme = dir.path().join("hicolor");
        write_png(&theme.join("64x64/mimetypes/application-pdf.png"), 64);
        let doc = dir.path().join("taxes.pdf");
        fs::write(&doc, b"%PDF-1.4").unwrap();

        let resolver = IconResolver::new(FreedesktopPlatform::new(vec![theme]));
        assert!(resolver.resolve(&doc, 64).is_some());
    }

    const CIRCLE_SVG: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="16" height="16" viewBox="0 0 16 16"><circle cx="8" cy="8" r="8" fill="#ff0000"/></svg>"##;

    #[test]
    fn test_scalable_theme_icon_is_rasterized() {
        let dir = tempfile::tempdir().unwrap();
        let theme = dir.path().join("hicolor");
        let svg = theme.join("scalable/apps/editor.svg");
        fs::create_dir_all(svg.parent().unwrap()).unwrap();
        fs::write(&svg, CIRCLE_SVG).unwrap();

        let entry = dir.path().join("editor.desktop");
        fs::write(&entry, "[Desktop Entry]\nIcon=editor\n").unwrap();

        let resolver = IconResolver::new(FreedesktopPlatform::new(vec![theme]));
        let icon = resolver.resolve(&entry, 48).unwrap();
        assert_eq!(icon.dimensions(), (48, 48));
        let center = icon.pixels().get_pixel(24, 24);
        assert_eq!(center[0], 255);
        assert_eq!(center[3], 255);
        assert_eq!(resolver.platform().live_handles(), 0);
    }

    #[test]
    fn test_absolute_svg_icon_and_broken_svg() {
        let dir = tempfile::tempdir().unwrap();
        let svg = dir.path().join("logo.svg");
        fs::write(&svg, CIRCLE_SVG).unwrap();
        let platform = FreedesktopPlatform::new(Vec::new());

        let entry = dir.path().join("app.desktop");
        fs::write(&entry, format!("[Desktop Entry]\nIcon={}\n", svg.display())).unwrap();
        let handle = platform.shortcut_icon(&entry, 32).unwrap().unwrap();
        assert_eq!(platform.to_rgba(&handle).unwrap().dimensions(), (32, 32));
        platform.release(handle);

        let broken = dir.path().join("broken.svg");
        fs::write(&broken, "<svg").unwrap();
        assert!(platform.shell_image(&broken, 32).is_err());
        assert_eq!(platform.live_handles(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_resolves_target() {
        let dir = tempfile::tempdir().unwrap();
        let photo = dir.path().join("photo.png");
        write_png(&photo, 16);
        let link = dir.path().join("link-to-photo");
        std::os::unix::fs::symlink("photo.png", &link).unwrap();

        let platform = FreedesktopPlatform::new(Vec::new());
        assert!(platform.is_shortcut(&link));
        assert_eq!(platform.shortcut_target(&link).unwrap(), Some(photo));
    }

    #[test]
    fn test_corrupt_image_is_strategy_failure() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("bad.png");
        fs::write(&bad, b"not a png").unwrap();

        let platform = FreedesktopPlatform::new(Vec::new());
        assert!(platform.shell_image(&bad, 32).is_err());
        assert_eq!(platform.live_handles(), 0);
    }
}
