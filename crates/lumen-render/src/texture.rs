//! Image decoding and per-mesh texture selection.

use std::path::Path;

use lumen_gpu::{GpuContext, SampledResource};

use crate::error::RenderError;

/// Decoded RGBA8 image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    /// File name without extension; used to match meshes to textures.
    pub name: String,
    pub width: u32,
    pub height: u32,
    /// Tightly packed RGBA8 rows.
    pub pixels: Vec<u8>,
}

impl DecodedImage {
    /// Open and decode `path`, converting to RGBA8.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RenderError> {
        let path = path.as_ref();
        let decoded = image::open(path)
            .map_err(|source| RenderError::ImageDecode {
                path: path.to_path_buf(),
                source,
            })?
            .into_rgba8();

        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Self {
            name,
            width: decoded.width(),
            height: decoded.height(),
            pixels: decoded.into_raw(),
        })
    }

    /// Single-color image, for placeholders and tests.
    pub fn solid(name: impl Into<String>, width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let pixel_count = width as usize * height as usize;
        Self {
            name: name.into(),
            width,
            height,
            pixels: rgba.repeat(pixel_count),
        }
    }

    /// Upload into a shared (not per-frame) sampled texture.
    pub fn upload(&self, gpu: &GpuContext, frame_count: usize) -> Result<SampledResource, RenderError> {
        let resource = SampledResource::with_pixels(
            gpu,
            self.width,
            self.height,
            &self.pixels,
            frame_count,
            &self.name,
        )?;
        Ok(resource)
    }
}

/// Outcome of matching a mesh to its texture.
#[derive(Debug, PartialEq, Eq)]
pub enum TextureChoice<'a, T> {
    /// A candidate named like the mesh.
    Matched(&'a T),
    /// No candidate matched; the fallback is used.
    Fallback(&'a T),
}

impl<T> Clone for TextureChoice<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for TextureChoice<'_, T> {}

impl<'a, T> TextureChoice<'a, T> {
    pub const fn texture(self) -> &'a T {
        match self {
            Self::Matched(texture) | Self::Fallback(texture) => texture,
        }
    }

    pub const fn is_fallback(self) -> bool {
        matches!(self, Self::Fallback(_))
    }
}

/// Pick the candidate whose name equals `mesh_name`, or `fallback`.
pub fn select_texture<'a, T>(
    mesh_name: &str,
    candidates: &'a [T],
    name_of: impl Fn(&T) -> &str,
    fallback: &'a T,
) -> TextureChoice<'a, T> {
    candidates
        .iter()
        .find(|candidate| name_of(candidate) == mesh_name)
        .map_or(TextureChoice::Fallback(fallback), TextureChoice::Matched)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates() -> Vec<DecodedImage> {
        ["shenti", "tou", "toufa", "yifu"]
            .into_iter()
            .map(|name| DecodedImage::solid(name, 1, 1, [255; 4]))
            .collect()
    }

    #[test]
    fn matching_name_is_selected() {
        let candidates = candidates();
        let fallback = DecodedImage::solid("pingmian", 1, 1, [0; 4]);
        let choice = select_texture("toufa", &candidates, |c| c.name.as_str(), &fallback);
        assert!(!choice.is_fallback());
        assert_eq!(choice.texture().name, "toufa");
    }

    #[test]
    fn unknown_mesh_uses_fallback() {
        let candidates = candidates();
        let fallback = DecodedImage::solid("pingmian", 1, 1, [0; 4]);
        let choice = select_texture("eyes", &candidates, |c| c.name.as_str(), &fallback);
        assert!(choice.is_fallback());
        assert_eq!(choice.texture().name, "pingmian");
    }

    #[test]
    fn name_match_is_exact() {
        let candidates = candidates();
        let fallback = DecodedImage::solid("pingmian", 1, 1, [0; 4]);
        assert!(select_texture("to", &candidates, |c| c.name.as_str(), &fallback).is_fallback());
    }

    #[test]
    fn solid_image_is_tightly_packed() {
        let image = DecodedImage::solid("red", 3, 2, [255, 0, 0, 255]);
        assert_eq!(image.pixels.len(), 3 * 2 * 4);
        assert!(image.pixels.chunks(4).all(|p| p == [255, 0, 0, 255]));
    }

    #[test]
    fn open_reports_missing_file() {
        let err = DecodedImage::open("does/not/exist.png").unwrap_err();
        assert!(matches!(err, RenderError::ImageDecode { .. }));
    }

    #[test]
    fn open_decodes_png_and_derives_name() {
        let dir = std::env::temp_dir().join("lumen-render-texture-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("checker.png");
        let img = image::RgbaImage::from_fn(4, 2, |x, _| {
            if x % 2 == 0 {
                image::Rgba([255, 255, 255, 255])
            } else {
                image::Rgba([0, 0, 0, 255])
            }
        });
        img.save(&path).unwrap();

        let decoded = DecodedImage::open(&path).unwrap();
        assert_eq!(decoded.name, "checker");
        assert_eq!((decoded.width, decoded.height), (4, 2));
        assert_eq!(&decoded.pixels[..8], &[255, 255, 255, 255, 0, 0, 0, 255]);
    }
}
