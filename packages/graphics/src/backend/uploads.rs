//! Backend-side copies of textures, keyed by buffer.

use crate::texture::{
    Texture,
    WeakTexture,
};
use std::collections::HashMap;


struct Upload<T> {
    source: WeakTexture,
    generation: u64,
    resource: T,
}

/// Resources a backend made from texture buffers, such as GPU textures.
///
/// Entries don't keep their buffer alive. Once every `Texture` sharing a
/// buffer is dropped, `sweep` hands its resource back for destruction.
pub struct Uploads<T> {
    uploads: HashMap<u64, Upload<T>>,
}

impl<T> Uploads<T> {
    pub fn new() -> Self {
        Uploads {
            uploads: HashMap::new(),
        }
    }

    /// Whether the resource for this texture's buffer exists and was made
    /// from its current pixels. `any_generation` accepts stale pixels, for
    /// buffers the backend draws into itself.
    pub fn is_current(&self, texture: &Texture, any_generation: bool) -> bool {
        self.uploads
            .get(&texture.id())
            .map(|u| any_generation || u.generation == texture.generation())
            .unwrap_or(false)
    }

    pub fn get(&self, texture: &Texture) -> Option<&T> {
        self.uploads.get(&texture.id()).map(|u| &u.resource)
    }

    pub fn get_mut(&mut self, texture: &Texture) -> Option<&mut T> {
        self.uploads.get_mut(&texture.id()).map(|u| &mut u.resource)
    }

    /// Store the resource for this texture's buffer at its current
    /// generation, returning the one it replaces.
    pub fn insert(&mut self, texture: &Texture, resource: T) -> Option<T> {
        self.uploads
            .insert(texture.id(), Upload {
                source: texture.downgrade(),
                generation: texture.generation(),
                resource,
            })
            .map(|old| old.resource)
    }

    /// Remove and return the resources whose buffers are gone.
    pub fn sweep(&mut self) -> Vec<T> {
        let dead = self.uploads
            .iter()
            .filter(|(_, u)| !u.source.is_alive())
            .map(|(&id, _)| id)
            .collect::<Vec<_>>();
        dead.into_iter()
            .filter_map(|id| self.uploads.remove(&id))
            .map(|u| u.resource)
            .collect()
    }

    /// Remove and return everything.
    pub fn drain(&mut self) -> Vec<T> {
        self.uploads.drain().map(|(_, u)| u.resource).collect()
    }

    pub fn len(&self) -> usize {
        self.uploads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.uploads.is_empty()
    }
}

impl<T> Default for Uploads<T> {
    fn default() -> Self {
        Self::new()
    }
}


#[test]
fn test_sweep_frees_dropped_textures() {
    let kept = Texture::from_image(image::RgbaImage::new(2, 2));
    let dropped = Texture::from_image(image::RgbaImage::new(2, 2));
    let mut uploads = Uploads::new();
    assert_eq!(uploads.insert(&kept, "kept"), None);
    assert_eq!(uploads.insert(&dropped, "dropped"), None);
    assert!(uploads.sweep().is_empty());

    drop(dropped);
    assert_eq!(uploads.sweep(), vec!["dropped"]);
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads.get(&kept), Some(&"kept"));
    assert!(uploads.sweep().is_empty());
}

#[test]
fn test_sub_textures_keep_upload_alive() {
    let tex = Texture::from_image(image::RgbaImage::new(4, 4));
    let sub = tex.sub_texture(crate::rect::Rect::new(0, 0, 2, 2));
    let mut uploads = Uploads::new();
    uploads.insert(&tex, 1);
    drop(tex);
    assert!(uploads.sweep().is_empty());
    assert!(uploads.is_current(&sub, false));
    drop(sub);
    assert_eq!(uploads.sweep(), vec![1]);
    assert!(uploads.is_empty());
}

#[test]
fn test_generation_staleness() {
    let tex = Texture::new_target([2, 2]);
    let mut uploads = Uploads::new();
    assert!(!uploads.is_current(&tex, true));
    uploads.insert(&tex, 0);
    assert!(uploads.is_current(&tex, false));
    tex.write_pixels(|p| p.put_pixel(0, 0, image::Rgba([1, 1, 1, 1])));
    assert!(!uploads.is_current(&tex, false));
    assert!(uploads.is_current(&tex, true));
    assert_eq!(uploads.insert(&tex, 1), Some(0));
    *uploads.get_mut(&tex).unwrap() += 1;
    assert_eq!(uploads.drain(), vec![2]);
}
