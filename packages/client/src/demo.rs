//! The drawables the demo shows: a tiled background and a bouncing,
//! optionally animated sprite.

use graphics::{
    Draw,
    DrawManager,
    Rect,
    Texture,
    TopLevelDrawable,
};
use vek::*;


fn screen_rect(manager: &DrawManager) -> Rect {
    Rect::from_size(manager.output_size().map(|n| n as i32))
}

/// Tiles a texture over the whole screen.
pub struct Background {
    texture: Texture,
    location: Rect,
}

impl Background {
    pub fn new(texture: Texture) -> Self {
        Background {
            texture,
            location: Rect::empty(),
        }
    }
}

impl TopLevelDrawable for Background {
    fn layout(&mut self, manager: &DrawManager) {
        let screen = screen_rect(manager);
        if screen != self.location {
            self.location = screen;
            manager.invalidate_all();
        }
    }

    fn expose(&mut self, draw: &mut Draw, region: Rect) -> bool {
        let mut clipped = draw.reduce_clip(region);
        clipped.tiled(&self.texture, self.location, false, false);
        true
    }

    fn screen_location(&self) -> Rect {
        self.location
    }
}

/// Moves across the screen, bouncing off its edges, cycling through its
/// frames.
pub struct Sprite {
    frames: Vec<Texture>,
    frame: usize,
    location: Rect,
    velocity: Vec2<i32>,
}

impl Sprite {
    pub fn new(frames: Vec<Texture>, pos: Vec2<i32>, velocity: Vec2<i32>) -> Self {
        let size = frames
            .first()
            .map(|frame| frame.draw_size().map(|n| n as i32))
            .unwrap_or(Extent2::zero());
        Sprite {
            frames,
            frame: 0,
            location: Rect::new(pos.x, pos.y, size.w, size.h),
            velocity,
        }
    }

    pub fn frame(&self) -> usize {
        self.frame
    }
}

impl TopLevelDrawable for Sprite {
    fn update(&mut self, manager: &DrawManager) {
        if self.frames.len() > 1 {
            self.frame = (self.frame + 1) % self.frames.len();
            manager.invalidate_region(self.location);
        }
    }

    fn layout(&mut self, manager: &DrawManager) {
        let screen = screen_rect(manager);
        let mut next = self.location.shifted(self.velocity);
        if next.x < screen.x || next.right() > screen.right() {
            self.velocity.x = -self.velocity.x;
        }
        if next.y < screen.y || next.bottom() > screen.bottom() {
            self.velocity.y = -self.velocity.y;
        }
        next = self.location.shifted(self.velocity);
        if next != self.location {
            manager.invalidate_region(self.location);
            manager.invalidate_region(next);
            self.location = next;
        }
    }

    fn expose(&mut self, draw: &mut Draw, region: Rect) -> bool {
        let texture = match self.frames.get(self.frame) {
            Some(texture) => texture,
            None => return false,
        };
        let mut clipped = draw.reduce_clip(region);
        clipped.blit(texture, self.location);
        true
    }

    fn screen_location(&self) -> Rect {
        self.location
    }
}


#[cfg(test)]
use graphics::{
    DrawManagerConfig,
    SoftwareBackend,
};
#[cfg(test)]
use std::{
    cell::RefCell,
    rc::Rc,
};

#[cfg(test)]
fn solid(w: u32, h: u32, rgb: [u8; 3]) -> Texture {
    Texture::from_image(image::RgbaImage::from_pixel(w, h, image::Rgba([rgb[0], rgb[1], rgb[2], 255])))
}

#[cfg(test)]
fn pixel(manager: &DrawManager, x: i32, y: i32) -> [u8; 4] {
    manager
        .with_backend(|backend| backend.read_pixels(Rect::new(x, y, 1, 1)))
        .get_pixel(0, 0)
        .0
}

#[test]
fn test_sprite_moves_over_background() {
    let manager = DrawManager::new(
        Box::new(SoftwareBackend::new([40, 30])),
        DrawManagerConfig::default(),
    );
    let background = Rc::new(RefCell::new(Background::new(solid(8, 8, [0, 100, 0]))));
    let sprite = Rc::new(RefCell::new(Sprite::new(
        vec![solid(4, 4, [200, 0, 0]), solid(4, 4, [0, 0, 200])],
        Vec2::new(0, 0),
        Vec2::new(5, 0),
    )));
    manager.register(&background);
    manager.register(&sprite);

    manager.sparkle();
    assert_eq!(sprite.borrow().screen_location(), Rect::new(5, 0, 4, 4));
    assert_eq!(sprite.borrow().frame(), 1);
    assert_eq!(pixel(&manager, 6, 1), [0, 0, 200, 255]);
    assert_eq!(pixel(&manager, 1, 1), [0, 100, 0, 255]);

    manager.sparkle();
    assert_eq!(pixel(&manager, 6, 1), [0, 100, 0, 255]);
    assert_eq!(pixel(&manager, 11, 1), [200, 0, 0, 255]);
    assert!(manager.pending_regions().is_empty());
}

#[test]
fn test_sprite_bounces() {
    let manager = DrawManager::new(
        Box::new(SoftwareBackend::new([20, 20])),
        DrawManagerConfig {
            headless: true,
            ..Default::default()
        },
    );
    let sprite = Rc::new(RefCell::new(Sprite::new(
        vec![solid(4, 4, [1, 2, 3])],
        Vec2::new(12, 14),
        Vec2::new(3, 3),
    )));
    manager.register(&sprite);
    manager.sparkle();
    assert_eq!(sprite.borrow().screen_location(), Rect::new(15, 11, 4, 4));
    manager.sparkle();
    assert_eq!(sprite.borrow().screen_location(), Rect::new(12, 8, 4, 4));
}
