
#[macro_use]
extern crate tracing;

use client::{
    logging::init_logging,
    settings::{
        Settings,
        SETTINGS_FILE_NAME,
    },
    frontend::open_backend,
    demo::{
        Background,
        Sprite,
    },
};
use graphics::{
    DrawManager,
    Rect,
    Texture,
};
use image_cache::{
    ImageLoader,
    ImageType,
    Locator,
    atlas::build_atlas,
    loader::save_image,
};
use std::{
    cell::RefCell,
    env::args,
    path::Path,
    process::exit,
    rc::Rc,
    time::Instant,
};
use anyhow::{Result, Context};
use vek::*;


const CLI_HELP: &'static str = r#"Draws a tiled background and a bouncing sprite.

Options:

    --headless          Run update and layout only, drawing nothing
    --frames=N          Stop after N frames (default 600)
    --settings=PATH     Settings file (default settings.json)
    --screenshot=PATH   Save the last frame to an image file

Env var examples:
    RUST_LOG=image_cache=trace
    Changes logging levels"#;

const DEFAULT_FRAMES: u64 = 600;
const SPRITE_VELOCITY: Vec2<i32> = Vec2 { x: 3, y: 2 };


fn main() {
    if let Err(e) = init_logging() {
        eprintln!("{:#}", e);
    }
    let args = args().collect::<Vec<_>>();
    if args.get(1).map(String::as_str) == Some("--help") {
        println!("{}", CLI_HELP);
        return;
    }
    if let Err(e) = run(&args) {
        error!("{:#}", e);
        exit(1);
    }
}

fn arg_value<'a>(args: &'a [String], prefix: &str) -> Option<&'a str> {
    args.iter()
        .filter_map(|arg| arg.strip_prefix(prefix))
        .next()
}

fn run(args: &[String]) -> Result<()> {
    let settings_path = arg_value(args, "--settings=").unwrap_or(SETTINGS_FILE_NAME);
    let mut settings = match Settings::try_read(settings_path) {
        Ok(settings) => settings,
        Err(e) => {
            info!(%e, path=%settings_path, "using default settings");
            Settings::default()
        }
    };
    if args.iter().any(|arg| arg == "--headless") {
        settings.draw.headless = true;
    }
    let frames = match arg_value(args, "--frames=") {
        Some(n) => n.parse::<u64>()
            .with_context(|| format!("invalid frame count {:?}", n))?,
        None => DEFAULT_FRAMES,
    };
    let screenshot = arg_value(args, "--screenshot=");

    let (backend, mut events) = open_backend(&settings)?;
    let manager = DrawManager::new(backend, settings.draw.clone());
    let loader = ImageLoader::new(settings.image.clone());
    let [r, g, b] = settings.color_adjustment;
    loader.set_color_adjustment(r, g, b);

    let background = Rc::new(RefCell::new(Background::new(
        loader.get_texture(&Locator::new(&settings.background), ImageType::TodColored),
    )));
    manager.register(&background);
    let sprite = Rc::new(RefCell::new(Sprite::new(
        sprite_frames(&settings, &loader),
        Vec2::zero(),
        SPRITE_VELOCITY,
    )));
    manager.register(&sprite);

    let start = Instant::now();
    let mut frame = 0;
    while frame < frames && !events.quit_requested() {
        manager.sparkle();
        frame += 1;
    }
    info!(%frame, elapsed=?start.elapsed(), stats=?loader.stats(), "stopping");

    if let Some(path) = screenshot {
        let area = Rect::from_size(manager.output_size().map(|n| n as i32));
        let image = manager.with_backend(|backend| backend.read_pixels(area));
        save_image(&image, Path::new(path))?;
        info!(%path, "saved screenshot");
    }
    Ok(())
}

// animation frames from an atlas if configured, else the single sprite image
fn sprite_frames(settings: &Settings, loader: &ImageLoader) -> Vec<Texture> {
    if !settings.animation.is_empty() {
        match build_atlas(&settings.animation, &settings.atlas) {
            Ok(atlas) => {
                let textures = atlas.textures();
                let frames = settings.animation
                    .iter()
                    .filter_map(|path| textures.get(&*path.to_string_lossy()).cloned())
                    .collect::<Vec<_>>();
                if !frames.is_empty() {
                    return frames;
                }
            }
            Err(e) => error!(%e, "unable to build sprite atlas"),
        }
    }
    vec![loader.get_texture(&Locator::new(&settings.sprite), ImageType::Unscaled)]
}
