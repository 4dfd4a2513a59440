
use graphics::DrawManagerConfig;
use image_cache::{
    ImageConfig,
    AtlasConfig,
};
use std::{
    path::{Path, PathBuf},
    fs::File,
    io::{
        BufReader,
        BufWriter,
    },
};
use serde::{Serialize, Deserialize};
use anyhow::Result;


pub const SETTINGS_FILE_NAME: &'static str = "settings.json";


/// Client settings, persisted as JSON. Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub draw: DrawManagerConfig,
    pub image: ImageConfig,
    pub atlas: AtlasConfig,
    pub window_size: [u32; 2],
    /// Time of day color adjustment.
    pub color_adjustment: [i32; 3],
    /// Image tiled over the whole window.
    pub background: String,
    /// Image for the moving sprite, if `animation` is empty.
    pub sprite: String,
    /// Animation frames for the moving sprite, packed into an atlas.
    pub animation: Vec<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            draw: DrawManagerConfig::default(),
            image: ImageConfig::default(),
            atlas: AtlasConfig::default(),
            window_size: [800, 600],
            color_adjustment: [0, 0, 0],
            background: "terrain/grass.png".to_owned(),
            sprite: "units/scout.png~RC(magenta>blue)".to_owned(),
            animation: Vec::new(),
        }
    }
}

impl Settings {
    pub fn read(path: impl AsRef<Path>) -> Self {
        Self::try_read(path).unwrap_or_default()
    }

    pub fn try_read(path: impl AsRef<Path>) -> Result<Self> {
        Ok(serde_json::from_reader(BufReader::new(File::open(path)?))?)
    }

    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        serde_json::to_writer_pretty(BufWriter::new(File::create(path)?), self)?;
        Ok(())
    }
}


#[test]
fn test_settings_round_trip() {
    let dir = std::env::temp_dir().join(format!("client-settings-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(SETTINGS_FILE_NAME);

    let mut settings = Settings::default();
    settings.draw.max_fps = Some(30);
    settings.image.language = Some("de".to_owned());
    settings.atlas.max_dimension = 1024;
    settings.write(&path).unwrap();
    assert_eq!(Settings::try_read(&path).unwrap(), settings);

    std::fs::write(&path, r#"{ "window_size": [320, 200], "draw": { "headless": true } }"#).unwrap();
    let partial = Settings::read(&path);
    assert_eq!(partial.window_size, [320, 200]);
    assert!(partial.draw.headless);
    assert_eq!(partial.draw.fallback_refresh_rate, 60);

    assert!(Settings::try_read(dir.join("nope.json")).is_err());
    assert_eq!(Settings::read(dir.join("nope.json")), Settings::default());
}
