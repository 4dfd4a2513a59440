//! Decoding a batch of image files on worker threads.
//!
//! Workers only decode; nothing here touches the loader's caches.

use std::{
    path::{Path, PathBuf},
    thread,
};
use crossbeam_channel::unbounded;
use image::RgbaImage;


fn decode(path: &Path) -> Option<RgbaImage> {
    image::open(path)
        .map(|image| image.to_rgba8())
        .map_err(|e| error!(%e, path=%path.display(), "sprite failed to load"))
        .ok()
}

/// Decode every path, in parallel. Results keep the order of `paths`;
/// files that fail to load are logged and left out.
pub fn load_images(paths: &[PathBuf]) -> Vec<(PathBuf, RgbaImage)> {
    if paths.is_empty() {
        return Vec::new();
    }
    let workers = num_cpus::get().min(paths.len()).max(1);

    let (send_job, recv_job) = unbounded::<(usize, PathBuf)>();
    let (send_result, recv_result) = unbounded::<(usize, Option<RgbaImage>)>();
    for job in paths.iter().cloned().enumerate() {
        // can't fail, recv_job is still alive
        let _ = send_job.send(job);
    }
    drop(send_job);

    let handles = (0..workers)
        .map(|_| {
            let recv_job = recv_job.clone();
            let send_result = send_result.clone();
            thread::spawn(move || {
                for (i, path) in recv_job {
                    if send_result.send((i, decode(&path))).is_err() {
                        break;
                    }
                }
            })
        })
        .collect::<Vec<_>>();
    drop(send_result);

    let mut results = vec![None; paths.len()];
    for (i, image) in recv_result {
        results[i] = image;
    }
    for handle in handles {
        if handle.join().is_err() {
            error!("sprite loading thread panicked");
        }
    }
    trace!(workers=%workers, sprites=%paths.len(), "sprites decoded");

    paths.iter()
        .cloned()
        .zip(results)
        .filter_map(|(path, image)| image.map(|image| (path, image)))
        .collect()
}


#[test]
fn test_load_images_keeps_order() {
    let dir = crate::localized::test_dir("spritesheet");
    let mut paths = Vec::new();
    for i in 0..6u8 {
        let path = dir.join(format!("sprite{}.png", i));
        RgbaImage::from_pixel(1 + i as u32, 2, image::Rgba([i, i, i, 255]))
            .save(&path)
            .unwrap();
        paths.push(path);
    }
    paths.insert(3, dir.join("missing.png"));
    std::fs::write(dir.join("garbage.png"), b"not a png").unwrap();
    paths.push(dir.join("garbage.png"));

    let loaded = load_images(&paths);
    assert_eq!(loaded.len(), 6);
    for (i, (path, image)) in loaded.iter().enumerate() {
        assert_eq!(path, &dir.join(format!("sprite{}.png", i)));
        assert_eq!(image.width(), 1 + i as u32);
    }
    assert!(load_images(&[]).is_empty());
}
