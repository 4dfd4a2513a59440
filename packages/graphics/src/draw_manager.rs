//! The per-frame scheduler driving top-level drawables.
//!
//! Once per frame, `sparkle` runs every registered drawable through
//! `update`, `layout`, `render` and `expose`, exposing only the screen
//! regions that were invalidated since the last frame, then presents or
//! idles until the next frame boundary.
//!
//! The manager is a context object owned by whoever runs the frame loop. It
//! uses interior mutability so drawables can invalidate regions and request
//! extra passes through the `&DrawManager` they're handed, and it is
//! confined to one thread.

use crate::{
    rect::Rect,
    draw::Draw,
    backend::RenderBackend,
    invalidation::RegionSet,
};
use std::{
    cell::{Cell, RefCell},
    rc::{Rc, Weak},
    thread,
    time::{Duration, Instant},
};
use serde::{Serialize, Deserialize};
use vek::*;


/// Upper bound on the idle wait, whatever the refresh rate claims.
const MAX_FRAME_WAIT: Duration = Duration::from_secs(1);


/// Something window-like that participates in the frame protocol.
///
/// Phases are called in this order, once per frame, on every registered
/// drawable in registration order.
pub trait TopLevelDrawable {
    /// Advance animations and other time-dependent state.
    fn update(&mut self, _manager: &DrawManager) {}

    /// Finalize size and position. Must invalidate whatever visible area
    /// changed, old location and new. Must not draw.
    fn layout(&mut self, _manager: &DrawManager) {}

    /// Maintain off-screen buffers. Must not call `with_backend`.
    fn render(&mut self, _manager: &DrawManager, _draw: &mut Draw) {}

    /// Draw `region`, which lies within `screen_location`. Returns whether
    /// anything was drawn. Must not invalidate.
    fn expose(&mut self, draw: &mut Draw, region: Rect) -> bool;

    fn screen_location(&self) -> Rect;
}

/// Draw manager settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrawManagerConfig {
    /// Skip rendering entirely. Update and layout still run, pending
    /// invalidations are discarded.
    pub headless: bool,
    /// Frame rate limit below the display refresh rate.
    pub max_fps: Option<u32>,
    /// Refresh rate to pace idle frames at when the display doesn't report
    /// a sensible one.
    pub fallback_refresh_rate: u32,
    /// Milliseconds per frame reserved for processing when idling.
    pub processing_allowance: u64,
}

impl Default for DrawManagerConfig {
    fn default() -> Self {
        DrawManagerConfig {
            headless: false,
            max_fps: None,
            fallback_refresh_rate: 60,
            processing_allowance: 1,
        }
    }
}

type Slot = Option<Weak<RefCell<dyn TopLevelDrawable>>>;

fn identity(weak: &Weak<RefCell<dyn TopLevelDrawable>>) -> *const () {
    weak.as_ptr() as *const ()
}

// clears the drawing flag on drop, including while unwinding out of expose
struct DrawingFlag<'a>(&'a Cell<bool>);

impl<'a> DrawingFlag<'a> {
    fn raise(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        DrawingFlag(flag)
    }
}

impl<'a> Drop for DrawingFlag<'a> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

pub struct DrawManager {
    config: DrawManagerConfig,
    backend: RefCell<Box<dyn RenderBackend>>,
    registry: RefCell<Vec<Slot>>,
    regions: RefCell<RegionSet>,
    drawing: Cell<bool>,
    extra_pass_requested: Cell<bool>,
    output_size: Cell<Extent2<u32>>,
    refresh_rate: Cell<Option<u32>>,
    last_sparkle: Cell<Option<Instant>>,
}

impl DrawManager {
    pub fn new(backend: Box<dyn RenderBackend>, config: DrawManagerConfig) -> Self {
        let output_size = backend.output_size();
        let refresh_rate = backend.refresh_rate();
        debug!(?output_size, ?refresh_rate, headless=%config.headless, "creating draw manager");
        DrawManager {
            config,
            backend: RefCell::new(backend),
            registry: RefCell::new(Vec::new()),
            regions: RefCell::new(RegionSet::new()),
            drawing: Cell::new(false),
            extra_pass_requested: Cell::new(false),
            output_size: Cell::new(output_size),
            refresh_rate: Cell::new(refresh_rate),
            last_sparkle: Cell::new(None),
        }
    }

    pub fn config(&self) -> &DrawManagerConfig {
        &self.config
    }

    /// Output size as of the start of the current frame.
    pub fn output_size(&self) -> Extent2<u32> {
        self.output_size.get()
    }

    /// Add a drawable on top of the draw order. Registering an already
    /// registered drawable raises it instead. The manager only holds a weak
    /// reference, so dropping the drawable deregisters it.
    pub fn register<T>(&self, tld: &Rc<RefCell<T>>)
    where
        T: TopLevelDrawable + 'static,
    {
        let tld: Rc<RefCell<dyn TopLevelDrawable>> = tld.clone();
        let weak = Rc::downgrade(&tld);
        if self.null_slot_of(&weak) {
            trace!("registering registered drawable, raising it");
        }
        self.registry.borrow_mut().push(Some(weak));
        self.invalidate_location(&tld);
    }

    /// Move a registered drawable to the top of the draw order.
    pub fn raise<T>(&self, tld: &Rc<RefCell<T>>)
    where
        T: TopLevelDrawable + 'static,
    {
        let tld: Rc<RefCell<dyn TopLevelDrawable>> = tld.clone();
        let weak = Rc::downgrade(&tld);
        if !self.null_slot_of(&weak) {
            warn!("attempted to raise unregistered drawable");
            return;
        }
        self.registry.borrow_mut().push(Some(weak));
        self.invalidate_location(&tld);
    }

    /// Remove a drawable. Removing one that isn't registered does nothing.
    pub fn deregister<T>(&self, tld: &Rc<RefCell<T>>)
    where
        T: TopLevelDrawable + 'static,
    {
        let tld: Rc<RefCell<dyn TopLevelDrawable>> = tld.clone();
        if !self.null_slot_of(&Rc::downgrade(&tld)) {
            debug!("attempted to deregister unregistered drawable");
        }
    }

    // null out the slot holding this drawable, returning whether there was one
    fn null_slot_of(&self, weak: &Weak<RefCell<dyn TopLevelDrawable>>) -> bool {
        let id = identity(weak);
        let mut registry = self.registry.borrow_mut();
        for slot in registry.iter_mut() {
            let found = slot
                .as_ref()
                .map(|other| identity(other) == id && other.strong_count() > 0)
                .unwrap_or(false);
            if found {
                *slot = None;
                return true;
            }
        }
        false
    }

    fn invalidate_location(&self, tld: &Rc<RefCell<dyn TopLevelDrawable>>) {
        // a drawable may register itself from inside one of its own phases
        let location = match tld.try_borrow() {
            Ok(tld) => tld.screen_location(),
            Err(_) => return,
        };
        self.invalidate_region(location);
    }

    // compact away null and dead slots
    fn tidy(&self) {
        let mut registry = self.registry.borrow_mut();
        let before = registry.len();
        registry.retain(|slot| slot
            .as_ref()
            .map(|weak| weak.strong_count() > 0)
            .unwrap_or(false));
        if registry.len() != before {
            trace!(removed=%(before - registry.len()), "tidied drawable registry");
        }
    }

    fn live_drawables(&self) -> Vec<Rc<RefCell<dyn TopLevelDrawable>>> {
        self.registry
            .borrow()
            .iter()
            .filter_map(|slot| slot.as_ref().and_then(Weak::upgrade))
            .collect()
    }

    /// Number of registered drawables still alive.
    pub fn drawable_count(&self) -> usize {
        self.live_drawables().len()
    }

    /// Mark `region` for redraw on the next frame. The region is clipped to
    /// the output area.
    ///
    /// Panics if called while exposing.
    pub fn invalidate_region(&self, region: Rect) {
        if self.drawing.get() {
            error!(%region, "invalidate during draw");
            panic!("invalidate during draw");
        }
        let size = self.output_size.get();
        let region = region.intersect(&Rect::new(0, 0, size.w as i32, size.h as i32));
        self.regions.borrow_mut().invalidate(region);
    }

    /// Mark the whole output area for redraw.
    pub fn invalidate_all(&self) {
        let size = self.output_size.get();
        self.invalidate_region(Rect::new(0, 0, size.w as i32, size.h as i32));
    }

    /// Ask for another render and expose pass after the current one.
    pub fn request_extra_render_pass(&self) {
        self.extra_pass_requested.set(true);
    }

    /// Whether an expose pass is in progress.
    pub fn is_drawing(&self) -> bool {
        self.drawing.get()
    }

    pub fn pending_regions(&self) -> Vec<Rect> {
        self.regions.borrow().rects().to_vec()
    }

    /// Run `f` on the backend, outside of any frame.
    pub fn with_backend<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut dyn RenderBackend) -> R,
    {
        let mut backend = self.backend.borrow_mut();
        let r = f(&mut **backend);
        self.output_size.set(backend.output_size());
        self.refresh_rate.set(backend.refresh_rate());
        r
    }

    /// Target duration of one frame.
    pub fn frame_length(&self) -> Duration {
        let rr = self.refresh_rate
            .get()
            .filter(|&rr| rr > 0 && rr <= 1000)
            .unwrap_or(self.config.fallback_refresh_rate.max(1));
        let mut frame = Duration::from_secs(1) / rr;
        if let Some(max_fps) = self.config.max_fps.filter(|&fps| fps > 0) {
            frame = frame.max(Duration::from_secs(1) / max_fps);
        }
        frame
    }

    /// Process one frame.
    ///
    /// Panics if called from inside an expose.
    pub fn sparkle(&self) {
        if self.drawing.get() {
            error!("recursive draw");
            panic!("recursive draw");
        }

        self.tidy();
        {
            let backend = self.backend.borrow();
            self.output_size.set(backend.output_size());
            self.refresh_rate.set(backend.refresh_rate());
        }

        for tld in self.live_drawables() {
            tld.borrow_mut().update(self);
        }
        for tld in self.live_drawables() {
            tld.borrow_mut().layout(self);
        }

        if self.config.headless {
            self.regions.borrow_mut().clear();
            self.extra_pass_requested.set(false);
            return;
        }

        self.render();
        let mut drawn = self.expose();
        while self.extra_pass_requested.replace(false) {
            trace!("extra render pass");
            self.render();
            drawn |= self.expose();
        }

        if drawn {
            self.backend.borrow_mut().present();
        } else {
            self.wait_for_vsync();
        }
        self.last_sparkle.set(Some(Instant::now()));
    }

    fn render(&self) {
        let drawables = self.live_drawables();
        let mut backend = self.backend.borrow_mut();
        for tld in drawables {
            backend.set_viewport(None);
            backend.set_clip(None);
            let mut draw = Draw::new(&mut **backend);
            tld.borrow_mut().render(self, &mut draw);
        }
    }

    fn expose(&self) -> bool {
        let _drawing = DrawingFlag::raise(&self.drawing);
        let drawables = self.live_drawables();
        let mut backend = self.backend.borrow_mut();
        backend.set_viewport(None);
        let mut drawn = false;
        loop {
            let region = match self.regions.borrow_mut().pop_for_expose() {
                Some(region) => region,
                None => break,
            };
            for tld in &drawables {
                let location = tld.borrow().screen_location();
                let visible = region.intersect(&location);
                if visible.is_empty() {
                    continue;
                }
                backend.set_clip(Some(region));
                let mut draw = Draw::new(&mut **backend);
                drawn |= tld.borrow_mut().expose(&mut draw, visible);
            }
        }
        backend.set_clip(None);
        drawn
    }

    // idle until roughly the next frame boundary
    fn wait_for_vsync(&self) {
        let allowance = Duration::from_millis(self.config.processing_allowance);
        let elapsed = self.last_sparkle
            .get()
            .map(|last| last.elapsed())
            .unwrap_or(Duration::ZERO);
        let wait = self.frame_length()
            .saturating_sub(elapsed)
            .saturating_sub(allowance)
            .min(MAX_FRAME_WAIT);
        if !wait.is_zero() {
            thread::sleep(wait);
        }
    }
}


#[cfg(test)]
use crate::backend::SoftwareBackend;

#[cfg(test)]
struct Probe {
    name: &'static str,
    location: Rect,
    log: Rc<RefCell<Vec<String>>>,
    color: Rgba<u8>,
    invalidate_in_layout: Option<Rect>,
    extra_passes: u32,
}

#[cfg(test)]
impl Probe {
    fn new(name: &'static str, location: Rect, log: &Rc<RefCell<Vec<String>>>) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Probe {
            name,
            location,
            log: Rc::clone(log),
            color: Rgba::new(255, 255, 255, 255),
            invalidate_in_layout: None,
            extra_passes: 0,
        }))
    }

    fn record(&self, what: &str) {
        self.log.borrow_mut().push(format!("{} {}", what, self.name));
    }
}

#[cfg(test)]
impl TopLevelDrawable for Probe {
    fn update(&mut self, _: &DrawManager) {
        self.record("update");
    }

    fn layout(&mut self, manager: &DrawManager) {
        self.record("layout");
        if let Some(region) = self.invalidate_in_layout.take() {
            manager.invalidate_region(region);
        }
    }

    fn render(&mut self, manager: &DrawManager, _: &mut Draw) {
        self.record("render");
        if self.extra_passes > 0 {
            self.extra_passes -= 1;
            manager.request_extra_render_pass();
        }
    }

    fn expose(&mut self, draw: &mut Draw, region: Rect) -> bool {
        self.record("expose");
        draw.fill_rect(region, self.color);
        true
    }

    fn screen_location(&self) -> Rect {
        self.location
    }
}

#[cfg(test)]
fn test_manager(headless: bool) -> DrawManager {
    let config = DrawManagerConfig {
        headless,
        max_fps: Some(1000),
        ..Default::default()
    };
    DrawManager::new(Box::new(SoftwareBackend::new([100, 100])), config)
}

#[test]
fn test_headless_clears_and_skips_drawing() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let dm = test_manager(true);
    let a = Probe::new("a", Rect::new(0, 0, 50, 50), &log);
    dm.register(&a);
    dm.invalidate_region(Rect::new(0, 0, 10, 10));
    dm.invalidate_region(Rect::new(80, 80, 10, 10));
    dm.sparkle();
    assert!(dm.pending_regions().is_empty());
    assert_eq!(*log.borrow(), vec!["update a", "layout a"]);
}

#[test]
fn test_invalidation_clipped_to_output() {
    let dm = test_manager(true);
    dm.invalidate_region(Rect::new(90, 90, 50, 50));
    dm.invalidate_region(Rect::new(200, 200, 5, 5));
    assert_eq!(dm.pending_regions(), vec![Rect::new(90, 90, 10, 10)]);
}

#[test]
fn test_invalidate_far_off_screen() {
    let dm = test_manager(false);
    dm.invalidate_region(Rect::new(i32::MAX - 5, 0, 10, 10));
    dm.invalidate_region(Rect::new(0, i32::MAX - 1, 10, 10));
    assert!(dm.pending_regions().is_empty());
    dm.invalidate_region(Rect::new(95, 95, i32::MAX, i32::MAX));
    assert_eq!(dm.pending_regions(), vec![Rect::new(95, 95, 5, 5)]);
}

#[test]
fn test_register_twice_raises() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let dm = test_manager(false);
    let a = Probe::new("a", Rect::new(0, 0, 10, 10), &log);
    let b = Probe::new("b", Rect::new(0, 0, 10, 10), &log);
    dm.register(&a);
    dm.register(&b);
    dm.register(&a);
    assert_eq!(dm.drawable_count(), 2);
    dm.sparkle();
    let log = log.borrow();
    let exposes = log.iter().filter(|l| l.starts_with("expose")).collect::<Vec<_>>();
    assert_eq!(exposes, vec!["expose b", "expose a"]);
}

#[test]
fn test_raise_changes_paint_order() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let dm = test_manager(false);
    let a = Probe::new("a", Rect::new(0, 0, 10, 10), &log);
    let b = Probe::new("b", Rect::new(5, 5, 10, 10), &log);
    a.borrow_mut().color = Rgba::new(255, 0, 0, 255);
    b.borrow_mut().color = Rgba::new(0, 0, 255, 255);
    dm.register(&a);
    dm.register(&b);
    dm.raise(&a);
    dm.sparkle();
    let pixel = dm.with_backend(|backend| backend.read_pixels(Rect::new(7, 7, 1, 1)));
    assert_eq!(pixel.get_pixel(0, 0).0, [255, 0, 0, 255]);
}

#[test]
fn test_deregister_unknown_is_noop() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let dm = test_manager(false);
    let a = Probe::new("a", Rect::new(0, 0, 10, 10), &log);
    let b = Probe::new("b", Rect::new(0, 0, 10, 10), &log);
    let stranger = Probe::new("stranger", Rect::new(0, 0, 10, 10), &log);
    dm.register(&a);
    dm.register(&b);
    dm.deregister(&stranger);
    dm.deregister(&a);
    dm.deregister(&a);
    assert_eq!(dm.drawable_count(), 1);
    dm.sparkle();
    assert!(log.borrow().contains(&"expose b".to_owned()));
    assert!(!log.borrow().iter().any(|l| l.ends_with(" a") || l.ends_with("stranger")));
}

#[test]
fn test_dropped_drawable_is_deregistered() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let dm = test_manager(true);
    let a = Probe::new("a", Rect::new(0, 0, 10, 10), &log);
    dm.register(&a);
    drop(a);
    assert_eq!(dm.drawable_count(), 0);
    dm.sparkle();
    assert!(log.borrow().is_empty());
}

#[test]
fn test_expose_only_overlapping_drawables() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let dm = test_manager(false);
    let a = Probe::new("a", Rect::new(0, 0, 10, 10), &log);
    let b = Probe::new("b", Rect::new(50, 50, 10, 10), &log);
    dm.register(&a);
    dm.register(&b);
    dm.sparkle();
    log.borrow_mut().clear();

    a.borrow_mut().invalidate_in_layout = Some(Rect::new(0, 0, 5, 5));
    dm.sparkle();
    let log = log.borrow();
    assert!(log.contains(&"expose a".to_owned()));
    assert!(!log.contains(&"expose b".to_owned()));
    assert!(log.contains(&"render b".to_owned()));
    assert_eq!(dm.with_backend(|backend| backend.stats().presents), 2);
}

#[test]
fn test_idle_frame_does_not_present() {
    let dm = test_manager(false);
    dm.sparkle();
    assert_eq!(dm.with_backend(|backend| backend.stats().presents), 0);
}

#[test]
fn test_extra_render_pass() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let dm = test_manager(false);
    let a = Probe::new("a", Rect::new(0, 0, 10, 10), &log);
    a.borrow_mut().extra_passes = 1;
    dm.register(&a);
    dm.sparkle();
    let renders = log.borrow().iter().filter(|l| *l == "render a").count();
    assert_eq!(renders, 2);
}

#[test]
fn test_invalidate_during_expose_panics() {
    use std::panic::{catch_unwind, AssertUnwindSafe};

    struct Rogue(Rc<DrawManager>);

    impl TopLevelDrawable for Rogue {
        fn expose(&mut self, _: &mut Draw, region: Rect) -> bool {
            self.0.invalidate_region(region);
            true
        }

        fn screen_location(&self) -> Rect {
            Rect::new(0, 0, 10, 10)
        }
    }

    let dm = Rc::new(test_manager(false));
    let rogue = Rc::new(RefCell::new(Rogue(Rc::clone(&dm))));
    dm.register(&rogue);
    let result = catch_unwind(AssertUnwindSafe(|| dm.sparkle()));
    let message = result
        .err()
        .and_then(|e| e.downcast_ref::<&str>().map(|s| s.to_string()))
        .unwrap_or_default();
    assert_eq!(message, "invalidate during draw");
    assert!(!dm.is_drawing());
}

#[test]
fn test_recursive_draw_panics() {
    use std::panic::{catch_unwind, AssertUnwindSafe};

    struct Recursive(Rc<DrawManager>);

    impl TopLevelDrawable for Recursive {
        fn expose(&mut self, _: &mut Draw, _: Rect) -> bool {
            self.0.sparkle();
            true
        }

        fn screen_location(&self) -> Rect {
            Rect::new(0, 0, 10, 10)
        }
    }

    let dm = Rc::new(test_manager(false));
    let recursive = Rc::new(RefCell::new(Recursive(Rc::clone(&dm))));
    dm.register(&recursive);
    let result = catch_unwind(AssertUnwindSafe(|| dm.sparkle()));
    let message = result
        .err()
        .and_then(|e| e.downcast_ref::<&str>().map(|s| s.to_string()))
        .unwrap_or_default();
    assert_eq!(message, "recursive draw");
    assert!(!dm.is_drawing());
}

#[test]
fn test_frame_length() {
    let dm = DrawManager::new(
        Box::new(SoftwareBackend::new([1, 1]).with_refresh_rate(50)),
        DrawManagerConfig::default(),
    );
    assert_eq!(dm.frame_length(), Duration::from_millis(20));

    let dm = DrawManager::new(
        Box::new(SoftwareBackend::new([1, 1])),
        DrawManagerConfig {
            max_fps: Some(10),
            ..Default::default()
        },
    );
    assert_eq!(dm.frame_length(), Duration::from_millis(100));

    let dm = DrawManager::new(
        Box::new(SoftwareBackend::new([1, 1]).with_refresh_rate(0)),
        DrawManagerConfig {
            fallback_refresh_rate: 100,
            ..Default::default()
        },
    );
    assert_eq!(dm.frame_length(), Duration::from_millis(10));
}
