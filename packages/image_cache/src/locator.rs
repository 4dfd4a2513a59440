//! Image locators: cache keys naming a source image plus how to derive an
//! image from it.

use graphics::Rect;
use std::{
    cmp::Ordering,
    fmt::{self, Formatter, Display},
    hash::{Hash, Hasher},
};


const DATA_URI_PREFIX: &'static str = "data:";


#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LocatorKind {
    /// Names no image.
    Void,
    /// A plain image file or data URI.
    File,
    /// An image derived from a file by modifications and/or cutting out a
    /// sub-rectangle.
    SubFile,
}

/// Immutable, cheaply constructed identifier for an image.
///
/// Equality, ordering and hashing only consider what's relevant to the
/// kind: file locators compare by filename, sub-file locators by every
/// field.
#[derive(Debug, Clone)]
pub struct Locator {
    kind: LocatorKind,
    filename: String,
    modifications: String,
    location: Rect,
    center_x: i32,
    center_y: i32,
    is_data_uri: bool,
}

impl Locator {
    /// Parse a path as it appears in content. Anything from the first `~`
    /// on is a modification string. Data URIs split the same way, base64
    /// has no `~`.
    pub fn new(path: &str) -> Self {
        if path.is_empty() {
            return Self::default();
        }
        match path.find('~') {
            Some(i) => Self::with_modifications(&path[..i], &path[i..]),
            None => Self::file(path),
        }
    }

    fn file(filename: &str) -> Self {
        Locator {
            kind: LocatorKind::File,
            filename: filename.to_owned(),
            modifications: String::new(),
            location: Rect::empty(),
            center_x: -1,
            center_y: -1,
            is_data_uri: filename.starts_with(DATA_URI_PREFIX),
        }
    }

    pub fn with_modifications(filename: &str, modifications: &str) -> Self {
        Self::sub_file(filename, modifications, Rect::empty(), -1, -1)
    }

    /// Image derived from `filename` by applying `modifications` and then
    /// cutting out `location`. If both center coordinates are non-negative,
    /// `location` is shifted so that point of the image lands at its center.
    pub fn sub_file(
        filename: &str,
        modifications: &str,
        location: Rect,
        center_x: i32,
        center_y: i32,
    ) -> Self {
        if filename.is_empty() {
            return Self::default();
        }
        let mut loc = Self::file(filename);
        let location = if location.is_empty() { Rect::empty() } else { location };
        let plain = modifications.is_empty()
            && location.is_empty()
            && center_x < 0
            && center_y < 0;
        if !plain {
            loc.kind = LocatorKind::SubFile;
            loc.modifications = modifications.to_owned();
            loc.location = location;
            loc.center_x = center_x;
            loc.center_y = center_y;
        }
        loc
    }

    /// Same image with further modifications appended.
    pub fn clone_with(&self, extra_modifications: &str) -> Self {
        let mut modifications = self.modifications.clone();
        modifications.push_str(extra_modifications);
        Self::sub_file(
            &self.filename,
            &modifications,
            self.location,
            self.center_x,
            self.center_y,
        )
    }

    /// The plain file this image derives from.
    pub fn base(&self) -> Self {
        if self.filename.is_empty() {
            Self::default()
        } else {
            Self::file(&self.filename)
        }
    }

    pub fn kind(&self) -> LocatorKind {
        self.kind
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn modifications(&self) -> &str {
        &self.modifications
    }

    pub fn location(&self) -> Rect {
        self.location
    }

    pub fn center_x(&self) -> i32 {
        self.center_x
    }

    pub fn center_y(&self) -> i32 {
        self.center_y
    }

    pub fn is_data_uri(&self) -> bool {
        self.is_data_uri
    }

    pub fn is_void(&self) -> bool {
        self.kind == LocatorKind::Void
    }

    // the fields equality, ordering and hashing look at
    fn key(&self) -> (LocatorKind, &str, &str, (i32, i32, i32, i32), i32, i32) {
        match self.kind {
            LocatorKind::Void => (self.kind, "", "", (0, 0, 0, 0), -1, -1),
            LocatorKind::File => (self.kind, &self.filename, "", (0, 0, 0, 0), -1, -1),
            LocatorKind::SubFile => {
                let Rect { x, y, w, h } = self.location;
                (
                    self.kind,
                    &self.filename,
                    &self.modifications,
                    (x, y, w, h),
                    self.center_x,
                    self.center_y,
                )
            }
        }
    }
}

impl Default for Locator {
    fn default() -> Self {
        Locator {
            kind: LocatorKind::Void,
            filename: String::new(),
            modifications: String::new(),
            location: Rect::empty(),
            center_x: -1,
            center_y: -1,
            is_data_uri: false,
        }
    }
}

impl From<&str> for Locator {
    fn from(path: &str) -> Self {
        Locator::new(path)
    }
}

impl PartialEq for Locator {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Locator {}

impl Hash for Locator {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl PartialOrd for Locator {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Locator {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl Display for Locator {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        if self.is_data_uri {
            // don't dump kilobytes of base64 into logs
            let end = self.filename
                .char_indices()
                .nth(32)
                .map(|(i, _)| i)
                .unwrap_or(self.filename.len());
            write!(f, "{}...", &self.filename[..end])?;
        } else {
            f.write_str(&self.filename)?;
        }
        f.write_str(&self.modifications)?;
        if !self.location.is_empty() {
            write!(f, " {}", self.location)?;
        }
        if self.center_x >= 0 && self.center_y >= 0 {
            write!(f, " center={},{}", self.center_x, self.center_y)?;
        }
        Ok(())
    }
}


#[cfg(test)]
fn hash_of(loc: &Locator) -> u64 {
    use std::collections::hash_map::DefaultHasher;

    let mut hasher = DefaultHasher::new();
    loc.hash(&mut hasher);
    hasher.finish()
}

#[test]
fn test_filename_round_trip() {
    for name in ["terrain/grass.png", "a.png", "units/elf fighter.png"] {
        let loc = Locator::new(name);
        assert_eq!(loc.filename(), name);
        assert_eq!(loc.modifications(), "");
        assert_eq!(loc.kind(), LocatorKind::File);

        let with = format!("{}~FL()", name);
        let loc = Locator::new(&with);
        assert_eq!(loc.filename(), name);
        assert_eq!(loc.modifications(), "~FL()");
        assert_eq!(loc.kind(), LocatorKind::SubFile);
        assert_eq!(loc.to_string(), with);
    }
}

#[test]
fn test_split_at_first_tilde() {
    let loc = Locator::new("a.png~RC(magenta>red)~FL(vert)");
    assert_eq!(loc.filename(), "a.png");
    assert_eq!(loc.modifications(), "~RC(magenta>red)~FL(vert)");
    assert_eq!(loc.base(), Locator::new("a.png"));
    assert_eq!(loc.clone_with("~GS()").modifications(), "~RC(magenta>red)~FL(vert)~GS()");
}

#[test]
fn test_data_uri_splits_modifications() {
    let uri = "data:image/png;base64,iVBORw0KGgo=";
    let loc = Locator::new(uri);
    assert!(loc.is_data_uri());
    assert_eq!(loc.kind(), LocatorKind::File);
    assert_eq!(loc.filename(), uri);

    let loc = Locator::new(&format!("{}~FL()", uri));
    assert!(loc.is_data_uri());
    assert_eq!(loc.kind(), LocatorKind::SubFile);
    assert_eq!(loc.filename(), uri);
    assert_eq!(loc.modifications(), "~FL()");
    assert!(loc.base().is_data_uri());
    assert_eq!(loc.base(), Locator::new(uri));
}

#[test]
fn test_equal_fields_equal_hash() {
    let a = Locator::sub_file("a.png", "~GS()", Rect::new(0, 0, 10, 10), 5, 5);
    let b = Locator::sub_file("a.png", "~GS()", Rect::new(0, 0, 10, 10), 5, 5);
    assert_eq!(a, b);
    assert_eq!(hash_of(&a), hash_of(&b));

    let variants = [
        Locator::sub_file("b.png", "~GS()", Rect::new(0, 0, 10, 10), 5, 5),
        Locator::sub_file("a.png", "~NEG()", Rect::new(0, 0, 10, 10), 5, 5),
        Locator::sub_file("a.png", "~GS()", Rect::new(1, 0, 10, 10), 5, 5),
        Locator::sub_file("a.png", "~GS()", Rect::new(0, 0, 10, 10), 4, 5),
        Locator::sub_file("a.png", "~GS()", Rect::new(0, 0, 10, 10), 5, 4),
    ];
    for v in &variants {
        assert_ne!(&a, v);
    }
}

#[test]
fn test_plain_constructors_agree() {
    assert_eq!(Locator::with_modifications("a.png", ""), Locator::new("a.png"));
    assert_eq!(Locator::new("a.png~"), Locator::with_modifications("a.png", "~"));
    assert!(Locator::new("").is_void());
    assert!(Locator::default().is_void());
    assert_ne!(Locator::new("a.png"), Locator::new("a.png~GS()"));
    assert!(Locator::new("a.png") < Locator::new("b.png"));
}
