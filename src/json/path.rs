use crate::json::escape::{EscapeError, RawStr};
use std::fmt::Write;

/// One step of a structural path: an object key or an array index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathElement<'a> {
    Key(RawStr<'a>),
    Index(usize),
}

impl PathElement<'_> {
    /// Serialized form of this element: `/key` (unescaped) or `[n]`.
    pub fn serialize(&self) -> Result<String, EscapeError> {
        match self {
            PathElement::Key(key) => {
                let mut out = String::with_capacity(key.len() + 1);
                out.push('/');
                out.push_str(&key.unescape()?);
                Ok(out)
            }
            PathElement::Index(index) => Ok(format!("[{}]", index)),
        }
    }
}

/// Container kind and current position for one nesting level.
///
/// `None` means the container was opened but no key/element has been seen yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Frame<'a> {
    Object(Option<RawStr<'a>>),
    Array(Option<usize>),
}

impl<'a> Frame<'a> {
    pub(crate) fn element(&self) -> Option<PathElement<'a>> {
        match *self {
            Frame::Object(key) => key.map(PathElement::Key),
            Frame::Array(index) => index.map(PathElement::Index),
        }
    }
}

/// Borrowed view of the parser's nesting stack at a leaf event.
#[derive(Debug, Clone, Copy)]
pub struct Path<'p, 'a> {
    frames: &'p [Frame<'a>],
}

impl<'p, 'a> Path<'p, 'a> {
    pub(crate) fn new(frames: &'p [Frame<'a>]) -> Self {
        Self { frames }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn get(&self, depth: usize) -> Option<PathElement<'a>> {
        self.frames.get(depth).and_then(Frame::element)
    }

    pub fn iter(&self) -> impl Iterator<Item = PathElement<'a>> + 'p {
        self.frames.iter().filter_map(Frame::element)
    }

    /// Serialized segments, one per element, e.g. `["/apps", "/web", "/args", "[0]"]`.
    pub fn segments(&self) -> Result<Vec<String>, EscapeError> {
        self.iter().map(|element| element.serialize()).collect()
    }

    /// Full path string, e.g. `/apps/web/args[0]`.
    pub fn to_path_string(&self) -> Result<String, EscapeError> {
        let mut out = String::new();
        for element in self.iter() {
            match element {
                PathElement::Key(key) => {
                    out.push('/');
                    out.push_str(&key.unescape()?);
                }
                PathElement::Index(index) => {
                    let _ = write!(out, "[{}]", index);
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_string_mixes_keys_and_indices() {
        let frames = [
            Frame::Object(Some(RawStr::new(b"apps"))),
            Frame::Object(Some(RawStr::new(b"web"))),
            Frame::Object(Some(RawStr::new(b"args"))),
            Frame::Array(Some(2)),
        ];
        let path = Path::new(&frames);
        assert_eq!(path.len(), 4);
        assert_eq!(path.to_path_string().unwrap(), "/apps/web/args[2]");
        assert_eq!(
            path.segments().unwrap(),
            vec!["/apps", "/web", "/args", "[2]"]
        );
        assert_eq!(path.get(3), Some(PathElement::Index(2)));
        assert_eq!(path.get(4), None);
    }

    #[test]
    fn test_keys_are_unescaped_in_path_string() {
        let frames = [Frame::Object(Some(RawStr::new(br#"a\"b"#)))];
        assert_eq!(Path::new(&frames).to_path_string().unwrap(), "/a\"b");
    }

    #[test]
    fn test_bad_key_escape_fails_serialization() {
        let frames = [Frame::Object(Some(RawStr::new(br"bad\q")))];
        assert!(Path::new(&frames).to_path_string().is_err());
    }
}
