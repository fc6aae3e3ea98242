use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Characters that may never appear inside a tree path segment.
pub const FORBIDDEN_SEGMENT_CHARS: &[char] = &['/', '.', '#', '$', '[', ']'];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("path segment must not be empty")]
    EmptySegment,

    #[error("path segment '{segment}' contains forbidden character {ch:?}")]
    ForbiddenChar { segment: String, ch: char },

    #[error("object path '{0}' is not a valid storage location")]
    InvalidObjectPath(String),
}

/// Validate a single segment of a realtime tree path.
pub fn validate_segment(segment: &str) -> Result<(), PathError> {
    if segment.is_empty() {
        return Err(PathError::EmptySegment);
    }
    if let Some(ch) = segment
        .chars()
        .find(|c| FORBIDDEN_SEGMENT_CHARS.contains(c) || c.is_control())
    {
        return Err(PathError::ForbiddenChar {
            segment: segment.to_string(),
            ch,
        });
    }
    Ok(())
}

/// A location in the realtime tree, e.g. `sessions/camp21/activities`.
///
/// Stored in its joined form; the root is the empty string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodePath(String);

impl NodePath {
    pub fn root() -> Self {
        Self(String::new())
    }

    /// Parse a slash-separated path. Leading and trailing slashes are ignored.
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        let trimmed = raw.trim_matches('/');
        if trimmed.is_empty() {
            return Ok(Self::root());
        }
        for segment in trimmed.split('/') {
            validate_segment(segment)?;
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn child(&self, segment: &str) -> Result<Self, PathError> {
        validate_segment(segment)?;
        if self.is_root() {
            Ok(Self(segment.to_string()))
        } else {
            Ok(Self(format!("{}/{}", self.0, segment)))
        }
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(idx) => Some(Self(self.0[..idx].to_string())),
            None => Some(Self::root()),
        }
    }

    /// All strict ancestors, nearest first, ending at the root.
    pub fn ancestors(&self) -> Vec<Self> {
        let mut out = Vec::new();
        let mut current = self.parent();
        while let Some(p) = current {
            current = p.parent();
            out.push(p);
        }
        out
    }

    /// True if `self` is a strict ancestor of `other`.
    pub fn is_ancestor_of(&self, other: &NodePath) -> bool {
        if self.is_root() {
            return !other.is_root();
        }
        other.0.len() > self.0.len()
            && other.0.starts_with(&self.0)
            && other.0.as_bytes()[self.0.len()] == b'/'
    }

    /// A write at one path is visible to a reader of the other.
    pub fn overlaps(&self, other: &NodePath) -> bool {
        self == other || self.is_ancestor_of(other) || other.is_ancestor_of(self)
    }

    /// Path of `other` relative to `self`, if `self` is an ancestor or equal.
    pub fn relative<'a>(&self, other: &'a NodePath) -> Option<Vec<&'a str>> {
        if self == other {
            return Some(Vec::new());
        }
        if !self.is_ancestor_of(other) {
            return None;
        }
        let rest = if self.is_root() {
            other.as_str()
        } else {
            &other.0[self.0.len() + 1..]
        };
        Some(rest.split('/').collect())
    }

    // -- Well-known locations --

    pub fn sessions() -> Self {
        Self("sessions".into())
    }

    pub fn session(id: &SessionId) -> Self {
        Self(format!("sessions/{}", id))
    }

    pub fn creator(id: &SessionId) -> Self {
        Self(format!("sessions/{}/creator", id))
    }

    pub fn activities(id: &SessionId) -> Self {
        Self(format!("sessions/{}/activities", id))
    }

    pub fn images(id: &SessionId) -> Self {
        Self(format!("sessions/{}/images", id))
    }

    pub fn user_sessions(uid: &str) -> Result<Self, PathError> {
        Self::parse("users")?.child(uid)?.child("sessions")
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            f.write_str("/")
        } else {
            f.write_str(&self.0)
        }
    }
}

/// User-chosen session name. Doubles as the session's unique key, so it must
/// be a valid tree segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(String);

impl SessionId {
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        validate_segment(raw)?;
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for SessionId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for SessionId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        SessionId::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Location of a blob in object storage, e.g. `sessions/camp21/sunset.jpg`.
///
/// Unlike tree paths, dots are allowed, but `.`/`..` segments, backslashes
/// and control characters are not.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectPath(String);

impl ObjectPath {
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        let trimmed = raw.trim_matches('/');
        let invalid = || PathError::InvalidObjectPath(raw.to_string());
        if trimmed.is_empty() {
            return Err(invalid());
        }
        for segment in trimmed.split('/') {
            if segment.is_empty() || segment == "." || segment == ".." {
                return Err(invalid());
            }
            if segment.chars().any(|c| c == '\\' || c.is_control()) {
                return Err(invalid());
            }
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Where an image named `name` of a session is stored.
    pub fn image(session: &SessionId, name: &str) -> Result<Self, PathError> {
        validate_segment(name)?;
        Ok(Self(format!("sessions/{}/{}.jpg", session, name)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_trims_slashes_and_validates() {
        let p = NodePath::parse("/sessions/camp21/").unwrap();
        assert_eq!(p.as_str(), "sessions/camp21");
        assert_eq!(p.segments().count(), 2);
        assert!(NodePath::parse("").unwrap().is_root());
        assert_eq!(
            NodePath::parse("sessions//x"),
            Err(PathError::EmptySegment)
        );
        assert!(matches!(
            NodePath::parse("sessions/a.b"),
            Err(PathError::ForbiddenChar { ch: '.', .. })
        ));
    }

    #[test]
    fn ancestry_respects_segment_boundaries() {
        let camp = NodePath::parse("sessions/camp").unwrap();
        let camp21 = NodePath::parse("sessions/camp21").unwrap();
        let acts = NodePath::parse("sessions/camp/activities").unwrap();

        assert!(!camp.is_ancestor_of(&camp21));
        assert!(!camp.overlaps(&camp21));
        assert!(camp.is_ancestor_of(&acts));
        assert!(acts.overlaps(&camp));
        assert!(NodePath::root().is_ancestor_of(&camp));
        assert_eq!(camp.relative(&acts), Some(vec!["activities"]));
        assert_eq!(camp21.relative(&acts), None);
    }

    #[test]
    fn parent_and_ancestors() {
        let p = NodePath::parse("a/b/c").unwrap();
        assert_eq!(p.parent().unwrap().as_str(), "a/b");
        let anc: Vec<String> = p.ancestors().iter().map(|a| a.as_str().to_string()).collect();
        assert_eq!(anc, vec!["a/b", "a", ""]);
    }

    #[test]
    fn session_id_rejects_path_characters() {
        assert!(SessionId::parse("camp21").is_ok());
        assert!(SessionId::parse("").is_err());
        assert!(SessionId::parse("camp/21").is_err());
        assert!(SessionId::parse("camp$").is_err());
    }

    #[test]
    fn object_paths() {
        let id = SessionId::parse("camp21").unwrap();
        let p = ObjectPath::image(&id, "sunset").unwrap();
        assert_eq!(p.as_str(), "sessions/camp21/sunset.jpg");
        assert!(ObjectPath::image(&id, "../x").is_err());
        assert!(ObjectPath::parse("sessions/../etc").is_err());
        assert!(ObjectPath::parse("").is_err());
    }
}
