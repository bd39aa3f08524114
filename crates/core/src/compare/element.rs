//! One side of a compare node.

use serde::Serialize;

use crate::resource::{LocalResource, RepositoryResource, ResourceKind, Revision};

/// Fetch state of an element's bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum ContentState {
    #[default]
    NotFetched,
    Fetched(Vec<u8>),
    Failed(String),
}

/// A repository resource shown on one side of a node, optionally aliased to
/// the working-copy item it was built from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceElement {
    pub resource: RepositoryResource,
    pub local: Option<LocalResource>,
    pub editable: bool,
    pub dirty: bool,
    pub content: ContentState,
}

impl ResourceElement {
    pub fn new(resource: RepositoryResource, local: Option<LocalResource>, editable: bool) -> Self {
        Self {
            resource,
            local,
            editable,
            dirty: false,
            content: ContentState::NotFetched,
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.resource.kind()
    }

    pub fn url(&self) -> &str {
        self.resource.url()
    }

    pub fn selected(&self) -> Revision {
        self.resource.selected()
    }

    /// Whether this side has anything to show.
    pub fn is_shown(&self) -> bool {
        self.resource.selected() != Revision::Invalid
    }

    /// Only files backed by a working-copy item can be edited.
    pub fn is_editable(&self) -> bool {
        self.editable && self.local.as_ref().is_some_and(LocalResource::is_file)
    }

    pub fn set_content(&mut self, bytes: Vec<u8>) {
        self.content = ContentState::Fetched(bytes);
    }

    pub fn bytes(&self) -> Option<&[u8]> {
        match &self.content {
            ContentState::Fetched(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Replace the buffer with edited bytes.
    pub fn edit(&mut self, bytes: Vec<u8>) {
        self.content = ContentState::Fetched(bytes);
        self.dirty = true;
    }

    /// Type shown to the viewer: `folder` or the file extension.
    pub fn type_name(&self) -> &str {
        if self.kind() == ResourceKind::Folder {
            return "folder";
        }
        let name = self.resource.name();
        match name.rfind('.') {
            Some(idx) if idx + 1 < name.len() => &name[idx + 1..],
            _ => "unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{ChangeMask, ResourceState};

    fn element(url: &str, kind: ResourceKind) -> ResourceElement {
        ResourceElement::new(RepositoryResource::new(kind, url, Revision::Head), None, false)
    }

    #[test]
    fn test_type_name() {
        assert_eq!(element("http://h/r/a.txt", ResourceKind::File).type_name(), "txt");
        assert_eq!(element("http://h/r/Makefile", ResourceKind::File).type_name(), "unknown");
        assert_eq!(element("http://h/r/trailing.", ResourceKind::File).type_name(), "unknown");
        assert_eq!(element("http://h/r/src.d", ResourceKind::Folder).type_name(), "folder");
    }

    #[test]
    fn test_editable_requires_local_file() {
        let mut el = element("http://h/r/a.txt", ResourceKind::File);
        el.editable = true;
        assert!(!el.is_editable());
        el.local = Some(LocalResource::from_state(
            "/wc/a.txt",
            ResourceKind::File,
            ResourceState::Modified,
            ChangeMask::NONE,
        ));
        assert!(el.is_editable());
    }

    #[test]
    fn test_edit_marks_dirty() {
        let mut el = element("http://h/r/a.txt", ResourceKind::File);
        el.set_content(b"one".to_vec());
        assert!(!el.dirty);
        el.edit(b"two".to_vec());
        assert!(el.dirty);
        assert_eq!(el.bytes(), Some(&b"two"[..]));
    }
}
