//! Arena node storage.

use std::fmt;

/// Generational handle to a node in a [`Document`](super::Document).
///
/// Handles do not own their node. Once a node is released its slot may be
/// reused, but the generation changes, so a stale handle never aliases the
/// new occupant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    /// `index` is an arena slot position. Documents stay far below
    /// `u32::MAX` slots.
    #[inline]
    pub(crate) fn new(index: usize, generation: u32) -> Self {
        debug_assert!(index < u32::MAX as usize, "node index must be less than u32::MAX");
        Self {
            index: index as u32,
            generation,
        }
    }

    #[inline]
    pub(crate) fn index(self) -> usize {
        self.index as usize
    }

    #[inline]
    pub(crate) fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct NodeData {
    /// Lowercase tag name.
    pub tag: String,
    /// Lowercase names, insertion order.
    pub attributes: Vec<(String, String)>,
    pub text: String,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    /// Set once a script element has been handed to the runtime.
    pub script_started: bool,
}

impl NodeData {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            attributes: Vec::new(),
            text: String::new(),
            parent: None,
            children: Vec::new(),
            script_started: false,
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn set_attribute(&mut self, name: &str, value: &str) {
        let name = name.to_ascii_lowercase();
        match self.attributes.iter_mut().find(|(key, _)| *key == name) {
            Some(entry) => entry.1 = value.to_string(),
            None => self.attributes.push((name, value.to_string())),
        }
    }

    pub fn remove_attribute(&mut self, name: &str) -> bool {
        let before = self.attributes.len();
        self.attributes
            .retain(|(key, _)| !key.eq_ignore_ascii_case(name));
        self.attributes.len() != before
    }
}

#[derive(Debug)]
pub(crate) struct Slot {
    pub generation: u32,
    pub node: Option<NodeData>,
}

/// Read-only view of an element, handed to [`Document::find_all`]
/// predicates.
///
/// [`Document::find_all`]: super::Document::find_all
#[derive(Debug, Clone, Copy)]
pub struct ElementRef<'a> {
    pub(crate) id: NodeId,
    pub(crate) data: &'a NodeData,
}

impl<'a> ElementRef<'a> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn tag(&self) -> &'a str {
        &self.data.tag
    }

    pub fn attribute(&self, name: &str) -> Option<&'a str> {
        self.data.attribute(name)
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.data.attribute(name).is_some()
    }

    pub fn text(&self) -> &'a str {
        &self.data.text
    }
}
