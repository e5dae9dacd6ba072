//! Script execution hook.

use super::{Document, NodeId};

const JAVASCRIPT_TYPES: &[&str] = &[
    "application/ecmascript",
    "application/javascript",
    "application/x-ecmascript",
    "application/x-javascript",
    "text/ecmascript",
    "text/javascript",
    "text/javascript1.0",
    "text/javascript1.5",
    "text/jscript",
    "text/livescript",
    "text/x-ecmascript",
    "text/x-javascript",
    "module",
];

/// Whether a `type` attribute value makes a script element runnable.
/// A missing or blank type counts as JavaScript.
pub fn is_executable_type(script_type: Option<&str>) -> bool {
    match script_type.map(str::trim) {
        None | Some("") => true,
        Some(value) => JAVASCRIPT_TYPES
            .iter()
            .any(|known| known.eq_ignore_ascii_case(value)),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptSource {
    Inline(String),
    Remote { src: String, is_async: bool },
}

/// A live script element that just became connected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptInvocation {
    pub node: NodeId,
    pub source: ScriptSource,
    pub attributes: Vec<(String, String)>,
}

impl ScriptInvocation {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Runs scripts for a [`Document`].
///
/// Called with no document lock held, so the runtime may read and mutate the
/// document (including inserting further scripts).
pub trait ScriptRuntime: Send + Sync {
    fn execute(&self, document: &Document, script: &ScriptInvocation);
}
