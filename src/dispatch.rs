use std::collections::HashMap;

use sha2::{Digest, Sha256};

use crate::classfile::MAGIC;
use crate::source::RawStream;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Ignore,
    Class,
    Directory,
    Zip,
    Jar,
}

impl Action {
    pub fn is_container(self) -> bool {
        matches!(self, Action::Directory | Action::Zip | Action::Jar)
    }
}

/// Routing policy for the loader.
///
/// `dispatch` classifies a name before anything is read. `admit` gets the
/// final say on a stream already classified as [`Action::Class`]; returning
/// false skips the decode attempt while the file events still fire.
pub trait Dispatcher: Send {
    fn dispatch(&self, name: &str, is_dir: bool) -> Action;

    fn admit(&mut self, _stream: &RawStream) -> bool {
        true
    }
}

impl<D: Dispatcher + ?Sized> Dispatcher for Box<D> {
    fn dispatch(&self, name: &str, is_dir: bool) -> Action {
        (**self).dispatch(name, is_dir)
    }

    fn admit(&mut self, stream: &RawStream) -> bool {
        (**self).admit(stream)
    }
}

pub(crate) fn has_suffix(name: &str, suffix: &str) -> bool {
    name.len() >= suffix.len()
        && name.as_bytes()[name.len() - suffix.len()..].eq_ignore_ascii_case(suffix.as_bytes())
}

fn archive_action(name: &str) -> Option<Action> {
    if has_suffix(name, ".jar") {
        Some(Action::Jar)
    } else if has_suffix(name, ".zip") {
        Some(Action::Zip)
    } else {
        None
    }
}

/// Trusts file suffixes: only `.class` names are decoded. Anything named
/// `.class` is attempted, so a corrupt one surfaces as a failed decode.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrictDispatcher;

impl Dispatcher for StrictDispatcher {
    fn dispatch(&self, name: &str, is_dir: bool) -> Action {
        if is_dir {
            Action::Directory
        } else if has_suffix(name, ".class") {
            Action::Class
        } else {
            archive_action(name).unwrap_or(Action::Ignore)
        }
    }
}

/// Treats every non-archive as a class-file candidate and lets the magic
/// number decide, so renamed or suffix-less class files still load.
#[derive(Debug, Clone, Copy, Default)]
pub struct PermissiveDispatcher;

impl Dispatcher for PermissiveDispatcher {
    fn dispatch(&self, name: &str, is_dir: bool) -> Action {
        if is_dir {
            Action::Directory
        } else {
            archive_action(name).unwrap_or(Action::Class)
        }
    }

    fn admit(&mut self, stream: &RawStream) -> bool {
        stream.bytes.starts_with(&MAGIC.to_be_bytes())
    }
}

/// Wraps another dispatcher and only admits streams whose content changed
/// since the last time the same name was seen.
#[derive(Debug, Clone, Default)]
pub struct ModifiedOnlyDispatcher<D> {
    inner: D,
    digests: HashMap<String, String>,
}

impl<D: Dispatcher> ModifiedOnlyDispatcher<D> {
    pub fn new(inner: D) -> Self {
        Self {
            inner,
            digests: HashMap::new(),
        }
    }

    pub fn inner(&self) -> &D {
        &self.inner
    }

    /// Forgets every digest so the next pass admits everything again.
    pub fn reset(&mut self) {
        self.digests.clear();
    }
}

impl<D: Dispatcher> Dispatcher for ModifiedOnlyDispatcher<D> {
    fn dispatch(&self, name: &str, is_dir: bool) -> Action {
        self.inner.dispatch(name, is_dir)
    }

    fn admit(&mut self, stream: &RawStream) -> bool {
        if !self.inner.admit(stream) {
            return false;
        }
        let digest = hash_content(&stream.bytes);
        match self.digests.get(&stream.name) {
            Some(previous) if *previous == digest => {
                tracing::debug!(name = %stream.name, "unchanged, skipping decode");
                false
            }
            _ => {
                self.digests.insert(stream.name.clone(), digest);
                true
            }
        }
    }
}

pub fn hash_content(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}
