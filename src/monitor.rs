use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::classfile::ClassFile;
use crate::config::{MonitorConfig, SessionMode};
use crate::event::{LoadEvent, LoadListener};

/// Diffs successive load sessions into add/remove notifications.
///
/// Every file seen in a session lands in `current`. A class that decodes is
/// announced to the add visitor and struck from `previous`. When a closed
/// session ends, whatever is left in `previous` is reported to the remove
/// visitor and the generations shift.
pub struct Monitor<A, R>
where
    A: FnMut(&Arc<ClassFile>),
    R: FnMut(&str),
{
    on_add: A,
    on_remove: R,
    mode: SessionMode,
    previous: BTreeSet<String>,
    current: BTreeSet<String>,
    descriptors: HashMap<String, Arc<ClassFile>>,
    decoded_in_file: bool,
}

impl<A, R> Monitor<A, R>
where
    A: FnMut(&Arc<ClassFile>),
    R: FnMut(&str),
{
    pub fn new(on_add: A, on_remove: R) -> Self {
        Self::with_config(on_add, on_remove, MonitorConfig::default())
    }

    pub fn with_config(on_add: A, on_remove: R, config: MonitorConfig) -> Self {
        Self {
            on_add,
            on_remove,
            mode: config.session_mode,
            previous: BTreeSet::new(),
            current: BTreeSet::new(),
            descriptors: HashMap::new(),
            decoded_in_file: false,
        }
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: SessionMode) {
        self.mode = mode;
    }

    /// Files that have not been seen again since the last reconciliation.
    pub fn previous_files(&self) -> impl Iterator<Item = &str> {
        self.previous.iter().map(String::as_str)
    }

    /// Files seen so far in the running session.
    pub fn current_files(&self) -> impl Iterator<Item = &str> {
        self.current.iter().map(String::as_str)
    }

    /// Last descriptor decoded from `file`, if it is still tracked.
    pub fn descriptor(&self, file: &str) -> Option<&Arc<ClassFile>> {
        self.descriptors.get(file)
    }

    /// Forgets all tracked state without notifying anyone.
    pub fn reset(&mut self) {
        self.previous.clear();
        self.current.clear();
        self.descriptors.clear();
    }
}

impl<A, R> LoadListener for Monitor<A, R>
where
    A: FnMut(&Arc<ClassFile>),
    R: FnMut(&str),
{
    fn begin_file(&mut self, event: &LoadEvent<'_>) {
        if let Some(file) = event.filename {
            self.current.insert(file.to_string());
        }
        self.decoded_in_file = false;
    }

    fn end_classfile(&mut self, event: &LoadEvent<'_>) {
        let (Some(file), Some(classfile)) = (event.filename, event.classfile) else {
            return;
        };
        self.decoded_in_file = true;
        (self.on_add)(classfile);
        self.descriptors
            .insert(file.to_string(), Arc::clone(classfile));
        self.previous.remove(file);
    }

    fn end_file(&mut self, event: &LoadEvent<'_>) {
        if self.mode != SessionMode::Open || self.decoded_in_file {
            return;
        }
        if let Some(classfile) = event.filename.and_then(|f| self.descriptors.get(f)) {
            tracing::debug!(file = ?event.filename, class = classfile.class_name(), "re-announcing skipped file");
            (self.on_add)(classfile);
        }
    }

    fn end_session(&mut self, _event: &LoadEvent<'_>) {
        match self.mode {
            SessionMode::Closed => {
                for file in std::mem::take(&mut self.previous) {
                    if let Some(classfile) = self.descriptors.remove(&file) {
                        tracing::debug!(file = %file, class = classfile.class_name(), "removed");
                        (self.on_remove)(classfile.class_name());
                    }
                }
                self.previous = std::mem::take(&mut self.current);
            }
            SessionMode::Open => {
                let current = std::mem::take(&mut self.current);
                self.previous.extend(current);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::simple_class;
    use std::cell::RefCell;
    use std::rc::Rc;

    type Log = Rc<RefCell<Vec<String>>>;

    fn monitor(mode: SessionMode) -> (impl LoadListener, Log, Log) {
        let added: Log = Rc::default();
        let removed: Log = Rc::default();
        let (a, r) = (added.clone(), removed.clone());
        let monitor = Monitor::with_config(
            move |c: &Arc<ClassFile>| a.borrow_mut().push(c.class_name().to_string()),
            move |name: &str| r.borrow_mut().push(name.to_string()),
            MonitorConfig { session_mode: mode },
        );
        (monitor, added, removed)
    }

    fn class(name: &str) -> Arc<ClassFile> {
        Arc::new(ClassFile::decode(&simple_class(name)).unwrap())
    }

    fn file(m: &mut impl LoadListener, name: &str, classfile: Option<&Arc<ClassFile>>) {
        let event = LoadEvent {
            filename: Some(name),
            ..LoadEvent::default()
        };
        m.begin_file(&event);
        if let Some(classfile) = classfile {
            m.begin_classfile(&event);
            m.end_classfile(&LoadEvent {
                classfile: Some(classfile),
                ..event
            });
        }
        m.end_file(&event);
    }

    fn end_session(m: &mut impl LoadListener) {
        m.end_session(&LoadEvent::default());
    }

    #[test]
    fn generations_shift_at_session_end() {
        let (a, b) = (class("A"), class("B"));
        let added = Rc::new(RefCell::new(0));
        let counter = added.clone();
        let mut m = Monitor::new(move |_: &Arc<ClassFile>| *counter.borrow_mut() += 1, |_: &str| {});

        file(&mut m, "A.class", Some(&a));
        file(&mut m, "B.class", Some(&b));
        assert_eq!(m.current_files().collect::<Vec<_>>(), ["A.class", "B.class"]);
        assert_eq!(m.previous_files().count(), 0);

        end_session(&mut m);
        assert_eq!(m.current_files().count(), 0);
        assert_eq!(m.previous_files().collect::<Vec<_>>(), ["A.class", "B.class"]);

        file(&mut m, "A.class", Some(&a));
        assert_eq!(m.previous_files().collect::<Vec<_>>(), ["B.class"]);
        assert_eq!(*added.borrow(), 3);
    }

    #[test]
    fn closed_session_reports_missing_classes() {
        let (a, b) = (class("p/A"), class("p/B"));
        let (mut m, added, removed) = monitor(SessionMode::Closed);

        file(&mut m, "A.class", Some(&a));
        file(&mut m, "B.class", Some(&b));
        end_session(&mut m);

        file(&mut m, "A.class", Some(&a));
        end_session(&mut m);

        assert_eq!(*added.borrow(), ["p.A", "p.B", "p.A"]);
        assert_eq!(*removed.borrow(), ["p.B"]);

        // B stays gone; nothing more to remove.
        file(&mut m, "A.class", Some(&a));
        end_session(&mut m);
        assert_eq!(removed.borrow().len(), 1);
    }

    #[test]
    fn closed_session_removes_files_skipped_by_dispatch() {
        let a = class("A");
        let (mut m, added, removed) = monitor(SessionMode::Closed);

        file(&mut m, "A.class", Some(&a));
        end_session(&mut m);
        // Seen again but not decoded, e.g. filtered as unchanged.
        file(&mut m, "A.class", None);
        end_session(&mut m);

        assert_eq!(*added.borrow(), ["A"]);
        assert_eq!(*removed.borrow(), ["A"]);
    }

    #[test]
    fn open_session_reannounces_and_never_removes() {
        let (a, b) = (class("A"), class("B"));
        let (mut m, added, removed) = monitor(SessionMode::Open);

        file(&mut m, "A.class", Some(&a));
        file(&mut m, "B.class", Some(&b));
        end_session(&mut m);

        file(&mut m, "A.class", None);
        end_session(&mut m);

        assert_eq!(*added.borrow(), ["A", "B", "A"]);
        assert!(removed.borrow().is_empty());
    }
}
