//! The nested load-event protocol.
//!
//! Events nest four levels deep: session, group, file, class file. A session
//! wraps one top-level load call, a group wraps one container level (nested
//! archives open a group inside their entry's file events), a file wraps one
//! entry and a class-file pair wraps one decode attempt. Standalone stream
//! loads skip the session and group levels.
//!
//! [`EventSource`] keeps listeners in registration order and checks the
//! nesting in debug builds.

use std::sync::{Arc, Mutex, PoisonError};

use crate::classfile::ClassFile;

/// Snapshot of the active scope when an event fires.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadEvent<'a> {
    /// Innermost open group.
    pub group: Option<&'a str>,
    /// Session size for session events, declared entry count otherwise.
    /// `None` when the count is unknown.
    pub size: Option<usize>,
    pub filename: Option<&'a str>,
    /// Only set on `end_classfile`, and only when decoding succeeded.
    pub classfile: Option<&'a Arc<ClassFile>>,
}

/// Receives load events. Every method defaults to doing nothing.
pub trait LoadListener {
    fn begin_session(&mut self, _event: &LoadEvent<'_>) {}
    fn begin_group(&mut self, _event: &LoadEvent<'_>) {}
    fn begin_file(&mut self, _event: &LoadEvent<'_>) {}
    fn begin_classfile(&mut self, _event: &LoadEvent<'_>) {}
    fn end_classfile(&mut self, _event: &LoadEvent<'_>) {}
    fn end_file(&mut self, _event: &LoadEvent<'_>) {}
    fn end_group(&mut self, _event: &LoadEvent<'_>) {}
    fn end_session(&mut self, _event: &LoadEvent<'_>) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Level {
    Session,
    Group,
    File,
    Classfile,
}

type Listeners = Vec<(ListenerId, Box<dyn LoadListener>)>;

#[derive(Default)]
pub struct EventSource {
    listeners: Listeners,
    next_id: u64,
    stack: Vec<Level>,
    groups: Vec<(String, Option<usize>)>,
    session_size: Option<usize>,
}

impl EventSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&mut self, listener: impl LoadListener + 'static) -> ListenerId {
        self.add_boxed_listener(Box::new(listener))
    }

    pub fn add_boxed_listener(&mut self, listener: Box<dyn LoadListener>) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, listener));
        id
    }

    pub fn remove_listener(&mut self, id: ListenerId) -> Option<Box<dyn LoadListener>> {
        let position = self.listeners.iter().position(|(lid, _)| *lid == id)?;
        Some(self.listeners.remove(position).1)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Number of currently open levels.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn fire_begin_session(&mut self, size: Option<usize>) {
        self.enter(Level::Session);
        self.session_size = size;
        tracing::debug!(?size, "begin session");
        let event = LoadEvent {
            size,
            ..LoadEvent::default()
        };
        notify(&mut self.listeners, &event, |l, e| l.begin_session(e));
    }

    pub fn fire_begin_group(&mut self, name: &str, size: Option<usize>) {
        self.enter(Level::Group);
        self.groups.push((name.to_string(), size));
        tracing::debug!(group = %name, ?size, "begin group");
        let event = LoadEvent {
            group: Some(name),
            size,
            ..LoadEvent::default()
        };
        notify(&mut self.listeners, &event, |l, e| l.begin_group(e));
    }

    pub fn fire_begin_file(&mut self, name: &str) {
        self.enter(Level::File);
        tracing::debug!(file = %name, "begin file");
        let event = file_event(&self.groups, name, None);
        notify(&mut self.listeners, &event, |l, e| l.begin_file(e));
    }

    pub fn fire_begin_classfile(&mut self, name: &str) {
        self.enter(Level::Classfile);
        let event = file_event(&self.groups, name, None);
        notify(&mut self.listeners, &event, |l, e| l.begin_classfile(e));
    }

    pub fn fire_end_classfile(&mut self, name: &str, classfile: Option<&Arc<ClassFile>>) {
        tracing::debug!(
            file = %name,
            class = classfile.map(|c| c.class_name()),
            "end classfile"
        );
        let event = file_event(&self.groups, name, classfile);
        notify(&mut self.listeners, &event, |l, e| l.end_classfile(e));
        self.exit(Level::Classfile);
    }

    pub fn fire_end_file(&mut self, name: &str) {
        let event = file_event(&self.groups, name, None);
        notify(&mut self.listeners, &event, |l, e| l.end_file(e));
        self.exit(Level::File);
    }

    pub fn fire_end_group(&mut self) {
        let (name, size) = self.groups.pop().unwrap_or_default();
        tracing::debug!(group = %name, "end group");
        let event = LoadEvent {
            group: Some(&name),
            size,
            ..LoadEvent::default()
        };
        notify(&mut self.listeners, &event, |l, e| l.end_group(e));
        self.exit(Level::Group);
    }

    pub fn fire_end_session(&mut self) {
        let event = LoadEvent {
            size: self.session_size.take(),
            ..LoadEvent::default()
        };
        tracing::debug!("end session");
        notify(&mut self.listeners, &event, |l, e| l.end_session(e));
        self.exit(Level::Session);
    }

    fn enter(&mut self, level: Level) {
        let parent = self.stack.last().copied();
        let allowed = match level {
            Level::Session => parent.is_none(),
            Level::Group => matches!(parent, None | Some(Level::Session) | Some(Level::File)),
            Level::File => matches!(parent, None | Some(Level::Group)),
            Level::Classfile => parent == Some(Level::File),
        };
        debug_assert!(allowed, "cannot begin {level:?} inside {parent:?}");
        self.stack.push(level);
    }

    fn exit(&mut self, level: Level) {
        let top = self.stack.pop();
        debug_assert_eq!(top, Some(level), "unbalanced end of {level:?}");
    }
}

fn file_event<'a>(
    groups: &'a [(String, Option<usize>)],
    name: &'a str,
    classfile: Option<&'a Arc<ClassFile>>,
) -> LoadEvent<'a> {
    let group = groups.last();
    LoadEvent {
        group: group.map(|(g, _)| g.as_str()),
        size: group.and_then(|(_, size)| *size),
        filename: Some(name),
        classfile,
    }
}

fn notify(
    listeners: &mut Listeners,
    event: &LoadEvent<'_>,
    deliver: fn(&mut dyn LoadListener, &LoadEvent<'_>),
) {
    for (_, listener) in listeners.iter_mut() {
        deliver(listener.as_mut(), event);
    }
}

/// An event as seen by [`EventLog`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recorded {
    BeginSession(Option<usize>),
    BeginGroup(String, Option<usize>),
    BeginFile(String),
    BeginClassfile(String),
    /// File name and, on success, the decoded class name.
    EndClassfile(String, Option<String>),
    EndFile(String),
    EndGroup(String),
    EndSession,
}

/// Listener that records every event. Clones share the same log, so one
/// handle can be registered while another is inspected.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<Recorded>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Recorded> {
        self.lock().clone()
    }

    pub fn count(&self, predicate: impl Fn(&Recorded) -> bool) -> usize {
        self.lock().iter().filter(|e| predicate(e)).count()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn push(&self, event: Recorded) {
        self.lock().push(event);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Recorded>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn filename(event: &LoadEvent<'_>) -> String {
    event.filename.unwrap_or_default().to_string()
}

impl LoadListener for EventLog {
    fn begin_session(&mut self, event: &LoadEvent<'_>) {
        self.push(Recorded::BeginSession(event.size));
    }

    fn begin_group(&mut self, event: &LoadEvent<'_>) {
        let name = event.group.unwrap_or_default().to_string();
        self.push(Recorded::BeginGroup(name, event.size));
    }

    fn begin_file(&mut self, event: &LoadEvent<'_>) {
        self.push(Recorded::BeginFile(filename(event)));
    }

    fn begin_classfile(&mut self, event: &LoadEvent<'_>) {
        self.push(Recorded::BeginClassfile(filename(event)));
    }

    fn end_classfile(&mut self, event: &LoadEvent<'_>) {
        let class = event.classfile.map(|c| c.class_name().to_string());
        self.push(Recorded::EndClassfile(filename(event), class));
    }

    fn end_file(&mut self, event: &LoadEvent<'_>) {
        self.push(Recorded::EndFile(filename(event)));
    }

    fn end_group(&mut self, event: &LoadEvent<'_>) {
        self.push(Recorded::EndGroup(event.group.unwrap_or_default().to_string()));
    }

    fn end_session(&mut self, _event: &LoadEvent<'_>) {
        self.push(Recorded::EndSession);
    }
}
