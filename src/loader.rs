use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use rayon::prelude::*;
use serde::Serialize;

use crate::classfile::ClassFile;
use crate::config::LoaderConfig;
use crate::dispatch::{Action, Dispatcher};
use crate::error::DecodeResult;
use crate::event::{EventSource, ListenerId, LoadListener};
use crate::registry::{ClassRegistry, RegistryHandle};
use crate::source::{ArchiveSource, DirectorySource, RawStream, SingleSource, Source};

/// Counters for one `load` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadSummary {
    pub groups: usize,
    pub files: usize,
    pub attempted: usize,
    pub decoded: usize,
    pub failed: usize,
    pub failed_groups: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Plan {
    Skip,
    Decode,
    Nested,
}

pub struct ClassfileLoader {
    config: LoaderConfig,
    dispatcher: Box<dyn Dispatcher>,
    events: EventSource,
    registry: Option<ClassRegistry>,
    summary: LoadSummary,
}

impl ClassfileLoader {
    /// A loader that hands descriptors to listeners and keeps nothing.
    pub fn transient(config: LoaderConfig) -> Self {
        Self {
            dispatcher: config.tolerance.dispatcher(),
            config,
            events: EventSource::new(),
            registry: None,
            summary: LoadSummary::default(),
        }
    }

    /// A loader that also keeps every decoded class in a [`ClassRegistry`],
    /// so descriptors can resolve their superclass and interfaces.
    pub fn aggregating(config: LoaderConfig) -> Self {
        Self {
            registry: Some(ClassRegistry::new()),
            ..Self::transient(config)
        }
    }

    pub fn with_dispatcher(mut self, dispatcher: impl Dispatcher + 'static) -> Self {
        self.dispatcher = Box::new(dispatcher);
        self
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    pub fn add_listener(&mut self, listener: impl LoadListener + 'static) -> ListenerId {
        self.events.add_listener(listener)
    }

    pub fn remove_listener(&mut self, id: ListenerId) -> Option<Box<dyn LoadListener>> {
        self.events.remove_listener(id)
    }

    pub fn registry(&self) -> Option<&ClassRegistry> {
        self.registry.as_ref()
    }

    pub fn classfile(&self, class_name: &str) -> Option<Arc<ClassFile>> {
        self.registry.as_ref()?.get(class_name)
    }

    /// Loads every path as one session. Each path becomes a group, except
    /// paths the dispatcher ignores.
    pub fn load<P: AsRef<Path>>(&mut self, paths: &[P]) -> LoadSummary {
        self.summary = LoadSummary::default();
        self.events.fire_begin_session(Some(paths.len()));
        for path in paths {
            self.load_path(path.as_ref());
        }
        self.events.fire_end_session();
        self.summary
    }

    /// Loads one class-file stream with file and class-file events only.
    /// Returns the descriptor when the stream decoded.
    pub fn load_stream(
        &mut self,
        name: &str,
        mut reader: impl Read,
    ) -> Result<Option<Arc<ClassFile>>> {
        let mut bytes = Vec::new();
        reader
            .read_to_end(&mut bytes)
            .with_context(|| format!("Failed to read stream {name}"))?;
        let stream = RawStream::new(name, bytes);
        let plan = self.plan(&stream);
        Ok(self.emit_entry(stream, plan, None))
    }

    fn load_path(&mut self, path: &Path) {
        let name = path.display().to_string();
        let action = self.dispatcher.dispatch(&name, path.is_dir());
        tracing::debug!(path = %name, ?action, "dispatch");
        let opened: Result<Box<dyn Source>> = match action {
            Action::Ignore => return,
            Action::Class => SingleSource::open(path).map(|s| Box::new(s) as Box<dyn Source>),
            Action::Directory => DirectorySource::open(path, &self.config.directory_suffixes)
                .map(|s| Box::new(s) as Box<dyn Source>),
            Action::Zip | Action::Jar => ArchiveSource::open(path, self.config.target_release)
                .map(|s| Box::new(s) as Box<dyn Source>),
        };
        match opened {
            Ok(mut source) => self.run_group(source.as_mut()),
            Err(err) => {
                tracing::warn!(path = %name, error = %format!("{err:#}"), "failed to open container");
                self.summary.failed_groups += 1;
            }
        }
    }

    fn run_group(&mut self, source: &mut dyn Source) {
        self.summary.groups += 1;
        self.events
            .fire_begin_group(source.name(), source.declared_len());

        if self.config.parallel_decode {
            let planned: Vec<(RawStream, Plan)> = source
                .filter_map(|entry| {
                    let stream = readable(entry)?;
                    let plan = self.plan(&stream);
                    Some((stream, plan))
                })
                .collect();
            let handle = self.registry_handle();
            let decoded: Vec<Option<DecodeResult<ClassFile>>> = planned
                .par_iter()
                .map(|(stream, plan)| {
                    (*plan == Plan::Decode)
                        .then(|| ClassFile::decode_in(&stream.bytes, handle.clone()))
                })
                .collect();
            for ((stream, plan), result) in planned.into_iter().zip(decoded) {
                self.emit_entry(stream, plan, result);
            }
        } else {
            while let Some(entry) = source.next() {
                if let Some(stream) = readable(entry) {
                    let plan = self.plan(&stream);
                    self.emit_entry(stream, plan, None);
                }
            }
        }

        self.events.fire_end_group();
    }

    fn plan(&mut self, stream: &RawStream) -> Plan {
        let action = self.dispatcher.dispatch(&stream.name, stream.is_dir);
        let plan = match action {
            Action::Zip | Action::Jar => Plan::Nested,
            Action::Class if stream.shadowed => Plan::Skip,
            Action::Class if self.dispatcher.admit(stream) => Plan::Decode,
            _ => Plan::Skip,
        };
        tracing::debug!(entry = %stream.name, ?action, ?plan, "dispatch");
        plan
    }

    /// Fires the file events for one entry and whatever happens inside them.
    fn emit_entry(
        &mut self,
        stream: RawStream,
        plan: Plan,
        decoded: Option<DecodeResult<ClassFile>>,
    ) -> Option<Arc<ClassFile>> {
        self.summary.files += 1;
        self.events.fire_begin_file(&stream.name);
        let mut result = None;

        match plan {
            Plan::Skip => {}
            Plan::Decode => {
                self.summary.attempted += 1;
                self.events.fire_begin_classfile(&stream.name);
                let decoded = decoded
                    .unwrap_or_else(|| ClassFile::decode_in(&stream.bytes, self.registry_handle()));
                match decoded {
                    Ok(classfile) => {
                        let classfile = Arc::new(classfile);
                        if classfile.is_partial() {
                            tracing::debug!(entry = %stream.name, class = classfile.class_name(), "decoded with damaged attributes");
                        }
                        if let Some(registry) = &self.registry {
                            registry.insert(Arc::clone(&classfile));
                        }
                        self.summary.decoded += 1;
                        self.events
                            .fire_end_classfile(&stream.name, Some(&classfile));
                        result = Some(classfile);
                    }
                    Err(err) => {
                        tracing::warn!(entry = %stream.name, error = %err, "failed to decode class file");
                        self.summary.failed += 1;
                        self.events.fire_end_classfile(&stream.name, None);
                    }
                }
            }
            Plan::Nested => {
                let name = stream.name.clone();
                match ArchiveSource::from_bytes(&name, stream.bytes, self.config.target_release) {
                    Ok(mut nested) => self.run_group(&mut nested),
                    Err(err) => {
                        tracing::warn!(entry = %name, error = %format!("{err:#}"), "failed to open nested archive");
                        self.summary.failed_groups += 1;
                    }
                }
                self.events.fire_end_file(&name);
                return None;
            }
        }

        self.events.fire_end_file(&stream.name);
        result
    }

    fn registry_handle(&self) -> RegistryHandle {
        self.registry
            .as_ref()
            .map(ClassRegistry::handle)
            .unwrap_or_default()
    }
}

fn readable(entry: Result<RawStream>) -> Option<RawStream> {
    match entry {
        Ok(stream) => Some(stream),
        Err(err) => {
            tracing::warn!(error = %format!("{err:#}"), "skipping unreadable entry");
            None
        }
    }
}
