use std::collections::HashSet;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ignore::WalkBuilder;
use memmap2::Mmap;
use zip::ZipArchive;

use crate::dispatch::has_suffix;
use crate::multi_release;

/// One entry read out of a container.
#[derive(Debug, Clone, Default)]
pub struct RawStream {
    pub name: String,
    pub bytes: Vec<u8>,
    /// Zip directory entries carry no content but still count as files.
    pub is_dir: bool,
    /// Overridden by another entry of a multi-release JAR; never decoded.
    pub shadowed: bool,
}

impl RawStream {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
            ..Self::default()
        }
    }
}

/// Raw entries of one group, in a deterministic order.
pub trait Source: Iterator<Item = Result<RawStream>> {
    /// Group name reported in load events.
    fn name(&self) -> &str;

    /// Number of entries, including ones that will fail to read.
    fn declared_len(&self) -> Option<usize>;
}

/// A single class-file stream, treated as a group of one.
pub struct SingleSource {
    name: String,
    stream: Option<RawStream>,
}

impl SingleSource {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let name = name.into();
        Self {
            stream: Some(RawStream::new(name.clone(), bytes)),
            name,
        }
    }

    pub fn open(path: &Path) -> Result<Self> {
        let bytes =
            std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        Ok(Self::new(path.display().to_string(), bytes))
    }
}

impl Iterator for SingleSource {
    type Item = Result<RawStream>;

    fn next(&mut self) -> Option<Self::Item> {
        self.stream.take().map(Ok)
    }
}

impl Source for SingleSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn declared_len(&self) -> Option<usize> {
        Some(1)
    }
}

/// Every regular file under a directory, sorted by path. Paths are
/// collected when the source opens; contents are read one entry at a time.
pub struct DirectorySource {
    name: String,
    paths: std::vec::IntoIter<PathBuf>,
    len: usize,
}

impl DirectorySource {
    /// `suffixes` restricts which files are listed; empty accepts all.
    pub fn open(root: &Path, suffixes: &[String]) -> Result<Self> {
        let metadata = std::fs::metadata(root)
            .with_context(|| format!("Failed to stat directory {}", root.display()))?;
        anyhow::ensure!(metadata.is_dir(), "Not a directory: {}", root.display());

        let walker = WalkBuilder::new(root)
            .hidden(false)
            .ignore(false)
            .parents(false)
            .git_ignore(false)
            .git_global(false)
            .git_exclude(false)
            .sort_by_file_name(|a, b| a.cmp(b))
            .build();

        let mut paths = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    tracing::warn!(root = %root.display(), error = %err, "skipping unreadable directory entry");
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }
            let file_name = entry.file_name().to_string_lossy();
            if suffixes.is_empty() || suffixes.iter().any(|s| has_suffix(&file_name, s)) {
                paths.push(entry.into_path());
            }
        }

        Ok(Self {
            name: root.display().to_string(),
            len: paths.len(),
            paths: paths.into_iter(),
        })
    }
}

impl Iterator for DirectorySource {
    type Item = Result<RawStream>;

    fn next(&mut self) -> Option<Self::Item> {
        let path = self.paths.next()?;
        Some(
            std::fs::read(&path)
                .with_context(|| format!("Failed to read {}", path.display()))
                .map(|bytes| RawStream::new(path.display().to_string(), bytes)),
        )
    }
}

impl Source for DirectorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn declared_len(&self) -> Option<usize> {
        Some(self.len)
    }
}

/// Entries of a zip or JAR, in central-directory order. `B` is a memory map
/// for archives on disk and an owned buffer for archives nested in another
/// archive.
pub struct ArchiveSource<B: AsRef<[u8]>> {
    name: String,
    archive: ZipArchive<Cursor<B>>,
    next: usize,
    shadowed: HashSet<usize>,
}

impl ArchiveSource<Mmap> {
    pub fn open(path: &Path, target_release: Option<u16>) -> Result<Self> {
        let file =
            File::open(path).with_context(|| format!("Failed to open archive {}", path.display()))?;
        let mmap = unsafe {
            Mmap::map(&file).with_context(|| format!("Failed to mmap {}", path.display()))?
        };
        Self::new(path.display().to_string(), mmap, target_release)
    }
}

impl ArchiveSource<Vec<u8>> {
    pub fn from_bytes(
        name: impl Into<String>,
        bytes: Vec<u8>,
        target_release: Option<u16>,
    ) -> Result<Self> {
        Self::new(name.into(), bytes, target_release)
    }
}

impl<B: AsRef<[u8]>> ArchiveSource<B> {
    fn new(name: String, bytes: B, target_release: Option<u16>) -> Result<Self> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))
            .with_context(|| format!("Failed to read zip structure: {name}"))?;
        let shadowed = multi_release_shadowing(&mut archive, target_release)
            .with_context(|| format!("Failed to read multi-release layout: {name}"))?;
        if !shadowed.is_empty() {
            tracing::debug!(archive = %name, shadowed = shadowed.len(), ?target_release, "multi-release jar");
        }
        Ok(Self {
            name,
            archive,
            next: 0,
            shadowed,
        })
    }
}

fn multi_release_shadowing<B: AsRef<[u8]>>(
    archive: &mut ZipArchive<Cursor<B>>,
    target_release: Option<u16>,
) -> Result<HashSet<usize>> {
    let manifest = match archive.by_name(multi_release::MANIFEST_PATH) {
        Ok(mut file) => {
            let mut buf = Vec::new();
            file.read_to_end(&mut buf)?;
            buf
        }
        Err(zip::result::ZipError::FileNotFound) => return Ok(HashSet::new()),
        Err(err) => return Err(err.into()),
    };
    if !multi_release::is_multi_release(&manifest) {
        return Ok(HashSet::new());
    }

    let mut names = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        names.push(archive.by_index(i)?.name().to_string());
    }
    Ok(multi_release::shadowed_entries(
        names.iter().enumerate().map(|(i, n)| (i, n.as_str())),
        target_release,
    ))
}

impl<B: AsRef<[u8]>> Iterator for ArchiveSource<B> {
    type Item = Result<RawStream>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.archive.len() {
            return None;
        }
        let index = self.next;
        self.next += 1;

        let shadowed = self.shadowed.contains(&index);
        let entry = self
            .archive
            .by_index(index)
            .with_context(|| format!("Failed to open entry #{index} of {}", self.name))
            .and_then(|mut file| {
                let name = file.name().to_string();
                let is_dir = file.is_dir();
                let mut bytes = Vec::with_capacity(file.size().min(1 << 24) as usize);
                file.read_to_end(&mut bytes)
                    .with_context(|| format!("Failed to inflate {name} in {}", self.name))?;
                Ok(RawStream {
                    name,
                    bytes,
                    is_dir,
                    shadowed,
                })
            });
        Some(entry)
    }
}

impl<B: AsRef<[u8]>> Source for ArchiveSource<B> {
    fn name(&self) -> &str {
        &self.name
    }

    fn declared_len(&self) -> Option<usize> {
        Some(self.archive.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MULTI_RELEASE_MANIFEST, jar_bytes, temp_path, write_jar};

    #[test]
    fn archive_yields_every_entry_in_order() -> Result<()> {
        let bytes = jar_bytes(&[("a/", b""), ("a/A.class", b"xx"), ("README", b"hi")])?;
        let source = ArchiveSource::from_bytes("t.jar", bytes, None)?;
        assert_eq!(source.declared_len(), Some(3));
        let entries: Vec<RawStream> = source.collect::<Result<_>>()?;
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["a/", "a/A.class", "README"]);
        assert!(entries[0].is_dir);
        assert_eq!(entries[2].bytes, b"hi");
        assert!(entries.iter().all(|e| !e.shadowed));
        Ok(())
    }

    #[test]
    fn multi_release_marks_losers() -> Result<()> {
        let jar = temp_path("mr.jar");
        write_jar(
            &jar,
            &[
                ("META-INF/MANIFEST.MF", MULTI_RELEASE_MANIFEST),
                ("a/A.class", b"base"),
                ("META-INF/versions/11/a/A.class", b"11"),
            ],
        )?;
        let entries: Vec<RawStream> = ArchiveSource::open(&jar, Some(17))?.collect::<Result<_>>()?;
        let live: Vec<_> = entries
            .iter()
            .filter(|e| !e.shadowed)
            .map(|e| e.name.as_str())
            .collect();
        assert_eq!(live, ["META-INF/MANIFEST.MF", "META-INF/versions/11/a/A.class"]);

        let _ = std::fs::remove_file(&jar);
        Ok(())
    }

    #[test]
    fn directory_lists_sorted_files_with_suffix_filter() -> Result<()> {
        let root = temp_path("dir");
        std::fs::create_dir_all(root.join("b"))?;
        std::fs::write(root.join("b/B.class"), b"b")?;
        std::fs::write(root.join("A.class"), b"a")?;
        std::fs::write(root.join("notes.txt"), b"n")?;

        let all = DirectorySource::open(&root, &[])?;
        assert_eq!(all.declared_len(), Some(3));

        let classes = DirectorySource::open(&root, &[".class".to_string()])?;
        assert_eq!(classes.declared_len(), Some(2));
        let names: Vec<String> = classes
            .map(|e| e.map(|e| e.name))
            .collect::<Result<_>>()?;
        assert!(names[0].ends_with("A.class"));
        assert!(names[1].ends_with("B.class"));

        std::fs::write(root.join("Upper.CLASS"), b"u")?;
        let classes = DirectorySource::open(&root, &[".class".to_string()])?;
        assert_eq!(classes.declared_len(), Some(3));

        assert!(DirectorySource::open(&root.join("missing"), &[]).is_err());
        let _ = std::fs::remove_dir_all(&root);
        Ok(())
    }
}
