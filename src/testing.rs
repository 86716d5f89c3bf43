#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

pub const ACC_PUBLIC: u16 = 0x0001;
pub const ACC_PRIVATE: u16 = 0x0002;
pub const ACC_PROTECTED: u16 = 0x0004;
pub const ACC_STATIC: u16 = 0x0008;
pub const ACC_SUPER: u16 = 0x0020;
pub const ACC_INTERFACE: u16 = 0x0200;
pub const ACC_ABSTRACT: u16 = 0x0400;

pub const MULTI_RELEASE_MANIFEST: &[u8] =
    b"Manifest-Version: 1.0\r\nCreated-By: test\r\nMulti-Release: true\r\n\r\n";

/// Builds a class file byte by byte. Pool entries are interned in the order
/// they are requested, so two builders can lay out the same symbols
/// differently.
pub struct ClassBuilder {
    pool: Vec<u8>,
    next_index: u16,
    interned: HashMap<Vec<u8>, u16>,
    major: u16,
    access: u16,
    this_class: u16,
    super_class: u16,
    interfaces: Vec<u16>,
    fields: Vec<Vec<u8>>,
    methods: Vec<Vec<u8>>,
    attributes: Vec<Vec<u8>>,
}

impl ClassBuilder {
    /// `name` is an internal name such as `a/b/C`; the superclass is
    /// `java/lang/Object`.
    pub fn new(name: &str) -> Self {
        Self::empty().named(name).extends("java/lang/Object")
    }

    pub fn empty() -> Self {
        Self {
            pool: Vec::new(),
            next_index: 1,
            interned: HashMap::new(),
            major: 52,
            access: ACC_PUBLIC | ACC_SUPER,
            this_class: 0,
            super_class: 0,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            attributes: Vec::new(),
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.this_class = self.class(name);
        self
    }

    pub fn extends(mut self, name: &str) -> Self {
        self.super_class = self.class(name);
        self
    }

    pub fn without_superclass(mut self) -> Self {
        self.super_class = 0;
        self
    }

    pub fn implements(mut self, name: &str) -> Self {
        let index = self.class(name);
        self.interfaces.push(index);
        self
    }

    pub fn version(mut self, major: u16) -> Self {
        self.major = major;
        self
    }

    pub fn access(mut self, flags: u16) -> Self {
        self.access = flags;
        self
    }

    pub fn utf8(&mut self, value: &str) -> u16 {
        let mut entry = vec![1];
        entry.extend((value.len() as u16).to_be_bytes());
        entry.extend(value.as_bytes());
        self.intern(entry, false)
    }

    pub fn class(&mut self, name: &str) -> u16 {
        let name_index = self.utf8(name);
        self.intern(tagged(7, &[name_index]), false)
    }

    pub fn string(&mut self, value: &str) -> u16 {
        let index = self.utf8(value);
        self.intern(tagged(8, &[index]), false)
    }

    pub fn integer(&mut self, value: i32) -> u16 {
        let mut entry = vec![3];
        entry.extend(value.to_be_bytes());
        self.intern(entry, false)
    }

    pub fn long(&mut self, value: i64) -> u16 {
        let mut entry = vec![5];
        entry.extend(value.to_be_bytes());
        self.intern(entry, true)
    }

    pub fn name_and_type(&mut self, name: &str, descriptor: &str) -> u16 {
        let name_index = self.utf8(name);
        let descriptor_index = self.utf8(descriptor);
        self.intern(tagged(12, &[name_index, descriptor_index]), false)
    }

    pub fn field_ref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        let class_index = self.class(class);
        let nat = self.name_and_type(name, descriptor);
        self.intern(tagged(9, &[class_index, nat]), false)
    }

    pub fn method_ref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        let class_index = self.class(class);
        let nat = self.name_and_type(name, descriptor);
        self.intern(tagged(10, &[class_index, nat]), false)
    }

    /// Appends an arbitrary pool entry, tag byte included.
    pub fn raw_entry(&mut self, entry: &[u8], wide: bool) -> u16 {
        self.intern(entry.to_vec(), wide)
    }

    pub fn field(mut self, access: u16, name: &str, descriptor: &str) -> Self {
        let member = self.member(access, name, descriptor, Vec::new());
        self.fields.push(member);
        self
    }

    pub fn field_with_attribute(
        mut self,
        access: u16,
        name: &str,
        descriptor: &str,
        attribute: &str,
        body: &[u8],
    ) -> Self {
        let attribute = self.attribute_bytes(attribute, body);
        let member = self.member(access, name, descriptor, vec![attribute]);
        self.fields.push(member);
        self
    }

    /// Adds a method whose `Code` attribute holds `code`.
    pub fn method(mut self, access: u16, name: &str, descriptor: &str, code: &[u8]) -> Self {
        let mut body = Vec::new();
        body.extend(8u16.to_be_bytes());
        body.extend(8u16.to_be_bytes());
        body.extend((code.len() as u32).to_be_bytes());
        body.extend(code);
        body.extend(0u16.to_be_bytes());
        body.extend(0u16.to_be_bytes());
        let attribute = self.attribute_bytes("Code", &body);
        let member = self.member(access, name, descriptor, vec![attribute]);
        self.methods.push(member);
        self
    }

    pub fn abstract_method(mut self, access: u16, name: &str, descriptor: &str) -> Self {
        let member = self.member(access | ACC_ABSTRACT, name, descriptor, Vec::new());
        self.methods.push(member);
        self
    }

    pub fn method_with_attribute(
        mut self,
        access: u16,
        name: &str,
        descriptor: &str,
        attribute: &str,
        body: &[u8],
    ) -> Self {
        let attribute = self.attribute_bytes(attribute, body);
        let member = self.member(access, name, descriptor, vec![attribute]);
        self.methods.push(member);
        self
    }

    /// Adds a class-level attribute.
    pub fn attribute(mut self, name: &str, body: &[u8]) -> Self {
        let attribute = self.attribute_bytes(name, body);
        self.attributes.push(attribute);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend(0xCAFEBABEu32.to_be_bytes());
        out.extend(0u16.to_be_bytes());
        out.extend(self.major.to_be_bytes());
        out.extend(self.next_index.to_be_bytes());
        out.extend(&self.pool);
        out.extend(self.access.to_be_bytes());
        out.extend(self.this_class.to_be_bytes());
        out.extend(self.super_class.to_be_bytes());
        out.extend((self.interfaces.len() as u16).to_be_bytes());
        for interface in &self.interfaces {
            out.extend(interface.to_be_bytes());
        }
        for table in [&self.fields, &self.methods, &self.attributes] {
            out.extend((table.len() as u16).to_be_bytes());
            for item in table {
                out.extend(item);
            }
        }
        out
    }

    fn intern(&mut self, entry: Vec<u8>, wide: bool) -> u16 {
        if let Some(&index) = self.interned.get(&entry) {
            return index;
        }
        let index = self.next_index;
        self.pool.extend(&entry);
        self.next_index += if wide { 2 } else { 1 };
        self.interned.insert(entry, index);
        index
    }

    fn member(
        &mut self,
        access: u16,
        name: &str,
        descriptor: &str,
        attributes: Vec<Vec<u8>>,
    ) -> Vec<u8> {
        let name_index = self.utf8(name);
        let descriptor_index = self.utf8(descriptor);
        let mut out = Vec::new();
        out.extend(access.to_be_bytes());
        out.extend(name_index.to_be_bytes());
        out.extend(descriptor_index.to_be_bytes());
        out.extend((attributes.len() as u16).to_be_bytes());
        for attribute in attributes {
            out.extend(attribute);
        }
        out
    }

    fn attribute_bytes(&mut self, name: &str, body: &[u8]) -> Vec<u8> {
        let name_index = self.utf8(name);
        let mut out = Vec::new();
        out.extend(name_index.to_be_bytes());
        out.extend((body.len() as u32).to_be_bytes());
        out.extend(body);
        out
    }
}

fn tagged(tag: u8, indices: &[u16]) -> Vec<u8> {
    let mut entry = vec![tag];
    for index in indices {
        entry.extend(index.to_be_bytes());
    }
    entry
}

/// A minimal public class with a default constructor.
pub fn simple_class(name: &str) -> Vec<u8> {
    let mut builder = ClassBuilder::new(name);
    let init = builder.method_ref("java/lang/Object", "<init>", "()V");
    let [hi, lo] = init.to_be_bytes();
    builder
        .method(ACC_PUBLIC, "<init>", "()V", &[0x2A, 0xB7, hi, lo, 0xB1])
        .build()
}

/// A class whose only annotation holds an `int` wrapped in `depth` nested
/// arrays.
pub fn nested_annotation_class(name: &str, depth: usize) -> Vec<u8> {
    let mut builder = ClassBuilder::new(name);
    let type_index = builder.utf8("Lp/Marker;");
    let element_name = builder.utf8("value");
    let value = builder.integer(7);

    let mut body = vec![0x00, 0x01];
    body.extend(type_index.to_be_bytes());
    body.extend([0x00, 0x01]);
    body.extend(element_name.to_be_bytes());
    for _ in 0..depth {
        body.extend([b'[', 0x00, 0x01]);
    }
    body.push(b'I');
    body.extend(value.to_be_bytes());
    builder.attribute("RuntimeVisibleAnnotations", &body).build()
}

pub fn temp_path(name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!(
        "jarscope_test_{}_{}_{}",
        std::process::id(),
        nanos,
        name
    ))
}

/// Zips `entries` in order. Names ending in `/` become directory entries.
pub fn jar_bytes(entries: &[(&str, &[u8])]) -> anyhow::Result<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    for (name, bytes) in entries {
        if name.ends_with('/') {
            writer.add_directory(*name, options)?;
        } else {
            writer.start_file(*name, options)?;
            writer.write_all(bytes)?;
        }
    }
    Ok(writer.finish()?.into_inner())
}

pub fn write_jar(path: &Path, entries: &[(&str, &[u8])]) -> anyhow::Result<()> {
    std::fs::write(path, jar_bytes(entries)?)?;
    Ok(())
}
