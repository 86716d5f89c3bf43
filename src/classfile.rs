//! The decoded class descriptor.
//!
//! [`ClassFile::decode`] reads one unit from bytes. Structural damage (bad
//! magic, unsupported version, a broken pool, truncation, unresolvable names)
//! fails the whole unit. A damaged attribute body only marks the owning
//! class, field or method as partial and keeps the raw bytes.

use std::collections::HashSet;
use std::sync::Arc;

use crate::attribute::{self, Attribute, Code};
use crate::constant_pool::ConstantPool;
use crate::error::{DecodeError, DecodeResult};
use crate::reader::ByteReader;
use crate::registry::RegistryHandle;

pub const MAGIC: u32 = 0xCAFE_BABE;
pub const MIN_MAJOR_VERSION: u16 = 45;
/// Java 25.
pub const MAX_MAJOR_VERSION: u16 = 69;

pub mod access {
    pub const PUBLIC: u16 = 0x0001;
    pub const PRIVATE: u16 = 0x0002;
    pub const PROTECTED: u16 = 0x0004;
    pub const STATIC: u16 = 0x0008;
    pub const FINAL: u16 = 0x0010;
    pub const SUPER: u16 = 0x0020;
    pub const SYNCHRONIZED: u16 = 0x0020;
    pub const VOLATILE: u16 = 0x0040;
    pub const BRIDGE: u16 = 0x0040;
    pub const TRANSIENT: u16 = 0x0080;
    pub const VARARGS: u16 = 0x0080;
    pub const NATIVE: u16 = 0x0100;
    pub const INTERFACE: u16 = 0x0200;
    pub const ABSTRACT: u16 = 0x0400;
    pub const STRICT: u16 = 0x0800;
    pub const SYNTHETIC: u16 = 0x1000;
    pub const ANNOTATION: u16 = 0x2000;
    pub const ENUM: u16 = 0x4000;
    pub const MODULE: u16 = 0x8000;
}

#[derive(Debug, Clone)]
pub struct ClassFile {
    pub minor_version: u16,
    pub major_version: u16,
    pub access_flags: u16,
    pub this_class: u16,
    /// Zero only for `java.lang.Object` and module descriptors.
    pub super_class: u16,
    pub interfaces: Vec<u16>,
    pub fields: Vec<Field>,
    pub methods: Vec<Method>,
    pub attributes: Vec<Attribute>,
    constant_pool: Arc<ConstantPool>,
    class_name: String,
    issues: Vec<DecodeError>,
    registry: RegistryHandle,
}

#[derive(Debug, Clone)]
pub struct Field {
    pub access_flags: u16,
    pub name: String,
    pub descriptor: String,
    pub attributes: Vec<Attribute>,
    pub issues: Vec<DecodeError>,
}

#[derive(Debug, Clone)]
pub struct Method {
    pub access_flags: u16,
    pub name: String,
    pub descriptor: String,
    pub attributes: Vec<Attribute>,
    pub issues: Vec<DecodeError>,
}

/// Common view of fields and methods for hierarchy lookups.
pub trait Member: Clone {
    fn access_flags(&self) -> u16;
    fn name(&self) -> &str;
    fn descriptor(&self) -> &str;
}

/// A member found by [`ClassFile::locate_field`] or
/// [`ClassFile::locate_method`], with the class that declares it.
#[derive(Debug, Clone)]
pub struct Located<M> {
    pub owner: String,
    pub member: M,
}

impl ClassFile {
    pub fn decode(bytes: &[u8]) -> DecodeResult<Self> {
        Self::decode_in(bytes, RegistryHandle::default())
    }

    pub(crate) fn decode_in(bytes: &[u8], registry: RegistryHandle) -> DecodeResult<Self> {
        let mut r = ByteReader::new(bytes);

        let magic = r.u32()?;
        if magic != MAGIC {
            return Err(DecodeError::BadMagic { found: magic });
        }
        let minor_version = r.u16()?;
        let major_version = r.u16()?;
        if !(MIN_MAJOR_VERSION..=MAX_MAJOR_VERSION).contains(&major_version) {
            return Err(DecodeError::UnsupportedVersion {
                major: major_version,
                minor: minor_version,
            });
        }

        let constant_pool = Arc::new(ConstantPool::read(&mut r)?);
        let access_flags = r.u16()?;
        let this_class = r.u16()?;
        let class_name = constant_pool.class_name(this_class)?.replace('/', ".");
        let super_class = r.u16()?;
        if super_class != 0 {
            constant_pool.class_name(super_class)?;
        }
        let interfaces = r.list(|r| r.u16())?;
        for &interface in &interfaces {
            constant_pool.class_name(interface)?;
        }

        let fields = r.list(|r| {
            let (access_flags, name, descriptor, attributes, issues) =
                read_member(r, &constant_pool)?;
            Ok(Field {
                access_flags,
                name,
                descriptor,
                attributes,
                issues,
            })
        })?;
        let methods = r.list(|r| {
            let (access_flags, name, descriptor, attributes, issues) =
                read_member(r, &constant_pool)?;
            Ok(Method {
                access_flags,
                name,
                descriptor,
                attributes,
                issues,
            })
        })?;

        let mut issues = Vec::new();
        let attributes = attribute::read_attributes(&mut r, &constant_pool, &mut issues)?;
        if !r.is_empty() {
            tracing::debug!(class = %class_name, trailing = r.remaining(), "ignoring trailing bytes");
        }

        Ok(Self {
            minor_version,
            major_version,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
            constant_pool,
            class_name,
            issues,
            registry,
        })
    }

    pub fn constant_pool(&self) -> &ConstantPool {
        &self.constant_pool
    }

    /// Dotted name, e.g. `java.lang.String`.
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Slash-separated name as stored in the pool.
    pub fn internal_name(&self) -> String {
        self.class_name.replace('.', "/")
    }

    pub fn simple_name(&self) -> &str {
        self.class_name
            .rsplit_once('.')
            .map_or(self.class_name.as_str(), |(_, simple)| simple)
    }

    /// Empty for the unnamed package.
    pub fn package_name(&self) -> &str {
        self.class_name
            .rsplit_once('.')
            .map_or("", |(package, _)| package)
    }

    pub fn superclass_name(&self) -> Option<String> {
        if self.super_class == 0 {
            return None;
        }
        self.constant_pool
            .class_name(self.super_class)
            .ok()
            .map(|name| name.replace('/', "."))
    }

    pub fn interface_names(&self) -> Vec<String> {
        self.interfaces
            .iter()
            .filter_map(|&index| self.constant_pool.class_name(index).ok())
            .map(|name| name.replace('/', "."))
            .collect()
    }

    pub fn is_public(&self) -> bool {
        self.access_flags & access::PUBLIC != 0
    }

    pub fn is_final(&self) -> bool {
        self.access_flags & access::FINAL != 0
    }

    pub fn is_interface(&self) -> bool {
        self.access_flags & access::INTERFACE != 0
    }

    pub fn is_abstract(&self) -> bool {
        self.access_flags & access::ABSTRACT != 0
    }

    pub fn is_annotation(&self) -> bool {
        self.access_flags & access::ANNOTATION != 0
    }

    pub fn is_enum(&self) -> bool {
        self.access_flags & access::ENUM != 0
    }

    pub fn is_module(&self) -> bool {
        self.access_flags & access::MODULE != 0
    }

    pub fn is_synthetic(&self) -> bool {
        self.access_flags & access::SYNTHETIC != 0
            || self.attributes.iter().any(|a| matches!(a, Attribute::Synthetic))
    }

    pub fn is_deprecated(&self) -> bool {
        self.attributes.iter().any(|a| matches!(a, Attribute::Deprecated))
    }

    pub fn is_record(&self) -> bool {
        self.attributes.iter().any(|a| matches!(a, Attribute::Record(_)))
    }

    pub fn source_file(&self) -> Option<&str> {
        self.attributes.iter().find_map(|a| match a {
            Attribute::SourceFile { sourcefile_index } => {
                self.constant_pool.utf8(*sourcefile_index).ok()
            }
            _ => None,
        })
    }

    pub fn signature(&self) -> Option<&str> {
        signature(&self.attributes, &self.constant_pool)
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// All overloads named `name`.
    pub fn methods_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Method> {
        self.methods.iter().filter(move |m| m.name == name)
    }

    pub fn method(&self, name: &str, descriptor: &str) -> Option<&Method> {
        self.methods
            .iter()
            .find(|m| m.name == name && m.descriptor == descriptor)
    }

    /// Problems that were tolerated while decoding class-level attributes.
    pub fn issues(&self) -> &[DecodeError] {
        &self.issues
    }

    /// True when any attribute of the class or one of its members could not
    /// be decoded and was kept as opaque bytes.
    pub fn is_partial(&self) -> bool {
        !self.issues.is_empty()
            || self.fields.iter().any(|f| !f.issues.is_empty())
            || self.methods.iter().any(|m| !m.issues.is_empty())
    }

    /// The superclass descriptor, when this class was decoded by an
    /// aggregating loader that has also seen the superclass.
    pub fn superclass(&self) -> Option<Arc<ClassFile>> {
        self.registry.lookup(&self.superclass_name()?)
    }

    pub fn resolved_interfaces(&self) -> Vec<Arc<ClassFile>> {
        self.interface_names()
            .iter()
            .filter_map(|name| self.registry.lookup(name))
            .collect()
    }

    /// Finds a field declared here or inherited through the loaded
    /// hierarchy. Superclass members must be public, protected, or
    /// package-private within this class's package; interface members must
    /// be public or protected.
    pub fn locate_field(&self, predicate: impl Fn(&Field) -> bool) -> Option<Located<Field>> {
        self.locate(fields_of, &predicate, &mut HashSet::new())
    }

    pub fn locate_method(&self, predicate: impl Fn(&Method) -> bool) -> Option<Located<Method>> {
        self.locate(methods_of, &predicate, &mut HashSet::new())
    }

    fn locate<M: Member>(
        &self,
        members: fn(&ClassFile) -> &[M],
        predicate: &dyn Fn(&M) -> bool,
        visited: &mut HashSet<String>,
    ) -> Option<Located<M>> {
        if !visited.insert(self.class_name.clone()) {
            return None;
        }

        if let Some(member) = members(self).iter().find(|m| predicate(m)) {
            return Some(Located {
                owner: self.class_name.clone(),
                member: member.clone(),
            });
        }

        if let Some(superclass) = self.superclass()
            && let Some(found) = superclass.locate(members, predicate, visited)
        {
            let flags = found.member.access_flags();
            let package_private = flags & (access::PUBLIC | access::PROTECTED | access::PRIVATE) == 0;
            if flags & (access::PUBLIC | access::PROTECTED) != 0
                || (package_private && package_of(&found.owner) == self.package_name())
            {
                return Some(found);
            }
        }

        for interface in self.resolved_interfaces() {
            if let Some(found) = interface.locate(members, predicate, visited)
                && found.member.access_flags() & (access::PUBLIC | access::PROTECTED) != 0
            {
                return Some(found);
            }
        }

        None
    }
}

fn fields_of(class: &ClassFile) -> &[Field] {
    &class.fields
}

fn methods_of(class: &ClassFile) -> &[Method] {
    &class.methods
}

fn package_of(class_name: &str) -> &str {
    class_name.rsplit_once('.').map_or("", |(package, _)| package)
}

type MemberParts = (u16, String, String, Vec<Attribute>, Vec<DecodeError>);

fn read_member(r: &mut ByteReader<'_>, pool: &Arc<ConstantPool>) -> DecodeResult<MemberParts> {
    let access_flags = r.u16()?;
    let name = pool.utf8(r.u16()?)?.to_string();
    let descriptor = pool.utf8(r.u16()?)?.to_string();
    let mut issues = Vec::new();
    let attributes = attribute::read_attributes(r, pool, &mut issues)?;
    Ok((access_flags, name, descriptor, attributes, issues))
}

fn signature<'a>(attributes: &[Attribute], pool: &'a ConstantPool) -> Option<&'a str> {
    attributes.iter().find_map(|a| match a {
        Attribute::Signature { signature_index } => pool.utf8(*signature_index).ok(),
        _ => None,
    })
}

impl Field {
    pub fn is_static(&self) -> bool {
        self.access_flags & access::STATIC != 0
    }

    pub fn is_final(&self) -> bool {
        self.access_flags & access::FINAL != 0
    }

    pub fn is_partial(&self) -> bool {
        !self.issues.is_empty()
    }

    /// Pool index of the compile-time constant initializer.
    pub fn constant_value_index(&self) -> Option<u16> {
        self.attributes.iter().find_map(|a| match a {
            Attribute::ConstantValue { value_index } => Some(*value_index),
            _ => None,
        })
    }
}

impl Method {
    pub fn is_static(&self) -> bool {
        self.access_flags & access::STATIC != 0
    }

    pub fn is_abstract(&self) -> bool {
        self.access_flags & access::ABSTRACT != 0
    }

    pub fn is_native(&self) -> bool {
        self.access_flags & access::NATIVE != 0
    }

    pub fn is_constructor(&self) -> bool {
        self.name == "<init>"
    }

    pub fn is_static_initializer(&self) -> bool {
        self.name == "<clinit>"
    }

    pub fn is_partial(&self) -> bool {
        !self.issues.is_empty()
    }

    pub fn code(&self) -> Option<&Code> {
        self.attributes.iter().find_map(|a| match a {
            Attribute::Code(code) => Some(code),
            _ => None,
        })
    }

    /// Pool indices of the declared checked exceptions.
    pub fn exception_indices(&self) -> &[u16] {
        self.attributes
            .iter()
            .find_map(|a| match a {
                Attribute::Exceptions(indices) => Some(indices.as_slice()),
                _ => None,
            })
            .unwrap_or(&[])
    }
}

impl Member for Field {
    fn access_flags(&self) -> u16 {
        self.access_flags
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn descriptor(&self) -> &str {
        &self.descriptor
    }
}

impl Member for Method {
    fn access_flags(&self) -> u16 {
        self.access_flags
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn descriptor(&self) -> &str {
        &self.descriptor
    }
}
