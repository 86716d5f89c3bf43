use crate::error::{DecodeError, DecodeResult};
use crate::reader::ByteReader;

pub mod tags {
    pub const UTF8: u8 = 1;
    pub const INTEGER: u8 = 3;
    pub const FLOAT: u8 = 4;
    pub const LONG: u8 = 5;
    pub const DOUBLE: u8 = 6;
    pub const CLASS: u8 = 7;
    pub const STRING: u8 = 8;
    pub const FIELD_REF: u8 = 9;
    pub const METHOD_REF: u8 = 10;
    pub const INTERFACE_METHOD_REF: u8 = 11;
    pub const NAME_AND_TYPE: u8 = 12;
    pub const METHOD_HANDLE: u8 = 15;
    pub const METHOD_TYPE: u8 = 16;
    pub const DYNAMIC: u8 = 17;
    pub const INVOKE_DYNAMIC: u8 = 18;
    pub const MODULE: u8 = 19;
    pub const PACKAGE: u8 = 20;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceKind {
    GetField,
    GetStatic,
    PutField,
    PutStatic,
    InvokeVirtual,
    InvokeStatic,
    InvokeSpecial,
    NewInvokeSpecial,
    InvokeInterface,
}

impl ReferenceKind {
    pub fn from_u8(kind: u8) -> Option<Self> {
        Some(match kind {
            1 => ReferenceKind::GetField,
            2 => ReferenceKind::GetStatic,
            3 => ReferenceKind::PutField,
            4 => ReferenceKind::PutStatic,
            5 => ReferenceKind::InvokeVirtual,
            6 => ReferenceKind::InvokeStatic,
            7 => ReferenceKind::InvokeSpecial,
            8 => ReferenceKind::NewInvokeSpecial,
            9 => ReferenceKind::InvokeInterface,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class {
        name_index: u16,
    },
    String {
        string_index: u16,
    },
    FieldRef {
        class_index: u16,
        name_and_type_index: u16,
    },
    MethodRef {
        class_index: u16,
        name_and_type_index: u16,
    },
    InterfaceMethodRef {
        class_index: u16,
        name_and_type_index: u16,
    },
    NameAndType {
        name_index: u16,
        descriptor_index: u16,
    },
    MethodHandle {
        reference_kind: ReferenceKind,
        reference_index: u16,
    },
    MethodType {
        descriptor_index: u16,
    },
    Dynamic {
        bootstrap_method_attr_index: u16,
        name_and_type_index: u16,
    },
    InvokeDynamic {
        bootstrap_method_attr_index: u16,
        name_and_type_index: u16,
    },
    Module {
        name_index: u16,
    },
    Package {
        name_index: u16,
    },
    /// Index 0, and the slot following every `Long` or `Double`.
    Unusable,
}

impl Constant {
    pub fn tag(&self) -> Option<u8> {
        Some(match self {
            Constant::Utf8(_) => tags::UTF8,
            Constant::Integer(_) => tags::INTEGER,
            Constant::Float(_) => tags::FLOAT,
            Constant::Long(_) => tags::LONG,
            Constant::Double(_) => tags::DOUBLE,
            Constant::Class { .. } => tags::CLASS,
            Constant::String { .. } => tags::STRING,
            Constant::FieldRef { .. } => tags::FIELD_REF,
            Constant::MethodRef { .. } => tags::METHOD_REF,
            Constant::InterfaceMethodRef { .. } => tags::INTERFACE_METHOD_REF,
            Constant::NameAndType { .. } => tags::NAME_AND_TYPE,
            Constant::MethodHandle { .. } => tags::METHOD_HANDLE,
            Constant::MethodType { .. } => tags::METHOD_TYPE,
            Constant::Dynamic { .. } => tags::DYNAMIC,
            Constant::InvokeDynamic { .. } => tags::INVOKE_DYNAMIC,
            Constant::Module { .. } => tags::MODULE,
            Constant::Package { .. } => tags::PACKAGE,
            Constant::Unusable => return None,
        })
    }

    /// Long and Double occupy two slots.
    pub fn is_wide(&self) -> bool {
        matches!(self, Constant::Long(_) | Constant::Double(_))
    }
}

/// Class, name and descriptor of a field or method reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberRef {
    pub class: String,
    pub name: String,
    pub descriptor: String,
}

/// A constant with every reference followed, independent of the pool layout
/// it was read from. Floating point values compare by bit pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Symbol {
    Utf8(String),
    Integer(i32),
    Float(u32),
    Long(i64),
    Double(u64),
    Class(String),
    String(String),
    Field(MemberRef),
    Method(MemberRef),
    InterfaceMethod(MemberRef),
    NameAndType { name: String, descriptor: String },
    MethodHandle { kind: ReferenceKind, reference: Box<Symbol> },
    MethodType(String),
    Dynamic {
        bootstrap_method: u16,
        name: String,
        descriptor: String,
    },
    InvokeDynamic {
        bootstrap_method: u16,
        name: String,
        descriptor: String,
    },
    Module(String),
    Package(String),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConstantPool {
    // Slot 0 is always `Unusable` so indices map directly.
    entries: Vec<Constant>,
}

impl ConstantPool {
    /// Lays out `entries` in order starting at index 1, inserting the
    /// unusable gap after every 8-byte constant.
    pub fn from_entries(entries: impl IntoIterator<Item = Constant>) -> Self {
        let mut slots = vec![Constant::Unusable];
        for entry in entries {
            let wide = entry.is_wide();
            slots.push(entry);
            if wide {
                slots.push(Constant::Unusable);
            }
        }
        Self { entries: slots }
    }

    pub fn read(r: &mut ByteReader<'_>) -> DecodeResult<Self> {
        let count = r.u16()?;
        let mut entries = Vec::with_capacity(count as usize);
        entries.push(Constant::Unusable);

        let mut index: u16 = 1;
        while index < count {
            let entry = read_entry(r, index)?;
            let wide = entry.is_wide();
            entries.push(entry);
            if wide {
                if index + 1 >= count {
                    return Err(DecodeError::malformed(
                        index,
                        "8-byte constant occupies the last slot",
                    ));
                }
                entries.push(Constant::Unusable);
                index += 2;
            } else {
                index += 1;
            }
        }

        Ok(Self { entries })
    }

    /// Number of slots including index 0, i.e. the `constant_pool_count`.
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, index: u16) -> DecodeResult<&Constant> {
        if index == 0 {
            return Err(DecodeError::malformed(index, "index zero"));
        }
        match self.entries.get(index as usize) {
            None => Err(DecodeError::malformed(index, "index out of bounds")),
            Some(Constant::Unusable) => Err(DecodeError::malformed(
                index,
                "reserved slot after 8-byte constant",
            )),
            Some(entry) => Ok(entry),
        }
    }

    /// Usable entries with their indices.
    pub fn iter(&self) -> impl Iterator<Item = (u16, &Constant)> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, c)| !matches!(c, Constant::Unusable))
            .map(|(i, c)| (i as u16, c))
    }

    pub fn utf8(&self, index: u16) -> DecodeResult<&str> {
        match self.get(index)? {
            Constant::Utf8(s) => Ok(s),
            _ => Err(DecodeError::malformed(index, "expected Utf8")),
        }
    }

    pub fn class_name(&self, index: u16) -> DecodeResult<&str> {
        match self.get(index)? {
            Constant::Class { name_index } => self.utf8(*name_index),
            _ => Err(DecodeError::malformed(index, "expected Class")),
        }
    }

    pub fn name_and_type(&self, index: u16) -> DecodeResult<(&str, &str)> {
        match self.get(index)? {
            Constant::NameAndType {
                name_index,
                descriptor_index,
            } => Ok((self.utf8(*name_index)?, self.utf8(*descriptor_index)?)),
            _ => Err(DecodeError::malformed(index, "expected NameAndType")),
        }
    }

    pub fn member_ref(&self, index: u16) -> DecodeResult<MemberRef> {
        match self.get(index)? {
            Constant::FieldRef {
                class_index,
                name_and_type_index,
            }
            | Constant::MethodRef {
                class_index,
                name_and_type_index,
            }
            | Constant::InterfaceMethodRef {
                class_index,
                name_and_type_index,
            } => {
                let (name, descriptor) = self.name_and_type(*name_and_type_index)?;
                Ok(MemberRef {
                    class: self.class_name(*class_index)?.to_string(),
                    name: name.to_string(),
                    descriptor: descriptor.to_string(),
                })
            }
            _ => Err(DecodeError::malformed(index, "expected member reference")),
        }
    }

    pub fn symbol(&self, index: u16) -> DecodeResult<Symbol> {
        Ok(match self.get(index)? {
            Constant::Utf8(s) => Symbol::Utf8(s.clone()),
            Constant::Integer(v) => Symbol::Integer(*v),
            Constant::Float(v) => Symbol::Float(v.to_bits()),
            Constant::Long(v) => Symbol::Long(*v),
            Constant::Double(v) => Symbol::Double(v.to_bits()),
            Constant::Class { name_index } => Symbol::Class(self.utf8(*name_index)?.to_string()),
            Constant::String { string_index } => {
                Symbol::String(self.utf8(*string_index)?.to_string())
            }
            Constant::FieldRef { .. } => Symbol::Field(self.member_ref(index)?),
            Constant::MethodRef { .. } => Symbol::Method(self.member_ref(index)?),
            Constant::InterfaceMethodRef { .. } => Symbol::InterfaceMethod(self.member_ref(index)?),
            Constant::NameAndType { .. } => {
                let (name, descriptor) = self.name_and_type(index)?;
                Symbol::NameAndType {
                    name: name.to_string(),
                    descriptor: descriptor.to_string(),
                }
            }
            Constant::MethodHandle {
                reference_kind,
                reference_index,
            } => {
                if !matches!(
                    self.get(*reference_index)?,
                    Constant::FieldRef { .. }
                        | Constant::MethodRef { .. }
                        | Constant::InterfaceMethodRef { .. }
                ) {
                    return Err(DecodeError::malformed(
                        index,
                        "method handle must reference a field or method",
                    ));
                }
                Symbol::MethodHandle {
                    kind: *reference_kind,
                    reference: Box::new(self.symbol(*reference_index)?),
                }
            }
            Constant::MethodType { descriptor_index } => {
                Symbol::MethodType(self.utf8(*descriptor_index)?.to_string())
            }
            Constant::Dynamic {
                bootstrap_method_attr_index,
                name_and_type_index,
            } => {
                let (name, descriptor) = self.name_and_type(*name_and_type_index)?;
                Symbol::Dynamic {
                    bootstrap_method: *bootstrap_method_attr_index,
                    name: name.to_string(),
                    descriptor: descriptor.to_string(),
                }
            }
            Constant::InvokeDynamic {
                bootstrap_method_attr_index,
                name_and_type_index,
            } => {
                let (name, descriptor) = self.name_and_type(*name_and_type_index)?;
                Symbol::InvokeDynamic {
                    bootstrap_method: *bootstrap_method_attr_index,
                    name: name.to_string(),
                    descriptor: descriptor.to_string(),
                }
            }
            Constant::Module { name_index } => Symbol::Module(self.utf8(*name_index)?.to_string()),
            Constant::Package { name_index } => {
                Symbol::Package(self.utf8(*name_index)?.to_string())
            }
            Constant::Unusable => unreachable!("get() rejects unusable slots"),
        })
    }
}

fn read_entry(r: &mut ByteReader<'_>, index: u16) -> DecodeResult<Constant> {
    let tag = r.u8()?;
    Ok(match tag {
        tags::UTF8 => {
            let len = r.u16()? as usize;
            Constant::Utf8(decode_modified_utf8(r.bytes(len)?))
        }
        tags::INTEGER => Constant::Integer(r.i32()?),
        tags::FLOAT => Constant::Float(f32::from_bits(r.u32()?)),
        tags::LONG => Constant::Long(r.u64()? as i64),
        tags::DOUBLE => Constant::Double(f64::from_bits(r.u64()?)),
        tags::CLASS => Constant::Class {
            name_index: r.u16()?,
        },
        tags::STRING => Constant::String {
            string_index: r.u16()?,
        },
        tags::FIELD_REF => Constant::FieldRef {
            class_index: r.u16()?,
            name_and_type_index: r.u16()?,
        },
        tags::METHOD_REF => Constant::MethodRef {
            class_index: r.u16()?,
            name_and_type_index: r.u16()?,
        },
        tags::INTERFACE_METHOD_REF => Constant::InterfaceMethodRef {
            class_index: r.u16()?,
            name_and_type_index: r.u16()?,
        },
        tags::NAME_AND_TYPE => Constant::NameAndType {
            name_index: r.u16()?,
            descriptor_index: r.u16()?,
        },
        tags::METHOD_HANDLE => {
            let kind = r.u8()?;
            let reference_index = r.u16()?;
            let reference_kind = ReferenceKind::from_u8(kind)
                .ok_or_else(|| DecodeError::malformed(index, "invalid method handle kind"))?;
            Constant::MethodHandle {
                reference_kind,
                reference_index,
            }
        }
        tags::METHOD_TYPE => Constant::MethodType {
            descriptor_index: r.u16()?,
        },
        tags::DYNAMIC => Constant::Dynamic {
            bootstrap_method_attr_index: r.u16()?,
            name_and_type_index: r.u16()?,
        },
        tags::INVOKE_DYNAMIC => Constant::InvokeDynamic {
            bootstrap_method_attr_index: r.u16()?,
            name_and_type_index: r.u16()?,
        },
        tags::MODULE => Constant::Module {
            name_index: r.u16()?,
        },
        tags::PACKAGE => Constant::Package {
            name_index: r.u16()?,
        },
        // Without a known length the cursor cannot advance.
        _ => return Err(DecodeError::UnknownConstantTag { index, tag }),
    })
}

/// Decodes the class-file flavour of UTF-8: NUL is `C0 80` and
/// supplementary characters arrive as two 3-byte surrogates. Invalid
/// sequences become U+FFFD.
pub fn decode_modified_utf8(bytes: &[u8]) -> String {
    if let Ok(s) = std::str::from_utf8(bytes)
        && !bytes.iter().any(|&b| b == 0xC0 || b == 0xED)
    {
        return s.to_string();
    }

    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b & 0x80 == 0 {
            units.push(b as u16);
            i += 1;
        } else if b & 0xE0 == 0xC0 && i + 1 < bytes.len() && bytes[i + 1] & 0xC0 == 0x80 {
            units.push((((b & 0x1F) as u16) << 6) | (bytes[i + 1] & 0x3F) as u16);
            i += 2;
        } else if b & 0xF0 == 0xE0
            && i + 2 < bytes.len()
            && bytes[i + 1] & 0xC0 == 0x80
            && bytes[i + 2] & 0xC0 == 0x80
        {
            units.push(
                (((b & 0x0F) as u16) << 12)
                    | (((bytes[i + 1] & 0x3F) as u16) << 6)
                    | (bytes[i + 2] & 0x3F) as u16,
            );
            i += 3;
        } else {
            units.push(0xFFFD);
            i += 1;
        }
    }
    String::from_utf16_lossy(&units)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_pool() -> ConstantPool {
        ConstantPool::from_entries([
            Constant::Utf8("java/lang/Object".into()), // 1
            Constant::Class { name_index: 1 },         // 2
            Constant::Utf8("<init>".into()),           // 3
            Constant::Utf8("()V".into()),              // 4
            Constant::NameAndType {
                name_index: 3,
                descriptor_index: 4,
            }, // 5
            Constant::MethodRef {
                class_index: 2,
                name_and_type_index: 5,
            }, // 6
            Constant::Long(42), // 7, 8 unusable
            Constant::Integer(7), // 9
        ])
    }

    #[test]
    fn resolving_twice_yields_same_entry() {
        let pool = sample_pool();
        let first = pool.get(6).unwrap();
        let second = pool.get(6).unwrap();
        assert!(std::ptr::eq(first, second));
        assert_eq!(pool.symbol(6).unwrap(), pool.symbol(6).unwrap());
    }

    #[test]
    fn long_reserves_following_slot() {
        let pool = sample_pool();
        assert_eq!(pool.count(), 10);
        assert_eq!(pool.get(7).unwrap(), &Constant::Long(42));
        assert!(matches!(
            pool.get(8),
            Err(DecodeError::MalformedPool { index: 8, .. })
        ));
        assert_eq!(pool.get(9).unwrap(), &Constant::Integer(7));
    }

    #[test]
    fn zero_and_out_of_bounds_are_malformed() {
        let pool = sample_pool();
        assert!(matches!(pool.get(0), Err(DecodeError::MalformedPool { .. })));
        assert!(matches!(pool.get(10), Err(DecodeError::MalformedPool { .. })));
    }

    #[test]
    fn member_ref_resolves_on_demand() {
        let pool = sample_pool();
        let m = pool.member_ref(6).unwrap();
        assert_eq!(m.class, "java/lang/Object");
        assert_eq!(m.name, "<init>");
        assert_eq!(m.descriptor, "()V");
    }

    #[test]
    fn broken_reference_does_not_block_neighbours() {
        let pool = ConstantPool::from_entries([
            Constant::MethodRef {
                class_index: 40,
                name_and_type_index: 41,
            },
            Constant::Utf8("fine".into()),
        ]);
        assert!(pool.symbol(1).is_err());
        assert_eq!(pool.utf8(2).unwrap(), "fine");
    }

    #[test]
    fn reads_raw_pool_with_double_gap() {
        let mut bytes = vec![0x00, 0x05];
        bytes.extend([tags::DOUBLE, 0x3F, 0xF0, 0, 0, 0, 0, 0, 0]);
        bytes.extend([tags::UTF8, 0x00, 0x02, b'h', b'i']);
        bytes.extend([tags::STRING, 0x00, 0x03]);
        let pool = ConstantPool::read(&mut ByteReader::new(&bytes)).unwrap();
        assert_eq!(pool.get(1).unwrap(), &Constant::Double(1.0));
        assert!(pool.get(2).is_err());
        assert_eq!(pool.symbol(4).unwrap(), Symbol::String("hi".into()));
    }

    #[test]
    fn unknown_tag_is_fatal() {
        let bytes = [0x00, 0x02, 0x63];
        let err = ConstantPool::read(&mut ByteReader::new(&bytes)).unwrap_err();
        assert_eq!(err, DecodeError::UnknownConstantTag { index: 1, tag: 0x63 });
    }

    #[test]
    fn modified_utf8_handles_nul_and_surrogates() {
        assert_eq!(decode_modified_utf8(&[b'a', 0xC0, 0x80, b'b']), "a\0b");
        // U+1F600 as a CESU-8 surrogate pair
        let smiley = [0xED, 0xA0, 0xBD, 0xED, 0xB8, 0x80];
        assert_eq!(decode_modified_utf8(&smiley), "\u{1F600}");
        assert_eq!(decode_modified_utf8("plain".as_bytes()), "plain");
    }
}
