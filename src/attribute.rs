//! Class, field, method and code attributes.
//!
//! Attributes are dispatched on their name string. Anything this reader does
//! not know about is kept verbatim as [`Attribute::Unknown`], so class files
//! produced by newer compilers still load.

use std::sync::Arc;

use crate::constant_pool::{Constant, ConstantPool};
use crate::error::{DecodeError, DecodeResult};
use crate::instruction::{self, Instructions};
use crate::reader::ByteReader;

pub mod names {
    pub const CONSTANT_VALUE: &str = "ConstantValue";
    pub const CODE: &str = "Code";
    pub const STACK_MAP_TABLE: &str = "StackMapTable";
    pub const EXCEPTIONS: &str = "Exceptions";
    pub const INNER_CLASSES: &str = "InnerClasses";
    pub const ENCLOSING_METHOD: &str = "EnclosingMethod";
    pub const SYNTHETIC: &str = "Synthetic";
    pub const SIGNATURE: &str = "Signature";
    pub const SOURCE_FILE: &str = "SourceFile";
    pub const SOURCE_DEBUG_EXTENSION: &str = "SourceDebugExtension";
    pub const LINE_NUMBER_TABLE: &str = "LineNumberTable";
    pub const LOCAL_VARIABLE_TABLE: &str = "LocalVariableTable";
    pub const LOCAL_VARIABLE_TYPE_TABLE: &str = "LocalVariableTypeTable";
    pub const DEPRECATED: &str = "Deprecated";
    pub const RUNTIME_VISIBLE_ANNOTATIONS: &str = "RuntimeVisibleAnnotations";
    pub const RUNTIME_INVISIBLE_ANNOTATIONS: &str = "RuntimeInvisibleAnnotations";
    pub const RUNTIME_VISIBLE_PARAMETER_ANNOTATIONS: &str = "RuntimeVisibleParameterAnnotations";
    pub const RUNTIME_INVISIBLE_PARAMETER_ANNOTATIONS: &str =
        "RuntimeInvisibleParameterAnnotations";
    pub const RUNTIME_VISIBLE_TYPE_ANNOTATIONS: &str = "RuntimeVisibleTypeAnnotations";
    pub const RUNTIME_INVISIBLE_TYPE_ANNOTATIONS: &str = "RuntimeInvisibleTypeAnnotations";
    pub const ANNOTATION_DEFAULT: &str = "AnnotationDefault";
    pub const BOOTSTRAP_METHODS: &str = "BootstrapMethods";
    pub const METHOD_PARAMETERS: &str = "MethodParameters";
    pub const MODULE: &str = "Module";
    pub const MODULE_PACKAGES: &str = "ModulePackages";
    pub const MODULE_MAIN_CLASS: &str = "ModuleMainClass";
    pub const NEST_HOST: &str = "NestHost";
    pub const NEST_MEMBERS: &str = "NestMembers";
    pub const RECORD: &str = "Record";
    pub const PERMITTED_SUBCLASSES: &str = "PermittedSubclasses";
}

#[derive(Debug, Clone)]
pub enum Attribute {
    ConstantValue { value_index: u16 },
    Code(Code),
    StackMapTable(Vec<StackMapFrame>),
    Exceptions(Vec<u16>),
    InnerClasses(Vec<InnerClass>),
    EnclosingMethod { class_index: u16, method_index: u16 },
    Synthetic,
    Signature { signature_index: u16 },
    SourceFile { sourcefile_index: u16 },
    SourceDebugExtension(Vec<u8>),
    LineNumberTable(Vec<LineNumber>),
    LocalVariableTable(Vec<LocalVariable>),
    /// Same layout as `LocalVariableTable`; `descriptor_index` holds a
    /// generic signature.
    LocalVariableTypeTable(Vec<LocalVariable>),
    Deprecated,
    RuntimeVisibleAnnotations(Vec<Annotation>),
    RuntimeInvisibleAnnotations(Vec<Annotation>),
    RuntimeVisibleParameterAnnotations(Vec<Vec<Annotation>>),
    RuntimeInvisibleParameterAnnotations(Vec<Vec<Annotation>>),
    RuntimeVisibleTypeAnnotations(Vec<TypeAnnotation>),
    RuntimeInvisibleTypeAnnotations(Vec<TypeAnnotation>),
    AnnotationDefault(ElementValue),
    BootstrapMethods(Vec<BootstrapMethod>),
    MethodParameters(Vec<MethodParameter>),
    Module(Module),
    ModulePackages(Vec<u16>),
    ModuleMainClass { main_class_index: u16 },
    NestHost { host_class_index: u16 },
    NestMembers(Vec<u16>),
    Record(Vec<RecordComponent>),
    PermittedSubclasses(Vec<u16>),
    Unknown { name: String, info: Vec<u8> },
}

impl Attribute {
    pub fn name(&self) -> &str {
        match self {
            Attribute::ConstantValue { .. } => names::CONSTANT_VALUE,
            Attribute::Code(_) => names::CODE,
            Attribute::StackMapTable(_) => names::STACK_MAP_TABLE,
            Attribute::Exceptions(_) => names::EXCEPTIONS,
            Attribute::InnerClasses(_) => names::INNER_CLASSES,
            Attribute::EnclosingMethod { .. } => names::ENCLOSING_METHOD,
            Attribute::Synthetic => names::SYNTHETIC,
            Attribute::Signature { .. } => names::SIGNATURE,
            Attribute::SourceFile { .. } => names::SOURCE_FILE,
            Attribute::SourceDebugExtension(_) => names::SOURCE_DEBUG_EXTENSION,
            Attribute::LineNumberTable(_) => names::LINE_NUMBER_TABLE,
            Attribute::LocalVariableTable(_) => names::LOCAL_VARIABLE_TABLE,
            Attribute::LocalVariableTypeTable(_) => names::LOCAL_VARIABLE_TYPE_TABLE,
            Attribute::Deprecated => names::DEPRECATED,
            Attribute::RuntimeVisibleAnnotations(_) => names::RUNTIME_VISIBLE_ANNOTATIONS,
            Attribute::RuntimeInvisibleAnnotations(_) => names::RUNTIME_INVISIBLE_ANNOTATIONS,
            Attribute::RuntimeVisibleParameterAnnotations(_) => {
                names::RUNTIME_VISIBLE_PARAMETER_ANNOTATIONS
            }
            Attribute::RuntimeInvisibleParameterAnnotations(_) => {
                names::RUNTIME_INVISIBLE_PARAMETER_ANNOTATIONS
            }
            Attribute::RuntimeVisibleTypeAnnotations(_) => names::RUNTIME_VISIBLE_TYPE_ANNOTATIONS,
            Attribute::RuntimeInvisibleTypeAnnotations(_) => {
                names::RUNTIME_INVISIBLE_TYPE_ANNOTATIONS
            }
            Attribute::AnnotationDefault(_) => names::ANNOTATION_DEFAULT,
            Attribute::BootstrapMethods(_) => names::BOOTSTRAP_METHODS,
            Attribute::MethodParameters(_) => names::METHOD_PARAMETERS,
            Attribute::Module(_) => names::MODULE,
            Attribute::ModulePackages(_) => names::MODULE_PACKAGES,
            Attribute::ModuleMainClass { .. } => names::MODULE_MAIN_CLASS,
            Attribute::NestHost { .. } => names::NEST_HOST,
            Attribute::NestMembers(_) => names::NEST_MEMBERS,
            Attribute::Record(_) => names::RECORD,
            Attribute::PermittedSubclasses(_) => names::PERMITTED_SUBCLASSES,
            Attribute::Unknown { name, .. } => name,
        }
    }
}

/// The `Code` attribute of a method. Holds a handle on the owning class's
/// constant pool so instructions can resolve their operands on demand.
#[derive(Debug, Clone)]
pub struct Code {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code: Vec<u8>,
    pub exception_table: Vec<ExceptionHandler>,
    pub attributes: Vec<Attribute>,
    pool: Arc<ConstantPool>,
}

impl Code {
    pub fn instructions(&self) -> Instructions<'_> {
        Instructions::new(&self.pool, &self.code)
    }

    pub fn constant_pool(&self) -> &ConstantPool {
        &self.pool
    }

    pub fn line_numbers(&self) -> impl Iterator<Item = &LineNumber> {
        self.attributes.iter().flat_map(|a| match a {
            Attribute::LineNumberTable(lines) => lines.as_slice(),
            _ => &[][..],
        })
    }

    pub fn local_variables(&self) -> impl Iterator<Item = &LocalVariable> {
        self.attributes.iter().flat_map(|a| match a {
            Attribute::LocalVariableTable(vars) => vars.as_slice(),
            _ => &[][..],
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionHandler {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    /// Zero catches everything (`finally`).
    pub catch_type: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationType {
    Top,
    Integer,
    Float,
    Double,
    Long,
    Null,
    UninitializedThis,
    Object { class_index: u16 },
    Uninitialized { offset: u16 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackMapFrame {
    Same {
        offset_delta: u16,
    },
    SameLocals1StackItem {
        offset_delta: u16,
        stack: VerificationType,
    },
    Chop {
        offset_delta: u16,
        chopped: u8,
    },
    Append {
        offset_delta: u16,
        locals: Vec<VerificationType>,
    },
    Full {
        offset_delta: u16,
        locals: Vec<VerificationType>,
        stack: Vec<VerificationType>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InnerClass {
    pub inner_class_info_index: u16,
    pub outer_class_info_index: u16,
    pub inner_name_index: u16,
    pub inner_class_access_flags: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineNumber {
    pub start_pc: u16,
    pub line_number: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalVariable {
    pub start_pc: u16,
    pub length: u16,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub index: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    pub type_index: u16,
    pub elements: Vec<ElementValuePair>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementValuePair {
    pub name_index: u16,
    pub value: ElementValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementValue {
    /// Primitive or String constant; `tag` is one of `BCDFIJSZs`.
    Const { tag: u8, const_value_index: u16 },
    Enum {
        type_name_index: u16,
        const_name_index: u16,
    },
    Class { class_info_index: u16 },
    Annotation(Box<Annotation>),
    Array(Vec<ElementValue>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeAnnotation {
    pub target_type: u8,
    pub target: TypeAnnotationTarget,
    /// (type_path_kind, type_argument_index) steps.
    pub target_path: Vec<(u8, u8)>,
    pub annotation: Annotation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeAnnotationTarget {
    TypeParameter { index: u8 },
    Supertype { index: u16 },
    TypeParameterBound { type_parameter_index: u8, bound_index: u8 },
    Empty,
    FormalParameter { index: u8 },
    Throws { index: u16 },
    LocalVariable(Vec<LocalVariableTarget>),
    Catch { exception_table_index: u16 },
    Offset { offset: u16 },
    TypeArgument { offset: u16, type_argument_index: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalVariableTarget {
    pub start_pc: u16,
    pub length: u16,
    pub index: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapMethod {
    pub method_ref: u16,
    pub arguments: Vec<u16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodParameter {
    pub name_index: u16,
    pub access_flags: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    pub name_index: u16,
    pub flags: u16,
    pub version_index: u16,
    pub requires: Vec<ModuleRequires>,
    pub exports: Vec<ModulePackageTarget>,
    pub opens: Vec<ModulePackageTarget>,
    pub uses: Vec<u16>,
    pub provides: Vec<ModuleProvides>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleRequires {
    pub module_index: u16,
    pub flags: u16,
    pub version_index: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModulePackageTarget {
    pub package_index: u16,
    pub flags: u16,
    pub targets: Vec<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleProvides {
    pub service_index: u16,
    pub implementations: Vec<u16>,
}

#[derive(Debug, Clone)]
pub struct RecordComponent {
    pub name_index: u16,
    pub descriptor_index: u16,
    pub attributes: Vec<Attribute>,
}

/// Deepest nesting accepted for element values and for attribute tables
/// inside `Code` and `Record`. Anything deeper is rejected as a damaged
/// attribute.
const MAX_NESTING: usize = 64;

fn too_deep(what: &str) -> DecodeError {
    DecodeError::invalid_attribute(what, format!("nested more than {MAX_NESTING} levels deep"))
}

/// Reads an `attributes_count`-prefixed attribute table.
///
/// Fatal errors (truncated headers, a name index that does not resolve to a
/// Utf8 entry, a decoded body holding a dangling pool index) propagate. A body that fails to decode is kept as
/// [`Attribute::Unknown`] and its error is appended to `issues`.
pub(crate) fn read_attributes(
    r: &mut ByteReader<'_>,
    pool: &Arc<ConstantPool>,
    issues: &mut Vec<DecodeError>,
) -> DecodeResult<Vec<Attribute>> {
    read_attribute_table(r, pool, issues, 0)
}

fn read_attribute_table(
    r: &mut ByteReader<'_>,
    pool: &Arc<ConstantPool>,
    issues: &mut Vec<DecodeError>,
    depth: usize,
) -> DecodeResult<Vec<Attribute>> {
    if depth > MAX_NESTING {
        return Err(too_deep("attribute table"));
    }
    let count = r.u16()? as usize;
    let mut attributes = Vec::with_capacity(count.min(r.remaining()));
    for _ in 0..count {
        let name_index = r.u16()?;
        let length = r.u32()? as usize;
        let name = pool.utf8(name_index)?;
        let mut body = r.sub(length)?;
        let raw = body.clone();

        match decode_body(name, &mut body, pool, issues, depth) {
            Ok(attribute) => {
                check_references(&attribute, pool)?;
                attributes.push(attribute);
            }
            Err(err) => {
                tracing::debug!(attribute = name, error = %err, "keeping attribute as opaque bytes");
                issues.push(err);
                let mut raw = raw;
                attributes.push(Attribute::Unknown {
                    name: name.to_string(),
                    info: raw.bytes(length)?.to_vec(),
                });
            }
        }
    }
    Ok(attributes)
}

fn decode_body(
    name: &str,
    r: &mut ByteReader<'_>,
    pool: &Arc<ConstantPool>,
    issues: &mut Vec<DecodeError>,
    depth: usize,
) -> DecodeResult<Attribute> {
    Ok(match name {
        names::CONSTANT_VALUE => Attribute::ConstantValue {
            value_index: r.u16()?,
        },
        names::CODE => Attribute::Code(read_code(r, pool, issues, depth)?),
        names::STACK_MAP_TABLE => Attribute::StackMapTable(r.list(read_frame)?),
        names::EXCEPTIONS => Attribute::Exceptions(r.list(|r| r.u16())?),
        names::INNER_CLASSES => Attribute::InnerClasses(r.list(|r| {
            Ok(InnerClass {
                inner_class_info_index: r.u16()?,
                outer_class_info_index: r.u16()?,
                inner_name_index: r.u16()?,
                inner_class_access_flags: r.u16()?,
            })
        })?),
        names::ENCLOSING_METHOD => Attribute::EnclosingMethod {
            class_index: r.u16()?,
            method_index: r.u16()?,
        },
        names::SYNTHETIC => Attribute::Synthetic,
        names::SIGNATURE => Attribute::Signature {
            signature_index: r.u16()?,
        },
        names::SOURCE_FILE => Attribute::SourceFile {
            sourcefile_index: r.u16()?,
        },
        names::SOURCE_DEBUG_EXTENSION => {
            Attribute::SourceDebugExtension(r.bytes(r.remaining())?.to_vec())
        }
        names::LINE_NUMBER_TABLE => Attribute::LineNumberTable(r.list(|r| {
            Ok(LineNumber {
                start_pc: r.u16()?,
                line_number: r.u16()?,
            })
        })?),
        names::LOCAL_VARIABLE_TABLE => Attribute::LocalVariableTable(r.list(read_local_variable)?),
        names::LOCAL_VARIABLE_TYPE_TABLE => {
            Attribute::LocalVariableTypeTable(r.list(read_local_variable)?)
        }
        names::DEPRECATED => Attribute::Deprecated,
        names::RUNTIME_VISIBLE_ANNOTATIONS => {
            Attribute::RuntimeVisibleAnnotations(r.list(|r| read_annotation(r, 0))?)
        }
        names::RUNTIME_INVISIBLE_ANNOTATIONS => {
            Attribute::RuntimeInvisibleAnnotations(r.list(|r| read_annotation(r, 0))?)
        }
        names::RUNTIME_VISIBLE_PARAMETER_ANNOTATIONS => {
            Attribute::RuntimeVisibleParameterAnnotations(read_parameter_annotations(r)?)
        }
        names::RUNTIME_INVISIBLE_PARAMETER_ANNOTATIONS => {
            Attribute::RuntimeInvisibleParameterAnnotations(read_parameter_annotations(r)?)
        }
        names::RUNTIME_VISIBLE_TYPE_ANNOTATIONS => {
            Attribute::RuntimeVisibleTypeAnnotations(r.list(read_type_annotation)?)
        }
        names::RUNTIME_INVISIBLE_TYPE_ANNOTATIONS => {
            Attribute::RuntimeInvisibleTypeAnnotations(r.list(read_type_annotation)?)
        }
        names::ANNOTATION_DEFAULT => Attribute::AnnotationDefault(read_element_value(r, 0)?),
        names::BOOTSTRAP_METHODS => Attribute::BootstrapMethods(r.list(|r| {
            Ok(BootstrapMethod {
                method_ref: r.u16()?,
                arguments: r.list(|r| r.u16())?,
            })
        })?),
        names::METHOD_PARAMETERS => {
            let count = r.u8()?;
            let mut params = Vec::with_capacity(count as usize);
            for _ in 0..count {
                params.push(MethodParameter {
                    name_index: r.u16()?,
                    access_flags: r.u16()?,
                });
            }
            Attribute::MethodParameters(params)
        }
        names::MODULE => Attribute::Module(read_module(r)?),
        names::MODULE_PACKAGES => Attribute::ModulePackages(r.list(|r| r.u16())?),
        names::MODULE_MAIN_CLASS => Attribute::ModuleMainClass {
            main_class_index: r.u16()?,
        },
        names::NEST_HOST => Attribute::NestHost {
            host_class_index: r.u16()?,
        },
        names::NEST_MEMBERS => Attribute::NestMembers(r.list(|r| r.u16())?),
        names::RECORD => Attribute::Record(r.list(|r| {
            Ok(RecordComponent {
                name_index: r.u16()?,
                descriptor_index: r.u16()?,
                attributes: read_attribute_table(r, pool, issues, depth + 1)?,
            })
        })?),
        names::PERMITTED_SUBCLASSES => Attribute::PermittedSubclasses(r.list(|r| r.u16())?),
        _ => Attribute::Unknown {
            name: name.to_string(),
            info: r.bytes(r.remaining())?.to_vec(),
        },
    })
}

/// Checks the pool indices a decoded attribute holds against the kinds of
/// entries they must name.
fn check_references(attribute: &Attribute, pool: &ConstantPool) -> DecodeResult<()> {
    let class = |index: u16| pool.class_name(index).map(drop);
    let optional_class = |index: u16| if index == 0 { Ok(()) } else { class(index) };

    match attribute {
        Attribute::ConstantValue { value_index } => {
            if !matches!(
                pool.get(*value_index)?,
                Constant::Integer(_)
                    | Constant::Float(_)
                    | Constant::Long(_)
                    | Constant::Double(_)
                    | Constant::String { .. }
            ) {
                return Err(DecodeError::malformed(
                    *value_index,
                    "constant value must be numeric or a string",
                ));
            }
        }
        Attribute::Code(code) => {
            for handler in &code.exception_table {
                optional_class(handler.catch_type)?;
            }
            // Undecodable bytecode is already recorded as an issue.
            for instruction in code.instructions().flatten() {
                if let Some(symbol) = instruction.symbol() {
                    symbol?;
                }
            }
        }
        Attribute::Exceptions(classes)
        | Attribute::NestMembers(classes)
        | Attribute::PermittedSubclasses(classes) => {
            classes.iter().try_for_each(|&index| class(index))?;
        }
        Attribute::InnerClasses(entries) => {
            for entry in entries {
                class(entry.inner_class_info_index)?;
                optional_class(entry.outer_class_info_index)?;
                if entry.inner_name_index != 0 {
                    pool.utf8(entry.inner_name_index)?;
                }
            }
        }
        Attribute::EnclosingMethod {
            class_index,
            method_index,
        } => {
            class(*class_index)?;
            if *method_index != 0 {
                pool.name_and_type(*method_index)?;
            }
        }
        Attribute::Signature {
            signature_index: index,
        }
        | Attribute::SourceFile {
            sourcefile_index: index,
        } => {
            pool.utf8(*index)?;
        }
        Attribute::ModuleMainClass {
            main_class_index: index,
        }
        | Attribute::NestHost {
            host_class_index: index,
        } => class(*index)?,
        Attribute::LocalVariableTable(variables) | Attribute::LocalVariableTypeTable(variables) => {
            for variable in variables {
                pool.utf8(variable.name_index)?;
                pool.utf8(variable.descriptor_index)?;
            }
        }
        Attribute::BootstrapMethods(methods) => {
            for method in methods {
                pool.get(method.method_ref)?;
                for &argument in &method.arguments {
                    pool.get(argument)?;
                }
            }
        }
        Attribute::MethodParameters(parameters) => {
            for parameter in parameters.iter().filter(|p| p.name_index != 0) {
                pool.utf8(parameter.name_index)?;
            }
        }
        Attribute::Record(components) => {
            for component in components {
                pool.utf8(component.name_index)?;
                pool.utf8(component.descriptor_index)?;
            }
        }
        _ => {}
    }
    Ok(())
}

fn read_code(
    r: &mut ByteReader<'_>,
    pool: &Arc<ConstantPool>,
    issues: &mut Vec<DecodeError>,
    depth: usize,
) -> DecodeResult<Code> {
    let max_stack = r.u16()?;
    let max_locals = r.u16()?;
    let code_length = r.u32()? as usize;
    let code = r.bytes(code_length)?.to_vec();
    let exception_table = r.list(|r| {
        Ok(ExceptionHandler {
            start_pc: r.u16()?,
            end_pc: r.u16()?,
            handler_pc: r.u16()?,
            catch_type: r.u16()?,
        })
    })?;
    let attributes = read_attribute_table(r, pool, issues, depth + 1)?;

    // Walk the bytecode once so malformed instruction streams mark the
    // method partial. The Code itself is kept either way.
    if let Err(err) = instruction::validate(&code) {
        issues.push(err);
    }

    Ok(Code {
        max_stack,
        max_locals,
        code,
        exception_table,
        attributes,
        pool: Arc::clone(pool),
    })
}

fn read_local_variable(r: &mut ByteReader<'_>) -> DecodeResult<LocalVariable> {
    Ok(LocalVariable {
        start_pc: r.u16()?,
        length: r.u16()?,
        name_index: r.u16()?,
        descriptor_index: r.u16()?,
        index: r.u16()?,
    })
}

fn read_verification_type(r: &mut ByteReader<'_>) -> DecodeResult<VerificationType> {
    Ok(match r.u8()? {
        0 => VerificationType::Top,
        1 => VerificationType::Integer,
        2 => VerificationType::Float,
        3 => VerificationType::Double,
        4 => VerificationType::Long,
        5 => VerificationType::Null,
        6 => VerificationType::UninitializedThis,
        7 => VerificationType::Object {
            class_index: r.u16()?,
        },
        8 => VerificationType::Uninitialized { offset: r.u16()? },
        tag => {
            return Err(DecodeError::invalid_attribute(
                names::STACK_MAP_TABLE,
                format!("unknown verification type tag {tag}"),
            ));
        }
    })
}

fn read_frame(r: &mut ByteReader<'_>) -> DecodeResult<StackMapFrame> {
    let frame_type = r.u8()?;
    Ok(match frame_type {
        0..=63 => StackMapFrame::Same {
            offset_delta: frame_type as u16,
        },
        64..=127 => StackMapFrame::SameLocals1StackItem {
            offset_delta: (frame_type - 64) as u16,
            stack: read_verification_type(r)?,
        },
        247 => StackMapFrame::SameLocals1StackItem {
            offset_delta: r.u16()?,
            stack: read_verification_type(r)?,
        },
        248..=250 => StackMapFrame::Chop {
            offset_delta: r.u16()?,
            chopped: 251 - frame_type,
        },
        251 => StackMapFrame::Same {
            offset_delta: r.u16()?,
        },
        252..=254 => {
            let offset_delta = r.u16()?;
            let mut locals = Vec::with_capacity((frame_type - 251) as usize);
            for _ in 0..(frame_type - 251) {
                locals.push(read_verification_type(r)?);
            }
            StackMapFrame::Append {
                offset_delta,
                locals,
            }
        }
        255 => StackMapFrame::Full {
            offset_delta: r.u16()?,
            locals: r.list(read_verification_type)?,
            stack: r.list(read_verification_type)?,
        },
        _ => {
            return Err(DecodeError::invalid_attribute(
                names::STACK_MAP_TABLE,
                format!("reserved frame type {frame_type}"),
            ));
        }
    })
}

fn read_annotation(r: &mut ByteReader<'_>, depth: usize) -> DecodeResult<Annotation> {
    Ok(Annotation {
        type_index: r.u16()?,
        elements: r.list(|r| {
            Ok(ElementValuePair {
                name_index: r.u16()?,
                value: read_element_value(r, depth)?,
            })
        })?,
    })
}

fn read_parameter_annotations(r: &mut ByteReader<'_>) -> DecodeResult<Vec<Vec<Annotation>>> {
    let count = r.u8()?;
    let mut parameters = Vec::with_capacity(count as usize);
    for _ in 0..count {
        parameters.push(r.list(|r| read_annotation(r, 0))?);
    }
    Ok(parameters)
}

fn read_element_value(r: &mut ByteReader<'_>, depth: usize) -> DecodeResult<ElementValue> {
    if depth > MAX_NESTING {
        return Err(too_deep("annotation"));
    }
    let tag = r.u8()?;
    Ok(match tag {
        b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b's' => ElementValue::Const {
            tag,
            const_value_index: r.u16()?,
        },
        b'e' => ElementValue::Enum {
            type_name_index: r.u16()?,
            const_name_index: r.u16()?,
        },
        b'c' => ElementValue::Class {
            class_info_index: r.u16()?,
        },
        b'@' => ElementValue::Annotation(Box::new(read_annotation(r, depth + 1)?)),
        b'[' => ElementValue::Array(r.list(|r| read_element_value(r, depth + 1))?),
        _ => {
            return Err(DecodeError::invalid_attribute(
                "annotation",
                format!("unknown element value tag {:?}", tag as char),
            ));
        }
    })
}

fn read_type_annotation(r: &mut ByteReader<'_>) -> DecodeResult<TypeAnnotation> {
    let target_type = r.u8()?;
    let target = match target_type {
        0x00 | 0x01 => TypeAnnotationTarget::TypeParameter { index: r.u8()? },
        0x10 => TypeAnnotationTarget::Supertype { index: r.u16()? },
        0x11 | 0x12 => TypeAnnotationTarget::TypeParameterBound {
            type_parameter_index: r.u8()?,
            bound_index: r.u8()?,
        },
        0x13..=0x15 => TypeAnnotationTarget::Empty,
        0x16 => TypeAnnotationTarget::FormalParameter { index: r.u8()? },
        0x17 => TypeAnnotationTarget::Throws { index: r.u16()? },
        0x40 | 0x41 => TypeAnnotationTarget::LocalVariable(r.list(|r| {
            Ok(LocalVariableTarget {
                start_pc: r.u16()?,
                length: r.u16()?,
                index: r.u16()?,
            })
        })?),
        0x42 => TypeAnnotationTarget::Catch {
            exception_table_index: r.u16()?,
        },
        0x43..=0x46 => TypeAnnotationTarget::Offset { offset: r.u16()? },
        0x47..=0x4B => TypeAnnotationTarget::TypeArgument {
            offset: r.u16()?,
            type_argument_index: r.u8()?,
        },
        _ => {
            return Err(DecodeError::invalid_attribute(
                "type annotation",
                format!("unknown target type 0x{target_type:02X}"),
            ));
        }
    };

    let path_length = r.u8()?;
    let mut target_path = Vec::with_capacity(path_length as usize);
    for _ in 0..path_length {
        target_path.push((r.u8()?, r.u8()?));
    }

    Ok(TypeAnnotation {
        target_type,
        target,
        target_path,
        annotation: read_annotation(r, 0)?,
    })
}

fn read_package_target(r: &mut ByteReader<'_>) -> DecodeResult<ModulePackageTarget> {
    Ok(ModulePackageTarget {
        package_index: r.u16()?,
        flags: r.u16()?,
        targets: r.list(|r| r.u16())?,
    })
}

fn read_module(r: &mut ByteReader<'_>) -> DecodeResult<Module> {
    Ok(Module {
        name_index: r.u16()?,
        flags: r.u16()?,
        version_index: r.u16()?,
        requires: r.list(|r| {
            Ok(ModuleRequires {
                module_index: r.u16()?,
                flags: r.u16()?,
                version_index: r.u16()?,
            })
        })?,
        exports: r.list(read_package_target)?,
        opens: r.list(read_package_target)?,
        uses: r.list(|r| r.u16())?,
        provides: r.list(|r| {
            Ok(ModuleProvides {
                service_index: r.u16()?,
                implementations: r.list(|r| r.u16())?,
            })
        })?,
    })
}
