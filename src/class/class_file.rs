//! The `Class`, `Field` and `Method` descriptions plus the binary class-file
//! decoder.

use std::io::Read;

use byteorder::{BigEndian, ReadBytesExt};

use crate::class::attribute::{AttributeInfo, CodeAttribute};
use crate::class::constant::{Constant, ConstantPool, ConstantPoolBuilder, ConstantTag, PoolIndex};
use crate::class::version::{check_magic_number, ClassVersion};
use crate::class::FormatError;
use crate::instruction::{BciMap, Instruction};
use crate::types::Type;
use crate::verifier::StackMapTableBuilder;

bitflags! {
    pub struct AccessFlags: u16 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        const SUPER = 0x0020;
        const SYNCHRONIZED = 0x0020;
        const VOLATILE = 0x0040;
        const BRIDGE = 0x0040;
        const TRANSIENT = 0x0080;
        const VARARGS = 0x0080;
        const NATIVE = 0x0100;
        const INTERFACE = 0x0200;
        const ABSTRACT = 0x0400;
        const STRICT = 0x0800;
        const SYNTHETIC = 0x1000;
        const ANNOTATION = 0x2000;
        const ENUM = 0x4000;
        const MODULE = 0x8000;
    }
}

impl AccessFlags {
    fn read<R: Read + ?Sized>(buffer: &mut R) -> Result<Self, FormatError> {
        match AccessFlags::from_bits(buffer.read_u16::<BigEndian>()?) {
            Some(flags) => Ok(flags),
            None => Err(FormatError::BadAccessFlags),
        }
    }
}

/// Description of a single field: no storage lives here.
#[derive(Debug, Clone)]
pub struct Field {
    pub access: AccessFlags,
    pub name: String,
    pub descriptor: String,
    ty: Type,
}

impl Field {
    pub fn new(access: AccessFlags, name: String, descriptor: String) -> Result<Self, FormatError> {
        let (ty, _) = Type::parse_field_descriptor(&descriptor)?;
        Ok(Field {
            access,
            name,
            descriptor,
            ty,
        })
    }

    pub fn ty(&self) -> Type {
        self.ty
    }

    pub fn is_static(&self) -> bool {
        self.access.contains(AccessFlags::STATIC)
    }

    /// Size of this field in bytes inside field storage.
    pub fn size(&self) -> usize {
        Type::size_in_bytes(self.ty)
    }
}

/// A method owned by its class, immutable after construction.
#[derive(Debug)]
pub struct Method {
    pub access: AccessFlags,
    pub name: String,
    pub descriptor: String,
    pub max_stack: u16,
    pub max_locals: u16,
    pub code: BciMap<Instruction>,
    pub stack_map: Option<StackMapTableBuilder>,
}

impl Method {
    pub fn is_static(&self) -> bool {
        self.access.contains(AccessFlags::STATIC)
    }
}

/// Parsed class description: constant pool, fields and methods. Created by
/// one of the decoders and owned by the class manager for the lifetime of
/// the process.
#[derive(Debug)]
pub struct Class {
    pub access: AccessFlags,
    name: String,
    super_name: Option<String>,
    fields: Vec<Field>,
    methods: Vec<Method>,
    pool: ConstantPool,
}

impl Class {
    pub fn new(
        access: AccessFlags,
        this_class: PoolIndex,
        super_class: Option<PoolIndex>,
        fields: Vec<Field>,
        methods: Vec<Method>,
        pool: ConstantPool,
    ) -> Result<Self, FormatError> {
        let name = pool.class_name(this_class)?.to_string();
        let super_name = match super_class {
            Some(index) => Some(pool.class_name(index)?.to_string()),
            None => None,
        };

        Ok(Class {
            access,
            name,
            super_name,
            fields,
            methods,
            pool,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn super_name(&self) -> Option<&str> {
        self.super_name.as_deref()
    }

    pub fn pool(&self) -> &ConstantPool {
        &self.pool
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    /// First method with the given name, disregarding the descriptor.
    pub fn method(&self, name: &str) -> Option<&Method> {
        self.methods.iter().find(|method| method.name == name)
    }

    pub fn method_with_descriptor(&self, name: &str, descriptor: &str) -> Option<&Method> {
        self.methods
            .iter()
            .find(|method| method.name == name && method.descriptor == descriptor)
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Decode a binary class file.
    pub fn parse<R: Read + ?Sized>(buffer: &mut R) -> Result<Self, FormatError> {
        check_magic_number(buffer)?;

        let version = ClassVersion::read(buffer)?;
        version.check_supported()?;
        trace!("Class version: {:?}", version);

        let pool = parse_constant_pool(buffer)?;
        trace!("Read {} constant(s)", pool.len());

        let access = AccessFlags::read(buffer)?;
        trace!("Access flags: {:?}", access);

        let this_class = buffer.read_u16::<BigEndian>()?;
        let super_class = match buffer.read_u16::<BigEndian>()? {
            0 => None,
            index => Some(index),
        };

        let interfaces_count = buffer.read_u16::<BigEndian>()?;
        if interfaces_count != 0 {
            return Err(FormatError::InterfacesUnsupported);
        }

        let fields_count = buffer.read_u16::<BigEndian>()?;
        let mut fields = Vec::with_capacity(fields_count as usize);
        for _ in 0..fields_count {
            fields.push(parse_field(buffer, &pool)?);
        }
        trace!("Read {} field(s)", fields.len());

        let methods_count = buffer.read_u16::<BigEndian>()?;
        let mut methods = Vec::with_capacity(methods_count as usize);
        for _ in 0..methods_count {
            methods.push(parse_method(buffer, &pool)?);
        }
        trace!("Read {} method(s)", methods.len());

        // Top level class attributes are skipped
        let _ = AttributeInfo::read_table(buffer)?;

        Class::new(access, this_class, super_class, fields, methods, pool)
    }
}

fn parse_constant_pool<R: Read + ?Sized>(buffer: &mut R) -> Result<ConstantPool, FormatError> {
    let constant_pool_count = buffer.read_u16::<BigEndian>()?;
    // The count is one larger than the actual number of records
    let size = constant_pool_count.saturating_sub(1);

    let mut builder = ConstantPoolBuilder::new(size);
    for index in 1..=size {
        parse_constant_record(buffer, &mut builder, index)?;
    }

    Ok(builder.seal()?)
}

fn parse_constant_record<R: Read + ?Sized>(
    buffer: &mut R,
    builder: &mut ConstantPoolBuilder,
    index: PoolIndex,
) -> Result<(), FormatError> {
    const CONSTANT_UTF8: u8 = 1;
    const CONSTANT_CLASS: u8 = 7;
    const CONSTANT_FIELDREF: u8 = 9;
    const CONSTANT_METHODREF: u8 = 10;
    const CONSTANT_NAME_AND_TYPE: u8 = 12;

    let tag = buffer.read_u8()?;
    match tag {
        CONSTANT_UTF8 => {
            let length = buffer.read_u16::<BigEndian>()?;

            let mut value = String::with_capacity(length as usize);
            for _ in 0..length {
                let byte = buffer.read_u8()?;
                // Specification requirements
                if byte == 0 || byte >= 0xf0 {
                    return Err(FormatError::BadUtf8Byte(index));
                }
                // Only plain ASCII is supported
                if byte > 0x7f {
                    return Err(FormatError::UnsupportedUnicode(index));
                }
                value.push(byte as char);
            }

            builder.set(index, Constant::Utf8(value))?;
        }
        CONSTANT_CLASS => {
            let raw_name = buffer.read_u16::<BigEndian>()?;
            let name_index = builder.cell_ref(raw_name, ConstantTag::Utf8)?;
            builder.set(index, Constant::Class { name_index })?;
        }
        CONSTANT_FIELDREF => {
            let raw_class = buffer.read_u16::<BigEndian>()?;
            let raw_nat = buffer.read_u16::<BigEndian>()?;
            let class_index = builder.cell_ref(raw_class, ConstantTag::Class)?;
            let name_and_type_index = builder.cell_ref(raw_nat, ConstantTag::NameAndType)?;
            builder.set(
                index,
                Constant::FieldRef {
                    class_index,
                    name_and_type_index,
                },
            )?;
        }
        CONSTANT_METHODREF => {
            let raw_class = buffer.read_u16::<BigEndian>()?;
            let raw_nat = buffer.read_u16::<BigEndian>()?;
            let class_index = builder.cell_ref(raw_class, ConstantTag::Class)?;
            let name_and_type_index = builder.cell_ref(raw_nat, ConstantTag::NameAndType)?;
            builder.set(
                index,
                Constant::MethodRef {
                    class_index,
                    name_and_type_index,
                },
            )?;
        }
        CONSTANT_NAME_AND_TYPE => {
            let raw_name = buffer.read_u16::<BigEndian>()?;
            let raw_descriptor = buffer.read_u16::<BigEndian>()?;
            let name_index = builder.cell_ref(raw_name, ConstantTag::Utf8)?;
            let descriptor_index = builder.cell_ref(raw_descriptor, ConstantTag::Utf8)?;
            builder.set(
                index,
                Constant::NameAndType {
                    name_index,
                    descriptor_index,
                },
            )?;
        }
        other => return Err(FormatError::UnsupportedTag(other)),
    }

    Ok(())
}

fn parse_field<R: Read + ?Sized>(buffer: &mut R, pool: &ConstantPool) -> Result<Field, FormatError> {
    let access = AccessFlags::read(buffer)?;
    let name = pool.utf8(buffer.read_u16::<BigEndian>()?)?.to_string();
    let descriptor = pool.utf8(buffer.read_u16::<BigEndian>()?)?.to_string();

    // Attributes carry no information this core uses
    let _ = AttributeInfo::read_table(buffer)?;

    Field::new(access, name, descriptor)
}

fn parse_method<R: Read + ?Sized>(buffer: &mut R, pool: &ConstantPool) -> Result<Method, FormatError> {
    let access = AccessFlags::read(buffer)?;
    let name = pool.utf8(buffer.read_u16::<BigEndian>()?)?.to_string();
    let descriptor = pool.utf8(buffer.read_u16::<BigEndian>()?)?.to_string();

    let mut code = None;
    for attribute in AttributeInfo::read_table(buffer)? {
        if pool.utf8(attribute.name_index)? == "Code" {
            code = Some(CodeAttribute::read(pool, &attribute.info)?);
        }
    }

    let CodeAttribute {
        max_stack,
        max_locals,
        instructions,
        stack_map,
    } = code.ok_or(FormatError::MissingCode)?;

    trace!("Method {}{}", name, descriptor);

    Ok(Method {
        access,
        name,
        descriptor,
        max_stack,
        max_locals,
        code: instructions,
        stack_map,
    })
}
