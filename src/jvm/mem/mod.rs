//! Runtime values and field storage.
//!
//! Values shorter than 32 bits are promoted to `JavaInt` on creation, so a
//! `JavaValue` only ever carries one of the five machine-level shapes.
//! Field storage keeps the declared (non-promoted) byte widths, so moving a
//! value in and out of storage truncates and re-extends exactly as the
//! declared field type demands.

use std::num::NonZeroU64;
use std::rc::Rc;

use thiserror::Error;

use crate::class::{Class, Field};
use crate::types::Type;

pub type JavaBool = i8;
pub type JavaByte = i8;
pub type JavaChar = u16;
pub type JavaShort = i16;
pub type JavaInt = i32;
pub type JavaLong = i64;
pub type JavaFloat = f32;
pub type JavaDouble = f64;

/// Opaque handle to a heap instance. The instance arena is owned by the
/// class manager; the core never dereferences these directly. The zero bit
/// pattern is reserved for null so a reference fits its 8-byte storage slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceId(NonZeroU64);

impl InstanceId {
    pub(crate) fn from_index(index: usize) -> Self {
        InstanceId(NonZeroU64::new(index as u64 + 1).expect("index + 1 is never zero"))
    }

    pub(crate) fn index(self) -> usize {
        self.0.get() as usize - 1
    }

    fn to_raw(reference: Option<InstanceId>) -> u64 {
        match reference {
            Some(id) => id.0.get(),
            None => 0,
        }
    }

    fn from_raw(raw: u64) -> Option<InstanceId> {
        NonZeroU64::new(raw).map(InstanceId)
    }
}

/// A value holds a runtime type that does not match the requested one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unexpected runtime value type")]
pub struct BadAccess;

/// No field with the requested name exists in the storage.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognized field {0}")]
pub struct UnrecognizedField(pub String);

/// Type-erased runtime value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum JavaValue {
    Int(JavaInt),
    Long(JavaLong),
    Float(JavaFloat),
    Double(JavaDouble),
    Reference(Option<InstanceId>),
}

impl JavaValue {
    pub fn null() -> Self {
        JavaValue::Reference(None)
    }

    pub fn from_bool(value: JavaBool) -> Self {
        JavaValue::Int(value as JavaInt)
    }

    pub fn from_byte(value: JavaByte) -> Self {
        JavaValue::Int(value as JavaInt)
    }

    pub fn from_char(value: JavaChar) -> Self {
        JavaValue::Int(value as JavaInt)
    }

    pub fn from_short(value: JavaShort) -> Self {
        JavaValue::Int(value as JavaInt)
    }

    pub fn as_int(&self) -> Result<JavaInt, BadAccess> {
        match self {
            JavaValue::Int(value) => Ok(*value),
            _ => Err(BadAccess),
        }
    }

    pub fn as_byte(&self) -> Result<JavaByte, BadAccess> {
        Ok(self.as_int()? as JavaByte)
    }

    pub fn as_char(&self) -> Result<JavaChar, BadAccess> {
        Ok(self.as_int()? as JavaChar)
    }

    pub fn as_short(&self) -> Result<JavaShort, BadAccess> {
        Ok(self.as_int()? as JavaShort)
    }

    pub fn as_bool(&self) -> Result<JavaBool, BadAccess> {
        Ok(self.as_int()? as JavaBool)
    }

    pub fn as_long(&self) -> Result<JavaLong, BadAccess> {
        match self {
            JavaValue::Long(value) => Ok(*value),
            _ => Err(BadAccess),
        }
    }

    pub fn as_float(&self) -> Result<JavaFloat, BadAccess> {
        match self {
            JavaValue::Float(value) => Ok(*value),
            _ => Err(BadAccess),
        }
    }

    pub fn as_double(&self) -> Result<JavaDouble, BadAccess> {
        match self {
            JavaValue::Double(value) => Ok(*value),
            _ => Err(BadAccess),
        }
    }

    pub fn as_reference(&self) -> Result<Option<InstanceId>, BadAccess> {
        match self {
            JavaValue::Reference(value) => Ok(*value),
            _ => Err(BadAccess),
        }
    }

    /// Read a value of static type `ty` from the start of `memory`,
    /// sign- or zero-extending small integers to their promoted form.
    /// `memory` must hold at least `Type::size_in_bytes(ty)` bytes.
    pub fn from_memory(ty: Type, memory: &[u8]) -> JavaValue {
        fn read<const N: usize>(memory: &[u8]) -> [u8; N] {
            let mut bytes = [0u8; N];
            bytes.copy_from_slice(&memory[..N]);
            bytes
        }

        match ty {
            Type::Int => JavaValue::Int(JavaInt::from_ne_bytes(read(memory))),
            Type::Byte => JavaValue::from_byte(JavaByte::from_ne_bytes(read(memory))),
            Type::Boolean => JavaValue::from_bool(JavaBool::from_ne_bytes(read(memory))),
            Type::Char => JavaValue::from_char(JavaChar::from_ne_bytes(read(memory))),
            Type::Short => JavaValue::from_short(JavaShort::from_ne_bytes(read(memory))),
            Type::Float => JavaValue::Float(JavaFloat::from_ne_bytes(read(memory))),
            Type::Long => JavaValue::Long(JavaLong::from_ne_bytes(read(memory))),
            Type::Double => JavaValue::Double(JavaDouble::from_ne_bytes(read(memory))),
            _ if Type::is_assignable(ty, Type::Reference) => {
                JavaValue::Reference(InstanceId::from_raw(u64::from_ne_bytes(read(memory))))
            }
            _ => unreachable!("from_memory on {:?}", ty),
        }
    }

    /// Store the value at the start of `memory` as static type `ty`,
    /// truncating promoted integers back to the declared width.
    /// `memory` must hold at least `Type::size_in_bytes(ty)` bytes.
    pub fn to_memory(memory: &mut [u8], value: &JavaValue, ty: Type) -> Result<(), BadAccess> {
        fn write<const N: usize>(memory: &mut [u8], bytes: [u8; N]) {
            memory[..N].copy_from_slice(&bytes);
        }

        match ty {
            Type::Int => write(memory, value.as_int()?.to_ne_bytes()),
            Type::Byte => write(memory, value.as_byte()?.to_ne_bytes()),
            Type::Boolean => write(memory, value.as_bool()?.to_ne_bytes()),
            Type::Char => write(memory, value.as_char()?.to_ne_bytes()),
            Type::Short => write(memory, value.as_short()?.to_ne_bytes()),
            Type::Float => write(memory, value.as_float()?.to_ne_bytes()),
            Type::Long => write(memory, value.as_long()?.to_ne_bytes()),
            Type::Double => write(memory, value.as_double()?.to_ne_bytes()),
            _ if Type::is_assignable(ty, Type::Reference) => {
                write(memory, InstanceId::to_raw(value.as_reference()?).to_ne_bytes())
            }
            _ => unreachable!("to_memory as {:?}", ty),
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Static,
    Instance,
}

/// A contiguous byte buffer holding either all static or all instance
/// fields of a class, laid out in declaration order with no padding.
#[derive(Debug)]
pub struct FieldStorage {
    class: Rc<Class>,
    kind: FieldKind,
    data: Vec<u8>,
}

impl FieldStorage {
    pub fn new(class: Rc<Class>, kind: FieldKind) -> Self {
        let size = class
            .fields()
            .iter()
            .filter(|field| manages(kind, field))
            .map(Field::size)
            .sum();

        FieldStorage {
            class,
            kind,
            data: vec![0u8; size],
        }
    }

    /// Locate a managed field, yielding its description and byte offset.
    pub fn find_field_and_offset(&self, name: &str) -> Result<(&Field, usize), UnrecognizedField> {
        let mut offset = 0;
        for field in self.class.fields() {
            if field.name == name && manages(self.kind, field) {
                return Ok((field, offset));
            }
            if manages(self.kind, field) {
                offset += field.size();
            }
        }

        Err(UnrecognizedField(name.to_string()))
    }

    pub fn get_field(&self, name: &str) -> Result<JavaValue, UnrecognizedField> {
        let (field, offset) = self.find_field_and_offset(name)?;
        Ok(JavaValue::from_memory(field.ty(), &self.data[offset..]))
    }

    pub fn set_field(&mut self, name: &str, value: &JavaValue) -> Result<(), FieldAccessError> {
        let (field, offset) = self.find_field_and_offset(name)?;
        let (ty, size) = (field.ty(), field.size());
        debug_assert!(offset + size <= self.data.len());

        JavaValue::to_memory(&mut self.data[offset..], value, ty)?;
        Ok(())
    }
}

fn manages(kind: FieldKind, field: &Field) -> bool {
    match kind {
        FieldKind::Static => field.is_static(),
        FieldKind::Instance => !field.is_static(),
    }
}

/// Failure modes of a field write.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldAccessError {
    #[error(transparent)]
    Unrecognized(#[from] UnrecognizedField),
    #[error(transparent)]
    BadAccess(#[from] BadAccess),
}

/// Runtime representation of a loaded class: its static field storage plus
/// the owning class description. Created once per class during linking.
#[derive(Debug)]
pub struct ClassObject {
    class: Rc<Class>,
    fields: FieldStorage,
}

impl ClassObject {
    /// Creates the class object with zero-initialized statics (preparation).
    pub fn new(class: Rc<Class>) -> Self {
        let fields = FieldStorage::new(Rc::clone(&class), FieldKind::Static);
        ClassObject { class, fields }
    }

    pub fn class(&self) -> &Rc<Class> {
        &self.class
    }

    pub fn get_field(&self, name: &str) -> Result<JavaValue, UnrecognizedField> {
        self.fields.get_field(name)
    }

    pub fn set_field(&mut self, name: &str, value: &JavaValue) -> Result<(), FieldAccessError> {
        self.fields.set_field(name, value)
    }
}

/// A heap instance: instance field storage plus its class.
#[derive(Debug)]
pub struct InstanceObject {
    class: Rc<Class>,
    fields: FieldStorage,
}

impl InstanceObject {
    pub fn new(class: Rc<Class>) -> Self {
        let fields = FieldStorage::new(Rc::clone(&class), FieldKind::Instance);
        InstanceObject { class, fields }
    }

    pub fn class(&self) -> &Rc<Class> {
        &self.class
    }

    pub fn get_field(&self, name: &str) -> Result<JavaValue, UnrecognizedField> {
        self.fields.get_field(name)
    }

    pub fn set_field(&mut self, name: &str, value: &JavaValue) -> Result<(), FieldAccessError> {
        self.fields.set_field(name, value)
    }
}
