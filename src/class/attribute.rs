//! Attribute decoding: the raw attribute table, the `Code` attribute and the
//! `StackMapTable` it may carry. Attributes this core does not understand are
//! skipped, bounded by their declared lengths.

use std::io::{Cursor, Read};

use byteorder::{BigEndian, ReadBytesExt};

use crate::class::constant::ConstantPool;
use crate::class::FormatError;
use crate::instruction::{self, BciMap, BciType, Instruction};
use crate::types::Type;
use crate::verifier::StackMapTableBuilder;

/// A raw attribute: its name (a `Utf8` pool index) plus the undecoded body.
#[derive(Debug, Clone)]
pub struct AttributeInfo {
    pub name_index: u16,
    pub info: Vec<u8>,
}

impl AttributeInfo {
    pub fn read<R: Read + ?Sized>(buffer: &mut R) -> Result<Self, FormatError> {
        let name_index = buffer.read_u16::<BigEndian>()?;
        let length = buffer.read_u32::<BigEndian>()?;

        let mut info = vec![0u8; length as usize];
        buffer.read_exact(&mut info)?;

        Ok(AttributeInfo { name_index, info })
    }

    /// Read `attributes_count` followed by that many attributes.
    pub fn read_table<R: Read + ?Sized>(buffer: &mut R) -> Result<Vec<Self>, FormatError> {
        let count = buffer.read_u16::<BigEndian>()?;

        let mut attributes = Vec::with_capacity(count as usize);
        for _ in 0..count {
            attributes.push(AttributeInfo::read(buffer)?);
        }

        Ok(attributes)
    }
}

/// Decoded body of the `Code` attribute.
#[derive(Debug)]
pub struct CodeAttribute {
    pub max_stack: u16,
    pub max_locals: u16,
    pub instructions: BciMap<Instruction>,
    pub stack_map: Option<StackMapTableBuilder>,
}

impl CodeAttribute {
    pub fn read(pool: &ConstantPool, info: &[u8]) -> Result<Self, FormatError> {
        let mut buffer = Cursor::new(info);

        let max_stack = buffer.read_u16::<BigEndian>()?;
        let max_locals = buffer.read_u16::<BigEndian>()?;

        let code_length = buffer.read_u32::<BigEndian>()?;
        let mut code = vec![0u8; code_length as usize];
        buffer.read_exact(&mut code)?;
        let instructions = instruction::parse_instructions(&code)?;

        // Exception tables are parsed past but otherwise unused
        let exception_table_length = buffer.read_u16::<BigEndian>()?;
        let mut exception_table = vec![0u8; exception_table_length as usize * 8];
        buffer.read_exact(&mut exception_table)?;

        let mut stack_map = None;
        for attribute in AttributeInfo::read_table(&mut buffer)? {
            if pool.utf8(attribute.name_index)? == "StackMapTable" {
                stack_map = Some(read_stack_map_table(&attribute.info)?);
            }
        }

        Ok(CodeAttribute {
            max_stack,
            max_locals,
            instructions,
            stack_map,
        })
    }
}

/// Decode a `StackMapTable` attribute body into builder actions.
///
/// Only the *same* frames (`frame_type` 0..=63) and the *append* frames
/// (`frame_type` 252..=254) are supported; this narrowing matches the rest
/// of the core and every other frame type is a format error.
fn read_stack_map_table(info: &[u8]) -> Result<StackMapTableBuilder, FormatError> {
    let mut buffer = Cursor::new(info);
    let number_of_entries = buffer.read_u16::<BigEndian>()?;

    let mut builder = StackMapTableBuilder::new();
    // The delta encoding starts one before the first instruction, so the
    // first entry lands exactly on its delta.
    let mut current_bci = -1i64;

    for _ in 0..number_of_entries {
        let frame_type = buffer.read_u8()?;

        match frame_type {
            0..=63 => {
                current_bci += frame_type as i64 + 1;
                builder.add_same(current_bci as BciType);
            }
            252..=254 => {
                let offset_delta = buffer.read_u16::<BigEndian>()?;
                let count = frame_type - 251;

                let mut new_locals = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    new_locals.push(read_verification_type(&mut buffer)?);
                }

                current_bci += offset_delta as i64 + 1;
                builder.add_append(current_bci as BciType, new_locals);
            }
            other => return Err(FormatError::UnknownStackMapFrame(other)),
        }
    }

    Ok(builder)
}

/// Decode a single `verification_type_info` union member.
fn read_verification_type<R: Read + ?Sized>(buffer: &mut R) -> Result<Type, FormatError> {
    let tag = buffer.read_u8()?;

    Ok(match tag {
        0 => Type::Top,
        1 => Type::Int,
        2 => Type::Float,
        3 => Type::Double,
        4 => Type::Long,
        5 => Type::Null,
        6 => Type::UninitializedThis,
        7 => {
            // Object_variable_info carries a class index which this core
            // collapses into the bare Class type
            let _ = buffer.read_u16::<BigEndian>()?;
            Type::Class
        }
        8 => {
            let offset = buffer.read_u16::<BigEndian>()?;
            Type::UninitializedOffset(Some(offset as u32))
        }
        other => return Err(FormatError::UnknownVerificationType(other)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::constant::{Constant, ConstantPoolBuilder};

    fn pool_with_utf8(values: &[&str]) -> ConstantPool {
        let mut builder = ConstantPoolBuilder::new(values.len() as u16);
        for (index, value) in values.iter().enumerate() {
            builder
                .set(index as u16 + 1, Constant::Utf8(value.to_string()))
                .unwrap();
        }
        builder.seal().unwrap()
    }

    fn code_attribute(code: &[u8], nested: &[u8]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&2u16.to_be_bytes()); // max_stack
        body.extend_from_slice(&3u16.to_be_bytes()); // max_locals
        body.extend_from_slice(&(code.len() as u32).to_be_bytes());
        body.extend_from_slice(code);
        body.extend_from_slice(&0u16.to_be_bytes()); // exception_table_length
        body.extend_from_slice(nested);
        body
    }

    #[test]
    fn decodes_code_and_bci() {
        let pool = pool_with_utf8(&["Code"]);
        let body = code_attribute(&[0x03, 0xac], &0u16.to_be_bytes());

        let code = CodeAttribute::read(&pool, &body).unwrap();
        assert_eq!(code.max_stack, 2);
        assert_eq!(code.max_locals, 3);
        assert_eq!(code.instructions.get(0), Some(&Instruction::Iconst0));
        assert_eq!(code.instructions.get(1), Some(&Instruction::Ireturn));
        assert!(code.stack_map.is_none());
    }

    #[test]
    fn skips_exception_table_by_length() {
        let pool = pool_with_utf8(&["Code"]);

        let mut body = Vec::new();
        body.extend_from_slice(&1u16.to_be_bytes());
        body.extend_from_slice(&1u16.to_be_bytes());
        body.extend_from_slice(&1u32.to_be_bytes());
        body.push(0xb1); // return
        body.extend_from_slice(&1u16.to_be_bytes()); // one exception entry
        body.extend_from_slice(&[0u8; 8]);
        body.extend_from_slice(&0u16.to_be_bytes()); // no nested attributes

        let code = CodeAttribute::read(&pool, &body).unwrap();
        assert_eq!(code.instructions.len(), 1);
    }

    #[test]
    fn unknown_nested_attributes_are_skipped() {
        let pool = pool_with_utf8(&["LineNumberTable"]);

        let mut nested = Vec::new();
        nested.extend_from_slice(&1u16.to_be_bytes()); // one attribute
        nested.extend_from_slice(&1u16.to_be_bytes()); // name -> LineNumberTable
        nested.extend_from_slice(&4u32.to_be_bytes());
        nested.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef]);

        let body = code_attribute(&[0xb1], &nested);
        let code = CodeAttribute::read(&pool, &body).unwrap();
        assert!(code.stack_map.is_none());
    }

    #[test]
    fn stack_map_same_and_append_frames() {
        let pool = pool_with_utf8(&["StackMapTable"]);

        let mut table = Vec::new();
        table.extend_from_slice(&2u16.to_be_bytes()); // two entries
        table.push(5); // same frame, bci -1 + 5 + 1 = 5
        table.push(253); // append two locals
        table.extend_from_slice(&2u16.to_be_bytes()); // offset delta
        table.push(1); // Int
        table.push(3); // Double

        let mut nested = Vec::new();
        nested.extend_from_slice(&1u16.to_be_bytes());
        nested.extend_from_slice(&1u16.to_be_bytes());
        nested.extend_from_slice(&(table.len() as u32).to_be_bytes());
        nested.extend_from_slice(&table);

        let body = code_attribute(&[0xb1], &nested);
        let code = CodeAttribute::read(&pool, &body).unwrap();

        let builder = code.stack_map.unwrap();
        let frames = builder.create_table(&[Type::Class]);
        assert!(frames.at(5).is_some());
        // 5 + 2 + 1 = 8
        let appended = frames.at(8).unwrap();
        assert_eq!(appended.num_locals(), 4); // Class, Int, Double(+Top)
    }

    #[test]
    fn rejects_unsupported_frame_types() {
        let pool = pool_with_utf8(&["StackMapTable"]);

        let mut table = Vec::new();
        table.extend_from_slice(&1u16.to_be_bytes());
        table.push(255); // full_frame is not supported

        let mut nested = Vec::new();
        nested.extend_from_slice(&1u16.to_be_bytes());
        nested.extend_from_slice(&1u16.to_be_bytes());
        nested.extend_from_slice(&(table.len() as u32).to_be_bytes());
        nested.extend_from_slice(&table);

        let body = code_attribute(&[0xb1], &nested);
        assert!(matches!(
            CodeAttribute::read(&pool, &body),
            Err(FormatError::UnknownStackMapFrame(255))
        ));
    }

    #[test]
    fn uninitialized_variable_info_carries_bci() {
        let mut buffer = Cursor::new(vec![8u8, 0x00, 0x2a]);
        assert_eq!(
            read_verification_type(&mut buffer).unwrap(),
            Type::UninitializedOffset(Some(42))
        );

        let mut buffer = Cursor::new(vec![9u8]);
        assert!(matches!(
            read_verification_type(&mut buffer),
            Err(FormatError::UnknownVerificationType(9))
        ));
    }
}
