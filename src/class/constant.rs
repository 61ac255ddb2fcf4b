//! Constant pool records, the builder used during class decoding and the
//! sealed immutable pool.
//!
//! Records may reference cells that are not populated yet (the class file
//! format allows forward references), so construction is split in two steps:
//! a builder collects records together with the record kind every referenced
//! cell is *expected* to have, and sealing checks that every cell is
//! populated and every cross-reference resolves to a record of the declared
//! kind.

use std::fmt;

use thiserror::Error;

/// 1-based index into a constant pool.
pub type PoolIndex = u16;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("Invalid constant pool index {0}")]
    InvalidIndex(PoolIndex),
    #[error("Incompatible cell type at index {index}: expected {expected}, found {found}")]
    IncompatibleCellType {
        index: PoolIndex,
        expected: ConstantTag,
        found: ConstantTag,
    },
    #[error("Unallocated record at index {0}")]
    UnallocatedCell(PoolIndex),
    #[error("Unexpected record type at index {index}: expected {expected}")]
    MismatchedType {
        index: PoolIndex,
        expected: ConstantTag,
    },
}

/// Discriminant of a constant pool record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstantTag {
    Utf8,
    Class,
    FieldRef,
    MethodRef,
    NameAndType,
}

impl fmt::Display for ConstantTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConstantTag::Utf8 => "Utf8",
            ConstantTag::Class => "ClassInfo",
            ConstantTag::FieldRef => "FieldRef",
            ConstantTag::MethodRef => "MethodRef",
            ConstantTag::NameAndType => "NameAndType",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constant {
    Utf8(String),
    Class {
        name_index: PoolIndex,
    },
    FieldRef {
        class_index: PoolIndex,
        name_and_type_index: PoolIndex,
    },
    MethodRef {
        class_index: PoolIndex,
        name_and_type_index: PoolIndex,
    },
    NameAndType {
        name_index: PoolIndex,
        descriptor_index: PoolIndex,
    },
}

impl Constant {
    pub fn tag(&self) -> ConstantTag {
        match self {
            Constant::Utf8(_) => ConstantTag::Utf8,
            Constant::Class { .. } => ConstantTag::Class,
            Constant::FieldRef { .. } => ConstantTag::FieldRef,
            Constant::MethodRef { .. } => ConstantTag::MethodRef,
            Constant::NameAndType { .. } => ConstantTag::NameAndType,
        }
    }

    /// The cells this record references, paired with the kind each target
    /// cell must hold.
    fn references(&self) -> Vec<(PoolIndex, ConstantTag)> {
        match *self {
            Constant::Utf8(_) => Vec::new(),
            Constant::Class { name_index } => vec![(name_index, ConstantTag::Utf8)],
            Constant::FieldRef {
                class_index,
                name_and_type_index,
            }
            | Constant::MethodRef {
                class_index,
                name_and_type_index,
            } => vec![
                (class_index, ConstantTag::Class),
                (name_and_type_index, ConstantTag::NameAndType),
            ],
            Constant::NameAndType {
                name_index,
                descriptor_index,
            } => vec![
                (name_index, ConstantTag::Utf8),
                (descriptor_index, ConstantTag::Utf8),
            ],
        }
    }
}

/// Fully resolved view of a `FieldRef` or `MethodRef` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberRef<'a> {
    pub class_name: &'a str,
    pub name: &'a str,
    pub descriptor: &'a str,
}

/// Immutable, sealed constant pool with O(1) type-safe access.
#[derive(Debug)]
pub struct ConstantPool {
    records: Vec<Constant>,
}

impl ConstantPool {
    /// Number of records. External indices are 1-based.
    pub fn len(&self) -> PoolIndex {
        self.records.len() as PoolIndex
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_valid_index(&self, index: PoolIndex) -> bool {
        index >= 1 && index <= self.len()
    }

    pub fn get(&self, index: PoolIndex) -> Option<&Constant> {
        if !self.is_valid_index(index) {
            return None;
        }
        Some(&self.records[index as usize - 1])
    }

    fn checked(&self, index: PoolIndex) -> Result<&Constant, PoolError> {
        self.get(index).ok_or(PoolError::InvalidIndex(index))
    }

    pub fn utf8(&self, index: PoolIndex) -> Result<&str, PoolError> {
        match self.checked(index)? {
            Constant::Utf8(value) => Ok(value),
            _ => Err(PoolError::MismatchedType {
                index,
                expected: ConstantTag::Utf8,
            }),
        }
    }

    /// Resolve a `ClassInfo` record to the class name it refers to.
    pub fn class_name(&self, index: PoolIndex) -> Result<&str, PoolError> {
        match self.checked(index)? {
            Constant::Class { name_index } => self.utf8(*name_index),
            _ => Err(PoolError::MismatchedType {
                index,
                expected: ConstantTag::Class,
            }),
        }
    }

    /// Resolve a `NameAndType` record to `(name, descriptor)`.
    pub fn name_and_type(&self, index: PoolIndex) -> Result<(&str, &str), PoolError> {
        match self.checked(index)? {
            Constant::NameAndType {
                name_index,
                descriptor_index,
            } => Ok((self.utf8(*name_index)?, self.utf8(*descriptor_index)?)),
            _ => Err(PoolError::MismatchedType {
                index,
                expected: ConstantTag::NameAndType,
            }),
        }
    }

    pub fn field_ref(&self, index: PoolIndex) -> Result<MemberRef<'_>, PoolError> {
        match self.checked(index)? {
            Constant::FieldRef {
                class_index,
                name_and_type_index,
            } => {
                let (name, descriptor) = self.name_and_type(*name_and_type_index)?;
                Ok(MemberRef {
                    class_name: self.class_name(*class_index)?,
                    name,
                    descriptor,
                })
            }
            _ => Err(PoolError::MismatchedType {
                index,
                expected: ConstantTag::FieldRef,
            }),
        }
    }

    pub fn method_ref(&self, index: PoolIndex) -> Result<MemberRef<'_>, PoolError> {
        match self.checked(index)? {
            Constant::MethodRef {
                class_index,
                name_and_type_index,
            } => {
                let (name, descriptor) = self.name_and_type(*name_and_type_index)?;
                Ok(MemberRef {
                    class_name: self.class_name(*class_index)?,
                    name,
                    descriptor,
                })
            }
            _ => Err(PoolError::MismatchedType {
                index,
                expected: ConstantTag::MethodRef,
            }),
        }
    }
}

/// Builder for a constant pool of a known capacity.
///
/// `cell_ref` hands out a reference to a cell together with the record kind
/// the caller expects to find there. Expectations accumulate: asking for the
/// same cell with two different kinds, or populating a cell with a record of
/// another kind than expected, is an error.
#[derive(Debug)]
pub struct ConstantPoolBuilder {
    cells: Vec<Option<Constant>>,
    expected: Vec<Option<ConstantTag>>,
}

impl ConstantPoolBuilder {
    pub fn new(capacity: PoolIndex) -> Self {
        ConstantPoolBuilder {
            cells: vec![None; capacity as usize],
            expected: vec![None; capacity as usize],
        }
    }

    pub fn capacity(&self) -> PoolIndex {
        self.cells.len() as PoolIndex
    }

    pub fn is_valid_index(&self, index: PoolIndex) -> bool {
        index >= 1 && index <= self.capacity()
    }

    fn slot(&self, index: PoolIndex) -> Result<usize, PoolError> {
        if !self.is_valid_index(index) {
            return Err(PoolError::InvalidIndex(index));
        }
        Ok(index as usize - 1)
    }

    /// Hand out a handle to cell `index`, recording that the cell is
    /// expected to hold a record of kind `tag`.
    pub fn cell_ref(&mut self, index: PoolIndex, tag: ConstantTag) -> Result<PoolIndex, PoolError> {
        let slot = self.slot(index)?;

        if let Some(record) = &self.cells[slot] {
            if record.tag() != tag {
                return Err(PoolError::IncompatibleCellType {
                    index,
                    expected: record.tag(),
                    found: tag,
                });
            }
        }

        match self.expected[slot] {
            None => self.expected[slot] = Some(tag),
            Some(existing) if existing == tag => {}
            Some(existing) => {
                return Err(PoolError::IncompatibleCellType {
                    index,
                    expected: existing,
                    found: tag,
                })
            }
        }

        Ok(index)
    }

    /// Populate cell `index`. Re-setting a cell is permitted; the final
    /// record is checked against all previously recorded expectations.
    pub fn set(&mut self, index: PoolIndex, record: Constant) -> Result<(), PoolError> {
        let slot = self.slot(index)?;

        if let Some(expected) = self.expected[slot] {
            if expected != record.tag() {
                return Err(PoolError::IncompatibleCellType {
                    index,
                    expected,
                    found: record.tag(),
                });
            }
        }

        self.cells[slot] = Some(record);
        Ok(())
    }

    /// Verify completeness and produce the immutable pool: every cell must
    /// be populated and every cross-reference must target a populated cell
    /// of the declared kind.
    pub fn seal(self) -> Result<ConstantPool, PoolError> {
        let mut records = Vec::with_capacity(self.cells.len());
        for (slot, cell) in self.cells.iter().enumerate() {
            match cell {
                Some(record) => records.push(record.clone()),
                None => return Err(PoolError::UnallocatedCell(slot as PoolIndex + 1)),
            }
        }

        let pool = ConstantPool { records };

        for record in &pool.records {
            for (target, tag) in record.references() {
                let found = pool.get(target).ok_or(PoolError::InvalidIndex(target))?;
                if found.tag() != tag {
                    return Err(PoolError::MismatchedType {
                        index: target,
                        expected: tag,
                    });
                }
            }
        }

        Ok(pool)
    }
}
