//! Data-flow verification of method bytecode against declared stack map
//! frames, per jvms 4.10.1.

use thiserror::Error;

pub mod frame;
pub mod stack_map;

pub use frame::StackFrame;
pub use stack_map::{StackMapTable, StackMapTableBuilder};

use crate::class::{AccessFlags, Class, Method};
use crate::instruction::{BciType, Instruction, LocalOp};
use crate::types::Type;

/// A verifier rule was violated. The message names the rule.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct VerificationError(pub String);

fn err<T>(message: impl Into<String>) -> Result<T, VerificationError> {
    Err(VerificationError(message.into()))
}

/// Verify every method of a class. Verification of the class aborts at the
/// first method that fails.
pub fn verify(class: &Class) -> Result<(), VerificationError> {
    if class.access != (AccessFlags::PUBLIC | AccessFlags::SUPER) {
        return err("Unsupported class access flags");
    }

    for method in class.methods() {
        verify_method(class, method)?;
    }

    Ok(())
}

/// Verify a single method of the class.
pub fn verify_method(class: &Class, method: &Method) -> Result<(), VerificationError> {
    MethodVerifier::new(class, method)?.run()
}

struct MethodVerifier<'a> {
    class: &'a Class,
    method: &'a Method,
    return_type: Type,
    frame: StackFrame,
    stack_map: StackMapTable,
    /// Set after an instruction that never falls through; the next
    /// instruction must then have a declared frame.
    after_jump: bool,
}

impl<'a> MethodVerifier<'a> {
    fn new(class: &'a Class, method: &'a Method) -> Result<Self, VerificationError> {
        let (return_type, argument_types) = Type::parse_method_descriptor(&method.descriptor)
            .map_err(|e| VerificationError(format!("Malformed method descriptor: {}", e)))?;

        // Entry frame locals from the descriptor. An instance method sees
        // its receiver in the first slot; for an instance initializer the
        // receiver starts out as uninitializedThis.
        let mut initial_locals = Vec::with_capacity(argument_types.len() + 1);
        if !method.is_static() {
            if method.name == "<init>" {
                initial_locals.push(Type::UninitializedThis);
            } else {
                initial_locals.push(Type::Class);
            }
        }
        for &argument in &argument_types {
            initial_locals.push(Type::to_stack_type(argument));
        }

        let mut frame = StackFrame::new(&initial_locals, &[]);
        if frame.num_locals() > method.max_locals as usize {
            return err("Too many locals");
        }
        frame.resize_locals(method.max_locals as usize);

        let stack_map = method
            .stack_map
            .clone()
            .unwrap_or_default()
            .create_table(&initial_locals);

        Ok(MethodVerifier {
            class,
            method,
            return_type,
            frame,
            stack_map,
            after_jump: false,
        })
    }

    fn run(mut self) -> Result<(), VerificationError> {
        let method = self.method;

        for (bci, instruction) in method.code.iter() {
            if self.after_jump {
                // No fall-through edge: the state is given entirely by the
                // declared frame.
                let declared = match self.stack_map.at(bci) {
                    Some(declared) => declared,
                    None => return err(format!("No stack map frame at bci {}", bci)),
                };
                self.frame = declared.clone();
                self.frame.resize_locals(self.method.max_locals as usize);
                self.after_jump = false;
            } else if let Some(declared) = self.stack_map.at(bci) {
                // Merge: the incoming frame must be assignable to the
                // declared one, which then becomes the current state.
                if !self.frame.transform_into(declared) {
                    return err(format!("Stack map frame mismatch at bci {}", bci));
                }
                self.frame.resize_locals(self.method.max_locals as usize);
            }

            self.step(bci, instruction)?;

            if self.frame.num_stack() > self.method.max_stack as usize {
                return err(format!("Operand stack overflow at bci {}", bci));
            }
        }

        Ok(())
    }

    fn step(&mut self, bci: BciType, instruction: &Instruction) -> Result<(), VerificationError> {
        use Instruction::*;

        if instruction.int_const().is_some() || matches!(instruction, Bipush(_)) {
            self.push(Type::Int)?;
            return Ok(());
        }
        if instruction.double_const().is_some() {
            self.push(Type::Double)?;
            return Ok(());
        }
        if let Some((op, local)) = instruction.local_access() {
            return self.local_access(op, local as usize);
        }
        if let Some((_, offset)) = instruction.compare_branch() {
            if !self.frame.pop_matching_list(&[Type::Int, Type::Int]) {
                return err("Expected integer type to be on the stack");
            }
            return self.check_branch_target(bci, offset);
        }

        match *instruction {
            Iadd => {
                if !self.frame.do_type_transition(&[Type::Int, Type::Int], Type::Int) {
                    return err("Expected integer type to be on the stack");
                }
            }

            Iinc { index, .. } => {
                match self.frame.get_local(index as usize) {
                    Some(ty) if ty == Type::Int => (),
                    Some(_) => return err("Expected integer type in local variable"),
                    None => return err("Local variable index is out of bounds"),
                }
            }

            Dup => {
                let top = match self.frame.top_stack() {
                    Some(top) => top,
                    None => return err("Stack is empty"),
                };
                if Type::size_of(top) != 1 {
                    return err("Can not duplicate a two-word type");
                }
                self.push(top)?;
            }

            Getstatic(index) => {
                let field_type = self.field_ref_type(index)?;
                self.push(Type::to_stack_type(field_type))?;
            }

            Putstatic(index) => {
                let field_type = self.field_ref_type(index)?;
                if self
                    .frame
                    .pop_matching_type(Type::to_stack_type(field_type))
                    .is_none()
                {
                    return err("Incompatible type in put static instruction");
                }
            }

            Getfield(index) => {
                let field_type = self.field_ref_type(index)?;
                if self.frame.pop_matching_type(Type::Class).is_none() {
                    return err("Expected object reference on the stack");
                }
                self.push(Type::to_stack_type(field_type))?;
            }

            Putfield(index) => {
                let field_type = self.field_ref_type(index)?;
                if self
                    .frame
                    .pop_matching_type(Type::to_stack_type(field_type))
                    .is_none()
                {
                    return err("Incompatible type in put field instruction");
                }
                if self.frame.pop_matching_type(Type::Class).is_none() {
                    return err("Expected object reference on the stack");
                }
            }

            New(index) => {
                if self.class.pool().class_name(index).is_err() {
                    return err("Incorrect CP index");
                }
                self.push(Type::UninitializedOffset(Some(bci)))?;
            }

            Invokespecial(index) => self.invokespecial(index)?,

            Return => {
                if self.return_type != Type::Void {
                    return err("Return type should be void");
                }
                if self.frame.flag_this_uninit() {
                    return err("Returning before complete initialization");
                }
                self.after_jump = true;
            }

            Ireturn => {
                if self.return_type != Type::Int {
                    return err("Return type should be integer");
                }
                if self.frame.pop_matching_type(Type::Int).is_none() {
                    return err("Expected integer type to be on the stack");
                }
                self.after_jump = true;
            }

            Dreturn => {
                if self.return_type != Type::Double {
                    return err("Return type should be double");
                }
                if self.frame.pop_matching_type(Type::Double).is_none() {
                    return err("Expected double type to be on the stack");
                }
                self.after_jump = true;
            }

            Goto(offset) => {
                self.check_branch_target(bci, offset)?;
                self.after_jump = true;
            }

            // Constants, locals and compare branches were handled through
            // their group projections above.
            _ => unreachable!("unhandled instruction {:?}", instruction),
        }

        Ok(())
    }

    fn local_access(&mut self, op: LocalOp, index: usize) -> Result<(), VerificationError> {
        if index >= self.frame.num_locals() {
            return err("Local variable index is out of bounds");
        }

        match op {
            LocalOp::ILoad => {
                // get_local is in bounds by the check above
                if self.frame.get_local(index) != Some(Type::Int) {
                    return err("Expected integer type in local variable");
                }
                self.push(Type::Int)?;
            }
            LocalOp::IStore => {
                if self.frame.pop_matching_type(Type::Int).is_none() {
                    return err("Expected integer type to be on the stack");
                }
                self.frame.set_local(index, Type::Int);
            }
            LocalOp::ALoad => {
                let ty = self.frame.get_local(index).unwrap_or(Type::Top);
                if !Type::is_assignable(ty, Type::Reference) {
                    return err("Expected reference type in local variable");
                }
                self.push(ty)?;
            }
            LocalOp::AStore => match self.frame.pop_matching_type(Type::Reference) {
                Some(actual) => self.frame.set_local(index, actual),
                None => return err("Expected reference type to be on the stack"),
            },
        }

        Ok(())
    }

    fn invokespecial(&mut self, index: u16) -> Result<(), VerificationError> {
        let method_ref = match self.class.pool().method_ref(index) {
            Ok(method_ref) => method_ref,
            Err(_) => return err("Incorrect CP index"),
        };

        if method_ref.name != "<init>" {
            return err("invokespecial is only supported for instance initializers");
        }

        let (return_type, argument_types) =
            match Type::parse_method_descriptor(method_ref.descriptor) {
                Ok(parsed) => parsed,
                Err(e) => {
                    return err(format!("Malformed method descriptor: {}", e));
                }
            };
        if return_type != Type::Void {
            return err("Instance initializer should return void");
        }

        // Arguments are popped last-first
        let to_pop: Vec<Type> = argument_types
            .iter()
            .rev()
            .map(|&ty| Type::to_stack_type(ty))
            .collect();
        if !self.frame.pop_matching_list(&to_pop) {
            return err("Incompatible arguments for the instance initializer");
        }

        let receiver = match self.frame.pop_matching_type(Type::Uninitialized) {
            Some(receiver) => receiver,
            None => return err("Expected uninitialized reference on the stack"),
        };

        if receiver == Type::UninitializedThis {
            let target_ok = method_ref.class_name == self.class.name()
                || Some(method_ref.class_name) == self.class.super_name();
            if !target_ok {
                return err("Instance initializer of an unrelated class");
            }
            self.frame
                .substitute_locals(Type::UninitializedThis, Type::Class);
            self.frame
                .substitute_stack(Type::UninitializedThis, Type::Class);
        } else {
            // Exact allocation-site token; every copy becomes initialized
            self.frame.substitute_locals(receiver, Type::Class);
            self.frame.substitute_stack(receiver, Type::Class);
        }

        Ok(())
    }

    /// Resolve a `FieldRef` at `index` and parse its field type.
    fn field_ref_type(&self, index: u16) -> Result<Type, VerificationError> {
        let field_ref = match self.class.pool().field_ref(index) {
            Ok(field_ref) => field_ref,
            Err(_) => return err("Incorrect CP index"),
        };

        match Type::parse_field_descriptor(field_ref.descriptor) {
            Ok((ty, consumed)) if consumed == field_ref.descriptor.len() => Ok(ty),
            _ => err("Malformed field descriptor"),
        }
    }

    fn check_branch_target(
        &self,
        bci: BciType,
        offset: i16,
    ) -> Result<(), VerificationError> {
        let target = if offset >= 0 {
            bci.checked_add(offset as BciType)
        } else {
            bci.checked_sub(offset.unsigned_abs() as BciType)
        };

        let declared = target.and_then(|target| self.stack_map.at(target));
        match declared {
            Some(declared) => {
                if !StackFrame::is_assignable(&self.frame, declared) {
                    return err(format!(
                        "Branch target frame mismatch at bci {}",
                        bci
                    ));
                }
                Ok(())
            }
            None => err(format!("Branch target at bci {} has no stack map frame", bci)),
        }
    }

    fn push(&mut self, ty: Type) -> Result<(), VerificationError> {
        self.frame.push_list(&[ty]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::constant::{Constant, ConstantPool, ConstantPoolBuilder};
    use crate::instruction::parse_instructions;

    /// Mirrors the eternal test pool: a grab bag of records the method
    /// fixtures below index into.
    fn test_pool() -> ConstantPool {
        let mut builder = ConstantPoolBuilder::new(27);
        let utf8 = |value: &str| Constant::Utf8(value.to_string());

        builder.set(1, utf8("trivial_method")).unwrap();
        builder.set(2, utf8("()I")).unwrap();
        builder.set(3, utf8("trivial_class")).unwrap();
        builder.set(4, Constant::Class { name_index: 3 }).unwrap();
        builder.set(5, utf8("()V")).unwrap();
        builder.set(6, utf8("()J")).unwrap();
        builder.set(7, utf8("([Ljava/lang/String;)V")).unwrap();
        builder.set(8, utf8("(Ljava/lang/Object;)V")).unwrap();
        builder.set(9, utf8("(I)V")).unwrap();
        builder.set(10, utf8("java/lang/Object")).unwrap();
        builder.set(11, utf8("<init>")).unwrap();
        builder.set(12, Constant::Class { name_index: 10 }).unwrap();
        builder
            .set(
                13,
                Constant::NameAndType {
                    name_index: 11,
                    descriptor_index: 5,
                },
            )
            .unwrap();
        builder
            .set(
                14,
                Constant::MethodRef {
                    class_index: 12,
                    name_and_type_index: 13,
                },
            )
            .unwrap();
        builder.set(15, utf8("(Ljava/lang/Object;I)V")).unwrap();
        builder
            .set(
                16,
                Constant::NameAndType {
                    name_index: 11,
                    descriptor_index: 15,
                },
            )
            .unwrap();
        builder
            .set(
                17,
                Constant::MethodRef {
                    class_index: 12,
                    name_and_type_index: 16,
                },
            )
            .unwrap();
        builder.set(18, utf8("F1")).unwrap();
        builder.set(19, utf8("I")).unwrap();
        builder
            .set(
                20,
                Constant::NameAndType {
                    name_index: 18,
                    descriptor_index: 19,
                },
            )
            .unwrap();
        builder
            .set(
                21,
                Constant::FieldRef {
                    class_index: 4,
                    name_and_type_index: 20,
                },
            )
            .unwrap();
        builder
            .set(
                22,
                Constant::NameAndType {
                    name_index: 11,
                    descriptor_index: 2,
                },
            )
            .unwrap();
        builder
            .set(
                23,
                Constant::MethodRef {
                    class_index: 12,
                    name_and_type_index: 22,
                },
            )
            .unwrap();
        builder.set(24, utf8("F2")).unwrap();
        builder.set(25, utf8("D")).unwrap();
        builder
            .set(
                26,
                Constant::NameAndType {
                    name_index: 24,
                    descriptor_index: 25,
                },
            )
            .unwrap();
        builder
            .set(
                27,
                Constant::FieldRef {
                    class_index: 4,
                    name_and_type_index: 26,
                },
            )
            .unwrap();

        builder.seal().unwrap()
    }

    fn test_method(
        flags: AccessFlags,
        max_stack: u16,
        max_locals: u16,
        name: &str,
        descriptor: &str,
        code: &[u8],
        stack_map: Option<StackMapTableBuilder>,
    ) -> Method {
        Method {
            access: flags,
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            max_stack,
            max_locals,
            code: parse_instructions(code).unwrap(),
            stack_map,
        }
    }

    fn test_class(methods: Vec<Method>) -> Class {
        Class::new(
            AccessFlags::PUBLIC | AccessFlags::SUPER,
            4,
            Some(12), // java/lang/Object
            Vec::new(),
            methods,
            test_pool(),
        )
        .unwrap()
    }

    fn check(
        flags: AccessFlags,
        max_stack: u16,
        max_locals: u16,
        name: &str,
        descriptor: &str,
        code: &[u8],
    ) -> Result<(), VerificationError> {
        let class = test_class(vec![test_method(
            flags, max_stack, max_locals, name, descriptor, code, None,
        )]);
        verify(&class)
    }

    const PUBLIC: AccessFlags = AccessFlags::PUBLIC;

    #[test]
    fn trivial_method_verifies() {
        check(PUBLIC, 1, 1, "trivial_method", "()I", &[0x3, 0xac]).unwrap();
    }

    #[test]
    fn stack_overflow_is_caught() {
        assert!(check(PUBLIC, 2, 2, "trivial_method", "()I", &[0x3, 0x3, 0x3]).is_err());
    }

    #[test]
    fn ireturn_rules() {
        // Void return type
        assert!(check(PUBLIC, 2, 2, "m", "()V", &[0x3, 0xac]).is_err());
        // Wrong return type
        assert!(check(PUBLIC, 2, 2, "m", "()J", &[0x3, 0xac]).is_err());
        // Empty stack
        assert!(check(PUBLIC, 2, 2, "m", "()I", &[0xac]).is_err());
        // All good
        check(PUBLIC, 2, 2, "m", "()I", &[0x3, 0xac]).unwrap();
    }

    #[test]
    fn dreturn_rules() {
        check(PUBLIC, 2, 1, "m", "()D", &[0x0e, 0xaf]).unwrap();
        assert_eq!(
            check(PUBLIC, 2, 1, "m", "()D", &[0x3, 0xaf]).unwrap_err(),
            VerificationError("Expected double type to be on the stack".into())
        );
        assert_eq!(
            check(PUBLIC, 2, 1, "m", "()I", &[0x0e, 0xaf]).unwrap_err(),
            VerificationError("Return type should be double".into())
        );
    }

    #[test]
    fn aload_0_rules() {
        let public_static = PUBLIC | AccessFlags::STATIC;

        // Array argument
        check(
            public_static,
            2,
            2,
            "m",
            "([Ljava/lang/String;)V",
            &[0x2a, 0xb1],
        )
        .unwrap();
        // Object argument
        check(
            public_static,
            2,
            2,
            "m",
            "(Ljava/lang/Object;)V",
            &[0x2a, 0xb1],
        )
        .unwrap();
        // Integer argument can not be aloaded
        assert!(check(public_static, 2, 2, "m", "(I)V", &[0x2a, 0xb1]).is_err());
        // No locals at all
        assert!(check(public_static, 2, 2, "m", "()V", &[0x2a, 0xb1]).is_err());
    }

    #[test]
    fn aload_out_of_bounds() {
        assert!(check(
            PUBLIC,
            1,
            1,
            "<init>",
            "()V",
            &[0x19, 10, 0xb7, 0x00, 14, 0xb1]
        )
        .is_err());
    }

    #[test]
    fn too_many_locals() {
        assert_eq!(
            check(PUBLIC, 2, 0, "m", "(I)V", &[0xb1]).unwrap_err(),
            VerificationError("Too many locals".into())
        );
    }

    #[test]
    fn invokespecial_rules() {
        // Trivial init method calling the super constructor
        check(
            PUBLIC,
            1,
            1,
            "<init>",
            "()V",
            &[0x2a, 0xb7, 0x00, 14, 0xb1],
        )
        .unwrap();

        // No uninitialized receiver on the stack
        assert!(check(PUBLIC, 1, 1, "<init>", "()V", &[0xb7, 0x00, 14, 0xb1]).is_err());

        // Init method with arguments
        check(
            PUBLIC,
            3,
            2,
            "<init>",
            "(Ljava/lang/Object;)V",
            &[0x2a, 0x19, 0x01, 0x3, 0xb7, 0x00, 17, 0xb1],
        )
        .unwrap();

        // Arguments in the wrong order
        assert!(check(
            PUBLIC,
            3,
            2,
            "<init>",
            "(Ljava/lang/Object;)V",
            &[0x2a, 0x3, 0x19, 0x01, 0xb7, 0x00, 17, 0xb1],
        )
        .is_err());

        // Initializer with a non-void return type
        assert!(check(PUBLIC, 1, 1, "<init>", "()V", &[0xb7, 0x00, 23, 0xb1]).is_err());

        // Returning before complete initialization
        assert_eq!(
            check(PUBLIC, 1, 1, "<init>", "()V", &[0xb1]).unwrap_err(),
            VerificationError("Returning before complete initialization".into())
        );

        // invokespecial outside of an init method with an initialized this
        assert!(check(
            PUBLIC,
            1,
            1,
            "trivial_method",
            "()V",
            &[0x2a, 0xb7, 0x00, 14, 0xb1],
        )
        .is_err());
    }

    #[test]
    fn new_and_init_clears_every_token_copy() {
        // new #4; dup; invokespecial Object.<init> is rejected since the
        // target is unrelated; construct own class token instead via the
        // trivial_class pool entries: MethodRef 14 targets java/lang/Object,
        // so give the class a matching super.
        let method = test_method(
            PUBLIC | AccessFlags::STATIC,
            2,
            1,
            "m",
            "()V",
            // new #12; dup; invokespecial #14; return
            &[0xbb, 0x00, 12, 0x59, 0xb7, 0x00, 14, 0xb1],
            None,
        );
        let class = test_class(vec![method]);
        verify(&class).unwrap();
    }

    #[test]
    fn get_put_static_rules() {
        // getstatic F1:I; putstatic F1:I
        check(
            PUBLIC,
            1,
            1,
            "m",
            "()V",
            &[0xb2, 0x00, 21, 0xb3, 0x00, 21, 0xb1],
        )
        .unwrap();

        // Incompatible type in put static: dconst_0 into F1:I
        assert_eq!(
            check(PUBLIC, 2, 1, "m", "()V", &[0x0e, 0xb3, 0x00, 21, 0xb1]).unwrap_err(),
            VerificationError("Incompatible type in put static instruction".into())
        );

        // Index that is not a FieldRef
        assert_eq!(
            check(PUBLIC, 1, 1, "m", "()V", &[0xb2, 0x00, 14, 0xb1]).unwrap_err(),
            VerificationError("Incorrect CP index".into())
        );
        assert_eq!(
            check(PUBLIC, 1, 1, "m", "()V", &[0xb2, 0x00, 1, 0xb1]).unwrap_err(),
            VerificationError("Incorrect CP index".into())
        );

        // Double field round trip
        check(
            PUBLIC,
            2,
            1,
            "m",
            "()V",
            &[0xb2, 0x00, 27, 0xb3, 0x00, 27, 0xb1],
        )
        .unwrap();
    }

    #[test]
    fn get_put_field_rules() {
        let public_static = PUBLIC | AccessFlags::STATIC;

        // getfield on a reference argument
        check(
            public_static,
            2,
            1,
            "m",
            "(Ljava/lang/Object;)V",
            &[0x2a, 0xb4, 0x00, 21, 0xb1],
        )
        .unwrap();

        // putfield: receiver then value
        check(
            public_static,
            2,
            1,
            "m",
            "(Ljava/lang/Object;)V",
            &[0x2a, 0x3, 0xb5, 0x00, 21, 0xb1],
        )
        .unwrap();

        // Missing receiver
        assert!(check(public_static, 2, 1, "m", "()V", &[0xb4, 0x00, 21, 0xb1]).is_err());
    }

    #[test]
    fn iinc_and_istore_rules() {
        let public_static = PUBLIC | AccessFlags::STATIC;

        check(
            public_static,
            1,
            2,
            "m",
            "(I)V",
            &[0x84, 0x00, 0x05, 0xb1],
        )
        .unwrap();

        // iinc of a reference local
        assert!(check(
            public_static,
            1,
            2,
            "m",
            "(Ljava/lang/Object;)V",
            &[0x84, 0x00, 0x05, 0xb1],
        )
        .is_err());

        // istore writes an int local that can then be iloaded
        check(
            public_static,
            1,
            2,
            "m",
            "()I",
            &[0x3, 0x3b, 0x1a, 0xac],
        )
        .unwrap();

        // iload of a slot that never held an int
        assert!(check(public_static, 1, 2, "m", "()I", &[0x1a, 0xac]).is_err());
    }

    #[test]
    fn branches_require_declared_frames() {
        let public_static = PUBLIC | AccessFlags::STATIC;

        // 0: iconst_0; 1: iconst_1; 2: if_icmpge +3 -> 5; 5: return
        let mut stack_map = StackMapTableBuilder::new();
        stack_map.add_same(5);
        let method = test_method(
            public_static,
            2,
            1,
            "m",
            "()V",
            &[0x03, 0x04, 0xa2, 0x00, 0x03, 0xb1],
            Some(stack_map),
        );
        verify(&test_class(vec![method])).unwrap();

        // Same method without a declared frame at the branch target
        let method = test_method(
            public_static,
            2,
            1,
            "m",
            "()V",
            &[0x03, 0x04, 0xa2, 0x00, 0x03, 0xb1],
            None,
        );
        assert!(verify(&test_class(vec![method])).is_err());
    }

    #[test]
    fn goto_does_not_fall_through() {
        let public_static = PUBLIC | AccessFlags::STATIC;

        // 0: goto 4; 3: return(dead, no frame) -> error
        let method = test_method(
            public_static,
            1,
            1,
            "m",
            "()V",
            &[0xa7, 0x00, 0x03, 0xb1],
            None,
        );
        assert!(verify(&test_class(vec![method])).is_err());

        // Declared frame at the jump target makes it verify
        let mut stack_map = StackMapTableBuilder::new();
        stack_map.add_same(3);
        let method = test_method(
            public_static,
            1,
            1,
            "m",
            "()V",
            &[0xa7, 0x00, 0x03, 0xb1],
            Some(stack_map),
        );
        verify(&test_class(vec![method])).unwrap();
    }

    #[test]
    fn loop_with_backward_branch() {
        let public_static = PUBLIC | AccessFlags::STATIC;

        // int i = 0; while (i < 5) i += 1; return
        //
        // 0: iconst_0
        // 1: istore_0
        // 2: iload_0
        // 3: iconst_5
        // 4: if_icmpge +8 -> 12
        // 7: iinc 0 1
        // 10: goto -8 -> 2
        // 13: return (at 12... adjust: goto is 3 bytes 10..12, so return at 13)
        //
        // Declared frames: 2 (append int), 12+1=13 -- recompute exact bcis:
        // 0:iconst_0 1:istore_0 2:iload_0 3:iconst_5 4:if_icmpge(+9->13)
        // 7:iinc(0,1) 10:goto(-8 -> 2) 13:return
        let mut stack_map = StackMapTableBuilder::new();
        stack_map.add_append(2, vec![Type::Int]);
        stack_map.add_same(13);

        let method = test_method(
            public_static,
            2,
            1,
            "m",
            "()V",
            &[
                0x03, 0x3b, 0x1a, 0x08, 0xa2, 0x00, 0x09, 0x84, 0x00, 0x01, 0xa7, 0xff, 0xf8,
                0xb1,
            ],
            Some(stack_map),
        );
        verify(&test_class(vec![method])).unwrap();
    }

    #[test]
    fn class_flags_are_checked() {
        let class = Class::new(
            AccessFlags::PUBLIC,
            4,
            None,
            Vec::new(),
            Vec::new(),
            test_pool(),
        )
        .unwrap();
        assert_eq!(
            verify(&class).unwrap_err(),
            VerificationError("Unsupported class access flags".into())
        );
    }
}
