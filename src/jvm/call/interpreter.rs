//! The bytecode interpreter. Methods arriving here have passed verification,
//! so type errors surface only as hard runtime errors.

use std::rc::Rc;

use crate::class::{Class, Method};
use crate::error::Error;
use crate::instruction::{BciType, Instruction, LocalOp};
use crate::jvm::call::{FlowControl, StackFrame};
use crate::jvm::mem::{InstanceObject, JavaValue};
use crate::jvm::{ClassId, ClassManager, RuntimeError};
use crate::types::Type;

/// Interpret a method of `class_id` with the given initial locals. Returns
/// the method's return value, or `None` for a void method.
pub fn interpret(
    manager: &mut ClassManager,
    class_id: ClassId,
    method: &Method,
    locals: Vec<JavaValue>,
) -> Result<Option<JavaValue>, Error> {
    let class = manager.class(class_id);
    debug!("Entering {}.{}{}", class.name(), method.name, method.descriptor);

    let mut interpreter = Interpreter {
        manager,
        class,
        class_id,
    };
    interpreter.run(method, locals)
}

struct Interpreter<'a> {
    manager: &'a mut ClassManager,
    class: Rc<Class>,
    class_id: ClassId,
}

impl<'a> Interpreter<'a> {
    fn run(&mut self, method: &Method, locals: Vec<JavaValue>) -> Result<Option<JavaValue>, Error> {
        let mut frame = StackFrame::new(method, locals);
        let code = &method.code;

        let mut bci = match code.first() {
            Some((bci, _)) => bci,
            None => return Err(RuntimeError::EndOfCode.into()),
        };

        loop {
            let instruction = *code.get(bci).ok_or(RuntimeError::EndOfCode)?;
            trace!("\t{}: {}", bci, instruction.mnemonic());

            match self.exec(&instruction, bci, &mut frame)? {
                FlowControl::Next => bci += instruction.length(),
                FlowControl::Branch(offset) => {
                    bci = code
                        .offset_to(bci, offset)
                        .map(|(target, _)| target)
                        .ok_or(RuntimeError::BadBranchTarget(bci))?;
                }
                FlowControl::Return(value) => {
                    debug!("Leaving {} with {:?}", frame.function(), value);
                    return Ok(value);
                }
            }
        }
    }

    fn exec(
        &mut self,
        instruction: &Instruction,
        bci: BciType,
        frame: &mut StackFrame,
    ) -> Result<FlowControl, Error> {
        use Instruction::*;

        if let Some(value) = instruction.int_const() {
            frame.push(JavaValue::Int(value));
            return Ok(FlowControl::Next);
        }
        if let Some(value) = instruction.double_const() {
            frame.push(JavaValue::Double(value));
            return Ok(FlowControl::Next);
        }
        if let Some((op, local)) = instruction.local_access() {
            match op {
                LocalOp::ILoad | LocalOp::ALoad => {
                    let value = frame.local(local as usize)?;
                    frame.push(value);
                }
                LocalOp::IStore | LocalOp::AStore => {
                    let value = frame.pop()?;
                    frame.set_local(local as usize, value)?;
                }
            }
            return Ok(FlowControl::Next);
        }
        if let Some((op, offset)) = instruction.compare_branch() {
            let b = frame.pop_int()?;
            let a = frame.pop_int()?;
            return if op.holds(a, b) {
                Ok(FlowControl::Branch(offset))
            } else {
                Ok(FlowControl::Next)
            };
        }

        match *instruction {
            Bipush(value) => frame.push(JavaValue::Int(value as i32)),

            Iadd => {
                let b = frame.pop_int()?;
                let a = frame.pop_int()?;
                frame.push(JavaValue::Int(a.wrapping_add(b)));
            }

            Iinc { index, delta } => {
                let value = frame.local(index as usize)?.as_int().map_err(RuntimeError::from)?;
                frame.set_local(
                    index as usize,
                    JavaValue::Int(value.wrapping_add(delta as i32)),
                )?;
            }

            Dup => {
                let top = *frame.top()?;
                frame.push(top);
            }

            Goto(offset) => return Ok(FlowControl::Branch(offset)),

            Getstatic(index) => {
                let (class_id, name) = self.resolve_static_field(index)?;
                let value = self
                    .manager
                    .class_object(class_id)
                    .get_field(&name)
                    .map_err(RuntimeError::from)?;
                frame.push(value);
            }

            Putstatic(index) => {
                let (class_id, name) = self.resolve_static_field(index)?;
                let value = frame.pop()?;
                self.manager
                    .class_object_mut(class_id)
                    .set_field(&name, &value)
                    .map_err(RuntimeError::from)?;
            }

            Getfield(index) => {
                let member = self.class.pool().field_ref(index).map_err(RuntimeError::from)?;
                let name = member.name.to_string();

                let receiver = frame.pop_reference()?.ok_or(RuntimeError::NullReference)?;
                let value = self
                    .manager
                    .instance(receiver)?
                    .get_field(&name)
                    .map_err(RuntimeError::from)?;
                frame.push(value);
            }

            Putfield(index) => {
                let member = self.class.pool().field_ref(index).map_err(RuntimeError::from)?;
                let name = member.name.to_string();

                let value = frame.pop()?;
                let receiver = frame.pop_reference()?.ok_or(RuntimeError::NullReference)?;
                self.manager
                    .instance_mut(receiver)?
                    .set_field(&name, &value)
                    .map_err(RuntimeError::from)?;
            }

            New(index) => {
                let name = self
                    .class
                    .pool()
                    .class_name(index)
                    .map_err(RuntimeError::from)?
                    .to_string();

                let loader = self.manager.defining_loader(self.class_id);
                let target = self.manager.get_class(&name, Some(loader))?;
                self.manager.get_class_object(target)?;

                let instance = InstanceObject::new(self.manager.class(target));
                let reference = self.manager.alloc_instance(instance);
                frame.push(JavaValue::Reference(Some(reference)));
            }

            Invokespecial(index) => self.invokespecial(index, frame)?,

            Return => return Ok(FlowControl::Return(None)),
            Ireturn => {
                let value = frame.pop_int()?;
                return Ok(FlowControl::Return(Some(JavaValue::Int(value))));
            }
            Dreturn => {
                let value = frame.pop_double()?;
                return Ok(FlowControl::Return(Some(JavaValue::Double(value))));
            }

            // Constants, locals and compare branches were dispatched through
            // their group projections above.
            _ => unreachable!("unhandled instruction {:?} at bci {}", instruction, bci),
        }

        Ok(FlowControl::Next)
    }

    /// Resolve a `FieldRef` for a static access: loads and initializes the
    /// owning class if necessary.
    fn resolve_static_field(&mut self, index: u16) -> Result<(ClassId, String), Error> {
        let member = self.class.pool().field_ref(index).map_err(RuntimeError::from)?;
        let class_name = member.class_name.to_string();
        let field_name = member.name.to_string();

        let loader = self.manager.defining_loader(self.class_id);
        let class_id = self.manager.get_class(&class_name, Some(loader))?;
        self.manager.get_class_object(class_id)?;

        Ok((class_id, field_name))
    }

    fn invokespecial(&mut self, index: u16, frame: &mut StackFrame) -> Result<(), Error> {
        let member = self.class.pool().method_ref(index).map_err(RuntimeError::from)?;
        let class_name = member.class_name.to_string();
        let method_name = member.name.to_string();
        let descriptor = member.descriptor.to_string();

        let (return_type, argument_types) =
            Type::parse_method_descriptor(&descriptor).map_err(RuntimeError::from)?;

        // Arguments sit on the stack last-first, below them the receiver
        let mut arguments = Vec::with_capacity(argument_types.len());
        for _ in &argument_types {
            arguments.push(frame.pop()?);
        }
        arguments.reverse();
        let receiver = frame.pop()?;

        // The root of the bootstrap hierarchy has no artifact to load; its
        // constructor is a built-in no-op.
        if class_name == "java/lang/Object" && method_name == "<init>" {
            return Ok(());
        }

        let loader = self.manager.defining_loader(self.class_id);
        let target = self.manager.get_class(&class_name, Some(loader))?;
        self.manager.get_class_object(target)?;

        let target_class = self.manager.class(target);
        let method = target_class
            .method_with_descriptor(&method_name, &descriptor)
            .ok_or_else(|| RuntimeError::MethodNotFound {
                class: class_name,
                name: method_name,
                descriptor,
            })?;

        // Initial locals: receiver first, then the arguments. A two-word
        // argument keeps its bytecode-level second slot as padding.
        let mut locals = Vec::with_capacity(1 + argument_types.len() * 2);
        locals.push(receiver);
        for (value, ty) in arguments.into_iter().zip(&argument_types) {
            let two_word = Type::size_of(Type::to_stack_type(*ty)) == 2;
            locals.push(value);
            if two_word {
                locals.push(JavaValue::Int(0));
            }
        }

        let result = interpret(self.manager, target, method, locals)?;
        if return_type != Type::Void {
            frame.push(result.ok_or(RuntimeError::MissingReturnValue)?);
        }

        Ok(())
    }
}
