//! Interpreter integration over classes produced by the class description
//! parser.

use std::io::Cursor;

use micro_jvm::jvm::call::interpret;
use micro_jvm::jvm::loader::test_loader;
use micro_jvm::jvm::mem::JavaValue;
use micro_jvm::jvm::{ClassId, ClassManager};

fn define(manager: &mut ClassManager, name: &str, source: &str) -> ClassId {
    manager
        .define_class(name, &mut Cursor::new(source.as_bytes()), test_loader())
        .unwrap()
}

fn run(manager: &mut ClassManager, id: ClassId, method: &str) -> Option<JavaValue> {
    let class = manager.class(id);
    let method = class.method(method).unwrap();
    interpret(manager, id, method, Vec::new()).unwrap()
}

#[test]
fn trivial_return() {
    let source = r#"
        class {
            constant_pool {
                1: ClassInfo "Trivial"
                2: ClassInfo "java/lang/Object"
                auto: "main"
                auto: "()I"
            }
            Name: #1
            Super: #2

            method "main" "()I" {
                Flags: public, static
                MaxStack: 1
                MaxLocals: 1
                bytecode {
                    iconst_0
                    ireturn
                }
            }
        }
    "#;

    let mut manager = ClassManager::new();
    let id = define(&mut manager, "Trivial", source);
    manager.get_class_object(id).unwrap();

    assert_eq!(run(&mut manager, id, "main"), Some(JavaValue::Int(0)));
}

#[test]
fn arithmetic_and_locals() {
    let source = r#"
        class {
            constant_pool {
                1: ClassInfo "Arith"
                2: ClassInfo "java/lang/Object"
                auto: "compute"
                auto: "()I"
            }
            Name: #1
            Super: #2

            // 40 + 2 == 42
            method "compute" "()I" {
                Flags: public, static
                MaxStack: 2
                MaxLocals: 2
                bytecode {
                    bipush #40
                    istore_0
                    iconst_2
                    istore_1
                    iload_0
                    iload_1
                    iadd
                    ireturn
                }
            }
        }
    "#;

    let mut manager = ClassManager::new();
    let id = define(&mut manager, "Arith", source);

    assert_eq!(run(&mut manager, id, "compute"), Some(JavaValue::Int(42)));
}

#[test]
fn iinc_wraps_at_the_integer_boundary() {
    // iinc takes two operands, which the class description grammar does not
    // express; build the method straight from bytecode bytes instead.
    use micro_jvm::class::{AccessFlags, Method};
    use micro_jvm::instruction::parse_instructions;

    let source = r#"
        class {
            constant_pool {
                1: ClassInfo "Host"
                2: ClassInfo "java/lang/Object"
                auto: "unused"
                auto: "()V"
            }
            Name: #1
            Super: #2

            method "unused" "()V" {
                Flags: public, static
                MaxStack: 1
                MaxLocals: 1
                bytecode { return }
            }
        }
    "#;

    let mut manager = ClassManager::new();
    let id = define(&mut manager, "Host", source);

    // iload_0; iinc 0, -3; iload_0; iadd; ireturn
    let method = Method {
        access: AccessFlags::PUBLIC | AccessFlags::STATIC,
        name: "bump".to_string(),
        descriptor: "(I)I".to_string(),
        max_stack: 2,
        max_locals: 1,
        code: parse_instructions(&[0x1a, 0x84, 0x00, 0xfd, 0x1a, 0x60, 0xac]).unwrap(),
        stack_map: None,
    };

    let result = interpret(&mut manager, id, &method, vec![JavaValue::Int(10)]).unwrap();
    // 10 + (10 - 3)
    assert_eq!(result, Some(JavaValue::Int(17)));

    let result = interpret(&mut manager, id, &method, vec![JavaValue::Int(i32::MAX)]).unwrap();
    assert_eq!(
        result,
        Some(JavaValue::Int(i32::MAX.wrapping_add(i32::MAX - 3)))
    );
}

#[test]
fn loops_with_backward_branches() {
    let source = r#"
        class {
            constant_pool {
                1: ClassInfo "Loop"
                2: ClassInfo "java/lang/Object"
                auto: "sum"
                auto: "()I"
            }
            Name: #1
            Super: #2

            // sum = 0; i = 0; while (i < 5) { sum += i; i += 1 } return sum
            method "sum" "()I" {
                Flags: public, static
                MaxStack: 2
                MaxLocals: 2
                bytecode {
                    iconst_0
                    istore_0
                    iconst_0
                    istore_1
                    :loop
                    iload_1
                    iconst_5
                    if_icmpge @exit
                    iload_0
                    iload_1
                    iadd
                    istore_0
                    iconst_1
                    iload_1
                    iadd
                    istore_1
                    goto @loop
                    :exit
                    iload_0
                    ireturn
                }
            }
        }
    "#;

    let mut manager = ClassManager::new();
    let id = define(&mut manager, "Loop", source);

    // 0 + 1 + 2 + 3 + 4
    assert_eq!(run(&mut manager, id, "sum"), Some(JavaValue::Int(10)));
}

#[test]
fn double_constants_round_trip() {
    let source = r#"
        class {
            constant_pool {
                1: ClassInfo "Doubles"
                2: ClassInfo "java/lang/Object"
                auto: "one"
                auto: "()D"
            }
            Name: #1
            Super: #2

            method "one" "()D" {
                Flags: public, static
                MaxStack: 2
                MaxLocals: 1
                bytecode {
                    dconst_1
                    dreturn
                }
            }
        }
    "#;

    let mut manager = ClassManager::new();
    let id = define(&mut manager, "Doubles", source);
    manager.get_class_object(id).unwrap();

    assert_eq!(run(&mut manager, id, "one"), Some(JavaValue::Double(1.0)));
}

#[test]
fn objects_and_instance_fields() {
    let source = r#"
        class {
            constant_pool {
                1: ClassInfo "Box"
                2: ClassInfo "java/lang/Object"
                3: NameAndType "<init>" "()V"
                4: MethodRef #2 #3
                5: MethodRef #1 #3
                6: NameAndType "value" "I"
                7: FieldRef #1 #6
                auto: "make"
                auto: "()I"
            }
            Name: #1
            Super: #2

            fields {
                public "I": "value"
            }

            method "<init>" "()V" {
                Flags: public
                MaxStack: 1
                MaxLocals: 1
                bytecode {
                    aload_0
                    invokespecial #4
                    return
                }
            }

            // box = new Box(); box.value = 42; return box.value
            method "make" "()I" {
                Flags: public, static
                MaxStack: 2
                MaxLocals: 2
                bytecode {
                    new #1
                    dup
                    invokespecial #5
                    astore_1
                    aload_1
                    bipush #42
                    putfield #7
                    aload_1
                    getfield #7
                    ireturn
                }
            }
        }
    "#;

    let mut manager = ClassManager::new();
    let id = define(&mut manager, "Box", source);
    manager.get_class_object(id).unwrap();

    assert_eq!(run(&mut manager, id, "make"), Some(JavaValue::Int(42)));
}

#[test]
fn constructor_arguments_reach_the_callee_frame() {
    let source = r#"
        class {
            constant_pool {
                1: ClassInfo "Counter"
                2: ClassInfo "java/lang/Object"
                3: NameAndType "<init>" "()V"
                4: MethodRef #2 #3
                5: NameAndType "<init>" "(I)V"
                6: MethodRef #1 #5
                7: NameAndType "start" "I"
                8: FieldRef #1 #7
                auto: "make"
                auto: "()I"
            }
            Name: #1
            Super: #2

            fields {
                public "I": "start"
            }

            method "<init>" "(I)V" {
                Flags: public
                MaxStack: 2
                MaxLocals: 2
                bytecode {
                    aload_0
                    invokespecial #4
                    aload_0
                    iload_1
                    putfield #8
                    return
                }
            }

            // return new Counter(7).start
            method "make" "()I" {
                Flags: public, static
                MaxStack: 3
                MaxLocals: 1
                bytecode {
                    new #1
                    dup
                    bipush #7
                    invokespecial #6
                    getfield #8
                    ireturn
                }
            }
        }
    "#;

    let mut manager = ClassManager::new();
    let id = define(&mut manager, "Counter", source);
    manager.get_class_object(id).unwrap();

    assert_eq!(run(&mut manager, id, "make"), Some(JavaValue::Int(7)));
}

#[test]
fn null_receiver_is_a_runtime_error() {
    let source = r#"
        class {
            constant_pool {
                1: ClassInfo "NullUse"
                2: ClassInfo "java/lang/Object"
                3: NameAndType "value" "I"
                4: FieldRef #1 #3
                auto: "broken"
                auto: "()I"
            }
            Name: #1
            Super: #2

            fields {
                public "I": "value"
            }

            // getfield through a null local
            method "broken" "()I" {
                Flags: public, static
                MaxStack: 1
                MaxLocals: 1
                bytecode {
                    aload_0
                    getfield #4
                    ireturn
                }
            }
        }
    "#;

    let mut manager = ClassManager::new();
    let id = define(&mut manager, "NullUse", source);

    let class = manager.class(id);
    let method = class.method("broken").unwrap();
    let result = interpret(&mut manager, id, method, vec![JavaValue::null()]);
    assert!(result.is_err());
}

#[test]
fn static_fields_shared_between_methods() {
    let source = r#"
        class {
            constant_pool {
                1: ClassInfo "Shared"
                2: ClassInfo "java/lang/Object"
                3: NameAndType "F1" "I"
                4: FieldRef #1 #3
                auto: "store"
                auto: "read"
                auto: "()I"
                auto: "()V"
            }
            Name: #1
            Super: #2

            fields {
                public static "I": "F1"
            }

            method "store" "()V" {
                Flags: public, static
                MaxStack: 1
                MaxLocals: 1
                bytecode {
                    bipush #7
                    putstatic #4
                    return
                }
            }

            method "read" "()I" {
                Flags: public, static
                MaxStack: 1
                MaxLocals: 1
                bytecode {
                    getstatic #4
                    ireturn
                }
            }
        }
    "#;

    let mut manager = ClassManager::new();
    let id = define(&mut manager, "Shared", source);
    manager.get_class_object(id).unwrap();

    assert_eq!(run(&mut manager, id, "store"), None);
    assert_eq!(run(&mut manager, id, "read"), Some(JavaValue::Int(7)));
}

#[test]
fn verified_classes_interpret_cleanly() {
    // The whole pipeline: parse, verify through linking, then execute
    let source = r#"
        class {
            constant_pool {
                1: ClassInfo "Pipeline"
                2: ClassInfo "java/lang/Object"
                auto: "run"
                auto: "()I"
            }
            Name: #1
            Super: #2

            method "run" "()I" {
                Flags: public, static
                MaxStack: 2
                MaxLocals: 1
                bytecode {
                    iconst_2
                    iconst_3
                    iadd
                    ireturn
                }
            }
        }
    "#;

    let mut manager = ClassManager::new();
    let id = define(&mut manager, "Pipeline", source);
    manager.get_class_object(id).unwrap();

    assert_eq!(run(&mut manager, id, "run"), Some(JavaValue::Int(5)));
}
