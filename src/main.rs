use std::env;
use std::process::exit;

use micro_jvm::jvm::call::interpret;
use micro_jvm::jvm::mem::JavaValue;
use micro_jvm::jvm::ClassManager;

fn main() {
    pretty_env_logger::init();

    let class_name = match env::args().nth(1) {
        Some(name) => name,
        None => {
            eprintln!("usage: micro_jvm <class-name>");
            exit(2);
        }
    };

    let mut manager = ClassManager::new();

    let class_id = match manager.get_class(&class_name, None) {
        Ok(id) => id,
        Err(e) => {
            eprintln!("Unable to load class: {}", e);
            exit(1);
        }
    };

    // Link and initialize before looking for an entry point
    if let Err(e) = manager.get_class_object(class_id) {
        eprintln!("Unable to initialize class: {}", e);
        exit(1);
    }

    let class = manager.class(class_id);
    let method = match class.method("main") {
        Some(method) => method,
        None => {
            eprintln!("Class {} has no main method", class.name());
            exit(1);
        }
    };

    match interpret(&mut manager, class_id, method, Vec::new()) {
        Ok(Some(JavaValue::Int(value))) => println!("Interpreter returned: {}", value),
        Ok(Some(value)) => println!("Interpreter returned: {:?}", value),
        Ok(None) => println!("Interpreter returned no value"),
        Err(e) => {
            eprintln!("Execution failed: {}", e);
            exit(1);
        }
    }
}
