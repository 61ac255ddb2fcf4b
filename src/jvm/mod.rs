//! The runtime: class manager state machine, loaders and the interpreter.

use std::rc::Rc;

use hashbrown::HashMap;
use thiserror::Error;

use crate::class::constant::PoolError;
use crate::class::Class;
use crate::error::Error;
use crate::jvm::loader::{loader_key, ClassLoader, LoaderKey};
use crate::jvm::mem::{
    BadAccess, ClassObject, FieldAccessError, InstanceId, InstanceObject, UnrecognizedField,
};
use crate::types::ParsingError;
use crate::verifier;

pub mod call;
pub mod loader;
pub mod mem;

/// Unrecoverable interpreter conditions.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    BadAccess(#[from] BadAccess),
    #[error(transparent)]
    UnrecognizedField(#[from] UnrecognizedField),
    #[error("null receiver for field access")]
    NullReference,
    #[error("dangling instance reference")]
    DanglingReference,
    #[error("operand stack underflow")]
    StackUnderflow,
    #[error("local variable {0} is out of bounds")]
    LocalOutOfBounds(usize),
    #[error("execution ran off the end of the code")]
    EndOfCode,
    #[error("branch from bci {0} does not land on an instruction")]
    BadBranchTarget(u32),
    #[error("no method {class}.{name}:{descriptor}")]
    MethodNotFound {
        class: String,
        name: String,
        descriptor: String,
    },
    #[error("callee returned no value")]
    MissingReturnValue,
    #[error("unusable constant pool entry: {0}")]
    Pool(#[from] PoolError),
    #[error("unusable descriptor: {0}")]
    Descriptor(#[from] ParsingError),
}

impl From<FieldAccessError> for RuntimeError {
    fn from(error: FieldAccessError) -> Self {
        match error {
            FieldAccessError::Unrecognized(e) => RuntimeError::UnrecognizedField(e),
            FieldAccessError::BadAccess(e) => RuntimeError::BadAccess(e),
        }
    }
}

/// Identifies a loaded class inside its manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassId(usize);

/// Lifecycle of a loaded class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassState {
    Loaded,
    InitInProgress,
    Initialized,
}

/// Per-class bookkeeping: defining loader, description, runtime object and
/// lifecycle state.
struct ClassMetaInfo {
    class: Rc<Class>,
    def_loader: &'static dyn ClassLoader,
    object: Option<ClassObject>,
    state: ClassState,
}

/// Owns every class description and class object for the lifetime of the
/// process, and drives the load / link / initialize state machine.
///
/// Loading scheme: `get_class` asks the initiating loader, which locates the
/// bytes and calls back into [`ClassManager::define_class`]; defining
/// records the class under its real name and the requested name, both keyed
/// by the loader. Initialization (`get_class_object`) verifies, prepares
/// and runs `<clinit>` exactly once; a class observed mid-initialization is
/// handed out as-is, which is what terminates initialization cycles.
#[derive(Default)]
pub struct ClassManager {
    classes: Vec<ClassMetaInfo>,
    initiated: HashMap<(String, LoaderKey), ClassId>,
    instances: Vec<InstanceObject>,
}

impl ClassManager {
    pub fn new() -> Self {
        ClassManager {
            classes: Vec::new(),
            initiated: HashMap::new(),
            instances: Vec::new(),
        }
    }

    /// Look up or load a class by name. `loader` defaults to the bootstrap
    /// loader.
    pub fn get_class(
        &mut self,
        name: &str,
        loader: Option<&'static dyn ClassLoader>,
    ) -> Result<ClassId, Error> {
        let loader = loader.unwrap_or_else(loader::bootstrap_loader);
        let key = (name.to_string(), loader_key(loader));

        if let Some(&id) = self.initiated.get(&key) {
            return Ok(id);
        }

        let id = loader.load_class(name, self)?;

        // Record the initiating loader under the real name and under the
        // requested name; the two may differ.
        let real_name = self.class(id).name().to_string();
        self.initiated
            .insert((real_name, loader_key(loader)), id);
        self.initiated.insert(key, id);

        Ok(id)
    }

    /// Parse and register class bytes under `def_loader`. Called back from
    /// loaders during [`ClassManager::get_class`].
    pub fn define_class(
        &mut self,
        name: &str,
        bytes: &mut dyn std::io::Read,
        def_loader: &'static dyn ClassLoader,
    ) -> Result<ClassId, Error> {
        if self
            .initiated
            .contains_key(&(name.to_string(), loader_key(def_loader)))
        {
            return Err(Error::Linkage(name.to_string()));
        }

        let class = def_loader.derive_class(bytes)?;
        let real_name = class.name().to_string();
        info!("Defining class {} (requested as {})", real_name, name);

        let id = ClassId(self.classes.len());
        self.classes.push(ClassMetaInfo {
            class: Rc::new(class),
            def_loader,
            object: None,
            state: ClassState::Loaded,
        });
        self.initiated
            .insert((real_name, loader_key(def_loader)), id);

        Ok(id)
    }

    pub fn class(&self, id: ClassId) -> Rc<Class> {
        Rc::clone(&self.classes[id.0].class)
    }

    pub fn state(&self, id: ClassId) -> ClassState {
        self.classes[id.0].state
    }

    pub fn defining_loader(&self, id: ClassId) -> &'static dyn ClassLoader {
        self.classes[id.0].def_loader
    }

    /// Link and initialize the class if necessary. A class that is already
    /// `Initialized` or currently `InitInProgress` is returned as-is; the
    /// latter is the cycle break that keeps a `<clinit>` resolving back to
    /// its own class from re-running initialization.
    pub fn get_class_object(&mut self, id: ClassId) -> Result<&ClassObject, Error> {
        match self.state(id) {
            ClassState::Initialized | ClassState::InitInProgress => {
                return Ok(self.class_object(id));
            }
            ClassState::Loaded => {}
        }

        let class = self.class(id);
        debug!("Linking class {}", class.name());

        // Link: verify, then prepare zeroed static storage
        verifier::verify(&class)?;
        {
            let meta = &mut self.classes[id.0];
            meta.object = Some(ClassObject::new(Rc::clone(&class)));
            meta.state = ClassState::InitInProgress;
        }

        if let Some(clinit) = class.method("<clinit>") {
            debug!("Initializing class {}", class.name());
            call::interpret(self, id, clinit, Vec::new())?;
        }
        self.classes[id.0].state = ClassState::Initialized;

        Ok(self.class_object(id))
    }

    pub fn class_object(&self, id: ClassId) -> &ClassObject {
        self.classes[id.0]
            .object
            .as_ref()
            .expect("class object exists after linking")
    }

    pub fn class_object_mut(&mut self, id: ClassId) -> &mut ClassObject {
        self.classes[id.0]
            .object
            .as_mut()
            .expect("class object exists after linking")
    }

    /// Move a freshly created instance into the heap arena.
    pub fn alloc_instance(&mut self, instance: InstanceObject) -> InstanceId {
        let id = InstanceId::from_index(self.instances.len());
        self.instances.push(instance);
        id
    }

    pub fn instance(&self, id: InstanceId) -> Result<&InstanceObject, RuntimeError> {
        self.instances
            .get(id.index())
            .ok_or(RuntimeError::DanglingReference)
    }

    pub fn instance_mut(&mut self, id: InstanceId) -> Result<&mut InstanceObject, RuntimeError> {
        self.instances
            .get_mut(id.index())
            .ok_or(RuntimeError::DanglingReference)
    }
}
