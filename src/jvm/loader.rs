//! Class loaders: the bootstrap loader reads binary `.class` files from the
//! working directory, the test loader reads textual `.cd` class
//! descriptions. Both are stateless statics; loader identity (used by the
//! initiating-loader map) is the identity of the static.

use std::fs::File;
use std::io::Read;

use crate::cd;
use crate::class::Class;
use crate::error::Error;
use crate::jvm::{ClassId, ClassManager};

pub trait ClassLoader {
    /// Locate the class bytes and register them through
    /// [`ClassManager::define_class`].
    fn load_class(&self, name: &str, manager: &mut ClassManager) -> Result<ClassId, Error>;

    /// Parse a byte stream into a class description.
    fn derive_class(&self, bytes: &mut dyn Read) -> Result<Class, Error>;
}

/// Stable identity of a loader, derived from its static address.
pub type LoaderKey = usize;

pub fn loader_key(loader: &'static dyn ClassLoader) -> LoaderKey {
    loader as *const dyn ClassLoader as *const () as usize
}

struct BootstrapLoader;

impl ClassLoader for BootstrapLoader {
    fn load_class(&self, name: &str, manager: &mut ClassManager) -> Result<ClassId, Error> {
        // Classes are looked up relative to the working directory.
        let path = format!("{}.class", name);
        let mut file =
            File::open(&path).map_err(|_| Error::ClassNotFound(name.to_string()))?;

        manager.define_class(name, &mut file, bootstrap_loader())
    }

    fn derive_class(&self, bytes: &mut dyn Read) -> Result<Class, Error> {
        Ok(Class::parse(bytes)?)
    }
}

struct TestLoader;

impl ClassLoader for TestLoader {
    fn load_class(&self, name: &str, manager: &mut ClassManager) -> Result<ClassId, Error> {
        let path = format!("{}.cd", name);
        let mut file =
            File::open(&path).map_err(|_| Error::ClassNotFound(name.to_string()))?;

        manager.define_class(name, &mut file, test_loader())
    }

    fn derive_class(&self, bytes: &mut dyn Read) -> Result<Class, Error> {
        Ok(cd::parse_from_reader(bytes)?)
    }
}

static BOOTSTRAP_LOADER: BootstrapLoader = BootstrapLoader;
static TEST_LOADER: TestLoader = TestLoader;

/// The loader used when no initiating loader is given: binary class files
/// on the working directory.
pub fn bootstrap_loader() -> &'static dyn ClassLoader {
    &BOOTSTRAP_LOADER
}

/// Loader for textual class descriptions, used by tests.
pub fn test_loader() -> &'static dyn ClassLoader {
    &TEST_LOADER
}
