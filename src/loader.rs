//! Resolution of behaviour functions in shared libraries.
//!
//! [`DynamicLibrary`] owns an opened library and hands out typed function
//! pointers. [`LoaderRegistry`] associates LS-DYNA material identifiers to
//! behaviours listed in a key file, one `id library function` triple per
//! line.
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use log::{debug, error, info};
use strum_macros::{Display, EnumString, IntoStaticStr};

use crate::behaviour::{BehaviourDescription, LsDynaBehaviour, LsDynaFunction};
use crate::error::LoaderError;
use crate::hypothesis::ModellingHypothesis;

pub const DEFAULT_KEY_FILE: &str = "mfront-lsdyna.k";
pub const DEFAULT_LOG_FILE: &str = "mfront-lsdyna.log";

/// Range of the LS-DYNA user material identifiers.
pub const MATERIAL_IDENTIFIERS: std::ops::RangeInclusive<u32> = 41..=50;

#[cfg(windows)]
const SUFFIXES: &[&str] = &["", ".dll"];
#[cfg(not(windows))]
const SUFFIXES: &[&str] = &["", ".so", ".dylib"];

/// File names tried when opening the library `name`, in order.
pub fn library_candidates(name: &str) -> Vec<String> {
    let mut candidates = Vec::with_capacity(2 * SUFFIXES.len());
    for prefix in ["", "lib"] {
        for suffix in SUFFIXES {
            candidates.push(format!("{prefix}{name}{suffix}"));
        }
    }
    candidates
}

/// An opened shared library, closed on drop.
pub struct DynamicLibrary {
    name: String,
    library: libloading::Library,
}

impl fmt::Debug for DynamicLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicLibrary").field("name", &self.name).finish()
    }
}

impl DynamicLibrary {
    /// Opens `name`, trying the candidates of [`library_candidates`].
    pub fn open(name: &str) -> Result<Self, LoaderError> {
        let candidates = library_candidates(name);
        for candidate in &candidates {
            // SAFETY: loading a library runs its initialisation routines,
            // behaviour libraries are trusted
            match unsafe { libloading::Library::new(candidate) } {
                Ok(library) => {
                    debug!("opened library '{}' as '{}'", name, candidate);
                    return Ok(Self {
                        name: name.to_string(),
                        library,
                    });
                }
                Err(e) => debug!("failed to open library '{}' ({})", candidate, e),
            }
        }
        Err(LoaderError::LibraryNotFound {
            library: name.to_string(),
            attempts: candidates,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Looks up `symbol` as a value of type `T`, usually a function
    /// pointer.
    ///
    /// # Safety
    ///
    /// `T` must match the actual type of the symbol.
    pub unsafe fn get<T: Copy>(&self, symbol: &str) -> Result<T, LoaderError> {
        let s = self
            .library
            .get::<T>(symbol.as_bytes())
            .map_err(|source| LoaderError::SymbolNotFound {
                library: self.name.clone(),
                symbol: symbol.to_string(),
                source,
            })?;
        Ok(*s)
    }
}

/// One association of the key file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyFileEntry {
    pub id: u32,
    pub library: String,
    pub function: String,
    /// Line number, starting at 1.
    pub line: usize,
}

/// Parses the content of a key file. Empty lines and lines starting with
/// `#` are ignored.
pub fn parse_key_file(path: &Path, content: &str) -> Result<Vec<KeyFileEntry>, LoaderError> {
    let mut entries: Vec<KeyFileEntry> = Vec::new();
    for (n, line) in content.lines().enumerate() {
        let ln = n + 1;
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.is_empty() || tokens[0].starts_with('#') {
            continue;
        }
        let [id, library, function] = tokens[..] else {
            return Err(LoaderError::InvalidLine {
                path: path.to_path_buf(),
                line: ln,
            });
        };
        let id = id
            .parse::<u32>()
            .ok()
            .filter(|id| MATERIAL_IDENTIFIERS.contains(id))
            .ok_or_else(|| LoaderError::InvalidIdentifier {
                token: id.to_string(),
                line: ln,
            })?;
        if entries.iter().any(|e| e.id == id) {
            return Err(LoaderError::AlreadyAssociated(id));
        }
        entries.push(KeyFileEntry {
            id,
            library: library.to_string(),
            function: function.to_string(),
            line: ln,
        });
    }
    Ok(entries)
}

/// Element types handled by the LS-DYNA user materials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum ElementType {
    Brick,
    Shell,
}

impl ElementType {
    pub fn hypothesis(&self) -> ModellingHypothesis {
        match self {
            ElementType::Brick => ModellingHypothesis::Tridimensional,
            ElementType::Shell => ModellingHypothesis::PlaneStress,
        }
    }

    fn suffix(&self) -> &'static str {
        match self {
            ElementType::Brick => "_3D",
            ElementType::Shell => "_PSTRESS",
        }
    }
}

/// Functions associated with a material identifier.
#[derive(Debug, Clone)]
pub struct LsDynaMaterial {
    pub function: String,
    pub library: Arc<DynamicLibrary>,
    pub tridimensional: Option<LsDynaFunction>,
    pub plane_stress: Option<LsDynaFunction>,
}

impl LsDynaMaterial {
    pub fn function_for(&self, element: ElementType) -> Option<LsDynaFunction> {
        match element {
            ElementType::Brick => self.tridimensional,
            ElementType::Shell => self.plane_stress,
        }
    }
}

/// Material identifiers associated with behaviours. Libraries are opened
/// once and shared between identifiers.
#[derive(Debug, Default)]
pub struct LoaderRegistry {
    libraries: HashMap<String, Arc<DynamicLibrary>>,
    materials: BTreeMap<u32, LsDynaMaterial>,
}

impl LoaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the key file and resolves every association.
    pub fn from_key_file(path: impl AsRef<Path>) -> Result<Self, LoaderError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| LoaderError::KeyFile {
            path: path.to_path_buf(),
            source,
        })?;
        let mut registry = Self::new();
        for entry in parse_key_file(path, &content)? {
            registry.associate(&entry)?;
        }
        Ok(registry)
    }

    /// Process-level entry point: any failure is written to `log_file` and
    /// to the standard error, then the process exits.
    pub fn load_or_exit(key_file: impl AsRef<Path>, log_file: impl AsRef<Path>) -> Self {
        match Self::from_key_file(key_file) {
            Ok(registry) => registry,
            Err(e) => exit_with(log_file.as_ref(), &e),
        }
    }

    pub fn associate(&mut self, entry: &KeyFileEntry) -> Result<(), LoaderError> {
        if !MATERIAL_IDENTIFIERS.contains(&entry.id) {
            return Err(LoaderError::InvalidIdentifier {
                token: entry.id.to_string(),
                line: entry.line,
            });
        }
        if self.materials.contains_key(&entry.id) {
            return Err(LoaderError::AlreadyAssociated(entry.id));
        }
        info!(
            "associating material '{}' to behaviour '{}' in library '{}'",
            entry.id, entry.function, entry.library
        );
        let library = match self.libraries.get(&entry.library) {
            Some(l) => Arc::clone(l),
            None => {
                let l = Arc::new(DynamicLibrary::open(&entry.library)?);
                self.libraries.insert(entry.library.clone(), Arc::clone(&l));
                l
            }
        };
        let lookup = |element: ElementType| {
            let symbol = format!("{}{}", entry.function, element.suffix());
            // SAFETY: the `_3D` and `_PSTRESS` symbols follow the LS-DYNA
            // user material signature
            match unsafe { library.get::<LsDynaFunction>(&symbol) } {
                Ok(f) => Some(f),
                Err(e) => {
                    debug!("{}", e);
                    None
                }
            }
        };
        let tridimensional = lookup(ElementType::Brick);
        let plane_stress = lookup(ElementType::Shell);
        if tridimensional.is_none() && plane_stress.is_none() {
            return Err(LoaderError::SymbolsNotFound {
                library: entry.library.clone(),
                function: entry.function.clone(),
            });
        }
        self.materials.insert(
            entry.id,
            LsDynaMaterial {
                function: entry.function.clone(),
                library,
                tridimensional,
                plane_stress,
            },
        );
        Ok(())
    }

    pub fn material(&self, id: u32) -> Result<&LsDynaMaterial, LoaderError> {
        self.materials.get(&id).ok_or(LoaderError::NoBehaviour(id))
    }

    /// Function to be called for the element type named `element`
    /// (`"brick"` or `"shell"`).
    pub fn function(&self, id: u32, element: &str) -> Result<LsDynaFunction, LoaderError> {
        let element = parse_element_type(element)?;
        self.material(id)?
            .function_for(element)
            .ok_or(LoaderError::MissingElementBehaviour {
                id,
                element: element.into(),
            })
    }

    /// Builds the behaviour handling `element`. The hypothesis of
    /// `description` is replaced by the one of the element.
    pub fn behaviour(
        &self,
        id: u32,
        element: &str,
        description: BehaviourDescription,
    ) -> Result<LsDynaBehaviour, LoaderError> {
        let element_type = parse_element_type(element)?;
        let function = self.function(id, element)?;
        let material = self.material(id)?;
        let description = BehaviourDescription {
            hypothesis: element_type.hypothesis(),
            ..description
        };
        Ok(LsDynaBehaviour::new(description, function).with_library(Arc::clone(&material.library)))
    }

    pub fn identifiers(&self) -> impl Iterator<Item = u32> + '_ {
        self.materials.keys().copied()
    }
}

fn parse_element_type(element: &str) -> Result<ElementType, LoaderError> {
    element
        .trim()
        .parse::<ElementType>()
        .map_err(|_| LoaderError::UnsupportedElementType(element.to_string()))
}

fn append_to_log_file(log_file: &Path, e: &LoaderError) -> std::io::Result<()> {
    let mut f = OpenOptions::new().create(true).append(true).open(log_file)?;
    writeln!(f, "{}", e)
}

/// Reports a fatal loader error and terminates the process.
pub fn exit_with(log_file: &Path, e: &LoaderError) -> ! {
    error!("{}", e);
    if let Err(err) = append_to_log_file(log_file, e) {
        eprintln!("unable to write to log file '{}' ({})", log_file.display(), err);
    }
    eprintln!("{}", e);
    std::process::exit(-1)
}
