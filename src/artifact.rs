//! Artifact naming, persistence, and binding.
//!
//! An artifact is one generated script bound under a collision-free unique
//! name. The loader owns the binding registry (`unique_name -> BoundUnit`)
//! and evicts any prior binding before rebinding, so a repaired script can
//! never execute stale definitions from an earlier attempt. Repairs pass the
//! pinned name back in and overwrite the same file instead of forking a new
//! version.

use crate::collaborator::strip_code_fences;
use crate::errors::LoadError;
use crate::script::{BoundUnit, ScriptHost};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// File extension for generated artifacts.
pub const ARTIFACT_EXT: &str = "rhai";

/// Derive a collision-free artifact name within `dir`.
///
/// Returns `base` when `dir/base.rhai` does not exist, otherwise the first
/// unused `base_vN`. Pure with respect to directory contents at call time;
/// never creates the file.
pub fn unique_artifact_name(base: &str, dir: &Path) -> String {
    let mut candidate = base.to_string();
    let mut counter = 0u32;
    while dir.join(format!("{candidate}.{ARTIFACT_EXT}")).exists() {
        counter += 1;
        candidate = format!("{base}_v{counter}");
    }
    candidate
}

/// A successfully written, compiled, and resolved artifact.
#[derive(Debug, Clone)]
pub struct LoadedArtifact {
    /// Name the artifact is stored and bound under, stable across repairs.
    pub unique_name: String,
    pub storage_path: PathBuf,
    /// Compiled unit with its resolved entry point.
    pub unit: BoundUnit,
}

/// Persists generated code and binds it for execution.
pub struct ArtifactLoader {
    host: ScriptHost,
    code_dir: PathBuf,
    bindings: HashMap<String, BoundUnit>,
}

impl ArtifactLoader {
    pub fn new(host: ScriptHost, code_dir: impl Into<PathBuf>) -> Self {
        Self {
            host,
            code_dir: code_dir.into(),
            bindings: HashMap::new(),
        }
    }

    pub fn host(&self) -> &ScriptHost {
        &self.host
    }

    pub fn code_dir(&self) -> &Path {
        &self.code_dir
    }

    pub fn artifact_path(&self, unique_name: &str) -> PathBuf {
        self.code_dir.join(format!("{unique_name}.{ARTIFACT_EXT}"))
    }

    /// Current binding under a unique name, if any.
    pub fn binding(&self, unique_name: &str) -> Option<&BoundUnit> {
        self.bindings.get(unique_name)
    }

    /// Clean, persist, bind, and resolve a piece of generated code.
    ///
    /// `pinned` forces the unique name (repair path, in-place overwrite);
    /// otherwise the namer derives a fresh one from `logical_name`. Compile
    /// and entry-point failures still carry the assigned name and path,
    /// since the file has already been written by then and the caller needs
    /// both for pinning and cleanup.
    pub fn load(
        &mut self,
        code_text: &str,
        logical_name: &str,
        pinned: Option<&str>,
    ) -> Result<LoadedArtifact, LoadError> {
        let cleaned = strip_code_fences(code_text);
        if cleaned.is_empty() {
            return Err(LoadError::EmptySource);
        }

        let unique_name = match pinned {
            Some(name) => name.to_string(),
            None => unique_artifact_name(logical_name, &self.code_dir),
        };
        let storage_path = self.artifact_path(&unique_name);

        if let Err(source) = fs::create_dir_all(&self.code_dir) {
            return Err(LoadError::WriteFailed {
                unique_name,
                path: storage_path,
                source,
            });
        }
        if let Err(source) = fs::write(&storage_path, &cleaned) {
            return Err(LoadError::WriteFailed {
                unique_name,
                path: storage_path,
                source,
            });
        }
        debug!(artifact = %unique_name, path = %storage_path.display(), "artifact written");

        // Evict before rebinding so a prior attempt cannot leak through.
        self.bindings.remove(&unique_name);

        let ast = match self.host.compile(&cleaned) {
            Ok(ast) => ast,
            Err(message) => {
                return Err(LoadError::Compile {
                    unique_name,
                    path: storage_path,
                    message,
                });
            }
        };

        let functions = self.host.script_functions(&ast);
        let entry_point = if functions.iter().any(|name| name == logical_name) {
            logical_name.to_string()
        } else if let Some(fallback) = functions.first() {
            warn!(
                artifact = %unique_name,
                expected = logical_name,
                using = fallback.as_str(),
                "entry point not found by name, falling back to first defined function"
            );
            fallback.clone()
        } else {
            return Err(LoadError::MissingEntryPoint {
                logical_name: logical_name.to_string(),
                unique_name,
                path: storage_path,
            });
        };

        let unit = BoundUnit::new(ast, &entry_point);
        self.bindings.insert(unique_name.clone(), unit.clone());
        Ok(LoadedArtifact {
            unique_name,
            storage_path,
            unit,
        })
    }

    /// Remove the artifact file and evict its binding. A file that is
    /// already gone is not an error.
    pub fn discard(&mut self, unique_name: &str) -> std::io::Result<()> {
        self.bindings.remove(unique_name);
        let path = self.artifact_path(unique_name);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }
}
