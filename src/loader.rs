use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::utils::{MayhapError, Result};

/// The extension tried when an import names a file without one
pub const DEFAULT_EXTENSION: &str = "mh";

/// A grammar source that has been located and read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    /// Where the source was found, used in error messages and cycle checks
    pub name: PathBuf,
    pub text: String,
}

/// Locates and reads the grammar named by an import directive
pub trait SourceLoader {
    fn load(&self, path: &str) -> Result<Source>;
}

/// Configuration for [`FileLoader`]
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Directory that relative import paths are resolved against
    pub base_dir: PathBuf,
    /// Extension appended when the literal path is not a file and has none
    pub default_extension: String,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        LoaderConfig {
            base_dir: PathBuf::from("."),
            default_extension: DEFAULT_EXTENSION.to_string(),
        }
    }
}

/// Loads imports from the file system
#[derive(Debug, Clone, Default)]
pub struct FileLoader {
    config: LoaderConfig,
}

impl FileLoader {
    /// A loader using `config`
    pub fn new(config: LoaderConfig) -> Self {
        FileLoader { config }
    }

    /// A loader resolving imports relative to the directory holding `grammar_file`
    pub fn for_grammar<P: AsRef<Path>>(grammar_file: P) -> Self {
        let base_dir = grammar_file
            .as_ref()
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        FileLoader::new(LoaderConfig {
            base_dir,
            ..LoaderConfig::default()
        })
    }

    /// The base directory and default extension in use
    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// The file an import of `path` refers to
    pub fn resolve(&self, path: &str) -> PathBuf {
        let candidate = self.config.base_dir.join(path);
        if !candidate.is_file() && candidate.extension().is_none() {
            return candidate.with_extension(&self.config.default_extension);
        }
        candidate
    }
}

impl SourceLoader for FileLoader {
    fn load(&self, path: &str) -> Result<Source> {
        let name = self.resolve(path);
        debug!(path = %name.display(), "reading grammar file");
        let text = fs::read_to_string(&name).map_err(|err| MayhapError::Import {
            path: name.clone(),
            source: Box::new(MayhapError::Io(err)),
        })?;
        Ok(Source { name, text })
    }
}

/// Serves imports from memory, for embedded grammars and tests
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    sources: HashMap<String, String>,
}

impl MemoryLoader {
    /// A loader with no sources
    pub fn new() -> Self {
        MemoryLoader::default()
    }

    /// Register `text` under `name`
    pub fn with_source(mut self, name: &str, text: &str) -> Self {
        self.sources.insert(name.to_string(), text.to_string());
        self
    }
}

impl SourceLoader for MemoryLoader {
    fn load(&self, path: &str) -> Result<Source> {
        let with_extension = format!("{path}.{DEFAULT_EXTENSION}");
        [path, with_extension.as_str()]
            .into_iter()
            .find_map(|name| {
                self.sources.get(name).map(|text| Source {
                    name: PathBuf::from(name),
                    text: text.clone(),
                })
            })
            .ok_or_else(|| MayhapError::Import {
                path: PathBuf::from(path),
                source: Box::new(MayhapError::Structure("no such grammar".to_string())),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;

    #[test]
    fn test_resolve_default_extension() {
        let dir = tempfile::tempdir().unwrap();
        File::create(dir.path().join("names.mh")).unwrap();
        File::create(dir.path().join("plain")).unwrap();

        let loader = FileLoader::new(LoaderConfig {
            base_dir: dir.path().to_path_buf(),
            ..LoaderConfig::default()
        });
        assert_eq!(loader.resolve("names"), dir.path().join("names.mh"));
        assert_eq!(loader.resolve("plain"), dir.path().join("plain"));
        assert_eq!(loader.resolve("other.txt"), dir.path().join("other.txt"));
    }

    #[test]
    fn test_file_loader_reads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("greeting.mh");
        let mut file = File::create(&path).unwrap();
        writeln!(file, "greeting\n\thello").unwrap();

        let loader = FileLoader::for_grammar(dir.path().join("main.mh"));
        let source = loader.load("greeting").unwrap();
        assert_eq!(source.name, path);
        assert_eq!(source.text, "greeting\n\thello\n");

        let err = loader.load("missing").unwrap_err();
        assert!(matches!(err, MayhapError::Import { .. }), "{err}");
    }

    #[test]
    fn test_for_grammar_without_directory() {
        let loader = FileLoader::for_grammar("main.mh");
        assert_eq!(loader.config().base_dir, PathBuf::from("."));
    }

    #[test]
    fn test_memory_loader() {
        let loader = MemoryLoader::new().with_source("colors.mh", "color\n\tred\n");
        assert_eq!(loader.load("colors").unwrap().text, "color\n\tred\n");
        assert_eq!(loader.load("colors.mh").unwrap().name, PathBuf::from("colors.mh"));
        assert!(loader.load("shapes").is_err());
    }
}
