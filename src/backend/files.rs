//! Static RDF files registered as data origins at startup.

use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

use super::origin::{DataOrigin, DataOriginRegistrar, RegistrationError};
use crate::config::schema::FileConfig;
use crate::rdf::{parse_graph, Language, RdfError};

#[derive(Debug, Error)]
pub enum FileError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no RDF language is known for {0}")]
    UnknownExtension(PathBuf),

    #[error("invalid graph name {0}")]
    InvalidGraphName(String),

    #[error("{path}: {source}")]
    Rdf {
        path: PathBuf,
        #[source]
        source: RdfError,
    },

    #[error(transparent)]
    Registration(#[from] RegistrationError),
}

/// Language of a file, from its extension.
pub fn file_language(path: &Path) -> Option<Language> {
    path.extension()
        .and_then(|extension| extension.to_str())
        .and_then(Language::from_extension)
}

/// Parse one file and register it under its graph name.
pub async fn register_file(registrar: &DataOriginRegistrar, file: &FileConfig) -> Result<Url, FileError> {
    let path = PathBuf::from(&file.path);
    let language = file_language(&path).ok_or_else(|| FileError::UnknownExtension(path.clone()))?;
    let identifier = Url::parse(&file.graph).map_err(|_| FileError::InvalidGraphName(file.graph.clone()))?;

    let payload = tokio::fs::read(&path).await.map_err(|source| FileError::Io {
        path: path.clone(),
        source,
    })?;
    let graph = parse_graph(&payload, language, Some(identifier.as_str())).map_err(|source| FileError::Rdf {
        path: path.clone(),
        source,
    })?;

    tracing::debug!(path = %path.display(), graph = %identifier, triples = graph.len(), "Parsed RDF file");
    Ok(registrar
        .register_data_origin(DataOrigin::Static { identifier, graph })
        .await?)
}

/// Register every configured file. A failing file is logged and skipped.
pub async fn register_files(registrar: &DataOriginRegistrar, files: &[FileConfig]) -> Vec<Url> {
    let mut registered = Vec::with_capacity(files.len());
    for file in files {
        match register_file(registrar, file).await {
            Ok(uri) => registered.push(uri),
            Err(e) => tracing::error!(path = %file.path, error = %e, "Skipping RDF file"),
        }
    }
    registered
}
