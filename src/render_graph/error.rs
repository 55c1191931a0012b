//! Render graph errors

use thiserror::Error;

use crate::backend::BackendError;
use crate::render_graph::resource::ResourceName;

/// Reasons a render graph fails to compile or to take in an upload
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("Render graph has no passes")]
    EmptyGraph,

    #[error("Pass '{0}' is declared twice")]
    DuplicatePass(String),

    #[error("Pass '{0}' does not exist")]
    UnknownPass(String),

    #[error("Resource '{resource}' is produced by both '{first}' and '{second}'")]
    DuplicateResource {
        resource: ResourceName,
        first: String,
        second: String,
    },

    #[error("Resource '{resource}' used by pass '{pass}' is never created or imported")]
    MissingProducer { resource: ResourceName, pass: String },

    #[error("Passes '{first}' and '{second}' write '{resource}' in no defined order")]
    UnorderedWriters {
        resource: ResourceName,
        first: String,
        second: String,
    },

    #[error("Pass '{pass}' writes more than one depth attachment")]
    MultipleDepthAttachments { pass: String },

    #[error("Attachment '{resource}' of pass '{pass}' is not available when the graph compiles")]
    UnresolvedAttachment { resource: ResourceName, pass: String },

    #[error("Render graph has a cycle through passes {0:?}")]
    CyclicDependency(Vec<String>),

    #[error("Failed to create resource '{resource}': {source}")]
    ResourceCreation {
        resource: ResourceName,
        #[source]
        source: BackendError,
    },

    #[error("Failed to upload '{path}': {source}")]
    Upload {
        path: String,
        #[source]
        source: BackendError,
    },
}

pub type GraphResult<T> = Result<T, GraphError>;
