use thiserror::Error;

use crate::{access::AccessType, resource::Handle};

#[derive(Error, Debug)]
pub enum ResourceError {
    #[error("Resource {0} is not registered")]
    UnknownHandle(Handle),
}

///Errors reported while recording a command. Nothing is appended to the command stream if recording fails.
#[derive(Error, Debug)]
pub enum RecordError {
    #[error("Command {command} uses resource {resource}, which is not registered")]
    UnknownResource { command: String, resource: Handle },
    #[error("Command {command} uses {resource} as {access:?}, which requires a buffer")]
    NotABuffer {
        command: String,
        resource: Handle,
        access: AccessType,
    },
    #[error("Command {command} uses {resource} as {access:?}, which requires a texture")]
    NotATexture {
        command: String,
        resource: Handle,
        access: AccessType,
    },
    #[error("Draw {0} declares more than one depth target")]
    MultipleDepthTargets(String),
    #[error("Draw {0} has no render or depth target and no render area")]
    MissingRenderArea(String),
    #[error("Copy from {src} to {dst} has a size of 0")]
    EmptyCopy { src: Handle, dst: Handle },
    #[error("Command {command} declares {resource} as {first:?} and as {second:?}")]
    ConflictingAccess {
        command: String,
        resource: Handle,
        first: AccessType,
        second: AccessType,
    },
}

///Top level error of the graph.
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Resource {0} vanished from the registry after it was recorded")]
    UnknownResource(Handle),
    #[error("Submission target failed: {0}")]
    Submit(#[from] anyhow::Error),
}
