//! How a command touches a resource, and what that means for synchronisation.
//!
//! Every declared access maps to exactly one [SyncScope] (pipeline stage + access mask) and, for textures, one
//! required [vk::ImageLayout]. The mapping lives in [ResourceAccess::scope] and [ResourceAccess::required_layout]
//! and is the only place the graph translates declared usage into Vulkan terms.

use ash::vk;

///Tag on how a command uses a resource. Decides whether the resource ends up in the command's read or write set.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum AccessType {
    ///Shader read (sampled texture, uniform or storage buffer read).
    Read,
    ///Unordered shader read and write, including atomics.
    ReadWriteAtomic,
    ///Color attachment.
    RenderTarget,
    ///Depth(-stencil) attachment.
    DepthTarget,
    ///Index buffer of an indexed draw. Added by the recorder.
    IndexBuffer,
    ///Source of a copy. Added by the recorder.
    CopySource,
    ///Destination of a copy. Added by the recorder.
    CopyDestination,
}

impl AccessType {
    ///True if the access modifies the resource, i.e. the resource is part of the command's write set.
    pub fn is_write(&self) -> bool {
        match self {
            AccessType::Read | AccessType::IndexBuffer | AccessType::CopySource => false,
            AccessType::ReadWriteAtomic
            | AccessType::RenderTarget
            | AccessType::DepthTarget
            | AccessType::CopyDestination => true,
        }
    }

    ///True if the access is only valid on buffers.
    pub(crate) fn requires_buffer(&self) -> bool {
        matches!(
            self,
            AccessType::IndexBuffer | AccessType::CopySource | AccessType::CopyDestination
        )
    }

    pub(crate) fn requires_texture(&self) -> bool {
        matches!(self, AccessType::RenderTarget | AccessType::DepthTarget)
    }
}

///Pipeline stage that performs an access. Only picks the synchronisation scope, never influences dependency detection.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum AccessDomain {
    Vertex,
    Fragment,
    Compute,
    Transfer,
    AllGraphics,
}

impl AccessDomain {
    pub fn stage(&self) -> vk::PipelineStageFlags2 {
        match self {
            AccessDomain::Vertex => vk::PipelineStageFlags2::VERTEX_SHADER,
            AccessDomain::Fragment => vk::PipelineStageFlags2::FRAGMENT_SHADER,
            AccessDomain::Compute => vk::PipelineStageFlags2::COMPUTE_SHADER,
            AccessDomain::Transfer => vk::PipelineStageFlags2::COPY,
            AccessDomain::AllGraphics => vk::PipelineStageFlags2::ALL_GRAPHICS,
        }
    }
}

///Pipeline stage and access mask of one side of a barrier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct SyncScope {
    pub stage: vk::PipelineStageFlags2,
    pub access: vk::AccessFlags2,
}

impl Default for SyncScope {
    fn default() -> Self {
        Self::NONE
    }
}

impl SyncScope {
    pub const NONE: Self = SyncScope {
        stage: vk::PipelineStageFlags2::NONE,
        access: vk::AccessFlags2::NONE,
    };

    pub const fn new(stage: vk::PipelineStageFlags2, access: vk::AccessFlags2) -> Self {
        SyncScope { stage, access }
    }

    ///Union of both scopes.
    pub fn union(self, other: SyncScope) -> SyncScope {
        SyncScope {
            stage: self.stage | other.stage,
            access: self.access | other.access,
        }
    }

    pub fn is_none(&self) -> bool {
        self.stage == vk::PipelineStageFlags2::NONE && self.access == vk::AccessFlags2::NONE
    }
}

const DEPTH_STAGES: vk::PipelineStageFlags2 = vk::PipelineStageFlags2::from_raw(
    vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS.as_raw()
        | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS.as_raw(),
);

const STORAGE_READ_WRITE: vk::AccessFlags2 = vk::AccessFlags2::from_raw(
    vk::AccessFlags2::SHADER_STORAGE_READ.as_raw() | vk::AccessFlags2::SHADER_STORAGE_WRITE.as_raw(),
);

///Declared access of a command to a single resource.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ResourceAccess {
    pub ty: AccessType,
    pub domain: AccessDomain,
}

impl ResourceAccess {
    pub const fn new(ty: AccessType, domain: AccessDomain) -> Self {
        ResourceAccess { ty, domain }
    }

    ///Shader read in `domain`.
    pub const fn read(domain: AccessDomain) -> Self {
        Self::new(AccessType::Read, domain)
    }

    ///Unordered read/write in `domain`.
    pub const fn storage(domain: AccessDomain) -> Self {
        Self::new(AccessType::ReadWriteAtomic, domain)
    }

    pub const fn render_target() -> Self {
        Self::new(AccessType::RenderTarget, AccessDomain::Fragment)
    }

    pub const fn depth_target() -> Self {
        Self::new(AccessType::DepthTarget, AccessDomain::Fragment)
    }

    pub(crate) const fn index_buffer() -> Self {
        Self::new(AccessType::IndexBuffer, AccessDomain::Vertex)
    }

    pub(crate) const fn copy_source() -> Self {
        Self::new(AccessType::CopySource, AccessDomain::Transfer)
    }

    pub(crate) const fn copy_destination() -> Self {
        Self::new(AccessType::CopyDestination, AccessDomain::Transfer)
    }

    pub fn is_write(&self) -> bool {
        self.ty.is_write()
    }

    ///Synchronisation scope of this access. Attachment, index and copy accesses have a fixed stage, the
    /// domain only matters for shader accesses.
    pub fn scope(&self) -> SyncScope {
        match self.ty {
            AccessType::Read => SyncScope::new(self.domain.stage(), vk::AccessFlags2::SHADER_READ),
            AccessType::ReadWriteAtomic => SyncScope::new(self.domain.stage(), STORAGE_READ_WRITE),
            AccessType::RenderTarget => SyncScope::new(
                vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
                vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
            ),
            AccessType::DepthTarget => SyncScope::new(
                DEPTH_STAGES,
                vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE,
            ),
            AccessType::IndexBuffer => SyncScope::new(
                vk::PipelineStageFlags2::INDEX_INPUT,
                vk::AccessFlags2::INDEX_READ,
            ),
            AccessType::CopySource => {
                SyncScope::new(vk::PipelineStageFlags2::COPY, vk::AccessFlags2::TRANSFER_READ)
            }
            AccessType::CopyDestination => {
                SyncScope::new(vk::PipelineStageFlags2::COPY, vk::AccessFlags2::TRANSFER_WRITE)
            }
        }
    }

    ///Layout a texture must be in for this access. `None` for accesses that are only valid on buffers.
    pub fn required_layout(&self) -> Option<vk::ImageLayout> {
        match self.ty {
            AccessType::Read => Some(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
            AccessType::ReadWriteAtomic => Some(vk::ImageLayout::GENERAL),
            AccessType::RenderTarget => Some(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL),
            AccessType::DepthTarget => Some(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
            AccessType::CopySource => Some(vk::ImageLayout::TRANSFER_SRC_OPTIMAL),
            AccessType::CopyDestination => Some(vk::ImageLayout::TRANSFER_DST_OPTIMAL),
            AccessType::IndexBuffer => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition() {
        assert!(!AccessType::Read.is_write());
        assert!(!AccessType::IndexBuffer.is_write());
        assert!(!AccessType::CopySource.is_write());
        assert!(AccessType::ReadWriteAtomic.is_write());
        assert!(AccessType::RenderTarget.is_write());
        assert!(AccessType::DepthTarget.is_write());
        assert!(AccessType::CopyDestination.is_write());
    }

    #[test]
    fn domain_only_affects_shader_accesses() {
        let vertex = ResourceAccess::read(AccessDomain::Vertex).scope();
        let fragment = ResourceAccess::read(AccessDomain::Fragment).scope();
        assert_eq!(vertex.stage, vk::PipelineStageFlags2::VERTEX_SHADER);
        assert_eq!(fragment.stage, vk::PipelineStageFlags2::FRAGMENT_SHADER);
        assert_eq!(vertex.access, fragment.access);

        let rt = ResourceAccess::new(AccessType::RenderTarget, AccessDomain::Vertex).scope();
        assert_eq!(rt, ResourceAccess::render_target().scope());
    }

    #[test]
    fn scope_union() {
        let a = ResourceAccess::read(AccessDomain::Vertex).scope();
        let b = ResourceAccess::read(AccessDomain::Fragment).scope();
        let u = a.union(b);
        assert!(u.stage.contains(vk::PipelineStageFlags2::VERTEX_SHADER));
        assert!(u.stage.contains(vk::PipelineStageFlags2::FRAGMENT_SHADER));
        assert_eq!(u.access, vk::AccessFlags2::SHADER_READ);
        assert!(SyncScope::NONE.is_none());
        assert!(!u.is_none());
    }

    #[test]
    fn layouts() {
        assert_eq!(
            ResourceAccess::depth_target().required_layout(),
            Some(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
        );
        assert_eq!(
            ResourceAccess::storage(AccessDomain::Compute).required_layout(),
            Some(vk::ImageLayout::GENERAL)
        );
        assert_eq!(ResourceAccess::index_buffer().required_layout(), None);
    }
}
