//! # Resources
//!
//! The graph never owns GPU resources. It only sees [Handle]s and asks a [ResourceRegistry] what a handle is
//! (buffer, texture, acceleration structure), which layout a texture is currently in and which native Vulkan object
//! it resolves to.
//!
//! [ResourceTable] is a simple registry that can be used directly, or as a reference for integrating the graph
//! into an existing resource manager.

use std::fmt::Display;

use ash::vk;

use crate::error::ResourceError;

///Opaque resource handle. Issued by a [ResourceRegistry], the graph only compares and hashes it.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Handle(pub u32);

impl Display for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "res#{}", self.0)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum ResourceKind {
    Buffer,
    Texture,
    AccelerationStructure,
}

impl ResourceKind {
    ///True if the resource is synchronised via texture (image) barriers and has a layout. Buffers and
    /// acceleration structures use buffer barriers.
    pub fn is_texture(&self) -> bool {
        matches!(self, ResourceKind::Texture)
    }
}

///The native Vulkan object(s) a [Handle] resolves to.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum NativeResource {
    Buffer {
        buffer: vk::Buffer,
        size: vk::DeviceSize,
    },
    Texture {
        image: vk::Image,
        ///View used when the texture is bound as render or depth target.
        view: vk::ImageView,
        aspect: vk::ImageAspectFlags,
        extent: vk::Extent2D,
    },
    AccelerationStructure {
        structure: vk::AccelerationStructureKHR,
        ///Backing buffer, used for synchronisation.
        buffer: vk::Buffer,
    },
}

impl NativeResource {
    pub fn kind(&self) -> ResourceKind {
        match self {
            NativeResource::Buffer { .. } => ResourceKind::Buffer,
            NativeResource::Texture { .. } => ResourceKind::Texture,
            NativeResource::AccelerationStructure { .. } => ResourceKind::AccelerationStructure,
        }
    }

    ///Returns the buffer that has to be used for buffer barriers, if this is no texture.
    pub fn barrier_buffer(&self) -> Option<vk::Buffer> {
        match self {
            NativeResource::Buffer { buffer, .. } => Some(*buffer),
            NativeResource::AccelerationStructure { buffer, .. } => Some(*buffer),
            NativeResource::Texture { .. } => None,
        }
    }
}

///Resource lookup and state table used by the graph.
///
/// The graph reads kinds and layouts while building. Only the executor ever calls [apply_transition](ResourceRegistry::apply_transition),
/// right after a barrier that changes a texture's layout was submitted.
pub trait ResourceRegistry {
    ///Returns the kind of `handle`, or `None` if the handle is unknown (never registered or already removed).
    fn resource_kind(&self, handle: Handle) -> Option<ResourceKind>;

    ///Returns the layout `handle` is currently in. Buffers and acceleration structures report [vk::ImageLayout::UNDEFINED].
    fn current_layout(&self, handle: Handle) -> Option<vk::ImageLayout>;

    ///Resolves `handle` to its native objects.
    fn native(&self, handle: Handle) -> Option<NativeResource>;

    ///Updates the tracked layout of `handle` after a transition was submitted.
    fn apply_transition(&mut self, handle: Handle, layout: vk::ImageLayout);

    ///Optional human readable name, used for debugging output.
    fn debug_name(&self, _handle: Handle) -> Option<&str> {
        None
    }
}

struct Entry {
    native: NativeResource,
    layout: vk::ImageLayout,
    name: Option<String>,
}

///Dense table of resources. Handles are indices into the table. Removed slots are never reused, so a stale handle
/// is always reported as unknown instead of aliasing a newer resource.
#[derive(Default)]
pub struct ResourceTable {
    entries: Vec<Option<Entry>>,
}

impl ResourceTable {
    pub fn new() -> Self {
        ResourceTable {
            entries: Vec::new(),
        }
    }

    fn push(&mut self, entry: Entry) -> Handle {
        let handle = Handle(self.entries.len() as u32);
        #[cfg(feature = "logging")]
        log::trace!(
            "Registering {:?} {} as {}",
            entry.native.kind(),
            entry.name.as_deref().unwrap_or("unnamed"),
            handle
        );
        self.entries.push(Some(entry));
        handle
    }

    pub fn add_buffer(&mut self, buffer: vk::Buffer, size: vk::DeviceSize, name: Option<&str>) -> Handle {
        self.push(Entry {
            native: NativeResource::Buffer { buffer, size },
            layout: vk::ImageLayout::UNDEFINED,
            name: name.map(|n| n.to_owned()),
        })
    }

    ///Adds a texture that is currently in `layout`. Use [vk::ImageLayout::UNDEFINED] for freshly created images.
    pub fn add_texture(
        &mut self,
        image: vk::Image,
        view: vk::ImageView,
        aspect: vk::ImageAspectFlags,
        extent: vk::Extent2D,
        layout: vk::ImageLayout,
        name: Option<&str>,
    ) -> Handle {
        self.push(Entry {
            native: NativeResource::Texture {
                image,
                view,
                aspect,
                extent,
            },
            layout,
            name: name.map(|n| n.to_owned()),
        })
    }

    pub fn add_acceleration_structure(
        &mut self,
        structure: vk::AccelerationStructureKHR,
        buffer: vk::Buffer,
        name: Option<&str>,
    ) -> Handle {
        self.push(Entry {
            native: NativeResource::AccelerationStructure { structure, buffer },
            layout: vk::ImageLayout::UNDEFINED,
            name: name.map(|n| n.to_owned()),
        })
    }

    ///Removes `handle` from the table. Graphs that still reference the handle will fail to build or execute.
    pub fn remove(&mut self, handle: Handle) -> Result<NativeResource, ResourceError> {
        self.entries
            .get_mut(handle.0 as usize)
            .and_then(|slot| slot.take())
            .map(|entry| entry.native)
            .ok_or(ResourceError::UnknownHandle(handle))
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.entry(handle).is_some()
    }

    ///Number of live resources.
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entry(&self, handle: Handle) -> Option<&Entry> {
        self.entries.get(handle.0 as usize).and_then(|e| e.as_ref())
    }
}

impl ResourceRegistry for ResourceTable {
    fn resource_kind(&self, handle: Handle) -> Option<ResourceKind> {
        self.entry(handle).map(|e| e.native.kind())
    }

    fn current_layout(&self, handle: Handle) -> Option<vk::ImageLayout> {
        self.entry(handle).map(|e| e.layout)
    }

    fn native(&self, handle: Handle) -> Option<NativeResource> {
        self.entry(handle).map(|e| e.native)
    }

    fn apply_transition(&mut self, handle: Handle, layout: vk::ImageLayout) {
        match self
            .entries
            .get_mut(handle.0 as usize)
            .and_then(|e| e.as_mut())
        {
            Some(entry) if entry.native.kind().is_texture() => entry.layout = layout,
            Some(_entry) => {
                #[cfg(feature = "logging")]
                log::warn!("Ignoring layout transition of non-texture {}", handle);
            }
            None => {
                #[cfg(feature = "logging")]
                log::error!("Layout transition of unknown resource {}", handle);
            }
        }
    }

    fn debug_name(&self, handle: Handle) -> Option<&str> {
        self.entry(handle).and_then(|e| e.name.as_deref())
    }
}
