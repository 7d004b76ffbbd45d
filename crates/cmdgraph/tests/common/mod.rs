#![allow(dead_code)]

use ash::vk;
use cmdgraph::{
    BufferBarrier, CopyBufferInfo, DrawCommand, Handle, ResourceRegistry, ResourceTable, SubmissionTarget,
    TextureBarrier,
};

#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    Barrier {
        buffers: Vec<BufferBarrier>,
        textures: Vec<TextureBarrier>,
    },
    Transition(Vec<TextureBarrier>),
    Draw(String),
    Copy(Handle, Handle),
}

///Remembers every call, optionally failing on the n-th one.
#[derive(Default)]
pub struct RecordingTarget {
    pub calls: Vec<Call>,
    pub fail_at: Option<usize>,
}

impl RecordingTarget {
    fn push(&mut self, call: Call) -> anyhow::Result<()> {
        if self.fail_at == Some(self.calls.len()) {
            anyhow::bail!("Injected failure at call {}", self.calls.len());
        }
        self.calls.push(call);
        Ok(())
    }

    pub fn dispatched(&self) -> Vec<String> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::Draw(name) => Some(name.clone()),
                Call::Copy(src, dst) => Some(format!("copy {} -> {}", src, dst)),
                _ => None,
            })
            .collect()
    }

    pub fn barrier_batches(&self) -> Vec<(&[BufferBarrier], &[TextureBarrier])> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::Barrier { buffers, textures } => Some((buffers.as_slice(), textures.as_slice())),
                _ => None,
            })
            .collect()
    }
}

impl SubmissionTarget for RecordingTarget {
    fn pipeline_barrier(
        &mut self,
        _registry: &dyn ResourceRegistry,
        buffers: &[BufferBarrier],
        textures: &[TextureBarrier],
    ) -> anyhow::Result<()> {
        self.push(Call::Barrier {
            buffers: buffers.to_vec(),
            textures: textures.to_vec(),
        })
    }

    fn point_transitions(
        &mut self,
        _registry: &dyn ResourceRegistry,
        textures: &[TextureBarrier],
    ) -> anyhow::Result<()> {
        self.push(Call::Transition(textures.to_vec()))
    }

    fn draw(&mut self, _registry: &dyn ResourceRegistry, draw: &DrawCommand) -> anyhow::Result<()> {
        self.push(Call::Draw(draw.debug_name.clone()))
    }

    fn copy_buffer(
        &mut self,
        _registry: &dyn ResourceRegistry,
        copy: &CopyBufferInfo,
    ) -> anyhow::Result<()> {
        self.push(Call::Copy(copy.src, copy.dst))
    }
}

pub fn init_logger() {
    let _ = simple_logger::SimpleLogger::new().init();
}

pub fn texture(table: &mut ResourceTable, name: &str) -> Handle {
    table.add_texture(
        vk::Image::null(),
        vk::ImageView::null(),
        vk::ImageAspectFlags::COLOR,
        vk::Extent2D {
            width: 128,
            height: 128,
        },
        vk::ImageLayout::UNDEFINED,
        Some(name),
    )
}

pub fn buffer(table: &mut ResourceTable, name: &str) -> Handle {
    table.add_buffer(vk::Buffer::null(), 1024, Some(name))
}

pub fn copy(src: Handle, dst: Handle) -> CopyBufferInfo {
    CopyBufferInfo {
        src,
        dst,
        src_offset: 0,
        dst_offset: 0,
        size: 1024,
    }
}
