///Build time configuration of a [CommandGraph](crate::CommandGraph).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GraphConfig {
    ///If set, two commands writing the same resource are ordered by an edge, even if no command reads the
    /// resource in between. Disable only if the order of writers is guaranteed by other means.
    pub detect_write_after_write: bool,
    ///If set, barriers of one execution step that reference the same resource are merged into a single barrier
    /// (union of stages and access masks).
    pub merge_step_barriers: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        GraphConfig {
            detect_write_after_write: true,
            merge_step_barriers: true,
        }
    }
}

impl GraphConfig {
    pub fn with_write_after_write(mut self, detect: bool) -> Self {
        self.detect_write_after_write = detect;
        self
    }

    pub fn with_merged_step_barriers(mut self, merge: bool) -> Self {
        self.merge_step_barriers = merge;
        self
    }
}
