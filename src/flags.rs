bitflags::bitflags! {
    /// Options controlling how a texture proxy is produced.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SurfaceFlags: u32 {
        /// Decode and upload on the calling thread instead of a background task.
        const DISABLE_ASYNC_TASK = 1 << 0;
        /// Do not write the source's key onto the produced texture.
        const DISABLE_CACHE = 1 << 1;
    }
}
