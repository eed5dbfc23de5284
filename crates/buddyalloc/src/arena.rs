//! The arena: backing buffer, configuration and the lock around both.

use std::alloc::Layout;
use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::engine;
use crate::error::ArenaError;
use crate::fit::FitMode;
use crate::iter::Blocks;
use crate::layout::{
    ARENA_ALIGN, HEADER_SIZE, MAX_SIZE_EXPONENT, MIN_SIZE_EXPONENT, size_of_exponent,
};
use crate::logging::{LogSink, Logger, Severity};
use crate::region::Region;
use crate::report::BlockReport;
use crate::upstream::{SystemHeap, UpstreamAllocator};

/// Fixed-capacity buddy-system arena.
///
/// Every public operation holds the arena mutex for its whole duration.
/// Arenas move as a unit and cannot be cloned.
pub struct Arena {
    region: Mutex<Region>,
    /// Buffer address, for identity comparison without locking.
    base_addr: usize,
    layout: Layout,
    size_exponent: u8,
    upstream: Option<Arc<dyn UpstreamAllocator>>,
    log: LogSink,
}

impl Arena {
    /// Create an arena with `2^size_exponent` bytes of block space.
    ///
    /// The buffer comes from `upstream`, or from the process heap when
    /// `upstream` is `None`. Nothing is allocated if the exponent is out of
    /// range.
    pub fn new(
        size_exponent: u8,
        upstream: Option<Arc<dyn UpstreamAllocator>>,
        logger: Option<Arc<dyn Logger>>,
        fit_mode: FitMode,
    ) -> Result<Self, ArenaError> {
        let log = LogSink::new(logger);

        if !(MIN_SIZE_EXPONENT..=MAX_SIZE_EXPONENT).contains(&size_exponent) {
            let err = ArenaError::Configuration {
                size_exponent,
                min: MIN_SIZE_EXPONENT,
                max: MAX_SIZE_EXPONENT,
            };
            log.error(format_args!("create: {err}"));
            return Err(err);
        }

        let capacity = size_of_exponent(size_exponent);
        let requested = capacity + HEADER_SIZE;
        let layout = Layout::from_size_align(requested, ARENA_ALIGN)
            .map_err(|_| ArenaError::OutOfMemory { requested })?;

        let source = upstream.as_deref().unwrap_or(&SystemHeap);
        let Some(base) = source.allocate(layout) else {
            let err = ArenaError::OutOfMemory { requested };
            let origin = if upstream.is_some() {
                "upstream allocator"
            } else {
                "process heap"
            };
            log.error(format_args!("create: {origin} refused buffer: {err}"));
            return Err(err);
        };

        // SAFETY: `base` is a fresh allocation of `layout.size()` bytes owned
        // by this arena until `Drop` returns it.
        let mut region = unsafe { Region::from_raw(base, layout.size()) };
        region.initialize(size_exponent, fit_mode);
        log.debug(format_args!(
            "create: arena of 2^{size_exponent} bytes at {base:p}, {fit_mode}"
        ));
        log.debug(format_args!(
            "create: root block of {capacity} bytes is free"
        ));

        Ok(Self {
            region: Mutex::new(region),
            base_addr: base.as_ptr().addr(),
            layout,
            size_exponent,
            upstream,
            log,
        })
    }

    /// Start configuring an arena with optional collaborators.
    #[must_use]
    pub fn builder(size_exponent: u8) -> ArenaBuilder {
        ArenaBuilder::new(size_exponent)
    }

    #[must_use]
    pub fn size_exponent(&self) -> u8 {
        self.size_exponent
    }

    /// Bytes of block space (`2^k`), excluding the header.
    #[must_use]
    pub fn capacity(&self) -> usize {
        size_of_exponent(self.size_exponent)
    }

    /// Reserve at least `size` usable bytes.
    ///
    /// Fails with [`ArenaError::OutOfMemory`] when no free block can hold
    /// `size` plus block metadata.
    pub fn allocate(&self, size: usize) -> Result<NonNull<u8>, ArenaError> {
        let mut region = self.region.lock();
        self.log
            .debug(format_args!("allocate: {size} bytes requested"));
        self.log_state(&region, "before allocate");

        match engine::allocate(&mut region, size, &self.log) {
            Ok(ptr) => {
                self.log.debug(format_args!("allocate: returned {ptr:p}"));
                self.log_state(&region, "after allocate");
                Ok(ptr)
            }
            Err(err) => {
                self.log.error(format_args!("allocate: {err}"));
                Err(err)
            }
        }
    }

    /// Release a block and coalesce it with free buddies.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by [`Self::allocate`] on this arena and
    /// not deallocated since. Anything else is undefined behavior; foreign
    /// pointers are not detected.
    pub unsafe fn deallocate(&self, ptr: NonNull<u8>) {
        let mut region = self.region.lock();
        self.log.debug(format_args!("deallocate: {ptr:p}"));

        let offset = region.block_offset_of(ptr);
        if self.log.enabled(Severity::Trace) {
            let dump = hex_dump(region.payload_bytes(offset));
            self.log
                .trace(format_args!("deallocate: payload before release: {dump}"));
        }

        let (merged_at, exponent) = engine::release(&mut region, offset, &self.log);
        self.log.debug(format_args!(
            "deallocate: free block at {merged_at} of {} bytes",
            size_of_exponent(exponent)
        ));
        self.log_state(&region, "after deallocate");
    }

    /// Change the strategy used by subsequent allocations.
    pub fn set_fit_mode(&self, mode: FitMode) {
        let mut region = self.region.lock();
        region.set_fit_mode(mode);
        self.log.debug(format_args!("set_fit_mode: {mode}"));
    }

    /// The strategy currently stored in the header.
    pub fn fit_mode(&self) -> Result<FitMode, ArenaError> {
        let region = self.region.lock();
        region.fit_mode().inspect_err(|err| {
            self.log.error(format_args!("fit_mode: {err}"));
        })
    }

    /// Snapshot of every block in address order.
    #[must_use]
    pub fn block_report(&self) -> BlockReport {
        let region = self.region.lock();
        let report = BlockReport::capture(region.blocks());
        self.log
            .debug(format_args!("block_report: {} blocks", report.len()));
        report
    }

    /// Run `f` over a block cursor while holding the lock.
    ///
    /// The cursor cannot escape `f`, so it can never observe a split or
    /// merge.
    pub fn inspect<R>(&self, f: impl FnOnce(Blocks<'_>) -> R) -> R {
        let region = self.region.lock();
        f(region.blocks())
    }

    /// True iff both arenas own the same backing buffer.
    #[must_use]
    pub fn is_equal(&self, other: &Self) -> bool {
        self.base_addr == other.base_addr
    }

    fn log_state(&self, region: &Region, when: &str) {
        if self.log.enabled(Severity::Information) {
            let report = BlockReport::capture(region.blocks());
            self.log
                .information(format_args!("blocks {when}: {report}"));
        }
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        let base = self.region.get_mut().base();
        let source = self.upstream.as_deref().unwrap_or(&SystemHeap);
        // SAFETY: `base` came from `source.allocate(self.layout)` in `new`
        // and is returned only here.
        unsafe { source.deallocate(base, self.layout) };
        self.log
            .debug(format_args!("drop: released arena buffer at {base:p}"));
    }
}

impl PartialEq for Arena {
    fn eq(&self, other: &Self) -> bool {
        self.is_equal(other)
    }
}

impl Eq for Arena {}

impl fmt::Debug for Arena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena")
            .field("base", &format_args!("{:#x}", self.base_addr))
            .field("size_exponent", &self.size_exponent)
            .field("custom_upstream", &self.upstream.is_some())
            .field("log", &self.log)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Arena`] with optional collaborators.
#[derive(Clone)]
pub struct ArenaBuilder {
    size_exponent: u8,
    fit_mode: FitMode,
    upstream: Option<Arc<dyn UpstreamAllocator>>,
    logger: Option<Arc<dyn Logger>>,
}

impl ArenaBuilder {
    #[must_use]
    pub fn new(size_exponent: u8) -> Self {
        Self {
            size_exponent,
            fit_mode: FitMode::default(),
            upstream: None,
            logger: None,
        }
    }

    #[must_use]
    pub fn with_fit_mode(mut self, fit_mode: FitMode) -> Self {
        self.fit_mode = fit_mode;
        self
    }

    #[must_use]
    pub fn with_upstream(mut self, upstream: Arc<dyn UpstreamAllocator>) -> Self {
        self.upstream = Some(upstream);
        self
    }

    #[must_use]
    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn build(self) -> Result<Arena, ArenaError> {
        Arena::new(self.size_exponent, self.upstream, self.logger, self.fit_mode)
    }
}

impl fmt::Debug for ArenaBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArenaBuilder")
            .field("size_exponent", &self.size_exponent)
            .field("fit_mode", &self.fit_mode)
            .field("custom_upstream", &self.upstream.is_some())
            .field("logger", &self.logger.is_some())
            .finish()
    }
}

fn hex_dump(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for (i, byte) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(&format!("{byte:02x}"));
    }
    out
}
