//! Per-SoC layout constants and pool-slicing rules for the I²C multi-bus controller.
//!
//! The donor source picks these through QEMU subclassing (`aspeed_{2400,2500,2600}_
//! i2c_class_init`) plus a `bus_pool_base` function pointer. Because the three
//! variants genuinely differ in control flow (page-selected vs. contiguous pool
//! slicing, shared vs. per-bus IRQ) rather than just in constants, they are modeled
//! here as a tagged enum with pattern-matched methods instead of a descriptor struct
//! (see `SPEC_FULL.md` §9).

/// Which concrete Aspeed SoC generation this I²C controller instance emulates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IcVariant {
    Ast2400,
    Ast2500,
    Ast2600,
}

impl IcVariant {
    pub const fn num_busses(self) -> usize {
        match self {
            IcVariant::Ast2400 | IcVariant::Ast2500 => 14,
            IcVariant::Ast2600 => 16,
        }
    }

    pub const fn reg_size(self) -> u32 {
        match self {
            IcVariant::Ast2400 | IcVariant::Ast2500 => 0x40,
            IcVariant::Ast2600 => 0x80,
        }
    }

    /// Offset, in bus-register-size units, applied when laying out bus `id`'s window
    /// within the controller's 0x1000-byte MMIO window. Mirrors the donor's
    /// `i < gap ? 1 : 5` split, where AST2600 has no gap (`gap = -1`, always false, so
    /// every bus takes the `+5` branch).
    fn bus_slot_offset(self, id: usize) -> u32 {
        let gap = match self {
            IcVariant::Ast2400 | IcVariant::Ast2500 => 7usize,
            IcVariant::Ast2600 => usize::MAX, // "no gap": id < gap is always true... see below
        };
        // AST2600 has no gap at all: every bus takes the +5 slot, reproducing the
        // donor's `gap = -1` (which makes `i < gap` false for every non-negative i
        // when compared as a signed int, so AST2600 always takes the `else` branch).
        if self == IcVariant::Ast2600 {
            5
        } else if id < gap {
            1
        } else {
            5
        }
    }

    /// Byte offset of bus `id`'s register window within the controller's MMIO space.
    pub fn bus_window_offset(self, id: usize) -> u32 {
        self.reg_size() * (id as u32 + self.bus_slot_offset(id))
    }

    pub const fn pool_base(self) -> u32 {
        match self {
            IcVariant::Ast2400 => 0x800,
            IcVariant::Ast2500 => 0x100,
            IcVariant::Ast2600 => 0xC00,
        }
    }

    pub const fn pool_size(self) -> usize {
        match self {
            IcVariant::Ast2400 => 0x800,
            IcVariant::Ast2500 | IcVariant::Ast2600 => 0x200,
        }
    }

    /// Whether each bus has its own IRQ output (AST2600) or all busses share the
    /// controller's single IRQ (2400/2500).
    pub const fn per_bus_irq(self) -> bool {
        matches!(self, IcVariant::Ast2600)
    }

    /// Slice of the shared pool buffer that bus `id` bursts through, given that bus's
    /// current `ctrl` and `pool_ctrl` register values.
    ///
    /// - AST2400: `ctrl[22:20]` (`I2CD_POOL_PAGE_SEL`) is used directly as a *byte*
    ///   offset into the pool, not scaled by a page size — this is what
    ///   `aspeed_2400_i2c_bus_pool_base` actually does (`&pool[page_sel]`, not
    ///   `&pool[page_sel * page_size]`), so every bus effectively shares the pool's
    ///   first ~0x100 bytes rather than getting a full private page. Kept as-is for
    ///   bit-exactness rather than "fixed", per `DESIGN.md`. Added to
    ///   `pool_ctrl[5:0] << 2` (`I2CD_POOL_OFFSET`).
    /// - AST2500: contiguous 16-byte slot indexed by bus id.
    /// - AST2600: contiguous 32-byte slot indexed by bus id.
    pub fn pool_slice_start(self, id: usize, ctrl: u32, pool_ctrl: u32) -> usize {
        match self {
            IcVariant::Ast2400 => {
                let page_sel = ((ctrl >> 20) & 0x7) as usize;
                let offset = ((pool_ctrl & 0x3f) << 2) as usize;
                page_sel + offset
            }
            IcVariant::Ast2500 => id * 0x10,
            IcVariant::Ast2600 => id * 0x20,
        }
    }
}
