//! Segment geometry: the two register encodings chip-select windows are packed into,
//! and the procedure that validates and applies a new one.
//!
//! Ground truth: `aspeed_smc_flash_set_segment`/`aspeed_smc_reg_to_segment`/
//! `aspeed_smc_segment_to_reg` and their 2600 `_offset` counterparts in `aspeed_smc.c`.

use tracing::warn;

use crate::mem::MemoryRegion;

/// A chip-select's mapping into the flash-window address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Segment {
    pub addr: u32,
    pub size: u32,
}

impl Segment {
    pub fn end(&self) -> u32 {
        self.addr.wrapping_add(self.size)
    }

    fn overlaps(&self, other: &Segment) -> bool {
        self.size != 0 && other.size != 0 && self.addr < other.end() && other.addr < self.end()
    }
}

const ABSOLUTE_UNIT_SHIFT: u32 = 23; // 8 MiB units
const OFFSET_UNIT: u32 = 1 << 20; // 1 MiB units
const OFFSET_MASK: u32 = 0x0FF0_0000;

/// AST2400/AST2500 encoding: absolute addresses in 8 MiB units, packed into the high
/// two bytes of the register.
pub fn encode_absolute(_flash_window_base: u32, seg: Segment) -> u32 {
    let start_unit = (seg.addr >> ABSOLUTE_UNIT_SHIFT) & 0xFF;
    let end_unit = (seg.end() >> ABSOLUTE_UNIT_SHIFT) & 0xFF;
    (start_unit << 16) | (end_unit << 24)
}

pub fn decode_absolute(_flash_window_base: u32, reg: u32) -> Segment {
    let start = ((reg >> 16) & 0xFF) << ABSOLUTE_UNIT_SHIFT;
    let end = ((reg >> 24) & 0xFF) << ABSOLUTE_UNIT_SHIFT;
    Segment { addr: start, size: end.wrapping_sub(start) }
}

/// AST2600 encoding: offsets from the flash-window base in 1 MiB units. `reg == 0`
/// means "disabled" rather than "zero-sized segment at the base".
pub fn encode_offset(flash_window_base: u32, seg: Segment) -> u32 {
    if seg.size == 0 {
        return 0;
    }
    let start_offset = seg.addr.wrapping_sub(flash_window_base);
    let end_offset = start_offset.wrapping_add(seg.size).wrapping_sub(1);
    ((start_offset & OFFSET_MASK) >> 16) | (end_offset & OFFSET_MASK)
}

pub fn decode_offset(flash_window_base: u32, reg: u32) -> Segment {
    if reg == 0 {
        return Segment { addr: flash_window_base, size: 0 };
    }
    let start_offset = (reg << 16) & OFFSET_MASK;
    let end_offset = reg & OFFSET_MASK;
    let size = end_offset.wrapping_sub(start_offset).wrapping_add(OFFSET_UNIT);
    Segment { addr: flash_window_base.wrapping_add(start_offset), size }
}

/// Outcome of [`update_segment`], distinguishing a clean apply from one where the
/// guest's request was snapped to something legal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentUpdate {
    pub segment: Segment,
    pub reg: u32,
}

/// Validate and apply a guest write to `SEG_ADDRi`, following `aspeed_smc_flash_set_segment`
/// step by step. `encode`/`decode` are the variant's geometry functions; `others` is every
/// other active chip-select's current segment (for overlap logging only).
///
/// Returns the segment and re-encoded register value actually committed — these may differ
/// from a literal decode of `new_reg` if CS0's base or (for 2500 SPI variants) the last
/// segment's end needed to be snapped back to an immutable value.
#[allow(clippy::too_many_arguments)]
pub fn update_segment(
    cs: usize,
    new_reg: u32,
    flash_window_base: u32,
    flash_window_size: u32,
    is_last_slave: bool,
    immutable_last_segment: bool,
    default_last_end: u32,
    encode: fn(u32, Segment) -> u32,
    decode: fn(u32, u32) -> Segment,
    others: &[Segment],
) -> Option<SegmentUpdate> {
    let mut seg = decode(flash_window_base, new_reg);

    if cs == 0 && seg.addr != flash_window_base {
        warn!(
            target: "guest_error",
            cs, addr = seg.addr, "CS0 segment base is immutable, snapping back"
        );
        seg.addr = flash_window_base;
    }

    if immutable_last_segment && is_last_slave && seg.size != 0 && seg.end() != default_last_end {
        warn!(
            target: "guest_error",
            cs, end = seg.end(), default_last_end, "last segment end is immutable, snapping"
        );
        seg.size = default_last_end.wrapping_sub(seg.addr);
    }

    // Only reject a segment that lies entirely outside the window; one that merely
    // overhangs past the end (or starts before the base) is still committed, matching
    // `aspeed_smc_flash_set_segment`'s bounds check.
    let window_end = flash_window_base.wrapping_add(flash_window_size);
    if seg.size != 0 && (seg.end() <= flash_window_base || seg.addr > window_end) {
        warn!(
            target: "guest_error",
            cs, addr = seg.addr, size = seg.size, "segment falls entirely outside the flash window, ignoring"
        );
        return None;
    }

    if seg.size != 0 && seg.addr % seg.size != 0 {
        warn!(target: "guest_error", cs, addr = seg.addr, size = seg.size, "segment base is not size-aligned");
    }

    for other in others {
        if seg.overlaps(other) {
            warn!(target: "guest_error", cs, "segment overlaps another chip-select's segment");
        }
    }

    let reg = encode(flash_window_base, seg);
    Some(SegmentUpdate { segment: seg, reg })
}

/// Apply a committed [`SegmentUpdate`] to a chip-select's memory sub-region, batching the
/// resize/relocate/enable as one transaction (`SPEC_FULL.md` §9).
pub fn apply_segment<M: MemoryRegion>(region: &mut M, flash_window_base: u32, update: &SegmentUpdate) {
    let offset = update.segment.addr.wrapping_sub(flash_window_base);
    region.relocate(offset, update.segment.size, update.segment.size != 0);
}
