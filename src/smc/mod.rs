//! Serial/Flash Memory Controller (`SC`): FMC/SPI/SMC flavors of the Aspeed flash
//! controller. Owns an SPI bus master, up to `max_slaves` chip-selects each mapped
//! into a shared flash window, and an optional DMA engine.
//!
//! Ground truth: `aspeed_smc.c` in the donor source tree.

pub mod dma;
pub mod segment;
pub mod snoop;
pub mod variant;

use bitflags::bitflags;
use thiserror::Error;
use tracing::warn;

use crate::bus::SpiBus;
use crate::irq::IrqLine;
use crate::mem::{AddressSpace, MemoryRegion};
use dma::DmaCtrl;
use segment::Segment;
use snoop::Snoop;
pub use variant::ScVariant;
use variant::reg;

bitflags! {
    /// `CTRLi` low bits this model interprets; the remaining bits are stored verbatim
    /// but never consulted (dummy-cycle width fields are read directly by name below).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Ctrl0: u32 {
        const MODE_MASK        = 0x3;
        const CE_STOP_ACTIVE    = 1 << 2;
        const CMD_SHIFT_MASK    = 0xFF << 16;
        /// 4-byte addressing strap, but only meaningful on the single-CS AST2400 SPI1
        /// controller (`ScVariant::ast2400_spi_style_4byte`); every other variant's
        /// 4-byte selector lives in `CE_CTRL`, not here.
        const EXTENDED_ADDR     = 1 << 13;
        const DUMMY_HIGH        = 1 << 14;
        const IO_DUAL_ADDR_DATA = 1 << 29;
    }
}

const MODE_READ: u32 = 0;
const MODE_FAST_READ: u32 = 1;
const MODE_WRITE: u32 = 2;
const MODE_USER: u32 = 3;

const SPI_OP_READ: u8 = 0x03;

/// `DMA_STATUS` bit mirrored into `INTR_CTRL`: 0 while a DMA is in flight, 1 once it
/// has completed (or was never started). Matches `INTR_CTRL_DMA_STATUS` in the donor.
const INTR_CTRL_DMA_STATUS: u32 = 1 << 11;
/// `INTR_CTRL` bit gating whether DMA completion actually raises the controller IRQ,
/// independent of the `DMA_CTRL.ENABLE` (start) bit. Matches `INTR_CTRL_DMA_EN`.
const INTR_CTRL_DMA_EN: u32 = 1 << 3;

/// Errors that occur at construction time, outside any live MMIO access.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ScError {
    #[error("chip-select {0} is out of range for this variant")]
    BadChipSelect(usize),
    #[error("variant declares DMA support but no DRAM collaborator was supplied")]
    MissingDram,
}

/// Persisted per-chip-select snoop state, per `SPEC_FULL.md` §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FlashSnapshot {
    pub snoop_index: usize,
    pub snoop_dummies: usize,
    pub snoop_active: bool,
}

/// Full persisted controller state: the entire register file plus per-CS snoop state,
/// the `std`-idiomatic analogue of the donor's `vmstate_aspeed_smc`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScSnapshot {
    pub regs: Vec<u32>,
    pub flashes: Vec<FlashSnapshot>,
}

impl ScSnapshot {
    /// Matches the donor's `VMStateDescription.version_id` for `vmstate_aspeed_smc`.
    pub const VERSION: u32 = 2;
}

struct FlashSlot<Cs: IrqLine, Mem: MemoryRegion> {
    id: usize,
    cs: Cs,
    region: Mem,
    segment: Segment,
    snoop: Snoop,
}

/// SMC/FMC/SPI controller.
///
/// `Spi` is the outward SPI bus; `Cs` is one chip-select output per flash; `Irq` is the
/// controller-level (DMA-done) interrupt; `Mem` is the per-CS relocatable sub-region;
/// `Flash`/`Dram` are the two address spaces the DMA engine moves bytes through.
pub struct Controller<Spi: SpiBus, Cs: IrqLine, Irq: IrqLine, Mem: MemoryRegion, Flash: AddressSpace, Dram: AddressSpace> {
    variant: ScVariant,
    flash_window_base: u32,
    regs: Vec<u32>,
    num_cs: usize,
    flashes: Vec<FlashSlot<Cs, Mem>>,
    spi: Spi,
    irq: Irq,
    flash_as: Flash,
    dram_as: Dram,
    pub inject_failure: bool,
    pub sdram_base: u32,
}

impl<Spi, Cs, Irq, Mem, Flash, Dram> Controller<Spi, Cs, Irq, Mem, Flash, Dram>
where
    Spi: SpiBus,
    Cs: IrqLine,
    Irq: IrqLine,
    Mem: MemoryRegion,
    Flash: AddressSpace,
    Dram: AddressSpace,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        variant: ScVariant,
        flash_window_base: u32,
        num_cs: usize,
        regions: Vec<Mem>,
        cs_lines: Vec<Cs>,
        spi: Spi,
        irq: Irq,
        flash_as: Flash,
        dram_as: Dram,
        sdram_base: u32,
    ) -> Result<Self, ScError> {
        if num_cs == 0 || num_cs > variant.max_slaves {
            return Err(ScError::BadChipSelect(num_cs));
        }
        let nregs = variant.nregs();
        let flashes = regions
            .into_iter()
            .zip(cs_lines)
            .enumerate()
            .map(|(id, (region, cs))| FlashSlot { id, cs, region, segment: Segment::default(), snoop: Snoop::off() })
            .collect();
        let mut ctl = Self {
            variant,
            flash_window_base,
            regs: vec![0u32; nregs],
            num_cs,
            flashes,
            spi,
            irq,
            flash_as,
            dram_as,
            inject_failure: false,
            sdram_base,
        };
        ctl.reset();
        Ok(ctl)
    }

    pub fn variant(&self) -> &ScVariant {
        &self.variant
    }

    pub fn num_cs(&self) -> usize {
        self.num_cs
    }

    pub fn segment(&self, cs: usize) -> Segment {
        self.flashes[cs].segment
    }

    /// `aspeed_smc_reset`: zero the register file, re-strap flash-type bits into
    /// `CONF`, reload every active CS's default segment, raise every CS line (active
    /// low, so idle-high), and clear snoop.
    pub fn reset(&mut self) {
        self.regs.iter_mut().for_each(|r| *r = 0);
        for strap in self.variant.flash_type_straps {
            self.regs[reg::CONF] |= strap.conf_bit;
        }
        for cs in 0..self.num_cs {
            self.regs[reg::CTRL0 + cs] = Ctrl0::CE_STOP_ACTIVE.bits();
            self.flashes[cs].cs.raise();
            self.flashes[cs].snoop = Snoop::off();
            let (offset, size) = self.variant.default_segments[cs];
            let segment = Segment { addr: self.flash_window_base.wrapping_add(offset), size };
            self.regs[reg::SEG_ADDR0 + cs] = (self.variant.encode)(self.flash_window_base, segment);
            self.flashes[cs].segment = segment;
            let region_offset = segment.addr.wrapping_sub(self.flash_window_base);
            self.flashes[cs].region.relocate(region_offset, segment.size, true);
        }
        self.irq.lower();
    }

    /// Capture the save/restore-relevant state (`SPEC_FULL.md` §6): excludes the SPI
    /// bus, chip-select/IRQ lines, and the two address spaces, which the board layer
    /// re-supplies when reconstructing a `Controller` on restore.
    pub fn snapshot(&self) -> ScSnapshot {
        ScSnapshot {
            regs: self.regs.clone(),
            flashes: self
                .flashes
                .iter()
                .map(|f| FlashSnapshot {
                    snoop_index: f.snoop.index(),
                    snoop_dummies: f.snoop.dummies(),
                    snoop_active: f.snoop.active(),
                })
                .collect(),
        }
    }

    /// Restore state captured by [`Self::snapshot`]. Does not touch the collaborator
    /// SPI bus, CS/IRQ lines, or address spaces. Chip-select sub-regions are not
    /// re-relocated here: callers that reconstruct a `Controller` with fresh regions
    /// should call [`Self::write_reg`] on the segment registers instead if that
    /// geometry needs to be re-applied.
    pub fn restore(&mut self, snapshot: &ScSnapshot) {
        self.regs.clear();
        self.regs.extend_from_slice(&snapshot.regs);
        for cs in 0..self.flashes.len() {
            self.flashes[cs].segment = (self.variant.decode)(self.flash_window_base, self.regs[reg::SEG_ADDR0 + cs]);
        }
        for (flash, saved) in self.flashes.iter_mut().zip(&snapshot.flashes) {
            flash.snoop = Snoop::from_raw(saved.snoop_index, saved.snoop_dummies, saved.snoop_active);
        }
    }

    // -- Register MMIO --------------------------------------------------------------

    /// Allow-listed register read; everything else is logged and returns `u32::MAX`
    /// (the SMC's -1 sentinel, per `SPEC_FULL.md` §4.2).
    pub fn read_reg(&self, word_index: usize) -> u32 {
        let seg_range = reg::SEG_ADDR0..reg::SEG_ADDR0 + self.variant.max_slaves;
        let ctrl_range = reg::CTRL0..reg::CTRL0 + self.variant.max_slaves;
        let allowed = matches!(word_index, reg::CONF | reg::TIMINGS | reg::CE_CTRL | reg::INTR_CTRL | reg::DUMMY_DATA)
            || (self.variant.has_dma
                && matches!(
                    word_index,
                    reg::DMA_CTRL | reg::DMA_FLASH_ADDR | reg::DMA_DRAM_ADDR | reg::DMA_LEN | reg::DMA_CHECKSUM
                ))
            || seg_range.contains(&word_index)
            || ctrl_range.contains(&word_index);
        if !allowed {
            warn!(target: "unimplemented", word_index, "unimplemented SMC register read");
            return u32::MAX;
        }
        self.regs.get(word_index).copied().unwrap_or(u32::MAX)
    }

    pub fn write_reg(&mut self, word_index: usize, value: u32) {
        match word_index {
            reg::CONF | reg::TIMINGS | reg::CE_CTRL => self.regs[word_index] = value,
            reg::DUMMY_DATA => self.regs[word_index] = value & 0xFF,
            reg::INTR_CTRL => self.regs[word_index] = value,
            reg::DMA_CTRL if self.variant.has_dma => self.write_dma_ctrl(value),
            reg::DMA_DRAM_ADDR if self.variant.has_dma => {
                self.regs[word_index] = self.sdram_base | (value & self.variant.dma_dram_mask);
            }
            reg::DMA_FLASH_ADDR if self.variant.has_dma => {
                self.regs[word_index] = self.flash_window_base | (value & self.variant.dma_flash_mask);
            }
            reg::DMA_LEN if self.variant.has_dma => self.regs[word_index] = value & 0x01FF_FFFC,
            _ if (reg::CTRL0..reg::CTRL0 + self.num_cs).contains(&word_index) => {
                self.write_ctrl0(word_index - reg::CTRL0, value)
            }
            _ if (reg::SEG_ADDR0..reg::SEG_ADDR0 + self.num_cs).contains(&word_index) => {
                self.write_seg_addr(word_index - reg::SEG_ADDR0, value)
            }
            _ => warn!(target: "unimplemented", word_index, "unimplemented SMC register write"),
        }
    }

    fn write_ctrl0(&mut self, cs: usize, value: u32) {
        self.regs[reg::CTRL0 + cs] = value;
        let stop_active = value & Ctrl0::CE_STOP_ACTIVE.bits() != 0;
        self.flashes[cs].cs.set(stop_active);
        self.flashes[cs].snoop = if stop_active { Snoop::off() } else { Snoop::start() };
    }

    fn write_seg_addr(&mut self, cs: usize, value: u32) {
        let current = self.regs[reg::SEG_ADDR0 + cs];
        if value == current {
            return;
        }
        let is_last = cs == self.variant.max_slaves - 1;
        let default_end = {
            let (offset, size) = self.variant.default_segments[self.variant.max_slaves - 1];
            self.flash_window_base.wrapping_add(offset).wrapping_add(size)
        };
        let others: Vec<Segment> =
            (0..self.num_cs).filter(|&i| i != cs).map(|i| self.flashes[i].segment).collect();
        let Some(update) = segment::update_segment(
            cs,
            value,
            self.flash_window_base,
            self.variant.flash_window_size,
            is_last,
            self.variant.immutable_last_segment,
            default_end,
            self.variant.encode,
            self.variant.decode,
            &others,
        ) else {
            return;
        };
        self.regs[reg::SEG_ADDR0 + cs] = update.reg;
        self.flashes[cs].segment = update.segment;
        segment::apply_segment(&mut self.flashes[cs].region, self.flash_window_base, &update);
    }

    // -- DMA --------------------------------------------------------------------

    fn write_dma_ctrl(&mut self, value: u32) {
        let ctrl = DmaCtrl::from_bits_truncate(value);
        if !ctrl.contains(DmaCtrl::ENABLE) {
            self.regs[reg::DMA_CTRL] = value;
            self.regs[reg::DMA_CHECKSUM] = 0;
            self.regs[reg::INTR_CTRL] &= !INTR_CTRL_DMA_STATUS;
            self.irq.lower();
            return;
        }
        let in_progress = DmaCtrl::from_bits_truncate(self.regs[reg::DMA_CTRL]).contains(DmaCtrl::ENABLE)
            && self.regs[reg::INTR_CTRL] & INTR_CTRL_DMA_STATUS == 0;
        if in_progress {
            warn!(target: "guest_error", "DMA already in progress, ignoring new request");
            return;
        }
        self.regs[reg::DMA_CTRL] = value;

        let flash_addr = self.regs[reg::DMA_FLASH_ADDR];
        let dram_addr = self.regs[reg::DMA_DRAM_ADDR];
        let len = self.regs[reg::DMA_LEN];
        let checksum_seed = self.regs[reg::DMA_CHECKSUM];

        // Calibration (`aspeed_smc_dma_calibration`) is only ever invoked from the
        // checksum path (`aspeed_smc_dma_checksum`), never from a plain copy.
        let valid_checksum_path = ctrl.contains(DmaCtrl::CKSUM) && !ctrl.contains(DmaCtrl::WRITE);

        let result = if ctrl.contains(DmaCtrl::CKSUM) {
            if ctrl.contains(DmaCtrl::WRITE) {
                warn!(target: "guest_error", "invalid direction for DMA checksum");
                dma::DmaResult { flash_addr, dram_addr: 0, len, checksum: checksum_seed }
            } else {
                if ctrl.contains(DmaCtrl::CALIB) {
                    self.run_calibration(value);
                }
                dma::run_checksum(&self.flash_as, flash_addr, len, checksum_seed)
            }
        } else {
            dma::run_copy(
                &mut self.flash_as,
                &mut self.dram_as,
                ctrl.contains(DmaCtrl::WRITE),
                flash_addr,
                dram_addr,
                len,
                checksum_seed,
            )
        };

        self.regs[reg::DMA_FLASH_ADDR] = result.flash_addr;
        if !ctrl.contains(DmaCtrl::CKSUM) {
            self.regs[reg::DMA_DRAM_ADDR] = result.dram_addr;
        }
        self.regs[reg::DMA_LEN] = result.len;
        self.regs[reg::DMA_CHECKSUM] = if valid_checksum_path && self.inject_failure {
            let freq = (value >> dma::DMA_FREQ_SHIFT) & dma::DMA_FREQ_MASK;
            let delay = (value >> dma::DMA_DELAY_SHIFT) & dma::DMA_DELAY_MASK;
            let divisor = dma::decode_divisor(freq);
            if dma::calibration_fails(divisor, delay) {
                dma::BAD_CHECKSUM
            } else {
                result.checksum
            }
        } else {
            result.checksum
        };

        self.regs[reg::INTR_CTRL] |= INTR_CTRL_DMA_STATUS;
        if self.regs[reg::INTR_CTRL] & INTR_CTRL_DMA_EN != 0 {
            self.irq.raise();
        }
    }

    /// Tunable delays only exist for HCLK/1 through HCLK/5; the clock-frequency field
    /// in CS0's `CTRL0` is written regardless, matching `aspeed_smc_dma_calibration`
    /// (the TIMINGS write is conditional, the CTRL0 write is not).
    fn run_calibration(&mut self, dma_ctrl_value: u32) {
        const CLOCK_FREQ_SHIFT: u32 = 8;
        const CLOCK_FREQ_MASK: u32 = 0xF;

        let freq = (dma_ctrl_value >> dma::DMA_FREQ_SHIFT) & dma::DMA_FREQ_MASK;
        let delay = (dma_ctrl_value >> dma::DMA_DELAY_SHIFT) & dma::DMA_DELAY_MASK;
        let divisor = dma::decode_divisor(freq);
        if (1..=5).contains(&divisor) {
            let nibble_shift = (divisor as u32 - 1) * 4;
            self.regs[reg::TIMINGS] &= !(0xF << nibble_shift);
            self.regs[reg::TIMINGS] |= (delay & 0xF) << nibble_shift;
        }
        self.regs[reg::CTRL0] &= !(CLOCK_FREQ_MASK << CLOCK_FREQ_SHIFT);
        self.regs[reg::CTRL0] |= (divisor as u32 & CLOCK_FREQ_MASK) << CLOCK_FREQ_SHIFT;
    }

    // -- Flash-window MMIO --------------------------------------------------------

    /// Dispatch a flash-window access that landed on chip-select `cs` at `offset`
    /// within its segment, per `SPEC_FULL.md` §4.2.2.
    pub fn flash_read(&mut self, cs: usize, offset: u32, size: usize) -> u32 {
        let wrapped = self.wrap_offset(cs, offset);
        let mode = self.mode(cs);
        match mode {
            MODE_USER => self.user_mode_read(cs, size),
            MODE_READ | MODE_FAST_READ => self.auto_mode_read(cs, wrapped, size, mode == MODE_FAST_READ),
            _ => {
                warn!(target: "guest_error", cs, mode, "flash read in write-only mode");
                0
            }
        }
    }

    pub fn flash_write(&mut self, cs: usize, offset: u32, value: u32, size: usize) {
        let wrapped = self.wrap_offset(cs, offset);
        let mode = self.mode(cs);
        match mode {
            MODE_USER => self.user_mode_write(cs, value, size),
            MODE_WRITE => self.auto_mode_write(cs, wrapped, value, size),
            _ => warn!(target: "guest_error", cs, mode, "flash write in read-only mode"),
        }
    }

    fn mode(&self, cs: usize) -> u32 {
        self.regs[reg::CTRL0 + cs] & Ctrl0::MODE_MASK.bits()
    }

    fn wrap_offset(&self, cs: usize, offset: u32) -> u32 {
        let size = self.flashes[cs].segment.size;
        if size == 0 {
            return offset;
        }
        let wrapped = offset % size;
        if wrapped != offset {
            warn!(target: "guest_error", cs, offset, size, "flash-window offset wrapped");
        }
        wrapped
    }

    fn addr_width(&self, cs: usize) -> usize {
        let ctrl0 = self.regs[reg::CTRL0 + cs];
        let extended = if self.variant.ast2400_spi_style_4byte {
            self.regs[reg::CTRL0] & Ctrl0::EXTENDED_ADDR.bits() != 0
        } else {
            self.regs[reg::CE_CTRL] & (1 << cs) != 0
        };
        if extended {
            4
        } else {
            3
        }
    }

    /// Number of dummy bytes to fake in Fast-Read mode: the raw 3-bit field is a cycle
    /// count in units of 8 (one dummy byte's worth of SPI clocks per unit), halved again
    /// when dual I/O addressing is selected. Matches `aspeed_smc_flash_dummies`.
    fn dummy_bytes(&self, cs: usize) -> usize {
        let ctrl0 = self.regs[reg::CTRL0 + cs];
        let high = (ctrl0 & Ctrl0::DUMMY_HIGH.bits() != 0) as u32;
        let low = (ctrl0 >> 6) & 0x3;
        let raw = (((high << 2) | low) * 8) as usize;
        if ctrl0 & Ctrl0::IO_DUAL_ADDR_DATA.bits() != 0 {
            raw / 2
        } else {
            raw
        }
    }

    /// In Read Mode the command is forced to `SPI_OP_READ`; every other mode must have
    /// an explicit command programmed into `CTRL0[23:16]`, else it's logged and the
    /// (invalid) zero command is sent as-is, matching `aspeed_smc_flash_cmd`.
    fn command_byte(&self, cs: usize, mode: u32) -> u8 {
        let explicit = (self.regs[reg::CTRL0 + cs] >> 16) & 0xFF;
        if mode == MODE_READ {
            return SPI_OP_READ;
        }
        if explicit == 0 {
            warn!(target: "guest_error", cs, mode, "no SPI command defined for this flash mode");
        }
        explicit as u8
    }

    fn auto_mode_read(&mut self, cs: usize, offset: u32, size: usize, fast: bool) -> u32 {
        self.flashes[cs].cs.lower();
        let mode = if fast { MODE_FAST_READ } else { MODE_READ };
        self.address_setup(cs, offset, mode);
        let mut v = 0u32;
        for i in 0..size {
            v |= (self.spi.transfer(0) as u32) << (8 * i);
        }
        self.flashes[cs].cs.raise();
        v
    }

    fn auto_mode_write(&mut self, cs: usize, offset: u32, value: u32, size: usize) {
        if self.regs[reg::CONF] & (1 << (16 + cs)) == 0 {
            warn!(target: "guest_error", cs, "write refused: CS write-enable bit is clear");
            return;
        }
        self.flashes[cs].cs.lower();
        self.address_setup(cs, offset, MODE_WRITE);
        for i in 0..size {
            self.spi.transfer(((value >> (8 * i)) & 0xff) as u8);
        }
        self.flashes[cs].cs.raise();
    }

    fn address_setup(&mut self, cs: usize, offset: u32, mode: u32) {
        let addr = self.flashes[cs].segment.addr.wrapping_add(offset);
        self.spi.transfer(self.command_byte(cs, mode));
        let width = self.addr_width(cs);
        for i in (0..width).rev() {
            self.spi.transfer(((addr >> (8 * i)) & 0xff) as u8);
        }
        if mode == MODE_FAST_READ {
            let dummy = self.regs[reg::DUMMY_DATA] as u8;
            for _ in 0..self.dummy_bytes(cs) {
                self.spi.transfer(dummy);
            }
        }
    }

    fn user_mode_read(&mut self, cs: usize, size: usize) -> u32 {
        let mut v = 0u32;
        for i in 0..size {
            v |= (self.spi.transfer(0) as u32) << (8 * i);
        }
        let _ = cs;
        v
    }

    fn user_mode_write(&mut self, cs: usize, value: u32, size: usize) {
        let addr_width = self.addr_width(cs);
        let first_byte = (value & 0xff) as u8;
        let dummy_data = self.regs[reg::DUMMY_DATA] as u8;
        let inject = self.flashes[cs].snoop.on_write(first_byte, size, addr_width);
        if inject > 0 {
            for _ in 0..inject {
                self.spi.transfer(dummy_data);
            }
            return;
        }
        for i in 0..size {
            self.spi.transfer(((value >> (8 * i)) & 0xff) as u8);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::test_doubles::RecordingSpi;
    use crate::irq::NullIrq;
    use crate::mem::test_doubles::{FlatMemory, TrackedRegion};

    fn make_fmc2500() -> Controller<RecordingSpi, NullIrq, NullIrq, TrackedRegion, FlatMemory, FlatMemory> {
        let variant = ScVariant::ast2500_fmc();
        let n = variant.max_slaves;
        let regions = (0..n).map(|_| TrackedRegion::default()).collect();
        let cs_lines = (0..n).map(|_| NullIrq::default()).collect();
        Controller::new(
            variant,
            0x2000_0000,
            n,
            regions,
            cs_lines,
            RecordingSpi::default(),
            NullIrq::default(),
            FlatMemory::new(),
            FlatMemory::new(),
            0x8000_0000,
        )
        .unwrap()
    }

    #[test]
    fn reset_loads_default_segments_and_straps_conf() {
        let ctl = make_fmc2500();
        assert_eq!(ctl.segment(0).addr, 0x2000_0000);
        // CE0 and CE1 are strapped SPI NOR (code 0x2) in their respective 2-bit fields.
        assert_eq!(ctl.read_reg(reg::CONF) & 0xFF, 0xA);
    }

    #[test]
    fn cs0_base_is_immutable() {
        let mut ctl = make_fmc2500();
        let bogus = Segment { addr: 0x2000_0000 + (32 << 20), size: 16 << 20 };
        let reg = (ctl.variant().encode)(ctl.flash_window_base, bogus);
        ctl.write_reg(reg::SEG_ADDR0, reg);
        assert_eq!(ctl.segment(0).addr, 0x2000_0000);
    }

    #[test]
    fn segment_relocation_moves_the_tracked_region() {
        let mut ctl = make_fmc2500();
        let new_seg = Segment { addr: 0x2000_0000 + (32 << 20), size: 16 << 20 };
        let reg = (ctl.variant().encode)(ctl.flash_window_base, new_seg);
        ctl.write_reg(reg::SEG_ADDR0 + 1, reg);
        assert_eq!(ctl.segment(1).addr, new_seg.addr);
        assert_eq!(ctl.segment(1).size, new_seg.size);
    }

    #[test]
    fn register_allow_list_blocks_unknown_offsets() {
        let ctl = make_fmc2500();
        assert_eq!(ctl.read_reg(0x0F), u32::MAX);
    }

    #[test]
    fn fast_read_dummy_cycle_count_is_raw_field_times_eight() {
        let mut ctl = make_fmc2500();
        // Fast-Read mode, explicit command 0x0B, dummy_low = 1 (dummy_high = 0) -> raw
        // field 1, so 8 fake dummy-byte transfers per `aspeed_smc_flash_dummies`.
        let ctrl0 = MODE_FAST_READ | (0x0B << 16) | (1 << 6);
        ctl.write_reg(reg::CTRL0, ctrl0);
        ctl.flash_read(0, 0, 1);
        // command byte + 3 address bytes (default width) + 8 dummy bytes + 1 data byte.
        assert_eq!(ctl.spi.sent.len(), 1 + 3 + 8 + 1);
        assert_eq!(ctl.spi.sent[0], 0x0B);
        assert_eq!(&ctl.spi.sent[4..12], &[0u8; 8]);
    }

    #[test]
    fn read_mode_forces_default_command_regardless_of_explicit_field() {
        let mut ctl = make_fmc2500();
        let ctrl0 = MODE_READ | (0x9F << 16);
        ctl.write_reg(reg::CTRL0, ctrl0);
        ctl.flash_read(0, 0, 1);
        assert_eq!(ctl.spi.sent[0], SPI_OP_READ);
    }

    #[test]
    fn user_mode_fast_read_snoop_replaces_first_post_header_write() {
        let mut ctl = make_fmc2500();
        ctl.write_reg(reg::DUMMY_DATA, 0x5A);
        ctl.write_ctrl0(0, MODE_USER); // arms the snoop tracker for CS0
        ctl.flash_write(0, 0, 0x0B, 1); // opcode: FAST_READ, one dummy byte
        ctl.flash_write(0, 0, 0x00, 1); // address byte 1
        ctl.flash_write(0, 0, 0x00, 1); // address byte 2
        ctl.flash_write(0, 0, 0x00, 1); // address byte 3
        ctl.flash_write(0, 0, 0xFF, 1); // guest's own byte, replaced by the dummy
        ctl.flash_write(0, 0, 0x77, 1); // snoop is done, this one passes through
        assert_eq!(ctl.spi.sent, vec![0x0B, 0x00, 0x00, 0x00, 0x5A, 0x77]);
    }

    #[test]
    fn snapshot_round_trips_registers_and_snoop_state() {
        let mut ctl = make_fmc2500();
        ctl.write_reg(reg::DUMMY_DATA, 0x5A);
        ctl.write_ctrl0(1, MODE_USER); // select CS1 in User Mode, arming its snoop tracker
        ctl.flash_write(1, 0, 0x0B, 1); // opcode byte, starts the snoop sequence

        assert_eq!(ScSnapshot::VERSION, 2);
        let snap = ctl.snapshot();
        ctl.reset();
        assert_eq!(ctl.read_reg(reg::DUMMY_DATA), 0);

        ctl.restore(&snap);
        assert_eq!(ctl.read_reg(reg::DUMMY_DATA), 0x5A);
        assert_eq!(ctl.flashes[1].snoop.index(), 1);
        assert_eq!(ctl.flashes[1].snoop.dummies(), 1);
    }

    #[test]
    fn dma_checksum_matches_sum_of_words() {
        let mut ctl = make_fmc2500();
        let flash = FlatMemory::with_words(0x2000_0000, &[1, 2, 3, 4]);
        ctl.flash_as = flash;
        ctl.write_reg(reg::DMA_FLASH_ADDR, 0);
        ctl.regs[reg::DMA_FLASH_ADDR] = 0x2000_0000;
        ctl.write_reg(reg::DMA_LEN, 16);
        let ctrl = (DmaCtrl::ENABLE | DmaCtrl::CKSUM).bits();
        ctl.write_reg(reg::DMA_CTRL, ctrl);
        assert_eq!(ctl.read_reg(reg::DMA_CHECKSUM), 10);
        assert_eq!(ctl.read_reg(reg::DMA_LEN), 0);
    }

    #[test]
    fn checksum_with_write_direction_is_rejected_but_still_signals_done() {
        let mut ctl = make_fmc2500();
        let flash = FlatMemory::with_words(0x2000_0000, &[1, 2, 3, 4]);
        ctl.flash_as = flash;
        ctl.regs[reg::DMA_FLASH_ADDR] = 0x2000_0000;
        ctl.write_reg(reg::DMA_LEN, 16);
        let ctrl = (DmaCtrl::ENABLE | DmaCtrl::CKSUM | DmaCtrl::WRITE).bits();
        ctl.write_reg(reg::DMA_CTRL, ctrl);
        // rejected direction: loop never ran, registers stay at their entry values
        assert_eq!(ctl.read_reg(reg::DMA_CHECKSUM), 0);
        assert_eq!(ctl.read_reg(reg::DMA_LEN), 16);
        assert_ne!(ctl.read_reg(reg::INTR_CTRL) & INTR_CTRL_DMA_STATUS, 0);
    }

    #[test]
    fn calibration_failure_injection_forces_bad_checksum() {
        let mut ctl = make_fmc2500();
        ctl.inject_failure = true;
        let flash = FlatMemory::with_words(0x2000_0000, &[1, 2, 3, 4]);
        ctl.flash_as = flash;
        ctl.regs[reg::DMA_FLASH_ADDR] = 0x2000_0000;
        ctl.write_reg(reg::DMA_LEN, 16);
        let ctrl = (DmaCtrl::ENABLE | DmaCtrl::CKSUM | DmaCtrl::CALIB).bits();
        let ctrl_divisor_one = ctrl | (15 << dma::DMA_FREQ_SHIFT); // nibble 15 decodes to divisor 1
        ctl.write_reg(reg::DMA_CTRL, ctrl_divisor_one);
        assert_eq!(ctl.read_reg(reg::DMA_CHECKSUM), dma::BAD_CHECKSUM);
    }

    #[test]
    fn calibration_does_not_run_for_plain_copy_even_with_calib_set() {
        let mut ctl = make_fmc2500();
        let flash = FlatMemory::with_words(0x2000_0000, &[1, 2, 3, 4]);
        ctl.flash_as = flash;
        ctl.regs[reg::DMA_FLASH_ADDR] = 0x2000_0000;
        ctl.regs[reg::DMA_DRAM_ADDR] = ctl.sdram_base;
        ctl.write_reg(reg::DMA_LEN, 16);
        let before = ctl.read_reg(reg::TIMINGS);
        let ctrl = (DmaCtrl::ENABLE | DmaCtrl::CALIB).bits() | (15 << dma::DMA_FREQ_SHIFT);
        ctl.write_reg(reg::DMA_CTRL, ctrl);
        assert_eq!(ctl.read_reg(reg::TIMINGS), before);
    }

    #[test]
    fn inject_failure_applies_to_checksum_without_calib() {
        let mut ctl = make_fmc2500();
        ctl.inject_failure = true;
        let flash = FlatMemory::with_words(0x2000_0000, &[1, 2, 3, 4]);
        ctl.flash_as = flash;
        ctl.regs[reg::DMA_FLASH_ADDR] = 0x2000_0000;
        ctl.write_reg(reg::DMA_LEN, 16);
        let ctrl = (DmaCtrl::ENABLE | DmaCtrl::CKSUM).bits() | (15 << dma::DMA_FREQ_SHIFT);
        ctl.write_reg(reg::DMA_CTRL, ctrl);
        assert_eq!(ctl.read_reg(reg::DMA_CHECKSUM), dma::BAD_CHECKSUM);
    }

    #[test]
    fn dma_irq_raises_only_when_dma_en_bit_is_set() {
        let mut ctl = make_fmc2500();
        let flash = FlatMemory::with_words(0x2000_0000, &[1, 2, 3, 4]);
        ctl.flash_as = flash;
        ctl.regs[reg::DMA_FLASH_ADDR] = 0x2000_0000;
        ctl.write_reg(reg::DMA_LEN, 16);
        let ctrl = (DmaCtrl::ENABLE | DmaCtrl::CKSUM).bits();
        ctl.write_reg(reg::DMA_CTRL, ctrl);
        assert!(!ctl.irq.level);
        assert_ne!(ctl.read_reg(reg::INTR_CTRL) & INTR_CTRL_DMA_STATUS, 0);

        ctl.regs[reg::INTR_CTRL] |= INTR_CTRL_DMA_EN;
        ctl.write_reg(reg::DMA_CTRL, ctrl & !DmaCtrl::ENABLE.bits());
        ctl.write_reg(reg::DMA_FLASH_ADDR, 0);
        ctl.regs[reg::DMA_FLASH_ADDR] = 0x2000_0000;
        ctl.write_reg(reg::DMA_LEN, 16);
        ctl.regs[reg::INTR_CTRL] |= INTR_CTRL_DMA_EN;
        ctl.write_reg(reg::DMA_CTRL, ctrl);
        assert!(ctl.irq.level);
    }
}
