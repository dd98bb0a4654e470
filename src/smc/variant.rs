//! Per-SoC/per-instance constants for the eight concrete SMC/FMC/SPI controllers.
//!
//! Unlike the I²C side, every one of these differs only in data (register count,
//! chip-select count, segment geometry, DMA masks, flash-type straps), never in
//! control flow, so they are modeled as one descriptor struct built by a constructor
//! per concrete variant, mirroring `aspeed_{smc,fmc,spi}_class_init` in the donor.

use crate::smc::segment::{decode_absolute, decode_offset, encode_absolute, encode_offset, Segment};

/// Word-indexed register map shared by every variant. These are this crate's own
/// internal register numbering, not a claim about real hardware byte offsets — the
/// spec's Non-goals exclude electrical/bus-layout fidelity (see DESIGN.md).
pub mod reg {
    pub const CONF: usize = 0x00;
    pub const CE_CTRL: usize = 0x01;
    pub const INTR_CTRL: usize = 0x02;
    pub const DUMMY_DATA: usize = 0x03;
    pub const TIMINGS: usize = 0x04;
    pub const DMA_CTRL: usize = 0x05;
    pub const DMA_DRAM_ADDR: usize = 0x06;
    pub const DMA_FLASH_ADDR: usize = 0x07;
    pub const DMA_LEN: usize = 0x08;
    pub const DMA_CHECKSUM: usize = 0x09;
    pub const CTRL0: usize = 0x10;
    pub const SEG_ADDR0: usize = 0x20;
}

/// A 2-bit `CONF_FLASH_TYPE_SPI` code strapped into `CONF[2*cs +: 2]` at reset to mark
/// a chip-select as SPI NOR flash (the other code in that field, `_NOR`, is never
/// emulated — every chip-select this crate models is SPI NOR).
#[derive(Debug, Clone, Copy)]
pub struct FlashTypeStrap {
    pub cs: usize,
    pub conf_bit: u32,
}

const CONF_FLASH_TYPE_SPI: u32 = 0x2;

const fn flash_type_strap(cs: usize) -> FlashTypeStrap {
    FlashTypeStrap { cs, conf_bit: CONF_FLASH_TYPE_SPI << (2 * cs) }
}

pub type EncodeFn = fn(u32, Segment) -> u32;
pub type DecodeFn = fn(u32, u32) -> Segment;

/// Immutable per-model descriptor. One value per concrete controller instance type
/// (FMC/SPI1/SPI2 × {2400,2500,2600}, plus the legacy combined SMC).
#[derive(Clone)]
pub struct ScVariant {
    pub name: &'static str,
    pub max_slaves: usize,
    pub flash_window_size: u32,
    pub has_dma: bool,
    pub dma_flash_mask: u32,
    pub dma_dram_mask: u32,
    /// Only the two AST2500 SPI controllers enforce this (see `SPEC_FULL.md` §4.2.1 step 3).
    pub immutable_last_segment: bool,
    /// Whether 4-byte addressing is selected via `CTRL0[13]` on this single-CS
    /// controller (`aspeed_segments_spi`, i.e. the legacy AST2400 SPI1) rather than via
    /// per-CS `CE_CTRL[EXTENDEDi]` bits, per `aspeed_smc_flash_is_4byte`.
    pub ast2400_spi_style_4byte: bool,
    /// Default `(offset_from_window_base, size)` per chip-select, applied at reset.
    pub default_segments: &'static [(u32, u32)],
    pub encode: EncodeFn,
    pub decode: DecodeFn,
    pub flash_type_straps: &'static [FlashTypeStrap],
}

impl ScVariant {
    pub fn nregs(&self) -> usize {
        (reg::SEG_ADDR0 + self.max_slaves).max(reg::CTRL0 + self.max_slaves)
    }

    const MIB: u32 = 1 << 20;

    /// Legacy combined SMC controller (`aspeed.smc-ast2400`). Only chip-select 0 has a
    /// defined default segment even though `max_slaves` is 5; the rest decode to a
    /// zero-size (disabled) segment until the guest programs them.
    pub fn ast2400_smc() -> Self {
        ScVariant {
            name: "aspeed.smc-2400",
            max_slaves: 5,
            flash_window_size: 0x0600_0000,
            has_dma: false,
            dma_flash_mask: 0,
            dma_dram_mask: 0,
            immutable_last_segment: false,
            ast2400_spi_style_4byte: false,
            default_segments: &[(0, 32 * Self::MIB), (0, 0), (0, 0), (0, 0), (0, 0)],
            encode: encode_absolute,
            decode: decode_absolute,
            flash_type_straps: &[],
        }
    }

    /// `aspeed_segments_fmc`: CS0's 64 MiB segment is followed by four 32 MiB slots,
    /// covering 192 MiB of the 256 MiB window and leaving the remainder unmapped.
    pub fn ast2400_fmc() -> Self {
        ScVariant {
            name: "aspeed.fmc-2400",
            max_slaves: 5,
            flash_window_size: 0x1000_0000,
            has_dma: true,
            dma_flash_mask: 0x0FFF_FFFC,
            dma_dram_mask: 0x1FFF_FFFC,
            immutable_last_segment: false,
            ast2400_spi_style_4byte: false,
            default_segments: &[
                (0, 64 * Self::MIB),
                (64 * Self::MIB, 32 * Self::MIB),
                (96 * Self::MIB, 32 * Self::MIB),
                (128 * Self::MIB, 32 * Self::MIB),
                (160 * Self::MIB, 32 * Self::MIB),
            ],
            encode: encode_absolute,
            decode: decode_absolute,
            flash_type_straps: &[flash_type_strap(0)],
        }
    }

    pub fn ast2400_spi() -> Self {
        ScVariant {
            name: "aspeed.spi1-2400",
            max_slaves: 1,
            flash_window_size: 0x1000_0000,
            has_dma: false,
            dma_flash_mask: 0,
            dma_dram_mask: 0,
            immutable_last_segment: false,
            ast2400_spi_style_4byte: true,
            default_segments: &[(0, 64 * Self::MIB)],
            encode: encode_absolute,
            decode: decode_absolute,
            flash_type_straps: &[],
        }
    }

    /// `aspeed_segments_ast2500_fmc`: CS0's 128 MiB segment plus two 32 MiB slots,
    /// covering 192 MiB of the 256 MiB window.
    pub fn ast2500_fmc() -> Self {
        ScVariant {
            name: "aspeed.fmc-2500",
            max_slaves: 3,
            flash_window_size: 0x1000_0000,
            has_dma: true,
            dma_flash_mask: 0x0FFF_FFFC,
            dma_dram_mask: 0x3FFF_FFFC,
            immutable_last_segment: false,
            ast2400_spi_style_4byte: false,
            default_segments: &[
                (0, 128 * Self::MIB),
                (128 * Self::MIB, 32 * Self::MIB),
                (160 * Self::MIB, 32 * Self::MIB),
            ],
            encode: encode_absolute,
            decode: decode_absolute,
            flash_type_straps: &[flash_type_strap(0), flash_type_strap(1)],
        }
    }

    pub fn ast2500_spi1() -> Self {
        ScVariant {
            name: "aspeed.spi1-2500",
            max_slaves: 2,
            flash_window_size: 0x0800_0000,
            has_dma: false,
            dma_flash_mask: 0,
            dma_dram_mask: 0,
            immutable_last_segment: true,
            ast2400_spi_style_4byte: false,
            default_segments: &[(0, 32 * Self::MIB), (32 * Self::MIB, 96 * Self::MIB)],
            encode: encode_absolute,
            decode: decode_absolute,
            flash_type_straps: &[],
        }
    }

    pub fn ast2500_spi2() -> Self {
        ScVariant {
            name: "aspeed.spi2-2500",
            max_slaves: 2,
            flash_window_size: 0x0800_0000,
            has_dma: false,
            dma_flash_mask: 0,
            dma_dram_mask: 0,
            immutable_last_segment: true,
            ast2400_spi_style_4byte: false,
            default_segments: &[(0, 32 * Self::MIB), (32 * Self::MIB, 96 * Self::MIB)],
            encode: encode_absolute,
            decode: decode_absolute,
            flash_type_straps: &[],
        }
    }

    /// `aspeed_segments_ast2600_fmc`: only CS0 has a default 128 MiB segment; CS1/CS2
    /// are disabled (zero-size) until the guest programs them. The donor's static
    /// initializer leaves `dma_flash_mask`/`dma_dram_mask` at their C zero-default for
    /// this entry, so DMA addressing is unmasked (kept bit-exact rather than guessed).
    pub fn ast2600_fmc() -> Self {
        ScVariant {
            name: "aspeed.fmc-2600",
            max_slaves: 3,
            flash_window_size: 0x1000_0000,
            has_dma: true,
            dma_flash_mask: 0,
            dma_dram_mask: 0,
            immutable_last_segment: false,
            ast2400_spi_style_4byte: false,
            default_segments: &[(0, 128 * Self::MIB), (0, 0), (0, 0)],
            encode: encode_offset,
            decode: decode_offset,
            flash_type_straps: &[flash_type_strap(0), flash_type_strap(1), flash_type_strap(2)],
        }
    }

    pub fn ast2600_spi1() -> Self {
        ScVariant {
            name: "aspeed.spi1-2600",
            max_slaves: 2,
            flash_window_size: 0x1000_0000,
            has_dma: false,
            dma_flash_mask: 0,
            dma_dram_mask: 0,
            immutable_last_segment: false,
            ast2400_spi_style_4byte: false,
            default_segments: &[(0, 128 * Self::MIB), (0, 0)],
            encode: encode_offset,
            decode: decode_offset,
            flash_type_straps: &[],
        }
    }

    pub fn ast2600_spi2() -> Self {
        ScVariant {
            name: "aspeed.spi2-2600",
            max_slaves: 3,
            flash_window_size: 0x1000_0000,
            has_dma: false,
            dma_flash_mask: 0,
            dma_dram_mask: 0,
            immutable_last_segment: false,
            ast2400_spi_style_4byte: false,
            default_segments: &[(0, 128 * Self::MIB), (0, 0), (0, 0)],
            encode: encode_offset,
            decode: decode_offset,
            flash_type_straps: &[],
        }
    }
}
