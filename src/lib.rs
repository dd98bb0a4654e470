//! Memory-mapped device models for the Aspeed AST2400/AST2500/AST2600 BMC SoC family.
//!
//! This crate emulates two peripherals found on those SoCs:
//!
//! - [`ic`]: the I²C multi-bus controller (`IC`), with per-bus state machines and a
//!   shared pool buffer for burst transfers.
//! - [`smc`]: the Static/Firmware Memory Controller (`SMC`/`FMC`/`SPI`), mapping flash
//!   chip-selects into a CPU-visible window and driving an optional DMA engine.
//!
//! Both controllers are collaborator-driven: they never own a wire or a DRAM array
//! themselves, only the [`bus`], [`mem`], and [`irq`] traits a host binds to a real bus
//! master, backing store, and interrupt controller. Ground truth for register
//! semantics is the Aspeed QEMU device models (`aspeed_i2c.c`, `aspeed_smc.c`).

pub mod bus;
pub mod ic;
pub mod irq;
pub mod mem;
pub mod smc;
