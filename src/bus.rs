//! Outward I²C and SPI bus collaborator contracts.
//!
//! The controllers in this crate never talk to a real wire: they drive whatever
//! implements these traits, the same way the donor QEMU devices call through
//! `i2c_send`/`i2c_recv`/`ssi_transfer` into an `I2CBus`/`SSIBus` object owned by the
//! board.

/// Master-mode-only I²C bus contract. Slave mode is out of scope (see `SPEC_FULL.md`
/// §1 Non-goals).
pub trait I2cBus {
    /// Issue a (repeated) START and the address byte. `rnw` is the direction bit
    /// (true = read). Returns whether a slave acknowledged.
    fn start_transfer(&mut self, addr7: u8, rnw: bool) -> bool;

    /// Send one data byte. Returns whether it was acknowledged.
    fn send(&mut self, byte: u8) -> bool;

    /// Receive one data byte.
    fn recv(&mut self) -> u8;

    /// Send a NACK instead of an ACK for the byte about to be received.
    fn nack(&mut self);

    /// Issue STOP and release the bus.
    fn end_transfer(&mut self);

    /// Whether some master (possibly this one) currently holds the bus.
    fn is_busy(&self) -> bool;
}

/// Byte-at-a-time SPI bus contract. Chip-select is driven out of band via
/// [`crate::irq::IrqLine`], one per chip-select, matching `ssi_transfer` plus the
/// `cs_lines` array in the donor.
pub trait SpiBus {
    /// Shift `byte_out` out while shifting a byte in, full-duplex, as real SPI does.
    fn transfer(&mut self, byte_out: u8) -> u8;
}
