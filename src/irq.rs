//! Level-triggered IRQ line collaborator contract.

/// A single level-triggered interrupt output.
///
/// Mirrors `qemu_irq`/`qemu_set_irq` in the donor source: the controller only ever
/// sets a level, it never pulses or counts edges.
pub trait IrqLine {
    fn set(&mut self, level: bool);

    fn raise(&mut self) {
        self.set(true);
    }

    fn lower(&mut self) {
        self.set(false);
    }
}

/// A no-op line, useful for tests and for unwired outputs on partially populated
/// boards.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NullIrq {
    pub level: bool,
}

impl IrqLine for NullIrq {
    fn set(&mut self, level: bool) {
        self.level = level;
    }
}
