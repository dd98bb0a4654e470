//! I²C multi-bus controller (`IC`).
//!
//! Emulates the Aspeed AST2400/2500/2600 I²C controller: N logical busses, each a
//! register-driven master-mode state machine framing transactions on a collaborator
//! [`I2cBus`], plus a shared pool buffer for burst transfers and per-variant
//! interrupt routing. Ground truth: `aspeed_i2c.c` in the donor source tree.

pub mod variant;

use bitflags::bitflags;
use tracing::{trace, warn};

use crate::bus::I2cBus;
use crate::irq::IrqLine;
pub use variant::IcVariant;

bitflags! {
    /// `I2CD_FUN_CTRL_REG` bits this model actually interprets. The full donor mask
    /// (`0x0071C3FF`) also covers SDA/SCL drive strength and multi-master knobs that
    /// are stored but never consulted by any emulated behavior.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FunCtrl: u32 {
        const MASTER_EN = 1 << 0;
        const SLAVE_EN  = 1 << 1;
    }
}

const FUN_CTRL_MASK: u32 = 0x0071_C3FF;
const TIMING1_MASK: u32 = 0x0FFF_FF0F;
const TIMING2_MASK: u32 = 0x7;
const INTR_MASK: u32 = 0x7FFF;
const POOL_CTRL_MASK: u32 = 0x00FF_FFFF;

bitflags! {
    /// `I2CD_INTR_CTRL_REG` / `I2CD_INTR_STS_REG` bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct IntrBits: u32 {
        const TX_ACK       = 1 << 0;
        const TX_NAK       = 1 << 1;
        const RX_DONE      = 1 << 2;
        const ARBIT_LOSS   = 1 << 3;
        const NORMAL_STOP  = 1 << 4;
        const ABNORMAL     = 1 << 5;
        const SCL_TIMEOUT  = 1 << 6;
    }
}

bitflags! {
    /// `I2CD_CMD_REG` command bits, low 16 of the 32-bit register (the upper bits hold
    /// `TX_STATE` and bus-line status and are not part of the command word itself).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Cmd: u32 {
        const M_START_CMD      = 1 << 0;
        const M_TX_CMD         = 1 << 1;
        const S_TX_CMD         = 1 << 2;
        const M_RX_CMD         = 1 << 3;
        const M_S_RX_CMD_LAST  = 1 << 4;
        const M_STOP_CMD       = 1 << 5;
        const TX_BUFF_ENABLE   = 1 << 6;
        const RX_BUFF_ENABLE   = 1 << 7;
    }
}

const CMD_WORD_MASK: u32 = 0xFFFF;
const TX_STATE_SHIFT: u32 = 19;
const TX_STATE_MASK: u32 = 0xF;

/// `TX_STATE` nibble of the CMD register. Only the master-mode states are ever
/// produced by this model; slave states exist for bit-exact encoding fidelity but are
/// never entered (slave mode is a Non-goal).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TxState {
    Idle = 0x0,
    Swait = 0x1,
    Recover = 0x3,
    Srxd = 0x4,
    Stxack = 0x5,
    Stxd = 0x6,
    Srxack = 0x7,
    Mactive = 0x8,
    Mstart = 0x9,
    Mstartr = 0xa,
    Mstop = 0xb,
    Mtxd = 0xc,
    Mrxack = 0xd,
    Mrxd = 0xe,
    Mtxack = 0xf,
}

impl TxState {
    fn from_bits(bits: u8) -> Self {
        match bits & 0xF {
            0x0 => TxState::Idle,
            0x1 => TxState::Swait,
            0x3 => TxState::Recover,
            0x4 => TxState::Srxd,
            0x5 => TxState::Stxack,
            0x6 => TxState::Stxd,
            0x7 => TxState::Srxack,
            0x9 => TxState::Mstart,
            0xa => TxState::Mstartr,
            0xb => TxState::Mstop,
            0xc => TxState::Mtxd,
            0xd => TxState::Mrxack,
            0xe => TxState::Mrxd,
            0xf => TxState::Mtxack,
            _ => TxState::Mactive,
        }
    }
}

/// Per-bus register window plus its own slice of the shared pool buffer.
pub struct Bus {
    id: usize,
    ctrl: u32,
    timing: [u32; 2],
    intr_ctrl: u32,
    intr_status: u32,
    cmd: u32,
    buf: u32,
    pool_ctrl: u32,
}

impl Bus {
    fn new(id: usize) -> Self {
        Self {
            id,
            ctrl: 0,
            timing: [0; 2],
            intr_ctrl: 0,
            intr_status: 0,
            cmd: 0,
            buf: 0,
            pool_ctrl: 0,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn ctrl(&self) -> u32 {
        self.ctrl
    }

    pub fn intr_status(&self) -> u32 {
        self.intr_status
    }

    pub fn intr_ctrl(&self) -> u32 {
        self.intr_ctrl
    }

    pub fn buf(&self) -> u32 {
        self.buf
    }

    pub fn pool_ctrl(&self) -> u32 {
        self.pool_ctrl
    }

    pub fn state(&self) -> TxState {
        TxState::from_bits(((self.cmd >> TX_STATE_SHIFT) & TX_STATE_MASK) as u8)
    }

    fn set_state(&mut self, state: TxState) {
        self.cmd &= !(TX_STATE_MASK << TX_STATE_SHIFT);
        self.cmd |= (state as u32 & TX_STATE_MASK) << TX_STATE_SHIFT;
    }

    fn is_master(&self) -> bool {
        self.ctrl & FunCtrl::MASTER_EN.bits() != 0
    }

    fn is_enabled(&self) -> bool {
        self.ctrl & (FunCtrl::MASTER_EN | FunCtrl::SLAVE_EN).bits() != 0
    }

    /// `BYTE_BUF` composite read value: RX in bits 15:8, TX in bits 7:0.
    pub fn byte_buf_read(&self) -> u32 {
        self.buf
    }

    fn byte_buf_tx(&self) -> u8 {
        (self.buf & 0xff) as u8
    }

    fn byte_buf_set_rx(&mut self, data: u8) {
        self.buf = (self.buf & 0xff) | ((data as u32) << 8);
    }
}

/// Persisted per-bus fields, per `SPEC_FULL.md` §6.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BusSnapshot {
    pub id: usize,
    pub ctrl: u32,
    pub timing: [u32; 2],
    pub intr_ctrl: u32,
    pub intr_status: u32,
    pub cmd: u32,
    pub buf: u32,
    pub pool_ctrl: u32,
}

/// Full persisted controller state: the `std`-idiomatic analogue of the donor's
/// `VMStateDescription` for `TYPE_ASPEED_I2C`, produced by [`Controller::snapshot`] and
/// consumed by [`Controller::restore`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IcSnapshot {
    pub intr_status: u32,
    pub busses: Vec<BusSnapshot>,
    pub pool: Vec<u8>,
}

impl IcSnapshot {
    /// Matches the donor's `VMStateDescription.version_id` for `vmstate_aspeed_i2c`.
    pub const VERSION: u32 = 2;
}

/// I²C multi-bus controller.
pub struct Controller<B: I2cBus, Irq: IrqLine> {
    variant: IcVariant,
    intr_status: u32,
    busses: Vec<Bus>,
    bus_devices: Vec<B>,
    pool: Vec<u8>,
    /// One entry when `variant.per_bus_irq()`, else a single shared line shared by
    /// every bus (index 0 used for all).
    irqs: Vec<Irq>,
}

impl<B: I2cBus, Irq: IrqLine> Controller<B, Irq> {
    /// Build a controller for `variant`, given one collaborator bus and IRQ line per
    /// logical bus (for 2400/2500 all `irqs` entries beyond the first are ignored;
    /// pass the same shared line cloned/wrapped by the caller if that matters to it).
    pub fn new(variant: IcVariant, bus_devices: Vec<B>, irqs: Vec<Irq>) -> Self {
        let n = variant.num_busses();
        assert_eq!(bus_devices.len(), n, "one I2cBus collaborator per logical bus");
        assert_eq!(
            irqs.len(),
            if variant.per_bus_irq() { n } else { 1 },
            "one IRQ line per bus (per-bus routing) or exactly one shared line"
        );
        let busses = (0..n).map(Bus::new).collect();
        let pool = vec![0u8; variant.pool_size()];
        let mut ctl = Self {
            variant,
            intr_status: 0,
            busses,
            bus_devices,
            pool,
            irqs,
        };
        ctl.reset();
        ctl
    }

    pub fn variant(&self) -> IcVariant {
        self.variant
    }

    pub fn intr_status(&self) -> u32 {
        self.intr_status
    }

    pub fn bus(&self, busnr: usize) -> &Bus {
        &self.busses[busnr]
    }

    /// Accessor for the board layer to reach the collaborator attached to a given
    /// bus, e.g. to attach/detach slave models.
    pub fn bus_device(&mut self, busnr: usize) -> &mut B {
        &mut self.bus_devices[busnr]
    }

    /// Zero everything reset clears in the donor source: per-bus `intr_ctrl`,
    /// `intr_status`, `cmd`, `buf`, and the controller aggregate `intr_status`. Note
    /// `ctrl`, `timing` and `pool_ctrl` deliberately survive reset, exactly as in
    /// `aspeed_i2c_reset` (see DESIGN.md decision log).
    pub fn reset(&mut self) {
        self.intr_status = 0;
        for bus in &mut self.busses {
            bus.intr_ctrl = 0;
            bus.intr_status = 0;
            bus.cmd = 0;
            bus.buf = 0;
        }
        for irq in &mut self.irqs {
            irq.lower();
        }
    }

    /// Capture the save/restore-relevant state (`SPEC_FULL.md` §6): excludes the
    /// collaborator busses, IRQ lines, and variant, which the board layer re-supplies
    /// when reconstructing a `Controller` on restore.
    pub fn snapshot(&self) -> IcSnapshot {
        IcSnapshot {
            intr_status: self.intr_status,
            busses: self
                .busses
                .iter()
                .map(|bus| BusSnapshot {
                    id: bus.id,
                    ctrl: bus.ctrl,
                    timing: bus.timing,
                    intr_ctrl: bus.intr_ctrl,
                    intr_status: bus.intr_status,
                    cmd: bus.cmd,
                    buf: bus.buf,
                    pool_ctrl: bus.pool_ctrl,
                })
                .collect(),
            pool: self.pool.clone(),
        }
    }

    /// Restore state captured by [`Self::snapshot`]. Does not touch collaborator bus
    /// devices or IRQ lines; callers resume from whatever level those were left at.
    pub fn restore(&mut self, snapshot: &IcSnapshot) {
        self.intr_status = snapshot.intr_status;
        for (bus, saved) in self.busses.iter_mut().zip(&snapshot.busses) {
            bus.ctrl = saved.ctrl;
            bus.timing = saved.timing;
            bus.intr_ctrl = saved.intr_ctrl;
            bus.intr_status = saved.intr_status;
            bus.cmd = saved.cmd;
            bus.buf = saved.buf;
            bus.pool_ctrl = saved.pool_ctrl;
        }
        self.pool.clear();
        self.pool.extend_from_slice(&snapshot.pool);
    }

    fn irq_for_mut(&mut self, busnr: usize) -> &mut Irq {
        if self.variant.per_bus_irq() {
            &mut self.irqs[busnr]
        } else {
            &mut self.irqs[0]
        }
    }

    /// `I2C_CTRL_STATUS` global register read.
    pub fn read_ctrl_status(&self) -> u32 {
        self.intr_status
    }

    /// `I2C_CTRL_STATUS` global register write: ignored, logged.
    pub fn write_ctrl_status(&mut self, _value: u32) {
        warn!(target: "guest_error", "I2C_CTRL_STATUS is read-only");
    }

    // -- Per-bus register access --------------------------------------------------

    pub fn read_bus_reg(&self, busnr: usize, offset: u32) -> u32 {
        let bus = &self.busses[busnr];
        match offset {
            0x00 => bus.ctrl,
            0x04 => bus.timing[0],
            0x08 => bus.timing[1],
            0x0C => bus.intr_ctrl,
            0x10 => bus.intr_status,
            0x14 => bus.cmd | ((self.bus_devices[busnr].is_busy() as u32) << 16),
            0x18 => {
                warn!(target: "unimplemented", bus = busnr, "DEV_ADDR read (slave mode)");
                0
            }
            0x1C => bus.pool_ctrl,
            0x20 => bus.byte_buf_read(),
            _ => {
                warn!(target: "guest_error", bus = busnr, offset, "bad I2C bus register offset");
                u32::MAX
            }
        }
    }

    pub fn write_bus_reg(&mut self, busnr: usize, offset: u32, value: u32) {
        match offset {
            0x00 => {
                if value & FunCtrl::SLAVE_EN.bits() != 0 {
                    warn!(target: "unimplemented", bus = busnr, "slave mode not implemented");
                    return;
                }
                self.busses[busnr].ctrl = value & FUN_CTRL_MASK;
            }
            0x04 => self.busses[busnr].timing[0] = value & TIMING1_MASK,
            0x08 => self.busses[busnr].timing[1] = value & TIMING2_MASK,
            0x0C => self.busses[busnr].intr_ctrl = value & INTR_MASK,
            0x10 => self.write_intr_sts(busnr, value),
            0x14 => self.write_cmd(busnr, value),
            0x18 => warn!(target: "unimplemented", bus = busnr, "slave mode not implemented"),
            0x1C => {
                let bus = &mut self.busses[busnr];
                bus.pool_ctrl &= !POOL_CTRL_MASK;
                bus.pool_ctrl |= value & POOL_CTRL_MASK;
            }
            0x20 => self.busses[busnr].buf = value & 0xff,
            _ => warn!(target: "unimplemented", bus = busnr, offset, "unknown I2C bus register"),
        }
    }

    fn write_intr_sts(&mut self, busnr: usize, value: u32) {
        let handle_rx = (self.busses[busnr].intr_status & IntrBits::RX_DONE.bits() != 0)
            && (value & IntrBits::RX_DONE.bits() != 0);
        self.busses[busnr].intr_status &= !(value & INTR_MASK);
        if self.busses[busnr].intr_status == 0 {
            self.intr_status &= !(1 << busnr);
            self.irq_for_mut(busnr).lower();
        }
        let rx_pending =
            self.busses[busnr].cmd & (Cmd::M_RX_CMD | Cmd::M_S_RX_CMD_LAST).bits() != 0;
        if handle_rx && rx_pending {
            self.handle_rx_cmd(busnr);
            self.raise_interrupt(busnr);
        }
    }

    /// Dispatch a CMD register write: execute START→TX→RX→STOP in order, per
    /// `SPEC_FULL.md` §4.1.
    fn write_cmd(&mut self, busnr: usize, value: u32) {
        if !self.busses[busnr].is_enabled() {
            return;
        }
        if !self.busses[busnr].is_master() {
            warn!(target: "unimplemented", bus = busnr, "slave mode not implemented");
            return;
        }

        {
            let bus = &mut self.busses[busnr];
            bus.cmd &= !CMD_WORD_MASK;
            bus.cmd |= value & CMD_WORD_MASK;
        }

        if self.busses[busnr].cmd & Cmd::M_START_CMD.bits() != 0 {
            if !self.handle_start_cmd(busnr) {
                self.raise_interrupt(busnr);
                return;
            }
        }

        if self.busses[busnr].cmd & Cmd::M_TX_CMD.bits() != 0 {
            self.handle_tx_cmd(busnr);
        }

        let rx_pending =
            self.busses[busnr].cmd & (Cmd::M_RX_CMD | Cmd::M_S_RX_CMD_LAST).bits() != 0;
        let rx_done = self.busses[busnr].intr_status & IntrBits::RX_DONE.bits() != 0;
        if rx_pending && !rx_done {
            self.handle_rx_cmd(busnr);
        }

        if self.busses[busnr].cmd & Cmd::M_STOP_CMD.bits() != 0 {
            self.handle_stop_cmd(busnr);
        }

        self.raise_interrupt(busnr);
    }

    /// Returns `false` if no slave acknowledged the address (state frozen in START,
    /// further command bits are not processed this call, matching the donor's early
    /// `return` from `aspeed_i2c_bus_handle_cmd`).
    fn handle_start_cmd(&mut self, busnr: usize) -> bool {
        let already_active = self.busses[busnr].state() as u8 & TxState::Mactive as u8 != 0;
        let state = if already_active { TxState::Mstartr } else { TxState::Mstart };
        self.busses[busnr].set_state(state);

        let data = if self.busses[busnr].cmd & Cmd::TX_BUFF_ENABLE.bits() != 0 {
            let start = self.pool_slice_start(busnr);
            self.pool[start]
        } else {
            self.busses[busnr].byte_buf_tx()
        };
        let rnw = data & 0x1 != 0;
        let addr7 = (data >> 1) & 0x7f;

        let acked = self.bus_devices[busnr].start_transfer(addr7, rnw);
        let bus = &mut self.busses[busnr];
        if acked {
            bus.intr_status |= IntrBits::TX_ACK.bits();
        } else {
            bus.intr_status |= IntrBits::TX_NAK.bits();
        }
        bus.cmd &= !(Cmd::M_START_CMD | Cmd::M_TX_CMD).bits();

        if !self.bus_devices[busnr].is_busy() {
            return false;
        }
        self.busses[busnr].set_state(TxState::Mactive);
        true
    }

    fn handle_tx_cmd(&mut self, busnr: usize) {
        self.busses[busnr].set_state(TxState::Mtxd);

        let nak = if self.busses[busnr].cmd & Cmd::TX_BUFF_ENABLE.bits() != 0 {
            let start = self.pool_slice_start(busnr);
            let count = pool_tx_count(self.busses[busnr].pool_ctrl);
            let mut nak = false;
            for i in 0..count {
                if !self.bus_devices[busnr].send(self.pool[start + i]) {
                    nak = true;
                    break;
                }
            }
            self.busses[busnr].cmd &= !Cmd::TX_BUFF_ENABLE.bits();
            nak
        } else {
            let byte = self.busses[busnr].byte_buf_tx();
            !self.bus_devices[busnr].send(byte)
        };

        if nak {
            self.busses[busnr].intr_status |= IntrBits::TX_NAK.bits();
            self.bus_devices[busnr].end_transfer();
        } else {
            self.busses[busnr].intr_status |= IntrBits::TX_ACK.bits();
        }
        self.busses[busnr].cmd &= !Cmd::M_TX_CMD.bits();
        self.busses[busnr].set_state(TxState::Mactive);
    }

    fn handle_rx_cmd(&mut self, busnr: usize) {
        self.busses[busnr].set_state(TxState::Mrxd);

        if self.busses[busnr].cmd & Cmd::RX_BUFF_ENABLE.bits() != 0 {
            let start = self.pool_slice_start(busnr);
            let size = pool_rx_size(self.busses[busnr].pool_ctrl);
            for i in 0..size {
                self.pool[start + i] = self.bus_devices[busnr].recv();
            }
            let bus = &mut self.busses[busnr];
            bus.pool_ctrl &= !(0xff << 24);
            bus.pool_ctrl |= ((size as u32) & 0xff) << 24;
            bus.cmd &= !Cmd::RX_BUFF_ENABLE.bits();
        } else {
            let data = self.bus_devices[busnr].recv();
            self.busses[busnr].byte_buf_set_rx(data);
        }

        let bus = &mut self.busses[busnr];
        bus.intr_status |= IntrBits::RX_DONE.bits();
        if bus.cmd & Cmd::M_S_RX_CMD_LAST.bits() != 0 {
            self.bus_devices[busnr].nack();
        }
        let bus = &mut self.busses[busnr];
        bus.cmd &= !(Cmd::M_RX_CMD | Cmd::M_S_RX_CMD_LAST).bits();
        bus.set_state(TxState::Mactive);
    }

    fn handle_stop_cmd(&mut self, busnr: usize) {
        let active = self.busses[busnr].state() as u8 & TxState::Mactive as u8 != 0;
        if !active {
            warn!(target: "guest_error", bus = busnr, "abnormal stop");
            self.busses[busnr].intr_status |= IntrBits::ABNORMAL.bits();
        } else {
            self.busses[busnr].set_state(TxState::Mstop);
            self.bus_devices[busnr].end_transfer();
            self.busses[busnr].intr_status |= IntrBits::NORMAL_STOP.bits();
        }
        self.busses[busnr].cmd &= !Cmd::M_STOP_CMD.bits();
        self.busses[busnr].set_state(TxState::Idle);
    }

    /// `aspeed_i2c_bus_raise_interrupt`: masks pending status against the enable
    /// register, and if anything survives, sets the controller aggregate bit and
    /// raises this bus's IRQ.
    fn raise_interrupt(&mut self, busnr: usize) {
        let masked = self.busses[busnr].intr_status & self.busses[busnr].intr_ctrl;
        self.busses[busnr].intr_status = masked;
        if masked != 0 {
            self.intr_status |= 1 << busnr;
            self.irq_for_mut(busnr).raise();
        }
    }

    fn pool_slice_start(&self, busnr: usize) -> usize {
        let bus = &self.busses[busnr];
        self.variant.pool_slice_start(busnr, bus.ctrl, bus.pool_ctrl)
    }

    // -- Pool MMIO ------------------------------------------------------------

    pub fn read_pool(&self, offset: usize, size: usize) -> u32 {
        let mut v = 0u32;
        for i in 0..size {
            v |= (*self.pool.get(offset + i).unwrap_or(&0) as u32) << (8 * i);
        }
        v
    }

    pub fn write_pool(&mut self, offset: usize, value: u32, size: usize) {
        for i in 0..size {
            if let Some(slot) = self.pool.get_mut(offset + i) {
                *slot = ((value >> (8 * i)) & 0xff) as u8;
            }
        }
        trace!(target: "ic_pool", offset, size, "pool write");
    }
}

fn pool_tx_count(pool_ctrl: u32) -> usize {
    (((pool_ctrl >> 8) & 0xff) + 1) as usize
}

fn pool_rx_size(pool_ctrl: u32) -> usize {
    (((pool_ctrl >> 16) & 0xff) + 1) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::test_doubles::EchoSlave;
    use crate::irq::NullIrq;

    fn make_2500() -> Controller<EchoSlave, NullIrq> {
        let busses: Vec<EchoSlave> = (0..IcVariant::Ast2500.num_busses())
            .map(|_| EchoSlave::new(0, &[]))
            .collect();
        Controller::new(IcVariant::Ast2500, busses, vec![NullIrq::default()])
    }

    #[test]
    fn aggregate_irq_mirrors_masked_bus_status() {
        let mut ctl = make_2500();
        *ctl.bus_device(3) = EchoSlave::new(0x50, &[0xDE, 0xAD]);

        ctl.write_bus_reg(3, 0x00, FunCtrl::MASTER_EN.bits());
        ctl.write_bus_reg(3, 0x0C, IntrBits::TX_ACK.bits() | IntrBits::RX_DONE.bits());
        ctl.write_bus_reg(3, 0x20, 0xA0);
        ctl.write_bus_reg(3, 0x14, (Cmd::M_START_CMD | Cmd::M_TX_CMD).bits());

        assert_eq!(
            ctl.read_bus_reg(3, 0x10) & IntrBits::TX_ACK.bits(),
            IntrBits::TX_ACK.bits()
        );
        assert_eq!(ctl.intr_status() & (1 << 3), 1 << 3);
    }

    #[test]
    fn end_to_end_scenario() {
        let mut ctl = make_2500();
        *ctl.bus_device(3) = EchoSlave::new(0x50, &[0xDE, 0xAD]);
        ctl.write_bus_reg(3, 0x00, FunCtrl::MASTER_EN.bits());
        ctl.write_bus_reg(3, 0x0C, INTR_MASK);

        // addr 0x50, write
        ctl.write_bus_reg(3, 0x20, 0xA0);
        ctl.write_bus_reg(3, 0x14, (Cmd::M_START_CMD | Cmd::M_TX_CMD).bits());
        assert_ne!(ctl.read_bus_reg(3, 0x10) & IntrBits::TX_ACK.bits(), 0);

        ctl.write_bus_reg(3, 0x20, 0x00);
        ctl.write_bus_reg(3, 0x14, Cmd::M_TX_CMD.bits());
        assert_ne!(ctl.read_bus_reg(3, 0x10) & IntrBits::TX_ACK.bits(), 0);

        // repeated start, addr 0x50, read
        ctl.write_bus_reg(3, 0x20, 0xA1);
        ctl.write_bus_reg(3, 0x14, (Cmd::M_START_CMD | Cmd::M_RX_CMD).bits());
        assert_ne!(ctl.read_bus_reg(3, 0x10) & IntrBits::RX_DONE.bits(), 0);
        assert_eq!((ctl.bus(3).byte_buf_read() >> 8) & 0xff, 0xDE);

        // W1C RX_DONE while RX still pending re-triggers the next byte
        ctl.write_bus_reg(3, 0x10, IntrBits::RX_DONE.bits());
        assert_ne!(ctl.read_bus_reg(3, 0x10) & IntrBits::RX_DONE.bits(), 0);
        assert_eq!((ctl.bus(3).byte_buf_read() >> 8) & 0xff, 0xAD);

        ctl.write_bus_reg(3, 0x14, Cmd::M_STOP_CMD.bits());
        assert_ne!(ctl.read_bus_reg(3, 0x10) & IntrBits::NORMAL_STOP.bits(), 0);
        assert_eq!(ctl.bus(3).state() as u8, TxState::Idle as u8);
    }

    #[test]
    fn abnormal_stop_without_active_transfer() {
        let mut ctl = make_2500();
        ctl.write_bus_reg(0, 0x00, FunCtrl::MASTER_EN.bits());
        ctl.write_bus_reg(0, 0x0C, INTR_MASK);
        ctl.write_bus_reg(0, 0x14, Cmd::M_STOP_CMD.bits());
        assert_ne!(ctl.read_bus_reg(0, 0x10) & IntrBits::ABNORMAL.bits(), 0);
    }

    #[test]
    fn reset_preserves_ctrl_timing_and_pool_ctrl() {
        let mut ctl = make_2500();
        ctl.write_bus_reg(2, 0x00, FunCtrl::MASTER_EN.bits());
        ctl.write_bus_reg(2, 0x1C, 0x0000_0102);
        ctl.reset();
        assert_eq!(ctl.bus(2).ctrl(), FunCtrl::MASTER_EN.bits());
        assert_eq!(ctl.bus(2).pool_ctrl(), 0x0000_0102);
        assert_eq!(ctl.bus(2).intr_status(), 0);
    }

    #[test]
    fn pool_slicing_matches_variant_layout() {
        assert_eq!(IcVariant::Ast2500.pool_slice_start(3, 0, 0), 3 * 0x10);
        assert_eq!(IcVariant::Ast2600.pool_slice_start(3, 0, 0), 3 * 0x20);
        // AST2400: page-select (ctrl[22:20]) is used unscaled as a byte offset, added
        // to pool_ctrl[5:0]<<2 — matching `aspeed_2400_i2c_bus_pool_base` exactly.
        let ctrl = 2 << 20;
        let pool_ctrl = 0x5;
        assert_eq!(IcVariant::Ast2400.pool_slice_start(0, ctrl, pool_ctrl), 2 + (0x5 << 2));
    }

    #[test]
    fn snapshot_round_trips_through_reset() {
        let mut ctl = make_2500();
        ctl.write_bus_reg(5, 0x00, FunCtrl::MASTER_EN.bits());
        ctl.write_bus_reg(5, 0x0C, INTR_MASK);
        ctl.write_bus_reg(5, 0x1C, 0x0000_0102);
        *ctl.bus_device(5) = EchoSlave::new(0x50, &[0xAB]);
        ctl.write_bus_reg(5, 0x20, 0xA0);
        ctl.write_bus_reg(5, 0x14, (Cmd::M_START_CMD | Cmd::M_TX_CMD).bits());
        assert_eq!(IcSnapshot::VERSION, 2);

        let snap = ctl.snapshot();
        ctl.reset();
        assert_eq!(ctl.bus(5).intr_status(), 0);

        ctl.restore(&snap);
        assert_eq!(ctl.bus(5).intr_status() & IntrBits::TX_ACK.bits(), IntrBits::TX_ACK.bits());
        assert_eq!(ctl.bus(5).pool_ctrl(), 0x0000_0102);
        assert_eq!(ctl.intr_status() & (1 << 5), 1 << 5);
    }

    #[test]
    fn bus_window_offsets_follow_gap_table() {
        // 2400/2500: busses 0..6 get +1 slot, 7..13 get +5 slots.
        assert_eq!(IcVariant::Ast2500.bus_window_offset(0), 0x40 * 1);
        assert_eq!(IcVariant::Ast2500.bus_window_offset(7), 0x40 * (7 + 5));
        // 2600 has no gap: every bus takes the +5 slot.
        assert_eq!(IcVariant::Ast2600.bus_window_offset(0), 0x80 * 5);
        assert_eq!(IcVariant::Ast2600.bus_window_offset(15), 0x80 * (15 + 5));
    }
}
