//! The emulator core: a Thumb/ARMv7-M address space, the SVC ABI dispatcher,
//! and the reset/run driver loop. Grounded directly in
//! `unicorn/simul/device.py`'s `Simulation` class.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use tracing::{debug, trace, warn};
use unicorn_engine::unicorn_const::{Arch, HookType, MemType, Mode, Permission};
use unicorn_engine::{RegisterARM, Unicorn};
use uuid::Uuid;

use crate::error::{EmulatorError, PanicType, Result};
use crate::registry::{IrqController, Peripheral, PeripheralCatalog, PeripheralHost};

pub const RAM_BASE: u32 = 0x1000_0000;
pub const RAM_SIZE: u32 = 0x0004_0000;
pub const FLASH_BASE: u32 = 0x2000_0000;
pub const FLASH_SIZE: u32 = 0x0010_0000;
pub const EE_BASE: u32 = 0x3000_0000;
pub const EE_SIZE: u32 = 0x0001_0000;
pub const PERIPH_BASE: u32 = 0x4000_0000;
pub const PERIPH_PAGE_SIZE: u32 = 0x1000;
pub const PERIPH_WINDOW_SIZE: u32 = 0x0010_0000;

/// The special-return window: code never lives here, so any fetch in this
/// range is the CPU trying to execute a magic return address we pushed as a
/// link register, and is always intercepted before it would fault.
pub const SPECIAL_RETURN_BASE: u32 = 0xffff_f000;
pub const SPECIAL_RETURN_SIZE: u32 = 0x0000_1000;
/// Magic LR pushed before entering a peripheral interrupt handler.
pub const IRQ_RETURN_ADDR: u32 = 0xffff_fff0;
/// Magic LR pushed before the very first `reset()` entry; returning here
/// means the firmware's `main` returned, which is itself a fault.
pub const RESET_RETURN_ADDR: u32 = 0xffff_fff1;

const SVC_PANIC: u32 = 0;
const SVC_PERIPH_REG: u32 = 1;
const SVC_WFI: u32 = 2;
const SVC_IRQ: u32 = 3;
const SVC_RESET: u32 = 4;
const SVC_PERIPH_BASE: u32 = 0x0100_0000;

const INTNO_SVC: u32 = 2;

/// State reachable from inside a Unicorn hook callback, stored as the
/// engine's user data. All SVC dispatch logic is written as free functions
/// taking `&mut Unicorn<EmuState>` for exactly this reason: a hook only ever
/// gets the engine, never the owning [`Simulation`].
pub struct EmuState {
    catalog: PeripheralCatalog,
    peripherals: HashMap<u8, Box<dyn Peripheral>>,
    uuid_to_pid: HashMap<Uuid, u8>,
    irq: Option<Rc<RefCell<dyn IrqController>>>,
    halted: bool,
    wfi: bool,
    pending_error: Option<EmulatorError>,
    ticks: u64,
}

impl EmuState {
    fn new(catalog: PeripheralCatalog) -> Self {
        EmuState {
            catalog,
            peripherals: HashMap::new(),
            uuid_to_pid: HashMap::new(),
            irq: None,
            halted: false,
            wfi: false,
            pending_error: None,
            ticks: 0,
        }
    }

    fn fail(&mut self, err: EmulatorError) {
        if self.pending_error.is_none() {
            self.pending_error = Some(err);
        }
        self.halted = true;
    }
}

/// Narrow host handed to a [`Peripheral::svc`] implementation while its
/// owning entry has been temporarily removed from `peripherals`.
struct Host<'a> {
    irq: &'a mut Option<Rc<RefCell<dyn IrqController>>>,
    ticks: u64,
}

impl<'a> PeripheralHost for Host<'a> {
    fn log(&mut self, message: &str) {
        debug!(target: "guest", "{message}");
    }

    fn wake(&mut self) {}

    fn ticks(&self) -> u64 {
        self.ticks
    }

    fn raise_irq(&mut self, pid: u8) {
        if let Some(irq) = self.irq.as_ref() {
            irq.borrow_mut().set(pid);
        }
    }

    fn clear_irq(&mut self, pid: u8) {
        if let Some(irq) = self.irq.as_ref() {
            irq.borrow_mut().clear(pid);
        }
    }
}

pub struct Simulation {
    uc: Unicorn<'static, EmuState>,
    flash_image: Vec<u8>,
}

impl Simulation {
    pub fn new(catalog: PeripheralCatalog) -> Result<Self> {
        let mut uc = Unicorn::new_with_data(Arch::ARM, Mode::THUMB, EmuState::new(catalog))?;
        uc.mem_map(RAM_BASE as u64, RAM_SIZE as usize, Permission::READ | Permission::WRITE)?;
        uc.mem_map(FLASH_BASE as u64, FLASH_SIZE as usize, Permission::READ | Permission::EXEC)?;
        uc.mem_map(EE_BASE as u64, EE_SIZE as usize, Permission::READ | Permission::WRITE)?;
        uc.mem_map(PERIPH_BASE as u64, PERIPH_WINDOW_SIZE as usize, Permission::READ | Permission::WRITE)?;

        uc.add_intr_hook(intr_hook)?;
        uc.add_mem_hook(
            HookType::MEM_FETCH_UNMAPPED,
            SPECIAL_RETURN_BASE as u64,
            (SPECIAL_RETURN_BASE + SPECIAL_RETURN_SIZE) as u64,
            special_return_hook,
        )?;

        Ok(Simulation { uc, flash_image: Vec::new() })
    }

    /// Load `(addr, bytes)` segments produced by `hexload` into FLASH.
    /// Segments must fall entirely within `[FLASH_BASE, FLASH_BASE+FLASH_SIZE)`.
    pub fn load_segments(&mut self, segments: &[(u32, Vec<u8>)]) -> Result<()> {
        for (addr, bytes) in segments {
            self.uc.mem_write(*addr as u64, bytes)?;
            let end = *addr as usize + bytes.len();
            if end > self.flash_image.len() {
                self.flash_image.resize(end, 0xff);
            }
            self.flash_image[*addr as usize..end].copy_from_slice(bytes);
        }
        Ok(())
    }

    /// Read `{sp: u32, entry: u32}` from the first 8 bytes of FLASH and set
    /// up the initial register file. Matches `device.py`'s `reset()`.
    pub fn reset(&mut self) -> Result<()> {
        do_reset(&mut self.uc)
    }

    /// Register a peripheral type in slot `pid`, mirroring the guest's
    /// `SVC_PERIPH_REG(uuid_ptr, pid)` call.
    pub fn register_peripheral(&mut self, uuid: Uuid, pid: u8) -> Result<()> {
        register_peripheral(&mut self.uc, uuid, pid)
    }

    /// Install an already-constructed peripheral directly into slot `pid`,
    /// bypassing the UUID catalog. Used for peripherals that need wiring the
    /// generic `Fn(u8) -> Box<dyn Peripheral>` factory can't carry, chiefly
    /// the radio (it needs a `sim_medium::Medium` and `sim_runtime::Scheduler`
    /// handle from outside this crate).
    pub fn install_peripheral(&mut self, pid: u8, peripheral: Box<dyn Peripheral>) -> Result<()> {
        let state = self.uc.get_data_mut();
        if state.peripherals.contains_key(&pid) {
            return Err(EmulatorError::PeripheralSlotTaken(pid));
        }
        if let Some(irq) = peripheral.as_irq_controller() {
            state.irq = Some(irq);
        }
        let mut page = vec![0u8; PERIPH_PAGE_SIZE as usize];
        peripheral.read_page(&mut page);
        let uuid = peripheral.uuid();
        state.peripherals.insert(pid, peripheral);
        state.uuid_to_pid.insert(uuid, pid);
        let base = (PERIPH_BASE + pid as u32 * PERIPH_PAGE_SIZE) as u64;
        self.uc.mem_write(base, &page)?;
        Ok(())
    }

    /// Give every registered peripheral a chance to react to virtual time
    /// having advanced (see [`Peripheral::poll`]), e.g. the timer firing an
    /// alarm or the radio completing a scheduled transmit/receive window.
    pub fn poll_peripherals(&mut self) -> Result<()> {
        let pids: Vec<u8> = self.uc.get_data().peripherals.keys().copied().collect();
        for pid in pids {
            let mut peripheral = match self.uc.get_data_mut().peripherals.remove(&pid) {
                Some(p) => p,
                None => continue,
            };
            let ticks = self.uc.get_data().ticks;
            {
                let mut host = Host { irq: &mut self.uc.get_data_mut().irq, ticks };
                peripheral.poll(&mut host);
            }
            let base = (PERIPH_BASE + pid as u32 * PERIPH_PAGE_SIZE) as u64;
            let mut page = vec![0u8; PERIPH_PAGE_SIZE as usize];
            peripheral.read_page(&mut page);
            self.uc.mem_write(base, &page)?;
            self.uc.get_data_mut().peripherals.insert(pid, peripheral);
        }
        Ok(())
    }

    /// Access a previously-registered peripheral by its type UUID, for test
    /// harnesses and the `Radio` <-> `sim-medium` wiring that lives above
    /// this crate.
    pub fn peripheral_mut(&mut self, uuid: Uuid) -> Option<&mut (dyn Peripheral + '_)> {
        let state = self.uc.get_data_mut();
        let pid = *state.uuid_to_pid.get(&uuid)?;
        state.peripherals.get_mut(&pid).map(|b| b.as_mut())
    }

    pub fn set_ticks(&mut self, ticks: u64) {
        self.uc.get_data_mut().ticks = ticks;
    }

    pub fn is_waiting_for_interrupt(&self) -> bool {
        self.uc.get_data().wfi
    }

    /// Run until the guest executes `SVC_WFI`, panics, or the run would
    /// otherwise stall. The caller (the `sim` crate's driver loop) schedules
    /// the next wakeup with `sim-runtime` and calls back in once it fires or
    /// a peripheral raises an interrupt.
    pub fn run(&mut self) -> Result<()> {
        loop {
            {
                let state = self.uc.get_data_mut();
                if state.halted {
                    if let Some(err) = state.pending_error.take() {
                        return Err(err);
                    }
                    return Ok(());
                }
                if state.wfi {
                    let woken = state.irq.as_ref().map(|irq| irq.borrow().requested()).unwrap_or(false);
                    if woken {
                        state.wfi = false;
                    } else {
                        return Ok(());
                    }
                }
            }

            if let Some(vector) = poll_irq(&mut self.uc)? {
                enter_irq(&mut self.uc, vector)?;
            }

            let pc = self.uc.reg_read(RegisterARM::PC)?;
            self.uc.emu_start(pc, 0, 0, 1)?;

            if let Some(err) = self.uc.get_data_mut().pending_error.take() {
                return Err(err);
            }
        }
    }
}

fn do_reset(uc: &mut Unicorn<EmuState>) -> Result<()> {
    let mut header = [0u8; 8];
    uc.mem_read(FLASH_BASE as u64, &mut header)?;
    let sp = u32::from_le_bytes(header[0..4].try_into().unwrap());
    let entry = u32::from_le_bytes(header[4..8].try_into().unwrap());

    uc.reg_write(RegisterARM::SP, sp as u64)?;
    uc.reg_write(RegisterARM::LR, RESET_RETURN_ADDR as u64)?;
    uc.reg_write(RegisterARM::PC, (entry | 1) as u64)?;
    uc.reg_write(RegisterARM::CPSR, 0x33)?;

    let state = uc.get_data_mut();
    state.halted = false;
    state.wfi = false;
    state.pending_error = None;
    Ok(())
}

fn poll_irq(uc: &mut Unicorn<EmuState>) -> Result<Option<u32>> {
    let Some(irq) = uc.get_data().irq.clone() else { return Ok(None) };
    Ok(irq.borrow_mut().handler())
}

fn enter_irq(uc: &mut Unicorn<EmuState>, vector: u32) -> Result<()> {
    let sp = uc.reg_read(RegisterARM::SP)? - 4;
    let lr = uc.reg_read(RegisterARM::LR)?;
    uc.mem_write(sp, &(lr as u32).to_le_bytes())?;
    uc.reg_write(RegisterARM::SP, sp)?;
    uc.reg_write(RegisterARM::LR, IRQ_RETURN_ADDR as u64)?;
    uc.reg_write(RegisterARM::PC, (vector | 1) as u64)?;
    Ok(())
}

fn irq_return(uc: &mut Unicorn<EmuState>) -> Result<()> {
    let pc = uc.reg_read(RegisterARM::PC)?;
    if pc as u32 != IRQ_RETURN_ADDR {
        return Err(EmulatorError::UnexpectedSpecialReturn(pc as u32));
    }
    let sp = uc.reg_read(RegisterARM::SP)?;
    let mut buf = [0u8; 4];
    uc.mem_read(sp, &mut buf)?;
    let lr = u32::from_le_bytes(buf);
    uc.reg_write(RegisterARM::SP, sp + 4)?;
    uc.reg_write(RegisterARM::LR, lr as u64)?;
    uc.reg_write(RegisterARM::PC, lr as u64)?;
    if let Some(irq) = uc.get_data().irq.clone() {
        irq.borrow_mut().done();
    }
    Ok(())
}

fn dispatch_svc(uc: &mut Unicorn<EmuState>, svcid: u32) -> Result<()> {
    let lr = uc.reg_read(RegisterARM::LR).unwrap_or(0) as u32;
    match svcid {
        SVC_PANIC => {
            let reason = uc.reg_read(RegisterARM::R0)? as u32;
            let ptype_code = uc.reg_read(RegisterARM::R1)? as u32;
            let addr = uc.reg_read(RegisterARM::PC)? as u32;
            uc.get_data_mut().fail(EmulatorError::Panic { ptype: PanicType::from_code(ptype_code), reason, addr, lr });
            uc.emu_stop()?;
        }
        SVC_PERIPH_REG => {
            let uuid_ptr = uc.reg_read(RegisterARM::R0)? as u32;
            let pid = uc.reg_read(RegisterARM::R1)? as u32 as u8;
            let mut raw = [0u8; 16];
            uc.mem_read(uuid_ptr as u64, &mut raw)?;
            let uuid = Uuid::from_bytes(raw);
            if let Err(e) = register_peripheral(uc, uuid, pid) {
                uc.get_data_mut().fail(e);
                uc.emu_stop()?;
            }
        }
        SVC_WFI => {
            uc.get_data_mut().wfi = true;
            uc.emu_stop()?;
        }
        SVC_IRQ => irq_return(uc)?,
        SVC_RESET => {
            do_reset(uc)?;
            uc.emu_stop()?;
        }
        _ if svcid >= SVC_PERIPH_BASE => {
            let pid = ((svcid >> 16) & 0xff) as u8;
            let fid = (svcid & 0xffff) as u16;
            dispatch_peripheral_svc(uc, pid, fid, lr)?;
        }
        _ => {
            uc.get_data_mut().fail(EmulatorError::UnknownSvc { svcid, lr });
            uc.emu_stop()?;
        }
    }
    Ok(())
}

/// Shared by [`Simulation::register_peripheral`] and the `SVC_PERIPH_REG`
/// handler, which run on different sides of the `Simulation`/`Unicorn`
/// boundary but both only ever need `&mut Unicorn<EmuState>`.
fn register_peripheral(uc: &mut Unicorn<EmuState>, uuid: Uuid, pid: u8) -> Result<()> {
    let state = uc.get_data_mut();
    if state.peripherals.contains_key(&pid) {
        return Err(EmulatorError::PeripheralSlotTaken(pid));
    }
    let peripheral = state.catalog.create(uuid, pid)?;
    if let Some(irq) = peripheral.as_irq_controller() {
        state.irq = Some(irq);
    }
    let mut page = vec![0u8; PERIPH_PAGE_SIZE as usize];
    peripheral.read_page(&mut page);
    state.peripherals.insert(pid, peripheral);
    state.uuid_to_pid.insert(uuid, pid);
    let base = (PERIPH_BASE + pid as u32 * PERIPH_PAGE_SIZE) as u64;
    uc.mem_write(base, &page)?;
    Ok(())
}

fn dispatch_peripheral_svc(uc: &mut Unicorn<EmuState>, pid: u8, fid: u16, lr: u32) -> Result<()> {
    let mut peripheral = match uc.get_data_mut().peripherals.remove(&pid) {
        Some(p) => p,
        None => {
            uc.get_data_mut().fail(EmulatorError::UnknownPeripheralId { pid, lr });
            uc.emu_stop()?;
            return Ok(());
        }
    };

    let base = (PERIPH_BASE + pid as u32 * PERIPH_PAGE_SIZE) as u64;
    let mut page = vec![0u8; PERIPH_PAGE_SIZE as usize];
    uc.mem_read(base, &mut page)?;
    peripheral.write_page(&page);

    let ticks = uc.get_data().ticks;
    let result = {
        let mut host = Host { irq: &mut uc.get_data_mut().irq, ticks };
        peripheral.svc(&mut host, fid)
    };

    peripheral.read_page(&mut page);
    uc.mem_write(base, &page)?;
    uc.get_data_mut().peripherals.insert(pid, peripheral);

    if let Err(e) = result {
        uc.get_data_mut().fail(e);
        uc.emu_stop()?;
    }
    Ok(())
}

fn intr_hook(uc: &mut Unicorn<EmuState>, intno: u32) {
    if intno != INTNO_SVC {
        uc.get_data_mut().fail(EmulatorError::UnknownSvc { svcid: intno, lr: 0 });
        let _ = uc.emu_stop();
        return;
    }
    let svcid = uc.reg_read(RegisterARM::R12).unwrap_or(0) as u32;
    trace!(svcid, "svc");
    if let Err(e) = dispatch_svc(uc, svcid) {
        uc.get_data_mut().fail(e);
        let _ = uc.emu_stop();
    }
}

fn special_return_hook(uc: &mut Unicorn<EmuState>, _mem_type: MemType, addr: u64, _size: usize, _value: i64) -> bool {
    warn!(addr, "fetch in special-return window outside of IRQ return");
    uc.get_data_mut().fail(EmulatorError::UnexpectedSpecialReturn(addr as u32));
    let _ = uc.emu_stop();
    false
}
