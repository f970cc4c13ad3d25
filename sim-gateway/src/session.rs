//! Per-device join state: the session established at join time and the
//! dual-index table the LNS uses to find it either by `DevAddr` (for
//! incoming data frames) or by `DevEui` (for a repeat Join-Request).

use std::collections::HashMap;

use lorawan_encoding::keys::AES128;

/// Everything the LNS needs to route and authenticate frames from one
/// joined device.
#[derive(Debug, Clone)]
pub struct Session {
    pub dev_addr: [u8; 4],
    pub dev_eui: [u8; 8],
    pub join_eui: [u8; 8],
    pub nwk_skey: AES128,
    pub app_skey: AES128,
    pub last_dev_nonce: u16,
    pub fcnt_up: u32,
    pub fcnt_dn: u32,
    pub rx1_dr_offset: u8,
    pub rx2_dr: u8,
    pub rx_delay_secs: u8,
    pub region: sim_region::RegionKind,
}

/// Dual-keyed session table: `addr2sess` for uplink routing, `eui2sess` so a
/// repeated Join-Request from a known device reuses/overwrites its entry
/// instead of leaking the stale DevAddr's session.
#[derive(Default)]
pub struct SessionManager {
    addr2sess: HashMap<[u8; 4], Session>,
    eui2addr: HashMap<[u8; 8], [u8; 4]>,
}

impl SessionManager {
    pub fn new() -> Self {
        SessionManager { addr2sess: HashMap::new(), eui2addr: HashMap::new() }
    }

    pub fn insert(&mut self, session: Session) {
        if let Some(old_addr) = self.eui2addr.insert(session.dev_eui, session.dev_addr) {
            if old_addr != session.dev_addr {
                self.addr2sess.remove(&old_addr);
            }
        }
        self.addr2sess.insert(session.dev_addr, session);
    }

    pub fn by_addr(&self, addr: &[u8; 4]) -> Option<&Session> {
        self.addr2sess.get(addr)
    }

    pub fn by_addr_mut(&mut self, addr: &[u8; 4]) -> Option<&mut Session> {
        self.addr2sess.get_mut(addr)
    }

    pub fn by_eui(&self, eui: &[u8; 8]) -> Option<&Session> {
        self.eui2addr.get(eui).and_then(|addr| self.addr2sess.get(addr))
    }

    pub fn last_dev_nonce(&self, eui: &[u8; 8]) -> Option<u16> {
        self.by_eui(eui).map(|s| s.last_dev_nonce)
    }

    pub fn remove(&mut self, addr: &[u8; 4]) -> Option<Session> {
        let session = self.addr2sess.remove(addr)?;
        self.eui2addr.remove(&session.dev_eui);
        Some(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(addr: [u8; 4], eui: [u8; 8]) -> Session {
        Session {
            dev_addr: addr,
            dev_eui: eui,
            join_eui: [0; 8],
            nwk_skey: AES128([1; 16]),
            app_skey: AES128([2; 16]),
            last_dev_nonce: 0,
            fcnt_up: 0,
            fcnt_dn: 0,
            rx1_dr_offset: 0,
            rx2_dr: 0,
            rx_delay_secs: 1,
            region: sim_region::RegionKind::Eu868,
        }
    }

    #[test]
    fn rejoin_with_new_addr_drops_the_old_addr_entry() {
        let mut mgr = SessionManager::new();
        mgr.insert(session([1, 1, 1, 1], [9; 8]));
        mgr.insert(session([2, 2, 2, 2], [9; 8]));
        assert!(mgr.by_addr(&[1, 1, 1, 1]).is_none());
        assert!(mgr.by_addr(&[2, 2, 2, 2]).is_some());
        assert_eq!(mgr.by_eui(&[9; 8]).unwrap().dev_addr, [2, 2, 2, 2]);
    }
}
